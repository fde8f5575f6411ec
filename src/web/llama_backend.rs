// llama.cpp backend via llama-cpp-2

use std::num::NonZeroU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use llama_cpp_2::{
    context::params::LlamaContextParams,
    llama_backend::LlamaBackend,
    llama_batch::LlamaBatch,
    model::{params::LlamaModelParams, AddBos, LlamaModel, Special},
    sampling::LlamaSampler,
};
use log::{debug, info, warn};

use super::chat::StopScanner;
use super::models::{
    CancellationFlag, Completion, LanguageModel, LoadRequest, ModelLoader, SamplingParams,
};

// Prompt tokens decoded per batch
const PROMPT_BATCH_CAP: usize = 512;

/// Load-time knobs that do not change per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlamaLoadOptions {
    pub gpu_layers: u32,
    pub use_mlock: bool,
    pub threads: usize,
}

pub struct LlamaLoader {
    backend: Arc<LlamaBackend>,
    options: LlamaLoadOptions,
}

impl LlamaLoader {
    /// Initialize llama.cpp. Only one loader may exist per process.
    pub fn new(options: LlamaLoadOptions) -> Result<Self, String> {
        let backend =
            LlamaBackend::init().map_err(|e| format!("Failed to init backend: {e}"))?;
        Ok(Self {
            backend: Arc::new(backend),
            options,
        })
    }
}

impl ModelLoader for LlamaLoader {
    fn load(&self, request: &LoadRequest) -> Result<Box<dyn LanguageModel>, String> {
        if !request.model_path.exists() {
            return Err(format!(
                "Model file not found: {}",
                request.model_path.display()
            ));
        }

        let model_params = LlamaModelParams::default()
            .with_n_gpu_layers(self.options.gpu_layers)
            .with_use_mlock(self.options.use_mlock);

        info!(
            "llama.cpp load: gpu_layers={}, mlock={}, threads={}",
            self.options.gpu_layers, self.options.use_mlock, self.options.threads
        );

        let model = LlamaModel::load_from_file(&self.backend, &request.model_path, &model_params)
            .map_err(|e| format!("Failed to load model: {e}"))?;

        Ok(Box::new(LlamaCppModel {
            backend: self.backend.clone(),
            model,
            context_length: request.context_length,
            threads: self.options.threads,
        }))
    }
}

/// A loaded GGUF model. A fresh context is created per call, so nothing
/// leaks between requests.
struct LlamaCppModel {
    backend: Arc<LlamaBackend>,
    model: LlamaModel,
    context_length: u32,
    threads: usize,
}

fn build_sampler(params: &SamplingParams) -> LlamaSampler {
    if params.temperature <= 0.0 {
        return LlamaSampler::greedy();
    }

    let seed = chrono::Utc::now().timestamp_subsec_nanos();
    LlamaSampler::chain_simple([
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature),
        LlamaSampler::dist(seed),
    ])
}

impl LlamaCppModel {
    /// Decode the prompt, then sample until EOS, a stop sequence, the token
    /// budget or cancellation. Returns prompt plus generated token count.
    fn run(
        &self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationFlag,
        on_piece: &mut dyn FnMut(&str),
    ) -> Result<u64, String> {
        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| format!("Tokenization failed: {e}"))?;

        let n_ctx = self.context_length as usize;
        if tokens.is_empty() || tokens.len() >= n_ctx {
            return Err(format!(
                "Prompt is {} tokens, context holds {n_ctx}",
                tokens.len()
            ));
        }

        let threads = i32::try_from(self.threads).unwrap_or(i32::MAX);
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.context_length))
            .with_n_threads(threads)
            .with_n_threads_batch(threads);
        let mut context = self
            .model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| format!("Context creation failed: {e}"))?;

        let mut batch = LlamaBatch::new(PROMPT_BATCH_CAP, 1);
        let last = tokens.len() - 1;
        for (chunk_index, chunk) in tokens.chunks(PROMPT_BATCH_CAP).enumerate() {
            batch.clear();
            for (offset, &token) in chunk.iter().enumerate() {
                let pos = chunk_index * PROMPT_BATCH_CAP + offset;
                batch
                    .add(token, pos as i32, &[0], pos == last)
                    .map_err(|e| format!("Batch add failed: {e}"))?;
            }
            context
                .decode(&mut batch)
                .map_err(|e| format!("Prompt decode failed: {e}"))?;
        }

        let budget = (params.max_tokens as usize).min(n_ctx - tokens.len());
        let mut sampler = build_sampler(params);
        let mut scanner = StopScanner::new(&params.stop);
        let mut token_pos = tokens.len() as i32;
        let mut generated: u64 = 0;
        let mut stopped = false;

        while (generated as usize) < budget {
            if cancel.load(Ordering::SeqCst) {
                return Err("Generation cancelled".to_string());
            }

            let next_token = sampler.sample(&context, -1);
            if next_token == self.model.token_eos() {
                break;
            }
            generated += 1;

            match self.model.token_to_str(next_token, Special::Tokenize) {
                Ok(piece) => {
                    let step = scanner.push(&piece);
                    if !step.emit.is_empty() {
                        on_piece(&step.emit);
                    }
                    if step.should_stop {
                        debug!("Stop sequence {:?} reached", step.matched_token);
                        stopped = true;
                        break;
                    }
                }
                // Token is still fed back so the model keeps its place
                Err(e) => warn!("Token {next_token} is not valid UTF-8: {e}"),
            }

            batch.clear();
            batch
                .add(next_token, token_pos, &[0], true)
                .map_err(|e| format!("Batch add failed: {e}"))?;
            context
                .decode(&mut batch)
                .map_err(|e| format!("Decode failed: {e}"))?;
            token_pos += 1;
        }

        if !stopped {
            let rest = scanner.finish();
            if !rest.is_empty() {
                on_piece(&rest);
            }
        }

        Ok(tokens.len() as u64 + generated)
    }
}

impl LanguageModel for LlamaCppModel {
    fn complete(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationFlag,
    ) -> Result<Completion, String> {
        let mut text = String::new();
        let total_tokens = self.run(prompt, params, cancel, &mut |piece: &str| {
            text.push_str(piece)
        })?;
        Ok(Completion { text, total_tokens })
    }

    fn complete_streaming(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationFlag,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<(), String> {
        self.run(prompt, params, cancel, on_chunk).map(|_| ())
    }
}
