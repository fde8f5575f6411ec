// Model backend seam: what the lifecycle manager loads and the executor drives

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Flag the backend polls between tokens to abort generation early.
pub type CancellationFlag = Arc<AtomicBool>;

/// Resolved sampling parameters handed to the model for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Generation stops when any of these appears in the output.
    pub stop: Vec<String>,
}

/// One-shot completion with the model's own token accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Prompt plus generated tokens, as counted by the model's tokenizer.
    pub total_tokens: u64,
}

/// What to load and how large a context to give it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub model_path: PathBuf,
    pub context_length: u32,
}

/// A loaded model instance. Every method blocks and is CPU-bound, so callers
/// must only invoke it from a blocking worker thread.
pub trait LanguageModel: Send {
    fn complete(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationFlag,
    ) -> Result<Completion, String>;

    /// Deliver generated text piece by piece through `on_chunk`.
    fn complete_streaming(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationFlag,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<(), String>;
}

/// Turns a model file into a [`LanguageModel`]. Blocking.
pub trait ModelLoader: Send + Sync {
    fn load(&self, request: &LoadRequest) -> Result<Box<dyn LanguageModel>, String>;
}
