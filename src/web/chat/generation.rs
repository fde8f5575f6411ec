use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::sync::Semaphore;

use fusion_types::{EngineError, InferenceRequest, InferenceResult};

use super::super::model_manager::SharedModelManager;
use super::super::models::{CancellationFlag, LanguageModel, SamplingParams};
use super::templates::PromptTemplate;

/// Used when neither the request nor the configuration sets top-p.
pub const DEFAULT_TOP_P: f32 = 0.9;

/// Sampling values applied when a request leaves a field unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDefaults {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: DEFAULT_TOP_P,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub defaults: GenerationDefaults,
    pub template: PromptTemplate,
    /// Reported as `model` on every result.
    pub model_label: String,
    /// Admission bound: generate calls queued or running at once.
    pub max_concurrent: usize,
    pub request_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            defaults: GenerationDefaults::default(),
            template: PromptTemplate::default(),
            model_label: "phi-3-mini".to_string(),
            max_concurrent: 5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Model output after streaming and one-shot shapes are folded together.
#[derive(Debug, Clone, PartialEq)]
struct NormalizedOutput {
    text: String,
    tokens_used: u64,
}

/// Word count used as the token estimate for streamed output, where the
/// backend gives no authoritative total.
pub fn approximate_token_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Turns validated requests into results using whatever model the lifecycle
/// manager currently holds.
pub struct InferenceExecutor {
    manager: SharedModelManager,
    settings: ExecutorSettings,
    permits: Arc<Semaphore>,
}

impl InferenceExecutor {
    pub fn new(manager: SharedModelManager, settings: ExecutorSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Self {
            manager,
            settings,
            permits,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Fill unset request fields from the configured defaults.
    pub fn resolve(&self, request: &InferenceRequest) -> SamplingParams {
        let defaults = &self.settings.defaults;
        SamplingParams {
            max_tokens: request.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: request.temperature.unwrap_or(defaults.temperature),
            top_p: request.top_p.unwrap_or(defaults.top_p),
            stop: self.settings.template.stop_sequences(),
        }
    }

    pub async fn generate(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResult, EngineError> {
        request.validate()?;

        if !self.manager.is_loaded() {
            return Err(EngineError::ModelNotLoaded);
        }

        // Held by the model task, so abandoned work still counts against the bound
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| EngineError::Busy {
                limit: self.settings.max_concurrent,
            })?;

        let params = self.resolve(request);
        let prompt = self.settings.template.format(&request.prompt);
        let stream = request.stream;
        debug!(
            "Generating: max_tokens={}, temperature={}, top_p={}, stream={stream}",
            params.max_tokens, params.temperature, params.top_p
        );

        let cancel: CancellationFlag = Arc::new(AtomicBool::new(false));
        let task_cancel = cancel.clone();
        let limit = self.settings.request_timeout;
        let abandon = CancelOnDrop::new(cancel.clone());

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            limit,
            self.manager.run(move |model| {
                let _permit = permit;
                execute(model, &prompt, &params, stream, &task_cancel)
            }),
        )
        .await;
        let elapsed = started.elapsed();
        abandon.disarm();

        let output = match outcome {
            Err(_) => {
                // The worker keeps the model; tell it to stop at the next token
                cancel.store(true, Ordering::SeqCst);
                warn!("Generation timed out after {:.1}s", limit.as_secs_f64());
                return Err(EngineError::Timeout(limit));
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(Err(cause))) => {
                error!("Generation failed: {cause}");
                return Err(EngineError::GenerationFailed(cause));
            }
            Ok(Ok(Ok(output))) => output,
        };

        let total = self.manager.record_inference();
        info!(
            "Generated {} tokens in {:.2}s (inference #{total})",
            output.tokens_used,
            elapsed.as_secs_f64()
        );

        Ok(InferenceResult::new(
            output.text.trim(),
            output.tokens_used,
            elapsed,
            self.settings.model_label.as_str(),
        ))
    }
}

/// Raises the cancel flag if the caller's future is dropped before the model
/// task reports back.
struct CancelOnDrop {
    flag: Option<CancellationFlag>,
}

impl CancelOnDrop {
    fn new(flag: CancellationFlag) -> Self {
        Self { flag: Some(flag) }
    }

    fn disarm(mut self) {
        self.flag = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.take() {
            debug!("Caller went away, cancelling its generation");
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Runs on the blocking thread that holds the model.
fn execute(
    model: &mut dyn LanguageModel,
    prompt: &str,
    params: &SamplingParams,
    stream: bool,
    cancel: &CancellationFlag,
) -> Result<NormalizedOutput, String> {
    // Abandoned while still queued
    if cancel.load(Ordering::SeqCst) {
        return Err("generation cancelled".to_string());
    }

    if stream {
        let mut text = String::new();
        model.complete_streaming(prompt, params, cancel, &mut |chunk: &str| {
            text.push_str(chunk)
        })?;
        let tokens_used = approximate_token_count(&text);
        Ok(NormalizedOutput { text, tokens_used })
    } else {
        let completion = model.complete(prompt, params, cancel)?;
        Ok(NormalizedOutput {
            text: completion.text,
            tokens_used: completion.total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::mock_backend::{MockLoader, MockProbe, MockScript};
    use crate::web::model_manager::ModelLifecycleManager;
    use futures_util::future::join_all;

    fn chunks(pieces: &[&str]) -> MockScript {
        MockScript::Chunks(pieces.iter().map(|s| s.to_string()).collect())
    }

    async fn executor_with(
        loader: MockLoader,
        settings: ExecutorSettings,
        load: bool,
    ) -> (Arc<InferenceExecutor>, SharedModelManager, Arc<MockProbe>) {
        let probe = loader.probe();
        let manager = Arc::new(ModelLifecycleManager::spawn(Arc::new(loader), 16));
        if load {
            manager.load("test.gguf", 4096).await.unwrap();
        }
        let executor = Arc::new(InferenceExecutor::new(manager.clone(), settings));
        (executor, manager, probe)
    }

    #[test]
    fn test_approximate_token_count() {
        assert_eq!(approximate_token_count(""), 0);
        assert_eq!(approximate_token_count("  one   two\nthree\t"), 3);
    }

    #[tokio::test]
    async fn test_haiku_request() {
        let loader = MockLoader::new(chunks(&["  Silicon", " dreams", " hum", "\n"]))
            .with_latency(Duration::from_millis(10));
        let (executor, manager, probe) =
            executor_with(loader, ExecutorSettings::default(), true).await;

        let request = InferenceRequest::new("Write a haiku about technology")
            .with_max_tokens(50)
            .with_temperature(0.9);
        let result = executor.generate(&request).await.unwrap();

        assert_eq!(result.text(), "Silicon dreams hum");
        // Formatted prompt is 7 words, plus 4 generated pieces
        assert_eq!(result.tokens_used(), 11);
        assert!(result.processing_time() > Duration::ZERO);
        assert_eq!(result.model(), "phi-3-mini");
        assert_eq!(manager.status().inference_count, 1);

        assert_eq!(
            probe.last_prompt().as_deref(),
            Some("<|user|>\nWrite a haiku about technology<|end|>\n<|assistant|>\n")
        );
        let params = probe.last_params().unwrap();
        assert_eq!(params.max_tokens, 50);
        assert_eq!(params.temperature, 0.9);
        assert_eq!(params.top_p, DEFAULT_TOP_P);
    }

    #[tokio::test]
    async fn test_streaming_uses_word_count() {
        let splits: [&[&str]; 5] = [
            &["The", " quick", " brown", " fox "],
            &["The quick brown fox"],
            &["", "The ", "", "quick brown", "  ", " fox"],
            &["Th", "e qu", "ick bro", "wn f", "ox"],
            &["\n", "The\tquick", "\n\n", "brown", " ", "fox", "   "],
        ];

        for pieces in splits {
            let loader = MockLoader::new(chunks(pieces));
            let (executor, _, _) =
                executor_with(loader, ExecutorSettings::default(), true).await;

            let request = InferenceRequest::new("Tell me something").streaming(true);
            let result = executor.generate(&request).await.unwrap();
            let words: Vec<&str> = result.text().split_whitespace().collect();
            assert_eq!(words, ["The", "quick", "brown", "fox"], "{pieces:?}");
            assert_eq!(result.tokens_used(), 4, "{pieces:?}");
        }
    }

    #[tokio::test]
    async fn test_stop_sequence_is_not_returned() {
        let loader = MockLoader::new(chunks(&["Answer.", "<|end|>", "leaked"]));
        let (executor, _, _) = executor_with(loader, ExecutorSettings::default(), true).await;

        let result = executor.generate(&InferenceRequest::new("q")).await.unwrap();
        assert_eq!(result.text(), "Answer.");
    }

    #[tokio::test]
    async fn test_empty_prompt_never_reaches_model() {
        let (executor, manager, probe) =
            executor_with(MockLoader::canned(), ExecutorSettings::default(), true).await;

        let err = executor.generate(&InferenceRequest::new("")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert_eq!(probe.calls(), 0);
        assert_eq!(manager.status().inference_count, 0);
    }

    #[tokio::test]
    async fn test_generate_without_model_fails_fast() {
        let (executor, _, probe) =
            executor_with(MockLoader::canned(), ExecutorSettings::default(), false).await;

        let err = executor.generate(&InferenceRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, EngineError::ModelNotLoaded));
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_generate_after_unload() {
        let (executor, manager, _) =
            executor_with(MockLoader::canned(), ExecutorSettings::default(), true).await;
        executor.generate(&InferenceRequest::new("hello")).await.unwrap();

        manager.unload().await.unwrap();
        let err = executor.generate(&InferenceRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, EngineError::ModelNotLoaded));
    }

    #[tokio::test]
    async fn test_unload_waits_for_running_generation() {
        let loader = MockLoader::canned().with_latency(Duration::from_millis(200));
        let (executor, manager, probe) =
            executor_with(loader, ExecutorSettings::default(), true).await;

        let running = {
            let executor = executor.clone();
            tokio::spawn(async move {
                let request = InferenceRequest::new("in flight");
                executor.generate(&request).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(probe.calls(), 1);

        manager.unload().await.unwrap();

        // Unload was queued behind the running call, so it finished first
        let result = running.await.unwrap().unwrap();
        assert!(!result.text().is_empty());
        assert_eq!(manager.status().inference_count, 1);
        assert_eq!(probe.cancelled(), 0);
        assert!(!manager.is_loaded());
    }

    #[tokio::test]
    async fn test_dropped_caller_cancels_generation() {
        let loader = MockLoader::canned().with_latency(Duration::from_millis(400));
        let settings = ExecutorSettings {
            max_concurrent: 1,
            ..ExecutorSettings::default()
        };
        let (executor, manager, probe) = executor_with(loader, settings, true).await;

        let gone = {
            let executor = executor.clone();
            tokio::spawn(async move {
                let request = InferenceRequest::new("gone");
                executor.generate(&request).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        gone.abort();
        assert!(gone.await.unwrap_err().is_cancelled());

        let deadline = Instant::now() + Duration::from_secs(2);
        while probe.cancelled() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(probe.cancelled(), 1);
        // Let the worker drop the abandoned task and its permit
        tokio::time::sleep(Duration::from_millis(30)).await;

        let started = Instant::now();
        let result = executor.generate(&InferenceRequest::new("next")).await.unwrap();
        assert!(!result.text().is_empty());
        assert!(started.elapsed() < Duration::from_millis(700));
        assert_eq!(probe.calls(), 2);
        assert_eq!(probe.max_active(), 1);
        assert_eq!(manager.status().inference_count, 1);
    }

    #[tokio::test]
    async fn test_abandoned_call_holds_admission_slot() {
        let loader = MockLoader::canned().with_latency(Duration::from_millis(300));
        let settings = ExecutorSettings {
            max_concurrent: 2,
            ..ExecutorSettings::default()
        };
        let (executor, _, probe) = executor_with(loader, settings, true).await;

        let spawn_call = |prompt: &'static str| {
            let executor = executor.clone();
            tokio::spawn(async move {
                let request = InferenceRequest::new(prompt);
                executor.generate(&request).await
            })
        };
        let running = spawn_call("running");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let queued = spawn_call("queued");
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The queued task is still in the worker's channel with its permit
        queued.abort();
        let err = executor
            .generate(&InferenceRequest::new("third"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy { limit: 2 }));

        assert!(running.await.unwrap().is_ok());
        // Skipped on the worker without reaching the model
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_serialized_and_counted() {
        let loader = MockLoader::canned().with_latency(Duration::from_millis(20));
        let (executor, manager, probe) =
            executor_with(loader, ExecutorSettings::default(), true).await;

        let calls = (0..5).map(|i| {
            let executor = executor.clone();
            async move {
                let request = InferenceRequest::new(format!("request {i}"));
                executor.generate(&request).await
            }
        });
        let results = join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(manager.status().inference_count, 5);
        assert_eq!(probe.calls(), 5);
        assert_eq!(probe.max_active(), 1);
    }

    #[tokio::test]
    async fn test_rejects_beyond_admission_bound() {
        let loader = MockLoader::canned().with_latency(Duration::from_millis(200));
        let settings = ExecutorSettings {
            max_concurrent: 1,
            ..ExecutorSettings::default()
        };
        let (executor, _, _) = executor_with(loader, settings, true).await;

        let first = {
            let executor = executor.clone();
            tokio::spawn(async move {
                let request = InferenceRequest::new("first");
                executor.generate(&request).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let err = executor
            .generate(&InferenceRequest::new("second"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy { limit: 1 }));

        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_timeout_leaves_counter_untouched() {
        let loader = MockLoader::canned().with_latency(Duration::from_secs(2));
        let settings = ExecutorSettings {
            request_timeout: Duration::from_millis(50),
            ..ExecutorSettings::default()
        };
        let (executor, manager, _) = executor_with(loader, settings, true).await;

        let started = Instant::now();
        let err = executor.generate(&InferenceRequest::new("slow")).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(d) if d == Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(manager.status().inference_count, 0);
        assert!(manager.is_loaded());
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported() {
        let loader = MockLoader::new(MockScript::Fail("decode failed".to_string()));
        let (executor, manager, _) =
            executor_with(loader, ExecutorSettings::default(), true).await;

        let err = executor.generate(&InferenceRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailed(ref m) if m == "decode failed"));
        assert_eq!(manager.status().inference_count, 0);
    }

    #[tokio::test]
    async fn test_resolve_fills_defaults() {
        let (executor, _, _) =
            executor_with(MockLoader::canned(), ExecutorSettings::default(), false).await;

        let params = executor.resolve(&InferenceRequest::new("x"));
        assert_eq!(params.max_tokens, 512);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.stop, PromptTemplate::Phi3.stop_sequences());

        // Zero is a real value, not "unset"
        let params = executor.resolve(&InferenceRequest::new("x").with_temperature(0.0));
        assert_eq!(params.temperature, 0.0);
    }

    #[tokio::test]
    async fn test_template_selects_stop_sequences() {
        let settings = ExecutorSettings {
            template: PromptTemplate::ChatMl,
            ..ExecutorSettings::default()
        };
        let loader = MockLoader::new(chunks(&["Hi", "<|im_end|>", "more"]));
        let (executor, _, probe) = executor_with(loader, settings, true).await;

        let result = executor.generate(&InferenceRequest::new("hey")).await.unwrap();
        assert_eq!(result.text(), "Hi");
        assert!(probe.last_prompt().unwrap().starts_with("<|im_start|>user\n"));
    }
}
