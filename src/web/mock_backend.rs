// Scripted in-process model backend.
//
// Stands in for llama.cpp in tests and in `--features mock` builds, so the
// whole service can run without model weights.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::chat::StopScanner;
use super::models::{
    CancellationFlag, Completion, LanguageModel, LoadRequest, ModelLoader, SamplingParams,
};

const CANCEL_POLL: Duration = Duration::from_millis(5);

const CANNED_REPLY: &str =
    "Silicon minds awaken, circuits hum in quiet light, code becomes the dawn.";

/// What the mock model "generates".
#[derive(Debug, Clone)]
pub enum MockScript {
    /// Emit these pieces in order, one per token.
    Chunks(Vec<String>),
    /// Repeat the prompt back word by word.
    Echo,
    /// Fail every generation with this message.
    Fail(String),
}

/// Shared counters for asserting on what reached the model.
#[derive(Debug, Default)]
pub struct MockProbe {
    calls: AtomicUsize,
    loads: AtomicUsize,
    cancelled: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_params: Mutex<Option<SamplingParams>>,
    fail_load: Mutex<Option<String>>,
}

impl MockProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Generations that saw the cancel flag and bailed out.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Highest number of generations that ever ran at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }

    pub fn last_params(&self) -> Option<SamplingParams> {
        self.last_params.lock().ok().and_then(|p| p.clone())
    }

    /// Make subsequent loads fail with `message`, or succeed with `None`.
    pub fn set_fail_load(&self, message: Option<&str>) {
        if let Ok(mut guard) = self.fail_load.lock() {
            *guard = message.map(str::to_string);
        }
    }

    fn load_failure(&self) -> Option<String> {
        self.fail_load.lock().ok().and_then(|f| f.clone())
    }

    fn enter(&self, prompt: &str, params: &SamplingParams) -> ActiveGuard<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_prompt.lock() {
            *guard = Some(prompt.to_string());
        }
        if let Ok(mut guard) = self.last_params.lock() {
            *guard = Some(params.clone());
        }
        ActiveGuard(self)
    }
}

struct ActiveGuard<'a>(&'a MockProbe);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockLoader {
    script: MockScript,
    load_delay: Duration,
    latency: Duration,
    probe: Arc<MockProbe>,
}

impl MockLoader {
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            load_delay: Duration::from_millis(1),
            latency: Duration::ZERO,
            probe: Arc::new(MockProbe::default()),
        }
    }

    pub fn echo() -> Self {
        Self::new(MockScript::Echo)
    }

    /// Fixed reply, independent of the prompt.
    pub fn canned() -> Self {
        Self::new(MockScript::Chunks(
            CANNED_REPLY
                .split_inclusive(' ')
                .map(str::to_string)
                .collect(),
        ))
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Time each generation takes before producing output.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_with(self, message: &str) -> Self {
        self.probe.set_fail_load(Some(message));
        self
    }

    pub fn probe(&self) -> Arc<MockProbe> {
        self.probe.clone()
    }
}

impl ModelLoader for MockLoader {
    fn load(&self, _request: &LoadRequest) -> Result<Box<dyn LanguageModel>, String> {
        std::thread::sleep(self.load_delay);
        self.probe.loads.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.probe.load_failure() {
            return Err(message);
        }

        Ok(Box::new(MockModel {
            script: self.script.clone(),
            latency: self.latency,
            probe: self.probe.clone(),
        }))
    }
}

struct MockModel {
    script: MockScript,
    latency: Duration,
    probe: Arc<MockProbe>,
}

impl MockModel {
    fn check_cancel(&self, cancel: &CancellationFlag) -> Result<(), String> {
        if cancel.load(Ordering::SeqCst) {
            self.probe.cancelled.fetch_add(1, Ordering::SeqCst);
            return Err("generation cancelled".to_string());
        }
        Ok(())
    }

    /// Sleep out the latency, bailing early when cancelled.
    fn wait(&self, cancel: &CancellationFlag) -> Result<(), String> {
        let deadline = Instant::now() + self.latency;
        while Instant::now() < deadline {
            self.check_cancel(cancel)?;
            std::thread::sleep(CANCEL_POLL);
        }
        Ok(())
    }

    fn pieces(&self, prompt: &str) -> Result<Vec<String>, String> {
        match &self.script {
            MockScript::Chunks(chunks) => Ok(chunks.clone()),
            MockScript::Echo => Ok(prompt
                .split_whitespace()
                .enumerate()
                .map(|(i, w)| if i == 0 { w.to_string() } else { format!(" {w}") })
                .collect()),
            MockScript::Fail(message) => Err(message.clone()),
        }
    }

    /// Produce up to `max_tokens` pieces, stopping at any stop sequence.
    fn generate(
        &self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationFlag,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<usize, String> {
        let _active = self.probe.enter(prompt, params);
        self.wait(cancel)?;

        let mut scanner = StopScanner::new(&params.stop);
        let mut produced = 0;
        for piece in self.pieces(prompt)?.iter().take(params.max_tokens as usize) {
            self.check_cancel(cancel)?;
            produced += 1;
            let step = scanner.push(piece);
            if !step.emit.is_empty() {
                on_chunk(&step.emit);
            }
            if step.should_stop {
                return Ok(produced);
            }
        }

        let rest = scanner.finish();
        if !rest.is_empty() {
            on_chunk(&rest);
        }
        Ok(produced)
    }
}

impl LanguageModel for MockModel {
    fn complete(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationFlag,
    ) -> Result<Completion, String> {
        let mut text = String::new();
        let produced =
            self.generate(prompt, params, cancel, &mut |chunk: &str| text.push_str(chunk))?;
        Ok(Completion {
            text,
            total_tokens: (prompt.split_whitespace().count() + produced) as u64,
        })
    }

    fn complete_streaming(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
        cancel: &CancellationFlag,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<(), String> {
        self.generate(prompt, params, cancel, on_chunk).map(|_| ())
    }
}
