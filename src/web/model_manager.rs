//! Model lifecycle manager.
//!
//! A single worker task owns the loaded model. Load, unload and inference are
//! submitted as commands over a bounded MPSC channel and processed one at a
//! time, with the CPU-bound part moved to `spawn_blocking`. Callers never
//! touch the model directly, so an inference can never overlap a load or an
//! unload, and `status()` stays readable while the worker is busy.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot};

use fusion_types::{EngineError, ModelPhase, ModelStatus};

use super::models::{LanguageModel, LoadRequest, ModelLoader};

/// Work item run against the loaded model on a blocking thread.
pub type ModelTask = Box<dyn FnOnce(&mut dyn LanguageModel) + Send>;

pub type SharedModelManager = Arc<ModelLifecycleManager>;

enum ModelCommand {
    Load {
        request: LoadRequest,
        reply: oneshot::Sender<Result<Duration, EngineError>>,
    },
    Unload {
        reply: oneshot::Sender<()>,
    },
    Run {
        task: ModelTask,
        /// Sent once the task finished (or could not start) and the status
        /// reflects the outcome.
        done: oneshot::Sender<Result<(), EngineError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// State shared between the handle and the worker. Only the worker writes.
#[derive(Debug, Default)]
struct LifecycleState {
    phase: ModelPhase,
    model_path: Option<PathBuf>,
    context_length: Option<u32>,
    load_time: Option<Duration>,
    error: Option<String>,
}

pub struct ModelLifecycleManager {
    tx: mpsc::Sender<ModelCommand>,
    state: Arc<RwLock<LifecycleState>>,
    inference_count: AtomicU64,
}

impl ModelLifecycleManager {
    /// Create the manager and spawn its worker. Must be called inside a tokio runtime.
    pub fn spawn(loader: Arc<dyn ModelLoader>, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<ModelCommand>(queue_capacity.max(1));
        let state = Arc::new(RwLock::new(LifecycleState::default()));

        tokio::spawn(model_worker(rx, loader, state.clone()));

        Self {
            tx,
            state,
            inference_count: AtomicU64::new(0),
        }
    }

    /// Load the model at `path`. Returns how long the load took.
    pub async fn load(
        &self,
        path: impl Into<PathBuf>,
        context_length: u32,
    ) -> Result<Duration, EngineError> {
        let phase = self.phase();
        if matches!(phase, ModelPhase::Loading | ModelPhase::Loaded) {
            return Err(EngineError::InvalidTransition {
                action: "load",
                from: phase,
            });
        }

        let (reply, rx) = oneshot::channel();
        let request = LoadRequest {
            model_path: path.into(),
            context_length,
        };
        self.submit(ModelCommand::Load { request, reply }).await?;
        rx.await.map_err(|_| EngineError::WorkerStopped)?
    }

    /// Release the model. A no-op when nothing is loaded.
    pub async fn unload(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ModelCommand::Unload { reply }).await?;
        rx.await.map_err(|_| EngineError::WorkerStopped)
    }

    /// Snapshot of the lifecycle state. Never waits on the worker.
    pub fn status(&self) -> ModelStatus {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        ModelStatus {
            is_loaded: state.phase == ModelPhase::Loaded,
            state: state.phase,
            model_path: state
                .model_path
                .as_ref()
                .map(|p| p.display().to_string()),
            load_time: state.load_time.map(|d| d.as_secs_f64()),
            inference_count: self.inference_count(),
            context_length: state.context_length,
            error: state.error.clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.phase() == ModelPhase::Loaded
    }

    pub fn inference_count(&self) -> u64 {
        self.inference_count.load(Ordering::SeqCst)
    }

    /// Count one completed inference. Returns the new total.
    pub fn record_inference(&self) -> u64 {
        self.inference_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run `f` against the loaded model on a blocking thread, after every
    /// command queued before it.
    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LanguageModel) -> T + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let task: ModelTask = Box::new(move |model| {
            // Caller may have timed out and dropped the receiver
            let _ = result_tx.send(f(model));
        });

        let (done, done_rx) = oneshot::channel();
        self.submit(ModelCommand::Run { task, done }).await?;

        match done_rx.await {
            Ok(Ok(())) => result_rx.await.map_err(|_| {
                EngineError::GenerationFailed("model task produced no result".to_string())
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::WorkerStopped),
        }
    }

    /// Unload the model and stop the worker. Later calls fail with `WorkerStopped`.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.submit(ModelCommand::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    fn phase(&self) -> ModelPhase {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .phase
    }

    async fn submit(&self, command: ModelCommand) -> Result<(), EngineError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| EngineError::WorkerStopped)
    }
}

fn update_state(state: &RwLock<LifecycleState>, apply: impl FnOnce(&mut LifecycleState)) {
    let mut guard = state.write().unwrap_or_else(|p| p.into_inner());
    apply(&mut guard);
}

/// Long-lived task that owns the model and handles commands in order.
async fn model_worker(
    mut rx: mpsc::Receiver<ModelCommand>,
    loader: Arc<dyn ModelLoader>,
    state: Arc<RwLock<LifecycleState>>,
) {
    let mut model: Option<Box<dyn LanguageModel>> = None;

    while let Some(command) = rx.recv().await {
        match command {
            ModelCommand::Load { request, reply } => {
                let result = handle_load(&mut model, &loader, &state, request).await;
                let _ = reply.send(result);
            }
            ModelCommand::Unload { reply } => {
                release(&mut model, &state).await;
                let _ = reply.send(());
            }
            ModelCommand::Run { task, done } => {
                let result = handle_run(&mut model, &state, task).await;
                let _ = done.send(result);
            }
            ModelCommand::Shutdown { reply } => {
                release(&mut model, &state).await;
                info!("Model worker stopped");
                let _ = reply.send(());
                break;
            }
        }
    }
}

async fn handle_load(
    model: &mut Option<Box<dyn LanguageModel>>,
    loader: &Arc<dyn ModelLoader>,
    state: &RwLock<LifecycleState>,
    request: LoadRequest,
) -> Result<Duration, EngineError> {
    // A second load queued behind a successful one
    if model.is_some() {
        return Err(EngineError::InvalidTransition {
            action: "load",
            from: ModelPhase::Loaded,
        });
    }

    update_state(state, |s| {
        s.phase = ModelPhase::Loading;
        s.model_path = Some(request.model_path.clone());
        s.context_length = Some(request.context_length);
        s.load_time = None;
        s.error = None;
    });
    info!(
        "Loading model from {} (context length {})",
        request.model_path.display(),
        request.context_length
    );

    let loader = loader.clone();
    let started = Instant::now();
    let joined = tokio::task::spawn_blocking(move || loader.load(&request)).await;
    let elapsed = started.elapsed();

    let outcome = match joined {
        Ok(Ok(loaded)) => Ok(loaded),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(format!("loader panicked: {e}")),
    };

    match outcome {
        Ok(loaded) => {
            *model = Some(loaded);
            update_state(state, |s| {
                s.phase = ModelPhase::Loaded;
                s.load_time = Some(elapsed);
            });
            info!("Model loaded in {:.2}s", elapsed.as_secs_f64());
            Ok(elapsed)
        }
        Err(message) => {
            error!("Model load failed: {message}");
            update_state(state, |s| {
                s.phase = ModelPhase::Failed;
                s.error = Some(message.clone());
            });
            Err(EngineError::ModelLoadFailed(message))
        }
    }
}

async fn handle_run(
    model: &mut Option<Box<dyn LanguageModel>>,
    state: &RwLock<LifecycleState>,
    task: ModelTask,
) -> Result<(), EngineError> {
    let Some(mut instance) = model.take() else {
        return Err(EngineError::ModelNotLoaded);
    };

    let joined = tokio::task::spawn_blocking(move || {
        task(instance.as_mut());
        instance
    })
    .await;

    match joined {
        Ok(instance) => {
            *model = Some(instance);
            Ok(())
        }
        Err(e) => {
            // The instance unwound with the task and is gone
            let message = format!("model panicked during generation: {e}");
            error!("{message}");
            update_state(state, |s| {
                s.phase = ModelPhase::Failed;
                s.load_time = None;
                s.error = Some(message.clone());
            });
            Err(EngineError::GenerationFailed(message))
        }
    }
}

/// Drop the model on a blocking thread and reset to Unloaded.
async fn release(model: &mut Option<Box<dyn LanguageModel>>, state: &RwLock<LifecycleState>) {
    if let Some(instance) = model.take() {
        if let Err(e) = tokio::task::spawn_blocking(move || drop(instance)).await {
            warn!("Model release panicked: {e}");
        }
        info!("Model unloaded");
    }

    update_state(state, |s| *s = LifecycleState::default());
}
