// Host resource checks: startup memory floor and the health report

use std::time::{Duration, Instant};

use log::{info, warn};
use sysinfo::System;

use fusion_types::health::bytes_to_gb;
use fusion_types::{EngineError, HealthSnapshot, MemoryUsage, ModelStatus};

/// Startup is refused below this much available memory.
pub const MIN_STARTUP_MEMORY_GB: f64 = 2.0;

/// How long CPU usage is measured for each health poll.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

pub fn has_startup_headroom(available_bytes: u64) -> bool {
    available_bytes as f64 / BYTES_PER_GB as f64 >= MIN_STARTUP_MEMORY_GB
}

#[derive(Debug, Clone)]
pub struct ResourceGate {
    started: Instant,
    sample_window: Duration,
}

impl Default for ResourceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGate {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            sample_window: CPU_SAMPLE_WINDOW,
        }
    }

    /// Shorter windows give noisier CPU figures. sysinfo needs a minimum gap
    /// between refreshes, so the window never drops below it.
    pub fn with_sample_window(mut self, window: Duration) -> Self {
        self.sample_window = window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check_startup_resources(&self) -> bool {
        let mut sys = System::new();
        sys.refresh_memory();
        let available = sys.available_memory();
        let ok = has_startup_headroom(available);
        if ok {
            info!("Startup memory check passed: {:.2}GB available", bytes_to_gb(available));
        } else {
            warn!(
                "Insufficient memory: {:.2}GB available, {MIN_STARTUP_MEMORY_GB:.1}GB required",
                bytes_to_gb(available)
            );
        }
        ok
    }

    pub fn ensure_startup_resources(&self) -> Result<(), EngineError> {
        if self.check_startup_resources() {
            return Ok(());
        }
        let mut sys = System::new();
        sys.refresh_memory();
        Err(EngineError::InsufficientResources {
            available_gb: bytes_to_gb(sys.available_memory()),
            required_gb: MIN_STARTUP_MEMORY_GB,
        })
    }

    /// Fresh memory and CPU reading combined with the model status. The CPU
    /// window is slept out on a blocking thread.
    pub async fn snapshot(&self, model_info: ModelStatus) -> HealthSnapshot {
        let window = self.sample_window;
        let (memory, cpu) = match tokio::task::spawn_blocking(move || sample_host(window)).await
        {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Host sampling failed: {e}");
                (MemoryUsage::from_bytes(0, 0, 0), 0.0)
            }
        };

        HealthSnapshot::new(memory, cpu, self.uptime().as_secs_f64(), model_info)
    }
}

fn sample_host(window: Duration) -> (MemoryUsage, f32) {
    let mut sys = System::new();
    sys.refresh_memory();
    let memory = MemoryUsage::from_bytes(
        sys.total_memory(),
        sys.available_memory(),
        sys.used_memory(),
    );

    // CPU usage is the delta between two refreshes
    sys.refresh_cpu_usage();
    std::thread::sleep(window);
    sys.refresh_cpu_usage();
    let cpu = (sys.global_cpu_usage() * 10.0).round() / 10.0;

    (memory, cpu)
}
