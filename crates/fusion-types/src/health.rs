// Host health report types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::status::ModelStatus;

/// Memory or CPU usage at or above this percentage flags the host as "warning".
pub const WARNING_THRESHOLD_PERCENT: f32 = 90.0;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
}

impl HealthStatus {
    pub fn classify(memory_percent: f32, cpu_percent: f32) -> Self {
        if memory_percent >= WARNING_THRESHOLD_PERCENT || cpu_percent >= WARNING_THRESHOLD_PERCENT {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Memory figures in GB rounded to two decimals, plus the used percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_gb: f64,
    pub available_gb: f64,
    pub used_gb: f64,
    pub percent: f32,
}

impl MemoryUsage {
    /// Percent is derived from total and available, so memory held by caches
    /// that the OS can reclaim does not count as pressure.
    pub fn from_bytes(total: u64, available: u64, used: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            let pressured = total.saturating_sub(available) as f64;
            ((pressured / total as f64) * 1000.0).round() as f32 / 10.0
        };

        Self {
            total_gb: bytes_to_gb(total),
            available_gb: bytes_to_gb(available),
            used_gb: bytes_to_gb(used),
            percent,
        }
    }
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_GB * 100.0).round() / 100.0
}

/// Health report returned by `GET /health`. Built fresh on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub model_loaded: bool,
    pub memory_usage: MemoryUsage,
    pub cpu_usage: f32,
    /// Seconds since the process started.
    pub uptime: f64,
    pub model_info: ModelStatus,
    pub timestamp: DateTime<Local>,
}

impl HealthSnapshot {
    pub fn new(memory: MemoryUsage, cpu_usage: f32, uptime: f64, model_info: ModelStatus) -> Self {
        Self {
            status: HealthStatus::classify(memory.percent, cpu_usage),
            model_loaded: model_info.is_loaded,
            memory_usage: memory,
            cpu_usage,
            uptime,
            model_info,
            timestamp: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(HealthStatus::classify(10.0, 10.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::classify(89.9, 89.9), HealthStatus::Healthy);
        assert_eq!(HealthStatus::classify(90.0, 0.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(0.0, 90.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(99.0, 99.0), HealthStatus::Warning);
    }

    #[test]
    fn test_classify_exhaustive_grid() {
        for mem in (0..=100).step_by(5) {
            for cpu in (0..=100).step_by(5) {
                let expected = if mem >= 90 || cpu >= 90 {
                    HealthStatus::Warning
                } else {
                    HealthStatus::Healthy
                };
                assert_eq!(HealthStatus::classify(mem as f32, cpu as f32), expected);
            }
        }
    }

    #[test]
    fn test_memory_usage_from_bytes() {
        let gb = 1024 * 1024 * 1024;
        let usage = MemoryUsage::from_bytes(16 * gb, 4 * gb, 11 * gb);
        assert_eq!(usage.total_gb, 16.0);
        assert_eq!(usage.available_gb, 4.0);
        assert_eq!(usage.used_gb, 11.0);
        assert_eq!(usage.percent, 75.0);
    }

    #[test]
    fn test_memory_usage_empty_host() {
        let usage = MemoryUsage::from_bytes(0, 0, 0);
        assert_eq!(usage.percent, 0.0);
    }

    #[test]
    fn test_snapshot_serializes_lowercase_status() {
        let gb = 1024 * 1024 * 1024;
        let snapshot = HealthSnapshot::new(
            MemoryUsage::from_bytes(10 * gb, gb / 2, 9 * gb),
            12.5,
            42.0,
            ModelStatus::unloaded(),
        );
        assert_eq!(snapshot.status, HealthStatus::Warning);
        assert!(!snapshot.model_loaded);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "warning");
        assert_eq!(json["memory_usage"]["total_gb"], 10.0);
        assert_eq!(json["model_info"]["is_loaded"], false);
    }
}
