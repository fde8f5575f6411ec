//! Server configuration.
//!
//! Every setting comes from an environment variable and can be overridden by
//! the matching command-line flag. Invalid values stop startup with a clap
//! error instead of falling back to a default.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;

use fusion_types::request::MAX_TEMPERATURE;

use super::chat::{ExecutorSettings, GenerationDefaults, PromptTemplate};
#[cfg(feature = "llama")]
use super::llama_backend::LlamaLoadOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SystemMode {
    /// Pretty JSON, module targets and request bodies in the log
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "nsf-server", version, about = "Neural Stream Fusion inference server")]
pub struct ServerConfig {
    #[arg(long, env = "SYSTEM_MODE", value_enum, default_value = "development")]
    pub system_mode: SystemMode,

    /// Log filter (OFF, ERROR, WARN, INFO, DEBUG, TRACE)
    #[arg(long, env = "LOG_LEVEL", default_value = "INFO")]
    pub log_level: LevelFilter,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[arg(long = "api-host", env = "API_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long = "api-port", env = "API_PORT", default_value_t = 8000)]
    pub port: u16,

    /// GGUF model file loaded at startup
    #[arg(
        long,
        env = "MODEL_PATH",
        default_value = "./models/phi-3-mini-4k-instruct-q4.gguf"
    )]
    pub model_path: PathBuf,

    #[arg(
        long = "model-context-length",
        env = "MODEL_CONTEXT_LENGTH",
        default_value_t = 4096,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub context_length: u32,

    /// Default max tokens when a request sets none
    #[arg(
        long = "model-max-tokens",
        env = "MODEL_MAX_TOKENS",
        default_value_t = 512,
        value_parser = clap::value_parser!(u32).range(1..=2048)
    )]
    pub max_tokens: u32,

    #[arg(
        long = "model-temperature",
        env = "MODEL_TEMPERATURE",
        default_value_t = 0.7,
        value_parser = parse_temperature
    )]
    pub temperature: f32,

    #[arg(
        long = "model-top-p",
        env = "MODEL_TOP_P",
        default_value_t = 0.9,
        value_parser = parse_top_p
    )]
    pub top_p: f32,

    /// Name reported as `model` in generate responses
    #[arg(long = "model-label", env = "MODEL_LABEL", default_value = "phi-3-mini")]
    pub model_label: String,

    /// Role delimiters wrapped around each prompt
    #[arg(long = "prompt-template", env = "PROMPT_TEMPLATE", value_enum, default_value = "phi3")]
    pub template: PromptTemplate,

    /// Layers offloaded to the GPU (0 = CPU only)
    #[arg(long = "model-gpu-layers", env = "MODEL_GPU_LAYERS", default_value_t = 0)]
    pub gpu_layers: u32,

    #[arg(
        long = "model-use-mlock",
        env = "MODEL_USE_MLOCK",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub use_mlock: bool,

    /// Inference threads (defaults to the number of physical cores)
    #[arg(long = "model-threads", env = "MODEL_THREADS")]
    pub threads: Option<NonZeroUsize>,

    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value = "5")]
    pub max_concurrent_requests: NonZeroUsize,

    /// Seconds allowed per inference call
    #[arg(
        long,
        env = "REQUEST_TIMEOUT",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout: u64,
}

fn parse_temperature(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=MAX_TEMPERATURE).contains(&value) {
        Ok(value)
    } else {
        Err(format!("must be between 0.0 and {MAX_TEMPERATURE}"))
    }
}

fn parse_top_p(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err("must be between 0.0 and 1.0".to_string())
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn is_development(&self) -> bool {
        self.system_mode == SystemMode::Development
    }

    pub fn inference_threads(&self) -> usize {
        self.threads
            .map(NonZeroUsize::get)
            .unwrap_or_else(num_cpus::get_physical)
    }

    pub fn generation_defaults(&self) -> GenerationDefaults {
        GenerationDefaults {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            defaults: self.generation_defaults(),
            template: self.template,
            model_label: self.model_label.clone(),
            max_concurrent: self.max_concurrent_requests.get(),
            request_timeout: self.request_timeout(),
        }
    }

    #[cfg(feature = "llama")]
    pub fn llama_options(&self) -> LlamaLoadOptions {
        LlamaLoadOptions {
            gpu_layers: self.gpu_layers,
            use_mlock: self.use_mlock,
            threads: self.inference_threads(),
        }
    }
}
