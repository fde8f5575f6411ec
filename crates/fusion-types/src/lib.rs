//! Shared types for the Neural Stream Fusion Engine.
//!
//! Everything that crosses the HTTP boundary or is shared between the model
//! lifecycle, the executor and the resource gate lives here, so the server
//! crate and any client tooling agree on one wire format.

pub mod errors;
pub mod health;
pub mod request;
pub mod response;
pub mod status;

pub use errors::EngineError;
pub use health::{HealthSnapshot, HealthStatus, MemoryUsage};
pub use request::{InferenceRequest, InferenceResult};
pub use response::{ErrorBody, GenerateResponse, ServiceInfo};
pub use status::{ModelPhase, ModelStatus};
