//! Neural Stream Fusion Engine: an HTTP completion service over one
//! locally loaded language model.
//!
//! The model lives behind a single-owner worker ([`web::ModelLifecycleManager`]),
//! requests are admitted and bounded by [`web::InferenceExecutor`], and host
//! health comes from [`web::ResourceGate`]. Shared wire types are in the
//! `fusion-types` crate and re-exported here.

pub mod web;

pub use fusion_types::{
    EngineError, ErrorBody, GenerateResponse, HealthSnapshot, HealthStatus, InferenceRequest,
    InferenceResult, MemoryUsage, ModelPhase, ModelStatus, ServiceInfo,
};
