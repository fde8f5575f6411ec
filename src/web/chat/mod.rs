// Chat module
//
// Everything between a validated request and the model:
// - templates.rs: Role delimiters per model family (Phi-3, ChatML, Llama3, Mistral, Gemma)
// - stop_conditions.rs: Stop sequence scanning over streamed pieces
// - generation.rs: The inference executor (admission, timeout, result normalization)

mod generation;
mod stop_conditions;
mod templates;

pub use generation::{
    approximate_token_count, ExecutorSettings, GenerationDefaults, InferenceExecutor,
    DEFAULT_TOP_P,
};
pub use stop_conditions::{StopConditionResult, StopScanner};
pub use templates::PromptTemplate;
