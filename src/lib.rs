//! LLM-driven integration tester for the AISports scraping pipeline.
//!
//! - `Agent` loop that runs a test plan and returns a `TestReport`
//! - GCP adapters for Cloud Storage, Cloud Logging, Pub/Sub and Cloud Functions
//! - Pipeline tools exposed to the model with JSON schema validation
//! - Gemini adapter via `GoogleModel`

pub mod agent;
pub mod config;
pub mod error;
pub mod functions;
pub mod gcp;
pub mod llm;
pub mod logs;
pub mod policy;
pub mod pubsub;
pub mod storage;
pub mod tools;

pub use agent::{Agent, AgentBuilder, AgentConfig, AgentEvent, query, query_stream};
pub use config::GcpConfig;
pub use error::{AgentError, CloudError, ProviderError, SchemaError, ToolError};
pub use llm::{
    ChatModel, GoogleAuth, GoogleModel, GoogleModelConfig, ModelCompletion, ModelMessage,
    ModelToolCall, ModelToolChoice, ModelToolDefinition, ModelUsage,
};
pub use policy::{TestReport, Verdict};
pub use tools::pipeline::{PipelineServices, all_tools};
pub use tools::{DependencyMap, ToolOutcome, ToolSpec};
