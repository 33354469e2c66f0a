//! dq-core: Core types and the reasoning loop for doc-query
//!
//! This crate provides the message and completion contracts, the tool
//! abstraction and registry, and the bounded reasoning loop that drives
//! question answering over a mixed document/tabular corpus.

pub mod agent;
pub mod completion;
pub mod config;
pub mod error;
pub mod message;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{
    next_phase, AgentState, Citation, CitationLog, LoopConfig, LoopOutcome, LoopPhase,
    ReasoningLoop, DEFAULT_FINISH_TOOL,
};
pub use completion::{
    CompletionClient, CompletionRequest, CompletionResponse, FinishReason, ToolChoice,
};
pub use config::{EngineConfig, RetrievalSettings};
pub use error::Error;
pub use message::{Message, Role, ToolCall, Usage};
pub use tool::{
    ExecutionOutcome, PropertySchema, StatsSnapshot, Tool, ToolDefinition, ToolOutput,
    ToolParameters, ToolRegistry, ToolStats, DEFAULT_TOOL_TIMEOUT,
};

pub type Result<T> = std::result::Result<T, Error>;
