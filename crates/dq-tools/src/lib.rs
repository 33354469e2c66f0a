//! dq-tools: Built-in tools for the doc-query reasoning loop
//!
//! - Search: parent/child retrieval over the document corpus
//! - SQL: read-only queries against the tabular datasets
//! - Clarify: single-shot resolution of ambiguous parameters
//! - Finish: the terminal capability carrying the final answer

pub mod clarify;
pub mod finish;
pub mod search;
pub mod sql;

use std::sync::Arc;

use dq_core::{CitationLog, CompletionClient, Error, Tool, ToolRegistry};
use dq_retrieval::ParentChildRetriever;

pub use clarify::{Clarification, ClarificationResolver, ClarifyTool, Resolution};
pub use finish::FinalAnswerTool;
pub use search::DocumentSearchTool;
pub use sql::{validate_read_only, QueryDataTool, SqlEngine, SqlResult};

pub fn create_search_tool(
    retriever: Arc<ParentChildRetriever>,
    citations: CitationLog,
) -> Box<dyn Tool> {
    Box::new(DocumentSearchTool::new(retriever, citations))
}

pub fn create_sql_tool(engine: Arc<dyn SqlEngine>) -> Box<dyn Tool> {
    Box::new(QueryDataTool::new(engine))
}

pub fn create_clarify_tool(client: Arc<dyn CompletionClient>) -> Box<dyn Tool> {
    Box::new(ClarifyTool::new(client))
}

pub fn create_finish_tool() -> Box<dyn Tool> {
    Box::new(FinalAnswerTool)
}

/// Register the default toolset into a freshly built registry. Duplicate
/// names surface as startup errors, as registration should.
pub fn register_default_tools(
    registry: &mut ToolRegistry,
    retriever: Arc<ParentChildRetriever>,
    engine: Arc<dyn SqlEngine>,
    client: Arc<dyn CompletionClient>,
    citations: CitationLog,
) -> Result<(), Error> {
    registry.register(create_search_tool(retriever, citations))?;
    registry.register(create_sql_tool(engine))?;
    registry.register(create_clarify_tool(client))?;
    registry.register(create_finish_tool())?;
    Ok(())
}
