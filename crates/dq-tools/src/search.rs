//! Document search over the parent/child retriever.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use dq_core::{
    Citation, CitationLog, Error, PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters,
};
use dq_retrieval::{ParentChildRetriever, RetrievedContext};

const DEFAULT_K: usize = 5;
const EXCERPT_CHARS: usize = 200;

/// Searches the corpus via child-chunk similarity and answers with the
/// resolved parent passages. Every result is also recorded as a citation.
pub struct DocumentSearchTool {
    retriever: Arc<ParentChildRetriever>,
    citations: CitationLog,
}

impl DocumentSearchTool {
    pub fn new(retriever: Arc<ParentChildRetriever>, citations: CitationLog) -> Self {
        Self {
            retriever,
            citations,
        }
    }

    fn record_citation(&self, context: &RetrievedContext) {
        let excerpt: String = context.child_content.chars().take(EXCERPT_CHARS).collect();
        let source = context
            .hierarchy_path
            .first()
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        self.citations.record(Citation {
            excerpt,
            source,
            score: context.child_score,
        });
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    k: Option<usize>,
    #[serde(default)]
    section: Option<String>,
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        "search_documents"
    }

    fn description(&self) -> &str {
        "Search the document corpus for passages relevant to a query"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new()
                .add_property("query", PropertySchema::string("What to search for"), true)
                .add_property(
                    "k",
                    PropertySchema::integer("Number of passages to return (default 5)"),
                    false,
                )
                .add_property(
                    "section",
                    PropertySchema::string("Restrict results to a named document section"),
                    false,
                ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, Error> {
        let args: SearchArgs = serde_json::from_value(arguments)
            .map_err(|e| Error::tool("search_documents", format!("invalid arguments: {}", e)))?;
        let k = args.k.unwrap_or(DEFAULT_K).max(1);

        let results = match &args.section {
            Some(section) => {
                self.retriever
                    .retrieve_by_section(&args.query, section, k)
                    .await
            }
            None => self.retriever.retrieve(&args.query, k, None).await,
        };

        let results = match results {
            Ok(results) => results,
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };

        if results.is_empty() {
            return Ok(ToolOutput::success("No matching passages found."));
        }

        debug!(query = %args.query, results = results.len(), "search complete");

        let mut out = String::new();
        for (i, context) in results.iter().enumerate() {
            self.record_citation(context);
            let breadcrumb = context.hierarchy_path.join(" > ");
            let body = context
                .parent
                .as_ref()
                .map(|p| p.content.as_str())
                .unwrap_or(context.child_content.as_str());
            out.push_str(&format!(
                "[{}] {} (score {:.2})\n{}\n\n",
                i + 1,
                breadcrumb,
                context.child_score,
                body
            ));
        }

        Ok(ToolOutput::success(out.trim_end().to_string()))
    }
}
