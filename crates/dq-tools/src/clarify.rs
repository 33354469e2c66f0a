//! Single-shot clarification of ambiguous request parameters.
//!
//! `resolve` is total: it either returns what the model decided or a fixed,
//! deterministic default parameter set. There is no error channel; callers
//! always get usable parameters.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use dq_core::{
    CompletionClient, CompletionRequest, Error, Message, PropertySchema, Tool, ToolDefinition,
    ToolOutput, ToolParameters,
};

const CLARIFY_PROMPT: &str = "You resolve ambiguities in data-analysis requests. Respond with a \
single JSON object with the fields: decision (short label), parameters (object of concrete \
parameter values), reasoning (one or two sentences), and optionally sql_hint (a SQL fragment). \
No other text.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarification {
    pub decision: String,
    pub parameters: serde_json::Value,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_hint: Option<String>,
}

impl Clarification {
    /// The guaranteed fallback: bounded result count, descending order,
    /// most-recent-data preference.
    pub fn fallback() -> Self {
        Self {
            decision: "use_defaults".to_string(),
            parameters: json!({
                "limit": 10,
                "order": "descending",
                "prefer_recent": true,
            }),
            reasoning: "Could not resolve the ambiguity; applying bounded defaults.".to_string(),
            sql_hint: None,
        }
    }
}

/// Two success variants, no failure variant: the resolver either got an
/// answer from the model or fell back to defaults.
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(Clarification),
    Defaulted(Clarification),
}

impl Resolution {
    pub fn clarification(&self) -> &Clarification {
        match self {
            Resolution::Resolved(c) | Resolution::Defaulted(c) => c,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Resolution::Defaulted(_))
    }
}

pub struct ClarificationResolver {
    client: Arc<dyn CompletionClient>,
    model: Option<String>,
}

impl ClarificationResolver {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// One synchronous structured-output call; any transport or parse
    /// failure yields the fixed fallback instead of propagating.
    pub async fn resolve(&self, description: &str, context: &str) -> Resolution {
        let user = format!("Uncertainty: {}\n\nContext: {}", description, context);
        let mut request =
            CompletionRequest::new(vec![Message::system(CLARIFY_PROMPT), Message::user(user)])
                .with_max_tokens(500);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        match self.client.complete(request).await {
            Ok(response) => match parse_clarification(&response.message.content) {
                Some(clarification) => {
                    debug!(decision = %clarification.decision, "ambiguity resolved");
                    Resolution::Resolved(clarification)
                }
                None => {
                    debug!("malformed clarification output; using defaults");
                    Resolution::Defaulted(Clarification::fallback())
                }
            },
            Err(e) => {
                warn!(error = %e, "clarification call failed; using defaults");
                Resolution::Defaulted(Clarification::fallback())
            }
        }
    }
}

/// The model may wrap its JSON in prose or code fences; take the outermost
/// braces and parse what's between them.
fn parse_clarification(text: &str) -> Option<Clarification> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Tool face of the resolver, for tools (and the model) that want an
/// ambiguity settled mid-query.
pub struct ClarifyTool {
    resolver: ClarificationResolver,
}

impl ClarifyTool {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            resolver: ClarificationResolver::new(client),
        }
    }
}

#[derive(Deserialize)]
struct ClarifyArgs {
    description: String,
    #[serde(default)]
    context: Option<String>,
}

#[async_trait]
impl Tool for ClarifyTool {
    fn name(&self) -> &str {
        "clarify_request"
    }

    fn description(&self) -> &str {
        "Resolve an ambiguous request into concrete parameters"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new()
                .add_property(
                    "description",
                    PropertySchema::string("What is ambiguous about the request"),
                    true,
                )
                .add_property(
                    "context",
                    PropertySchema::string("Surrounding context for the ambiguity"),
                    false,
                ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, Error> {
        let args: ClarifyArgs = serde_json::from_value(arguments)
            .map_err(|e| Error::tool("clarify_request", format!("invalid arguments: {}", e)))?;

        let resolution = self
            .resolver
            .resolve(&args.description, args.context.as_deref().unwrap_or(""))
            .await;

        let payload = json!({
            "resolved": !resolution.is_defaulted(),
            "clarification": resolution.clarification(),
        });
        Ok(ToolOutput::success(payload.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dq_core::testing::MockClient;

    #[tokio::test]
    async fn test_resolve_well_formed_output() {
        let client = Arc::new(MockClient::new());
        client.queue_text(
            r#"{"decision": "last_quarter", "parameters": {"quarter": "Q3"}, "reasoning": "Most recent complete quarter.", "sql_hint": "WHERE quarter = 'Q3'"}"#,
        );

        let resolver = ClarificationResolver::new(client);
        let resolution = resolver.resolve("which quarter?", "user asked about revenue").await;

        assert!(!resolution.is_defaulted());
        let c = resolution.clarification();
        assert_eq!(c.decision, "last_quarter");
        assert_eq!(c.parameters["quarter"], "Q3");
        assert_eq!(c.sql_hint.as_deref(), Some("WHERE quarter = 'Q3'"));
    }

    #[tokio::test]
    async fn test_resolve_fenced_output() {
        let client = Arc::new(MockClient::new());
        client.queue_text(
            "Here you go:\n```json\n{\"decision\": \"top_n\", \"parameters\": {\"n\": 5}, \"reasoning\": \"Five is typical.\"}\n```",
        );

        let resolver = ClarificationResolver::new(client);
        let resolution = resolver.resolve("how many results?", "").await;
        assert!(!resolution.is_defaulted());
        assert_eq!(resolution.clarification().decision, "top_n");
    }

    #[tokio::test]
    async fn test_resolve_malformed_output_defaults() {
        let client = Arc::new(MockClient::new());
        client.queue_text("I'm not sure what you mean.");

        let resolver = ClarificationResolver::new(client);
        let resolution = resolver.resolve("ambiguous thing", "").await;

        assert!(resolution.is_defaulted());
        let c = resolution.clarification();
        assert_eq!(c.decision, "use_defaults");
        assert_eq!(c.parameters["limit"], 10);
        assert_eq!(c.parameters["order"], "descending");
        assert_eq!(c.parameters["prefer_recent"], true);
    }

    #[tokio::test]
    async fn test_resolve_transport_failure_defaults() {
        let client = Arc::new(MockClient::new());
        // nothing queued: complete() errors

        let resolver = ClarificationResolver::new(client);
        let resolution = resolver.resolve("anything", "").await;
        assert!(resolution.is_defaulted());
    }

    #[tokio::test]
    async fn test_clarify_tool_payload() {
        let client = Arc::new(MockClient::new());
        client.queue_text(r#"{"decision": "ok", "parameters": {}, "reasoning": "fine"}"#);

        let tool = ClarifyTool::new(client);
        let output = tool
            .execute(json!({"description": "which table?"}))
            .await
            .unwrap();

        assert!(!output.is_error);
        let parsed: serde_json::Value = serde_json::from_str(&output.content).unwrap();
        assert_eq!(parsed["resolved"], true);
        assert_eq!(parsed["clarification"]["decision"], "ok");
    }
}
