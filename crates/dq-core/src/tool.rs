//! Tool abstraction and the capability registry.
//!
//! Tools are registered once at startup into an explicitly constructed
//! `ToolRegistry` that the reasoning loop is handed; there is no process-wide
//! registry. Every invocation goes through `ToolRegistry::execute`, which
//! validates arguments, races the tool against a timeout, and converts every
//! failure into data rather than letting it cross the tool boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Error;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ToolParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ToolParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// JSON-schema-like parameter declaration, shared between the model-facing
/// tool schema and the registry's pre-dispatch validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties", default)]
    pub additional_properties: bool,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }
}

impl ToolParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(
        mut self,
        name: impl Into<String>,
        schema: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    fn typed(schema_type: &str, description: impl Into<String>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description: Some(description.into()),
            enum_values: None,
            items: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::typed("integer", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::typed("number", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::typed("boolean", description)
    }

    pub fn array(description: impl Into<String>, items: PropertySchema) -> Self {
        let mut schema = Self::typed("array", description);
        schema.items = Some(Box::new(items));
        schema
    }

    pub fn enum_string(description: impl Into<String>, values: Vec<String>) -> Self {
        let mut schema = Self::typed("string", description);
        schema.enum_values = Some(values);
        schema
    }

    /// Whether `value` matches this property's declared JSON type.
    fn accepts(&self, value: &Value) -> bool {
        match self.schema_type.as_str() {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error>;
}

/// Per-tool invocation counters. Updated by every execute() regardless of
/// outcome; safe under parallel queries.
#[derive(Default)]
pub struct ToolStats {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl ToolStats {
    fn snapshot(&self) -> StatsSnapshot {
        let calls = self.calls.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        StatsSnapshot {
            calls,
            successes,
            failures: self.failures.load(Ordering::Relaxed),
            success_rate: if calls == 0 {
                0.0
            } else {
                successes as f64 / calls as f64
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
}

/// The outcome of a registry dispatch. `execute` never returns `Err`; a
/// missing tool, bad arguments, a timeout, or a tool failure all land in
/// `error` while `result` stays `None`.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub result: Option<String>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            result: Some(content.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Render the outcome as tool-response message content.
    pub fn into_message_content(self) -> String {
        match self.error {
            Some(error) => format!("Error: {}", error),
            None => self.result.unwrap_or_default(),
        }
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    stats: HashMap<String, ToolStats>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TOOL_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            stats: HashMap::new(),
            timeout,
        }
    }

    /// Register a capability. Duplicate names are a startup misconfiguration:
    /// the call fails and the registry is left unchanged.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), Error> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        self.stats.insert(name.clone(), ToolStats::default());
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check `args` against the tool's declared parameters: every required
    /// name present, every provided value matching its declared JSON type,
    /// and no unknown names unless the schema allows them.
    pub fn validate_args(&self, name: &str, args: &Value) -> Result<(), Error> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        let params = tool.definition().parameters;

        let empty = serde_json::Map::new();
        let fields = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(Error::validation(format!(
                    "arguments for '{}' must be an object",
                    name
                )))
            }
        };

        let missing: Vec<&str> = params
            .required
            .iter()
            .filter(|key| !fields.contains_key(key.as_str()))
            .map(|key| key.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "missing required argument(s) for '{}': {}",
                name,
                missing.join(", ")
            )));
        }

        for (key, value) in fields {
            match params.properties.get(key) {
                Some(schema) => {
                    if !schema.accepts(value) {
                        return Err(Error::validation(format!(
                            "argument '{}' for '{}' must be of type {}",
                            key, name, schema.schema_type
                        )));
                    }
                }
                None if !params.additional_properties => {
                    return Err(Error::validation(format!(
                        "unknown argument '{}' for '{}'",
                        key, name
                    )));
                }
                None => {}
            }
        }

        Ok(())
    }

    /// Dispatch one tool call. Never returns `Err` and never panics: every
    /// failure mode is folded into the outcome's `error` field. Counters for
    /// the named tool are updated on every path.
    pub async fn execute(&self, name: &str, args: Value) -> ExecutionOutcome {
        let (Some(tool), Some(stats)) = (self.tools.get(name), self.stats.get(name)) else {
            return ExecutionOutcome::failed(Error::ToolNotFound(name.to_string()).to_string());
        };

        stats.calls.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.validate_args(name, &args) {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            return ExecutionOutcome::failed(e.to_string());
        }

        debug!(tool = name, "dispatching tool call");
        match tokio::time::timeout(self.timeout, tool.execute(args)).await {
            Ok(Ok(output)) if !output.is_error => {
                stats.successes.fetch_add(1, Ordering::Relaxed);
                ExecutionOutcome::ok(output.content)
            }
            Ok(Ok(output)) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                ExecutionOutcome::failed(output.content)
            }
            Ok(Err(e)) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                ExecutionOutcome::failed(e.to_string())
            }
            Err(_) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                let err = Error::ToolTimeout {
                    tool: name.to_string(),
                    seconds: self.timeout.as_secs(),
                };
                ExecutionOutcome::failed(err.to_string())
            }
        }
    }

    pub fn stats(&self, name: &str) -> Option<StatsSnapshot> {
        self.stats.get(name).map(|s| s.snapshot())
    }

    /// Counters summed across every registered tool.
    pub fn aggregate_stats(&self) -> StatsSnapshot {
        let mut calls = 0;
        let mut successes = 0;
        let mut failures = 0;
        for stats in self.stats.values() {
            let snap = stats.snapshot();
            calls += snap.calls;
            successes += snap.successes;
            failures += snap.failures;
        }
        StatsSnapshot {
            calls,
            successes,
            failures,
            success_rate: if calls == 0 {
                0.0
            } else {
                successes as f64 / calls as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument back"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name(), self.description()).with_parameters(
                ToolParameters::new()
                    .add_property("text", PropertySchema::string("Text to echo"), true)
                    .add_property("count", PropertySchema::integer("Repeat count"), false),
            )
        }

        async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error> {
            let text = arguments["text"].as_str().unwrap_or_default();
            Ok(ToolOutput::success(text))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps longer than any reasonable timeout"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name(), self.description())
        }

        async fn execute(&self, _arguments: Value) -> Result<ToolOutput, Error> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolOutput::success("done"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let err = registry.register(Box::new(EchoTool)).unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(_)));
        // registry unchanged: original tool still present and callable
        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_structured() {
        let registry = registry();
        let outcome = registry.execute("nope", serde_json::json!({})).await;
        assert!(outcome.result.is_none());
        assert!(outcome.error.unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_execute_updates_counters() {
        let registry = registry();

        let ok = registry
            .execute("echo", serde_json::json!({"text": "hi"}))
            .await;
        assert_eq!(ok.result.as_deref(), Some("hi"));

        let bad = registry.execute("echo", serde_json::json!({})).await;
        assert!(bad.is_error());

        let snap = registry.stats("echo").unwrap();
        assert_eq!(snap.calls, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert!((snap.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let mut registry = ToolRegistry::with_timeout(Duration::from_millis(20));
        registry.register(Box::new(SlowTool)).unwrap();

        let outcome = registry.execute("slow", serde_json::json!({})).await;
        assert!(outcome.error.unwrap().contains("timed out"));
        let snap = registry.stats("slow").unwrap();
        assert_eq!(snap.failures, 1);
    }

    #[tokio::test]
    async fn test_timeout_does_not_block_siblings() {
        let mut registry = ToolRegistry::with_timeout(Duration::from_millis(20));
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register(Box::new(SlowTool)).unwrap();

        let (slow, fast) = tokio::join!(
            registry.execute("slow", serde_json::json!({})),
            registry.execute("echo", serde_json::json!({"text": "still here"})),
        );

        assert!(slow.is_error());
        assert_eq!(fast.result.as_deref(), Some("still here"));
    }

    #[test]
    fn test_validate_args_type_check() {
        let registry = registry();

        assert!(registry
            .validate_args("echo", &serde_json::json!({"text": "hi"}))
            .is_ok());
        assert!(registry
            .validate_args("echo", &serde_json::json!({"text": "hi", "count": 3}))
            .is_ok());

        // missing required
        let err = registry
            .validate_args("echo", &serde_json::json!({"count": 3}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // wrong type
        let err = registry
            .validate_args("echo", &serde_json::json!({"text": 42}))
            .unwrap_err();
        assert!(err.to_string().contains("string"));

        // unknown argument
        let err = registry
            .validate_args("echo", &serde_json::json!({"text": "hi", "bogus": 1}))
            .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_aggregate_stats_empty() {
        let registry = ToolRegistry::new();
        let snap = registry.aggregate_stats();
        assert_eq!(snap.calls, 0);
        assert_eq!(snap.success_rate, 0.0);
    }
}
