//! Read-only SQL queries against the external tabular engine.
//!
//! The engine itself (parsing, execution, storage) is a collaborator; this
//! module owns the contract and the pre-dispatch screen that keeps anything
//! but `SELECT`/`WITH` from reaching it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dq_core::{Error, PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlResult {
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
}

/// The external structured-query collaborator.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    async fn query(&self, sql: &str) -> Result<SqlResult, Error>;
}

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "replace", "grant",
    "revoke", "attach", "detach", "pragma", "vacuum",
];

/// Screen a statement before dispatch. Only `SELECT` and `WITH` statements
/// pass, and no write/DDL keyword may appear outside a string literal.
pub fn validate_read_only(sql: &str) -> Result<(), Error> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("empty SQL statement"));
    }

    let screened = strip_string_literals(trimmed).to_lowercase();
    let first = screened.split_whitespace().next().unwrap_or("");
    if first != "select" && first != "with" {
        return Err(Error::validation(
            "only read-only SELECT/WITH statements are allowed",
        ));
    }

    for token in screened.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        if FORBIDDEN_KEYWORDS.contains(&token) {
            return Err(Error::validation(format!(
                "statement contains forbidden keyword '{}'",
                token
            )));
        }
    }

    Ok(())
}

/// Blank out single-quoted literals so their contents don't trip the
/// keyword screen. `''` escapes inside literals toggle back in, which is
/// harmless for screening purposes.
fn strip_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_literal = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_literal = !in_literal;
                out.push(' ');
            }
            _ if in_literal => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Run read-only queries against the tabular datasets.
pub struct QueryDataTool {
    engine: Arc<dyn SqlEngine>,
}

impl QueryDataTool {
    pub fn new(engine: Arc<dyn SqlEngine>) -> Self {
        Self { engine }
    }
}

#[derive(Deserialize)]
struct QueryDataArgs {
    sql: String,
}

#[async_trait]
impl Tool for QueryDataTool {
    fn name(&self) -> &str {
        "query_table"
    }

    fn description(&self) -> &str {
        "Run a read-only SQL SELECT query against the tabular datasets"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property(
                "sql",
                PropertySchema::string("A read-only SELECT or WITH statement"),
                true,
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, Error> {
        let args: QueryDataArgs = serde_json::from_value(arguments)
            .map_err(|e| Error::tool("query_table", format!("invalid arguments: {}", e)))?;

        // rejected statements never reach the engine
        if let Err(e) = validate_read_only(&args.sql) {
            return Ok(ToolOutput::error(e.to_string()));
        }

        debug!(sql = %args.sql, "dispatching read-only query");
        match self.engine.query(&args.sql).await {
            Ok(result) => {
                let payload = serde_json::json!({
                    "row_count": result.row_count,
                    "rows": result.rows,
                });
                Ok(ToolOutput::success(payload.to_string()))
            }
            Err(e) => Ok(ToolOutput::error(e.to_string())),
        }
    }
}
