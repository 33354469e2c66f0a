use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool '{tool}' timed out after {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    #[error("Tool error: {tool} - {message}")]
    Tool { tool: String, message: String },

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Duplicate tool registration: {0}")]
    DuplicateTool(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    pub fn search(message: impl Into<String>) -> Self {
        Self::Search(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Failures that abort the current query rather than being folded into
    /// a tool-response message. Everything tool-shaped is converted to data
    /// at the registry boundary; only model calls are fatal at runtime.
    pub fn is_fatal_to_query(&self) -> bool {
        matches!(self, Error::Model(_))
    }

    /// Failures that should only ever happen at startup/configuration time.
    pub fn is_startup_error(&self) -> bool {
        matches!(self, Error::DuplicateTool(_) | Error::Config(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ToolTimeout {
            tool: "search_documents".to_string(),
            seconds: 30,
        };
        assert!(err.to_string().contains("search_documents"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_fatality_classes() {
        assert!(Error::model("connection reset").is_fatal_to_query());
        assert!(!Error::validation("missing arg").is_fatal_to_query());
        assert!(!Error::ToolNotFound("x".into()).is_fatal_to_query());

        assert!(Error::DuplicateTool("x".into()).is_startup_error());
        assert!(!Error::model("boom").is_startup_error());
    }
}
