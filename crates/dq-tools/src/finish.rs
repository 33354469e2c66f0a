//! The terminal capability: calling it supplies the final answer and ends
//! the reasoning loop.

use async_trait::async_trait;

use dq_core::{
    Error, PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters, DEFAULT_FINISH_TOOL,
};

/// Echoes its arguments back as JSON; the loop's Route step parses the
/// `answer` field out of the response.
pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        DEFAULT_FINISH_TOOL
    }

    fn description(&self) -> &str {
        "Provide the final answer to the user's question"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new()
                .add_property(
                    "answer",
                    PropertySchema::string("The complete final answer"),
                    true,
                )
                .add_property(
                    "sources",
                    PropertySchema::array(
                        "Filenames of the sources the answer draws on",
                        PropertySchema::string("A source filename"),
                    ),
                    false,
                ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, Error> {
        Ok(ToolOutput::success(arguments.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_finish_echoes_arguments() {
        let tool = FinalAnswerTool;
        let output = tool
            .execute(json!({"answer": "Revenue grew 12%.", "sources": ["q3.pdf"]}))
            .await
            .unwrap();

        assert!(!output.is_error);
        let parsed: serde_json::Value = serde_json::from_str(&output.content).unwrap();
        assert_eq!(parsed["answer"], "Revenue grew 12%.");
        assert_eq!(parsed["sources"][0], "q3.pdf");
    }
}
