//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::completion::{CompletionClient, CompletionRequest, CompletionResponse, FinishReason};
use crate::error::Error;
use crate::message::{Message, ToolCall, Usage};

/// A mock completion client that returns pre-configured responses.
pub struct MockClient {
    responses: Mutex<Vec<CompletionResponse>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    pub name: String,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
        }
    }

    /// Queue a plain-text assistant response. Responses are returned in FIFO
    /// order (first queued = first returned).
    pub fn queue_text(&self, content: &str) {
        self.queue_raw(CompletionResponse {
            message: Message::assistant(content),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::Stop,
        });
    }

    /// Queue an assistant turn requesting the given tool calls.
    pub fn queue_tool_calls(&self, tool_calls: Vec<ToolCall>) {
        self.queue_raw(CompletionResponse {
            message: Message::assistant_with_tool_calls("", tool_calls),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::ToolCalls,
        });
    }

    pub fn queue_raw(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().insert(0, response);
    }

    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.captured_requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop() {
            Some(response) => Ok(response),
            None => Err(Error::model("no mock response queued")),
        }
    }
}
