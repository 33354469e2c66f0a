//! The reasoning loop: a bounded ReAct state machine.
//!
//! Each query owns one `AgentState` and steps through an explicit
//! `LoopPhase` machine (`Llm -> ToolExec -> Route -> {Llm | End}`) driven by
//! a pure transition function. Tool calls requested within a single model
//! turn are dispatched concurrently and their responses re-appended to
//! history in the original call order.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::completion::{CompletionClient, CompletionRequest, ToolChoice};
use crate::message::{Message, ToolCall};
use crate::tool::{ExecutionOutcome, ToolRegistry};

/// Name of the designated terminal capability.
pub const DEFAULT_FINISH_TOOL: &str = "final_answer";

const SYSTEM_PROMPT: &str = "You are a research assistant answering questions over a corpus of \
documents and tabular datasets. Use the available tools to gather evidence: search the documents \
for relevant passages, query the tabular data when numbers are needed, and ask for clarification \
resolution when a request is ambiguous. When you have enough evidence, call the final_answer tool \
with your complete answer. Cite the sources you used.";

const APOLOGY: &str = "I ran into a problem while working on your question and could not finish. \
Please try asking again.";

const UNANSWERED: &str = "I was unable to produce an answer to this question.";

/// Per-query mutable state. Created at query start, discarded at query end;
/// never shared between queries.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub question: String,
    pub history: Vec<Message>,
    pub loop_count: usize,
    pub answer: Option<String>,
    pub error: Option<String>,
}

impl AgentState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            history: Vec::new(),
            loop_count: 0,
            answer: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Llm,
    ToolExec,
    Route,
    End,
}

/// Pure transition function for the loop machine. `requested_tools` is only
/// meaningful when leaving `Llm`.
pub fn next_phase(
    phase: LoopPhase,
    state: &AgentState,
    requested_tools: bool,
    max_loops: usize,
) -> LoopPhase {
    match phase {
        LoopPhase::Llm => {
            if requested_tools {
                LoopPhase::ToolExec
            } else {
                LoopPhase::End
            }
        }
        LoopPhase::ToolExec => LoopPhase::Route,
        LoopPhase::Route => {
            if state.answer.is_some() || state.loop_count >= max_loops {
                LoopPhase::End
            } else {
                LoopPhase::Llm
            }
        }
        LoopPhase::End => LoopPhase::End,
    }
}

/// A source record emitted by a search-capable tool during the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub excerpt: String,
    pub source: String,
    pub score: f32,
}

/// Shared sink for citations. The loop hands a clone to search tools and
/// drains it when the query completes.
#[derive(Clone, Default)]
pub struct CitationLog {
    entries: Arc<Mutex<Vec<Citation>>>,
}

impl CitationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, citation: Citation) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(citation);
        }
    }

    pub fn drain(&self) -> Vec<Citation> {
        match self.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum reasoning iterations before forced termination.
    pub max_loops: usize,
    pub system_prompt: String,
    /// Name of the finish tool the Route step watches for.
    pub finish_tool: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_loops: 10,
            system_prompt: SYSTEM_PROMPT.to_string(),
            finish_tool: DEFAULT_FINISH_TOOL.to_string(),
            model: None,
            temperature: None,
        }
    }
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_loops(mut self, max_loops: usize) -> Self {
        self.max_loops = max_loops;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_finish_tool(mut self, name: impl Into<String>) -> Self {
        self.finish_tool = name.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Everything a query produces: the answer plus diagnostics.
#[derive(Debug)]
pub struct LoopOutcome {
    pub answer: String,
    pub error: Option<String>,
    pub loop_count: usize,
    /// Distinct tool names invoked, sorted.
    pub tools_used: Vec<String>,
    /// Ordered textual utterances from the model, for trace/audit.
    pub utterances: Vec<String>,
    /// Citations recorded by search-capable tools.
    pub citations: Vec<Citation>,
}

pub struct ReasoningLoop {
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    config: LoopConfig,
    citations: CitationLog,
}

impl ReasoningLoop {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        tools: Arc<ToolRegistry>,
        config: LoopConfig,
    ) -> Self {
        Self {
            client,
            tools,
            config,
            citations: CitationLog::new(),
        }
    }

    /// Share a citation sink with the search tools wired into the registry.
    pub fn with_citations(mut self, citations: CitationLog) -> Self {
        self.citations = citations;
        self
    }

    /// Run one query to completion. Model failures are folded into the
    /// outcome (apologetic answer + `error` set); this function itself is
    /// total.
    pub async fn run(&self, question: &str) -> LoopOutcome {
        let mut state = AgentState::new(question);
        let mut tools_used: BTreeSet<String> = BTreeSet::new();
        let mut utterances: Vec<String> = Vec::new();
        let mut pending: Vec<ToolCall> = Vec::new();
        // a zero budget terminates before the first model turn
        let mut phase = if self.config.max_loops == 0 {
            LoopPhase::End
        } else {
            LoopPhase::Llm
        };

        while phase != LoopPhase::End {
            match phase {
                LoopPhase::Llm => {
                    phase = self.llm_step(&mut state, &mut utterances, &mut pending).await;
                }
                LoopPhase::ToolExec => {
                    self.tool_exec_step(&mut state, &pending, &mut tools_used).await;
                    phase = next_phase(LoopPhase::ToolExec, &state, false, self.config.max_loops);
                }
                LoopPhase::Route => {
                    self.route_step(&mut state, &pending);
                    pending.clear();
                    phase = next_phase(LoopPhase::Route, &state, false, self.config.max_loops);
                }
                LoopPhase::End => {}
            }
        }

        if state.answer.is_none() && state.loop_count >= self.config.max_loops {
            warn!(
                loops = state.loop_count,
                "loop budget exhausted; returning degraded completion"
            );
        }

        let answer = state.answer.clone().unwrap_or_else(|| {
            state
                .history
                .iter()
                .rev()
                .find(|m| !m.content.is_empty())
                .map(|m| m.content.clone())
                .unwrap_or_else(|| UNANSWERED.to_string())
        });

        LoopOutcome {
            answer,
            error: state.error,
            loop_count: state.loop_count,
            tools_used: tools_used.into_iter().collect(),
            utterances,
            citations: self.citations.drain(),
        }
    }

    async fn llm_step(
        &self,
        state: &mut AgentState,
        utterances: &mut Vec<String>,
        pending: &mut Vec<ToolCall>,
    ) -> LoopPhase {
        // The question enters history as the first user message; later
        // iterations see it through the running history.
        if state.history.is_empty() {
            state.history.push(Message::user(state.question.clone()));
        }

        debug!(
            iteration = state.loop_count,
            history_len = state.history.len(),
            "requesting model turn"
        );

        let mut messages = vec![Message::system(self.config.system_prompt.clone())];
        messages.extend(state.history.iter().cloned());

        let mut request = CompletionRequest::new(messages)
            .with_tools(self.tools.definitions())
            .with_tool_choice(ToolChoice::Auto);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }

        match self.client.complete(request).await {
            Ok(response) => {
                if !response.message.content.is_empty() {
                    utterances.push(response.message.content.clone());
                }
                *pending = response.message.tool_calls.clone();
                state.history.push(response.message);
                next_phase(LoopPhase::Llm, state, !pending.is_empty(), self.config.max_loops)
            }
            Err(e) => {
                // Fatal to this query; no retry. A cancelled upstream call
                // surfaces here the same way as a transport failure.
                warn!(error = %e, "model call failed; terminating query");
                state.error = Some(e.to_string());
                state.answer = Some(APOLOGY.to_string());
                LoopPhase::End
            }
        }
    }

    async fn tool_exec_step(
        &self,
        state: &mut AgentState,
        pending: &[ToolCall],
        tools_used: &mut BTreeSet<String>,
    ) {
        debug!(calls = pending.len(), "executing tool calls");

        let outcomes = join_all(pending.iter().map(|call| {
            let registry = Arc::clone(&self.tools);
            let id = call.id.clone();
            let name = call.name.clone();
            let args = call.arguments.clone();
            async move { (id, registry.execute(&name, args).await) }
        }))
        .await;

        // Collect keyed by call id, then re-append in the original call
        // order so citation indices stay stable.
        let mut by_id: HashMap<String, ExecutionOutcome> = outcomes.into_iter().collect();
        for call in pending {
            tools_used.insert(call.name.clone());
            let outcome = by_id
                .remove(&call.id)
                .unwrap_or_else(|| ExecutionOutcome::failed("tool produced no result"));
            state
                .history
                .push(Message::tool_result(call.id.clone(), outcome.into_message_content()));
        }
    }

    fn route_step(&self, state: &mut AgentState, pending: &[ToolCall]) {
        if let Some(finish) = pending.iter().find(|c| c.name == self.config.finish_tool) {
            let response_text = state
                .history
                .iter()
                .rev()
                .find(|m| m.tool_call_id.as_deref() == Some(finish.id.as_str()))
                .map(|m| m.content.clone())
                .unwrap_or_default();
            state.answer = Some(parse_answer(&response_text));
            debug!("finish tool observed; answer recorded");
        }
        state.loop_count += 1;
    }
}

/// Extract the `answer` field from a finish-tool response, falling back to
/// the raw text when it is not well-formed JSON.
fn parse_answer(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value
            .get("answer")
            .and_then(|a| a.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| text.to_string()),
        Err(_) => text.to_string(),
    }
}
