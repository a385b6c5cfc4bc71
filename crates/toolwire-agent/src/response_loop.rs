//! Response loop: the model ↔ capability state machine behind each turn.
//!
//! A turn streams one model round, and if the round ends with invocation
//! directives, runs them concurrently through the bridge, feeds the results
//! back, and asks the model again. It ends on the first round without
//! directives or when the round cap is reached.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use toolwire_client::{BridgeError, Invocation, InvocationBridge, TransportError};
use toolwire_core::config::AgentConfig;
use toolwire_core::types::{Message, ToolCall, ToolDefinition};
use toolwire_core::InvocationResult;
use toolwire_providers::{Fragment, LlmProvider, LlmRequestConfig};

use crate::context::ContextBuilder;

/// Sent when the round cap is hit while the model still wants tools.
pub const ITERATION_LIMIT_NOTICE: &str =
    "I stopped after reaching the tool-call limit for this turn without a final answer.";

/// Sent when the model finishes without saying anything.
pub const EMPTY_RESPONSE: &str = "I've completed processing but have no response to give.";

// ─────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────

/// Where the loop is within a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    AwaitingModel,
    ToolRequested,
    AwaitingToolResult,
    Streaming,
}

/// What the caller should do after [`ResponseLoop::handle_input`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopControl {
    /// Input was blank; prompt again.
    Reprompt,
    /// The user asked to leave.
    Exit,
    /// A turn completed with this final text.
    Answered(String),
}

/// Failures that abort a turn.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("tool backend unavailable: {0}")]
    Transport(#[from] TransportError),

    #[error("model error: {0}")]
    Provider(String),
}

/// Receives turn output as it happens.
pub trait ResponseSink: Send {
    /// A piece of the model's visible answer.
    fn on_text(&mut self, text: &str);

    /// The model asked for a capability.
    fn on_tool_call(&mut self, _call: &ToolCall) {}

    /// A capability call finished.
    fn on_tool_result(&mut self, _name: &str, _result: &InvocationResult) {}
}

// ─────────────────────────────────────────────
// ResponseLoop
// ─────────────────────────────────────────────

pub struct ResponseLoop {
    provider: Arc<dyn LlmProvider>,
    bridge: InvocationBridge,
    context: ContextBuilder,
    /// Definitions sent to the model; fixed for the session.
    tool_defs: Vec<ToolDefinition>,
    model: String,
    request_config: LlmRequestConfig,
    max_tool_iterations: u32,
    history_limit: usize,
    /// Completed turns (user text + final answer), oldest first.
    history: Mutex<VecDeque<Message>>,
    state: watch::Sender<LoopState>,
}

impl ResponseLoop {
    pub fn new(provider: Arc<dyn LlmProvider>, bridge: InvocationBridge, config: &AgentConfig) -> Self {
        let context = ContextBuilder::new(config.system_prompt.clone())
            .with_capabilities(bridge.capabilities().descriptors());
        let tool_defs = bridge.capabilities().definitions();
        let model = if config.model.is_empty() {
            provider.default_model().to_string()
        } else {
            config.model.clone()
        };
        let (state, _) = watch::channel(LoopState::Idle);

        info!(
            model = %model,
            provider = provider.display_name(),
            tools = tool_defs.len(),
            max_tool_iterations = config.max_tool_iterations,
            "response loop initialized"
        );

        Self {
            provider,
            bridge,
            context,
            tool_defs,
            model,
            request_config: LlmRequestConfig {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            },
            max_tool_iterations: config.max_tool_iterations,
            history_limit: config.history_limit,
            history: Mutex::new(VecDeque::new()),
            state,
        }
    }

    /// Current state of the loop.
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Messages kept from completed turns.
    pub fn history(&self) -> Vec<Message> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Interpret one line of user input.
    ///
    /// Blank input and `exit` (any case) never reach the model or the backend.
    pub async fn handle_input(
        &self,
        input: &str,
        sink: &mut dyn ResponseSink,
    ) -> Result<LoopControl, AgentError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(LoopControl::Reprompt);
        }
        if text.eq_ignore_ascii_case("exit") {
            info!("exit requested");
            return Ok(LoopControl::Exit);
        }
        self.run_turn(text, sink).await.map(LoopControl::Answered)
    }

    /// Run one conversation turn to its final answer.
    pub async fn run_turn(&self, text: &str, sink: &mut dyn ResponseSink) -> Result<String, AgentError> {
        let result = self.drive_turn(text, sink).await;
        self.set_state(LoopState::Idle);

        match result {
            Ok(answer) => {
                self.remember(text, &answer);
                Ok(answer)
            }
            Err(e) => {
                warn!(error = %e, "turn aborted");
                Err(e)
            }
        }
    }

    async fn drive_turn(&self, text: &str, sink: &mut dyn ResponseSink) -> Result<String, AgentError> {
        let mut messages = self.context.build_messages(&self.history(), text);
        let mut rounds = 0u32;

        loop {
            debug!(round = rounds, "model call");
            let (content, tool_calls) = self.stream_round(&messages, sink).await?;

            if tool_calls.is_empty() {
                if content.is_empty() {
                    sink.on_text(EMPTY_RESPONSE);
                    return Ok(EMPTY_RESPONSE.to_string());
                }
                return Ok(content);
            }

            if rounds >= self.max_tool_iterations {
                warn!(
                    limit = self.max_tool_iterations,
                    pending = tool_calls.len(),
                    "tool round limit reached"
                );
                let notice = if content.is_empty() {
                    ITERATION_LIMIT_NOTICE.to_string()
                } else {
                    sink.on_text("\n\n");
                    format!("{content}\n\n{ITERATION_LIMIT_NOTICE}")
                };
                sink.on_text(ITERATION_LIMIT_NOTICE);
                return Ok(notice);
            }
            rounds += 1;

            self.set_state(LoopState::ToolRequested);
            let preamble = (!content.is_empty()).then_some(content);
            ContextBuilder::add_assistant_message(&mut messages, preamble, tool_calls.clone());

            self.set_state(LoopState::AwaitingToolResult);
            let results = self.invoke_calls(&tool_calls, sink).await?;
            for (call, result) in tool_calls.iter().zip(results) {
                ContextBuilder::add_tool_result(&mut messages, &call.id, &result.to_text());
            }
        }
    }

    /// Stream one model round: forward text, collect directives.
    async fn stream_round(
        &self,
        messages: &[Message],
        sink: &mut dyn ResponseSink,
    ) -> Result<(String, Vec<ToolCall>), AgentError> {
        self.set_state(LoopState::AwaitingModel);

        let tools = (!self.tool_defs.is_empty()).then_some(self.tool_defs.as_slice());
        let mut stream = self
            .provider
            .chat_stream(messages, tools, &self.model, &self.request_config);

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut finished = false;

        while let Some(fragment) = stream.next().await {
            match fragment {
                Fragment::Text(text) => {
                    self.set_state(LoopState::Streaming);
                    sink.on_text(&text);
                    content.push_str(&text);
                }
                Fragment::ToolCall(call) => {
                    debug!(tool = %call.function.name, id = %call.id, "tool call requested");
                    tool_calls.push(call);
                }
                Fragment::Done { finish_reason } => {
                    debug!(finish_reason = ?finish_reason, "model round finished");
                    finished = true;
                    break;
                }
            }
        }

        if !finished {
            if content.is_empty() && tool_calls.is_empty() {
                return Err(AgentError::Provider(format!(
                    "{} ended the stream without a response",
                    self.provider.display_name()
                )));
            }
            warn!("model stream ended without a completion marker");
        }

        Ok((content, tool_calls))
    }

    /// Run every directive of a round concurrently; results keep call order.
    ///
    /// Unknown capabilities and unreadable arguments become error results the
    /// model can react to. Only transport failures abort the turn.
    async fn invoke_calls(
        &self,
        calls: &[ToolCall],
        sink: &mut dyn ResponseSink,
    ) -> Result<Vec<InvocationResult>, AgentError> {
        let mut results: Vec<Option<InvocationResult>> = vec![None; calls.len()];
        let mut invocations = Vec::with_capacity(calls.len());
        let mut slots = Vec::with_capacity(calls.len());

        for (i, call) in calls.iter().enumerate() {
            sink.on_tool_call(call);
            info!(tool = %call.function.name, id = %call.id, "executing tool call");
            match parse_arguments(&call.function.arguments) {
                Ok(arguments) => {
                    invocations.push(Invocation::new(&call.function.name, arguments));
                    slots.push(i);
                }
                Err(reason) => {
                    warn!(tool = %call.function.name, reason = %reason, "unreadable tool arguments");
                    results[i] = Some(InvocationResult::failure(format!(
                        "Invalid arguments for {}: {reason}",
                        call.function.name
                    )));
                }
            }
        }

        let outcomes = self.bridge.invoke_all(&invocations).await;
        for (slot, outcome) in slots.into_iter().zip(outcomes) {
            let result = match outcome {
                Ok(result) => result,
                Err(BridgeError::UnknownCapability(name)) => {
                    InvocationResult::failure(format!("Tool '{name}' not found"))
                }
                Err(BridgeError::Transport(e)) => return Err(AgentError::Transport(e)),
            };
            results[slot] = Some(result);
        }

        let results: Vec<InvocationResult> = results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| InvocationResult::failure("No result")))
            .collect();

        for (call, result) in calls.iter().zip(&results) {
            debug!(
                tool = %call.function.name,
                is_error = result.is_error,
                parts = result.content.len(),
                "tool result"
            );
            sink.on_tool_result(&call.function.name, result);
        }
        Ok(results)
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Record a completed turn, dropping the oldest turns past the limit.
    fn remember(&self, user_text: &str, answer: &str) {
        let Ok(mut history) = self.history.lock() else {
            return;
        };
        history.push_back(Message::user(user_text));
        history.push_back(Message::assistant(answer));
        while history.len() > self.history_limit {
            history.pop_front();
        }
        // Never start the context with an orphaned answer.
        if matches!(history.front(), Some(Message::Assistant { .. })) {
            history.pop_front();
        }
    }
}

/// Parse a directive's argument string into an object.
fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(format!("malformed JSON ({e})")),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
