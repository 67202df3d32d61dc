//! The fixed call sequence as an explicit state machine.
//!
//! ```text
//! Uninitialized ──start──▶ Initializing ──init ok──▶ Initialized ──▶ Calling
//!                               │                                      │
//!                          init error                       tool ok    │  no payload
//!                               ▼                              ▼       ▼
//!                             Failed ◀──── write failed ──── Called   Failed
//!                                                              │
//!                                                          written
//!                                                              ▼
//!                                                             Done
//! ```
//!
//! The sequencer performs no I/O. Each event returns the [`Action`]s the
//! driver must carry out, in order. Reaching `Done` or `Failed` yields exactly
//! one [`Action::Finish`]; later events are ignored.

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, ProtocolError, TransportError};
use crate::mcp::correlator::Correlator;
use crate::mcp::protocol::{initialize_params, JsonRpcRequest, Message, OutgoingNotification};

/// Position in the call sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    /// Waiting for the startup delay to elapse.
    Uninitialized,
    /// `initialize` sent, awaiting its response.
    Initializing,
    /// Handshake complete.
    Initialized,
    /// `tools/call` sent, awaiting its response.
    Calling,
    /// Payload handed to the sink, awaiting the outcome.
    Called,
    /// Payload delivered.
    Done,
    /// The run failed.
    Failed,
}

impl SequenceState {
    /// Returns `true` for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// What an outstanding request id stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The `initialize` handshake.
    Initialize,
    /// The single `tools/call`.
    ToolCall,
}

/// The tool invoked once the handshake completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    /// Tool name, e.g. `get_docs_full`.
    pub name: String,
    /// Tool-specific arguments object.
    pub arguments: Value,
}

impl ToolRequest {
    /// Creates a tool request with an arbitrary arguments object.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Creates a request for a single document, passing `doc_identifier`
    /// under `argument_key` (`docName` or `name`, depending on the server).
    #[must_use]
    pub fn document(name: impl Into<String>, argument_key: &str, doc_identifier: &str) -> Self {
        Self::new(name, json!({ argument_key: doc_identifier }))
    }

    /// `tools/call` parameters.
    #[must_use]
    pub fn params(&self) -> Value {
        json!({
            "name": self.name,
            "arguments": self.arguments,
        })
    }
}

/// A side effect requested by the sequencer.
#[derive(Debug)]
pub enum Action {
    /// Write a request to the server.
    Send(JsonRpcRequest),
    /// Write a notification to the server.
    Notify(OutgoingNotification),
    /// Hand the tool payload to the sink, then report via
    /// [`Sequencer::on_delivered`].
    Deliver(String),
    /// Stop: terminate the server and exit with this outcome.
    Finish(Result<(), ClientError>),
}

/// Drives initialize → tool call → deliver for one connection.
#[derive(Debug)]
pub struct Sequencer {
    state: SequenceState,
    correlator: Correlator<Step>,
    tool: ToolRequest,
    send_initialized: bool,
}

impl Sequencer {
    /// Creates a sequencer for `tool`. With `send_initialized`, the
    /// `notifications/initialized` notification follows the handshake.
    #[must_use]
    pub fn new(tool: ToolRequest, send_initialized: bool) -> Self {
        Self {
            state: SequenceState::Uninitialized,
            correlator: Correlator::new(),
            tool,
            send_initialized,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SequenceState {
        self.state
    }

    /// Requests still awaiting a response.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.correlator.outstanding()
    }

    /// Starts the handshake. Only valid once, from `Uninitialized`.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state != SequenceState::Uninitialized {
            warn!(state = ?self.state, "Sequence already started");
            return Vec::new();
        }

        info!("Initializing MCP connection...");
        let request = self
            .correlator
            .request("initialize", initialize_params(), Step::Initialize);
        self.state = SequenceState::Initializing;
        vec![Action::Send(request)]
    }

    /// Handles one decoded message from the server.
    pub fn on_message(&mut self, message: &Message) -> Vec<Action> {
        if self.state.is_terminal() {
            debug!(id = ?message.id, "Sequence finished, ignoring message");
            return Vec::new();
        }

        let Some(step) = self.correlator.resolve(message) else {
            return Vec::new();
        };

        match (self.state, step) {
            (SequenceState::Initializing, Step::Initialize) => self.on_initialized(message),
            (SequenceState::Calling, Step::ToolCall) => self.on_tool_result(message),
            (state, step) => {
                warn!(?state, ?step, "Response does not fit the current state, ignoring");
                Vec::new()
            }
        }
    }

    /// Reports the sink's outcome for a delivered payload.
    pub fn on_delivered(&mut self, result: Result<(), ClientError>) -> Vec<Action> {
        if self.state != SequenceState::Called {
            warn!(state = ?self.state, "Delivery outcome outside the Called state");
            return Vec::new();
        }

        match result {
            Ok(()) => {
                self.state = SequenceState::Done;
                vec![Action::Finish(Ok(()))]
            }
            Err(error) => self.fail(error),
        }
    }

    /// The server's stream ended or broke before the sequence finished.
    ///
    /// Ignored once the payload is in hand (`Called`): the delivery outcome
    /// decides the run from there.
    pub fn on_transport_closed(&mut self, error: TransportError) -> Vec<Action> {
        if self.state.is_terminal() || self.state == SequenceState::Called {
            debug!(state = ?self.state, error = %error, "Transport closed after result");
            return Vec::new();
        }
        self.fail(error.into())
    }

    fn on_initialized(&mut self, message: &Message) -> Vec<Action> {
        if let Some(err) = &message.error {
            return self.fail(
                ProtocolError::ErrorResponse {
                    method: "initialize",
                    code: err.code,
                    message: err.message.clone(),
                }
                .into(),
            );
        }

        let server = message
            .result
            .as_ref()
            .and_then(|r| r.get("serverInfo"))
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(server, "MCP connection initialized");
        self.state = SequenceState::Initialized;

        let mut actions = Vec::with_capacity(2);
        if self.send_initialized {
            actions.push(Action::Notify(OutgoingNotification::initialized()));
        }

        info!(tool = %self.tool.name, arguments = %self.tool.arguments, "Calling tool");
        let request = self
            .correlator
            .request("tools/call", self.tool.params(), Step::ToolCall);
        actions.push(Action::Send(request));
        self.state = SequenceState::Calling;
        actions
    }

    fn on_tool_result(&mut self, message: &Message) -> Vec<Action> {
        match extract_payload(message) {
            Ok(payload) => {
                info!(characters = payload.chars().count(), "Tool result received");
                self.state = SequenceState::Called;
                vec![Action::Deliver(payload)]
            }
            Err(err) => {
                let raw = message.error.as_ref().map_or_else(
                    || message.result.clone().unwrap_or(Value::Null),
                    |e| json!({ "code": e.code, "message": e.message, "data": e.data }),
                );
                error!(error = %err, response = %raw, "Tool call returned no usable payload");
                self.fail(err.into())
            }
        }
    }

    fn fail(&mut self, error: ClientError) -> Vec<Action> {
        self.state = SequenceState::Failed;
        vec![Action::Finish(Err(error))]
    }
}

/// Extracts the text payload from a `tools/call` response.
///
/// All `text` items of `result.content` are joined with newlines.
///
/// # Errors
///
/// Returns a [`ProtocolError`] for error responses, missing results, results
/// flagged `isError`, and results without any non-empty text.
pub fn extract_payload(message: &Message) -> Result<String, ProtocolError> {
    if let Some(err) = &message.error {
        return Err(ProtocolError::ErrorResponse {
            method: "tools/call",
            code: err.code,
            message: err.message.clone(),
        });
    }

    let result = message
        .result
        .as_ref()
        .ok_or(ProtocolError::MissingResult {
            method: "tools/call",
        })?;

    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    let payload = texts.join("\n");

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(ProtocolError::ToolError(payload));
    }
    if payload.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }
    Ok(payload)
}
