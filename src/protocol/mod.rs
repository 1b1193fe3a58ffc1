//! Wire protocol model: one line of UTF-8 text per message, a JSON object
//! `{"method": <string>, "params": {...}}`. The protocol is not request-ID
//! correlated; ordering on the single stream is the correlation mechanism.
//! Every outgoing `params` carries a `debuggerId` session identifier.

pub mod event_loop;
pub mod transport;

use crate::debugger::frame::StackEntry;
use crate::debugger::runtime::{ThreadId, VarScope};
use crate::debugger::variable::{VariableEntry, VariableFilter};
use crate::debugger::watch::WatchMode;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use transport::TransportError;

const DEBUGGER_ID_KEY: &str = "debuggerId";

/// Commands from the controlling front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum IncomingMessage {
    #[serde(rename_all = "camelCase")]
    RequestBreakpoint {
        filename: String,
        line: u32,
        #[serde(default)]
        temporary: bool,
        #[serde(default)]
        condition: Option<String>,
        /// True to create, false to clear.
        set_breakpoint: bool,
    },
    /// Adjust an existing breakpoint in place: enable/disable it, or set how
    /// many hits to skip. Absent fields stay untouched.
    #[serde(rename_all = "camelCase")]
    RequestBreakpointState {
        filename: String,
        line: u32,
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        ignore_count: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    RequestWatch {
        condition: String,
        #[serde(default)]
        temporary: bool,
        #[serde(default)]
        mode: WatchMode,
        set_watch: bool,
    },
    #[serde(rename_all = "camelCase")]
    RequestWatchState {
        condition: String,
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        ignore_count: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    RequestStep {},
    #[serde(rename_all = "camelCase")]
    RequestStepOver {},
    #[serde(rename_all = "camelCase")]
    RequestStepOut {},
    #[serde(rename_all = "camelCase")]
    RequestContinue {},
    #[serde(rename_all = "camelCase")]
    RequestContinueUntil { new_line: u32 },
    #[serde(rename_all = "camelCase")]
    RequestStepQuit {},
    #[serde(rename_all = "camelCase")]
    RequestStack {},
    #[serde(rename_all = "camelCase")]
    RequestVariables {
        frame_number: u32,
        scope: VarScope,
        #[serde(default)]
        filters: VariableFilter,
    },
    #[serde(rename_all = "camelCase")]
    RequestVariable {
        frame_number: u32,
        scope: VarScope,
        path: String,
    },
    #[serde(rename_all = "camelCase")]
    RequestEnvironment {
        frame_number: u32,
        scope: VarScope,
        name: String,
        value: Json,
    },
    #[serde(rename_all = "camelCase")]
    RequestThreadList {},
    #[serde(rename_all = "camelCase")]
    RequestThreadSet {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
    },
    #[serde(rename_all = "camelCase")]
    RequestCallTrace { trace: bool },
    /// Raw-input delivery for a debuggee blocked on reading user input.
    #[serde(rename_all = "camelCase")]
    RequestStdin { text: String },
}

impl IncomingMessage {
    /// Commands that un-block a stopped thread.
    pub fn resumes_execution(&self) -> bool {
        matches!(
            self,
            IncomingMessage::RequestStep {}
                | IncomingMessage::RequestStepOver {}
                | IncomingMessage::RequestStepOut {}
                | IncomingMessage::RequestContinue {}
                | IncomingMessage::RequestContinueUntil { .. }
                | IncomingMessage::RequestStepQuit {}
                | IncomingMessage::RequestStdin { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDescriptor {
    pub id: ThreadId,
    pub name: String,
    pub stopped: bool,
    pub attended: bool,
}

/// Notifications and query replies to the front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum OutgoingMessage {
    #[serde(rename_all = "camelCase")]
    ResponseLine {
        stack: Vec<StackEntry>,
        thread_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ResponseException {
        #[serde(rename = "type")]
        exception_type: String,
        message: String,
        stack: Vec<StackEntry>,
        thread_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ResponseExit {
        status: i32,
        message: String,
        program: String,
    },
    #[serde(rename_all = "camelCase")]
    ResponseStack { stack: Vec<StackEntry> },
    #[serde(rename_all = "camelCase")]
    ResponseVariables { variables: Vec<VariableEntry> },
    #[serde(rename_all = "camelCase")]
    ResponseVariable {
        path: String,
        children: Vec<VariableEntry>,
    },
    #[serde(rename_all = "camelCase")]
    ResponseThreads { threads: Vec<ThreadDescriptor> },
    #[serde(rename_all = "camelCase")]
    CallTrace {
        event: String,
        from: String,
        to: String,
    },
}

impl OutgoingMessage {
    pub fn method(&self) -> &'static str {
        match self {
            OutgoingMessage::ResponseLine { .. } => "ResponseLine",
            OutgoingMessage::ResponseException { .. } => "ResponseException",
            OutgoingMessage::ResponseExit { .. } => "ResponseExit",
            OutgoingMessage::ResponseStack { .. } => "ResponseStack",
            OutgoingMessage::ResponseVariables { .. } => "ResponseVariables",
            OutgoingMessage::ResponseVariable { .. } => "ResponseVariable",
            OutgoingMessage::ResponseThreads { .. } => "ResponseThreads",
            OutgoingMessage::CallTrace { .. } => "CallTrace",
        }
    }
}

/// Serialize an outgoing message to one wire line, injecting the session
/// identifier into `params`.
pub fn encode_outgoing(
    message: &OutgoingMessage,
    debugger_id: &str,
) -> Result<String, TransportError> {
    let mut value = serde_json::to_value(message)?;
    match value.get_mut("params") {
        Some(Json::Object(params)) => {
            params.insert(DEBUGGER_ID_KEY.to_string(), Json::String(debugger_id.into()));
        }
        _ => {
            let mut params = serde_json::Map::new();
            params.insert(DEBUGGER_ID_KEY.to_string(), Json::String(debugger_id.into()));
            value["params"] = Json::Object(params);
        }
    }
    Ok(serde_json::to_string(&value)?)
}

/// Parse one wire line from the front-end.
pub fn decode_incoming(line: &str) -> Result<IncomingMessage, TransportError> {
    Ok(serde_json::from_str(line)?)
}

/// Parse one wire line emitted by the engine; returns the message and the
/// `debuggerId` it carried. Used by protocol clients (and the test-suite).
pub fn decode_outgoing(line: &str) -> Result<(OutgoingMessage, Option<String>), TransportError> {
    let mut value: Json = serde_json::from_str(line)?;
    let id = value
        .get_mut("params")
        .and_then(|p| p.as_object_mut())
        .and_then(|p| p.remove(DEBUGGER_ID_KEY))
        .and_then(|v| v.as_str().map(str::to_string));
    let message = serde_json::from_value(value)?;
    Ok((message, id))
}
