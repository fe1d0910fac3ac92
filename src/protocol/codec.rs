use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::event::{ErrorEvent, ExecEvent, TerminalEvent};

/// Message of the synthetic `error` event produced for unparseable frames
pub const MALFORMED_MESSAGE: &str = "Malformed message";

/// Serialize one outbound command into one text frame
pub fn encode<C: Serialize>(command: &C) -> serde_json::Result<String> {
    serde_json::to_string(command)
}

/// Decode an execution-session frame. Never fails: invalid JSON becomes an
/// `error` event, unrecognized tags become `ExecEvent::Unknown`.
pub fn decode_exec(frame: &str) -> ExecEvent {
    let value: Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "malformed frame on execution session");
            return ExecEvent::Error(ErrorEvent::new(MALFORMED_MESSAGE));
        }
    };
    let (kind, data) = split_envelope(value);
    ExecEvent::from_parts(kind, data)
}

/// Decode a terminal-session frame
pub fn decode_terminal(frame: &str) -> TerminalEvent {
    let value: Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "malformed frame on terminal session");
            return TerminalEvent::Malformed;
        }
    };
    let (kind, data) = split_envelope(value);
    match data {
        Value::String(text) if kind == "data" => TerminalEvent::Data(text),
        _ if kind == "session_end" => TerminalEvent::SessionEnd,
        payload => TerminalEvent::Unknown { kind, payload },
    }
}

/// Split `{type, data}` into its tag and payload. Anything that is not an
/// object with a string `type` gets an empty tag and is kept whole as payload.
fn split_envelope(value: Value) -> (String, Value) {
    match value {
        Value::Object(mut envelope) => match envelope.remove("type") {
            Some(Value::String(kind)) => {
                let data = envelope.remove("data").unwrap_or(Value::Null);
                (kind, data)
            }
            Some(other) => {
                envelope.insert("type".to_string(), other);
                (String::new(), Value::Object(envelope))
            }
            None => (String::new(), Value::Object(envelope)),
        },
        other => (String::new(), other),
    }
}
