use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::extract_message;

/// `run_status`: lifecycle change of the remote process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl RunStatus {
    /// One-line summary used for the `system` history line
    pub fn summary(&self) -> String {
        match self.pid {
            Some(pid) => format!("status: {} (pid {pid})", self.state),
            None => format!("status: {}", self.state),
        }
    }
}

/// Text chunk written by the remote process to stdout or stderr
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamText {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdinAck {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdinError {
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStart {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEnd {
    pub index: usize,
    #[serde(default)]
    pub status: String,
}

/// Rich output of a notebook cell; images arrive base64-encoded in `b64`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellOutput {
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub password: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelStatus {
    #[serde(default, alias = "execution_state")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStart {
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileEnd {
    #[serde(default, alias = "py")]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    #[serde(default)]
    pub message: String,
}

/// `run_end`: the remote run finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEnd {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl RunEnd {
    /// One-line summary used for the `system` history line
    pub fn summary(&self) -> String {
        let code = self
            .return_code
            .map_or_else(|| "?".to_string(), |code| code.to_string());
        let elapsed = self
            .elapsed_ms
            .map_or_else(|| "?".to_string(), |ms| format!("{ms}ms"));
        format!("run ended: status={} code={code} elapsed={elapsed}", self.status)
    }
}

/// `error`: a server-reported or locally synthesized failure
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    /// Display text, already normalized
    pub message: String,
    /// The payload as received (a plain string for synthesized errors)
    pub payload: Value,
}

impl ErrorEvent {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            payload: Value::String(message.clone()),
            message,
        }
    }

    /// A `message` string field is used directly; anything else goes
    /// through the generic message extraction.
    pub fn from_payload(payload: Value) -> Self {
        let message = match payload.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => extract_message(&payload),
        };
        Self { message, payload }
    }
}

/// Inbound event of an execution session
#[derive(Debug, Clone, PartialEq)]
pub enum ExecEvent {
    RunStatus(RunStatus),
    RunStdout(StreamText),
    RunStderr(StreamText),
    RunStdinAck(StdinAck),
    RunStdinError(StdinError),
    CellStart(CellStart),
    CellEnd(CellEnd),
    CellOutput(CellOutput),
    InputRequest(InputRequest),
    KernelStatus(KernelStatus),
    CompileStart(CompileStart),
    CompileEnd(CompileEnd),
    CompileError(CompileError),
    RunEnd(RunEnd),
    Error(ErrorEvent),
    /// A tag this client does not know, or a known tag whose payload did not
    /// match its expected shape. Kept so newer servers never break the client.
    Unknown { kind: String, payload: Value },
}

impl ExecEvent {
    /// Build an event from its wire tag and `data` payload
    pub fn from_parts(kind: String, data: Value) -> Self {
        let event = match kind.as_str() {
            "run_status" => typed(&data).map(ExecEvent::RunStatus),
            "run_stdout" => Some(ExecEvent::RunStdout(StreamText {
                text: stdout_text(&data),
            })),
            "run_stderr" => Some(ExecEvent::RunStderr(StreamText {
                text: extract_message(&data),
            })),
            "run_stdin_ack" => typed(&data).map(ExecEvent::RunStdinAck),
            "run_stdin_error" => typed(&data).map(ExecEvent::RunStdinError),
            "cell_start" => typed(&data).map(ExecEvent::CellStart),
            "cell_end" => typed(&data).map(ExecEvent::CellEnd),
            "cell_output" => typed(&data).map(ExecEvent::CellOutput),
            "input_request" => typed(&data).map(ExecEvent::InputRequest),
            "kernel_status" => typed(&data).map(ExecEvent::KernelStatus),
            "compile_start" => typed(&data).map(ExecEvent::CompileStart),
            "compile_end" => typed(&data).map(ExecEvent::CompileEnd),
            "compile_error" => typed(&data).map(ExecEvent::CompileError),
            "run_end" => typed(&data).map(ExecEvent::RunEnd),
            "error" => Some(ExecEvent::Error(ErrorEvent::from_payload(data.clone()))),
            _ => None,
        };
        event.unwrap_or_else(|| ExecEvent::Unknown { kind, payload: data })
    }

    /// The wire tag of this event
    pub fn kind(&self) -> &str {
        match self {
            ExecEvent::RunStatus(_) => "run_status",
            ExecEvent::RunStdout(_) => "run_stdout",
            ExecEvent::RunStderr(_) => "run_stderr",
            ExecEvent::RunStdinAck(_) => "run_stdin_ack",
            ExecEvent::RunStdinError(_) => "run_stdin_error",
            ExecEvent::CellStart(_) => "cell_start",
            ExecEvent::CellEnd(_) => "cell_end",
            ExecEvent::CellOutput(_) => "cell_output",
            ExecEvent::InputRequest(_) => "input_request",
            ExecEvent::KernelStatus(_) => "kernel_status",
            ExecEvent::CompileStart(_) => "compile_start",
            ExecEvent::CompileEnd(_) => "compile_end",
            ExecEvent::CompileError(_) => "compile_error",
            ExecEvent::RunEnd(_) => "run_end",
            ExecEvent::Error(_) => "error",
            ExecEvent::Unknown { kind, .. } => kind,
        }
    }

    pub fn is_run_end(&self) -> bool {
        matches!(self, ExecEvent::RunEnd(_))
    }
}

/// Missing `data` is treated as an empty object so all-default payloads decode
fn typed<T: DeserializeOwned>(data: &Value) -> Option<T> {
    let source = if data.is_null() {
        Value::Object(Map::new())
    } else {
        data.clone()
    };
    serde_json::from_value(source).ok()
}

fn stdout_text(data: &Value) -> String {
    match data.get("text").and_then(Value::as_str) {
        Some(text) => text.to_string(),
        None => extract_message(data),
    }
}

/// Inbound event of an interactive terminal session
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalEvent {
    /// Raw output chunk to display
    Data(String),
    /// The remote shell exited
    SessionEnd,
    /// Frame was not valid JSON
    Malformed,
    Unknown { kind: String, payload: Value },
}
