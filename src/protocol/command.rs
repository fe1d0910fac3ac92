use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A client-to-server instruction that can wait in an outbound queue
pub trait OutboundCommand: Serialize + Debug {
    /// Whether this command tells the remote side to start.
    /// Start commands are always flushed ahead of anything buffered with them.
    fn is_start(&self) -> bool;
}

/// Parameters sent with the `start` op of an execution session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv: Option<String>,
    /// Run `python -m <module>` instead of the target file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, alias = "fresh_kernel", skip_serializing_if = "is_false")]
    pub fresh_kernel: bool,
    #[serde(default, alias = "timeout_sec", skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl StartOptions {
    /// Fill unset fields from `defaults`. Args are kept as given unless empty;
    /// env entries from both sides are merged with `self` winning.
    pub fn or_defaults(mut self, defaults: &StartOptions) -> Self {
        if self.args.is_empty() {
            self.args = defaults.args.clone();
        }
        for (key, value) in &defaults.env {
            self.env.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self.cwd = self.cwd.or_else(|| defaults.cwd.clone());
        self.venv = self.venv.or_else(|| defaults.venv.clone());
        self.module = self.module.or_else(|| defaults.module.clone());
        self.fresh_kernel |= defaults.fresh_kernel;
        self.timeout_sec = self.timeout_sec.or(defaults.timeout_sec);
        self
    }
}

/// Commands accepted by an execution session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ExecCommand {
    Start(StartOptions),
    Stdin {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    StdinEof,
    Interrupt,
    Terminate,
    Kill,
    Shutdown,
    /// Answer to a notebook kernel's `input_request`
    InputReply {
        value: String,
    },
    /// Restart the notebook kernel
    Restart,
    /// Answer to a prompt raised by a flow run
    WaldiezRespond { payload: Value },
    /// Control message for a flow run (stop, skip, ...)
    WaldiezControl { payload: Value },
}

impl OutboundCommand for ExecCommand {
    fn is_start(&self) -> bool {
        matches!(self, ExecCommand::Start(_))
    }
}

/// Commands accepted by an interactive terminal session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TerminalCommand {
    Start,
    Stdin { data: String },
    Resize { rows: u16, cols: u16 },
    Interrupt,
    Terminate,
}

impl OutboundCommand for TerminalCommand {
    fn is_start(&self) -> bool {
        matches!(self, TerminalCommand::Start)
    }
}
