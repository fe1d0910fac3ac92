// Wire protocol for remote run and terminal sessions
// JSON text frames: commands carry an "op" tag, events a "type" tag with a "data" payload

pub mod codec;
pub mod command;
pub mod event;
pub mod message;

pub use codec::{MALFORMED_MESSAGE, decode_exec, decode_terminal, encode};
pub use command::{ExecCommand, OutboundCommand, StartOptions, TerminalCommand};
pub use event::{ErrorEvent, ExecEvent, RunEnd, RunStatus, TerminalEvent};
pub use message::extract_message;
