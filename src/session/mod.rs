// Session controllers: one socket per remote run or terminal instance
// No reconnect: a dropped socket ends the session and callers open a new one

mod driver;
pub mod exec;
pub mod queue;
pub mod terminal;

use std::sync::Arc;

pub use exec::{CONNECTION_CLOSED, ExecController};
pub use queue::OutboundQueue;
pub use terminal::{TerminalController, normalize_cwd};

use crate::config::Endpoints;
use crate::protocol::{ExecEvent, StartOptions};
use crate::transport::Transport;

/// Opens execution and terminal sessions against one server
#[derive(Clone)]
pub struct SessionFactory {
    endpoints: Endpoints,
    transport: Arc<dyn Transport>,
}

impl SessionFactory {
    pub fn new(endpoints: Endpoints, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoints,
            transport,
        }
    }

    /// Open an execution session for `path`
    pub fn open_exec<F>(&self, path: &str, on_event: F, options: StartOptions) -> ExecController
    where
        F: FnMut(ExecEvent) + Send + 'static,
    {
        ExecController::open(
            Arc::clone(&self.transport),
            self.endpoints.exec_url(path),
            path,
            options,
            on_event,
        )
    }

    /// Open a terminal whose working directory is `cwd` under the workspace root
    pub fn open_terminal<D, X>(&self, cwd: &str, on_data: D, on_exit: X) -> TerminalController
    where
        D: FnMut(String) + Send + 'static,
        X: FnOnce() + Send + 'static,
    {
        let cwd = normalize_cwd(cwd);
        TerminalController::open(
            Arc::clone(&self.transport),
            self.endpoints.terminal_url(&cwd),
            cwd,
            on_data,
            on_exit,
        )
    }
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}
