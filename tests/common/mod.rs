#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone};
use runlink::config::Endpoints;
use runlink::executor::{Executor, Line, LineKind};
use runlink::protocol::ExecEvent;
use runlink::session::SessionFactory;
use runlink::transport::{MemoryPeer, MemoryServer, MemoryTransport};
use serde_json::{Value, json};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

/// Await `future`, failing the test if it takes longer than a few seconds
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting")
}

pub fn test_endpoints() -> Endpoints {
    Endpoints::new("http://studio.test:8000", "/ws", "/ws/terminal").unwrap()
}

/// Session factory whose sockets are served by the returned `MemoryServer`
pub fn memory_sessions() -> (SessionFactory, MemoryServer) {
    let (transport, server) = MemoryTransport::new();
    (SessionFactory::new(test_endpoints(), Arc::new(transport)), server)
}

/// Executor whose runs are served by the returned `MemoryServer`
pub fn memory_executor() -> (Executor, MemoryServer) {
    let (sessions, server) = memory_sessions();
    (Executor::new(sessions, 1000), server)
}

pub async fn accept(server: &mut MemoryServer) -> MemoryPeer {
    within(server.accept()).await.expect("no connection")
}

pub async fn recv_json(peer: &mut MemoryPeer) -> Value {
    within(peer.recv_json()).await.expect("client closed")
}

/// Wait until the client closes its side, returning the frames it sent first
pub async fn drain_until_closed(peer: &mut MemoryPeer) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = within(peer.recv()).await {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

/// Event callback for a controller plus the receiver its events land in
pub fn event_channel<E: Send + 'static>() -> (impl FnMut(E) + Send + 'static, mpsc::UnboundedReceiver<E>)
{
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |event| {
            let _ = tx.send(event);
        },
        rx,
    )
}

pub async fn next_event<E>(rx: &mut mpsc::UnboundedReceiver<E>) -> E {
    within(rx.recv()).await.expect("event channel closed")
}

/// Process the next event of the executor's active run
pub async fn next_run_event(executor: &mut Executor) -> ExecEvent {
    within(executor.next_event())
        .await
        .expect("no event for the active run")
}

pub fn stdout_frame(text: &str) -> Value {
    json!({"type": "run_stdout", "data": {"text": text}})
}

pub fn stderr_frame(text: &str) -> Value {
    json!({"type": "run_stderr", "data": {"text": text}})
}

pub fn status_frame(state: &str, pid: u32) -> Value {
    json!({"type": "run_status", "data": {"state": state, "pid": pid}})
}

pub fn run_end_frame(code: i64, elapsed_ms: u64) -> Value {
    json!({"type": "run_end", "data": {"status": "ok", "returnCode": code, "elapsedMs": elapsed_ms}})
}

/// Helper to create a line with a fixed timestamp
pub fn create_test_line(kind: LineKind, text: &str) -> Line {
    let fixed_time = Local.with_ymd_and_hms(2024, 12, 10, 12, 0, 0).unwrap();
    Line::new_with_time(kind, text, fixed_time)
}

/// Render history lines as `kind: text`, one per line, for snapshots
pub fn render_history(lines: &[Line]) -> String {
    lines
        .iter()
        .map(|line| format!("{}: {}", line.kind.label(), line.text))
        .collect::<Vec<_>>()
        .join("\n")
}
