mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use runlink::protocol::{ExecEvent, MALFORMED_MESSAGE, StartOptions};
use runlink::session::CONNECTION_CLOSED;
use runlink::transport::TransportError;
use serde_json::json;
use tokio::sync::mpsc;

// ============================================================================
// Outbound ordering
// ============================================================================

#[tokio::test]
async fn test_commands_before_open_flush_after_start() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, _events) = event_channel();

    let exec = sessions.open_exec("job.py", on_event, StartOptions::default());
    exec.stdin("first\n");
    exec.interrupt();
    exec.stdin("second\n");
    assert!(!exec.is_open());

    let mut peer = accept(&mut server).await;
    assert_eq!(recv_json(&mut peer).await, json!({"op": "start"}));
    assert_eq!(recv_json(&mut peer).await, json!({"op": "stdin", "text": "first\n"}));
    assert_eq!(recv_json(&mut peer).await, json!({"op": "interrupt"}));
    assert_eq!(recv_json(&mut peer).await, json!({"op": "stdin", "text": "second\n"}));
    assert!(exec.is_open());
}

#[tokio::test]
async fn test_every_exec_method_sends_one_command() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, _events) = event_channel();
    let exec = sessions.open_exec("nb.ipynb", on_event, StartOptions::default());
    let mut peer = accept(&mut server).await;
    recv_json(&mut peer).await;

    exec.stdin("x");
    exec.stdin_with_id("y", "req-1");
    exec.stdin_eof();
    exec.interrupt();
    exec.terminate();
    exec.kill();
    exec.input_reply("42");
    exec.restart();
    exec.waldiez_respond(json!({"request_id": "r7", "data": "yes"}));
    exec.waldiez_control(json!({"action": "stop"}));
    exec.shutdown();
    exec.close();

    let mut frames = Vec::new();
    for _ in 0..12 {
        frames.push(recv_json(&mut peer).await);
    }
    assert_eq!(
        frames,
        vec![
            json!({"op": "stdin", "text": "x"}),
            json!({"op": "stdin", "text": "y", "request_id": "req-1"}),
            json!({"op": "stdin_eof"}),
            json!({"op": "interrupt"}),
            json!({"op": "terminate"}),
            json!({"op": "kill"}),
            json!({"op": "input_reply", "value": "42"}),
            json!({"op": "restart"}),
            json!({"op": "waldiez_respond", "payload": {"request_id": "r7", "data": "yes"}}),
            json!({"op": "waldiez_control", "payload": {"action": "stop"}}),
            json!({"op": "shutdown"}),
            json!({"op": "shutdown"}),
        ]
    );
}

#[tokio::test]
async fn test_controller_dropped_before_open_never_starts() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, _events) = event_channel::<ExecEvent>();

    let exec = sessions.open_exec("job.py", on_event, StartOptions::default());
    exec.stdin("ignored");
    drop(exec);

    let mut peer = accept(&mut server).await;
    assert!(drain_until_closed(&mut peer).await.is_empty());
}

// ============================================================================
// Inbound events
// ============================================================================

#[tokio::test]
async fn test_malformed_frame_reports_error_and_keeps_session() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, mut events) = event_channel();
    let exec = sessions.open_exec("job.py", on_event, StartOptions::default());
    let mut peer = accept(&mut server).await;
    recv_json(&mut peer).await;

    peer.send("{not json");
    peer.send_json(stdout_frame("still here"));

    match next_event(&mut events).await {
        ExecEvent::Error(err) => assert_eq!(err.message, MALFORMED_MESSAGE),
        other => panic!("expected error event, got {:?}", other),
    }
    match next_event(&mut events).await {
        ExecEvent::RunStdout(out) => assert_eq!(out.text, "still here"),
        other => panic!("expected stdout event, got {:?}", other),
    }
    assert!(exec.is_open());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_event_passes_through() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, mut events) = event_channel();
    let _exec = sessions.open_exec("flow.py", on_event, StartOptions::default());
    let mut peer = accept(&mut server).await;
    recv_json(&mut peer).await;

    peer.send_json(json!({"type": "debug_print", "data": {"line": 3}}));

    match next_event(&mut events).await {
        ExecEvent::Unknown { kind, payload } => {
            assert_eq!(kind, "debug_print");
            assert_eq!(payload, json!({"line": 3}));
        }
        other => panic!("expected unknown event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_close_after_run_end_adds_no_error() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, mut events) = event_channel();
    let exec = sessions.open_exec("job.py", on_event, StartOptions::default());
    let mut peer = accept(&mut server).await;
    recv_json(&mut peer).await;

    peer.send_json(run_end_frame(0, 9));
    peer.close();

    assert!(next_event(&mut events).await.is_run_end());
    assert!(within(events.recv()).await.is_none());
    assert!(exec.is_finished());
}

#[tokio::test]
async fn test_close_before_run_end_reports_connection_closed() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, mut events) = event_channel();
    let _exec = sessions.open_exec("job.py", on_event, StartOptions::default());
    let peer = accept(&mut server).await;
    peer.close();

    match next_event(&mut events).await {
        ExecEvent::Error(err) => assert_eq!(err.message, CONNECTION_CLOSED),
        other => panic!("expected error event, got {:?}", other),
    }
    assert!(within(events.recv()).await.is_none());
}

#[tokio::test]
async fn test_socket_error_becomes_error_event() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, mut events) = event_channel();
    let _exec = sessions.open_exec("job.py", on_event, StartOptions::default());
    let mut peer = accept(&mut server).await;
    recv_json(&mut peer).await;

    peer.fail(TransportError::Socket("connection reset".to_string()));

    match next_event(&mut events).await {
        ExecEvent::Error(err) => assert_eq!(err.message, "socket error: connection reset"),
        other => panic!("expected error event, got {:?}", other),
    }
    assert!(within(events.recv()).await.is_none());
}

#[tokio::test]
async fn test_commands_after_close_are_dropped() {
    let (sessions, mut server) = memory_sessions();
    let (on_event, mut events) = event_channel();
    let exec = sessions.open_exec("job.py", on_event, StartOptions::default());
    let peer = accept(&mut server).await;
    peer.close();
    next_event(&mut events).await;
    assert!(within(events.recv()).await.is_none());

    assert!(!exec.is_open());
    exec.stdin("too late");
    exec.kill();
    assert!(exec.is_finished());
}

// ============================================================================
// Terminal sessions
// ============================================================================

fn exit_counter() -> (Arc<AtomicUsize>, mpsc::UnboundedReceiver<()>, impl FnOnce() + Send + 'static)
{
    let count = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::unbounded_channel();
    let counter = Arc::clone(&count);
    let on_exit = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(());
    };
    (count, rx, on_exit)
}

#[tokio::test]
async fn test_resize_before_open_follows_start() {
    let (sessions, mut server) = memory_sessions();
    let (on_data, _data) = event_channel::<String>();
    let (_count, _exited, on_exit) = exit_counter();

    let shell = sessions.open_terminal("/projects/demo", on_data, on_exit);
    assert_eq!(shell.cwd(), "projects/demo");
    shell.resize(80, 24);
    assert!(!shell.ready());

    let mut peer = accept(&mut server).await;
    assert_eq!(
        peer.url().as_str(),
        "ws://studio.test:8000/ws/terminal?cwd=projects%2Fdemo"
    );
    assert_eq!(recv_json(&mut peer).await, json!({"op": "start"}));
    assert_eq!(
        recv_json(&mut peer).await,
        json!({"op": "resize", "rows": 80, "cols": 24})
    );
    assert!(shell.ready());
}

#[tokio::test]
async fn test_terminal_root_has_no_cwd_parameter() {
    let (sessions, mut server) = memory_sessions();
    let (on_data, _data) = event_channel::<String>();
    let (_count, _exited, on_exit) = exit_counter();

    let _shell = sessions.open_terminal("///", on_data, on_exit);
    let peer = accept(&mut server).await;
    assert_eq!(peer.url().as_str(), "ws://studio.test:8000/ws/terminal");
}

#[tokio::test]
async fn test_terminal_data_then_session_end() {
    let (sessions, mut server) = memory_sessions();
    let (on_data, mut data) = event_channel::<String>();
    let (count, mut exited, on_exit) = exit_counter();

    let shell = sessions.open_terminal("", on_data, on_exit);
    let mut peer = accept(&mut server).await;
    recv_json(&mut peer).await;

    shell.send("ls\r");
    shell.interrupt();
    shell.terminate();
    assert_eq!(recv_json(&mut peer).await, json!({"op": "stdin", "data": "ls\r"}));
    assert_eq!(recv_json(&mut peer).await, json!({"op": "interrupt"}));
    assert_eq!(recv_json(&mut peer).await, json!({"op": "terminate"}));

    peer.send_json(json!({"type": "data", "data": "README.md\r\n"}));
    peer.send("garbage");
    peer.send_json(json!({"type": "bell"}));
    peer.send_json(json!({"type": "session_end"}));
    peer.close();

    assert_eq!(next_event(&mut data).await, "README.md\r\n");
    within(exited.recv()).await;
    assert!(within(data.recv()).await.is_none());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_terminal_socket_loss_exits_once() {
    let (sessions, mut server) = memory_sessions();
    let (on_data, _data) = event_channel::<String>();
    let (count, mut exited, on_exit) = exit_counter();

    let shell = sessions.open_terminal("work", on_data, on_exit);
    let peer = accept(&mut server).await;
    peer.close();

    within(exited.recv()).await;
    assert!(within(exited.recv()).await.is_none());
    assert_eq!(count.load(Ordering::SeqCst), 1);

    shell.send("echo lost\r");
    assert!(!shell.ready());
}

#[tokio::test]
async fn test_terminal_local_close_skips_exit_callback() {
    let (sessions, mut server) = memory_sessions();
    let (on_data, _data) = event_channel::<String>();
    let (count, mut exited, on_exit) = exit_counter();

    let shell = sessions.open_terminal("work", on_data, on_exit);
    let mut peer = accept(&mut server).await;
    recv_json(&mut peer).await;

    shell.terminate();
    shell.close();

    assert_eq!(drain_until_closed(&mut peer).await, vec![json!({"op": "terminate"})]);
    assert!(within(exited.recv()).await.is_none());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}
