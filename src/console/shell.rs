use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{Event, EventStream};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::keys::{self, KeyAction};
use crate::session::{SessionFactory, TerminalController};
use crate::transport::WsTransport;

/// Open a remote shell in `cwd` and pass the local terminal through to it
/// until the remote side exits or the user presses Ctrl-].
pub async fn run_terminal(config: &Config, cwd: &str) -> anyhow::Result<()> {
    let sessions = SessionFactory::new(config.endpoints()?, Arc::new(WsTransport));
    let (data_tx, mut data_rx) = mpsc::unbounded_channel::<String>();
    let (exit_tx, mut exit_rx) = oneshot::channel::<()>();

    let shell = sessions.open_terminal(
        cwd,
        move |data| {
            let _ = data_tx.send(data);
        },
        move || {
            let _ = exit_tx.send(());
        },
    );
    if let Ok((cols, rows)) = terminal::size() {
        shell.resize(rows, cols);
    }

    enable_raw_mode()?;
    let result = passthrough(&shell, &mut data_rx, &mut exit_rx).await;
    disable_raw_mode()?;

    // Write whatever arrived together with the exit
    let mut stdout = std::io::stdout();
    while let Ok(data) = data_rx.try_recv() {
        stdout.write_all(data.as_bytes())?;
    }
    stdout.flush()?;

    shell.close();
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        while !shell.is_finished() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    result
}

async fn passthrough(
    shell: &TerminalController,
    data_rx: &mut mpsc::UnboundedReceiver<String>,
    exit_rx: &mut oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let mut events = EventStream::new();
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            Some(data) = data_rx.recv() => {
                stdout.write_all(data.as_bytes())?;
                stdout.flush()?;
            }
            _ = &mut *exit_rx => break,
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) => match keys::translate(&key) {
                    KeyAction::Send(text) => shell.send(text),
                    KeyAction::Interrupt => shell.interrupt(),
                    KeyAction::Detach => {
                        shell.terminate();
                        break;
                    }
                    KeyAction::Ignore => {}
                },
                Some(Ok(Event::Paste(text))) => shell.send(text),
                Some(Ok(Event::Resize(cols, rows))) => shell.resize(rows, cols),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
                None => break,
            },
        }
    }
    Ok(())
}
