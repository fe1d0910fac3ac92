use std::io::Write;
use std::sync::Arc;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::{UNKNOWN_EXIT_CODE, render_line};
use crate::cli::RunArgs;
use crate::config::Config;
use crate::executor::{Executor, LineHistory, LineKind};
use crate::protocol::{ExecEvent, StartOptions};
use crate::transport::WsTransport;

/// What the local user typed while a run is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// One line, without its terminator
    Line(String),
    /// Ctrl-C read as a byte while echo is hidden
    Interrupt,
}

/// Prints history lines not shown yet
struct Printer {
    shown: usize,
    plain: bool,
}

impl Printer {
    fn flush(&mut self, history: &LineHistory) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        let mut stderr = std::io::stderr().lock();
        for line in history.since(self.shown) {
            let text = render_line(line, self.plain);
            match line.kind {
                LineKind::Stdout => writeln!(stdout, "{}", text)?,
                LineKind::Stderr | LineKind::System => writeln!(stderr, "{}", text)?,
            }
        }
        stdout.flush()?;
        self.shown = history.len();
        Ok(())
    }
}

/// Raw mode while a password is typed, so the terminal does not echo it
struct HiddenEcho;

impl HiddenEcho {
    fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for HiddenEcho {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        println!();
    }
}

/// Splits raw stdin bytes into lines. Accepts `\n`, `\r` and `\r\n`
/// terminators and applies backspace, which raw mode leaves to us.
#[derive(Default)]
struct LineSplitter {
    buf: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    fn feed(&mut self, bytes: &[u8], out: &mut Vec<Input>) {
        for &byte in bytes {
            let after_cr = std::mem::take(&mut self.after_cr);
            match byte {
                b'\n' if after_cr => {}
                b'\n' => out.push(self.take_line()),
                b'\r' => {
                    self.after_cr = true;
                    out.push(self.take_line());
                }
                0x03 => out.push(Input::Interrupt),
                0x7f | 0x08 => self.backspace(),
                _ => self.buf.push(byte),
            }
        }
    }

    /// The unterminated tail left at EOF, if any
    fn finish(&mut self) -> Option<Input> {
        (!self.buf.is_empty()).then(|| self.take_line())
    }

    fn take_line(&mut self) -> Input {
        let bytes = std::mem::take(&mut self.buf);
        Input::Line(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn backspace(&mut self) {
        // Drop UTF-8 continuation bytes, then the lead byte
        while let Some(byte) = self.buf.pop() {
            if byte & 0b1100_0000 != 0b1000_0000 {
                break;
            }
        }
    }
}

fn forward_stdin(tx: mpsc::UnboundedSender<Input>) {
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut splitter = LineSplitter::default();
        let mut chunk = [0u8; 1024];
        let mut inputs = Vec::new();
        loop {
            match stdin.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    splitter.feed(&chunk[..n], &mut inputs);
                    for input in inputs.drain(..) {
                        if tx.send(input).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    debug!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
        if let Some(tail) = splitter.finish() {
            let _ = tx.send(tail);
        }
    });
}

/// Run `args.path` on the server and stream its output until `run_end`.
/// Returns the process exit code to use.
pub async fn run_script(config: &Config, args: &RunArgs) -> anyhow::Result<i32> {
    let executor = Executor::from_config(config, Arc::new(WsTransport))?;
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    forward_stdin(input_tx);
    let hide_echo = atty::is(atty::Stream::Stdin);
    attach(
        executor,
        &args.path,
        args.start_options(&config.default_start),
        input_rx,
        hide_echo,
    )
    .await
}

/// Start a run of `path` on `executor` and attach local input to it.
///
/// Lines go out as `stdin`, except the first line after an `input_request`,
/// which answers it with `input_reply`. Closing `input` sends `stdin_eof`.
/// With `hide_echo`, password prompts switch the terminal to raw mode until
/// the answer is read.
pub async fn attach(
    mut executor: Executor,
    path: &str,
    options: StartOptions,
    mut input: mpsc::UnboundedReceiver<Input>,
    hide_echo: bool,
) -> anyhow::Result<i32> {
    let mut printer = Printer {
        shown: 0,
        plain: !atty::is(atty::Stream::Stdout),
    };

    executor.run(path, options);

    let mut input_open = true;
    let mut awaiting_reply = false;
    let mut hidden: Option<HiddenEcho> = None;

    let mut exit_code = UNKNOWN_EXIT_CODE;
    loop {
        tokio::select! {
            event = executor.next_event() => {
                printer.flush(executor.history())?;
                match event {
                    Some(ExecEvent::RunEnd(end)) => {
                        exit_code = end
                            .return_code
                            .and_then(|code| i32::try_from(code).ok())
                            .unwrap_or(UNKNOWN_EXIT_CODE);
                        break;
                    }
                    Some(ExecEvent::InputRequest(request)) => {
                        print!("{}", request.prompt);
                        std::io::stdout().flush()?;
                        awaiting_reply = true;
                        if request.password && hide_echo && hidden.is_none() {
                            hidden = Some(HiddenEcho::enable()?);
                        }
                    }
                    Some(_) => {}
                    // The socket went away before run_end; the error line is already printed
                    None => break,
                }
            }
            received = input.recv(), if input_open => {
                input_open = received.is_some();
                let Some(controller) = executor.controller() else {
                    continue;
                };
                match received {
                    Some(Input::Line(line)) if awaiting_reply => {
                        awaiting_reply = false;
                        hidden = None;
                        controller.input_reply(line);
                    }
                    Some(Input::Line(line)) => controller.stdin(format!("{}\n", line)),
                    Some(Input::Interrupt) => controller.interrupt(),
                    None => {
                        if awaiting_reply {
                            awaiting_reply = false;
                            hidden = None;
                            controller.input_reply("");
                        }
                        controller.stdin_eof();
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                if let Some(controller) = executor.controller() {
                    controller.interrupt();
                }
            }
        }
    }

    drop(hidden);
    executor.shutdown();
    Ok(exit_code)
}
