//! Session client for tmux control mode.
//!
//! Spawns `tmux -C attach-session -t <session>` and speaks the control-mode
//! line protocol over its stdin/stdout. Unlike `tmux -CC` (used by GUI
//! front-ends, which need a PTY to negotiate terminal geometry) plain `-C`
//! is designed for scripting and works fine over a pipe.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use super::octal::encode_octal;
use super::parser::{ControlModeEvent, Parser};
use crate::error::{ObserverError, Result};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Result of a completed `%begin`/`%end`/`%error` block.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub output: String,
    pub success: bool,
}

type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<CommandResponse>>>>;

/// A live control-mode connection to one tmux session.
///
/// `start()` hands back a channel of every notification that is not a
/// command response (output, window/session changes, pane-mode changes);
/// the channel closing is the disconnect signal. That receiver is owned
/// independently of this struct precisely so a long-lived forwarding loop
/// over it never has to hold a lock that command methods (`send_command`,
/// `capture_pane`, `send_keys`) also need.
pub struct SessionClient {
    session_name: String,
    socket: Option<String>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    command_counter: AtomicU32,
    pending: PendingMap,
}

impl SessionClient {
    pub fn new(session_name: impl Into<String>, socket: Option<String>) -> Self {
        Self {
            session_name: session_name.into(),
            socket,
            child: None,
            stdin: None,
            command_counter: AtomicU32::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Idempotent: does nothing if already started. Returns a receiver of
    /// every notification that is not a command response (output,
    /// topology, mode changes); the channel closes when the reader task
    /// exits, which is the client's disconnect signal.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<ControlModeEvent>> {
        if self.child.is_some() {
            return Err(ObserverError::ProtocolSpawnFailed(
                "already started".into(),
            ));
        }

        let mut args: Vec<&str> = Vec::with_capacity(5);
        if let Some(socket) = &self.socket {
            args.push("-S");
            args.push(socket);
        }
        args.extend(["-C", "attach-session", "-t", &self.session_name]);

        let mut child = Command::new("tmux")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ObserverError::ProtocolSpawnFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ObserverError::ProtocolSpawnFailed("no stdin handle".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ObserverError::ProtocolSpawnFailed("no stdout handle".into()))?;

        let (tx, rx) = mpsc::channel(1000);
        let pending = self.pending.clone();
        let session_name = self.session_name.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut parser = Parser::new();
            let mut raw = Vec::new();

            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) => {
                        debug!(session = %session_name, "control-mode stdout closed");
                        break;
                    }
                    Ok(_) => {
                        while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
                            raw.pop();
                        }
                        // tmux output is not guaranteed valid UTF-8 once pane
                        // content flows through; decode losslessly for
                        // control lines but never drop the connection over a
                        // stray invalid byte.
                        let line = String::from_utf8_lossy(&raw).into_owned();
                        if let Some(event) = parser.parse_line(&line) {
                            if let ControlModeEvent::CommandResponse {
                                command_num,
                                output,
                                success,
                                ..
                            } = &event
                            {
                                let mut guard = pending.lock().await;
                                if let Some(sender) = guard.remove(command_num) {
                                    let _ = sender.send(CommandResponse {
                                        output: output.clone(),
                                        success: *success,
                                    });
                                    continue;
                                }
                            }
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(session = %session_name, error = %e, "control-mode read error");
                        break;
                    }
                }
            }
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(rx)
    }

    /// Idempotent: SIGTERM, wait up to 2s, then force-kill.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        self.stdin = None;

        if let Some(pid) = child.id() {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }

        let mut pending = self.pending.lock().await;
        pending.clear();
        Ok(())
    }

    pub fn is_alive(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Send a command and wait for its response, correlated by command
    /// number, with a fixed timeout.
    pub async fn send_command(&mut self, cmd: &str) -> Result<CommandResponse> {
        if self.child.is_none() {
            return Err(ObserverError::ProtocolNotRunning {
                session: self.session_name.clone(),
            });
        }

        let command_num = self.command_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let (resp_tx, resp_rx) = oneshot::channel();
        self.pending.lock().await.insert(command_num, resp_tx);

        let payload = encode_octal(cmd.as_bytes());
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ObserverError::ProtocolNotRunning {
                session: self.session_name.clone(),
            })?;

        if let Err(e) = stdin.write_all(format!("{}\n", payload).as_bytes()).await {
            self.pending.lock().await.remove(&command_num);
            return Err(ObserverError::ProtocolIoFailed(e.to_string()));
        }
        if let Err(e) = stdin.flush().await {
            self.pending.lock().await.remove(&command_num);
            return Err(ObserverError::ProtocolIoFailed(e.to_string()));
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, resp_rx).await {
            Ok(Ok(response)) => {
                if response.success {
                    Ok(response)
                } else {
                    Err(ObserverError::CommandFailed {
                        message: response.output,
                    })
                }
            }
            Ok(Err(_)) => Err(ObserverError::ProtocolIoFailed(
                "response channel closed".into(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&command_num);
                Err(ObserverError::ProtocolTimeout { command_num })
            }
        }
    }

    /// Capture the scrollback of a pane via control mode rather than a
    /// one-shot subprocess.
    pub async fn capture_pane(&mut self, pane_id: &str, lines: usize) -> Result<Vec<String>> {
        let cmd = format!("capture-pane -p -e -t {} -S -{}", pane_id, lines);
        let response = self.send_command(&cmd).await.map_err(|e| match e {
            ObserverError::CommandFailed { message } => ObserverError::CaptureFailed {
                pane_id: pane_id.to_string(),
                message,
            },
            other => other,
        })?;
        Ok(response.output.lines().map(|l| l.to_string()).collect())
    }

    /// Send literal text to the pane, then an `Enter` keystroke if
    /// requested. Mirrors the one-shot shim's two-step send in streaming
    /// mode: `send-keys -l <text>` followed by `send-keys Enter`.
    pub async fn send_keys(&mut self, pane_id: &str, text: &str, submit: bool) -> Result<()> {
        let cmd = format!("send-keys -t {} -l {}", pane_id, shell_quote(text));
        self.send_command(&cmd)
            .await
            .map_err(|e| to_send_failed(pane_id, e))?;
        if submit {
            let cmd = format!("send-keys -t {} Enter", pane_id);
            self.send_command(&cmd)
                .await
                .map_err(|e| to_send_failed(pane_id, e))?;
        }
        Ok(())
    }

    /// Query cursor position and pane height via `display-message`,
    /// returning `(cursor_x, cursor_y_within_visible, pane_height)`.
    pub async fn cursor_position(&mut self, pane_id: &str) -> Result<(u32, u32, u32)> {
        let cmd = format!(
            "display-message -t {} -p \"#{{cursor_x}}|#{{cursor_y}}|#{{pane_height}}\"",
            pane_id
        );
        let response = self.send_command(&cmd).await?;
        parse_cursor_reply(&response.output)
    }
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

fn to_send_failed(pane_id: &str, err: ObserverError) -> ObserverError {
    match err {
        ObserverError::CommandFailed { message } => ObserverError::SendFailed {
            pane_id: pane_id.to_string(),
            message,
        },
        other => other,
    }
}

pub(crate) fn parse_cursor_reply(output: &str) -> Result<(u32, u32, u32)> {
    let line = output.lines().next().unwrap_or("").trim();
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() != 3 {
        return Err(ObserverError::CommandFailed {
            message: format!("unexpected display-message reply: {:?}", output),
        });
    }
    let cursor_x = parts[0].parse().unwrap_or(0);
    let cursor_y = parts[1].parse().unwrap_or(0);
    let pane_height = parts[2].parse().unwrap_or(0);
    Ok((cursor_x, cursor_y, pane_height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_wraps_in_single_quotes() {
        assert_eq!(shell_quote("hello"), "'hello'");
    }

    #[test]
    fn shell_quote_escapes_embedded_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn parse_cursor_reply_splits_three_fields() {
        let (x, y, height) = parse_cursor_reply("3|5|24\n").unwrap();
        assert_eq!((x, y, height), (3, 5, 24));
    }

    #[test]
    fn parse_cursor_reply_rejects_malformed_output() {
        assert!(parse_cursor_reply("garbage").is_err());
    }
}
