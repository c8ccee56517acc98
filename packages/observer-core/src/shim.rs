//! Capture/command shim (§4.F): the same `capture_pane`/`send_keys`
//! surface, backed by either a live control-mode session (streaming mode,
//! routed through the [`SessionManager`]) or a one-shot `tmux` child
//! process (polling mode, and wherever streaming mode has no client for a
//! pane's session yet — e.g. during the very first discovery tick), or an
//! in-memory [`FakeBackend`] an integration test can seed directly so it
//! never has to shell out to a real `tmux` binary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::process::Command;

use crate::control_mode::parse_cursor_reply;
use crate::error::{ObserverError, Result};
use crate::manager::SessionManager;

/// Which backend a shim call should use.
#[derive(Clone)]
pub enum Shim {
    Streaming(Arc<SessionManager>),
    OneShot { mux_socket: Option<String> },
    Fake(FakeBackend),
}

impl Shim {
    pub async fn capture_pane(
        &self,
        session: &str,
        pane_id: &str,
        lines: usize,
    ) -> Result<Vec<String>> {
        match self {
            Shim::Streaming(manager) => manager.capture_pane(session, pane_id, lines).await,
            Shim::OneShot { mux_socket } => {
                capture_pane_oneshot(mux_socket.as_deref(), pane_id, lines).await
            }
            Shim::Fake(fake) => fake.capture_pane(pane_id),
        }
    }

    pub async fn send_keys(
        &self,
        session: &str,
        pane_id: &str,
        text: &str,
        submit: bool,
    ) -> Result<()> {
        match self {
            Shim::Streaming(manager) => manager.send_keys(session, pane_id, text, submit).await,
            Shim::OneShot { mux_socket } => {
                send_keys_oneshot(mux_socket.as_deref(), pane_id, text, submit).await
            }
            Shim::Fake(fake) => fake.send_keys(pane_id, text, submit),
        }
    }

    /// `(cursor_x, cursor_y_within_visible, pane_height)`, uninterpreted —
    /// the caller converts to an absolute line index (§4.G).
    pub async fn cursor_raw(&self, session: &str, pane_id: &str) -> Result<(u32, u32, u32)> {
        match self {
            Shim::Streaming(manager) => manager.cursor_position(session, pane_id).await,
            Shim::OneShot { mux_socket } => cursor_oneshot(mux_socket.as_deref(), pane_id).await,
            Shim::Fake(fake) => fake.cursor_raw(pane_id),
        }
    }
}

/// One pane's state as seeded into a [`FakeBackend`].
#[derive(Debug, Clone, Default)]
struct FakePaneFixture {
    lines: Vec<String>,
    cursor: (u32, u32, u32),
    sent: Vec<(String, bool)>,
}

/// An in-memory stand-in for a live `tmux` backend, seeded directly by a
/// test instead of shelling out to a real multiplexer. Exists so integration
/// tests can drive `Observer` through `on_pane_output`/`emit_pane_update`
/// and assert on the resulting `Event::PaneUpdate`, not just on internal
/// bookkeeping like a debounce-task-map size (§8 property 5 requires the
/// event itself, not a proxy for it).
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    panes: Arc<Mutex<HashMap<String, FakePaneFixture>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed (or replace) the lines a subsequent `capture_pane` call for this
    /// pane returns.
    pub fn set_lines(&self, pane_id: &str, lines: Vec<String>) {
        let mut guard = self.panes.lock().unwrap();
        guard.entry(pane_id.to_string()).or_default().lines = lines;
    }

    /// Seed the `(cursor_x, cursor_y_within_visible, pane_height)` a
    /// subsequent `cursor_raw` call for this pane returns.
    pub fn set_cursor(&self, pane_id: &str, cursor: (u32, u32, u32)) {
        let mut guard = self.panes.lock().unwrap();
        guard.entry(pane_id.to_string()).or_default().cursor = cursor;
    }

    /// Every `(text, submit)` pair recorded by `send_keys` for this pane, in
    /// call order.
    pub fn sent_keys(&self, pane_id: &str) -> Vec<(String, bool)> {
        self.panes
            .lock()
            .unwrap()
            .get(pane_id)
            .map(|p| p.sent.clone())
            .unwrap_or_default()
    }

    fn capture_pane(&self, pane_id: &str) -> Result<Vec<String>> {
        self.panes
            .lock()
            .unwrap()
            .get(pane_id)
            .map(|p| p.lines.clone())
            .ok_or_else(|| ObserverError::CaptureFailed {
                pane_id: pane_id.to_string(),
                message: "no fixture seeded for this pane".to_string(),
            })
    }

    fn send_keys(&self, pane_id: &str, text: &str, submit: bool) -> Result<()> {
        let mut guard = self.panes.lock().unwrap();
        guard
            .entry(pane_id.to_string())
            .or_default()
            .sent
            .push((text.to_string(), submit));
        Ok(())
    }

    fn cursor_raw(&self, pane_id: &str) -> Result<(u32, u32, u32)> {
        Ok(self
            .panes
            .lock()
            .unwrap()
            .get(pane_id)
            .map(|p| p.cursor)
            .unwrap_or((0, 0, 0)))
    }
}

async fn cursor_oneshot(socket: Option<&str>, pane_id: &str) -> Result<(u32, u32, u32)> {
    let args = [
        "display-message".to_string(),
        "-t".to_string(),
        pane_id.to_string(),
        "-p".to_string(),
        "#{cursor_x}|#{cursor_y}|#{pane_height}".to_string(),
    ];
    let out = run(socket, &args).await?;
    parse_cursor_reply(&out)
}

fn mux_args(socket: Option<&str>) -> Vec<String> {
    match socket {
        Some(s) => vec!["-S".to_string(), s.to_string()],
        None => Vec::new(),
    }
}

async fn run(socket: Option<&str>, args: &[String]) -> Result<String> {
    let mut full = mux_args(socket);
    full.extend(args.iter().cloned());
    let output = Command::new("tmux")
        .args(&full)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ObserverError::MuxAbsent
            } else {
                ObserverError::ProtocolSpawnFailed(e.to_string())
            }
        })?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    Err(ObserverError::CommandFailed {
        message: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// `capture-pane -p -e -t <pid> -S -<N>`.
pub async fn capture_pane_oneshot(
    socket: Option<&str>,
    pane_id: &str,
    lines: usize,
) -> Result<Vec<String>> {
    let args = [
        "capture-pane".to_string(),
        "-p".to_string(),
        "-e".to_string(),
        "-t".to_string(),
        pane_id.to_string(),
        "-S".to_string(),
        format!("-{}", lines),
    ];
    let out = run(socket, &args).await.map_err(|e| match e {
        ObserverError::CommandFailed { message } => ObserverError::CaptureFailed {
            pane_id: pane_id.to_string(),
            message,
        },
        other => other,
    })?;
    Ok(out.lines().map(|l| l.to_string()).collect())
}

/// `send-keys -t <pid> -l <text>`, optionally followed by `send-keys -t
/// <pid> Enter`.
pub async fn send_keys_oneshot(
    socket: Option<&str>,
    pane_id: &str,
    text: &str,
    submit: bool,
) -> Result<()> {
    let args = [
        "send-keys".to_string(),
        "-t".to_string(),
        pane_id.to_string(),
        "-l".to_string(),
        text.to_string(),
    ];
    run(socket, &args).await.map_err(|e| match e {
        ObserverError::CommandFailed { message } => ObserverError::SendFailed {
            pane_id: pane_id.to_string(),
            message,
        },
        other => other,
    })?;

    if submit {
        let args = [
            "send-keys".to_string(),
            "-t".to_string(),
            pane_id.to_string(),
            "Enter".to_string(),
        ];
        run(socket, &args).await.map_err(|e| match e {
            ObserverError::CommandFailed { message } => ObserverError::SendFailed {
                pane_id: pane_id.to_string(),
                message,
            },
            other => other,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_args_empty_without_socket() {
        assert!(mux_args(None).is_empty());
    }

    #[test]
    fn mux_args_carries_socket_flag() {
        assert_eq!(mux_args(Some("/tmp/s")), vec!["-S", "/tmp/s"]);
    }
}
