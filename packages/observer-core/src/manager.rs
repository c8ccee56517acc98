//! Session manager (§4.C): discovers sessions, owns one [`SessionClient`]
//! per session, and reconnects on loss with bounded exponential back-off.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::control_mode::{ControlModeEvent, SessionClient};
use crate::discovery;
use crate::error::{ObserverError, Result};

/// A notification forwarded from some session's control-mode connection,
/// tagged with the session it came from.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    Output {
        session: String,
        pane_id: String,
        data: String,
    },
    WindowChange {
        session: String,
    },
    SessionsChanged,
    Disconnected {
        session: String,
    },
}

/// Exponential back-off delays for up to `attempts` reconnect tries,
/// starting at `initial` and doubling each time. Pulled out as a pure
/// function so the doubling schedule (§8 scenario S6) is testable without
/// spawning real subprocesses.
pub fn backoff_schedule(initial: Duration, attempts: u32) -> Vec<Duration> {
    let mut delays = Vec::with_capacity(attempts as usize);
    let mut delay = initial;
    for _ in 0..attempts {
        delays.push(delay);
        delay *= 2;
    }
    delays
}

pub struct SessionManager {
    mux_socket: Option<String>,
    reconnect_delay: Duration,
    max_reconnects: u32,
    clients: Mutex<HashMap<String, Arc<Mutex<SessionClient>>>>,
    reconnect_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    running: AtomicBool,
    event_tx: mpsc::Sender<ManagerEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<ManagerEvent>>>,
}

impl SessionManager {
    pub fn new(mux_socket: Option<String>, reconnect_delay: Duration, max_reconnects: u32) -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::channel(4096);
        Arc::new(Self {
            mux_socket,
            reconnect_delay,
            max_reconnects,
            clients: Mutex::new(HashMap::new()),
            reconnect_tasks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        })
    }

    /// Hands over the event stream; called exactly once by whoever drives
    /// the manager (the observer daemon).
    pub async fn take_events(&self) -> mpsc::Receiver<ManagerEvent> {
        self.event_rx
            .lock()
            .await
            .take()
            .expect("SessionManager::take_events called twice")
    }

    /// Idempotent: performs initial discovery and attach.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.refresh_sessions().await
    }

    /// List currently existing sessions; attach clients for new names,
    /// drop clients for names tmux no longer reports.
    pub async fn refresh_sessions(self: &Arc<Self>) -> Result<()> {
        let sessions = discovery::list_sessions(self.mux_socket.as_deref()).await?;
        let tracked: Vec<String> = self.clients.lock().await.keys().cloned().collect();

        for name in &sessions {
            if !tracked.contains(name) {
                self.spawn_client(name.clone()).await;
            }
        }
        for name in &tracked {
            if !sessions.contains(name) {
                self.drop_client(name).await;
            }
        }
        Ok(())
    }

    async fn spawn_client(self: &Arc<Self>, session: String) {
        let mut client = SessionClient::new(session.clone(), self.mux_socket.clone());
        match client.start().await {
            Ok(rx) => {
                let client = Arc::new(Mutex::new(client));
                self.clients.lock().await.insert(session.clone(), client);
                self.spawn_forwarder(session, rx);
            }
            Err(e) => {
                warn!(session = %session, error = %e, "session manager: failed to attach");
            }
        }
    }

    fn spawn_forwarder(self: &Arc<Self>, session: String, mut rx: mpsc::Receiver<ControlModeEvent>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let forwarded = match event {
                    ControlModeEvent::Output { pane_id, content } => Some(ManagerEvent::Output {
                        session: session.clone(),
                        pane_id,
                        data: String::from_utf8_lossy(&content).into_owned(),
                    }),
                    ControlModeEvent::WindowAdd { .. }
                    | ControlModeEvent::WindowClose { .. }
                    | ControlModeEvent::WindowRenamed { .. } => Some(ManagerEvent::WindowChange {
                        session: session.clone(),
                    }),
                    ControlModeEvent::SessionsChanged => Some(ManagerEvent::SessionsChanged),
                    _ => None,
                };
                if let Some(event) = forwarded {
                    if this.event_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            this.on_disconnect(session).await;
        });
    }

    async fn on_disconnect(self: &Arc<Self>, session: String) {
        debug!(session = %session, "session manager: client disconnected");
        self.clients.lock().await.remove(&session);
        let _ = self
            .event_tx
            .send(ManagerEvent::Disconnected {
                session: session.clone(),
            })
            .await;
        if self.running.load(Ordering::SeqCst) {
            self.schedule_reconnect(session).await;
        }
    }

    async fn schedule_reconnect(self: &Arc<Self>, session: String) {
        {
            let tasks = self.reconnect_tasks.lock().await;
            if tasks.contains_key(&session) {
                return;
            }
        }
        let this = Arc::clone(self);
        let for_task = session.clone();
        let handle = tokio::spawn(async move {
            this.run_reconnect_loop(for_task).await;
        });
        self.reconnect_tasks.lock().await.insert(session, handle);
    }

    async fn run_reconnect_loop(self: Arc<Self>, session: String) {
        for delay in backoff_schedule(self.reconnect_delay, self.max_reconnects) {
            tokio::time::sleep(delay).await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let sessions = match discovery::list_sessions(self.mux_socket.as_deref()).await {
                Ok(s) => s,
                Err(_) => break,
            };
            if !sessions.contains(&session) {
                debug!(session = %session, "session manager: reconnect aborted, session gone");
                break;
            }
            if self.clients.lock().await.contains_key(&session) {
                break; // a concurrent attach already succeeded
            }
            self.spawn_client(session.clone()).await;
            if self.clients.lock().await.contains_key(&session) {
                break;
            }
        }
        self.reconnect_tasks.lock().await.remove(&session);
    }

    async fn drop_client(self: &Arc<Self>, session: &str) {
        if let Some(client) = self.clients.lock().await.remove(session) {
            let _ = client.lock().await.stop().await;
        }
    }

    async fn get_client(&self, session: &str) -> Result<Arc<Mutex<SessionClient>>> {
        self.clients
            .lock()
            .await
            .get(session)
            .cloned()
            .ok_or_else(|| ObserverError::ProtocolNotRunning {
                session: session.to_string(),
            })
    }

    pub async fn capture_pane(&self, session: &str, pane_id: &str, lines: usize) -> Result<Vec<String>> {
        let client = self.get_client(session).await?;
        client.lock().await.capture_pane(pane_id, lines).await
    }

    pub async fn send_keys(&self, session: &str, pane_id: &str, text: &str, submit: bool) -> Result<()> {
        let client = self.get_client(session).await?;
        client.lock().await.send_keys(pane_id, text, submit).await
    }

    pub async fn cursor_position(&self, session: &str, pane_id: &str) -> Result<(u32, u32, u32)> {
        let client = self.get_client(session).await?;
        client.lock().await.cursor_position(pane_id).await
    }

    /// Cancel all reconnect tasks and stop every tracked client.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for (_, handle) in self.reconnect_tasks.lock().await.drain() {
            handle.abort();
        }
        let sessions: Vec<String> = self.clients.lock().await.keys().cloned().collect();
        for session in sessions {
            if let Some(client) = self.clients.lock().await.remove(&session) {
                let _ = client.lock().await.stop().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_doubles_each_attempt() {
        let delays = backoff_schedule(Duration::from_secs(1), 5);
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
    }

    #[test]
    fn backoff_schedule_respects_attempt_cap() {
        assert_eq!(backoff_schedule(Duration::from_millis(100), 0).len(), 0);
        assert_eq!(backoff_schedule(Duration::from_millis(100), 1).len(), 1);
    }
}
