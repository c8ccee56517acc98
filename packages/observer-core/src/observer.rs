//! Observer daemon (§4.F): orchestrates the codec, session client(s),
//! registry, and input-request parser. Runs in streaming mode (preferred)
//! or polling mode (fallback), selected once at `start()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ObserverConfig;
use crate::discovery;
use crate::input_parser::InputParser;
use crate::manager::{ManagerEvent, SessionManager};
use crate::model::{Event, PaneState};
use crate::registry::{fingerprint, PaneRegistry};
use crate::shim::Shim;

/// Which mode the observer is currently running in. Observable for
/// operators (§7: "The mode property... is observable").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverMode {
    Streaming,
    Polling,
    None,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Re-capture length used by the debounced streaming update path (§4.F:
/// "last N=300 lines for incremental fidelity" — smaller than the full
/// `capture_lines` buffer since it only has to cover what likely changed).
const STREAMING_RECAPTURE_LINES: usize = 300;
/// Tail window the polling path hashes to detect no-op updates (§4.F).
const POLL_FINGERPRINT_TAIL: usize = 50;

pub struct Observer {
    config: ObserverConfig,
    registry: Arc<PaneRegistry>,
    events_tx: broadcast::Sender<Event>,
    manager: Mutex<Option<Arc<SessionManager>>>,
    mode: Mutex<ObserverMode>,
    running: AtomicBool,
    debounce_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    discovery_task: Mutex<Option<JoinHandle<()>>>,
    polling_task: Mutex<Option<JoinHandle<()>>>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
    /// Overrides mode-based shim selection with a fixed backend. Unset in
    /// production; an integration test sets this to `Shim::Fake(..)` so
    /// capture/cursor calls never shell out to a real `tmux` binary.
    shim_override: Mutex<Option<Shim>>,
}

impl Observer {
    pub fn new(
        config: ObserverConfig,
        registry: Arc<PaneRegistry>,
        events_tx: broadcast::Sender<Event>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            events_tx,
            manager: Mutex::new(None),
            mode: Mutex::new(ObserverMode::None),
            running: AtomicBool::new(false),
            debounce_tasks: Mutex::new(HashMap::new()),
            discovery_task: Mutex::new(None),
            polling_task: Mutex::new(None),
            forward_task: Mutex::new(None),
            shim_override: Mutex::new(None),
        })
    }

    /// Forces every subsequent shim call (capture/send-keys/cursor) onto a
    /// fixed backend regardless of streaming/polling mode. Exposed for
    /// integration tests driving the debounce/emit path without a live
    /// `tmux` session; not used by `observer-gateway`.
    pub async fn set_shim_override(&self, shim: Shim) {
        *self.shim_override.lock().await = Some(shim);
    }

    pub async fn mode(&self) -> ObserverMode {
        *self.mode.lock().await
    }

    pub fn registry(&self) -> &Arc<PaneRegistry> {
        &self.registry
    }

    /// Idempotent: a second `start()` while already running is a no-op.
    pub async fn start(self: &Arc<Self>) -> ObserverMode {
        if self.running.swap(true, Ordering::SeqCst) {
            return self.mode().await;
        }

        if self.config.use_streaming_mode {
            match self.start_streaming().await {
                Ok(()) => {
                    *self.mode.lock().await = ObserverMode::Streaming;
                    return ObserverMode::Streaming;
                }
                Err(e) => {
                    warn!(error = %e, "observer: streaming init failed, falling back to polling");
                    *self.manager.lock().await = None;
                }
            }
        }

        self.start_polling().await;
        *self.mode.lock().await = ObserverMode::Polling;
        ObserverMode::Polling
    }

    async fn start_streaming(self: &Arc<Self>) -> crate::error::Result<()> {
        let manager = SessionManager::new(
            self.config.mux_socket.clone(),
            self.config.reconnect_delay,
            self.config.max_reconnects,
        );
        manager.start().await?;
        let events_rx = manager.take_events().await;
        *self.manager.lock().await = Some(Arc::clone(&manager));

        self.run_discovery_once(true).await;

        let forward = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.forward_manager_events(events_rx).await })
        };
        *self.forward_task.lock().await = Some(forward);

        let discovery = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.discovery_loop(true).await })
        };
        *self.discovery_task.lock().await = Some(discovery);

        Ok(())
    }

    async fn start_polling(self: &Arc<Self>) {
        self.run_discovery_once(false).await;

        let discovery = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.discovery_loop(false).await })
        };
        *self.discovery_task.lock().await = Some(discovery);

        let polling = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.polling_loop().await })
        };
        *self.polling_task.lock().await = Some(polling);
    }

    /// Stop the manager (if any), cancel discovery/polling/debounce tasks,
    /// reset mode to `none`. Idempotent.
    pub async fn stop(self: &Arc<Self>) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(manager) = self.manager.lock().await.take() {
            manager.stop().await;
        }
        if let Some(task) = self.discovery_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.polling_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.forward_task.lock().await.take() {
            task.abort();
        }
        for (_, task) in self.debounce_tasks.lock().await.drain() {
            task.abort();
        }
        *self.mode.lock().await = ObserverMode::None;
    }

    fn shim(&self, manager: Option<Arc<SessionManager>>) -> Shim {
        match manager {
            Some(manager) => Shim::Streaming(manager),
            None => Shim::OneShot {
                mux_socket: self.config.mux_socket.clone(),
            },
        }
    }

    async fn current_shim(&self) -> Shim {
        if let Some(shim) = self.shim_override.lock().await.clone() {
            return shim;
        }
        let manager = self.manager.lock().await.clone();
        self.shim(manager)
    }

    // ---- topology discovery (§4.F, both modes) ----

    async fn discovery_loop(self: &Arc<Self>, streaming: bool) {
        let mut ticker = tokio::time::interval(self.config.discovery_interval);
        ticker.tick().await; // first tick fires immediately; initial discovery already ran
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.run_discovery_once(streaming).await;
        }
    }

    async fn run_discovery_once(self: &Arc<Self>, streaming: bool) {
        let panes = match discovery::discover_all_panes(self.config.mux_socket.as_deref()).await {
            Ok(panes) => panes,
            Err(e) => {
                warn!(error = %e, "observer: discovery failed, retrying next tick");
                return;
            }
        };
        self.apply_discovery(panes, streaming).await;
    }

    /// Diffs a topology snapshot against the registry's current keys,
    /// upserting additions and dropping removals, emitting
    /// `pane_discovered`/`pane_removed` for each. Split out from
    /// `run_discovery_once` so the diff itself — keys after = (K ∪ added) \
    /// removed — is testable against a synthetic snapshot, with no `tmux`
    /// child process involved.
    pub async fn apply_discovery(self: &Arc<Self>, panes: Vec<discovery::PaneTopology>, streaming: bool) {
        let discovered: std::collections::HashSet<String> =
            panes.iter().map(|p| p.pane_id.clone()).collect();
        let known: std::collections::HashSet<String> =
            self.registry.get_pane_ids().into_iter().collect();

        for topo in &panes {
            if known.contains(&topo.pane_id) {
                continue;
            }
            let now = now_secs();
            let state = PaneState::new(
                topo.pane_id.clone(),
                topo.session_name.clone(),
                topo.window_name.clone(),
                topo.window_index,
                topo.pane_index,
                topo.title.clone(),
                now,
            );
            self.registry.update(state);

            if streaming {
                self.capture_initial(&topo.session_name, &topo.pane_id).await;
            }

            if let Some(state) = self.registry.get(&topo.pane_id) {
                let _ = self.events_tx.send(Event::PaneDiscovered {
                    pane: state.to_info(),
                });
            }
        }

        for pane_id in &known {
            if discovered.contains(pane_id) {
                continue;
            }
            self.registry.remove(pane_id);
            self.cancel_debounce(pane_id).await;
            let _ = self.events_tx.send(Event::PaneRemoved {
                pane_id: pane_id.clone(),
            });
        }
    }

    async fn capture_initial(self: &Arc<Self>, session: &str, pane_id: &str) {
        let shim = self.current_shim().await;
        if let Ok(lines) = shim.capture_pane(session, pane_id, self.config.capture_lines).await {
            self.registry
                .update_output(pane_id, lines, String::new(), now_secs());
        }
    }

    async fn cancel_debounce(&self, pane_id: &str) {
        if let Some(task) = self.debounce_tasks.lock().await.remove(pane_id) {
            task.abort();
        }
    }

    // ---- streaming mode ----

    async fn forward_manager_events(
        self: Arc<Self>,
        mut rx: tokio::sync::mpsc::Receiver<ManagerEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            match event {
                ManagerEvent::Output {
                    session,
                    pane_id,
                    data,
                } => {
                    self.on_pane_output(&session, &pane_id, &data).await;
                }
                ManagerEvent::WindowChange { .. } | ManagerEvent::SessionsChanged => {
                    self.run_discovery_once(true).await;
                }
                ManagerEvent::Disconnected { session } => {
                    debug!(session = %session, "observer: session disconnected, manager will reconnect");
                }
            }
        }
    }

    /// Streamed output handler: appends to the registry, then (re-)schedules
    /// a debounced re-capture for that pane.
    pub async fn on_pane_output(self: &Arc<Self>, session: &str, pane_id: &str, data: &str) {
        let appended = self.registry.append_output(pane_id, data, now_secs());
        if !appended {
            return;
        }
        self.schedule_debounced_update(session.to_string(), pane_id.to_string())
            .await;
    }

    /// Cancels any pending debounce timer for this pane and starts a new
    /// one, so a burst of `N` calls inside one `debounce_ms` window collapses
    /// to a single `emit_pane_update` (§8 property 5). Public so a caller
    /// holding an out-of-band notification (or a test driving the coalescing
    /// behavior directly) can trigger it without routing through a live
    /// streaming session.
    pub async fn schedule_debounced_update(self: &Arc<Self>, session: String, pane_id: String) {
        self.cancel_debounce(&pane_id).await;
        let this = Arc::clone(self);
        let debounce = self.config.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            this.emit_pane_update(&session, &pane_id).await;
        });
        self.debounce_tasks.lock().await.insert(pane_id, handle);
    }

    /// Number of panes with a debounce timer still pending. Exposed for
    /// tests asserting the coalescing behavior.
    pub async fn pending_debounce_count(&self) -> usize {
        self.debounce_tasks.lock().await.len()
    }

    /// Re-capture the pane, run the input-request parser, and emit a
    /// `pane_update`. If the re-capture fails, the update is skipped
    /// entirely rather than emitting stale buffered lines with a fake
    /// cursor (deviates from the source's behavior; see DESIGN.md).
    async fn emit_pane_update(self: &Arc<Self>, session: &str, pane_id: &str) {
        self.debounce_tasks.lock().await.remove(pane_id);

        let shim = self.current_shim().await;
        let lines = match shim
            .capture_pane(session, pane_id, STREAMING_RECAPTURE_LINES)
            .await
        {
            Ok(lines) => lines,
            Err(e) => {
                debug!(pane_id, error = %e, "observer: re-capture failed, skipping update");
                return;
            }
        };

        let now = now_secs();
        self.registry
            .update_output(pane_id, lines.clone(), String::new(), now);
        self.apply_input_request(pane_id, &lines, now).await;

        let (cursor_x, cursor_y) = match shim.cursor_raw(session, pane_id).await {
            Ok((cx, cy, height)) => crate::cursor::to_absolute_line(cx, cy, height, lines.len()),
            Err(_) => (0, 0),
        };

        self.emit_current_state(pane_id, cursor_x, cursor_y);
    }

    async fn apply_input_request(&self, pane_id: &str, lines: &[String], now: f64) {
        match InputParser::parse(lines) {
            Some(request) => {
                self.registry.set_input_request(pane_id, Some(request), now);
            }
            None => {
                if !InputParser::has_input_marker(lines) {
                    self.registry.clear_input_request(pane_id, now);
                }
            }
        }
    }

    fn emit_current_state(&self, pane_id: &str, cursor_x: u32, cursor_y: u32) {
        let Some(state) = self.registry.get(pane_id) else {
            return;
        };
        let _ = self.events_tx.send(Event::PaneUpdate {
            pane_id: pane_id.to_string(),
            status: state.status,
            lines: state.last_lines,
            input_request: state.input_request,
            cursor_x,
            cursor_y,
        });
    }

    // ---- polling mode ----

    async fn polling_loop(self: &Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.poll_once().await;
        }
    }

    async fn poll_once(self: &Arc<Self>) {
        let pane_ids = self.registry.get_pane_ids();
        let mut handles = Vec::with_capacity(pane_ids.len());
        for pane_id in pane_ids {
            let this = Arc::clone(self);
            handles.push(tokio::spawn(async move { this.poll_pane(&pane_id).await }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "observer: poll task panicked");
            }
        }
    }

    async fn poll_pane(self: &Arc<Self>, pane_id: &str) {
        let Some(state) = self.registry.get(pane_id) else {
            return;
        };
        let shim = Shim::OneShot {
            mux_socket: self.config.mux_socket.clone(),
        };
        let lines = match shim
            .capture_pane(&state.session_name, pane_id, self.config.capture_lines)
            .await
        {
            Ok(lines) => lines,
            Err(e) => {
                debug!(pane_id, error = %e, "observer: poll capture failed");
                return;
            }
        };

        let hash = fingerprint(&lines, POLL_FINGERPRINT_TAIL);
        let now = now_secs();
        let changed = self
            .registry
            .update_output(pane_id, lines.clone(), hash, now);
        if !changed {
            return;
        }

        self.apply_input_request(pane_id, &lines, now).await;

        let (cursor_x, cursor_y) = match shim.cursor_raw(&state.session_name, pane_id).await {
            Ok((cx, cy, height)) => crate::cursor::to_absolute_line(cx, cy, height, lines.len()),
            Err(_) => (0, 0),
        };

        self.emit_current_state(pane_id, cursor_x, cursor_y);
    }
}
