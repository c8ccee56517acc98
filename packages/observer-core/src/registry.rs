//! Pane registry: the single authoritative map of observed panes, guarded by
//! a mutex the way `tmuxy-core`'s connection state is guarded, with
//! change-detecting mutators that report whether anything actually moved so
//! callers can decide whether an event is worth emitting.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::model::{InputRequest, PaneState, PaneStatus};

/// Stable fingerprint over the last `tail` lines of a captured buffer,
/// used by the polling path (§4.F) to skip no-op updates. Computed by the
/// caller, not the registry — `update_output` just compares whatever hash
/// it is handed against the pane's stored one.
pub fn fingerprint(lines: &[String], tail: usize) -> String {
    let mut hasher = Sha256::new();
    for line in lines.iter().rev().take(tail) {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Thread-safe registry of `PaneState` keyed by pane id.
pub struct PaneRegistry {
    inner: Mutex<HashMap<String, PaneState>>,
    max_lines: usize,
}

impl PaneRegistry {
    pub fn new(max_lines: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_lines,
        }
    }

    pub fn get_all(&self) -> Vec<PaneState> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, pane_id: &str) -> Option<PaneState> {
        self.inner.lock().unwrap().get(pane_id).cloned()
    }

    pub fn get_pane_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    pub fn update(&self, state: PaneState) {
        debug!(pane_id = %state.pane_id, "registry: upsert pane");
        self.inner.lock().unwrap().insert(state.pane_id.clone(), state);
    }

    /// Replace a pane's output wholesale (used by the polling path after a
    /// full capture, and by the streaming path's debounced re-capture with
    /// `hash = ""`). Returns `false` if the pane is unknown, or if `hash`
    /// is non-empty and equals the pane's stored hash (no-op). An empty
    /// hash always counts as a change — streaming mode never computes one.
    pub fn update_output(&self, pane_id: &str, lines: Vec<String>, hash: String, now: f64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let Some(state) = guard.get_mut(pane_id) else {
            return false;
        };
        if !hash.is_empty() && hash == state.last_output_hash {
            return false;
        }
        state.last_lines = lines;
        state.last_output_hash = hash;
        state.last_activity = now;
        state.last_updated = now;
        true
    }

    /// Append streamed output, splitting on newlines and folding the first
    /// chunk into the last existing line (mirrors the registry's streaming
    /// append semantics: control-mode delivers output mid-line). Trims to
    /// `max_lines` from the tail and invalidates the stored fingerprint so
    /// the next poll doesn't mistake this for unchanged output.
    pub fn append_output(&self, pane_id: &str, data: &str, now: f64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let Some(state) = guard.get_mut(pane_id) else {
            return false;
        };
        let mut chunks = data.split('\n');
        if let Some(first) = chunks.next() {
            if let Some(last) = state.last_lines.last_mut() {
                last.push_str(first);
            } else {
                state.last_lines.push(first.to_string());
            }
        }
        for chunk in chunks {
            state.last_lines.push(chunk.to_string());
        }
        if state.last_lines.len() > self.max_lines {
            let excess = state.last_lines.len() - self.max_lines;
            state.last_lines.drain(0..excess);
        }
        state.last_output_hash.clear();
        state.last_activity = now;
        state.last_updated = now;
        true
    }

    pub fn get_output(&self, pane_id: &str) -> Option<Vec<String>> {
        self.inner
            .lock()
            .unwrap()
            .get(pane_id)
            .map(|s| s.last_lines.clone())
    }

    /// Change-detecting status update; returns `true` if the status actually
    /// changed.
    pub fn update_status(&self, pane_id: &str, status: PaneStatus, now: f64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let Some(state) = guard.get_mut(pane_id) else {
            return false;
        };
        if state.status == status {
            return false;
        }
        debug!(pane_id, ?status, "registry: status changed");
        state.status = status;
        state.last_updated = now;
        true
    }

    /// Sets the pane's input request, moving it to `waiting_input` if the
    /// request is `Some`. Returns `true` if anything changed.
    pub fn set_input_request(&self, pane_id: &str, request: Option<InputRequest>, now: f64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let Some(state) = guard.get_mut(pane_id) else {
            return false;
        };
        if state.input_request == request {
            return false;
        }
        state.input_request = request.clone();
        if request.is_some() {
            state.status = PaneStatus::WaitingInput;
        }
        state.last_updated = now;
        true
    }

    /// Clears any pending input request and restores `running` status.
    pub fn clear_input_request(&self, pane_id: &str, now: f64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let Some(state) = guard.get_mut(pane_id) else {
            return false;
        };
        if state.input_request.is_none() && state.status == PaneStatus::Running {
            return false;
        }
        state.input_request = None;
        state.status = PaneStatus::Running;
        state.last_updated = now;
        true
    }

    pub fn remove(&self, pane_id: &str) -> Option<PaneState> {
        self.inner.lock().unwrap().remove(pane_id)
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InputType;

    fn sample(pane_id: &str) -> PaneState {
        PaneState::new(
            pane_id.to_string(),
            "main".into(),
            "win".into(),
            0,
            0,
            "title".into(),
            1.0,
        )
    }

    #[test]
    fn update_output_reports_unknown_pane_as_unchanged() {
        let reg = PaneRegistry::new(500);
        assert!(!reg.update_output("%missing", vec!["a".into()], "h1".into(), 1.0));
    }

    #[test]
    fn update_output_detects_real_change_and_noop() {
        let reg = PaneRegistry::new(500);
        reg.update(sample("%1"));
        assert!(reg.update_output("%1", vec!["line1".into()], "h1".into(), 1.0));
        assert!(!reg.update_output("%1", vec!["line1".into()], "h1".into(), 2.0));
        assert!(reg.update_output(
            "%1",
            vec!["line1".into(), "line2".into()],
            "h2".into(),
            3.0
        ));
    }

    #[test]
    fn update_output_with_empty_hash_always_counts_as_changed() {
        let reg = PaneRegistry::new(500);
        reg.update(sample("%1"));
        assert!(reg.update_output("%1", vec!["a".into()], String::new(), 1.0));
        assert!(reg.update_output("%1", vec!["a".into()], String::new(), 2.0));
    }

    #[test]
    fn fingerprint_is_stable_and_order_sensitive() {
        let a = fingerprint(&["x".to_string(), "y".to_string()], 50);
        let b = fingerprint(&["x".to_string(), "y".to_string()], 50);
        let c = fingerprint(&["y".to_string(), "x".to_string()], 50);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn append_output_splits_and_folds_first_chunk() {
        let reg = PaneRegistry::new(500);
        reg.update(sample("%1"));
        reg.append_output("%1", "hello", 1.0);
        assert_eq!(reg.get_output("%1").unwrap(), vec!["hello".to_string()]);
        reg.append_output("%1", " world\nnext line", 2.0);
        assert_eq!(
            reg.get_output("%1").unwrap(),
            vec!["hello world".to_string(), "next line".to_string()]
        );
    }

    #[test]
    fn append_output_trims_to_max_lines() {
        let reg = PaneRegistry::new(2);
        reg.update(sample("%1"));
        reg.append_output("%1", "a\nb\nc", 1.0);
        assert_eq!(reg.get_output("%1").unwrap(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn set_input_request_transitions_status() {
        let reg = PaneRegistry::new(500);
        reg.update(sample("%1"));
        let req = InputRequest {
            input_type: InputType::Text,
            prompt: Some("name?".into()),
            message: None,
            options: vec![],
        };
        assert!(reg.set_input_request("%1", Some(req), 1.0));
        assert_eq!(reg.get("%1").unwrap().status, PaneStatus::WaitingInput);
        assert!(reg.clear_input_request("%1", 2.0));
        assert_eq!(reg.get("%1").unwrap().status, PaneStatus::Running);
        assert!(!reg.clear_input_request("%1", 3.0));
    }

    #[test]
    fn remove_and_count() {
        let reg = PaneRegistry::new(500);
        reg.update(sample("%1"));
        reg.update(sample("%2"));
        assert_eq!(reg.count(), 2);
        reg.remove("%1");
        assert_eq!(reg.count(), 1);
        assert!(reg.get("%1").is_none());
    }
}
