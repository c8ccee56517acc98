//! Data model: pane state/info, input requests, and the event stream emitted
//! by the observer daemon to its subscribers.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an observed pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneStatus {
    Running,
    WaitingInput,
    /// Defined for forward compatibility; the core never assigns this today.
    Idle,
    /// Defined for forward compatibility; the core never assigns this today.
    Exited,
}

/// Input type inferred or declared by an `[INPUT_REQUIRED]` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Choice,
    Confirm,
}

/// A parsed `[INPUT_REQUIRED]` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRequest {
    pub input_type: InputType,
    pub prompt: Option<String>,
    pub message: Option<String>,
    pub options: Vec<String>,
}

/// Read-only snapshot of a pane's identity, safe to hand to subscribers.
///
/// Everything about a pane except its output buffer and change-detection
/// hash — the subset safe to hand to subscribers on discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneInfo {
    pub pane_id: String,
    pub session_name: String,
    pub window_name: String,
    pub window_index: u32,
    pub pane_index: u32,
    pub title: String,
    pub status: PaneStatus,
    pub last_updated: f64,
}

/// Full mutable state tracked per observed pane.
#[derive(Debug, Clone, PartialEq)]
pub struct PaneState {
    pub pane_id: String,
    pub session_name: String,
    pub window_name: String,
    pub window_index: u32,
    pub pane_index: u32,
    pub title: String,
    pub status: PaneStatus,
    pub last_updated: f64,
    pub last_output_hash: String,
    pub last_lines: Vec<String>,
    pub input_request: Option<InputRequest>,
    pub last_activity: f64,
}

impl PaneState {
    pub fn new(
        pane_id: String,
        session_name: String,
        window_name: String,
        window_index: u32,
        pane_index: u32,
        title: String,
        now: f64,
    ) -> Self {
        Self {
            pane_id,
            session_name,
            window_name,
            window_index,
            pane_index,
            title,
            status: PaneStatus::Running,
            last_updated: now,
            last_output_hash: String::new(),
            last_lines: Vec::new(),
            input_request: None,
            last_activity: now,
        }
    }

    /// Project to the read-only subset handed out in discovery events.
    pub fn to_info(&self) -> PaneInfo {
        PaneInfo {
            pane_id: self.pane_id.clone(),
            session_name: self.session_name.clone(),
            window_name: self.window_name.clone(),
            window_index: self.window_index,
            pane_index: self.pane_index,
            title: self.title.clone(),
            status: self.status,
            last_updated: self.last_updated,
        }
    }
}

/// Output snapshot of a pane, as returned by a one-shot capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneOutput {
    pub pane_id: String,
    pub lines: Vec<String>,
    pub line_count: usize,
    pub input_request: Option<InputRequest>,
}

/// The event stream emitted by the observer daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    PaneUpdate {
        pane_id: String,
        status: PaneStatus,
        lines: Vec<String>,
        input_request: Option<InputRequest>,
        cursor_x: u32,
        cursor_y: u32,
    },
    PaneDiscovered {
        pane: PaneInfo,
    },
    PaneRemoved {
        pane_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_info_drops_mutable_fields() {
        let state = PaneState::new(
            "%1".into(),
            "main".into(),
            "win".into(),
            0,
            0,
            "title".into(),
            1.0,
        );
        let info = state.to_info();
        assert_eq!(info.pane_id, "%1");
        assert_eq!(info.status, PaneStatus::Running);
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = Event::PaneRemoved {
            pane_id: "%2".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "pane_removed");
        assert_eq!(json["pane_id"], "%2");
    }
}
