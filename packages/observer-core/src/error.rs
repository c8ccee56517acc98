//! Error taxonomy for the observation engine.
//!
//! One variant per failure mode named in the design's error-handling section;
//! callers match on variants rather than parsing message strings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("control-mode client for session {session} is not running")]
    ProtocolNotRunning { session: String },

    #[error("failed to spawn tmux control-mode process: {0}")]
    ProtocolSpawnFailed(String),

    #[error("control-mode I/O failed: {0}")]
    ProtocolIoFailed(String),

    #[error("command {command_num} timed out waiting for a response")]
    ProtocolTimeout { command_num: u32 },

    #[error("tmux reported a command failure: {message}")]
    CommandFailed { message: String },

    #[error("tmux binary not found on PATH")]
    MuxAbsent,

    #[error("capture-pane failed for {pane_id}: {message}")]
    CaptureFailed { pane_id: String, message: String },

    #[error("send-keys failed for {pane_id}: {message}")]
    SendFailed { pane_id: String, message: String },
}

pub type Result<T> = std::result::Result<T, ObserverError>;
