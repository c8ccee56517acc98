//! Tmux control-mode integration.
//!
//! Event-driven communication with tmux using control mode (`tmux -C`),
//! so the observer receives real-time notifications instead of polling
//! `capture-pane` on a timer.
//!
//! ## Key components:
//! - `octal` - decode/encode tmux's octal escape sequences
//! - `parser` - turn control-mode lines into `ControlModeEvent`s
//! - `connection` - own the `tmux -C` subprocess and correlate command responses

mod connection;
mod octal;
mod parser;

pub use connection::{CommandResponse, SessionClient};
pub(crate) use connection::parse_cursor_reply;
pub use octal::{decode_octal, encode_octal};
pub use parser::{ControlModeEvent, Parser};
