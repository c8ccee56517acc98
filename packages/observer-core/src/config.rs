//! Runtime configuration, environment-driven the way `codex-rs` declares its
//! flags (see `env_flags!` in that crate's `core/src/flags.rs`): typed
//! defaults, parsed once, then carried explicitly rather than read back out
//! of the environment at call sites.

use std::time::Duration;

use env_flags::env_flags;

env_flags! {
    pub OBSERVER_USE_STREAMING_MODE: bool = true;
    pub OBSERVER_POLL_INTERVAL_SEC: f64 = 1.0;
    pub OBSERVER_DISCOVERY_INTERVAL_SEC: f64 = 5.0;
    pub OBSERVER_CAPTURE_LINES: usize = 500;
    pub OBSERVER_DEBOUNCE_MS: u64 = 15;
    pub OBSERVER_RECONNECT_DELAY_SEC: f64 = 1.0;
    pub OBSERVER_MAX_RECONNECTS: u32 = 5;
    pub OBSERVER_MUX_SOCKET: Option<&str> = None;
}

/// Observer-wide configuration, read once from the environment at startup
/// and threaded explicitly through every component that needs it.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub use_streaming_mode: bool,
    pub poll_interval: Duration,
    pub discovery_interval: Duration,
    pub capture_lines: usize,
    pub debounce: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnects: u32,
    pub mux_socket: Option<String>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            use_streaming_mode: true,
            poll_interval: Duration::from_secs_f64(1.0),
            discovery_interval: Duration::from_secs_f64(5.0),
            capture_lines: 500,
            debounce: Duration::from_millis(15),
            reconnect_delay: Duration::from_secs_f64(1.0),
            max_reconnects: 5,
            mux_socket: None,
        }
    }
}

impl ObserverConfig {
    /// Build configuration from the process environment, falling back to
    /// the documented defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self {
            use_streaming_mode: *OBSERVER_USE_STREAMING_MODE,
            poll_interval: Duration::from_secs_f64(*OBSERVER_POLL_INTERVAL_SEC),
            discovery_interval: Duration::from_secs_f64(*OBSERVER_DISCOVERY_INTERVAL_SEC),
            capture_lines: *OBSERVER_CAPTURE_LINES,
            debounce: Duration::from_millis(*OBSERVER_DEBOUNCE_MS),
            reconnect_delay: Duration::from_secs_f64(*OBSERVER_RECONNECT_DELAY_SEC),
            max_reconnects: *OBSERVER_MAX_RECONNECTS,
            mux_socket: OBSERVER_MUX_SOCKET.map(|s| s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ObserverConfig::default();
        assert!(cfg.use_streaming_mode);
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.discovery_interval, Duration::from_secs(5));
        assert_eq!(cfg.capture_lines, 500);
        assert_eq!(cfg.debounce, Duration::from_millis(15));
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(1));
        assert_eq!(cfg.max_reconnects, 5);
        assert!(cfg.mux_socket.is_none());
    }
}
