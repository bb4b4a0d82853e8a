//! Upstream connection lifecycle and reconnect policy

use crate::config::UpstreamSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

/// Close code for an orderly, operator-requested shutdown
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code used when the transport went away without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of asking the state machine to connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A transport should be opened
    Started,
    /// Already connected, nothing to do
    AlreadyConnected,
}

/// What to do after the transport closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Normal closure, stay disconnected
    Manual,
    /// Reconnect after `delay`
    Reconnect { attempt: u32, delay: Duration },
    /// Retry budget spent, stay disconnected until an explicit connect
    Exhausted,
    /// No connection was active
    Ignored,
}

/// Connection state plus exponential backoff bookkeeping
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    state: ConnectionState,
    url: Option<String>,
    reconnect_attempts: u32,
    max_reconnect_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    exhausted: bool,
}

impl ConnectionManager {
    pub fn new(settings: &UpstreamSettings) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            url: None,
            reconnect_attempts: 0,
            max_reconnect_attempts: settings.max_reconnect_attempts,
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay().max(settings.base_delay()),
            exhausted: false,
        }
    }

    /// Move to `Connecting` unless already connected.
    ///
    /// An explicit connect starts a fresh retry budget; reconnects scheduled
    /// by the backoff keep counting.
    pub fn begin_connect(&mut self, url: &str, explicit: bool) -> ConnectOutcome {
        if self.state == ConnectionState::Connected {
            warn!(url, "connect requested while already connected");
            return ConnectOutcome::AlreadyConnected;
        }

        if explicit {
            self.reconnect_attempts = 0;
            self.exhausted = false;
        }

        info!(
            url,
            attempt = self.reconnect_attempts,
            "connecting to upstream receiver"
        );
        self.url = Some(url.to_string());
        self.state = ConnectionState::Connecting;
        ConnectOutcome::Started
    }

    pub fn on_open(&mut self) {
        info!(url = self.url.as_deref().unwrap_or_default(), "connected to upstream receiver");
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.exhausted = false;
    }

    pub fn on_close(&mut self, code: u16, reason: &str) -> CloseOutcome {
        if self.state == ConnectionState::Disconnected {
            return CloseOutcome::Ignored;
        }
        self.state = ConnectionState::Disconnected;

        if code == NORMAL_CLOSURE {
            info!(code, reason, "upstream connection closed");
            return CloseOutcome::Manual;
        }

        warn!(
            code,
            reason,
            reconnect_attempts = self.reconnect_attempts,
            "upstream connection lost"
        );

        if self.reconnect_attempts >= self.max_reconnect_attempts {
            self.exhausted = true;
            error!(
                max_attempts = self.max_reconnect_attempts,
                "giving up on upstream receiver"
            );
            return CloseOutcome::Exhausted;
        }

        self.reconnect_attempts += 1;
        let delay = self.backoff_delay(self.reconnect_attempts);
        info!(
            attempt = self.reconnect_attempts,
            max_attempts = self.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnection attempt"
        );
        CloseOutcome::Reconnect {
            attempt: self.reconnect_attempts,
            delay,
        }
    }

    /// Drop to `Disconnected` on operator request.
    ///
    /// Returns whether a connection was active or in progress.
    pub fn disconnect(&mut self) -> bool {
        let was_active = self.state != ConnectionState::Disconnected;
        if was_active {
            info!("manually disconnecting from upstream receiver");
        }
        self.state = ConnectionState::Disconnected;
        was_active
    }

    /// Delay before reconnect `attempt` (1-based): base doubled per attempt, capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_attempts: u32) -> ConnectionManager {
        ConnectionManager::new(&UpstreamSettings {
            url: "ws://localhost:8073/ws/".to_string(),
            reconnect_base_delay_ms: 2000,
            max_reconnect_delay_ms: 60_000,
            max_reconnect_attempts: max_attempts,
        })
    }

    const URL: &str = "ws://localhost:8073/ws/";

    #[test]
    fn open_resets_attempts() {
        let mut conn = manager(5);
        conn.begin_connect(URL, true);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        conn.on_close(ABNORMAL_CLOSURE, "refused");
        conn.begin_connect(URL, false);
        assert_eq!(conn.reconnect_attempts(), 1);
        conn.on_open();
        assert!(conn.is_connected());
        assert_eq!(conn.reconnect_attempts(), 0);
    }

    #[test]
    fn connect_while_connected_is_a_noop() {
        let mut conn = manager(5);
        conn.begin_connect(URL, true);
        conn.on_open();
        assert_eq!(conn.begin_connect(URL, true), ConnectOutcome::AlreadyConnected);
        assert!(conn.is_connected());
    }

    #[test]
    fn normal_closure_never_reconnects() {
        let mut conn = manager(5);
        conn.begin_connect(URL, true);
        conn.on_close(ABNORMAL_CLOSURE, "reset");
        conn.begin_connect(URL, false);
        conn.on_open();
        assert_eq!(conn.on_close(NORMAL_CLOSURE, "Manual disconnect"), CloseOutcome::Manual);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn backoff_doubles_until_exhausted() {
        let mut conn = manager(3);
        conn.begin_connect(URL, true);

        let mut delays = Vec::new();
        loop {
            match conn.on_close(ABNORMAL_CLOSURE, "unreachable") {
                CloseOutcome::Reconnect { attempt, delay } => {
                    assert_eq!(attempt as usize, delays.len() + 1);
                    delays.push(delay);
                    conn.begin_connect(URL, false);
                }
                CloseOutcome::Exhausted => break,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        assert!(conn.is_exhausted());
        assert_eq!(conn.reconnect_attempts(), 3);
    }

    #[test]
    fn backoff_is_capped() {
        let conn = manager(50);
        assert_eq!(conn.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(conn.backoff_delay(5), Duration::from_secs(32));
        assert_eq!(conn.backoff_delay(6), Duration::from_secs(60));
        assert_eq!(conn.backoff_delay(40), Duration::from_secs(60));
    }

    #[test]
    fn explicit_connect_clears_exhaustion() {
        let mut conn = manager(0);
        conn.begin_connect(URL, true);
        assert_eq!(conn.on_close(ABNORMAL_CLOSURE, "down"), CloseOutcome::Exhausted);
        assert!(conn.is_exhausted());
        conn.begin_connect(URL, true);
        assert!(!conn.is_exhausted());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut conn = manager(5);
        assert!(!conn.disconnect());
        conn.begin_connect(URL, true);
        conn.on_open();
        assert!(conn.disconnect());
        assert!(!conn.disconnect());
        assert_eq!(conn.on_close(NORMAL_CLOSURE, "late"), CloseOutcome::Ignored);
    }
}
