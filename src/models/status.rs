use crate::config::EngineConfig;
use crate::models::DetectionSummary;
use crate::services::ConnectionState;
use serde::{Deserialize, Serialize};

/// Machine-readable engine status for the web layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub url: Option<String>,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    /// Set once automatic reconnection has given up
    pub reconnect_exhausted: bool,
    pub buffer_size: usize,
    pub max_buffer_size: usize,
    pub config: EngineConfig,
    /// Timestamp of the newest buffered frame
    pub last_update: Option<u64>,
    pub last_signal_detection: Option<DetectionSummary>,
    pub signal_history_length: usize,
}
