use crate::config::EngineConfig;
use crate::models::{DetectedSignal, SpectrumFrame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Events published by the engine to its subscribers.
///
/// Serialized as `{"event": <name>, "data": <payload>}`; the names are a
/// stable contract with the web layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EngineEvent {
    #[serde(rename = "connected")]
    Connected { url: String, timestamp: u64 },

    #[serde(rename = "disconnected")]
    Disconnected {
        code: u16,
        reason: String,
        timestamp: u64,
    },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "fftData")]
    FftData(Arc<SpectrumFrame>),

    #[serde(rename = "signalsDetected")]
    SignalsDetected {
        signals: Vec<DetectedSignal>,
        timestamp: u64,
        source_frame: Arc<SpectrumFrame>,
    },

    #[serde(rename = "configUpdated")]
    ConfigUpdated {
        old_config: EngineConfig,
        new_config: EngineConfig,
    },

    #[serde(rename = "bufferCleared")]
    BufferCleared { previous_size: usize },
}

impl EngineEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Connected { .. } => "connected",
            EngineEvent::Disconnected { .. } => "disconnected",
            EngineEvent::Error { .. } => "error",
            EngineEvent::FftData(_) => "fftData",
            EngineEvent::SignalsDetected { .. } => "signalsDetected",
            EngineEvent::ConfigUpdated { .. } => "configUpdated",
            EngineEvent::BufferCleared { .. } => "bufferCleared",
        }
    }
}
