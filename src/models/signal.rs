use serde::{Deserialize, Serialize};

/// Where a signal descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Found by the peak detector
    Detected,
    /// Flagged by an operator
    Manual,
}

/// A narrowband emission found in one spectrum frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSignal {
    pub bin: usize,
    /// Absolute frequency in Hz
    pub frequency: f64,
    /// Peak power in dB
    pub power: f32,
    /// Occupied bandwidth in Hz
    pub bandwidth: f64,
    /// Score in (0, 1], higher for larger margins above threshold
    pub confidence: f64,
    /// Peak power above the estimated noise floor, in dB
    pub snr: f64,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: SignalKind,
}

/// Metadata about the most recent detection pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub timestamp: u64,
    pub signal_count: usize,
    pub threshold: f64,
}

/// One detection pass as remembered by the detection history
pub type DetectionHistoryEntry = DetectionSummary;

/// Aggregate statistics over the detection history
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalStats {
    pub total_detections: usize,
    pub total_signals: usize,
    pub average_signals_per_detection: f64,
    /// Detection passes per second over the span of the history
    pub detection_rate: f64,
    pub latest_detection: Option<DetectionSummary>,
}
