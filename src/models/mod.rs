mod event;
mod frame;
mod signal;
mod status;

pub use event::EngineEvent;
pub use frame::{now_millis, SpectrumFrame};
pub use signal::{DetectedSignal, DetectionHistoryEntry, DetectionSummary, SignalKind, SignalStats};
pub use status::EngineStatus;
