pub mod connection;
pub mod decoder;
pub mod detector;
mod engine;
mod history;
pub mod profiles;
mod rolling_buffer;
pub mod transport;

pub use connection::{CloseOutcome, ConnectOutcome, ConnectionManager, ConnectionState};
pub use detector::SignalDetector;
pub use engine::SpectrumEngine;
pub use history::DetectionHistory;
pub use profiles::{ScanProfile, SCAN_PROFILES};
pub use rolling_buffer::RollingBuffer;
