//! Spectrum signal detection engine.
//!
//! Ingests binary FFT frames from an SDR receiver, keeps a bounded history of
//! spectra, detects narrowband signals and manages the upstream connection
//! with exponential-backoff reconnects.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use app::{EngineCommand, EngineHandle};
pub use config::{ConfigUpdate, EngineConfig, Settings};
pub use error::{EngineError, SettingsError, TransportError};
pub use models::{
    DetectedSignal, DetectionSummary, EngineEvent, EngineStatus, SignalKind, SignalStats,
    SpectrumFrame,
};
pub use services::{ConnectionState, SpectrumEngine};
