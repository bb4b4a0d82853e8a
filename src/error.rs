use thiserror::Error;

/// Errors surfaced by the engine façade and its handle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("invalid upstream url {0:?}")]
    InvalidUrl(String),

    /// The runner task has shut down; the handle outlived it
    #[error("engine has been stopped")]
    Stopped,
}

/// Errors raised while opening an upstream transport
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Errors raised while persisting settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine config path")]
    NoConfigDir,

    #[error("failed to create config directory: {0}")]
    CreateDir(#[source] std::io::Error),

    #[error("failed to write config: {0}")]
    Write(#[source] std::io::Error),
}
