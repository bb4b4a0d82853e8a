//! Upstream transport abstraction
//!
//! The engine never speaks a wire protocol itself. A [`Connector`] opens a
//! session to the receiver and delivers its lifecycle and payloads as
//! [`TransportEvent`]s over a channel.

mod channel;
mod synthetic;

pub use channel::{ChannelConnector, ChannelSession};
pub use synthetic::SyntheticConnector;

use crate::error::TransportError;
use tokio::sync::{mpsc, oneshot};

/// Queue depth between a transport and the engine runner
pub const TRANSPORT_QUEUE_DEPTH: usize = 256;

/// Something that happened on an upstream session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Binary(Vec<u8>),
    /// Configuration-only message; not used by the engine
    Text(String),
    Error(String),
    Close { code: u16, reason: String },
}

/// Close request sent from the engine to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// Engine-side end of an open session
#[derive(Debug)]
pub struct TransportHandle {
    events: mpsc::Receiver<TransportEvent>,
    close_tx: Option<oneshot::Sender<CloseFrame>>,
}

impl TransportHandle {
    pub fn new(
        events: mpsc::Receiver<TransportEvent>,
        close_tx: oneshot::Sender<CloseFrame>,
    ) -> Self {
        Self {
            events,
            close_tx: Some(close_tx),
        }
    }

    /// Next event; `None` once the transport side has gone away
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Ask the transport to close and release the session
    pub fn close(mut self, code: u16, reason: &str) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(CloseFrame {
                code,
                reason: reason.to_string(),
            });
        }
    }
}

/// Trait for upstream connectors
pub trait Connector: Send + 'static {
    /// Start a session to `url`. Failures after this returns arrive as
    /// `Error`/`Close` events.
    fn open(&mut self, url: &str) -> Result<TransportHandle, TransportError>;

    /// Get a description of the backend
    fn backend_name(&self) -> &'static str;
}

/// Create the channel pair backing one session
pub(crate) fn session_channels() -> (
    mpsc::Sender<TransportEvent>,
    oneshot::Receiver<CloseFrame>,
    TransportHandle,
) {
    let (events_tx, events_rx) = mpsc::channel(TRANSPORT_QUEUE_DEPTH);
    let (close_tx, close_rx) = oneshot::channel();
    (events_tx, close_rx, TransportHandle::new(events_rx, close_tx))
}
