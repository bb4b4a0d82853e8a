//! In-process connector driven by the embedding program

use super::{session_channels, CloseFrame, Connector, TransportEvent, TransportHandle};
use crate::error::TransportError;
use tokio::sync::{mpsc, oneshot};

/// Connector that hands every opened session to whoever owns the receiver.
///
/// The external streaming client (or a test) receives a [`ChannelSession`]
/// per connect attempt and pushes frames and lifecycle events through it.
pub struct ChannelConnector {
    sessions: mpsc::UnboundedSender<ChannelSession>,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelSession>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        (Self { sessions }, rx)
    }
}

impl Connector for ChannelConnector {
    fn open(&mut self, url: &str) -> Result<TransportHandle, TransportError> {
        let (events, close_rx, handle) = session_channels();
        self.sessions
            .send(ChannelSession {
                url: url.to_string(),
                events,
                close_rx,
            })
            .map_err(|_| TransportError::ConnectionFailed("no session listener".to_string()))?;
        Ok(handle)
    }

    fn backend_name(&self) -> &'static str {
        "channel"
    }
}

/// Producer side of one session
pub struct ChannelSession {
    url: String,
    events: mpsc::Sender<TransportEvent>,
    close_rx: oneshot::Receiver<CloseFrame>,
}

impl ChannelSession {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver an event; false once the engine dropped the session
    pub async fn send(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub async fn open(&self) -> bool {
        self.send(TransportEvent::Open).await
    }

    pub async fn binary(&self, payload: Vec<u8>) -> bool {
        self.send(TransportEvent::Binary(payload)).await
    }

    pub async fn error(&self, message: &str) -> bool {
        self.send(TransportEvent::Error(message.to_string())).await
    }

    /// Close from the receiver side and end the session
    pub async fn close(self, code: u16, reason: &str) -> bool {
        self.send(TransportEvent::Close {
            code,
            reason: reason.to_string(),
        })
        .await
    }

    /// Wait for the engine to close the session
    pub async fn closed(&mut self) -> Option<CloseFrame> {
        (&mut self.close_rx).await.ok()
    }

    /// Close frame sent by the engine, if any arrived yet
    pub fn try_closed(&mut self) -> Option<CloseFrame> {
        self.close_rx.try_recv().ok()
    }
}
