//! Engine runner: the single event loop that owns the engine

use crate::config::{validate_upstream_url, ConfigUpdate, EngineConfig, Settings};
use crate::error::EngineError;
use crate::models::{DetectedSignal, EngineEvent, EngineStatus, SignalStats, SpectrumFrame};
use crate::services::connection::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use crate::services::transport::{Connector, TransportEvent, TransportHandle};
use crate::services::{CloseOutcome, ConnectOutcome, SpectrumEngine};
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, info, warn};

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Commands sent to the runner task
#[derive(Debug)]
pub enum EngineCommand {
    /// Connect to `url`, or to the configured upstream when `None`
    Connect {
        url: Option<String>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Disconnect(oneshot::Sender<()>),
    Status(oneshot::Sender<EngineStatus>),
    Config(oneshot::Sender<EngineConfig>),
    UpdateConfig {
        update: ConfigUpdate,
        reply: oneshot::Sender<Result<EngineConfig, EngineError>>,
    },
    ClearBuffer(oneshot::Sender<usize>),
    SignalStats(oneshot::Sender<SignalStats>),
    LatestFrame(oneshot::Sender<Option<Arc<SpectrumFrame>>>),
    Detect {
        threshold: Option<f64>,
        reply: oneshot::Sender<Vec<DetectedSignal>>,
    },
    Shutdown,
}

/// Handle to communicate with the engine runner task
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Create the engine and spawn its runner on the current tokio runtime
    pub fn spawn<C: Connector>(settings: &Settings, connector: C) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let engine = SpectrumEngine::new(settings);
        let events = engine.event_sender();

        info!(backend = connector.backend_name(), "spawning engine runner");
        let runner = EngineRunner::new(engine, connector, settings.upstream.url.clone());
        tokio::spawn(runner.run(cmd_rx));

        Self { cmd_tx, events }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Connect to `url`, or to the configured upstream when `None`
    pub async fn connect(&self, url: Option<String>) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::Connect { url, reply })
            .await?
    }

    pub async fn disconnect(&self) -> Result<(), EngineError> {
        self.request(EngineCommand::Disconnect).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(EngineCommand::Status).await
    }

    pub async fn config(&self) -> Result<EngineConfig, EngineError> {
        self.request(EngineCommand::Config).await
    }

    pub async fn update_config(&self, update: ConfigUpdate) -> Result<EngineConfig, EngineError> {
        self.request(|reply| EngineCommand::UpdateConfig { update, reply })
            .await?
    }

    pub async fn clear_buffer(&self) -> Result<usize, EngineError> {
        self.request(EngineCommand::ClearBuffer).await
    }

    pub async fn signal_stats(&self) -> Result<SignalStats, EngineError> {
        self.request(EngineCommand::SignalStats).await
    }

    pub async fn latest_frame(&self) -> Result<Option<Arc<SpectrumFrame>>, EngineError> {
        self.request(EngineCommand::LatestFrame).await
    }

    /// Run a detection pass over the newest frame
    pub async fn detect(&self, threshold: Option<f64>) -> Result<Vec<DetectedSignal>, EngineError> {
        self.request(|reply| EngineCommand::Detect { threshold, reply })
            .await
    }

    /// Stop the runner; the transport is closed and later calls fail
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.cmd_tx
            .send(EngineCommand::Shutdown)
            .await
            .map_err(|_| EngineError::Stopped)
    }
}

/// Owns the engine, the live transport and the reconnect timer
struct EngineRunner<C> {
    engine: SpectrumEngine,
    connector: C,
    default_url: String,
    transport: Option<TransportHandle>,
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl<C: Connector> EngineRunner<C> {
    fn new(engine: SpectrumEngine, connector: C, default_url: String) -> Self {
        Self {
            engine,
            connector,
            default_url,
            transport: None,
            reconnect: None,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<EngineCommand>) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }

                event = next_transport_event(&mut self.transport) => {
                    self.handle_transport_event(event);
                }

                () = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    let url = self
                        .engine
                        .connection()
                        .url()
                        .map(str::to_string)
                        .unwrap_or_else(|| self.default_url.clone());
                    self.open_transport(&url, false);
                }
            }
        }

        self.disconnect();
        info!("engine runner stopped");
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Connect { url, reply } => {
                let url = url.unwrap_or_else(|| self.default_url.clone());
                let result = validate_upstream_url(&url).map(|()| self.open_transport(&url, true));
                let _ = reply.send(result);
            }
            EngineCommand::Disconnect(reply) => {
                self.disconnect();
                let _ = reply.send(());
            }
            EngineCommand::Status(reply) => {
                let _ = reply.send(self.engine.status());
            }
            EngineCommand::Config(reply) => {
                let _ = reply.send(self.engine.config());
            }
            EngineCommand::UpdateConfig { update, reply } => {
                let _ = reply.send(self.engine.update_config(update));
            }
            EngineCommand::ClearBuffer(reply) => {
                let _ = reply.send(self.engine.clear_buffer());
            }
            EngineCommand::SignalStats(reply) => {
                let _ = reply.send(self.engine.signal_stats());
            }
            EngineCommand::LatestFrame(reply) => {
                let _ = reply.send(self.engine.latest_frame());
            }
            EngineCommand::Detect { threshold, reply } => {
                let _ = reply.send(self.engine.detect_latest(threshold));
            }
            // Handled by the run loop
            EngineCommand::Shutdown => {}
        }
    }

    fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Open) => self.engine.on_transport_open(),
            Some(TransportEvent::Binary(payload)) => {
                self.engine.on_transport_binary(&payload);
            }
            Some(TransportEvent::Text(text)) => {
                debug!(len = text.len(), "ignoring text message from upstream");
            }
            Some(TransportEvent::Error(message)) => {
                self.engine.on_transport_error(message.clone());
                // The session is unusable; a close arriving later finds no transport
                if let Some(transport) = self.transport.take() {
                    transport.close(ABNORMAL_CLOSURE, &message);
                }
                let outcome = self.engine.on_transport_close(ABNORMAL_CLOSURE, &message);
                self.apply_close(outcome);
            }
            Some(TransportEvent::Close { code, reason }) => {
                self.transport = None;
                let outcome = self.engine.on_transport_close(code, &reason);
                self.apply_close(outcome);
            }
            None => {
                self.transport = None;
                let outcome = self
                    .engine
                    .on_transport_close(ABNORMAL_CLOSURE, "transport ended without close");
                self.apply_close(outcome);
            }
        }
    }

    fn open_transport(&mut self, url: &str, explicit: bool) {
        if self.engine.begin_connect(url, explicit) == ConnectOutcome::AlreadyConnected {
            return;
        }

        self.reconnect = None;
        if let Some(previous) = self.transport.take() {
            previous.close(NORMAL_CLOSURE, "Reconnecting");
        }

        match self.connector.open(url) {
            Ok(handle) => self.transport = Some(handle),
            Err(e) => {
                let message = e.to_string();
                self.engine.on_transport_error(message.clone());
                let outcome = self.engine.on_transport_close(ABNORMAL_CLOSURE, &message);
                self.apply_close(outcome);
            }
        }
    }

    fn apply_close(&mut self, outcome: CloseOutcome) {
        match outcome {
            CloseOutcome::Reconnect { delay, .. } => {
                self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
            }
            CloseOutcome::Exhausted => {
                warn!("automatic reconnection exhausted, waiting for an explicit connect");
            }
            CloseOutcome::Manual | CloseOutcome::Ignored => {}
        }
    }

    fn disconnect(&mut self) {
        self.reconnect = None;
        if let Some(transport) = self.transport.take() {
            transport.close(NORMAL_CLOSURE, "Manual disconnect");
        }
        self.engine.disconnect();
    }
}

async fn next_transport_event(transport: &mut Option<TransportHandle>) -> Option<TransportEvent> {
    match transport {
        Some(handle) => handle.recv().await,
        None => pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
