use crate::config::{ConfigUpdate, EngineConfig, Settings};
use crate::error::EngineError;
use crate::models::{
    now_millis, DetectedSignal, DetectionSummary, EngineEvent, EngineStatus, SignalStats,
    SpectrumFrame,
};
use crate::services::connection::{
    CloseOutcome, ConnectOutcome, ConnectionManager, NORMAL_CLOSURE,
};
use crate::services::decoder;
use crate::services::detector::SignalDetector;
use crate::services::history::DetectionHistory;
use crate::services::rolling_buffer::RollingBuffer;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Spectrum ingest, detection and connection bookkeeping.
///
/// Owned by a single runner task, which feeds it transport events and
/// commands one at a time.
pub struct SpectrumEngine {
    config: EngineConfig,
    frames: RollingBuffer<Arc<SpectrumFrame>>,
    history: DetectionHistory,
    detector: SignalDetector,
    connection: ConnectionManager,
    last_detection: Option<DetectionSummary>,
    detect_on_frame: bool,
    events: broadcast::Sender<EngineEvent>,
}

impl SpectrumEngine {
    pub fn new(settings: &Settings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let frames = RollingBuffer::new(settings.buffer.max_size, settings.buffer.cleanup_threshold);

        info!(
            max_buffer_size = frames.max_size(),
            cleanup_threshold = frames.cleanup_threshold(),
            signal_threshold = settings.engine.signal_threshold,
            "spectrum engine created"
        );

        Self {
            config: settings.engine,
            frames,
            history: DetectionHistory::new(
                settings.buffer.history_max,
                settings.buffer.history_cleanup,
            ),
            detector: SignalDetector::new(&settings.detector),
            connection: ConnectionManager::new(&settings.upstream),
            last_detection: None,
            detect_on_frame: settings.detect_on_frame,
            events,
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Decode a binary payload and run it through the pipeline.
    ///
    /// Returns the buffered frame, or `None` when the payload decoded to an
    /// empty spectrum.
    pub fn ingest(&mut self, raw: &[u8]) -> Option<Arc<SpectrumFrame>> {
        let frame = decoder::decode(raw, &mut self.config);
        if frame.is_empty() {
            debug!(bytes = raw.len(), "dropping empty frame");
            return None;
        }
        Some(self.push_frame(frame))
    }

    /// Buffer an already decoded frame, publish it and optionally detect
    pub fn push_frame(&mut self, frame: SpectrumFrame) -> Arc<SpectrumFrame> {
        let frame = Arc::new(frame);
        let evicted = self.frames.push(frame.clone());
        if evicted > 0 {
            debug!(
                evicted,
                new_size = self.frames.len(),
                "frame buffer cleaned up"
            );
        }

        self.emit(EngineEvent::FftData(frame.clone()));

        if self.detect_on_frame {
            self.detect(&frame, None);
        }
        frame
    }

    /// Run one detection pass over `frame`.
    ///
    /// Every pass is recorded in the detection history, including passes
    /// that found nothing.
    pub fn detect(
        &mut self,
        frame: &Arc<SpectrumFrame>,
        threshold: Option<f64>,
    ) -> Vec<DetectedSignal> {
        let threshold = threshold.unwrap_or(self.config.signal_threshold);
        let signals = self.detector.detect(frame, threshold);

        let summary = DetectionSummary {
            timestamp: frame.timestamp,
            signal_count: signals.len(),
            threshold,
        };
        self.last_detection = Some(summary);
        self.history.record(summary);

        if !signals.is_empty() {
            self.emit(EngineEvent::SignalsDetected {
                signals: signals.clone(),
                timestamp: frame.timestamp,
                source_frame: frame.clone(),
            });
        }
        signals
    }

    /// Detect on the newest buffered frame; an empty buffer yields nothing
    pub fn detect_latest(&mut self, threshold: Option<f64>) -> Vec<DetectedSignal> {
        match self.frames.latest().cloned() {
            Some(frame) => self.detect(&frame, threshold),
            None => Vec::new(),
        }
    }

    pub fn begin_connect(&mut self, url: &str, explicit: bool) -> ConnectOutcome {
        self.connection.begin_connect(url, explicit)
    }

    pub fn on_transport_open(&mut self) {
        self.connection.on_open();
        self.emit(EngineEvent::Connected {
            url: self.connection.url().unwrap_or_default().to_string(),
            timestamp: now_millis(),
        });
    }

    /// Route a binary message; ignored unless connected
    pub fn on_transport_binary(&mut self, raw: &[u8]) -> Option<Arc<SpectrumFrame>> {
        if !self.connection.is_connected() {
            debug!(bytes = raw.len(), state = ?self.connection.state(), "ignoring frame while not connected");
            return None;
        }
        self.ingest(raw)
    }

    pub fn on_transport_error(&mut self, message: String) {
        error!(error = %message, "upstream transport error");
        self.emit(EngineEvent::Error { message });
    }

    pub fn on_transport_close(&mut self, code: u16, reason: &str) -> CloseOutcome {
        let outcome = self.connection.on_close(code, reason);
        if outcome != CloseOutcome::Ignored {
            self.emit(EngineEvent::Disconnected {
                code,
                reason: reason.to_string(),
                timestamp: now_millis(),
            });
        }
        outcome
    }

    /// Manual disconnect; buffered frames and history are kept
    pub fn disconnect(&mut self) {
        if self.connection.disconnect() {
            self.emit(EngineEvent::Disconnected {
                code: NORMAL_CLOSURE,
                reason: "Manual disconnect".to_string(),
                timestamp: now_millis(),
            });
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Merge `update` into the config, returning the new snapshot
    pub fn update_config(&mut self, update: ConfigUpdate) -> Result<EngineConfig, EngineError> {
        let old_config = self.config;
        let new_config = update.apply(&old_config)?;
        self.config = new_config;

        info!(?old_config, ?new_config, "configuration updated");
        self.emit(EngineEvent::ConfigUpdated {
            old_config,
            new_config,
        });
        Ok(new_config)
    }

    /// Drop every buffered frame, returning how many there were
    pub fn clear_buffer(&mut self) -> usize {
        let previous_size = self.frames.clear();
        info!(previous_size, "frame buffer cleared");
        self.emit(EngineEvent::BufferCleared { previous_size });
        previous_size
    }

    pub fn latest_frame(&self) -> Option<Arc<SpectrumFrame>> {
        self.frames.latest().cloned()
    }

    pub fn buffer_len(&self) -> usize {
        self.frames.len()
    }

    pub fn signal_stats(&self) -> SignalStats {
        self.history.stats()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.connection.state(),
            connected: self.connection.is_connected(),
            url: self.connection.url().map(str::to_string),
            reconnect_attempts: self.connection.reconnect_attempts(),
            max_reconnect_attempts: self.connection.max_reconnect_attempts(),
            reconnect_exhausted: self.connection.is_exhausted(),
            buffer_size: self.frames.len(),
            max_buffer_size: self.frames.max_size(),
            config: self.config,
            last_update: self.frames.latest().map(|f| f.timestamp),
            last_signal_detection: self.last_detection,
            signal_history_length: self.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::connection::{ConnectionState, ABNORMAL_CLOSURE};

    const URL: &str = "ws://localhost:8073/ws/";

    fn engine() -> SpectrumEngine {
        let mut settings = Settings::default();
        settings.engine.center_freq = 145_000_000.0;
        settings.engine.sample_rate = 2_400_000.0;
        SpectrumEngine::new(&settings)
    }

    fn payload(bins: usize, peak: Option<usize>) -> Vec<u8> {
        (0..bins)
            .map(|i| if Some(i) == peak { 0.1f32 } else { 0.0001f32 })
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }

    #[test]
    fn ingest_buffers_and_detects() {
        let mut engine = engine();
        let mut events = engine.subscribe();

        let frame = engine.ingest(&payload(1024, Some(512))).unwrap();
        assert_eq!(frame.power.len(), 1024);
        assert_eq!(engine.config().fft_size, Some(1024));
        assert_eq!(engine.buffer_len(), 1);

        assert_eq!(events.try_recv().unwrap().name(), "fftData");
        match events.try_recv().unwrap() {
            EngineEvent::SignalsDetected { signals, .. } => {
                assert_eq!(signals.len(), 1);
                assert_eq!(signals[0].bin, 512);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(engine.signal_stats().total_detections, 1);
    }

    #[test]
    fn zero_signal_passes_are_recorded_without_event() {
        let mut engine = engine();
        let mut events = engine.subscribe();
        engine.ingest(&payload(64, None));

        assert_eq!(events.try_recv().unwrap().name(), "fftData");
        assert!(events.try_recv().is_err());

        let stats = engine.signal_stats();
        assert_eq!(stats.total_detections, 1);
        assert_eq!(stats.total_signals, 0);
        assert_eq!(engine.status().last_signal_detection.unwrap().signal_count, 0);
    }

    #[test]
    fn empty_payload_is_not_buffered() {
        let mut engine = engine();
        assert!(engine.ingest(&[1, 2]).is_none());
        assert_eq!(engine.buffer_len(), 0);
        assert_eq!(engine.signal_stats().total_detections, 0);
    }

    #[test]
    fn detect_latest_on_empty_buffer() {
        let mut engine = engine();
        assert!(engine.detect_latest(None).is_empty());
        assert_eq!(engine.signal_stats().total_detections, 0);
    }

    #[test]
    fn threshold_override_applies_to_one_pass() {
        let mut settings = Settings::default();
        settings.detect_on_frame = false;
        let mut engine = SpectrumEngine::new(&settings);
        engine.ingest(&payload(1024, Some(512)));
        assert_eq!(engine.signal_stats().total_detections, 0);

        // -20 dB peak is below a -10 dB override
        assert!(engine.detect_latest(Some(-10.0)).is_empty());
        assert_eq!(engine.detect_latest(None).len(), 1);
        assert_eq!(engine.status().last_signal_detection.unwrap().threshold, -70.0);
    }

    #[test]
    fn update_config_emits_old_and_new() {
        let mut engine = engine();
        let mut events = engine.subscribe();
        let update = ConfigUpdate {
            signal_threshold: Some(-60.0),
            ..Default::default()
        };
        let new_config = engine.update_config(update).unwrap();
        assert_eq!(new_config.signal_threshold, -60.0);
        assert_eq!(new_config.center_freq, 145_000_000.0);

        match events.try_recv().unwrap() {
            EngineEvent::ConfigUpdated {
                old_config,
                new_config,
            } => {
                assert_eq!(old_config.signal_threshold, -70.0);
                assert_eq!(new_config.signal_threshold, -60.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn rejected_update_leaves_config_untouched() {
        let mut engine = engine();
        let mut events = engine.subscribe();
        let before = engine.config();
        let update = ConfigUpdate {
            sample_rate: Some(-2.0),
            signal_threshold: Some(-50.0),
            ..Default::default()
        };
        assert!(engine.update_config(update).is_err());
        assert_eq!(engine.config(), before);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn clear_buffer_reports_previous_size() {
        let mut engine = engine();
        for _ in 0..3 {
            engine.ingest(&payload(32, None));
        }
        let mut events = engine.subscribe();
        assert_eq!(engine.clear_buffer(), 3);
        assert_eq!(
            events.try_recv().unwrap(),
            EngineEvent::BufferCleared { previous_size: 3 }
        );
        assert!(engine.latest_frame().is_none());
        // history survives a buffer clear
        assert_eq!(engine.signal_stats().total_detections, 3);
    }

    #[test]
    fn frames_are_ignored_until_connected() {
        let mut engine = engine();
        assert!(engine.on_transport_binary(&payload(16, None)).is_none());

        engine.begin_connect(URL, true);
        assert!(engine.on_transport_binary(&payload(16, None)).is_none());

        engine.on_transport_open();
        assert!(engine.on_transport_binary(&payload(16, None)).is_some());
    }

    #[test]
    fn status_reflects_connection_and_buffer() {
        let mut engine = engine();
        engine.begin_connect(URL, true);
        engine.on_transport_open();
        let frame = engine.on_transport_binary(&payload(1024, Some(100))).unwrap();

        let status = engine.status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert!(status.connected);
        assert_eq!(status.url.as_deref(), Some(URL));
        assert_eq!(status.buffer_size, 1);
        assert_eq!(status.max_buffer_size, 1000);
        assert_eq!(status.last_update, Some(frame.timestamp));
        assert_eq!(status.signal_history_length, 1);
        assert_eq!(status.reconnect_attempts, 0);
    }

    #[test]
    fn disconnect_keeps_data_and_is_idempotent() {
        let mut engine = engine();
        engine.begin_connect(URL, true);
        engine.on_transport_open();
        engine.on_transport_binary(&payload(32, None));

        let mut events = engine.subscribe();
        engine.disconnect();
        engine.disconnect();

        match events.try_recv().unwrap() {
            EngineEvent::Disconnected { code, .. } => assert_eq!(code, NORMAL_CLOSURE),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(events.try_recv().is_err());
        assert_eq!(engine.buffer_len(), 1);
        assert_eq!(engine.signal_stats().total_detections, 1);
    }

    #[test]
    fn unexpected_close_schedules_reconnect() {
        let mut engine = engine();
        engine.begin_connect(URL, true);
        engine.on_transport_open();
        match engine.on_transport_close(ABNORMAL_CLOSURE, "reset") {
            CloseOutcome::Reconnect { attempt, .. } => assert_eq!(attempt, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(engine.status().reconnect_attempts, 1);
    }
}
