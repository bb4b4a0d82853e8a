use spectrum_engine::config::Settings;
use spectrum_engine::logging;
use spectrum_engine::models::EngineEvent;
use spectrum_engine::services::transport::SyntheticConnector;
use spectrum_engine::services::{ScanProfile, SCAN_PROFILES};
use spectrum_engine::EngineHandle;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

const DEFAULT_FFT_SIZE: u32 = 1024;
const DEFAULT_SAMPLE_RATE: f64 = 2_400_000.0;
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    logging::init_tracing();

    let mut settings = Settings::load();
    let profile = settings
        .detector
        .profile
        .as_deref()
        .and_then(ScanProfile::by_id)
        .unwrap_or(&SCAN_PROFILES[0]);

    // Default tuning is the middle of the profile's first range
    if settings.engine.center_freq == 0.0 {
        settings.engine.center_freq = profile.center_hz();
    }
    if settings.engine.sample_rate == 0.0 {
        settings.engine.sample_rate = DEFAULT_SAMPLE_RATE;
    }
    let fft_size = settings.engine.fft_size.unwrap_or(DEFAULT_FFT_SIZE) as usize;

    let connector = SyntheticConnector::new(
        profile,
        settings.synthetic,
        fft_size,
        settings.engine.center_freq,
        settings.engine.sample_rate,
    );
    let handle = EngineHandle::spawn(&settings, connector);
    let mut events = handle.subscribe();

    if let Err(e) = handle.connect(None).await {
        error!(error = %e, "failed to start upstream connection");
        return;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut status_tick = tokio::time::interval(STATUS_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }

            event = events.recv() => match event {
                Ok(EngineEvent::SignalsDetected { signals, .. }) => {
                    for signal in signals {
                        info!(
                            frequency_mhz = signal.frequency / 1e6,
                            power_db = signal.power,
                            bandwidth_hz = signal.bandwidth,
                            snr_db = signal.snr,
                            confidence = signal.confidence,
                            "signal detected"
                        );
                    }
                }
                Ok(EngineEvent::Disconnected { code, reason, .. }) => {
                    warn!(code, reason = %reason, "upstream disconnected");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            },

            _ = status_tick.tick() => {
                match handle.signal_stats().await {
                    Ok(stats) => info!(
                        passes = stats.total_detections,
                        signals = stats.total_signals,
                        average = stats.average_signals_per_detection,
                        rate_hz = stats.detection_rate,
                        "detection statistics"
                    ),
                    Err(e) => {
                        error!(error = %e, "engine stopped unexpectedly");
                        break;
                    }
                }
            }
        }
    }

    let _ = handle.disconnect().await;
    let _ = handle.shutdown().await;
}
