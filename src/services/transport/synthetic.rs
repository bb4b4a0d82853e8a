//! Synthetic receiver producing noise spectra with a few carriers

use super::{session_channels, Connector, TransportEvent, TransportHandle};
use crate::config::SyntheticSettings;
use crate::error::TransportError;
use crate::services::profiles::ScanProfile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Linear amplitude of the background noise (about -80 dB)
const NOISE_AMPLITUDE: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy)]
struct Carrier {
    bin: usize,
    amplitude: f32,
}

/// Connector that fabricates a receiver stream for demos and soak runs.
///
/// Carriers are only placed on bins whose frequency, for the given tuning,
/// falls inside one of the profile's ranges.
pub struct SyntheticConnector {
    profile: &'static ScanProfile,
    settings: SyntheticSettings,
    fft_size: usize,
    center_freq: f64,
    sample_rate: f64,
}

impl SyntheticConnector {
    pub fn new(
        profile: &'static ScanProfile,
        settings: SyntheticSettings,
        fft_size: usize,
        center_freq: f64,
        sample_rate: f64,
    ) -> Self {
        Self {
            profile,
            settings,
            fft_size: fft_size.max(16),
            center_freq,
            sample_rate,
        }
    }
}

impl Connector for SyntheticConnector {
    fn open(&mut self, url: &str) -> Result<TransportHandle, TransportError> {
        let (events, mut close_rx, handle) = session_channels();
        let interval = Duration::from_millis(self.settings.frame_interval_ms.max(1));
        let fft_size = self.fft_size;
        let carriers = self.settings.carriers as usize;
        let spans = profile_spans(self.profile, fft_size, self.center_freq, self.sample_rate);
        if spans.is_empty() && carriers > 0 {
            warn!(
                profile = self.profile.id,
                center_freq = self.center_freq,
                "tuning does not overlap the scan profile, streaming noise only"
            );
        }

        info!(
            url,
            profile = self.profile.id,
            fft_size,
            carriers,
            "starting synthetic receiver"
        );

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut active = place_carriers(&mut rng, &spans, carriers);

            if events.send(TransportEvent::Open).await.is_err() {
                return;
            }

            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    frame = &mut close_rx => {
                        if let Ok(frame) = frame {
                            debug!(code = frame.code, reason = %frame.reason, "synthetic receiver closed");
                        }
                        return;
                    }
                    _ = ticker.tick() => {
                        // Occasionally retune one carrier so detections move around
                        if !active.is_empty() && rng.gen_bool(0.05) {
                            let idx = rng.gen_range(0..active.len());
                            active[idx] = random_carrier(&mut rng, &spans);
                        }
                        let payload = synthesize_frame(&mut rng, fft_size, &active);
                        if events.send(TransportEvent::Binary(payload)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(handle)
    }

    fn backend_name(&self) -> &'static str {
        "synthetic"
    }
}

/// Bin ranges inside the profile, clear of the frame edges so a whole skirt fits
fn profile_spans(
    profile: &ScanProfile,
    fft_size: usize,
    center_freq: f64,
    sample_rate: f64,
) -> Vec<Range<usize>> {
    if sample_rate.is_nan() || sample_rate <= 0.0 {
        return Vec::new();
    }
    let margin = (fft_size / 16).max(2);
    let bin_width = sample_rate / fft_size as f64;
    let half = (fft_size / 2) as f64;
    let to_bin = |mhz: f64| (mhz * 1e6 - center_freq) / bin_width + half;

    profile
        .ranges
        .iter()
        .filter_map(|&(start, end)| {
            let lo = to_bin(start).ceil().max(margin as f64);
            let hi = to_bin(end).floor().min((fft_size - margin - 1) as f64);
            (lo <= hi).then(|| lo as usize..hi as usize + 1)
        })
        .collect()
}

fn random_carrier(rng: &mut StdRng, spans: &[Range<usize>]) -> Carrier {
    let span = &spans[rng.gen_range(0..spans.len())];
    Carrier {
        bin: rng.gen_range(span.clone()),
        amplitude: rng.gen_range(0.003f32..0.1),
    }
}

fn place_carriers(rng: &mut StdRng, spans: &[Range<usize>], count: usize) -> Vec<Carrier> {
    if spans.is_empty() {
        return Vec::new();
    }
    (0..count).map(|_| random_carrier(rng, spans)).collect()
}

/// One frame of little-endian f32 amplitudes
fn synthesize_frame(rng: &mut StdRng, fft_size: usize, carriers: &[Carrier]) -> Vec<u8> {
    let mut amplitudes: Vec<f32> = (0..fft_size)
        .map(|_| NOISE_AMPLITUDE * rng.gen_range(0.5f32..1.5))
        .collect();

    for carrier in carriers {
        let jitter = rng.gen_range(0.9f32..1.1);
        amplitudes[carrier.bin] += carrier.amplitude * jitter;
        // Skirt one bin either side at roughly -6 dB
        amplitudes[carrier.bin - 1] += carrier.amplitude * 0.5;
        amplitudes[carrier.bin + 1] += carrier.amplitude * 0.5;
    }

    amplitudes.iter().flat_map(|a| a.to_le_bytes()).collect()
}
