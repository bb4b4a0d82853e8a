//! Binary FFT payload decoding

use crate::config::EngineConfig;
use crate::models::{now_millis, SpectrumFrame};
use tracing::{debug, info};

/// Floor applied to zero, negative and non-finite amplitudes, in dB
pub const NOISE_FLOOR_DB: f32 = -120.0;

const BYTES_PER_BIN: usize = 4;

/// Convert a linear amplitude to dB, flooring anything that has no finite log
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if !amplitude.is_finite() || amplitude <= 0.0 {
        return NOISE_FLOOR_DB;
    }
    let db = 20.0 * amplitude.log10();
    if db.is_finite() {
        db.max(NOISE_FLOOR_DB)
    } else {
        NOISE_FLOOR_DB
    }
}

/// Decode a payload of little-endian f32 amplitudes into a dB frame.
///
/// Never fails: trailing partial floats are ignored and an unusable payload
/// produces an empty frame. The first payload holding at least one float
/// fixes `config.fft_size`; later payloads are truncated or padded with the
/// noise floor to that size.
pub fn decode(raw: &[u8], config: &mut EngineConfig) -> SpectrumFrame {
    let mut power: Vec<f32> = raw
        .chunks_exact(BYTES_PER_BIN)
        .map(|chunk| amplitude_to_db(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect();

    if !power.is_empty() {
        match config.fft_size {
            None => {
                let size = (raw.len() / BYTES_PER_BIN) as u32;
                config.fft_size = Some(size);
                info!(fft_size = size, "auto-detected FFT size");
            }
            Some(size) if size as usize != power.len() => {
                debug!(
                    expected = size,
                    received = power.len(),
                    "frame size differs from configured FFT size"
                );
                power.resize(size as usize, NOISE_FLOOR_DB);
            }
            Some(_) => {}
        }
    } else if !raw.is_empty() {
        debug!(bytes = raw.len(), "payload too short for a single bin");
    }

    SpectrumFrame {
        timestamp: now_millis(),
        fft_size: power.len() as u32,
        power,
        center_freq: config.center_freq,
        sample_rate: config.sample_rate,
        byte_length: raw.len(),
    }
}
