use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One decoded spectral snapshot as received from the receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Power per bin in dB
    pub power: Vec<f32>,
    pub center_freq: f64,
    pub sample_rate: f64,
    pub fft_size: u32,
    /// Size of the raw payload this frame was decoded from
    pub byte_length: usize,
}

impl SpectrumFrame {
    /// Build a frame from already calibrated dB values
    pub fn new(timestamp: u64, power: Vec<f32>, center_freq: f64, sample_rate: f64) -> Self {
        Self {
            timestamp,
            fft_size: power.len() as u32,
            byte_length: power.len() * 4,
            power,
            center_freq,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// Number of bins actually carried by this frame
    pub fn bins(&self) -> usize {
        self.power.len()
    }

    /// Width of one bin in Hz, zero for an empty frame
    pub fn bin_width(&self) -> f64 {
        if self.power.is_empty() {
            0.0
        } else {
            self.sample_rate / self.power.len() as f64
        }
    }

    /// Absolute frequency of a bin in Hz.
    ///
    /// Bin `n/2` maps exactly to the center frequency and bin 0 to
    /// `center_freq - sample_rate/2`. Frames without power values map every
    /// bin to 0.
    pub fn frequency_of_bin(&self, bin: usize) -> f64 {
        let n = self.power.len();
        if n == 0 {
            return 0.0;
        }
        let offset = bin as f64 - (n / 2) as f64;
        self.center_freq + offset * self.bin_width()
    }
}

/// Current wall-clock time in ms since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
