//! Narrowband peak detection over a single spectrum frame

use crate::config::DetectorSettings;
use crate::models::{DetectedSignal, SignalKind, SpectrumFrame};
use crate::services::profiles::ScanProfile;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Threshold-based peak detector
#[derive(Debug, Clone)]
pub struct SignalDetector {
    min_peak_distance: usize,
    bandwidth_margin_db: f64,
    confidence_span_db: f64,
    min_snr: Option<f64>,
    profile: Option<&'static ScanProfile>,
}

impl Default for SignalDetector {
    fn default() -> Self {
        Self::new(&DetectorSettings::default())
    }
}

impl SignalDetector {
    pub fn new(settings: &DetectorSettings) -> Self {
        let profile = settings.profile.as_deref().and_then(|id| {
            let found = ScanProfile::by_id(id);
            if found.is_none() {
                warn!(profile = id, "unknown scan profile, detecting across the full span");
            }
            found
        });

        Self {
            min_peak_distance: settings.min_peak_distance.max(1),
            bandwidth_margin_db: settings.bandwidth_margin_db.abs(),
            confidence_span_db: if settings.confidence_span_db > 0.0 {
                settings.confidence_span_db
            } else {
                DetectorSettings::default().confidence_span_db
            },
            min_snr: settings.min_snr,
            profile,
        }
    }

    pub fn profile(&self) -> Option<&'static ScanProfile> {
        self.profile
    }

    /// Find peaks at or above `threshold` (dB), ordered by ascending bin.
    ///
    /// Candidates closer than the minimum peak distance collapse to the
    /// strongest one, so lowering the threshold can only add signals.
    pub fn detect(&self, frame: &SpectrumFrame, threshold: f64) -> Vec<DetectedSignal> {
        let power = &frame.power;
        if power.is_empty() {
            return Vec::new();
        }

        let noise_floor = estimate_noise_floor(power);

        let mut candidates: Vec<usize> = (0..power.len())
            .filter(|&i| self.is_candidate(frame, i, threshold, noise_floor))
            .collect();

        // Strongest first; the sort is stable so ties keep the lower bin first
        candidates.sort_by(|&a, &b| power[b].total_cmp(&power[a]));

        let reach = self.min_peak_distance - 1;
        let mut peaks = BTreeSet::new();
        for bin in candidates {
            let lo = bin.saturating_sub(reach);
            let hi = bin.saturating_add(reach);
            if peaks.range(lo..=hi).next().is_none() {
                peaks.insert(bin);
            }
        }

        let bin_width = frame.bin_width();
        let signals: Vec<DetectedSignal> = peaks
            .into_iter()
            .map(|bin| {
                let peak = power[bin] as f64;
                DetectedSignal {
                    bin,
                    frequency: frame.frequency_of_bin(bin),
                    power: power[bin],
                    bandwidth: estimate_bandwidth(power, bin, self.bandwidth_margin_db, bin_width),
                    confidence: confidence(peak, threshold, self.confidence_span_db),
                    snr: peak - noise_floor,
                    timestamp: frame.timestamp,
                    kind: SignalKind::Detected,
                }
            })
            .collect();

        debug!(
            signals = signals.len(),
            threshold,
            noise_floor,
            bins = power.len(),
            "detection pass complete"
        );

        signals
    }

    fn is_candidate(&self, frame: &SpectrumFrame, i: usize, threshold: f64, noise_floor: f64) -> bool {
        let power = &frame.power;
        let current = power[i];
        if (current as f64) < threshold {
            return false;
        }

        let left = if i > 0 { power[i - 1] } else { f32::NEG_INFINITY };
        let right = power.get(i + 1).copied().unwrap_or(f32::NEG_INFINITY);
        if !(current >= left && current > right) {
            return false;
        }

        if let Some(min_snr) = self.min_snr {
            if (current as f64) - noise_floor < min_snr {
                return false;
            }
        }

        match self.profile {
            Some(profile) => profile.contains_hz(frame.frequency_of_bin(i)),
            None => true,
        }
    }
}

/// Median power of the frame in dB, used as the background level
pub fn estimate_noise_floor(power: &[f32]) -> f64 {
    if power.is_empty() {
        return 0.0;
    }
    let mut sorted = power.to_vec();
    let mid = sorted.len() / 2;
    let (_, median, _) = sorted.select_nth_unstable_by(mid, f32::total_cmp);
    *median as f64
}

/// Width in Hz of the contiguous run around `peak` that stays within
/// `margin_db` of the peak power
pub fn estimate_bandwidth(power: &[f32], peak: usize, margin_db: f64, bin_width: f64) -> f64 {
    let floor = power[peak] as f64 - margin_db;

    let mut left = peak;
    while left > 0 && power[left - 1] as f64 >= floor {
        left -= 1;
    }

    let mut right = peak;
    while right + 1 < power.len() && power[right + 1] as f64 >= floor {
        right += 1;
    }

    (right - left + 1) as f64 * bin_width
}

/// Confidence in (0, 1] growing with the margin above threshold and
/// saturating once the margin reaches `span_db`
pub fn confidence(power: f64, threshold: f64, span_db: f64) -> f64 {
    let margin = (power - threshold).max(0.0);
    ((margin + 1.0) / (span_db + 1.0)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame_with(power: Vec<f32>) -> SpectrumFrame {
        SpectrumFrame::new(1_000, power, 145_000_000.0, 2_400_000.0)
    }

    /// Noise at -90 dB with three narrow emissions
    fn three_signal_frame() -> SpectrumFrame {
        let mut power = vec![-90.0; 1024];
        power[256] = -60.0;
        power[257] = -62.0;
        power[258] = -65.0;
        power[512] = -55.0;
        power[513] = -56.0;
        power[514] = -58.0;
        power[768] = -65.0;
        power[769] = -66.0;
        power[770] = -68.0;
        frame_with(power)
    }

    #[test]
    fn finds_each_emission_once() {
        let signals = SignalDetector::default().detect(&three_signal_frame(), -70.0);
        let bins: Vec<_> = signals.iter().map(|s| s.bin).collect();
        assert_eq!(bins, vec![256, 512, 768]);
        assert!(signals.iter().all(|s| s.kind == SignalKind::Detected));
        assert!(signals.iter().all(|s| s.timestamp == 1_000));
    }

    #[test]
    fn threshold_excludes_weak_peaks() {
        let signals = SignalDetector::default().detect(&three_signal_frame(), -58.0);
        let bins: Vec<_> = signals.iter().map(|s| s.bin).collect();
        assert_eq!(bins, vec![512]);
    }

    #[test]
    fn nearby_peaks_collapse_to_the_strongest() {
        let mut power = vec![-90.0; 64];
        power[20] = -50.0;
        power[23] = -40.0;
        power[40] = -45.0;
        let signals = SignalDetector::default().detect(&frame_with(power), -70.0);
        let bins: Vec<_> = signals.iter().map(|s| s.bin).collect();
        assert_eq!(bins, vec![23, 40]);
    }

    #[test]
    fn equal_peaks_keep_the_lower_bin() {
        let mut power = vec![-90.0; 64];
        power[30] = -40.0;
        power[32] = -40.0;
        let signals = SignalDetector::default().detect(&frame_with(power), -70.0);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].bin, 30);
    }

    #[test]
    fn edge_bins_can_be_peaks() {
        let mut power = vec![-90.0; 32];
        power[0] = -30.0;
        power[31] = -30.0;
        let signals = SignalDetector::default().detect(&frame_with(power), -70.0);
        let bins: Vec<_> = signals.iter().map(|s| s.bin).collect();
        assert_eq!(bins, vec![0, 31]);
    }

    #[test]
    fn empty_frame_yields_nothing() {
        let signals = SignalDetector::default().detect(&frame_with(Vec::new()), -70.0);
        assert!(signals.is_empty());
    }

    #[test]
    fn bandwidth_spans_bins_within_margin() {
        let frame = three_signal_frame();
        let bin_width = frame.bin_width();
        // 512..=514 stay within 3 dB of the -55 dB peak
        let bandwidth = estimate_bandwidth(&frame.power, 512, 3.0, bin_width);
        assert_eq!(bandwidth, 3.0 * bin_width);
        // a 2 dB margin stops before 514
        let bandwidth = estimate_bandwidth(&frame.power, 512, 2.0, bin_width);
        assert_eq!(bandwidth, 2.0 * bin_width);
        // a lone spike occupies exactly one bin
        let mut power = vec![-90.0; 16];
        power[8] = -20.0;
        assert_eq!(estimate_bandwidth(&power, 8, 3.0, 100.0), 100.0);
    }

    #[test]
    fn confidence_grows_with_margin() {
        let weak = confidence(-69.0, -70.0, 40.0);
        let strong = confidence(-40.0, -70.0, 40.0);
        assert!(weak > 0.0 && weak <= 1.0);
        assert!(strong > weak);
        assert_eq!(confidence(0.0, -70.0, 40.0), 1.0);
        assert!(confidence(-70.0, -70.0, 40.0) > 0.0);
    }

    #[test]
    fn snr_is_measured_against_the_median() {
        let signals = SignalDetector::default().detect(&three_signal_frame(), -70.0);
        let strongest = signals.iter().find(|s| s.bin == 512).unwrap();
        assert!((strongest.snr - 35.0).abs() < 1e-6);
    }

    #[test]
    fn min_snr_gate_drops_marginal_peaks() {
        let detector = SignalDetector::new(&DetectorSettings {
            min_snr: Some(32.0),
            ..Default::default()
        });
        let signals = detector.detect(&three_signal_frame(), -70.0);
        let bins: Vec<_> = signals.iter().map(|s| s.bin).collect();
        assert_eq!(bins, vec![512]);
    }

    #[test]
    fn profile_limits_detection_to_its_band() {
        // 145 MHz +/- 1.2 MHz straddles the 144 MHz lower edge of the VHF profile
        let mut power = vec![-90.0; 1024];
        power[10] = -30.0; // ~143.8 MHz
        power[600] = -30.0; // ~145.2 MHz
        let detector = SignalDetector::new(&DetectorSettings {
            profile: Some("vhf".to_string()),
            ..Default::default()
        });
        let signals = detector.detect(&frame_with(power), -70.0);
        let bins: Vec<_> = signals.iter().map(|s| s.bin).collect();
        assert_eq!(bins, vec![600]);
    }

    #[test]
    fn unknown_profile_is_ignored() {
        let detector = SignalDetector::new(&DetectorSettings {
            profile: Some("shortwave".to_string()),
            ..Default::default()
        });
        assert!(detector.profile().is_none());
    }

    proptest! {
        #[test]
        fn lowering_threshold_never_loses_signals(
            power in proptest::collection::vec(-120.0f32..0.0, 1..256),
            high in -100.0f64..0.0,
            drop in 0.0f64..40.0,
        ) {
            let detector = SignalDetector::default();
            let frame = frame_with(power);
            let strict = detector.detect(&frame, high).len();
            let relaxed = detector.detect(&frame, high - drop).len();
            prop_assert!(relaxed >= strict);
        }

        #[test]
        fn confidence_stays_in_unit_interval(
            power in proptest::collection::vec(-120.0f32..0.0, 1..128),
            threshold in -120.0f64..0.0,
        ) {
            let frame = frame_with(power);
            for signal in SignalDetector::default().detect(&frame, threshold) {
                prop_assert!(signal.confidence > 0.0 && signal.confidence <= 1.0);
                prop_assert!(signal.power as f64 >= threshold);
            }
        }
    }
}
