use crate::models::{DetectionHistoryEntry, SignalStats};
use crate::services::rolling_buffer::RollingBuffer;

/// Bounded log of detection passes
#[derive(Debug, Clone)]
pub struct DetectionHistory {
    entries: RollingBuffer<DetectionHistoryEntry>,
}

impl DetectionHistory {
    pub fn new(max_size: usize, cleanup_threshold: usize) -> Self {
        Self {
            entries: RollingBuffer::new(max_size, cleanup_threshold),
        }
    }

    pub fn record(&mut self, entry: DetectionHistoryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&DetectionHistoryEntry> {
        self.entries.latest()
    }

    /// Aggregate statistics; every rate is 0 on an empty or instantaneous log
    pub fn stats(&self) -> SignalStats {
        let count = self.entries.len();
        if count == 0 {
            return SignalStats::default();
        }

        let total_signals: usize = self.entries.iter().map(|e| e.signal_count).sum();

        let span_ms = match (self.entries.first(), self.entries.latest()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => 0,
        };
        let detection_rate = if span_ms == 0 {
            0.0
        } else {
            (count - 1) as f64 / (span_ms as f64 / 1000.0)
        };

        SignalStats {
            total_detections: count,
            total_signals,
            average_signals_per_detection: total_signals as f64 / count as f64,
            detection_rate,
            latest_detection: self.entries.latest().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp: u64, signal_count: usize) -> DetectionHistoryEntry {
        DetectionHistoryEntry {
            timestamp,
            signal_count,
            threshold: -70.0,
        }
    }

    #[test]
    fn empty_history_has_zero_rates() {
        let stats = DetectionHistory::new(100, 50).stats();
        assert_eq!(stats.total_detections, 0);
        assert_eq!(stats.average_signals_per_detection, 0.0);
        assert_eq!(stats.detection_rate, 0.0);
        assert!(stats.latest_detection.is_none());
    }

    #[test]
    fn single_pass_has_no_rate() {
        let mut history = DetectionHistory::new(100, 50);
        history.record(entry(5_000, 2));
        let stats = history.stats();
        assert_eq!(stats.total_detections, 1);
        assert_eq!(stats.total_signals, 2);
        assert_eq!(stats.detection_rate, 0.0);
    }

    #[test]
    fn aggregates_counts_and_rate() {
        let mut history = DetectionHistory::new(100, 50);
        // five passes over two seconds, zero-signal passes included
        for (i, count) in [3, 0, 1, 0, 1].into_iter().enumerate() {
            history.record(entry(10_000 + i as u64 * 500, count));
        }
        let stats = history.stats();
        assert_eq!(stats.total_detections, 5);
        assert_eq!(stats.total_signals, 5);
        assert_eq!(stats.average_signals_per_detection, 1.0);
        assert!((stats.detection_rate - 2.0).abs() < 1e-9);
        assert_eq!(stats.latest_detection.map(|d| d.timestamp), Some(12_000));
    }

    #[test]
    fn history_is_bounded() {
        let mut history = DetectionHistory::new(100, 50);
        for i in 0..101 {
            history.record(entry(i, 1));
        }
        assert_eq!(history.len(), 50);
        assert_eq!(history.latest().map(|e| e.timestamp), Some(100));
    }
}
