use std::collections::VecDeque;

/// Bounded, oldest-first store with high/low water mark eviction.
///
/// Once a push would take the buffer past `max_size`, the oldest entries are
/// dropped until exactly `cleanup_threshold` remain, the pushed item included.
/// The backing ring is allocated once and never grows past `max_size`.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    items: VecDeque<T>,
    max_size: usize,
    cleanup_threshold: usize,
}

impl<T> RollingBuffer<T> {
    pub fn new(max_size: usize, cleanup_threshold: usize) -> Self {
        let max_size = max_size.max(1);
        let cleanup_threshold = cleanup_threshold.clamp(1, max_size);
        Self {
            items: VecDeque::with_capacity(max_size),
            max_size,
            cleanup_threshold,
        }
    }

    /// Append at the tail, trimming the oldest entries when full.
    ///
    /// Returns the number of evicted entries.
    pub fn push(&mut self, item: T) -> usize {
        let mut evicted = 0;
        if self.items.len() + 1 > self.max_size {
            evicted = self.items.len() + 1 - self.cleanup_threshold;
            self.items.drain(..evicted);
        }
        self.items.push_back(item);
        evicted
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Empty the buffer and return how many entries it held
    pub fn clear(&mut self) -> usize {
        let previous = self.items.len();
        self.items.clear();
        previous
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn cleanup_threshold(&self) -> usize {
        self.cleanup_threshold
    }

    /// Iterate oldest-first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn latest_on_empty_buffer_is_none() {
        let buffer: RollingBuffer<u32> = RollingBuffer::new(10, 5);
        assert!(buffer.latest().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn trims_to_cleanup_threshold_when_exceeding_max() {
        let mut buffer = RollingBuffer::new(1000, 500);
        for i in 0..1000 {
            assert_eq!(buffer.push(i), 0);
        }
        assert_eq!(buffer.len(), 1000);

        let evicted = buffer.push(1000);
        assert_eq!(evicted, 501);
        assert_eq!(buffer.len(), 500);
        assert_eq!(buffer.latest(), Some(&1000));
        assert_eq!(buffer.first(), Some(&501));
    }

    #[test]
    fn preserves_arrival_order() {
        let mut buffer = RollingBuffer::new(4, 2);
        for i in 0..7 {
            buffer.push(i);
        }
        let items: Vec<_> = buffer.iter().copied().collect();
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(items, sorted);
        assert_eq!(buffer.latest(), Some(&6));
    }

    #[test]
    fn clear_reports_previous_size() {
        let mut buffer = RollingBuffer::new(10, 5);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.clear(), 2);
        assert_eq!(buffer.clear(), 0);
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn degenerate_thresholds_are_clamped() {
        let buffer: RollingBuffer<u8> = RollingBuffer::new(10, 50);
        assert_eq!(buffer.cleanup_threshold(), 10);
        let buffer: RollingBuffer<u8> = RollingBuffer::new(0, 0);
        assert_eq!(buffer.max_size(), 1);
        assert_eq!(buffer.cleanup_threshold(), 1);
    }

    proptest! {
        #[test]
        fn length_never_exceeds_max(count in 0usize..3000) {
            let mut buffer = RollingBuffer::new(1000, 500);
            for i in 0..count {
                buffer.push(i);
                prop_assert!(buffer.len() <= 1000);
                prop_assert_eq!(buffer.latest(), Some(&i));
            }
        }
    }
}
