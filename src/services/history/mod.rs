use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped value as stored by a collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample<T> {
    pub taken_at: DateTime<Utc>,
    pub value: T,
}

impl<T> Sample<T> {
    pub fn new(value: T) -> Self {
        Self {
            taken_at: Utc::now(),
            value,
        }
    }
}

/// Fixed-capacity circular store of samples.
///
/// `add` is O(1) and overwrites the oldest entry once the store is full.
/// The capacity is fixed at construction and never resized. All operations
/// go through an internal lock so a collector thread can write while a
/// consumer thread reads.
#[derive(Debug)]
pub struct SampleHistory<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
}

impl<T: Clone> SampleHistory<T> {
    /// Create a history holding at most `capacity` items.
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sample history capacity must be non-zero");
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item, evicting the oldest entry once at capacity.
    pub fn add(&self, item: T) {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            items.pop_front();
        }
        items.push_back(item);
    }

    /// Current occupancy (always <= capacity).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All stored items in chronological (oldest-first) order.
    pub fn to_vec(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }

    /// The most recent `min(n, len)` items, still chronological.
    pub fn recent(&self, n: usize) -> Vec<T> {
        let items = self.lock();
        let take = n.min(items.len());
        items.iter().skip(items.len() - take).cloned().collect()
    }

    /// The single newest item, if any.
    pub fn latest(&self) -> Option<T> {
        self.lock().back().cloned()
    }

    /// Drop all stored items; capacity is unchanged.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        // A poisoned lock only means a panic elsewhere; the data is still valid.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_latest() {
        let history = SampleHistory::new(3);
        assert!(history.is_empty());
        assert_eq!(history.latest(), None);

        history.add(1);
        history.add(2);

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest(), Some(2));
        assert_eq!(history.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let history = SampleHistory::new(3);
        for i in 1..=5 {
            history.add(i);
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.to_vec(), vec![3, 4, 5]);
        assert_eq!(history.latest(), Some(5));
    }

    #[test]
    fn test_recent_is_chronological() {
        let history = SampleHistory::new(5);
        for i in 1..=5 {
            history.add(i);
        }

        assert_eq!(history.recent(2), vec![4, 5]);
        assert_eq!(history.recent(5), history.to_vec());
        // Asking for more than stored never exceeds occupancy
        assert_eq!(history.recent(100), history.to_vec());
    }

    #[test]
    fn test_clear() {
        let history = SampleHistory::new(2);
        history.add("a");
        history.clear();

        assert!(history.is_empty());
        assert_eq!(history.capacity(), 2);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_rejected() {
        let _ = SampleHistory::<u8>::new(0);
    }

    #[test]
    fn test_sample_wrapper_carries_timestamp() {
        let sample = Sample::new(42u64);
        assert_eq!(sample.value, 42);
        assert!(sample.taken_at <= Utc::now());
    }
}
