//! Bounded per-entity health history for visual trend strips.

use std::collections::{HashMap, VecDeque};

use chubwatch_types::{HealthLevel, Snapshot};

/// Default number of samples kept per entity.
pub const DEFAULT_HISTORY_DEPTH: usize = 10;

/// Fixed-capacity FIFO. Pushing past capacity evicts the oldest item.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        debug_assert!(self.items.len() <= self.capacity);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Tracks recent health per entity and gates ingestion on snapshot timestamps.
///
/// Each entity gets its own [`RingBuffer`] the first time it is seen. A
/// snapshot is accepted only when its timestamp is strictly newer than the last
/// accepted one; stale snapshots leave the tracker untouched.
#[derive(Debug, Clone)]
pub struct HistoryTracker {
    capacity: usize,
    buffers: HashMap<String, RingBuffer<HealthLevel>>,
    last_timestamp: Option<u64>,
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl HistoryTracker {
    /// Create an empty tracker keeping `capacity` samples per entity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: HashMap::new(),
            last_timestamp: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Timestamp of the last accepted snapshot.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// Record the newest already-processed snapshot timestamp, e.g. after a
    /// restart. Never moves the gate backwards.
    pub fn set_last_timestamp(&mut self, timestamp_ms: u64) {
        if self.last_timestamp.map_or(true, |last| timestamp_ms > last) {
            self.last_timestamp = Some(timestamp_ms);
        }
    }

    /// Ingest a snapshot. Returns false, without mutating anything, when the
    /// snapshot is not strictly newer than the last accepted one.
    pub fn ingest(&mut self, snapshot: &Snapshot) -> bool {
        if !snapshot.is_newer_than(self.last_timestamp) {
            return false;
        }

        for entity in snapshot.iter() {
            self.buffer_mut(&entity.name).push(entity.health);
        }
        self.last_timestamp = Some(snapshot.timestamp_ms);
        true
    }

    /// Seed an entity's buffer from persisted samples, oldest first.
    ///
    /// Bypasses the timestamp gate. Only the newest `capacity` samples survive.
    pub fn restore<I>(&mut self, entity: &str, samples: I)
    where
        I: IntoIterator<Item = HealthLevel>,
    {
        let buffer = self.buffer_mut(entity);
        for level in samples {
            buffer.push(level);
        }
    }

    /// Buffered levels for an entity, oldest first.
    pub fn levels(&self, entity: &str) -> Vec<HealthLevel> {
        self.buffers
            .get(entity)
            .map(|buffer| buffer.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Glyph per buffered sample, oldest first. Empty for unknown entities.
    pub fn visual(&self, entity: &str) -> Vec<&'static str> {
        self.buffers
            .get(entity)
            .map(|buffer| buffer.iter().map(HealthLevel::glyph).collect())
            .unwrap_or_default()
    }

    /// The visual strip joined into a single string.
    pub fn visual_string(&self, entity: &str) -> String {
        self.visual(entity).concat()
    }

    /// Names of entities with a buffer.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    fn buffer_mut(&mut self, entity: &str) -> &mut RingBuffer<HealthLevel> {
        let capacity = self.capacity;
        self.buffers
            .entry(entity.to_string())
            .or_insert_with(|| RingBuffer::new(capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HealthLevel::*;

    fn snapshot(ts: u64, levels: &[(&str, HealthLevel)]) -> Snapshot {
        levels
            .iter()
            .fold(Snapshot::builder().timestamp_ms(ts), |b, (name, level)| {
                b.entity(*name, |e| e.health(*level))
            })
            .build()
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut buffer = RingBuffer::new(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), [2, 3, 4]);
        assert_eq!(buffer.len(), buffer.capacity());
    }

    #[test]
    fn test_ring_buffer_zero_capacity_holds_one() {
        let mut buffer = RingBuffer::new(0);
        buffer.push('a');
        buffer.push('b');
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), ['b']);
    }

    #[test]
    fn test_capacity_plus_k_keeps_last_capacity_in_order() {
        let capacity = 4;
        let mut tracker = HistoryTracker::new(capacity);
        let sequence = [Healthy, Down, Degraded, Unknown, Down, Healthy, Healthy];

        for (i, level) in sequence.iter().enumerate() {
            assert!(tracker.ingest(&snapshot(i as u64 + 1, &[("asha", *level)])));
            assert!(tracker.levels("asha").len() <= capacity);
        }

        assert_eq!(tracker.levels("asha"), sequence[sequence.len() - capacity..]);
    }

    #[test]
    fn test_stale_snapshot_is_a_no_op() {
        let mut tracker = HistoryTracker::new(5);
        assert!(tracker.ingest(&snapshot(100, &[("asha", Healthy)])));

        let before = tracker.clone();
        assert!(!tracker.ingest(&snapshot(100, &[("asha", Down), ("soji", Down)])));
        assert!(!tracker.ingest(&snapshot(99, &[("asha", Down)])));

        assert_eq!(tracker.levels("asha"), before.levels("asha"));
        assert!(tracker.levels("soji").is_empty());
        assert_eq!(tracker.last_timestamp(), Some(100));
    }

    #[test]
    fn test_visual_maps_glyphs_oldest_first() {
        let mut tracker = HistoryTracker::default();
        tracker.ingest(&snapshot(1, &[("asha", Healthy)]));
        tracker.ingest(&snapshot(2, &[("asha", Degraded)]));
        tracker.ingest(&snapshot(3, &[("asha", Down)]));
        tracker.ingest(&snapshot(4, &[("asha", Unknown)]));

        assert_eq!(tracker.visual("asha"), ["🟢", "🟠", "🔴", "⚪"]);
        assert_eq!(tracker.visual_string("asha"), "🟢🟠🔴⚪");
        assert!(tracker.visual("mythomax").is_empty());
    }

    #[test]
    fn test_restore_bypasses_gate_and_respects_capacity() {
        let mut tracker = HistoryTracker::new(3);
        tracker.set_last_timestamp(500);

        tracker.restore("soji", [Down, Down, Healthy, Degraded]);
        assert_eq!(tracker.levels("soji"), [Down, Healthy, Degraded]);

        // The gate still rejects anything not newer than the restored timestamp.
        assert!(!tracker.ingest(&snapshot(500, &[("soji", Down)])));
        assert!(tracker.ingest(&snapshot(501, &[("soji", Down)])));
        assert_eq!(tracker.levels("soji"), [Healthy, Degraded, Down]);
    }

    #[test]
    fn test_set_last_timestamp_never_moves_backwards() {
        let mut tracker = HistoryTracker::default();
        tracker.set_last_timestamp(10);
        tracker.set_last_timestamp(5);
        assert_eq!(tracker.last_timestamp(), Some(10));
    }

    #[test]
    fn test_entities_appear_on_first_sight() {
        let mut tracker = HistoryTracker::default();
        tracker.ingest(&snapshot(1, &[("asha", Healthy)]));
        tracker.ingest(&snapshot(2, &[("asha", Healthy), ("mobile", Down)]));

        let mut names: Vec<_> = tracker.entities().collect();
        names.sort_unstable();
        assert_eq!(names, ["asha", "mobile"]);
        assert_eq!(tracker.levels("mobile"), [Down]);
    }
}
