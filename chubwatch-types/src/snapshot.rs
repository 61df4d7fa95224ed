//! Snapshot - one timestamped health reading across all monitored entities.

use crate::HealthLevel;

/// A point-in-time health reading of every configured entity plus the
/// aggregate API signal.
///
/// Entities keep the canonical configured ordering, not the order in which
/// the source happened to report them.
///
/// # Example
///
/// ```rust
/// use chubwatch_types::{HealthLevel, Snapshot};
///
/// let snapshot = Snapshot::builder()
///     .timestamp_ms(1703160000000)
///     .entity("mistral", |e| e.health(HealthLevel::Degraded).timeout_pct(3.5))
///     .build();
///
/// assert_eq!(snapshot.get("Mistral").unwrap().health, HealthLevel::Degraded);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// Unix timestamp in milliseconds reported by the source for this reading.
    pub timestamp_ms: u64,

    /// Health of the aggregate API signal.
    pub api_health: HealthLevel,

    /// Per-entity samples in canonical order.
    pub entities: Vec<EntitySample>,
}

/// Health sample for a single entity within a snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntitySample {
    /// Entity name, unique within a snapshot.
    pub name: String,

    /// Classified health.
    pub health: HealthLevel,

    /// Average latency in milliseconds.
    pub avg_latency: u64,

    /// Share of requests that timed out, as a percentage (0-100).
    pub timeout_pct: f64,

    /// Share of requests that failed, as a percentage (0-100).
    pub fail_pct: f64,
}

impl EntitySample {
    /// Create a sample with the given name and health and zeroed metrics.
    pub fn new(name: impl Into<String>, health: HealthLevel) -> Self {
        Self {
            name: name.into(),
            health,
            ..Default::default()
        }
    }
}

impl Snapshot {
    /// Create an empty snapshot at the given timestamp.
    pub fn with_timestamp(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            api_health: HealthLevel::Unknown,
            entities: Vec::new(),
        }
    }

    /// Create a builder for constructing snapshots.
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    /// Check if the snapshot has no entity samples.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of entity samples.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Look up an entity by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&EntitySample> {
        self.entities.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Iterate over entity samples in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &EntitySample> {
        self.entities.iter()
    }

    /// Worst known level across the API signal and all entities.
    pub fn worst(&self) -> HealthLevel {
        HealthLevel::worst(
            core::iter::once(self.api_health).chain(self.entities.iter().map(|e| e.health)),
        )
    }

    /// Whether this snapshot is strictly newer than `last_seen_ms`.
    ///
    /// Anything is newer than "never seen".
    pub fn is_newer_than(&self, last_seen_ms: Option<u64>) -> bool {
        last_seen_ms.map_or(true, |last| self.timestamp_ms > last)
    }
}

/// Builder for constructing `Snapshot` instances.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    timestamp_ms: u64,
    api_health: HealthLevel,
    entities: Vec<EntitySample>,
}

impl SnapshotBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the snapshot timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = ts;
        self
    }

    /// Set the aggregate API health.
    pub fn api(mut self, health: HealthLevel) -> Self {
        self.api_health = health;
        self
    }

    /// Append an entity sample built using a closure.
    ///
    /// Entities are kept in the order they are added.
    pub fn entity<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(EntitySampleBuilder) -> EntitySampleBuilder,
    {
        let sample = f(EntitySampleBuilder::new(name)).build();
        self.entities.push(sample);
        self
    }

    /// Append a pre-built entity sample.
    pub fn sample(mut self, sample: EntitySample) -> Self {
        self.entities.push(sample);
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> Snapshot {
        Snapshot {
            timestamp_ms: self.timestamp_ms,
            api_health: self.api_health,
            entities: self.entities,
        }
    }
}

/// Builder for `EntitySample`.
#[derive(Debug)]
pub struct EntitySampleBuilder {
    sample: EntitySample,
}

impl EntitySampleBuilder {
    /// Create a builder for the named entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            sample: EntitySample::new(name, HealthLevel::Unknown),
        }
    }

    /// Set the health level.
    pub fn health(mut self, health: HealthLevel) -> Self {
        self.sample.health = health;
        self
    }

    /// Set the average latency in milliseconds.
    pub fn latency(mut self, avg_latency: u64) -> Self {
        self.sample.avg_latency = avg_latency;
        self
    }

    /// Set the timeout percentage.
    pub fn timeout_pct(mut self, pct: f64) -> Self {
        self.sample.timeout_pct = pct;
        self
    }

    /// Set the failure percentage.
    pub fn fail_pct(mut self, pct: f64) -> Self {
        self.sample.fail_pct = pct;
        self
    }

    /// Build the sample.
    pub fn build(self) -> EntitySample {
        self.sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builder_keeps_insertion_order() {
        let snapshot = Snapshot::builder()
            .timestamp_ms(1703160000000)
            .api(HealthLevel::Healthy)
            .entity("soji", |e| e.health(HealthLevel::Healthy))
            .entity("asha", |e| e.health(HealthLevel::Down).latency(1200))
            .build();

        let names: Vec<_> = snapshot.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["soji", "asha"]);
        assert_eq!(snapshot.timestamp_ms, 1703160000000);
        assert_eq!(snapshot.get("ASHA").unwrap().avg_latency, 1200);
        assert!(snapshot.get("mobile").is_none());
    }

    #[test]
    fn test_worst_includes_api_signal() {
        let snapshot = Snapshot::builder()
            .api(HealthLevel::Down)
            .entity("asha", |e| e.health(HealthLevel::Healthy))
            .build();
        assert_eq!(snapshot.worst(), HealthLevel::Down);

        let empty = Snapshot::with_timestamp(0);
        assert_eq!(empty.worst(), HealthLevel::Unknown);
    }

    #[test]
    fn test_is_newer_than() {
        let snapshot = Snapshot::with_timestamp(100);
        assert!(snapshot.is_newer_than(None));
        assert!(snapshot.is_newer_than(Some(99)));
        assert!(!snapshot.is_newer_than(Some(100)));
        assert!(!snapshot.is_newer_than(Some(101)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let snapshot = Snapshot::builder()
            .timestamp_ms(1703160000000)
            .api(HealthLevel::Degraded)
            .entity("mixtral", |e| e.health(HealthLevel::Healthy).fail_pct(0.5))
            .build();

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(snapshot, parsed);
    }
}
