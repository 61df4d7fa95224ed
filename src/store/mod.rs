//! Persistence gateway.
//!
//! The engine talks to durable storage only through the [`Store`] trait:
//! scope configuration, alert counters, and the append-only sample log that
//! history is rebuilt from after a restart.
//!
//! - [`SqliteStore`]: the production backend (SQLite via `rusqlite`)
//! - [`MemoryStore`]: an in-process backend for tests and dry runs
//!
//! Calls are synchronous and are made from the single poll-owner task, so an
//! implementation only has to be safe for sequential use behind `&self`.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::time::Duration;

use thiserror::Error;

use chubwatch_types::{
    AlertState, AlertTarget, EntitySample, HealthLevel, ScopeConfig, ScopeId, Snapshot,
};

/// Errors returned by a [`Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database reported an error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be interpreted.
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    /// The store cannot be used at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One logged entity sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    /// Upstream timestamp of the snapshot this sample came from (Unix ms).
    pub snapshot_ts: u64,
    /// Local time the sample was logged (Unix ms).
    pub recorded_at: u64,
    pub api_health: HealthLevel,
    pub entity: String,
    pub health: HealthLevel,
    pub avg_latency: u64,
    pub timeout_pct: f64,
    pub fail_pct: f64,
}

impl SampleRecord {
    /// Build a record for one entity of a snapshot.
    pub fn from_sample(snapshot: &Snapshot, sample: &EntitySample, recorded_at: u64) -> Self {
        Self {
            snapshot_ts: snapshot.timestamp_ms,
            recorded_at,
            api_health: snapshot.api_health,
            entity: sample.name.clone(),
            health: sample.health,
            avg_latency: sample.avg_latency,
            timeout_pct: sample.timeout_pct,
            fail_pct: sample.fail_pct,
        }
    }
}

/// Share of logged samples per level over a window, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UptimeStats {
    pub healthy: f64,
    pub degraded: f64,
    pub down: f64,
    pub unknown: f64,
    /// Number of samples in the window.
    pub total: u64,
    /// Mean latency over the window in milliseconds.
    pub avg_latency: u64,
}

impl UptimeStats {
    /// Compute percentages from per-level counts.
    pub fn from_counts(counts: &[(HealthLevel, u64)], avg_latency: u64) -> Self {
        let total: u64 = counts.iter().map(|(_, n)| n).sum();
        let mut stats = Self {
            total,
            avg_latency,
            ..Self::default()
        };
        if total == 0 {
            return stats;
        }

        for (level, n) in counts {
            let pct = *n as f64 / total as f64 * 100.0;
            match level {
                HealthLevel::Healthy => stats.healthy += pct,
                HealthLevel::Degraded => stats.degraded += pct,
                HealthLevel::Down => stats.down += pct,
                HealthLevel::Unknown => stats.unknown += pct,
            }
        }
        stats
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Durable storage used by the engine.
pub trait Store: Send + Sync {
    // --- Sample log ---

    /// Log one entity sample.
    fn append_sample(&self, record: &SampleRecord) -> Result<(), StoreError>;

    /// Log every entity of a snapshot atomically. Returns the number of rows.
    fn append_snapshot(&self, snapshot: &Snapshot, recorded_at: u64) -> Result<usize, StoreError>;

    /// Up to `limit` most recent samples for an entity, oldest first.
    fn recent_samples(&self, entity: &str, limit: usize) -> Result<Vec<SampleRecord>, StoreError>;

    /// Upstream timestamp of the newest logged snapshot.
    fn last_snapshot_timestamp(&self) -> Result<Option<u64>, StoreError>;

    /// Delete samples logged more than `age` ago. Returns the number deleted.
    fn purge_samples_older_than(&self, age: Duration) -> Result<usize, StoreError>;

    /// Uptime statistics for an entity over the trailing `window`.
    fn uptime(&self, entity: &str, window: Duration) -> Result<UptimeStats, StoreError>;

    /// Distinct entity names present in the log, sorted.
    fn logged_entities(&self) -> Result<Vec<String>, StoreError>;

    // --- Alert state ---

    fn get_alert_state(&self, scope: &ScopeId, entity: &str) -> Result<Option<AlertState>, StoreError>;

    fn upsert_alert_state(
        &self,
        scope: &ScopeId,
        entity: &str,
        state: &AlertState,
    ) -> Result<(), StoreError>;

    /// Delete every alert state of a scope. Returns the number deleted.
    fn clear_alert_states(&self, scope: &ScopeId) -> Result<usize, StoreError>;

    // --- Scope configuration ---

    fn get_scope(&self, scope: &ScopeId) -> Result<Option<ScopeConfig>, StoreError>;

    /// Every configured scope, ordered by id.
    fn list_scopes(&self) -> Result<Vec<ScopeConfig>, StoreError>;

    fn list_scopes_with_alerts(&self) -> Result<Vec<ScopeConfig>, StoreError> {
        Ok(self
            .list_scopes()?
            .into_iter()
            .filter(|scope| scope.alerts.is_some())
            .collect())
    }

    fn list_scopes_with_display(&self) -> Result<Vec<ScopeConfig>, StoreError> {
        Ok(self
            .list_scopes()?
            .into_iter()
            .filter(|scope| scope.display.is_some())
            .collect())
    }

    /// Point a scope's display at a sink. Forgets any previous message identity.
    fn set_display(&self, scope: &ScopeId, sink: &str) -> Result<(), StoreError>;

    /// Remember the message a display sink created for a scope.
    fn set_display_message(&self, scope: &ScopeId, message: &str) -> Result<(), StoreError>;

    fn set_alerts(&self, scope: &ScopeId, target: &AlertTarget) -> Result<(), StoreError>;

    /// Remove a scope's alert configuration together with its alert states.
    fn clear_alerts(&self, scope: &ScopeId) -> Result<(), StoreError>;
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_from_counts() {
        let stats = UptimeStats::from_counts(
            &[
                (HealthLevel::Healthy, 90),
                (HealthLevel::Degraded, 6),
                (HealthLevel::Down, 4),
            ],
            820,
        );
        assert_eq!(stats.total, 100);
        assert!((stats.healthy - 90.0).abs() < 1e-9);
        assert!((stats.degraded - 6.0).abs() < 1e-9);
        assert!((stats.down - 4.0).abs() < 1e-9);
        assert_eq!(stats.unknown, 0.0);
        assert_eq!(stats.avg_latency, 820);
    }

    #[test]
    fn test_uptime_from_no_counts() {
        let stats = UptimeStats::from_counts(&[], 0);
        assert!(stats.is_empty());
        assert_eq!(stats.healthy, 0.0);
    }

    #[test]
    fn test_sample_record_from_snapshot() {
        let snapshot = Snapshot::builder()
            .timestamp_ms(42)
            .api(HealthLevel::Degraded)
            .entity("asha", |e| e.health(HealthLevel::Down).latency(900).fail_pct(2.5))
            .build();
        let record = SampleRecord::from_sample(&snapshot, &snapshot.entities[0], 99);

        assert_eq!(record.snapshot_ts, 42);
        assert_eq!(record.recorded_at, 99);
        assert_eq!(record.api_health, HealthLevel::Degraded);
        assert_eq!(record.entity, "asha");
        assert_eq!(record.health, HealthLevel::Down);
        assert_eq!(record.avg_latency, 900);
        assert_eq!(record.fail_pct, 2.5);
    }
}
