//! In-memory store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use parking_lot::Mutex;

use chubwatch_types::{AlertState, AlertTarget, DisplayTarget, HealthLevel, ScopeConfig, ScopeId, Snapshot};

use super::{now_ms, SampleRecord, Store, StoreError, UptimeStats};

#[derive(Debug, Default)]
struct Inner {
    samples: Vec<SampleRecord>,
    alert_states: HashMap<(ScopeId, String), AlertState>,
    scopes: BTreeMap<ScopeId, ScopeConfig>,
}

/// A [`Store`] that keeps everything in process memory.
///
/// Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged samples.
    pub fn sample_count(&self) -> usize {
        self.inner.lock().samples.len()
    }
}

fn window_start(window: Duration) -> u64 {
    now_ms().saturating_sub(u64::try_from(window.as_millis()).unwrap_or(u64::MAX))
}

impl Store for MemoryStore {
    fn append_sample(&self, record: &SampleRecord) -> Result<(), StoreError> {
        self.inner.lock().samples.push(record.clone());
        Ok(())
    }

    fn append_snapshot(&self, snapshot: &Snapshot, recorded_at: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        inner.samples.extend(
            snapshot
                .iter()
                .map(|sample| SampleRecord::from_sample(snapshot, sample, recorded_at)),
        );
        Ok(snapshot.len())
    }

    fn recent_samples(&self, entity: &str, limit: usize) -> Result<Vec<SampleRecord>, StoreError> {
        let inner = self.inner.lock();
        let mut recent: Vec<SampleRecord> = inner
            .samples
            .iter()
            .rev()
            .filter(|record| record.entity == entity)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    fn last_snapshot_timestamp(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.inner.lock().samples.iter().map(|r| r.snapshot_ts).max())
    }

    fn purge_samples_older_than(&self, age: Duration) -> Result<usize, StoreError> {
        let cutoff = window_start(age);
        let mut inner = self.inner.lock();
        let before = inner.samples.len();
        inner.samples.retain(|record| record.recorded_at >= cutoff);
        Ok(before - inner.samples.len())
    }

    fn uptime(&self, entity: &str, window: Duration) -> Result<UptimeStats, StoreError> {
        let since = window_start(window);
        let inner = self.inner.lock();
        let in_window: Vec<&SampleRecord> = inner
            .samples
            .iter()
            .filter(|r| r.entity == entity && r.recorded_at > since)
            .collect();

        let counts: Vec<(HealthLevel, u64)> = HealthLevel::ALL
            .iter()
            .map(|level| {
                let n = in_window.iter().filter(|r| r.health == *level).count() as u64;
                (*level, n)
            })
            .collect();
        let avg_latency = if in_window.is_empty() {
            0
        } else {
            in_window.iter().map(|r| r.avg_latency).sum::<u64>() / in_window.len() as u64
        };

        Ok(UptimeStats::from_counts(&counts, avg_latency))
    }

    fn logged_entities(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock();
        let names: BTreeSet<&str> = inner.samples.iter().map(|r| r.entity.as_str()).collect();
        Ok(names.into_iter().map(String::from).collect())
    }

    fn get_alert_state(&self, scope: &ScopeId, entity: &str) -> Result<Option<AlertState>, StoreError> {
        Ok(self
            .inner
            .lock()
            .alert_states
            .get(&(scope.clone(), entity.to_string()))
            .copied())
    }

    fn upsert_alert_state(
        &self,
        scope: &ScopeId,
        entity: &str,
        state: &AlertState,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .alert_states
            .insert((scope.clone(), entity.to_string()), *state);
        Ok(())
    }

    fn clear_alert_states(&self, scope: &ScopeId) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.alert_states.len();
        inner.alert_states.retain(|(s, _), _| s != scope);
        Ok(before - inner.alert_states.len())
    }

    fn get_scope(&self, scope: &ScopeId) -> Result<Option<ScopeConfig>, StoreError> {
        Ok(self.inner.lock().scopes.get(scope).cloned())
    }

    fn list_scopes(&self) -> Result<Vec<ScopeConfig>, StoreError> {
        Ok(self.inner.lock().scopes.values().cloned().collect())
    }

    fn set_display(&self, scope: &ScopeId, sink: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let config = inner
            .scopes
            .entry(scope.clone())
            .or_insert_with(|| ScopeConfig::new(scope.clone()));
        config.display = Some(DisplayTarget {
            sink: sink.to_string(),
            message: None,
        });
        Ok(())
    }

    fn set_display_message(&self, scope: &ScopeId, message: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(display) = inner
            .scopes
            .get_mut(scope)
            .and_then(|config| config.display.as_mut())
        {
            display.message = Some(message.to_string());
        }
        Ok(())
    }

    fn set_alerts(&self, scope: &ScopeId, target: &AlertTarget) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner
            .scopes
            .entry(scope.clone())
            .or_insert_with(|| ScopeConfig::new(scope.clone()))
            .alerts = Some(target.clone());
        Ok(())
    }

    fn clear_alerts(&self, scope: &ScopeId) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.lock();
            if let Some(config) = inner.scopes.get_mut(scope) {
                config.alerts = None;
                config.alerts_generation += 1;
            }
        }
        self.clear_alert_states(scope)?;
        Ok(())
    }
}
