//! Hysteresis alerting per (scope, entity).
//!
//! Samples arrive once per upstream update. The upstream status document is
//! refreshed roughly every five minutes, so with the default thresholds an
//! outage is declared after ~10 minutes of `Down` and cleared after ~15
//! minutes of `Healthy`.
//!
//! ```text
//!             consecutive_down >= down_threshold
//!   Inactive ────────────────────────────────────▶ Active
//!      ▲                                             │
//!      └─────────────────────────────────────────────┘
//!             consecutive_healthy >= recovery_threshold
//! ```
//!
//! `Degraded` and `Unknown` samples are neutral: they leave every counter
//! untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use chubwatch_types::{AlertState, HealthLevel, ScopeId, Snapshot};

use crate::store::{Store, StoreError};

/// Default number of consecutive `Down` samples before an outage is declared.
pub const DEFAULT_DOWN_THRESHOLD: u32 = 2;

/// Default number of consecutive `Healthy` samples before an outage is cleared.
pub const DEFAULT_RECOVERY_THRESHOLD: u32 = 3;

/// A state change worth telling someone about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    /// The entity has been down long enough to declare an outage.
    Down,
    /// The entity has been healthy long enough to clear the outage.
    Recovered,
}

/// Thresholds for the hysteresis state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    down_threshold: u32,
    recovery_threshold: u32,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DOWN_THRESHOLD, DEFAULT_RECOVERY_THRESHOLD)
    }
}

impl AlertPolicy {
    /// Create a policy. Zero thresholds are raised to one.
    pub fn new(down_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            down_threshold: down_threshold.max(1),
            recovery_threshold: recovery_threshold.max(1),
        }
    }

    pub fn down_threshold(&self) -> u32 {
        self.down_threshold
    }

    pub fn recovery_threshold(&self) -> u32 {
        self.recovery_threshold
    }

    /// Apply one sample to a state.
    ///
    /// Returns the next state and the transition it fired, if any. Both
    /// counters are zeroed on the sample that fires a transition.
    pub fn apply(&self, state: AlertState, level: HealthLevel) -> (AlertState, Option<AlertTransition>) {
        let mut next = state;
        match level {
            HealthLevel::Down => {
                next.consecutive_down = next.consecutive_down.saturating_add(1);
                next.consecutive_healthy = 0;
                if !next.is_active && next.consecutive_down >= self.down_threshold {
                    next = AlertState {
                        consecutive_down: 0,
                        consecutive_healthy: 0,
                        is_active: true,
                    };
                    return (next, Some(AlertTransition::Down));
                }
            }
            HealthLevel::Healthy => {
                next.consecutive_down = 0;
                if next.is_active {
                    next.consecutive_healthy = next.consecutive_healthy.saturating_add(1);
                    if next.consecutive_healthy >= self.recovery_threshold {
                        return (AlertState::new(), Some(AlertTransition::Recovered));
                    }
                }
            }
            HealthLevel::Degraded | HealthLevel::Unknown => {}
        }
        (next, None)
    }
}

/// Entities that changed alert state for one scope during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertEvents {
    /// Entities newly declared down, in snapshot order.
    pub newly_down: Vec<String>,
    /// Entities newly recovered, in snapshot order.
    pub newly_recovered: Vec<String>,
}

impl AlertEvents {
    pub fn is_empty(&self) -> bool {
        self.newly_down.is_empty() && self.newly_recovered.is_empty()
    }
}

/// Owns the in-memory alert states of every alerting scope.
///
/// States are loaded from the store the first time a (scope, entity) pair is
/// evaluated, and every change is written back before the evaluation returns.
/// A state that could not be read is not cached; the pair is skipped for the
/// cycle and read again on the next one.
pub struct AlertEngine {
    policy: AlertPolicy,
    store: Arc<dyn Store>,
    scopes: HashMap<ScopeId, HashMap<String, AlertState>>,
    generations: HashMap<ScopeId, u64>,
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("policy", &self.policy)
            .field("scopes", &self.scopes)
            .field("generations", &self.generations)
            .finish_non_exhaustive()
    }
}

impl AlertEngine {
    pub fn new(policy: AlertPolicy, store: Arc<dyn Store>) -> Self {
        Self {
            policy,
            store,
            scopes: HashMap::new(),
            generations: HashMap::new(),
        }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    /// Preload persisted states for a scope.
    ///
    /// Corrupt rows start fresh; rows the store fails to return are left to
    /// be loaded lazily. Returns the number of non-idle states restored.
    pub fn load_scope<S: AsRef<str>>(&mut self, scope: &ScopeId, entities: &[S]) -> usize {
        entities
            .iter()
            .filter(|entity| {
                self.load_entity(scope, entity.as_ref())
                    .is_some_and(|state| !state.is_idle())
            })
            .count()
    }

    /// Record the alert configuration generation a scope is evaluated under.
    ///
    /// The store bumps the generation whenever a scope's alerts are cleared.
    /// A generation that differs from the one the states were loaded under
    /// means they were deleted since, so the in-memory copies are dropped.
    pub fn sync_generation(&mut self, scope: &ScopeId, generation: u64) {
        match self.generations.insert(scope.clone(), generation) {
            Some(previous) if previous != generation => {
                if self.scopes.remove(scope).is_some() {
                    info!(scope = %scope, previous, generation, "Alert configuration was reset, dropping cached states");
                }
            }
            _ => {}
        }
    }

    /// Run one snapshot through the state machine for a scope.
    ///
    /// All transitions of the cycle are collected into a single
    /// [`AlertEvents`]. Changed states are persisted before returning; a
    /// persistence failure is logged and the in-memory state is kept.
    pub fn evaluate(&mut self, scope: &ScopeId, snapshot: &Snapshot) -> AlertEvents {
        let mut events = AlertEvents::default();

        for sample in snapshot.iter() {
            let Some(state) = self.load_entity(scope, &sample.name) else {
                continue;
            };
            let (next, transition) = self.policy.apply(state, sample.health);
            debug_assert!(next.is_consistent());

            if next != state {
                if let Err(e) = self.store.upsert_alert_state(scope, &sample.name, &next) {
                    error!(scope = %scope, entity = %sample.name, "Failed to persist alert state: {}", e);
                }
                self.scopes
                    .entry(scope.clone())
                    .or_default()
                    .insert(sample.name.clone(), next);
            }

            match transition {
                Some(AlertTransition::Down) => {
                    info!(scope = %scope, entity = %sample.name, "Outage declared");
                    events.newly_down.push(sample.name.clone());
                }
                Some(AlertTransition::Recovered) => {
                    info!(scope = %scope, entity = %sample.name, "Outage cleared");
                    events.newly_recovered.push(sample.name.clone());
                }
                None => {}
            }
        }

        events
    }

    /// Current in-memory state, idle if never seen.
    pub fn state(&self, scope: &ScopeId, entity: &str) -> AlertState {
        self.scopes
            .get(scope)
            .and_then(|states| states.get(entity))
            .copied()
            .unwrap_or_default()
    }

    /// Whether a scope has any state in memory.
    pub fn is_loaded(&self, scope: &ScopeId) -> bool {
        self.scopes.contains_key(scope)
    }

    /// Drop in-memory states for every scope not in `active`.
    pub fn retain_scopes<'a, I>(&mut self, active: I)
    where
        I: IntoIterator<Item = &'a ScopeId>,
    {
        let active: std::collections::HashSet<&ScopeId> = active.into_iter().collect();
        self.scopes.retain(|scope, _| {
            let keep = active.contains(scope);
            if !keep {
                debug!(scope = %scope, "Dropping alert states for scope without alerts");
            }
            keep
        });
        self.generations.retain(|scope, _| active.contains(scope));
    }

    /// Drop in-memory states for one scope.
    pub fn forget_scope(&mut self, scope: &ScopeId) {
        self.scopes.remove(scope);
        self.generations.remove(scope);
    }

    fn load_entity(&mut self, scope: &ScopeId, entity: &str) -> Option<AlertState> {
        if let Some(state) = self.scopes.get(scope).and_then(|states| states.get(entity)) {
            return Some(*state);
        }

        let state = match self.store.get_alert_state(scope, entity) {
            Ok(Some(state)) if state.is_consistent() => state,
            Ok(Some(state)) => {
                warn!(scope = %scope, entity = %entity, ?state, "Ignoring inconsistent alert state");
                AlertState::new()
            }
            Ok(None) => AlertState::new(),
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!(scope = %scope, entity = %entity, "Unreadable alert state, starting fresh: {}", e);
                AlertState::new()
            }
            Err(e) => {
                warn!(scope = %scope, entity = %entity, "Failed to load alert state, retrying next cycle: {}", e);
                return None;
            }
        };

        self.scopes
            .entry(scope.clone())
            .or_default()
            .insert(entity.to_string(), state);
        Some(state)
    }
}
