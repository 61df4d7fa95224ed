//! Poll orchestration.
//!
//! [`Poller::restore`] is the only way to obtain a poller, so persisted
//! history and alert counters are always in memory before the first cycle
//! runs. After that a single task owns every piece of mutable state:
//!
//! ```text
//!  tick ──▶ fetch_if_changed ──▶ ingest ──▶ log samples
//!                                              │
//!                          ┌───────────────────┴──────────────────┐
//!                          ▼                                      ▼
//!                 display scopes: render               alert scopes: evaluate
//!                          │                                      │
//!                          └──────── concurrent hand-off ─────────┘
//! ```
//!
//! Cycles never overlap: the next tick is only awaited once every hand-off
//! of the current cycle has completed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use chubwatch_adapters::DEFAULT_ENTITIES;
use chubwatch_types::{ScopeConfig, ScopeId, Snapshot};

use crate::data::history::DEFAULT_HISTORY_DEPTH;
use crate::data::{AlertEngine, AlertPolicy, HistoryTracker};
use crate::sink::{AlertBatch, AlertSink, DisplaySink, RenderRequest};
use crate::source::StatusSource;
use crate::store::{now_ms, Store, StoreError};

/// Tunables for a [`Poller`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollerOptions {
    /// Entities in canonical display order.
    pub entities: Vec<String>,
    pub history_depth: usize,
    pub policy: AlertPolicy,
    pub poll_interval: Duration,
    /// How often the upstream document is refreshed.
    pub upstream_interval: Duration,
    /// Samples older than this are purged.
    pub retention: Duration,
    pub maintenance_interval: Duration,
    /// Scopes served by this poller. Empty serves every scope.
    pub allowed_scopes: Vec<ScopeId>,
}

impl PollerOptions {
    pub fn is_scope_allowed(&self, scope: &ScopeId) -> bool {
        self.allowed_scopes.is_empty() || self.allowed_scopes.contains(scope)
    }
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            entities: DEFAULT_ENTITIES.iter().map(|e| e.to_string()).collect(),
            history_depth: DEFAULT_HISTORY_DEPTH,
            policy: AlertPolicy::default(),
            poll_interval: Duration::from_secs(10),
            upstream_interval: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            maintenance_interval: Duration::from_secs(24 * 60 * 60),
            allowed_scopes: Vec::new(),
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The payload was byte-identical to the last one.
    Unchanged,
    /// Nothing usable could be fetched.
    FetchFailed,
    /// The snapshot was not newer than the last accepted one.
    Stale { timestamp_ms: u64 },
    Processed(CycleReport),
}

/// Fan-out results of a processed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub timestamp_ms: u64,
    pub rendered: usize,
    pub render_failures: usize,
    pub dispatched: usize,
    pub dispatch_failures: usize,
}

/// Ties the source, history, alert engine, store and sinks together.
pub struct Poller {
    options: PollerOptions,
    source: Box<dyn StatusSource>,
    store: Arc<dyn Store>,
    display: Arc<dyn DisplaySink>,
    alerts: Arc<dyn AlertSink>,
    tracker: HistoryTracker,
    engine: AlertEngine,
    current: Option<Snapshot>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("options", &self.options)
            .field("source", &self.source)
            .field("tracker", &self.tracker)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Build a poller from persisted state.
    ///
    /// History buffers are seeded from the sample log and alert counters are
    /// loaded for every scope with alerts. Unreadable rows are skipped; a
    /// store that cannot answer at all is an error.
    pub fn restore(
        options: PollerOptions,
        source: Box<dyn StatusSource>,
        store: Arc<dyn Store>,
        display: Arc<dyn DisplaySink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, StoreError> {
        let mut tracker = HistoryTracker::new(options.history_depth);
        let mut engine = AlertEngine::new(options.policy, store.clone());

        if let Some(last) = store.last_snapshot_timestamp()? {
            tracker.set_last_timestamp(last);
        }

        let mut samples = 0;
        for entity in &options.entities {
            match store.recent_samples(entity, options.history_depth) {
                Ok(records) => {
                    samples += records.len();
                    tracker.restore(entity, records.into_iter().map(|r| r.health));
                }
                Err(e) => {
                    warn!(entity = %entity, "Skipping history restore: {}", e);
                }
            }
        }

        if options.allowed_scopes.is_empty() {
            info!("Scope allowlist disabled, serving every scope");
        } else {
            info!(allowed = ?options.allowed_scopes, "Scope allowlist enabled");
        }

        let mut scopes = store.list_scopes_with_alerts()?;
        scopes.retain(|scope| {
            let allowed = options.is_scope_allowed(&scope.id);
            if !allowed {
                info!(scope = %scope.id, "Scope blocked by allowlist");
            }
            allowed
        });
        let mut active = 0;
        for scope in &scopes {
            engine.sync_generation(&scope.id, scope.alerts_generation);
            active += engine.load_scope(&scope.id, &options.entities);
        }

        info!(
            samples,
            scopes = scopes.len(),
            alert_states = active,
            last_timestamp_ms = ?tracker.last_timestamp(),
            "Restored persisted state"
        );

        Ok(Self {
            options,
            source,
            store,
            display,
            alerts,
            tracker,
            engine,
            current: None,
        })
    }

    pub fn options(&self) -> &PollerOptions {
        &self.options
    }

    pub fn tracker(&self) -> &HistoryTracker {
        &self.tracker
    }

    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    /// The last accepted snapshot.
    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    /// Run one poll cycle. Never fails; problems are logged and reported in
    /// the outcome.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let snapshot = match self.source.fetch_if_changed().await {
            (Some(snapshot), true) => snapshot,
            (Some(_), false) => {
                debug!(source = %self.source.description(), "Status unchanged");
                return CycleOutcome::Unchanged;
            }
            (None, _) => {
                debug!(
                    source = %self.source.description(),
                    error = ?self.source.error(),
                    "No status this cycle"
                );
                return CycleOutcome::FetchFailed;
            }
        };

        if !self.tracker.ingest(&snapshot) {
            debug!(timestamp_ms = snapshot.timestamp_ms, "Ignoring stale snapshot");
            return CycleOutcome::Stale {
                timestamp_ms: snapshot.timestamp_ms,
            };
        }

        if let Err(e) = self.store.append_snapshot(&snapshot, now_ms()) {
            error!(timestamp_ms = snapshot.timestamp_ms, "Failed to log samples: {}", e);
        }

        let renders = self.render_requests(&snapshot);
        let batches = self.evaluate_alerts(&snapshot);
        let report = hand_off(
            &*self.store,
            &*self.display,
            &*self.alerts,
            snapshot.timestamp_ms,
            renders,
            batches,
        )
        .await;

        info!(
            timestamp_ms = report.timestamp_ms,
            api = %snapshot.api_health,
            rendered = report.rendered,
            dispatched = report.dispatched,
            failures = report.render_failures + report.dispatch_failures,
            "Processed status update"
        );
        self.current = Some(snapshot);
        CycleOutcome::Processed(report)
    }

    /// Delete samples past the retention window.
    ///
    /// The purge compacts the database, so it runs on the blocking pool.
    /// The returned future does not borrow the poller.
    pub fn purge(&self) -> impl Future<Output = Result<usize, StoreError>> + Send + 'static {
        let store = self.store.clone();
        let retention = self.options.retention;
        async move {
            let deleted = tokio::task::spawn_blocking(move || store.purge_samples_older_than(retention))
                .await
                .map_err(|e| StoreError::Unavailable(format!("purge task failed: {}", e)))??;
            info!(deleted, "Purged old samples");
            Ok(deleted)
        }
    }

    /// Poll until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut poll = tokio::time::interval(self.options.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut maintenance = tokio::time::interval(self.options.maintenance_interval);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            source = %self.source.description(),
            interval = ?self.options.poll_interval,
            "Polling started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.run_cycle().await;
                }
                _ = maintenance.tick() => {
                    if let Err(e) = self.purge().await {
                        error!("Sample purge failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Polling stopped");
    }

    fn render_requests(&self, snapshot: &Snapshot) -> Vec<RenderRequest> {
        let scopes = match self.store.list_scopes_with_display() {
            Ok(scopes) => scopes,
            Err(e) => {
                error!("Failed to list display scopes: {}", e);
                return Vec::new();
            }
        };

        let lines: Vec<(String, String)> = self
            .options
            .entities
            .iter()
            .map(|entity| (entity.clone(), self.tracker.visual_string(entity)))
            .collect();

        scopes
            .into_iter()
            .filter(|scope| self.options.is_scope_allowed(&scope.id))
            .filter_map(|scope| {
                let subscription = scope.subscription_marker().map(String::from);
                let ScopeConfig { id, display, .. } = scope;
                Some(RenderRequest {
                    scope: id,
                    target: display?,
                    snapshot: snapshot.clone(),
                    lines: lines.clone(),
                    subscription,
                    upstream_interval: self.options.upstream_interval,
                })
            })
            .collect()
    }

    fn evaluate_alerts(&mut self, snapshot: &Snapshot) -> Vec<AlertBatch> {
        let mut scopes = match self.store.list_scopes_with_alerts() {
            Ok(scopes) => scopes,
            Err(e) => {
                error!("Failed to list alert scopes: {}", e);
                return Vec::new();
            }
        };
        scopes.retain(|scope| self.options.is_scope_allowed(&scope.id));

        let mut batches = Vec::new();
        for scope in &scopes {
            let Some(target) = &scope.alerts else { continue };
            self.engine.sync_generation(&scope.id, scope.alerts_generation);
            let events = self.engine.evaluate(&scope.id, snapshot);
            if !events.is_empty() {
                batches.push(AlertBatch::new(scope.id.clone(), target.clone(), events));
            }
        }
        self.engine.retain_scopes(scopes.iter().map(|scope| &scope.id));
        batches
    }
}

/// Hand every request and batch to the sinks concurrently, then persist any
/// newly created message identities.
async fn hand_off(
    store: &dyn Store,
    display: &dyn DisplaySink,
    alerts: &dyn AlertSink,
    timestamp_ms: u64,
    renders: Vec<RenderRequest>,
    batches: Vec<AlertBatch>,
) -> CycleReport {
    let (rendered, dispatched) = tokio::join!(
        join_all(renders.iter().map(|request| async move {
            (request, display.render(request).await)
        })),
        join_all(batches.iter().map(|batch| async move {
            (batch, alerts.dispatch(batch).await)
        })),
    );

    let mut report = CycleReport {
        timestamp_ms,
        ..CycleReport::default()
    };

    for (request, result) in rendered {
        match result {
            Ok(created) => {
                report.rendered += 1;
                if let Some(message) = created {
                    if let Err(e) = store.set_display_message(&request.scope, &message) {
                        error!(scope = %request.scope, "Failed to remember status message: {}", e);
                    }
                }
            }
            Err(e) => {
                report.render_failures += 1;
                warn!(scope = %request.scope, sink = %request.target.sink, "Display hand-off failed: {}", e);
            }
        }
    }

    for (batch, result) in dispatched {
        match result {
            Ok(()) => report.dispatched += 1,
            Err(e) => {
                report.dispatch_failures += 1;
                warn!(
                    scope = %batch.scope,
                    down = ?batch.newly_down,
                    recovered = ?batch.newly_recovered,
                    "Alert hand-off failed: {}",
                    e
                );
            }
        }
    }

    report
}
