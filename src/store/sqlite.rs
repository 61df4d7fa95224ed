//! SQLite-backed store.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use chubwatch_types::{
    AlertState, AlertTarget, DisplayTarget, HealthLevel, ScopeConfig, ScopeId, Snapshot,
};

use super::{now_ms, SampleRecord, Store, StoreError, UptimeStats};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS status_log (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        snapshot_ts  INTEGER NOT NULL,
        recorded_at  INTEGER NOT NULL,
        api_health   TEXT NOT NULL,
        entity       TEXT NOT NULL,
        health       TEXT NOT NULL,
        avg_latency  INTEGER NOT NULL DEFAULT 0,
        timeout_pct  REAL NOT NULL DEFAULT 0,
        fail_pct     REAL NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_status_log_recorded ON status_log(recorded_at);
    CREATE INDEX IF NOT EXISTS idx_status_log_entity ON status_log(entity, id);

    CREATE TABLE IF NOT EXISTS scope_config (
        scope_id         TEXT PRIMARY KEY,
        display_sink     TEXT,
        display_message  TEXT,
        alert_sink       TEXT,
        alert_audience   TEXT,
        alert_marker     TEXT,
        alerts_generation INTEGER NOT NULL DEFAULT 0,
        updated_at       INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS alert_state (
        scope_id             TEXT NOT NULL,
        entity               TEXT NOT NULL,
        consecutive_down     INTEGER NOT NULL DEFAULT 0,
        consecutive_healthy  INTEGER NOT NULL DEFAULT 0,
        is_active            INTEGER NOT NULL DEFAULT 0,
        updated_at           INTEGER NOT NULL,
        PRIMARY KEY (scope_id, entity)
    );
";

/// A [`Store`] backed by a single SQLite connection.
///
/// Tables are created on open if missing. The connection runs in WAL mode.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "Opened status database");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // journal_mode returns a row, so it cannot go through execute_batch.
        let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(
            "
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        conn.execute_batch(SCHEMA)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Bring databases created by older releases up to the current schema.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    if conn.prepare("SELECT alerts_generation FROM scope_config LIMIT 0").is_err() {
        conn.execute_batch(
            "ALTER TABLE scope_config ADD COLUMN alerts_generation INTEGER NOT NULL DEFAULT 0",
        )?;
        info!("Added scope_config.alerts_generation");
    }
    Ok(())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn window_start(window: Duration) -> i64 {
    to_i64(now_ms()).saturating_sub(i64::try_from(window.as_millis()).unwrap_or(i64::MAX))
}

fn corrupt(table: &'static str, detail: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        table,
        detail: detail.into(),
    }
}

fn level(table: &'static str, raw: &str) -> Result<HealthLevel, StoreError> {
    raw.parse().map_err(|e| corrupt(table, format!("{}", e)))
}

fn unsigned(table: &'static str, column: &str, raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| corrupt(table, format!("negative {}: {}", column, raw)))
}

/// Raw status_log columns, validated separately so one bad row can be skipped.
struct RawSample {
    snapshot_ts: i64,
    recorded_at: i64,
    api_health: String,
    entity: String,
    health: String,
    avg_latency: i64,
    timeout_pct: f64,
    fail_pct: f64,
}

impl RawSample {
    const COLUMNS: &'static str =
        "snapshot_ts, recorded_at, api_health, entity, health, avg_latency, timeout_pct, fail_pct";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            snapshot_ts: row.get(0)?,
            recorded_at: row.get(1)?,
            api_health: row.get(2)?,
            entity: row.get(3)?,
            health: row.get(4)?,
            avg_latency: row.get(5)?,
            timeout_pct: row.get(6)?,
            fail_pct: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<SampleRecord, StoreError> {
        const TABLE: &str = "status_log";
        Ok(SampleRecord {
            snapshot_ts: unsigned(TABLE, "snapshot_ts", self.snapshot_ts)?,
            recorded_at: unsigned(TABLE, "recorded_at", self.recorded_at)?,
            api_health: level(TABLE, &self.api_health)?,
            entity: self.entity,
            health: level(TABLE, &self.health)?,
            avg_latency: unsigned(TABLE, "avg_latency", self.avg_latency)?,
            timeout_pct: self.timeout_pct,
            fail_pct: self.fail_pct,
        })
    }
}

fn scope_from_row(row: &Row<'_>) -> rusqlite::Result<ScopeConfig> {
    let id: String = row.get(0)?;
    let display_sink: Option<String> = row.get(1)?;
    let display_message: Option<String> = row.get(2)?;
    let alert_sink: Option<String> = row.get(3)?;
    let alert_audience: Option<String> = row.get(4)?;
    let alert_marker: Option<String> = row.get(5)?;
    let alerts_generation: i64 = row.get(6)?;

    let display = display_sink.map(|sink| DisplayTarget {
        sink,
        message: display_message,
    });
    // A half-written alert target is treated as not configured.
    let alerts = match (alert_sink, alert_audience) {
        (Some(sink), Some(audience)) => {
            let mut target = AlertTarget::new(sink, audience);
            if let Some(marker) = alert_marker {
                target.marker = marker;
            }
            Some(target)
        }
        _ => None,
    };

    Ok(ScopeConfig {
        id: ScopeId::new(id),
        display,
        alerts,
        alerts_generation: u64::try_from(alerts_generation).unwrap_or(0),
    })
}

const SCOPE_COLUMNS: &str = "scope_id, display_sink, display_message, alert_sink, alert_audience, \
     alert_marker, alerts_generation";

fn insert_sample(conn: &Connection, record: &SampleRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO status_log
            (snapshot_ts, recorded_at, api_health, entity, health, avg_latency, timeout_pct, fail_pct)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            to_i64(record.snapshot_ts),
            to_i64(record.recorded_at),
            record.api_health.as_str(),
            record.entity,
            record.health.as_str(),
            to_i64(record.avg_latency),
            record.timeout_pct,
            record.fail_pct,
        ],
    )
}

impl Store for SqliteStore {
    fn append_sample(&self, record: &SampleRecord) -> Result<(), StoreError> {
        insert_sample(&self.conn.lock(), record)?;
        Ok(())
    }

    fn append_snapshot(&self, snapshot: &Snapshot, recorded_at: u64) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for sample in snapshot.iter() {
            insert_sample(&tx, &SampleRecord::from_sample(snapshot, sample, recorded_at))?;
        }
        tx.commit()?;
        Ok(snapshot.len())
    }

    fn recent_samples(&self, entity: &str, limit: usize) -> Result<Vec<SampleRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM status_log WHERE entity = ?1 ORDER BY id DESC LIMIT ?2",
            RawSample::COLUMNS
        ))?;
        let rows = stmt.query_map(params![entity, to_i64(limit as u64)], RawSample::from_row)?;

        let mut samples = Vec::with_capacity(limit);
        for row in rows {
            match row.map_err(StoreError::from).and_then(RawSample::into_record) {
                Ok(record) => samples.push(record),
                Err(e) => warn!(entity = %entity, "Skipping unreadable sample: {}", e),
            }
        }
        samples.reverse();
        Ok(samples)
    }

    fn last_snapshot_timestamp(&self) -> Result<Option<u64>, StoreError> {
        let conn = self.conn.lock();
        let newest: Option<i64> =
            conn.query_row("SELECT MAX(snapshot_ts) FROM status_log", [], |row| row.get(0))?;
        newest
            .map(|ts| unsigned("status_log", "snapshot_ts", ts))
            .transpose()
    }

    fn purge_samples_older_than(&self, age: Duration) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM status_log WHERE recorded_at < ?1",
            params![window_start(age)],
        )?;
        if deleted > 0 {
            conn.execute_batch("VACUUM")?;
        }
        debug!(deleted, "Purged old samples");
        Ok(deleted)
    }

    fn uptime(&self, entity: &str, window: Duration) -> Result<UptimeStats, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT health, COUNT(*), COALESCE(SUM(avg_latency), 0)
             FROM status_log
             WHERE entity = ?1 AND recorded_at > ?2
             GROUP BY health",
        )?;
        let rows = stmt.query_map(params![entity, window_start(window)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?;

        let mut counts: Vec<(HealthLevel, u64)> = Vec::new();
        let (mut total, mut latency_sum) = (0u64, 0u64);
        for row in rows {
            let (raw, count, latency) = row?;
            let count = u64::try_from(count).unwrap_or(0);
            // Unreadable labels still count towards the total.
            counts.push((raw.parse().unwrap_or(HealthLevel::Unknown), count));
            total += count;
            latency_sum += u64::try_from(latency).unwrap_or(0);
        }

        let avg_latency = if total == 0 { 0 } else { latency_sum / total };
        Ok(UptimeStats::from_counts(&counts, avg_latency))
    }

    fn logged_entities(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT entity FROM status_log ORDER BY entity")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn get_alert_state(&self, scope: &ScopeId, entity: &str) -> Result<Option<AlertState>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT consecutive_down, consecutive_healthy, is_active
                 FROM alert_state WHERE scope_id = ?1 AND entity = ?2",
                params![scope.as_str(), entity],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()?;

        let Some((down, healthy, active)) = row else {
            return Ok(None);
        };
        let counter = |column: &str, raw: i64| {
            u32::try_from(raw).map_err(|_| corrupt("alert_state", format!("{} out of range: {}", column, raw)))
        };
        Ok(Some(AlertState {
            consecutive_down: counter("consecutive_down", down)?,
            consecutive_healthy: counter("consecutive_healthy", healthy)?,
            is_active: active != 0,
        }))
    }

    fn upsert_alert_state(
        &self,
        scope: &ScopeId,
        entity: &str,
        state: &AlertState,
    ) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO alert_state
                (scope_id, entity, consecutive_down, consecutive_healthy, is_active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(scope_id, entity) DO UPDATE SET
                consecutive_down = excluded.consecutive_down,
                consecutive_healthy = excluded.consecutive_healthy,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at",
            params![
                scope.as_str(),
                entity,
                state.consecutive_down,
                state.consecutive_healthy,
                state.is_active,
                to_i64(now_ms()),
            ],
        )?;
        Ok(())
    }

    fn clear_alert_states(&self, scope: &ScopeId) -> Result<usize, StoreError> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM alert_state WHERE scope_id = ?1", params![scope.as_str()])?;
        Ok(deleted)
    }

    fn get_scope(&self, scope: &ScopeId) -> Result<Option<ScopeConfig>, StoreError> {
        let conn = self.conn.lock();
        let config = conn
            .query_row(
                &format!("SELECT {} FROM scope_config WHERE scope_id = ?1", SCOPE_COLUMNS),
                params![scope.as_str()],
                scope_from_row,
            )
            .optional()?;
        Ok(config)
    }

    fn list_scopes(&self) -> Result<Vec<ScopeConfig>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scope_config ORDER BY scope_id",
            SCOPE_COLUMNS
        ))?;
        let mut scopes = Vec::new();
        for row in stmt.query_map([], scope_from_row)? {
            match row {
                Ok(scope) => scopes.push(scope),
                Err(e) => warn!("Skipping unreadable scope row: {}", e),
            }
        }
        Ok(scopes)
    }

    fn list_scopes_with_alerts(&self) -> Result<Vec<ScopeConfig>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scope_config
             WHERE alert_sink IS NOT NULL AND alert_audience IS NOT NULL
             ORDER BY scope_id",
            SCOPE_COLUMNS
        ))?;
        let mut scopes = Vec::new();
        for row in stmt.query_map([], scope_from_row)? {
            match row {
                Ok(scope) => scopes.push(scope),
                Err(e) => warn!("Skipping unreadable scope row: {}", e),
            }
        }
        Ok(scopes)
    }

    fn set_display(&self, scope: &ScopeId, sink: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO scope_config (scope_id, display_sink, display_message, updated_at)
             VALUES (?1, ?2, NULL, ?3)
             ON CONFLICT(scope_id) DO UPDATE SET
                display_sink = excluded.display_sink,
                display_message = NULL,
                updated_at = excluded.updated_at",
            params![scope.as_str(), sink, to_i64(now_ms())],
        )?;
        Ok(())
    }

    fn set_display_message(&self, scope: &ScopeId, message: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE scope_config SET display_message = ?1, updated_at = ?2
             WHERE scope_id = ?3 AND display_sink IS NOT NULL",
            params![message, to_i64(now_ms()), scope.as_str()],
        )?;
        Ok(())
    }

    fn set_alerts(&self, scope: &ScopeId, target: &AlertTarget) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO scope_config (scope_id, alert_sink, alert_audience, alert_marker, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(scope_id) DO UPDATE SET
                alert_sink = excluded.alert_sink,
                alert_audience = excluded.alert_audience,
                alert_marker = excluded.alert_marker,
                updated_at = excluded.updated_at",
            params![
                scope.as_str(),
                target.sink,
                target.audience,
                target.marker,
                to_i64(now_ms())
            ],
        )?;
        Ok(())
    }

    fn clear_alerts(&self, scope: &ScopeId) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE scope_config
             SET alert_sink = NULL, alert_audience = NULL, alert_marker = NULL,
                 alerts_generation = alerts_generation + 1, updated_at = ?1
             WHERE scope_id = ?2",
            params![to_i64(now_ms()), scope.as_str()],
        )?;
        tx.execute("DELETE FROM alert_state WHERE scope_id = ?1", params![scope.as_str()])?;
        tx.commit()?;
        Ok(())
    }
}
