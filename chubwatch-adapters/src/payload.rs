//! Status payload schema and the snapshot parser.
//!
//! The remote source answers with a JSON document holding an ordered array of
//! historical records, newest first:
//!
//! ```json
//! {
//!   "history": [
//!     {
//!       "api": "green",
//!       "updated": "2024-01-15T10:30:00Z",
//!       "inference": {
//!         "asha": { "health": "green", "avg": 850, "timeout": 0.0074, "fail": 0.0 }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Only the newest record is consumed. Per-entity problems degrade gracefully:
//! a configured entity missing from the record is skipped, odd field types are
//! coerced, and an unusable timestamp falls back to the current time.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use chubwatch_types::{EntitySample, HealthLevel, Snapshot};

use crate::AdapterError;

/// Entities tracked by default, in the order the upstream status page lists them.
pub const DEFAULT_ENTITIES: &[&str] = &["asha", "soji", "mobile", "mistral", "mixtral", "mythomax"];

/// Top-level status document.
#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    history: Vec<HistoryRecord>,
}

/// One historical record. Fields are kept loosely typed on purpose so a single
/// malformed field never rejects the whole record.
#[derive(Debug, Deserialize)]
struct HistoryRecord {
    #[serde(default)]
    api: Option<Value>,
    #[serde(default)]
    updated: Option<Value>,
    #[serde(default)]
    inference: BTreeMap<String, Value>,
}

/// Converts raw status payloads into typed [`Snapshot`]s.
///
/// The parser owns the canonical entity list: output entities follow that
/// order regardless of how the payload orders its keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusParser {
    entities: Vec<String>,
}

impl Default for StatusParser {
    fn default() -> Self {
        Self::new(DEFAULT_ENTITIES.iter().copied())
    }
}

impl StatusParser {
    /// Create a parser for the given entities, in canonical order.
    ///
    /// Names are matched case-insensitively, so a later name that only
    /// differs in case from an earlier one is dropped.
    pub fn new<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in entities.into_iter().map(Into::into) {
            if unique.iter().any(|seen| seen.eq_ignore_ascii_case(&name)) {
                warn!(entity = %name, "Ignoring duplicate entity name");
                continue;
            }
            unique.push(name);
        }
        Self { entities: unique }
    }

    /// The canonical entity list.
    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Parse a raw payload, logging and discarding any failure.
    pub fn parse(&self, raw: &[u8]) -> Option<Snapshot> {
        match self.try_parse(raw) {
            Ok(snapshot) => Some(snapshot),
            Err(AdapterError::Empty) => {
                warn!("No history in status response");
                None
            }
            Err(e) => {
                warn!("Failed to parse status response: {}", e);
                None
            }
        }
    }

    /// Parse a raw payload.
    ///
    /// Fails only when the document is not a usable status payload at all or
    /// has no history records.
    pub fn try_parse(&self, raw: &[u8]) -> Result<Snapshot, AdapterError> {
        let payload: StatusPayload = serde_json::from_slice(raw)?;
        let latest = payload.history.into_iter().next().ok_or(AdapterError::Empty)?;
        Ok(self.from_record(latest))
    }

    fn from_record(&self, record: HistoryRecord) -> Snapshot {
        let timestamp_ms = record
            .updated
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| {
                debug!("Status record has no usable timestamp, using current time");
                now_ms()
            });

        let api_health = record.api.as_ref().map_or(HealthLevel::Unknown, health_of);

        let entities = self
            .entities
            .iter()
            .filter_map(|name| {
                let value = lookup(&record.inference, name)?;
                let fields = value.as_object()?;
                Some(EntitySample {
                    name: name.clone(),
                    health: fields.get("health").map_or(HealthLevel::Unknown, health_of),
                    avg_latency: latency(fields.get("avg")),
                    timeout_pct: percentage(fields.get("timeout")),
                    fail_pct: percentage(fields.get("fail")),
                })
            })
            .collect();

        Snapshot {
            timestamp_ms,
            api_health,
            entities,
        }
    }
}

/// Exact key match first, then a case-insensitive one.
fn lookup<'a>(inference: &'a BTreeMap<String, Value>, name: &str) -> Option<&'a Value> {
    inference.get(name).or_else(|| {
        inference
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn health_of(value: &Value) -> HealthLevel {
    value.as_str().map_or(HealthLevel::Unknown, HealthLevel::from_raw)
}

fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Coerce a rate into a 0-100 percentage.
///
/// Values in `[0, 1]` are fractions and get scaled; anything larger is taken to
/// be a percentage already.
fn percentage(value: Option<&Value>) -> f64 {
    match number(value) {
        Some(v) if v <= 0.0 => 0.0,
        Some(v) if v <= 1.0 => v * 100.0,
        Some(v) => v.min(100.0),
        None => 0.0,
    }
}

fn latency(value: Option<&Value>) -> u64 {
    match number(value) {
        Some(v) if v > 0.0 => v.round() as u64,
        _ => 0,
    }
}

/// Parse the record's `updated` field into Unix milliseconds.
///
/// Accepts RFC 3339 strings, naive ISO-8601 strings (taken as UTC) and numeric
/// Unix timestamps in seconds or milliseconds.
fn parse_timestamp(value: &Value) -> Option<u64> {
    let millis = match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .ok()
                .or_else(|| {
                    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                        .map(|naive| naive.and_utc().timestamp_millis())
                })?
        }
        Value::Number(n) => {
            let raw = n.as_f64()?;
            // Anything past 1e11 cannot be a plausible seconds value.
            if raw > 1e11 {
                raw as i64
            } else {
                (raw * 1000.0) as i64
            }
        }
        _ => return None,
    };
    u64::try_from(millis).ok()
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> &'static str {
        r#"{
            "history": [
                {
                    "api": "green",
                    "updated": "2024-01-15T10:30:00Z",
                    "inference": {
                        "mythomax": { "health": "red", "avg": 4100, "timeout": 0.25, "fail": 0.1 },
                        "asha": { "health": "green", "avg": 850.6, "timeout": 0.0074, "fail": 0 },
                        "soji": { "health": "orange", "avg": "1200", "timeout": "0.5", "fail": 12.5 },
                        "unlisted": { "health": "red", "avg": 1 }
                    }
                },
                {
                    "api": "red",
                    "updated": "2024-01-15T10:25:00Z",
                    "inference": {}
                }
            ]
        }"#
    }

    #[test]
    fn test_picks_newest_record() {
        let snapshot = StatusParser::default().try_parse(sample_payload().as_bytes()).unwrap();
        assert_eq!(snapshot.api_health, HealthLevel::Healthy);
        assert_eq!(snapshot.timestamp_ms, 1_705_314_600_000);
    }

    #[test]
    fn test_entities_follow_canonical_order_and_skip_missing() {
        let snapshot = StatusParser::default().try_parse(sample_payload().as_bytes()).unwrap();
        let names: Vec<_> = snapshot.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["asha", "soji", "mythomax"]);
        assert!(snapshot.get("unlisted").is_none());
    }

    #[test]
    fn test_fields_are_coerced() {
        let snapshot = StatusParser::default().try_parse(sample_payload().as_bytes()).unwrap();

        let asha = snapshot.get("asha").unwrap();
        assert_eq!(asha.health, HealthLevel::Healthy);
        assert_eq!(asha.avg_latency, 851);
        assert!((asha.timeout_pct - 0.74).abs() < 1e-9);
        assert_eq!(asha.fail_pct, 0.0);

        let soji = snapshot.get("soji").unwrap();
        assert_eq!(soji.health, HealthLevel::Degraded);
        assert_eq!(soji.avg_latency, 1200);
        assert!((soji.timeout_pct - 50.0).abs() < 1e-9);
        assert!((soji.fail_pct - 12.5).abs() < 1e-9);

        let mythomax = snapshot.get("mythomax").unwrap();
        assert_eq!(mythomax.health, HealthLevel::Down);
        assert!((mythomax.timeout_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentage_coercion() {
        assert_eq!(percentage(Some(&serde_json::json!(0.5))), 50.0);
        assert_eq!(percentage(Some(&serde_json::json!(1))), 100.0);
        assert_eq!(percentage(Some(&serde_json::json!(42))), 42.0);
        assert_eq!(percentage(Some(&serde_json::json!(420))), 100.0);
        assert_eq!(percentage(Some(&serde_json::json!(-3))), 0.0);
        assert_eq!(percentage(Some(&serde_json::json!("n/a"))), 0.0);
        assert_eq!(percentage(Some(&serde_json::json!(null))), 0.0);
        assert_eq!(percentage(None), 0.0);
    }

    #[test]
    fn test_unknown_health_labels_become_unknown() {
        let raw = r#"{"history":[{"api":"purple","updated":"2024-01-15T10:30:00Z",
            "inference":{"asha":{"health":"sparkly"},"soji":{"health":3}}}]}"#;
        let snapshot = StatusParser::default().try_parse(raw.as_bytes()).unwrap();
        assert_eq!(snapshot.api_health, HealthLevel::Unknown);
        assert_eq!(snapshot.get("asha").unwrap().health, HealthLevel::Unknown);
        assert_eq!(snapshot.get("soji").unwrap().health, HealthLevel::Unknown);
    }

    #[test]
    fn test_non_object_entity_is_skipped() {
        let raw = r#"{"history":[{"api":"green","updated":"2024-01-15T10:30:00Z",
            "inference":{"asha":"green","soji":{"health":"green"}}}]}"#;
        let snapshot = StatusParser::default().try_parse(raw.as_bytes()).unwrap();
        let names: Vec<_> = snapshot.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["soji"]);
    }

    #[test]
    fn test_missing_or_bad_timestamp_falls_back_to_now() {
        let before = now_ms();
        for raw in [
            r#"{"history":[{"api":"green"}]}"#,
            r#"{"history":[{"api":"green","updated":"yesterday-ish"}]}"#,
        ] {
            let snapshot = StatusParser::default().try_parse(raw.as_bytes()).unwrap();
            assert!(snapshot.timestamp_ms >= before);
            assert!(snapshot.is_empty());
        }
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = 1_705_314_600_000;
        for value in [
            serde_json::json!("2024-01-15T10:30:00Z"),
            serde_json::json!("2024-01-15T10:30:00+00:00"),
            serde_json::json!("2024-01-15T12:30:00+02:00"),
            serde_json::json!("2024-01-15T10:30:00"),
            serde_json::json!("2024-01-15 10:30:00.000"),
            serde_json::json!(1_705_314_600),
            serde_json::json!(1_705_314_600_000u64),
        ] {
            assert_eq!(parse_timestamp(&value), Some(expected), "value {value}");
        }
        assert_eq!(parse_timestamp(&serde_json::json!(true)), None);
    }

    #[test]
    fn test_empty_history_is_an_error() {
        let parser = StatusParser::default();
        assert!(matches!(parser.try_parse(br#"{"history":[]}"#), Err(AdapterError::Empty)));
        assert!(matches!(parser.try_parse(br#"{}"#), Err(AdapterError::Empty)));
        assert!(parser.parse(br#"{"history":[]}"#).is_none());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let parser = StatusParser::default();
        assert!(matches!(parser.try_parse(b"<html>oops</html>"), Err(AdapterError::Parse(_))));
        assert!(matches!(
            parser.try_parse(br#"{"history":"nope"}"#),
            Err(AdapterError::Parse(_))
        ));
        assert!(parser.parse(b"").is_none());
    }

    #[test]
    fn test_custom_entity_list() {
        let parser = StatusParser::new(["SOJI", "asha"]);
        let snapshot = parser.try_parse(sample_payload().as_bytes()).unwrap();
        let names: Vec<_> = snapshot.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["SOJI", "asha"]);
        assert_eq!(parser.entities().len(), 2);
    }

    #[test]
    fn test_names_differing_only_in_case_are_deduplicated() {
        let parser = StatusParser::new(["asha", "ASHA", "soji", "Asha"]);
        assert_eq!(parser.entities(), ["asha", "soji"]);

        let snapshot = parser.try_parse(sample_payload().as_bytes()).unwrap();
        let names: Vec<_> = snapshot.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["asha", "soji"]);
    }
}
