//! Runtime settings.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables such as `CHUBWATCH_STATUS__POLL_INTERVAL=30s` or
//! `CHUBWATCH_STATUS__ENTITIES=asha,soji`.
//!
//! ```toml
//! [status]
//! poll_interval = "10s"
//! entities = ["asha", "soji", "mobile"]
//!
//! [alerts]
//! down_threshold = 2
//! recovery_threshold = 3
//!
//! [database]
//! path = "chubwatch.db"
//! retention = "30d"
//!
//! [sink]
//! kind = "webhook"
//!
//! [scopes]
//! allowed = ["guild-1", "guild-2"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use chubwatch_adapters::chub::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};
use chubwatch_adapters::DEFAULT_ENTITIES;
use chubwatch_types::ScopeId;

use crate::data::alert::{DEFAULT_DOWN_THRESHOLD, DEFAULT_RECOVERY_THRESHOLD};
use crate::data::duration;
use crate::data::history::DEFAULT_HISTORY_DEPTH;
use crate::data::AlertPolicy;
use crate::poller::PollerOptions;
use crate::sink::{ViewStyle, DEFAULT_STATUS_PAGE, DEFAULT_TITLE};

/// Default settings file, read when present.
pub const DEFAULT_CONFIG_FILE: &str = "chubwatch.toml";

const ENV_PREFIX: &str = "CHUBWATCH";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub status: StatusSettings,
    pub alerts: AlertSettings,
    pub database: DatabaseSettings,
    pub sink: SinkSettings,
    pub scopes: ScopeSettings,
    pub logging: LoggingSettings,
}

/// Where status comes from and how it is tracked.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    pub endpoint: String,
    #[serde(deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub fetch_timeout: Duration,
    /// Upstream refresh cadence. Alert thresholds count upstream updates.
    #[serde(deserialize_with = "duration::deserialize")]
    pub upstream_interval: Duration,
    pub history_depth: usize,
    pub entities: Vec<String>,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: Duration::from_secs(10),
            fetch_timeout: DEFAULT_TIMEOUT,
            upstream_interval: Duration::from_secs(5 * 60),
            history_depth: DEFAULT_HISTORY_DEPTH,
            entities: DEFAULT_ENTITIES.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub down_threshold: u32,
    pub recovery_threshold: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            down_threshold: DEFAULT_DOWN_THRESHOLD,
            recovery_threshold: DEFAULT_RECOVERY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    #[serde(deserialize_with = "duration::deserialize")]
    pub retention: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub maintenance_interval: Duration,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("chubwatch.db"),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            maintenance_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Which sink implementation serves every scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub kind: SinkKind,
    pub title: String,
    pub status_page: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: SinkKind::Log,
            title: DEFAULT_TITLE.to_string(),
            status_page: DEFAULT_STATUS_PAGE.to_string(),
        }
    }
}

impl SinkSettings {
    pub fn style(&self) -> ViewStyle {
        ViewStyle {
            title: self.title.clone(),
            status_page: self.status_page.clone(),
        }
    }
}

/// Which scopes the engine serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    /// Scopes allowed to receive views and alerts. Empty allows every scope.
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing-subscriber` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if it exists) and the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(environment())
            .build()
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        Self::from_config(config)
    }

    /// Parse settings from a TOML string, still honouring the environment.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(environment())
            .build()
            .context("Failed to parse settings")?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize().context("Invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.alerts.down_threshold == 0 {
            bail!("alerts.down_threshold must be at least 1");
        }
        if self.alerts.recovery_threshold == 0 {
            bail!("alerts.recovery_threshold must be at least 1");
        }
        if self.status.history_depth == 0 {
            bail!("status.history_depth must be at least 1");
        }
        if self.status.entities.is_empty() {
            bail!("status.entities must name at least one entity");
        }
        for (i, name) in self.status.entities.iter().enumerate() {
            if self.status.entities[..i]
                .iter()
                .any(|earlier| earlier.eq_ignore_ascii_case(name))
            {
                bail!("status.entities lists {} more than once", name);
            }
        }
        for (name, value) in [
            ("status.poll_interval", self.status.poll_interval),
            ("status.fetch_timeout", self.status.fetch_timeout),
            ("database.maintenance_interval", self.database.maintenance_interval),
        ] {
            if value.is_zero() {
                bail!("{} must be greater than zero", name);
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> AlertPolicy {
        AlertPolicy::new(self.alerts.down_threshold, self.alerts.recovery_threshold)
    }

    pub fn poller_options(&self) -> PollerOptions {
        PollerOptions {
            entities: self.status.entities.clone(),
            history_depth: self.status.history_depth,
            policy: self.policy(),
            poll_interval: self.status.poll_interval,
            upstream_interval: self.status.upstream_interval,
            retention: self.database.retention,
            maintenance_interval: self.database.maintenance_interval,
            allowed_scopes: self.scopes.allowed.iter().map(ScopeId::new).collect(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("status.entities")
        .with_list_parse_key("scopes.allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.status.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.status.fetch_timeout, Duration::from_secs(30));
        assert_eq!(settings.status.history_depth, 10);
        assert_eq!(settings.status.entities[0], "asha");
        assert_eq!(settings.alerts.down_threshold, 2);
        assert_eq!(settings.alerts.recovery_threshold, 3);
        assert_eq!(settings.database.retention, Duration::from_secs(30 * 86_400));
        assert_eq!(settings.sink.kind, SinkKind::Log);
        assert_eq!(settings.logging.filter, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.status, StatusSettings::default());
        assert_eq!(settings.alerts, AlertSettings::default());
    }

    #[test]
    fn test_partial_sections() {
        let settings = Settings::from_toml(
            r#"
            [status]
            poll_interval = "30s"
            entities = ["soji", "asha"]

            [alerts]
            recovery_threshold = 5

            [database]
            retention = "7d"

            [sink]
            kind = "webhook"
            title = "Fleet"
            "#,
        )
        .unwrap();

        assert_eq!(settings.status.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.status.fetch_timeout, Duration::from_secs(30));
        assert_eq!(settings.status.entities, vec!["soji", "asha"]);
        assert_eq!(settings.alerts.down_threshold, 2);
        assert_eq!(settings.alerts.recovery_threshold, 5);
        assert_eq!(settings.database.retention, Duration::from_secs(7 * 86_400));
        assert_eq!(settings.sink.kind, SinkKind::Webhook);
        assert_eq!(settings.sink.style().title, "Fleet");
        assert_eq!(settings.sink.style().status_page, DEFAULT_STATUS_PAGE);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = Settings::from_toml("[alerts]\ndown_threshold = 0").unwrap_err();
        assert!(format!("{:#}", err).contains("down_threshold"));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = Settings::from_toml("[status]\nhistory_depth = 0").unwrap_err();
        assert!(format!("{:#}", err).contains("history_depth"));
    }

    #[test]
    fn test_bad_duration_rejected() {
        assert!(Settings::from_toml("[status]\npoll_interval = \"soon\"").is_err());
        assert!(Settings::from_toml("[status]\npoll_interval = \"0s\"").is_err());
    }

    #[test]
    fn test_unknown_sink_kind_rejected() {
        assert!(Settings::from_toml("[sink]\nkind = \"carrier-pigeon\"").is_err());
    }

    #[test]
    fn test_load_file_and_missing_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"/var/lib/chubwatch/state.db\"").unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.database.path, PathBuf::from("/var/lib/chubwatch/state.db"));

        let settings = Settings::load(Path::new("/nonexistent/chubwatch.toml")).unwrap();
        assert_eq!(settings.database.path, PathBuf::from("chubwatch.db"));
    }

    #[test]
    fn test_poller_options() {
        let settings = Settings::from_toml("[alerts]\ndown_threshold = 4").unwrap();
        let options = settings.poller_options();
        assert_eq!(options.policy.down_threshold(), 4);
        assert_eq!(options.policy.recovery_threshold(), 3);
        assert_eq!(options.entities, settings.status.entities);
        assert_eq!(options.retention, settings.database.retention);
        assert!(options.allowed_scopes.is_empty());
    }

    #[test]
    fn test_scope_allowlist() {
        let settings = Settings::from_toml("[scopes]\nallowed = [\"guild-1\", \"guild-2\"]").unwrap();
        let options = settings.poller_options();
        assert_eq!(options.allowed_scopes, [ScopeId::from("guild-1"), ScopeId::from("guild-2")]);
        assert!(options.is_scope_allowed(&ScopeId::from("guild-2")));
        assert!(!options.is_scope_allowed(&ScopeId::from("guild-3")));
    }

    #[test]
    fn test_entities_differing_only_in_case_rejected() {
        let err = Settings::from_toml("[status]\nentities = [\"asha\", \"ASHA\"]").unwrap_err();
        assert!(format!("{:#}", err).contains("more than once"));
    }
}
