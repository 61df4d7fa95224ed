//! Monitoring scopes - independent consumers with their own display and alert setup.

use core::fmt;

/// Default marker users react with to subscribe to outage alerts.
pub const DEFAULT_SUBSCRIPTION_MARKER: &str = "🔔";

/// Identifier of a monitoring scope (e.g. one community or subscriber group).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ScopeId(String);

impl ScopeId {
    /// Create a scope identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ScopeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a scope's live status view is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplayTarget {
    /// Display sink identifier (channel, webhook URL, ...).
    pub sink: String,

    /// Identity of the message currently showing the view, once one exists.
    pub message: Option<String>,
}

/// Where a scope's outage alerts are delivered, and to whom.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlertTarget {
    /// Alert sink identifier.
    pub sink: String,

    /// Audience to notify (e.g. a role).
    pub audience: String,

    /// Marker users react with to subscribe.
    pub marker: String,
}

impl AlertTarget {
    /// Create an alert target with the default subscription marker.
    pub fn new(sink: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            audience: audience.into(),
            marker: DEFAULT_SUBSCRIPTION_MARKER.to_string(),
        }
    }
}

/// Configuration of one monitoring scope.
///
/// A scope without an alert target never runs the alert engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopeConfig {
    pub id: ScopeId,
    pub display: Option<DisplayTarget>,
    pub alerts: Option<AlertTarget>,

    /// Bumped every time the alert configuration is cleared, so an engine
    /// holding cached alert states can tell they were deleted underneath it.
    pub alerts_generation: u64,
}

impl ScopeConfig {
    /// An unconfigured scope.
    pub fn new(id: impl Into<ScopeId>) -> Self {
        Self {
            id: id.into(),
            display: None,
            alerts: None,
            alerts_generation: 0,
        }
    }

    /// Attach a display sink.
    pub fn with_display(mut self, sink: impl Into<String>) -> Self {
        self.display = Some(DisplayTarget {
            sink: sink.into(),
            message: None,
        });
        self
    }

    /// Attach an alert target.
    pub fn with_alerts(mut self, target: AlertTarget) -> Self {
        self.alerts = Some(target);
        self
    }

    /// Subscription marker to advertise on the display, if alerts are configured.
    pub fn subscription_marker(&self) -> Option<&str> {
        self.alerts.as_ref().map(|a| a.marker.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_config_builders() {
        let scope = ScopeConfig::new("guild-1")
            .with_display("https://hooks.example/status")
            .with_alerts(AlertTarget::new("https://hooks.example/alerts", "role-9"));

        assert_eq!(scope.id.as_str(), "guild-1");
        assert_eq!(scope.display.as_ref().unwrap().message, None);
        assert_eq!(scope.subscription_marker(), Some(DEFAULT_SUBSCRIPTION_MARKER));
    }

    #[test]
    fn test_no_alerts_means_no_marker() {
        let scope = ScopeConfig::new("guild-2").with_display("status");
        assert_eq!(scope.subscription_marker(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_scope_id_is_transparent() {
        let json = serde_json::to_string(&ScopeId::new("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
