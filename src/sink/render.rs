//! Sink-independent view model for status displays and alert messages.

use std::time::Duration;

use chubwatch_types::HealthLevel;

use super::{AlertBatch, RenderRequest};
use crate::data::duration::format_duration;

/// Default view title.
pub const DEFAULT_TITLE: &str = "Chub.ai Status";

/// Default link to the upstream status page.
pub const DEFAULT_STATUS_PAGE: &str = "https://chub.ai/status";

/// Header of the per-entity history block.
pub const HISTORY_HEADER: &str = "Models (← older │ newer →)";

/// Width entity names are padded to so history strips line up.
const NAME_WIDTH: usize = 8;

/// Presentation settings shared by every scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewStyle {
    pub title: String,
    pub status_page: String,
}

impl Default for ViewStyle {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            status_page: DEFAULT_STATUS_PAGE.to_string(),
        }
    }
}

/// A rendered status view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub title: String,
    /// RGB colour taken from the worst known level.
    pub colour: u32,
    pub api_line: String,
    pub history_header: &'static str,
    pub entity_lines: Vec<String>,
    pub link_line: String,
    pub footer: String,
    pub subscription_hint: Option<String>,
}

impl StatusView {
    pub fn build(request: &RenderRequest, style: &ViewStyle) -> Self {
        let api = request.snapshot.api_health;

        let entity_lines = request
            .lines
            .iter()
            .map(|(name, visual)| {
                let visual = if visual.is_empty() { "-" } else { visual.as_str() };
                format!("`{:<width$}` {}", capitalize(name), visual, width = NAME_WIDTH)
            })
            .collect();

        Self {
            title: style.title.clone(),
            colour: colour(request.snapshot.worst()),
            api_line: format!("{} {}", api.glyph(), api.label()),
            history_header: HISTORY_HEADER,
            entity_lines,
            link_line: format!("For more information: {}", style.status_page),
            footer: format!(
                "Last update from Chub ({} interval)",
                cadence(request.upstream_interval)
            ),
            subscription_hint: request
                .subscription
                .as_ref()
                .map(|marker| format!("React with {} to get outage alerts", marker)),
        }
    }

    /// The entity block as a single string, or a placeholder when empty.
    pub fn entity_block(&self) -> String {
        if self.entity_lines.is_empty() {
            "No model data".to_string()
        } else {
            self.entity_lines.join("\n")
        }
    }
}

/// Alert message text for a batch, mentioning the audience once.
pub fn alert_text(batch: &AlertBatch) -> String {
    let mut lines = vec![batch.target.audience.clone()];
    if !batch.newly_down.is_empty() {
        lines.push(format!(
            "{} **Outage:** {} {} down",
            HealthLevel::Down.glyph(),
            join_names(&batch.newly_down),
            if batch.newly_down.len() == 1 { "is" } else { "are" }
        ));
    }
    if !batch.newly_recovered.is_empty() {
        lines.push(format!(
            "{} **Recovered:** {} {} back to normal",
            HealthLevel::Healthy.glyph(),
            join_names(&batch.newly_recovered),
            if batch.newly_recovered.len() == 1 { "is" } else { "are" }
        ));
    }
    lines.join("\n")
}

fn colour(level: HealthLevel) -> u32 {
    match level {
        HealthLevel::Healthy => 0x2ECC71,
        HealthLevel::Degraded => 0xE67E22,
        HealthLevel::Down => 0xE74C3C,
        HealthLevel::Unknown => 0x99AAB5,
    }
}

fn cadence(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 60 && secs % 60 == 0 && interval.subsec_nanos() == 0 {
        format!("{} min", secs / 60)
    } else {
        format_duration(interval)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_names(names: &[String]) -> String {
    let names: Vec<String> = names.iter().map(|n| capitalize(n)).collect();
    match names.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chubwatch_types::{AlertTarget, DisplayTarget, ScopeId, Snapshot};

    fn request(subscription: Option<&str>) -> RenderRequest {
        let snapshot = Snapshot::builder()
            .timestamp_ms(1)
            .api(HealthLevel::Healthy)
            .entity("asha", |e| e.health(HealthLevel::Healthy))
            .entity("mythomax", |e| e.health(HealthLevel::Degraded))
            .build();
        RenderRequest {
            scope: ScopeId::from("guild-1"),
            target: DisplayTarget {
                sink: "status".into(),
                message: None,
            },
            snapshot,
            lines: vec![
                ("asha".into(), "🟢🟢🔴".into()),
                ("mythomax".into(), "🟠".into()),
                ("mobile".into(), String::new()),
            ],
            subscription: subscription.map(String::from),
            upstream_interval: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_view_layout() {
        let view = StatusView::build(&request(None), &ViewStyle::default());

        assert_eq!(view.title, "Chub.ai Status");
        assert_eq!(view.colour, 0xE67E22);
        assert_eq!(view.api_line, "🟢 Healthy");
        assert_eq!(view.history_header, "Models (← older │ newer →)");
        assert_eq!(
            view.entity_lines,
            ["`Asha    ` 🟢🟢🔴", "`Mythomax` 🟠", "`Mobile  ` -"]
        );
        assert_eq!(view.link_line, "For more information: https://chub.ai/status");
        assert_eq!(view.footer, "Last update from Chub (5 min interval)");
        assert!(view.subscription_hint.is_none());
    }

    #[test]
    fn test_view_subscription_hint() {
        let view = StatusView::build(&request(Some("🔔")), &ViewStyle::default());
        assert_eq!(view.subscription_hint.as_deref(), Some("React with 🔔 to get outage alerts"));
    }

    #[test]
    fn test_empty_entity_block_placeholder() {
        let mut req = request(None);
        req.lines.clear();
        let view = StatusView::build(&req, &ViewStyle::default());
        assert_eq!(view.entity_block(), "No model data");
    }

    #[test]
    fn test_colour_follows_worst_level() {
        let mut req = request(None);
        req.snapshot.api_health = HealthLevel::Down;
        assert_eq!(StatusView::build(&req, &ViewStyle::default()).colour, 0xE74C3C);

        req.snapshot = Snapshot::with_timestamp(1);
        assert_eq!(StatusView::build(&req, &ViewStyle::default()).colour, 0x99AAB5);
    }

    #[test]
    fn test_alert_text() {
        let batch = AlertBatch {
            scope: ScopeId::from("guild-1"),
            target: AlertTarget::new("alerts", "<@&42>"),
            newly_down: vec!["asha".into(), "soji".into(), "mobile".into()],
            newly_recovered: vec!["mistral".into()],
        };
        assert_eq!(
            alert_text(&batch),
            "<@&42>\n🔴 **Outage:** Asha, Soji and Mobile are down\n🟢 **Recovered:** Mistral is back to normal"
        );
    }

    #[test]
    fn test_cadence() {
        assert_eq!(cadence(Duration::from_secs(300)), "5 min");
        assert_eq!(cadence(Duration::from_secs(45)), "45s");
    }
}
