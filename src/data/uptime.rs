//! Uptime grading for the statistics report.

use std::fmt;

use crate::store::UptimeStats;

/// Smallest and largest look-back windows accepted, in days.
pub const MIN_DAYS: u32 = 1;
pub const MAX_DAYS: u32 = 90;

/// Default look-back window in days.
pub const DEFAULT_DAYS: u32 = 7;

/// Clamp a requested look-back window into the accepted range.
pub fn clamp_days(days: u32) -> u32 {
    days.clamp(MIN_DAYS, MAX_DAYS)
}

/// Coarse grade of a healthy percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UptimeGrade {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl UptimeGrade {
    pub fn from_healthy_pct(pct: f64) -> Self {
        if pct >= 99.0 {
            UptimeGrade::Excellent
        } else if pct >= 95.0 {
            UptimeGrade::Good
        } else if pct >= 90.0 {
            UptimeGrade::Fair
        } else {
            UptimeGrade::Poor
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            UptimeGrade::Excellent => "🟢",
            UptimeGrade::Good => "🟡",
            UptimeGrade::Fair => "🟠",
            UptimeGrade::Poor => "🔴",
        }
    }
}

impl fmt::Display for UptimeGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UptimeGrade::Excellent => "excellent",
            UptimeGrade::Good => "good",
            UptimeGrade::Fair => "fair",
            UptimeGrade::Poor => "poor",
        };
        f.write_str(name)
    }
}

/// One-line summary, e.g. `🟢 99.5% healthy (1,234 samples, 812ms avg)`.
pub fn summary_line(stats: &UptimeStats) -> String {
    let grade = UptimeGrade::from_healthy_pct(stats.healthy);
    format!(
        "{} {:.1}% healthy ({} samples, {}ms avg)",
        grade.glyph(),
        stats.healthy,
        group_thousands(stats.total),
        group_thousands(stats.avg_latency)
    )
}

/// Per-level breakdown, omitting levels with no samples except `Healthy`.
pub fn breakdown_lines(stats: &UptimeStats) -> Vec<String> {
    let mut lines = vec![format!("🟢 Healthy: {:.1}%", stats.healthy)];
    for (glyph, label, pct) in [
        ("🟠", "Degraded", stats.degraded),
        ("🔴", "Down", stats.down),
        ("⚪", "Unknown", stats.unknown),
    ] {
        if pct > 0.0 {
            lines.push(format!("{} {}: {:.1}%", glyph, label, pct));
        }
    }
    lines
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
