//! Health classification lattice.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

/// Health of a monitored entity or of the aggregate API signal.
///
/// The known levels are ordered `Healthy < Degraded < Down`. `Unknown` sits
/// outside that order: it compares equal only to itself and is never "worse"
/// or "better" than a known level. The alert engine treats it as neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Down,
    #[default]
    Unknown,
}

/// Raw labels a status source may report, and the level each one maps to.
///
/// Lookups are case-insensitive and ignore surrounding whitespace. Labels not
/// listed here map to [`HealthLevel::Unknown`].
pub const RAW_LABELS: &[(&str, HealthLevel)] = &[
    ("green", HealthLevel::Healthy),
    ("healthy", HealthLevel::Healthy),
    ("ok", HealthLevel::Healthy),
    ("up", HealthLevel::Healthy),
    ("operational", HealthLevel::Healthy),
    ("yellow", HealthLevel::Degraded),
    ("warning", HealthLevel::Degraded),
    ("orange", HealthLevel::Degraded),
    ("degraded", HealthLevel::Degraded),
    ("partial", HealthLevel::Degraded),
    ("red", HealthLevel::Down),
    ("down", HealthLevel::Down),
    ("outage", HealthLevel::Down),
    ("critical", HealthLevel::Down),
    ("error", HealthLevel::Down),
];

impl HealthLevel {
    /// All levels, known levels in ascending severity followed by `Unknown`.
    pub const ALL: [HealthLevel; 4] = [
        HealthLevel::Healthy,
        HealthLevel::Degraded,
        HealthLevel::Down,
        HealthLevel::Unknown,
    ];

    /// Map a raw source label onto the lattice. Total: never fails.
    pub fn from_raw(label: &str) -> Self {
        let label = label.trim();
        RAW_LABELS
            .iter()
            .find(|(raw, _)| raw.eq_ignore_ascii_case(label))
            .map(|(_, level)| *level)
            .unwrap_or(HealthLevel::Unknown)
    }

    /// Canonical lowercase name, also used as the persisted form.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Degraded => "degraded",
            HealthLevel::Down => "down",
            HealthLevel::Unknown => "unknown",
        }
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "Healthy",
            HealthLevel::Degraded => "Degraded",
            HealthLevel::Down => "Down",
            HealthLevel::Unknown => "Unknown",
        }
    }

    /// Glyph used in visual history strips.
    pub fn glyph(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "🟢",
            HealthLevel::Degraded => "🟠",
            HealthLevel::Down => "🔴",
            HealthLevel::Unknown => "⚪",
        }
    }

    /// Severity rank of a known level; `None` for `Unknown`.
    pub fn severity(&self) -> Option<u8> {
        match self {
            HealthLevel::Healthy => Some(0),
            HealthLevel::Degraded => Some(1),
            HealthLevel::Down => Some(2),
            HealthLevel::Unknown => None,
        }
    }

    /// Returns true for `Healthy`, `Degraded` and `Down`.
    pub fn is_known(&self) -> bool {
        self.severity().is_some()
    }

    /// The worst known level of the iterator, or `Unknown` when none is known.
    pub fn worst<I>(levels: I) -> HealthLevel
    where
        I: IntoIterator<Item = HealthLevel>,
    {
        levels
            .into_iter()
            .filter(HealthLevel::is_known)
            .max_by_key(|level| level.severity())
            .unwrap_or(HealthLevel::Unknown)
    }
}

impl PartialOrd for HealthLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.severity(), other.severity()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            (None, None) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a canonical level name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevelName(pub String);

impl fmt::Display for UnknownLevelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a canonical health level: {:?}", self.0)
    }
}

impl std::error::Error for UnknownLevelName {}

impl FromStr for HealthLevel {
    type Err = UnknownLevelName;

    /// Strict parse of the canonical names produced by [`HealthLevel::as_str`].
    ///
    /// Use [`HealthLevel::from_raw`] for labels coming from a status source.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HealthLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| UnknownLevelName(s.to_string()))
    }
}
