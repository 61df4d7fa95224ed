//! Persisted hysteresis counters for one (scope, entity) pair.

/// Hysteresis state for one entity as seen by one scope.
///
/// At most one of the two counters is nonzero at any time. A freshly created
/// state is inactive with both counters at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlertState {
    /// Consecutive `Down` samples seen since the last `Healthy` one.
    pub consecutive_down: u32,

    /// Consecutive `Healthy` samples seen while an outage is active.
    pub consecutive_healthy: u32,

    /// Whether an outage has been declared and not yet cleared.
    pub is_active: bool,
}

impl AlertState {
    /// An inactive state with zeroed counters.
    pub const fn new() -> Self {
        Self {
            consecutive_down: 0,
            consecutive_healthy: 0,
            is_active: false,
        }
    }

    /// True when the two counters are mutually exclusive.
    pub fn is_consistent(&self) -> bool {
        self.consecutive_down == 0 || self.consecutive_healthy == 0
    }

    /// True for the initial state (nothing worth persisting).
    pub fn is_idle(&self) -> bool {
        *self == Self::new()
    }
}
