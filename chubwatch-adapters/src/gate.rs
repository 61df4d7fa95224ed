//! Change detection on raw status bodies.

use chubwatch_types::Snapshot;

/// Remembers the last raw body and the snapshot parsed from it.
///
/// The upstream document changes far less often than it is polled, so an
/// identical body short-circuits to the cached snapshot without reparsing.
#[derive(Debug, Default, Clone)]
pub struct ChangeGate {
    last_body: Option<Vec<u8>>,
    last_snapshot: Option<Snapshot>,
}

impl ChangeGate {
    /// Create an empty gate. The first observed body always counts as changed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a freshly fetched body through the gate.
    ///
    /// Returns the snapshot for this body and whether it differs from the last
    /// successfully parsed one. An unchanged body yields the cached snapshot
    /// and `false` without calling `parse`. A body that fails to parse yields
    /// `(None, false)` and leaves the cache untouched, so the next identical
    /// body is parsed again.
    pub fn observe<F>(&mut self, body: &[u8], parse: F) -> (Option<Snapshot>, bool)
    where
        F: FnOnce(&[u8]) -> Option<Snapshot>,
    {
        if self.last_body.as_deref() == Some(body) {
            return (self.last_snapshot.clone(), false);
        }

        match parse(body) {
            Some(snapshot) => {
                self.last_body = Some(body.to_vec());
                self.last_snapshot = Some(snapshot.clone());
                (Some(snapshot), true)
            }
            None => (None, false),
        }
    }

    /// The snapshot from the last successfully parsed body.
    pub fn cached(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    /// Forget the cached body so the next observation is reparsed.
    pub fn reset(&mut self) {
        self.last_body = None;
        self.last_snapshot = None;
    }
}
