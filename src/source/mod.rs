//! Status source abstraction.
//!
//! A source produces parsed [`Snapshot`]s and reports whether the underlying
//! payload changed since the last successful fetch. Failures never escape:
//! they are logged, remembered for [`StatusSource::error`], and reported as
//! "no update this cycle".

mod file;
mod http;

pub use file::FileSource;
pub use http::HttpSource;

use std::fmt::Debug;

use async_trait::async_trait;

use chubwatch_types::Snapshot;

/// Trait for fetching status snapshots from various sources.
///
/// # Example
///
/// ```no_run
/// use chubwatch::{FileSource, StatusSource};
///
/// # tokio_test::block_on(async {
/// let mut source = FileSource::new("status.json", ["asha", "soji"]);
/// let (snapshot, changed) = source.fetch_if_changed().await;
/// if let (Some(snapshot), true) = (snapshot, changed) {
///     println!("Got {} entities", snapshot.len());
/// }
/// # });
/// ```
#[async_trait]
pub trait StatusSource: Send + Debug {
    /// Fetch the current snapshot.
    ///
    /// Returns the cached snapshot when the payload did not change, and
    /// `None` when nothing usable could be fetched.
    async fn fetch(&mut self) -> Option<Snapshot> {
        self.fetch_if_changed().await.0
    }

    /// Fetch and report whether the payload changed.
    ///
    /// A byte-identical payload returns the cached snapshot with
    /// `changed = false` without reparsing. Any failure returns
    /// `(None, false)`.
    async fn fetch_if_changed(&mut self) -> (Option<Snapshot>, bool);

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;

    /// The error from the last fetch, if it failed.
    fn error(&self) -> Option<&str>;
}
