pub mod local;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::BuildRef;

pub use local::{FsArtifactStore, JobDirectory, LocalNode};

/// Backward traversal over completed builds of the same job.
pub trait Lineage {
    fn previous_completed(&self, build: &BuildRef) -> Option<BuildRef>;

    /// Lazily walks the chain starting before `build`.
    fn ancestors<'a>(&'a self, build: &BuildRef) -> Box<dyn Iterator<Item = BuildRef> + 'a>
    where
        Self: Sized,
    {
        let first = self.previous_completed(build);
        Box::new(std::iter::successors(first, move |current| {
            self.previous_completed(current)
        }))
    }
}

/// The machine a workspace physically lives on.
///
/// Work passed to `act` blocks on that node until it completes.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    async fn act<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static;
}

/// Named-artifact storage attached to builds.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn persist(&self, build: &BuildRef, name: &str, source: &Path) -> Result<()>;

    /// Returns the stored bytes, or `None` when nothing has landed yet.
    async fn read(&self, build: &BuildRef, name: &str) -> Result<Option<Vec<u8>>>;
}
