//! Backing store trait for the object archive

use async_trait::async_trait;
use lexsync_common::Result;

/// Object store the archive client runs against
///
/// The filesystem implementation backs local and testing environments; a
/// bucket-backed implementation slots in behind the same trait for deployed
/// environments.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Paths of objects directly under a prefix, sorted ascending.
    /// A prefix with no objects yields an empty list.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read an object's content
    async fn get(&self, path: &str) -> Result<String>;

    /// Write an object, replacing any previous content
    async fn put(&self, path: &str, content: &str) -> Result<()>;

    /// Whether an object exists
    async fn exists(&self, path: &str) -> Result<bool>;
}
