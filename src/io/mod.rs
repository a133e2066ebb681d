mod local;
mod memory;

pub use local::LocalFileStore;
pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;

/// Storage collaborator that keeps archives as opaque blobs.
///
/// Keys identify one stored archive each. Writes replace the whole blob;
/// archives are never modified in place.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous blob.
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read the complete blob stored under `key`.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the blob stored under `key`.
    async fn remove(&self, key: &str) -> Result<()>;
}
