use super::ArchiveStore;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory store, for embedding and tests
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))
    }

    /// Number of stored archives. Fails once the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.blobs()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.blobs()?.is_empty())
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.blobs()?.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs()?
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("No archive stored under {:?}", key))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.blobs()?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| anyhow!("No archive stored under {:?}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_poisoned_lock_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.write("r1", b"archive").await.unwrap();
        assert_eq!(store.len().unwrap(), 1);

        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.blobs.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(store.len().is_err());
        assert!(store.is_empty().is_err());
        assert!(store.read("r1").await.is_err());
    }
}
