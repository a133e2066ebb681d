use super::ArchiveStore;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Extension appended to keys that do not carry one.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Filesystem store: one archive file per key under a root directory
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` to a file path under the root.
    ///
    /// Keys without an extension get `.zip`. Keys may contain sub-directories
    /// but no `..` or absolute components.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid archive key: {:?}", key);
        }

        let mut path = self.root.join(relative);
        if path.extension().is_none() {
            path.set_extension(ARCHIVE_EXTENSION);
        }
        Ok(path)
    }
}

async fn write_then_rename(tmp_path: &Path, path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(tmp_path)
        .await
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    file.write_all(data)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
    drop(file);

    fs::rename(tmp_path, path)
        .await
        .with_context(|| format!("Failed to move archive into {}", path.display()))
}

#[async_trait]
impl ArchiveStore for LocalFileStore {
    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        // Write next to the target and rename, so readers never see a partial archive
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        if let Err(err) = write_then_rename(&tmp_path, &path, data).await {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                debug!("Could not remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(err);
        }

        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to remove {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_adds_extension() {
        let store = LocalFileStore::new("/data/receipts");
        assert_eq!(
            store.path_for("2024/receipt-1").unwrap(),
            PathBuf::from("/data/receipts/2024/receipt-1.zip")
        );
        assert_eq!(
            store.path_for("receipt.archive").unwrap(),
            PathBuf::from("/data/receipts/receipt.archive")
        );
    }

    #[test]
    fn test_path_for_rejects_escaping_keys() {
        let store = LocalFileStore::new("/data/receipts");
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("/etc/passwd").is_err());
        assert!(store.path_for("").is_err());
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.write("nested/r1", b"archive bytes").await.unwrap();
        assert!(dir.path().join("nested/r1.zip").exists());
        assert!(!dir.path().join("nested/r1.zip.tmp").exists());
        assert_eq!(store.read("nested/r1").await.unwrap(), b"archive bytes");

        store.write("nested/r1", b"replaced").await.unwrap();
        assert_eq!(store.read("nested/r1").await.unwrap(), b"replaced");

        store.remove("nested/r1").await.unwrap();
        assert!(store.read("nested/r1").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        // A non-empty directory in the way makes the final rename fail.
        std::fs::create_dir_all(dir.path().join("r1.zip/occupied")).unwrap();

        let err = store.write("r1", b"archive bytes").await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to move archive"));
        assert!(!dir.path().join("r1.zip.tmp").exists());
        assert!(dir.path().join("r1.zip/occupied").is_dir());
    }
}
