//! Receipt-level entry points.
//!
//! [`ReceiptArchiver`] packs a photo and its thumbnail into one archive and
//! reads either back. [`ReceiptStore`] does the same against an
//! [`ArchiveStore`], moving the CPU-bound work off the async runtime.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::codec::{Codec, CompressedBlock, DEFAULT_LEVEL};
use crate::error::ArchiveError;
use crate::io::ArchiveStore;
use crate::zip::{ARCHIVE_MARKER, ArchiveMember, ArchiveReader, build_archive};

/// Member name of the full-resolution photo.
pub const PRIMARY_MEMBER: &str = "image.jpg";
/// Member name of the thumbnail.
pub const THUMBNAIL_MEMBER: &str = "thumbnail.jpg";

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Settings for building and opening receipt archives.
#[derive(Clone, Debug)]
pub struct ArchiveOptions {
    /// DEFLATE level, 0-9.
    pub compression_level: u32,

    /// Member name used for the full-resolution photo.
    pub primary_member: String,

    /// Member name used for the thumbnail.
    pub thumbnail_member: String,

    /// When a stored blob is not an archive at all, hand it back unchanged
    /// as the image (receipts saved before archiving was introduced).
    pub raw_fallback: bool,

    /// Compare member CRC-32 values after extraction (mismatches are logged).
    pub verify_crc: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_LEVEL,
            primary_member: PRIMARY_MEMBER.to_string(),
            thumbnail_member: THUMBNAIL_MEMBER.to_string(),
            raw_fallback: true,
            verify_crc: true,
        }
    }
}

/// Result of packing a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArchive {
    /// The complete archive.
    pub bytes: Vec<u8>,
    /// Size of the original photo.
    pub primary_size: u32,
    /// Size of the original thumbnail.
    pub thumbnail_size: u32,
    /// Size of the archive.
    pub compressed_size: usize,
}

impl SavedArchive {
    /// Archive size relative to the combined input size.
    pub fn ratio(&self) -> f64 {
        let original = self.primary_size as u64 + self.thumbnail_size as u64;
        if original == 0 {
            return 1.0;
        }
        self.compressed_size as f64 / original as f64
    }
}

fn has_jpeg_soi(data: &[u8]) -> bool {
    data.starts_with(&JPEG_SOI)
}

/// Packs and unpacks receipt archives in memory.
#[derive(Clone, Debug, Default)]
pub struct ReceiptArchiver {
    options: ArchiveOptions,
}

impl ReceiptArchiver {
    pub fn new(options: ArchiveOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Compress both images and build the archive.
    pub fn save_as_archive(
        &self,
        primary: &[u8],
        thumbnail: &[u8],
    ) -> Result<SavedArchive, ArchiveError> {
        let codec = Codec::new(self.options.compression_level);
        let primary_block = CompressedBlock::compress(&codec, primary)?;
        let thumbnail_block = CompressedBlock::compress(&codec, thumbnail)?;

        let primary_size = primary_block.uncompressed_size;
        let thumbnail_size = thumbnail_block.uncompressed_size;

        let bytes = build_archive(&[
            ArchiveMember::new(self.options.primary_member.as_str(), primary_block),
            ArchiveMember::new(self.options.thumbnail_member.as_str(), thumbnail_block),
        ])?;

        debug!(
            "packed receipt: photo {} bytes, thumbnail {} bytes, archive {} bytes",
            primary_size,
            thumbnail_size,
            bytes.len()
        );

        Ok(SavedArchive {
            compressed_size: bytes.len(),
            bytes,
            primary_size,
            thumbnail_size,
        })
    }

    /// Extract the full-resolution photo.
    pub fn load_primary(&self, archive: &[u8]) -> Result<Vec<u8>, ArchiveError> {
        self.load_member(archive, &self.options.primary_member)
    }

    /// Extract the thumbnail.
    pub fn load_thumbnail(&self, archive: &[u8]) -> Result<Vec<u8>, ArchiveError> {
        self.load_member(archive, &self.options.thumbnail_member)
    }

    fn load_member(&self, archive: &[u8], name: &str) -> Result<Vec<u8>, ArchiveError> {
        let data = ArchiveReader::new(archive)
            .verify_crc(self.options.verify_crc)
            .extract(name)?;

        // Diagnostic only: slightly malformed images are still returned.
        if !has_jpeg_soi(&data) {
            warn!("{}: extracted data does not start with a JPEG SOI marker", name);
        }

        Ok(data)
    }

    /// Apply the raw-image fallback to a failed extraction.
    ///
    /// Only blobs that do not begin with the archive signature qualify; a
    /// damaged archive is never handed out as an image.
    fn recover(&self, blob: Vec<u8>, name: &str, err: ArchiveError) -> Result<Vec<u8>, ArchiveError> {
        if self.options.raw_fallback && err.is_unreadable() && !blob.starts_with(ARCHIVE_MARKER) {
            warn!("{}: archive unreadable ({}), using stored bytes as raw image", name, err);
            return Ok(blob);
        }
        warn!("{}: archive unreadable: {}", name, err);
        Err(err)
    }
}

/// Receipt archives persisted through an [`ArchiveStore`].
pub struct ReceiptStore<S: ArchiveStore> {
    store: Arc<S>,
    archiver: ReceiptArchiver,
}

impl<S: ArchiveStore> ReceiptStore<S> {
    pub fn new(store: Arc<S>, options: ArchiveOptions) -> Self {
        Self {
            store,
            archiver: ReceiptArchiver::new(options),
        }
    }

    pub fn archiver(&self) -> &ReceiptArchiver {
        &self.archiver
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Pack both images on a blocking worker and store the archive.
    pub async fn save(&self, key: &str, primary: Vec<u8>, thumbnail: Vec<u8>) -> Result<SavedArchive> {
        let archiver = self.archiver.clone();
        let saved = tokio::task::spawn_blocking(move || archiver.save_as_archive(&primary, &thumbnail))
            .await
            .context("Archive worker panicked")?
            .with_context(|| format!("Failed to build archive {}", key))?;

        self.store.write(key, &saved.bytes).await?;
        Ok(saved)
    }

    /// Read the full-resolution photo stored under `key`.
    pub async fn open_primary(&self, key: &str) -> Result<Vec<u8>> {
        let name = self.archiver.options().primary_member.clone();
        self.open(key, name).await
    }

    /// Read the thumbnail stored under `key`.
    pub async fn open_thumbnail(&self, key: &str) -> Result<Vec<u8>> {
        let name = self.archiver.options().thumbnail_member.clone();
        self.open(key, name).await
    }

    async fn open(&self, key: &str, name: String) -> Result<Vec<u8>> {
        let blob = self.store.read(key).await?;
        let archiver = self.archiver.clone();

        let data = tokio::task::spawn_blocking(move || match archiver.load_member(&blob, &name) {
            Ok(data) => Ok(data),
            Err(err) => archiver.recover(blob, &name, err),
        })
        .await
        .context("Archive worker panicked")?
        .with_context(|| format!("Failed to open archive {}", key))?;

        Ok(data)
    }

    /// Delete the archive stored under `key`.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key).await
    }
}
