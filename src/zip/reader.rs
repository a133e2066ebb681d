//! Archive parsing and member extraction.
//!
//! ## Parsing Strategy
//!
//! Members are located by walking the local file headers forward from the
//! start of the buffer. Each header declares its name, extra field and
//! payload lengths, so the next header's position is always known exactly
//! and a member name appearing inside another member's payload can never
//! be mistaken for a header.
//!
//! Extraction also requires the archive to end in a central directory and
//! an end record, so a buffer cut anywhere past the last payload is still
//! rejected. Zero placeholders for the directory size and offset are
//! accepted; any other values must match where the walk ended.

use std::io::Cursor;

use log::{debug, warn};

use crate::codec::Codec;
use crate::error::{ArchiveError, Result};

use super::structures::*;
use super::writer::ARCHIVE_MARKER;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: usize = 65535;

/// Stateless reader over an immutable archive buffer.
pub struct ArchiveReader<'a> {
    data: &'a [u8],
    codec: Codec,
    verify_crc: bool,
}

impl<'a> ArchiveReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            codec: Codec::default(),
            verify_crc: true,
        }
    }

    /// Toggle the CRC-32 comparison after extraction. A mismatch is only
    /// ever logged.
    pub fn verify_crc(mut self, enabled: bool) -> Self {
        self.verify_crc = enabled;
        self
    }

    /// Offset of the first local header.
    ///
    /// Archives from [`build_archive`](super::build_archive) start with a marker that
    /// repeats the local header signature; archives from other tools start
    /// directly with a header. A real header never has "PK" at bytes 4..6,
    /// so a second signature right after the first identifies the marker.
    fn first_header_offset(&self) -> usize {
        let marker = ARCHIVE_MARKER.len();
        if self.data.len() < marker * 2 || &self.data[..marker] != ARCHIVE_MARKER {
            return 0;
        }
        let next = &self.data[marker..marker * 2];
        if next == LocalFileHeader::SIGNATURE
            || next == CentralDirectoryHeader::SIGNATURE
            || next == EndOfCentralDirectory::SIGNATURE
        {
            marker
        } else {
            0
        }
    }

    /// Iterate over local entries in archive order.
    pub fn local_entries(&self) -> LocalEntries<'a> {
        LocalEntries {
            data: self.data,
            offset: self.first_header_offset(),
            done: false,
        }
    }

    /// List every member by walking the local headers.
    ///
    /// Does not look past the last member, so it also lists archives whose
    /// central directory is missing.
    pub fn entries(&self) -> Result<Vec<LocalEntry>> {
        self.local_entries().collect()
    }

    /// Walk every local header and check that the central directory and end
    /// record follow the last member.
    pub fn complete_entries(&self) -> Result<Vec<LocalEntry>> {
        let mut walk = self.local_entries();
        let entries = walk.by_ref().collect::<Result<Vec<_>>>()?;
        let walk_end = walk.offset;

        let (eocd, eocd_offset) = self.find_eocd()?;
        if walk_end > eocd_offset {
            return Err(ArchiveError::InvalidFormat(format!(
                "local entries end at {}, past the end record at {}",
                walk_end, eocd_offset
            )));
        }

        // Older producers leave both fields zero.
        if eocd.cd_offset != 0 || eocd.cd_size != 0 {
            let cd_start = eocd.cd_offset as usize;
            let cd_end = cd_start + eocd.cd_size as usize;
            if cd_start != walk_end || cd_end != eocd_offset {
                return Err(ArchiveError::InvalidFormat(format!(
                    "central directory {}..{} does not span {}..{}",
                    cd_start, cd_end, walk_end, eocd_offset
                )));
            }
        }

        Ok(entries)
    }

    /// Locate the member called `name` in a complete archive.
    pub fn find(&self, name: &str) -> Result<LocalEntry> {
        self.complete_entries()?
            .into_iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| ArchiveError::MemberNotFound(name.to_string()))
    }

    /// Extract and decompress the member called `name`.
    pub fn extract(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.find(name)?;
        let header = &entry.header;

        if header.has_data_descriptor() && header.compressed_size == 0 {
            return Err(ArchiveError::InvalidFormat(format!(
                "{}: sizes are stored in a data descriptor, which is not supported",
                name
            )));
        }

        let payload = &self.data[entry.data_range()];
        debug!(
            "extracting {} at offset {}: {} -> {} bytes",
            name, entry.data_offset, header.compressed_size, header.uncompressed_size
        );

        let data = match header.compression_method {
            CompressionMethod::Deflate => {
                self.codec.decompress(payload, header.uncompressed_size)?
            }
            CompressionMethod::Stored => {
                if header.compressed_size != header.uncompressed_size {
                    return Err(ArchiveError::InvalidFormat(format!(
                        "{}: stored member declares {} compressed and {} uncompressed bytes",
                        name, header.compressed_size, header.uncompressed_size
                    )));
                }
                payload.to_vec()
            }
            CompressionMethod::Unknown(method) => {
                return Err(ArchiveError::InvalidFormat(format!(
                    "{}: unsupported compression method {}",
                    name, method
                )));
            }
        };

        if self.verify_crc && header.crc32 != 0 {
            let actual = crc32fast::hash(&data);
            if actual != header.crc32 {
                warn!(
                    "{}: CRC-32 mismatch (header {:08x}, data {:08x})",
                    name, header.crc32, actual
                );
            }
        }

        Ok(data)
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Handles archives with a trailing comment by searching backwards for
    /// the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in the buffer).
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, usize)> {
        let size = self.data.len();
        if size < EndOfCentralDirectory::SIZE {
            return Err(ArchiveError::InvalidFormat(
                "buffer too small for an end of central directory record".to_string(),
            ));
        }

        // Common case: no comment
        let offset = size - EndOfCentralDirectory::SIZE;
        let tail = &self.data[offset..];
        if &tail[0..4] == EndOfCentralDirectory::SIGNATURE && tail[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(tail)?, offset));
        }

        // The comment length field must match the bytes that follow the record.
        let search_start = size.saturating_sub(MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE);
        for i in (search_start..=size - EndOfCentralDirectory::SIZE).rev() {
            if &self.data[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                let comment_len = u16::from_le_bytes([self.data[i + 20], self.data[i + 21]]) as usize;
                if comment_len == size - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(&self.data[i..])?;
                    return Ok((eocd, i));
                }
            }
        }

        Err(ArchiveError::InvalidFormat(
            "end of central directory record not found".to_string(),
        ))
    }

    /// Read the central directory listing.
    pub fn central_directory(&self) -> Result<Vec<DirectoryEntry>> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let cd_start = eocd.cd_offset as usize;
        let cd_end = cd_start + eocd.cd_size as usize;
        if cd_end > eocd_offset {
            return Err(ArchiveError::InvalidFormat(format!(
                "central directory {}..{} overlaps the end record at {}",
                cd_start, cd_end, eocd_offset
            )));
        }

        let mut cursor = Cursor::new(&self.data[cd_start..cd_end]);
        let mut entries = Vec::with_capacity(eocd.total_entries as usize);

        for _ in 0..eocd.total_entries {
            let header = CentralDirectoryHeader::read_from(&mut cursor)?;

            let name_start = cursor.position() as usize;
            let name_end = name_start + header.file_name_length as usize;
            let names = cursor.get_ref();
            if name_end > names.len() {
                return Err(ArchiveError::InvalidFormat(
                    "central directory file name runs past the directory".to_string(),
                ));
            }
            let name = String::from_utf8_lossy(&names[name_start..name_end]).to_string();

            // Skip over the name, extra field and comment (we don't use them)
            let skip = header.file_name_length as u64
                + header.extra_field_length as u64
                + header.file_comment_length as u64;
            cursor.set_position(cursor.position() + skip);

            entries.push(DirectoryEntry {
                name,
                compression_method: header.compression_method,
                compressed_size: header.compressed_size,
                uncompressed_size: header.uncompressed_size,
                crc32: header.crc32,
                lfh_offset: header.lfh_offset,
            });
        }

        Ok(entries)
    }
}

/// Forward walk over local file headers.
///
/// Ends at the central directory, the end record, or the end of the buffer.
/// After the first error the iterator is exhausted.
pub struct LocalEntries<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl LocalEntries<'_> {
    fn next_entry(&mut self) -> Result<Option<LocalEntry>> {
        let remaining = &self.data[self.offset..];
        if remaining.is_empty() {
            return Ok(None);
        }
        if remaining.len() < 4 {
            return Err(ArchiveError::InvalidFormat(format!(
                "truncated record at offset {}",
                self.offset
            )));
        }

        let signature = &remaining[..4];
        if signature == CentralDirectoryHeader::SIGNATURE
            || signature == EndOfCentralDirectory::SIGNATURE
        {
            return Ok(None);
        }
        if signature != LocalFileHeader::SIGNATURE {
            return Err(ArchiveError::InvalidFormat(format!(
                "unexpected signature {:02x?} at offset {}",
                signature, self.offset
            )));
        }

        let header = LocalFileHeader::from_bytes(remaining)?;

        let name_start = LocalFileHeader::SIZE;
        let name_end = name_start + header.file_name_length as usize;
        let data_start = header.data_offset();
        let data_end = data_start + header.compressed_size as usize;
        if data_end > remaining.len() {
            return Err(ArchiveError::InvalidFormat(format!(
                "member at offset {} needs {} bytes, {} available",
                self.offset,
                data_end,
                remaining.len()
            )));
        }

        let name = String::from_utf8_lossy(&remaining[name_start..name_end]).to_string();
        let entry = LocalEntry {
            name,
            header,
            header_offset: self.offset,
            data_offset: self.offset + data_start,
        };

        self.offset += data_end;
        Ok(Some(entry))
    }
}

impl Iterator for LocalEntries<'_> {
    type Item = Result<LocalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Extract and decompress the member called `name` from `archive`.
pub fn extract_member(archive: &[u8], name: &str) -> Result<Vec<u8>> {
    ArchiveReader::new(archive).extract(name)
}
