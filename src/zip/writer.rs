//! Archive construction.
//!
//! Layout of a finished archive:
//!
//! ```text
//! PK\x03\x04                         leading marker
//! [local header][name][payload]      one per member, in order
//! [central header][name]             one per member, in order
//! [end of central directory]
//! ```
//!
//! The leading marker is not a header. Offsets in the central directory are
//! measured from the start of the buffer and so already include it.

use std::collections::HashSet;

use log::debug;

use crate::codec::{Codec, CompressedBlock};
use crate::error::{ArchiveError, Result};

use super::structures::*;

/// Leading 4-byte marker written before the first local header.
pub const ARCHIVE_MARKER: &[u8] = LocalFileHeader::SIGNATURE;

/// A named, already-compressed archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub name: String,
    pub data: CompressedBlock,
}

impl ArchiveMember {
    pub fn new(name: impl Into<String>, data: CompressedBlock) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Collects members and serializes them into a single archive buffer.
#[derive(Debug)]
pub struct ArchiveWriter {
    codec: Codec,
    members: Vec<ArchiveMember>,
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new(Codec::default())
    }
}

impl ArchiveWriter {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            members: Vec::new(),
        }
    }

    /// Compress `data` and append it under `name`.
    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<&mut Self> {
        validate_name(name)?;
        if self.members.iter().any(|m| m.name == name) {
            return Err(ArchiveError::DuplicateMember(name.to_string()));
        }

        let block = CompressedBlock::compress(&self.codec, data)?;
        debug!(
            "compressed {}: {} -> {} bytes",
            name,
            block.uncompressed_size,
            block.compressed_size()
        );
        self.members.push(ArchiveMember::new(name, block));
        Ok(self)
    }

    /// Append an already-compressed member.
    pub fn add_member(&mut self, member: ArchiveMember) -> &mut Self {
        self.members.push(member);
        self
    }

    pub fn members(&self) -> &[ArchiveMember] {
        &self.members
    }

    /// Serialize all members into an archive buffer.
    pub fn finish(&self) -> Result<Vec<u8>> {
        build(&self.members)
    }
}

/// Names are stored as raw ASCII bytes with a 16-bit length.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.is_ascii() || name.len() > u16::MAX as usize {
        return Err(ArchiveError::InvalidMemberName(name.to_string()));
    }
    Ok(())
}

fn offset_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        ArchiveError::InvalidFormat(format!("{} of {} bytes exceeds 32-bit field", what, value))
    })
}

/// Build a complete archive from `members`, in order.
///
/// The output depends only on member order and content.
pub fn build(members: &[ArchiveMember]) -> Result<Vec<u8>> {
    let mut seen = HashSet::with_capacity(members.len());
    for member in members {
        validate_name(&member.name)?;
        if !seen.insert(member.name.as_str()) {
            return Err(ArchiveError::DuplicateMember(member.name.clone()));
        }
    }

    let entry_count = u16::try_from(members.len()).map_err(|_| {
        ArchiveError::InvalidFormat(format!("{} members exceed 16-bit count", members.len()))
    })?;

    let payload_len: usize = members
        .iter()
        .map(|m| {
            LocalFileHeader::SIZE
                + CentralDirectoryHeader::MIN_SIZE
                + 2 * m.name.len()
                + m.data.compressed.len()
        })
        .sum();
    let mut out = Vec::with_capacity(ARCHIVE_MARKER.len() + payload_len + EndOfCentralDirectory::SIZE);
    out.extend_from_slice(ARCHIVE_MARKER);

    // Local headers and payloads
    let mut central = Vec::with_capacity(members.len());
    for member in members {
        let lfh_offset = offset_u32(out.len(), "local header offset")?;
        let compressed_size = offset_u32(member.data.compressed.len(), "compressed size")?;
        let file_name_length = member.name.len() as u16;

        let header = LocalFileHeader {
            version_needed: VERSION_NEEDED,
            flags: 0,
            compression_method: CompressionMethod::Deflate,
            last_mod_time: 0,
            last_mod_date: 0,
            crc32: member.data.crc32,
            compressed_size,
            uncompressed_size: member.data.uncompressed_size,
            file_name_length,
            extra_field_length: 0,
        };
        write_record(&mut out, |w| header.write_to(w))?;
        out.extend_from_slice(member.name.as_bytes());
        out.extend_from_slice(&member.data.compressed);

        central.push(CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed: header.version_needed,
            flags: header.flags,
            compression_method: header.compression_method,
            last_mod_time: header.last_mod_time,
            last_mod_date: header.last_mod_date,
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            file_name_length,
            extra_field_length: 0,
            file_comment_length: 0,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: 0,
            lfh_offset,
        });
    }

    // Central directory
    let cd_start = out.len();
    for (header, member) in central.iter().zip(members) {
        write_record(&mut out, |w| header.write_to(w))?;
        out.extend_from_slice(member.name.as_bytes());
    }

    let eocd = EndOfCentralDirectory {
        disk_number: 0,
        disk_with_cd: 0,
        disk_entries: entry_count,
        total_entries: entry_count,
        cd_size: offset_u32(out.len() - cd_start, "central directory size")?,
        cd_offset: offset_u32(cd_start, "central directory offset")?,
        comment_len: 0,
    };
    write_record(&mut out, |w| eocd.write_to(w))?;

    debug!(
        "built archive: {} members, {} bytes, central directory at {}",
        entry_count,
        out.len(),
        cd_start
    );

    Ok(out)
}

/// Writes into a `Vec` cannot fail; keep the `io::Result` out of the API.
fn write_record<F>(out: &mut Vec<u8>, write: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
{
    write(out).map_err(|e| ArchiveError::InvalidFormat(e.to_string()))
}
