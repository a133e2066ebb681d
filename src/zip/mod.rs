//! ZIP-compatible archive construction and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: fixed binary records (local header, central directory
//!   header, end of central directory) with little-endian encode/decode
//! - [`writer`]: builds a complete archive from compressed members
//! - [`reader`]: walks local headers to extract members, and reads the
//!   central directory for listings
//!
//! ## Format
//!
//! Archives start with a 4-byte `PK\x03\x04` marker, followed by the local
//! header and DEFLATE payload of each member, the central directory and the
//! end of central directory record. CRC-32 values, sizes and offsets are
//! real, so third-party tools can open the result.
//!
//! ## Limitations
//!
//! - No ZIP64, encryption or multi-disk support
//! - Only STORED and DEFLATE members can be extracted
//! - Timestamps are always zero

mod reader;
mod structures;
mod writer;

pub use reader::{ArchiveReader, LocalEntries, extract_member};
pub use structures::*;
pub use writer::{ARCHIVE_MARKER, ArchiveMember, ArchiveWriter, build as build_archive};
