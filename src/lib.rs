//! # receipt-archive
//!
//! Packs a receipt photo and its thumbnail into a single ZIP-compatible
//! archive, and reads either one back.
//!
//! The core is synchronous and works on in-memory buffers:
//!
//! - [`codec`]: raw DEFLATE compression with a caller-supplied output size
//! - [`zip`]: archive construction and member extraction
//! - [`facade`]: receipt-level save/load, optionally against an
//!   [`ArchiveStore`] such as [`LocalFileStore`]
//!
//! ## Example
//!
//! ```
//! use receipt_archive::ReceiptArchiver;
//!
//! # fn main() -> Result<(), receipt_archive::ArchiveError> {
//! let archiver = ReceiptArchiver::default();
//! let saved = archiver.save_as_archive(b"\xFF\xD8photo", b"\xFF\xD8thumb")?;
//!
//! assert_eq!(archiver.load_primary(&saved.bytes)?, b"\xFF\xD8photo");
//! assert_eq!(archiver.load_thumbnail(&saved.bytes)?, b"\xFF\xD8thumb");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod codec;
pub mod error;
pub mod facade;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use codec::{Codec, CompressedBlock, compress, decompress};
pub use error::ArchiveError;
pub use facade::{
    ArchiveOptions, PRIMARY_MEMBER, ReceiptArchiver, ReceiptStore, SavedArchive, THUMBNAIL_MEMBER,
};
pub use io::{ArchiveStore, LocalFileStore, MemoryStore};
pub use zip::{ArchiveMember, ArchiveReader, ArchiveWriter, build_archive, extract_member};
