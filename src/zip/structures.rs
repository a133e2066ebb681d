use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::error::{ArchiveError, Result};

/// Version needed to extract (2.0: DEFLATE).
pub const VERSION_NEEDED: u16 = 0x0014;
/// Version made by (MS-DOS attribute compatibility, spec 2.0).
pub const VERSION_MADE_BY: u16 = 0x0014;
/// General purpose flag bit 3: sizes and CRC follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Map a short read inside a fixed-size record to a format error.
fn truncated(record: &str) -> impl Fn(std::io::Error) -> ArchiveError + '_ {
    move |_| ArchiveError::InvalidFormat(format!("truncated {}", record))
}

/// Local File Header (LFH) - 30 bytes, followed by the file name, the extra
/// field and the compressed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;

    /// Parse the fixed part of a local file header starting at `data[0]`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ArchiveError::InvalidFormat(format!(
                "local file header needs {} bytes, {} available",
                Self::SIZE,
                data.len()
            )));
        }

        if &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::InvalidFormat(
                "invalid local file header signature".to_string(),
            ));
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        let err = truncated("local file header");

        Ok(Self {
            version_needed: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            flags: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            compression_method: CompressionMethod::from_u16(
                cursor.read_u16::<LittleEndian>().map_err(&err)?,
            ),
            last_mod_time: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            last_mod_date: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            crc32: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            compressed_size: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            uncompressed_size: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            file_name_length: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            extra_field_length: cursor.read_u16::<LittleEndian>().map_err(&err)?,
        })
    }

    /// Serialize the fixed 30-byte part (the caller appends the name).
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.last_mod_time)?;
        out.write_u16::<LittleEndian>(self.last_mod_date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.file_name_length)?;
        out.write_u16::<LittleEndian>(self.extra_field_length)?;
        Ok(())
    }

    /// Bytes between the start of the header and the start of the payload.
    pub fn data_offset(&self) -> usize {
        Self::SIZE + self.file_name_length as usize + self.extra_field_length as usize
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u32,
}

impl CentralDirectoryHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const MIN_SIZE: usize = 46;

    /// Read one header from `cursor`, leaving it positioned on the file name.
    pub fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let err = truncated("central directory header");

        let mut sig = [0u8; 4];
        std::io::Read::read_exact(cursor, &mut sig).map_err(&err)?;
        if sig != Self::SIGNATURE {
            return Err(ArchiveError::InvalidFormat(
                "invalid central directory header signature".to_string(),
            ));
        }

        Ok(Self {
            version_made_by: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            version_needed: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            flags: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            compression_method: CompressionMethod::from_u16(
                cursor.read_u16::<LittleEndian>().map_err(&err)?,
            ),
            last_mod_time: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            last_mod_date: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            crc32: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            compressed_size: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            uncompressed_size: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            file_name_length: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            extra_field_length: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            file_comment_length: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            disk_number_start: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            internal_attrs: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            external_attrs: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            lfh_offset: cursor.read_u32::<LittleEndian>().map_err(&err)?,
        })
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.version_made_by)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.last_mod_time)?;
        out.write_u16::<LittleEndian>(self.last_mod_date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.file_name_length)?;
        out.write_u16::<LittleEndian>(self.extra_field_length)?;
        out.write_u16::<LittleEndian>(self.file_comment_length)?;
        out.write_u16::<LittleEndian>(self.disk_number_start)?;
        out.write_u16::<LittleEndian>(self.internal_attrs)?;
        out.write_u32::<LittleEndian>(self.external_attrs)?;
        out.write_u32::<LittleEndian>(self.lfh_offset)?;
        Ok(())
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::InvalidFormat(
                "invalid end of central directory record".to_string(),
            ));
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        let err = truncated("end of central directory record");

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            disk_with_cd: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            disk_entries: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            total_entries: cursor.read_u16::<LittleEndian>().map_err(&err)?,
            cd_size: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            cd_offset: cursor.read_u32::<LittleEndian>().map_err(&err)?,
            comment_len: cursor.read_u16::<LittleEndian>().map_err(&err)?,
        })
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(())
    }
}

/// A member located by walking the local file headers.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub name: String,
    pub header: LocalFileHeader,
    /// Offset of the header signature from the start of the archive.
    pub header_offset: usize,
    /// Offset of the first payload byte.
    pub data_offset: usize,
}

impl LocalEntry {
    /// Range of the compressed payload within the archive.
    pub fn data_range(&self) -> std::ops::Range<usize> {
        self.data_offset..self.data_offset + self.header.compressed_size as usize
    }
}

/// A member as described by the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
    pub lfh_offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> LocalFileHeader {
        LocalFileHeader {
            version_needed: VERSION_NEEDED,
            flags: 0,
            compression_method: CompressionMethod::Deflate,
            last_mod_time: 0,
            last_mod_date: 0,
            crc32: 0xDEADBEEF,
            compressed_size: 0x0102_0304,
            uncompressed_size: 11,
            file_name_length: 9,
            extra_field_length: 0,
        }
    }

    #[test]
    fn local_header_layout_is_little_endian() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();

        assert_eq!(buf.len(), LocalFileHeader::SIZE);
        assert_eq!(&buf[0..4], b"PK\x03\x04");
        assert_eq!(&buf[4..6], &[0x14, 0x00]);
        assert_eq!(&buf[8..10], &[0x08, 0x00]);
        assert_eq!(&buf[14..18], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&buf[18..22], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[22..26], &[11, 0, 0, 0]);
        assert_eq!(&buf[26..28], &[9, 0]);
        assert_eq!(&buf[28..30], &[0, 0]);

        assert_eq!(LocalFileHeader::from_bytes(&buf).unwrap(), sample_header());
    }

    #[test]
    fn local_header_rejects_short_input() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();
        let err = LocalFileHeader::from_bytes(&buf[..29]).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidFormat(_)));
    }

    #[test]
    fn central_header_is_46_bytes() {
        let header = CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED,
            flags: 0,
            compression_method: CompressionMethod::Deflate,
            last_mod_time: 0,
            last_mod_date: 0,
            crc32: 1,
            compressed_size: 2,
            uncompressed_size: 3,
            file_name_length: 4,
            extra_field_length: 0,
            file_comment_length: 0,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: 0,
            lfh_offset: 5,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), CentralDirectoryHeader::MIN_SIZE);

        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(CentralDirectoryHeader::read_from(&mut cursor).unwrap(), header);
    }

    #[test]
    fn end_record_round_trips() {
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: 2,
            total_entries: 2,
            cd_size: 110,
            cd_offset: 4000,
            comment_len: 0,
        };
        let mut buf = Vec::new();
        eocd.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(EndOfCentralDirectory::from_bytes(&buf).unwrap(), eocd);
    }

    #[test]
    fn compression_method_codes() {
        assert_eq!(CompressionMethod::from_u16(8), CompressionMethod::Deflate);
        assert_eq!(CompressionMethod::from_u16(0), CompressionMethod::Stored);
        assert_eq!(CompressionMethod::from_u16(12).as_u16(), 12);
    }
}
