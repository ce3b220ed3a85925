//! Record codec and on-disk format constants.
//!
//! ## File Header
//!
//! ```text
//! | magic (9) = "savestate" | format_version (2, BE) |
//! ```
//!
//! ## Record Format
//!
//! ```text
//! | key_size (4, BE) | value_size (4, BE) | key (N) | value (M) | crc32 (4, BE) |
//! ```
//!
//! `value_size == 0xFFFF_FFFF` marks a tombstone and no value bytes follow.
//! The checksum is CRC-32 (IEEE) over everything before it: both size
//! fields, the key, and the value.
//!
//! ## Invariants
//!
//! - Records are self-delimiting: the header alone determines the length
//! - Records are never modified after being written
//! - `key_size >= 1` for every written record
//! - A zero `value_size` is a legal, empty live value

use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying a savestate file.
pub const FILE_MAGIC: [u8; 9] = *b"savestate";

/// Current file format version.
pub const FORMAT_VERSION: u16 = 1;

/// File header size.
/// magic (9) + version (2) = 11 bytes
pub const FILE_HEADER_SIZE: usize = 11;

/// Record header size.
/// key_size (4) + value_size (4) = 8 bytes
pub const RECORD_HEADER_SIZE: usize = 8;

/// CRC size.
pub const CHECKSUM_SIZE: usize = 4;

/// Smallest possible record: a tombstone with an empty key.
pub const MIN_RECORD_SIZE: usize = RECORD_HEADER_SIZE + CHECKSUM_SIZE;

/// The `value_size` sentinel marking a deletion.
pub const TOMBSTONE: u32 = u32::MAX;

/// Computes the CRC-32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// A decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Length of the key bytes.
    pub key_size: u32,
    /// Length of the value bytes, or [`TOMBSTONE`].
    pub value_size: u32,
}

impl RecordHeader {
    /// Decodes a header from the first [`RECORD_HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if fewer than 8 bytes are given.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(StoreError::invalid_format(format!(
                "record header needs {RECORD_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        Ok(Self {
            key_size: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            value_size: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    /// Encodes the header into its on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        out[..4].copy_from_slice(&self.key_size.to_be_bytes());
        out[4..].copy_from_slice(&self.value_size.to_be_bytes());
        out
    }

    /// Whether this record marks a deletion.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.value_size == TOMBSTONE
    }

    /// Length of the value bytes on disk (zero for tombstones).
    #[must_use]
    pub const fn value_len(&self) -> u64 {
        if self.is_tombstone() {
            0
        } else {
            self.value_size as u64
        }
    }

    /// Total on-disk length of the record this header describes.
    #[must_use]
    pub const fn record_len(&self) -> u64 {
        (RECORD_HEADER_SIZE + CHECKSUM_SIZE) as u64 + self.key_size as u64 + self.value_len()
    }
}

/// Encodes a live record.
///
/// Returns the full on-disk bytes and the checksum that was appended.
///
/// # Errors
///
/// - `InvalidKey` if the key is empty
/// - `InvalidArgument` if the key or value length does not fit the format
pub fn encode(key: &[u8], value: &[u8]) -> StoreResult<(Vec<u8>, u32)> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey);
    }

    let key_size = u32::try_from(key.len())
        .map_err(|_| StoreError::invalid_argument("key longer than 4 GiB"))?;

    // The sentinel itself must stay unused by live values.
    let value_size = u32::try_from(value.len())
        .ok()
        .filter(|&len| len != TOMBSTONE)
        .ok_or_else(|| StoreError::invalid_argument("value too long for the record format"))?;

    let header = RecordHeader {
        key_size,
        value_size,
    };

    let mut out =
        Vec::with_capacity(RECORD_HEADER_SIZE + key.len() + value.len() + CHECKSUM_SIZE);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(key);
    out.extend_from_slice(value);

    let checksum = compute_crc32(&out);
    out.extend_from_slice(&checksum.to_be_bytes());

    Ok((out, checksum))
}

/// Encodes a tombstone for `key`.
///
/// # Errors
///
/// - `InvalidKey` if the key is empty
/// - `InvalidArgument` if the key length does not fit the format
pub fn encode_tombstone(key: &[u8]) -> StoreResult<(Vec<u8>, u32)> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey);
    }

    let key_size = u32::try_from(key.len())
        .map_err(|_| StoreError::invalid_argument("key longer than 4 GiB"))?;

    let header = RecordHeader {
        key_size,
        value_size: TOMBSTONE,
    };

    let mut out = Vec::with_capacity(RECORD_HEADER_SIZE + key.len() + CHECKSUM_SIZE);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(key);

    let checksum = compute_crc32(&out);
    out.extend_from_slice(&checksum.to_be_bytes());

    Ok((out, checksum))
}

/// Verifies the trailing CRC-32 of a complete record.
///
/// # Errors
///
/// - `InvalidFormat` if the slice is shorter than [`MIN_RECORD_SIZE`]
/// - `ChecksumMismatch` if the stored and computed checksums differ
pub fn verify(record: &[u8]) -> StoreResult<()> {
    if record.len() < MIN_RECORD_SIZE {
        return Err(StoreError::invalid_format(format!(
            "record needs at least {MIN_RECORD_SIZE} bytes, got {}",
            record.len()
        )));
    }

    let body_len = record.len() - CHECKSUM_SIZE;
    let stored = u32::from_be_bytes([
        record[body_len],
        record[body_len + 1],
        record[body_len + 2],
        record[body_len + 3],
    ]);
    let computed = compute_crc32(&record[..body_len]);

    if stored != computed {
        return Err(StoreError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }

    Ok(())
}

/// Encodes the file header.
#[must_use]
pub fn encode_file_header() -> [u8; FILE_HEADER_SIZE] {
    let mut out = [0u8; FILE_HEADER_SIZE];
    out[..FILE_MAGIC.len()].copy_from_slice(&FILE_MAGIC);
    out[FILE_MAGIC.len()..].copy_from_slice(&FORMAT_VERSION.to_be_bytes());
    out
}

/// Verifies the file header of an existing store.
///
/// # Errors
///
/// Returns `InvalidFormat` if the header is short, the magic does not
/// match, or the version is newer than this build understands.
pub fn verify_file_header(bytes: &[u8]) -> StoreResult<()> {
    if bytes.len() < FILE_HEADER_SIZE {
        return Err(StoreError::invalid_format(format!(
            "file too short for header: {} bytes",
            bytes.len()
        )));
    }

    if bytes[..FILE_MAGIC.len()] != FILE_MAGIC {
        return Err(StoreError::invalid_format("not a savestate file"));
    }

    let version = u16::from_be_bytes([bytes[FILE_MAGIC.len()], bytes[FILE_MAGIC.len() + 1]]);
    if version > FORMAT_VERSION {
        return Err(StoreError::invalid_format(format!(
            "unsupported format version {version} (can handle up to {FORMAT_VERSION})"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_value() {
        // Known test vector: "123456789" should give 0xCBF43926
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn encode_layout() {
        let (record, checksum) = encode(b"foo", b"bar").unwrap();

        assert_eq!(record.len(), 8 + 3 + 3 + 4);
        assert_eq!(&record[..4], &3u32.to_be_bytes());
        assert_eq!(&record[4..8], &3u32.to_be_bytes());
        assert_eq!(&record[8..11], b"foo");
        assert_eq!(&record[11..14], b"bar");
        assert_eq!(&record[14..], &checksum.to_be_bytes());
    }

    #[test]
    fn encode_empty_value() {
        let (record, _) = encode(b"key", b"").unwrap();
        let header = RecordHeader::decode(&record).unwrap();

        assert_eq!(header.value_size, 0);
        assert!(!header.is_tombstone());
        assert_eq!(header.record_len(), record.len() as u64);
    }

    #[test]
    fn encode_rejects_empty_key() {
        assert!(matches!(encode(b"", b"v"), Err(StoreError::InvalidKey)));
        assert!(matches!(
            encode_tombstone(b""),
            Err(StoreError::InvalidKey)
        ));
    }

    #[test]
    fn tombstone_layout() {
        let (record, _) = encode_tombstone(b"gone").unwrap();

        assert_eq!(record.len(), 8 + 4 + 4);
        let header = RecordHeader::decode(&record).unwrap();
        assert!(header.is_tombstone());
        assert_eq!(header.value_len(), 0);
        assert_eq!(header.record_len(), record.len() as u64);
    }

    #[test]
    fn verify_accepts_valid_records() {
        let (record, _) = encode(b"k", b"some value").unwrap();
        verify(&record).unwrap();

        let (tombstone, _) = encode_tombstone(b"k").unwrap();
        verify(&tombstone).unwrap();
    }

    #[test]
    fn verify_detects_bit_flip() {
        let (mut record, _) = encode(b"k", b"some value").unwrap();
        record[10] ^= 0x01;

        assert!(matches!(
            verify(&record),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn verify_rejects_short_slice() {
        assert!(matches!(
            verify(&[0u8; MIN_RECORD_SIZE - 1]),
            Err(StoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn header_round_trip() {
        let header = RecordHeader {
            key_size: 42,
            value_size: 7,
        };
        assert_eq!(RecordHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn file_header_round_trip() {
        verify_file_header(&encode_file_header()).unwrap();
    }

    #[test]
    fn file_header_rejects_bad_magic() {
        let mut header = encode_file_header();
        header[0] = b'X';

        assert!(matches!(
            verify_file_header(&header),
            Err(StoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn file_header_rejects_future_version() {
        let mut header = encode_file_header();
        header[FILE_MAGIC.len()..].copy_from_slice(&(FORMAT_VERSION + 1).to_be_bytes());

        assert!(matches!(
            verify_file_header(&header),
            Err(StoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn file_header_rejects_truncated() {
        assert!(matches!(
            verify_file_header(b"saves"),
            Err(StoreError::InvalidFormat { .. })
        ));
    }
}
