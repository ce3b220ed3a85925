//! Log scan and keydir construction at open.
//!
//! The loader runs once for any existing file. It walks the log from the
//! first record, verifies each record's CRC-32, and replays the sequence
//! into a fresh [`Keydir`]: live records insert or overwrite, tombstones
//! remove.
//!
//! ## Recovery Policy
//!
//! Two kinds of damage are distinguished:
//!
//! - **Trailing partial record** (fewer bytes remain than the record
//!   claims, or fewer than a header): a crash mid-append. The scan stops
//!   and reports the position so a writable open can truncate the tail.
//! - **Mid-file corruption** (a complete record whose CRC fails): bit rot
//!   or external tampering. The loader enters *salvage mode*, scanning
//!   forward one byte at a time for the next position that parses and
//!   verifies as a record, and resumes from there. If nothing verifies
//!   before end of file, the remainder is declared lost.
//!
//! Salvage never re-feeds the skipped bytes into the keydir, and a
//! false accept is bounded by the CRC-32 collision probability. Salvage
//! can be disabled, in which case mid-file corruption is treated like a
//! trailing partial record.
//!
//! Structural damage is repaired silently (with a warning); only I/O
//! failures and a bad file header surface as errors.

use crate::error::StoreResult;
use crate::keydir::{Keydir, KeydirEntry};
use crate::record::{
    self, RecordHeader, CHECKSUM_SIZE, FILE_HEADER_SIZE, MIN_RECORD_SIZE, RECORD_HEADER_SIZE,
};
use savestate_storage::StorageBackend;
use tracing::{debug, warn};

/// Statistics from a log scan.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Records that verified and were replayed.
    pub records_applied: usize,
    /// Tombstones among the applied records.
    pub tombstones: usize,
    /// Corrupt regions encountered mid-file.
    pub corrupt_regions: usize,
    /// Bytes skipped by salvage scans.
    pub bytes_skipped: u64,
    /// Offset the file should be truncated to, when a trailing partial
    /// record (or an unsalvageable remainder) was found.
    pub truncate_to: Option<u64>,
}

/// Scans the log and builds the keydir.
///
/// The backend is not modified; when `report.truncate_to` is set, a
/// writable caller is expected to truncate the file itself. Read-only
/// callers simply ignore the tail.
///
/// # Errors
///
/// Returns `InvalidFormat` if the file header is missing or wrong, and
/// propagates I/O errors from the backend.
pub fn load(backend: &dyn StorageBackend, salvage: bool) -> StoreResult<(Keydir, LoadReport)> {
    let size = backend.size()?;

    let header = backend.read_at(0, FILE_HEADER_SIZE.min(size as usize))?;
    record::verify_file_header(&header)?;

    let mut keydir = Keydir::new();
    let mut report = LoadReport::default();
    let mut pos = FILE_HEADER_SIZE as u64;

    while pos < size {
        if size - pos < MIN_RECORD_SIZE as u64 {
            warn!(offset = pos, "partial record header at tail, truncating");
            report.truncate_to = Some(pos);
            break;
        }

        let header = RecordHeader::decode(&backend.read_at(pos, RECORD_HEADER_SIZE)?)?;
        let record_len = header.record_len();

        if pos + record_len > size {
            warn!(
                offset = pos,
                needed = record_len,
                available = size - pos,
                "partial record at tail, truncating"
            );
            report.truncate_to = Some(pos);
            break;
        }

        let record = backend.read_at(pos, record_len as usize)?;
        match record::verify(&record) {
            Ok(()) => {
                apply(&mut keydir, &mut report, &header, &record, pos);
                pos += record_len;
            }
            Err(_) => {
                report.corrupt_regions += 1;

                if !salvage {
                    warn!(offset = pos, "corrupt record, salvage disabled, truncating");
                    report.truncate_to = Some(pos);
                    break;
                }

                match scan_for_next_record(backend, pos + 1, size)? {
                    Some(next) => {
                        warn!(
                            offset = pos,
                            resumed_at = next,
                            skipped = next - pos,
                            "corrupt record, salvaged"
                        );
                        report.bytes_skipped += next - pos;
                        pos = next;
                    }
                    None => {
                        warn!(offset = pos, "corrupt record, remainder of file lost");
                        report.truncate_to = Some(pos);
                        break;
                    }
                }
            }
        }
    }

    debug!(
        records = report.records_applied,
        live_keys = keydir.len(),
        "log scan complete"
    );

    Ok((keydir, report))
}

/// Replays one verified record into the keydir.
fn apply(
    keydir: &mut Keydir,
    report: &mut LoadReport,
    header: &RecordHeader,
    record: &[u8],
    pos: u64,
) {
    report.records_applied += 1;

    let key = &record[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + header.key_size as usize];

    if header.is_tombstone() {
        report.tombstones += 1;
        keydir.remove(key);
        return;
    }

    let checksum_at = record.len() - CHECKSUM_SIZE;
    let checksum = u32::from_be_bytes([
        record[checksum_at],
        record[checksum_at + 1],
        record[checksum_at + 2],
        record[checksum_at + 3],
    ]);

    keydir.put(
        key.to_vec(),
        KeydirEntry {
            value_offset: pos + (RECORD_HEADER_SIZE + header.key_size as usize) as u64,
            value_size: header.value_size,
            checksum,
        },
    );
}

/// Byte-by-byte forward scan for the next verifiable record boundary.
///
/// Returns the offset of the first candidate whose declared length fits
/// the file and whose CRC verifies, or `None` if the scan reaches EOF.
fn scan_for_next_record(
    backend: &dyn StorageBackend,
    start: u64,
    size: u64,
) -> StoreResult<Option<u64>> {
    let mut pos = start;

    while pos + MIN_RECORD_SIZE as u64 <= size {
        let header = RecordHeader::decode(&backend.read_at(pos, RECORD_HEADER_SIZE)?)?;
        let record_len = header.record_len();

        if pos + record_len <= size {
            let candidate = backend.read_at(pos, record_len as usize)?;
            if record::verify(&candidate).is_ok() {
                return Ok(Some(pos));
            }
        }

        pos += 1;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use savestate_storage::InMemoryBackend;

    /// Builds a backend holding a file header followed by the given blobs.
    fn file_with(blobs: &[&[u8]]) -> InMemoryBackend {
        let mut data = record::encode_file_header().to_vec();
        for blob in blobs {
            data.extend_from_slice(blob);
        }
        InMemoryBackend::with_data(data)
    }

    fn put_record(key: &[u8], value: &[u8]) -> Vec<u8> {
        record::encode(key, value).unwrap().0
    }

    fn tombstone_record(key: &[u8]) -> Vec<u8> {
        record::encode_tombstone(key).unwrap().0
    }

    #[test]
    fn empty_file_loads_empty_keydir() {
        let backend = file_with(&[]);
        let (keydir, report) = load(&backend, true).unwrap();

        assert!(keydir.is_empty());
        assert_eq!(report.records_applied, 0);
        assert!(report.truncate_to.is_none());
    }

    #[test]
    fn missing_header_fails() {
        let backend = InMemoryBackend::with_data(b"sav".to_vec());
        assert!(matches!(
            load(&backend, true),
            Err(StoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn replays_puts_and_overwrites() {
        let backend = file_with(&[
            &put_record(b"a", b"1"),
            &put_record(b"b", b"2"),
            &put_record(b"a", b"3"),
        ]);
        let (keydir, report) = load(&backend, true).unwrap();

        assert_eq!(keydir.len(), 2);
        assert_eq!(report.records_applied, 3);

        // Last write wins, first-insertion order kept.
        let keys: Vec<_> = keydir.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"a"[..], b"b"]);

        let entry = keydir.get(b"a").unwrap();
        let value = backend
            .read_at(entry.value_offset, entry.value_size as usize)
            .unwrap();
        assert_eq!(value, b"3");
    }

    #[test]
    fn tombstone_removes_key() {
        let backend = file_with(&[
            &put_record(b"a", b"1"),
            &put_record(b"b", b"2"),
            &tombstone_record(b"a"),
        ]);
        let (keydir, report) = load(&backend, true).unwrap();

        assert_eq!(keydir.len(), 1);
        assert!(!keydir.contains(b"a"));
        assert!(keydir.contains(b"b"));
        assert_eq!(report.tombstones, 1);
    }

    #[test]
    fn trailing_garbage_is_truncated() {
        let record = put_record(b"a", b"1");
        let backend = file_with(&[&record, b"\xDE\xAD\xBE\xEF\x00"]);
        let (keydir, report) = load(&backend, true).unwrap();

        assert_eq!(keydir.len(), 1);
        assert_eq!(
            report.truncate_to,
            Some((FILE_HEADER_SIZE + record.len()) as u64)
        );
    }

    #[test]
    fn trailing_partial_record_is_truncated() {
        let full = put_record(b"key", b"value");
        let partial = &put_record(b"other", b"lost")[..12];
        let backend = file_with(&[&full, partial]);
        let (keydir, report) = load(&backend, true).unwrap();

        assert_eq!(keydir.len(), 1);
        assert!(keydir.contains(b"key"));
        assert_eq!(
            report.truncate_to,
            Some((FILE_HEADER_SIZE + full.len()) as u64)
        );
    }

    #[test]
    fn mid_file_corruption_salvages_later_records() {
        let first = put_record(b"k1", b"v1");
        let mut second = put_record(b"k2", b"v2");
        let third = put_record(b"k3", b"v3");

        // Flip one bit inside the second record's value.
        let flip_at = RECORD_HEADER_SIZE + 2 + 1;
        second[flip_at] ^= 0x40;

        let backend = file_with(&[&first, &second, &third]);
        let (keydir, report) = load(&backend, true).unwrap();

        assert!(keydir.contains(b"k1"));
        assert!(!keydir.contains(b"k2"));
        assert!(keydir.contains(b"k3"));
        assert_eq!(report.corrupt_regions, 1);
        assert_eq!(report.bytes_skipped, second.len() as u64);
        assert!(report.truncate_to.is_none());
    }

    #[test]
    fn corruption_with_salvage_disabled_truncates() {
        let first = put_record(b"k1", b"v1");
        let mut second = put_record(b"k2", b"v2");
        second[RECORD_HEADER_SIZE] ^= 0x01;
        let third = put_record(b"k3", b"v3");

        let backend = file_with(&[&first, &second, &third]);
        let (keydir, report) = load(&backend, false).unwrap();

        assert!(keydir.contains(b"k1"));
        assert!(!keydir.contains(b"k3"));
        assert_eq!(
            report.truncate_to,
            Some((FILE_HEADER_SIZE + first.len()) as u64)
        );
    }

    #[test]
    fn corruption_at_tail_loses_remainder() {
        let first = put_record(b"k1", b"v1");
        let mut second = put_record(b"k2", b"v2");
        let len = second.len();
        second[len - 1] ^= 0xFF; // break the stored CRC itself

        let backend = file_with(&[&first, &second]);
        let (keydir, report) = load(&backend, true).unwrap();

        assert_eq!(keydir.len(), 1);
        assert_eq!(report.corrupt_regions, 1);
        assert_eq!(
            report.truncate_to,
            Some((FILE_HEADER_SIZE + first.len()) as u64)
        );
    }

    #[test]
    fn tombstone_for_absent_key_is_harmless() {
        let backend = file_with(&[&tombstone_record(b"never")]);
        let (keydir, report) = load(&backend, true).unwrap();

        assert!(keydir.is_empty());
        assert_eq!(report.tombstones, 1);
        assert!(report.truncate_to.is_none());
    }

    #[test]
    fn delete_then_rewrite_moves_key_to_end() {
        let backend = file_with(&[
            &put_record(b"a", b"1"),
            &put_record(b"b", b"2"),
            &tombstone_record(b"a"),
            &put_record(b"a", b"3"),
        ]);
        let (keydir, _) = load(&backend, true).unwrap();

        let keys: Vec<_> = keydir.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"b"[..], b"a"]);
    }
}
