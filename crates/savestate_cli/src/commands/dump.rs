//! Dump command implementation.

use savestate_core::record::{self, RecordHeader, FILE_HEADER_SIZE, MIN_RECORD_SIZE, RECORD_HEADER_SIZE};
use savestate_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Longest key preview printed per record.
const KEY_PREVIEW_LEN: usize = 32;

/// Runs the dump command, listing records in file order.
pub fn run(path: &Path, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let backend = FileBackend::open_read_only(path)?;
    let size = backend.size()?;

    let header = backend.read_at(0, FILE_HEADER_SIZE.min(size as usize))?;
    record::verify_file_header(&header)?;

    let mut offset = FILE_HEADER_SIZE as u64;
    let mut dumped = 0usize;
    let limit = limit.unwrap_or(usize::MAX);

    while offset < size && dumped < limit {
        if size - offset < MIN_RECORD_SIZE as u64 {
            println!("{offset:>10}  <partial header: {} bytes>", size - offset);
            break;
        }

        let header = RecordHeader::decode(&backend.read_at(offset, RECORD_HEADER_SIZE)?)?;
        let record_len = header.record_len();

        if offset + record_len > size {
            println!(
                "{offset:>10}  <truncated record: needs {record_len} bytes, {} available>",
                size - offset
            );
            break;
        }

        let data = backend.read_at(offset, record_len as usize)?;
        let key = &data[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + header.key_size as usize];
        let status = match record::verify(&data) {
            Ok(()) => "ok",
            Err(_) => "CORRUPT",
        };

        if header.is_tombstone() {
            println!("{offset:>10}  DEL {:<34} [{status}]", key_preview(key));
        } else {
            println!(
                "{offset:>10}  PUT {:<34} {} bytes [{status}]",
                key_preview(key),
                header.value_size
            );
        }

        offset += record_len;
        dumped += 1;
    }

    Ok(())
}

fn key_preview(key: &[u8]) -> String {
    let text = String::from_utf8_lossy(key);
    if text.chars().count() > KEY_PREVIEW_LEN {
        let prefix: String = text.chars().take(KEY_PREVIEW_LEN).collect();
        format!("{prefix:?}...")
    } else {
        format!("{text:?}")
    }
}
