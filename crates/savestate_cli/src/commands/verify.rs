//! Verify command implementation.

use savestate_core::record::{self, RecordHeader, FILE_HEADER_SIZE, MIN_RECORD_SIZE, RECORD_HEADER_SIZE};
use savestate_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of valid records.
    pub valid_records: usize,
    /// Number of corrupt records.
    pub corrupt_records: usize,
    /// Trailing bytes that do not form a complete record.
    pub trailing_bytes: u64,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new() -> Self {
        Self {
            records_checked: 0,
            valid_records: 0,
            corrupt_records: 0,
            trailing_bytes: 0,
            errors: Vec::new(),
        }
    }

    fn is_ok(&self) -> bool {
        self.corrupt_records == 0 && self.trailing_bytes == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
///
/// Walks the whole file record by record, checking every CRC, without
/// modifying anything.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying {}", path.display());
    println!();

    let backend = FileBackend::open_read_only(path)?;
    let result = verify_file(&backend)?;

    println!(
        "  records checked: {}, valid: {}, corrupt: {}",
        result.records_checked, result.valid_records, result.corrupt_records
    );
    if result.trailing_bytes > 0 {
        println!("  trailing partial bytes: {}", result.trailing_bytes);
    }
    for error in &result.errors {
        println!("    ERROR: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed");
        Err("Verification failed".into())
    }
}

pub(crate) fn verify_file(
    backend: &dyn StorageBackend,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::new();
    let size = backend.size()?;

    let header = backend.read_at(0, FILE_HEADER_SIZE.min(size as usize))?;
    if let Err(e) = record::verify_file_header(&header) {
        result.errors.push(e.to_string());
        return Ok(result);
    }

    let mut offset = FILE_HEADER_SIZE as u64;

    while offset < size {
        if size - offset < MIN_RECORD_SIZE as u64 {
            result.trailing_bytes = size - offset;
            result.errors.push(format!(
                "partial record header at offset {offset}: {} bytes remain",
                size - offset
            ));
            break;
        }

        result.records_checked += 1;

        let header = RecordHeader::decode(&backend.read_at(offset, RECORD_HEADER_SIZE)?)?;
        let record_len = header.record_len();

        if offset + record_len > size {
            result.trailing_bytes = size - offset;
            result.errors.push(format!(
                "truncated record at offset {offset}: needs {record_len} bytes, only {} available",
                size - offset
            ));
            break;
        }

        let data = backend.read_at(offset, record_len as usize)?;
        match record::verify(&data) {
            Ok(()) => result.valid_records += 1,
            Err(e) => {
                result.corrupt_records += 1;
                result.errors.push(format!("offset {offset}: {e}"));
            }
        }

        offset += record_len;
    }

    Ok(result)
}
