//! Offline compaction: rewrite the log to live records only.
//!
//! Compaction produces a dense sibling file containing exactly one record
//! per live keydir entry, in keydir order, then atomically renames it over
//! the original. The keydir is repointed at the new offsets afterwards.
//!
//! ## Invariants
//!
//! - Compaction never changes the observable mapping
//! - The original file is untouched until the rename succeeds
//! - The scratch file is removed on any failure before the rename
//! - The output length is exactly the file header plus the sum of the
//!   encoded live records

use crate::error::StoreResult;
use crate::keydir::{Keydir, KeydirEntry};
use crate::record::{self, FILE_HEADER_SIZE, RECORD_HEADER_SIZE};
use savestate_storage::{FileBackend, StorageBackend};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Result of a compaction run.
#[derive(Debug, Clone)]
pub struct CompactionStats {
    /// Live records written to the new file.
    pub records_written: usize,
    /// File length before compaction.
    pub input_len: u64,
    /// File length after compaction.
    pub output_len: u64,
    /// Bytes reclaimed by the rewrite.
    pub bytes_reclaimed: u64,
}

/// Rewrites the store at `path` to contain only live records.
///
/// `source` is the currently open backend for `path`; on success a backend
/// for the replacement file is returned and `keydir` points at the new
/// offsets. On failure the original file and keydir are untouched.
///
/// # Errors
///
/// Propagates I/O and codec failures; the scratch file is unlinked first.
pub fn compact(
    source: &dyn StorageBackend,
    keydir: &mut Keydir,
    path: &Path,
) -> StoreResult<(FileBackend, CompactionStats)> {
    let input_len = source.size()?;
    let scratch = scratch_path(path);

    let (scratch_backend, new_entries) = match write_live_records(source, keydir, &scratch) {
        Ok(result) => result,
        Err(e) => {
            let _ = fs::remove_file(&scratch);
            return Err(e);
        }
    };

    let output_len = scratch_backend.size()?;

    // Release the scratch descriptor before the rename takes its place.
    drop(scratch_backend);

    if let Err(e) = fs::rename(&scratch, path) {
        let _ = fs::remove_file(&scratch);
        return Err(e.into());
    }
    sync_parent_dir(path)?;

    let backend = FileBackend::open(path)?;

    for (key, entry) in new_entries {
        keydir.put(key, entry);
    }

    let stats = CompactionStats {
        records_written: keydir.len(),
        input_len,
        output_len,
        bytes_reclaimed: input_len.saturating_sub(output_len),
    };

    debug!(
        records = stats.records_written,
        reclaimed = stats.bytes_reclaimed,
        "compaction complete"
    );

    Ok((backend, stats))
}

/// Writes a fresh store file at `target` holding the live contents of
/// `source` in keydir order.
///
/// Returns the synced backend for the new file together with the keydir
/// entries matching the new record offsets. Shared by [`compact`] and the
/// engine's `copy`.
///
/// # Errors
///
/// Propagates I/O and codec failures. The caller is responsible for
/// removing a half-written target.
pub(crate) fn write_live_records(
    source: &dyn StorageBackend,
    keydir: &Keydir,
    target: &Path,
) -> StoreResult<(FileBackend, Vec<(Vec<u8>, KeydirEntry)>)> {
    let mut backend = FileBackend::open(target)?;
    if backend.size()? > 0 {
        backend.truncate(0)?;
    }
    backend.append(&record::encode_file_header())?;

    let mut new_entries = Vec::with_capacity(keydir.len());

    for (key, entry) in keydir.iter() {
        let value = source.read_at(entry.value_offset, entry.value_size as usize)?;
        let (record, checksum) = record::encode(key, &value)?;
        let offset = backend.append(&record)?;

        new_entries.push((
            key.to_vec(),
            KeydirEntry {
                value_offset: offset + (RECORD_HEADER_SIZE + key.len()) as u64,
                value_size: entry.value_size,
                checksum,
            },
        ));
    }

    backend.sync()?;

    Ok((backend, new_entries))
}

/// Names a scratch file next to `path`.
fn scratch_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.{}.compact", Uuid::new_v4()))
}

/// Fsyncs the directory containing `path` so the rename is durable.
///
/// On Windows, directory fsync is not supported; the NTFS journal gives
/// equivalent metadata durability.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> StoreResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = fs::File::open(parent)?;
    dir.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> StoreResult<()> {
    Ok(())
}

/// Expected file length after compacting the given keydir.
#[must_use]
pub(crate) fn dense_len(keydir: &Keydir) -> u64 {
    let records: u64 = keydir
        .iter()
        .map(|(key, entry)| {
            (RECORD_HEADER_SIZE + record::CHECKSUM_SIZE + key.len()) as u64
                + u64::from(entry.value_size)
        })
        .sum();
    FILE_HEADER_SIZE as u64 + records
}
