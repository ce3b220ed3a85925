//! The store engine façade.
//!
//! [`SaveState`] ties the record codec, the keydir, the loader, and the
//! compactor together behind a mapping-shaped API over opaque byte
//! strings. Serialization of richer key and value types is the caller's
//! business; passing raw bytes straight through is the degenerate (and
//! fastest) case.
//!
//! A store holds one file descriptor for its lifetime. Dropping the store
//! closes it on every exit path; an explicit [`SaveState::close`] reports
//! the errors a `Drop` has to swallow.

use crate::compaction::{self, CompactionStats};
use crate::config::{OpenMode, StoreOptions};
use crate::error::{StoreError, StoreResult};
use crate::keydir::{Keydir, KeydirEntry};
use crate::loader;
use crate::record::{self, CHECKSUM_SIZE, RECORD_HEADER_SIZE};
use savestate_storage::{FileBackend, StorageBackend};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension appended to store paths that lack it.
pub const FILE_EXTENSION: &str = "savestate";

/// Point-in-time statistics for an open store.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Current file length in bytes.
    pub file_len: u64,
    /// Number of live keys.
    pub live_keys: usize,
    /// File length a compaction would leave behind.
    pub live_bytes: u64,
    /// Bytes a compaction would reclaim.
    pub reclaimable_bytes: u64,
}

/// A single-file, embedded, persistent key-value store.
///
/// # Example
///
/// ```no_run
/// use savestate_core::{OpenMode, SaveState, StoreOptions};
///
/// let mut store = SaveState::open(
///     "scores",
///     StoreOptions::new().mode(OpenMode::Create),
/// )?;
///
/// store.put(b"alice", b"120")?;
/// store.put(b"bob", b"95")?;
/// assert_eq!(store.len()?, 2);
///
/// for result in store.items()? {
///     let (key, value) = result?;
///     println!("{:?} -> {:?}", key, value);
/// }
///
/// store.close(false)?;
/// # Ok::<(), savestate_core::StoreError>(())
/// ```
#[derive(Debug)]
pub struct SaveState {
    path: PathBuf,
    options: StoreOptions,
    /// `None` once the store is closed.
    backend: Option<FileBackend>,
    keydir: Keydir,
}

impl SaveState {
    /// Opens a store at `path` with the given options.
    ///
    /// The `.savestate` extension is appended when missing. Modes `r` and
    /// `w` require the file to exist; `c` creates it when missing; `n`
    /// always starts from an empty file.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the file is missing in modes `r`/`w`
    /// - `InvalidFormat` when the file is not a savestate file
    /// - I/O and storage errors from opening or scanning the log
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let path = ensure_extension(path.as_ref());
        let exists = path.is_file();

        if options.mode.requires_existing() && !exists {
            return Err(StoreError::file_not_found(&path));
        }

        let mut backend = if options.mode == OpenMode::ReadOnly {
            FileBackend::open_read_only(&path)?
        } else {
            FileBackend::open(&path)?
        };

        if options.mode == OpenMode::New && backend.size()? > 0 {
            backend.truncate(0)?;
        }

        let keydir = if backend.size()? == 0 && options.mode.is_writable() {
            // Fresh file (or an empty leftover from an interrupted open):
            // stamp the header and start with nothing.
            backend.append(&record::encode_file_header())?;
            backend.sync()?;
            Keydir::new()
        } else {
            let (keydir, report) = loader::load(&backend, options.salvage)?;
            if let Some(truncate_to) = report.truncate_to {
                if options.mode.is_writable() {
                    backend.truncate(truncate_to)?;
                }
            }
            keydir
        };

        Ok(Self {
            path,
            options,
            backend: Some(backend),
            keydir,
        })
    }

    /// Returns the path of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name of the store file.
    #[must_use]
    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// Returns the options the store was opened with.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Whether the store has not been closed yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Returns file and keydir statistics.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let file_len = self.backend()?.size()?;
        let live_bytes = compaction::dense_len(&self.keydir);

        Ok(StoreStats {
            file_len,
            live_keys: self.keydir.len(),
            live_bytes,
            reclaimable_bytes: file_len.saturating_sub(live_bytes),
        })
    }

    /// Returns the value stored under `key`.
    ///
    /// With `verify_checksums` enabled the whole record is re-read and its
    /// CRC-32 checked before the value is returned.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the key is absent
    /// - `ChecksumMismatch` when verification is on and the record is
    ///   corrupt
    /// - `AlreadyClosed` after `close`
    pub fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.backend()?;
        let entry = *self
            .keydir
            .get(key)
            .ok_or_else(|| StoreError::key_not_found(key))?;
        self.read_value(key, &entry)
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// - `ReadOnly` in mode `r`
    /// - `InvalidKey` for an empty key
    /// - `AlreadyClosed` after `close`
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.backend()?;
        self.check_writable()?;

        let (record, checksum) = record::encode(key, value)?;
        let offset = self.backend_mut()?.append(&record)?;

        self.keydir.put(
            key.to_vec(),
            KeydirEntry {
                value_offset: offset + (RECORD_HEADER_SIZE + key.len()) as u64,
                value_size: value.len() as u32,
                checksum,
            },
        );

        Ok(())
    }

    /// Deletes `key` by appending a tombstone.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the key is absent (nothing is written)
    /// - `ReadOnly` in mode `r`
    /// - `AlreadyClosed` after `close`
    pub fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.backend()?;
        self.check_writable()?;

        if !self.keydir.contains(key) {
            return Err(StoreError::key_not_found(key));
        }

        let (record, _) = record::encode_tombstone(key)?;
        self.backend_mut()?.append(&record)?;
        self.keydir.remove(key);

        Ok(())
    }

    /// Whether `key` is present. A pure keydir lookup; no file access.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        self.backend()?;
        Ok(self.keydir.contains(key))
    }

    /// Number of live keys.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn len(&self) -> StoreResult<usize> {
        self.backend()?;
        Ok(self.keydir.len())
    }

    /// Whether the store holds no keys.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn is_empty(&self) -> StoreResult<bool> {
        self.backend()?;
        Ok(self.keydir.is_empty())
    }

    /// Iterates over keys in first-insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn keys(&self) -> StoreResult<impl Iterator<Item = &[u8]>> {
        self.backend()?;
        Ok(self.keydir.iter().map(|(key, _)| key))
    }

    /// Iterates over keys in reverse insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn keys_rev(&self) -> StoreResult<impl Iterator<Item = &[u8]>> {
        self.backend()?;
        Ok(self.keydir.iter_rev().map(|(key, _)| key))
    }

    /// Iterates over values in key insertion order.
    ///
    /// Values are fetched from the file as the iterator advances; nothing
    /// is cached in memory.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`; each item carries the read
    /// errors for its record.
    pub fn values(&self) -> StoreResult<impl Iterator<Item = StoreResult<Vec<u8>>> + '_> {
        self.backend()?;
        Ok(self
            .keydir
            .iter()
            .map(move |(key, entry)| self.read_value(key, entry)))
    }

    /// Iterates over values in reverse key insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn values_rev(&self) -> StoreResult<impl Iterator<Item = StoreResult<Vec<u8>>> + '_> {
        self.backend()?;
        Ok(self
            .keydir
            .iter_rev()
            .map(move |(key, entry)| self.read_value(key, entry)))
    }

    /// Iterates over `(key, value)` pairs in key insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn items(
        &self,
    ) -> StoreResult<impl Iterator<Item = StoreResult<(Vec<u8>, Vec<u8>)>> + '_> {
        self.backend()?;
        Ok(self
            .keydir
            .iter()
            .map(move |(key, entry)| -> StoreResult<(Vec<u8>, Vec<u8>)> {
                let value = self.read_value(key, entry)?;
                Ok((key.to_vec(), value))
            }))
    }

    /// Iterates over `(key, value)` pairs in reverse key insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`.
    pub fn items_rev(
        &self,
    ) -> StoreResult<impl Iterator<Item = StoreResult<(Vec<u8>, Vec<u8>)>> + '_> {
        self.backend()?;
        Ok(self
            .keydir
            .iter_rev()
            .map(move |(key, entry)| -> StoreResult<(Vec<u8>, Vec<u8>)> {
                let value = self.read_value(key, entry)?;
                Ok((key.to_vec(), value))
            }))
    }

    /// Removes `key` and returns its value.
    ///
    /// When the key is absent and a `default` is given, the default is
    /// returned instead and nothing is written.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the key is absent and no default is given
    /// - `ReadOnly` in mode `r`
    /// - `AlreadyClosed` after `close`
    pub fn pop(&mut self, key: &[u8], default: Option<&[u8]>) -> StoreResult<Vec<u8>> {
        self.backend()?;
        self.check_writable()?;

        if !self.keydir.contains(key) {
            return match default {
                Some(default) => Ok(default.to_vec()),
                None => Err(StoreError::key_not_found(key)),
            };
        }

        let value = self.get(key)?;
        self.delete(key)?;
        Ok(value)
    }

    /// Removes and returns the most recently inserted `(key, value)` pair.
    ///
    /// # Errors
    ///
    /// - `Empty` when no keys are live
    /// - `ReadOnly` in mode `r`
    /// - `AlreadyClosed` after `close`
    pub fn popitem(&mut self) -> StoreResult<(Vec<u8>, Vec<u8>)> {
        self.backend()?;
        self.check_writable()?;

        let (key, entry) = self
            .keydir
            .last()
            .map(|(key, entry)| (key.to_vec(), *entry))
            .ok_or(StoreError::Empty)?;

        let value = self.read_value(&key, &entry)?;

        let (record, _) = record::encode_tombstone(&key)?;
        self.backend_mut()?.append(&record)?;
        self.keydir.remove(&key);

        Ok((key, value))
    }

    /// Returns the value for `key`, inserting `default` first if absent.
    ///
    /// # Errors
    ///
    /// - `ReadOnly` in mode `r`
    /// - `AlreadyClosed` after `close`
    pub fn setdefault(&mut self, key: &[u8], default: &[u8]) -> StoreResult<Vec<u8>> {
        self.backend()?;
        self.check_writable()?;

        if let Some(entry) = self.keydir.get(key) {
            let entry = *entry;
            return self.read_value(key, &entry);
        }

        self.put(key, default)?;
        Ok(default.to_vec())
    }

    /// Stores every pair from `pairs`, in order.
    ///
    /// # Errors
    ///
    /// As [`SaveState::put`]; the first failure stops the update.
    pub fn update<K, V, I>(&mut self, pairs: I) -> StoreResult<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in pairs {
            self.put(key.as_ref(), value.as_ref())?;
        }
        Ok(())
    }

    /// Deletes every live key.
    ///
    /// The file is cut back to its header rather than tombstoned key by
    /// key; the observable result is the same and the file ends up dense.
    ///
    /// # Errors
    ///
    /// - `ReadOnly` in mode `r`
    /// - `AlreadyClosed` after `close`
    pub fn clear(&mut self) -> StoreResult<()> {
        self.backend()?;
        self.check_writable()?;

        self.backend_mut()?
            .truncate(record::FILE_HEADER_SIZE as u64)?;
        self.keydir.clear();

        Ok(())
    }

    /// Writes the live contents into a fresh store file at `new_path`.
    ///
    /// Output is dense (live records only, insertion order). The current
    /// store keeps referring to its own file.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when `new_path` resolves to this store's file
    /// - `AlreadyClosed` after `close`
    pub fn copy(&self, new_path: impl AsRef<Path>) -> StoreResult<PathBuf> {
        let backend = self.backend()?;
        let target = ensure_extension(new_path.as_ref());

        if self.is_same_file(&target)? {
            return Err(StoreError::invalid_argument(
                "copy target resolves to the store's own file",
            ));
        }

        match compaction::write_live_records(backend, &self.keydir, &target) {
            Ok((copy_backend, _)) => {
                drop(copy_backend);
                Ok(target)
            }
            Err(e) => {
                let _ = fs::remove_file(&target);
                Err(e)
            }
        }
    }

    /// Flushes buffers and forces the file to stable storage.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`, or the underlying I/O error.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.backend_mut()?.sync()?;
        Ok(())
    }

    /// Rewrites the file to contain only live records.
    ///
    /// # Errors
    ///
    /// - `ReadOnly` in mode `r`
    /// - `AlreadyClosed` after `close`
    /// - I/O errors; the original file is untouched when they occur
    pub fn compact(&mut self) -> StoreResult<CompactionStats> {
        self.backend()?;
        self.check_writable()?;

        let backend = match self.backend.take() {
            Some(backend) => backend,
            None => return Err(StoreError::AlreadyClosed),
        };

        match compaction::compact(&backend, &mut self.keydir, &self.path) {
            Ok((new_backend, stats)) => {
                self.backend = Some(new_backend);
                Ok(stats)
            }
            Err(e) => {
                // The rename never happened; keep serving the old file.
                self.backend = Some(backend);
                Err(e)
            }
        }
    }

    /// Closes the store, optionally compacting first.
    ///
    /// The descriptor is released even when compaction or the final sync
    /// fails; the error is still returned. Every later operation fails
    /// with `AlreadyClosed`.
    ///
    /// # Errors
    ///
    /// - `AlreadyClosed` when the store was closed before
    /// - Errors from compaction or the final sync
    pub fn close(&mut self, compact: bool) -> StoreResult<()> {
        if self.backend.is_none() {
            return Err(StoreError::AlreadyClosed);
        }

        let mut result = Ok(());
        if self.options.mode.is_writable() {
            if compact || self.options.compact_on_close {
                result = self.compact().map(|_| ());
            }
            if let Some(backend) = self.backend.as_mut() {
                let sync_result = backend.sync().map_err(StoreError::from);
                if result.is_ok() {
                    result = sync_result;
                }
            }
        }

        self.backend = None;
        result
    }

    /// Reads the value for `entry`, verifying the record when configured.
    fn read_value(&self, key: &[u8], entry: &KeydirEntry) -> StoreResult<Vec<u8>> {
        let backend = self.backend()?;

        if !self.options.verify_checksums {
            return Ok(backend.read_at(entry.value_offset, entry.value_size as usize)?);
        }

        let record_offset = entry.value_offset - (RECORD_HEADER_SIZE + key.len()) as u64;
        let record_len =
            RECORD_HEADER_SIZE + key.len() + entry.value_size as usize + CHECKSUM_SIZE;
        let record = backend.read_at(record_offset, record_len)?;
        record::verify(&record)?;

        let value_at = RECORD_HEADER_SIZE + key.len();
        Ok(record[value_at..record_len - CHECKSUM_SIZE].to_vec())
    }

    fn backend(&self) -> StoreResult<&FileBackend> {
        self.backend.as_ref().ok_or(StoreError::AlreadyClosed)
    }

    fn backend_mut(&mut self) -> StoreResult<&mut FileBackend> {
        self.backend.as_mut().ok_or(StoreError::AlreadyClosed)
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.options.mode.is_writable() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }

    /// Whether `target` names the same file as this store.
    fn is_same_file(&self, target: &Path) -> StoreResult<bool> {
        if target == self.path {
            return Ok(true);
        }
        if target.exists() {
            return Ok(fs::canonicalize(target)? == fs::canonicalize(&self.path)?);
        }
        Ok(false)
    }
}

impl Drop for SaveState {
    fn drop(&mut self) {
        if self.backend.is_some() {
            // Best effort: flush, optionally compact, release the file.
            let _ = self.close(false);
        }
    }
}

/// Appends the `.savestate` extension unless the path already carries it.
fn ensure_extension(path: &Path) -> PathBuf {
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(FILE_EXTENSION));

    if has_extension {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(FILE_EXTENSION);
        PathBuf::from(name)
    }
}
