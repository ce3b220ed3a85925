//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level storage backend for savestate.
///
/// Storage backends are **opaque byte stores**. They provide simple
/// operations for appending, reading, and flushing data. The engine owns
/// all file format interpretation - backends do not understand records,
/// tombstones, or the keydir.
///
/// # Invariants
///
/// - `append` returns the logical offset where the data will land; offsets
///   are monotonically increasing and contiguous
/// - `read_at` returns exactly the bytes previously appended at that offset,
///   whether or not they have been flushed yet
/// - After `sync` returns, all appended data is durable on stable storage
/// - Backends must be `Send + Sync` so tooling can share references
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the current logical size (`ShortRead`)
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the logical offset at which the data will land. The data may
    /// sit in an internal buffer until `flush`/`sync` or until the buffer
    /// crosses its flush threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs while draining the buffer.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes all buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current logical size of the storage in bytes.
    ///
    /// This is the offset where the next `append` will write, counting
    /// buffered bytes that have not yet reached the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Forces all data to durable storage.
    ///
    /// This is a stronger guarantee than `flush` - it drains the buffer and
    /// then performs the platform file-sync, returning only once the data
    /// is on stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// Buffered data is flushed first, then everything past `new_size` is
    /// discarded. Used by recovery to drop a trailing partial record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `new_size` is greater than the current size
    /// - The truncation fails
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
