//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Buffered appends are drained to the OS once the buffer crosses this size.
const FLUSH_THRESHOLD: usize = 64 * 1024; // 64 KB

/// A file-based storage backend with buffered appends.
///
/// Appends accumulate in an in-memory buffer that is drained transparently
/// when it crosses [`FLUSH_THRESHOLD`], on `flush`/`sync`, and before
/// `truncate`. Positional reads serve unflushed bytes straight from the
/// buffer, so a caller can always read back what it just appended.
///
/// # Durability
///
/// - `flush()` drains the buffer and pushes data to the OS
/// - `sync()` additionally calls `File::sync_all()` so the data is on disk
///
/// # Thread Safety
///
/// The backend is thread-safe for shared positional reads. Internal locking
/// keeps the buffer and the file consistent; locks are always taken in
/// state-then-file order.
///
/// # Example
///
/// ```no_run
/// use savestate_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("data.savestate")).unwrap();
/// let offset = backend.append(b"persistent data").unwrap();
/// backend.sync().unwrap();  // Ensure data is durable
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    state: RwLock<BufState>,
}

#[derive(Debug)]
struct BufState {
    /// Bytes already written to the file.
    flushed: u64,
    /// Appended bytes not yet written to the file.
    buffer: Vec<u8>,
}

impl BufState {
    fn logical_size(&self) -> u64 {
        self.flushed + self.buffer.len() as u64
    }

    /// Writes the buffer at the current end of `file` and clears it.
    fn drain(&mut self, file: &mut File) -> StorageResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        file.seek(SeekFrom::Start(self.flushed))?;
        file.write_all(&self.buffer)?;
        self.flushed += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// If the file exists, it is opened for reading and writing. If it
    /// doesn't exist, a new empty file is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Self::from_file(path, file)
    }

    /// Opens an existing file backend without write access.
    ///
    /// Appends and truncation will fail at the OS level; the engine is
    /// expected to reject mutations before they reach the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, file: File) -> StorageResult<Self> {
        let flushed = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            state: RwLock::new(BufState {
                flushed,
                buffer: Vec::new(),
            }),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let state = self.state.read();
        let size = state.logical_size();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ShortRead { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut out = vec![0u8; len];

        // Portion that already reached the file.
        let disk_len = if offset < state.flushed {
            (state.flushed - offset).min(len as u64) as usize
        } else {
            0
        };

        if disk_len > 0 {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut out[..disk_len])?;
        }

        // Remainder still sits in the append buffer.
        if disk_len < len {
            let start = (offset + disk_len as u64 - state.flushed) as usize;
            out[disk_len..].copy_from_slice(&state.buffer[start..start + (len - disk_len)]);
        }

        Ok(out)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.state.write();
        let offset = state.logical_size();

        if data.is_empty() {
            return Ok(offset);
        }

        state.buffer.extend_from_slice(data);

        if state.buffer.len() >= FLUSH_THRESHOLD {
            let mut file = self.file.write();
            state.drain(&mut file)?;
        }

        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut state = self.state.write();
        let mut file = self.file.write();
        state.drain(&mut file)?;
        file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.state.read().logical_size())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut state = self.state.write();
        let mut file = self.file.write();
        state.drain(&mut file)?;
        file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.state.write();

        if new_size > state.logical_size() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size,
                    state.logical_size()
                ),
            )));
        }

        let mut file = self.file.write();
        state.drain(&mut file)?;
        file.set_len(new_size)?;
        file.sync_all()?;
        state.flushed = new_size;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();

        let offset1 = backend.append(b"hello").unwrap();
        assert_eq!(offset1, 0);

        let offset2 = backend.append(b" world").unwrap();
        assert_eq!(offset2, 5);

        assert_eq!(backend.size().unwrap(), 11);

        let data = backend.read_at(0, 11).unwrap();
        assert_eq!(&data, b"hello world");
    }

    #[test]
    fn file_read_serves_unflushed_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"buffered").unwrap();

        // Nothing reached the file yet, but the read must still succeed.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        let data = backend.read_at(0, 8).unwrap();
        assert_eq!(&data, b"buffered");
    }

    #[test]
    fn file_read_spans_flushed_and_buffered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"on disk ").unwrap();
        backend.flush().unwrap();
        backend.append(b"in buffer").unwrap();

        let data = backend.read_at(3, 10).unwrap();
        assert_eq!(&data, b"disk in bu");
    }

    #[test]
    fn file_large_append_flushes_transparently() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        let blob = vec![0xA5u8; FLUSH_THRESHOLD + 1];
        backend.append(&blob).unwrap();

        // The threshold crossing drained the buffer to the file.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), blob.len() as u64);
        assert_eq!(backend.read_at(0, blob.len()).unwrap(), blob);
    }

    #[test]
    fn file_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(10, 5);
        assert!(matches!(result, Err(StorageError::ShortRead { .. })));
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        // Write data
        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        // Reopen and read
        {
            let backend = FileBackend::open(&path).unwrap();
            assert_eq!(backend.size().unwrap(), 15);

            let data = backend.read_at(0, 15).unwrap();
            assert_eq!(&data, b"persistent data");
        }
    }

    #[test]
    fn file_truncate_drops_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"keep this, drop that").unwrap();
        backend.truncate(9).unwrap();

        assert_eq!(backend.size().unwrap(), 9);
        assert_eq!(backend.read_at(0, 9).unwrap(), b"keep this");
        assert!(matches!(
            backend.read_at(0, 10),
            Err(StorageError::ShortRead { .. })
        ));
    }

    #[test]
    fn file_truncate_beyond_size_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"short").unwrap();

        assert!(backend.truncate(100).is_err());
    }

    #[test]
    fn file_empty_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"x").unwrap();

        let offset = backend.append(b"").unwrap();
        assert_eq!(offset, 1);
        assert_eq!(backend.size().unwrap(), 1);
    }

    #[test]
    fn file_empty_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"hello").unwrap();

        let data = backend.read_at(2, 0).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn file_open_read_only_missing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");

        assert!(FileBackend::open_read_only(&path).is_err());
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.path(), path);
    }
}
