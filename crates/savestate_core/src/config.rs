//! Open modes and store configuration.

use crate::error::{StoreError, StoreResult};

/// How a store file is opened.
///
/// | Mode | File must exist? | Created? | Truncated? | Reads | Writes |
/// |------|------------------|----------|------------|-------|--------|
/// | `ReadOnly` (`r`)  | yes | no         | no  | ✓ | ✗ |
/// | `ReadWrite` (`w`) | yes | no         | no  | ✓ | ✓ |
/// | `Create` (`c`)    | no  | if missing | no  | ✓ | ✓ |
/// | `New` (`n`)       | no  | yes        | yes | ✓ | ✓ |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Open an existing store for reading only.
    #[default]
    ReadOnly,
    /// Open an existing store for reading and writing.
    ReadWrite,
    /// Open for reading and writing, creating the file if it is missing.
    Create,
    /// Always start from an empty store, truncating any existing file.
    New,
}

impl OpenMode {
    /// Parses a mode from its one-letter flag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for anything but `"r"`, `"w"`, `"c"`, `"n"`.
    pub fn from_flag(flag: &str) -> StoreResult<Self> {
        match flag {
            "r" => Ok(Self::ReadOnly),
            "w" => Ok(Self::ReadWrite),
            "c" => Ok(Self::Create),
            "n" => Ok(Self::New),
            other => Err(StoreError::invalid_argument(format!(
                "flag must be 'r', 'w', 'c', or 'n', got {other:?}"
            ))),
        }
    }

    /// Returns the one-letter flag for this mode.
    #[must_use]
    pub const fn as_flag(self) -> char {
        match self {
            Self::ReadOnly => 'r',
            Self::ReadWrite => 'w',
            Self::Create => 'c',
            Self::New => 'n',
        }
    }

    /// Whether this mode permits mutating operations.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    /// Whether opening fails when the file does not exist.
    #[must_use]
    pub const fn requires_existing(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }
}

/// Options for opening a [`SaveState`](crate::SaveState).
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// How to open the file.
    pub mode: OpenMode,

    /// Whether `get` re-reads the whole record and verifies its CRC-32.
    pub verify_checksums: bool,

    /// Whether `close` compacts the file even when not asked to.
    pub compact_on_close: bool,

    /// Whether recovery searches past mid-file corruption for the next
    /// verifiable record. When disabled, everything from the first corrupt
    /// record onward is discarded.
    pub salvage: bool,
}

impl StoreOptions {
    /// Creates options with default values: read-only, no checksum
    /// verification, no compaction on close, salvage enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: OpenMode::ReadOnly,
            verify_checksums: false,
            compact_on_close: false,
            salvage: true,
        }
    }

    /// Sets the open mode.
    #[must_use]
    pub const fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets whether reads verify record checksums.
    #[must_use]
    pub const fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Sets whether `close` always compacts.
    #[must_use]
    pub const fn compact_on_close(mut self, value: bool) -> Self {
        self.compact_on_close = value;
        self
    }

    /// Sets whether recovery salvages past mid-file corruption.
    #[must_use]
    pub const fn salvage(mut self, value: bool) -> Self {
        self.salvage = value;
        self
    }
}
