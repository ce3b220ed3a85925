//! # savestate core
//!
//! A single-file, embedded, persistent key-value store with a
//! mapping-shaped interface over opaque byte strings.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 SaveState                   │
//! │   (mapping façade, open modes, lifecycle)   │
//! └──────┬──────────────┬──────────────┬────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │   Keydir   │ │   Record   │ │ Compactor  │
//! │ (in-memory │ │   codec    │ │ (rewrite + │
//! │   index)   │ │ (CRC-32)   │ │   rename)  │
//! └────────────┘ └─────┬──────┘ └─────┬──────┘
//!                      │              │
//!                      ▼              ▼
//!              ┌─────────────────────────┐
//!              │     StorageBackend      │
//!              │  (buffered append log)  │
//!              └─────────────────────────┘
//! ```
//!
//! ## On-Disk Format
//!
//! The store is one append-only log file. An 11-byte header
//! (`b"savestate"` + format version) is followed by self-delimiting,
//! CRC-32 protected records:
//!
//! ```text
//! | key_size (4, BE) | value_size (4, BE) | key (N) | value (M) | crc32 (4, BE) |
//! ```
//!
//! A `value_size` of `0xFFFF_FFFF` marks a tombstone; no value bytes
//! follow. Writes and deletes only ever append; space is reclaimed by
//! [compaction](store::SaveState::compact).
//!
//! ## Durability
//!
//! A crash can only lose appends that were not yet synced. Recovery at
//! open truncates a partially-written tail and can skip past mid-file
//! corruption by searching for the next verifiable record boundary.
//!
//! ## Example
//!
//! ```no_run
//! use savestate_core::{OpenMode, SaveState, StoreOptions};
//!
//! let mut store = SaveState::open(
//!     "player1",
//!     StoreOptions::new().mode(OpenMode::Create),
//! )?;
//! store.put(b"position", b"12,93")?;
//! assert_eq!(store.get(b"position")?, b"12,93");
//! store.close(false)?;
//! # Ok::<(), savestate_core::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod compaction;
pub mod config;
pub mod error;
pub mod keydir;
pub mod loader;
pub mod record;
pub mod store;

pub use compaction::CompactionStats;
pub use config::{OpenMode, StoreOptions};
pub use error::{StoreError, StoreResult};
pub use keydir::{Keydir, KeydirEntry};
pub use loader::LoadReport;
pub use store::{SaveState, StoreStats, FILE_EXTENSION};

/// Current version of the savestate engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
