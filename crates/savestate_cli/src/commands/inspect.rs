//! Inspect command implementation.

use savestate_core::{OpenMode, SaveState, StoreOptions};
use serde::Serialize;
use std::path::Path;

/// File statistics as reported by `inspect`.
#[derive(Debug, Serialize)]
struct InspectReport {
    path: String,
    file_len: u64,
    live_keys: usize,
    live_bytes: u64,
    reclaimable_bytes: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = SaveState::open(path, StoreOptions::new().mode(OpenMode::ReadOnly))?;
    let stats = store.stats()?;

    let report = InspectReport {
        path: store.path().display().to_string(),
        file_len: stats.file_len,
        live_keys: stats.live_keys,
        live_bytes: stats.live_bytes,
        reclaimable_bytes: stats.reclaimable_bytes,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("File:              {}", report.path);
            println!("File length:       {} bytes", report.file_len);
            println!("Live keys:         {}", report.live_keys);
            println!("Live bytes:        {} bytes", report.live_bytes);
            println!("Reclaimable:       {} bytes", report.reclaimable_bytes);
        }
    }

    Ok(())
}
