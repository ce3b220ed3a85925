//! Compact command implementation.

use savestate_core::{OpenMode, SaveState, StoreOptions};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if dry_run {
        let store = SaveState::open(path, StoreOptions::new().mode(OpenMode::ReadOnly))?;
        let stats = store.stats()?;

        println!("Dry run: {}", store.path().display());
        println!("  would keep {} live keys", stats.live_keys);
        println!(
            "  would shrink {} -> {} bytes (reclaiming {})",
            stats.file_len, stats.live_bytes, stats.reclaimable_bytes
        );
        return Ok(());
    }

    let mut store = SaveState::open(path, StoreOptions::new().mode(OpenMode::ReadWrite))?;
    let stats = store.compact()?;
    store.close(false)?;

    println!("Compacted {}", path.display());
    println!("  records written: {}", stats.records_written);
    println!(
        "  {} -> {} bytes (reclaimed {})",
        stats.input_len, stats.output_len, stats.bytes_reclaimed
    );

    Ok(())
}
