//! User-facing status texts.

pub const BATCH_STARTED: &str = "OK, send me some files.";
pub const BATCH_CANCELLED: &str = "Batch cancelled.";
pub const FINALIZE_STOPPING: &str = "Stopping the archive in progress.";
pub const NOTHING_TO_CANCEL: &str = "There is no batch to cancel.";

pub const START_FIRST: &str = "Start a batch with /add and send some files first.";
pub const STILL_WORKING: &str =
    "Your previous archive is still being prepared. Try again once it arrives.";
pub const CANCELLED: &str = "Archive cancelled. Start a new batch with /add.";
pub const TOO_SLOW: &str =
    "Building the archive took too long. Start a new batch with /add to try again.";
pub const FAILED: &str =
    "Something went wrong while building your archive. Start a new batch with /add to try again.";

/// Success text for a delivered archive.
pub fn done(entries: usize) -> String {
    if entries == 1 {
        "Done! 1 file archived.".to_string()
    } else {
        format!("Done! {} files archived.", entries)
    }
}

/// Quota violation text.
pub fn quota_exceeded(total_bytes: u64, limit_bytes: u64) -> String {
    format!(
        "These files add up to {}, over the {} limit. Start a new batch with /add.",
        format_bytes(total_bytes),
        format_bytes(limit_bytes)
    )
}

/// Human-readable size using decimal units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = next;
    }
    format!("{:.1} {}", value, unit)
}
