//! Entry naming for rotated log files and archives.
//!
//! Both share the shape `{ordinal}_{YYYY-MM-DD-HH-MM-SS}.{ext}`. The ordinal of a
//! log file counts within the current batch; the ordinal of an archive counts
//! across the whole lifetime of the archive directory.

use lotus_clock::format_entry_timestamp;

/// Name of the sequence index file kept in each directory.
pub const INDEX_FILE: &str = "index";

/// Extension of rotated log files.
pub const LOG_EXTENSION: &str = "log";

/// Extension of archive bundles.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Build `{ordinal}_{timestamp}.{extension}`.
pub fn entry_filename(ordinal: u64, unix_sec: u64, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        ordinal,
        format_entry_timestamp(unix_sec),
        extension
    )
}

/// Name of the `ordinal`-th log file of a batch.
pub fn log_filename(ordinal: u64, unix_sec: u64) -> String {
    entry_filename(ordinal, unix_sec, LOG_EXTENSION)
}

/// Name of the `ordinal`-th archive.
pub fn archive_filename(ordinal: u64, unix_sec: u64) -> String {
    entry_filename(ordinal, unix_sec, ARCHIVE_EXTENSION)
}
