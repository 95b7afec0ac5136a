//! Index command: list what a capture run left on disk.

use lotus_fs::{Filesystem, SequenceIndex};

use crate::cli::IndexArgs;

use super::CommandResult;

/// Entries of both indexes, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexListing {
    pub log_entries: Vec<String>,
    pub archive_entries: Vec<String>,
}

/// Execute the index command. Missing directories list as empty.
pub fn execute_index<F: Filesystem + Clone>(args: &IndexArgs, fs: &F) -> CommandResult<IndexListing> {
    let log_entries = SequenceIndex::new(fs.clone(), &args.log_dir).entries()?;
    let archive_entries = SequenceIndex::new(fs.clone(), &args.archive_dir).entries()?;

    Ok(IndexListing {
        log_entries,
        archive_entries,
    })
}
