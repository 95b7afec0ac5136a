//! Command orchestration for CLI subcommands.
//!
//! Provides execute functions for:
//! - `collect` - Run a capture session until interrupted
//! - `index` - List the log and archive indexes

pub mod collect;
pub mod index;

pub use collect::{execute_collect, CollectResult, StopReason};
pub use index::{execute_index, IndexListing};

use crate::cli::CliError;
use crate::collector::ControllerError;
use crate::source::SourceError;
use lotus_fs::FsError;
use thiserror::Error;

/// Errors from command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CliError),

    #[error("stream source error: {0}")]
    Source(#[from] SourceError),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] FsError),

    #[error("collector error: {0}")]
    Controller(#[from] ControllerError),

    #[error("capture failed: {0}")]
    Stream(String),

    #[error("capture thread panicked")]
    CapturePanicked,
}

/// Result of command execution.
pub type CommandResult<T> = Result<T, CommandError>;
