//! lotus log collector.
//!
//! Captures a line-oriented log stream into size-bounded, numbered files and
//! bundles full batches of them into zip archives. The pipeline is
//! StreamSource → LineFilter → RotatingWriter, driven by a CaptureLoop thread
//! and started and stopped through the CollectorController.

pub mod archiver;
pub mod capture;
pub mod cli;
pub mod collector;
pub mod commands;
pub mod config;
pub mod exit;
pub mod filter;
pub mod io;
pub mod listener;
pub mod logger;
pub mod signal;
pub mod sleeper;
pub mod source;
pub mod writer;

pub use archiver::{ArchiveError, Archiver};
pub use capture::{CaptureHandle, CaptureLoop, CaptureStats, SharedWriter};
pub use cli::{parse_from, Cli, CliError, CollectArgs, Command, IndexArgs};
pub use collector::{CaptureState, CollectorController, ControllerError};
pub use commands::{
    execute_collect, execute_index, CollectResult, CommandError, CommandResult, IndexListing,
    StopReason,
};
pub use config::CollectConfig;
pub use filter::{should_keep, LineFilter};
pub use listener::{CollectListener, LoggingListener, RecordingListener};
pub use logger::{Logger, MockLogger, NullLogger, TracingLogger, Verbosity};
pub use signal::{NeverShutdown, ShutdownCheck, ShutdownFlag};
pub use sleeper::{MockSleeper, RealSleeper, Sleeper};
pub use source::{
    ChannelFeed, ChannelSource, CommandSource, Interrupt, LineStream, MockSource, SourceError,
    StreamSource,
};
pub use writer::{RotatingWriter, WriterSettings};
