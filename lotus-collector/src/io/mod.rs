//! IO helpers for CLI operations.

pub mod status_writer;

pub use status_writer::{StatusLine, StatusWriter, StatusWriterError};
