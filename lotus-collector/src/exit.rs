//! Exit codes for the lotus CLI.
//!
//! Following Unix conventions for exit codes.

use crate::commands::CommandError;

/// Exit code constants.
pub mod codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Invalid arguments.
    pub const INVALID_ARGS: i32 = 1;
    /// IO error.
    pub const IO_ERROR: i32 = 2;
    /// Capture could not run or failed.
    pub const COLLECTOR_ERROR: i32 = 3;
    /// Interrupted by signal (128 + signal number).
    pub const SIGINT: i32 = 130;
}

/// Map a CommandError to an exit code.
pub fn exit_code(error: &CommandError) -> i32 {
    match error {
        CommandError::InvalidArgument(_) => codes::INVALID_ARGS,
        CommandError::Source(_) => codes::INVALID_ARGS,
        CommandError::Filesystem(_) => codes::IO_ERROR,
        CommandError::Controller(_) => codes::COLLECTOR_ERROR,
        CommandError::Stream(_) => codes::COLLECTOR_ERROR,
        CommandError::CapturePanicked => codes::COLLECTOR_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliError;
    use crate::collector::ControllerError;
    use crate::source::SourceError;
    use lotus_fs::FsError;

    #[test]
    fn test_exit_code_invalid_argument() {
        let error = CommandError::InvalidArgument(CliError::EmptyExclusion);
        assert_eq!(exit_code(&error), codes::INVALID_ARGS);
    }

    #[test]
    fn test_exit_code_source() {
        let error = CommandError::Source(SourceError::EmptyCommand);
        assert_eq!(exit_code(&error), codes::INVALID_ARGS);
    }

    #[test]
    fn test_exit_code_filesystem() {
        let error = CommandError::Filesystem(FsError::Path("test".to_string()));
        assert_eq!(exit_code(&error), codes::IO_ERROR);
    }

    #[test]
    fn test_exit_code_collector() {
        assert_eq!(
            exit_code(&CommandError::Controller(ControllerError::AlreadyCollecting)),
            codes::COLLECTOR_ERROR
        );
        assert_eq!(
            exit_code(&CommandError::Stream("broken pipe".to_string())),
            codes::COLLECTOR_ERROR
        );
        assert_eq!(exit_code(&CommandError::CapturePanicked), codes::COLLECTOR_ERROR);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let all = [
            codes::SUCCESS,
            codes::INVALID_ARGS,
            codes::IO_ERROR,
            codes::COLLECTOR_ERROR,
            codes::SIGINT,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
