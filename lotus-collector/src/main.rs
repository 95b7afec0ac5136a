//! lotus CLI binary.
//!
//! Entry point for the `lotus` command-line tool.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use lotus_clock::SystemClock;
use lotus_collector::exit::{codes, exit_code};
use lotus_collector::{
    execute_collect, execute_index, Cli, CollectArgs, Command, CommandError, CommandSource,
    IndexArgs, RealSleeper, ShutdownFlag, StopReason, TracingLogger, Verbosity,
};
use lotus_fs::RealFilesystem;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbosity = Verbosity::from_count(cli.verbose);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive())),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Collect(args) => run_collect(args),
        Command::Index(args) => run_index(args),
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(target: "lotus", "{}", e);
            ExitCode::from(exit_code(&e) as u8)
        }
    }
}

/// Run the collect command.
fn run_collect(args: CollectArgs) -> Result<i32, CommandError> {
    let source = CommandSource::from_command_line(&args.command_line())?;

    // Set up shutdown handler for graceful termination on Ctrl+C
    let shutdown = ShutdownFlag::with_ctrlc();

    let result = execute_collect(
        &args,
        Arc::new(source),
        &SystemClock,
        &RealFilesystem,
        &RealSleeper,
        &shutdown,
        &TracingLogger,
    )?;

    println!(
        "Captured {} lines ({} excluded), produced {} archives",
        result.stats.lines_forwarded,
        result.stats.lines_excluded,
        result.archives.len()
    );
    for artifact in &result.archives {
        println!("  {}", artifact.path.display());
    }

    Ok(match result.stop_reason {
        StopReason::Shutdown => codes::SIGINT,
        StopReason::Duration | StopReason::StreamEnded => codes::SUCCESS,
    })
}

/// Run the index command.
fn run_index(args: IndexArgs) -> Result<i32, CommandError> {
    let listing = execute_index(&args, &RealFilesystem)?;

    println!("Log files ({}):", args.log_dir.display());
    for name in &listing.log_entries {
        println!("  {}", name);
    }
    println!("Archives ({}):", args.archive_dir.display());
    for name in &listing.archive_entries {
        println!("  {}", name);
    }

    Ok(codes::SUCCESS)
}
