use anyhow::Result;
use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use trigrep::config::{CliOverrides, DaemonConfig};
use trigrep::logging;
use trigrep::server::{run_session, write_message, Daemon, Response};

#[derive(Parser)]
#[command(name = "trigrep", version)]
#[command(about = "Project search daemon speaking framed JSON on stdin/stdout")]
struct Cli {
    /// Project directory to index and watch
    project_path: PathBuf,

    /// Debounce window for file change events, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Index once at startup and do not watch for changes
    #[arg(long)]
    no_watch: bool,

    /// Log filter, e.g. "info" or "trigrep=debug" (TRIGREP_LOG wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs to this file (truncated at startup) instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Extra config file, layered over the user and project files
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let overrides = CliOverrides {
        debounce_ms: cli.debounce_ms,
        no_watch: cli.no_watch,
        log_level: cli.log_level,
        log_file: cli.log_file,
        config: cli.config,
    };

    let (config, warnings) = DaemonConfig::load(&cli.project_path, &overrides);
    if let Err(e) = logging::init(&config.log_level, config.log_file.as_deref()) {
        eprintln!("trigrep: {e:#}");
    }
    for warning in &warnings {
        warn!("{warning}");
    }

    match serve(&cli.project_path, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "daemon failed");
            ExitCode::FAILURE
        }
    }
}

fn serve(project_path: &Path, config: DaemonConfig) -> Result<()> {
    let mut stdout = io::stdout().lock();

    let daemon = match Daemon::start(project_path, config) {
        Ok(daemon) => daemon,
        Err(e) => {
            write_message(&mut stdout, &Response::error(format!("{e:#}")))?;
            return Err(e);
        }
    };
    info!(root = %daemon.root().display(), "ready");

    let mut stdin = io::stdin().lock();
    run_session(&daemon, &mut stdin, &mut stdout)
}
