//! `btrfs-snapraid` command line.

use anyhow::{Context, Result};
use bridge_desktop::{DryRunCommandRunner, RunLock, TokioCommandRunner, TokioFileSystem};
use bridge_traits::{CommandRunner, LogLevel};
use clap::{ArgAction, Parser, Subcommand};
use core_maintenance::{MaintenanceOrchestrator, MaintenanceRun};
use core_runtime::config::MaintenanceConfig;
use core_runtime::logging::{init_logging, LogFileConfig, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "btrfs-snapraid")]
#[command(about = "SnapRAID maintenance on btrfs snapshots", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: search ./, /usr/local/etc/, /etc/)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Log the commands that would change anything instead of running them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// More output: -v info, -vv command output, -vvv debug
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print the run record or report as JSON on stdout
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// Touch, refresh, diff, check thresholds, sync, rotate snapshots, scrub
    Maintenance,
    /// Refresh, sync and rotate snapshots without checking thresholds
    Sync,
    /// Show what changed in the live data since the last sync
    Diff,
    /// Set sub-second timestamps on the live data
    Touch,
    /// List recovery snapshots
    Snapshots,
}

impl Action {
    fn needs_lock(&self) -> bool {
        !matches!(self, Action::Snapshots)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("btrfs-snapraid: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let (config_path, config) = MaintenanceConfig::discover(cli.config.as_deref())?;
    init_logging(logging_config(&cli, &config)).context("Failed to initialize logging")?;
    info!("Using configuration {}", config_path.display());

    let action = cli.action.unwrap_or(Action::Maintenance);
    let _lock = if action.needs_lock() {
        let lock_path = config.lock_path(&config_path);
        Some(RunLock::acquire(&lock_path)?)
    } else {
        None
    };

    let real: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
    let runner: Arc<dyn CommandRunner> = if cli.dry_run {
        warn!("Dry run: commands that change anything are logged, not executed");
        Arc::new(DryRunCommandRunner::new(real))
    } else {
        real
    };

    let cancellation = CancellationToken::new();
    spawn_signal_handler(cancellation.clone());

    let orchestrator =
        MaintenanceOrchestrator::new(Arc::new(config), runner, Arc::new(TokioFileSystem::new()))
            .with_cancellation(cancellation);

    match action {
        Action::Maintenance => report_run(orchestrator.run().await?, cli.json),
        Action::Sync => report_run(orchestrator.run_sync().await?, cli.json),
        Action::Diff => {
            let report = orchestrator.diff_live().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{:>10} added", report.added);
                println!("{:>10} removed", report.removed);
                println!("{:>10} updated", report.updated);
                println!("{:>10} moved", report.moved);
                println!("{:>10} copied", report.copied);
            }
            Ok(0)
        }
        Action::Touch => {
            orchestrator.touch().await?;
            info!("Touch finished");
            Ok(0)
        }
        Action::Snapshots => {
            let listing = orchestrator.snapshots().await?;
            if cli.json {
                let value: serde_json::Map<String, serde_json::Value> = listing
                    .into_iter()
                    .map(|(volume, snapshots)| Ok((volume, serde_json::to_value(snapshots)?)))
                    .collect::<Result<_>>()?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for (volume, snapshots) in listing {
                    if snapshots.is_empty() {
                        println!("{volume}: no recovery snapshots");
                    }
                    for snapshot in snapshots {
                        println!("{volume} {:>3} {}", snapshot.index, snapshot.path.display());
                    }
                }
            }
            Ok(0)
        }
    }
}

fn report_run(run: MaintenanceRun, json: bool) -> Result<u8> {
    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    }
    Ok(u8::try_from(run.exit_code()).unwrap_or(1))
}

/// Console level: `-q`/`-v` override the configuration; a dry run always
/// shows at least the command output.
fn console_level(cli: &Cli, configured: LogLevel) -> LogLevel {
    let level = if cli.quiet {
        LogLevel::Error
    } else {
        match cli.verbose {
            0 => configured,
            1 => LogLevel::Info,
            2 => LogLevel::Output,
            _ => LogLevel::Debug,
        }
    };

    if cli.dry_run {
        level.most_verbose(LogLevel::Output)
    } else {
        level
    }
}

fn logging_config(cli: &Cli, config: &MaintenanceConfig) -> LoggingConfig {
    let mut logging = LoggingConfig::default()
        .with_level(console_level(cli, config.logging.console_level))
        .with_stderr(cli.json);
    if let Some(file) = &config.logging.file {
        logging = logging.with_file(LogFileConfig::new(file).with_level(config.logging.file_level));
    }
    logging
}

/// Cancels the run at the next step boundary on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, stopping after the current step"),
            _ = terminate => info!("Received SIGTERM, stopping after the current step"),
        }
        token.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("btrfs-snapraid").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_action_is_maintenance() {
        let cli = parse(&["-c", "/etc/btrfs_snapraid.toml"]);
        assert!(cli.action.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/etc/btrfs_snapraid.toml")));
    }

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(console_level(&parse(&[]), LogLevel::Warn), LogLevel::Warn);
        assert_eq!(console_level(&parse(&["-q"]), LogLevel::Info), LogLevel::Error);
        assert_eq!(console_level(&parse(&["-v"]), LogLevel::Error), LogLevel::Info);
        assert_eq!(console_level(&parse(&["-vv"]), LogLevel::Error), LogLevel::Output);
        assert_eq!(console_level(&parse(&["-vvvv"]), LogLevel::Error), LogLevel::Debug);
    }

    #[test]
    fn test_dry_run_shows_command_output() {
        assert_eq!(console_level(&parse(&["-n"]), LogLevel::Info), LogLevel::Output);
        assert_eq!(console_level(&parse(&["-n", "-vvv"]), LogLevel::Info), LogLevel::Debug);
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        let result = Cli::try_parse_from(["btrfs-snapraid", "-q", "-v"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_actions_parse() {
        assert!(matches!(parse(&["--json", "sync"]).action, Some(Action::Sync)));
        assert!(matches!(parse(&["snapshots"]).action, Some(Action::Snapshots)));
        assert!(!Action::Snapshots.needs_lock());
        assert!(Action::Diff.needs_lock());
    }
}
