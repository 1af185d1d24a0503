// afx/src/main.rs
use std::future::Future;
use std::io;
use std::process;

use afx_common::config::Config;
use afx_common::error::{AfxError, Result as AfxResult};
use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::CliArgs;

const LOG_ENV: &str = "AFX_LOG";
const INTERRUPTED_EXIT_CODE: i32 = 130;

fn init_logging(verbose: u8, config: &Config) {
    let level_filter = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let Some(log_path) = config.log_path.as_ref() else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .without_time()
            .try_init();
        return;
    };

    let dir = log_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| config.afx_root().to_path_buf());
    let file_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "afx.log".to_string());
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!(
            "{} Failed to create log directory {}: {}",
            "Error:".red().bold(),
            dir.display(),
            e
        );
    }
    let file_appender = tracing_appender::rolling::never(&dir, &file_name);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let max_level = level_filter.into_level().unwrap_or(tracing::Level::WARN);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(
            std::io::stderr
                .with_max_level(max_level)
                .and(non_blocking_appender),
        )
        .with_ansi(false)
        .try_init();

    Box::leak(Box::new(guard));
    debug!("Writing logs to {}", log_path.display());
}

/// Cancels `cancel` on the first interrupt and returns on the second.
async fn watch_interrupts<S, F>(mut interrupt: S, cancel: CancellationToken) -> io::Result<()>
where
    S: FnMut() -> F,
    F: Future<Output = io::Result<()>>,
{
    interrupt().await?;
    warn!("Interrupted, cancelling running tasks (Ctrl-C again to exit)");
    cancel.cancel();
    interrupt().await?;
    warn!("Interrupted again, exiting");
    Ok(())
}

fn spawn_interrupt_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match watch_interrupts(tokio::signal::ctrl_c, trigger).await {
            Ok(()) => process::exit(INTERRUPTED_EXIT_CODE),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> AfxResult<()> {
    let cli_args = CliArgs::parse();

    let config = Config::load()
        .map_err(|e| AfxError::Config(format!("Could not load config: {e}")))?;
    init_logging(cli_args.verbose, &config);

    let cancel = spawn_interrupt_handler();
    if let Err(e) = cli_args.command.run(&config, cancel).await {
        error!("Command failed: {}", e);
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }

    debug!("Command completed successfully.");
    Ok(())
}
