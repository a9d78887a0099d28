//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable that overrides the log filter
pub const LOG_ENV_VAR: &str = "CONSOLE_BRIDGE_LOG";

const LOG_FILE_NAME: &str = "console-bridge.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/console-bridge/logs/`.
/// Log level is controlled by the `CONSOLE_BRIDGE_LOG` environment variable;
/// `verbose` raises the default for the workspace crates to `debug`.
///
/// # Examples
/// ```bash
/// CONSOLE_BRIDGE_LOG=debug console-bridge https://portal.example/console?...
/// CONSOLE_BRIDGE_LOG=console_transport=trace console-bridge ...
/// ```
pub fn init(verbose: bool) -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Console bridge starting (verbose diagnostics: {})", verbose);
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Default filter directive when `CONSOLE_BRIDGE_LOG` is unset
pub fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!(
        "console_bridge={level},console_app={level},console_transport={level},console_core={level},warn"
    )
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("console-bridge").join("logs"))
}
