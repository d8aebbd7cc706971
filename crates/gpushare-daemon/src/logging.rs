//! Logging bootstrap

use anyhow::Context;
use gpushare_core::LoggingConfig;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

const DEFAULT_LOG_PREFIX: &str = "gpushare.log";

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// flushes buffered lines on drop and must live as long as the process.
pub fn init(config: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let level: LevelFilter = config
        .level
        .parse()
        .with_context(|| format!("invalid log level: {}", config.level))?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (writer, guard) = match &config.file {
        Some(path) => {
            let (dir, prefix) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(dir, prefix);
            tracing_appender::non_blocking(appender)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let fmt_layer = if config.format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// Directory and file prefix of a rolling log file
fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_PREFIX);
    (dir, prefix)
}
