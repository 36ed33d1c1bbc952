use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::General;

/// Verbosity of the messages printed on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[clap(rename_all = "UPPER")]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let directive = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(directive)
    }
}

/// Layout of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// The same lines as on stderr, without colors.
    Text,
    /// One JSON object per event, with source locations and span timings.
    Json,
}

/// Keeps the log file writer alive. Dropping it flushes the file.
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
    log_path: Option<PathBuf>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(log_path) = &self.log_path {
            tracing::info!("Wrote log to {}", log_path.display());
        }
    }
}

/// Picks the stderr filter directives.
///
/// `--log-level` wins over a non-empty `RUST_LOG`, which wins over the configured level.
fn stderr_directives(
    requested: Option<LogLevel>,
    rust_log: Option<String>,
    configured: LogLevel,
) -> String {
    match (requested, rust_log) {
        (Some(level), _) => level.to_string(),
        (None, Some(directives)) if !directives.trim().is_empty() => directives,
        (None, _) => configured.to_string(),
    }
}

/// Installs the stderr logger and, if `log_path` is given, a file logger in the
/// format chosen by the configuration. The file receives every event regardless
/// of the stderr level.
pub fn setup_logging(
    requested: Option<LogLevel>,
    log_path: Option<&Path>,
    general: &General,
) -> anyhow::Result<LogGuard> {
    let directives = stderr_directives(
        requested,
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        general.log_level,
    );

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::builder().parse_lossy(directives));

    let (writer, worker) = match log_path {
        Some(log_path) => {
            let file = File::create(log_path)
                .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
            let (writer, worker) = tracing_appender::non_blocking(file);
            (Some(writer), Some(worker))
        }
        None => (None, None),
    };

    let file_writer = |format: LogFormat| writer.clone().filter(|_| general.log_format == format);

    let text_layer = file_writer(LogFormat::Text).map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
    });
    let json_layer = file_writer(LogFormat::Json).map(|writer| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .context("Failed to install the logger")?;

    if let Some(log_path) = log_path {
        tracing::info!("Writing log to {}", log_path.display());
    }

    Ok(LogGuard {
        _worker: worker,
        log_path: log_path.map(Path::to_path_buf),
    })
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use super::*;

    #[test_case(Some(LogLevel::Debug), Some("trace"), LogLevel::Warn => "debug"; "flag wins")]
    #[test_case(None, Some("dap_commander=trace"), LogLevel::Warn => "dap_commander=trace"; "environment")]
    #[test_case(None, Some("  "), LogLevel::Info => "info"; "blank environment")]
    #[test_case(None, None, LogLevel::Off => "off"; "configuration")]
    fn stderr_level_precedence(
        requested: Option<LogLevel>,
        rust_log: Option<&str>,
        configured: LogLevel,
    ) -> String {
        stderr_directives(requested, rust_log.map(str::to_string), configured)
    }
}
