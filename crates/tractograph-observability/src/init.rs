// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for tractograph
//!
//! Console output always; with the `file-logging` feature, JSON log files in a
//! timestamped run folder with configurable retention.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

const RUN_FOLDER_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Logging options, usually filled from the `[logging]` config section
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoggingOptions {
    /// Default level for everything not raised by a debug flag
    pub level: String,
    /// Write JSON log files (needs the `file-logging` feature)
    pub file_logging: bool,
    /// Base directory for run folders (default: `./logs`)
    pub log_dir: Option<PathBuf>,
    /// Keep run folders for N days
    pub retention_days: u64,
    /// Keep the N most recent run folders
    pub retention_runs: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            log_dir: None,
            retention_days: 30,
            retention_runs: 10,
        }
    }
}

/// Logging initialization result
///
/// Must be kept alive for the duration of the run; dropping it flushes file logs.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving log files, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Build the `EnvFilter` for the given flags and default level
pub fn build_env_filter(debug_flags: &CrateDebugFlags, level: &str) -> Result<EnvFilter> {
    let directives = debug_flags.to_filter_string(level);
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter directives: {}", directives))
}

/// Initialize logging with console output and optional file output
///
/// Creates a timestamped folder structure when file logging is enabled:
/// ```text
/// ./logs/
///   └── run_20250101_120000/
///       └── tractograph.log
/// ```
pub fn init_logging(debug_flags: &CrateDebugFlags, options: &LoggingOptions) -> Result<LoggingGuard> {
    let env_filter = build_env_filter(debug_flags, &options.level)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    // Console layer (human-readable)
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(debug_flags.any_enabled())
        .with_file(false)
        .with_line_number(false)
        .with_filter(env_filter.clone());
    layers.push(console_layer.boxed());

    #[cfg(feature = "file-logging")]
    let (file_guards, log_dir) = if options.file_logging {
        let base_log_dir = options
            .log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./logs"));

        let run_folder = base_log_dir.join(format!("run_{}", Utc::now().format(RUN_FOLDER_FORMAT)));
        std::fs::create_dir_all(&run_folder)
            .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

        cleanup_old_logs(&base_log_dir, options.retention_days, options.retention_runs)?;

        let appender = tracing_appender::rolling::never(&run_folder, "tractograph.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(env_filter)
            .boxed();
        layers.push(file_layer);

        (vec![guard], Some(run_folder))
    } else {
        (Vec::new(), None)
    };

    #[cfg(not(feature = "file-logging"))]
    let log_dir: Option<PathBuf> = None;

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    #[cfg(not(feature = "file-logging"))]
    if options.file_logging {
        tracing::warn!(
            target: "tractograph-observability",
            "File logging requested but the file-logging feature is not compiled in"
        );
    }

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: file_guards,
        log_dir,
    })
}

/// Initialize console logging at `info` with the given debug flags
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingOptions::default())
}

fn parse_run_folder(dir_name: &str) -> Option<DateTime<Utc>> {
    let timestamp_str = dir_name.strip_prefix("run_")?;
    NaiveDateTime::parse_from_str(timestamp_str, RUN_FOLDER_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Remove run folders older than `retention_days`, then keep at most
/// `retention_runs` of the remaining ones. Returns the number removed.
pub fn cleanup_old_logs(
    base_log_dir: &Path,
    retention_days: u64,
    retention_runs: usize,
) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }

    let cutoff_date = Utc::now() - chrono::Duration::days(retention_days as i64);

    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(dt) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_run_folder)
        {
            runs.push((path, dt));
        }
    }

    // Oldest first
    runs.sort_by_key(|(_, dt)| *dt);

    let (expired, kept): (Vec<_>, Vec<_>) = runs.into_iter().partition(|(_, dt)| *dt < cutoff_date);
    let surplus = kept.len().saturating_sub(retention_runs);

    let mut removed = 0;
    for (path, _) in expired.iter().chain(kept.iter().take(surplus)) {
        match std::fs::remove_dir_all(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!(
                "Warning: Failed to remove old log directory {}: {}",
                path.display(),
                e
            ),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_env_filter_accepts_flags() {
        let flags =
            CrateDebugFlags::from_args(vec!["--debug-tractograph-connectome".to_string()]);
        assert!(build_env_filter(&flags, "warn").is_ok());
    }

    #[test]
    fn test_parse_run_folder() {
        assert!(parse_run_folder("run_20250101_120000").is_some());
        assert!(parse_run_folder("run_garbage").is_none());
        assert!(parse_run_folder("other_20250101_120000").is_none());
    }

    #[test]
    fn test_cleanup_old_logs_by_age_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let make = |dt: DateTime<Utc>| {
            let path = dir.path().join(format!("run_{}", dt.format(RUN_FOLDER_FORMAT)));
            std::fs::create_dir_all(&path).unwrap();
            path
        };

        let ancient = make(Utc::now() - chrono::Duration::days(400));
        let oldest_recent = make(Utc::now() - chrono::Duration::hours(3));
        let middle = make(Utc::now() - chrono::Duration::hours(2));
        let newest = make(Utc::now() - chrono::Duration::hours(1));
        std::fs::create_dir_all(dir.path().join("unrelated")).unwrap();

        let removed = cleanup_old_logs(dir.path(), 30, 2).unwrap();

        assert_eq!(removed, 2);
        assert!(!ancient.exists());
        assert!(!oldest_recent.exists());
        assert!(middle.exists());
        assert!(newest.exists());
        assert!(dir.path().join("unrelated").exists());
    }
}
