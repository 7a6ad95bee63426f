// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output is always installed. With the `file-logging` feature, each
//! process run also gets its own timestamped folder:
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       ├── uniform-spatial-core.log
//!       ├── uniform-spatial-config.log
//!       └── uniform_spatial.log (combined)
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

const RUN_PREFIX: &str = "run_";
const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Logging settings, usually filled from the `[logging]` config section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingOptions {
    /// Base level for every crate without a debug flag
    pub level: String,
    pub file_logging: bool,
    /// Base directory for run folders (default: `./logs`)
    pub log_dir: Option<PathBuf>,
    /// Delete run folders older than this many days
    pub retention_days: u64,
    /// Keep at most this many run folders
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

/// Keeps file writers alive; logs are flushed when this is dropped
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

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the filter for the given flags on top of `base_level`
pub fn build_env_filter(debug_flags: &CrateDebugFlags, base_level: &str) -> Result<EnvFilter> {
    let directives = debug_flags.to_filter_string(base_level);
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter: {}", directives))
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails if the filter does not parse, the log folder cannot be created,
/// file logging is requested without the `file-logging` feature, or a global
/// subscriber is already set.
pub fn init_logging(debug_flags: &CrateDebugFlags, options: &LoggingOptions) -> Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(build_env_filter(debug_flags, &options.level)?);
    layers.push(console_layer.boxed());

    let mut guard = LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: Vec::new(),
        log_dir: None,
    };

    let base_log_dir = options
        .log_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./logs"));

    if options.file_logging {
        attach_file_output(debug_flags, &options.level, &base_log_dir, &mut layers, &mut guard)?;
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    if let Some(run_folder) = guard.log_dir() {
        let removed = cleanup_old_logs(
            &base_log_dir,
            Some(run_folder),
            Utc::now(),
            options.retention_days,
            options.retention_runs,
        )?;
        tracing::debug!(
            run_folder = %run_folder.display(),
            removed,
            "File logging enabled"
        );
    }

    Ok(guard)
}

/// Console-only logging at `info` with the given flags
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingOptions::default())
}

#[cfg(feature = "file-logging")]
fn attach_file_output(
    debug_flags: &CrateDebugFlags,
    base_level: &str,
    base_log_dir: &Path,
    layers: &mut Vec<BoxedLayer>,
    guard: &mut LoggingGuard,
) -> Result<()> {
    use tracing_appender::rolling;

    let run_folder = create_run_folder(base_log_dir, Utc::now())?;

    // One file per crate, holding only that crate's events
    for crate_name in crate::KNOWN_CRATES {
        let appender = rolling::daily(&run_folder, format!("{}.log", crate_name));
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard._file_guards.push(file_guard);

        let directive = format!("{}=debug", crate::crate_target(crate_name));
        let filter = EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid log filter: {}", directive))?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter)
                .boxed(),
        );
    }

    let combined = rolling::daily(&run_folder, "uniform_spatial.log");
    let (writer, file_guard) = tracing_appender::non_blocking(combined);
    guard._file_guards.push(file_guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(build_env_filter(debug_flags, base_level)?)
            .boxed(),
    );

    guard.log_dir = Some(run_folder);
    Ok(())
}

#[cfg(not(feature = "file-logging"))]
fn attach_file_output(
    _debug_flags: &CrateDebugFlags,
    _base_level: &str,
    _base_log_dir: &Path,
    _layers: &mut Vec<BoxedLayer>,
    _guard: &mut LoggingGuard,
) -> Result<()> {
    anyhow::bail!("File logging requested but the `file-logging` feature is not enabled")
}

/// Create `run_<timestamp>` under `base_log_dir`
pub fn create_run_folder(base_log_dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    let run_folder = base_log_dir.join(format!("{}{}", RUN_PREFIX, now.format(RUN_TIMESTAMP_FORMAT)));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;
    Ok(run_folder)
}

/// Delete run folders older than `retention_days`, then the oldest ones
/// beyond `retention_runs`. `keep` is never removed.
///
/// Returns the number of folders removed. Directories whose names do not
/// parse as run folders are left alone.
pub fn cleanup_old_logs(
    base_log_dir: &Path,
    keep: Option<&Path>,
    now: DateTime<Utc>,
    retention_days: u64,
    retention_runs: usize,
) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }

    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)
        .with_context(|| format!("Failed to list log directory: {}", base_log_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() || keep == Some(path.as_path()) {
            continue;
        }
        if let Some(started) = run_folder_timestamp(&path) {
            runs.push((path, started));
        }
    }

    let cutoff = now - chrono::Duration::days(retention_days as i64);
    // The kept folder counts towards the run limit
    let room = retention_runs.saturating_sub(usize::from(keep.is_some()));

    let mut removed = 0;
    for path in runs_to_remove(runs, cutoff, room) {
        match std::fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove old log directory"
            ),
        }
    }
    Ok(removed)
}

fn run_folder_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    let timestamp = name.strip_prefix(RUN_PREFIX)?;
    NaiveDateTime::parse_from_str(timestamp, RUN_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn runs_to_remove(
    mut runs: Vec<(PathBuf, DateTime<Utc>)>,
    cutoff: DateTime<Utc>,
    keep_newest: usize,
) -> Vec<PathBuf> {
    // Newest first
    runs.sort_by(|a, b| b.1.cmp(&a.1));
    runs.into_iter()
        .enumerate()
        .filter(|(rank, (_, started))| *started < cutoff || *rank >= keep_newest)
        .map(|(_, (path, _))| path)
        .collect()
}
