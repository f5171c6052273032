// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Process-wide log sink: console plus `<log_dir>/<YYYY-MM-DD>.log`.
//!
//! Installed once at startup; every execution unit logs through the same
//! subscriber. The file is opened in append mode so restarts on the same
//! day keep adding to it.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{RecorderError, Result};

/// Path of today's log file under `log_dir`.
pub fn log_file_path(cfg: &LoggingConfig) -> PathBuf {
    cfg.log_dir.join(format!("{}.log", Local::now().format("%Y-%m-%d")))
}

/// Install the global subscriber. Returns the log file path.
pub fn init(cfg: &LoggingConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(&cfg.log_dir)?;
    let path = log_file_path(cfg);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .map_err(|e| RecorderError::Config(format!("logging init: {e}")))?;

    Ok(path)
}
