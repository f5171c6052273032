// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GStreamer error: {0}")]
    GStreamer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetching {url} failed with status {status}")]
    Fetch { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Malformed source URL '{0}': expected <...>/<camera>/<playlist>")]
    MalformedSourceUrl(String),

    #[error("Invalid schedule window: {0}")]
    InvalidWindow(String),

    #[error("Source '{url}' could not be opened: {reason}")]
    SourceOpen { url: String, reason: String },

    #[error("Stream read failed: {0}")]
    StreamRead(String),

    #[error("Output writer error: {0}")]
    Writer(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
