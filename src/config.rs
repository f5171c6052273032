// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::camera::{encoder_for, muxer_for};
use crate::error::{RecorderError, Result};
use crate::schedule::ScheduleWindow;
use crate::source::{CameraSource, CodecTag};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Recording defaults shared by every camera.
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Time windows used by `camrec schedule`.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Segment-download mode settings.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Log sink settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// List of cameras to record.
    pub cameras: Vec<CameraConfig>,
}

/// Recording defaults. Every field except the directory can be overridden
/// per camera.
#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    /// Root of the `<date>/[<HHMM>/]recording_*.<ext>` tree.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Container file extension; selects the muxer.
    #[serde(default = "default_container")]
    pub container: String,
    /// Four-character codec tag handed to the container writer.
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Frame rate declared on the output file.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// Length of one recording invocation in seconds.
    #[serde(default = "default_duration")]
    pub duration_secs: u64,
    /// Keep one frame out of every `frame_skip` frames read.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,
    /// Show sampled frames in a window; `q` stops the recording.
    #[serde(default)]
    pub display: bool,
    /// How long a source may take to start producing frames.
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,
    /// Upper bound of a single frame read.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            container: default_container(),
            codec: default_codec(),
            frame_rate: default_frame_rate(),
            duration_secs: default_duration(),
            frame_skip: default_frame_skip(),
            display: false,
            open_timeout_secs: default_open_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// Seconds between two schedule ticks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// `[start, end]` pairs in 24-hour `HH:MM` form.
    #[serde(default)]
    pub windows: Vec<(String, String)>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { poll_interval_secs: default_poll_interval(), windows: Vec::new() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Segments land in `<segment_dir>/<camera>/segment_<n>.<ext>`.
    #[serde(default = "default_segment_dir")]
    pub segment_dir: PathBuf,
    /// Write buffer size for streamed segment bodies, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { segment_dir: default_segment_dir(), chunk_size: default_chunk_size() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory holding one `<YYYY-MM-DD>.log` file per day.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_dir: default_log_dir(), level: default_log_level() }
    }
}

/// Per-camera configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// HLS playlist URL of the camera stream.
    pub url: String,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub frame_rate: Option<f64>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub frame_skip: Option<u32>,
    #[serde(default)]
    pub display: Option<bool>,
}

fn default_output_dir() -> PathBuf { PathBuf::from("./recordings") }
fn default_container() -> String { "avi".into() }
fn default_codec() -> String { "XVID".into() }
fn default_frame_rate() -> f64 { 20.0 }
fn default_duration() -> u64 { 60 }
fn default_frame_skip() -> u32 { 10 }
fn default_open_timeout() -> u64 { 15 }
fn default_read_timeout() -> u64 { 10 }
fn default_poll_interval() -> u64 { 60 }
fn default_segment_dir() -> PathBuf { PathBuf::from("./videos") }
fn default_chunk_size() -> usize { 1024 }
fn default_log_dir() -> PathBuf { PathBuf::from("./logs") }
fn default_log_level() -> String { "info".into() }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| RecorderError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(RecorderError::Config("No cameras defined".into()));
        }
        if muxer_for(&self.recording.container).is_none() {
            return Err(RecorderError::Config(format!(
                "unsupported container '{}'",
                self.recording.container
            )));
        }
        if self.recording.open_timeout_secs == 0 || self.recording.read_timeout_secs == 0 {
            return Err(RecorderError::Config("timeouts must be > 0".into()));
        }
        if self.schedule.poll_interval_secs == 0 {
            return Err(RecorderError::Config("poll_interval_secs must be > 0".into()));
        }
        if self.fetch.chunk_size == 0 {
            return Err(RecorderError::Config("chunk_size must be > 0".into()));
        }
        self.schedule_windows()?;
        // Identifiers name output files and segment folders.
        let mut seen = HashSet::new();
        for source in self.camera_sources()? {
            if !seen.insert(source.id.clone()) {
                return Err(RecorderError::Config(format!(
                    "camera identifier '{}' is used by more than one camera ({})",
                    source.id, source.url
                )));
            }
            if encoder_for(&source.codec).is_none() {
                return Err(RecorderError::Config(format!(
                    "{}: unsupported codec '{}'",
                    source.id, source.codec
                )));
            }
        }
        Ok(())
    }

    /// Parsed schedule windows in configuration order.
    pub fn schedule_windows(&self) -> Result<Vec<ScheduleWindow>> {
        self.schedule
            .windows
            .iter()
            .map(|(start, end)| ScheduleWindow::parse(start, end))
            .collect()
    }

    /// Resolve every camera entry against the recording defaults.
    pub fn camera_sources(&self) -> Result<Vec<CameraSource>> {
        self.cameras
            .iter()
            .map(|cam| self.camera_source(cam))
            .collect()
    }

    fn camera_source(&self, cam: &CameraConfig) -> Result<CameraSource> {
        let rec = &self.recording;
        let codec: CodecTag = cam.codec.as_deref().unwrap_or(&rec.codec).parse()?;
        let frame_rate = cam.frame_rate.unwrap_or(rec.frame_rate);
        let duration_secs = cam.duration_secs.unwrap_or(rec.duration_secs);
        let frame_skip = cam.frame_skip.unwrap_or(rec.frame_skip);

        if !(frame_rate > 0.0) {
            return Err(RecorderError::Config(format!("{}: frame_rate must be > 0", cam.url)));
        }
        if duration_secs == 0 {
            return Err(RecorderError::Config(format!("{}: duration_secs must be > 0", cam.url)));
        }
        if frame_skip == 0 {
            return Err(RecorderError::Config(format!("{}: frame_skip must be >= 1", cam.url)));
        }

        CameraSource::new(
            &cam.url,
            codec,
            frame_rate,
            frame_skip,
            std::time::Duration::from_secs(duration_secs),
            cam.display.unwrap_or(rec.display),
        )
    }
}
