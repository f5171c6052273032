// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Recording file layout.
//!
//! ```text
//! <root>/2024-08-29/recording_CAM72_20240829_1200.avi          fixed duration
//! <root>/2024-08-29/1200/recording_CAM72_20240829_1200.avi     scheduled
//! ```

use std::path::PathBuf;

use chrono::NaiveDateTime;

#[derive(Debug, Clone)]
pub struct RecordingLayout {
    root: PathBuf,
    extension: String,
}

impl RecordingLayout {
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self { root: root.into(), extension: extension.trim_start_matches('.').to_string() }
    }

    /// Path for a one-shot recording started at `at`.
    pub fn fixed_path(&self, source_id: &str, at: NaiveDateTime) -> PathBuf {
        self.root
            .join(at.format("%Y-%m-%d").to_string())
            .join(self.file_name(source_id, at))
    }

    /// Path for a recording started by the scheduler at `at`.
    pub fn scheduled_path(&self, source_id: &str, at: NaiveDateTime) -> PathBuf {
        self.root
            .join(at.format("%Y-%m-%d").to_string())
            .join(at.format("%H%M").to_string())
            .join(self.file_name(source_id, at))
    }

    fn file_name(&self, source_id: &str, at: NaiveDateTime) -> String {
        format!("recording_{source_id}_{}.{}", at.format("%Y%m%d_%H%M"), self.extension)
    }
}
