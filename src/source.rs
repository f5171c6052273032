// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Camera sources: one immutable description per configured stream.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{RecorderError, Result};

/// Four-character codec identifier consumed by the container writer
/// (`XVID`, `MJPG`, `H264`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecTag([u8; 4]);

impl CodecTag {
    pub fn as_str(&self) -> &str {
        // Only ASCII is accepted by `from_str`.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl FromStr for CodecTag {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
            return Err(RecorderError::Config(format!(
                "codec must be four ASCII characters, got '{s}'"
            )));
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(bytes);
        Ok(Self(tag))
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live camera stream and the parameters it is recorded with.
#[derive(Debug, Clone)]
pub struct CameraSource {
    /// Path segment preceding the playlist file name, e.g. `CAM72`.
    pub id: String,
    pub url: Url,
    pub codec: CodecTag,
    pub frame_rate: f64,
    pub frame_skip: u32,
    pub duration: Duration,
    pub display: bool,
}

impl CameraSource {
    pub fn new(
        url: &str,
        codec: CodecTag,
        frame_rate: f64,
        frame_skip: u32,
        duration: Duration,
        display: bool,
    ) -> Result<Self> {
        let url = Url::parse(url)?;
        let id = camera_identifier(&url)?;
        Ok(Self { id, url, codec, frame_rate, frame_skip, duration, display })
    }
}

/// Derive the camera identifier from a stream URL.
///
/// The identifier is the path segment immediately preceding the playlist
/// file name: `https://host/rtplive/CAM72/playlist.m3u8` gives `CAM72`.
/// URLs with fewer than two path segments, or an empty identifier segment,
/// are rejected with [`RecorderError::MalformedSourceUrl`].
pub fn camera_identifier(url: &Url) -> Result<String> {
    let malformed = || RecorderError::MalformedSourceUrl(url.to_string());
    let segments: Vec<&str> = url.path_segments().ok_or_else(malformed)?.collect();
    if segments.len() < 2 {
        return Err(malformed());
    }
    let id = segments[segments.len() - 2];
    if id.is_empty() || segments[segments.len() - 1].is_empty() {
        return Err(malformed());
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_of(url: &str) -> Result<String> {
        camera_identifier(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_identifier_from_playlist_url() {
        assert_eq!(
            id_of("https://s2.example.com:443/rtplive/CAM72/playlist.m3u8").unwrap(),
            "CAM72"
        );
        assert_eq!(
            id_of("https://example.com/rtplive/MODOT_CAM_309/playlist.m3u8?token=1").unwrap(),
            "MODOT_CAM_309"
        );
    }

    #[test]
    fn test_identifier_requires_two_segments() {
        assert!(matches!(
            id_of("https://example.com/playlist.m3u8"),
            Err(RecorderError::MalformedSourceUrl(_))
        ));
        assert!(matches!(
            id_of("https://example.com/CAM72/"),
            Err(RecorderError::MalformedSourceUrl(_))
        ));
        assert!(matches!(
            id_of("https://example.com//playlist.m3u8"),
            Err(RecorderError::MalformedSourceUrl(_))
        ));
    }

    #[test]
    fn test_codec_tag_parsing() {
        let tag: CodecTag = "XVID".parse().unwrap();
        assert_eq!(tag.to_string(), "XVID");
        assert!("XVI".parse::<CodecTag>().is_err());
        assert!("XVIDX".parse::<CodecTag>().is_err());
        assert!("XV D".parse::<CodecTag>().is_err());
    }
}
