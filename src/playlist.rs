// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! HLS playlist resolution: master, then variant, then segment list.
//!
//! ```text
//! #EXTM3U
//! #EXT-X-STREAM-INF:BANDWIDTH=246405,RESOLUTION=320x240
//! chunklist_w1724579266.m3u8          ← variant (first one wins)
//!
//! #EXTM3U
//! #EXT-X-MEDIA-SEQUENCE:3140861
//! #EXTINF:4.0,
//! media_w1724579266_3140861.ts        ← segment
//! ```
//!
//! Only one level of indirection is followed. A playlist without a variant
//! line is treated as the media playlist itself.

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{RecorderError, Result};

/// Extension identifying a sub-playlist reference.
pub const PLAYLIST_EXT: &str = ".m3u8";
/// Extension identifying a media segment reference.
pub const SEGMENT_EXT: &str = ".ts";

/// Result of resolving a master playlist.
#[derive(Debug, Clone)]
pub struct ResolvedPlaylist {
    /// Playlist the segments were read from (variant if any, else master).
    pub playlist_url: Url,
    /// Chosen variant, present only when the input was a master playlist.
    pub variant: Option<Url>,
    /// Absolute segment URLs in playback order. May be empty.
    pub segments: Vec<Url>,
}

/// Fetches and parses live playlists.
#[derive(Debug, Clone, Default)]
pub struct PlaylistResolver {
    client: Client,
}

impl PlaylistResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolve `master` to its active playlist and segment list.
    ///
    /// Any non-success response fails immediately; retrying is the
    /// caller's decision.
    pub async fn resolve(&self, master: &Url) -> Result<ResolvedPlaylist> {
        let content = fetch_text(&self.client, master).await?;

        let (playlist_url, variant, content) = match find_variant(&content, master)? {
            Some(variant) => {
                info!(variant = %variant, "Variant playlist selected");
                let text = fetch_text(&self.client, &variant).await?;
                (variant.clone(), Some(variant), text)
            }
            None => (master.clone(), None, content),
        };

        let segments = segment_urls(&content, &playlist_url);
        info!(
            playlist = %playlist_url,
            segments = segments.len(),
            "Playlist resolved"
        );

        Ok(ResolvedPlaylist { playlist_url, variant, segments })
    }
}

async fn fetch_text(client: &Client, url: &Url) -> Result<String> {
    debug!(url = %url, "Fetching playlist");
    let resp = client.get(url.clone()).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(RecorderError::Fetch { url: url.to_string(), status: status.as_u16() });
    }
    Ok(resp.text().await?)
}

/// Non-comment, non-blank lines of a playlist.
fn uri_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// First sub-playlist reference in document order, resolved against `base`.
pub fn find_variant(content: &str, base: &Url) -> Result<Option<Url>> {
    uri_lines(content)
        .find(|line| line.ends_with(PLAYLIST_EXT))
        .map(|line| base.join(line))
        .transpose()
        .map_err(RecorderError::from)
}

/// All segment references in document order, resolved against `base`.
///
/// A reference that cannot be resolved is logged and skipped.
pub fn segment_urls(content: &str, base: &Url) -> Vec<Url> {
    uri_lines(content)
        .filter(|line| line.ends_with(SEGMENT_EXT))
        .filter_map(|line| match base.join(line) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(segment = line, error = %e, "Unresolvable segment reference, skipping");
                None
            }
        })
        .collect()
}
