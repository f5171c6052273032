// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Capture loop: one recording invocation for one camera.
//!
//! ```text
//! Idle ─▶ Opening ──────────────▶ StreamOpenFailed
//!            │
//!            ▼
//!        Streaming ─┬─▶ Completed          (elapsed >= duration)
//!                   ├─▶ StreamReadFailed   (read or write failure, EOS)
//!                   └─▶ UserInterrupted    ('q' on the display)
//! ```
//!
//! Frame `n` (zero-based over every frame read) is written iff
//! `n % frame_skip == 0`, so the first frame is always kept. The duration
//! is checked once per read cycle against wall-clock time.
//!
//! Source, writer and display are owned values: each one is released
//! exactly once, on every exit path, when it goes out of scope.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::time::Instant;
use tracing::{error, info, warn};
use url::Url;

use crate::error::Result;
use crate::source::{CameraSource, CodecTag};

/// A decoded frame in packed BGR layout.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn size(&self) -> FrameSize {
        FrameSize { width: self.width, height: self.height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// Parameters of the output container.
#[derive(Debug, Clone)]
pub struct WriterSpec {
    pub path: PathBuf,
    pub codec: CodecTag,
    pub frame_rate: f64,
    pub size: FrameSize,
}

/// An opened live source.
#[async_trait]
pub trait FrameSource: Send {
    /// Frame size negotiated while opening.
    fn frame_size(&self) -> FrameSize;

    /// Read the next frame. Errors end the recording.
    async fn read_frame(&mut self) -> Result<Frame>;
}

/// An output container accepting frames in order.
pub trait FrameWriter: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the container.
    fn finish(self) -> Result<()>
    where
        Self: Sized;
}

/// Interactive display surface.
pub trait Preview: Send {
    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Non-blocking check for the interrupt key.
    fn interrupt_requested(&mut self) -> bool;
}

/// Factory for sources, writers and displays.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    type Source: FrameSource;
    /// Finalized on the blocking pool, so it must outlive the caller.
    type Writer: FrameWriter + 'static;
    type Preview: Preview;

    async fn open_source(&self, url: &Url) -> Result<Self::Source>;

    fn create_writer(&self, spec: &WriterSpec) -> Result<Self::Writer>;

    fn open_preview(&self, source_id: &str, size: FrameSize) -> Result<Self::Preview>;
}

/// Terminal state of a capture invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Completed,
    StreamOpenFailed,
    StreamReadFailed,
    UserInterrupted,
}

/// Everything one capture invocation needs.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub source_id: String,
    pub url: Url,
    pub output: PathBuf,
    pub codec: CodecTag,
    pub frame_rate: f64,
    pub duration: Duration,
    pub frame_skip: u32,
    pub display: bool,
}

impl CaptureRequest {
    pub fn for_source(source: &CameraSource, output: PathBuf) -> Self {
        Self {
            source_id: source.id.clone(),
            url: source.url.clone(),
            output,
            codec: source.codec,
            frame_rate: source.frame_rate,
            duration: source.duration,
            frame_skip: source.frame_skip,
            display: source.display,
        }
    }
}

/// Per-invocation counters. Lives only as long as the capture loop.
#[derive(Debug)]
pub struct RecordingSession {
    pub source_id: String,
    pub output: PathBuf,
    pub started_at: DateTime<Local>,
    started: Instant,
    frame_skip: u64,
    pub frames_read: u64,
    pub frames_written: u64,
}

impl RecordingSession {
    pub fn new(source_id: &str, output: &Path, frame_skip: u32) -> Self {
        Self {
            source_id: source_id.to_string(),
            output: output.to_path_buf(),
            started_at: Local::now(),
            started: Instant::now(),
            frame_skip: u64::from(frame_skip.max(1)),
            frames_read: 0,
            frames_written: 0,
        }
    }

    /// Count one frame read; returns whether it is kept.
    pub fn sample(&mut self) -> bool {
        let keep = self.frames_read % self.frame_skip == 0;
        self.frames_read += 1;
        keep
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What a capture invocation reports back to its caller.
#[derive(Debug, Clone)]
pub struct RecordingReport {
    pub source_id: String,
    pub output: PathBuf,
    pub status: CaptureStatus,
    pub started_at: DateTime<Local>,
    pub frames_read: u64,
    pub frames_written: u64,
    pub elapsed: Duration,
}

impl RecordingReport {
    fn unopened(req: &CaptureRequest) -> Self {
        Self {
            source_id: req.source_id.clone(),
            output: req.output.clone(),
            status: CaptureStatus::StreamOpenFailed,
            started_at: Local::now(),
            frames_read: 0,
            frames_written: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Run one capture invocation to a terminal state.
///
/// Never fails: every error becomes a [`CaptureStatus`] plus a log entry.
pub async fn record<B: MediaBackend>(backend: &B, req: &CaptureRequest) -> RecordingReport {
    info!(camera = req.source_id, url = %req.url, "Starting recording");

    let mut source = match backend.open_source(&req.url).await {
        Ok(s) => s,
        Err(e) => {
            error!(camera = req.source_id, error = %e, "Could not open video stream");
            return RecordingReport::unopened(req);
        }
    };

    let size = source.frame_size();
    info!(
        camera = req.source_id,
        width = size.width,
        height = size.height,
        "Video stream opened"
    );

    let mut writer = match open_writer(backend, req, size).await {
        Ok(w) => w,
        Err(e) => {
            error!(camera = req.source_id, output = ?req.output, error = %e, "Could not create output file");
            return RecordingReport::unopened(req);
        }
    };

    let mut preview = if req.display {
        match backend.open_preview(&req.source_id, size) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(camera = req.source_id, error = %e, "Display unavailable, recording without it");
                None
            }
        }
    } else {
        None
    };

    let mut session = RecordingSession::new(&req.source_id, &req.output, req.frame_skip);
    let status = stream_frames(&mut source, &mut writer, &mut preview, &mut session, req).await;

    // Teardown order: display, output, source.
    drop(preview);
    match tokio::task::spawn_blocking(move || writer.finish()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(camera = req.source_id, error = %e, "Output file was not finalized cleanly")
        }
        Err(e) => error!(camera = req.source_id, error = %e, "Output finalizer did not complete"),
    }
    drop(source);

    let elapsed = session.elapsed();
    info!(
        camera = req.source_id,
        status = ?status,
        started_at = %session.started_at.format("%Y-%m-%d %H:%M:%S"),
        elapsed_secs = elapsed.as_secs(),
        frames_read = session.frames_read,
        frames_written = session.frames_written,
        output = ?session.output,
        "Recording finished"
    );

    RecordingReport {
        source_id: session.source_id,
        output: session.output,
        status,
        started_at: session.started_at,
        frames_read: session.frames_read,
        frames_written: session.frames_written,
        elapsed,
    }
}

async fn open_writer<B: MediaBackend>(
    backend: &B,
    req: &CaptureRequest,
    size: FrameSize,
) -> Result<B::Writer> {
    if let Some(parent) = req.output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    backend.create_writer(&WriterSpec {
        path: req.output.clone(),
        codec: req.codec,
        frame_rate: req.frame_rate,
        size,
    })
}

async fn stream_frames<S, W, P>(
    source: &mut S,
    writer: &mut W,
    preview: &mut Option<P>,
    session: &mut RecordingSession,
    req: &CaptureRequest,
) -> CaptureStatus
where
    S: FrameSource,
    W: FrameWriter,
    P: Preview,
{
    loop {
        let frame = match source.read_frame().await {
            Ok(f) => f,
            Err(e) => {
                error!(
                    camera = req.source_id,
                    frames_read = session.frames_read,
                    error = %e,
                    "Failed to capture frame, stopping"
                );
                return CaptureStatus::StreamReadFailed;
            }
        };

        if session.sample() {
            if let Err(e) = writer.write_frame(&frame) {
                error!(camera = req.source_id, error = %e, "Failed to write frame, stopping");
                return CaptureStatus::StreamReadFailed;
            }
            session.frames_written += 1;

            if let Some(p) = preview.as_mut() {
                if let Err(e) = p.show(&frame) {
                    warn!(camera = req.source_id, error = %e, "Display update failed");
                }
            }
        }

        if session.elapsed() >= req.duration {
            info!(camera = req.source_id, "Recording duration reached");
            return CaptureStatus::Completed;
        }

        if let Some(p) = preview.as_mut() {
            if p.interrupt_requested() {
                info!(camera = req.source_id, "Recording interrupted by user");
                return CaptureStatus::UserInterrupted;
            }
        }
    }
}

/// Something that performs one recording into a given output path.
#[async_trait]
pub trait Recorder: Send {
    fn source_id(&self) -> &str;

    async fn record(&mut self, output: PathBuf) -> RecordingReport;
}

/// [`Recorder`] capturing a [`CameraSource`] through a [`MediaBackend`].
pub struct SourceRecorder<B> {
    backend: Arc<B>,
    source: CameraSource,
}

impl<B: MediaBackend> SourceRecorder<B> {
    pub fn new(backend: Arc<B>, source: CameraSource) -> Self {
        Self { backend, source }
    }
}

#[async_trait]
impl<B: MediaBackend> Recorder for SourceRecorder<B> {
    fn source_id(&self) -> &str {
        &self.source.id
    }

    async fn record(&mut self, output: PathBuf) -> RecordingReport {
        let req = CaptureRequest::for_source(&self.source, output);
        record(self.backend.as_ref(), &req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_always_kept() {
        let mut session = RecordingSession::new("cam", Path::new("out.avi"), 10);
        assert!(session.sample());
        for _ in 1..10 {
            assert!(!session.sample());
        }
        assert!(session.sample());
        assert_eq!(session.frames_read, 11);
    }

    #[test]
    fn test_skip_of_one_keeps_everything() {
        let mut session = RecordingSession::new("cam", Path::new("out.avi"), 1);
        assert!((0..5).all(|_| session.sample()));
    }

    #[test]
    fn test_sampled_count_is_ceiling() {
        for k in 1..=7u32 {
            for total in 0..=30u64 {
                let mut session = RecordingSession::new("cam", Path::new("out.avi"), k);
                let kept = (0..total).filter(|_| session.sample()).count() as u64;
                assert_eq!(kept, total.div_ceil(u64::from(k)), "k={k} total={total}");
            }
        }
    }
}
