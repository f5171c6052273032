//! Shared test doubles: an in-memory media backend that counts every
//! acquisition and release, and clocks for the scheduler.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use parking_lot::Mutex;
use url::Url;

use camrec::capture::{
    Frame, FrameSize, FrameSource, FrameWriter, MediaBackend, Preview, WriterSpec,
};
use camrec::error::{RecorderError, Result};
use camrec::schedule::Clock;
use camrec::source::CameraSource;

#[derive(Debug, Default)]
pub struct Counters {
    /// Thread the last writer was finalized on.
    pub finish_thread: Mutex<Option<ThreadId>>,
    pub sources_opened: AtomicUsize,
    pub sources_released: AtomicUsize,
    pub writers_created: AtomicUsize,
    pub writers_finished: AtomicUsize,
    pub writers_released: AtomicUsize,
    pub frames_written: AtomicUsize,
    pub previews_opened: AtomicUsize,
    pub previews_released: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub counters: Arc<Counters>,
    /// Frames available before reads fail; `None` means endless.
    pub frames: Option<u64>,
    /// Simulated latency of one read.
    pub read_delay: Duration,
    pub fail_open: bool,
    pub fail_writer: bool,
    /// Fail every write once this many frames have been written.
    pub fail_write_after: Option<u64>,
    pub fail_preview: bool,
    /// Interrupt after this many polls of the display.
    pub interrupt_after: Option<u32>,
    /// Panic while opening URLs containing this text.
    pub panic_on: Option<String>,
}

impl MockBackend {
    pub fn with_frames(frames: u64) -> Self {
        Self { frames: Some(frames), ..Default::default() }
    }

    pub fn endless(read_delay: Duration) -> Self {
        Self { frames: None, read_delay, ..Default::default() }
    }
}

pub struct MockSource {
    counters: Arc<Counters>,
    remaining: Option<u64>,
    read_delay: Duration,
}

#[async_trait]
impl FrameSource for MockSource {
    fn frame_size(&self) -> FrameSize {
        FrameSize { width: 4, height: 2 }
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        match self.remaining.as_mut() {
            Some(0) => return Err(RecorderError::StreamRead("end of stream".into())),
            Some(n) => *n -= 1,
            None => {}
        }
        Ok(Frame { data: vec![0u8; 4 * 2 * 3], width: 4, height: 2 })
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        bump(&self.counters.sources_released);
    }
}

pub struct MockWriter {
    counters: Arc<Counters>,
    written: u64,
    fail_after: Option<u64>,
}

impl FrameWriter for MockWriter {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        if self.fail_after.is_some_and(|limit| self.written >= limit) {
            return Err(RecorderError::Writer("disk full".into()));
        }
        self.written += 1;
        bump(&self.counters.frames_written);
        Ok(())
    }

    fn finish(self) -> Result<()> {
        *self.counters.finish_thread.lock() = Some(std::thread::current().id());
        bump(&self.counters.writers_finished);
        Ok(())
    }
}

impl Drop for MockWriter {
    fn drop(&mut self) {
        bump(&self.counters.writers_released);
    }
}

pub struct MockPreview {
    counters: Arc<Counters>,
    polls_left: Option<u32>,
}

impl Preview for MockPreview {
    fn show(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }

    fn interrupt_requested(&mut self) -> bool {
        match self.polls_left.as_mut() {
            Some(0) => true,
            Some(n) => {
                *n -= 1;
                false
            }
            None => false,
        }
    }
}

impl Drop for MockPreview {
    fn drop(&mut self) {
        bump(&self.counters.previews_released);
    }
}

#[async_trait]
impl MediaBackend for MockBackend {
    type Source = MockSource;
    type Writer = MockWriter;
    type Preview = MockPreview;

    async fn open_source(&self, url: &Url) -> Result<MockSource> {
        if let Some(marker) = &self.panic_on {
            if url.as_str().contains(marker.as_str()) {
                panic!("decoder crashed for {url}");
            }
        }
        if self.fail_open {
            return Err(RecorderError::SourceOpen {
                url: url.to_string(),
                reason: "connection refused".into(),
            });
        }
        bump(&self.counters.sources_opened);
        Ok(MockSource {
            counters: self.counters.clone(),
            remaining: self.frames,
            read_delay: self.read_delay,
        })
    }

    fn create_writer(&self, spec: &WriterSpec) -> Result<MockWriter> {
        if self.fail_writer {
            return Err(RecorderError::Writer("no encoder".into()));
        }
        std::fs::File::create(&spec.path)?;
        bump(&self.counters.writers_created);
        Ok(MockWriter {
            counters: self.counters.clone(),
            written: 0,
            fail_after: self.fail_write_after,
        })
    }

    fn open_preview(&self, _source_id: &str, _size: FrameSize) -> Result<MockPreview> {
        if self.fail_preview {
            return Err(RecorderError::GStreamer("no display".into()));
        }
        bump(&self.counters.previews_opened);
        Ok(MockPreview { counters: self.counters.clone(), polls_left: self.interrupt_after })
    }
}

pub fn camera(url: &str, frame_skip: u32, duration: Duration, display: bool) -> CameraSource {
    CameraSource::new(url, "XVID".parse().unwrap(), 20.0, frame_skip, duration, display)
        .expect("valid camera")
}

pub fn datetime(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 8, 29).unwrap().and_hms_opt(h, m, s).unwrap()
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Wall clock that moves with tokio's (pausable) time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    start: NaiveDateTime,
    base: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(start: NaiveDateTime) -> Self {
        Self { start, base: tokio::time::Instant::now() }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> NaiveDateTime {
        self.start + TimeDelta::from_std(self.base.elapsed()).unwrap()
    }
}

pub fn output_in(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}
