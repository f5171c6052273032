// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! GStreamer media backend.
//!
//! Each recording invocation runs up to three pipelines:
//!
//! ```text
//! source:  uridecodebin (hlsdemux …) → videoconvert → BGR → appsink
//! writer:  appsrc → videoconvert → <encoder> → <muxer> → filesink
//! display: appsrc → videoconvert → autovideosink
//! ```
//!
//! The source `appsink` forwards decoded frames through a bounded async
//! channel. The streaming thread blocks while the channel is full, so frames
//! are never dropped between the decoder and the capture loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use url::Url;

use crate::capture::{
    Frame, FrameSize, FrameSource, FrameWriter, MediaBackend, Preview, WriterSpec,
};
use crate::error::{RecorderError, Result};
use crate::source::CodecTag;

/// Decoded frames buffered between the streaming thread and the reader.
const FRAME_QUEUE: usize = 8;
/// How often a waiting reader checks the bus for pipeline errors.
const BUS_POLL: Duration = Duration::from_millis(100);
/// Upper bound for the muxer to flush after end-of-stream.
const EOS_WAIT_SECS: u64 = 5;

/// Encoder fragment for a four-character codec tag.
pub fn encoder_for(codec: &CodecTag) -> Option<&'static str> {
    match codec.as_str().to_ascii_uppercase().as_str() {
        "XVID" | "DIVX" | "FMP4" | "MP4V" => Some("avenc_mpeg4"),
        "MJPG" => Some("jpegenc"),
        "H264" | "X264" | "AVC1" => Some("x264enc tune=zerolatency ! h264parse"),
        _ => None,
    }
}

/// Muxer element for a container file extension.
pub fn muxer_for(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "avi" => Some("avimux"),
        "mkv" => Some("matroskamux"),
        "mp4" => Some("mp4mux"),
        "mov" => Some("qtmux"),
        "ts" => Some("mpegtsmux"),
        _ => None,
    }
}

/// [`MediaBackend`] built on GStreamer pipelines.
#[derive(Debug, Clone)]
pub struct GstBackend {
    open_timeout: Duration,
    read_timeout: Duration,
}

impl GstBackend {
    pub fn new(open_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        gst::init().map_err(|e| RecorderError::GStreamer(format!("gst::init: {e}")))?;
        Ok(Self { open_timeout, read_timeout })
    }
}

#[async_trait]
impl MediaBackend for GstBackend {
    type Source = CameraStream;
    type Writer = ContainerWriter;
    type Preview = PreviewWindow;

    async fn open_source(&self, url: &Url) -> Result<CameraStream> {
        CameraStream::connect(url, self.open_timeout, self.read_timeout).await
    }

    fn create_writer(&self, spec: &WriterSpec) -> Result<ContainerWriter> {
        ContainerWriter::create(spec)
    }

    fn open_preview(&self, source_id: &str, size: FrameSize) -> Result<PreviewWindow> {
        PreviewWindow::open(source_id, size)
    }
}

fn launch_pipeline(description: &str) -> std::result::Result<gst::Pipeline, String> {
    gst::parse::launch(description)
        .map_err(|e| format!("parse_launch: {e}"))?
        .downcast::<gst::Pipeline>()
        .map_err(|_| "Not a pipeline".to_string())
}

fn app_element<T: IsA<gst::Element>>(
    pipeline: &gst::Pipeline,
    name: &str,
) -> std::result::Result<T, String> {
    pipeline
        .by_name(name)
        .ok_or_else(|| format!("{name} not found"))?
        .downcast::<T>()
        .map_err(|_| format!("Cast of {name} failed"))
}

/// Pop a pending error message from the pipeline bus, if any.
fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let msg = pipeline.bus()?.pop_filtered(&[gst::MessageType::Error])?;
    match msg.view() {
        gst::MessageView::Error(err) => Some(format!("{} ({:?})", err.error(), err.debug())),
        _ => None,
    }
}

fn bgr_caps(size: FrameSize, frame_rate: Option<f64>) -> Result<gst::Caps> {
    let mut builder =
        gst_video::VideoInfo::builder(gst_video::VideoFormat::Bgr, size.width, size.height);
    if let Some(fps) = frame_rate {
        builder = builder.fps(gst::Fraction::new((fps * 1000.0).round() as i32, 1000));
    }
    builder
        .build()
        .and_then(|info| info.to_caps())
        .map_err(|e| RecorderError::GStreamer(format!("caps for {size:?}: {e}")))
}

fn frame_from_sample(sample: &gst::Sample) -> Option<Frame> {
    let info = gst_video::VideoInfo::from_caps(sample.caps()?).ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;
    Some(Frame {
        data: map.as_slice().to_vec(),
        width: info.width(),
        height: info.height(),
    })
}

fn buffer_from_frame(frame: &Frame) -> gst::Buffer {
    gst::Buffer::from_mut_slice(frame.data.clone())
}

/// Handle to a running decode pipeline for one live stream.
pub struct CameraStream {
    url: Url,
    pipeline: gst::Pipeline,
    rx: mpsc::Receiver<Frame>,
    /// First frame, consumed while opening to learn the frame size.
    pending: Option<Frame>,
    size: FrameSize,
    read_timeout: Duration,
}

impl CameraStream {
    /// Start decoding `url` and wait up to `open_timeout` for the first frame.
    pub async fn connect(url: &Url, open_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let open_err = |reason: String| RecorderError::SourceOpen { url: url.to_string(), reason };

        let pipeline_str = format!(
            "uridecodebin uri=\"{url}\" ! videoconvert ! video/x-raw,format=BGR ! \
             appsink name=sink sync=false max-buffers=4"
        );
        let pipeline = launch_pipeline(&pipeline_str).map_err(open_err)?;
        let appsink: gst_app::AppSink = app_element(&pipeline, "sink").map_err(open_err)?;

        let (tx, rx) = mpsc::channel::<Frame>(FRAME_QUEUE);
        // Taken on EOS so the reader sees a closed channel.
        let tx_slot = Arc::new(Mutex::new(Some(tx)));
        let sample_slot = tx_slot.clone();

        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let frame = frame_from_sample(&sample).ok_or(gst::FlowError::Error)?;
                    let Some(tx) = sample_slot.lock().clone() else {
                        return Err(gst::FlowError::Eos);
                    };
                    tx.blocking_send(frame).map_err(|_| gst::FlowError::Flushing)?;
                    Ok(gst::FlowSuccess::Ok)
                })
                .eos(move |_| {
                    tx_slot.lock().take();
                })
                .build(),
        );

        let mut stream = CameraStream {
            url: url.clone(),
            pipeline,
            rx,
            pending: None,
            size: FrameSize { width: 0, height: 0 },
            read_timeout,
        };

        if let Err(e) = stream.pipeline.set_state(gst::State::Playing) {
            let reason = bus_error(&stream.pipeline).unwrap_or_else(|| e.to_string());
            return Err(open_err(reason));
        }

        let first = stream.recv_within(open_timeout).await.map_err(open_err)?;
        stream.size = first.size();
        stream.pending = Some(first);
        info!(url = %url, "Source pipeline started");
        Ok(stream)
    }

    /// Wait up to `limit` for the next frame, watching the bus for errors.
    async fn recv_within(&mut self, limit: Duration) -> std::result::Result<Frame, String> {
        let deadline = Instant::now() + limit;
        loop {
            let wake = (Instant::now() + BUS_POLL).min(deadline);
            let received = tokio::select! {
                frame = self.rx.recv() => Some(frame),
                _ = sleep_until(wake) => None,
            };

            match received {
                Some(Some(frame)) => return Ok(frame),
                Some(None) => {
                    return Err(bus_error(&self.pipeline).unwrap_or_else(|| "end of stream".into()))
                }
                None => {
                    if let Some(err) = bus_error(&self.pipeline) {
                        return Err(err);
                    }
                    if Instant::now() >= deadline {
                        return Err(format!("no frame within {limit:?}"));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl FrameSource for CameraStream {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        let limit = self.read_timeout;
        self.recv_within(limit).await.map_err(RecorderError::StreamRead)
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        // Unblock a streaming thread waiting on a full channel before
        // the pipeline is shut down.
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        let _ = self.pipeline.set_state(gst::State::Null);
        info!(url = %self.url, "Source pipeline stopped");
    }
}

/// Encodes BGR frames into a container file.
pub struct ContainerWriter {
    path: PathBuf,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    frame_ns: u64,
    pushed: u64,
}

impl ContainerWriter {
    pub fn create(spec: &WriterSpec) -> Result<Self> {
        let encoder = encoder_for(&spec.codec).ok_or_else(|| {
            RecorderError::Writer(format!("unsupported codec '{}'", spec.codec))
        })?;
        let extension = spec.path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let muxer = muxer_for(extension).ok_or_else(|| {
            RecorderError::Writer(format!("unsupported container '{extension}'"))
        })?;

        let caps = bgr_caps(spec.size, Some(spec.frame_rate))?;
        let pipeline_str = format!(
            "appsrc name=src format=time ! videoconvert ! {encoder} ! {muxer} ! filesink name=out"
        );
        let pipeline = launch_pipeline(&pipeline_str).map_err(RecorderError::Writer)?;
        let appsrc: gst_app::AppSrc = app_element(&pipeline, "src").map_err(RecorderError::Writer)?;
        appsrc.set_caps(Some(&caps));
        let filesink = pipeline
            .by_name("out")
            .ok_or_else(|| RecorderError::Writer("filesink not found".into()))?;
        filesink.set_property("location", spec.path.to_string_lossy().to_string());

        let writer = ContainerWriter {
            path: spec.path.clone(),
            pipeline,
            appsrc,
            frame_ns: (1_000_000_000f64 / spec.frame_rate).round() as u64,
            pushed: 0,
        };
        writer
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| RecorderError::Writer(format!("set_state Playing: {e}")))?;

        info!(
            path = ?writer.path,
            codec = %spec.codec,
            muxer,
            fps = spec.frame_rate,
            "Output container opened"
        );
        Ok(writer)
    }
}

impl FrameWriter for ContainerWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if let Some(err) = bus_error(&self.pipeline) {
            return Err(RecorderError::Writer(err));
        }
        let mut buffer = buffer_from_frame(frame);
        if let Some(buf) = buffer.get_mut() {
            buf.set_pts(gst::ClockTime::from_nseconds(self.pushed * self.frame_ns));
            buf.set_duration(gst::ClockTime::from_nseconds(self.frame_ns));
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| RecorderError::Writer(format!("push_buffer: {e:?}")))?;
        self.pushed += 1;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        self.appsrc
            .end_of_stream()
            .map_err(|e| RecorderError::Writer(format!("end_of_stream: {e:?}")))?;

        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| RecorderError::Writer("pipeline has no bus".into()))?;
        for msg in bus.iter_timed(gst::ClockTime::from_seconds(EOS_WAIT_SECS)) {
            match msg.view() {
                gst::MessageView::Eos(..) => break,
                gst::MessageView::Error(err) => {
                    return Err(RecorderError::Writer(format!(
                        "{} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                _ => {}
            }
        }

        info!(path = ?self.path, frames = self.pushed, "Video saved");
        Ok(())
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
        debug!(path = ?self.path, "Writer pipeline stopped");
    }
}

/// On-screen display of sampled frames. Pressing `q` in the window
/// requests an interrupt.
pub struct PreviewWindow {
    source_id: String,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
}

impl PreviewWindow {
    pub fn open(source_id: &str, size: FrameSize) -> Result<Self> {
        let caps = bgr_caps(size, None)?;
        let pipeline = launch_pipeline(
            "appsrc name=src format=time is-live=true do-timestamp=true ! \
             videoconvert ! autovideosink sync=false",
        )
        .map_err(RecorderError::GStreamer)?;
        let appsrc: gst_app::AppSrc =
            app_element(&pipeline, "src").map_err(RecorderError::GStreamer)?;
        appsrc.set_caps(Some(&caps));

        let window = PreviewWindow { source_id: source_id.to_string(), pipeline, appsrc };
        window
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| RecorderError::GStreamer(format!("set_state Playing: {e}")))?;
        info!(camera = source_id, "Display opened, press 'q' to stop");
        Ok(window)
    }
}

impl Preview for PreviewWindow {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        self.appsrc
            .push_buffer(buffer_from_frame(frame))
            .map(|_| ())
            .map_err(|e| RecorderError::GStreamer(format!("push_buffer: {e:?}")))
    }

    fn interrupt_requested(&mut self) -> bool {
        let Some(bus) = self.pipeline.bus() else {
            return false;
        };
        // Key presses reach the bus as navigation messages posted by the sink.
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Element]) {
            let Ok(gst_video::NavigationMessage::Event { event, .. }) =
                gst_video::NavigationMessage::parse(&msg)
            else {
                continue;
            };
            if let Ok(gst_video::NavigationEvent::KeyPress { key, .. }) =
                gst_video::NavigationEvent::parse(&event)
            {
                if key.eq_ignore_ascii_case("q") {
                    return true;
                }
            }
        }
        false
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
        debug!(camera = self.source_id, "Display closed");
    }
}
