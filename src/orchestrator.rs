// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Source orchestrator: one isolated execution unit per camera.
//!
//! ```text
//!            ┌─▶ unit CAM72 ─▶ capture | schedule ─┐
//! launch() ──┼─▶ unit CAM45 ─▶ capture | schedule ─┼──▶ join all ──▶ Vec<UnitReport>
//!            └─▶ unit CAM1017 ─▶ ...               ─┘
//! ```
//!
//! Units share nothing but the log sink. A unit that fails or panics is
//! reported after the join; the others are unaffected. Nothing is retried.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};
use url::Url;

use crate::capture::{MediaBackend, Recorder, RecordingReport, SourceRecorder};
use crate::error::Result;
use crate::fetcher::{FetchSummary, SegmentFetcher};
use crate::layout::RecordingLayout;
use crate::playlist::PlaylistResolver;
use crate::schedule::{Clock, ScheduleController, ScheduleSummary, ScheduleWindow, SystemClock};
use crate::source::CameraSource;

/// How each unit records its camera.
#[derive(Debug, Clone)]
pub enum UnitMode {
    /// One fixed-duration capture.
    Once,
    /// Captures driven by the schedule windows until the date changes.
    Scheduled { windows: Vec<ScheduleWindow>, poll_interval: Duration },
}

/// Terminal state of one execution unit.
#[derive(Debug)]
pub enum UnitOutcome {
    Recorded(RecordingReport),
    Scheduled(ScheduleSummary),
    Fetched(FetchSummary),
    Failed(String),
    Panicked(String),
}

#[derive(Debug)]
pub struct UnitReport {
    pub source_id: String,
    pub outcome: UnitOutcome,
}

/// Launches and joins one capture unit per camera.
pub struct SourceOrchestrator<B, C = SystemClock> {
    backend: Arc<B>,
    layout: RecordingLayout,
    mode: UnitMode,
    clock: C,
}

impl<B: MediaBackend + 'static> SourceOrchestrator<B, SystemClock> {
    pub fn new(backend: Arc<B>, layout: RecordingLayout, mode: UnitMode) -> Self {
        Self::with_clock(backend, layout, mode, SystemClock)
    }
}

impl<B, C> SourceOrchestrator<B, C>
where
    B: MediaBackend + 'static,
    C: Clock + Clone + 'static,
{
    pub fn with_clock(backend: Arc<B>, layout: RecordingLayout, mode: UnitMode, clock: C) -> Self {
        Self { backend, layout, mode, clock }
    }

    /// Run every source to completion.
    ///
    /// Returns one report per source, in input order, once all units are done.
    pub async fn launch(&self, sources: Vec<CameraSource>) -> Vec<UnitReport> {
        info!(units = sources.len(), mode = ?self.mode, "Launching execution units");

        let units = sources
            .into_iter()
            .map(|source| {
                let id = source.id.clone();
                let recorder = SourceRecorder::new(self.backend.clone(), source);
                let handle = tokio::spawn(run_unit(
                    recorder,
                    self.layout.clone(),
                    self.mode.clone(),
                    self.clock.clone(),
                ));
                info!(camera = id, "Execution unit started");
                (id, handle)
            })
            .collect();

        join_units(units).await
    }
}

async fn run_unit<R: Recorder, C: Clock>(
    mut recorder: R,
    layout: RecordingLayout,
    mode: UnitMode,
    clock: C,
) -> UnitOutcome {
    match mode {
        UnitMode::Once => {
            let output = layout.fixed_path(recorder.source_id(), clock.now());
            UnitOutcome::Recorded(recorder.record(output).await)
        }
        UnitMode::Scheduled { windows, poll_interval } => {
            let controller = ScheduleController::with_clock(windows, poll_interval, layout, clock);
            UnitOutcome::Scheduled(controller.run(&mut recorder).await)
        }
    }
}

/// Segment-download mode: resolve and fetch each source's live playlist
/// once, in parallel, into `<segment_dir>/<camera>/`.
pub async fn fetch_sources(
    resolver: PlaylistResolver,
    fetcher: SegmentFetcher,
    sources: Vec<CameraSource>,
    segment_dir: &Path,
) -> Vec<UnitReport> {
    info!(units = sources.len(), dir = ?segment_dir, "Launching segment downloads");

    let units = sources
        .into_iter()
        .map(|source| {
            let id = source.id.clone();
            let resolver = resolver.clone();
            let fetcher = fetcher.clone();
            let dest = segment_dir.join(&source.id);
            let handle = tokio::spawn(async move {
                match fetch_unit(&resolver, &fetcher, &source.url, &dest).await {
                    Ok(summary) => UnitOutcome::Fetched(summary),
                    Err(e) => {
                        error!(camera = source.id, error = %e, "Playlist unavailable, skipping");
                        UnitOutcome::Failed(e.to_string())
                    }
                }
            });
            (id, handle)
        })
        .collect();

    join_units(units).await
}

async fn fetch_unit(
    resolver: &PlaylistResolver,
    fetcher: &SegmentFetcher,
    url: &Url,
    dest: &Path,
) -> Result<FetchSummary> {
    let playlist = resolver.resolve(url).await?;
    fetcher.fetch_all(&playlist.segments, dest).await
}

/// Await every unit; failures and panics become outcomes, never errors.
async fn join_units(units: Vec<(String, JoinHandle<UnitOutcome>)>) -> Vec<UnitReport> {
    let mut reports = Vec::with_capacity(units.len());
    for (source_id, handle) in units {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!(camera = source_id, panic = message, "Execution unit panicked");
                UnitOutcome::Panicked(message)
            }
            Err(e) => {
                error!(camera = source_id, error = %e, "Execution unit aborted");
                UnitOutcome::Failed(e.to_string())
            }
        };
        reports.push(UnitReport { source_id, outcome });
    }
    info!(units = reports.len(), "All execution units finished");
    reports
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
