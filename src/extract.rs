// src/extract.rs - Frame extraction engine: seekable source to timestamped landmark frames
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use tokio::task::yield_now;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::detector::{DetectorError, DetectorOptions, DetectorSlot};
use crate::session::{ExtractionSettings, Frame, Session, SessionDraft};
use crate::video::{FrameSource, VideoError};

/// Progress is too noisy below this fraction for a stable estimate; the
/// ETA reads 0 until it is passed.
const ETA_MIN_PROGRESS: f32 = 0.01;

/// How many frames the engine processes before handing control back to the
/// scheduler.
const YIELD_EVERY: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPhase {
    Idle,
    Initializing,
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("nothing to extract: body and face tracking are both disabled")]
    NoModalities,
    #[error("extraction rate must be positive (got {0})")]
    InvalidRate(f64),
    #[error("detector initialization failed: {0}")]
    DetectorInit(#[source] DetectorError),
    #[error("video access at {time:.3}s failed: {source}")]
    Seek {
        time: f64,
        #[source]
        source: VideoError,
    },
    #[error("{modality} detection at {time:.3}s failed: {source}")]
    Detection {
        modality: &'static str,
        time: f64,
        #[source]
        source: DetectorError,
    },
}

#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub phase: ExtractionPhase,
    /// Fraction of the source covered so far, 0 to 1.
    pub progress: f32,
    pub eta_seconds: f64,
    pub frames_done: u32,
    pub message: String,
}

/// Shared view of a run's progress: the engine writes, the host polls.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<Mutex<ProgressReport>>,
}

impl ProgressHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressReport {
                phase: ExtractionPhase::Idle,
                progress: 0.0,
                eta_seconds: 0.0,
                frames_done: 0,
                message: String::new(),
            })),
        }
    }

    pub fn report(&self) -> ProgressReport {
        self.inner.lock().unwrap().clone()
    }

    pub fn phase(&self) -> ExtractionPhase {
        self.inner.lock().unwrap().phase
    }

    fn set_phase(&self, phase: ExtractionPhase, message: &str) {
        let mut report = self.inner.lock().unwrap();
        report.phase = phase;
        report.message = message.to_string();
    }

    fn update(&self, progress: f32, eta_seconds: f64, frames_done: u32) {
        let mut report = self.inner.lock().unwrap();
        report.progress = progress;
        report.eta_seconds = eta_seconds;
        report.frames_done = frames_done;
    }
}

/// How a run ended: a sealed session on completion, the unsealed draft when
/// the caller cancelled. Failures are errors, not outcomes, and discard the
/// draft.
#[derive(Debug)]
pub enum ExtractionOutcome {
    Completed(Session),
    Cancelled(SessionDraft),
}

/// Drives a seekable source frame by frame through the enabled detectors.
///
/// One logical task: every seek and every detection is awaited before the
/// next frame starts, so frames enter the draft strictly in time order and
/// per-frame results can never interleave.
pub struct ExtractionEngine {
    body: DetectorSlot,
    face: DetectorSlot,
    options: DetectorOptions,
    initialized: bool,
    progress: ProgressHandle,
}

impl ExtractionEngine {
    /// Modality slots are fixed for the engine's lifetime; a disabled slot
    /// stays disabled across runs.
    pub fn new(body: DetectorSlot, face: DetectorSlot, options: DetectorOptions) -> Self {
        Self {
            body,
            face,
            options,
            initialized: false,
            progress: ProgressHandle::new(),
        }
    }

    /// Handle for polling progress, ETA and phase while `run` is in flight.
    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    /// Samples `source` at `fps` from time zero until the source duration is
    /// reached, detecting on every sampled frame.
    ///
    /// Cancellation is observed once per iteration, at the top: an in-flight
    /// seek or detection finishes first, so at most one extra frame lands in
    /// the draft after `cancel` fires.
    pub async fn run<S>(
        &mut self,
        source: &mut S,
        fps: f64,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome, ExtractError>
    where
        S: FrameSource,
    {
        if !self.body.is_enabled() && !self.face.is_enabled() {
            return Err(self.fail(ExtractError::NoModalities));
        }
        if fps <= 0.0 {
            return Err(self.fail(ExtractError::InvalidRate(fps)));
        }
        self.initialize().await?;

        let settings = ExtractionSettings {
            fps,
            track_body: self.body.is_enabled(),
            track_face: self.face.is_enabled(),
        };
        let duration = source.duration();
        let step = 1.0 / fps;
        let mut draft = SessionDraft::new(source.describe(), settings);
        let started = Instant::now();

        info!(source = %draft.source, fps, duration, "extraction started");
        self.progress.set_phase(ExtractionPhase::Running, "Extracting frames");

        let mut index: u32 = 0;
        loop {
            let time = index as f64 * step;
            if time >= duration {
                break;
            }
            if cancel.is_cancelled() {
                info!(frames = draft.len(), "extraction cancelled, draft handed back");
                self.progress.set_phase(ExtractionPhase::Cancelled, "Cancelled");
                return Ok(ExtractionOutcome::Cancelled(draft));
            }

            if let Err(e) = source.seek(time).await {
                return Err(self.fail(ExtractError::Seek { time, source: e }));
            }
            let image = match source.current_frame() {
                Ok(image) => image,
                Err(e) => return Err(self.fail(ExtractError::Seek { time, source: e })),
            };

            // Detector contract: an empty set means no detection.
            let body = match self.body.detect(&image).await {
                Ok(result) => result.filter(|set| !set.is_empty()),
                Err(e) => {
                    return Err(self.fail(ExtractError::Detection {
                        modality: "body",
                        time,
                        source: e,
                    }))
                }
            };
            let face = match self.face.detect(&image).await {
                Ok(result) => result.filter(|set| !set.is_empty()),
                Err(e) => {
                    return Err(self.fail(ExtractError::Detection {
                        modality: "face",
                        time,
                        source: e,
                    }))
                }
            };

            debug!(index, time, body = body.is_some(), face = face.is_some(), "frame extracted");
            draft.push(Frame::new(index, time, body, face));

            let progress = (time / duration) as f32;
            let elapsed = started.elapsed().as_secs_f64();
            let eta = if progress > ETA_MIN_PROGRESS {
                elapsed / progress as f64 * (1.0 - progress as f64)
            } else {
                0.0
            };
            self.progress.update(progress, eta, index + 1);

            index += 1;
            if index % YIELD_EVERY == 0 {
                yield_now().await;
            }
        }

        let detected = draft.detected_frames();
        let session = draft.seal(duration);
        self.progress.set_phase(ExtractionPhase::Completed, "Extraction complete");
        self.progress.update(1.0, 0.0, session.frame_count);
        info!(frames = session.frame_count, detected, "extraction complete");
        Ok(ExtractionOutcome::Completed(session))
    }

    async fn initialize(&mut self) -> Result<(), ExtractError> {
        if self.initialized {
            return Ok(());
        }
        self.progress
            .set_phase(ExtractionPhase::Initializing, "Loading detector models");
        if let Err(e) = self.body.configure(&self.options).await {
            return Err(self.fail(ExtractError::DetectorInit(e)));
        }
        if let Err(e) = self.face.configure(&self.options).await {
            return Err(self.fail(ExtractError::DetectorInit(e)));
        }
        self.initialized = true;
        Ok(())
    }

    fn fail(&self, err: ExtractError) -> ExtractError {
        error!(error = %err, "extraction failed");
        self.progress.set_phase(ExtractionPhase::Failed, &err.to_string());
        err
    }
}
