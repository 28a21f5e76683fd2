// src/live.rs - Continuous camera capture through a detector to a consumer
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::detector::{DetectorError, DetectorOptions, LandmarkDetector};
use crate::pose::Landmark;
use crate::video::CameraFrame;

/// Counters for one live run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveStats {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub detections: u64,
}

/// Drives camera frames through one detector and hands each result to a
/// consumer callback, typically a rig-mapper closure.
///
/// There is no queue in front of the detector: while a detection is in
/// flight the feed keeps overwriting the latest-value channel, and frames
/// published in that window are never seen. Detector throughput paces the
/// loop, not the camera.
pub struct LiveCapture<D: LandmarkDetector> {
    detector: D,
    options: DetectorOptions,
    configured: bool,
}

impl<D: LandmarkDetector> LiveCapture<D> {
    pub fn new(detector: D, options: DetectorOptions) -> Self {
        Self {
            detector,
            options,
            configured: false,
        }
    }

    /// Runs until `cancel` fires or the feed closes. Nothing is recorded on
    /// this path; results exist only for the consumer. A detector error
    /// aborts the run.
    pub async fn run<F>(
        &mut self,
        feed: &mut watch::Receiver<Option<CameraFrame>>,
        mut consumer: F,
        cancel: &CancellationToken,
    ) -> Result<LiveStats, DetectorError>
    where
        F: FnMut(&CameraFrame, Option<Vec<Landmark>>),
    {
        if !self.configured {
            self.detector.configure(&self.options).await?;
            self.configured = true;
        }

        let mut stats = LiveStats::default();
        let mut last_id: Option<u64> = None;
        info!("live capture started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(
                        processed = stats.frames_processed,
                        dropped = stats.frames_dropped,
                        "live capture stopped"
                    );
                    break;
                }
                changed = feed.changed() => {
                    if changed.is_err() {
                        info!("camera feed closed, live capture stopped");
                        break;
                    }
                }
            }

            let frame = match feed.borrow_and_update().clone() {
                Some(frame) => frame,
                None => continue,
            };

            // Frame ids count every published frame; gaps are frames the
            // channel overwrote while the detector was busy.
            if let Some(previous) = last_id {
                let missed = frame.id.saturating_sub(previous + 1);
                if missed > 0 {
                    stats.frames_dropped += missed;
                    debug!(missed, "detector lagging, frames dropped");
                }
            }
            last_id = Some(frame.id);

            let result = self.detector.detect(&frame.image).await?;
            stats.frames_processed += 1;
            if result.is_some() {
                stats.detections += 1;
            }
            consumer(&frame, result);
        }

        Ok(stats)
    }
}
