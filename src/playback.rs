// src/playback.rs - Replays a sealed session against its source frames
use image::RgbaImage;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::overlay::OverlayRenderer;
use crate::session::Session;
use crate::video::{FrameSource, VideoError};

/// Scrub and replay over a sealed session: every step re-seeks the source to
/// the frame's recorded time and redraws the overlay from its landmarks.
///
/// The controller is the sole writer of the playback position; hosts read
/// `index` and `surface` between awaits.
pub struct PlaybackController<S: FrameSource> {
    session: Session,
    source: S,
    renderer: OverlayRenderer,
    surface: RgbaImage,
    playback_index: usize,
}

impl<S: FrameSource> PlaybackController<S> {
    pub fn new(
        session: Session,
        source: S,
        renderer: OverlayRenderer,
        surface_width: u32,
        surface_height: u32,
    ) -> Self {
        Self {
            session,
            source,
            renderer,
            surface: RgbaImage::new(surface_width, surface_height),
            playback_index: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.playback_index
    }

    pub fn frame_count(&self) -> usize {
        self.session.frames().len()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The most recently rendered overlay surface.
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Jumps to `index`, clamped into the frame range: seeks the source to
    /// that frame's recorded time and redraws the overlay. A seek on an
    /// empty session is ignored.
    pub async fn seek(&mut self, index: usize) -> Result<(), VideoError> {
        if self.session.frames().is_empty() {
            debug!("seek on empty session ignored");
            return Ok(());
        }
        let clamped = index.min(self.session.frames().len() - 1);
        let time = self.session.frames()[clamped].time;
        self.playback_index = clamped;
        self.source.seek(time).await?;
        let image = self.source.current_frame()?;
        let body = self.session.frames()[clamped].body.as_deref();
        self.renderer.render(&mut self.surface, &image, body);
        Ok(())
    }

    /// Advances frame by frame on a fixed-period timer, one period being
    /// `1 / (fps * speed)` seconds, and stops at the last frame rather than
    /// looping. Cancelling pauses: the position is kept so a later `play`
    /// resumes from it.
    pub async fn play(&mut self, speed: f64, cancel: &CancellationToken) -> Result<(), VideoError> {
        if self.session.frames().is_empty() || speed <= 0.0 || self.session.settings.fps <= 0.0 {
            return Ok(());
        }
        let period = Duration::from_secs_f64(
            (1.0 / (self.session.settings.fps * speed)).max(0.001),
        );
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(speed, period_ms = period.as_millis() as u64, "playback started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(index = self.playback_index, "playback paused");
                    break;
                }
                _ = ticker.tick() => {
                    if self.playback_index + 1 >= self.session.frames().len() {
                        info!("playback reached end");
                        break;
                    }
                    let next = self.playback_index + 1;
                    self.seek(next).await?;
                }
            }
        }
        Ok(())
    }
}
