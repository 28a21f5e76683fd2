// src/session.rs - Portable motion record: frames, sealing, export/import
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::{BodyPose, Landmark};

pub const SESSION_RECORD_TYPE: &str = "video_mocap";
pub const SESSION_RECORD_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not a motion capture record (type {0:?})")]
    WrongType(String),
    #[error("unsupported record version {0:?}")]
    WrongVersion(String),
    #[error("frame count mismatch: header says {header}, record holds {actual}")]
    FrameCountMismatch { header: u32, actual: usize },
    #[error("malformed session record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Extraction parameters recorded alongside the frames they produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSettings {
    pub fps: f64,
    pub track_body: bool,
    pub track_face: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            fps: 10.0,
            track_body: true,
            track_face: true,
        }
    }
}

/// Timestamps are stored at 0.1 ms precision.
pub fn round_time(time: f64) -> f64 {
    (time * 10_000.0).round() / 10_000.0
}

/// One extraction step. A modality with no detection is `None`, never a
/// partially filled set; consumers treat `None` as "no data" and skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub index: u32,
    pub time: f64,
    pub body: Option<Vec<Landmark>>,
    pub face: Option<Vec<Landmark>>,
}

impl Frame {
    pub fn new(index: u32, time: f64, body: Option<Vec<Landmark>>, face: Option<Vec<Landmark>>) -> Self {
        Self {
            index,
            time: round_time(time),
            body,
            face,
        }
    }

    pub fn has_detection(&self) -> bool {
        self.body.is_some() || self.face.is_some()
    }

    /// Named view of the frame's body landmarks, when present and complete.
    pub fn body_pose(&self) -> Option<BodyPose> {
        self.body.as_deref().and_then(BodyPose::from_landmarks)
    }
}

/// Frames accumulated by a run that has not been sealed. Cancellation hands
/// the draft back to the caller; only sealing produces an exportable
/// `Session`.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub source: String,
    pub settings: ExtractionSettings,
    frames: Vec<Frame>,
}

impl SessionDraft {
    pub fn new(source: impl Into<String>, settings: ExtractionSettings) -> Self {
        Self {
            source: source.into(),
            settings,
            frames: Vec::new(),
        }
    }

    /// Appends one frame. Frames must arrive in strictly increasing time
    /// order.
    pub fn push(&mut self, frame: Frame) {
        debug_assert!(
            self.frames.last().map_or(true, |last| last.time < frame.time),
            "frames must be pushed in time order"
        );
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn detected_frames(&self) -> u32 {
        self.frames.iter().filter(|f| f.has_detection()).count() as u32
    }

    /// Seals the draft into an immutable session record covering `duration`
    /// seconds of source material.
    pub fn seal(self, duration: f64) -> Session {
        let detected_frames = self.detected_frames();
        Session {
            record_type: SESSION_RECORD_TYPE.to_string(),
            version: SESSION_RECORD_VERSION.to_string(),
            source: self.source,
            settings: self.settings,
            frame_count: self.frames.len() as u32,
            duration: round_time(duration),
            detected_frames,
            frames: self.frames,
        }
    }
}

/// A sealed extraction result in the portable interchange shape. Field
/// order matters to keep exported files diffable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "type")]
    record_type: String,
    version: String,
    pub source: String,
    pub settings: ExtractionSettings,
    pub frame_count: u32,
    pub duration: f64,
    pub detected_frames: u32,
    frames: Vec<Frame>,
}

impl Session {
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and validates an exported record. Wrong type, wrong version
    /// and a frame count disagreeing with the frame array are all rejected.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let session: Session = serde_json::from_str(json)?;
        session.validate()?;
        Ok(session)
    }

    fn validate(&self) -> Result<(), SessionError> {
        if self.record_type != SESSION_RECORD_TYPE {
            return Err(SessionError::WrongType(self.record_type.clone()));
        }
        if self.version != SESSION_RECORD_VERSION {
            return Err(SessionError::WrongVersion(self.version.clone()));
        }
        if self.frame_count as usize != self.frames.len() {
            return Err(SessionError::FrameCountMismatch {
                header: self.frame_count,
                actual: self.frames.len(),
            });
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}
