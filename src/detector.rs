// src/detector.rs - Landmark detector contract and the built-in simulated detector
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::{BodyLandmark, Landmark, FACE_LANDMARK_MIN};

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector used before configure()")]
    NotInitialized,
    #[error("model loading failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),
}

/// Model complexity trade-off, serialized as 0 (lite), 1 (full) or 2
/// (heavy) for interchange with detector runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ModelComplexity {
    Lite,
    Full,
    Heavy,
}

impl From<ModelComplexity> for u8 {
    fn from(complexity: ModelComplexity) -> u8 {
        match complexity {
            ModelComplexity::Lite => 0,
            ModelComplexity::Full => 1,
            ModelComplexity::Heavy => 2,
        }
    }
}

impl TryFrom<u8> for ModelComplexity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ModelComplexity::Lite),
            1 => Ok(ModelComplexity::Full),
            2 => Ok(ModelComplexity::Heavy),
            other => Err(format!("model complexity must be 0, 1 or 2 (got {other})")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorOptions {
    pub complexity: ModelComplexity,
    /// Temporal smoothing inside the detector, where the runtime supports it.
    pub smoothing: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// Upper bound on instances detected per frame; `None` means runtime
    /// default (a single subject).
    pub max_instances: Option<u32>,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            complexity: ModelComplexity::Full,
            smoothing: true,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            max_instances: None,
        }
    }
}

impl DetectorOptions {
    fn validate(&self) -> Result<(), DetectorError> {
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(DetectorError::InvalidConfig(format!(
                "min_detection_confidence must be in [0, 1] (got {})",
                self.min_detection_confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.min_tracking_confidence) {
            return Err(DetectorError::InvalidConfig(format!(
                "min_tracking_confidence must be in [0, 1] (got {})",
                self.min_tracking_confidence
            )));
        }
        Ok(())
    }
}

/// Detection modality. The pipeline treats body and face independently; a
/// detector instance serves exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Body,
    Face,
}

impl Modality {
    pub fn name(&self) -> &'static str {
        match self {
            Modality::Body => "body",
            Modality::Face => "face",
        }
    }
}

/// Contract for one landmark detector.
///
/// Exactly one result arrives per submitted frame. `Ok(None)` means the
/// detector ran and found nothing, which is routine; `Err` aborts the
/// surrounding run. `configure` must complete before the first `detect`.
#[async_trait]
pub trait LandmarkDetector: Send {
    async fn configure(&mut self, options: &DetectorOptions) -> Result<(), DetectorError>;

    async fn detect(
        &mut self,
        frame: &DynamicImage,
    ) -> Result<Option<Vec<Landmark>>, DetectorError>;
}

/// Per-modality detector selection, fixed once at run start. A disabled
/// slot reports no detections and never fails.
pub enum DetectorSlot {
    Enabled(Box<dyn LandmarkDetector>),
    Disabled,
}

impl DetectorSlot {
    pub fn enabled(detector: impl LandmarkDetector + 'static) -> Self {
        DetectorSlot::Enabled(Box::new(detector))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, DetectorSlot::Enabled(_))
    }

    pub async fn configure(&mut self, options: &DetectorOptions) -> Result<(), DetectorError> {
        match self {
            DetectorSlot::Enabled(detector) => detector.configure(options).await,
            DetectorSlot::Disabled => Ok(()),
        }
    }

    pub async fn detect(
        &mut self,
        frame: &DynamicImage,
    ) -> Result<Option<Vec<Landmark>>, DetectorError> {
        match self {
            DetectorSlot::Enabled(detector) => detector.detect(frame).await,
            DetectorSlot::Disabled => Ok(None),
        }
    }
}

/// Reference positions for an upright figure facing the camera, indexed by
/// the 33-point schema. Detector-space coordinates: x right, y down.
const BODY_REFERENCE: [[f32; 3]; BodyLandmark::COUNT] = [
    [0.500, 0.180, -0.050], // nose
    [0.520, 0.160, -0.040],
    [0.530, 0.160, -0.040],
    [0.540, 0.160, -0.040],
    [0.480, 0.160, -0.040],
    [0.470, 0.160, -0.040],
    [0.460, 0.160, -0.040],
    [0.560, 0.170, 0.000], // ears
    [0.440, 0.170, 0.000],
    [0.520, 0.200, -0.030], // mouth
    [0.480, 0.200, -0.030],
    [0.580, 0.300, 0.000], // shoulders
    [0.420, 0.300, 0.000],
    [0.620, 0.420, 0.020], // elbows
    [0.380, 0.420, 0.020],
    [0.640, 0.530, 0.040], // wrists
    [0.360, 0.530, 0.040],
    [0.655, 0.565, 0.050], // hands
    [0.345, 0.565, 0.050],
    [0.650, 0.570, 0.050],
    [0.350, 0.570, 0.050],
    [0.640, 0.560, 0.040],
    [0.360, 0.560, 0.040],
    [0.550, 0.550, 0.000], // hips
    [0.450, 0.550, 0.000],
    [0.555, 0.720, 0.010], // knees
    [0.445, 0.720, 0.010],
    [0.560, 0.880, 0.020], // ankles
    [0.440, 0.880, 0.020],
    [0.565, 0.905, 0.030], // heels
    [0.435, 0.905, 0.030],
    [0.585, 0.925, -0.020], // foot tips
    [0.415, 0.925, -0.020],
];

/// Stand-in detector that synthesizes plausible landmark sets. Used where
/// no real landmark model is linked and throughout the pipeline tests.
/// Deterministic: output depends only on the internal frame counter, never
/// on the submitted pixels.
pub struct SimulatedDetector {
    modality: Modality,
    frame_counter: u64,
    visible_indices: Option<Vec<usize>>,
    configured: bool,
}

impl SimulatedDetector {
    pub fn body() -> Self {
        Self::new(Modality::Body)
    }

    pub fn face() -> Self {
        Self::new(Modality::Face)
    }

    fn new(modality: Modality) -> Self {
        Self {
            modality,
            frame_counter: 0,
            visible_indices: None,
            configured: false,
        }
    }

    /// Restricts visibility scores to the given landmark indices; every
    /// other point is emitted without a score. Body modality only.
    pub fn with_visible_indices(mut self, indices: &[usize]) -> Self {
        self.visible_indices = Some(indices.to_vec());
        self
    }
}

#[async_trait]
impl LandmarkDetector for SimulatedDetector {
    async fn configure(&mut self, options: &DetectorOptions) -> Result<(), DetectorError> {
        options.validate()?;
        self.configured = true;
        Ok(())
    }

    async fn detect(
        &mut self,
        _frame: &DynamicImage,
    ) -> Result<Option<Vec<Landmark>>, DetectorError> {
        if !self.configured {
            return Err(DetectorError::NotInitialized);
        }
        let t = self.frame_counter as f32 * 0.12;
        self.frame_counter += 1;
        let landmarks = match self.modality {
            Modality::Body => simulated_body(t, self.visible_indices.as_deref()),
            Modality::Face => simulated_face(t),
        };
        Ok(Some(landmarks))
    }
}

fn simulated_body(t: f32, visible: Option<&[usize]>) -> Vec<Landmark> {
    let mut points = BODY_REFERENCE;

    // Arms swing out of phase, legs sway slightly.
    points[BodyLandmark::LeftElbow as usize][1] += 0.03 * t.sin();
    points[BodyLandmark::LeftWrist as usize][0] += 0.05 * (t * 0.5).cos();
    points[BodyLandmark::LeftWrist as usize][1] += 0.05 * t.sin();
    points[BodyLandmark::RightElbow as usize][1] += 0.03 * (t + 1.5).sin();
    points[BodyLandmark::RightWrist as usize][0] -= 0.05 * (t * 0.5 + 1.0).cos();
    points[BodyLandmark::RightWrist as usize][1] += 0.05 * (t + 1.5).sin();
    points[BodyLandmark::LeftKnee as usize][0] += 0.01 * (t * 0.7).sin();
    points[BodyLandmark::RightKnee as usize][0] -= 0.01 * (t * 0.7).sin();

    points
        .iter()
        .enumerate()
        .map(|(i, p)| Landmark::new(p[0], p[1], p[2], simulated_visibility(i, visible)))
        .collect()
}

fn simulated_visibility(index: usize, visible: Option<&[usize]>) -> Option<f32> {
    if let Some(list) = visible {
        return if list.contains(&index) { Some(1.0) } else { None };
    }
    // Torso is seen best, extremities worst, as a real detector would score.
    let score = match index {
        0..=10 => 0.98,
        11 | 12 | 23 | 24 => 0.95,
        13..=16 => 0.90,
        25..=28 => 0.90,
        _ => 0.85,
    };
    Some(score)
}

fn simulated_face(t: f32) -> Vec<Landmark> {
    // A coarse oval of rings around the head. Face points carry no
    // visibility score, matching the face mesh runtimes.
    let bob = 0.002 * t.sin();
    (0..FACE_LANDMARK_MIN)
        .map(|i| {
            let angle = i as f32 / FACE_LANDMARK_MIN as f32 * std::f32::consts::TAU;
            let ring = 0.015 + 0.045 * ((i % 7) as f32 / 7.0);
            Landmark::new(
                0.5 + ring * angle.cos(),
                0.18 + ring * 1.3 * angle.sin() + bob,
                -0.02,
                None,
            )
        })
        .collect()
}
