// src/pose.rs - Landmark frame model and pose normalization
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Face mesh landmark count range: 468 base points, up to 478 with iris
/// refinement enabled.
pub const FACE_LANDMARK_MIN: usize = 468;
pub const FACE_LANDMARK_MAX: usize = 478;

/// One detected anatomical point in detector space. `x`/`y` are normalized
/// image coordinates, `z` is relative depth. `visibility` is a confidence
/// proxy in [0, 1]; detectors that do not score a point leave it unset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: Option<f32>) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Missing visibility counts as zero: an unscored point never passes a
    /// visibility gate.
    pub fn visibility_or_zero(&self) -> f32 {
        self.visibility.unwrap_or(0.0)
    }

    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility_or_zero() >= threshold
    }

    /// Arithmetic midpoint of two landmarks. The combined visibility is the
    /// minimum of the pair and stays unset unless both constituents carry a
    /// score.
    pub fn midpoint(a: &Landmark, b: &Landmark) -> Landmark {
        let visibility = match (a.visibility, b.visibility) {
            (Some(va), Some(vb)) => Some(va.min(vb)),
            _ => None,
        };
        Landmark::new(
            (a.x + b.x) / 2.0,
            (a.y + b.y) / 2.0,
            (a.z + b.z) / 2.0,
            visibility,
        )
    }
}

/// The fixed 33-point body landmark schema. Raw sets are index-addressed, so
/// the discriminant values are load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BodyLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyLandmark {
    pub const COUNT: usize = 33;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEyeInner),
            2 => Some(Self::LeftEye),
            3 => Some(Self::LeftEyeOuter),
            4 => Some(Self::RightEyeInner),
            5 => Some(Self::RightEye),
            6 => Some(Self::RightEyeOuter),
            7 => Some(Self::LeftEar),
            8 => Some(Self::RightEar),
            9 => Some(Self::MouthLeft),
            10 => Some(Self::MouthRight),
            11 => Some(Self::LeftShoulder),
            12 => Some(Self::RightShoulder),
            13 => Some(Self::LeftElbow),
            14 => Some(Self::RightElbow),
            15 => Some(Self::LeftWrist),
            16 => Some(Self::RightWrist),
            17 => Some(Self::LeftPinky),
            18 => Some(Self::RightPinky),
            19 => Some(Self::LeftIndex),
            20 => Some(Self::RightIndex),
            21 => Some(Self::LeftThumb),
            22 => Some(Self::RightThumb),
            23 => Some(Self::LeftHip),
            24 => Some(Self::RightHip),
            25 => Some(Self::LeftKnee),
            26 => Some(Self::RightKnee),
            27 => Some(Self::LeftAnkle),
            28 => Some(Self::RightAnkle),
            29 => Some(Self::LeftHeel),
            30 => Some(Self::RightHeel),
            31 => Some(Self::LeftFootIndex),
            32 => Some(Self::RightFootIndex),
            _ => None,
        }
    }
}

/// Named joints addressable on a normalized pose, including the two derived
/// midpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointId {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFoot,
    RightFoot,
    MidShoulder,
    MidHip,
}

/// A raw body landmark set keyed by joint name, plus the computed shoulder
/// and hip midpoints. Derived per frame from its source landmarks and never
/// persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPose {
    pub nose: Landmark,
    pub left_shoulder: Landmark,
    pub right_shoulder: Landmark,
    pub left_elbow: Landmark,
    pub right_elbow: Landmark,
    pub left_wrist: Landmark,
    pub right_wrist: Landmark,
    pub left_hip: Landmark,
    pub right_hip: Landmark,
    pub left_knee: Landmark,
    pub right_knee: Landmark,
    pub left_ankle: Landmark,
    pub right_ankle: Landmark,
    pub left_heel: Landmark,
    pub right_heel: Landmark,
    pub left_foot: Landmark,
    pub right_foot: Landmark,
    pub mid_shoulder: Landmark,
    pub mid_hip: Landmark,
}

impl BodyPose {
    /// Builds the named pose from a raw detector set. Returns `None` when
    /// the set is shorter than the 33-point schema; there is no partial
    /// normalization. Pure: no state is carried between frames.
    pub fn from_landmarks(landmarks: &[Landmark]) -> Option<BodyPose> {
        if landmarks.len() < BodyLandmark::COUNT {
            return None;
        }
        let at = |index: BodyLandmark| landmarks[index as usize];

        let left_shoulder = at(BodyLandmark::LeftShoulder);
        let right_shoulder = at(BodyLandmark::RightShoulder);
        let left_hip = at(BodyLandmark::LeftHip);
        let right_hip = at(BodyLandmark::RightHip);

        Some(BodyPose {
            nose: at(BodyLandmark::Nose),
            left_elbow: at(BodyLandmark::LeftElbow),
            right_elbow: at(BodyLandmark::RightElbow),
            left_wrist: at(BodyLandmark::LeftWrist),
            right_wrist: at(BodyLandmark::RightWrist),
            left_knee: at(BodyLandmark::LeftKnee),
            right_knee: at(BodyLandmark::RightKnee),
            left_ankle: at(BodyLandmark::LeftAnkle),
            right_ankle: at(BodyLandmark::RightAnkle),
            left_heel: at(BodyLandmark::LeftHeel),
            right_heel: at(BodyLandmark::RightHeel),
            left_foot: at(BodyLandmark::LeftFootIndex),
            right_foot: at(BodyLandmark::RightFootIndex),
            mid_shoulder: Landmark::midpoint(&left_shoulder, &right_shoulder),
            mid_hip: Landmark::midpoint(&left_hip, &right_hip),
            left_shoulder,
            right_shoulder,
            left_hip,
            right_hip,
        })
    }

    pub fn joint(&self, id: JointId) -> &Landmark {
        match id {
            JointId::Nose => &self.nose,
            JointId::LeftShoulder => &self.left_shoulder,
            JointId::RightShoulder => &self.right_shoulder,
            JointId::LeftElbow => &self.left_elbow,
            JointId::RightElbow => &self.right_elbow,
            JointId::LeftWrist => &self.left_wrist,
            JointId::RightWrist => &self.right_wrist,
            JointId::LeftHip => &self.left_hip,
            JointId::RightHip => &self.right_hip,
            JointId::LeftKnee => &self.left_knee,
            JointId::RightKnee => &self.right_knee,
            JointId::LeftAnkle => &self.left_ankle,
            JointId::RightAnkle => &self.right_ankle,
            JointId::LeftHeel => &self.left_heel,
            JointId::RightHeel => &self.right_heel,
            JointId::LeftFoot => &self.left_foot,
            JointId::RightFoot => &self.right_foot,
            JointId::MidShoulder => &self.mid_shoulder,
            JointId::MidHip => &self.mid_hip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed_landmarks(count: usize) -> Vec<Landmark> {
        (0..count)
            .map(|i| Landmark::new(i as f32, i as f32 * 2.0, 0.0, Some(1.0)))
            .collect()
    }

    #[test]
    fn test_body_landmark_from_index() {
        assert_eq!(BodyLandmark::from_index(0), Some(BodyLandmark::Nose));
        assert_eq!(BodyLandmark::from_index(11), Some(BodyLandmark::LeftShoulder));
        assert_eq!(BodyLandmark::from_index(32), Some(BodyLandmark::RightFootIndex));
        assert_eq!(BodyLandmark::from_index(33), None);
    }

    #[test]
    fn test_normalization_rejects_short_sets() {
        assert!(BodyPose::from_landmarks(&[]).is_none());
        assert!(BodyPose::from_landmarks(&indexed_landmarks(32)).is_none());
    }

    #[test]
    fn test_normalization_maps_schema_indices() {
        let pose = BodyPose::from_landmarks(&indexed_landmarks(33)).unwrap();
        assert_eq!(pose.nose.x, 0.0);
        assert_eq!(pose.left_shoulder.x, 11.0);
        assert_eq!(pose.right_shoulder.x, 12.0);
        assert_eq!(pose.left_wrist.x, 15.0);
        assert_eq!(pose.right_hip.x, 24.0);
        assert_eq!(pose.left_heel.x, 29.0);
        assert_eq!(pose.right_foot.x, 32.0);
    }

    #[test]
    fn test_normalization_accepts_longer_sets() {
        // Extra trailing entries (e.g. a detector emitting auxiliary points)
        // are ignored, not an error.
        let pose = BodyPose::from_landmarks(&indexed_landmarks(40)).unwrap();
        assert_eq!(pose.right_foot.x, 32.0);
    }

    #[test]
    fn test_midpoints_are_arithmetic_means() {
        let pose = BodyPose::from_landmarks(&indexed_landmarks(33)).unwrap();
        assert_eq!(pose.mid_shoulder.x, 11.5);
        assert_eq!(pose.mid_shoulder.y, 23.0);
        assert_eq!(pose.mid_hip.x, 23.5);
    }

    #[test]
    fn test_midpoint_visibility_is_min_of_pair() {
        let a = Landmark::new(0.0, 0.0, 0.0, Some(0.9));
        let b = Landmark::new(1.0, 1.0, 0.0, Some(0.4));
        assert_eq!(Landmark::midpoint(&a, &b).visibility, Some(0.4));

        let unscored = Landmark::new(1.0, 1.0, 0.0, None);
        assert_eq!(Landmark::midpoint(&a, &unscored).visibility, None);
    }

    #[test]
    fn test_visibility_gate_helpers() {
        let scored = Landmark::new(0.0, 0.0, 0.0, Some(0.5));
        let unscored = Landmark::new(0.0, 0.0, 0.0, None);
        assert!(scored.is_visible(0.5));
        assert!(!scored.is_visible(0.6));
        assert!(!unscored.is_visible(0.0001));
        assert_eq!(unscored.visibility_or_zero(), 0.0);
    }

    #[test]
    fn test_every_joint_is_addressable() {
        let pose = BodyPose::from_landmarks(&indexed_landmarks(33)).unwrap();
        let joints = [
            JointId::Nose,
            JointId::LeftShoulder,
            JointId::RightShoulder,
            JointId::LeftElbow,
            JointId::RightElbow,
            JointId::LeftWrist,
            JointId::RightWrist,
            JointId::LeftHip,
            JointId::RightHip,
            JointId::LeftKnee,
            JointId::RightKnee,
            JointId::LeftAnkle,
            JointId::RightAnkle,
            JointId::LeftHeel,
            JointId::RightHeel,
            JointId::LeftFoot,
            JointId::RightFoot,
            JointId::MidShoulder,
            JointId::MidHip,
        ];
        for id in joints {
            let landmark = pose.joint(id);
            assert!(landmark.x.is_finite() && landmark.y.is_finite());
        }
    }
}
