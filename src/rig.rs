// src/rig.rs - Maps a normalized pose onto a caller-owned bone table
use std::collections::HashMap;

use nalgebra::{UnitQuaternion, Vector3};
use once_cell::sync::Lazy;

use crate::geometry::limb_rotation;
use crate::pose::{BodyPose, JointId};

/// Bones the mapper drives, named after the usual humanoid rig convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoneId {
    LeftArm,
    LeftForeArm,
    RightArm,
    RightForeArm,
    LeftUpLeg,
    LeftLeg,
    RightUpLeg,
    RightLeg,
    Spine,
}

impl BoneId {
    pub fn name(&self) -> &'static str {
        match self {
            BoneId::LeftArm => "leftArm",
            BoneId::LeftForeArm => "leftForeArm",
            BoneId::RightArm => "rightArm",
            BoneId::RightForeArm => "rightForeArm",
            BoneId::LeftUpLeg => "leftUpLeg",
            BoneId::LeftLeg => "leftLeg",
            BoneId::RightUpLeg => "rightUpLeg",
            BoneId::RightLeg => "rightLeg",
            BoneId::Spine => "spine",
        }
    }
}

/// Orientation handles keyed by bone. The table is owned by the caller,
/// typically a scene graph; the mapper only writes into tables it is handed
/// and never creates or removes entries.
pub type BoneTable = HashMap<BoneId, UnitQuaternion<f32>>;

/// A table holding every mapped bone at its bind orientation.
pub fn neutral_bone_table() -> BoneTable {
    BONE_PAIRS
        .iter()
        .map(|pair| (pair.bone, UnitQuaternion::identity()))
        .collect()
}

/// A driven bone: the parent-to-child landmark pair that orients it and the
/// bone's direction in the rig's bind pose.
#[derive(Debug, Clone, Copy)]
pub struct BonePair {
    pub bone: BoneId,
    pub parent: JointId,
    pub child: JointId,
    pub rest: Vector3<f32>,
}

/// Visibility at or below this gate means "not visible": the bone keeps its
/// previous orientation instead of snapping to a spurious detection.
pub const VISIBILITY_GATE: f32 = 0.01;

/// Landmark pairing for the nine driven bones. Arms extend laterally in the
/// bind pose, legs point down, the spine runs hip midpoint to shoulder
/// midpoint pointing up.
pub static BONE_PAIRS: Lazy<[BonePair; 9]> = Lazy::new(|| {
    let left = Vector3::x();
    let right = -Vector3::x();
    let down = -Vector3::y();
    let up = Vector3::y();
    [
        BonePair {
            bone: BoneId::LeftArm,
            parent: JointId::LeftShoulder,
            child: JointId::LeftElbow,
            rest: left,
        },
        BonePair {
            bone: BoneId::LeftForeArm,
            parent: JointId::LeftElbow,
            child: JointId::LeftWrist,
            rest: left,
        },
        BonePair {
            bone: BoneId::RightArm,
            parent: JointId::RightShoulder,
            child: JointId::RightElbow,
            rest: right,
        },
        BonePair {
            bone: BoneId::RightForeArm,
            parent: JointId::RightElbow,
            child: JointId::RightWrist,
            rest: right,
        },
        BonePair {
            bone: BoneId::LeftUpLeg,
            parent: JointId::LeftHip,
            child: JointId::LeftKnee,
            rest: down,
        },
        BonePair {
            bone: BoneId::LeftLeg,
            parent: JointId::LeftKnee,
            child: JointId::LeftAnkle,
            rest: down,
        },
        BonePair {
            bone: BoneId::RightUpLeg,
            parent: JointId::RightHip,
            child: JointId::RightKnee,
            rest: down,
        },
        BonePair {
            bone: BoneId::RightLeg,
            parent: JointId::RightKnee,
            child: JointId::RightAnkle,
            rest: down,
        },
        BonePair {
            bone: BoneId::Spine,
            parent: JointId::MidHip,
            child: JointId::MidShoulder,
            rest: up,
        },
    ]
});

/// Writes bone orientations for one pose into `bones`.
///
/// A pair is skipped when either endpoint fails the visibility gate or when
/// the table has no handle for the bone; partial rigs are legal. A `damping`
/// of 1.0 (or more) replaces the orientation outright, smaller values
/// spherically interpolate from the current orientation toward the target by
/// that fraction, trading responsiveness for jitter suppression.
pub fn apply_pose(pose: &BodyPose, bones: &mut BoneTable, damping: f32) {
    let t = damping.clamp(0.0, 1.0);
    for pair in BONE_PAIRS.iter() {
        let parent = pose.joint(pair.parent);
        let child = pose.joint(pair.child);
        if parent.visibility_or_zero() <= VISIBILITY_GATE
            || child.visibility_or_zero() <= VISIBILITY_GATE
        {
            continue;
        }
        let orientation = match bones.get_mut(&pair.bone) {
            Some(orientation) => orientation,
            None => continue,
        };
        let target = limb_rotation(&parent.position(), &child.position(), &pair.rest);
        *orientation = if t >= 1.0 {
            target
        } else {
            // slerp is undefined for antipodal orientations; snap instead
            orientation.try_slerp(&target, t, 1.0e-6).unwrap_or(target)
        };
    }
}
