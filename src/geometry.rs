// src/geometry.rs - Angle and bone rotation math on detector-space positions
use nalgebra::{Unit, UnitQuaternion, Vector3};

/// Angle in radians at vertex `b` between the rays `b -> a` and `b -> c`.
///
/// The cosine is clamped to [-1, 1] before the arccos so floating-point
/// drift on nearly collinear rays cannot leave the domain. Degenerate
/// geometry, where either ray has zero length, yields 0 rather than an
/// error.
pub fn angle_at_vertex(a: &Vector3<f32>, b: &Vector3<f32>, c: &Vector3<f32>) -> f32 {
    let u = a - b;
    let v = c - b;
    let norms = u.norm() * v.norm();
    if norms == 0.0 {
        return 0.0;
    }
    (u.dot(&v) / norms).clamp(-1.0, 1.0).acos()
}

/// Rotation carrying a bone's rest direction onto the detected
/// parent-to-child direction.
///
/// The detected direction is re-expressed in rig space first: the detector's
/// Y axis grows downward while the rig's grows upward, and the detector's
/// depth axis points away from a forward-facing rig, so both components are
/// negated. The result is the shortest arc between the two directions. A
/// zero-length detected direction maps to the identity, and an exactly
/// opposed pair falls back to a half turn about a perpendicular axis.
pub fn limb_rotation(
    parent: &Vector3<f32>,
    child: &Vector3<f32>,
    rest_direction: &Vector3<f32>,
) -> UnitQuaternion<f32> {
    let detected = Vector3::new(
        child.x - parent.x,
        -(child.y - parent.y),
        -(child.z - parent.z),
    );
    if detected.norm_squared() == 0.0 {
        return UnitQuaternion::identity();
    }
    match UnitQuaternion::rotation_between(rest_direction, &detected) {
        Some(rotation) => rotation,
        None => {
            // rest and detected are antiparallel; any perpendicular axis works
            let mut axis = rest_direction.cross(&Vector3::x());
            if axis.norm_squared() < 1e-12 {
                axis = rest_direction.cross(&Vector3::y());
            }
            UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), std::f32::consts::PI)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    const EPS: f32 = 1e-5;

    #[test]
    fn test_right_angle() {
        let a = Vector3::new(0.0, 1.0, 0.0);
        let b = Vector3::zeros();
        let c = Vector3::new(1.0, 0.0, 0.0);
        assert!((angle_at_vertex(&a, &b, &c) - FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn test_angle_is_symmetric() {
        let a = Vector3::new(0.2, 0.8, -0.1);
        let b = Vector3::new(0.4, 0.5, 0.05);
        let c = Vector3::new(0.9, 0.45, 0.2);
        assert!((angle_at_vertex(&a, &b, &c) - angle_at_vertex(&c, &b, &a)).abs() < EPS);
    }

    #[test]
    fn test_angle_stays_in_range() {
        let points = [
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(-0.5, 0.0, 1.0),
            Vector3::new(2.0, -1.0, 0.25),
            Vector3::new(0.0, 0.0, -3.0),
        ];
        for a in &points {
            for b in &points {
                for c in &points {
                    let angle = angle_at_vertex(a, b, c);
                    assert!((0.0..=PI + EPS).contains(&angle));
                }
            }
        }
    }

    #[test]
    fn test_degenerate_rays_give_zero() {
        let b = Vector3::new(0.5, 0.5, 0.0);
        let c = Vector3::new(1.0, 0.0, 0.0);
        assert_eq!(angle_at_vertex(&b, &b, &c), 0.0);
        assert_eq!(angle_at_vertex(&c, &b, &b), 0.0);
        assert_eq!(angle_at_vertex(&b, &b, &b), 0.0);
    }

    #[test]
    fn test_collinear_drift_is_clamped() {
        // Nearly opposite rays whose cosine can drift just past -1.
        let a = Vector3::new(1.0, 1e-8, 0.0);
        let b = Vector3::zeros();
        let c = Vector3::new(-1.0, -1e-8, 0.0);
        let angle = angle_at_vertex(&a, &b, &c);
        assert!(angle.is_finite());
        assert!((angle - PI).abs() < 1e-3);
    }

    #[test]
    fn test_limb_rotation_reproduces_direction() {
        let parent = Vector3::new(0.58, 0.30, 0.0);
        let child = Vector3::new(0.62, 0.42, 0.02);
        let rest = Vector3::x();
        let rotation = limb_rotation(&parent, &child, &rest);

        let detected = Vector3::new(
            child.x - parent.x,
            -(child.y - parent.y),
            -(child.z - parent.z),
        )
        .normalize();
        let rotated = rotation.transform_vector(&rest);
        assert!((rotated - detected).norm() < EPS);
    }

    #[test]
    fn test_limb_rotation_identity_for_rest_direction() {
        // Child straight "down" in detector space matches a -Y rest bone.
        let parent = Vector3::new(0.5, 0.5, 0.0);
        let child = Vector3::new(0.5, 0.8, 0.0);
        let rotation = limb_rotation(&parent, &child, &-Vector3::y());
        assert!(rotation.angle() < EPS);
    }

    #[test]
    fn test_limb_rotation_zero_length_is_identity() {
        let p = Vector3::new(0.4, 0.4, 0.1);
        let rotation = limb_rotation(&p, &p, &Vector3::x());
        assert_eq!(rotation, UnitQuaternion::identity());
    }

    #[test]
    fn test_limb_rotation_antipodal_half_turn() {
        // Detected direction exactly opposes the rest direction.
        let parent = Vector3::zeros();
        let child = Vector3::new(-1.0, 0.0, 0.0);
        let rest = Vector3::x();
        let rotation = limb_rotation(&parent, &child, &rest);
        assert!((rotation.angle() - PI).abs() < EPS);
        let rotated = rotation.transform_vector(&rest);
        assert!((rotated - Vector3::new(-1.0, 0.0, 0.0)).norm() < EPS);
    }
}
