/// Horizontal-plane helpers shared by the planner, avoidance and steering.
///
/// The navigation core reasons about heading on the XZ plane only; height is
/// carried through from the navigable surface but never steered on.
///
/// Turn convention: a positive heading error (and a positive turn signal)
/// means the target lies to the vehicle's right, where right is
/// `forward.cross(Vec3::Y)`.

use bevy::prelude::*;
use rand::Rng;

/// Drops the vertical component.
#[inline]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

#[inline]
pub fn horizontal_distance(a: Vec3, b: Vec3) -> f32 {
    flatten(b - a).length()
}

/// Unit vector to the right of `forward` on the horizontal plane.
#[inline]
pub fn right_of(forward: Vec3) -> Vec3 {
    flatten(forward).normalize_or_zero().cross(Vec3::Y)
}

/// Signed angle in radians from `forward` to `desired`, both projected onto
/// the horizontal plane. Positive when `desired` is to the right.
pub fn signed_heading_error(forward: Vec3, desired: Vec3) -> f32 {
    let f = flatten(forward).normalize_or_zero();
    let d = flatten(desired).normalize_or_zero();
    if f == Vec3::ZERO || d == Vec3::ZERO {
        return 0.0;
    }
    let right = f.cross(Vec3::Y);
    d.dot(right).atan2(d.dot(f))
}

/// Rotates a horizontal heading by `angle` radians (positive turns right).
pub fn rotate_heading(forward: Vec3, angle: f32) -> Vec3 {
    let f = flatten(forward).normalize_or_zero();
    let right = f.cross(Vec3::Y);
    (f * angle.cos() + right * angle.sin()).normalize_or_zero()
}

/// Uniform sample inside a disk of `radius` on the XZ plane.
pub fn random_in_disk<R: Rng>(rng: &mut R, radius: f32) -> Vec2 {
    if radius <= 0.0 {
        return Vec2::ZERO;
    }
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    let r = radius * rng.random::<f32>().sqrt();
    Vec2::new(angle.cos() * r, angle.sin() * r)
}

/// Lifts an XZ offset into world space.
#[inline]
pub fn xz(v: Vec2) -> Vec3 {
    Vec3::new(v.x, 0.0, v.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn heading_error_is_positive_to_the_right() {
        let forward = Vec3::X;
        let right = right_of(forward);
        assert!((right - Vec3::Z).length() < 1e-5);
        assert!(signed_heading_error(forward, Vec3::Z) > 0.0);
        assert!(signed_heading_error(forward, -Vec3::Z) < 0.0);
        assert!(signed_heading_error(forward, Vec3::X).abs() < 1e-6);
    }

    #[test]
    fn heading_error_ignores_height() {
        let err = signed_heading_error(Vec3::X, Vec3::new(1.0, 50.0, 1.0));
        assert!((err - std::f32::consts::FRAC_PI_4).abs() < 1e-4);
    }

    #[test]
    fn rotate_heading_matches_error_sign() {
        let turned = rotate_heading(Vec3::X, 0.3);
        let err = signed_heading_error(Vec3::X, turned);
        assert!((err - 0.3).abs() < 1e-4);
    }

    #[test]
    fn disk_samples_stay_inside_radius() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert!(random_in_disk(&mut rng, 2.0).length() <= 2.0 + 1e-5);
        }
        assert_eq!(random_in_disk(&mut rng, 0.0), Vec2::ZERO);
    }
}
