//! Direction sampling routines shared by the closure models.
//!
//! All routines map a 2D uniform sample in `[0, 1)^2` to a direction and
//! return the solid-angle pdf alongside it where one is meaningful.

use crate::frame::make_orthonormals;
use glam::{Vec2, Vec3};
use std::f32::consts::{FRAC_1_PI, FRAC_PI_2, FRAC_PI_4, PI};

/// Shirley-Chiu concentric mapping from the unit square to the unit disk.
pub fn concentric_sample_disk(u: Vec2) -> Vec2 {
    let offset = u * 2.0 - Vec2::ONE;
    if offset == Vec2::ZERO {
        return Vec2::ZERO;
    }

    let (theta, r) = if offset.x.abs() > offset.y.abs() {
        (FRAC_PI_4 * (offset.y / offset.x), offset.x)
    } else {
        (FRAC_PI_2 - FRAC_PI_4 * (offset.x / offset.y), offset.y)
    };

    Vec2::new(theta.cos(), theta.sin()) * r
}

/// Cosine-weighted direction around +Z.
pub fn cosine_sample_hemisphere(u: Vec2) -> Vec3 {
    let d = concentric_sample_disk(u);
    let z = (1.0 - d.x * d.x - d.y * d.y).max(0.0).sqrt();
    Vec3::new(d.x, d.y, z)
}

/// Cosine-weighted direction around `n`, with pdf `cos / pi`.
pub fn sample_cos_hemisphere(n: Vec3, u: Vec2) -> (Vec3, f32) {
    let local = cosine_sample_hemisphere(u);
    let (t, b) = make_orthonormals(n);
    let wo = t * local.x + b * local.y + n * local.z;
    (wo, local.z * FRAC_1_PI)
}

/// Uniform direction on the hemisphere around `n`, with pdf `1 / (2 pi)`.
pub fn sample_uniform_hemisphere(n: Vec3, u: Vec2) -> (Vec3, f32) {
    let z = u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    let (t, b) = make_orthonormals(n);
    let wo = t * (r * phi.cos()) + b * (r * phi.sin()) + n * z;
    (wo, 0.5 * FRAC_1_PI)
}

/// Uniform direction inside the cone of half-angle `angle` around `n`.
pub fn sample_uniform_cone(n: Vec3, angle: f32, u: Vec2) -> (Vec3, f32) {
    let cos_angle = angle.cos();
    let z = 1.0 - u.x * (1.0 - cos_angle);
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    let (t, b) = make_orthonormals(n);
    let wo = t * (r * phi.cos()) + b * (r * phi.sin()) + n * z;
    (wo, uniform_cone_pdf(cos_angle))
}

/// Solid-angle pdf of [`sample_uniform_cone`].
#[inline]
pub fn uniform_cone_pdf(cos_angle: f32) -> f32 {
    let solid_angle = 2.0 * PI * (1.0 - cos_angle);
    if solid_angle > 0.0 {
        1.0 / solid_angle
    } else {
        0.0
    }
}

/// Uniform direction on the unit sphere, pdf `1 / (4 pi)`.
pub fn sample_uniform_sphere(u: Vec2) -> Vec3 {
    let z = 1.0 - 2.0 * u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

#[inline]
pub fn spherical_direction(sin_theta: f32, cos_theta: f32, phi: f32) -> Vec3 {
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Balance heuristic weight for the first of two strategies.
#[inline]
pub fn balance_heuristic(a: f32, b: f32) -> f32 {
    if a + b > 0.0 {
        a / (a + b)
    } else {
        0.0
    }
}
