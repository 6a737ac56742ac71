//! Kajiya-Kay style hair lobes, one closure for reflection and one for transmission.
//!
//! Longitudinal scattering follows a truncated Cauchy distribution around
//! the mirror elevation; azimuthal scattering is a cosine lobe toward the
//! viewer for reflection and a Cauchy lobe opposite it for transmission.
//! The value equals the pdf, so every sample carries unit weight.

use glam::{Vec2, Vec3};
use lux_math::{make_orthonormals, safe_acos, Spectrum};
use rand::RngCore;
use std::f32::consts::{FRAC_PI_2, PI};

use super::{BsdfSample, Bxdf, ScatterContext};
use crate::closure::ClosureType;
use crate::label::{ClosureFlags, Label};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HairBsdf {
    /// Longitudinal roughness
    pub roughness1: f32,
    /// Azimuthal roughness
    pub roughness2: f32,
    /// Tilt of the cuticle scales in radians
    pub offset: f32,
    /// Hair direction
    pub t: Vec3,
}

impl HairBsdf {
    pub fn new(roughness1: f32, roughness2: f32, offset: f32, t: Vec3) -> Self {
        Self {
            roughness1,
            roughness2,
            offset,
            t,
        }
    }

    fn clamp(&mut self) {
        self.roughness1 = self.roughness1.clamp(0.001, 1.0);
        self.roughness2 = self.roughness2.clamp(0.001, 1.0);
    }

    pub fn setup_reflection(&mut self) -> ClosureFlags {
        self.clamp();
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    pub fn setup_transmission(&mut self) -> ClosureFlags {
        self.clamp();
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL | ClosureFlags::HAS_TRANSMISSION
    }

    /// Tangent, falling back to an arbitrary direction across the normal.
    fn tangent(&self, n: Vec3) -> Vec3 {
        self.t
            .try_normalize()
            .unwrap_or_else(|| make_orthonormals(n).0)
    }

    /// Bounds of the longitudinal half-angle distribution for viewer elevation `theta_r`.
    fn theta_bounds(&self, theta_r: f32) -> (f32, f32) {
        let inv = 1.0 / self.roughness1;
        let a = (((FRAC_PI_2 + theta_r) * 0.5 - self.offset) * inv).atan();
        let b = (((-FRAC_PI_2 + theta_r) * 0.5 - self.offset) * inv).atan();
        (a, b)
    }

    fn theta_pdf(&self, theta_i: f32, theta_r: f32) -> f32 {
        let (a, b) = self.theta_bounds(theta_r);
        let t = (theta_i + theta_r) * 0.5 - self.offset;
        let r1 = self.roughness1;
        r1 / (2.0 * (t * t + r1 * r1) * (a - b) * theta_i.cos())
    }

    /// Half-width factor of the transmission azimuth lobe, covering `[-pi/2, pi/2]`.
    fn c_tt(&self) -> f32 {
        2.0 * (FRAC_PI_2 / self.roughness2).atan()
    }

    fn phi_pdf(&self, phi: f32, transmit: bool) -> f32 {
        let r2 = self.roughness2;
        if transmit {
            let p = PI - phi.abs();
            if p > FRAC_PI_2 {
                return 0.0;
            }
            r2 / (self.c_tt() * (p * p + r2 * r2))
        } else {
            let scaled = (phi.abs() / r2).min(PI);
            (scaled * 0.5).cos() * 0.25 / r2
        }
    }
}

/// Hair-aligned frame: `locy` points toward the viewer across the fiber.
struct HairFrame {
    t: Vec3,
    locx: Vec3,
    locy: Vec3,
    theta_r: f32,
}

impl HairFrame {
    fn new(t: Vec3, wi: Vec3) -> Option<Self> {
        let iz = t.dot(wi);
        let locy = (wi - t * iz).try_normalize()?;
        Some(Self {
            t,
            locx: locy.cross(t),
            locy,
            theta_r: FRAC_PI_2 - safe_acos(iz),
        })
    }

    /// Elevation and unsigned azimuth of `w`.
    fn angles(&self, w: Vec3) -> (f32, f32) {
        let theta = FRAC_PI_2 - safe_acos(self.t.dot(w));
        let phi = match (w - self.t * self.t.dot(w)).try_normalize() {
            Some(wy) => safe_acos(wy.dot(self.locy)),
            None => 0.0,
        };
        (theta, phi)
    }

    fn direction(&self, theta: f32, phi: f32) -> Vec3 {
        let (sin_theta, cos_theta) = theta.sin_cos();
        let (sin_phi, cos_phi) = phi.sin_cos();
        self.locy * (cos_phi * cos_theta) - self.locx * (sin_phi * cos_theta) + self.t * sin_theta
    }
}

fn is_transmission(ty: ClosureType) -> bool {
    ty == ClosureType::HairTransmissionBsdf
}

impl Bxdf for HairBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        let Some(frame) = HairFrame::new(self.tangent(ctx.n), ctx.wi) else {
            return (Spectrum::ZERO, 0.0);
        };
        let (theta_i, phi) = frame.angles(wo);
        if FRAC_PI_2 - theta_i.abs() < 0.001 {
            return (Spectrum::ZERO, 0.0);
        }

        let pdf = self.theta_pdf(theta_i, frame.theta_r) * self.phi_pdf(phi, is_transmission(ctx.ty));
        if !(pdf > 0.0) {
            return (Spectrum::ZERO, 0.0);
        }
        (Spectrum::splat(pdf), pdf)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        let frame = HairFrame::new(self.tangent(ctx.n), ctx.wi)?;
        let (a, b) = self.theta_bounds(frame.theta_r);
        let t = self.roughness1 * (u.x * (a - b) + b).tan();
        let theta_i = 2.0 * (t + self.offset) - frame.theta_r;
        if FRAC_PI_2 - theta_i.abs() < 0.001 {
            return None;
        }

        let transmit = is_transmission(ctx.ty);
        let phi = if transmit {
            self.roughness2 * (self.c_tt() * (u.y - 0.5)).tan() + PI
        } else {
            2.0 * (1.0 - 2.0 * u.y).clamp(-1.0, 1.0).asin() * self.roughness2
        };
        let wo = frame.direction(theta_i, phi);

        let pdf = (self.theta_pdf(theta_i, frame.theta_r) * self.phi_pdf(frame.angles(wo).1, transmit)).abs();
        if !(pdf > 0.0) {
            return None;
        }
        let label = if transmit {
            Label::TRANSMIT | Label::GLOSSY
        } else {
            Label::REFLECT | Label::GLOSSY
        };
        Some(BsdfSample::new(wo, Spectrum::splat(pdf), pdf, label))
    }

    fn roughness_eta(&self) -> (Vec2, f32) {
        (Vec2::new(self.roughness1, self.roughness2), 1.0)
    }
}
