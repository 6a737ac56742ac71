//! Disney principled diffuse with optional retro-reflection.
//!
//! The component mask lets a surface split the model: subsurface closures
//! keep only the Lambert exit term while the retro-reflective part stays on
//! the surface.

use bitflags::bitflags;
use glam::{Vec2, Vec3};
use lux_math::sampling::sample_cos_hemisphere;
use lux_math::{schlick_fresnel, Spectrum};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_1_PI;

use super::{BsdfSample, Bxdf, ScatterContext};
use crate::label::{ClosureFlags, Label};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "u8", into = "u8")]
    pub struct PrincipledDiffuseComponents: u8 {
        const FULL = 1;
        const LAMBERT = 1 << 1;
        const LAMBERT_EXIT = 1 << 2;
        const RETRO_REFLECTION = 1 << 3;
    }
}

impl From<u8> for PrincipledDiffuseComponents {
    fn from(bits: u8) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl From<PrincipledDiffuseComponents> for u8 {
    fn from(c: PrincipledDiffuseComponents) -> Self {
        c.bits()
    }
}

impl Default for PrincipledDiffuseComponents {
    fn default() -> Self {
        Self::FULL
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipledDiffuseBsdf {
    pub roughness: f32,
    pub components: PrincipledDiffuseComponents,
}

impl PrincipledDiffuseBsdf {
    pub fn new(roughness: f32, components: PrincipledDiffuseComponents) -> Self {
        Self {
            roughness,
            components,
        }
    }

    pub fn setup(&mut self) -> ClosureFlags {
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    fn value(&self, n: Vec3, v: Vec3, l: Vec3) -> f32 {
        let n_dot_l = n.dot(l);
        if n_dot_l <= 0.0 {
            return 0.0;
        }
        let n_dot_v = n.dot(v);
        let fv = schlick_fresnel(n_dot_v);
        let fl = schlick_fresnel(n_dot_l);

        let c = self.components;
        let mut f = 0.0;
        if c.intersects(PrincipledDiffuseComponents::FULL | PrincipledDiffuseComponents::LAMBERT) {
            f += (1.0 - 0.5 * fv) * (1.0 - 0.5 * fl);
        } else if c.contains(PrincipledDiffuseComponents::LAMBERT_EXIT) {
            f += 1.0 - 0.5 * fl;
        }

        if c.intersects(
            PrincipledDiffuseComponents::FULL | PrincipledDiffuseComponents::RETRO_REFLECTION,
        ) {
            // 2 cos^2 of the half angle, which never exceeds 90 degrees
            let lh2 = l.dot(v) + 1.0;
            let rr = self.roughness * lh2;
            f += rr * (fl + fv + fl * fv * (rr - 1.0));
        }

        FRAC_1_PI * n_dot_l * f
    }
}

impl Bxdf for PrincipledDiffuseBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        let cos = ctx.n.dot(wo);
        if cos <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let value = self.value(ctx.n, ctx.wi, wo);
        (Spectrum::splat(value), cos * FRAC_1_PI)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        let (wo, pdf) = sample_cos_hemisphere(ctx.n, u);
        if ctx.ng.dot(wo) <= 0.0 {
            return None;
        }
        let value = self.value(ctx.n, ctx.wi, wo);
        Some(BsdfSample::new(
            wo,
            Spectrum::splat(value),
            pdf,
            Label::REFLECT | Label::DIFFUSE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::ClosureType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn eval(components: PrincipledDiffuseComponents, roughness: f32, wi: Vec3, wo: Vec3) -> f32 {
        let mut rng = StdRng::seed_from_u64(0);
        let bsdf = PrincipledDiffuseBsdf::new(roughness, components);
        let ctx = ScatterContext::new(ClosureType::PrincipledDiffuseBsdf, Vec3::Z, Vec3::Z, wi);
        bsdf.eval(&ctx, wo, &mut rng).0.x
    }

    #[test]
    fn test_components_partition_full() {
        let wi = Vec3::new(0.5, 0.0, 0.8).normalize();
        let wo = Vec3::new(-0.3, 0.4, 0.7).normalize();
        let full = eval(PrincipledDiffuseComponents::FULL, 0.6, wi, wo);
        let lambert = eval(PrincipledDiffuseComponents::LAMBERT, 0.6, wi, wo);
        let retro = eval(PrincipledDiffuseComponents::RETRO_REFLECTION, 0.6, wi, wo);
        assert!((full - (lambert + retro)).abs() < 1e-6);
    }

    #[test]
    fn test_normal_incidence_is_lambertian() {
        // Schlick terms vanish head-on, leaving cos / pi.
        let v = eval(PrincipledDiffuseComponents::LAMBERT, 0.0, Vec3::Z, Vec3::Z);
        assert!((v - FRAC_1_PI).abs() < 1e-6);
    }

    #[test]
    fn test_lambert_exit_ignores_view() {
        let wo = Vec3::new(0.2, 0.1, 0.9).normalize();
        let a = eval(PrincipledDiffuseComponents::LAMBERT_EXIT, 0.5, Vec3::Z, wo);
        let b = eval(
            PrincipledDiffuseComponents::LAMBERT_EXIT,
            0.5,
            Vec3::new(0.9, 0.0, 0.1).normalize(),
            wo,
        );
        assert_eq!(a, b);
    }
}
