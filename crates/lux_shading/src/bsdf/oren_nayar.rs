//! Oren-Nayar rough diffuse reflection (qualitative model).

use glam::{Vec2, Vec3};
use lux_math::sampling::sample_uniform_hemisphere;
use lux_math::{saturate, Spectrum};
use rand::RngCore;
use std::f32::consts::{FRAC_1_PI, PI};

use super::{BsdfSample, Bxdf, ScatterContext};
use crate::label::{ClosureFlags, Label};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrenNayarBsdf {
    pub roughness: f32,
    a: f32,
    b: f32,
}

impl OrenNayarBsdf {
    pub fn new(roughness: f32) -> Self {
        Self {
            roughness,
            a: 0.0,
            b: 0.0,
        }
    }

    pub fn setup(&mut self) -> ClosureFlags {
        let sigma = saturate(self.roughness);
        self.roughness = sigma;
        let div = 1.0 / (PI + (0.5 * PI - 2.0 / 3.0) * sigma);
        self.a = div;
        self.b = sigma * div;
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    fn intensity(&self, n: Vec3, v: Vec3, l: Vec3) -> f32 {
        let nl = n.dot(l).max(0.0);
        let nv = n.dot(v).max(0.0);
        let mut t = l.dot(v) - nl * nv;
        if t > 0.0 {
            t /= nl.max(nv) + f32::MIN_POSITIVE;
        }
        nl * (self.a + self.b * t)
    }
}

impl Bxdf for OrenNayarBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        if ctx.n.dot(wo) <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let value = self.intensity(ctx.n, ctx.wi, wo).max(0.0);
        (Spectrum::splat(value), 0.5 * FRAC_1_PI)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        let (wo, pdf) = sample_uniform_hemisphere(ctx.n, u);
        if ctx.ng.dot(wo) <= 0.0 {
            return None;
        }
        let value = self.intensity(ctx.n, ctx.wi, wo).max(0.0);
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

    #[test]
    fn test_zero_roughness_is_lambertian() {
        let mut bsdf = OrenNayarBsdf::new(0.0);
        bsdf.setup();
        let mut rng = StdRng::seed_from_u64(0);
        let wi = Vec3::new(0.2, 0.1, 0.9).normalize();
        let wo = Vec3::new(-0.5, 0.3, 0.6).normalize();
        let ctx = ScatterContext::new(ClosureType::OrenNayarBsdf, Vec3::Z, Vec3::Z, wi);
        let (eval, pdf) = bsdf.eval(&ctx, wo, &mut rng);
        assert!((eval.x - wo.z * FRAC_1_PI).abs() < 1e-5);
        assert!((pdf - 0.5 * FRAC_1_PI).abs() < 1e-6);
    }

    #[test]
    fn test_roughness_clamped() {
        let mut bsdf = OrenNayarBsdf::new(3.0);
        bsdf.setup();
        assert_eq!(bsdf.roughness, 1.0);
    }
}
