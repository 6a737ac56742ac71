//! Toon shading lobes with a hard or smoothed cutoff angle.

use glam::{Vec2, Vec3};
use lux_math::sampling::{sample_uniform_cone, uniform_cone_pdf};
use lux_math::{safe_acos, saturate, Spectrum};
use rand::RngCore;
use std::f32::consts::FRAC_PI_2;

use super::fresnel::reflect;
use super::{BsdfSample, Bxdf, ScatterContext};
use crate::closure::ClosureType;
use crate::label::{ClosureFlags, Label};

/// Diffuse toon lobes are centred on the normal, glossy ones on the mirror direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToonBsdf {
    /// Cutoff angle as a fraction of 90 degrees
    pub size: f32,
    /// Width of the linear falloff past the cutoff, same units as `size`
    pub smooth: f32,
}

impl ToonBsdf {
    pub fn new(size: f32, smooth: f32) -> Self {
        Self { size, smooth }
    }

    pub fn setup(&mut self) -> ClosureFlags {
        self.size = saturate(self.size);
        self.smooth = saturate(self.smooth);
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    fn max_angle(&self) -> f32 {
        self.size * FRAC_PI_2
    }

    fn smooth_angle(&self) -> f32 {
        self.smooth * FRAC_PI_2
    }

    /// Half-angle of the cone directions are drawn from.
    fn sample_angle(&self) -> f32 {
        (self.max_angle() + self.smooth_angle()).min(FRAC_PI_2)
    }

    fn intensity(&self, angle: f32) -> f32 {
        let max_angle = self.max_angle();
        let smooth = self.smooth_angle();
        if angle < max_angle {
            1.0
        } else if angle < max_angle + smooth && smooth != 0.0 {
            1.0 - (angle - max_angle) / smooth
        } else {
            0.0
        }
    }

    /// Cone axis, or `None` when the viewer is below the surface.
    fn axis(&self, ctx: &ScatterContext<'_>) -> Option<Vec3> {
        if ctx.ty == ClosureType::GlossyToonBsdf {
            if ctx.n.dot(ctx.wi) <= 0.0 {
                return None;
            }
            Some(reflect(ctx.wi, ctx.n))
        } else {
            Some(ctx.n)
        }
    }

    fn label(ctx: &ScatterContext<'_>) -> Label {
        if ctx.ty == ClosureType::GlossyToonBsdf {
            Label::REFLECT | Label::GLOSSY
        } else {
            Label::REFLECT | Label::DIFFUSE
        }
    }
}

impl Bxdf for ToonBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        let Some(axis) = self.axis(ctx) else {
            return (Spectrum::ZERO, 0.0);
        };
        if ctx.n.dot(wo) <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }

        let sample_angle = self.sample_angle();
        let angle = safe_acos(axis.dot(wo));
        if sample_angle <= 0.0 || angle > sample_angle + 1e-4 {
            return (Spectrum::ZERO, 0.0);
        }
        let intensity = self.intensity(angle);
        if intensity <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }

        let pdf = uniform_cone_pdf(sample_angle.cos());
        (Spectrum::splat(pdf * intensity), pdf)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        let axis = self.axis(ctx)?;
        let sample_angle = self.sample_angle();
        if sample_angle <= 0.0 {
            return None;
        }

        let (wo, pdf) = sample_uniform_cone(axis, sample_angle, u);
        if ctx.ng.dot(wo) <= 0.0 || ctx.n.dot(wo) <= 0.0 {
            return None;
        }
        let intensity = self.intensity(safe_acos(axis.dot(wo)));
        Some(BsdfSample::new(
            wo,
            Spectrum::splat(pdf * intensity),
            pdf,
            Self::label(ctx),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_intensity_falloff() {
        let toon = ToonBsdf::new(0.5, 0.2);
        let max = toon.max_angle();
        assert_eq!(toon.intensity(max * 0.5), 1.0);
        let mid = toon.intensity(max + 0.5 * toon.smooth_angle());
        assert!((mid - 0.5).abs() < 1e-5);
        assert_eq!(toon.intensity(FRAC_PI_2), 0.0);
    }

    #[test]
    fn test_glossy_sample_matches_eval() {
        let mut toon = ToonBsdf::new(0.3, 0.1);
        toon.setup();
        let mut rng = StdRng::seed_from_u64(11);
        let wi = Vec3::new(0.3, 0.0, 0.9).normalize();
        let ctx = ScatterContext::new(ClosureType::GlossyToonBsdf, Vec3::Z, Vec3::Z, wi);
        for _ in 0..200 {
            let u = Vec2::new(rng.gen(), rng.gen());
            if let Some(s) = toon.sample(&ctx, u, &mut rng) {
                let (eval, pdf) = toon.eval(&ctx, s.wo, &mut rng);
                assert!((pdf - s.pdf).abs() < 1e-3 * s.pdf);
                assert!((eval.x - s.eval.x).abs() < 1e-3 * s.pdf);
            }
        }
    }
}
