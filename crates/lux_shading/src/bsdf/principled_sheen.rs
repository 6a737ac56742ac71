//! Principled sheen: a Schlick-shaped grazing highlight for cloth.

use glam::{Vec2, Vec3};
use lux_math::sampling::sample_cos_hemisphere;
use lux_math::{schlick_fresnel, Spectrum};
use rand::RngCore;
use std::f32::consts::FRAC_1_PI;

use super::{BsdfSample, Bxdf, ScatterContext};
use crate::label::{ClosureFlags, Label};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PrincipledSheenBsdf {
    /// Estimate of the directional albedo for the current view, set by `setup`.
    pub avg_value: f32,
}

impl PrincipledSheenBsdf {
    /// Computes the albedo estimate. The caller scales the closure's sample weight by it.
    pub fn setup(&mut self, n: Vec3, wi: Vec3) -> ClosureFlags {
        let n_dot_i = n.dot(wi);
        self.avg_value = if n_dot_i < 0.0 {
            0.0
        } else {
            schlick_fresnel(n_dot_i) * n_dot_i
        };
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    fn value(n: Vec3, v: Vec3, l: Vec3) -> f32 {
        let n_dot_l = n.dot(l);
        let n_dot_v = n.dot(v);
        if n_dot_l < 0.0 || n_dot_v < 0.0 {
            return 0.0;
        }
        let Some(h) = (l + v).try_normalize() else {
            return 0.0;
        };
        schlick_fresnel(l.dot(h)) * n_dot_l
    }
}

impl Bxdf for PrincipledSheenBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        let cos = ctx.n.dot(wo);
        if cos <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        (
            Spectrum::splat(Self::value(ctx.n, ctx.wi, wo)),
            cos * FRAC_1_PI,
        )
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
        Some(BsdfSample::new(
            wo,
            Spectrum::splat(Self::value(ctx.n, ctx.wi, wo)),
            pdf,
            Label::REFLECT | Label::DIFFUSE,
        ))
    }

    fn albedo(&self, _ctx: &ScatterContext<'_>) -> Spectrum {
        Spectrum::splat(self.avg_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::ClosureType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_avg_value_peaks_off_normal() {
        let mut sheen = PrincipledSheenBsdf::default();
        sheen.setup(Vec3::Z, Vec3::Z);
        assert_eq!(sheen.avg_value, 0.0);

        sheen.setup(Vec3::Z, Vec3::new(0.9, 0.0, 0.3).normalize());
        assert!(sheen.avg_value > 0.0);

        sheen.setup(Vec3::Z, -Vec3::Z);
        assert_eq!(sheen.avg_value, 0.0);
    }

    #[test]
    fn test_grazing_view_brighter() {
        let mut rng = StdRng::seed_from_u64(1);
        let sheen = PrincipledSheenBsdf::default();
        let wo = Vec3::new(0.0, 0.3, 0.95).normalize();
        let head_on = ScatterContext::new(ClosureType::PrincipledSheenBsdf, Vec3::Z, Vec3::Z, Vec3::Z);
        let grazing = ScatterContext::new(
            ClosureType::PrincipledSheenBsdf,
            Vec3::Z,
            Vec3::Z,
            Vec3::new(0.95, 0.0, 0.2).normalize(),
        );
        let a = sheen.eval(&head_on, wo, &mut rng).0.x;
        let b = sheen.eval(&grazing, wo, &mut rng).0.x;
        assert!(b > a);
    }
}
