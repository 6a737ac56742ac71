//! Lambertian reflection and translucency.

use glam::{Vec2, Vec3};
use lux_math::sampling::sample_cos_hemisphere;
use lux_math::Spectrum;
use rand::RngCore;
use std::f32::consts::FRAC_1_PI;

use super::{BsdfSample, Bxdf, ScatterContext};
use crate::closure::ClosureType;
use crate::label::{ClosureFlags, Label};

/// Ideal diffuse lobe. Reflects for [`ClosureType::DiffuseBsdf`] and
/// transmits for [`ClosureType::TranslucentBsdf`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiffuseBsdf;

impl DiffuseBsdf {
    pub fn setup(&mut self) -> ClosureFlags {
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    pub fn setup_translucent(&mut self) -> ClosureFlags {
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL | ClosureFlags::HAS_TRANSMISSION
    }
}

fn is_translucent(ctx: &ScatterContext<'_>) -> bool {
    ctx.ty == ClosureType::TranslucentBsdf
}

impl Bxdf for DiffuseBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        let cos_o = if is_translucent(ctx) {
            -ctx.n.dot(wo)
        } else {
            ctx.n.dot(wo)
        };
        let cos_pi = cos_o.max(0.0) * FRAC_1_PI;
        (Spectrum::splat(cos_pi), cos_pi)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        if is_translucent(ctx) {
            let (wo, pdf) = sample_cos_hemisphere(-ctx.n, u);
            if ctx.ng.dot(wo) >= 0.0 || pdf <= 0.0 {
                return None;
            }
            Some(BsdfSample::new(
                wo,
                Spectrum::splat(pdf),
                pdf,
                Label::TRANSMIT | Label::DIFFUSE,
            ))
        } else {
            let (wo, pdf) = sample_cos_hemisphere(ctx.n, u);
            if ctx.ng.dot(wo) <= 0.0 || pdf <= 0.0 {
                return None;
            }
            Some(BsdfSample::new(
                wo,
                Spectrum::splat(pdf),
                pdf,
                Label::REFLECT | Label::DIFFUSE,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_center_sample_is_normal() {
        let mut rng = StdRng::seed_from_u64(1);
        let wi = Vec3::new(1.0, 0.0, 1.0).normalize();
        let ctx = ScatterContext::new(ClosureType::DiffuseBsdf, Vec3::Z, Vec3::Z, wi);
        let s = DiffuseBsdf.sample(&ctx, Vec2::new(0.5, 0.5), &mut rng).unwrap();
        assert!((s.wo - Vec3::Z).length() < 1e-5);
        assert!((s.pdf - FRAC_1_PI).abs() < 1e-5);
        assert_eq!(s.label, Label::REFLECT | Label::DIFFUSE);
    }

    #[test]
    fn test_translucent_transmits() {
        let mut rng = StdRng::seed_from_u64(2);
        let ctx = ScatterContext::new(ClosureType::TranslucentBsdf, Vec3::Z, Vec3::Z, Vec3::Z);
        let s = DiffuseBsdf.sample(&ctx, Vec2::new(0.3, 0.7), &mut rng).unwrap();
        assert!(s.wo.z < 0.0);
        let (eval, pdf) = DiffuseBsdf.eval(&ctx, s.wo, &mut rng);
        assert!((pdf - s.pdf).abs() < 1e-5);
        assert!((eval.x - s.eval.x).abs() < 1e-5);
        assert_eq!(DiffuseBsdf.eval(&ctx, Vec3::Z, &mut rng).1, 0.0);
    }
}
