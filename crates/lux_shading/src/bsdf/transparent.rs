//! Straight pass-through, used for alpha cutouts.

use glam::{Vec2, Vec3};
use lux_math::Spectrum;
use rand::RngCore;

use super::{BsdfSample, Bxdf, ScatterContext};
use crate::label::{ClosureFlags, Label};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransparentBsdf;

impl TransparentBsdf {
    pub fn setup(&mut self) -> ClosureFlags {
        ClosureFlags::BSDF | ClosureFlags::TRANSPARENT
    }
}

impl Bxdf for TransparentBsdf {
    fn eval(&self, _ctx: &ScatterContext<'_>, _wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        (Spectrum::ZERO, 0.0)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        _u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        Some(BsdfSample::singular(
            -ctx.wi,
            Spectrum::ONE,
            Label::TRANSMIT | Label::TRANSPARENT,
        ))
    }

    fn roughness_eta(&self) -> (Vec2, f32) {
        (Vec2::ZERO, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::ClosureType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_passes_straight_through() {
        let mut rng = StdRng::seed_from_u64(0);
        let wi = Vec3::new(0.2, -0.3, 0.9).normalize();
        let ctx = ScatterContext::new(ClosureType::TransparentBsdf, Vec3::Z, Vec3::Z, wi);
        let s = TransparentBsdf.sample(&ctx, Vec2::ZERO, &mut rng).unwrap();
        assert_eq!(s.wo, -wi);
        assert!(s.label.contains(Label::TRANSPARENT | Label::SINGULAR));
        assert!((s.weight() - Spectrum::ONE).abs().max_element() < 1e-6);
    }
}
