//! Ashikhmin velvet: an inverted Gaussian microfacet sheen for cloth.

use glam::{Vec2, Vec3};
use lux_math::sampling::sample_uniform_hemisphere;
use lux_math::Spectrum;
use rand::RngCore;
use std::f32::consts::FRAC_1_PI;

use super::{BsdfSample, Bxdf, ScatterContext};
use crate::label::{ClosureFlags, Label};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelvetBsdf {
    pub sigma: f32,
    invsigma2: f32,
}

impl VelvetBsdf {
    pub fn new(sigma: f32) -> Self {
        Self {
            sigma,
            invsigma2: 0.0,
        }
    }

    pub fn setup(&mut self) -> ClosureFlags {
        let sigma = self.sigma.max(0.01);
        self.sigma = sigma;
        self.invsigma2 = 1.0 / (sigma * sigma);
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    fn value(&self, n: Vec3, wi: Vec3, wo: Vec3) -> f32 {
        let cos_no = n.dot(wi);
        let cos_ni = n.dot(wo);
        if cos_no <= 0.0 || cos_ni <= 0.0 {
            return 0.0;
        }

        let Some(h) = (wi + wo).try_normalize() else {
            return 0.0;
        };
        let cos_nh = n.dot(h);
        let cos_ho = wi.dot(h).abs();
        if !(cos_nh.abs() < 1.0 - 1e-5 && cos_ho > 1e-5) {
            return 0.0;
        }

        let cos_nh_div_ho = (cos_nh / cos_ho).max(1e-5);
        let fac1 = 2.0 * (cos_nh_div_ho * cos_no).abs();
        let fac2 = 2.0 * (cos_nh_div_ho * cos_ni).abs();

        let sin_nh2 = 1.0 - cos_nh * cos_nh;
        let sin_nh4 = sin_nh2 * sin_nh2;
        let cotangent2 = (cos_nh * cos_nh) / sin_nh2;

        let d = (-cotangent2 * self.invsigma2).exp() * self.invsigma2 * FRAC_1_PI / sin_nh4;
        let g = fac1.min(fac2).min(1.0);

        0.25 * (d * g) / cos_no
    }
}

impl Bxdf for VelvetBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        if ctx.n.dot(wo) <= 0.0 || ctx.n.dot(ctx.wi) <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let value = self.value(ctx.n, ctx.wi, wo);
        (Spectrum::splat(value), 0.5 * FRAC_1_PI)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        if ctx.n.dot(ctx.wi) <= 0.0 {
            return None;
        }
        let (wo, pdf) = sample_uniform_hemisphere(ctx.n, u);
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
