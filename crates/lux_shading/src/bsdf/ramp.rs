//! Color-ramp shading for stylized looks.
//!
//! The eight ramp colors live in the closure's extra data. The diffuse ramp
//! indexes it by the cosine to the normal, the Phong ramp by the lobe value.

use glam::{Vec2, Vec3};
use lux_math::sampling::sample_cos_hemisphere;
use lux_math::{make_orthonormals, Spectrum};
use rand::RngCore;
use std::f32::consts::{FRAC_1_PI, PI, TAU};

use super::fresnel::reflect;
use super::{BsdfSample, Bxdf, ScatterContext};
use crate::label::{ClosureFlags, Label};

pub const RAMP_COLORS: usize = 8;

/// Evenly spaced colors over `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorRamp(pub [Spectrum; RAMP_COLORS]);

impl ColorRamp {
    /// Linear interpolation at `pos`, clamped to the end colors.
    pub fn get_color(&self, pos: f32) -> Spectrum {
        let colors = &self.0;
        let npos = pos * (RAMP_COLORS - 1) as f32;
        if !(npos >= 0.0) {
            return colors[0];
        }
        let ipos = npos as usize;
        if ipos >= RAMP_COLORS - 1 {
            return colors[RAMP_COLORS - 1];
        }
        let offset = npos - ipos as f32;
        colors[ipos] * (1.0 - offset) + colors[ipos + 1] * offset
    }
}

fn ramp<'a>(ctx: &ScatterContext<'a>) -> Option<&'a ColorRamp> {
    ctx.extra.and_then(|e| e.as_ramp())
}

/// Diffuse lobe whose color is looked up by `cos(n, wo)`; the ramp replaces the cosine falloff.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiffuseRampBsdf;

impl DiffuseRampBsdf {
    pub fn setup(&mut self) -> ClosureFlags {
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }
}

impl Bxdf for DiffuseRampBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        let Some(colors) = ramp(ctx) else {
            return (Spectrum::ZERO, 0.0);
        };
        let cos = ctx.n.dot(wo).max(0.0);
        if cos <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        (colors.get_color(cos) * FRAC_1_PI, cos * FRAC_1_PI)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        let colors = ramp(ctx)?;
        let (wo, pdf) = sample_cos_hemisphere(ctx.n, u);
        if ctx.ng.dot(wo) <= 0.0 {
            return None;
        }
        Some(BsdfSample::new(
            wo,
            colors.get_color(pdf * PI) * FRAC_1_PI,
            pdf,
            Label::REFLECT | Label::DIFFUSE,
        ))
    }
}

/// Phong lobe around the mirror direction, colored by the lobe intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhongRampBsdf {
    pub exponent: f32,
}

impl PhongRampBsdf {
    pub fn new(exponent: f32) -> Self {
        Self { exponent }
    }

    pub fn setup(&mut self) -> ClosureFlags {
        self.exponent = self.exponent.max(0.0);
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    /// `(value, pdf)` for a direction at `cos_ri` from the mirror direction.
    fn lobe(&self, colors: &ColorRamp, cos_ni: f32, cos_ri: f32) -> (Spectrum, f32) {
        let cosp = cos_ri.powf(self.exponent);
        let common = 0.5 * FRAC_1_PI * cosp;
        let value = cos_ni * (self.exponent + 2.0) * common;
        let pdf = (self.exponent + 1.0) * common;
        (colors.get_color(cosp) * value, pdf)
    }
}

impl Bxdf for PhongRampBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        let Some(colors) = ramp(ctx) else {
            return (Spectrum::ZERO, 0.0);
        };
        let cos_ni = ctx.n.dot(wo);
        let cos_no = ctx.n.dot(ctx.wi);
        if cos_ni <= 0.0 || cos_no <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let r = reflect(ctx.wi, ctx.n);
        let cos_ri = r.dot(wo);
        if cos_ri <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        self.lobe(colors, cos_ni, cos_ri)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        _rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        let colors = ramp(ctx)?;
        if ctx.n.dot(ctx.wi) <= 0.0 {
            return None;
        }
        let r = reflect(ctx.wi, ctx.n);
        let (t, b) = make_orthonormals(r);
        let phi = TAU * u.x;
        let cos_theta = u.y.powf(1.0 / (self.exponent + 1.0));
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let wo = t * (phi.cos() * sin_theta) + b * (phi.sin() * sin_theta) + r * cos_theta;

        if ctx.ng.dot(wo) <= 0.0 {
            return None;
        }
        let cos_ni = ctx.n.dot(wo);
        if cos_ni <= 0.0 {
            return None;
        }
        let (eval, pdf) = self.lobe(colors, cos_ni, cos_theta);
        Some(BsdfSample::new(wo, eval, pdf, Label::REFLECT | Label::GLOSSY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::{ClosureType, ExtraData};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gradient() -> ColorRamp {
        let mut colors = [Spectrum::ZERO; RAMP_COLORS];
        for (i, c) in colors.iter_mut().enumerate() {
            *c = Spectrum::splat(i as f32 / (RAMP_COLORS - 1) as f32);
        }
        ColorRamp(colors)
    }

    #[test]
    fn test_get_color_interpolates_and_clamps() {
        let ramp = gradient();
        assert!((ramp.get_color(0.5).x - 0.5).abs() < 1e-5);
        assert_eq!(ramp.get_color(-1.0), Spectrum::ZERO);
        assert_eq!(ramp.get_color(2.0), Spectrum::ONE);
        assert_eq!(ramp.get_color(f32::NAN), Spectrum::ZERO);
    }

    #[test]
    fn test_phong_sample_matches_eval() {
        let mut rng = StdRng::seed_from_u64(12);
        let extra = ExtraData::Ramp(gradient());
        let wi = Vec3::new(0.3, 0.2, 0.93).normalize();
        let ctx = ScatterContext::new(ClosureType::PhongRampBsdf, Vec3::Z, Vec3::Z, wi)
            .with_extra(Some(&extra));
        let mut phong = PhongRampBsdf::new(20.0);
        phong.setup();
        for _ in 0..200 {
            let u = Vec2::new(rng.gen(), rng.gen());
            if let Some(s) = phong.sample(&ctx, u, &mut rng) {
                let (eval, pdf) = phong.eval(&ctx, s.wo, &mut rng);
                assert!((pdf - s.pdf).abs() <= 1e-3 * s.pdf.max(1.0));
                assert!((eval - s.eval).abs().max_element() <= 1e-3 * s.eval.max_element().max(1.0));
            }
        }
    }

    #[test]
    fn test_missing_ramp_scatters_nothing() {
        let mut rng = StdRng::seed_from_u64(0);
        let ctx = ScatterContext::new(ClosureType::DiffuseRampBsdf, Vec3::Z, Vec3::Z, Vec3::Z);
        assert!(DiffuseRampBsdf.sample(&ctx, Vec2::splat(0.3), &mut rng).is_none());
    }
}
