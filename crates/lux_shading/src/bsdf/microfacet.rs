//! Single-scattering microfacet reflection, refraction and glass.
//!
//! GGX and Beckmann normal distributions with separable Smith masking.
//! GGX samples the distribution of visible normals, Beckmann samples
//! `D(h) cos(theta_h)`. Sharp variants and vanishing roughness fall back to
//! delta lobes.

use glam::{Vec2, Vec3};
use lux_math::sampling::spherical_direction;
use lux_math::{Frame, Spectrum};
use rand::{Rng, RngCore};
use std::f32::consts::{PI, TAU};

use super::fresnel::{
    fresnel_dielectric_cos, interpolate_fresnel_color, microfacet_fresnel, microfacet_fresnel_color, reflect,
    refract,
};
use super::microfacet_multi;
use super::{BsdfSample, Bxdf, ScatterContext};
use crate::closure::ClosureType;
use crate::label::{ClosureFlags, Label};

/// Roughness product below which a lobe is treated as a perfect mirror or interface.
pub const SINGULAR_ALPHA_SQUARED: f32 = 1e-7;

pub const MIN_ALPHA: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicrofacetBsdf {
    pub alpha_x: f32,
    pub alpha_y: f32,
    /// Relative index of refraction, inside over outside
    pub ior: f32,
    /// Anisotropy direction; zero for isotropic lobes
    pub t: Vec3,
}

impl MicrofacetBsdf {
    pub fn new(alpha_x: f32, alpha_y: f32, ior: f32) -> Self {
        Self {
            alpha_x,
            alpha_y,
            ior,
            t: Vec3::ZERO,
        }
    }

    pub fn isotropic(alpha: f32, ior: f32) -> Self {
        Self::new(alpha, alpha, ior)
    }

    pub fn with_tangent(mut self, t: Vec3) -> Self {
        self.t = t;
        self
    }

    fn clamp_alpha(&mut self) {
        self.alpha_x = self.alpha_x.clamp(MIN_ALPHA, 1.0);
        self.alpha_y = self.alpha_y.clamp(MIN_ALPHA, 1.0);
    }

    fn clamp_ior(&mut self) {
        self.ior = self.ior.max(1e-5);
    }

    /// Perfect mirror.
    pub fn setup_sharp_reflection(&mut self) -> ClosureFlags {
        self.alpha_x = 0.0;
        self.alpha_y = 0.0;
        ClosureFlags::BSDF
    }

    /// Perfect refraction, no reflected part.
    pub fn setup_sharp_refraction(&mut self) -> ClosureFlags {
        self.alpha_x = 0.0;
        self.alpha_y = 0.0;
        self.clamp_ior();
        ClosureFlags::BSDF | ClosureFlags::HAS_TRANSMISSION
    }

    /// Smooth dielectric interface choosing reflection or refraction by Fresnel.
    pub fn setup_sharp_glass(&mut self) -> ClosureFlags {
        self.alpha_x = 0.0;
        self.alpha_y = 0.0;
        self.clamp_ior();
        ClosureFlags::BSDF | ClosureFlags::HAS_TRANSMISSION | ClosureFlags::NEEDS_RANDOM
    }

    /// Rough reflection, with or without a Fresnel term.
    pub fn setup(&mut self) -> ClosureFlags {
        self.clamp_alpha();
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    pub fn setup_refraction(&mut self) -> ClosureFlags {
        self.clamp_alpha();
        self.clamp_ior();
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL | ClosureFlags::HAS_TRANSMISSION
    }

    pub fn setup_glass(&mut self) -> ClosureFlags {
        self.clamp_alpha();
        self.clamp_ior();
        ClosureFlags::BSDF
            | ClosureFlags::HAS_EVAL
            | ClosureFlags::HAS_TRANSMISSION
            | ClosureFlags::NEEDS_RANDOM
    }

    pub fn is_singular(&self) -> bool {
        self.alpha_x * self.alpha_y <= SINGULAR_ALPHA_SQUARED
    }

    pub(crate) fn alpha(&self) -> Vec2 {
        Vec2::new(self.alpha_x, self.alpha_y)
    }

    /// Local frame around `n` oriented by the anisotropy tangent.
    pub(crate) fn frame(&self, n: Vec3) -> Frame {
        Frame::from_normal_tangent(n, self.t)
    }
}

/// Which normal distribution a closure uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrofacetDistribution {
    Ggx,
    Beckmann,
}

impl MicrofacetDistribution {
    pub fn of(ty: ClosureType) -> Self {
        match ty {
            ClosureType::MicrofacetBeckmannBsdf
            | ClosureType::MicrofacetBeckmannRefractionBsdf
            | ClosureType::MicrofacetBeckmannGlassBsdf => Self::Beckmann,
            _ => Self::Ggx,
        }
    }

    /// Normal distribution in the local frame.
    pub fn d(self, h: Vec3, alpha: Vec2) -> f32 {
        if h.z <= 0.0 {
            return 0.0;
        }
        match self {
            Self::Ggx => ggx_d(h, alpha),
            Self::Beckmann => {
                let cos2 = h.z * h.z;
                let e = (h.x * h.x / (alpha.x * alpha.x) + h.y * h.y / (alpha.y * alpha.y)) / cos2;
                (-e).exp() / (PI * alpha.x * alpha.y * cos2 * cos2)
            }
        }
    }

    /// Smith auxiliary function for direction `w`, either hemisphere.
    pub fn lambda(self, w: Vec3, alpha: Vec2) -> f32 {
        let xy2 = alpha.x * alpha.x * w.x * w.x + alpha.y * alpha.y * w.y * w.y;
        let z2 = w.z * w.z;
        if z2 < 1e-14 {
            return f32::INFINITY;
        }
        match self {
            Self::Ggx => 0.5 * ((1.0 + xy2 / z2).sqrt() - 1.0),
            Self::Beckmann => {
                // a = 1 / (alpha_w * tan(theta))
                let a = (z2 / xy2.max(1e-14)).sqrt();
                if a >= 1.6 {
                    0.0
                } else {
                    (1.0 - 1.259 * a + 0.396 * a * a) / (3.535 * a + 2.181 * a * a)
                }
            }
        }
    }

    pub fn g1(self, w: Vec3, alpha: Vec2) -> f32 {
        1.0 / (1.0 + self.lambda(w, alpha))
    }

    /// Sample a microfacet normal as seen from `wi`, which must be above the surface.
    pub fn sample_h(self, wi: Vec3, alpha: Vec2, u: Vec2) -> Option<Vec3> {
        match self {
            Self::Ggx => Some(sample_ggx_vndf(wi, alpha, u)),
            Self::Beckmann => sample_beckmann(alpha, u),
        }
    }

    /// Density of [`Self::sample_h`] over microfacet normals.
    pub fn pdf_h(self, wi: Vec3, h: Vec3, alpha: Vec2) -> f32 {
        match self {
            Self::Ggx => {
                if wi.z <= 0.0 {
                    return 0.0;
                }
                self.g1(wi, alpha) * wi.dot(h).max(0.0) * self.d(h, alpha) / wi.z
            }
            Self::Beckmann => self.d(h, alpha) * h.z.max(0.0),
        }
    }
}

/// Anisotropic GGX distribution.
pub(crate) fn ggx_d(h: Vec3, alpha: Vec2) -> f32 {
    let tmp = h.z * h.z + h.x * h.x / (alpha.x * alpha.x) + h.y * h.y / (alpha.y * alpha.y);
    1.0 / (PI * tmp * tmp * alpha.x * alpha.y).max(1e-7)
}

/// Visible-normal sampling for GGX (Heitz 2018).
pub(crate) fn sample_ggx_vndf(wi: Vec3, alpha: Vec2, u: Vec2) -> Vec3 {
    let vh = Vec3::new(alpha.x * wi.x, alpha.y * wi.y, wi.z).normalize();
    let lensq = vh.x * vh.x + vh.y * vh.y;
    let t1 = if lensq > 0.0 {
        Vec3::new(-vh.y, vh.x, 0.0) / lensq.sqrt()
    } else {
        Vec3::X
    };
    let t2 = vh.cross(t1);

    let r = u.x.sqrt();
    let phi = TAU * u.y;
    let p1 = r * phi.cos();
    let s = 0.5 * (1.0 + vh.z);
    let p2 = (1.0 - s) * (1.0 - p1 * p1).max(0.0).sqrt() + s * r * phi.sin();

    let nh = t1 * p1 + t2 * p2 + vh * (1.0 - p1 * p1 - p2 * p2).max(0.0).sqrt();
    Vec3::new(alpha.x * nh.x, alpha.y * nh.y, nh.z.max(1e-6)).normalize()
}

fn sample_beckmann(alpha: Vec2, u: Vec2) -> Option<Vec3> {
    let log_sample = (1.0 - u.x).ln();
    if !log_sample.is_finite() {
        return None;
    }

    let (tan2, phi) = if alpha.x == alpha.y {
        (-alpha.x * alpha.x * log_sample, TAU * u.y)
    } else {
        let mut phi = (alpha.y / alpha.x * (TAU * u.y + 0.5 * PI).tan()).atan();
        if u.y > 0.5 {
            phi += PI;
        }
        let (sin_phi, cos_phi) = phi.sin_cos();
        let alpha2 = 1.0
            / (cos_phi * cos_phi / (alpha.x * alpha.x) + sin_phi * sin_phi / (alpha.y * alpha.y));
        (-alpha2 * log_sample, phi)
    };

    let cos_theta = 1.0 / (1.0 + tan2).sqrt();
    if cos_theta < 1e-6 {
        return None;
    }
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    Some(spherical_direction(sin_theta, cos_theta, phi))
}

/// Local-frame evaluation of a rough lobe: `(f * cos, pdf)` for both
/// directions already expressed around `z`.
struct Local<'a, 'b> {
    ctx: &'a ScatterContext<'b>,
    dist: MicrofacetDistribution,
    alpha: Vec2,
    eta: f32,
    ior: f32,
}

impl Local<'_, '_> {
    fn reflection(&self, wi: Vec3, wo: Vec3, world_wi: Vec3, world_h: impl Fn(Vec3) -> Vec3) -> (Spectrum, f32) {
        if wi.z <= 0.0 || wo.z <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let Some(h) = (wi + wo).try_normalize() else {
            return (Spectrum::ZERO, 0.0);
        };
        let cos_hi = wi.dot(h);
        if cos_hi <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }

        let d = self.dist.d(h, self.alpha);
        let g = self.dist.g1(wi, self.alpha) * self.dist.g1(wo, self.alpha);
        let value = d * g / (4.0 * wi.z);
        let pdf = self.dist.pdf_h(wi, h, self.alpha) / (4.0 * cos_hi);

        let f = microfacet_fresnel(self.ctx, self.ior, world_wi, world_h(h));
        (f * value, pdf)
    }

    fn refraction(&self, wi: Vec3, wo: Vec3) -> (Spectrum, f32) {
        if wi.z <= 0.0 || wo.z >= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let eta = self.eta;
        let mut h = -(wi + wo * eta);
        if h.z < 0.0 {
            h = -h;
        }
        let Some(h) = h.try_normalize() else {
            return (Spectrum::ZERO, 0.0);
        };

        let cos_hi = wi.dot(h);
        let cos_ho = wo.dot(h);
        if cos_hi <= 0.0 || cos_ho >= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let denom = cos_hi + eta * cos_ho;
        let denom2 = denom * denom;
        if denom2 < 1e-12 {
            return (Spectrum::ZERO, 0.0);
        }

        let d = self.dist.d(h, self.alpha);
        let g = self.dist.g1(wi, self.alpha) * self.dist.g1(wo, self.alpha);
        let jacobian = eta * eta * cos_ho.abs() / denom2;
        let value = g * cos_hi * d * jacobian / wi.z;
        let pdf = self.dist.pdf_h(wi, h, self.alpha) * jacobian;
        (Spectrum::splat(value), pdf)
    }

    fn glass(&self, wi: Vec3, wo: Vec3, world_wi: Vec3, world_h: impl Fn(Vec3) -> Vec3) -> (Spectrum, f32) {
        if wo.z > 0.0 {
            let Some(h) = (wi + wo).try_normalize() else {
                return (Spectrum::ZERO, 0.0);
            };
            let f = fresnel_dielectric_cos(wi.dot(h), self.eta);
            let (value, pdf) = self.reflection(wi, wo, world_wi, world_h);
            (value * f, pdf * f)
        } else {
            let (value, pdf) = self.refraction(wi, wo);
            if pdf <= 0.0 {
                return (Spectrum::ZERO, 0.0);
            }
            let mut h = -(wi + wo * self.eta);
            if h.z < 0.0 {
                h = -h;
            }
            let h = h.normalize();
            let f = fresnel_dielectric_cos(wi.dot(h), self.eta);
            (value * (1.0 - f), pdf * (1.0 - f))
        }
    }
}

/// Tint of a delta glass event; the same as the first bounce of the rough walk.
///
/// Only the principled Fresnel glass carries one: reflection interpolates
/// toward `cspec0`, refraction takes `color`.
fn singular_glass_tint(ctx: &ScatterContext<'_>, n: Vec3, eta: f32, reflected: bool) -> Spectrum {
    if !ctx.ty.has_fresnel() {
        return Spectrum::ONE;
    }
    match ctx.extra.and_then(|e| e.as_microfacet()) {
        Some(extra) if reflected => interpolate_fresnel_color(ctx.wi, n, eta, extra.cspec0),
        Some(extra) => extra.color,
        None => Spectrum::ONE,
    }
}

enum Kind {
    Reflection,
    Refraction,
    Glass,
}

fn kind(ty: ClosureType) -> Kind {
    match ty {
        ClosureType::RefractionBsdf
        | ClosureType::MicrofacetBeckmannRefractionBsdf
        | ClosureType::MicrofacetGgxRefractionBsdf => Kind::Refraction,
        ty if ty.is_glass() => Kind::Glass,
        _ => Kind::Reflection,
    }
}

impl MicrofacetBsdf {
    /// Normal facing the viewer and the matching relative index.
    fn oriented(&self, ctx: &ScatterContext<'_>) -> (Vec3, f32) {
        if ctx.n.dot(ctx.wi) < 0.0 {
            (-ctx.n, 1.0 / self.ior)
        } else {
            (ctx.n, self.ior)
        }
    }

    fn sample_singular(
        &self,
        ctx: &ScatterContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        match kind(ctx.ty) {
            Kind::Reflection => {
                if ctx.n.dot(ctx.wi) <= 0.0 {
                    return None;
                }
                let wo = reflect(ctx.wi, ctx.n);
                if ctx.ng.dot(wo) <= 0.0 {
                    return None;
                }
                let color = microfacet_fresnel(ctx, self.ior, ctx.wi, ctx.n);
                Some(BsdfSample::singular(wo, color, Label::REFLECT))
            }
            Kind::Refraction => {
                let (n, eta) = self.oriented(ctx);
                let wo = refract(ctx.wi, n, 1.0 / eta)?;
                Some(BsdfSample::singular(wo, Spectrum::ONE, Label::TRANSMIT))
            }
            Kind::Glass => {
                let (n, eta) = self.oriented(ctx);
                let f = fresnel_dielectric_cos(n.dot(ctx.wi), eta);
                if rng.gen::<f32>() < f {
                    let color = singular_glass_tint(ctx, n, eta, true);
                    Some(BsdfSample::singular(reflect(ctx.wi, n), color, Label::REFLECT))
                } else {
                    let wo = refract(ctx.wi, n, 1.0 / eta)?;
                    let color = singular_glass_tint(ctx, n, eta, false);
                    Some(BsdfSample::singular(wo, color, Label::TRANSMIT))
                }
            }
        }
    }

    fn eval_rough(&self, ctx: &ScatterContext<'_>, wo: Vec3) -> (Spectrum, f32) {
        let (n, eta) = self.oriented(ctx);
        let frame = self.frame(n);
        let local = Local {
            ctx,
            dist: MicrofacetDistribution::of(ctx.ty),
            alpha: self.alpha(),
            eta,
            ior: self.ior,
        };
        let wi_l = frame.to_local(ctx.wi);
        let wo_l = frame.to_local(wo);
        let to_world = |h: Vec3| frame.to_world(h);
        match kind(ctx.ty) {
            Kind::Reflection => {
                if ctx.n.dot(ctx.wi) <= 0.0 {
                    return (Spectrum::ZERO, 0.0);
                }
                local.reflection(wi_l, wo_l, ctx.wi, to_world)
            }
            Kind::Refraction => local.refraction(wi_l, wo_l),
            Kind::Glass => local.glass(wi_l, wo_l, ctx.wi, to_world),
        }
    }

    fn sample_rough(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        let kind = kind(ctx.ty);
        if matches!(kind, Kind::Reflection) && ctx.n.dot(ctx.wi) <= 0.0 {
            return None;
        }
        let (n, eta) = self.oriented(ctx);
        let frame = self.frame(n);
        let dist = MicrofacetDistribution::of(ctx.ty);
        let wi_l = frame.to_local(ctx.wi);
        if wi_l.z <= 0.0 {
            return None;
        }
        let h = dist.sample_h(wi_l, self.alpha(), u)?;

        let transmit = match kind {
            Kind::Reflection => false,
            Kind::Refraction => true,
            Kind::Glass => rng.gen::<f32>() >= fresnel_dielectric_cos(wi_l.dot(h), eta),
        };

        let wo_l = if transmit {
            refract(wi_l, h, 1.0 / eta)?
        } else {
            reflect(wi_l, h)
        };
        let wo = frame.to_world(wo_l);

        let (label, valid) = if transmit {
            (Label::TRANSMIT | Label::GLOSSY, wo_l.z < 0.0 && ctx.ng.dot(wo) * ctx.ng.dot(ctx.wi) < 0.0)
        } else {
            (Label::REFLECT | Label::GLOSSY, wo_l.z > 0.0 && ctx.ng.dot(wo) * ctx.ng.dot(ctx.wi) > 0.0)
        };
        if !valid {
            return None;
        }

        let (eval, pdf) = self.eval_rough(ctx, wo);
        if !(pdf > 0.0) {
            return None;
        }
        Some(BsdfSample::new(wo, eval, pdf, label))
    }
}

impl Bxdf for MicrofacetBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, rng: &mut dyn RngCore) -> (Spectrum, f32) {
        if self.is_singular() {
            return (Spectrum::ZERO, 0.0);
        }
        if ctx.ty.is_multiscatter() {
            return microfacet_multi::eval(self, ctx, wo, rng);
        }
        self.eval_rough(ctx, wo)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        if self.is_singular() || ctx.ty.is_singular() {
            return self.sample_singular(ctx, rng);
        }
        if ctx.ty.is_multiscatter() {
            return microfacet_multi::sample(self, ctx, u, rng);
        }
        self.sample_rough(ctx, u, rng)
    }

    fn blur(&mut self, roughness: f32) {
        self.alpha_x = self.alpha_x.max(roughness);
        self.alpha_y = self.alpha_y.max(roughness);
    }

    fn albedo(&self, ctx: &ScatterContext<'_>) -> Spectrum {
        microfacet_fresnel_color(ctx, self.ior)
    }

    fn roughness_eta(&self) -> (Vec2, f32) {
        (self.alpha(), self.ior)
    }
}
