//! Multiple-scattering GGX (Heitz et al. 2016).
//!
//! A stochastic random walk over a height-correlated microsurface. Glossy
//! and glass variants share the walk and differ only in the phase function,
//! expressed through [`MicrofacetPhase`]. Both `eval` and `sample` are
//! unbiased estimators, so the returned pdf is a fitted approximation and
//! the sample weight is the walk throughput.

use glam::{Vec2, Vec3};
use lux_math::{beta, safe_sqrt, saturate, Spectrum};
use rand::{Rng, RngCore};
use std::f32::consts::{FRAC_1_PI, TAU};

use super::fresnel::{fresnel_dielectric_cos, interpolate_fresnel_color, reflect, refract};
use super::microfacet::{ggx_d, MicrofacetBsdf};
use super::{BsdfSample, ScatterContext};
use crate::closure::ClosureType;
use crate::label::{ClosureFlags, Label};

/// Bounces after which the walk is terminated.
pub const MAX_ORDER: usize = 10;

impl MicrofacetBsdf {
    pub fn setup_multi(&mut self) -> ClosureFlags {
        self.alpha_x = self.alpha_x.clamp(1e-4, 1.0);
        self.alpha_y = self.alpha_y.clamp(1e-4, 1.0);
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL | ClosureFlags::NEEDS_RANDOM
    }

    /// Glass walks are isotropic; `alpha_y` follows `alpha_x`.
    pub fn setup_multi_glass(&mut self) -> ClosureFlags {
        self.alpha_x = self.alpha_x.clamp(1e-4, 1.0);
        self.alpha_y = self.alpha_x;
        self.ior = self.ior.max(1e-5);
        ClosureFlags::BSDF
            | ClosureFlags::HAS_EVAL
            | ClosureFlags::HAS_TRANSMISSION
            | ClosureFlags::NEEDS_RANDOM
    }
}

/// Smith auxiliary function extended to the lower hemisphere, where it
/// becomes `-1 - lambda(-w)`.
pub(crate) fn mf_lambda(w: Vec3, alpha: Vec2) -> f32 {
    if w.z > 0.9999 {
        return 0.0;
    }
    if w.z < -0.9999 {
        return -0.9999;
    }
    let inv_wz2 = 1.0 / (w.z * w.z).max(1e-7);
    let wa = Vec2::new(w.x, w.y) * alpha;
    let mut v = (1.0 + wa.dot(wa) * inv_wz2).sqrt();
    if w.z <= 0.0 {
        v = -v;
    }
    0.5 * (v - 1.0)
}

/// Height distribution is uniform over `[-1, 1]`.
fn mf_c1(h: f32) -> f32 {
    saturate(0.5 * (h + 1.0))
}

fn mf_inv_c1(c1: f32) -> f32 {
    2.0 * saturate(c1) - 1.0
}

fn mf_g1(w: Vec3, c1: f32, lambda: f32) -> f32 {
    if w.z > 0.9999 {
        return 1.0;
    }
    if w.z < 1e-5 {
        return 0.0;
    }
    c1.powf(lambda)
}

/// Height state of a walk segment.
#[derive(Debug, Clone, Copy)]
struct Height {
    h: f32,
    c1: f32,
    g1: f32,
    lambda: f32,
}

impl Height {
    /// Advance to the next intersection height along `w`.
    ///
    /// Returns `false` when the ray leaves the microsurface.
    fn sample(&mut self, w: Vec3, u: f32) -> bool {
        if w.z > 0.9999 {
            return false;
        }
        if w.z < -0.9999 {
            self.c1 *= u;
            self.h = mf_inv_c1(self.c1);
            self.g1 = mf_g1(w, self.c1, self.lambda);
        } else if w.z.abs() >= 0.0001 {
            if u > 1.0 - self.g1 {
                return false;
            }
            if self.lambda >= 0.0 {
                self.c1 = 1.0;
            } else {
                self.c1 *= (1.0 - u).powf(-1.0 / self.lambda);
            }
            self.h = mf_inv_c1(self.c1);
            self.g1 = mf_g1(w, self.c1, self.lambda);
        }
        true
    }
}

/// Slope sampling of the standard GGX visible normals for incidence `cos_i`.
fn mf_sample_p22_11(cos_i: f32, u: Vec2) -> Vec2 {
    if cos_i > 0.9999 || cos_i.abs() < 1e-6 {
        let r = (u.x / (1.0 - u.x).max(1e-7)).sqrt();
        let phi = TAU * u.y;
        return Vec2::new(r * phi.cos(), r * phi.sin());
    }

    let sin_i = safe_sqrt(1.0 - cos_i * cos_i);
    let tan_i = sin_i / cos_i;
    let proj_a = 0.5 * (cos_i + 1.0);
    if proj_a < 0.0001 {
        return Vec2::ZERO;
    }
    let a = 2.0 * u.x * proj_a / cos_i - 1.0;
    let mut tmp = a * a - 1.0;
    if tmp.abs() < 1e-7 {
        return Vec2::ZERO;
    }
    tmp = 1.0 / tmp;
    let d = safe_sqrt(tan_i * tan_i * tmp * tmp - (a * a - tan_i * tan_i) * tmp);

    let slope_x2 = tan_i * tmp + d;
    let slope_x = if a < 0.0 || slope_x2 > 1.0 / tan_i {
        tan_i * tmp - d
    } else {
        slope_x2
    };

    let (u2, sign) = if u.y >= 0.5 {
        (2.0 * (u.y - 0.5), 1.0)
    } else {
        (2.0 * (0.5 - u.y), -1.0)
    };
    let z = (u2 * (u2 * (u2 * 0.27385 - 0.73369) + 0.46341))
        / (u2 * (u2 * (u2 * 0.093073 + 0.309420) - 1.0) + 0.597999);
    let slope_y = z * (1.0 + slope_x * slope_x).sqrt();
    Vec2::new(slope_x, sign * slope_y)
}

/// Visible normal for a direction on either side of the macrosurface.
fn mf_sample_vndf(wi: Vec3, alpha: Vec2, u: Vec2) -> Vec3 {
    let wi_11 = Vec3::new(alpha.x * wi.x, alpha.y * wi.y, wi.z).normalize();
    let slope_11 = mf_sample_p22_11(wi_11.z, u);
    let cossin_phi = Vec2::new(wi_11.x, wi_11.y)
        .try_normalize()
        .unwrap_or(Vec2::X);
    let slope_x = alpha.x * (cossin_phi.x * slope_11.x - cossin_phi.y * slope_11.y);
    let slope_y = alpha.y * (cossin_phi.y * slope_11.x + cossin_phi.x * slope_11.y);
    Vec3::new(-slope_x, -slope_y, 1.0).normalize()
}

/// Directional albedo fit of single-scattering GGX, used to split the pdf.
pub fn mf_ggx_albedo(r: f32) -> f32 {
    let mut albedo = 0.806495 * (-1.98712 * r * r).exp() + 0.199531;
    albedo -= ((((((1.76741 * r - 8.43891) * r + 15.784) * r - 14.398) * r + 6.45221) * r
        - 1.19722)
        * r
        + 0.027803)
        * r
        + 0.00568739;
    saturate(albedo)
}

/// Transmission albedo fit of single-scattering GGX glass.
pub fn mf_ggx_transmission_albedo(a: f32, ior: f32) -> f32 {
    let ior = if ior < 1.0 { 1.0 / ior } else { ior }.clamp(1.0, 3.0);
    let a = saturate(a);
    let i_1 = 0.0476898 * (-0.978352 * (ior - 0.65657) * (ior - 0.65657)).exp()
        - 0.033756 * ior
        + 0.993261;
    let r_1 = (((0.116991 * a - 0.270369) * a + 0.0501366) * a - 0.00411511) * a + 1.00008;
    let i_2 = (((-2.08704 * ior + 26.3298) * ior - 127.906) * ior + 297.032) * ior - 273.009;
    let r_2 =
        ((((5.3724 * a - 24.9307) * a + 22.7437) * a - 3.40751) * a + 0.0986325) * a + 0.00493504;
    saturate(1.0 + i_2 * r_2 * 0.0019127 - (1.0 - i_1) * (1.0 - r_1) * 9.3205)
}

/// Sampling density assigned to walk results: single-scatter VNDF blended with a cosine lobe.
pub fn mf_ggx_pdf(wi: Vec3, wo: Vec3, alpha: Vec2) -> f32 {
    let Some(h) = (wi + wo).try_normalize() else {
        return 0.0;
    };
    let d = ggx_d(h, alpha);
    let lambda = mf_lambda(wi, alpha);
    let single = 0.25 * d / ((1.0 + lambda) * wi.z).max(1e-7);
    let multi = wo.z * FRAC_1_PI;
    let albedo = mf_ggx_albedo((alpha.x * alpha.y).sqrt());
    albedo * single + (1.0 - albedo) * multi
}

pub fn mf_glass_pdf(wi: Vec3, wo: Vec3, alpha: f32, eta: f32) -> f32 {
    let reflective = wi.z * wo.z > 0.0;
    let sum = wi + if reflective { wo } else { wo * eta };
    let len = sum.length();
    if len < 1e-7 {
        return 0.0;
    }
    let mut h = sum / len;
    if h.z < 0.0 {
        h = -h;
    }
    let r_wi = if wi.z < 0.0 { -wi } else { wi };
    let alpha2 = Vec2::splat(alpha);
    let lambda = mf_lambda(r_wi, alpha2);
    let d = ggx_d(h, alpha2);
    let fresnel = fresnel_dielectric_cos(r_wi.dot(h), eta);
    let multi = (wo.z * FRAC_1_PI).abs();

    if reflective {
        let single = 0.25 * d / ((1.0 + lambda) * r_wi.z).max(1e-7);
        let albedo = mf_ggx_albedo(alpha);
        fresnel * (albedo * single + (1.0 - albedo) * multi)
    } else {
        let single = (r_wi.dot(h) * wo.dot(h) * d * eta * eta
            / ((1.0 + lambda) * r_wi.z * len * len).max(1e-7))
        .abs();
        let albedo = mf_ggx_transmission_albedo(alpha, eta);
        (1.0 - fresnel) * (albedo * single + (1.0 - albedo) * multi)
    }
}

/// Scattering behaviour of a single microfacet in the walk.
///
/// Directions follow the walk convention: `w` is the travel direction of the
/// ray arriving at the facet, `wo` the direction leaving toward the viewer
/// side of the current height field.
pub(crate) trait MicrofacetPhase {
    fn alpha(&self) -> Vec2;

    /// Relative index for the side the walk is on.
    fn eta(&self, outside: bool) -> f32;

    /// Closed-form first-order term of `f * cos` toward `wo`.
    fn single_scatter(&self, wi: Vec3, wo: Vec3, wo_outside: bool, lambda_r: f32, lambda_o: f32) -> f32;

    /// Density of leaving a facet hit along `w` toward `wo`.
    fn eval_phase(&self, w: Vec3, lambda: f32, wo: Vec3, wo_outside: bool, outside: bool) -> f32;

    /// Scatter `wi` off facet `wm`. Returns the new direction and whether it stayed on the same side.
    fn sample_phase(&self, wi: Vec3, wm: Vec3, outside: bool, u: f32) -> (Vec3, bool);

    /// Half vector between `wi` and `wo` on the current side.
    fn half_vector(&self, wi: Vec3, wo: Vec3, reflected: bool, outside: bool) -> Vec3 {
        if reflected {
            (wi + wo).normalize_or_zero()
        } else {
            let h = (wo * self.eta(outside) + wi).normalize_or_zero();
            if h.z < 0.0 {
                -h
            } else {
                h
            }
        }
    }

    /// Color picked up by bounce number `order` off facet `h`.
    fn tint(&self, order: usize, wi: Vec3, h: Vec3, reflected: bool, outside: bool) -> Spectrum;
}

/// Reflection-only microsurface.
pub(crate) struct GlossyPhase {
    pub alpha: Vec2,
    pub ior: f32,
    pub color: Spectrum,
    /// Principled Fresnel tint; `None` tints every bounce after the first with `color`
    pub cspec0: Option<Spectrum>,
}

impl MicrofacetPhase for GlossyPhase {
    fn alpha(&self) -> Vec2 {
        self.alpha
    }

    fn eta(&self, _outside: bool) -> f32 {
        self.ior
    }

    fn single_scatter(&self, wi: Vec3, wo: Vec3, _wo_outside: bool, lambda_r: f32, lambda_o: f32) -> f32 {
        let Some(h) = (wi + wo).try_normalize() else {
            return 0.0;
        };
        // lambda_r is the lower-hemisphere value -1 - lambda(wi)
        let g2 = 1.0 / (-lambda_r + lambda_o);
        g2 * 0.25 / wi.z * ggx_d(h, self.alpha)
    }

    fn eval_phase(&self, w: Vec3, lambda: f32, wo: Vec3, _wo_outside: bool, _outside: bool) -> f32 {
        if w.z > 0.9999 {
            return 0.0;
        }
        let Some(h) = (wo - w).try_normalize() else {
            return 0.0;
        };
        if h.z < 0.0 {
            return 0.0;
        }
        let proj_area = if w.z < -0.9999 { 1.0 } else { lambda * w.z };
        let cos_wh = (-w).dot(h);
        if cos_wh < 0.0 {
            return 0.0;
        }
        cos_wh * 0.25 / (proj_area * cos_wh).max(1e-7) * ggx_d(h, self.alpha)
    }

    fn sample_phase(&self, wi: Vec3, wm: Vec3, _outside: bool, _u: f32) -> (Vec3, bool) {
        (reflect(wi, wm), true)
    }

    fn tint(&self, order: usize, wi: Vec3, h: Vec3, _reflected: bool, _outside: bool) -> Spectrum {
        match self.cspec0 {
            Some(cspec0) => interpolate_fresnel_color(wi, h, self.ior, cspec0),
            None if order > 0 => self.color,
            None => Spectrum::ONE,
        }
    }
}

/// Dielectric microsurface that reflects or refracts by Fresnel.
pub(crate) struct GlassPhase {
    pub alpha: f32,
    pub eta: f32,
    pub color: Spectrum,
    /// Principled reflection tint; refracted bounces are tinted by `color`
    pub cspec0: Option<Spectrum>,
}

impl MicrofacetPhase for GlassPhase {
    fn alpha(&self) -> Vec2 {
        Vec2::splat(self.alpha)
    }

    fn eta(&self, outside: bool) -> f32 {
        if outside {
            self.eta
        } else {
            1.0 / self.eta
        }
    }

    fn single_scatter(&self, wi: Vec3, wo: Vec3, wo_outside: bool, lambda_r: f32, lambda_o: f32) -> f32 {
        let phase = self.eval_phase(-wi, lambda_r, wo, wo_outside, true);
        if wo_outside {
            phase * -lambda_r / (lambda_o - lambda_r)
        } else {
            phase * -lambda_r * beta(-lambda_r, lambda_o + 1.0)
        }
    }

    fn eval_phase(&self, w: Vec3, lambda: f32, wo: Vec3, wo_outside: bool, outside: bool) -> f32 {
        if w.z > 0.9999 {
            return 0.0;
        }
        let eta = self.eta(outside);
        let alpha = self.alpha();
        let proj_area = if w.z < -0.9999 { 1.0 } else { lambda * w.z };

        if wo_outside {
            let Some(h) = (wo - w).try_normalize() else {
                return 0.0;
            };
            if h.z < 0.0 {
                return 0.0;
            }
            let cos_wh = (-w).dot(h);
            if cos_wh <= 0.0 {
                return 0.0;
            }
            fresnel_dielectric_cos(cos_wh, eta) * cos_wh * ggx_d(h, alpha) * 0.25
                / (proj_area * cos_wh).max(1e-7)
        } else {
            let Some(mut h) = (wo * eta - w).try_normalize() else {
                return 0.0;
            };
            if h.z < 0.0 {
                h = -h;
            }
            let cos_wh = (-w).dot(h);
            let cos_woh = wo.dot(h);
            if cos_wh < 0.0 {
                return 0.0;
            }
            // eta^2 from the half-vector Jacobian, so the value matches the walk's refraction density.
            let temp = cos_wh + eta * cos_woh;
            (1.0 - fresnel_dielectric_cos(cos_wh, eta))
                * eta
                * eta
                * cos_wh.max(0.0)
                * (-cos_woh).max(0.0)
                * ggx_d(h, alpha)
                / (proj_area * temp * temp).max(1e-7)
        }
    }

    fn sample_phase(&self, wi: Vec3, wm: Vec3, outside: bool, u: f32) -> (Vec3, bool) {
        let eta = self.eta(outside);
        let cos_i = wi.dot(wm);
        let f = fresnel_dielectric_cos(cos_i, eta);
        if u < f {
            return (reflect(wi, wm), true);
        }
        match refract(wi, wm, 1.0 / eta) {
            Some(wt) => (wt.normalize(), false),
            None => (reflect(wi, wm), true),
        }
    }

    fn tint(&self, order: usize, wi: Vec3, h: Vec3, reflected: bool, outside: bool) -> Spectrum {
        match self.cspec0 {
            Some(cspec0) if reflected => interpolate_fresnel_color(wi, h, self.eta(outside), cspec0),
            Some(_) => self.color,
            None if order > 0 => self.color,
            None => Spectrum::ONE,
        }
    }
}

/// Stochastic estimate of `f * cos` from `wi` toward `wo` in the local frame.
pub(crate) fn mf_eval<P: MicrofacetPhase>(
    phase: &P,
    mut wi: Vec3,
    mut wo: Vec3,
    wo_outside: bool,
    rng: &mut dyn RngCore,
) -> Spectrum {
    // Start from the shallower direction for lower variance; reflection is symmetric.
    let mut swapped = false;
    if wo_outside && wo.z < wi.z {
        swapped = true;
        std::mem::swap(&mut wi, &mut wo);
    }

    if wi.z < 1e-5 || (wo_outside && wo.z < 1e-5) || (!wo_outside && wo.z > -1e-5) {
        return Spectrum::ZERO;
    }

    let alpha = phase.alpha();
    let lambda_r = mf_lambda(-wi, alpha);
    let lambda_o = mf_lambda(if wo_outside { wo } else { -wo }, alpha);

    let h0 = phase.half_vector(wi, wo, wo_outside, true);
    let mut eval = phase.tint(0, wi, h0, wo_outside, true)
        * phase.single_scatter(wi, wo, wo_outside, lambda_r, lambda_o);

    let mut throughput = Spectrum::ONE;
    let mut wr = -wi;
    let mut height = Height {
        h: 1.0,
        c1: 1.0,
        g1: 0.0,
        lambda: lambda_r,
    };
    let mut outside = true;

    for order in 0..MAX_ORDER {
        if !height.sample(wr, rng.gen()) {
            break;
        }
        let wm = mf_sample_vndf(-wr, alpha, Vec2::new(rng.gen(), rng.gen()));

        if order > 0 {
            // Next-event toward wo from this height.
            let (wo_side, wo_side_outside) = if outside {
                (wo, wo_outside)
            } else {
                (-wo, !wo_outside)
            };
            let p = phase.eval_phase(wr, height.lambda, wo_side, wo_side_outside, outside);
            if p > 0.0 {
                let shadow_h = if outside == wo_outside { height.h } else { -height.h };
                let g1 = mf_g1(if wo_outside { wo } else { -wo }, mf_c1(shadow_h), lambda_o);
                let h = phase.half_vector(-wr, wo_side, wo_side_outside, outside);
                eval += throughput * phase.tint(order, -wr, h, wo_side_outside, outside) * (p * g1);
            }
        }
        if order + 1 >= MAX_ORDER {
            break;
        }

        let (next_wr, next_outside) = phase.sample_phase(-wr, wm, outside, rng.gen());
        throughput *= phase.tint(order, -wr, wm, next_outside, outside);
        wr = next_wr;
        if !next_outside {
            outside = !outside;
            wr = -wr;
            height.h = -height.h;
        }

        height.lambda = mf_lambda(wr, alpha);
        height.c1 = mf_c1(height.h);
        height.g1 = mf_g1(wr, height.c1, height.lambda);
    }

    if swapped {
        eval *= (wi.z / wo.z).abs();
    }
    eval
}

/// Trace one walk from `wi`. Returns the exit direction and the path throughput.
///
/// `u` drives the first visible-normal sample, later bounces draw from `rng`.
pub(crate) fn mf_sample<P: MicrofacetPhase>(
    phase: &P,
    wi: Vec3,
    u: Vec2,
    rng: &mut dyn RngCore,
) -> Option<(Vec3, Spectrum)> {
    let alpha = phase.alpha();
    let mut throughput = Spectrum::ONE;
    let mut wr = -wi;
    let mut height = Height {
        h: 1.0,
        c1: 1.0,
        g1: 0.0,
        lambda: mf_lambda(wr, alpha),
    };
    let mut outside = true;

    for order in 0..MAX_ORDER {
        if !height.sample(wr, rng.gen()) {
            let wo = if outside { wr } else { -wr };
            return Some((wo, throughput));
        }
        let vndf_u = if order == 0 {
            u
        } else {
            Vec2::new(rng.gen(), rng.gen())
        };
        let wm = mf_sample_vndf(-wr, alpha, vndf_u);

        let (next_wr, next_outside) = phase.sample_phase(-wr, wm, outside, rng.gen());
        throughput *= phase.tint(order, -wr, wm, next_outside, outside);
        wr = next_wr;
        if !next_outside {
            outside = !outside;
            wr = -wr;
            height.h = -height.h;
        }

        height.lambda = mf_lambda(wr, alpha);
        height.c1 = mf_c1(height.h);
        height.g1 = mf_g1(wr, height.c1, height.lambda);
    }

    log::trace!("microfacet walk terminated after {MAX_ORDER} bounces");
    None
}

fn extra_colors(ctx: &ScatterContext<'_>) -> (Spectrum, Option<Spectrum>) {
    let extra = ctx.extra.and_then(|e| e.as_microfacet());
    let color = extra.map_or(Spectrum::ONE, |e| e.color);
    let cspec0 = if ctx.ty.has_fresnel() {
        extra.map(|e| e.cspec0)
    } else {
        None
    };
    (color, cspec0)
}

fn glossy_phase(bsdf: &MicrofacetBsdf, ctx: &ScatterContext<'_>) -> GlossyPhase {
    let (color, cspec0) = extra_colors(ctx);
    GlossyPhase {
        alpha: bsdf.alpha(),
        ior: bsdf.ior,
        color,
        cspec0,
    }
}

fn glass_phase(bsdf: &MicrofacetBsdf, ctx: &ScatterContext<'_>, eta: f32) -> GlassPhase {
    let (color, cspec0) = extra_colors(ctx);
    GlassPhase {
        alpha: bsdf.alpha_x,
        eta,
        color,
        cspec0,
    }
}

fn is_glass(ty: ClosureType) -> bool {
    matches!(
        ty,
        ClosureType::MicrofacetMultiGgxGlassBsdf | ClosureType::MicrofacetMultiGgxGlassFresnelBsdf
    )
}

/// Normal facing the viewer and the matching relative index.
fn oriented(bsdf: &MicrofacetBsdf, ctx: &ScatterContext<'_>) -> (Vec3, f32) {
    if ctx.n.dot(ctx.wi) < 0.0 {
        (-ctx.n, 1.0 / bsdf.ior.max(1e-5))
    } else {
        (ctx.n, bsdf.ior)
    }
}

pub(crate) fn eval(
    bsdf: &MicrofacetBsdf,
    ctx: &ScatterContext<'_>,
    wo: Vec3,
    rng: &mut dyn RngCore,
) -> (Spectrum, f32) {
    if is_glass(ctx.ty) {
        let (n, eta) = oriented(bsdf, ctx);
        let frame = bsdf.frame(n);
        let wi_l = frame.to_local(ctx.wi);
        let wo_l = frame.to_local(wo);
        let phase = glass_phase(bsdf, ctx, eta);
        let pdf = mf_glass_pdf(wi_l, wo_l, bsdf.alpha_x, eta);
        let value = mf_eval(&phase, wi_l, wo_l, wo_l.z > 0.0, rng);
        (value, pdf)
    } else {
        if ctx.n.dot(ctx.wi) <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let frame = bsdf.frame(ctx.n);
        let wi_l = frame.to_local(ctx.wi);
        let wo_l = frame.to_local(wo);
        if wo_l.z <= 0.0 {
            return (Spectrum::ZERO, 0.0);
        }
        let phase = glossy_phase(bsdf, ctx);
        let pdf = mf_ggx_pdf(wi_l, wo_l, phase.alpha);
        let value = mf_eval(&phase, wi_l, wo_l, true, rng);
        (value, pdf)
    }
}

pub(crate) fn sample(
    bsdf: &MicrofacetBsdf,
    ctx: &ScatterContext<'_>,
    u: Vec2,
    rng: &mut dyn RngCore,
) -> Option<BsdfSample> {
    if is_glass(ctx.ty) {
        let (n, eta) = oriented(bsdf, ctx);
        let frame = bsdf.frame(n);
        let wi_l = frame.to_local(ctx.wi);
        let phase = glass_phase(bsdf, ctx, eta);
        let (wo_l, throughput) = mf_sample(&phase, wi_l, u, rng)?;
        let pdf = mf_glass_pdf(wi_l, wo_l, bsdf.alpha_x, eta);
        let wo = frame.to_world(wo_l);
        let label = if wo_l.z * wi_l.z > 0.0 {
            Label::REFLECT | Label::GLOSSY
        } else {
            Label::TRANSMIT | Label::GLOSSY
        };
        Some(BsdfSample::new(wo, throughput * pdf, pdf, label))
    } else {
        if ctx.n.dot(ctx.wi) <= 0.0 {
            return None;
        }
        let frame = bsdf.frame(ctx.n);
        let wi_l = frame.to_local(ctx.wi);
        let phase = glossy_phase(bsdf, ctx);
        let (wo_l, throughput) = mf_sample(&phase, wi_l, u, rng)?;
        let wo = frame.to_world(wo_l);
        if ctx.ng.dot(wo) <= 0.0 {
            return None;
        }
        let pdf = mf_ggx_pdf(wi_l, wo_l, phase.alpha);
        Some(BsdfSample::new(wo, throughput * pdf, pdf, Label::REFLECT | Label::GLOSSY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn white_glossy(alpha: f32) -> GlossyPhase {
        GlossyPhase {
            alpha: Vec2::splat(alpha),
            ior: 1.5,
            color: Spectrum::ONE,
            cspec0: None,
        }
    }

    /// Fraction of walks that leave the surface, which is the white albedo.
    fn walk_albedo(alpha: f32, wi: Vec3, rng: &mut StdRng) -> f32 {
        let phase = white_glossy(alpha);
        let n = 4000;
        let mut sum = 0.0;
        for _ in 0..n {
            let u = Vec2::new(rng.gen(), rng.gen());
            if let Some((wo, t)) = mf_sample(&phase, wi, u, rng) {
                assert!(wo.z > 0.0);
                sum += t.x;
            }
        }
        sum / n as f32
    }

    #[test]
    fn test_lambda_lower_hemisphere() {
        let alpha = Vec2::splat(0.5);
        let w = Vec3::new(0.6, 0.0, 0.8);
        let up = mf_lambda(w, alpha);
        let down = mf_lambda(-w, alpha);
        assert!((down - (-1.0 - up)).abs() < 1e-5);
    }

    #[test]
    fn test_white_walk_conserves_energy() {
        let mut rng = StdRng::seed_from_u64(21);
        let wi = Vec3::new(0.5, 0.0, 0.866);
        for alpha in [0.2, 0.5, 0.9] {
            let albedo = walk_albedo(alpha, wi, &mut rng);
            assert!(albedo > 0.9 && albedo <= 1.0 + 1e-4, "alpha {alpha}: {albedo}");
        }
    }

    #[test]
    fn test_vndf_faces_viewer() {
        let mut rng = StdRng::seed_from_u64(2);
        let alpha = Vec2::new(0.3, 0.7);
        let wi = Vec3::new(0.3, 0.4, 0.866).normalize();
        for _ in 0..500 {
            let wm = mf_sample_vndf(wi, alpha, Vec2::new(rng.gen(), rng.gen()));
            assert!(wm.z > 0.0);
            assert!((wm.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_albedo_fit_range() {
        assert!(mf_ggx_albedo(0.0) > 0.99);
        assert!(mf_ggx_albedo(1.0) < mf_ggx_albedo(0.2));
        for a in [0.1, 0.5, 0.9] {
            let t = mf_ggx_transmission_albedo(a, 1.5);
            assert!((0.0..=1.0).contains(&t));
        }
    }

    #[test]
    fn test_glass_walk_exits_both_sides() {
        let mut rng = StdRng::seed_from_u64(8);
        let phase = GlassPhase {
            alpha: 0.4,
            eta: 1.5,
            color: Spectrum::ONE,
            cspec0: None,
        };
        let wi = Vec3::new(0.3, 0.0, 0.95).normalize();
        let (mut reflected, mut transmitted) = (0, 0);
        for _ in 0..2000 {
            let u = Vec2::new(rng.gen(), rng.gen());
            if let Some((wo, _)) = mf_sample(&phase, wi, u, &mut rng) {
                if wo.z > 0.0 {
                    reflected += 1;
                } else {
                    transmitted += 1;
                }
            }
        }
        assert!(transmitted > reflected);
        assert!(reflected > 0);
    }

    /// Midpoint quadrature of `mf_eval` over the upper or lower hemisphere.
    fn integrate_glass(phase: &GlassPhase, wi: Vec3, outside: bool, rng: &mut StdRng) -> f32 {
        let n = 200;
        let mut sum = 0.0f64;
        for i in 0..n {
            let z = (i as f32 + 0.5) / n as f32;
            let r = (1.0 - z * z).max(0.0).sqrt();
            for j in 0..n {
                let phi = TAU * (j as f32 + 0.5) / n as f32;
                let z = if outside { z } else { -z };
                let wo = Vec3::new(r * phi.cos(), r * phi.sin(), z);
                sum += mf_eval(phase, wi, wo, outside, rng).x as f64;
            }
        }
        (sum * TAU as f64 / (n * n) as f64) as f32
    }

    #[test]
    fn test_glass_eval_matches_walk_per_side() {
        let mut rng = StdRng::seed_from_u64(14);
        let phase = GlassPhase {
            alpha: 0.3,
            eta: 1.5,
            color: Spectrum::ONE,
            cspec0: None,
        };
        let wi = Vec3::new(0.4, 0.0, 0.9).normalize();
        let n = 20_000;
        let (mut reflected, mut transmitted) = (0.0f32, 0.0f32);
        for _ in 0..n {
            let u = Vec2::new(rng.gen(), rng.gen());
            if let Some((wo, t)) = mf_sample(&phase, wi, u, &mut rng) {
                if wo.z > 0.0 {
                    reflected += t.x;
                } else {
                    transmitted += t.x;
                }
            }
        }
        let reflected = reflected / n as f32;
        let transmitted = transmitted / n as f32;

        let eval_reflected = integrate_glass(&phase, wi, true, &mut rng);
        let eval_transmitted = integrate_glass(&phase, wi, false, &mut rng);
        assert!((reflected - eval_reflected).abs() < 0.02, "{reflected} vs {eval_reflected}");
        assert!(
            (transmitted - eval_transmitted).abs() < 0.03,
            "{transmitted} vs {eval_transmitted}"
        );
    }

    #[test]
    fn test_eval_nonnegative() {
        let mut rng = StdRng::seed_from_u64(13);
        let phase = white_glossy(0.6);
        let wi = Vec3::new(0.2, 0.1, 0.97).normalize();
        for _ in 0..200 {
            let wo = Vec3::new(rng.gen::<f32>() - 0.5, rng.gen::<f32>() - 0.5, rng.gen::<f32>()).normalize();
            let e = mf_eval(&phase, wi, wo, true, &mut rng);
            assert!(e.min_element() >= 0.0 && e.is_finite());
        }
    }
}
