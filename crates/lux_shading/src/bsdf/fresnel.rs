//! Fresnel terms for dielectric and conducting interfaces.

use glam::Vec3;
use lux_math::{safe_divide, spectrum, Spectrum};

use super::ScatterContext;
use crate::closure::ClosureType;

/// Colors kept in extra data by the principled and multi-scatter microfacet closures.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MicrofacetExtra {
    /// Tint applied at every bounce of the multi-scatter walk.
    pub color: Spectrum,
    /// Reflectance at normal incidence.
    pub cspec0: Spectrum,
    pub clearcoat: f32,
}

/// Complex index of refraction of a metal, relative to the outside medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConductorFresnel {
    pub eta: Spectrum,
    pub k: Spectrum,
}

impl ConductorFresnel {
    /// Reflectance for incidence cosine `cos_theta_i`.
    pub fn evaluate(&self, cos_theta_i: f32) -> Spectrum {
        fresnel_conductor(cos_theta_i, self.eta, self.k)
    }
}

/// Unpolarized dielectric reflectance without forming the refracted direction.
///
/// `eta` is the ratio of the inside to outside index. Returns 1 under total
/// internal reflection.
pub fn fresnel_dielectric_cos(cos_i: f32, eta: f32) -> f32 {
    let c = cos_i.abs();
    let g = eta * eta - 1.0 + c * c;
    if g > 0.0 {
        let g = g.sqrt();
        let a = (g - c) / (g + c);
        let b = (c * (g + c) - 1.0) / (c * (g - c) + 1.0);
        0.5 * a * a * (1.0 + b * b)
    } else {
        1.0
    }
}

/// Reflectance of a conductor for incidence cosine `cos_theta_i`.
pub fn fresnel_conductor(cos_theta_i: f32, eta: Spectrum, k: Spectrum) -> Spectrum {
    let cos_theta_i = cos_theta_i.abs().min(1.0);

    let cos2 = cos_theta_i * cos_theta_i;
    let sin2 = 1.0 - cos2;
    let eta2 = eta * eta;
    let k2 = k * k;

    let t0 = eta2 - k2 - Spectrum::splat(sin2);
    let a2_plus_b2 = spectrum::sqrt(t0 * t0 + eta2 * k2 * 4.0);
    let t1 = a2_plus_b2 + Spectrum::splat(cos2);
    let a = spectrum::sqrt((a2_plus_b2 + t0) * 0.5);
    let t2 = a * (2.0 * cos_theta_i);
    let rs = spectrum::safe_divide_color(t1 - t2, t1 + t2);

    let t3 = a2_plus_b2 * cos2 + Spectrum::splat(sin2 * sin2);
    let t4 = t2 * sin2;
    let rp = rs * spectrum::safe_divide_color(t3 - t4, t3 + t4);

    (rp + rs) * 0.5
}

/// Mirror `wi` about `n`.
#[inline]
pub fn reflect(wi: Vec3, n: Vec3) -> Vec3 {
    n * (2.0 * n.dot(wi)) - wi
}

/// Refract `wi` through a surface with normal `n` on the side of `wi`.
///
/// `eta` is the ratio of the outside to the inside index. Returns `None`
/// under total internal reflection.
pub fn refract(wi: Vec3, n: Vec3, eta: f32) -> Option<Vec3> {
    let cos_i = n.dot(wi);
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i).max(0.0);
    if sin2_t >= 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    Some(-wi * eta + n * (eta * cos_i - cos_t))
}

/// Dielectric Fresnel remapped so normal incidence gives `f0` instead of the physical value.
///
/// Keeps the shape of the real curve, which stays accurate for relative
/// indices close to one where Schlick does not.
pub fn interpolate_fresnel_color(l: Vec3, h: Vec3, ior: f32, f0: Spectrum) -> Spectrum {
    let real_f = fresnel_dielectric_cos(l.dot(h), ior);
    let real_f0 = fresnel_dielectric_cos(1.0, ior);
    let t = safe_divide(real_f - real_f0, 1.0 - real_f0).clamp(0.0, 1.0);
    f0.lerp(Spectrum::ONE, t)
}

/// Fresnel color of a microfacet closure for incident `l` and half vector `h`.
pub fn microfacet_fresnel(ctx: &ScatterContext<'_>, ior: f32, l: Vec3, h: Vec3) -> Spectrum {
    match ctx.ty {
        ClosureType::MicrofacetGgxConductorBsdf => ctx
            .extra
            .and_then(|e| e.as_conductor())
            .map_or(Spectrum::ONE, |c| c.evaluate(l.dot(h))),
        ClosureType::MicrofacetGgxClearcoatBsdf => ctx
            .extra
            .and_then(|e| e.as_microfacet())
            .map_or(Spectrum::ONE, |e| {
                interpolate_fresnel_color(l, h, ior, e.cspec0) * (0.25 * e.clearcoat)
            }),
        ty if ty.has_fresnel() => ctx
            .extra
            .and_then(|e| e.as_microfacet())
            .map_or(Spectrum::ONE, |e| interpolate_fresnel_color(l, h, ior, e.cspec0)),
        _ => Spectrum::ONE,
    }
}

/// Fresnel color seen from the viewing direction, used to scale sample weights and albedo.
pub fn microfacet_fresnel_color(ctx: &ScatterContext<'_>, ior: f32) -> Spectrum {
    microfacet_fresnel(ctx, ior, ctx.wi, ctx.n)
}
