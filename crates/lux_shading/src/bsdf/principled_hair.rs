//! Near-field principled hair (Chiang et al. 2016).
//!
//! The fiber is a dielectric cylinder with an absorbing interior. Scattering
//! is split into R, TT, TRT and a residual lobe, each a product of a
//! longitudinal term `Mp`, an azimuthal term `Np` and an attenuation `Ap`.
//! Cuticle tilt `alpha` shifts the longitudinal lobes.

use glam::{Vec2, Vec3, Vec4};
use lux_math::spectrum::{self, luminance, safe_divide_color};
use lux_math::{cos_from_sin, pow20, pow22, safe_asin, safe_divide, sqr, wrap_angle, Spectrum};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_1_PI, PI, TAU};

use super::fresnel::fresnel_dielectric_cos;
use super::{BsdfSample, Bxdf, ScatterContext};
use crate::label::{ClosureFlags, Label};

const SQRT_PI_8: f32 = 0.626_657_07;
const LN_2PI: f32 = 1.837_877_1;

/// Per-hit geometry: the fiber frame and where across the fiber the ray landed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PrincipledHairExtra {
    /// Fiber tangent
    pub x: Vec3,
    /// Perpendicular to the tangent and the view direction
    pub y: Vec3,
    /// Offset across the fiber in `[-1, 1]`, zero at the centre
    pub h: f32,
}

impl PrincipledHairExtra {
    /// Frame from the curve tangent `dpdu`, view direction `wi` and geometric normal `ng`.
    ///
    /// `None` when there is no tangent or the view runs along it.
    pub fn from_geometry(dpdu: Vec3, wi: Vec3, ng: Vec3) -> Option<Self> {
        let x = dpdu.try_normalize()?;
        let y = x.cross(wi).try_normalize()?;
        let z = x.cross(y).normalize_or_zero();
        let h = ng.cross(x).dot(z).clamp(-1.0, 1.0);
        Some(Self { x, y, h })
    }

    fn z(&self) -> Vec3 {
        self.x.cross(self.y).normalize_or_zero()
    }
}

/// How the interior absorption coefficient is specified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HairParameterization {
    Absorption(Spectrum),
    /// Target color after multiple scattering
    Reflectance(Spectrum),
    Melanin { melanin: f32, redness: f32, tint: Spectrum },
}

impl HairParameterization {
    /// Absorption coefficient for an azimuthal roughness in `[0, 1]`.
    pub fn sigma(&self, azimuthal_roughness: f32) -> Spectrum {
        match *self {
            Self::Absorption(sigma) => spectrum::max_zero(sigma),
            Self::Reflectance(color) => sigma_from_reflectance(color, azimuthal_roughness),
            Self::Melanin {
                melanin,
                redness,
                tint,
            } => {
                let qty = -(1.0 - melanin).max(0.0001).ln();
                let redness = redness.clamp(0.0, 1.0);
                sigma_from_concentration(qty * (1.0 - redness), qty * redness)
                    + sigma_from_reflectance(tint, azimuthal_roughness)
            }
        }
    }
}

/// Cubic fit mapping azimuthal roughness to the scale between absorption and albedo.
fn roughness_scale(x: f32) -> f32 {
    ((((0.245 * x + 5.574) * x - 10.73) * x + 2.532) * x - 0.215) * x + 5.969
}

pub fn sigma_from_concentration(eumelanin: f32, pheomelanin: f32) -> Spectrum {
    Spectrum::new(0.506, 0.841, 1.653) * eumelanin + Spectrum::new(0.343, 0.733, 1.924) * pheomelanin
}

pub fn sigma_from_reflectance(color: Spectrum, azimuthal_roughness: f32) -> Spectrum {
    let color = color.max(Spectrum::splat(1e-5));
    let sigma = spectrum::ln(color) / roughness_scale(azimuthal_roughness);
    sigma * sigma
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipledHairBsdf {
    /// Absorption coefficient of the interior
    pub sigma: Spectrum,
    /// Longitudinal roughness, remapped to a variance by `setup`
    pub v: f32,
    /// Azimuthal roughness, remapped to a logistic scale by `setup`
    pub s: f32,
    /// Cuticle tilt in radians
    pub alpha: f32,
    pub eta: f32,
    /// Primary reflection roughness multiplier, becomes the R variance
    pub m0_roughness: f32,
}

impl PrincipledHairBsdf {
    pub fn new(sigma: Spectrum, v: f32, s: f32, alpha: f32, eta: f32, m0_roughness: f32) -> Self {
        Self {
            sigma,
            v,
            s,
            alpha,
            eta,
            m0_roughness,
        }
    }

    pub fn setup(&mut self) -> ClosureFlags {
        let v = self.v.clamp(0.001, 1.0);
        let s = self.s.clamp(0.001, 1.0);
        let m0 = (self.m0_roughness * v).clamp(0.001, 1.0);

        self.v = sqr(0.726 * v + 0.812 * sqr(v) + 3.7 * pow20(v));
        self.s = (0.265 * s + 1.194 * sqr(s) + 5.372 * pow22(s)) * SQRT_PI_8;
        self.m0_roughness = sqr(0.726 * m0 + 0.812 * sqr(m0) + 3.7 * pow20(m0));
        self.eta = self.eta.max(1e-5);

        ClosureFlags::BSDF
            | ClosureFlags::HAS_EVAL
            | ClosureFlags::NEEDS_RANDOM
            | ClosureFlags::HAS_TRANSMISSION
    }

    /// Longitudinal variance of lobe `p`.
    fn lobe_variance(&self, p: usize) -> f32 {
        match p {
            0 => self.m0_roughness,
            1 => 0.25 * self.v,
            _ => 4.0 * self.v,
        }
    }
}

fn bessel_i0(x: f32) -> f32 {
    let x = x * x;
    let mut val = 1.0 + 0.25 * x;
    let mut pow_x_2i = x * x;
    let mut i_fac_2: f32 = 1.0;
    let mut pow_4_i: f32 = 16.0;
    for i in 2..10 {
        i_fac_2 *= (i * i) as f32;
        let next = val + pow_x_2i / (pow_4_i * i_fac_2);
        if next == val {
            return val;
        }
        val = next;
        pow_x_2i *= x;
        pow_4_i *= 4.0;
    }
    val
}

fn log_bessel_i0(x: f32) -> f32 {
    if x > 12.0 {
        x + 0.5 * (1.0 / (8.0 * x) - LN_2PI - x.ln())
    } else {
        bessel_i0(x).ln()
    }
}

fn logistic(x: f32, s: f32) -> f32 {
    let v = (-x.abs() / s).exp();
    v / (s * sqr(1.0 + v))
}

fn logistic_cdf(x: f32, s: f32) -> f32 {
    let arg = -x / s;
    if arg > 100.0 {
        return 0.0;
    }
    1.0 / (1.0 + arg.exp())
}

/// Logistic restricted to `[-pi, pi]` and renormalized.
fn trimmed_logistic(x: f32, s: f32) -> f32 {
    logistic(x, s) / (logistic_cdf(PI, s) - logistic_cdf(-PI, s))
}

fn sample_trimmed_logistic(u: f32, s: f32) -> f32 {
    let cdf_minus_pi = logistic_cdf(-PI, s);
    let x = -s * (1.0 / (u * (1.0 - 2.0 * cdf_minus_pi) + cdf_minus_pi) - 1.0).ln();
    x.clamp(-PI, PI)
}

/// Azimuthal offset of lobe `p` for entry offset `gamma_o` and refracted `gamma_t`.
fn delta_phi(p: usize, gamma_o: f32, gamma_t: f32) -> f32 {
    let p = p as f32;
    2.0 * p * gamma_t - 2.0 * gamma_o + p * PI
}

fn azimuthal_scattering(phi: f32, p: usize, s: f32, gamma_o: f32, gamma_t: f32) -> f32 {
    let phi_o = wrap_angle(phi - delta_phi(p, gamma_o, gamma_t));
    trimmed_logistic(phi_o, s)
}

fn longitudinal_scattering(
    sin_theta_i: f32,
    cos_theta_i: f32,
    sin_theta_o: f32,
    cos_theta_o: f32,
    v: f32,
) -> f32 {
    let inv_v = 1.0 / v;
    let cos_arg = cos_theta_i * cos_theta_o * inv_v;
    let sin_arg = sin_theta_i * sin_theta_o * inv_v;
    if v <= 0.1 {
        let i0 = log_bessel_i0(cos_arg);
        (i0 - sin_arg - inv_v + std::f32::consts::LN_2 + (0.5 * inv_v).ln()).exp()
    } else {
        let i0 = bessel_i0(cos_arg);
        ((-sin_arg).exp() * i0) / (inv_v.sinh() * 2.0 * v)
    }
}

/// Color with its luminance in `w`, the sampling weight of the lobe.
fn with_energy(c: Spectrum) -> Vec4 {
    c.extend(luminance(c))
}

/// Attenuation of the four lobes for Fresnel reflectance `f` and interior transmittance `t`.
fn hair_attenuation(f: f32, t: Spectrum) -> [Vec4; 4] {
    let mut ap = [Vec4::ZERO; 4];
    ap[0] = Vec4::splat(f);

    let mut col = t * sqr(1.0 - f);
    ap[1] = with_energy(col);

    col *= t * f;
    ap[2] = with_energy(col);

    col *= safe_divide_color(t * f, Spectrum::ONE - t * f);
    ap[3] = with_energy(col);

    let total: f32 = ap.iter().map(|a| a.w).sum();
    let fac = safe_divide(1.0, total);
    for a in &mut ap {
        a.w *= fac;
    }
    ap
}

/// `(sin, |cos|)` of `theta_i` rotated by the tilt for the R, TT and TRT lobes.
fn hair_alpha_angles(sin_theta_i: f32, cos_theta_i: f32, alpha: f32) -> [f32; 6] {
    let sin_1 = alpha.sin();
    let cos_1 = cos_from_sin(sin_1);
    let sin_2 = 2.0 * sin_1 * cos_1;
    let cos_2 = sqr(cos_1) - sqr(sin_1);
    let sin_4 = 2.0 * sin_2 * cos_2;
    let cos_4 = sqr(cos_2) - sqr(sin_2);

    [
        sin_theta_i * cos_2 + cos_theta_i * sin_2,
        (cos_theta_i * cos_2 - sin_theta_i * sin_2).abs(),
        sin_theta_i * cos_1 - cos_theta_i * sin_1,
        (cos_theta_i * cos_1 + sin_theta_i * sin_1).abs(),
        sin_theta_i * cos_4 - cos_theta_i * sin_4,
        (cos_theta_i * cos_4 + sin_theta_i * sin_4).abs(),
    ]
}

/// Fiber-space view of one shading query.
struct FiberGeometry {
    x: Vec3,
    y: Vec3,
    z: Vec3,
    sin_theta_o: f32,
    cos_theta_o: f32,
    phi_o: f32,
    gamma_o: f32,
    gamma_t: f32,
    ap: [Vec4; 4],
}

impl FiberGeometry {
    fn new(bsdf: &PrincipledHairBsdf, extra: &PrincipledHairExtra, wi: Vec3) -> Self {
        let (x, y, z) = (extra.x, extra.y, extra.z());
        let local = Vec3::new(wi.dot(x), wi.dot(y), wi.dot(z));
        let h = extra.h;

        let sin_theta_o = local.x;
        let cos_theta_o = cos_from_sin(sin_theta_o);
        let phi_o = local.z.atan2(local.y);

        let sin_theta_t = sin_theta_o / bsdf.eta;
        let cos_theta_t = cos_from_sin(sin_theta_t);
        let sin_gamma_t = h * cos_theta_o / (sqr(bsdf.eta) - sqr(sin_theta_o)).max(1e-7).sqrt();
        let cos_gamma_t = cos_from_sin(sin_gamma_t);
        let gamma_t = safe_asin(sin_gamma_t);

        let transmittance = spectrum::exp(-bsdf.sigma * (2.0 * cos_gamma_t / cos_theta_t.max(1e-5)));
        let f = fresnel_dielectric_cos(cos_theta_o * cos_from_sin(h), bsdf.eta);

        Self {
            x,
            y,
            z,
            sin_theta_o,
            cos_theta_o,
            phi_o,
            gamma_o: safe_asin(h),
            gamma_t,
            ap: hair_attenuation(f, transmittance),
        }
    }

    /// Sum of the four lobes toward local elevation `sin_theta_i` and azimuth `phi_i`.
    /// The `w` component is the pdf.
    fn evaluate(&self, bsdf: &PrincipledHairBsdf, sin_theta_i: f32, cos_theta_i: f32, phi_i: f32) -> Vec4 {
        let phi = phi_i - self.phi_o;
        let angles = hair_alpha_angles(sin_theta_i, cos_theta_i, bsdf.alpha);

        let mut f = Vec4::ZERO;
        for p in 0..3 {
            let mp = longitudinal_scattering(
                angles[2 * p],
                angles[2 * p + 1],
                self.sin_theta_o,
                self.cos_theta_o,
                bsdf.lobe_variance(p),
            );
            let np = azimuthal_scattering(phi, p, bsdf.s, self.gamma_o, self.gamma_t);
            f += self.ap[p] * (mp * np);
        }

        let mp = longitudinal_scattering(
            sin_theta_i,
            cos_theta_i,
            self.sin_theta_o,
            self.cos_theta_o,
            bsdf.lobe_variance(3),
        );
        f += self.ap[3] * (mp * 0.5 * FRAC_1_PI);
        f
    }
}

impl Bxdf for PrincipledHairBsdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, _rng: &mut dyn RngCore) -> (Spectrum, f32) {
        let Some(extra) = ctx.extra.and_then(|e| e.as_principled_hair()) else {
            return (Spectrum::ZERO, 0.0);
        };
        let geom = FiberGeometry::new(self, extra, ctx.wi);

        let local = Vec3::new(wo.dot(geom.x), wo.dot(geom.y), wo.dot(geom.z));
        let sin_theta_i = local.x;
        let cos_theta_i = cos_from_sin(sin_theta_i);
        let phi_i = local.z.atan2(local.y);

        let f = geom.evaluate(self, sin_theta_i, cos_theta_i, phi_i);
        (f.truncate(), f.w)
    }

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        rng: &mut dyn RngCore,
    ) -> Option<BsdfSample> {
        let extra = ctx.extra.and_then(|e| e.as_principled_hair())?;
        let geom = FiberGeometry::new(self, extra, ctx.wi);

        // Pick a lobe by its energy.
        let mut u0 = u.x;
        let mut p = 0;
        while p < 3 {
            if u0 < geom.ap[p].w {
                break;
            }
            u0 -= geom.ap[p].w;
            p += 1;
        }

        let v = self.lobe_variance(p);
        let u1 = Vec2::new(rng.gen::<f32>().max(1e-5), rng.gen());
        let fac = 1.0 + v * (u1.x + (1.0 - u1.x) * (-2.0 / v).exp()).ln();
        let mut sin_theta_i =
            -fac * geom.sin_theta_o + cos_from_sin(fac) * (TAU * u1.y).cos() * geom.cos_theta_o;
        let mut cos_theta_i = cos_from_sin(sin_theta_i);

        if p < 3 {
            let angles = hair_alpha_angles(sin_theta_i, cos_theta_i, -self.alpha);
            sin_theta_i = angles[2 * p];
            cos_theta_i = angles[2 * p + 1];
        }

        let phi = if p < 3 {
            delta_phi(p, geom.gamma_o, geom.gamma_t) + sample_trimmed_logistic(u.y, self.s)
        } else {
            TAU * u.y
        };
        let phi_i = geom.phi_o + phi;

        let f = geom.evaluate(self, sin_theta_i, cos_theta_i, phi_i);
        let wo = geom.x * sin_theta_i
            + geom.y * (cos_theta_i * phi_i.cos())
            + geom.z * (cos_theta_i * phi_i.sin());

        let label = if p == 0 {
            Label::REFLECT | Label::GLOSSY
        } else {
            Label::TRANSMIT | Label::GLOSSY
        };
        Some(BsdfSample::new(wo, f.truncate(), f.w, label))
    }

    fn blur(&mut self, roughness: f32) {
        self.v = self.v.max(roughness);
        self.s = self.s.max(roughness);
        self.m0_roughness = self.m0_roughness.max(roughness);
    }

    /// Approximate multiple-scattering color of the fiber.
    fn albedo(&self, _ctx: &ScatterContext<'_>) -> Spectrum {
        spectrum::exp(-spectrum::sqrt(self.sigma) * roughness_scale(self.v))
    }

    fn roughness_eta(&self) -> (Vec2, f32) {
        (Vec2::new(self.v, self.s), self.eta)
    }
}
