//! Principled surface: one artist-facing parameter set expanded into closures.
//!
//! Based on "Physically Based Shading at Disney" (2012) with the 2015
//! additions for clearcoat, sheen and transmission.

use glam::Vec3;
use lux_math::{sqr, Spectrum};
use serde::{Deserialize, Serialize};

use super::builder;
use super::ClosureType;
use crate::bsdf::fresnel::MicrofacetExtra;
use crate::bsdf::microfacet::MicrofacetBsdf;
use crate::bsdf::principled_diffuse::PrincipledDiffuseComponents;
use crate::shading_point::{ShaderFlags, ShadingPoint};

/// Microfacet model used by the specular and transmission lobes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipledDistribution {
    Ggx,
    /// Energy-preserving multiple-scattering GGX
    #[default]
    MultiGgx,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrincipledSurface {
    /// Base color (albedo for dielectrics, reflectance for metals)
    pub base_color: Spectrum,
    /// 0 = dielectric, 1 = metal
    pub metallic: f32,
    pub roughness: f32,
    /// Fresnel reflectance at normal incidence, scaled so 0.5 is 4%
    pub specular: f32,
    /// Tints the specular towards base_color
    pub specular_tint: f32,
    pub anisotropic: f32,
    /// Grazing component for cloth
    pub sheen: f32,
    pub sheen_tint: f32,
    /// Second specular lobe for lacquered surfaces
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub transmission: f32,
    pub ior: f32,
    /// Coverage; the rest is pass-through transparency
    pub alpha: f32,
    pub emission: Spectrum,
    pub distribution: PrincipledDistribution,
}

impl Default for PrincipledSurface {
    fn default() -> Self {
        Self {
            base_color: Spectrum::splat(0.8),
            metallic: 0.0,
            roughness: 0.5,
            specular: 0.5,
            specular_tint: 0.0,
            anisotropic: 0.0,
            sheen: 0.0,
            sheen_tint: 0.5,
            clearcoat: 0.0,
            clearcoat_roughness: 0.03,
            transmission: 0.0,
            ior: 1.45,
            alpha: 1.0,
            emission: Spectrum::ZERO,
            distribution: PrincipledDistribution::MultiGgx,
        }
    }
}

impl PrincipledSurface {
    pub fn diffuse(color: Spectrum) -> Self {
        Self {
            base_color: color,
            roughness: 1.0,
            specular: 0.0,
            ..Default::default()
        }
    }

    pub fn metal(color: Spectrum, roughness: f32) -> Self {
        Self {
            base_color: color,
            metallic: 1.0,
            roughness,
            ..Default::default()
        }
    }

    pub fn glass(color: Spectrum, roughness: f32, ior: f32) -> Self {
        Self {
            base_color: color,
            roughness,
            transmission: 1.0,
            ior,
            ..Default::default()
        }
    }

    /// Add the closures for this surface to `sd`, with every weight scaled by `weight`.
    ///
    /// Returns the number of closures allocated.
    pub fn build(&self, sd: &mut ShadingPoint, n: Vec3, tangent: Vec3, weight: Spectrum) -> usize {
        let before = sd.arena.len();
        let base_color = self.base_color.max(Spectrum::ZERO);
        let metallic = self.metallic.clamp(0.0, 1.0);
        let transmission = self.transmission.clamp(0.0, 1.0);
        let alpha = self.alpha.clamp(0.0, 1.0);
        let roughness = self.roughness.clamp(0.0, 1.0);

        if alpha < 1.0 {
            builder::add_transparent(sd, weight * (1.0 - alpha));
        }
        let weight = weight * alpha;

        if self.emission != Spectrum::ZERO {
            builder::add_emission(sd, self.emission * weight);
        }

        let diffuse_weight = (1.0 - metallic) * (1.0 - transmission);
        let final_transmission = (1.0 - metallic) * transmission;
        let specular_weight = 1.0 - final_transmission;

        if diffuse_weight > 0.0 {
            builder::add_principled_diffuse(
                sd,
                n,
                weight * base_color * diffuse_weight,
                roughness,
                PrincipledDiffuseComponents::FULL,
            );
        }

        let tint = tint_color(base_color);
        if diffuse_weight > 0.0 && self.sheen > 0.0 {
            let sheen_color = Spectrum::ONE.lerp(tint, self.sheen_tint);
            builder::add_principled_sheen(sd, n, weight * sheen_color * (self.sheen * diffuse_weight));
        }

        if specular_weight > 0.0 {
            let aspect = (1.0 - self.anisotropic.clamp(0.0, 1.0) * 0.9).sqrt();
            let r2 = sqr(roughness);
            let bsdf = MicrofacetBsdf::new(
                (r2 / aspect).max(0.001),
                (r2 * aspect).max(0.001),
                (2.0 / (1.0 - (0.08 * self.specular).max(0.0).sqrt())) - 1.0,
            )
            .with_tangent(tangent);
            let tmp = Spectrum::ONE.lerp(tint, self.specular_tint) * (self.specular * 0.08);
            let extra = MicrofacetExtra {
                color: base_color,
                cspec0: tmp.lerp(base_color, metallic),
                clearcoat: 0.0,
            };
            let ty = match self.distribution {
                PrincipledDistribution::Ggx => ClosureType::MicrofacetGgxFresnelBsdf,
                PrincipledDistribution::MultiGgx => ClosureType::MicrofacetMultiGgxFresnelBsdf,
            };
            builder::add_microfacet_fresnel(sd, ty, n, weight * specular_weight, bsdf, extra);
        }

        if final_transmission > 0.0 {
            let ior = self.ior.max(1e-5);
            let eta = if sd.flags.contains(ShaderFlags::BACKFACING) {
                1.0 / ior
            } else {
                ior
            };
            let bsdf = MicrofacetBsdf::isotropic(sqr(roughness), eta);
            let glass_weight = weight * base_color * final_transmission;
            match self.distribution {
                PrincipledDistribution::Ggx => {
                    builder::add_microfacet(sd, ClosureType::MicrofacetGgxGlassBsdf, n, glass_weight, bsdf);
                }
                PrincipledDistribution::MultiGgx => {
                    let extra = MicrofacetExtra {
                        color: base_color,
                        cspec0: base_color,
                        clearcoat: 0.0,
                    };
                    builder::add_microfacet_fresnel(
                        sd,
                        ClosureType::MicrofacetMultiGgxGlassFresnelBsdf,
                        n,
                        weight * final_transmission,
                        bsdf,
                        extra,
                    );
                }
            }
        }

        if self.clearcoat > 0.0 {
            let a = sqr(self.clearcoat_roughness.clamp(0.0, 1.0));
            let extra = MicrofacetExtra {
                color: Spectrum::ZERO,
                cspec0: Spectrum::splat(0.04),
                clearcoat: self.clearcoat,
            };
            builder::add_microfacet_fresnel(
                sd,
                ClosureType::MicrofacetGgxClearcoatBsdf,
                n,
                weight,
                MicrofacetBsdf::isotropic(a, 1.5),
                extra,
            );
        }

        sd.arena.len() - before
    }
}

/// Hue and saturation of `base_color` at unit luminance.
fn tint_color(base_color: Spectrum) -> Spectrum {
    let lum = lux_math::spectrum::luminance(base_color);
    if lum > 0.0 {
        base_color / lum
    } else {
        Spectrum::ONE
    }
}
