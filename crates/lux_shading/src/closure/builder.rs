//! Closure construction.
//!
//! Each `add_*` function allocates a record in the shading point's arena,
//! attaches any extra data, runs the model's setup and merges the
//! resulting capability flags into the shading point. A `None` return means
//! nothing was added: the weight was negligible or the arena is full.

use glam::Vec3;
use lux_math::{spectrum, Spectrum};

use super::{ClosureData, ClosureHandle, ClosureType, ExtraData, CLOSURE_WEIGHT_CUTOFF};
use crate::bsdf::diffuse::DiffuseBsdf;
use crate::bsdf::fresnel::{microfacet_fresnel_color, ConductorFresnel, MicrofacetExtra};
use crate::bsdf::hair::HairBsdf;
use crate::bsdf::microfacet::MicrofacetBsdf;
use crate::bsdf::oren_nayar::OrenNayarBsdf;
use crate::bsdf::principled_diffuse::{PrincipledDiffuseBsdf, PrincipledDiffuseComponents};
use crate::bsdf::principled_hair::{PrincipledHairBsdf, PrincipledHairExtra};
use crate::bsdf::principled_sheen::PrincipledSheenBsdf;
use crate::bsdf::ramp::{ColorRamp, DiffuseRampBsdf, PhongRampBsdf};
use crate::bsdf::toon::ToonBsdf;
use crate::bsdf::transparent::TransparentBsdf;
use crate::bsdf::velvet::VelvetBsdf;
use crate::bsdf::ScatterContext;
use crate::label::ClosureFlags;
use crate::shading_point::{ShaderFlags, ShadingPoint};

/// Allocate, attach `extra`, store `data` and merge `flags`.
fn push(
    sd: &mut ShadingPoint,
    ty: ClosureType,
    n: Vec3,
    weight: Spectrum,
    data: ClosureData,
    extra: Option<ExtraData>,
    flags: ClosureFlags,
) -> Option<ClosureHandle> {
    debug_assert!(data.matches_type(ty), "payload does not match {ty}");
    let handle = sd.arena.alloc_bsdf(ty, n, weight)?;
    if let Some(extra) = extra {
        sd.arena.attach_extra(handle, extra)?;
    }
    let record = sd.arena.closure_mut(handle)?;
    record.data = data;
    sd.flags |= ShaderFlags::from(flags);
    Some(handle)
}

fn scale_sample_weight(sd: &mut ShadingPoint, handle: ClosureHandle, factor: f32) {
    if let Some(record) = sd.arena.closure_mut(handle) {
        record.sample_weight *= factor.max(0.0);
    }
}

pub fn add_diffuse(sd: &mut ShadingPoint, n: Vec3, weight: Spectrum) -> Option<ClosureHandle> {
    let mut bsdf = DiffuseBsdf;
    let flags = bsdf.setup();
    push(sd, ClosureType::DiffuseBsdf, n, weight, ClosureData::Diffuse(bsdf), None, flags)
}

pub fn add_translucent(sd: &mut ShadingPoint, n: Vec3, weight: Spectrum) -> Option<ClosureHandle> {
    let mut bsdf = DiffuseBsdf;
    let flags = bsdf.setup_translucent();
    push(sd, ClosureType::TranslucentBsdf, n, weight, ClosureData::Diffuse(bsdf), None, flags)
}

pub fn add_oren_nayar(
    sd: &mut ShadingPoint,
    n: Vec3,
    weight: Spectrum,
    roughness: f32,
) -> Option<ClosureHandle> {
    let mut bsdf = OrenNayarBsdf::new(roughness);
    let flags = bsdf.setup();
    push(sd, ClosureType::OrenNayarBsdf, n, weight, ClosureData::OrenNayar(bsdf), None, flags)
}

/// Diffuse or glossy toon lobe, chosen by `ty`.
pub fn add_toon(
    sd: &mut ShadingPoint,
    ty: ClosureType,
    n: Vec3,
    weight: Spectrum,
    size: f32,
    smooth: f32,
) -> Option<ClosureHandle> {
    debug_assert!(matches!(ty, ClosureType::DiffuseToonBsdf | ClosureType::GlossyToonBsdf));
    let mut bsdf = ToonBsdf::new(size, smooth);
    let flags = bsdf.setup();
    push(sd, ty, n, weight, ClosureData::Toon(bsdf), None, flags)
}

pub fn add_velvet(sd: &mut ShadingPoint, n: Vec3, weight: Spectrum, sigma: f32) -> Option<ClosureHandle> {
    let mut bsdf = VelvetBsdf::new(sigma);
    let flags = bsdf.setup();
    push(sd, ClosureType::AshikhminVelvetBsdf, n, weight, ClosureData::Velvet(bsdf), None, flags)
}

/// Microfacet closure that needs no extra data.
///
/// Covers the sharp variants, single-scatter GGX and Beckmann in their
/// reflection, refraction and glass forms, and the untinted multi-scatter
/// types. Fresnel-carrying types go through [`add_microfacet_fresnel`] and
/// conductors through [`add_microfacet_conductor`].
pub fn add_microfacet(
    sd: &mut ShadingPoint,
    ty: ClosureType,
    n: Vec3,
    weight: Spectrum,
    mut bsdf: MicrofacetBsdf,
) -> Option<ClosureHandle> {
    use ClosureType as T;

    let flags = match ty {
        T::ReflectionBsdf => bsdf.setup_sharp_reflection(),
        T::RefractionBsdf => bsdf.setup_sharp_refraction(),
        T::SharpGlassBsdf => bsdf.setup_sharp_glass(),
        T::MicrofacetGgxBsdf | T::MicrofacetBeckmannBsdf => bsdf.setup(),
        T::MicrofacetGgxRefractionBsdf | T::MicrofacetBeckmannRefractionBsdf => {
            bsdf.setup_refraction()
        }
        T::MicrofacetGgxGlassBsdf | T::MicrofacetBeckmannGlassBsdf => bsdf.setup_glass(),
        T::MicrofacetMultiGgxBsdf => bsdf.setup_multi(),
        T::MicrofacetMultiGgxGlassBsdf => bsdf.setup_multi_glass(),
        _ => {
            log::warn!("add_microfacet called with {ty}");
            return None;
        }
    };
    push(sd, ty, n, weight, ClosureData::Microfacet(bsdf), None, flags)
}

/// Microfacet closure tinted by extra colors.
///
/// The principled and clearcoat Fresnel types scale their sample weight by
/// the average Fresnel color seen from the viewer, so dim coatings are
/// picked less often.
pub fn add_microfacet_fresnel(
    sd: &mut ShadingPoint,
    ty: ClosureType,
    n: Vec3,
    weight: Spectrum,
    mut bsdf: MicrofacetBsdf,
    extra: MicrofacetExtra,
) -> Option<ClosureHandle> {
    use ClosureType as T;

    let flags = match ty {
        T::MicrofacetGgxFresnelBsdf | T::MicrofacetGgxClearcoatBsdf => bsdf.setup(),
        T::MicrofacetMultiGgxBsdf | T::MicrofacetMultiGgxFresnelBsdf => bsdf.setup_multi(),
        T::MicrofacetMultiGgxGlassBsdf | T::MicrofacetMultiGgxGlassFresnelBsdf => {
            bsdf.setup_multi_glass()
        }
        _ => {
            log::warn!("add_microfacet_fresnel called with {ty}");
            return None;
        }
    };

    let extra = ExtraData::Microfacet(extra);
    let fresnel = if ty.has_fresnel() {
        let ctx = ScatterContext::new(ty, n, sd.ng, sd.wi).with_extra(Some(&extra));
        Some(spectrum::average(microfacet_fresnel_color(&ctx, bsdf.ior)))
    } else {
        None
    };

    let handle = push(sd, ty, n, weight, ClosureData::Microfacet(bsdf), Some(extra), flags)?;
    if let Some(f) = fresnel {
        scale_sample_weight(sd, handle, f);
    }
    Some(handle)
}

/// Rough metal with a complex index of refraction.
pub fn add_microfacet_conductor(
    sd: &mut ShadingPoint,
    n: Vec3,
    weight: Spectrum,
    mut bsdf: MicrofacetBsdf,
    fresnel: ConductorFresnel,
) -> Option<ClosureHandle> {
    let ty = ClosureType::MicrofacetGgxConductorBsdf;
    let flags = bsdf.setup();
    let extra = ExtraData::Conductor(fresnel);
    let f = spectrum::average(fresnel.evaluate(sd.wi.dot(n)));
    let handle = push(sd, ty, n, weight, ClosureData::Microfacet(bsdf), Some(extra), flags)?;
    scale_sample_weight(sd, handle, f);
    Some(handle)
}

/// Kajiya-style hair; `ty` picks the reflection or transmission lobe.
pub fn add_hair(
    sd: &mut ShadingPoint,
    ty: ClosureType,
    n: Vec3,
    weight: Spectrum,
    mut bsdf: HairBsdf,
) -> Option<ClosureHandle> {
    let flags = match ty {
        ClosureType::HairReflectionBsdf => bsdf.setup_reflection(),
        ClosureType::HairTransmissionBsdf => bsdf.setup_transmission(),
        _ => {
            log::warn!("add_hair called with {ty}");
            return None;
        }
    };
    push(sd, ty, n, weight, ClosureData::Hair(bsdf), None, flags)
}

/// Principled hair. The fiber frame is taken from the shading point's tangent.
pub fn add_principled_hair(
    sd: &mut ShadingPoint,
    n: Vec3,
    weight: Spectrum,
    mut bsdf: PrincipledHairBsdf,
) -> Option<ClosureHandle> {
    let Some(frame) = PrincipledHairExtra::from_geometry(sd.dpdu, sd.wi, sd.ng) else {
        log::warn!("principled hair needs a curve tangent not parallel to the view, dpdu = {}", sd.dpdu);
        return None;
    };
    let flags = bsdf.setup();
    let extra = ExtraData::PrincipledHair(frame);
    push(
        sd,
        ClosureType::HairPrincipledBsdf,
        n,
        weight,
        ClosureData::PrincipledHair(bsdf),
        Some(extra),
        flags,
    )
}

pub fn add_principled_diffuse(
    sd: &mut ShadingPoint,
    n: Vec3,
    weight: Spectrum,
    roughness: f32,
    components: PrincipledDiffuseComponents,
) -> Option<ClosureHandle> {
    let mut bsdf = PrincipledDiffuseBsdf::new(roughness, components);
    let flags = bsdf.setup();
    push(
        sd,
        ClosureType::PrincipledDiffuseBsdf,
        n,
        weight,
        ClosureData::PrincipledDiffuse(bsdf),
        None,
        flags,
    )
}

/// Principled sheen; the sample weight follows the view-dependent albedo estimate.
pub fn add_principled_sheen(sd: &mut ShadingPoint, n: Vec3, weight: Spectrum) -> Option<ClosureHandle> {
    let mut bsdf = PrincipledSheenBsdf::default();
    let flags = bsdf.setup(n, sd.wi);
    let handle = push(
        sd,
        ClosureType::PrincipledSheenBsdf,
        n,
        weight,
        ClosureData::PrincipledSheen(bsdf),
        None,
        flags,
    )?;
    scale_sample_weight(sd, handle, bsdf.avg_value);
    Some(handle)
}

pub fn add_diffuse_ramp(
    sd: &mut ShadingPoint,
    n: Vec3,
    weight: Spectrum,
    ramp: ColorRamp,
) -> Option<ClosureHandle> {
    let mut bsdf = DiffuseRampBsdf;
    let flags = bsdf.setup();
    push(
        sd,
        ClosureType::DiffuseRampBsdf,
        n,
        weight,
        ClosureData::DiffuseRamp(bsdf),
        Some(ExtraData::Ramp(ramp)),
        flags,
    )
}

pub fn add_phong_ramp(
    sd: &mut ShadingPoint,
    n: Vec3,
    weight: Spectrum,
    exponent: f32,
    ramp: ColorRamp,
) -> Option<ClosureHandle> {
    let mut bsdf = PhongRampBsdf::new(exponent);
    let flags = bsdf.setup();
    push(
        sd,
        ClosureType::PhongRampBsdf,
        n,
        weight,
        ClosureData::PhongRamp(bsdf),
        Some(ExtraData::Ramp(ramp)),
        flags,
    )
}

/// Pass-through transparency.
///
/// A shading point holds at most one transparent closure: later calls add
/// their weight to it. The accumulated weight is also tracked as the
/// transparent extinction of the surface.
pub fn add_transparent(sd: &mut ShadingPoint, weight: Spectrum) -> Option<ClosureHandle> {
    let sample_weight = spectrum::average(weight).abs();
    if !(sample_weight >= CLOSURE_WEIGHT_CUTOFF) || !sample_weight.is_finite() {
        return None;
    }

    if sd.flags.contains(ShaderFlags::TRANSPARENT) {
        sd.closure_transparent_extinction += weight;
        let existing = sd
            .arena
            .closures()
            .find(|(_, r)| r.ty == ClosureType::TransparentBsdf)
            .map(|(h, _)| h);
        if let Some(handle) = existing {
            if let Some(record) = sd.arena.closure_mut(handle) {
                record.weight += spectrum::max_zero(weight);
                record.sample_weight += sample_weight;
            }
        }
        return existing;
    }

    sd.closure_transparent_extinction = weight;
    let mut bsdf = TransparentBsdf;
    let flags = bsdf.setup();
    let n = sd.n;
    let handle = push(
        sd,
        ClosureType::TransparentBsdf,
        n,
        weight,
        ClosureData::Transparent(bsdf),
        None,
        flags,
    );
    // Transparency still applies to shadow rays when the arena is full.
    sd.flags |= ShaderFlags::BSDF | ShaderFlags::TRANSPARENT;
    handle
}

pub fn add_emission(sd: &mut ShadingPoint, weight: Spectrum) {
    sd.closure_emission += weight;
    sd.flags |= ShaderFlags::EMISSION;
}

pub fn add_background(sd: &mut ShadingPoint, weight: Spectrum) {
    sd.closure_background += weight;
}

pub fn add_holdout(sd: &mut ShadingPoint, weight: Spectrum) {
    sd.closure_holdout += weight;
    sd.flags |= ShaderFlags::HOLDOUT;
}

pub fn add_ambient_occlusion(sd: &mut ShadingPoint, weight: Spectrum) {
    sd.ao_alpha += weight;
    sd.flags |= ShaderFlags::AO;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(capacity: usize) -> ShadingPoint {
        ShadingPoint::new(Vec3::Z, Vec3::Z, Vec3::new(0.3, 0.0, 0.95).normalize(), capacity)
    }

    #[test]
    fn test_flags_merged() {
        let mut sd = point(8);
        add_diffuse(&mut sd, Vec3::Z, Spectrum::ONE).unwrap();
        assert_eq!(sd.flags, ShaderFlags::BSDF | ShaderFlags::BSDF_HAS_EVAL);

        add_microfacet(
            &mut sd,
            ClosureType::MicrofacetGgxGlassBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.3, 1.5),
        )
        .unwrap();
        assert!(sd.flags.contains(ShaderFlags::BSDF_NEEDS_RANDOM | ShaderFlags::BSDF_HAS_TRANSMISSION));
    }

    #[test]
    fn test_negligible_weight_adds_nothing() {
        let mut sd = point(4);
        assert!(add_diffuse(&mut sd, Vec3::Z, Spectrum::splat(1e-8)).is_none());
        assert!(sd.arena.is_empty());
        assert!(sd.flags.is_empty());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut sd = point(4);
        let bsdf = MicrofacetBsdf::isotropic(0.3, 1.5);
        assert!(add_microfacet(&mut sd, ClosureType::DiffuseBsdf, Vec3::Z, Spectrum::ONE, bsdf).is_none());
        assert!(sd.arena.is_empty());
    }

    #[test]
    fn test_fresnel_scales_sample_weight() {
        let mut sd = point(4);
        let extra = MicrofacetExtra {
            color: Spectrum::ONE,
            cspec0: Spectrum::splat(0.04),
            clearcoat: 0.0,
        };
        let h = add_microfacet_fresnel(
            &mut sd,
            ClosureType::MicrofacetGgxFresnelBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.2, 1.5),
            extra,
        )
        .unwrap();
        let record = sd.arena.closure(h).unwrap();
        assert!(record.sample_weight < 0.2);
        assert!(record.extra.is_some());
        assert_eq!(record.weight, Spectrum::ONE);
    }

    #[test]
    fn test_sheen_sample_weight_uses_albedo() {
        let mut sd = point(4);
        let h = add_principled_sheen(&mut sd, Vec3::Z, Spectrum::ONE).unwrap();
        let record = sd.arena.closure(h).unwrap();
        let ClosureData::PrincipledSheen(sheen) = record.data else {
            panic!("expected sheen payload");
        };
        assert!((record.sample_weight - sheen.avg_value).abs() < 1e-6);
    }

    #[test]
    fn test_ramp_extra_fills_arena() {
        let mut sd = point(2);
        // A ramp needs two extra slots on top of its record.
        assert!(add_diffuse_ramp(&mut sd, Vec3::Z, Spectrum::ONE, ColorRamp::default()).is_none());
        assert!(sd.arena.is_empty());
        assert!(sd.flags.is_empty());

        let mut sd = point(3);
        assert!(add_diffuse_ramp(&mut sd, Vec3::Z, Spectrum::ONE, ColorRamp::default()).is_some());
        assert_eq!(sd.arena.remaining(), 0);
    }

    #[test]
    fn test_transparent_merges() {
        let mut sd = point(4);
        let a = add_transparent(&mut sd, Spectrum::splat(0.25)).unwrap();
        let b = add_transparent(&mut sd, Spectrum::splat(0.5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(sd.arena.len(), 1);
        let record = sd.arena.closure(a).unwrap();
        assert!((record.weight - Spectrum::splat(0.75)).abs().max_element() < 1e-6);
        assert!((record.sample_weight - 0.75).abs() < 1e-6);
        assert!((sd.closure_transparent_extinction - Spectrum::splat(0.75)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_non_bsdf_closures_accumulate() {
        let mut sd = point(1);
        add_emission(&mut sd, Spectrum::splat(2.0));
        add_emission(&mut sd, Spectrum::splat(1.0));
        add_holdout(&mut sd, Spectrum::ONE);
        assert_eq!(sd.closure_emission, Spectrum::splat(3.0));
        assert!(sd.flags.contains(ShaderFlags::EMISSION | ShaderFlags::HOLDOUT));
        assert!(sd.arena.is_empty());
    }

    #[test]
    fn test_principled_hair_gets_geometry() {
        let mut sd = point(4).with_tangent(Vec3::X);
        let hair = PrincipledHairBsdf::new(Spectrum::splat(0.5), 0.3, 0.3, 0.03, 1.55, 1.0);
        let h = add_principled_hair(&mut sd, Vec3::Z, Spectrum::ONE, hair).unwrap();
        let record = sd.arena.closure(h).unwrap();
        let extra = record
            .extra
            .and_then(|e| sd.arena.extra(e))
            .and_then(ExtraData::as_principled_hair)
            .unwrap();
        assert_eq!(extra.x, Vec3::X);
    }

    #[test]
    fn test_principled_hair_needs_tangent() {
        let hair = PrincipledHairBsdf::new(Spectrum::splat(0.5), 0.3, 0.3, 0.03, 1.55, 1.0);
        let mut sd = point(4);
        assert!(add_principled_hair(&mut sd, Vec3::Z, Spectrum::ONE, hair).is_none());
        assert!(sd.arena.is_empty());
        assert!(sd.flags.is_empty());

        // Viewing straight along the fiber leaves no azimuthal frame either.
        let wi = sd.wi;
        let mut sd = point(4).with_tangent(wi);
        assert!(add_principled_hair(&mut sd, Vec3::Z, Spectrum::ONE, hair).is_none());
    }

    #[test]
    fn test_tinted_multiscatter_darkens_bounces() {
        use crate::config::KernelConfig;
        use crate::surface::sample_surface;
        use glam::Vec2;
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let config = KernelConfig::default();
        let mut rng = StdRng::seed_from_u64(17);
        let mut sd = point(4);
        let extra = MicrofacetExtra {
            color: Spectrum::new(1.0, 0.2, 0.2),
            cspec0: Spectrum::ONE,
            clearcoat: 0.0,
        };
        let h = add_microfacet_fresnel(
            &mut sd,
            ClosureType::MicrofacetMultiGgxBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.9, 1.5),
            extra,
        )
        .unwrap();
        // Untinted types keep their full sample weight.
        assert_eq!(sd.arena.closure(h).unwrap().sample_weight, 1.0);
        assert!(sd.arena.closure(h).unwrap().extra.is_some());

        let n = 5000;
        let mut sum = Spectrum::ZERO;
        for _ in 0..n {
            let u = Vec2::new(rng.gen(), rng.gen());
            if let Some(s) = sample_surface(&config, &sd, u, &mut rng) {
                sum += s.throughput();
            }
        }
        let mean = sum / n as f32;
        // Only bounces after the first pick up the tint.
        assert!(mean.y < mean.x - 0.05, "{mean}");
        assert!((mean.y - mean.z).abs() < 1e-4, "{mean}");
    }
}
