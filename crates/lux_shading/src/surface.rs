//! Combining the closures of a shading point.
//!
//! One closure is picked in proportion to its sample weight and sampled;
//! every other closure is then evaluated toward the same direction so the
//! returned pdf is the density of the whole mixture (one-sample MIS with the
//! balance heuristic). [`eval_all`] does the same for a direction chosen
//! elsewhere, such as a light sample.

use glam::{Vec2, Vec3};
use lux_math::Spectrum;
use rand::{Rng, RngCore};

use crate::bsdf::{bsdf_blur, bsdf_eval, bsdf_sample};
use crate::closure::{ClosureHandle, ClosureRecord, ClosureType};
use crate::config::{FilterClosures, KernelConfig};
use crate::eval::BsdfEval;
use crate::label::{ExcludeFlags, Label};
use crate::shading_point::{ShaderFlags, ShadingPoint};
use crate::state::{PathFlags, PathState};

/// Fraction of the total sample weight every closure gets at least on the first bounce.
pub const DEFENSIVE_SAMPLING_FRACTION: f32 = 0.125;

/// Result of sampling the whole shading point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    /// Closure the direction was drawn from
    pub closure: ClosureHandle,
    pub wo: Vec3,
    /// Weighted evaluation of every closure toward `wo`
    pub eval: BsdfEval,
    /// Mixture pdf over all closures
    pub pdf: f32,
    pub label: Label,
    pub roughness: Vec2,
    pub eta: f32,
}

impl SurfaceSample {
    /// Path throughput factor for this bounce.
    #[inline]
    pub fn throughput(&self) -> Spectrum {
        self.eval.sum / self.pdf
    }
}

fn filtered_on_camera_ray(filter: FilterClosures, ty: ClosureType) -> bool {
    (ty.is_diffuse() && filter.contains(FilterClosures::DIFFUSE))
        || (ty.is_glossy() && filter.contains(FilterClosures::GLOSSY))
        || (ty.is_transmission()
            && ty != ClosureType::TransparentBsdf
            && filter.contains(FilterClosures::TRANSMISSION))
}

/// Glossy reflection or sharp refraction reached through a diffuse bounce.
fn is_caustic(config: &KernelConfig, ty: ClosureType) -> bool {
    if ty.is_diffuse() || ty == ClosureType::TransparentBsdf {
        return false;
    }
    if ty.is_transmission() {
        !config.caustics_refractive
    } else {
        ty.is_glossy() && !config.caustics_reflective
    }
}

/// Filter, rebalance and blur the closures before any sampling happens.
///
/// - Closure categories listed in `config.filter_closures` are removed on
///   camera rays; filtered transparency turns into holdout.
/// - With caustics disabled, glossy or refractive closures are removed
///   from paths that already had a diffuse bounce.
/// - On the first bounce each sample weight is floored at an eighth of the
///   total, so faint closures still get sampled.
/// - Filter-glossy blurs closures once the path has become unlikely.
pub fn prepare_closures(config: &KernelConfig, state: &PathState, sd: &mut ShadingPoint) {
    let filter = config.filter_closures;
    if !filter.is_empty() {
        if filter.contains(FilterClosures::EMISSION) {
            sd.closure_emission = Spectrum::ZERO;
            sd.closure_background = Spectrum::ZERO;
        }
        if filter.contains(FilterClosures::DIRECT_LIGHT) {
            sd.flags.remove(ShaderFlags::BSDF_HAS_EVAL);
        }
        if state.is_camera_ray() {
            let mut holdout = Spectrum::ZERO;
            sd.arena.retain(|sc| {
                if sc.ty == ClosureType::TransparentBsdf && filter.contains(FilterClosures::TRANSPARENT) {
                    holdout += sc.weight;
                    return false;
                }
                !filtered_on_camera_ray(filter, sc.ty)
            });
            if holdout != Spectrum::ZERO {
                sd.closure_holdout += holdout;
                sd.flags |= ShaderFlags::HOLDOUT;
            }
        }
    }

    if state.flags.contains(PathFlags::DIFFUSE_ANCESTOR)
        && !(config.caustics_reflective && config.caustics_refractive)
    {
        let before = sd.arena.len();
        sd.arena.retain(|sc| !is_caustic(config, sc.ty));
        if sd.arena.len() != before {
            log::trace!("caustic filter removed {} closure(s)", before - sd.arena.len());
        }
    }

    if state.is_first_bounce() && sd.arena.len() > 1 {
        let sum: f32 = sd.arena.closures().map(|(_, sc)| sc.sample_weight).sum();
        let floor = DEFENSIVE_SAMPLING_FRACTION * sum;
        for sc in sd.arena.closures_mut() {
            sc.sample_weight = sc.sample_weight.max(floor);
        }
    }

    if let Some(factor) = config.filter_glossy_factor() {
        let blur_pdf = factor * state.min_ray_pdf;
        if blur_pdf < 1.0 {
            let blur_roughness = (1.0 - blur_pdf).sqrt() * 0.5;
            for sc in sd.arena.closures_mut() {
                bsdf_blur(sc, blur_roughness);
            }
        }
    }
}

/// Pick a closure in proportion to its sample weight.
///
/// `rand` is consumed and rescaled to `[0, 1)` within the picked closure's
/// interval so it can be reused for the direction sample.
pub fn bsdf_pick(sd: &ShadingPoint, rand: &mut f32) -> Option<ClosureHandle> {
    let mut bsdfs = sd.arena.closures().filter(|(_, sc)| sc.ty.is_bsdf());
    if sd.arena.len() <= 1 {
        return bsdfs.next().map(|(h, _)| h);
    }

    let sum: f32 = sd.arena.closures().map(|(_, sc)| sc.sample_weight).sum();
    if !(sum > 0.0) {
        return None;
    }
    let r = *rand * sum;
    let mut partial_sum = 0.0;
    let mut last = None;
    for (handle, sc) in bsdfs {
        if !(sc.sample_weight > 0.0) {
            continue;
        }
        let next_sum = partial_sum + sc.sample_weight;
        if r < next_sum {
            *rand = ((r - partial_sum) / sc.sample_weight).clamp(0.0, 1.0 - f32::EPSILON);
            return Some(handle);
        }
        partial_sum = next_sum;
        last = Some(handle);
    }
    // Rounding left `r` past the final interval.
    *rand = 1.0 - f32::EPSILON;
    last
}

fn excluded(ty: ClosureType, exclude: ExcludeFlags) -> bool {
    (exclude.contains(ExcludeFlags::DIFFUSE) && ty.is_diffuse())
        || (exclude.contains(ExcludeFlags::GLOSSY) && ty.is_glossy())
        || (exclude.contains(ExcludeFlags::TRANSMIT) && ty.is_transmission())
}

/// Running sums of the one-sample MIS combination.
struct MisSum {
    eval: BsdfEval,
    sum_pdf: f32,
    sum_sample_weight: f32,
}

impl MisSum {
    fn pdf(&self) -> f32 {
        if self.sum_sample_weight > 0.0 {
            self.sum_pdf / self.sum_sample_weight
        } else {
            0.0
        }
    }
}

/// Weighted reservoir over closures, used to attribute a direction that no
/// closure sampled to one of them.
#[derive(Debug, Default)]
struct ClosureReservoir {
    weight_sum: f32,
    chosen: Option<ClosureHandle>,
}

impl ClosureReservoir {
    fn update(&mut self, handle: ClosureHandle, weight: f32, rng: &mut dyn RngCore) {
        if !(weight > 0.0) {
            return;
        }
        self.weight_sum += weight;
        if rng.gen::<f32>() * self.weight_sum < weight {
            self.chosen = Some(handle);
        }
    }
}

/// Add every closure except `skip` into `acc`.
///
/// Excluded closures still count toward the total sample weight since the
/// sampler could have picked them.
fn eval_mis(
    sd: &ShadingPoint,
    wo: Vec3,
    skip: Option<ClosureHandle>,
    acc: &mut MisSum,
    exclude: ExcludeFlags,
    mut pick: Option<&mut ClosureReservoir>,
    rng: &mut dyn RngCore,
) {
    for (handle, sc) in sd.arena.closures() {
        if Some(handle) == skip || !sc.ty.is_bsdf() {
            continue;
        }
        if !excluded(sc.ty, exclude) {
            let (value, pdf) = bsdf_eval(sd, sc, wo, rng);
            if pdf > 0.0 {
                acc.eval.accum(sc.ty, value * sc.weight);
                acc.sum_pdf += pdf * sc.sample_weight;
                if let Some(pick) = pick.as_deref_mut() {
                    pick.update(handle, pdf * sc.sample_weight, rng);
                }
            }
        }
        acc.sum_sample_weight += sc.sample_weight;
    }
}

/// Sample a direction from `handle` and combine it with the other closures.
pub fn sample_closure(
    config: &KernelConfig,
    sd: &ShadingPoint,
    handle: ClosureHandle,
    u: Vec2,
    rng: &mut dyn RngCore,
) -> Option<SurfaceSample> {
    let sc: &ClosureRecord = sd.arena.closure(handle)?;
    let sample = bsdf_sample(config, sd, sc, u, rng)?;

    let mut eval = BsdfEval::new(sc.ty, sample.eval * sc.weight);
    let mut pdf = sample.pdf;
    if sd.arena.len() > 1 {
        let mut acc = MisSum {
            eval,
            sum_pdf: pdf * sc.sample_weight,
            sum_sample_weight: sc.sample_weight,
        };
        eval_mis(sd, sample.wo, Some(handle), &mut acc, ExcludeFlags::empty(), None, rng);
        eval = acc.eval;
        pdf = acc.pdf();
    }
    if !(pdf > 0.0) {
        return None;
    }
    debug_assert!(eval.sum.min_element() >= 0.0, "negative surface eval");

    Some(SurfaceSample {
        closure: handle,
        wo: sample.wo,
        eval,
        pdf,
        label: sample.label,
        roughness: sample.roughness,
        eta: sample.eta,
    })
}

/// Pick a closure with `u.x`, then sample it with the rescaled `u`.
pub fn sample_surface(
    config: &KernelConfig,
    sd: &ShadingPoint,
    mut u: Vec2,
    rng: &mut dyn RngCore,
) -> Option<SurfaceSample> {
    let handle = bsdf_pick(sd, &mut u.x)?;
    sample_closure(config, sd, handle, u, rng)
}

/// Weighted evaluation of all closures toward `wo` and the mixture pdf.
///
/// Callers check [`ShadingPoint::has_bsdf_eval`] first; delta closures
/// contribute nothing here.
pub fn eval_all(
    sd: &ShadingPoint,
    wo: Vec3,
    exclude: ExcludeFlags,
    rng: &mut dyn RngCore,
) -> (BsdfEval, f32) {
    let mut acc = MisSum {
        eval: BsdfEval::ZERO,
        sum_pdf: 0.0,
        sum_sample_weight: 0.0,
    };
    eval_mis(sd, wo, None, &mut acc, exclude, None, rng);
    (acc.eval, acc.pdf())
}

/// [`eval_all`] that also picks one closure in proportion to its share of the mixture pdf.
pub(crate) fn eval_all_pick(
    sd: &ShadingPoint,
    wo: Vec3,
    rng: &mut dyn RngCore,
) -> (BsdfEval, f32, Option<ClosureHandle>) {
    let mut acc = MisSum {
        eval: BsdfEval::ZERO,
        sum_pdf: 0.0,
        sum_sample_weight: 0.0,
    };
    let mut pick = ClosureReservoir::default();
    eval_mis(sd, wo, None, &mut acc, ExcludeFlags::empty(), Some(&mut pick), rng);
    (acc.eval, acc.pdf(), pick.chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsdf::microfacet::MicrofacetBsdf;
    use crate::closure::builder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn point() -> ShadingPoint {
        ShadingPoint::new(Vec3::Z, Vec3::Z, Vec3::new(0.3, 0.1, 0.9).normalize(), 8)
    }

    #[test]
    fn test_pick_rescales_random() {
        let mut sd = point();
        let a = builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::splat(1.0)).unwrap();
        let b = builder::add_translucent(&mut sd, Vec3::Z, Spectrum::splat(3.0)).unwrap();

        let mut r = 0.125;
        assert_eq!(bsdf_pick(&sd, &mut r), Some(a));
        assert!((r - 0.5).abs() < 1e-6);

        let mut r = 0.625;
        assert_eq!(bsdf_pick(&sd, &mut r), Some(b));
        assert!((r - 0.5).abs() < 1e-6);

        let mut r = 1.0;
        assert_eq!(bsdf_pick(&sd, &mut r), Some(b));
        assert!(r < 1.0);
    }

    #[test]
    fn test_pick_empty() {
        let sd = point();
        let mut r = 0.5;
        assert!(bsdf_pick(&sd, &mut r).is_none());
    }

    #[test]
    fn test_defensive_sampling_floor() {
        let config = KernelConfig::default();
        let mut sd = point();
        builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::splat(1.0)).unwrap();
        builder::add_translucent(&mut sd, Vec3::Z, Spectrum::splat(0.01)).unwrap();
        prepare_closures(&config, &PathState::default(), &mut sd);
        let weights: Vec<f32> = sd.arena.closures().map(|(_, sc)| sc.sample_weight).collect();
        assert_eq!(weights[0], 1.0);
        assert!((weights[1] - 0.125 * 1.01).abs() < 1e-6);

        // Later bounces keep the raw weights.
        let mut sd = point();
        builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::splat(1.0)).unwrap();
        builder::add_translucent(&mut sd, Vec3::Z, Spectrum::splat(0.01)).unwrap();
        prepare_closures(&config, &PathState::at_bounce(2), &mut sd);
        let weights: Vec<f32> = sd.arena.closures().map(|(_, sc)| sc.sample_weight).collect();
        assert!((weights[1] - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_filter_closures_on_camera_rays() {
        let config = KernelConfig {
            filter_closures: FilterClosures::GLOSSY | FilterClosures::TRANSPARENT,
            ..Default::default()
        };
        let mut sd = point();
        builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::ONE).unwrap();
        builder::add_microfacet(
            &mut sd,
            ClosureType::MicrofacetGgxBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.3, 1.5),
        )
        .unwrap();
        builder::add_transparent(&mut sd, Spectrum::splat(0.5)).unwrap();

        prepare_closures(&config, &PathState::default(), &mut sd);
        let types: Vec<_> = sd.arena.closures().map(|(_, sc)| sc.ty).collect();
        assert_eq!(types, vec![ClosureType::DiffuseBsdf]);
        assert!(sd.flags.contains(ShaderFlags::HOLDOUT));
        assert_eq!(sd.closure_holdout, Spectrum::splat(0.5));

        // Indirect rays see everything.
        let mut sd2 = point();
        builder::add_microfacet(
            &mut sd2,
            ClosureType::MicrofacetGgxBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.3, 1.5),
        )
        .unwrap();
        prepare_closures(&config, &PathState::at_bounce(1), &mut sd2);
        assert_eq!(sd2.arena.len(), 1);
    }

    #[test]
    fn test_caustics_filtered_after_diffuse() {
        let config = KernelConfig {
            caustics_reflective: false,
            ..Default::default()
        };
        let mut state = PathState::at_bounce(1);
        state.flags |= PathFlags::DIFFUSE_ANCESTOR;

        let mut sd = point();
        builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::ONE).unwrap();
        builder::add_microfacet(
            &mut sd,
            ClosureType::MicrofacetGgxBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.3, 1.5),
        )
        .unwrap();
        builder::add_microfacet(
            &mut sd,
            ClosureType::MicrofacetGgxRefractionBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.3, 1.5),
        )
        .unwrap();
        prepare_closures(&config, &state, &mut sd);
        let types: Vec<_> = sd.arena.closures().map(|(_, sc)| sc.ty).collect();
        assert_eq!(
            types,
            vec![ClosureType::DiffuseBsdf, ClosureType::MicrofacetGgxRefractionBsdf]
        );
    }

    #[test]
    fn test_filter_glossy_blurs() {
        let config = KernelConfig {
            filter_glossy: 1.0,
            ..Default::default()
        };
        let state = PathState {
            min_ray_pdf: 0.19,
            ..PathState::at_bounce(1)
        };
        let mut sd = point();
        builder::add_microfacet(
            &mut sd,
            ClosureType::MicrofacetGgxBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.01, 1.5),
        )
        .unwrap();
        prepare_closures(&config, &state, &mut sd);
        let (_, sc) = sd.arena.closures().next().unwrap();
        let (roughness, _) = crate::bsdf::bsdf_roughness_eta(sc);
        // sqrt(1 - 0.19) * 0.5
        assert!((roughness.x - 0.45).abs() < 1e-5);
    }

    #[test]
    fn test_mixture_pdf_two_diffuse() {
        let config = KernelConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut sd = point();
        builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::splat(0.5)).unwrap();
        let n2 = Vec3::new(0.3, 0.0, 1.0).normalize();
        builder::add_diffuse(&mut sd, n2, Spectrum::splat(0.25)).unwrap();

        let s = sample_surface(&config, &sd, Vec2::new(0.2, 0.7), &mut rng).unwrap();
        let p1 = s.wo.z.max(0.0) / std::f32::consts::PI;
        let p2 = s.wo.dot(n2).max(0.0) / std::f32::consts::PI;
        let expected = (0.5 * p1 + 0.25 * p2) / 0.75;
        assert!((s.pdf - expected).abs() < 1e-5 * expected.max(1.0));

        let (eval, pdf) = eval_all(&sd, s.wo, ExcludeFlags::empty(), &mut rng);
        assert!((pdf - s.pdf).abs() < 1e-5);
        assert!((eval.sum - s.eval.sum).abs().max_element() < 1e-5);
    }

    #[test]
    fn test_exclude_keeps_sample_weight() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut sd = point();
        builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::ONE).unwrap();
        builder::add_microfacet(
            &mut sd,
            ClosureType::MicrofacetGgxBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(0.5, 1.5),
        )
        .unwrap();
        let wo = Vec3::new(-0.2, 0.1, 0.95).normalize();
        let (full, pdf_full) = eval_all(&sd, wo, ExcludeFlags::empty(), &mut rng);
        let (diffuse_only, pdf_diffuse) = eval_all(&sd, wo, ExcludeFlags::GLOSSY, &mut rng);
        assert!(diffuse_only.glossy == Spectrum::ZERO);
        assert!((diffuse_only.sum - full.diffuse).abs().max_element() < 1e-6);
        // Half of the mixture weight belongs to the excluded closure.
        assert!((pdf_diffuse - 0.5 * wo.z / std::f32::consts::PI).abs() < 1e-5);
        assert!(pdf_full > pdf_diffuse);
    }
}
