//! Statistical and scenario checks over the public shading API.

use glam::{Vec2, Vec3};
use lux_shading::bsdf::hair::HairBsdf;
use lux_shading::bsdf::microfacet::MicrofacetBsdf;
use lux_shading::bsdf::principled_diffuse::PrincipledDiffuseComponents;
use lux_shading::bsdf::principled_hair::PrincipledHairBsdf;
use lux_shading::bsdf::ramp::{ColorRamp, RAMP_COLORS};
use lux_shading::closure::builder;
use lux_shading::{
    eval_all, sample_surface, ClosureArena, ClosureType, ExcludeFlags, KernelConfig, ShadingPoint,
    Spectrum,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{FRAC_1_PI, PI, TAU};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn point(wi: Vec3) -> ShadingPoint {
    ShadingPoint::new(Vec3::Z, Vec3::Z, wi.normalize(), 16)
}

fn random_upper(rng: &mut StdRng) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen::<f32>() * 2.0 - 1.0,
            rng.gen::<f32>() * 2.0 - 1.0,
            rng.gen::<f32>(),
        );
        let len = v.length();
        if len > 0.1 && len <= 1.0 && v.z > 0.05 {
            return v / len;
        }
    }
}

/// Mean path throughput of `sd` over `n` samples.
fn estimate_albedo(sd: &ShadingPoint, n: usize, rng: &mut StdRng) -> f32 {
    let config = KernelConfig::default();
    let mut sum = 0.0f64;
    for _ in 0..n {
        let u = Vec2::new(rng.gen(), rng.gen());
        if let Some(s) = sample_surface(&config, sd, u, rng) {
            sum += lux_math::spectrum::average(s.throughput()) as f64;
        }
    }
    (sum / n as f64) as f32
}

fn reflective_models(wi: Vec3) -> Vec<ShadingPoint> {
    let mut out = Vec::new();

    let mut sd = point(wi);
    builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::ONE).unwrap();
    out.push(sd);

    let mut sd = point(wi);
    builder::add_oren_nayar(&mut sd, Vec3::Z, Spectrum::ONE, 0.6).unwrap();
    out.push(sd);

    for ty in [ClosureType::MicrofacetGgxBsdf, ClosureType::MicrofacetBeckmannBsdf] {
        let mut sd = point(wi);
        builder::add_microfacet(&mut sd, ty, Vec3::Z, Spectrum::ONE, MicrofacetBsdf::isotropic(0.4, 1.5))
            .unwrap();
        out.push(sd);
    }

    let mut sd = point(wi);
    builder::add_microfacet(
        &mut sd,
        ClosureType::MicrofacetMultiGgxBsdf,
        Vec3::Z,
        Spectrum::ONE,
        MicrofacetBsdf::isotropic(0.6, 1.5),
    )
    .unwrap();
    out.push(sd);

    out
}

#[test]
fn test_eval_is_nonnegative() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(1);
    let wi = Vec3::new(0.4, -0.2, 0.8);
    for sd in reflective_models(wi) {
        for _ in 0..200 {
            let wo = random_upper(&mut rng);
            let (eval, pdf) = eval_all(&sd, wo, ExcludeFlags::empty(), &mut rng);
            assert!(pdf >= 0.0 && pdf.is_finite());
            assert!(eval.sum.min_element() >= 0.0 && eval.sum.is_finite());
        }
        // Directions below the surface reflect nothing.
        let (eval, _) = eval_all(&sd, Vec3::new(0.2, 0.0, -0.9).normalize(), ExcludeFlags::empty(), &mut rng);
        assert!(eval.is_zero());
    }
}

#[test]
fn test_reflection_does_not_gain_energy() {
    let mut rng = StdRng::seed_from_u64(2);
    let wi = Vec3::new(0.5, 0.0, 0.85);
    for sd in reflective_models(wi) {
        let ty = sd.arena.closures().next().map(|(_, r)| r.ty).unwrap();
        let albedo = estimate_albedo(&sd, 20_000, &mut rng);
        assert!(albedo <= 1.02, "{ty}: {albedo}");
        assert!(albedo > 0.3, "{ty}: {albedo}");
    }
}

/// Midpoint quadrature of `eval` over the upper hemisphere, uniform in cos(theta) and phi.
fn integrate_eval(sd: &ShadingPoint, n: usize, rng: &mut StdRng) -> f32 {
    let mut sum = 0.0f64;
    for i in 0..n {
        let z = (i as f32 + 0.5) / n as f32;
        let r = (1.0 - z * z).max(0.0).sqrt();
        for j in 0..n {
            let phi = std::f32::consts::TAU * (j as f32 + 0.5) / n as f32;
            let wo = Vec3::new(r * phi.cos(), r * phi.sin(), z);
            let (eval, _) = eval_all(sd, wo, ExcludeFlags::empty(), rng);
            sum += lux_math::spectrum::average(eval.sum) as f64;
        }
    }
    (sum * std::f64::consts::TAU / (n * n) as f64) as f32
}

/// Midpoint quadrature of `eval` over the whole sphere, uniform in theta and phi.
fn integrate_sphere(sd: &ShadingPoint, n: usize, rng: &mut StdRng) -> f32 {
    let mut sum = 0.0f64;
    for i in 0..n {
        let theta = PI * (i as f32 + 0.5) / n as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        let mut ring = 0.0f64;
        for j in 0..2 * n {
            let phi = TAU * (j as f32 + 0.5) / (2 * n) as f32;
            let wo = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);
            let (eval, _) = eval_all(sd, wo, ExcludeFlags::empty(), rng);
            ring += lux_math::spectrum::average(eval.sum) as f64;
        }
        sum += ring * sin_theta as f64;
    }
    let cell = (PI / n as f32) as f64 * (TAU / (2 * n) as f32) as f64;
    (sum * cell) as f32
}

fn ramp(f: impl Fn(f32) -> Spectrum) -> ColorRamp {
    let mut colors = [Spectrum::ZERO; RAMP_COLORS];
    for (i, c) in colors.iter_mut().enumerate() {
        *c = f(i as f32 / (RAMP_COLORS - 1) as f32);
    }
    ColorRamp(colors)
}

/// Reflection-only lobes outside the microfacet family, each paired with its tolerance.
fn stylized_models(wi: Vec3) -> Vec<(ShadingPoint, f32)> {
    let mut out = Vec::new();

    for ty in [ClosureType::DiffuseToonBsdf, ClosureType::GlossyToonBsdf] {
        let mut sd = point(wi);
        builder::add_toon(&mut sd, ty, Vec3::Z, Spectrum::ONE, 0.5, 0.1).unwrap();
        out.push((sd, 0.015));
    }

    let mut sd = point(wi);
    builder::add_velvet(&mut sd, Vec3::Z, Spectrum::ONE, 0.5).unwrap();
    out.push((sd, 0.015));

    let mut sd = point(wi);
    builder::add_principled_sheen(&mut sd, Vec3::Z, Spectrum::ONE).unwrap();
    out.push((sd, 0.015));

    // Dark at grazing angles, which keeps the ramp throughput bounded.
    let mut sd = point(wi);
    builder::add_diffuse_ramp(&mut sd, Vec3::Z, Spectrum::ONE, ramp(|t| Spectrum::new(0.9, 0.6, 0.3) * t.sqrt()))
        .unwrap();
    out.push((sd, 0.015));

    let mut sd = point(wi);
    builder::add_phong_ramp(&mut sd, Vec3::Z, Spectrum::ONE, 20.0, ramp(|t| Spectrum::splat(1.0 - 0.5 * t)))
        .unwrap();
    out.push((sd, 0.015));

    let mut sd = point(wi);
    builder::add_principled_diffuse(&mut sd, Vec3::Z, Spectrum::ONE, 0.5, PrincipledDiffuseComponents::FULL)
        .unwrap();
    out.push((sd, 0.015));

    out
}

/// Lobes that scatter below the surface or around a fiber, each paired with its tolerance.
fn sphere_models(wi: Vec3) -> Vec<(ShadingPoint, f32)> {
    let mut out = Vec::new();

    let mut sd = point(wi);
    builder::add_translucent(&mut sd, Vec3::Z, Spectrum::ONE).unwrap();
    out.push((sd, 0.015));

    for ty in [
        ClosureType::MicrofacetGgxRefractionBsdf,
        ClosureType::MicrofacetBeckmannRefractionBsdf,
        ClosureType::MicrofacetGgxGlassBsdf,
        ClosureType::MicrofacetBeckmannGlassBsdf,
    ] {
        let mut sd = point(wi);
        builder::add_microfacet(&mut sd, ty, Vec3::Z, Spectrum::ONE, MicrofacetBsdf::isotropic(0.3, 1.5)).unwrap();
        out.push((sd, 0.02));
    }

    // The walk is evaluated stochastically, so it gets more room.
    let mut sd = point(wi);
    builder::add_microfacet(
        &mut sd,
        ClosureType::MicrofacetMultiGgxGlassBsdf,
        Vec3::Z,
        Spectrum::ONE,
        MicrofacetBsdf::isotropic(0.4, 1.5),
    )
    .unwrap();
    out.push((sd, 0.04));

    // Fiber along the pole, so the longitudinal pdf stays finite under the theta weight.
    for ty in [ClosureType::HairReflectionBsdf, ClosureType::HairTransmissionBsdf] {
        let mut sd = point(wi);
        builder::add_hair(&mut sd, ty, Vec3::Z, Spectrum::ONE, HairBsdf::new(0.3, 0.4, 0.05, Vec3::Z)).unwrap();
        out.push((sd, 0.02));
    }

    let mut sd = point(wi).with_tangent(Vec3::X);
    builder::add_principled_hair(
        &mut sd,
        Vec3::Z,
        Spectrum::ONE,
        PrincipledHairBsdf::new(Spectrum::new(0.4, 0.8, 1.6), 0.4, 0.4, 0.0, 1.55, 1.0),
    )
    .unwrap();
    out.push((sd, 0.03));

    out
}

fn closure_type(sd: &ShadingPoint) -> ClosureType {
    sd.arena.closures().next().map(|(_, r)| r.ty).unwrap()
}

#[test]
fn test_sampling_matches_quadrature() {
    let mut rng = StdRng::seed_from_u64(7);
    let wi = Vec3::new(0.5, 0.2, 0.8);
    let models = reflective_models(wi).into_iter().enumerate().map(|(i, sd)| {
        // Multi-scatter GGX is evaluated stochastically.
        let tolerance = if i == 4 { 0.03 } else { 0.015 };
        (sd, tolerance)
    });
    for (sd, tolerance) in models.chain(stylized_models(wi)) {
        let ty = closure_type(&sd);
        let estimate = estimate_albedo(&sd, 40_000, &mut rng);
        let reference = integrate_eval(&sd, 300, &mut rng);
        assert!(
            (estimate - reference).abs() < tolerance,
            "{ty}: sampled {estimate}, integrated {reference}"
        );
    }
}

#[test]
fn test_sampling_matches_sphere_quadrature() {
    let mut rng = StdRng::seed_from_u64(8);
    let wi = Vec3::new(0.5, 0.2, 0.8);
    for (sd, tolerance) in sphere_models(wi) {
        let ty = closure_type(&sd);
        let estimate = estimate_albedo(&sd, 40_000, &mut rng);
        let reference = integrate_sphere(&sd, 200, &mut rng);
        assert!(reference > 0.05, "{ty}: {reference}");
        assert!(
            (estimate - reference).abs() < tolerance,
            "{ty}: sampled {estimate}, integrated {reference}"
        );
    }
}

#[test]
fn test_reflection_reciprocity() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..50 {
        let a = random_upper(&mut rng);
        let b = random_upper(&mut rng);
        for (sd_a, sd_b) in reflective_models(a)
            .into_iter()
            .zip(reflective_models(b))
            .take(4)
        {
            let (fab, _) = eval_all(&sd_a, b, ExcludeFlags::empty(), &mut rng);
            let (fba, _) = eval_all(&sd_b, a, ExcludeFlags::empty(), &mut rng);
            // eval carries cos(wo); compare the bare BSDF values.
            let x = fab.sum.x / b.z;
            let y = fba.sum.x / a.z;
            assert!((x - y).abs() <= 1e-3 * x.max(y).max(1e-3), "{x} vs {y}");
        }
    }
}

#[test]
fn test_combiner_pdf_is_mixture() {
    let config = KernelConfig::default();
    let mut rng = StdRng::seed_from_u64(4);
    let mut sd = point(Vec3::new(0.3, 0.1, 0.9));
    builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::splat(0.5)).unwrap();
    builder::add_oren_nayar(&mut sd, Vec3::Z, Spectrum::splat(0.2), 0.8).unwrap();
    builder::add_microfacet(
        &mut sd,
        ClosureType::MicrofacetGgxBsdf,
        Vec3::Z,
        Spectrum::splat(0.3),
        MicrofacetBsdf::isotropic(0.25, 1.5),
    )
    .unwrap();
    let weights: Vec<f32> = sd.arena.closures().map(|(_, r)| r.sample_weight).collect();
    let total: f32 = weights.iter().sum();

    for _ in 0..300 {
        let u = Vec2::new(rng.gen(), rng.gen());
        let Some(s) = sample_surface(&config, &sd, u, &mut rng) else {
            continue;
        };
        let (eval, pdf) = eval_all(&sd, s.wo, ExcludeFlags::empty(), &mut rng);
        assert!((pdf - s.pdf).abs() <= 1e-3 * pdf.max(1.0));
        assert!((eval.sum - s.eval.sum).abs().max_element() <= 1e-3 * eval.sum.max_element().max(1.0));

        // Recompute the mixture by hand from the per-closure pdfs.
        let mut mixture = 0.0;
        for ((_, sc), w) in sd.arena.closures().zip(&weights) {
            let (_, p) = lux_shading::bsdf::bsdf_eval(&sd, sc, s.wo, &mut rng);
            mixture += p * w;
        }
        assert!((mixture / total - s.pdf).abs() <= 1e-3 * s.pdf.max(1.0));
    }
}

#[test]
fn test_multiscatter_energy_gain() {
    let mut rng = StdRng::seed_from_u64(5);
    let wi = Vec3::new(0.05, 0.0, 1.0);
    let mut gains = Vec::new();
    for alpha in [0.2, 0.9] {
        let mut single = point(wi);
        builder::add_microfacet(
            &mut single,
            ClosureType::MicrofacetGgxBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(alpha, 1.0),
        )
        .unwrap();
        let mut multi = point(wi);
        builder::add_microfacet(
            &mut multi,
            ClosureType::MicrofacetMultiGgxBsdf,
            Vec3::Z,
            Spectrum::ONE,
            MicrofacetBsdf::isotropic(alpha, 1.0),
        )
        .unwrap();

        let e_single = estimate_albedo(&single, 20_000, &mut rng);
        let e_multi = estimate_albedo(&multi, 20_000, &mut rng);
        assert!(e_multi <= 1.01, "alpha {alpha}: {e_multi}");
        assert!(e_multi >= e_single - 0.02, "alpha {alpha}: {e_multi} < {e_single}");
        gains.push(e_multi - e_single);
    }
    assert!(gains[1] > gains[0] + 0.02, "{gains:?}");
}

#[test]
fn test_diffuse_at_45_degrees() {
    let config = KernelConfig::default();
    let mut rng = StdRng::seed_from_u64(6);
    let wi = Vec3::new(1.0, 0.0, 1.0).normalize();
    let mut sd = point(wi);
    builder::add_diffuse(&mut sd, Vec3::Z, Spectrum::splat(0.8)).unwrap();

    let s = sample_surface(&config, &sd, Vec2::new(0.5, 0.5), &mut rng).unwrap();
    let cos_o = s.wo.dot(Vec3::Z);
    assert!(cos_o > 0.0);
    assert!((s.pdf - cos_o * FRAC_1_PI).abs() < 1e-5);
    assert!((s.throughput() - Spectrum::splat(0.8)).abs().max_element() < 1e-5);
}

#[test]
fn test_two_slot_arena_any_order() {
    let types = [
        ClosureType::DiffuseBsdf,
        ClosureType::MicrofacetGgxBsdf,
        ClosureType::TranslucentBsdf,
    ];
    let orders = [[0, 1, 2], [2, 0, 1], [1, 2, 0], [2, 1, 0]];
    for order in orders {
        let mut arena = ClosureArena::new(2);
        let results: Vec<bool> = order
            .iter()
            .map(|&i| arena.alloc_bsdf(types[i], Vec3::Z, Spectrum::splat(0.5)).is_some())
            .collect();
        assert_eq!(results, vec![true, true, false]);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.remaining(), 0);
    }
}
