//! Furnace and sample/eval consistency checks for one preset at one angle.

use glam::{Vec2, Vec3};
use lux_shading::{eval_all, prepare_closures, sample_surface, ExcludeFlags, KernelConfig, Label, PathState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::presets::Preset;

/// Largest relative mismatch between sampled and evaluated pdfs.
pub const PDF_TOLERANCE: f32 = 1e-2;

/// Furnace results above this count as energy gain.
pub const ENERGY_TOLERANCE: f32 = 1.02;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub preset: String,
    pub cos_theta: f32,
    pub samples: usize,
    /// Mean throughput, the white-furnace albedo
    pub albedo: f32,
    /// Samples that came back empty
    pub rejected: usize,
    pub max_pdf_error: f32,
    pub negative_values: usize,
    pub passed: bool,
}

fn relative_error(a: f32, b: f32) -> f32 {
    (a - b).abs() / a.abs().max(b.abs()).max(1.0)
}

/// Sample `preset` `samples` times from an incidence of `cos_theta`.
pub fn run(config: &KernelConfig, preset: Preset, cos_theta: f32, samples: usize, seed: u64) -> Report {
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let wi = Vec3::new(sin_theta, 0.0, cos_theta);
    let mut sd = preset.build(config, wi);
    prepare_closures(config, &PathState::at_bounce(1), &mut sd);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut sum = 0.0f64;
    let mut rejected = 0;
    let mut max_pdf_error = 0.0f32;
    let mut negative_values = 0;

    for _ in 0..samples {
        let u = Vec2::new(rng.gen(), rng.gen());
        let Some(s) = sample_surface(config, &sd, u, &mut rng) else {
            rejected += 1;
            continue;
        };
        let throughput = s.throughput();
        if throughput.min_element() < 0.0 || !throughput.is_finite() {
            negative_values += 1;
            continue;
        }
        sum += lux_math::spectrum::average(throughput) as f64;

        if !s.label.contains(Label::SINGULAR) {
            let (_, pdf) = eval_all(&sd, s.wo, ExcludeFlags::empty(), &mut rng);
            max_pdf_error = max_pdf_error.max(relative_error(pdf, s.pdf));
        }
    }

    let albedo = (sum / samples.max(1) as f64) as f32;
    let energy_ok = !preset.conserves_energy() || albedo <= ENERGY_TOLERANCE;
    let passed = energy_ok && max_pdf_error <= PDF_TOLERANCE && negative_values == 0;
    if !passed {
        log::warn!(
            "{preset} at cos {cos_theta:.2}: albedo {albedo:.4}, pdf error {max_pdf_error:.2e}, {negative_values} bad values"
        );
    } else {
        log::debug!("{preset} at cos {cos_theta:.2}: albedo {albedo:.4}");
    }

    Report {
        preset: preset.to_string(),
        cos_theta,
        samples,
        albedo,
        rejected,
        max_pdf_error,
        negative_values,
        passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diffuse_furnace() {
        let report = run(&KernelConfig::default(), Preset::Diffuse, 0.7, 2000, 1);
        assert!(report.passed);
        assert!((report.albedo - 1.0).abs() < 1e-3);
        assert_eq!(report.rejected, 0);
    }

    #[test]
    fn test_relative_error_floor() {
        assert_eq!(relative_error(0.0, 0.0), 0.0);
        assert!((relative_error(200.0, 202.0) - 2.0 / 202.0).abs() < 1e-6);
    }
}
