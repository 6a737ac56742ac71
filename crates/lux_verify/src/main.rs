//! Lux Verify - runs the shading models through furnace and consistency checks.
//!
//! Usage: `lux_verify [--config kernel.json] [--samples N] [--preset name] [--json]`

mod checks;
mod presets;

use anyhow::{bail, Context, Result};
use lux_shading::KernelConfig;
use rayon::prelude::*;
use strum::IntoEnumIterator;

use checks::Report;
use presets::Preset;

const INCIDENT_COSINES: [f32; 4] = [1.0, 0.8, 0.5, 0.2];

struct Options {
    config: KernelConfig,
    samples: usize,
    presets: Vec<Preset>,
    json: bool,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        config: KernelConfig::default(),
        samples: 20_000,
        presets: Preset::iter().collect(),
        json: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                options.config = KernelConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to load config {path}"))?;
            }
            "--samples" => {
                let n = args.next().context("--samples needs a count")?;
                options.samples = n.parse().with_context(|| format!("Invalid sample count {n}"))?;
            }
            "--preset" => {
                let name = args.next().context("--preset needs a name")?;
                let preset: Preset = name.parse().with_context(|| format!("Unknown preset {name}"))?;
                options.presets = vec![preset];
            }
            "--json" => options.json = true,
            other => bail!("Unknown argument {other}"),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let options = parse_args()?;
    log::info!(
        "Checking {} presets at {} angles, {} samples each",
        options.presets.len(),
        INCIDENT_COSINES.len(),
        options.samples
    );

    let jobs: Vec<(usize, Preset, f32)> = options
        .presets
        .iter()
        .flat_map(|&p| INCIDENT_COSINES.iter().map(move |&c| (p, c)))
        .enumerate()
        .map(|(i, (p, c))| (i, p, c))
        .collect();

    let config = &options.config;
    let samples = options.samples;
    let reports: Vec<Report> = jobs
        .par_iter()
        .map(|&(i, preset, cos_theta)| checks::run(config, preset, cos_theta, samples, i as u64))
        .collect();

    for r in &reports {
        log::info!(
            "{:<16} cos {:.2}  albedo {:.4}  pdf err {:.1e}  {}",
            r.preset,
            r.cos_theta,
            r.albedo,
            r.max_pdf_error,
            if r.passed { "ok" } else { "FAILED" }
        );
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    let failed = reports.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        bail!("{failed} of {} checks failed", reports.len());
    }
    log::info!("All {} checks passed", reports.len());
    Ok(())
}
