//! Lux Shading - closure evaluation and sampling for a path tracer.
//!
//! This crate provides:
//!
//! - **Closures**: a fixed-capacity arena of weighted scattering closures per
//!   shading point, and builders that validate and set them up
//! - **Models**: diffuse, microfacet (single and multiple scattering), hair,
//!   toon, velvet, sheen, ramp and transparent BSDFs
//! - **Combination**: closure selection and one-sample MIS over a whole
//!   shading point, plus optional path guiding
//! - **Passes**: diffuse/glossy/transmission splits and denoising features
//!
//! # Example
//!
//! ```ignore
//! use lux_shading::{closure::builder, KernelConfig, PathState, ShadingPoint};
//!
//! let config = KernelConfig::default();
//! let mut sd = ShadingPoint::with_config(&config, n, ng, wi);
//! builder::add_diffuse(&mut sd, n, Spectrum::splat(0.8));
//! lux_shading::prepare_closures(&config, &PathState::default(), &mut sd);
//! let sample = lux_shading::sample_surface(&config, &sd, u, &mut rng);
//! ```

pub mod bsdf;
pub mod closure;
pub mod config;
pub mod error;
pub mod eval;
pub mod guiding;
pub mod label;
pub mod passes;
pub mod shading_point;
pub mod state;
pub mod surface;

// Re-export commonly used types
pub use closure::principled::{PrincipledDistribution, PrincipledSurface};
pub use closure::{ClosureArena, ClosureHandle, ClosureRecord, ClosureType};
pub use config::{FilterClosures, GuidingConfig, GuidingSamplingType, KernelConfig};
pub use error::{ConfigError, ConfigResult};
pub use eval::BsdfEval;
pub use guiding::{GuidedSample, GuidingState, IncidentRadianceField, VmfLobeField};
pub use label::{ExcludeFlags, Label};
pub use passes::{PassAccumulator, PassWeights};
pub use shading_point::{ObjectParams, ShaderFlags, ShadingPoint};
pub use state::{PathFlags, PathState};
pub use surface::{bsdf_pick, eval_all, prepare_closures, sample_closure, sample_surface, SurfaceSample};

pub use lux_math::Spectrum;
