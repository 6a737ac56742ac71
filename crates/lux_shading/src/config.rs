//! Read-only kernel configuration.
//!
//! Everything the closure code would otherwise read from global render
//! settings is collected here and passed explicitly by the caller.

use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Largest arena a shading point may be configured with.
pub const MAX_CLOSURE_LIMIT: usize = 256;

bitflags! {
    /// Closure categories removed on camera rays, for debugging and light-path isolation.
    /// Serialized as its raw bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(from = "u32", into = "u32")]
    pub struct FilterClosures: u32 {
        const EMISSION = 1 << 0;
        const DIRECT_LIGHT = 1 << 1;
        const DIFFUSE = 1 << 2;
        const GLOSSY = 1 << 3;
        const TRANSMISSION = 1 << 4;
        const TRANSPARENT = 1 << 5;
    }
}

impl From<u32> for FilterClosures {
    fn from(bits: u32) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl From<FilterClosures> for u32 {
    fn from(flags: FilterClosures) -> Self {
        flags.bits()
    }
}

/// How the guiding adapter mixes the learned distribution with BSDF sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidingSamplingType {
    /// Two-candidate resampled importance sampling.
    #[default]
    Ris,
    /// Stochastic choice between guide and BSDF, pdfs blended.
    OneSample,
}

/// Surface path guiding settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidingConfig {
    pub use_surface_guiding: bool,
    /// Probability of following the learned distribution for fully diffuse surfaces.
    pub surface_guiding_probability: f32,
    pub sampling_type: GuidingSamplingType,
}

impl Default for GuidingConfig {
    fn default() -> Self {
        Self {
            use_surface_guiding: false,
            surface_guiding_probability: 0.5,
            sampling_type: GuidingSamplingType::Ris,
        }
    }
}

/// Kernel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Closure slots per shading point
    pub max_closures: usize,
    /// Allow glossy reflection after a diffuse bounce
    pub caustics_reflective: bool,
    /// Allow refraction after a diffuse bounce
    pub caustics_refractive: bool,
    /// Roughness below which transmission counts as transparent for the background; negative disables
    pub transparent_roughness_threshold: f32,
    /// Filter-glossy strength; zero or `f32::MAX` disables blurring
    pub filter_glossy: f32,
    pub filter_closures: FilterClosures,
    pub guiding: GuidingConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_closures: 64,
            caustics_reflective: true,
            caustics_refractive: true,
            transparent_roughness_threshold: -1.0,
            filter_glossy: f32::MAX,
            filter_closures: FilterClosures::empty(),
            guiding: GuidingConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: KernelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::info!("Loading kernel config from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_closures == 0 || self.max_closures > MAX_CLOSURE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "max_closures",
                value: self.max_closures.to_string(),
            });
        }
        if self.transparent_roughness_threshold.is_nan() {
            return Err(ConfigError::InvalidValue {
                field: "transparent_roughness_threshold",
                value: self.transparent_roughness_threshold.to_string(),
            });
        }
        if !(self.filter_glossy >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "filter_glossy",
                value: self.filter_glossy.to_string(),
            });
        }
        let p = self.guiding.surface_guiding_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidValue {
                field: "guiding.surface_guiding_probability",
                value: p.to_string(),
            });
        }
        Ok(())
    }

    /// Squared roughness threshold for transparent reclassification, negative when disabled.
    pub fn transparent_roughness_squared_threshold(&self) -> f32 {
        let t = self.transparent_roughness_threshold;
        if t >= 0.0 {
            t * t
        } else {
            -1.0
        }
    }

    /// Filter-glossy multiplier, or `None` when blurring is off.
    pub fn filter_glossy_factor(&self) -> Option<f32> {
        if self.filter_glossy > 0.0 && self.filter_glossy != f32::MAX {
            Some(1.0 / self.filter_glossy)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_closures, 64);
        assert!(config.filter_glossy_factor().is_none());
        assert!(config.transparent_roughness_squared_threshold() < 0.0);
    }

    #[test]
    fn test_from_json_partial() {
        let config = KernelConfig::from_json_str(
            r#"{ "max_closures": 8, "transparent_roughness_threshold": 0.1, "filter_closures": 4 }"#,
        )
        .unwrap();
        assert_eq!(config.max_closures, 8);
        assert!(config.caustics_reflective);
        assert!((config.transparent_roughness_squared_threshold() - 0.01).abs() < 1e-6);
        assert_eq!(config.filter_closures, FilterClosures::DIFFUSE);
    }

    #[test]
    fn test_guiding_from_json() {
        let config = KernelConfig::from_json_str(
            r#"{ "guiding": { "use_surface_guiding": true, "sampling_type": "one_sample" } }"#,
        )
        .unwrap();
        assert!(config.guiding.use_surface_guiding);
        assert_eq!(config.guiding.sampling_type, GuidingSamplingType::OneSample);
        assert_eq!(config.guiding.surface_guiding_probability, 0.5);
    }

    #[test]
    fn test_invalid_max_closures() {
        let err = KernelConfig::from_json_str(r#"{ "max_closures": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "max_closures",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            KernelConfig::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_filter_glossy_factor() {
        let config = KernelConfig {
            filter_glossy: 2.0,
            ..Default::default()
        };
        assert_eq!(config.filter_glossy_factor(), Some(0.5));
    }
}
