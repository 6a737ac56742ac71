//! The per-interaction shading state.

use bitflags::bitflags;
use glam::Vec3;
use lux_math::Spectrum;

use crate::closure::ClosureArena;
use crate::config::KernelConfig;
use crate::label::ClosureFlags;

bitflags! {
    /// Summary of what the closures at a shading point can do.
    ///
    /// The low bits mirror [`ClosureFlags`] so setup results can be merged directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderFlags: u32 {
        const BSDF = 1 << 0;
        const BSDF_HAS_EVAL = 1 << 1;
        const BSDF_NEEDS_RANDOM = 1 << 2;
        const BSDF_HAS_TRANSMISSION = 1 << 3;
        const TRANSPARENT = 1 << 4;
        const EMISSION = 1 << 8;
        const HOLDOUT = 1 << 9;
        const AO = 1 << 10;
        const BACKFACING = 1 << 11;
    }
}

impl From<ClosureFlags> for ShaderFlags {
    fn from(flags: ClosureFlags) -> Self {
        ShaderFlags::from_bits_truncate(flags.bits())
    }
}

/// Per-object parameters read during dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectParams {
    /// Values above 1 soften the terminator on coarse, smooth-shaded geometry.
    pub shadow_terminator_shading_offset: f32,
}

impl Default for ObjectParams {
    fn default() -> Self {
        Self {
            shadow_terminator_shading_offset: 0.0,
        }
    }
}

/// Everything known about one ray-surface interaction.
#[derive(Debug, Clone)]
pub struct ShadingPoint {
    pub p: Vec3,
    /// Interpolated shading normal
    pub n: Vec3,
    /// Geometric normal
    pub ng: Vec3,
    /// Direction back toward the viewer
    pub wi: Vec3,
    /// Surface tangent, used to orient anisotropic closures
    pub dpdu: Vec3,
    pub flags: ShaderFlags,
    pub object: ObjectParams,
    pub arena: ClosureArena,

    pub closure_emission: Spectrum,
    pub closure_background: Spectrum,
    pub closure_transparent_extinction: Spectrum,
    pub closure_holdout: Spectrum,
    pub ao_alpha: Spectrum,
}

impl ShadingPoint {
    pub fn new(n: Vec3, ng: Vec3, wi: Vec3, max_closures: usize) -> Self {
        Self {
            p: Vec3::ZERO,
            n,
            ng,
            wi,
            dpdu: Vec3::ZERO,
            flags: ShaderFlags::empty(),
            object: ObjectParams::default(),
            arena: ClosureArena::new(max_closures),
            closure_emission: Spectrum::ZERO,
            closure_background: Spectrum::ZERO,
            closure_transparent_extinction: Spectrum::ZERO,
            closure_holdout: Spectrum::ZERO,
            ao_alpha: Spectrum::ZERO,
        }
    }

    /// Shading point sized by `config.max_closures`.
    pub fn with_config(config: &KernelConfig, n: Vec3, ng: Vec3, wi: Vec3) -> Self {
        Self::new(n, ng, wi, config.max_closures)
    }

    pub fn with_position(mut self, p: Vec3) -> Self {
        self.p = p;
        self
    }

    pub fn with_tangent(mut self, dpdu: Vec3) -> Self {
        self.dpdu = dpdu;
        self
    }

    pub fn with_object(mut self, object: ObjectParams) -> Self {
        self.object = object;
        self
    }

    /// Drop all closures and accumulators so the point can be shaded again.
    pub fn reset(&mut self) {
        self.arena.clear();
        self.flags &= ShaderFlags::BACKFACING;
        self.closure_emission = Spectrum::ZERO;
        self.closure_background = Spectrum::ZERO;
        self.closure_transparent_extinction = Spectrum::ZERO;
        self.closure_holdout = Spectrum::ZERO;
        self.ao_alpha = Spectrum::ZERO;
    }

    /// Whether any closure can be evaluated toward an arbitrary direction.
    #[inline]
    pub fn has_bsdf_eval(&self) -> bool {
        self.flags.contains(ShaderFlags::BSDF_HAS_EVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_flags_convert() {
        let flags = ShaderFlags::from(ClosureFlags::BSDF | ClosureFlags::HAS_TRANSMISSION);
        assert_eq!(flags, ShaderFlags::BSDF | ShaderFlags::BSDF_HAS_TRANSMISSION);
    }

    #[test]
    fn test_reset_keeps_backfacing() {
        let mut sd = ShadingPoint::new(Vec3::Z, Vec3::Z, Vec3::Z, 4);
        sd.flags = ShaderFlags::BACKFACING | ShaderFlags::EMISSION;
        sd.closure_emission = Spectrum::ONE;
        sd.reset();
        assert_eq!(sd.flags, ShaderFlags::BACKFACING);
        assert_eq!(sd.closure_emission, Spectrum::ZERO);
    }
}
