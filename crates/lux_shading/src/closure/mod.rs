//! Closure records and the fixed-capacity arena that stores them.
//!
//! A closure is one scattering response contributed by a material at a
//! shading point. Its [`ClosureType`] tag decides which [`ClosureData`]
//! variant is valid and which model the dispatch layer routes to.

mod arena;
pub mod builder;
pub mod principled;

pub use arena::{ClosureArena, ClosureHandle, ExtraHandle};

use glam::Vec3;
use lux_math::Spectrum;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::bsdf::diffuse::DiffuseBsdf;
use crate::bsdf::fresnel::{ConductorFresnel, MicrofacetExtra};
use crate::bsdf::hair::HairBsdf;
use crate::bsdf::microfacet::MicrofacetBsdf;
use crate::bsdf::oren_nayar::OrenNayarBsdf;
use crate::bsdf::principled_diffuse::PrincipledDiffuseBsdf;
use crate::bsdf::principled_hair::{PrincipledHairBsdf, PrincipledHairExtra};
use crate::bsdf::principled_sheen::PrincipledSheenBsdf;
use crate::bsdf::ramp::{ColorRamp, DiffuseRampBsdf, PhongRampBsdf};
use crate::bsdf::toon::ToonBsdf;
use crate::bsdf::transparent::TransparentBsdf;
use crate::bsdf::velvet::VelvetBsdf;
use crate::bsdf::Bxdf;

/// Storage reserved for one closure's model parameters, and the chunk size of
/// the extra-data overflow region.
pub const CLOSURE_DATA_BYTES: usize = 80;

/// Closures whose average weight falls below this are never allocated.
pub const CLOSURE_WEIGHT_CUTOFF: f32 = 1e-5;

// Every model payload must fit a single slot.
const _: () = assert!(std::mem::size_of::<OrenNayarBsdf>() <= CLOSURE_DATA_BYTES);
const _: () = assert!(std::mem::size_of::<ToonBsdf>() <= CLOSURE_DATA_BYTES);
const _: () = assert!(std::mem::size_of::<VelvetBsdf>() <= CLOSURE_DATA_BYTES);
const _: () = assert!(std::mem::size_of::<MicrofacetBsdf>() <= CLOSURE_DATA_BYTES);
const _: () = assert!(std::mem::size_of::<HairBsdf>() <= CLOSURE_DATA_BYTES);
const _: () = assert!(std::mem::size_of::<PrincipledHairBsdf>() <= CLOSURE_DATA_BYTES);
const _: () = assert!(std::mem::size_of::<PrincipledDiffuseBsdf>() <= CLOSURE_DATA_BYTES);
const _: () = assert!(std::mem::size_of::<PrincipledSheenBsdf>() <= CLOSURE_DATA_BYTES);
const _: () = assert!(std::mem::size_of::<PhongRampBsdf>() <= CLOSURE_DATA_BYTES);

/// Closed set of closure kinds.
///
/// Variants are grouped: diffuse, then glossy reflection, then everything
/// with a transmission component, then non-BSDF closures.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ClosureType {
    // Diffuse
    DiffuseBsdf,
    OrenNayarBsdf,
    DiffuseRampBsdf,
    PrincipledDiffuseBsdf,
    PrincipledSheenBsdf,
    DiffuseToonBsdf,
    TranslucentBsdf,

    // Glossy reflection
    ReflectionBsdf,
    MicrofacetGgxBsdf,
    MicrofacetGgxFresnelBsdf,
    MicrofacetGgxClearcoatBsdf,
    MicrofacetGgxConductorBsdf,
    MicrofacetBeckmannBsdf,
    MicrofacetMultiGgxBsdf,
    MicrofacetMultiGgxFresnelBsdf,
    AshikhminVelvetBsdf,
    PhongRampBsdf,
    GlossyToonBsdf,
    HairReflectionBsdf,

    // Transmission
    RefractionBsdf,
    MicrofacetBeckmannRefractionBsdf,
    MicrofacetGgxRefractionBsdf,
    MicrofacetMultiGgxGlassBsdf,
    MicrofacetMultiGgxGlassFresnelBsdf,
    SharpGlassBsdf,
    MicrofacetBeckmannGlassBsdf,
    MicrofacetGgxGlassBsdf,
    HairPrincipledBsdf,
    HairTransmissionBsdf,
    TransparentBsdf,

    // Non-BSDF
    Emission,
    Background,
    Holdout,
    AmbientOcclusion,
}

impl ClosureType {
    #[inline]
    pub fn is_bsdf(self) -> bool {
        !matches!(
            self,
            Self::Emission | Self::Background | Self::Holdout | Self::AmbientOcclusion
        )
    }

    #[inline]
    pub fn is_diffuse(self) -> bool {
        matches!(
            self,
            Self::DiffuseBsdf
                | Self::OrenNayarBsdf
                | Self::DiffuseRampBsdf
                | Self::PrincipledDiffuseBsdf
                | Self::PrincipledSheenBsdf
                | Self::DiffuseToonBsdf
                | Self::TranslucentBsdf
        )
    }

    #[inline]
    pub fn is_glossy(self) -> bool {
        matches!(
            self,
            Self::ReflectionBsdf
                | Self::MicrofacetGgxBsdf
                | Self::MicrofacetGgxFresnelBsdf
                | Self::MicrofacetGgxClearcoatBsdf
                | Self::MicrofacetGgxConductorBsdf
                | Self::MicrofacetBeckmannBsdf
                | Self::MicrofacetMultiGgxBsdf
                | Self::MicrofacetMultiGgxFresnelBsdf
                | Self::AshikhminVelvetBsdf
                | Self::PhongRampBsdf
                | Self::GlossyToonBsdf
                | Self::HairReflectionBsdf
                | Self::HairPrincipledBsdf
        )
    }

    /// Closures that can scatter to the far side of the surface.
    #[inline]
    pub fn is_transmission(self) -> bool {
        matches!(
            self,
            Self::TranslucentBsdf
                | Self::RefractionBsdf
                | Self::MicrofacetBeckmannRefractionBsdf
                | Self::MicrofacetGgxRefractionBsdf
                | Self::MicrofacetMultiGgxGlassBsdf
                | Self::MicrofacetMultiGgxGlassFresnelBsdf
                | Self::SharpGlassBsdf
                | Self::MicrofacetBeckmannGlassBsdf
                | Self::MicrofacetGgxGlassBsdf
                | Self::HairPrincipledBsdf
                | Self::HairTransmissionBsdf
                | Self::TransparentBsdf
        )
    }

    /// Delta distributions: sampled but never evaluated.
    #[inline]
    pub fn is_singular(self) -> bool {
        matches!(
            self,
            Self::ReflectionBsdf
                | Self::RefractionBsdf
                | Self::SharpGlassBsdf
                | Self::TransparentBsdf
        )
    }

    #[inline]
    pub fn is_glass(self) -> bool {
        matches!(
            self,
            Self::MicrofacetMultiGgxGlassBsdf
                | Self::MicrofacetMultiGgxGlassFresnelBsdf
                | Self::SharpGlassBsdf
                | Self::MicrofacetBeckmannGlassBsdf
                | Self::MicrofacetGgxGlassBsdf
        )
    }

    #[inline]
    pub fn is_multiscatter(self) -> bool {
        matches!(
            self,
            Self::MicrofacetMultiGgxBsdf
                | Self::MicrofacetMultiGgxFresnelBsdf
                | Self::MicrofacetMultiGgxGlassBsdf
                | Self::MicrofacetMultiGgxGlassFresnelBsdf
        )
    }

    #[inline]
    pub fn is_microfacet(self) -> bool {
        matches!(
            self,
            Self::ReflectionBsdf
                | Self::MicrofacetGgxBsdf
                | Self::MicrofacetGgxFresnelBsdf
                | Self::MicrofacetGgxClearcoatBsdf
                | Self::MicrofacetGgxConductorBsdf
                | Self::MicrofacetBeckmannBsdf
                | Self::MicrofacetMultiGgxBsdf
                | Self::MicrofacetMultiGgxFresnelBsdf
                | Self::RefractionBsdf
                | Self::MicrofacetBeckmannRefractionBsdf
                | Self::MicrofacetGgxRefractionBsdf
                | Self::MicrofacetMultiGgxGlassBsdf
                | Self::MicrofacetMultiGgxGlassFresnelBsdf
                | Self::SharpGlassBsdf
                | Self::MicrofacetBeckmannGlassBsdf
                | Self::MicrofacetGgxGlassBsdf
        )
    }

    /// Microfacet closures whose Fresnel term lives in extra data.
    #[inline]
    pub fn has_fresnel(self) -> bool {
        matches!(
            self,
            Self::MicrofacetGgxFresnelBsdf
                | Self::MicrofacetGgxClearcoatBsdf
                | Self::MicrofacetGgxConductorBsdf
                | Self::MicrofacetMultiGgxFresnelBsdf
                | Self::MicrofacetMultiGgxGlassFresnelBsdf
        )
    }

    /// Closures whose sampling or evaluation draws from the random stream.
    #[inline]
    pub fn needs_random(self) -> bool {
        self.is_multiscatter() || self.is_glass() || self == Self::HairPrincipledBsdf
    }
}

/// Model parameters of a closure. The variant is fixed by [`ClosureType`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClosureData {
    /// Emission, background, holdout and AO carry nothing beyond their weight.
    None,
    Diffuse(DiffuseBsdf),
    OrenNayar(OrenNayarBsdf),
    Toon(ToonBsdf),
    Velvet(VelvetBsdf),
    Microfacet(MicrofacetBsdf),
    Hair(HairBsdf),
    PrincipledHair(PrincipledHairBsdf),
    PrincipledDiffuse(PrincipledDiffuseBsdf),
    PrincipledSheen(PrincipledSheenBsdf),
    DiffuseRamp(DiffuseRampBsdf),
    PhongRamp(PhongRampBsdf),
    Transparent(TransparentBsdf),
}

impl ClosureData {
    pub fn as_bxdf(&self) -> Option<&dyn Bxdf> {
        match self {
            ClosureData::None => None,
            ClosureData::Diffuse(b) => Some(b),
            ClosureData::OrenNayar(b) => Some(b),
            ClosureData::Toon(b) => Some(b),
            ClosureData::Velvet(b) => Some(b),
            ClosureData::Microfacet(b) => Some(b),
            ClosureData::Hair(b) => Some(b),
            ClosureData::PrincipledHair(b) => Some(b),
            ClosureData::PrincipledDiffuse(b) => Some(b),
            ClosureData::PrincipledSheen(b) => Some(b),
            ClosureData::DiffuseRamp(b) => Some(b),
            ClosureData::PhongRamp(b) => Some(b),
            ClosureData::Transparent(b) => Some(b),
        }
    }

    pub fn as_bxdf_mut(&mut self) -> Option<&mut dyn Bxdf> {
        match self {
            ClosureData::None => None,
            ClosureData::Diffuse(b) => Some(b),
            ClosureData::OrenNayar(b) => Some(b),
            ClosureData::Toon(b) => Some(b),
            ClosureData::Velvet(b) => Some(b),
            ClosureData::Microfacet(b) => Some(b),
            ClosureData::Hair(b) => Some(b),
            ClosureData::PrincipledHair(b) => Some(b),
            ClosureData::PrincipledDiffuse(b) => Some(b),
            ClosureData::PrincipledSheen(b) => Some(b),
            ClosureData::DiffuseRamp(b) => Some(b),
            ClosureData::PhongRamp(b) => Some(b),
            ClosureData::Transparent(b) => Some(b),
        }
    }

    /// Whether this payload is the one `ty` expects.
    pub fn matches_type(&self, ty: ClosureType) -> bool {
        use ClosureType as T;
        match self {
            ClosureData::None => !ty.is_bsdf(),
            ClosureData::Diffuse(_) => matches!(ty, T::DiffuseBsdf | T::TranslucentBsdf),
            ClosureData::OrenNayar(_) => ty == T::OrenNayarBsdf,
            ClosureData::Toon(_) => matches!(ty, T::DiffuseToonBsdf | T::GlossyToonBsdf),
            ClosureData::Velvet(_) => ty == T::AshikhminVelvetBsdf,
            ClosureData::Microfacet(_) => ty.is_microfacet(),
            ClosureData::Hair(_) => {
                matches!(ty, T::HairReflectionBsdf | T::HairTransmissionBsdf)
            }
            ClosureData::PrincipledHair(_) => ty == T::HairPrincipledBsdf,
            ClosureData::PrincipledDiffuse(_) => ty == T::PrincipledDiffuseBsdf,
            ClosureData::PrincipledSheen(_) => ty == T::PrincipledSheenBsdf,
            ClosureData::DiffuseRamp(_) => ty == T::DiffuseRampBsdf,
            ClosureData::PhongRamp(_) => ty == T::PhongRampBsdf,
            ClosureData::Transparent(_) => ty == T::TransparentBsdf,
        }
    }
}

/// One allocated closure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosureRecord {
    pub ty: ClosureType,
    /// Shading normal, possibly bumped away from the shading point's own normal.
    pub n: Vec3,
    pub weight: Spectrum,
    /// Selection weight for the combiner. Finite and non-negative.
    pub sample_weight: f32,
    pub data: ClosureData,
    /// Overflow payload, for models that need more than one slot.
    pub extra: Option<ExtraHandle>,
}

impl ClosureRecord {
    pub(crate) fn new(ty: ClosureType, n: Vec3, weight: Spectrum) -> Self {
        Self {
            ty,
            n,
            weight,
            sample_weight: 0.0,
            data: ClosureData::None,
            extra: None,
        }
    }
}

/// Payloads stored in the extra-data region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtraData {
    Microfacet(MicrofacetExtra),
    Conductor(ConductorFresnel),
    PrincipledHair(PrincipledHairExtra),
    Ramp(ColorRamp),
}

impl ExtraData {
    /// Bytes the payload occupies, excluding the enum tag.
    pub fn payload_size(&self) -> usize {
        match self {
            ExtraData::Microfacet(_) => std::mem::size_of::<MicrofacetExtra>(),
            ExtraData::Conductor(_) => std::mem::size_of::<ConductorFresnel>(),
            ExtraData::PrincipledHair(_) => std::mem::size_of::<PrincipledHairExtra>(),
            ExtraData::Ramp(_) => std::mem::size_of::<ColorRamp>(),
        }
    }

    /// Number of slots the payload consumes.
    pub fn chunks(&self) -> usize {
        self.payload_size().div_ceil(CLOSURE_DATA_BYTES)
    }

    pub fn as_microfacet(&self) -> Option<&MicrofacetExtra> {
        match self {
            ExtraData::Microfacet(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_conductor(&self) -> Option<&ConductorFresnel> {
        match self {
            ExtraData::Conductor(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_principled_hair(&self) -> Option<&PrincipledHairExtra> {
        match self {
            ExtraData::PrincipledHair(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_ramp(&self) -> Option<&ColorRamp> {
        match self {
            ExtraData::Ramp(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_categories_are_consistent() {
        for ty in ClosureType::iter() {
            if ty.is_singular() || ty.is_glass() || ty.is_multiscatter() {
                assert!(ty.is_bsdf(), "{ty}");
            }
            if ty.is_glass() {
                assert!(ty.is_transmission(), "{ty}");
            }
            if ty.is_diffuse() {
                assert!(!ty.is_glossy(), "{ty}");
            }
            if ty.is_multiscatter() {
                assert!(ty.is_microfacet() && ty.needs_random(), "{ty}");
            }
        }
        assert!(!ClosureType::Emission.is_bsdf());
        assert_eq!(ClosureType::MicrofacetGgxBsdf.to_string(), "microfacet_ggx_bsdf");
    }

    #[test]
    fn test_ramp_needs_two_chunks() {
        let ramp = ExtraData::Ramp(ColorRamp([Spectrum::ONE; 8]));
        assert_eq!(ramp.payload_size(), 96);
        assert_eq!(ramp.chunks(), 2);

        let hair = ExtraData::PrincipledHair(PrincipledHairExtra::default());
        assert_eq!(hair.chunks(), 1);
    }

    #[test]
    fn test_data_matches_type() {
        assert!(ClosureData::Diffuse(DiffuseBsdf).matches_type(ClosureType::TranslucentBsdf));
        assert!(!ClosureData::Diffuse(DiffuseBsdf).matches_type(ClosureType::GlossyToonBsdf));
        assert!(ClosureData::None.matches_type(ClosureType::Holdout));
    }
}
