//! Material presets exercised by the checks.

use glam::Vec3;
use lux_shading::bsdf::fresnel::ConductorFresnel;
use lux_shading::bsdf::hair::HairBsdf;
use lux_shading::bsdf::microfacet::MicrofacetBsdf;
use lux_shading::bsdf::principled_hair::PrincipledHairBsdf;
use lux_shading::closure::builder;
use lux_shading::{ClosureType, KernelConfig, PrincipledSurface, ShadingPoint, Spectrum};
use strum::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Preset {
    Diffuse,
    OrenNayar,
    Ggx,
    Beckmann,
    MultiGgx,
    GgxGlass,
    MultiGgxGlass,
    Gold,
    Velvet,
    Sheen,
    DiffuseToon,
    GlossyToon,
    HairReflection,
    PrincipledHair,
    Principled,
}

impl Preset {
    /// White presets that must reflect no more than they receive.
    pub fn conserves_energy(self) -> bool {
        matches!(
            self,
            Preset::Diffuse
                | Preset::OrenNayar
                | Preset::Ggx
                | Preset::Beckmann
                | Preset::MultiGgx
                | Preset::GgxGlass
                | Preset::MultiGgxGlass
                | Preset::Gold
                | Preset::PrincipledHair
        )
    }

    /// Shading point with this preset's closures, lit from `wi`.
    pub fn build(self, config: &KernelConfig, wi: Vec3) -> ShadingPoint {
        let n = Vec3::Z;
        let mut sd = ShadingPoint::with_config(config, n, n, wi).with_tangent(Vec3::X);
        let one = Spectrum::ONE;

        let added = match self {
            Preset::Diffuse => builder::add_diffuse(&mut sd, n, one).is_some(),
            Preset::OrenNayar => builder::add_oren_nayar(&mut sd, n, one, 0.5).is_some(),
            Preset::Ggx => builder::add_microfacet(
                &mut sd,
                ClosureType::MicrofacetGgxBsdf,
                n,
                one,
                MicrofacetBsdf::new(0.2, 0.4, 1.5).with_tangent(Vec3::X),
            )
            .is_some(),
            Preset::Beckmann => builder::add_microfacet(
                &mut sd,
                ClosureType::MicrofacetBeckmannBsdf,
                n,
                one,
                MicrofacetBsdf::isotropic(0.3, 1.5),
            )
            .is_some(),
            Preset::MultiGgx => builder::add_microfacet(
                &mut sd,
                ClosureType::MicrofacetMultiGgxBsdf,
                n,
                one,
                MicrofacetBsdf::isotropic(0.7, 1.5),
            )
            .is_some(),
            Preset::GgxGlass => builder::add_microfacet(
                &mut sd,
                ClosureType::MicrofacetGgxGlassBsdf,
                n,
                one,
                MicrofacetBsdf::isotropic(0.25, 1.5),
            )
            .is_some(),
            Preset::MultiGgxGlass => builder::add_microfacet(
                &mut sd,
                ClosureType::MicrofacetMultiGgxGlassBsdf,
                n,
                one,
                MicrofacetBsdf::isotropic(0.5, 1.5),
            )
            .is_some(),
            Preset::Gold => builder::add_microfacet_conductor(
                &mut sd,
                n,
                one,
                MicrofacetBsdf::isotropic(0.3, 1.0),
                ConductorFresnel {
                    eta: Spectrum::new(0.18, 0.42, 1.37),
                    k: Spectrum::new(3.42, 2.35, 1.77),
                },
            )
            .is_some(),
            Preset::Velvet => builder::add_velvet(&mut sd, n, one, 0.5).is_some(),
            Preset::Sheen => builder::add_principled_sheen(&mut sd, n, one).is_some(),
            Preset::DiffuseToon => {
                builder::add_toon(&mut sd, ClosureType::DiffuseToonBsdf, n, one, 0.5, 0.1).is_some()
            }
            Preset::GlossyToon => {
                builder::add_toon(&mut sd, ClosureType::GlossyToonBsdf, n, one, 0.5, 0.1).is_some()
            }
            Preset::HairReflection => builder::add_hair(
                &mut sd,
                ClosureType::HairReflectionBsdf,
                n,
                one,
                HairBsdf::new(0.3, 0.3, 0.05, Vec3::X),
            )
            .is_some(),
            Preset::PrincipledHair => builder::add_principled_hair(
                &mut sd,
                n,
                one,
                PrincipledHairBsdf::new(Spectrum::new(0.2, 0.4, 0.8), 0.3, 0.3, 0.035, 1.55, 1.0),
            )
            .is_some(),
            Preset::Principled => PrincipledSurface::default().build(&mut sd, n, Vec3::X, one) > 0,
        };

        if !added {
            log::warn!("{self}: no closure was added for wi = {wi}");
        }
        sd
    }
}
