//! Scattering models and the dispatch layer that routes closures to them.
//!
//! Every model implements [`Bxdf`]. The free functions at the bottom of this
//! module are the only entry points the combiner uses: they look up the
//! closure's payload, call into the model, then apply the post-processing
//! shared by all models (shadow-terminator softening, bump shadowing and
//! transparent reclassification).

pub mod diffuse;
pub mod fresnel;
pub mod hair;
pub mod microfacet;
pub mod microfacet_multi;
pub mod oren_nayar;
pub mod principled_diffuse;
pub mod principled_hair;
pub mod principled_sheen;
pub mod ramp;
pub mod toon;
pub mod transparent;
pub mod velvet;

use glam::{Vec2, Vec3};
use lux_math::{safe_acos, safe_divide, Spectrum};
use rand::RngCore;

use crate::closure::{ClosureRecord, ClosureType, ExtraData};
use crate::config::KernelConfig;
use crate::label::Label;
use crate::shading_point::ShadingPoint;

/// Pdf and value used to represent a delta lobe.
pub const SINGULAR_PDF: f32 = 1e6;

/// Geometry a model sees when sampling or evaluating.
#[derive(Debug, Clone, Copy)]
pub struct ScatterContext<'a> {
    pub ty: ClosureType,
    /// Closure normal
    pub n: Vec3,
    /// Geometric normal of the shading point
    pub ng: Vec3,
    /// Direction toward the viewer
    pub wi: Vec3,
    pub extra: Option<&'a ExtraData>,
}

impl<'a> ScatterContext<'a> {
    pub fn new(ty: ClosureType, n: Vec3, ng: Vec3, wi: Vec3) -> Self {
        Self {
            ty,
            n,
            ng,
            wi,
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: Option<&'a ExtraData>) -> Self {
        self.extra = extra;
        self
    }
}

/// A sampled scattering direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BsdfSample {
    pub wo: Vec3,
    /// BSDF value times the cosine term; the throughput factor is `eval / pdf`.
    pub eval: Spectrum,
    pub pdf: f32,
    pub label: Label,
    pub roughness: Vec2,
    pub eta: f32,
}

impl BsdfSample {
    pub fn new(wo: Vec3, eval: Spectrum, pdf: f32, label: Label) -> Self {
        Self {
            wo,
            eval,
            pdf,
            label,
            roughness: Vec2::ONE,
            eta: 1.0,
        }
    }

    /// Delta lobe toward `wo` scaled by `color`.
    pub fn singular(wo: Vec3, color: Spectrum, label: Label) -> Self {
        Self::new(wo, color * SINGULAR_PDF, SINGULAR_PDF, label | Label::SINGULAR)
    }

    #[inline]
    pub fn weight(&self) -> Spectrum {
        self.eval / self.pdf
    }
}

/// Interface shared by every scattering model.
///
/// `eval` returns the BSDF value multiplied by `|cos(n, wo)|` together with
/// the solid-angle pdf that `sample` would produce for `wo`.
pub trait Bxdf {
    fn eval(&self, ctx: &ScatterContext<'_>, wo: Vec3, rng: &mut dyn RngCore) -> (Spectrum, f32);

    fn sample(
        &self,
        ctx: &ScatterContext<'_>,
        u: Vec2,
        rng: &mut dyn RngCore,
    ) -> Option<BsdfSample>;

    /// Raise roughness to at least `roughness`.
    fn blur(&mut self, _roughness: f32) {}

    /// Energy-loss factor that the closure weight does not already include.
    fn albedo(&self, _ctx: &ScatterContext<'_>) -> Spectrum {
        Spectrum::ONE
    }

    fn roughness_eta(&self) -> (Vec2, f32) {
        (Vec2::ONE, 1.0)
    }
}

pub(crate) fn scatter_context<'a>(sd: &'a ShadingPoint, sc: &ClosureRecord) -> ScatterContext<'a> {
    debug_assert!(sc.data.matches_type(sc.ty), "payload does not match {}", sc.ty);
    ScatterContext::new(sc.ty, sc.n, sd.ng, sd.wi)
        .with_extra(sc.extra.and_then(|h| sd.arena.extra(h)))
}

/// Attenuation for bump-mapped diffuse closures near the shadow terminator.
///
/// Smooth falloff of the ratio between geometric and shading cosines.
pub fn bump_shadowing_term(ng: Vec3, n: Vec3, wo: Vec3) -> f32 {
    let g = safe_divide(ng.dot(wo), n.dot(wo) * ng.dot(n));
    if g >= 1.0 {
        return 1.0;
    }
    if !(g >= 0.0) {
        return 0.0;
    }
    let g2 = g * g;
    -g2 * g + g2 + g
}

/// Shadow-terminator softening of the cosine term.
pub fn shift_cos_in(cos_in: f32, frequency_multiplier: f32) -> f32 {
    let cos_in = cos_in.min(1.0);
    if cos_in <= 0.0 {
        return 0.0;
    }
    let angle = safe_acos(cos_in);
    (angle * frequency_multiplier).cos().max(0.0) / cos_in
}

/// `alpha_x * alpha_y` for microfacet closures, zero for delta closures and one otherwise.
pub fn specular_roughness_squared(sc: &ClosureRecord) -> f32 {
    if sc.ty.is_singular() {
        return 0.0;
    }
    if sc.ty.is_microfacet() {
        let (roughness, _) = bsdf_roughness_eta(sc);
        return roughness.x * roughness.y;
    }
    1.0
}

fn transparent_reclassify(config: &KernelConfig, sc: &ClosureRecord, label: Label) -> Label {
    if !label.contains(Label::TRANSMIT) || label.contains(Label::DIFFUSE) {
        return label;
    }
    let threshold = config.transparent_roughness_squared_threshold();
    if threshold >= 0.0 && specular_roughness_squared(sc) <= threshold {
        label | Label::TRANSMIT_TRANSPARENT
    } else {
        label
    }
}

/// Post-processing for reflected light: terminator softening, then bump shadowing.
fn reflection_factor(sd: &ShadingPoint, sc: &ClosureRecord, wo: Vec3) -> f32 {
    let mut factor = 1.0;
    let frequency_multiplier = sd.object.shadow_terminator_shading_offset;
    if frequency_multiplier > 1.0 {
        factor *= shift_cos_in(wo.dot(sc.n), frequency_multiplier);
    }
    if sc.ty.is_diffuse() && sc.n != sd.n {
        factor *= bump_shadowing_term(sd.ng, sc.n, wo);
    }
    factor
}

/// Sample an outgoing direction from one closure.
///
/// Returns `None` when the model has no valid direction, including any
/// result with a non-positive pdf or a zero-length direction.
pub fn bsdf_sample(
    config: &KernelConfig,
    sd: &ShadingPoint,
    sc: &ClosureRecord,
    u: Vec2,
    rng: &mut dyn RngCore,
) -> Option<BsdfSample> {
    let bxdf = sc.data.as_bxdf()?;
    let ctx = scatter_context(sd, sc);
    let mut sample = bxdf.sample(&ctx, u, rng)?;

    if !(sample.pdf > 0.0) || !sample.pdf.is_finite() || !(sample.wo.length_squared() > 0.0) {
        return None;
    }
    debug_assert!(
        lux_math::spectrum::is_finite(sample.eval),
        "{} produced non-finite eval",
        sc.ty
    );

    if sample.label.contains(Label::TRANSMIT) {
        sample.label = transparent_reclassify(config, sc, sample.label);
    } else {
        sample.eval *= reflection_factor(sd, sc, sample.wo);
    }

    let (roughness, eta) = bxdf.roughness_eta();
    sample.roughness = roughness;
    sample.eta = eta;
    Some(sample)
}

/// Evaluate one closure toward `wo`, returning `(f * cos, pdf)`.
///
/// The closure weight is not applied.
pub fn bsdf_eval(
    sd: &ShadingPoint,
    sc: &ClosureRecord,
    wo: Vec3,
    rng: &mut dyn RngCore,
) -> (Spectrum, f32) {
    let Some(bxdf) = sc.data.as_bxdf() else {
        return (Spectrum::ZERO, 0.0);
    };
    if sc.ty.is_singular() {
        return (Spectrum::ZERO, 0.0);
    }

    let ctx = scatter_context(sd, sc);
    let (mut eval, pdf) = bxdf.eval(&ctx, wo, rng);
    if !(pdf > 0.0) {
        return (Spectrum::ZERO, 0.0);
    }

    let is_transmission = sd.ng.dot(wo) < 0.0;
    if !is_transmission {
        eval *= reflection_factor(sd, sc, wo);
    }
    debug_assert!(pdf.is_finite() && eval.min_element() >= 0.0);
    (eval, pdf)
}

/// Label of the event that scattering toward `wo` would be.
pub fn bsdf_label(config: &KernelConfig, sc: &ClosureRecord, wo: Vec3) -> Label {
    use ClosureType as T;

    let above = sc.n.dot(wo) > 0.0;
    let side = if above { Label::REFLECT } else { Label::TRANSMIT };
    let label = match sc.ty {
        T::TransparentBsdf => Label::TRANSMIT | Label::TRANSPARENT,
        T::TranslucentBsdf => Label::TRANSMIT | Label::DIFFUSE,
        T::ReflectionBsdf => Label::REFLECT | Label::SINGULAR,
        T::RefractionBsdf => Label::TRANSMIT | Label::SINGULAR,
        T::SharpGlassBsdf => side | Label::SINGULAR,
        T::HairTransmissionBsdf => Label::TRANSMIT | Label::GLOSSY,
        T::MicrofacetBeckmannRefractionBsdf | T::MicrofacetGgxRefractionBsdf => {
            Label::TRANSMIT | Label::GLOSSY
        }
        T::HairPrincipledBsdf => side | Label::GLOSSY,
        ty if ty.is_glass() => side | Label::GLOSSY,
        ty if ty.is_diffuse() => Label::REFLECT | Label::DIFFUSE,
        ty if ty.is_glossy() => Label::REFLECT | Label::GLOSSY,
        _ => Label::NONE,
    };

    if label.contains(Label::TRANSMIT) {
        transparent_reclassify(config, sc, label)
    } else {
        label
    }
}

/// Raise the closure's roughness to at least `roughness`. Delta closures are left alone.
pub fn bsdf_blur(sc: &mut ClosureRecord, roughness: f32) {
    if sc.ty.is_singular() {
        return;
    }
    if let Some(bxdf) = sc.data.as_bxdf_mut() {
        bxdf.blur(roughness);
    }
}

/// Closure weight times the energy factor the model applies internally.
pub fn bsdf_albedo(sd: &ShadingPoint, sc: &ClosureRecord) -> Spectrum {
    match sc.data.as_bxdf() {
        Some(bxdf) => sc.weight * bxdf.albedo(&scatter_context(sd, sc)),
        None => sc.weight,
    }
}

/// Roughness pair and relative index of refraction of a closure.
pub fn bsdf_roughness_eta(sc: &ClosureRecord) -> (Vec2, f32) {
    sc.data
        .as_bxdf()
        .map(|bxdf| bxdf.roughness_eta())
        .unwrap_or((Vec2::ONE, 1.0))
}
