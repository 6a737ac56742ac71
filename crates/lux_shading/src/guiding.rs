//! Surface path guiding.
//!
//! A learned incident-radiance distribution is mixed with BSDF sampling,
//! either by resampling one of two candidates (RIS) or by choosing one of
//! the two strategies at random and blending their pdfs. The distribution
//! itself is trained elsewhere and reached through
//! [`IncidentRadianceField`].

use glam::{Vec2, Vec3};
use lux_math::sampling::{sample_uniform_sphere, spherical_direction};
use lux_math::{safe_sqrt, spectrum, Frame};
use rand::RngCore;
use std::f32::consts::{FRAC_1_PI, TAU};

use crate::bsdf::{bsdf_label, bsdf_roughness_eta};
use crate::closure::{ClosureHandle, ClosureType};
use crate::config::{GuidingSamplingType, KernelConfig};
use crate::eval::BsdfEval;
use crate::label::{ExcludeFlags, Label};
use crate::shading_point::ShadingPoint;
use crate::surface::{eval_all, eval_all_pick, sample_surface};

const INV_FOUR_PI: f32 = 0.25 * FRAC_1_PI;

/// Learned directional distribution of light arriving at a point.
pub trait IncidentRadianceField {
    /// Look up the distribution for a shading point. `false` when nothing
    /// has been learned there.
    fn init(&mut self, p: Vec3, n: Vec3, rand: f32) -> bool;

    /// Direction toward incoming light and its pdf.
    fn sample(&self, u: Vec2) -> (Vec3, f32);

    fn pdf(&self, wo: Vec3) -> f32;

    /// Density of the incident radiance itself, without any product with the BSDF.
    fn incoming_radiance_pdf(&self, wo: Vec3) -> f32;
}

/// Single von Mises-Fisher lobe, optionally restricted to a spherical region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VmfLobeField {
    pub mean: Vec3,
    /// Concentration; zero is uniform over the sphere
    pub kappa: f32,
    /// Centre and radius of the region the lobe was learned for
    pub region: Option<(Vec3, f32)>,
    frame: Frame,
}

impl VmfLobeField {
    pub fn new(mean: Vec3, kappa: f32) -> Self {
        let mean = mean.normalize_or_zero();
        Self {
            mean,
            kappa: kappa.max(0.0),
            region: None,
            frame: Frame::from_normal(mean),
        }
    }

    pub fn with_region(mut self, center: Vec3, radius: f32) -> Self {
        self.region = Some((center, radius));
        self
    }

    fn is_uniform(&self) -> bool {
        self.kappa < 1e-4
    }

    fn normalization(&self) -> f32 {
        let k = self.kappa;
        k / (TAU * (1.0 - (-2.0 * k).exp()))
    }
}

impl IncidentRadianceField for VmfLobeField {
    fn init(&mut self, p: Vec3, _n: Vec3, _rand: f32) -> bool {
        if self.mean == Vec3::ZERO {
            return false;
        }
        match self.region {
            Some((center, radius)) => p.distance_squared(center) <= radius * radius,
            None => true,
        }
    }

    fn sample(&self, u: Vec2) -> (Vec3, f32) {
        if self.is_uniform() {
            return (sample_uniform_sphere(u), INV_FOUR_PI);
        }
        let k = self.kappa;
        let cos_theta = (1.0 + (u.x + (1.0 - u.x) * (-2.0 * k).exp()).ln() / k).clamp(-1.0, 1.0);
        let sin_theta = safe_sqrt(1.0 - cos_theta * cos_theta);
        let wo = self
            .frame
            .to_world(spherical_direction(sin_theta, cos_theta, TAU * u.y));
        (wo, self.pdf(wo))
    }

    fn pdf(&self, wo: Vec3) -> f32 {
        if self.is_uniform() {
            return INV_FOUR_PI;
        }
        self.normalization() * (self.kappa * (self.mean.dot(wo) - 1.0)).exp()
    }

    fn incoming_radiance_pdf(&self, wo: Vec3) -> f32 {
        self.pdf(wo)
    }
}

/// Guiding decision for one shading point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidingState {
    pub use_surface_guiding: bool,
    /// Probability of the guided strategy
    pub sampling_prob: f32,
    pub sampling_type: GuidingSamplingType,
    /// Random number reserved for the strategy or candidate choice
    pub rand: f32,
}

impl GuidingState {
    pub fn disabled() -> Self {
        Self {
            use_surface_guiding: false,
            sampling_prob: 0.0,
            sampling_type: GuidingSamplingType::Ris,
            rand: 0.0,
        }
    }

    /// Decide whether to guide at `sd` and with what probability.
    ///
    /// Guiding is used only when enabled, the point can be evaluated, no
    /// closure transmits and part of the sample weight is diffuse; the
    /// configured probability is scaled by that diffuse fraction.
    pub fn prepare<F: IncidentRadianceField + ?Sized>(
        config: &KernelConfig,
        sd: &ShadingPoint,
        field: &mut F,
        rand: f32,
    ) -> Self {
        let guiding = &config.guiding;
        if !guiding.use_surface_guiding || !sd.has_bsdf_eval() {
            return Self::disabled();
        }

        let mut sum = 0.0;
        let mut diffuse = 0.0;
        let mut opaque = true;
        for (_, sc) in sd.arena.closures() {
            sum += sc.sample_weight;
            if sc.ty.is_diffuse() && sc.ty != ClosureType::TranslucentBsdf {
                diffuse += sc.sample_weight;
            }
            if sc.ty.is_transmission() {
                opaque = false;
            }
        }
        let diffuse_fraction = if sum > 0.0 { diffuse / sum } else { 0.0 };

        if !opaque || !(diffuse_fraction > 0.0) || !field.init(sd.p, sd.n, rand) {
            return Self::disabled();
        }

        Self {
            use_surface_guiding: true,
            sampling_prob: guiding.surface_guiding_probability * diffuse_fraction,
            sampling_type: guiding.sampling_type,
            rand,
        }
    }
}

/// Direction chosen by the guided sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidedSample {
    pub wo: Vec3,
    pub eval: BsdfEval,
    /// Mixture pdf of the closures alone
    pub bsdf_pdf: f32,
    /// Pdf the throughput is divided by
    pub guided_pdf: f32,
    /// Pdf to weigh against light sampling
    pub mis_pdf: f32,
    pub label: Label,
    pub roughness: Vec2,
    pub eta: f32,
}

impl GuidedSample {
    #[inline]
    pub fn throughput(&self) -> lux_math::Spectrum {
        self.eval.sum / self.guided_pdf
    }
}

fn attributed(
    config: &KernelConfig,
    sd: &ShadingPoint,
    closure: Option<ClosureHandle>,
    wo: Vec3,
) -> (Label, Vec2, f32) {
    match closure.and_then(|h| sd.arena.closure(h)) {
        Some(sc) => {
            let (roughness, eta) = bsdf_roughness_eta(sc);
            (bsdf_label(config, sc, wo), roughness, eta)
        }
        None => (Label::NONE, Vec2::ONE, 1.0),
    }
}

/// Sample the shading point, guided when `guiding` says so.
pub fn guided_sample<F: IncidentRadianceField + ?Sized>(
    config: &KernelConfig,
    sd: &ShadingPoint,
    guiding: &GuidingState,
    field: &F,
    u: Vec2,
    rng: &mut dyn RngCore,
) -> Option<GuidedSample> {
    if !guiding.use_surface_guiding {
        let s = sample_surface(config, sd, u, rng)?;
        return Some(GuidedSample {
            wo: s.wo,
            eval: s.eval,
            bsdf_pdf: s.pdf,
            guided_pdf: s.pdf,
            mis_pdf: s.pdf,
            label: s.label,
            roughness: s.roughness,
            eta: s.eta,
        });
    }
    match guiding.sampling_type {
        GuidingSamplingType::Ris => guided_sample_ris(config, sd, guiding, field, u, rng),
        GuidingSamplingType::OneSample => guided_sample_one_sample(config, sd, guiding, field, u, rng),
    }
}

#[derive(Debug, Clone, Copy)]
struct RisCandidate {
    wo: Vec3,
    eval: BsdfEval,
    bsdf_pdf: f32,
    guide_pdf: f32,
    target: f32,
    weight: f32,
    label: Label,
    roughness: Vec2,
    eta: f32,
}

impl RisCandidate {
    /// Target is the average BSDF value times a blend of a uniform
    /// hemisphere and the incident radiance.
    fn resample_weight(&mut self, g: f32, incoming_radiance_pdf: f32) {
        let avg = spectrum::average(self.eval.sum);
        let ris_pdf = 0.5 * (self.bsdf_pdf + self.guide_pdf);
        if avg > 0.0 && self.bsdf_pdf > 1e-10 && ris_pdf > 0.0 {
            self.target = avg * ((1.0 - g) * (0.5 * FRAC_1_PI) + g * incoming_radiance_pdf);
            self.weight = self.target / ris_pdf;
        } else {
            self.target = 0.0;
            self.weight = 0.0;
        }
    }
}

/// Resample between one BSDF and one guided candidate.
///
/// The returned `guided_pdf` is the chosen candidate's target divided by the
/// mean resampling weight, which keeps `eval / guided_pdf` unbiased.
pub fn guided_sample_ris<F: IncidentRadianceField + ?Sized>(
    config: &KernelConfig,
    sd: &ShadingPoint,
    guiding: &GuidingState,
    field: &F,
    u: Vec2,
    rng: &mut dyn RngCore,
) -> Option<GuidedSample> {
    let g = guiding.sampling_prob;
    let mut candidates = Vec::with_capacity(2);

    if let Some(s) = sample_surface(config, sd, u, rng) {
        let mut c = RisCandidate {
            wo: s.wo,
            eval: s.eval,
            bsdf_pdf: s.pdf,
            guide_pdf: field.pdf(s.wo),
            target: 0.0,
            weight: 0.0,
            label: s.label,
            roughness: s.roughness,
            eta: s.eta,
        };
        c.resample_weight(g, field.incoming_radiance_pdf(s.wo));
        candidates.push(c);
    }

    let (wo, guide_pdf) = field.sample(u);
    if guide_pdf > 0.0 {
        let (eval, bsdf_pdf, closure) = eval_all_pick(sd, wo, rng);
        let (label, roughness, eta) = attributed(config, sd, closure, wo);
        let mut c = RisCandidate {
            wo,
            eval,
            bsdf_pdf,
            guide_pdf,
            target: 0.0,
            weight: 0.0,
            label,
            roughness,
            eta,
        };
        c.resample_weight(g, field.incoming_radiance_pdf(wo));
        candidates.push(c);
    }

    let sum_weights: f32 = candidates.iter().map(|c| c.weight).sum();
    if !(sum_weights > 1e-10) {
        return None;
    }

    let r = guiding.rand * sum_weights;
    let mut partial = 0.0;
    let mut chosen = None;
    for c in &candidates {
        if !(c.weight > 0.0) {
            continue;
        }
        partial += c.weight;
        chosen = Some(c);
        if r < partial {
            break;
        }
    }
    let c = chosen?;

    // Mean over both candidate slots, a failed draw counts as zero weight.
    let mean_weight = sum_weights * 0.5;
    Some(GuidedSample {
        wo: c.wo,
        eval: c.eval,
        bsdf_pdf: c.bsdf_pdf,
        guided_pdf: c.target / mean_weight,
        mis_pdf: 0.5 * (c.bsdf_pdf + c.guide_pdf),
        label: c.label,
        roughness: c.roughness,
        eta: c.eta,
    })
}

/// Follow the guide with probability `sampling_prob`, otherwise the BSDF.
pub fn guided_sample_one_sample<F: IncidentRadianceField + ?Sized>(
    config: &KernelConfig,
    sd: &ShadingPoint,
    guiding: &GuidingState,
    field: &F,
    u: Vec2,
    rng: &mut dyn RngCore,
) -> Option<GuidedSample> {
    let g = guiding.sampling_prob;

    if guiding.rand < g {
        let (wo, guide_pdf) = field.sample(u);
        if !(guide_pdf > 0.0) {
            return None;
        }
        let (eval, bsdf_pdf, closure) = eval_all_pick(sd, wo, rng);
        if eval.is_zero() {
            return None;
        }
        let (label, roughness, eta) = attributed(config, sd, closure, wo);
        let guided_pdf = g * guide_pdf + (1.0 - g) * bsdf_pdf;
        return Some(GuidedSample {
            wo,
            eval,
            bsdf_pdf,
            guided_pdf,
            mis_pdf: guided_pdf,
            label,
            roughness,
            eta,
        });
    }

    let s = sample_surface(config, sd, u, rng)?;
    let guided_pdf = (1.0 - g) * s.pdf + g * field.pdf(s.wo);
    Some(GuidedSample {
        wo: s.wo,
        eval: s.eval,
        bsdf_pdf: s.pdf,
        guided_pdf,
        mis_pdf: guided_pdf,
        label: s.label,
        roughness: s.roughness,
        eta: s.eta,
    })
}

/// [`eval_all`] with the pdf of the guided sampler in place of the BSDF mixture pdf.
pub fn guided_eval<F: IncidentRadianceField + ?Sized>(
    sd: &ShadingPoint,
    guiding: &GuidingState,
    field: &F,
    wo: Vec3,
    exclude: ExcludeFlags,
    rng: &mut dyn RngCore,
) -> (BsdfEval, f32) {
    let (eval, pdf) = eval_all(sd, wo, exclude, rng);
    if !guiding.use_surface_guiding {
        return (eval, pdf);
    }
    let guide_pdf = field.pdf(wo);
    let pdf = match guiding.sampling_type {
        GuidingSamplingType::Ris => 0.5 * (guide_pdf + pdf),
        GuidingSamplingType::OneSample => {
            let g = guiding.sampling_prob;
            g * guide_pdf + (1.0 - g) * pdf
        }
    };
    (eval, pdf)
}
