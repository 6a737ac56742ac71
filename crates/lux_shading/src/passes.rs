//! Render pass bookkeeping.
//!
//! Light reaching the camera through a scattering event is split into
//! diffuse, glossy and transmission passes using the category fractions of
//! the [`BsdfEval`] that produced it.

use lux_math::{spectrum, Spectrum};

use crate::bsdf::{bsdf_albedo, specular_roughness_squared};
use crate::closure::{ClosureRecord, ClosureType};
use crate::eval::BsdfEval;
use crate::shading_point::{ShaderFlags, ShadingPoint};
use crate::state::PathState;

/// Category fractions carried along a path from its first scattering event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassWeights {
    pub diffuse: Spectrum,
    /// Fraction of what is not diffuse
    pub glossy: Spectrum,
}

impl PassWeights {
    /// Split `contribution` into `(diffuse, glossy, transmission)`.
    pub fn split(&self, contribution: Spectrum) -> (Spectrum, Spectrum, Spectrum) {
        let diffuse = contribution * self.diffuse;
        let glossy = (contribution - diffuse) * self.glossy;
        let transmission = contribution - diffuse - glossy;
        (diffuse, glossy, transmission)
    }
}

impl From<&BsdfEval> for PassWeights {
    fn from(eval: &BsdfEval) -> Self {
        Self {
            diffuse: eval.pass_diffuse_weight(),
            glossy: eval.pass_glossy_weight(),
        }
    }
}

/// Per-pixel pass buffers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PassAccumulator {
    pub combined: Spectrum,
    /// Emission and background seen directly
    pub emission: Spectrum,
    pub diffuse_direct: Spectrum,
    pub diffuse_indirect: Spectrum,
    pub glossy_direct: Spectrum,
    pub glossy_indirect: Spectrum,
    pub transmission_direct: Spectrum,
    pub transmission_indirect: Spectrum,
}

impl PassAccumulator {
    /// Light hit by a camera ray before any scattering.
    pub fn add_emission(&mut self, contribution: Spectrum) {
        self.combined += contribution;
        self.emission += contribution;
    }

    /// Light that arrived after scattering.
    ///
    /// `state` is the path state at the point the light was found; bounce
    /// zero means the light was sampled directly from the first surface.
    pub fn add_scattered(&mut self, state: &PathState, weights: &PassWeights, contribution: Spectrum) {
        self.combined += contribution;
        let (diffuse, glossy, transmission) = weights.split(contribution);
        if state.bounce == 0 {
            self.diffuse_direct += diffuse;
            self.glossy_direct += glossy;
            self.transmission_direct += transmission;
        } else {
            self.diffuse_indirect += diffuse;
            self.glossy_indirect += glossy;
            self.transmission_indirect += transmission;
        }
    }

    pub fn merge(&mut self, other: &PassAccumulator) {
        self.combined += other.combined;
        self.emission += other.emission;
        self.diffuse_direct += other.diffuse_direct;
        self.diffuse_indirect += other.diffuse_indirect;
        self.glossy_direct += other.glossy_direct;
        self.glossy_indirect += other.glossy_indirect;
        self.transmission_direct += other.transmission_direct;
        self.transmission_indirect += other.transmission_indirect;
    }

    pub fn scaled(&self, s: f32) -> PassAccumulator {
        PassAccumulator {
            combined: self.combined * s,
            emission: self.emission * s,
            diffuse_direct: self.diffuse_direct * s,
            diffuse_indirect: self.diffuse_indirect * s,
            glossy_direct: self.glossy_direct * s,
            glossy_indirect: self.glossy_indirect * s,
            transmission_direct: self.transmission_direct * s,
            transmission_indirect: self.transmission_indirect * s,
        }
    }
}

fn is_transmission_pass(ty: ClosureType) -> bool {
    ty.is_transmission() && !ty.is_diffuse() && !ty.is_glossy() && ty != ClosureType::TransparentBsdf
}

fn sum_albedo(sd: &ShadingPoint, mut select: impl FnMut(&ClosureRecord) -> bool) -> Spectrum {
    sd.arena
        .closures()
        .filter(|(_, sc)| sc.ty.is_bsdf() && select(sc))
        .map(|(_, sc)| bsdf_albedo(sd, sc))
        .fold(Spectrum::ZERO, |acc, a| acc + a)
}

pub fn diffuse_color(sd: &ShadingPoint) -> Spectrum {
    sum_albedo(sd, |sc| sc.ty.is_diffuse())
}

pub fn glossy_color(sd: &ShadingPoint) -> Spectrum {
    sum_albedo(sd, |sc| sc.ty.is_glossy())
}

pub fn transmission_color(sd: &ShadingPoint) -> Spectrum {
    sum_albedo(sd, |sc| is_transmission_pass(sc.ty))
}

/// Albedo feature for the denoiser: every scattering closure except pass-through transparency.
pub fn denoising_albedo(sd: &ShadingPoint) -> Spectrum {
    sum_albedo(sd, |sc| sc.ty != ClosureType::TransparentBsdf)
}

/// Weighted average roughness of the BSDFs, in linear roughness units.
pub fn average_roughness(sd: &ShadingPoint) -> f32 {
    let mut roughness = 0.0;
    let mut sum_weight = 0.0;
    for (_, sc) in sd.arena.closures() {
        if !sc.ty.is_bsdf() {
            continue;
        }
        let weight = spectrum::average(sc.weight).abs();
        roughness += weight * specular_roughness_squared(sc);
        sum_weight += weight;
    }
    if sum_weight > 0.0 {
        (roughness / sum_weight).sqrt().sqrt()
    } else {
        0.0
    }
}

/// Fraction of light that passes straight through the surface.
pub fn transparency(sd: &ShadingPoint) -> Spectrum {
    if sd.flags.contains(ShaderFlags::TRANSPARENT) {
        spectrum::saturate(sd.closure_transparent_extinction)
    } else {
        Spectrum::ZERO
    }
}

/// Coverage written to the alpha channel.
pub fn alpha(sd: &ShadingPoint) -> f32 {
    (1.0 - spectrum::average(transparency(sd))).clamp(0.0, 1.0)
}
