//! Accumulated BSDF evaluation, split by category for render passes.

use lux_math::{safe_divide, Spectrum};
use std::ops::{AddAssign, MulAssign};

use crate::closure::ClosureType;

/// Sum of closure evaluations toward one direction.
///
/// `sum` holds everything; `diffuse` and `glossy` hold the parts from those
/// categories so passes can be separated afterward. Transmission is what
/// `sum` has beyond the two.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BsdfEval {
    pub diffuse: Spectrum,
    pub glossy: Spectrum,
    pub sum: Spectrum,
}

impl BsdfEval {
    pub const ZERO: BsdfEval = BsdfEval {
        diffuse: Spectrum::ZERO,
        glossy: Spectrum::ZERO,
        sum: Spectrum::ZERO,
    };

    /// Evaluation holding a single closure's value.
    pub fn new(ty: ClosureType, value: Spectrum) -> Self {
        let mut eval = Self::ZERO;
        eval.accum(ty, value);
        eval
    }

    pub fn accum(&mut self, ty: ClosureType, value: Spectrum) {
        if ty.is_diffuse() {
            self.diffuse += value;
        } else if ty.is_glossy() {
            self.glossy += value;
        }
        self.sum += value;
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.sum == Spectrum::ZERO
    }

    /// Transmission part, whatever is neither diffuse nor glossy.
    pub fn transmission(&self) -> Spectrum {
        (self.sum - self.diffuse - self.glossy).max(Spectrum::ZERO)
    }

    /// Fraction of the total that went to the diffuse pass.
    pub fn pass_diffuse_weight(&self) -> Spectrum {
        let sum = self.sum.element_sum();
        let diffuse = self.diffuse.element_sum();
        Spectrum::splat(safe_divide(diffuse, sum))
    }

    /// Fraction of the non-diffuse remainder that went to the glossy pass.
    pub fn pass_glossy_weight(&self) -> Spectrum {
        let sum = self.sum.element_sum();
        let diffuse = self.diffuse.element_sum();
        let glossy = self.glossy.element_sum();
        Spectrum::splat(safe_divide(glossy, sum - diffuse))
    }
}

impl MulAssign<Spectrum> for BsdfEval {
    fn mul_assign(&mut self, rhs: Spectrum) {
        self.diffuse *= rhs;
        self.glossy *= rhs;
        self.sum *= rhs;
    }
}

impl MulAssign<f32> for BsdfEval {
    fn mul_assign(&mut self, rhs: f32) {
        self.diffuse *= rhs;
        self.glossy *= rhs;
        self.sum *= rhs;
    }
}

impl AddAssign for BsdfEval {
    fn add_assign(&mut self, rhs: Self) {
        self.diffuse += rhs.diffuse;
        self.glossy += rhs.glossy;
        self.sum += rhs.sum;
    }
}
