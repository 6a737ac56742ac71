//! Component-wise helpers for RGB spectra.

use crate::util::safe_divide;
use crate::Spectrum;

/// Arithmetic mean of the three channels.
#[inline]
pub fn average(s: Spectrum) -> f32 {
    (s.x + s.y + s.z) * (1.0 / 3.0)
}

/// Luminance of a linear Rec. 709 color.
#[inline]
pub fn luminance(c: Spectrum) -> f32 {
    0.2126 * c.x + 0.7152 * c.y + 0.0722 * c.z
}

#[inline]
pub fn is_zero(s: Spectrum) -> bool {
    s.x == 0.0 && s.y == 0.0 && s.z == 0.0
}

#[inline]
pub fn is_finite(s: Spectrum) -> bool {
    s.x.is_finite() && s.y.is_finite() && s.z.is_finite()
}

/// Per-channel `a / b`, zero where `b` is zero.
#[inline]
pub fn safe_divide_color(a: Spectrum, b: Spectrum) -> Spectrum {
    Spectrum::new(
        safe_divide(a.x, b.x),
        safe_divide(a.y, b.y),
        safe_divide(a.z, b.z),
    )
}

#[inline]
pub fn exp(s: Spectrum) -> Spectrum {
    Spectrum::new(s.x.exp(), s.y.exp(), s.z.exp())
}

#[inline]
pub fn ln(s: Spectrum) -> Spectrum {
    Spectrum::new(s.x.ln(), s.y.ln(), s.z.ln())
}

#[inline]
pub fn sqrt(s: Spectrum) -> Spectrum {
    Spectrum::new(s.x.max(0.0).sqrt(), s.y.max(0.0).sqrt(), s.z.max(0.0).sqrt())
}

/// Clamp every channel to `[0, 1]`.
#[inline]
pub fn saturate(s: Spectrum) -> Spectrum {
    s.clamp(Spectrum::ZERO, Spectrum::ONE)
}

/// Clamp every channel to be non-negative.
#[inline]
pub fn max_zero(s: Spectrum) -> Spectrum {
    s.max(Spectrum::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance() {
        assert!((luminance(Spectrum::ONE) - 1.0).abs() < 0.001);
        assert!((luminance(Spectrum::ZERO) - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_average_and_zero() {
        assert!((average(Spectrum::new(0.0, 0.3, 0.6)) - 0.3).abs() < 1e-6);
        assert!(is_zero(Spectrum::ZERO));
        assert!(!is_zero(Spectrum::new(0.0, 1e-9, 0.0)));
    }

    #[test]
    fn test_safe_divide_color() {
        let d = safe_divide_color(Spectrum::new(1.0, 2.0, 3.0), Spectrum::new(2.0, 0.0, 3.0));
        assert_eq!(d, Spectrum::new(0.5, 0.0, 1.0));
    }

    #[test]
    fn test_non_finite() {
        assert!(!is_finite(Spectrum::new(f32::NAN, 0.0, 0.0)));
        assert!(is_finite(Spectrum::ONE));
    }
}
