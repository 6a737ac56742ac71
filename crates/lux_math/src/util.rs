//! Scalar helpers that never produce NaN for out-of-domain input.
//!
//! Closure code near grazing angles routinely feeds values a hair outside
//! `[-1, 1]` into inverse trig, or negative rounding noise into `sqrt`.

use std::f32::consts::PI;

/// `x * x`
#[inline]
pub fn sqr(x: f32) -> f32 {
    x * x
}

/// `x^5`, the Schlick Fresnel falloff exponent.
#[inline]
pub fn pow5(x: f32) -> f32 {
    let x2 = x * x;
    x2 * x2 * x
}

/// `x^20`
#[inline]
pub fn pow20(x: f32) -> f32 {
    let x4 = sqr(sqr(x));
    sqr(sqr(x4)) * x4
}

/// `x^22`
#[inline]
pub fn pow22(x: f32) -> f32 {
    pow20(x) * x * x
}

/// Clamp to `[0, 1]`.
#[inline]
pub fn saturate(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

/// Linear interpolation.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

#[inline]
pub fn safe_sqrt(x: f32) -> f32 {
    x.max(0.0).sqrt()
}

#[inline]
pub fn safe_acos(x: f32) -> f32 {
    x.clamp(-1.0, 1.0).acos()
}

#[inline]
pub fn safe_asin(x: f32) -> f32 {
    x.clamp(-1.0, 1.0).asin()
}

/// `a / b`, or zero when `b` is zero.
#[inline]
pub fn safe_divide(a: f32, b: f32) -> f32 {
    if b != 0.0 {
        a / b
    } else {
        0.0
    }
}

#[inline]
pub fn sin_from_cos(c: f32) -> f32 {
    safe_sqrt(1.0 - c * c)
}

#[inline]
pub fn cos_from_sin(s: f32) -> f32 {
    safe_sqrt(1.0 - s * s)
}

/// Schlick's Fresnel weight `(1 - cos)^5`.
#[inline]
pub fn schlick_fresnel(cos_theta: f32) -> f32 {
    pow5(saturate(1.0 - cos_theta))
}

/// Wrap an angle into `[-pi, pi]`.
#[inline]
pub fn wrap_angle(mut a: f32) -> f32 {
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural logarithm of the gamma function (Lanczos approximation).
pub fn log_gamma(x: f32) -> f32 {
    log_gamma_f64(x as f64) as f32
}

fn log_gamma_f64(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula
        let s = (std::f64::consts::PI * x).sin().abs();
        return (std::f64::consts::PI / s).ln() - log_gamma_f64(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = LANCZOS_COEFFS[0];
    for (i, c) in LANCZOS_COEFFS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Euler beta function `B(x, y)` for positive arguments.
pub fn beta(x: f32, y: f32) -> f32 {
    (log_gamma(x) + log_gamma(y) - log_gamma(x + y)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_functions() {
        assert_eq!(safe_sqrt(-1e-6), 0.0);
        assert!((safe_acos(1.000_01) - 0.0).abs() < 1e-6);
        assert!((safe_asin(-1.5) + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(safe_divide(1.0, 0.0), 0.0);
        assert_eq!(safe_divide(1.0, 4.0), 0.25);
    }

    #[test]
    fn test_schlick_fresnel() {
        assert!((schlick_fresnel(1.0) - 0.0).abs() < 0.001);
        assert!((schlick_fresnel(0.0) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_powers() {
        assert!((pow20(0.9) - 0.9f32.powi(20)).abs() < 1e-6);
        assert!((pow22(0.9) - 0.9f32.powi(22)).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-5);
        assert!((wrap_angle(-2.5 * PI) + 0.5 * PI).abs() < 1e-5);
        assert_eq!(wrap_angle(0.5), 0.5);
    }

    #[test]
    fn test_log_gamma() {
        // Gamma(5) = 24, Gamma(0.5) = sqrt(pi)
        assert!((log_gamma(5.0) - 24.0f32.ln()).abs() < 1e-4);
        assert!((log_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-4);
        assert!((log_gamma(1.0)).abs() < 1e-5);
    }

    #[test]
    fn test_beta() {
        // B(2, 3) = 1! 2! / 4! = 1/12
        assert!((beta(2.0, 3.0) - 1.0 / 12.0).abs() < 1e-5);
        // B(1, y) = 1/y
        assert!((beta(1.0, 4.0) - 0.25).abs() < 1e-5);
    }
}
