//! Quadrature engine
//!
//! This module evaluates the definite integral of `f(x) = 1 / ln(x)` over a
//! closed interval using one of three composite rules. It is a pure function
//! layer: no IO, no shared state, safe to call from any number of threads at
//! once.
//!
//! # Domain
//!
//! `f` is singular at `x = 1`. Any interval whose closure contains 1 is rejected
//! before a single evaluation happens. Values of `x` arbitrarily close to 1 (but
//! not equal) are allowed and simply produce large-magnitude results.
//!
//! # Step Handling
//!
//! The step count is `n = floor(|b - a| / h)`. A partial trailing step is dropped,
//! not redistributed. Simpson's rule additionally drops one step when `n` is odd.
//! Both truncations are part of the numerical contract: every node computing the
//! same sub-interval must get the same value.
//!
//! Direction is signed. When `b < a` the rules walk with a negative step from
//! `a`, so the dropped partial step always sits at the `b` end. As a result
//! `integrate(a, b) == -integrate(b, a)` (up to summation rounding) only when
//! `h` divides `|b - a|`; otherwise the two calls cover different ranges.
//!
//! # Example
//!
//! ```
//! use distquad::engine::{integrate, Method};
//!
//! let value = integrate(2.0, 10.0, 1e-3, Method::Simpson).unwrap();
//! assert!((value - 5.120435).abs() < 2e-3);
//!
//! // Intervals touching the singularity are rejected
//! assert!(integrate(0.5, 2.0, 0.1, Method::Trapezoid).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Integration rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Midpoint rectangles
    Midpoint,
    /// Composite trapezoids
    Trapezoid,
    /// Composite Simpson (falls back to trapezoids below two steps)
    #[default]
    Simpson,
}

impl Method {
    /// Wire code for this method.
    pub fn code(self) -> u8 {
        match self {
            Method::Midpoint => 1,
            Method::Trapezoid => 2,
            Method::Simpson => 3,
        }
    }

    /// Inverse of [`Method::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Method::Midpoint),
            2 => Some(Method::Trapezoid),
            3 => Some(Method::Simpson),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Method::Midpoint => write!(f, "midpoint"),
            Method::Trapezoid => write!(f, "trapezoid"),
            Method::Simpson => write!(f, "simpson"),
        }
    }
}

impl FromStr for Method {
    type Err = String;

    /// Accepts the numeric selector (`1`, `2`, `3`) or a method name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "mid" | "midpoint" | "rect" | "rectangles" => Ok(Method::Midpoint),
            "2" | "trap" | "trapezoid" | "trapezoids" => Ok(Method::Trapezoid),
            "3" | "simp" | "simpson" => Ok(Method::Simpson),
            other => Err(format!(
                "unknown integration method '{}' (expected 1|midpoint, 2|trapezoid, 3|simpson)",
                other
            )),
        }
    }
}

/// Domain errors raised before any evaluation takes place
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("step h must be > 0, got {0}")]
    NonPositiveStep(f64),

    #[error("integration interval [{lo}, {hi}] contains the x=1 singularity")]
    Singularity { lo: f64, hi: f64 },

    #[error("integration bounds must be finite, got a={a}, b={b}")]
    NonFiniteBound { a: f64, b: f64 },
}

/// The integrand, `1 / ln(x)`.
#[inline]
pub fn f(x: f64) -> f64 {
    1.0 / x.ln()
}

/// True when the closed interval spanned by `a` and `b` contains 1.
pub fn contains_singularity(a: f64, b: f64) -> bool {
    let lo = a.min(b);
    let hi = a.max(b);
    lo <= 1.0 && 1.0 <= hi
}

/// Check the step on its own.
pub fn validate_step(h: f64) -> Result<(), IntegrationError> {
    // Written this way so NaN is rejected too
    if !(h > 0.0) || !h.is_finite() {
        return Err(IntegrationError::NonPositiveStep(h));
    }
    Ok(())
}

/// Check that `[min(a,b), max(a,b)]` is finite and excludes the singularity.
pub fn validate_interval(a: f64, b: f64) -> Result<(), IntegrationError> {
    if !a.is_finite() || !b.is_finite() {
        return Err(IntegrationError::NonFiniteBound { a, b });
    }
    if contains_singularity(a, b) {
        return Err(IntegrationError::Singularity {
            lo: a.min(b),
            hi: a.max(b),
        });
    }
    Ok(())
}

/// Integrate `1/ln(x)` from `a` to `b` with step `h`.
///
/// Checks run in a fixed order: the step first, then the degenerate interval
/// (`a == b` returns 0 without further checks), then bounds and singularity.
pub fn integrate(a: f64, b: f64, h: f64, method: Method) -> Result<f64, IntegrationError> {
    validate_step(h)?;
    if a == b {
        return Ok(0.0);
    }
    validate_interval(a, b)?;

    Ok(match method {
        Method::Midpoint => midpoint(a, b, h),
        Method::Trapezoid => trapezoid(a, b, h),
        Method::Simpson => simpson(a, b, h),
    })
}

/// Number of whole steps of length `h` that fit in the interval.
fn step_count(a: f64, b: f64, h: f64) -> u64 {
    ((b - a).abs() / h).floor() as u64
}

fn signed_step(a: f64, b: f64, h: f64) -> f64 {
    if b > a {
        h
    } else {
        -h
    }
}

fn midpoint(a: f64, b: f64, h: f64) -> f64 {
    let n = step_count(a, b, h);
    let step = signed_step(a, b, h);

    let mut sum = 0.0;
    let mut x = a;
    for _ in 0..n {
        sum += f(x + step * 0.5);
        x += step;
    }
    sum * step
}

fn trapezoid(a: f64, b: f64, h: f64) -> f64 {
    let n = step_count(a, b, h);
    if n == 0 {
        return 0.0;
    }
    let step = signed_step(a, b, h);

    let mut sum = 0.0;
    let mut x0 = a;
    for _ in 0..n {
        let x1 = x0 + step;
        sum += 0.5 * (f(x0) + f(x1));
        x0 = x1;
    }
    sum * step
}

fn simpson(a: f64, b: f64, h: f64) -> f64 {
    let mut n = step_count(a, b, h);
    if n < 2 {
        return trapezoid(a, b, h);
    }
    // The dropped tail step is not compensated for
    if n % 2 == 1 {
        n -= 1;
    }
    let step = signed_step(a, b, h);

    let s0 = f(a);
    let mut odd = 0.0;
    let mut even = 0.0;
    for i in 1..n {
        let x = a + i as f64 * step;
        if i % 2 == 1 {
            odd += f(x);
        } else {
            even += f(x);
        }
    }
    let sn = f(a + n as f64 * step);

    (step / 3.0) * (s0 + 4.0 * odd + 2.0 * even + sn)
}

#[cfg(test)]
mod tests {
    use super::*;

    const METHODS: [Method; 3] = [Method::Midpoint, Method::Trapezoid, Method::Simpson];

    #[test]
    fn test_reference_simpson() {
        let v = integrate(2.0, 10.0, 1e-4, Method::Simpson).unwrap();
        assert!((v - 5.120435).abs() < 2e-3, "got {}", v);
    }

    #[test]
    fn test_methods_agree_on_reference_interval() {
        for method in METHODS {
            let v = integrate(2.0, 10.0, 1e-3, method).unwrap();
            assert!((v - 5.120435).abs() < 5e-3, "{} gave {}", method, v);
        }
    }

    #[test]
    fn test_rejects_singularity() {
        let err = integrate(0.5, 2.0, 0.1, Method::Trapezoid).unwrap_err();
        assert!(matches!(err, IntegrationError::Singularity { .. }));

        // Endpoints exactly at 1 are part of the closed interval
        assert!(integrate(1.0, 3.0, 0.1, Method::Simpson).is_err());
        assert!(integrate(0.2, 1.0, 0.1, Method::Midpoint).is_err());
        // Reversed direction is checked the same way
        assert!(integrate(2.0, 0.5, 0.1, Method::Midpoint).is_err());
    }

    #[test]
    fn test_rejects_non_positive_step() {
        for method in METHODS {
            assert_eq!(
                integrate(2.0, 10.0, 0.0, method),
                Err(IntegrationError::NonPositiveStep(0.0))
            );
            assert!(integrate(2.0, 10.0, -1e-3, method).is_err());
            assert!(integrate(2.0, 10.0, f64::NAN, method).is_err());
            // Step is checked before the degenerate-interval shortcut
            assert!(integrate(3.0, 3.0, 0.0, method).is_err());
        }
    }

    #[test]
    fn test_rejects_non_finite_bounds() {
        let err = integrate(2.0, f64::INFINITY, 0.1, Method::Simpson).unwrap_err();
        assert!(matches!(err, IntegrationError::NonFiniteBound { .. }));
        assert!(integrate(f64::NAN, 4.0, 0.1, Method::Midpoint).is_err());
    }

    #[test]
    fn test_degenerate_interval_is_zero() {
        for method in METHODS {
            assert_eq!(integrate(3.0, 3.0, 0.1, method), Ok(0.0));
            // Even at the singular point itself: no work, no error
            assert_eq!(integrate(1.0, 1.0, 0.1, method), Ok(0.0));
        }
    }

    #[test]
    fn test_direction_is_antisymmetric() {
        // Step divides the length exactly so both directions visit the same nodes
        for method in METHODS {
            let forward = integrate(2.0, 4.0, 0.25, method).unwrap();
            let backward = integrate(4.0, 2.0, 0.25, method).unwrap();
            assert!((forward + backward).abs() < 1e-12, "{}: {} vs {}", method, forward, backward);
        }

        let forward = integrate(0.1, 0.6, 0.125, Method::Simpson).unwrap();
        let backward = integrate(0.6, 0.1, 0.125, Method::Simpson).unwrap();
        assert!((forward + backward).abs() < 1e-12);
    }

    #[test]
    fn test_direction_with_remainder_covers_different_ranges() {
        // |b - a| = 2.5 with h = 1: each direction drops the 0.5 tail at its own end
        let forward = integrate(2.0, 4.5, 1.0, Method::Trapezoid).unwrap();
        let backward = integrate(4.5, 2.0, 1.0, Method::Trapezoid).unwrap();
        assert!((forward + backward).abs() > 0.1);

        let from_a = integrate(2.0, 4.0, 1.0, Method::Trapezoid).unwrap();
        let from_b = integrate(2.5, 4.5, 1.0, Method::Trapezoid).unwrap();
        assert!((forward - from_a).abs() < 1e-12);
        assert!((backward + from_b).abs() < 1e-12);
    }

    #[test]
    fn test_below_one_is_negative() {
        // ln(x) < 0 on (0, 1)
        let v = integrate(0.2, 0.8, 1e-3, Method::Midpoint).unwrap();
        assert!(v < 0.0);
    }

    #[test]
    fn test_step_larger_than_interval() {
        // n == 0: trapezoid returns 0, midpoint sums nothing
        assert_eq!(integrate(2.0, 2.5, 1.0, Method::Trapezoid), Ok(0.0));
        assert_eq!(integrate(2.0, 2.5, 1.0, Method::Midpoint), Ok(0.0));
        // Simpson with n < 2 falls back to trapezoids
        assert_eq!(
            integrate(2.0, 3.5, 1.0, Method::Simpson),
            integrate(2.0, 3.5, 1.0, Method::Trapezoid)
        );
    }

    #[test]
    fn test_remainder_step_is_dropped() {
        // [2, 4.3] with h = 1 has two whole steps; the trailing 0.3 is ignored
        let truncated = integrate(2.0, 4.3, 1.0, Method::Trapezoid).unwrap();
        let exact = integrate(2.0, 4.0, 1.0, Method::Trapezoid).unwrap();
        assert_eq!(truncated, exact);
    }

    #[test]
    fn test_simpson_odd_count_is_decremented() {
        // Three whole steps: Simpson only covers [2, 4]
        let odd = integrate(2.0, 5.0, 1.0, Method::Simpson).unwrap();
        let even = integrate(2.0, 4.0, 1.0, Method::Simpson).unwrap();
        assert_eq!(odd, even);
    }

    #[test]
    fn test_sum_of_parts() {
        let whole = integrate(2.0, 10.0, 1e-3, Method::Simpson).unwrap();
        let parts = integrate(2.0, 4.0, 1e-3, Method::Simpson).unwrap()
            + integrate(4.0, 10.0, 1e-3, Method::Simpson).unwrap();
        assert!((whole - parts).abs() < 1e-3);
    }

    #[test]
    fn test_method_codes() {
        for method in METHODS {
            assert_eq!(Method::from_code(method.code()), Some(method));
        }
        assert_eq!(Method::from_code(0), None);
        assert_eq!(Method::from_code(4), None);
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("1".parse::<Method>().unwrap(), Method::Midpoint);
        assert_eq!("Trapezoid".parse::<Method>().unwrap(), Method::Trapezoid);
        assert_eq!(" simpson ".parse::<Method>().unwrap(), Method::Simpson);
        assert!("gauss".parse::<Method>().is_err());
        assert_eq!(Method::default(), Method::Simpson);
    }
}
