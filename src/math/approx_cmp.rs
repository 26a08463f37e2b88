use float_cmp::approx_eq;

use super::types::*;

const ULPS: i64 = 4;

#[inline]
pub fn approx_eq_real(x: R, y: R) -> bool {
    approx_eq!(R, x, y, ulps = ULPS)
}

#[inline]
pub fn approx_eq_cplx(a: &C, b: &C) -> bool {
    approx_eq!(R, a.re, b.re, ulps = ULPS) && approx_eq!(R, a.im, b.im, ulps = ULPS)
}

/// Equality with an explicit absolute tolerance, for the ε-based invariants.
#[inline]
pub fn approx_eq_tol(x: R, y: R, tol: R) -> bool {
    (x - y).abs() <= tol
}

#[inline]
pub fn approx_eq_cplx_tol(a: &C, b: &C, tol: R) -> bool {
    approx_eq_tol(a.re, b.re, tol) && approx_eq_tol(a.im, b.im, tol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{C_ONE, C_ZERO};

    #[test]
    fn ulps_equality() {
        assert!(approx_eq_real(0.1 + 0.2, 0.3));
        assert!(!approx_eq_real(0.1, 0.2));
        assert!(approx_eq_cplx(&C_ONE, &C { re: 1.0, im: 0.0 }));
    }

    #[test]
    fn tolerance_equality() {
        assert!(approx_eq_tol(1.0, 1.0 + 1e-12, 1e-10));
        assert!(!approx_eq_tol(1.0, 1.01, 1e-10));
        assert!(approx_eq_cplx_tol(&C_ZERO, &C { re: 1e-12, im: -1e-12 }, 1e-10));
    }
}
