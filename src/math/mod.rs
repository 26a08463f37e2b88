pub use std::f64::consts::*;

pub use self::{consts::*, types::*};

use crate::error::{Error, Result};

pub mod approx_cmp;
pub mod matrix;

mod consts {
    use super::types::*;

    pub const C_ONE: C = C { re: 1., im: 0. };
    pub const C_ZERO: C = C { re: 0., im: 0. };
    pub const C_IMAG: C = C { re: 0., im: 1. };
}

mod types {
    pub type N = usize;
    pub type R = f64;
    pub type C = num_complex::Complex<R>;

    /// Bit mask over state-vector indices; bit k addresses qubit position k.
    pub type Mask = usize;

    /// Row-major 2×2, 4×4 and 8×8 complex matrices.
    pub type M1 = [C; 4];
    pub type M2 = [C; 16];
    pub type M3 = [C; 64];
}

/// Unit phase factor `e^{i·rad}`.
#[inline]
pub fn phase_from_rad(rad: R) -> C {
    C::from_polar(1.0, rad)
}

/// Complex division that fails instead of producing NaNs when the divisor
/// has zero squared magnitude.
#[inline]
pub fn checked_div(num: C, den: C) -> Result<C> {
    if den.norm_sqr() == 0.0 {
        return Err(Error::NumericFailure(
            "complex division by zero-magnitude value".into(),
        ));
    }
    Ok(num / den)
}
