use super::{approx_cmp::approx_eq_tol, types::*};

const TOL: R = 1e-9;

/// Conjugate transpose of a 2×2 matrix; for a unitary this is its inverse.
pub fn inverse_unitary_m1(u: &M1) -> M1 {
    [u[0b00].conj(), u[0b10].conj(), u[0b01].conj(), u[0b11].conj()]
}

/// U·U† = 1 for a 2×2 matrix. This is the debug-mode gate validation: the
/// executor runs it over `Unitary`/`Controlled` payloads before applying
/// them.
pub fn is_unitary_m1(u: &M1) -> bool {
    let adjoint = inverse_unitary_m1(u);
    let product = mul_m1(u, &adjoint);
    is_identity(&product, 2)
}

/// U·U† = 1 for a 4×4 matrix.
pub fn is_unitary_m2(u: &M2) -> bool {
    for i in 0..4 {
        for j in i..4 {
            let dot: C = (0..4).map(|k| u[i * 4 + k] * u[j * 4 + k].conj()).sum();
            let expect = if i == j { 1.0 } else { 0.0 };
            if !approx_eq_tol(dot.re, expect, TOL) || !approx_eq_tol(dot.im, 0.0, TOL) {
                return false;
            }
        }
    }
    true
}

fn mul_m1(a: &M1, b: &M1) -> M1 {
    [
        a[0b00] * b[0b00] + a[0b01] * b[0b10],
        a[0b00] * b[0b01] + a[0b01] * b[0b11],
        a[0b10] * b[0b00] + a[0b11] * b[0b10],
        a[0b10] * b[0b01] + a[0b11] * b[0b11],
    ]
}

fn is_identity(u: &[C], dim: N) -> bool {
    for row in 0..dim {
        for col in 0..dim {
            let expect = if row == col { 1.0 } else { 0.0 };
            let e = u[row * dim + col];
            if !approx_eq_tol(e.re, expect, TOL) || !approx_eq_tol(e.im, 0.0, TOL) {
                return false;
            }
        }
    }
    true
}
