//! Canonical gate matrices and rotation constructors.
//!
//! Fixed gates are `const` tables; parametric gates are built from trig of
//! θ/2 (θ for the phase gate) at call time. Two-qubit matrices use basis
//! order |00⟩, |01⟩, |10⟩, |11⟩ with the control as the high bit; the
//! three-qubit builders follow the same convention with the first operand
//! highest.

use crate::math::*;

const SQRT_1_2: C = C {
    re: FRAC_1_SQRT_2,
    im: 0.,
};
const C_NEG_ONE: C = C { re: -1., im: 0. };
const C_NEG_IMAG: C = C { re: 0., im: -1. };

pub const ID: M1 = [C_ONE, C_ZERO, C_ZERO, C_ONE];

/// Pauli X, the quantum NOT.
///
/// ```X |0⟩ = |1⟩    X |1⟩ = |0⟩```
pub const PAULI_X: M1 = [C_ZERO, C_ONE, C_ONE, C_ZERO];

/// Pauli Y = iXZ.
///
/// ```Y |0⟩ = i|1⟩    Y |1⟩ = −i|0⟩```
pub const PAULI_Y: M1 = [C_ZERO, C_NEG_IMAG, C_IMAG, C_ZERO];

/// Pauli Z: negates the |1⟩ amplitude.
pub const PAULI_Z: M1 = [C_ONE, C_ZERO, C_ZERO, C_NEG_ONE];

/// Hadamard: the basis change between Z and X eigenstates.
///
/// ```H |0⟩ = (|0⟩ + |1⟩)/√2    H |1⟩ = (|0⟩ − |1⟩)/√2```
pub const HADAMARD: M1 = [
    SQRT_1_2,
    SQRT_1_2,
    SQRT_1_2,
    C {
        re: -FRAC_1_SQRT_2,
        im: 0.,
    },
];

/// S = √Z; S† undoes it. T = √S with T† likewise.
pub const PHASE_S: M1 = [C_ONE, C_ZERO, C_ZERO, C_IMAG];
pub const PHASE_S_DG: M1 = [C_ONE, C_ZERO, C_ZERO, C_NEG_IMAG];
pub const PHASE_T: M1 = [
    C_ONE,
    C_ZERO,
    C_ZERO,
    C {
        re: FRAC_1_SQRT_2,
        im: FRAC_1_SQRT_2,
    },
];
pub const PHASE_T_DG: M1 = [
    C_ONE,
    C_ZERO,
    C_ZERO,
    C {
        re: FRAC_1_SQRT_2,
        im: -FRAC_1_SQRT_2,
    },
];

/// RX(θ): rotation around the X axis.
///
/// On |0⟩ it yields (cos θ/2)|0⟩ − i(sin θ/2)|1⟩.
pub fn rx(theta: R) -> M1 {
    let (sin, cos) = (theta / 2.).sin_cos();
    [
        C { re: cos, im: 0. },
        C { re: 0., im: -sin },
        C { re: 0., im: -sin },
        C { re: cos, im: 0. },
    ]
}

/// RY(θ): rotation around the Y axis, real-valued.
pub fn ry(theta: R) -> M1 {
    let (sin, cos) = (theta / 2.).sin_cos();
    [
        C { re: cos, im: 0. },
        C { re: -sin, im: 0. },
        C { re: sin, im: 0. },
        C { re: cos, im: 0. },
    ]
}

/// RZ(θ): diag(e^{−iθ/2}, e^{iθ/2}).
pub fn rz(theta: R) -> M1 {
    [
        phase_from_rad(-theta / 2.),
        C_ZERO,
        C_ZERO,
        phase_from_rad(theta / 2.),
    ]
}

/// PHASE(φ): diag(1, e^{iφ}). Unlike RZ it leaves |0⟩ untouched.
pub fn phase(phi: R) -> M1 {
    [C_ONE, C_ZERO, C_ZERO, phase_from_rad(phi)]
}

/// Controlled NOT: flips the target when the control is set.
///
/// ```CNOT |10⟩ = |11⟩    CNOT |11⟩ = |10⟩```
#[rustfmt::skip]
pub const CNOT: M2 = [
    C_ONE,  C_ZERO, C_ZERO, C_ZERO,
    C_ZERO, C_ONE,  C_ZERO, C_ZERO,
    C_ZERO, C_ZERO, C_ZERO, C_ONE,
    C_ZERO, C_ZERO, C_ONE,  C_ZERO,
];

#[rustfmt::skip]
pub const CZ: M2 = [
    C_ONE,  C_ZERO, C_ZERO, C_ZERO,
    C_ZERO, C_ONE,  C_ZERO, C_ZERO,
    C_ZERO, C_ZERO, C_ONE,  C_ZERO,
    C_ZERO, C_ZERO, C_ZERO, C_NEG_ONE,
];

#[rustfmt::skip]
pub const SWAP: M2 = [
    C_ONE,  C_ZERO, C_ZERO, C_ZERO,
    C_ZERO, C_ZERO, C_ONE,  C_ZERO,
    C_ZERO, C_ONE,  C_ZERO, C_ZERO,
    C_ZERO, C_ZERO, C_ZERO, C_ONE,
];

/// SWAP with an i factor on the exchanged states.
///
/// ```iSWAP |01⟩ = i|10⟩    iSWAP |10⟩ = i|01⟩```
#[rustfmt::skip]
pub const ISWAP: M2 = [
    C_ONE,  C_ZERO, C_ZERO, C_ZERO,
    C_ZERO, C_ZERO, C_IMAG, C_ZERO,
    C_ZERO, C_IMAG, C_ZERO, C_ZERO,
    C_ZERO, C_ZERO, C_ZERO, C_ONE,
];

/// Controlled version of an arbitrary 2×2 unitary: identity on the
/// control=0 block, `u` on the control=1 block.
pub fn controlled(u: &M1) -> M2 {
    let mut m = [C_ZERO; 16];
    m[0] = C_ONE;
    m[5] = C_ONE;
    m[0b1010] = u[0b00];
    m[0b1011] = u[0b01];
    m[0b1110] = u[0b10];
    m[0b1111] = u[0b11];
    m
}

/// Toffoli as a full 8×8 matrix: identity with the |110⟩ and |111⟩ rows
/// exchanged. The executor never multiplies by this form; it exists for
/// validation against the sparse kernel.
pub fn toffoli() -> M3 {
    permutation_m3(&[0, 1, 2, 3, 4, 5, 7, 6])
}

/// Fredkin (controlled SWAP) as a full 8×8 matrix: |101⟩ ↔ |110⟩.
pub fn fredkin() -> M3 {
    permutation_m3(&[0, 1, 2, 3, 4, 6, 5, 7])
}

fn permutation_m3(rows: &[N; 8]) -> M3 {
    let mut m = [C_ZERO; 64];
    for (row, &col) in rows.iter().enumerate() {
        m[row * 8 + col] = C_ONE;
    }
    m
}
