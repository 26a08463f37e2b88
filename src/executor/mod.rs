//! Translation layer between named gates on handles and state-vector kernels.
//!
//! The executor resolves handles to bit positions, records entanglement for
//! every multi-qubit gate, then picks a kernel: CNOT, SWAP and Toffoli go to
//! the multiplication-free swap loops, a controlled 2×2 goes to the
//! control-masked pair loop, Fredkin is decomposed into CNOT·Toffoli·CNOT,
//! and everything else runs through the generic kernels with a matrix built
//! on the fly.

use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    gates,
    math::{matrix::is_unitary_m1, M1, N, R},
    registry::{QubitHandle, QubitRegistry},
    state::StateBackend,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    X,
    Y,
    Z,
    H,
    S,
    Sdg,
    T,
    Tdg,
    Rx(R),
    Ry(R),
    Rz(R),
    Phase(R),
    /// Arbitrary single-qubit unitary; validated only in debug mode.
    Unitary(M1),
    Cnot,
    Cz,
    Swap,
    ISwap,
    /// Controlled version of an arbitrary 2×2.
    Controlled(M1),
    Toffoli,
    Fredkin,
}

impl Gate {
    pub fn name(&self) -> &'static str {
        match self {
            Gate::X => "X",
            Gate::Y => "Y",
            Gate::Z => "Z",
            Gate::H => "H",
            Gate::S => "S",
            Gate::Sdg => "SDG",
            Gate::T => "T",
            Gate::Tdg => "TDG",
            Gate::Rx(_) => "RX",
            Gate::Ry(_) => "RY",
            Gate::Rz(_) => "RZ",
            Gate::Phase(_) => "PHASE",
            Gate::Unitary(_) => "U",
            Gate::Cnot => "CNOT",
            Gate::Cz => "CZ",
            Gate::Swap => "SWAP",
            Gate::ISwap => "ISWAP",
            Gate::Controlled(_) => "CU",
            Gate::Toffoli => "TOFFOLI",
            Gate::Fredkin => "FREDKIN",
        }
    }

    /// Number of qubit operands.
    pub fn arity(&self) -> N {
        match self {
            Gate::X
            | Gate::Y
            | Gate::Z
            | Gate::H
            | Gate::S
            | Gate::Sdg
            | Gate::T
            | Gate::Tdg
            | Gate::Rx(_)
            | Gate::Ry(_)
            | Gate::Rz(_)
            | Gate::Phase(_)
            | Gate::Unitary(_) => 1,
            Gate::Cnot | Gate::Cz | Gate::Swap | Gate::ISwap | Gate::Controlled(_) => 2,
            Gate::Toffoli | Gate::Fredkin => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GateExecutor {
    debug: bool,
    total: u64,
    per_gate: HashMap<&'static str, u64>,
}

impl GateExecutor {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            ..Self::default()
        }
    }

    pub fn apply(
        &mut self,
        gate: &Gate,
        qubits: &[QubitHandle],
        registry: &mut QubitRegistry,
        backend: &mut impl StateBackend,
    ) -> Result<()> {
        if qubits.len() != gate.arity() {
            return Err(Error::InvalidArgument(format!(
                "{} takes {} qubit(s), got {}",
                gate.name(),
                gate.arity(),
                qubits.len()
            )));
        }

        let mut positions = [0; 3];
        for (slot, &h) in qubits.iter().enumerate() {
            let p = registry.position_of(h)?;
            if positions[..slot].contains(&p) {
                return Err(Error::InvalidArgument(format!(
                    "{} requires distinct qubits",
                    gate.name()
                )));
            }
            positions[slot] = p;
        }

        for &other in &qubits[1..] {
            registry.record_entanglement(qubits[0], other)?;
        }

        if self.debug {
            self.verify_unitary(gate);
        }

        match gate {
            Gate::X => backend.apply_single(positions[0], &gates::PAULI_X)?,
            Gate::Y => backend.apply_single(positions[0], &gates::PAULI_Y)?,
            Gate::Z => backend.apply_single(positions[0], &gates::PAULI_Z)?,
            Gate::H => backend.apply_single(positions[0], &gates::HADAMARD)?,
            Gate::S => backend.apply_single(positions[0], &gates::PHASE_S)?,
            Gate::Sdg => backend.apply_single(positions[0], &gates::PHASE_S_DG)?,
            Gate::T => backend.apply_single(positions[0], &gates::PHASE_T)?,
            Gate::Tdg => backend.apply_single(positions[0], &gates::PHASE_T_DG)?,
            Gate::Rx(theta) => backend.apply_single(positions[0], &gates::rx(*theta))?,
            Gate::Ry(theta) => backend.apply_single(positions[0], &gates::ry(*theta))?,
            Gate::Rz(theta) => backend.apply_single(positions[0], &gates::rz(*theta))?,
            Gate::Phase(phi) => backend.apply_single(positions[0], &gates::phase(*phi))?,
            Gate::Unitary(u) => backend.apply_single(positions[0], u)?,
            Gate::Cnot => backend.apply_cnot(positions[0], positions[1])?,
            Gate::Cz => backend.apply_two(positions[0], positions[1], &gates::CZ)?,
            Gate::Swap => backend.apply_swap(positions[0], positions[1])?,
            Gate::ISwap => backend.apply_two(positions[0], positions[1], &gates::ISWAP)?,
            Gate::Controlled(u) => backend.apply_controlled(positions[0], positions[1], u)?,
            Gate::Toffoli => backend.apply_toffoli(positions[0], positions[1], positions[2])?,
            Gate::Fredkin => {
                // CSWAP(c; a, b) = CNOT(b, a) · TOFFOLI(c, a, b) · CNOT(b, a)
                let (c, a, b) = (positions[0], positions[1], positions[2]);
                backend.apply_cnot(b, a)?;
                backend.apply_toffoli(c, a, b)?;
                backend.apply_cnot(b, a)?;
            }
        }

        self.total += 1;
        *self.per_gate.entry(gate.name()).or_insert(0) += 1;
        Ok(())
    }

    fn verify_unitary(&self, gate: &Gate) {
        let payload = match gate {
            Gate::Unitary(u) | Gate::Controlled(u) => u,
            _ => return,
        };
        if !is_unitary_m1(payload) {
            log::warn!("{} payload is not unitary; applying it anyway", gate.name());
        }
    }

    pub fn total_applied(&self) -> u64 {
        self.total
    }

    pub fn count_for(&self, name: &str) -> u64 {
        self.per_gate.get(name).copied().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.total = 0;
        self.per_gate.clear();
    }
}
