//! Circuit builder: records operations against builder-local qubit slots and
//! compiles them into a QBC program image.
//!
//! The builder never touches a VM while recording; [`Circuit::compile`]
//! emits an ALLOC prologue for every slot, the recorded body, and a final
//! END, with a JSON metadata blob describing the circuit. Execute the
//! result with [`Qvm::run_circuit`](crate::vm::Qvm::run_circuit).

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    math::R,
    qbc::{Gate1Op, Gate2Op, Gate3Op, Instruction, Program, RotOp},
};

/// Conventional JSON payload of the metadata blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitMetadata {
    pub name: String,
    pub generator: String,
    pub qubits: u16,
}

#[derive(Debug, Clone, Default)]
pub struct Circuit {
    name: String,
    slots: u16,
    body: Vec<Instruction>,
}

impl Circuit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Reserve the next qubit slot. Slots are bytecode-local references,
    /// not VM handles; the VM allocates real qubits when the compiled
    /// program runs.
    pub fn alloc(&mut self) -> Result<u8> {
        if self.slots > u16::from(u8::MAX) {
            return Err(Error::CapacityExceeded(
                "a QBC program addresses at most 256 qubit slots".into(),
            ));
        }
        let slot = self.slots as u8;
        self.slots += 1;
        Ok(slot)
    }

    pub fn qubit_count(&self) -> u16 {
        self.slots
    }

    fn gate1(&mut self, op: Gate1Op, slot: u8) -> &mut Self {
        self.body.push(Instruction::Gate1 { op, slot });
        self
    }

    pub fn x(&mut self, q: u8) -> &mut Self {
        self.gate1(Gate1Op::X, q)
    }

    pub fn y(&mut self, q: u8) -> &mut Self {
        self.gate1(Gate1Op::Y, q)
    }

    pub fn z(&mut self, q: u8) -> &mut Self {
        self.gate1(Gate1Op::Z, q)
    }

    pub fn h(&mut self, q: u8) -> &mut Self {
        self.gate1(Gate1Op::H, q)
    }

    pub fn s(&mut self, q: u8) -> &mut Self {
        self.gate1(Gate1Op::S, q)
    }

    pub fn t(&mut self, q: u8) -> &mut Self {
        self.gate1(Gate1Op::T, q)
    }

    fn rot(&mut self, op: RotOp, slot: u8, angle: R) -> &mut Self {
        self.body.push(Instruction::Rot {
            op,
            slot,
            angle: angle as f32,
        });
        self
    }

    pub fn rx(&mut self, q: u8, theta: R) -> &mut Self {
        self.rot(RotOp::Rx, q, theta)
    }

    pub fn ry(&mut self, q: u8, theta: R) -> &mut Self {
        self.rot(RotOp::Ry, q, theta)
    }

    pub fn rz(&mut self, q: u8, theta: R) -> &mut Self {
        self.rot(RotOp::Rz, q, theta)
    }

    pub fn phase(&mut self, q: u8, phi: R) -> &mut Self {
        self.rot(RotOp::Phase, q, phi)
    }

    pub fn cnot(&mut self, control: u8, target: u8) -> &mut Self {
        self.body.push(Instruction::Gate2 {
            op: Gate2Op::Cnot,
            a: control,
            b: target,
        });
        self
    }

    pub fn cz(&mut self, control: u8, target: u8) -> &mut Self {
        self.body.push(Instruction::Gate2 {
            op: Gate2Op::Cz,
            a: control,
            b: target,
        });
        self
    }

    pub fn swap(&mut self, a: u8, b: u8) -> &mut Self {
        self.body.push(Instruction::Gate2 {
            op: Gate2Op::Swap,
            a,
            b,
        });
        self
    }

    pub fn iswap(&mut self, a: u8, b: u8) -> &mut Self {
        self.body.push(Instruction::Gate2 {
            op: Gate2Op::ISwap,
            a,
            b,
        });
        self
    }

    pub fn toffoli(&mut self, c1: u8, c2: u8, target: u8) -> &mut Self {
        self.body.push(Instruction::Gate3 {
            op: Gate3Op::Toffoli,
            a: c1,
            b: c2,
            c: target,
        });
        self
    }

    pub fn fredkin(&mut self, control: u8, a: u8, b: u8) -> &mut Self {
        self.body.push(Instruction::Gate3 {
            op: Gate3Op::Fredkin,
            a: control,
            b: a,
            c: b,
        });
        self
    }

    /// Measure a slot into a classical address.
    pub fn measure(&mut self, q: u8, dst: u8) -> &mut Self {
        self.body.push(Instruction::Measure { slot: q, dst });
        self
    }

    pub fn measure_all(&mut self) -> &mut Self {
        self.body.push(Instruction::MeasureAll);
        self
    }

    pub fn store(&mut self, addr: u8, value: i32) -> &mut Self {
        self.body.push(Instruction::Store { addr, value });
        self
    }

    /// Escape hatch for hybrid programs that need raw instructions (jumps,
    /// ALU chains) the convenience methods do not cover.
    pub fn raw(&mut self, instr: Instruction) -> &mut Self {
        self.body.push(instr);
        self
    }

    /// Rotate slot `q` from |0⟩ into α|0⟩ + β|1⟩ for real α, β.
    ///
    /// The amplitudes are taken as real; a complex β would need a trailing
    /// RZ for the relative phase, which this builder does not emit.
    pub fn prepare_state(&mut self, q: u8, alpha: R, beta: R) -> &mut Self {
        let theta = 2.0 * beta.atan2(alpha);
        self.ry(q, theta)
    }

    /// Emit the QBC image: ALLOC prologue, recorded body, END, JSON metadata.
    pub fn compile(&self) -> Program {
        let mut program = Program::new(self.slots);
        for slot in 0..self.slots {
            program.instructions.push(Instruction::Alloc { slot: slot as u8 });
        }
        program.instructions.extend(self.body.iter().cloned());
        program.instructions.push(Instruction::End);

        let metadata = CircuitMetadata {
            name: self.name.clone(),
            generator: concat!("qubyte ", env!("CARGO_PKG_VERSION")).to_string(),
            qubits: self.slots,
        };
        program.metadata = serde_json::to_vec(&metadata).unwrap_or_default();
        program
    }
}
