//! The bytecode interpreter: a fetch-decode-execute loop over a QBC
//! instruction stream, with an embedded classical memory and ALU for hybrid
//! programs.
//!
//! Jump targets are absolute byte offsets into the instruction stream.
//! Errors inside a single instruction abort the run: the report carries the
//! error and the faulting offset, and the on-error hook fires. Caller
//! bounds (instruction cap, wall-clock cap) stop execution at the next
//! instruction boundary and are reported as the bound that fired.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use crate::{
    error::{Error, Result},
    executor::{Gate, GateExecutor},
    math::{N, R},
    measure::MeasurementEngine,
    qbc::{self, AluOp, Gate1Op, Gate2Op, Gate3Op, Instruction, RotOp},
    registry::{QubitHandle, QubitRegistry},
    state::BackendDispatch,
};

/// Caller-supplied execution bounds; zero disables a bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub max_instructions: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMetrics {
    pub instructions: u64,
    pub classical_ops: u64,
    pub quantum_ops: u64,
    pub jump_ops: u64,
    pub elapsed_ms: u64,
}

/// Outcome of one `execute_qbc` call.
#[derive(Debug)]
pub struct RunReport {
    pub success: bool,
    pub error: Option<Error>,
    /// Byte offset of the faulting instruction, when `error` is set.
    pub halted_at: Option<N>,
    /// Outcomes recorded by MEASURE/MEASURE_ALL during this run.
    pub measurements: HashMap<QubitHandle, u8>,
    /// Snapshot of classical memory after the run.
    pub classical_memory: HashMap<u8, i32>,
    /// Jump-target offsets found by the pre-scan, ascending.
    pub jump_targets: Vec<N>,
    pub metrics: RunMetrics,
}

impl RunReport {
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// Optional instrumentation called around every instruction.
#[derive(Default)]
pub struct Hooks<'h> {
    pub before: Option<Box<dyn FnMut(N, u8) + 'h>>,
    pub after: Option<Box<dyn FnMut(N, u8) + 'h>>,
    pub on_error: Option<Box<dyn FnMut(N, &Error) + 'h>>,
}

enum Flow {
    Continue,
    Halt,
}

pub(crate) struct Interpreter<'v> {
    backend: &'v mut BackendDispatch,
    registry: &'v mut QubitRegistry,
    executor: &'v mut GateExecutor,
    engine: &'v mut MeasurementEngine,
    classical: &'v mut HashMap<u8, i32>,
    buffer: &'v [u8],
    pc: N,
    slots: HashMap<u8, QubitHandle>,
    measured: HashMap<QubitHandle, u8>,
    metrics: RunMetrics,
}

impl<'v> Interpreter<'v> {
    pub fn new(
        backend: &'v mut BackendDispatch,
        registry: &'v mut QubitRegistry,
        executor: &'v mut GateExecutor,
        engine: &'v mut MeasurementEngine,
        classical: &'v mut HashMap<u8, i32>,
        buffer: &'v [u8],
    ) -> Self {
        Self {
            backend,
            registry,
            executor,
            engine,
            classical,
            buffer,
            pc: 0,
            slots: HashMap::new(),
            measured: HashMap::new(),
            metrics: RunMetrics::default(),
        }
    }

    pub fn run(mut self, options: ExecOptions, hooks: &mut Hooks<'_>) -> RunReport {
        let jump_targets = self.prescan();
        let started = Instant::now();
        let mut failure: Option<(N, Error)> = None;
        let mut bound: Option<Error> = None;

        while self.pc < self.buffer.len() {
            if options.max_instructions > 0 && self.metrics.instructions >= options.max_instructions
            {
                bound = Some(Error::InstructionLimit(options.max_instructions));
                break;
            }
            if options.timeout_ms > 0 && started.elapsed().as_millis() as u64 >= options.timeout_ms
            {
                bound = Some(Error::Timeout(options.timeout_ms));
                break;
            }

            let at = self.pc;
            let opcode = self.buffer[at];
            if let Some(hook) = hooks.before.as_mut() {
                hook(at, opcode);
            }

            match self.step(at) {
                Ok(flow) => {
                    self.metrics.instructions += 1;
                    if let Some(hook) = hooks.after.as_mut() {
                        hook(at, opcode);
                    }
                    if matches!(flow, Flow::Halt) {
                        break;
                    }
                }
                Err(err) => {
                    if let Some(hook) = hooks.on_error.as_mut() {
                        hook(at, &err);
                    }
                    failure = Some((at, err));
                    break;
                }
            }
        }
        self.metrics.elapsed_ms = started.elapsed().as_millis() as u64;

        let (halted_at, error) = match failure {
            Some((at, err)) => (Some(at), Some(err)),
            None => (None, bound),
        };
        RunReport {
            success: error.is_none(),
            error,
            halted_at,
            measurements: self.measured,
            classical_memory: self.classical.clone(),
            jump_targets,
            metrics: self.metrics,
        }
    }

    /// One sweep over the stream collecting jump-target offsets. Stops at
    /// the first malformed instruction; the execution loop reports those
    /// properly when it reaches them.
    fn prescan(&self) -> Vec<N> {
        let mut targets = BTreeSet::new();
        let mut at = 0;
        while at < self.buffer.len() {
            let opcode = self.buffer[at];
            let Some(need) = qbc::operand_len(opcode) else {
                break;
            };
            if at + 1 + need > self.buffer.len() {
                break;
            }
            match opcode {
                qbc::op::JMP => {
                    let raw: [u8; 4] = self.buffer[at + 1..at + 5].try_into().unwrap();
                    targets.insert(u32::from_le_bytes(raw) as N);
                }
                qbc::op::CJMP => {
                    let raw: [u8; 4] = self.buffer[at + 2..at + 6].try_into().unwrap();
                    targets.insert(u32::from_le_bytes(raw) as N);
                }
                _ => {}
            }
            at += 1 + need;
        }
        targets.into_iter().collect()
    }

    fn step(&mut self, at: N) -> Result<Flow> {
        let (instr, used) = Instruction::decode(self.buffer, at)?;
        self.pc = at + used;

        match instr {
            Instruction::Alloc { slot } => {
                if self.slots.contains_key(&slot) {
                    return Err(Error::InvalidQubitReference(format!(
                        "slot {} is already allocated",
                        slot
                    )));
                }
                let handle = self.registry.allocate(&mut *self.backend)?;
                self.slots.insert(slot, handle);
                self.metrics.quantum_ops += 1;
            }
            Instruction::Dealloc { slot } => {
                let handle = self.resolve(slot)?;
                self.slots.remove(&slot);
                self.registry.deallocate(handle);
                self.metrics.quantum_ops += 1;
            }
            Instruction::Gate1 { op, slot } => {
                let gate = match op {
                    Gate1Op::X => Gate::X,
                    Gate1Op::Y => Gate::Y,
                    Gate1Op::Z => Gate::Z,
                    Gate1Op::H => Gate::H,
                    Gate1Op::S => Gate::S,
                    Gate1Op::T => Gate::T,
                };
                let h = self.resolve(slot)?;
                self.executor
                    .apply(&gate, &[h], &mut *self.registry, &mut *self.backend)?;
                self.metrics.quantum_ops += 1;
            }
            Instruction::Rot { op, slot, angle } => {
                let angle = angle as R;
                let gate = match op {
                    RotOp::Rx => Gate::Rx(angle),
                    RotOp::Ry => Gate::Ry(angle),
                    RotOp::Rz => Gate::Rz(angle),
                    RotOp::Phase => Gate::Phase(angle),
                };
                let h = self.resolve(slot)?;
                self.executor
                    .apply(&gate, &[h], &mut *self.registry, &mut *self.backend)?;
                self.metrics.quantum_ops += 1;
            }
            Instruction::Gate2 { op, a, b } => {
                let gate = match op {
                    Gate2Op::Cnot => Gate::Cnot,
                    Gate2Op::Cz => Gate::Cz,
                    Gate2Op::Swap => Gate::Swap,
                    Gate2Op::ISwap => Gate::ISwap,
                };
                let qubits = [self.resolve(a)?, self.resolve(b)?];
                self.executor
                    .apply(&gate, &qubits, &mut *self.registry, &mut *self.backend)?;
                self.metrics.quantum_ops += 1;
            }
            Instruction::Gate3 { op, a, b, c } => {
                let gate = match op {
                    Gate3Op::Toffoli => Gate::Toffoli,
                    Gate3Op::Fredkin => Gate::Fredkin,
                };
                let qubits = [self.resolve(a)?, self.resolve(b)?, self.resolve(c)?];
                self.executor
                    .apply(&gate, &qubits, &mut *self.registry, &mut *self.backend)?;
                self.metrics.quantum_ops += 1;
            }
            Instruction::Measure { slot, dst } => {
                let h = self.resolve(slot)?;
                let outcome =
                    self.engine
                        .measure(h, false, &*self.registry, &mut *self.backend)?;
                self.measured.insert(h, outcome);
                self.classical.insert(dst, i32::from(outcome));
                self.metrics.quantum_ops += 1;
            }
            Instruction::MeasureAll => {
                self.engine
                    .measure_all(&*self.registry, &mut *self.backend)?;
                for h in self.registry.handles() {
                    if let Some(outcome) = self.engine.last_outcome(h) {
                        self.measured.insert(h, outcome);
                    }
                }
                self.metrics.quantum_ops += 1;
            }
            Instruction::Cjmp { cond, target } => {
                let value = self.load(cond)?;
                if value != 0 {
                    self.jump(target, at)?;
                }
                self.metrics.jump_ops += 1;
            }
            Instruction::Jmp { target } => {
                self.jump(target, at)?;
                self.metrics.jump_ops += 1;
            }
            Instruction::Store { addr, value } => {
                self.classical.insert(addr, value);
                self.metrics.classical_ops += 1;
            }
            Instruction::Load { src, dst } => {
                let value = self.load(src)?;
                self.classical.insert(dst, value);
                self.metrics.classical_ops += 1;
            }
            Instruction::Alu { op, a, b, dst } => {
                let lhs = self.load(a)?;
                let rhs = self.load(b)?;
                self.classical.insert(dst, alu_eval(op, lhs, rhs)?);
                self.metrics.classical_ops += 1;
            }
            Instruction::Not { src, dst } => {
                let value = self.load(src)?;
                self.classical.insert(dst, !value);
                self.metrics.classical_ops += 1;
            }
            Instruction::End => return Ok(Flow::Halt),
        }
        Ok(Flow::Continue)
    }

    fn resolve(&self, slot: u8) -> Result<QubitHandle> {
        self.slots.get(&slot).copied().ok_or_else(|| {
            Error::InvalidQubitReference(format!("slot {} was never allocated", slot))
        })
    }

    fn load(&self, addr: u8) -> Result<i32> {
        self.classical
            .get(&addr)
            .copied()
            .ok_or(Error::UnsetAddress(addr))
    }

    fn jump(&mut self, target: u32, at: N) -> Result<()> {
        let target = target as N;
        if target >= self.buffer.len() {
            return Err(Error::bytecode(
                at,
                format!(
                    "jump target {} outside [0, {})",
                    target,
                    self.buffer.len()
                ),
            ));
        }
        self.pc = target;
        Ok(())
    }
}

/// 32-bit two's-complement ALU. Arithmetic wraps; only a zero divisor is an
/// error, and division truncates toward zero.
fn alu_eval(op: AluOp, a: i32, b: i32) -> Result<i32> {
    Ok(match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Mul => a.wrapping_mul(b),
        AluOp::Div => {
            if b == 0 {
                return Err(Error::NumericFailure("classical division by zero".into()));
            }
            a.wrapping_div(b)
        }
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Eq => i32::from(a == b),
        AluOp::Neq => i32::from(a != b),
        AluOp::Lt => i32::from(a < b),
        AluOp::Gt => i32::from(a > b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{qbc::Program, state::DenseState};

    struct Rig {
        backend: BackendDispatch,
        registry: QubitRegistry,
        executor: GateExecutor,
        engine: MeasurementEngine,
        classical: HashMap<u8, i32>,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                backend: BackendDispatch::Dense(DenseState::new(32, 1e-10)),
                registry: QubitRegistry::new(32),
                executor: GateExecutor::new(false),
                engine: MeasurementEngine::new(Some(42)),
                classical: HashMap::new(),
            }
        }

        fn run(&mut self, instructions: Vec<Instruction>, options: ExecOptions) -> RunReport {
            self.run_hooked(instructions, options, &mut Hooks::default())
        }

        fn run_hooked(
            &mut self,
            instructions: Vec<Instruction>,
            options: ExecOptions,
            hooks: &mut Hooks<'_>,
        ) -> RunReport {
            let mut program = Program::new(0);
            program.instructions = instructions;
            let data = program.data_bytes();
            Interpreter::new(
                &mut self.backend,
                &mut self.registry,
                &mut self.executor,
                &mut self.engine,
                &mut self.classical,
                &data,
            )
            .run(options, hooks)
        }
    }

    #[test]
    fn classical_flow_with_conditional_skip() {
        use Instruction::*;
        // 0:  STORE 0 ← 5        (6 bytes)
        // 6:  STORE 1 ← 3        (6 bytes)
        // 12: SUB  [0] − [1] → 2 (4 bytes)
        // 16: GT   [0] > [1] → 3 (4 bytes)
        // 20: CJMP [3], → 32     (6 bytes)
        // 26: STORE 4 ← 99       (6 bytes, skipped)
        // 32: END
        let mut rig = Rig::new();
        let report = rig.run(
            vec![
                Store { addr: 0, value: 5 },
                Store { addr: 1, value: 3 },
                Alu { op: AluOp::Sub, a: 0, b: 1, dst: 2 },
                Alu { op: AluOp::Gt, a: 0, b: 1, dst: 3 },
                Cjmp { cond: 3, target: 32 },
                Store { addr: 4, value: 99 },
                End,
            ],
            ExecOptions::default(),
        );

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.classical_memory[&2], 2);
        assert_eq!(report.classical_memory[&3], 1);
        assert!(!report.classical_memory.contains_key(&4));
        assert_eq!(report.jump_targets, vec![32]);
        assert_eq!(report.metrics.instructions, 6);
        assert_eq!(report.metrics.classical_ops, 4);
        assert_eq!(report.metrics.jump_ops, 1);
    }

    #[test]
    fn untaken_branch_falls_through() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(
            vec![
                Store { addr: 0, value: 0 },
                Cjmp { cond: 0, target: 18 },
                Store { addr: 1, value: 7 },
                End,
            ],
            ExecOptions::default(),
        );
        assert!(report.success);
        assert_eq!(report.classical_memory[&1], 7);
    }

    #[test]
    fn quantum_program_records_measurements() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(
            vec![
                Alloc { slot: 0 },
                Gate1 { op: Gate1Op::H, slot: 0 },
                Measure { slot: 0, dst: 0 },
                End,
            ],
            ExecOptions::default(),
        );

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.measurements.len(), 1);
        let outcome = *report.measurements.values().next().unwrap();
        assert!(outcome <= 1);
        assert_eq!(report.classical_memory[&0], i32::from(outcome));
        assert_eq!(report.metrics.quantum_ops, 3);
    }

    #[test]
    fn alloc_twice_on_one_slot_fails() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(
            vec![Alloc { slot: 0 }, Alloc { slot: 0 }, End],
            ExecOptions::default(),
        );
        assert!(!report.success);
        assert_eq!(report.halted_at, Some(2));
        assert!(matches!(report.error, Some(Error::InvalidQubitReference(_))));
    }

    #[test]
    fn gate_on_unallocated_slot_fails() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(
            vec![Gate1 { op: Gate1Op::X, slot: 5 }, End],
            ExecOptions::default(),
        );
        assert!(!report.success);
        assert!(matches!(report.error, Some(Error::InvalidQubitReference(_))));
    }

    #[test]
    fn dealloc_then_reference_fails() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(
            vec![
                Alloc { slot: 0 },
                Dealloc { slot: 0 },
                Gate1 { op: Gate1Op::X, slot: 0 },
                End,
            ],
            ExecOptions::default(),
        );
        assert!(!report.success);
        assert_eq!(report.halted_at, Some(4));
    }

    #[test]
    fn jump_out_of_bounds_fails() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(vec![Jmp { target: 500 }, End], ExecOptions::default());
        assert!(!report.success);
        assert!(matches!(report.error, Some(Error::InvalidBytecode { .. })));
        assert_eq!(report.halted_at, Some(0));
    }

    #[test]
    fn unset_condition_address_fails() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(vec![Cjmp { cond: 9, target: 0 }, End], ExecOptions::default());
        assert!(!report.success);
        assert_eq!(report.error, Some(Error::UnsetAddress(9)));
    }

    #[test]
    fn division_by_zero_fails() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(
            vec![
                Store { addr: 0, value: 10 },
                Store { addr: 1, value: 0 },
                Alu { op: AluOp::Div, a: 0, b: 1, dst: 2 },
                End,
            ],
            ExecOptions::default(),
        );
        assert!(!report.success);
        assert!(matches!(report.error, Some(Error::NumericFailure(_))));
    }

    #[test]
    fn alu_edge_cases() {
        assert_eq!(alu_eval(AluOp::Div, 7, -2).unwrap(), -3);
        assert_eq!(alu_eval(AluOp::Div, -7, 2).unwrap(), -3);
        assert_eq!(alu_eval(AluOp::Div, i32::MIN, -1).unwrap(), i32::MIN);
        assert_eq!(alu_eval(AluOp::Add, i32::MAX, 1).unwrap(), i32::MIN);
        assert_eq!(alu_eval(AluOp::Eq, 4, 4).unwrap(), 1);
        assert_eq!(alu_eval(AluOp::Lt, -1, 0).unwrap(), 1);
        assert_eq!(alu_eval(AluOp::Gt, -1, 0).unwrap(), 0);
        assert_eq!(alu_eval(AluOp::Xor, 0b1100, 0b1010).unwrap(), 0b0110);
    }

    #[test]
    fn instruction_cap_stops_infinite_loop() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(
            vec![Jmp { target: 0 }],
            ExecOptions {
                max_instructions: 100,
                timeout_ms: 0,
            },
        );
        assert!(!report.success);
        assert_eq!(report.error, Some(Error::InstructionLimit(100)));
        assert_eq!(report.metrics.instructions, 100);
        assert_eq!(report.metrics.jump_ops, 100);
    }

    #[test]
    fn wall_clock_cap_stops_infinite_loop() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(
            vec![Jmp { target: 0 }],
            ExecOptions {
                max_instructions: 0,
                timeout_ms: 20,
            },
        );
        assert!(!report.success);
        assert_eq!(report.error, Some(Error::Timeout(20)));
    }

    #[test]
    fn execution_stops_at_end_of_buffer_without_end_marker() {
        use Instruction::*;
        let mut rig = Rig::new();
        let report = rig.run(vec![Store { addr: 0, value: 1 }], ExecOptions::default());
        assert!(report.success);
        assert_eq!(report.metrics.instructions, 1);
    }

    #[test]
    fn hooks_observe_the_run() {
        use std::cell::RefCell;
        use Instruction::*;

        let before = RefCell::new(Vec::new());
        let after = RefCell::new(0u32);
        let errors = RefCell::new(Vec::new());

        let mut hooks = Hooks {
            before: Some(Box::new(|pc, opcode| before.borrow_mut().push((pc, opcode)))),
            after: Some(Box::new(|_, _| *after.borrow_mut() += 1)),
            on_error: Some(Box::new(|pc, err| {
                errors.borrow_mut().push((pc, err.clone()))
            })),
        };

        let mut rig = Rig::new();
        let report = rig.run_hooked(
            vec![Store { addr: 0, value: 1 }, Cjmp { cond: 7, target: 0 }],
            ExecOptions::default(),
            &mut hooks,
        );
        drop(hooks);

        assert!(!report.success);
        assert_eq!(*before.borrow(), vec![(0, qbc::op::STORE), (6, qbc::op::CJMP)]);
        assert_eq!(*after.borrow(), 1);
        assert_eq!(errors.borrow().len(), 1);
        assert_eq!(errors.borrow()[0].0, 6);
        assert_eq!(errors.borrow()[0].1, Error::UnsetAddress(7));
    }
}
