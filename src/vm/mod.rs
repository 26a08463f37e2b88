//! The virtual-machine facade.
//!
//! A [`Qvm`] owns the state backend, qubit registry, gate executor,
//! measurement engine and classical memory, and is the single entry point
//! for direct circuit work and bytecode execution. Instances are
//! independent; the optional process-wide instance lives in [`global`].

use std::collections::HashMap;

use crate::{
    circuit::Circuit,
    config::Config,
    error::Result,
    executor::{Gate, GateExecutor},
    interp::{ExecOptions, Hooks, Interpreter, RunReport},
    math::{C, N, R},
    measure::{MeasurementEngine, MeasurementMetrics, MeasurementRecord},
    qbc::{Program, HEADER_LEN},
    registry::{QubitHandle, QubitRegistry},
    state::{BackendDispatch, DenseState, StateBackend},
};

pub struct Qvm {
    config: Config,
    backend: BackendDispatch,
    registry: QubitRegistry,
    executor: GateExecutor,
    engine: MeasurementEngine,
    classical: HashMap<u8, i32>,
}

impl Qvm {
    pub fn new(config: Config) -> Self {
        let backend = BackendDispatch::Dense(DenseState::new(
            config.max_qubits as N,
            config.precision,
        ));
        Self {
            backend,
            registry: QubitRegistry::new(config.max_qubits as N),
            executor: GateExecutor::new(config.debug),
            engine: MeasurementEngine::new(config.seed),
            classical: HashMap::new(),
            config,
        }
    }

    /// A VM configured from the `QVM_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn allocate_qubit(&mut self) -> Result<QubitHandle> {
        self.registry.allocate(&mut self.backend)
    }

    pub fn allocate_qubits(&mut self, count: N) -> Result<Vec<QubitHandle>> {
        self.registry.allocate_many(&mut self.backend, count)
    }

    /// Release a handle; false when it was not live. The state vector keeps
    /// its width: bit positions are never reused within a VM lifetime.
    pub fn deallocate_qubit(&mut self, handle: QubitHandle) -> bool {
        self.registry.deallocate(handle)
    }

    pub fn qubit_count(&self) -> N {
        self.registry.len()
    }

    pub fn qubits(&self) -> Vec<QubitHandle> {
        self.registry.handles()
    }

    pub fn apply(&mut self, gate: &Gate, qubits: &[QubitHandle]) -> Result<()> {
        self.executor
            .apply(gate, qubits, &mut self.registry, &mut self.backend)
    }

    pub fn measure_qubit(&mut self, handle: QubitHandle) -> Result<u8> {
        self.engine
            .measure(handle, false, &self.registry, &mut self.backend)
    }

    /// Sample an outcome without collapsing the state.
    pub fn peek_qubit(&mut self, handle: QubitHandle) -> Result<u8> {
        self.engine
            .measure(handle, true, &self.registry, &mut self.backend)
    }

    pub fn measure_qubits(&mut self, handles: &[QubitHandle]) -> Result<Vec<u8>> {
        self.engine
            .measure_many(handles, false, &self.registry, &mut self.backend)
    }

    pub fn measure_all(&mut self) -> Result<String> {
        self.engine.measure_all(&self.registry, &mut self.backend)
    }

    pub fn probability_of(&self, handle: QubitHandle, value: u8) -> Result<R> {
        self.engine
            .probability_of(handle, value, &self.registry, &self.backend)
    }

    pub fn joint_probability(&self, picks: &[(QubitHandle, u8)]) -> Result<R> {
        self.engine
            .joint_probability(picks, &self.registry, &self.backend)
    }

    pub fn sample(&mut self, shots: N, handles: Option<&[QubitHandle]>) -> Result<HashMap<N, N>> {
        self.engine
            .sample(shots, handles, &self.registry, &self.backend)
    }

    pub fn outcomes_as_integer(&self, handles: &[QubitHandle]) -> Result<u64> {
        self.engine.outcomes_as_integer(handles)
    }

    pub fn last_outcome(&self, handle: QubitHandle) -> Option<u8> {
        self.engine.last_outcome(handle)
    }

    pub fn measurement_history(&self) -> &[MeasurementRecord] {
        self.engine.history()
    }

    pub fn measurement_metrics(&self) -> MeasurementMetrics {
        self.engine.metrics()
    }

    pub fn gates_applied(&self) -> u64 {
        self.executor.total_applied()
    }

    pub fn are_entangled(&mut self, a: QubitHandle, b: QubitHandle) -> Result<bool> {
        self.registry.are_entangled(a, b)
    }

    pub fn entangled_with(&mut self, handle: QubitHandle) -> Result<Vec<QubitHandle>> {
        self.registry.entangled_with(handle)
    }

    /// Read-only copy of the amplitude vector.
    pub fn state_vector(&self) -> Vec<C> {
        self.backend.snapshot()
    }

    /// Amplitudes in polar form (magnitude, phase).
    pub fn state_polar(&self) -> Vec<(R, R)> {
        self.backend
            .snapshot()
            .into_iter()
            .map(|a| a.to_polar())
            .collect()
    }

    /// All basis-state probabilities.
    pub fn probabilities(&self) -> Vec<R> {
        self.backend.probabilities()
    }

    /// Probability of one basis state, served through the state's cache.
    pub fn basis_probability(&mut self, index: N) -> Result<R> {
        self.backend.probability(index)
    }

    /// Classical memory as left by previous bytecode runs.
    pub fn classical_memory(&self) -> &HashMap<u8, i32> {
        &self.classical
    }

    /// Decode and execute a QBC image.
    pub fn execute_qbc(&mut self, image: &[u8], options: ExecOptions) -> RunReport {
        self.execute_qbc_hooked(image, options, &mut Hooks::default())
    }

    /// [`execute_qbc`](Self::execute_qbc) with instrumentation hooks.
    pub fn execute_qbc_hooked(
        &mut self,
        image: &[u8],
        options: ExecOptions,
        hooks: &mut Hooks<'_>,
    ) -> RunReport {
        let program = match Program::decode(image) {
            Ok(program) => program,
            Err(err) => {
                return RunReport {
                    success: false,
                    error: Some(err),
                    halted_at: Some(0),
                    measurements: HashMap::new(),
                    classical_memory: self.classical.clone(),
                    jump_targets: Vec::new(),
                    metrics: Default::default(),
                }
            }
        };
        if program.declared_qubits > self.config.max_qubits {
            log::warn!(
                "program declares {} qubits, VM is capped at {}",
                program.declared_qubits,
                self.config.max_qubits
            );
        }

        let data = &image[HEADER_LEN..image.len() - program.metadata.len()];
        Interpreter::new(
            &mut self.backend,
            &mut self.registry,
            &mut self.executor,
            &mut self.engine,
            &mut self.classical,
            data,
        )
        .run(options, hooks)
    }

    /// Compile and execute a circuit on this VM.
    pub fn run_circuit(&mut self, circuit: &Circuit, options: ExecOptions) -> RunReport {
        let image = circuit.compile().encode();
        self.execute_qbc(&image, options)
    }

    /// Drop all qubits, measurements and classical memory, keeping the
    /// configuration (and the RNG stream) intact.
    pub fn reset(&mut self) {
        self.backend.reset();
        self.registry.reset();
        self.engine.reset();
        self.executor.reset();
        self.classical.clear();
    }
}

impl Default for Qvm {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Optional process-wide VM, guarded by a mutex.
///
/// Plain [`Qvm`] values are the primary API; this exists for embedders that
/// want one shared instance without threading it through call sites.
pub mod global {
    use std::sync::Mutex;

    use lazy_static::lazy_static;

    use super::Qvm;
    use crate::config::Config;

    lazy_static! {
        static ref GLOBAL_VM: Mutex<Option<Qvm>> = Mutex::new(None);
    }

    /// Install the process-wide VM. Idempotent: a second call keeps the
    /// existing instance and warns when the configuration differs.
    pub fn initialize(config: Config) {
        let mut slot = GLOBAL_VM.lock().unwrap();
        match slot.as_ref() {
            None => *slot = Some(Qvm::new(config)),
            Some(vm) => {
                if *vm.config() != config {
                    log::warn!("global VM already initialized; new configuration ignored");
                }
            }
        }
    }

    pub fn is_initialized() -> bool {
        GLOBAL_VM.lock().unwrap().is_some()
    }

    /// Run `f` against the process-wide VM, installing a default-configured
    /// instance on first use.
    pub fn with_vm<T>(f: impl FnOnce(&mut Qvm) -> T) -> T {
        let mut slot = GLOBAL_VM.lock().unwrap();
        let vm = slot.get_or_insert_with(|| Qvm::new(Config::default()));
        f(vm)
    }

    /// Tear the process-wide VM down, releasing all of its state.
    pub fn shutdown() {
        GLOBAL_VM.lock().unwrap().take();
    }
}
