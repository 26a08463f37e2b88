//! Measurement engine: collapsing and non-collapsing reads, marginal and
//! joint probabilities, non-mutating sampling, and the outcome ledger.
//!
//! Random-number consumption is strictly sequential: one uniform draw per
//! collapsing measurement, one per non-collapsing measurement, one per shot
//! when sampling. The RNG is seedable through the VM configuration; the
//! default seed comes from OS entropy.

use std::collections::HashMap;
use std::time::Instant;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::{Error, Result},
    math::{Mask, N, R},
    registry::{QubitHandle, QubitRegistry},
    state::StateBackend,
};

/// Probabilities below this are skipped while building a sampling PMF.
const SAMPLE_THRESHOLD: R = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementRecord {
    pub handle: QubitHandle,
    pub outcome: u8,
    /// Nanoseconds since the engine was created; monotonic.
    pub timestamp_ns: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasurementMetrics {
    pub total: u64,
    pub zeros: u64,
    pub ones: u64,
}

#[derive(Debug)]
pub struct MeasurementEngine {
    rng: StdRng,
    outcomes: HashMap<QubitHandle, u8>,
    history: Vec<MeasurementRecord>,
    metrics: MeasurementMetrics,
    epoch: Instant,
}

impl MeasurementEngine {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            outcomes: HashMap::new(),
            history: Vec::new(),
            metrics: MeasurementMetrics::default(),
            epoch: Instant::now(),
        }
    }

    /// Measure one qubit. A non-collapsing read reports a sample drawn from
    /// the marginal without touching the state or the ledger; a collapsing
    /// read projects the state and records the outcome.
    pub fn measure(
        &mut self,
        handle: QubitHandle,
        non_collapsing: bool,
        registry: &QubitRegistry,
        backend: &mut impl StateBackend,
    ) -> Result<u8> {
        let position = registry.position_of(handle)?;
        let draw: R = self.rng.gen();

        if non_collapsing {
            let p0 = backend.probability_of(position, 0)?;
            return Ok(u8::from(draw >= p0));
        }

        let outcome = backend.measure(position, draw)?;
        self.record(handle, outcome);
        Ok(outcome)
    }

    /// Measure a sequence of qubits in order. In the collapsing case every
    /// later measurement sees the state collapsed by the earlier ones.
    pub fn measure_many(
        &mut self,
        handles: &[QubitHandle],
        non_collapsing: bool,
        registry: &QubitRegistry,
        backend: &mut impl StateBackend,
    ) -> Result<Vec<u8>> {
        handles
            .iter()
            .map(|&h| self.measure(h, non_collapsing, registry, backend))
            .collect()
    }

    /// Collapse every live qubit and return the resulting bit string with
    /// the highest bit position leftmost, mirroring basis-index notation.
    pub fn measure_all(
        &mut self,
        registry: &QubitRegistry,
        backend: &mut impl StateBackend,
    ) -> Result<String> {
        let handles = registry.handles();
        let bits = self.measure_many(&handles, false, registry, backend)?;
        Ok(bits
            .iter()
            .rev()
            .map(|&b| if b == 0 { '0' } else { '1' })
            .collect())
    }

    pub fn probability_of(
        &self,
        handle: QubitHandle,
        value: u8,
        registry: &QubitRegistry,
        backend: &impl StateBackend,
    ) -> Result<R> {
        let position = registry.position_of(handle)?;
        backend.probability_of(position, value)
    }

    /// Probability that every `(handle, value)` pick holds simultaneously.
    /// An empty slice is the certain event.
    pub fn joint_probability(
        &self,
        picks: &[(QubitHandle, u8)],
        registry: &QubitRegistry,
        backend: &impl StateBackend,
    ) -> Result<R> {
        let resolved: Vec<(N, u8)> = picks
            .iter()
            .map(|&(h, v)| registry.position_of(h).map(|p| (p, v)))
            .collect::<Result<_>>()?;
        backend.joint_probability(&resolved)
    }

    /// Draw `shots` i.i.d. samples from the current distribution without
    /// mutating the state. Keys of the histogram are the projected
    /// sub-bitstrings of the chosen handles, LSB-first in slice order (all
    /// live handles by ascending position when `handles` is `None`).
    pub fn sample(
        &mut self,
        shots: N,
        handles: Option<&[QubitHandle]>,
        registry: &QubitRegistry,
        backend: &impl StateBackend,
    ) -> Result<HashMap<N, N>> {
        if shots == 0 {
            return Err(Error::InvalidArgument("shot count must be positive".into()));
        }
        let owned;
        let chosen: &[QubitHandle] = match handles {
            Some(hs) => hs,
            None => {
                owned = registry.handles();
                &owned
            }
        };
        let positions: Vec<N> = chosen
            .iter()
            .map(|&h| registry.position_of(h))
            .collect::<Result<_>>()?;

        let mut pmf: HashMap<N, R> = HashMap::new();
        for (idx, p) in backend.probabilities().into_iter().enumerate() {
            if p < SAMPLE_THRESHOLD {
                continue;
            }
            *pmf.entry(project(idx, &positions)).or_insert(0.0) += p;
        }

        let mut cdf: Vec<(N, R)> = pmf.into_iter().collect();
        cdf.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let mass: R = cdf.iter().map(|&(_, p)| p).sum();

        let mut histogram: HashMap<N, N> = HashMap::new();
        for _ in 0..shots {
            let mut u: R = self.rng.gen::<R>() * mass;
            let mut picked = cdf.last().map(|&(k, _)| k).unwrap_or(0);
            for &(key, p) in &cdf {
                if u < p {
                    picked = key;
                    break;
                }
                u -= p;
            }
            *histogram.entry(picked).or_insert(0) += 1;
        }
        Ok(histogram)
    }

    /// Pack the stored outcomes of `handles` into an integer, LSB-first.
    pub fn outcomes_as_integer(&self, handles: &[QubitHandle]) -> Result<u64> {
        let mut value = 0u64;
        for (bit, &h) in handles.iter().enumerate() {
            let outcome = self.outcomes.get(&h).ok_or_else(|| {
                Error::InvalidArgument(format!("{} has no recorded outcome", h))
            })?;
            value |= u64::from(*outcome) << bit;
        }
        Ok(value)
    }

    pub fn last_outcome(&self, handle: QubitHandle) -> Option<u8> {
        self.outcomes.get(&handle).copied()
    }

    pub fn history(&self) -> &[MeasurementRecord] {
        &self.history
    }

    pub fn metrics(&self) -> MeasurementMetrics {
        self.metrics
    }

    pub fn reset(&mut self) {
        self.outcomes.clear();
        self.history.clear();
        self.metrics = MeasurementMetrics::default();
    }

    fn record(&mut self, handle: QubitHandle, outcome: u8) {
        self.outcomes.insert(handle, outcome);
        self.history.push(MeasurementRecord {
            handle,
            outcome,
            timestamp_ns: self.epoch.elapsed().as_nanos() as u64,
        });
        self.metrics.total += 1;
        if outcome == 0 {
            self.metrics.zeros += 1;
        } else {
            self.metrics.ones += 1;
        }
    }
}

/// Project a basis index onto the given bit positions, LSB-first.
fn project(index: N, positions: &[N]) -> Mask {
    positions
        .iter()
        .enumerate()
        .fold(0, |acc, (bit, &k)| acc | (((index >> k) & 1) << bit))
}
