//! Dense amplitude-vector backend.
//!
//! Amplitudes are stored as one contiguous `Vec<C>` of length 2^n; index i
//! encodes the basis state |b_{n−1}…b_0⟩ with qubit position k at bit k.
//! Every kernel mutates the vector in place: the pair and 4-tuple loops load
//! the affected amplitudes into temporaries, then write the transformed
//! values back in the same pass.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use super::StateBackend;
use crate::{
    error::{Error, Result},
    math::{C, C_ONE, C_ZERO, M1, M2, Mask, N, R},
};

const PROB_CACHE_CAP: N = 64;
const MAX_AMPLITUDES_TO_DISPLAY: N = 8;

/// Bounded cache of basis-state probabilities.
///
/// Every mutating operation clears it, so an unbounded map would only ever
/// grow between mutations; a small recency-evicting one is enough.
#[derive(Debug, Clone, Default)]
struct ProbCache {
    map: HashMap<N, R>,
    order: VecDeque<N>,
}

impl ProbCache {
    fn get(&mut self, index: N) -> Option<R> {
        let p = *self.map.get(&index)?;
        if let Some(at) = self.order.iter().position(|&i| i == index) {
            self.order.remove(at);
            self.order.push_back(index);
        }
        Some(p)
    }

    fn insert(&mut self, index: N, p: R) {
        if self.map.len() >= PROB_CACHE_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }
        if self.map.insert(index, p).is_none() {
            self.order.push_back(index);
        }
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

#[derive(Clone)]
pub struct DenseState {
    psi: Vec<C>,
    q_num: N,
    max_qubits: N,
    precision: R,
    cache: ProbCache,
}

impl fmt::Debug for DenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DenseState");
        for (idx, amp) in self.psi.iter().take(MAX_AMPLITUDES_TO_DISPLAY).enumerate() {
            s.field(&format!("{}", idx), amp);
        }
        if self.psi.len() > MAX_AMPLITUDES_TO_DISPLAY {
            s.finish_non_exhaustive()
        } else {
            s.finish()
        }
    }
}

impl DenseState {
    /// Zero-qubit state: a single unit amplitude.
    pub fn new(max_qubits: N, precision: R) -> Self {
        Self {
            psi: vec![C_ONE],
            q_num: 0,
            max_qubits,
            precision,
            cache: ProbCache::default(),
        }
    }

    pub fn precision(&self) -> R {
        self.precision
    }

    fn check_position(&self, k: N) -> Result<Mask> {
        if k >= self.q_num {
            return Err(Error::InvalidArgument(format!(
                "qubit position {} out of range for {} qubit(s)",
                k, self.q_num
            )));
        }
        Ok(1 << k)
    }

    fn check_distinct(positions: &[N]) -> Result<()> {
        for (at, &p) in positions.iter().enumerate() {
            if positions[..at].contains(&p) {
                return Err(Error::InvalidArgument(format!(
                    "qubit position {} used twice in one gate",
                    p
                )));
            }
        }
        Ok(())
    }

    fn norm_sqr_sum(&self) -> R {
        self.psi.iter().map(|a| a.norm_sqr()).sum()
    }
}

impl StateBackend for DenseState {
    fn qubit_count(&self) -> N {
        self.q_num
    }

    fn len(&self) -> N {
        self.psi.len()
    }

    fn allocate(&mut self) -> Result<()> {
        if self.q_num >= self.max_qubits {
            return Err(Error::CapacityExceeded(format!(
                "state vector is capped at {} qubits",
                self.max_qubits
            )));
        }
        let old_len = self.psi.len();
        self.psi.resize(old_len << 1, C_ZERO);
        self.q_num += 1;
        self.cache.clear();
        Ok(())
    }

    fn apply_single(&mut self, target: N, u: &M1) -> Result<()> {
        let step = self.check_position(target)?;
        let len = self.psi.len();

        let mut base = 0;
        while base < len {
            for i in base..base + step {
                let j = i | step;
                let a = self.psi[i];
                let b = self.psi[j];
                self.psi[i] = u[0b00] * a + u[0b01] * b;
                self.psi[j] = u[0b10] * a + u[0b11] * b;
            }
            base += step << 1;
        }
        self.cache.clear();
        Ok(())
    }

    fn apply_two(&mut self, control: N, target: N, u: &M2) -> Result<()> {
        let cm = self.check_position(control)?;
        let tm = self.check_position(target)?;
        Self::check_distinct(&[control, target])?;

        let pair = cm | tm;
        for idx in 0..self.psi.len() {
            if idx & pair != 0 {
                continue;
            }
            // local basis order |00⟩..|11⟩, control as the high bit
            let span = [idx, idx | tm, idx | cm, idx | pair];
            let a = [
                self.psi[span[0]],
                self.psi[span[1]],
                self.psi[span[2]],
                self.psi[span[3]],
            ];
            for (row, &out) in span.iter().enumerate() {
                self.psi[out] = u[row * 4] * a[0]
                    + u[row * 4 + 1] * a[1]
                    + u[row * 4 + 2] * a[2]
                    + u[row * 4 + 3] * a[3];
            }
        }
        self.cache.clear();
        Ok(())
    }

    fn apply_cnot(&mut self, control: N, target: N) -> Result<()> {
        let cm = self.check_position(control)?;
        let tm = self.check_position(target)?;
        Self::check_distinct(&[control, target])?;

        // pure permutation: no multiplications
        for idx in 0..self.psi.len() {
            if idx & cm != 0 && idx & tm == 0 {
                self.psi.swap(idx, idx | tm);
            }
        }
        self.cache.clear();
        Ok(())
    }

    fn apply_swap(&mut self, a: N, b: N) -> Result<()> {
        let am = self.check_position(a)?;
        let bm = self.check_position(b)?;
        Self::check_distinct(&[a, b])?;

        // visiting only (a=0, b=1) covers every differing pair once
        for idx in 0..self.psi.len() {
            if idx & am == 0 && idx & bm != 0 {
                self.psi.swap(idx, idx ^ (am | bm));
            }
        }
        self.cache.clear();
        Ok(())
    }

    fn apply_toffoli(&mut self, c1: N, c2: N, target: N) -> Result<()> {
        let c1m = self.check_position(c1)?;
        let c2m = self.check_position(c2)?;
        let tm = self.check_position(target)?;
        Self::check_distinct(&[c1, c2, target])?;

        let both = c1m | c2m;
        for idx in 0..self.psi.len() {
            if idx & both == both && idx & tm == 0 {
                self.psi.swap(idx, idx | tm);
            }
        }
        self.cache.clear();
        Ok(())
    }

    fn apply_controlled(&mut self, control: N, target: N, u: &M1) -> Result<()> {
        let cm = self.check_position(control)?;
        let tm = self.check_position(target)?;
        Self::check_distinct(&[control, target])?;

        for idx in 0..self.psi.len() {
            if idx & cm != 0 && idx & tm == 0 {
                let j = idx | tm;
                let a = self.psi[idx];
                let b = self.psi[j];
                self.psi[idx] = u[0b00] * a + u[0b01] * b;
                self.psi[j] = u[0b10] * a + u[0b11] * b;
            }
        }
        self.cache.clear();
        Ok(())
    }

    fn measure(&mut self, target: N, draw: R) -> Result<u8> {
        let tm = self.check_position(target)?;

        let p0: R = self
            .psi
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx & tm == 0)
            .map(|(_, a)| a.norm_sqr())
            .sum();
        let outcome = u8::from(draw >= p0);

        let keep = if outcome == 0 { 0 } else { tm };
        let mut survived = 0.0;
        for (idx, a) in self.psi.iter_mut().enumerate() {
            if idx & tm != keep {
                *a = C_ZERO;
            } else {
                survived += a.norm_sqr();
            }
        }

        if survived < self.precision {
            log::warn!(
                "collapse of qubit {} landed on a branch with probability {:.3e}; resetting to |0…0⟩",
                target,
                survived
            );
            self.psi.fill(C_ZERO);
            self.psi[0] = C_ONE;
        } else {
            let norm = survived.sqrt();
            for a in &mut self.psi {
                *a /= norm;
            }
        }

        self.cache.clear();
        Ok(outcome)
    }

    fn probability_of(&self, target: N, value: u8) -> Result<R> {
        let tm = self.check_position(target)?;
        if value > 1 {
            return Err(Error::InvalidArgument(format!(
                "measurement value must be 0 or 1, got {}",
                value
            )));
        }
        let want = if value == 0 { 0 } else { tm };
        Ok(self
            .psi
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx & tm == want)
            .map(|(_, a)| a.norm_sqr())
            .sum())
    }

    fn joint_probability(&self, picks: &[(N, u8)]) -> Result<R> {
        let mut mask: Mask = 0;
        let mut want: Mask = 0;
        for &(k, v) in picks {
            let m = self.check_position(k)?;
            if v > 1 {
                return Err(Error::InvalidArgument(format!(
                    "measurement value must be 0 or 1, got {}",
                    v
                )));
            }
            mask |= m;
            if v == 1 {
                want |= m;
            }
        }
        Ok(self
            .psi
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx & mask == want)
            .map(|(_, a)| a.norm_sqr())
            .sum())
    }

    fn probability(&mut self, index: N) -> Result<R> {
        if index >= self.psi.len() {
            return Err(Error::InvalidArgument(format!(
                "basis index {} out of range for length {}",
                index,
                self.psi.len()
            )));
        }
        if let Some(p) = self.cache.get(index) {
            return Ok(p);
        }
        let p = self.psi[index].norm_sqr();
        self.cache.insert(index, p);
        Ok(p)
    }

    fn probabilities(&self) -> Vec<R> {
        self.psi.iter().map(|a| a.norm_sqr()).collect()
    }

    fn normalize(&mut self) {
        let norm = self.norm_sqr_sum().sqrt();
        if (norm - 1.0).abs() > self.precision {
            for a in &mut self.psi {
                *a /= norm;
            }
            self.cache.clear();
        }
    }

    fn set_state(&mut self, psi: Vec<C>) -> Result<()> {
        if psi.len() != self.psi.len() {
            return Err(Error::InvalidArgument(format!(
                "state length {} does not match 2^{} = {}",
                psi.len(),
                self.q_num,
                self.psi.len()
            )));
        }
        self.psi = psi;
        self.cache.clear();
        self.normalize();
        Ok(())
    }

    fn snapshot(&self) -> Vec<C> {
        self.psi.clone()
    }

    fn reset(&mut self) {
        self.psi.clear();
        self.psi.push(C_ONE);
        self.q_num = 0;
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gates,
        math::approx_cmp::{approx_eq_cplx_tol, approx_eq_tol},
        math::FRAC_1_SQRT_2,
    };

    const EPS: R = 1e-10;

    fn with_qubits(n: N) -> DenseState {
        let mut state = DenseState::new(32, EPS);
        for _ in 0..n {
            state.allocate().unwrap();
        }
        state
    }

    fn assert_normalized(state: &DenseState) {
        assert!(approx_eq_tol(state.norm_sqr_sum(), 1.0, EPS));
    }

    #[test]
    fn allocation_doubles_with_zero_upper_half() {
        let mut state = DenseState::new(3, EPS);
        assert_eq!(state.len(), 1);
        state.allocate().unwrap();
        assert_eq!(state.len(), 2);
        state.allocate().unwrap();
        assert_eq!(state.len(), 4);
        assert_eq!(state.snapshot()[1..], [C_ZERO, C_ZERO, C_ZERO]);

        state.allocate().unwrap();
        assert!(matches!(state.allocate(), Err(Error::CapacityExceeded(_))));
        assert_eq!(state.len(), 8);
    }

    #[test]
    fn hadamard_splits_amplitude() {
        let mut state = with_qubits(1);
        state.apply_single(0, &gates::HADAMARD).unwrap();
        let psi = state.snapshot();
        let expect = C { re: FRAC_1_SQRT_2, im: 0. };
        assert!(approx_eq_cplx_tol(&psi[0], &expect, EPS));
        assert!(approx_eq_cplx_tol(&psi[1], &expect, EPS));
        assert!(approx_eq_tol(state.probability(0).unwrap(), 0.5, EPS));
        assert!(approx_eq_tol(state.probability(1).unwrap(), 0.5, EPS));
        assert_normalized(&state);
    }

    #[test]
    fn cnot_fast_path_matches_generic_kernel() {
        for (c, t) in [(0, 1), (1, 0), (0, 2), (2, 1)] {
            let mut fast = with_qubits(3);
            fast.apply_single(0, &gates::HADAMARD).unwrap();
            fast.apply_single(2, &gates::rx(0.8)).unwrap();
            let mut generic = fast.clone();

            fast.apply_cnot(c, t).unwrap();
            generic.apply_two(c, t, &gates::CNOT).unwrap();

            for (a, b) in fast.snapshot().iter().zip(generic.snapshot().iter()) {
                assert!(approx_eq_cplx_tol(a, b, EPS));
            }
        }
    }

    #[test]
    fn swap_exchanges_basis_labels() {
        let mut state = with_qubits(2);
        // prepare |01⟩ (qubit 0 set)
        state.apply_single(0, &gates::PAULI_X).unwrap();
        state.apply_swap(0, 1).unwrap();
        let psi = state.snapshot();
        assert!(approx_eq_cplx_tol(&psi[0b10], &C_ONE, EPS));
        assert!(approx_eq_cplx_tol(&psi[0b01], &C_ZERO, EPS));
    }

    #[test]
    fn swap_matches_generic_kernel() {
        let mut fast = with_qubits(2);
        fast.apply_single(0, &gates::HADAMARD).unwrap();
        fast.apply_single(1, &gates::ry(0.3)).unwrap();
        let mut generic = fast.clone();

        fast.apply_swap(0, 1).unwrap();
        generic.apply_two(1, 0, &gates::SWAP).unwrap();

        for (a, b) in fast.snapshot().iter().zip(generic.snapshot().iter()) {
            assert!(approx_eq_cplx_tol(a, b, EPS));
        }
    }

    #[test]
    fn toffoli_flips_only_when_both_controls_set() {
        let mut state = with_qubits(3);
        state.apply_single(0, &gates::PAULI_X).unwrap();
        state.apply_single(1, &gates::PAULI_X).unwrap();
        state.apply_toffoli(0, 1, 2).unwrap();
        assert!(approx_eq_cplx_tol(&state.snapshot()[0b111], &C_ONE, EPS));

        // drop one control: target must stay put
        let mut state = with_qubits(3);
        state.apply_single(0, &gates::PAULI_X).unwrap();
        state.apply_toffoli(0, 1, 2).unwrap();
        assert!(approx_eq_cplx_tol(&state.snapshot()[0b001], &C_ONE, EPS));
    }

    #[test]
    fn controlled_kernel_matches_embedded_matrix() {
        let u = gates::ry(1.1);
        let mut sparse = with_qubits(2);
        sparse.apply_single(0, &gates::HADAMARD).unwrap();
        let mut generic = sparse.clone();

        sparse.apply_controlled(0, 1, &u).unwrap();
        generic.apply_two(0, 1, &gates::controlled(&u)).unwrap();

        for (a, b) in sparse.snapshot().iter().zip(generic.snapshot().iter()) {
            assert!(approx_eq_cplx_tol(a, b, EPS));
        }
    }

    #[test]
    fn measurement_collapses_and_renormalizes() {
        let mut state = with_qubits(1);
        state.apply_single(0, &gates::HADAMARD).unwrap();

        let mut zero = state.clone();
        assert_eq!(zero.measure(0, 0.2).unwrap(), 0);
        assert!(approx_eq_cplx_tol(&zero.snapshot()[0], &C_ONE, EPS));
        assert_normalized(&zero);

        let mut one = state;
        assert_eq!(one.measure(0, 0.9).unwrap(), 1);
        assert!(approx_eq_cplx_tol(&one.snapshot()[1], &C_ONE, EPS));
        assert_normalized(&one);
    }

    #[test]
    fn deterministic_state_measures_deterministically() {
        let mut state = with_qubits(2);
        state.apply_single(1, &gates::PAULI_X).unwrap();
        for draw in [0.0, 0.3, 0.999] {
            assert_eq!(state.measure(1, draw).unwrap(), 1);
            assert_eq!(state.measure(0, draw).unwrap(), 0);
        }
    }

    #[test]
    fn set_state_checks_length_and_renormalizes() {
        let mut state = with_qubits(1);
        assert!(state.set_state(vec![C_ONE; 4]).is_err());

        state
            .set_state(vec![C { re: 3.0, im: 0.0 }, C { re: 4.0, im: 0.0 }])
            .unwrap();
        assert!(approx_eq_tol(state.probability(0).unwrap(), 0.36, EPS));
        assert!(approx_eq_tol(state.probability(1).unwrap(), 0.64, EPS));
        assert_normalized(&state);
    }

    #[test]
    fn probability_cache_invalidated_by_mutation() {
        let mut state = with_qubits(1);
        assert!(approx_eq_tol(state.probability(0).unwrap(), 1.0, EPS));
        state.apply_single(0, &gates::PAULI_X).unwrap();
        assert!(approx_eq_tol(state.probability(0).unwrap(), 0.0, EPS));
        assert!(approx_eq_tol(state.probability(1).unwrap(), 1.0, EPS));
    }

    #[test]
    fn probability_cache_evicts_beyond_capacity() {
        let mut cache = ProbCache::default();
        for i in 0..(PROB_CACHE_CAP + 8) {
            cache.insert(i, i as R);
        }
        assert_eq!(cache.map.len(), PROB_CACHE_CAP);
        assert!(cache.get(0).is_none());
        assert!(cache.get(PROB_CACHE_CAP + 7).is_some());
    }

    #[test]
    fn debug_output_is_truncated() {
        let small = with_qubits(2);
        assert!(!format!("{:?}", small).contains(".."));

        let large = with_qubits(5);
        let shown = format!("{:?}", large);
        assert!(shown.contains(".."));
        assert!(shown.contains("DenseState"));
    }

    #[test]
    fn joint_probability_over_bell_pair() {
        let mut state = with_qubits(2);
        state.apply_single(0, &gates::HADAMARD).unwrap();
        state.apply_cnot(0, 1).unwrap();

        assert!(approx_eq_tol(state.joint_probability(&[]).unwrap(), 1.0, EPS));
        assert!(approx_eq_tol(
            state.joint_probability(&[(0, 0), (1, 0)]).unwrap(),
            0.5,
            EPS
        ));
        assert!(approx_eq_tol(
            state.joint_probability(&[(0, 0), (1, 1)]).unwrap(),
            0.0,
            EPS
        ));
        assert!(approx_eq_tol(state.probability_of(1, 1).unwrap(), 0.5, EPS));
    }

    #[test]
    fn gate_kernels_preserve_norm() {
        let mut state = with_qubits(3);
        state.apply_single(0, &gates::HADAMARD).unwrap();
        state.apply_single(1, &gates::rx(0.4)).unwrap();
        state.apply_two(0, 2, &gates::ISWAP).unwrap();
        state.apply_cnot(1, 2).unwrap();
        state.apply_single(2, &gates::PHASE_T).unwrap();
        assert_normalized(&state);
    }
}
