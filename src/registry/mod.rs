//! Qubit handles and their mapping onto state-vector bit positions.
//!
//! Handles are opaque 128-bit random tokens. Bit positions are assigned from
//! a monotonic counter and are never reused after deallocation; the state
//! vector therefore only ever grows within a VM lifetime (long-churn
//! workloads should `reset`). Entanglement classes are tracked in a
//! union-find keyed by position, and member lists are derived lazily from
//! the live handle table.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    error::{Error, Result},
    math::N,
    state::StateBackend,
};

mod union_find;

use union_find::UnionFind;

/// Opaque identifier for a live qubit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QubitHandle(Uuid);

impl QubitHandle {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for QubitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q:{}", &self.0.as_simple().to_string()[..8])
    }
}

#[derive(Debug, Clone)]
pub struct QubitRegistry {
    positions: HashMap<QubitHandle, N>,
    next_position: N,
    max_handles: N,
    sets: UnionFind,
}

impl QubitRegistry {
    pub fn new(max_handles: N) -> Self {
        Self {
            positions: HashMap::new(),
            next_position: 0,
            max_handles,
            sets: UnionFind::default(),
        }
    }

    /// Allocate a fresh qubit: reserves the next bit position, grows the
    /// state vector by one qubit and returns the new handle. Nothing is
    /// mutated when either limit is hit.
    pub fn allocate(&mut self, backend: &mut impl StateBackend) -> Result<QubitHandle> {
        if self.positions.len() >= self.max_handles {
            return Err(Error::CapacityExceeded(format!(
                "registry is capped at {} live qubits",
                self.max_handles
            )));
        }
        backend.allocate()?;

        let position = self.next_position;
        self.next_position += 1;
        debug_assert_eq!(self.next_position, backend.qubit_count());

        let handle = QubitHandle::fresh();
        self.positions.insert(handle, position);
        let node = self.sets.push();
        debug_assert_eq!(node, position);
        Ok(handle)
    }

    pub fn allocate_many(
        &mut self,
        backend: &mut impl StateBackend,
        count: N,
    ) -> Result<Vec<QubitHandle>> {
        if count == 0 {
            return Err(Error::InvalidArgument(
                "allocation count must be positive".into(),
            ));
        }
        (0..count).map(|_| self.allocate(backend)).collect()
    }

    /// Release a handle. Returns false when the handle is unknown. The bit
    /// position is not reclaimed and the state vector keeps its width.
    pub fn deallocate(&mut self, handle: QubitHandle) -> bool {
        let Some(position) = self.positions.get(&handle).copied() else {
            return false;
        };
        let entangled = self.entangled_with_position(position);
        if !entangled.is_empty() {
            log::warn!(
                "deallocating {} while it is entangled with {} other qubit(s)",
                handle,
                entangled.len()
            );
        }
        self.positions.remove(&handle);
        true
    }

    pub fn position_of(&self, handle: QubitHandle) -> Result<N> {
        self.positions.get(&handle).copied().ok_or_else(|| {
            Error::InvalidQubitReference(format!("{} is not a live qubit", handle))
        })
    }

    /// Live handles, ordered by ascending bit position.
    pub fn handles(&self) -> Vec<QubitHandle> {
        let mut all: Vec<_> = self.positions.iter().map(|(&h, &p)| (p, h)).collect();
        all.sort_unstable();
        all.into_iter().map(|(_, h)| h).collect()
    }

    pub fn len(&self) -> N {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Merge the entanglement classes of two live qubits.
    pub fn record_entanglement(&mut self, a: QubitHandle, b: QubitHandle) -> Result<()> {
        let pa = self.position_of(a)?;
        let pb = self.position_of(b)?;
        self.sets.union(pa, pb);
        Ok(())
    }

    pub fn are_entangled(&mut self, a: QubitHandle, b: QubitHandle) -> Result<bool> {
        let pa = self.position_of(a)?;
        let pb = self.position_of(b)?;
        Ok(self.sets.same(pa, pb))
    }

    /// Every live qubit sharing a class with `handle`, excluding itself.
    pub fn entangled_with(&mut self, handle: QubitHandle) -> Result<Vec<QubitHandle>> {
        let position = self.position_of(handle)?;
        Ok(self
            .entangled_with_position(position)
            .into_iter()
            .map(|(_, h)| h)
            .collect())
    }

    fn entangled_with_position(&mut self, position: N) -> Vec<(N, QubitHandle)> {
        let root = self.sets.find(position);
        let mut members: Vec<_> = self
            .positions
            .iter()
            .map(|(&h, &p)| (p, h))
            .collect();
        members.retain(|&(p, _)| p != position && self.sets.find(p) == root);
        members.sort_unstable();
        members
    }

    pub fn reset(&mut self) {
        self.positions.clear();
        self.next_position = 0;
        self.sets.clear();
    }
}
