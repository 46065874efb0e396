//! Dense index sets with constant-time insertion, removal and sampling.

use nasch_core::RandomSource;

/// Set of cell indices stored as a dense member list plus a reverse lookup.
///
/// Member order depends only on the sequence of operations applied, so two
/// pools that saw the same history sample identically from the same source.
#[derive(Clone, Debug)]
pub(crate) struct IndexPool {
    members: Vec<usize>,
    slots: Vec<Option<usize>>,
}

impl IndexPool {
    /// Creates an empty pool able to hold indices below `capacity`.
    pub(crate) fn empty(capacity: usize) -> Self {
        Self {
            members: Vec::with_capacity(capacity),
            slots: vec![None; capacity],
        }
    }

    /// Creates a pool holding every index below `capacity`, in ascending order.
    pub(crate) fn full(capacity: usize) -> Self {
        Self {
            members: (0..capacity).collect(),
            slots: (0..capacity).map(Some).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.slots.get(index).copied().flatten().is_some()
    }

    pub(crate) fn insert(&mut self, index: usize) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if slot.is_some() {
            return;
        }
        *slot = Some(self.members.len());
        self.members.push(index);
    }

    pub(crate) fn remove(&mut self, index: usize) -> bool {
        let Some(position) = self.slots.get_mut(index).and_then(Option::take) else {
            return false;
        };
        let _ = self.members.swap_remove(position);
        if let Some(&moved) = self.members.get(position) {
            self.slots[moved] = Some(position);
        }
        true
    }

    /// Swaps `old` for `new` in place, keeping the member order intact.
    pub(crate) fn replace(&mut self, old: usize, new: usize) {
        if old == new || self.contains(new) {
            return;
        }
        let Some(position) = self.slots.get_mut(old).and_then(Option::take) else {
            return;
        };
        self.members[position] = new;
        self.slots[new] = Some(position);
    }

    /// Removes and returns a uniformly chosen member.
    pub(crate) fn take_random<R>(&mut self, rng: &mut R) -> Option<usize>
    where
        R: RandomSource + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        let position = rng.index_below(self.members.len());
        let index = *self.members.get(position)?;
        let removed = self.remove(index);
        debug_assert!(removed, "sampled member must be present");
        Some(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }
}
