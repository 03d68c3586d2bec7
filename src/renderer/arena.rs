const MIN_ALLOCATION: usize = 256;

/// Single growable buffer of `f32` units backing the vertex data of every
/// batch.
///
/// `len` is the portion handed out to batches (the sum of all batch
/// capacities); the allocation behind it grows with doubling so repeated
/// insertions amortize. Batches partition `0..len` with no gaps between
/// them, so opening room for one batch means shifting everything after it.
pub(crate) struct VertexArena {
    data: Vec<f32>,
    len: usize,
    relocated: bool,
}

impl VertexArena {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            len: 0,
            relocated: false,
        }
    }

    /// Units currently owned by batches.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Units allocated (always >= `len`).
    pub fn allocated(&self) -> usize {
        self.data.len()
    }

    /// Grow the allocation so `additional` more units fit past `len`.
    /// Sets the relocation flag when the backing store is replaced, which
    /// tells the renderer that every batch must fully re-upload.
    pub fn ensure(&mut self, additional: usize) {
        let required = self.len + additional;
        if required <= self.data.len() {
            return;
        }
        let new_alloc = required.max(self.data.len() * 2).max(MIN_ALLOCATION);
        log::info!(
            "Growing vertex arena: {} -> {} units",
            self.data.len(),
            new_alloc
        );
        self.data.resize(new_alloc, 0.0);
        self.relocated = true;
    }

    /// Open a `size`-unit gap at `at`, shifting `[at, len)` right.
    /// The gap itself keeps whatever bytes were there; the caller overwrites
    /// it before anything reads it.
    pub fn open_gap(&mut self, at: usize, size: usize) {
        debug_assert!(at <= self.len);
        self.ensure(size);
        self.data.copy_within(at..self.len, at + size);
        self.len += size;
    }

    /// Move `count` units from `from` down to `to` (`to <= from`); used by
    /// in-batch compaction to close gaps left by removed primitives.
    pub fn shift_down(&mut self, from: usize, to: usize, count: usize) {
        debug_assert!(to <= from);
        debug_assert!(from + count <= self.len);
        self.data.copy_within(from..from + count, to);
    }

    pub fn fill_zero(&mut self, offset: usize, count: usize) {
        self.data[offset..offset + count].fill(0.0);
    }

    pub fn take_relocated(&mut self) -> bool {
        std::mem::take(&mut self.relocated)
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.relocated = false;
    }

    pub fn slice(&self, offset: usize, count: usize) -> &[f32] {
        &self.data[offset..offset + count]
    }

    pub fn slice_mut(&mut self, offset: usize, count: usize) -> &mut [f32] {
        &mut self.data[offset..offset + count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: usize) -> VertexArena {
        let mut arena = VertexArena::new();
        arena.open_gap(0, n);
        for (i, v) in arena.slice_mut(0, n).iter_mut().enumerate() {
            *v = i as f32;
        }
        arena
    }

    #[test]
    fn ensure_doubles_and_flags_relocation() {
        let mut arena = VertexArena::new();
        arena.ensure(1);
        assert!(arena.take_relocated());
        assert_eq!(arena.allocated(), MIN_ALLOCATION);

        arena.open_gap(0, MIN_ALLOCATION);
        assert!(!arena.take_relocated(), "no realloc while room remains");

        arena.ensure(1);
        assert!(arena.take_relocated());
        assert_eq!(arena.allocated(), MIN_ALLOCATION * 2);
    }

    #[test]
    fn open_gap_preserves_shifted_content() {
        let mut arena = filled(8);
        arena.open_gap(4, 2);
        assert_eq!(arena.len(), 10);
        assert_eq!(arena.slice(0, 4), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(arena.slice(6, 4), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn open_gap_at_end_only_extends() {
        let mut arena = filled(4);
        arena.open_gap(4, 4);
        assert_eq!(arena.len(), 8);
        assert_eq!(arena.slice(0, 4), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn shift_down_closes_interior_gap() {
        let mut arena = filled(8);
        arena.shift_down(4, 2, 4);
        assert_eq!(arena.slice(2, 4), &[4.0, 5.0, 6.0, 7.0]);
    }
}
