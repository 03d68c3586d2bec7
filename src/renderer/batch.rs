use std::ops::Range;

use crate::primitive::{BatchKey, PrimitiveKey, PrimitiveStore};
use crate::renderer::arena::VertexArena;
use crate::renderer::gpu::VertexBatch;

/// A contiguous sub-range of a batch's vertex range: either the vertex data
/// of exactly one primitive, or an empty gap available for reuse.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub capacity: usize,
    pub primitive: Option<PrimitiveKey>,
    pub need_update: bool,
}

impl Slot {
    fn empty(capacity: usize) -> Self {
        Self {
            capacity,
            primitive: None,
            need_update: false,
        }
    }

    fn occupied(capacity: usize, primitive: PrimitiveKey) -> Self {
        Self {
            capacity,
            primitive: Some(primitive),
            need_update: true,
        }
    }
}

/// Result of copying a batch's out-of-date slots into the arena.
pub(crate) struct SlotSync {
    pub units_copied: usize,
    /// Absolute arena range that must reach the GPU, if any.
    pub upload: Option<Range<usize>>,
}

/// An ordered run of slots sharing one depth value, one compatibility key and
/// one GPU buffer view.
///
/// Batches partition the arena: this batch owns arena units
/// `[offset, offset + capacity)`. Gaps only ever exist *inside* a batch, as
/// empty slots; the renderer keeps batch ranges themselves back to back.
pub(crate) struct RenderBatch {
    z: f32,
    offset: usize,
    capacity: usize,
    used_capacity: usize,
    slots: Vec<Slot>,
    pub(crate) gpu: Option<VertexBatch>,
    /// Batch-relative range that changed outside the slot bookkeeping
    /// (released slots, compaction moves); folded into the next sync.
    dirty: Option<Range<usize>>,
    /// Set when the whole range is stale: arena relocation, a shift caused by
    /// an earlier batch growing, or this batch being claimed for a new key.
    full_upload: bool,
}

impl RenderBatch {
    pub fn new(z: f32, offset: usize) -> Self {
        Self {
            z,
            offset,
            capacity: 0,
            used_capacity: 0,
            slots: Vec::new(),
            gpu: None,
            dirty: None,
            full_upload: false,
        }
    }

    pub fn z(&self) -> f32 {
        self.z
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used_capacity(&self) -> usize {
        self.used_capacity
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// True when no slot holds a primitive. A vacant batch stays resident as
    /// an allocation hint and may be claimed by a different compatibility key.
    pub fn is_vacant(&self) -> bool {
        self.used_capacity == 0
    }

    /// The compatibility key of the batch's occupants, from the first
    /// occupied slot; batches are homogeneous so one representative is
    /// enough. `None` for a vacant batch.
    pub fn occupant_key(&self, store: &PrimitiveStore) -> Option<BatchKey> {
        self.first_occupant(store)
            .and_then(|key| store.get(key))
            .map(|prim| prim.batch_key())
    }

    pub fn first_occupant(&self, store: &PrimitiveStore) -> Option<PrimitiveKey> {
        self.slots
            .iter()
            .filter_map(|slot| slot.primitive)
            .find(|&key| store.get(key).is_some())
    }

    /// Claim a vacant batch for a new compatibility key: the old GPU mirror
    /// no longer matches the incoming vertex layout and is dropped.
    pub fn reset_mirror(&mut self) {
        self.gpu = None;
        self.full_upload = true;
    }

    pub fn mark_full_upload(&mut self) {
        self.full_upload = true;
    }

    pub fn shift_right(&mut self, amount: usize) {
        self.offset += amount;
    }

    /// Arena offset of slot `index` relative to the batch start.
    fn slot_rel_offset(&self, index: usize) -> usize {
        self.slots[..index].iter().map(|slot| slot.capacity).sum()
    }

    /// Best-fit search: the empty slot with the smallest non-negative
    /// leftover, first-found on ties (strict `<` keeps the lowest offset).
    pub fn best_fit_slot(&self, needed: usize) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.primitive.is_some() || slot.capacity < needed {
                continue;
            }
            let leftover = slot.capacity - needed;
            if best.map_or(true, |(_, b)| leftover < b) {
                best = Some((index, leftover));
                if leftover == 0 {
                    break;
                }
            }
        }
        best.map(|(index, _)| index)
    }

    /// Place a primitive into the empty slot at `index`, splitting off the
    /// leftover capacity into a fresh empty slot right after it.
    pub fn occupy(&mut self, index: usize, primitive: PrimitiveKey, needed: usize) {
        let slot = &mut self.slots[index];
        debug_assert!(slot.primitive.is_none());
        debug_assert!(slot.capacity >= needed);
        let leftover = slot.capacity - needed;
        slot.capacity = needed;
        slot.primitive = Some(primitive);
        slot.need_update = true;
        if leftover > 0 {
            self.slots.insert(index + 1, Slot::empty(leftover));
        }
        self.used_capacity += needed;
    }

    /// Append a new exactly-sized slot at the end of the batch. The caller
    /// has already opened `needed` units of arena room at the batch's tail.
    pub fn append_slot(&mut self, primitive: PrimitiveKey, needed: usize) {
        self.slots.push(Slot::occupied(needed, primitive));
        self.capacity += needed;
        self.used_capacity += needed;
    }

    /// Free the slot holding `primitive`. The slot keeps its capacity for
    /// reuse; the returned batch-relative range should be zeroed in the arena
    /// so stale vertices never rasterize.
    pub fn release(&mut self, primitive: PrimitiveKey) -> Option<Range<usize>> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.primitive == Some(primitive))?;
        let start = self.slot_rel_offset(index);
        let capacity = self.slots[index].capacity;
        let range = start..start + capacity;
        self.slots[index].primitive = None;
        self.slots[index].need_update = false;
        self.used_capacity -= capacity;
        self.extend_dirty(range.clone());
        Some(range)
    }

    fn extend_dirty(&mut self, range: Range<usize>) {
        self.dirty = Some(match self.dirty.take() {
            Some(d) => d.start.min(range.start)..d.end.max(range.end),
            None => range,
        });
    }

    /// Remove every empty slot from the first one onward, shifting occupied
    /// vertex data down to close the gaps. Batch capacity is unchanged; the
    /// reclaimed space becomes one trailing empty slot so future insertions
    /// land here instead of growing the arena.
    pub fn compress(&mut self, arena: &mut VertexArena) {
        let Some(first_empty) = self.slots.iter().position(|s| s.primitive.is_none()) else {
            return;
        };
        let tail_start = self.slot_rel_offset(first_empty);
        let mut write = tail_start;
        let mut read = tail_start;

        let mut slots = std::mem::take(&mut self.slots);
        let mut kept: Vec<Slot> = slots.drain(..first_empty).collect();
        for mut slot in slots {
            if slot.primitive.is_some() {
                if read != write {
                    arena.shift_down(self.offset + read, self.offset + write, slot.capacity);
                    slot.need_update = true;
                }
                read += slot.capacity;
                write += slot.capacity;
                kept.push(slot);
            } else {
                read += slot.capacity;
            }
        }

        let free = self.capacity - write;
        if free > 0 {
            arena.fill_zero(self.offset + write, free);
            kept.push(Slot::empty(free));
        }
        self.slots = kept;
        self.used_capacity = self
            .slots
            .iter()
            .filter(|slot| slot.primitive.is_some())
            .map(|slot| slot.capacity)
            .sum();
        self.extend_dirty(tail_start..self.capacity);
    }

    /// Run the per-frame `prepare` hook on every occupant; a primitive that
    /// reports changed bytes gets its slot queued for re-copy.
    pub fn run_prepare_hooks(&mut self, store: &mut PrimitiveStore) {
        for slot in &mut self.slots {
            let Some(key) = slot.primitive else {
                continue;
            };
            if let Some(prim) = store.get_mut(key) {
                if prim.prepare() {
                    slot.need_update = true;
                }
            }
        }
    }

    /// Copy the current vertex data of every out-of-date slot into the arena
    /// and fold the touched ranges into one minimal contiguous upload range.
    pub fn sync_slots(
        &mut self,
        store: &PrimitiveStore,
        arena: &mut VertexArena,
        force_full: bool,
    ) -> SlotSync {
        let mut units_copied = 0usize;
        let mut dirty = self.dirty.take();
        let mut rel = 0usize;

        for slot in &mut self.slots {
            let start = rel;
            rel += slot.capacity;
            if !slot.need_update {
                continue;
            }
            slot.need_update = false;
            let Some(key) = slot.primitive else {
                continue;
            };
            let Some(prim) = store.get(key) else {
                log::warn!("Skipping slot with stale primitive handle");
                continue;
            };
            let data = prim.world_vertex_data();
            debug_assert_eq!(data.len(), slot.capacity);
            if data.len() != slot.capacity {
                log::warn!(
                    "Primitive vertex data ({} units) does not fill its slot ({} units)",
                    data.len(),
                    slot.capacity
                );
            }
            let count = data.len().min(slot.capacity);
            arena
                .slice_mut(self.offset + start, count)
                .copy_from_slice(&data[..count]);
            units_copied += count;
            let range = start..start + count;
            dirty = Some(match dirty {
                Some(d) => d.start.min(range.start)..d.end.max(range.end),
                None => range,
            });
        }

        let full = force_full || std::mem::take(&mut self.full_upload);
        let upload = if full && self.capacity > 0 {
            Some(self.offset..self.offset + self.capacity)
        } else {
            dirty
                .filter(|d| !d.is_empty())
                .map(|d| self.offset + d.start..self.offset + d.end)
        };

        SlotSync {
            units_copied,
            upload,
        }
    }

    /// Units from the batch start to the end of the last occupied slot; the
    /// draw call covers exactly this span (interior gaps are zeroed and
    /// rasterize as degenerate geometry).
    pub fn vertex_span(&self) -> usize {
        let mut rel = 0usize;
        let mut span = 0usize;
        for slot in &self.slots {
            rel += slot.capacity;
            if slot.primitive.is_some() {
                span = rel;
            }
        }
        span
    }

    /// Debug validation of the capacity-accounting invariants.
    pub fn assert_invariants(&self) {
        let total: usize = self.slots.iter().map(|slot| slot.capacity).sum();
        assert_eq!(total, self.capacity, "slot capacities must sum to batch capacity");
        let used: usize = self
            .slots
            .iter()
            .filter(|slot| slot.primitive.is_some())
            .map(|slot| slot.capacity)
            .sum();
        assert_eq!(used, self.used_capacity, "used capacity accounting drifted");
        assert!(self.used_capacity <= self.capacity);
    }
}
