use std::sync::atomic::{AtomicU32, Ordering};

use crate::primitive::{PrimitiveKey, PrimitiveStore};
use crate::renderer::arena::VertexArena;
use crate::renderer::batch::RenderBatch;
use crate::renderer::gpu::{transient_vertex_buffer, ArenaMirror, GpuContext, VertexBatch};
use crate::renderer::pipeline::{PipelineCache, PipelineDesc};
use crate::renderer::vertex::Vertex2D;

static NEXT_RENDERER_ID: AtomicU32 = AtomicU32::new(0);

/// Identity of one [`Renderer`], recorded as the owner of every primitive it
/// manages so a primitive can never be added to two renderers at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RendererError {
    #[error("primitive is already owned by a renderer")]
    AlreadyOwned,
    #[error("primitive is not owned by this renderer")]
    NotOwned,
    #[error("stale or unknown primitive handle")]
    InvalidHandle,
}

/// Counters for the most recent `prepare`/`draw` pair. The copy and upload
/// counts are the observable cost of a frame: an unchanged scene prepares
/// with all of them at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct RendererStats {
    pub grouped: u32,
    pub units_copied: usize,
    pub uploads: u32,
    pub units_uploaded: usize,
    pub batch_count: u32,
    pub draw_calls: u32,
}

/// Read-only view of one batch, for tests and debug overlays.
#[derive(Debug, Clone, Copy)]
pub struct BatchInfo {
    pub z: f32,
    pub offset: usize,
    pub capacity: usize,
    pub used_capacity: usize,
    pub slot_count: usize,
}

/// Where a grouped primitive's vertex data lives: absolute arena offset and
/// length in units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub batch: usize,
    pub offset: usize,
    pub len: usize,
}

/// Owner of the batch list, the vertex arena and its GPU mirror.
///
/// External collaborators (scene graph, text layout, ...) insert primitives
/// into a [`PrimitiveStore`] and hand the keys to `add_primitive`. Once per
/// frame the owner runs `elapse`, `prepare`, then `draw`; all mutation is
/// single-threaded and happens between draws.
pub struct Renderer {
    id: RendererId,
    batches: Vec<RenderBatch>,
    arena: VertexArena,
    mirror: ArenaMirror,
    /// Visible primitives waiting for their first grouping pass.
    pending: Vec<PrimitiveKey>,
    /// Owned but invisible (or empty) primitives; cheap to re-activate.
    hidden: Vec<PrimitiveKey>,
    stats: RendererStats,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            id: RendererId(NEXT_RENDERER_ID.fetch_add(1, Ordering::Relaxed)),
            batches: Vec::new(),
            arena: VertexArena::new(),
            mirror: ArenaMirror::new(),
            pending: Vec::new(),
            hidden: Vec::new(),
            stats: RendererStats::default(),
        }
    }

    pub fn id(&self) -> RendererId {
        self.id
    }

    /// Take ownership of a primitive. Grouping is deferred to the next
    /// `prepare` so bulk insertion stays cheap.
    pub fn add_primitive(
        &mut self,
        store: &mut PrimitiveStore,
        key: PrimitiveKey,
    ) -> Result<(), RendererError> {
        let entry = store.entry_mut(key).ok_or(RendererError::InvalidHandle)?;
        if entry.owner.is_some() {
            return Err(RendererError::AlreadyOwned);
        }
        entry.owner = Some(self.id);
        if entry.primitive.world_visible() && entry.primitive.vertex_len() > 0 {
            self.pending.push(key);
        } else {
            self.hidden.push(key);
        }
        Ok(())
    }

    /// Re-evaluate a primitive whose visibility, depth, size or key changed.
    /// Ungrouped primitives move between the pending and hidden lists in
    /// O(1); a grouped primitive goes through a full remove + add because its
    /// depth or compatibility key may differ now.
    pub fn refresh_primitive(
        &mut self,
        store: &mut PrimitiveStore,
        key: PrimitiveKey,
    ) -> Result<(), RendererError> {
        {
            let entry = store.entry_mut(key).ok_or(RendererError::InvalidHandle)?;
            if entry.owner != Some(self.id) {
                return Err(RendererError::NotOwned);
            }
            entry.primitive.refresh();
        }
        let wants_grouping = store
            .get(key)
            .map(|p| p.world_visible() && p.vertex_len() > 0)
            .unwrap_or(false);

        if let Some(i) = self.pending.iter().position(|&k| k == key) {
            if !wants_grouping {
                // preserve submission order of the remaining pending entries
                self.pending.remove(i);
                self.hidden.push(key);
            }
            return Ok(());
        }
        if let Some(i) = self.hidden.iter().position(|&k| k == key) {
            if wants_grouping {
                self.hidden.remove(i);
                self.pending.push(key);
            }
            return Ok(());
        }

        self.remove_primitive(store, key)?;
        self.add_primitive(store, key)
    }

    /// Release a primitive. Its slot stays in the batch as an empty gap,
    /// zeroed so stale vertices never rasterize, and is reclaimed by a later
    /// insertion or erased by `compress_batches`.
    pub fn remove_primitive(
        &mut self,
        store: &mut PrimitiveStore,
        key: PrimitiveKey,
    ) -> Result<(), RendererError> {
        {
            let entry = store.entry(key).ok_or(RendererError::InvalidHandle)?;
            if entry.owner != Some(self.id) {
                return Err(RendererError::NotOwned);
            }
        }

        // Most primitives are grouped, so batches are searched first.
        let mut found = false;
        for batch in &mut self.batches {
            if let Some(range) = batch.release(key) {
                let offset = batch.offset();
                self.arena.fill_zero(offset + range.start, range.len());
                found = true;
                break;
            }
        }
        if !found {
            if let Some(i) = self.pending.iter().position(|&k| k == key) {
                self.pending.remove(i);
                found = true;
            } else if let Some(i) = self.hidden.iter().position(|&k| k == key) {
                self.hidden.remove(i);
                found = true;
            }
        }
        if !found {
            log::warn!("Owned primitive was in no container; clearing ownership anyway");
        }
        if let Some(entry) = store.entry_mut(key) {
            entry.owner = None;
        }
        Ok(())
    }

    /// Release every owned primitive and empty all containers.
    pub fn clear_primitives(&mut self, store: &mut PrimitiveStore) {
        let keys = self.owned_keys();
        for key in keys {
            if let Some(entry) = store.entry_mut(key) {
                entry.owner = None;
            }
        }
        self.batches.clear();
        self.pending.clear();
        self.hidden.clear();
        self.arena.clear();
        self.mirror.invalidate();
    }

    /// Forward elapsed time to every owned primitive.
    pub fn elapse(&mut self, store: &mut PrimitiveStore, dt: f32) {
        for key in self.owned_keys() {
            if let Some(prim) = store.get_mut(key) {
                prim.elapse(dt);
            }
        }
    }

    /// Frame synchronization: run per-primitive prepare hooks, group newly
    /// added primitives, then copy changed vertex data into the arena and
    /// upload the minimal dirty range of each batch. Pass `None` for `gpu`
    /// to maintain the CPU side only (headless / tests).
    pub fn prepare(&mut self, store: &mut PrimitiveStore, gpu: Option<&GpuContext>) {
        self.stats = RendererStats::default();

        for batch in &mut self.batches {
            batch.run_prepare_hooks(store);
        }
        for &key in &self.pending {
            if let Some(prim) = store.get_mut(key) {
                prim.prepare();
            }
        }

        self.group_added_primitives(store);
        self.prepare_vertex_data(store, gpu);

        self.stats.batch_count = self.batches.len() as u32;
        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    /// Erase the empty slots of every batch, shifting occupied vertex data
    /// down inside each batch's range. Batch capacities are unchanged, so
    /// later batch offsets stay put and the reclaimed space absorbs future
    /// insertions. Callers run this occasionally, not per frame: a freed
    /// slot that is still around when a matching primitive arrives is reused
    /// without any data movement.
    pub fn compress_batches(&mut self) {
        for batch in &mut self.batches {
            batch.compress(&mut self.arena);
        }
    }

    /// Issue one draw call per non-vacant batch, in ascending depth order.
    /// The pipeline is switched only when the pipeline-relevant key actually
    /// changes between consecutive batches.
    pub fn draw(
        &mut self,
        rpass: &mut wgpu::RenderPass<'_>,
        pipelines: &mut PipelineCache,
        ctx: &GpuContext,
        store: &PrimitiveStore,
    ) {
        // No resident mirror (creation refused or headless prepare): feed
        // the draw straight from the CPU-side arena.
        let fallback = if self.mirror.buffer().is_none() && self.arena.len() > 0 {
            Some(transient_vertex_buffer(
                ctx,
                self.arena.slice(0, self.arena.len()),
            ))
        } else {
            None
        };

        let mut last_desc: Option<PipelineDesc> = None;
        let mut draw_calls = 0u32;

        for batch in &self.batches {
            if batch.is_vacant() {
                continue;
            }
            let Some(key) = batch.occupant_key(store) else {
                continue;
            };
            let span = batch.vertex_span();
            if span == 0 {
                continue;
            }

            let desc = PipelineDesc::from_key(key);
            if last_desc != Some(desc) {
                rpass.set_pipeline(pipelines.get(ctx, desc));
                last_desc = Some(desc);
            }

            let stride = batch
                .first_occupant(store)
                .and_then(|k| store.get(k))
                .map(|p| p.vertex_layout().array_stride as usize / std::mem::size_of::<f32>())
                .unwrap_or(Vertex2D::FLOATS);

            let view = match (self.mirror.buffer(), batch.gpu.as_ref(), &fallback) {
                (Some(buffer), Some(_), _) | (None, _, Some(buffer)) => {
                    let range = VertexBatch {
                        offset: batch.offset(),
                        len: span,
                    };
                    buffer.slice(range.byte_range())
                }
                _ => continue,
            };
            rpass.set_vertex_buffer(0, view);
            rpass.draw(0..(span / stride) as u32, 0..1);
            draw_calls += 1;
        }

        self.stats.draw_calls = draw_calls;
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn hidden_len(&self) -> usize {
        self.hidden.len()
    }

    pub fn batch_info(&self, index: usize) -> Option<BatchInfo> {
        self.batches.get(index).map(|batch| BatchInfo {
            z: batch.z(),
            offset: batch.offset(),
            capacity: batch.capacity(),
            used_capacity: batch.used_capacity(),
            slot_count: batch.slot_count(),
        })
    }

    /// Locate a grouped primitive's slot.
    pub fn slot_of(&self, key: PrimitiveKey) -> Option<SlotInfo> {
        for (index, batch) in self.batches.iter().enumerate() {
            let mut rel = 0usize;
            for slot in batch.slots() {
                if slot.primitive == Some(key) {
                    return Some(SlotInfo {
                        batch: index,
                        offset: batch.offset() + rel,
                        len: slot.capacity,
                    });
                }
                rel += slot.capacity;
            }
        }
        None
    }

    /// The arena units currently backing a grouped primitive.
    pub fn slot_data(&self, key: PrimitiveKey) -> Option<&[f32]> {
        let info = self.slot_of(key)?;
        Some(self.arena.slice(info.offset, info.len))
    }

    /// Panics when a structural invariant is broken: batches sorted by z,
    /// batch ranges partitioning the arena exactly, slot capacities summing
    /// to their batch's capacity. Runs automatically after every `prepare`
    /// in debug builds.
    pub fn check_invariants(&self) {
        let mut expected_offset = 0usize;
        let mut prev_z = f32::NEG_INFINITY;
        for batch in &self.batches {
            assert!(batch.z() >= prev_z, "batches must stay sorted by z");
            prev_z = batch.z();
            assert_eq!(
                batch.offset(),
                expected_offset,
                "batches must partition the arena without gaps"
            );
            expected_offset += batch.capacity();
            batch.assert_invariants();
        }
        assert_eq!(
            expected_offset,
            self.arena.len(),
            "arena length must equal the sum of batch capacities"
        );
    }

    fn owned_keys(&self) -> Vec<PrimitiveKey> {
        let mut keys: Vec<PrimitiveKey> = self
            .batches
            .iter()
            .flat_map(|batch| batch.slots().iter().filter_map(|slot| slot.primitive))
            .collect();
        keys.extend(self.pending.iter().copied());
        keys.extend(self.hidden.iter().copied());
        keys
    }

    /// Sort pending primitives by depth (stable, so equal depths keep
    /// submission order — that tie-break is part of the draw-order
    /// contract), then place each one.
    fn group_added_primitives(&mut self, store: &mut PrimitiveStore) {
        if self.pending.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut self.pending);
        pending.retain(|&key| {
            let live = store.get(key).is_some();
            if !live {
                log::warn!("Dropping stale pending primitive handle");
            }
            live
        });
        pending.sort_by(|&a, &b| {
            let za = store.get(a).map(|p| p.z()).unwrap_or(0.0);
            let zb = store.get(b).map(|p| p.z()).unwrap_or(0.0);
            za.total_cmp(&zb)
        });
        for key in pending {
            self.place_primitive(store, key);
            self.stats.grouped += 1;
        }
    }

    /// The grouping scan: walk batches from the high-z end down. First
    /// choice is a batch at this depth whose occupants share the
    /// compatibility key; second, a vacant batch at this depth (claimed for
    /// the new key, dropping its GPU mirror); otherwise the scan has
    /// recorded where a new batch keeps the list sorted.
    fn place_primitive(&mut self, store: &PrimitiveStore, key: PrimitiveKey) {
        let Some(prim) = store.get(key) else {
            return;
        };
        let z = prim.z();
        let batch_key = prim.batch_key();
        let needed = prim.vertex_len();

        let mut insert_at = self.batches.len();
        let mut matching = None;
        let mut vacant = None;
        for i in (0..self.batches.len()).rev() {
            let bz = self.batches[i].z();
            if bz > z {
                insert_at = i;
                continue;
            }
            if bz < z {
                break;
            }
            insert_at = i;
            match self.batches[i].occupant_key(store) {
                Some(k) if k == batch_key => {
                    matching = Some(i);
                    break;
                }
                None => {
                    // keep scanning: a batch already holding this key wins
                    // over claiming a vacant one
                    if vacant.is_none() {
                        vacant = Some(i);
                    }
                }
                Some(_) => {}
            }
        }

        let index = match (matching, vacant) {
            (Some(i), _) => i,
            (None, Some(i)) => {
                self.batches[i].reset_mirror();
                i
            }
            (None, None) => {
                let offset = if insert_at == self.batches.len() {
                    self.arena.len()
                } else {
                    self.batches[insert_at].offset()
                };
                self.batches.insert(insert_at, RenderBatch::new(z, offset));
                insert_at
            }
        };
        debug_assert!(needed > 0);
        self.group_with_batch(index, key, needed);
    }

    /// Best-fit into an existing empty slot of the batch, else append a new
    /// exactly-sized slot, growing the arena and shifting later batches.
    fn group_with_batch(&mut self, index: usize, key: PrimitiveKey, needed: usize) {
        if let Some(slot) = self.batches[index].best_fit_slot(needed) {
            self.batches[index].occupy(slot, key, needed);
        } else {
            self.grow_batch(index, needed);
            self.batches[index].append_slot(key, needed);
        }
    }

    /// Open `size` units of arena room at the tail of batch `index`. Every
    /// later batch shifts right and must fully re-upload, since its bytes
    /// moved inside the shared buffer.
    fn grow_batch(&mut self, index: usize, size: usize) {
        let tail = self.batches[index].offset() + self.batches[index].capacity();
        self.arena.open_gap(tail, size);
        for batch in &mut self.batches[index + 1..] {
            batch.shift_right(size);
            batch.mark_full_upload();
        }
    }

    /// Copy changed slots into the arena and push each batch's minimal dirty
    /// range to the GPU mirror. A relocated arena (or a recreated mirror
    /// buffer) forces every batch to re-upload its whole range and rebind
    /// its buffer view.
    fn prepare_vertex_data(&mut self, store: &PrimitiveStore, gpu: Option<&GpuContext>) {
        let mut relocated = self.arena.take_relocated();
        if let Some(ctx) = gpu {
            if self.arena.len() > 0 && self.mirror.ensure(ctx, self.arena.allocated()) {
                relocated = true;
            }
        }

        for batch in &mut self.batches {
            let sync = batch.sync_slots(store, &mut self.arena, relocated);
            self.stats.units_copied += sync.units_copied;
            let Some(range) = sync.upload else {
                continue;
            };
            if batch.is_vacant() {
                // nothing will draw from this batch; skip the upload but keep
                // the mirror view dropped until it is claimed again
                continue;
            }
            if let Some(ctx) = gpu {
                if self.mirror.buffer().is_some() {
                    self.mirror
                        .write(ctx, self.arena.slice(range.start, range.len()), range.start);
                    self.stats.uploads += 1;
                    self.stats.units_uploaded += range.len();
                }
            }
            batch.gpu = Some(VertexBatch {
                offset: batch.offset(),
                len: batch.capacity(),
            });
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{DrawMode, MeshPrimitive, PrimitiveStore};
    use crate::renderer::material::Material;
    use crate::renderer::vertex::v2;

    fn mesh(z: f32, vertices: usize) -> MeshPrimitive {
        let verts = (0..vertices)
            .map(|i| v2([i as f32, z], [0.0, 0.0], [1.0; 4]))
            .collect();
        MeshPrimitive::new(DrawMode::TriangleList, Material::flat())
            .with_vertices(verts)
            .with_z(z)
    }

    #[test]
    fn double_add_is_rejected_without_state_change() {
        let mut store = PrimitiveStore::new();
        let mut renderer = Renderer::new();
        let key = store.insert(mesh(0.0, 3));

        renderer.add_primitive(&mut store, key).unwrap();
        assert_eq!(
            renderer.add_primitive(&mut store, key),
            Err(RendererError::AlreadyOwned)
        );
        assert_eq!(renderer.pending_len(), 1);
    }

    #[test]
    fn foreign_renderer_cannot_remove() {
        let mut store = PrimitiveStore::new();
        let mut owner = Renderer::new();
        let mut other = Renderer::new();
        let key = store.insert(mesh(0.0, 3));

        owner.add_primitive(&mut store, key).unwrap();
        assert_eq!(
            other.remove_primitive(&mut store, key),
            Err(RendererError::NotOwned)
        );
        // still owned and groupable by the original renderer
        owner.prepare(&mut store, None);
        assert_eq!(owner.batch_count(), 1);
    }

    #[test]
    fn invisible_primitives_wait_in_the_hidden_list() {
        let mut store = PrimitiveStore::new();
        let mut renderer = Renderer::new();
        let mut prim = mesh(0.0, 3);
        prim.set_visible(false);
        let key = store.insert(prim);

        renderer.add_primitive(&mut store, key).unwrap();
        assert_eq!(renderer.hidden_len(), 1);
        renderer.prepare(&mut store, None);
        assert_eq!(renderer.batch_count(), 0);
        assert_eq!(renderer.arena_len(), 0);
    }
}
