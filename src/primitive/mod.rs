mod glyph;
mod mesh;
mod sprite;

pub use glyph::{GlyphQuad, GlyphRunPrimitive};
pub use mesh::MeshPrimitive;
pub use sprite::SpritePrimitive;

use slotmap::{new_key_type, SlotMap};

use crate::renderer::{Material, RendererId, Vertex2D};

new_key_type! {
    /// Generation-counted handle to a primitive in a [`PrimitiveStore`].
    /// Stale handles simply fail to resolve; nothing dangles.
    pub struct PrimitiveKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    TriangleList,
    LineList,
    LineStrip,
    PointList,
}

impl DrawMode {
    pub fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            Self::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            Self::LineList => wgpu::PrimitiveTopology::LineList,
            Self::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            Self::PointList => wgpu::PrimitiveTopology::PointList,
        }
    }
}

/// Compatibility key: everything that forces two primitives into separate
/// draw calls. Primitives sharing a batch must compare equal on all of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub mode: DrawMode,
    pub material: Material,
    pub wireframe: bool,
    line_width_bits: u32,
}

impl BatchKey {
    pub fn new(mode: DrawMode, material: Material) -> Self {
        Self {
            mode,
            material,
            wireframe: false,
            line_width_bits: 1.0f32.to_bits(),
        }
    }

    pub fn with_wireframe(mut self) -> Self {
        self.wireframe = true;
        self
    }

    /// Stored as bits so the key stays `Eq + Hash`.
    pub fn with_line_width(mut self, width: f32) -> Self {
        self.line_width_bits = width.to_bits();
        self
    }

    pub fn line_width(&self) -> f32 {
        f32::from_bits(self.line_width_bits)
    }
}

/// Per-primitive GPU state applied when the batch draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawState {
    pub point_size: f32,
    pub line_width: f32,
    pub wireframe: bool,
    pub point_sprite: bool,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            point_size: 1.0,
            line_width: 1.0,
            wireframe: false,
            point_sprite: false,
        }
    }
}

/// Capability interface every batched primitive implements.
///
/// A primitive is a pass-through producer of vertex data: it owns its
/// current vertex bytes and answers size, depth, visibility and
/// compatibility queries. It never touches batch, slot or arena state.
pub trait Primitive {
    /// World depth; batches are drawn in ascending `z` order.
    fn z(&self) -> f32;

    fn world_visible(&self) -> bool;

    fn vertex_count(&self) -> u32;

    /// Vertex data size in arena units (f32 scalars). Must equal
    /// `world_vertex_data().len()` after `prepare`.
    fn vertex_len(&self) -> usize;

    /// The current vertex bytes, copied verbatim into the primitive's slot.
    fn world_vertex_data(&self) -> &[f32];

    fn batch_key(&self) -> BatchKey;

    fn draw_state(&self) -> DrawState {
        DrawState::default()
    }

    /// GPU binding descriptor for this primitive's vertex layout.
    fn vertex_layout(&self) -> wgpu::VertexBufferLayout<'static> {
        Vertex2D::layout()
    }

    /// Per-frame hook, called before the batcher reads the vertex bytes.
    /// Rebuild cached data here and return true when the bytes changed.
    fn prepare(&mut self) -> bool {
        false
    }

    /// Hook invoked by `Renderer::refresh_primitive`.
    fn refresh(&mut self) {}

    /// Time hook forwarded from `Renderer::elapse`.
    fn elapse(&mut self, _dt: f32) {}

    /// Two primitives may share a batch iff their compatibility keys match.
    fn is_groupable(&self, other: &dyn Primitive) -> bool {
        self.batch_key() == other.batch_key()
    }

    /// Downcast support so owners can reach their concrete primitive again
    /// through [`PrimitiveStore::get_typed`].
    fn as_any(&self) -> &dyn std::any::Any;

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

pub(crate) struct PrimitiveEntry {
    pub primitive: Box<dyn Primitive>,
    /// The "parent renderer" back-reference: set by `add_primitive`, cleared
    /// by `remove_primitive`/`clear_primitives`. One renderer per primitive.
    pub owner: Option<RendererId>,
}

/// Index-stable storage for primitives. External owners keep
/// [`PrimitiveKey`]s; renderers reference primitives only through them.
#[derive(Default)]
pub struct PrimitiveStore {
    entries: SlotMap<PrimitiveKey, PrimitiveEntry>,
}

impl PrimitiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, primitive: impl Primitive + 'static) -> PrimitiveKey {
        self.entries.insert(PrimitiveEntry {
            primitive: Box::new(primitive),
            owner: None,
        })
    }

    /// Remove a primitive from the store. Removing one still owned by a
    /// renderer is allowed but leaves that renderer holding a stale handle,
    /// which it skips (and logs) on the next frame; prefer
    /// `Renderer::remove_primitive` first.
    pub fn remove(&mut self, key: PrimitiveKey) -> Option<Box<dyn Primitive>> {
        let entry = self.entries.remove(key)?;
        if entry.owner.is_some() {
            log::warn!("Primitive removed from store while still owned by a renderer");
        }
        Some(entry.primitive)
    }

    pub fn get(&self, key: PrimitiveKey) -> Option<&dyn Primitive> {
        self.entries.get(key).map(|entry| entry.primitive.as_ref())
    }

    pub fn get_mut(&mut self, key: PrimitiveKey) -> Option<&mut (dyn Primitive + 'static)> {
        self.entries
            .get_mut(key)
            .map(|entry| entry.primitive.as_mut())
    }

    pub fn get_typed<T: Primitive + 'static>(&self, key: PrimitiveKey) -> Option<&T> {
        self.get(key)?.as_any().downcast_ref::<T>()
    }

    pub fn get_typed_mut<T: Primitive + 'static>(&mut self, key: PrimitiveKey) -> Option<&mut T> {
        self.get_mut(key)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn contains(&self, key: PrimitiveKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entry(&self, key: PrimitiveKey) -> Option<&PrimitiveEntry> {
        self.entries.get(key)
    }

    pub(crate) fn entry_mut(&mut self, key: PrimitiveKey) -> Option<&mut PrimitiveEntry> {
        self.entries.get_mut(key)
    }
}
