//! 2D primitive batching on top of wgpu.
//!
//! Many independent draw primitives (sprites, glyph runs, meshes) share a
//! single growable vertex arena and are merged into as few draw calls as
//! possible, while each primitive can still be updated, hidden or removed
//! independently every frame. Primitives live in a [`PrimitiveStore`] and
//! are referenced by generation-counted keys; the [`Renderer`] groups them
//! into depth-sorted batches, packs their vertex data contiguously, and
//! uploads only the ranges that changed.
//!
//! The frame pipeline is synchronous and single-threaded:
//! `elapse` → `prepare` → `draw`, all on the thread owning the GPU context.

pub mod primitive;
pub mod renderer;

pub use primitive::{
    BatchKey, DrawMode, DrawState, GlyphQuad, GlyphRunPrimitive, MeshPrimitive, Primitive,
    PrimitiveKey, PrimitiveStore, SpritePrimitive,
};
pub use renderer::{
    BatchInfo, GpuContext, GpuError, Material, PipelineCache, Renderer, RendererError,
    RendererStats, SlotInfo, Vertex2D,
};

/// Opt-in logging setup for binaries and examples; tests and libraries
/// embedding this crate configure `log` themselves.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
