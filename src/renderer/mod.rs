pub mod gpu;
pub mod material;
pub mod pipeline;
pub mod vertex;

pub(crate) mod arena;
pub(crate) mod batch;
mod renderer;

pub use gpu::{GpuContext, GpuError};
pub use material::Material;
pub use pipeline::{PipelineCache, PipelineDesc};
pub use renderer::{
    BatchInfo, Renderer, RendererError, RendererId, RendererStats, SlotInfo,
};
pub use vertex::{v2, Vertex2D};
