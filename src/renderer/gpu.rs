use std::mem;
use std::ops::Range;

use wgpu::util::DeviceExt;

/// Errors from GPU device acquisition. Buffer-level failures are not errors:
/// the renderer falls back to transient CPU-fed buffers instead.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no compatible adapter: {0}")]
    Adapter(String),
    #[error("device request failed: {0}")]
    Device(String),
}

/// Owned device/queue pair. The renderer never touches wgpu outside of this
/// module and `pipeline.rs`.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub supports_wireframe: bool,
}

impl GpuContext {
    /// Blocking, surface-free construction; batching has no swapchain of its
    /// own, presentation belongs to the embedding application.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| GpuError::Adapter(err.to_string()))?;

        log::info!("Using adapter: {:?}", adapter.get_info());

        let adapter_features = adapter.features();
        let mut required_features = wgpu::Features::empty();
        let supports_wireframe = adapter_features.contains(wgpu::Features::POLYGON_MODE_LINE);
        if supports_wireframe {
            required_features |= wgpu::Features::POLYGON_MODE_LINE;
        } else {
            log::warn!("Wireframe fill mode not supported, falling back to solid");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Batch2dDevice"),
                required_features,
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| GpuError::Device(err.to_string()))?;

        Ok(Self {
            device,
            queue,
            supports_wireframe,
        })
    }
}

/// A batch's bound view into the shared arena buffer, in arena units.
/// Recorded at upload time and consumed by `draw`; dropped whenever a vacant
/// batch is claimed for a different compatibility key.
#[derive(Debug, Clone)]
pub(crate) struct VertexBatch {
    pub offset: usize,
    pub len: usize,
}

impl VertexBatch {
    pub fn byte_range(&self) -> Range<u64> {
        let unit = mem::size_of::<f32>() as u64;
        let start = self.offset as u64 * unit;
        start..start + self.len as u64 * unit
    }
}

/// GPU mirror of the whole vertex arena: one vertex buffer sized to the
/// arena allocation, recreated when the arena relocates.
pub(crate) struct ArenaMirror {
    buffer: Option<wgpu::Buffer>,
    capacity: usize,
}

impl ArenaMirror {
    pub fn new() -> Self {
        Self {
            buffer: None,
            capacity: 0,
        }
    }

    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// Make sure the mirror can hold `units`. Returns true when the buffer
    /// was (re)created, which invalidates every batch's uploaded range.
    /// Returns false with no buffer when the request exceeds device limits;
    /// the renderer then feeds draws from the CPU arena instead.
    pub fn ensure(&mut self, ctx: &GpuContext, units: usize) -> bool {
        if units <= self.capacity && self.buffer.is_some() {
            return false;
        }
        let bytes = (units * mem::size_of::<f32>()) as u64;
        if bytes > ctx.device.limits().max_buffer_size {
            log::warn!(
                "Vertex arena ({} bytes) exceeds device buffer limit, drawing from CPU data",
                bytes
            );
            self.buffer = None;
            self.capacity = 0;
            return false;
        }
        log::info!(
            "Growing arena vertex buffer: {} -> {} units",
            self.capacity,
            units
        );
        self.buffer = Some(ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ArenaVertexBuffer"),
            size: bytes,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.capacity = units;
        true
    }

    pub fn write(&self, ctx: &GpuContext, data: &[f32], offset_units: usize) {
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        debug_assert!(offset_units + data.len() <= self.capacity);
        ctx.queue.write_buffer(
            buffer,
            (offset_units * mem::size_of::<f32>()) as u64,
            bytemuck::cast_slice(data),
        );
    }

    pub fn invalidate(&mut self) {
        self.buffer = None;
        self.capacity = 0;
    }
}

/// One-shot vertex buffer built straight from CPU-side arena bytes; the
/// fallback path when no resident mirror exists.
pub(crate) fn transient_vertex_buffer(ctx: &GpuContext, data: &[f32]) -> wgpu::Buffer {
    ctx.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("TransientVertexBuffer"),
            contents: bytemuck::cast_slice(data),
            usage: wgpu::BufferUsages::VERTEX,
        })
}
