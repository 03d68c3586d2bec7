use std::collections::HashMap;

use crate::primitive::{BatchKey, DrawMode};
use crate::renderer::gpu::GpuContext;
use crate::renderer::vertex::Vertex2D;

/// The pipeline-affecting subset of a batch's compatibility key. Point size
/// and line width stay out: wgpu has no per-draw state for them, so they
/// only influence grouping, not pipeline selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineDesc {
    pub mode: DrawMode,
    pub wireframe: bool,
    pub alpha_blend: bool,
    pub program: u32,
}

impl PipelineDesc {
    pub(crate) fn from_key(key: BatchKey) -> Self {
        Self {
            mode: key.mode,
            wireframe: key.wireframe,
            alpha_blend: key.material.alpha_blend,
            program: key.material.program,
        }
    }
}

/// Lazily-built render pipelines, one per distinct [`PipelineDesc`].
/// Program 0 is the built-in color shader; callers register additional
/// WGSL programs under their own ids.
pub struct PipelineCache {
    pipelines: HashMap<PipelineDesc, wgpu::RenderPipeline>,
    programs: HashMap<u32, wgpu::ShaderModule>,
    layout: wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
    supports_wireframe: bool,
}

impl PipelineCache {
    pub fn new(ctx: &GpuContext, format: wgpu::TextureFormat) -> Self {
        let default_shader = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Batch2dShader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("../shader/batch2d.wgsl").into()),
            });

        let layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Batch2dPipelineLayout"),
                bind_group_layouts: &[],
                push_constant_ranges: &[],
            });

        let mut programs = HashMap::new();
        programs.insert(0, default_shader);

        Self {
            pipelines: HashMap::new(),
            programs,
            layout,
            format,
            supports_wireframe: ctx.supports_wireframe,
        }
    }

    /// Install (or replace) the shader for a program id. Pipelines built
    /// against the old module are dropped and rebuilt on demand.
    pub fn register_program(&mut self, ctx: &GpuContext, program: u32, wgsl: &str) {
        let module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Batch2dUserShader"),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        self.programs.insert(program, module);
        self.pipelines.retain(|desc, _| desc.program != program);
    }

    pub fn get(&mut self, ctx: &GpuContext, desc: PipelineDesc) -> &wgpu::RenderPipeline {
        if !self.pipelines.contains_key(&desc) {
            let pipeline = self.build(ctx, desc);
            self.pipelines.insert(desc, pipeline);
        }
        &self.pipelines[&desc]
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    fn build(&self, ctx: &GpuContext, desc: PipelineDesc) -> wgpu::RenderPipeline {
        let module = self.programs.get(&desc.program).unwrap_or_else(|| {
            log::warn!(
                "Program {} not registered, using the built-in shader",
                desc.program
            );
            &self.programs[&0]
        });

        let polygon_mode = if desc.wireframe && self.supports_wireframe {
            wgpu::PolygonMode::Line
        } else {
            wgpu::PolygonMode::Fill
        };

        let blend = if desc.alpha_blend {
            Some(wgpu::BlendState::ALPHA_BLENDING)
        } else {
            Some(wgpu::BlendState::REPLACE)
        };

        ctx.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Batch2dPipeline"),
                layout: Some(&self.layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex2D::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: desc.mode.topology(),
                    cull_mode: None,
                    front_face: wgpu::FrontFace::Ccw,
                    polygon_mode,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            })
    }
}
