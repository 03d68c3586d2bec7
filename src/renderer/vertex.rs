use bytemuck::{Pod, Zeroable};
use std::mem;

/// Interleaved 2D vertex: position, texture coordinate, straight-alpha color.
///
/// Every bundled primitive emits this layout. The vertex arena is accounted
/// in `f32` units, so sizes and offsets throughout the crate are multiples of
/// [`Vertex2D::FLOATS`].
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex2D {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex2D {
    /// Arena units (f32 scalars) per vertex.
    pub const FLOATS: usize = mem::size_of::<Vertex2D>() / mem::size_of::<f32>();

    pub const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x2,
        2 => Float32x4
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex2D>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[inline]
pub fn v2(pos: [f32; 2], uv: [f32; 2], color: [f32; 4]) -> Vertex2D {
    Vertex2D { pos, uv, color }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            Vertex2D::layout().array_stride,
            std::mem::size_of::<Vertex2D>() as wgpu::BufferAddress
        );
    }

    #[test]
    fn floats_per_vertex_covers_all_attributes() {
        assert_eq!(Vertex2D::FLOATS, 8);
    }
}
