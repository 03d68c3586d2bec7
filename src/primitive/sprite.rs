use glam::{Vec2, Vec4};

use crate::primitive::{BatchKey, DrawMode, Primitive};
use crate::renderer::vertex::v2;
use crate::renderer::{Material, Vertex2D};

/// Axis-aligned textured quad built from two triangles.
///
/// Positions are in clip space for the built-in shader; user programs are
/// free to reinterpret them. Content setters only mark the sprite dirty —
/// the six vertices are rebuilt once per frame in `prepare`. Changing `z`,
/// visibility or the material requires `Renderer::refresh_primitive` so the
/// sprite can be regrouped.
pub struct SpritePrimitive {
    position: Vec2,
    size: Vec2,
    uv_min: Vec2,
    uv_max: Vec2,
    color: Vec4,
    z: f32,
    visible: bool,
    material: Material,
    verts: Vec<f32>,
    dirty: bool,
}

impl SpritePrimitive {
    pub const VERTICES: u32 = 6;

    pub fn new(material: Material) -> Self {
        let mut sprite = Self {
            position: Vec2::ZERO,
            size: Vec2::ONE,
            uv_min: Vec2::ZERO,
            uv_max: Vec2::ONE,
            color: Vec4::ONE,
            z: 0.0,
            visible: true,
            material,
            verts: Vec::new(),
            dirty: false,
        };
        sprite.rebuild();
        sprite
    }

    pub fn with_rect(mut self, position: Vec2, size: Vec2) -> Self {
        self.position = position;
        self.size = size;
        self.rebuild();
        self
    }

    pub fn with_z(mut self, z: f32) -> Self {
        self.z = z;
        self
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.dirty = true;
    }

    pub fn set_size(&mut self, size: Vec2) {
        self.size = size;
        self.dirty = true;
    }

    pub fn set_uv_rect(&mut self, uv_min: Vec2, uv_max: Vec2) {
        self.uv_min = uv_min;
        self.uv_max = uv_max;
        self.dirty = true;
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
        self.dirty = true;
    }

    /// Takes effect after `Renderer::refresh_primitive`.
    pub fn set_z(&mut self, z: f32) {
        self.z = z;
    }

    /// Takes effect after `Renderer::refresh_primitive`.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    fn rebuild(&mut self) {
        let (p, s) = (self.position, self.size);
        let (u0, u1) = (self.uv_min, self.uv_max);
        let c = self.color.to_array();
        let quad = [
            v2([p.x, p.y], [u0.x, u1.y], c),
            v2([p.x + s.x, p.y], [u1.x, u1.y], c),
            v2([p.x + s.x, p.y + s.y], [u1.x, u0.y], c),
            v2([p.x, p.y], [u0.x, u1.y], c),
            v2([p.x + s.x, p.y + s.y], [u1.x, u0.y], c),
            v2([p.x, p.y + s.y], [u0.x, u0.y], c),
        ];
        self.verts.clear();
        self.verts
            .extend_from_slice(bytemuck::cast_slice(&quad));
    }
}

impl Primitive for SpritePrimitive {
    fn z(&self) -> f32 {
        self.z
    }

    fn world_visible(&self) -> bool {
        self.visible
    }

    fn vertex_count(&self) -> u32 {
        Self::VERTICES
    }

    fn vertex_len(&self) -> usize {
        Self::VERTICES as usize * Vertex2D::FLOATS
    }

    fn world_vertex_data(&self) -> &[f32] {
        &self.verts
    }

    fn batch_key(&self) -> BatchKey {
        BatchKey::new(DrawMode::TriangleList, self.material)
    }

    fn prepare(&mut self) -> bool {
        if self.dirty {
            self.rebuild();
            self.dirty = false;
            true
        } else {
            false
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
