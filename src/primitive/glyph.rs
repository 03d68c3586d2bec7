use glam::{Vec2, Vec4};

use crate::primitive::{BatchKey, DrawMode, Primitive};
use crate::renderer::vertex::v2;
use crate::renderer::{Material, Vertex2D};

/// One prelaid glyph box: screen rectangle plus its atlas UV rectangle.
/// Shaping and layout happen upstream; this crate only batches the quads.
#[derive(Debug, Clone, Copy)]
pub struct GlyphQuad {
    pub min: Vec2,
    pub max: Vec2,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

/// A run of glyph quads sharing one atlas texture and color.
///
/// Replacing the glyphs changes the vertex size, so the owner must call
/// `Renderer::refresh_primitive` afterwards; recoloring is content-only and
/// picked up by `prepare`.
pub struct GlyphRunPrimitive {
    glyphs: Vec<GlyphQuad>,
    color: Vec4,
    z: f32,
    visible: bool,
    material: Material,
    verts: Vec<f32>,
    dirty: bool,
}

impl GlyphRunPrimitive {
    pub fn new(atlas_texture: u32) -> Self {
        Self {
            glyphs: Vec::new(),
            color: Vec4::ONE,
            z: 0.0,
            visible: true,
            material: Material::textured(atlas_texture).with_alpha(),
            verts: Vec::new(),
            dirty: false,
        }
    }

    pub fn with_z(mut self, z: f32) -> Self {
        self.z = z;
        self
    }

    /// A same-count replacement is picked up by `prepare`; a change in glyph
    /// count alters the run's vertex size and needs
    /// `Renderer::refresh_primitive` as well.
    pub fn set_glyphs(&mut self, glyphs: Vec<GlyphQuad>) {
        self.glyphs = glyphs;
        self.rebuild();
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

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    fn rebuild(&mut self) {
        let c = self.color.to_array();
        self.verts.clear();
        for g in &self.glyphs {
            let quad = [
                v2([g.min.x, g.min.y], [g.uv_min.x, g.uv_max.y], c),
                v2([g.max.x, g.min.y], [g.uv_max.x, g.uv_max.y], c),
                v2([g.max.x, g.max.y], [g.uv_max.x, g.uv_min.y], c),
                v2([g.min.x, g.min.y], [g.uv_min.x, g.uv_max.y], c),
                v2([g.max.x, g.max.y], [g.uv_max.x, g.uv_min.y], c),
                v2([g.min.x, g.max.y], [g.uv_min.x, g.uv_min.y], c),
            ];
            self.verts.extend_from_slice(bytemuck::cast_slice(&quad));
        }
    }
}

impl Primitive for GlyphRunPrimitive {
    fn z(&self) -> f32 {
        self.z
    }

    fn world_visible(&self) -> bool {
        self.visible
    }

    fn vertex_count(&self) -> u32 {
        self.glyphs.len() as u32 * 6
    }

    fn vertex_len(&self) -> usize {
        self.glyphs.len() * 6 * Vertex2D::FLOATS
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

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(x: f32) -> GlyphQuad {
        GlyphQuad {
            min: Vec2::new(x, 0.0),
            max: Vec2::new(x + 0.1, 0.1),
            uv_min: Vec2::ZERO,
            uv_max: Vec2::ONE,
        }
    }

    #[test]
    fn empty_run_has_no_vertices() {
        let run = GlyphRunPrimitive::new(1);
        assert_eq!(run.vertex_len(), 0);
    }

    #[test]
    fn vertex_len_tracks_glyph_count() {
        let mut run = GlyphRunPrimitive::new(1);
        run.set_glyphs(vec![quad(0.0), quad(0.2), quad(0.4)]);
        assert_eq!(run.vertex_len(), 3 * 6 * Vertex2D::FLOATS);
        assert_eq!(run.world_vertex_data().len(), run.vertex_len());
    }
}
