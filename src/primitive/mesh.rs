use crate::primitive::{BatchKey, DrawMode, DrawState, Primitive};
use crate::renderer::{Material, Vertex2D};

/// Caller-supplied vertex soup with an explicit draw mode: line plots,
/// debug overlays, tessellated shapes.
pub struct MeshPrimitive {
    vertices: Vec<Vertex2D>,
    mode: DrawMode,
    material: Material,
    z: f32,
    visible: bool,
    wireframe: bool,
    line_width: f32,
    dirty: bool,
}

impl MeshPrimitive {
    pub fn new(mode: DrawMode, material: Material) -> Self {
        Self {
            vertices: Vec::new(),
            mode,
            material,
            z: 0.0,
            visible: true,
            wireframe: false,
            line_width: 1.0,
            dirty: false,
        }
    }

    pub fn with_vertices(mut self, vertices: Vec<Vertex2D>) -> Self {
        self.vertices = vertices;
        self
    }

    pub fn with_z(mut self, z: f32) -> Self {
        self.z = z;
        self
    }

    pub fn with_wireframe(mut self) -> Self {
        self.wireframe = true;
        self
    }

    pub fn with_line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    /// Takes effect after `Renderer::refresh_primitive` if the vertex count
    /// changed; same-size replacement is picked up by `prepare`.
    pub fn set_vertices(&mut self, vertices: Vec<Vertex2D>) {
        self.vertices = vertices;
        self.dirty = true;
    }

    /// In-place mutation of the existing vertices (content-only change).
    pub fn update_vertices(&mut self, f: impl FnOnce(&mut [Vertex2D])) {
        f(&mut self.vertices);
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

    pub fn vertices(&self) -> &[Vertex2D] {
        &self.vertices
    }
}

impl Primitive for MeshPrimitive {
    fn z(&self) -> f32 {
        self.z
    }

    fn world_visible(&self) -> bool {
        self.visible
    }

    fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    fn vertex_len(&self) -> usize {
        self.vertices.len() * Vertex2D::FLOATS
    }

    fn world_vertex_data(&self) -> &[f32] {
        bytemuck::cast_slice(&self.vertices)
    }

    fn batch_key(&self) -> BatchKey {
        let mut key = BatchKey::new(self.mode, self.material).with_line_width(self.line_width);
        if self.wireframe {
            key = key.with_wireframe();
        }
        key
    }

    fn draw_state(&self) -> DrawState {
        DrawState {
            line_width: self.line_width,
            wireframe: self.wireframe,
            ..DrawState::default()
        }
    }

    fn prepare(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
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
    use crate::renderer::vertex::v2;

    #[test]
    fn wireframe_and_width_split_the_key() {
        let solid = MeshPrimitive::new(DrawMode::LineList, Material::flat());
        let wide = MeshPrimitive::new(DrawMode::LineList, Material::flat()).with_line_width(3.0);
        let wire = MeshPrimitive::new(DrawMode::LineList, Material::flat()).with_wireframe();
        assert!(!solid.is_groupable(&wide));
        assert!(!solid.is_groupable(&wire));
        assert!(solid.is_groupable(&MeshPrimitive::new(DrawMode::LineList, Material::flat())));
    }

    #[test]
    fn vertex_data_is_the_raw_interleaved_floats() {
        let mesh = MeshPrimitive::new(DrawMode::PointList, Material::flat()).with_vertices(vec![
            v2([1.0, 2.0], [0.0, 0.0], [1.0; 4]),
        ]);
        let data = mesh.world_vertex_data();
        assert_eq!(data.len(), Vertex2D::FLOATS);
        assert_eq!(&data[..2], &[1.0, 2.0]);
    }
}
