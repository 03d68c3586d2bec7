/// Draw-call-affecting material state.
///
/// Two primitives can only share a batch when their materials compare equal,
/// so this struct carries exactly the fields that force a pipeline or bind
/// group switch and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Material {
    /// Shader program id. 0 is the built-in flat/textured 2D program.
    pub program: u32,
    /// Texture id. 0 means untextured.
    pub texture: u32,
    pub alpha_blend: bool,
}

impl Material {
    pub fn new(program: u32) -> Self {
        Self {
            program,
            texture: 0,
            alpha_blend: false,
        }
    }

    /// Untextured, opaque, built-in program.
    pub fn flat() -> Self {
        Self::new(0)
    }

    pub fn textured(texture: u32) -> Self {
        Self::new(0).with_texture(texture)
    }

    pub fn with_texture(mut self, texture: u32) -> Self {
        self.texture = texture;
        self
    }

    pub fn with_alpha(mut self) -> Self {
        self.alpha_blend = true;
        self
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::flat()
    }
}
