use glam::Vec2;
use std::borrow::Cow;

/// Texture id of the plain white texture solid quads are tinted from.
pub const SOLID_TEXTURE: &str = "__white";

// --- Public Data Contract ---

/// A positioned, transformed, textured quad. This is the whole drawing
/// surface the gameplay layer needs from a renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct Quad<'a> {
    pub texture_id: Cow<'a, str>,
    /// Top-left corner in screen pixels.
    pub position: Vec2,
    pub size: Vec2,
    pub tint: [f32; 4],
    pub opacity: f32,
    pub scale: Vec2,
    /// Radians, around the quad's centre.
    pub rotation: f32,
    pub z: i16,
}

impl<'a> Quad<'a> {
    #[inline(always)]
    pub fn sprite(
        texture_id: impl Into<Cow<'a, str>>,
        position: Vec2,
        size: Vec2,
        z: i16,
    ) -> Self {
        Self {
            texture_id: texture_id.into(),
            position,
            size,
            tint: [1.0; 4],
            opacity: 1.0,
            scale: Vec2::ONE,
            rotation: 0.0,
            z,
        }
    }

    /// Untextured rectangle filled with `tint`.
    #[inline(always)]
    pub fn solid(position: Vec2, size: Vec2, tint: [f32; 4], z: i16) -> Self {
        Self {
            tint,
            ..Self::sprite(SOLID_TEXTURE, position, size, z)
        }
    }

    #[inline(always)]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

pub trait QuadRenderer {
    fn begin(&mut self) {}
    fn draw_quad(&mut self, quad: &Quad<'_>);
    fn end(&mut self) {}
}

/// Renderer that only tallies what it was asked to draw. Used by the
/// headless runner.
#[derive(Debug, Default, Clone)]
pub struct QuadCounter {
    pub frame_quads: usize,
    pub total_quads: u64,
}

impl QuadRenderer for QuadCounter {
    fn begin(&mut self) {
        self.frame_quads = 0;
    }

    fn draw_quad(&mut self, _quad: &Quad<'_>) {
        self.frame_quads += 1;
        self.total_quads += 1;
    }
}
