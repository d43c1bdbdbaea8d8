//! Single-window `wgpu` demos, one module per lesson.
//!
//! The launcher hands each demo a [`DemoConfig`] and the demo does the rest:
//!
//! ```text
//!   CLI / gputour
//!        │ DemoKind + DemoConfig
//!        ▼
//!   demos::run ──▶ <demo>::run ──▶ winit event loop ──▶ render_frame()
//!                                            │
//!                                            └─▶ queue.write_buffer / write_texture
//! ```
//!
//! Every module is deliberately self-contained. It acquires its own adapter
//! and device, configures its own surface, builds its single render pipeline,
//! and drives its own event loop; nothing graphics-related is shared between
//! demos. The modules differ only in what the lesson teaches: where vertex
//! data comes from, how many bind groups exist, and whether a uniform buffer
//! is rewritten per frame.

pub mod animated_quad;
pub mod cube;
pub mod resize;
pub mod textured_cube;
pub mod textured_quad;
pub mod triangle;
pub mod uniform_color;
pub mod vertex_slot;

use std::path::PathBuf;

use anyhow::Result;

/// Identifies one of the bundled demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoKind {
    Triangle,
    Resize,
    UniformColor,
    VertexSlot,
    TexturedQuad,
    AnimatedQuad,
    Cube,
    TexturedCube,
}

impl DemoKind {
    /// Every demo, in the order the lessons build on each other.
    pub const ALL: [DemoKind; 8] = [
        DemoKind::Triangle,
        DemoKind::Resize,
        DemoKind::UniformColor,
        DemoKind::VertexSlot,
        DemoKind::TexturedQuad,
        DemoKind::AnimatedQuad,
        DemoKind::Cube,
        DemoKind::TexturedCube,
    ];

    /// The CLI-facing name.
    pub fn name(self) -> &'static str {
        match self {
            DemoKind::Triangle => "triangle",
            DemoKind::Resize => "resize",
            DemoKind::UniformColor => "uniform-color",
            DemoKind::VertexSlot => "vertex-slot",
            DemoKind::TexturedQuad => "textured-quad",
            DemoKind::AnimatedQuad => "animated-quad",
            DemoKind::Cube => "cube",
            DemoKind::TexturedCube => "textured-cube",
        }
    }

    /// One-line description shown by `gputour list`.
    pub fn summary(self) -> &'static str {
        match self {
            DemoKind::Triangle => "solid triangle with vertices hardcoded in the shader",
            DemoKind::Resize => "the same triangle, reconfiguring the surface on window resizes",
            DemoKind::UniformColor => "per-vertex colors fed through a uniform buffer; Space rotates the palette",
            DemoKind::VertexSlot => "per-vertex colors fed through vertex-buffer slot 0; Space rotates the palette",
            DemoKind::TexturedQuad => "quad sampling an image with repeat/mirror-repeat addressing",
            DemoKind::AnimatedQuad => "quad sampling an animation, re-binding the texture as frames change",
            DemoKind::Cube => "rotating cube driven by a per-frame MVP uniform rewrite",
            DemoKind::TexturedCube => "rotating cube with a second bind group for sampler and texture",
        }
    }

    /// Looks a demo up by its CLI name.
    pub fn from_name(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.name() == normalized)
    }
}

/// Options passed from the launcher to a demo.
///
/// Demos ignore fields they have no use for: only the textured demos read
/// `image`, and only the animated quad reads `animation`.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Image to sample in the textured demos; a generated checkerboard is
    /// used when unset.
    pub image: Option<PathBuf>,
    /// Animated GIF to play in the animated quad; a generated stripe loop is
    /// used when unset.
    pub animation: Option<PathBuf>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            image: None,
            animation: None,
        }
    }
}

/// Launches the requested demo and blocks until its window closes.
pub fn run(kind: DemoKind, config: &DemoConfig) -> Result<()> {
    match kind {
        DemoKind::Triangle => triangle::run(config),
        DemoKind::Resize => resize::run(config),
        DemoKind::UniformColor => uniform_color::run(config),
        DemoKind::VertexSlot => vertex_slot::run(config),
        DemoKind::TexturedQuad => textured_quad::run(config),
        DemoKind::AnimatedQuad => animated_quad::run(config),
        DemoKind::Cube => cube::run(config),
        DemoKind::TexturedCube => textured_cube::run(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in DemoKind::ALL {
            assert_eq!(DemoKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn lookup_normalizes_case_and_whitespace() {
        assert_eq!(DemoKind::from_name(" Triangle "), Some(DemoKind::Triangle));
        assert_eq!(DemoKind::from_name("TEXTURED-CUBE"), Some(DemoKind::TexturedCube));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(DemoKind::from_name("teapot"), None);
        assert_eq!(DemoKind::from_name(""), None);
    }
}
