//! Native context boundary.
//!
//! This module defines:
//! - [`GlContext`], the trait every native backend implements
//! - opaque native handles passed across that boundary
//! - [`ContextState`], the binding cache shared by all draws on one context
//! - [`RecordingContext`], a headless backend that records calls

mod native;
mod recording;
mod state;

pub use native::{
    ActiveInfo, GlContext, NativeBuffer, NativeFramebuffer, NativeProgram, NativeRenderbuffer,
    NativeShader, NativeTexture, NativeUniformLocation, NativeVertexArray,
};
pub use recording::{GlCall, RecordingContext};
pub use state::ContextState;

/// Attributes requested when a backend creates its native context.
///
/// Backends that receive an already-created context ignore this.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ContextAttributes {
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
    pub antialias: bool,
    pub premultiplied_alpha: bool,
    /// Keep the drawing buffer contents after presentation.
    pub preserve_drawing_buffer: bool,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            alpha: true,
            depth: true,
            stencil: false,
            antialias: true,
            premultiplied_alpha: true,
            preserve_drawing_buffer: false,
        }
    }
}
