//! A thin object model over a WebGL-style rendering context.
//!
//! Programs, buffers, textures, framebuffers and vertex arrays are owned by an
//! [`App`] and addressed through typed ids. Draw calls record which resources
//! they use and replay them each frame, skipping redundant program binds and
//! unchanged uniform uploads.
//!
//! Native calls go through the [`GlContext`] trait. `nanogl-glow` implements it
//! on top of `glow`; [`RecordingContext`] records calls for headless use.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`app`] | `App`, `AppConfig`, `Extensions` |
//! | [`program`] | `Program`, `ProgramInterface` |
//! | [`uniform`] | `UniformValue`, `UniformSlot` |
//! | [`buffer`] | `VertexBuffer`, `BufferLayout` |
//! | [`texture`] | `Texture`, `TextureOptions`, `CubemapFaces` |
//! | [`framebuffer`] | `Framebuffer`, `FramebufferOptions` |
//! | [`vertex_array`] | `VertexArray`, `AttributeOptions` |
//! | [`draw_call`] | `DrawCall` |
//! | [`context`] | `GlContext`, `ContextState`, `RecordingContext` |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use nanogl::{App, DataType, Primitive};
//!
//! let mut app = App::new(gl);
//! let program = app.create_program(VS, FS)?;
//! let positions = app.create_array_buffer(DataType::Float, 2, &[-0.5f32, -0.5, 0.5, -0.5, 0.0, 0.5])?;
//!
//! let mut dc = app.create_draw_call(program, Primitive::Triangles)?;
//! dc.attribute("aPosition", app.resources().buffer(positions).unwrap());
//! app.draw_calls(vec![dc]);
//!
//! app.clear().draw();
//! ```

pub mod app;
pub mod arena;
pub mod buffer;
pub mod context;
pub mod draw_call;
pub mod framebuffer;
pub mod gl;
pub mod logging;
pub mod program;
pub mod resources;
pub mod texture;
pub mod types;
pub mod uniform;
pub mod vertex_array;

pub use app::{App, AppConfig, Extensions};
pub use arena::{BufferId, FramebufferId, ProgramId, TextureId, VertexArrayId};
pub use buffer::{BufferLayout, VertexBuffer};
pub use context::{ContextAttributes, ContextState, GlContext, RecordingContext};
pub use draw_call::DrawCall;
pub use framebuffer::{DepthAttachment, Framebuffer, FramebufferOptions};
pub use program::{Program, ProgramInterface};
pub use resources::Resources;
pub use texture::{CubemapFaces, Texture, TextureOptions, TextureTarget};
pub use types::{BlendFactor, CompareFunc, DataType, Primitive, TextureFilter, TextureFormat, TextureWrap};
pub use uniform::UniformValue;
pub use vertex_array::{AttributeOptions, VertexArray};
