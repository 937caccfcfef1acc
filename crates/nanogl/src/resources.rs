use crate::arena::{Arena, BufferId, FramebufferId, ProgramId, TextureId, VertexArrayId};
use crate::buffer::VertexBuffer;
use crate::framebuffer::Framebuffer;
use crate::program::Program;
use crate::texture::Texture;
use crate::vertex_array::VertexArray;

/// Every GPU resource created through the facade, by kind.
///
/// Fields are disjoint so a draw can hold a program mutably while reading
/// buffers and textures.
#[derive(Debug, Default)]
pub struct Resources {
    pub programs: Arena<ProgramId, Program>,
    pub buffers: Arena<BufferId, VertexBuffer>,
    pub textures: Arena<TextureId, Texture>,
    pub framebuffers: Arena<FramebufferId, Framebuffer>,
    pub vertex_arrays: Arena<VertexArrayId, VertexArray>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(id)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&VertexBuffer> {
        self.buffers.get(id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    pub fn framebuffer(&self, id: FramebufferId) -> Option<&Framebuffer> {
        self.framebuffers.get(id)
    }

    pub fn vertex_array(&self, id: VertexArrayId) -> Option<&VertexArray> {
        self.vertex_arrays.get(id)
    }
}
