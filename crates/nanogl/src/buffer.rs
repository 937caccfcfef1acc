//! GPU data buffers (vertex and index data).

use anyhow::{Context, Result};
use bytemuck::Pod;

use crate::arena::BufferId;
use crate::context::{ContextState, GlContext, NativeBuffer};
use crate::gl::{self, GLenum};
use crate::types::DataType;

/// Shape of the data stored in a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferLayout {
    pub data_type: DataType,
    /// Components per item (per column for matrix data).
    pub item_size: usize,
    /// Consecutive attribute locations one item spans; 4 for a mat4.
    pub columns: usize,
    /// Element buffer instead of attribute data.
    pub index: bool,
}

impl BufferLayout {
    pub const fn vertex(data_type: DataType, item_size: usize) -> Self {
        Self { data_type, item_size, columns: 1, index: false }
    }

    pub const fn index(data_type: DataType, item_size: usize) -> Self {
        Self { data_type, item_size, columns: 1, index: true }
    }

    pub const fn matrix(data_type: DataType, rows: usize, columns: usize) -> Self {
        Self { data_type, item_size: rows, columns, index: false }
    }

    #[inline]
    fn target(&self) -> GLenum {
        if self.index { gl::ELEMENT_ARRAY_BUFFER } else { gl::ARRAY_BUFFER }
    }

    /// Items held by `byte_len` bytes of data.
    fn item_count(&self, byte_len: usize) -> usize {
        let per_item = self.data_type.size() * self.item_size * self.columns;
        if per_item == 0 { 0 } else { byte_len / per_item }
    }
}

/// A native buffer plus the metadata needed to bind and count it.
///
/// Immutable after construction except through [`data`](Self::data).
#[derive(Debug)]
pub struct VertexBuffer {
    id: BufferId,
    buffer: Option<NativeBuffer>,
    layout: BufferLayout,
    num_items: usize,
    usage: GLenum,
}

impl VertexBuffer {
    pub(crate) fn new<T: Pod>(
        id: BufferId,
        gl: &mut dyn GlContext,
        state: &mut ContextState,
        layout: BufferLayout,
        data: &[T],
    ) -> Result<Self> {
        let buffer = gl.create_buffer().context("failed to create native buffer")?;
        let mut vb = Self {
            id,
            buffer: Some(buffer),
            layout,
            num_items: 0,
            usage: gl::STATIC_DRAW,
        };
        vb.upload(gl, state, bytemuck::cast_slice(data));

        log::debug!(
            "buffer {:?}: {} items of {}x{} {:?}{}",
            id,
            vb.num_items,
            layout.columns,
            layout.item_size,
            layout.data_type,
            if layout.index { " (index)" } else { "" }
        );
        Ok(vb)
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.layout.data_type
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.layout.item_size
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.layout.columns
    }

    /// Number of items: data length divided by the item footprint.
    #[inline]
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    #[inline]
    pub fn is_index(&self) -> bool {
        self.layout.index
    }

    /// Integer data is fed to the shader as integers unless normalized.
    #[inline]
    pub fn is_integer(&self) -> bool {
        self.layout.data_type.is_integer()
    }

    #[inline]
    pub fn native(&self) -> Option<NativeBuffer> {
        self.buffer
    }

    /// Replaces the buffer contents and recomputes the item count.
    pub fn data<T: Pod>(&mut self, gl: &mut dyn GlContext, state: &mut ContextState, data: &[T]) {
        self.usage = gl::DYNAMIC_DRAW;
        self.upload(gl, state, bytemuck::cast_slice(data));
    }

    fn upload(&mut self, gl: &mut dyn GlContext, state: &mut ContextState, bytes: &[u8]) {
        let Some(buffer) = self.buffer else {
            log::warn!("buffer {:?}: upload after delete ignored", self.id);
            return;
        };
        let target = self.layout.target();
        // The element binding belongs to the current vertex array.
        if self.layout.index && state.vertex_array.is_some() {
            gl.bind_vertex_array(None);
            state.vertex_array = None;
        }
        gl.bind_buffer(target, Some(buffer));
        gl.buffer_data(target, bytes, self.usage);
        gl.bind_buffer(target, None);
        self.num_items = self.layout.item_count(bytes.len());
    }

    /// Points attribute `location` at this buffer: tightly packed, offset 0,
    /// not normalized.
    ///
    /// Used by draw calls that bind named attributes without a vertex array.
    pub fn bind_attribute(&self, gl: &mut dyn GlContext, location: u32) {
        let Some(buffer) = self.buffer else { return };
        gl.bind_buffer(gl::ARRAY_BUFFER, Some(buffer));
        gl.vertex_attrib_pointer(
            location,
            self.layout.item_size as i32,
            self.layout.data_type.gl(),
            false,
            0,
            0,
        );
        gl.enable_vertex_attrib_array(location);
    }

    /// Binds this buffer as the element buffer.
    pub fn bind_indices(&self, gl: &mut dyn GlContext) {
        if let Some(buffer) = self.buffer {
            gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, Some(buffer));
        }
    }

    pub(crate) fn delete(&mut self, gl: &mut dyn GlContext) {
        if let Some(buffer) = self.buffer.take() {
            gl.delete_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaId, VertexArrayId};
    use crate::context::{GlCall, RecordingContext};

    fn id() -> BufferId {
        BufferId::from_index(0)
    }

    #[test]
    fn item_count_is_length_over_item_size() {
        let mut gl = RecordingContext::new(1, 1);
        let positions = [0.0f32; 9];
        let vb = VertexBuffer::new(id(), &mut gl, &mut ContextState::new(), BufferLayout::vertex(DataType::Float, 3), &positions).unwrap();
        assert_eq!(vb.num_items(), 3);
        assert!(!vb.is_index());
    }

    #[test]
    fn matrix_items_span_all_columns() {
        let mut gl = RecordingContext::new(1, 1);
        let transforms = [0.0f32; 32];
        let vb = VertexBuffer::new(id(), &mut gl, &mut ContextState::new(), BufferLayout::matrix(DataType::Float, 4, 4), &transforms).unwrap();
        assert_eq!(vb.num_items(), 2);
        assert_eq!(vb.columns(), 4);
    }

    #[test]
    fn index_buffer_uploads_to_element_target() {
        let mut gl = RecordingContext::new(1, 1);
        let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
        let vb = VertexBuffer::new(id(), &mut gl, &mut ContextState::new(), BufferLayout::index(DataType::UnsignedShort, 3), &indices).unwrap();

        assert_eq!(vb.num_items(), 2);
        assert!(gl.calls().contains(&GlCall::BufferData {
            target: gl::ELEMENT_ARRAY_BUFFER,
            len: 12,
            usage: gl::STATIC_DRAW,
        }));
    }

    #[test]
    fn index_upload_leaves_bound_vertex_array_first() {
        let mut gl = RecordingContext::new(1, 1);
        let mut state = ContextState::new();
        state.vertex_array = Some(VertexArrayId::from_index(0));

        let vb = VertexBuffer::new(id(), &mut gl, &mut state, BufferLayout::index(DataType::UnsignedShort, 3), &[0u16; 3])
            .unwrap();
        let calls = gl.take_calls();
        let unbind = calls.iter().position(|c| *c == GlCall::BindVertexArray(None)).unwrap();
        let bind = calls
            .iter()
            .position(|c| *c == GlCall::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, vb.native()))
            .unwrap();
        assert!(unbind < bind);
        assert_eq!(state.vertex_array, None);
    }

    #[test]
    fn vertex_upload_keeps_bound_vertex_array() {
        let mut gl = RecordingContext::new(1, 1);
        let mut state = ContextState::new();
        state.vertex_array = Some(VertexArrayId::from_index(0));

        VertexBuffer::new(id(), &mut gl, &mut state, BufferLayout::vertex(DataType::Float, 1), &[0.0f32; 3]).unwrap();
        assert_eq!(gl.count(|c| matches!(c, GlCall::BindVertexArray(_))), 0);
        assert_eq!(state.vertex_array, Some(VertexArrayId::from_index(0)));
    }

    #[test]
    fn reupload_recomputes_item_count() {
        let mut gl = RecordingContext::new(1, 1);
        let mut vb = VertexBuffer::new(id(), &mut gl, &mut ContextState::new(), BufferLayout::vertex(DataType::Float, 2), &[0.0f32; 4]).unwrap();
        vb.data(&mut gl, &mut ContextState::new(), &[0.0f32; 10]);
        assert_eq!(vb.num_items(), 5);
    }

    #[test]
    fn bind_attribute_is_tightly_packed() {
        let mut gl = RecordingContext::new(1, 1);
        let vb = VertexBuffer::new(id(), &mut gl, &mut ContextState::new(), BufferLayout::vertex(DataType::Float, 2), &[0.0f32; 4]).unwrap();
        gl.take_calls();

        vb.bind_attribute(&mut gl, 3);
        let calls = gl.take_calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1],
            GlCall::VertexAttribPointer { index: 3, size: 2, data_type: gl::FLOAT, normalized: false, stride: 0, offset: 0 }
        );
        assert_eq!(calls[2], GlCall::EnableVertexAttribArray(3));
    }

    #[test]
    fn delete_releases_native_buffer_once() {
        let mut gl = RecordingContext::new(1, 1);
        let mut vb = VertexBuffer::new(id(), &mut gl, &mut ContextState::new(), BufferLayout::vertex(DataType::Float, 1), &[1.0f32]).unwrap();
        vb.delete(&mut gl);
        vb.delete(&mut gl);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteBuffer(_))), 1);
        assert!(vb.native().is_none());
    }
}
