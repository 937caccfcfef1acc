//! Vertex arrays: attribute and index bindings captured in one bindable
//! object, with optional multi-draw segments.

use anyhow::{Context, Result};

use crate::arena::VertexArrayId;
use crate::buffer::VertexBuffer;
use crate::context::{ContextState, GlContext, NativeVertexArray};
use crate::gl::{self, GLenum};
use crate::types::DataType;

/// Per-call overrides for an attribute binding. `None` takes the buffer's value.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct AttributeOptions {
    pub data_type: Option<DataType>,
    /// Components per attribute slot.
    pub size: Option<usize>,
    /// Bytes between consecutive items; 0 or `None` means tightly packed.
    pub stride: Option<usize>,
    /// Bytes before the first item.
    pub offset: Option<usize>,
    pub normalized: bool,
    /// Feed the data to the shader as integers. Defaults to integer buffers
    /// that are not normalized.
    pub integer: Option<bool>,
}

/// One sub-draw of a vertex array.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawRange {
    pub count: usize,
    pub instances: usize,
    /// Elements to skip before this range.
    pub offset: usize,
}

/// Attribute and index bindings for one drawable mesh.
///
/// The native object is created on the first attach. Once an index buffer has
/// been attached the array stays indexed.
#[derive(Debug)]
pub struct VertexArray {
    id: VertexArrayId,
    vertex_array: Option<NativeVertexArray>,
    num_draws: usize,
    num_elements: Vec<usize>,
    num_instances: Vec<usize>,
    offsets: Vec<usize>,
    index_type: Option<DataType>,
    indexed: bool,
    instanced: bool,
}

impl VertexArray {
    pub(crate) fn new(id: VertexArrayId) -> Self {
        Self {
            id,
            vertex_array: None,
            num_draws: 1,
            num_elements: vec![0],
            num_instances: vec![1],
            offsets: vec![0],
            index_type: None,
            indexed: false,
            instanced: false,
        }
    }

    #[inline]
    pub fn id(&self) -> VertexArrayId {
        self.id
    }

    #[inline]
    pub fn native(&self) -> Option<NativeVertexArray> {
        self.vertex_array
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Whether an instance buffer is attached.
    #[inline]
    pub fn is_instanced(&self) -> bool {
        self.instanced
    }

    #[inline]
    pub fn index_type(&self) -> Option<DataType> {
        self.index_type
    }

    #[inline]
    pub fn num_draws(&self) -> usize {
        self.num_draws
    }

    pub fn element_counts_slice(&self) -> &[usize] {
        &self.num_elements[..self.num_draws]
    }

    pub fn instance_counts_slice(&self) -> &[usize] {
        &self.num_instances[..self.num_draws]
    }

    /// `offsets[i]` is the sum of the element counts before segment `i`.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets[..self.num_draws]
    }

    /// Sub-draws in issue order.
    pub fn draw_ranges(&self) -> impl Iterator<Item = DrawRange> + '_ {
        (0..self.num_draws).map(move |i| DrawRange {
            count: self.num_elements[i],
            instances: self.num_instances[i],
            offset: self.offsets[i],
        })
    }

    /// Binds `buffer` as per-vertex data starting at attribute `index`.
    pub fn vertex_attribute_buffer(
        &mut self,
        gl: &mut dyn GlContext,
        state: &mut ContextState,
        index: u32,
        buffer: &VertexBuffer,
        options: &AttributeOptions,
    ) -> Result<&mut Self> {
        self.attribute_buffer(gl, state, index, buffer, options, false)?;
        Ok(self)
    }

    /// Binds `buffer` as per-instance data starting at attribute `index`.
    pub fn instance_attribute_buffer(
        &mut self,
        gl: &mut dyn GlContext,
        state: &mut ContextState,
        index: u32,
        buffer: &VertexBuffer,
        options: &AttributeOptions,
    ) -> Result<&mut Self> {
        self.attribute_buffer(gl, state, index, buffer, options, true)?;
        Ok(self)
    }

    /// Attaches the element buffer. Its items are triangles, three indices each.
    pub fn index_buffer(
        &mut self,
        gl: &mut dyn GlContext,
        state: &mut ContextState,
        buffer: &VertexBuffer,
    ) -> Result<&mut Self> {
        self.ensure_native(gl)?;
        self.bind(gl, state);
        buffer.bind_indices(gl);

        self.num_elements[0] = buffer.num_items() * 3;
        self.index_type = Some(buffer.data_type());
        self.indexed = true;
        Ok(self)
    }

    /// Splits the array into one sub-draw per count.
    ///
    /// Instance counts for segments that have none yet default to 1.
    pub fn element_counts(&mut self, counts: &[usize]) -> &mut Self {
        if counts.is_empty() {
            log::warn!("vertex array {:?}: empty element counts ignored", self.id);
            return self;
        }

        self.num_draws = counts.len();
        self.num_elements = counts.to_vec();

        self.offsets.clear();
        let mut running = 0;
        for count in counts {
            self.offsets.push(running);
            running += count;
        }

        self.num_instances.resize(self.num_draws, 1);
        self
    }

    /// Sets the instance count of each sub-draw.
    pub fn instance_counts(&mut self, counts: &[usize]) -> &mut Self {
        if counts.is_empty() {
            log::warn!("vertex array {:?}: empty instance counts ignored", self.id);
            return self;
        }

        self.num_draws = counts.len();
        self.num_instances = counts.to_vec();
        self.num_elements.resize(self.num_draws, 0);
        self.offsets.resize(self.num_draws, 0);
        self
    }

    /// Binds the native object unless it already is the current vertex array.
    ///
    /// Returns whether a native bind was issued.
    pub fn bind(&self, gl: &mut dyn GlContext, state: &mut ContextState) -> bool {
        if state.vertex_array == Some(self.id) {
            return false;
        }
        gl.bind_vertex_array(self.vertex_array);
        state.vertex_array = Some(self.id);
        true
    }

    /// Frees the native object, unbinding it first if it is current.
    pub fn delete(&mut self, gl: &mut dyn GlContext, state: &mut ContextState) {
        if let Some(vao) = self.vertex_array.take() {
            gl.delete_vertex_array(vao);
            if state.vertex_array == Some(self.id) {
                gl.bind_vertex_array(None);
                state.vertex_array = None;
            }
        }
    }

    /// Recovers from context loss: forgets a stale current binding and
    /// recreates the native object if one existed.
    ///
    /// Attribute bindings are not replayed; re-attach buffers afterwards.
    pub fn restore(&mut self, gl: &mut dyn GlContext, state: &mut ContextState) -> Result<&mut Self> {
        if state.vertex_array == Some(self.id) {
            state.vertex_array = None;
        }
        if self.vertex_array.is_some() {
            self.vertex_array = Some(gl.create_vertex_array().context("failed to recreate vertex array")?);
        }
        Ok(self)
    }

    fn ensure_native(&mut self, gl: &mut dyn GlContext) -> Result<()> {
        if self.vertex_array.is_none() {
            let vao = gl.create_vertex_array().context("failed to create native vertex array")?;
            log::debug!("vertex array {:?}: allocated {:?}", self.id, vao);
            self.vertex_array = Some(vao);
        }
        Ok(())
    }

    fn attribute_buffer(
        &mut self,
        gl: &mut dyn GlContext,
        state: &mut ContextState,
        index: u32,
        buffer: &VertexBuffer,
        options: &AttributeOptions,
        instanced: bool,
    ) -> Result<()> {
        self.ensure_native(gl)?;
        self.bind(gl, state);
        gl.bind_buffer(gl::ARRAY_BUFFER, buffer.native());

        let data_type = options.data_type.unwrap_or(buffer.data_type());
        let size = options.size.unwrap_or(buffer.item_size());
        let normalized = options.normalized;
        let integer = options.integer.unwrap_or(buffer.is_integer() && !normalized);
        let columns = buffer.columns();
        let column_bytes = size * data_type.size();

        let stride = match options.stride {
            Some(stride) if stride != 0 => stride,
            _ => columns * column_bytes,
        };
        let offset = options.offset.unwrap_or(0);
        let gl_type: GLenum = data_type.gl();

        for i in 0..columns {
            let location = index + i as u32;
            let column_offset = (offset + i * column_bytes) as i32;
            if integer {
                gl.vertex_attrib_i_pointer(location, size as i32, gl_type, stride as i32, column_offset);
            } else {
                gl.vertex_attrib_pointer(location, size as i32, gl_type, normalized, stride as i32, column_offset);
            }
            if instanced {
                gl.vertex_attrib_divisor(location, 1);
            }
            gl.enable_vertex_attrib_array(location);
        }

        if instanced {
            self.instanced = true;
        }
        if self.num_draws == 1 {
            if instanced {
                self.num_instances[0] = buffer.num_items();
            } else if self.num_elements[0] == 0 {
                self.num_elements[0] = buffer.num_items();
            }
        }

        gl.bind_buffer(gl::ARRAY_BUFFER, None);
        Ok(())
    }
}
