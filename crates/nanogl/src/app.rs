//! The facade: owns the context, global render state, every resource and the
//! per-frame draw list.

use anyhow::{Context, Result};
use bytemuck::Pod;

use crate::arena::{BufferId, FramebufferId, ProgramId, TextureId, VertexArrayId};
use crate::buffer::{BufferLayout, VertexBuffer};
use crate::context::{ContextState, GlContext};
use crate::draw_call::DrawCall;
use crate::framebuffer::{Framebuffer, FramebufferCaps, FramebufferOptions};
use crate::gl::{self, GLenum};
use crate::program::Program;
use crate::resources::Resources;
use crate::texture::{CubemapFaces, Texture, TextureOptions};
use crate::types::{BlendFactor, CompareFunc, DataType, Primitive};
use crate::vertex_array::{AttributeOptions, VertexArray};

// ── Config ────────────────────────────────────────────────────────────────

/// Optional extensions to request at startup.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Extensions {
    /// Multiple render targets per framebuffer.
    pub draw_buffers: bool,
    /// Sampleable depth attachments.
    pub depth_textures: bool,
    /// Float color targets.
    pub float_textures: bool,
    /// Linear filtering of float textures.
    pub linear_float_textures: bool,
}

/// Initial render state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AppConfig {
    /// Left at the native default when `None`.
    pub clear_color: Option<[f32; 4]>,
    pub clear_mask: GLenum,
    pub depth_test: bool,
    pub blend: bool,
    pub cull_backfaces: bool,
    pub extensions: Extensions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            clear_color: None,
            clear_mask: gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT,
            depth_test: false,
            blend: false,
            cull_backfaces: false,
            extensions: Extensions::default(),
        }
    }
}

// ── App ───────────────────────────────────────────────────────────────────

/// Entry point for everything drawn on one context.
///
/// ```rust,ignore
/// let mut app = App::new(gl);
/// app.clear_color(0.0, 0.0, 0.0, 1.0).depth_test();
///
/// let program = app.create_program(VS, FS)?;
/// let positions = app.create_array_buffer(DataType::Float, 3, &POSITIONS)?;
///
/// let mut dc = app.create_draw_call(program, Primitive::Triangles)?;
/// dc.attribute("aPosition", app.resources().buffer(positions).unwrap());
/// app.draw_calls(vec![dc]);
///
/// loop {
///     app.clear().draw();
/// }
/// ```
#[derive(Debug)]
pub struct App<C: GlContext> {
    gl: C,
    state: ContextState,
    resources: Resources,
    draw_calls: Vec<DrawCall>,

    width: u32,
    height: u32,
    clear_mask: GLenum,

    max_draw_buffers: u32,
    draw_buffers_enabled: bool,
    depth_textures_enabled: bool,
    float_textures_enabled: bool,
    linear_float_textures_enabled: bool,
}

impl<C: GlContext> App<C> {
    pub fn new(gl: C) -> Self {
        Self::with_config(gl, AppConfig::default())
    }

    pub fn with_config(gl: C, config: AppConfig) -> Self {
        let (width, height) = gl.drawing_buffer_size();
        let mut app = Self {
            gl,
            state: ContextState::new(),
            resources: Resources::new(),
            draw_calls: Vec::new(),
            width,
            height,
            clear_mask: config.clear_mask,
            max_draw_buffers: 1,
            draw_buffers_enabled: false,
            depth_textures_enabled: false,
            float_textures_enabled: false,
            linear_float_textures_enabled: false,
        };

        app.gl.viewport(0, 0, width, height);

        if let Some([r, g, b, a]) = config.clear_color {
            app.clear_color(r, g, b, a);
        }
        if config.depth_test {
            app.depth_test();
        }
        if config.blend {
            app.blend();
        }
        if config.cull_backfaces {
            app.cull_backfaces();
        }

        let ext = config.extensions;
        if ext.draw_buffers {
            app.draw_buffers();
        }
        if ext.depth_textures {
            app.depth_textures();
        }
        if ext.float_textures {
            app.float_textures();
        }
        if ext.linear_float_textures {
            app.linear_float_textures();
        }

        log::info!("app: {}x{} drawing buffer", width, height);
        app
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn gl(&self) -> &C {
        &self.gl
    }

    pub fn gl_mut(&mut self) -> &mut C {
        &mut self.gl
    }

    pub fn state(&self) -> &ContextState {
        &self.state
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn max_draw_buffers(&self) -> u32 {
        self.max_draw_buffers
    }

    pub fn draw_buffers_enabled(&self) -> bool {
        self.draw_buffers_enabled
    }

    pub fn depth_textures_enabled(&self) -> bool {
        self.depth_textures_enabled
    }

    pub fn float_textures_enabled(&self) -> bool {
        self.float_textures_enabled
    }

    pub fn linear_float_textures_enabled(&self) -> bool {
        self.linear_float_textures_enabled
    }

    // ── global state ──────────────────────────────────────────────────────

    /// Bits cleared by [`clear`](Self::clear).
    pub fn clear_mask(&mut self, mask: GLenum) -> &mut Self {
        self.clear_mask = mask;
        self
    }

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> &mut Self {
        self.gl.clear_color(r, g, b, a);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.gl.clear(self.clear_mask);
        self
    }

    /// Renders into `framebuffer` until [`default_framebuffer`](Self::default_framebuffer).
    pub fn framebuffer(&mut self, framebuffer: FramebufferId) -> &mut Self {
        match self.resources.framebuffers.get(framebuffer) {
            Some(fb) => fb.bind(&mut self.gl),
            None => log::warn!("app: framebuffer {:?} no longer exists", framebuffer),
        }
        self
    }

    pub fn default_framebuffer(&mut self) -> &mut Self {
        self.gl.bind_framebuffer(None);
        self
    }

    pub fn depth_range(&mut self, near: f32, far: f32) -> &mut Self {
        self.gl.depth_range(near, far);
        self
    }

    pub fn depth_test(&mut self) -> &mut Self {
        self.gl.enable(gl::DEPTH_TEST);
        self
    }

    pub fn no_depth_test(&mut self) -> &mut Self {
        self.gl.disable(gl::DEPTH_TEST);
        self
    }

    pub fn depth_mask(&mut self) -> &mut Self {
        self.gl.depth_mask(true);
        self
    }

    pub fn no_depth_mask(&mut self) -> &mut Self {
        self.gl.depth_mask(false);
        self
    }

    pub fn depth_func(&mut self, func: CompareFunc) -> &mut Self {
        self.gl.depth_func(func.gl());
        self
    }

    pub fn blend(&mut self) -> &mut Self {
        self.gl.enable(gl::BLEND);
        self
    }

    pub fn no_blend(&mut self) -> &mut Self {
        self.gl.disable(gl::BLEND);
        self
    }

    pub fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) -> &mut Self {
        self.gl.blend_func(src.gl(), dst.gl());
        self
    }

    pub fn blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> &mut Self {
        self.gl.blend_func_separate(src_rgb.gl(), dst_rgb.gl(), src_alpha.gl(), dst_alpha.gl());
        self
    }

    pub fn cull_backfaces(&mut self) -> &mut Self {
        self.gl.enable(gl::CULL_FACE);
        self
    }

    pub fn draw_backfaces(&mut self) -> &mut Self {
        self.gl.disable(gl::CULL_FACE);
        self
    }

    /// Picks up a new drawing-buffer size and resets the viewport to it.
    pub fn resize(&mut self) -> &mut Self {
        let (width, height) = self.gl.drawing_buffer_size();
        self.width = width;
        self.height = height;
        self.gl.viewport(0, 0, width, height);
        log::debug!("app: resized to {}x{}", width, height);
        self
    }

    // ── extensions ────────────────────────────────────────────────────────

    /// Enables multiple render targets. Check
    /// [`draw_buffers_enabled`](Self::draw_buffers_enabled) afterwards.
    pub fn draw_buffers(&mut self) -> &mut Self {
        if self.gl.supports_extension(gl::EXT_DRAW_BUFFERS) {
            self.max_draw_buffers = self.gl.max_draw_buffers();
            self.draw_buffers_enabled = true;
            log::debug!("app: draw buffers enabled (max {})", self.max_draw_buffers);
        } else {
            log::warn!("extension {} unavailable; cannot enable draw buffers", gl::EXT_DRAW_BUFFERS);
        }
        self
    }

    pub fn depth_textures(&mut self) -> &mut Self {
        self.depth_textures_enabled = self.request_extension(gl::EXT_DEPTH_TEXTURE, "depth textures");
        self
    }

    pub fn float_textures(&mut self) -> &mut Self {
        self.float_textures_enabled = self.request_extension(gl::EXT_TEXTURE_FLOAT, "float textures");
        self
    }

    pub fn linear_float_textures(&mut self) -> &mut Self {
        self.linear_float_textures_enabled =
            self.request_extension(gl::EXT_TEXTURE_FLOAT_LINEAR, "linear float texture filtering");
        self
    }

    fn request_extension(&mut self, name: &str, feature: &str) -> bool {
        let available = self.gl.supports_extension(name);
        if available {
            log::debug!("app: {} enabled", feature);
        } else {
            log::warn!("extension {} unavailable; cannot enable {}", name, feature);
        }
        available
    }

    // ── resource creation ─────────────────────────────────────────────────

    pub fn create_program(&mut self, vs_source: &str, fs_source: &str) -> Result<ProgramId> {
        let gl = &mut self.gl;
        self.resources
            .programs
            .try_insert_with(|id| Program::new(id, gl, vs_source, fs_source))
    }

    pub fn create_buffer<T: Pod>(&mut self, layout: BufferLayout, data: &[T]) -> Result<BufferId> {
        let gl = &mut self.gl;
        let state = &mut self.state;
        self.resources
            .buffers
            .try_insert_with(|id| VertexBuffer::new(id, gl, state, layout, data))
    }

    /// Replaces a buffer's contents.
    pub fn buffer_data<T: Pod>(&mut self, id: BufferId, data: &[T]) -> Result<&mut Self> {
        let buffer = self
            .resources
            .buffers
            .get_mut(id)
            .with_context(|| format!("buffer {:?} does not exist", id))?;
        buffer.data(&mut self.gl, &mut self.state, data);
        Ok(self)
    }

    /// Per-vertex (or per-instance) attribute data, `item_size` components per item.
    pub fn create_array_buffer<T: Pod>(&mut self, data_type: DataType, item_size: usize, data: &[T]) -> Result<BufferId> {
        self.create_buffer(BufferLayout::vertex(data_type, item_size), data)
    }

    /// Matrix attribute data spanning `columns` consecutive attribute slots.
    pub fn create_matrix_buffer<T: Pod>(
        &mut self,
        data_type: DataType,
        rows: usize,
        columns: usize,
        data: &[T],
    ) -> Result<BufferId> {
        self.create_buffer(BufferLayout::matrix(data_type, rows, columns), data)
    }

    /// Element indices, `item_size` indices per item (3 for triangles).
    pub fn create_index_buffer<T: Pod>(&mut self, data_type: DataType, item_size: usize, data: &[T]) -> Result<BufferId> {
        self.create_buffer(BufferLayout::index(data_type, item_size), data)
    }

    pub fn create_texture(&mut self, pixels: Option<&[u8]>, options: &TextureOptions) -> Result<TextureId> {
        self.check_float_type(options.data_type);
        let gl = &mut self.gl;
        self.resources
            .textures
            .try_insert_with(|id| Texture::new_2d(id, gl, pixels, options))
    }

    pub fn create_cubemap(&mut self, faces: &CubemapFaces<'_>, options: &TextureOptions) -> Result<TextureId> {
        self.check_float_type(options.data_type);
        let gl = &mut self.gl;
        self.resources
            .textures
            .try_insert_with(|id| Texture::new_cubemap(id, gl, faces, options))
    }

    /// Framebuffer sized to the drawing buffer. Its attachment textures can
    /// be sampled through [`Framebuffer::color_texture`] and
    /// [`Framebuffer::depth_texture`].
    pub fn create_framebuffer(&mut self, options: &FramebufferOptions) -> Result<FramebufferId> {
        self.check_float_type(options.color_type);
        let caps = FramebufferCaps {
            draw_buffers: self.draw_buffers_enabled,
            max_draw_buffers: self.max_draw_buffers,
            depth_textures: self.depth_textures_enabled,
        };
        let Resources { framebuffers, textures, .. } = &mut self.resources;
        let gl = &mut self.gl;
        framebuffers.try_insert_with(|id| Framebuffer::new(id, gl, textures, options, caps))
    }

    pub fn create_vertex_array(&mut self) -> VertexArrayId {
        self.resources.vertex_arrays.insert_with(VertexArray::new)
    }

    pub fn create_draw_call(&self, program: ProgramId, primitive: Primitive) -> Result<DrawCall> {
        let program = self
            .resources
            .programs
            .get(program)
            .with_context(|| format!("program {:?} does not exist", program))?;
        Ok(DrawCall::new(program, primitive))
    }

    fn check_float_type(&self, data_type: DataType) {
        if data_type == DataType::Float && !self.float_textures_enabled {
            log::warn!("float texture requested without float textures enabled");
        }
    }

    // ── vertex arrays ─────────────────────────────────────────────────────

    pub fn vertex_attribute_buffer(
        &mut self,
        vertex_array: VertexArrayId,
        index: u32,
        buffer: BufferId,
        options: &AttributeOptions,
    ) -> Result<&mut Self> {
        self.attach_attribute(vertex_array, index, buffer, options, false)?;
        Ok(self)
    }

    pub fn instance_attribute_buffer(
        &mut self,
        vertex_array: VertexArrayId,
        index: u32,
        buffer: BufferId,
        options: &AttributeOptions,
    ) -> Result<&mut Self> {
        self.attach_attribute(vertex_array, index, buffer, options, true)?;
        Ok(self)
    }

    pub fn index_buffer(&mut self, vertex_array: VertexArrayId, buffer: BufferId) -> Result<&mut Self> {
        let Resources { vertex_arrays, buffers, .. } = &mut self.resources;
        let va = vertex_arrays
            .get_mut(vertex_array)
            .with_context(|| format!("vertex array {:?} does not exist", vertex_array))?;
        let buffer = buffers
            .get(buffer)
            .with_context(|| format!("buffer {:?} does not exist", buffer))?;
        va.index_buffer(&mut self.gl, &mut self.state, buffer)?;
        Ok(self)
    }

    pub fn element_counts(&mut self, vertex_array: VertexArrayId, counts: &[usize]) -> &mut Self {
        match self.resources.vertex_arrays.get_mut(vertex_array) {
            Some(va) => {
                va.element_counts(counts);
            }
            None => log::warn!("app: vertex array {:?} no longer exists", vertex_array),
        }
        self
    }

    pub fn instance_counts(&mut self, vertex_array: VertexArrayId, counts: &[usize]) -> &mut Self {
        match self.resources.vertex_arrays.get_mut(vertex_array) {
            Some(va) => {
                va.instance_counts(counts);
            }
            None => log::warn!("app: vertex array {:?} no longer exists", vertex_array),
        }
        self
    }

    fn attach_attribute(
        &mut self,
        vertex_array: VertexArrayId,
        index: u32,
        buffer: BufferId,
        options: &AttributeOptions,
        instanced: bool,
    ) -> Result<()> {
        let Resources { vertex_arrays, buffers, .. } = &mut self.resources;
        let va = vertex_arrays
            .get_mut(vertex_array)
            .with_context(|| format!("vertex array {:?} does not exist", vertex_array))?;
        let buffer = buffers
            .get(buffer)
            .with_context(|| format!("buffer {:?} does not exist", buffer))?;

        if instanced {
            va.instance_attribute_buffer(&mut self.gl, &mut self.state, index, buffer, options)?;
        } else {
            va.vertex_attribute_buffer(&mut self.gl, &mut self.state, index, buffer, options)?;
        }
        Ok(())
    }

    // ── draw list ─────────────────────────────────────────────────────────

    /// Replaces the list of draw calls executed by [`draw`](Self::draw).
    pub fn draw_calls(&mut self, draw_calls: Vec<DrawCall>) -> &mut Self {
        self.draw_calls = draw_calls;
        self
    }

    pub fn draw_call(&self, index: usize) -> Option<&DrawCall> {
        self.draw_calls.get(index)
    }

    /// Mutable access to a queued draw call, e.g. to animate a uniform.
    pub fn draw_call_mut(&mut self, index: usize) -> Option<&mut DrawCall> {
        self.draw_calls.get_mut(index)
    }

    /// Reconfigures a queued draw call with access to the resources it
    /// references (attribute and index buffers need their metadata).
    pub fn configure_draw_call<R>(
        &mut self,
        index: usize,
        configure: impl FnOnce(&mut DrawCall, &Resources) -> R,
    ) -> Option<R> {
        let dc = self.draw_calls.get_mut(index)?;
        Some(configure(dc, &self.resources))
    }

    /// Executes every draw call in list order.
    pub fn draw(&mut self) -> &mut Self {
        for dc in &self.draw_calls {
            dc.draw(&mut self.gl, &mut self.state, &mut self.resources);
        }
        self
    }

    // ── teardown / context loss ───────────────────────────────────────────

    /// Draw calls still referencing a deleted resource skip it with a warning.
    pub fn delete_program(&mut self, id: ProgramId) -> &mut Self {
        if let Some(mut program) = self.resources.programs.remove(id) {
            program.delete(&mut self.gl, &mut self.state);
        }
        self
    }

    pub fn delete_buffer(&mut self, id: BufferId) -> &mut Self {
        if let Some(mut buffer) = self.resources.buffers.remove(id) {
            buffer.delete(&mut self.gl);
        }
        self
    }

    pub fn delete_texture(&mut self, id: TextureId) -> &mut Self {
        if let Some(mut texture) = self.resources.textures.remove(id) {
            texture.delete(&mut self.gl);
        }
        self
    }

    /// Deletes the framebuffer together with its attachment textures.
    pub fn delete_framebuffer(&mut self, id: FramebufferId) -> &mut Self {
        if let Some(mut fb) = self.resources.framebuffers.remove(id) {
            fb.delete(&mut self.gl, &mut self.resources.textures);
        }
        self
    }

    pub fn delete_vertex_array(&mut self, id: VertexArrayId) -> &mut Self {
        if let Some(mut va) = self.resources.vertex_arrays.remove(id) {
            va.delete(&mut self.gl, &mut self.state);
        }
        self
    }

    /// Reallocates a framebuffer's attachments at the current drawing-buffer size.
    pub fn resize_framebuffer(&mut self, id: FramebufferId) -> &mut Self {
        let Resources { framebuffers, textures, .. } = &mut self.resources;
        match framebuffers.get_mut(id) {
            Some(fb) => fb.resize(&mut self.gl, textures),
            None => log::warn!("app: framebuffer {:?} no longer exists", id),
        }
        self
    }

    /// Recreates a vertex array's native object after context loss.
    pub fn restore_vertex_array(&mut self, id: VertexArrayId) -> Result<&mut Self> {
        let va = self
            .resources
            .vertex_arrays
            .get_mut(id)
            .with_context(|| format!("vertex array {:?} does not exist", id))?;
        va.restore(&mut self.gl, &mut self.state)?;
        Ok(self)
    }
}
