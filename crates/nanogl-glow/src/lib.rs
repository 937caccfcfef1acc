//! `glow` backend for `nanogl`.
//!
//! [`GlowContext`] implements [`GlContext`] on a `glow::Context`, which runs on
//! desktop GL 3.3+, GLES 3 and WebGL 2. glow's object types are kept in
//! per-kind handle tables; the object model only ever sees the numeric
//! handles.
//!
//! WebGL 2 and GL 3 have draw buffers, depth textures and float textures in
//! core, so those extension requests succeed without an extension string.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use glow::HasContext;

use nanogl::context::{
    ActiveInfo, GlContext, NativeBuffer, NativeFramebuffer, NativeProgram, NativeRenderbuffer,
    NativeShader, NativeTexture, NativeUniformLocation, NativeVertexArray,
};
use nanogl::gl::{self, GLenum};

type Shader = <glow::Context as HasContext>::Shader;
type Program = <glow::Context as HasContext>::Program;
type Buffer = <glow::Context as HasContext>::Buffer;
type VertexArray = <glow::Context as HasContext>::VertexArray;
type Texture = <glow::Context as HasContext>::Texture;
type Framebuffer = <glow::Context as HasContext>::Framebuffer;
type Renderbuffer = <glow::Context as HasContext>::Renderbuffer;
type UniformLocation = <glow::Context as HasContext>::UniformLocation;

// ── Handle tables ─────────────────────────────────────────────────────────

/// Maps numeric handles to glow objects. Handle `n` lives at index `n - 1`;
/// handles are never reused.
struct Handles<T> {
    kind: &'static str,
    slots: Vec<Option<T>>,
}

impl<T: Clone> Handles<T> {
    fn new(kind: &'static str) -> Self {
        Self { kind, slots: Vec::new() }
    }

    fn insert(&mut self, object: T) -> u32 {
        self.slots.push(Some(object));
        self.slots.len() as u32
    }

    /// Logs and returns `None` for unknown or deleted handles.
    fn get(&self, handle: u32) -> Option<T> {
        let found = (handle as usize)
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(|slot| slot.clone());
        if found.is_none() {
            log::warn!("glow: unknown {} handle {}", self.kind, handle);
        }
        found
    }

    fn remove(&mut self, handle: u32) -> Option<T> {
        let removed = (handle as usize)
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::take);
        if removed.is_none() {
            log::warn!("glow: {} handle {} deleted twice", self.kind, handle);
        }
        removed
    }

    fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Uniform locations grouped by the program that owns them.
///
/// A `(program, name)` pair resolves to one handle; deleting the program
/// drops all of its locations.
struct UniformLocations<T> {
    table: Handles<T>,
    by_program: HashMap<u32, HashMap<String, u32>>,
}

impl<T: Clone> UniformLocations<T> {
    fn new() -> Self {
        Self { table: Handles::new("uniform location"), by_program: HashMap::new() }
    }

    /// Handle for `name` in `program`, asking `lookup` only on first use.
    fn resolve(&mut self, program: u32, name: &str, lookup: impl FnOnce() -> Option<T>) -> Option<u32> {
        let names = self.by_program.entry(program).or_default();
        if let Some(handle) = names.get(name) {
            return Some(*handle);
        }
        let handle = self.table.insert(lookup()?);
        names.insert(name.to_string(), handle);
        Some(handle)
    }

    fn get(&self, handle: u32) -> Option<T> {
        self.table.get(handle)
    }

    fn release(&mut self, program: u32) {
        for handle in self.by_program.remove(&program).into_iter().flat_map(HashMap::into_values) {
            self.table.remove(handle);
        }
    }

    fn live(&self) -> usize {
        self.table.live()
    }
}

// ── Context ───────────────────────────────────────────────────────────────

/// A [`GlContext`] backed by `glow`.
pub struct GlowContext {
    gl: glow::Context,
    size: (u32, u32),

    shaders: Handles<Shader>,
    programs: Handles<Program>,
    buffers: Handles<Buffer>,
    vertex_arrays: Handles<VertexArray>,
    textures: Handles<Texture>,
    framebuffers: Handles<Framebuffer>,
    renderbuffers: Handles<Renderbuffer>,
    uniform_locations: UniformLocations<UniformLocation>,
}

impl GlowContext {
    /// Wraps `gl`, whose default framebuffer is `width` x `height` pixels.
    pub fn new(gl: glow::Context, width: u32, height: u32) -> Self {
        let version = gl.version();
        log::info!(
            "glow: GL {}.{}{} ({})",
            version.major,
            version.minor,
            if version.is_embedded { " ES" } else { "" },
            version.vendor_info
        );

        Self {
            gl,
            size: (width, height),
            shaders: Handles::new("shader"),
            programs: Handles::new("program"),
            buffers: Handles::new("buffer"),
            vertex_arrays: Handles::new("vertex array"),
            textures: Handles::new("texture"),
            framebuffers: Handles::new("framebuffer"),
            renderbuffers: Handles::new("renderbuffer"),
            uniform_locations: UniformLocations::new(),
        }
    }

    /// Requests a WebGL 2 context from `canvas`.
    #[cfg(target_arch = "wasm32")]
    pub fn from_canvas(
        canvas: &web_sys::HtmlCanvasElement,
        attributes: &nanogl::ContextAttributes,
    ) -> Result<Self> {
        use wasm_bindgen::JsCast;

        let options = web_sys::WebGlContextAttributes::new();
        options.set_alpha(attributes.alpha);
        options.set_depth(attributes.depth);
        options.set_stencil(attributes.stencil);
        options.set_antialias(attributes.antialias);
        options.set_premultiplied_alpha(attributes.premultiplied_alpha);
        options.set_preserve_drawing_buffer(attributes.preserve_drawing_buffer);

        let context = canvas
            .get_context_with_context_options("webgl2", &options)
            .map_err(|e| anyhow!("failed to request webgl2 context: {e:?}"))?
            .ok_or_else(|| anyhow!("webgl2 is not supported by this browser"))?
            .dyn_into::<web_sys::WebGl2RenderingContext>()
            .map_err(|_| anyhow!("canvas returned a non-webgl2 context"))?;

        Ok(Self::new(
            glow::Context::from_webgl2_context(context),
            canvas.width(),
            canvas.height(),
        ))
    }

    /// Records a new default-framebuffer size, e.g. after a window resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    pub fn glow(&self) -> &glow::Context {
        &self.gl
    }

    /// Number of native objects created through this context and not yet deleted.
    pub fn live_objects(&self) -> usize {
        self.shaders.live()
            + self.programs.live()
            + self.buffers.live()
            + self.vertex_arrays.live()
            + self.textures.live()
            + self.framebuffers.live()
            + self.renderbuffers.live()
    }

    fn core_feature(&self, name: &str) -> bool {
        let version = self.gl.version();
        match name {
            gl::EXT_DRAW_BUFFERS | gl::EXT_DEPTH_TEXTURE | gl::EXT_TEXTURE_FLOAT => version.major >= 3,
            gl::EXT_TEXTURE_FLOAT_LINEAR => !version.is_embedded && version.major >= 3,
            _ => false,
        }
    }

    fn active_info(name: String, kind: u32, size: i32) -> ActiveInfo {
        ActiveInfo { name, kind, size }
    }
}

impl std::fmt::Debug for GlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlowContext")
            .field("size", &self.size)
            .field("live_objects", &self.live_objects())
            .finish_non_exhaustive()
    }
}

impl GlContext for GlowContext {
    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn supports_extension(&mut self, name: &str) -> bool {
        if self.core_feature(name) {
            return true;
        }
        let extensions = self.gl.supported_extensions();
        extensions.contains(name) || extensions.contains(&format!("GL_{name}"))
    }

    fn max_draw_buffers(&self) -> u32 {
        let max = unsafe { self.gl.get_parameter_i32(gl::MAX_DRAW_BUFFERS) };
        max.max(1) as u32
    }

    // ── global state ──────────────────────────────────────────────────────

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        unsafe { self.gl.viewport(x, y, width as i32, height as i32) }
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear(&mut self, mask: GLenum) {
        unsafe { self.gl.clear(mask) }
    }

    fn enable(&mut self, capability: GLenum) {
        unsafe { self.gl.enable(capability) }
    }

    fn disable(&mut self, capability: GLenum) {
        unsafe { self.gl.disable(capability) }
    }

    fn depth_mask(&mut self, write: bool) {
        unsafe { self.gl.depth_mask(write) }
    }

    fn depth_func(&mut self, func: GLenum) {
        unsafe { self.gl.depth_func(func) }
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        unsafe { self.gl.depth_range_f32(near, far) }
    }

    fn blend_func(&mut self, src: GLenum, dst: GLenum) {
        unsafe { self.gl.blend_func(src, dst) }
    }

    fn blend_func_separate(&mut self, src_rgb: GLenum, dst_rgb: GLenum, src_alpha: GLenum, dst_alpha: GLenum) {
        unsafe { self.gl.blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha) }
    }

    // ── shaders / programs ────────────────────────────────────────────────

    fn create_shader(&mut self, kind: GLenum) -> Result<NativeShader> {
        let shader = unsafe { self.gl.create_shader(kind) }.map_err(|e| anyhow!(e))?;
        Ok(NativeShader(self.shaders.insert(shader)))
    }

    fn shader_source(&mut self, shader: NativeShader, source: &str) {
        if let Some(s) = self.shaders.get(shader.0) {
            unsafe { self.gl.shader_source(s, source) }
        }
    }

    fn compile_shader(&mut self, shader: NativeShader) {
        if let Some(s) = self.shaders.get(shader.0) {
            unsafe { self.gl.compile_shader(s) }
        }
    }

    fn shader_compile_status(&self, shader: NativeShader) -> bool {
        self.shaders
            .get(shader.0)
            .is_some_and(|s| unsafe { self.gl.get_shader_compile_status(s) })
    }

    fn shader_info_log(&self, shader: NativeShader) -> String {
        self.shaders
            .get(shader.0)
            .map(|s| unsafe { self.gl.get_shader_info_log(s) })
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: NativeShader) {
        if let Some(s) = self.shaders.remove(shader.0) {
            unsafe { self.gl.delete_shader(s) }
        }
    }

    fn create_program(&mut self) -> Result<NativeProgram> {
        let program = unsafe { self.gl.create_program() }.map_err(|e| anyhow!(e))?;
        Ok(NativeProgram(self.programs.insert(program)))
    }

    fn attach_shader(&mut self, program: NativeProgram, shader: NativeShader) {
        if let (Some(p), Some(s)) = (self.programs.get(program.0), self.shaders.get(shader.0)) {
            unsafe { self.gl.attach_shader(p, s) }
        }
    }

    fn link_program(&mut self, program: NativeProgram) {
        if let Some(p) = self.programs.get(program.0) {
            unsafe { self.gl.link_program(p) }
        }
    }

    fn program_link_status(&self, program: NativeProgram) -> bool {
        self.programs
            .get(program.0)
            .is_some_and(|p| unsafe { self.gl.get_program_link_status(p) })
    }

    fn program_info_log(&self, program: NativeProgram) -> String {
        self.programs
            .get(program.0)
            .map(|p| unsafe { self.gl.get_program_info_log(p) })
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<NativeProgram>) {
        let p = program.and_then(|h| self.programs.get(h.0));
        unsafe { self.gl.use_program(p) }
    }

    fn delete_program(&mut self, program: NativeProgram) {
        self.uniform_locations.release(program.0);
        if let Some(p) = self.programs.remove(program.0) {
            unsafe { self.gl.delete_program(p) }
        }
    }

    fn active_attributes(&self, program: NativeProgram) -> Vec<ActiveInfo> {
        let Some(p) = self.programs.get(program.0) else {
            return Vec::new();
        };
        unsafe {
            (0..self.gl.get_active_attributes(p))
                .filter_map(|i| self.gl.get_active_attribute(p, i))
                .map(|a| Self::active_info(a.name, a.atype, a.size))
                .collect()
        }
    }

    fn active_uniforms(&self, program: NativeProgram) -> Vec<ActiveInfo> {
        let Some(p) = self.programs.get(program.0) else {
            return Vec::new();
        };
        unsafe {
            (0..self.gl.get_active_uniforms(p))
                .filter_map(|i| self.gl.get_active_uniform(p, i))
                .map(|u| Self::active_info(u.name, u.utype, u.size))
                .collect()
        }
    }

    fn attrib_location(&self, program: NativeProgram, name: &str) -> Option<u32> {
        let p = self.programs.get(program.0)?;
        unsafe { self.gl.get_attrib_location(p, name) }
    }

    fn uniform_location(&mut self, program: NativeProgram, name: &str) -> Option<NativeUniformLocation> {
        let p = self.programs.get(program.0)?;
        let gl = &self.gl;
        let handle = self
            .uniform_locations
            .resolve(program.0, name, || unsafe { gl.get_uniform_location(p, name) })?;
        Some(NativeUniformLocation(handle))
    }

    // ── uniforms ──────────────────────────────────────────────────────────

    fn uniform_1i(&mut self, location: NativeUniformLocation, value: i32) {
        if let Some(l) = self.uniform_locations.get(location.0) {
            unsafe { self.gl.uniform_1_i32(Some(&l), value) }
        }
    }

    fn uniform_1f(&mut self, location: NativeUniformLocation, value: f32) {
        if let Some(l) = self.uniform_locations.get(location.0) {
            unsafe { self.gl.uniform_1_f32(Some(&l), value) }
        }
    }

    fn uniform_2fv(&mut self, location: NativeUniformLocation, value: &[f32; 2]) {
        if let Some(l) = self.uniform_locations.get(location.0) {
            unsafe { self.gl.uniform_2_f32_slice(Some(&l), value) }
        }
    }

    fn uniform_3fv(&mut self, location: NativeUniformLocation, value: &[f32; 3]) {
        if let Some(l) = self.uniform_locations.get(location.0) {
            unsafe { self.gl.uniform_3_f32_slice(Some(&l), value) }
        }
    }

    fn uniform_4fv(&mut self, location: NativeUniformLocation, value: &[f32; 4]) {
        if let Some(l) = self.uniform_locations.get(location.0) {
            unsafe { self.gl.uniform_4_f32_slice(Some(&l), value) }
        }
    }

    fn uniform_matrix_3fv(&mut self, location: NativeUniformLocation, value: &[f32; 9]) {
        if let Some(l) = self.uniform_locations.get(location.0) {
            unsafe { self.gl.uniform_matrix_3_f32_slice(Some(&l), false, value) }
        }
    }

    fn uniform_matrix_4fv(&mut self, location: NativeUniformLocation, value: &[f32; 16]) {
        if let Some(l) = self.uniform_locations.get(location.0) {
            unsafe { self.gl.uniform_matrix_4_f32_slice(Some(&l), false, value) }
        }
    }

    // ── buffers / attributes ──────────────────────────────────────────────

    fn create_buffer(&mut self) -> Result<NativeBuffer> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(|e| anyhow!(e))?;
        Ok(NativeBuffer(self.buffers.insert(buffer)))
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: Option<NativeBuffer>) {
        let b = buffer.and_then(|h| self.buffers.get(h.0));
        unsafe { self.gl.bind_buffer(target, b) }
    }

    fn buffer_data(&mut self, target: GLenum, data: &[u8], usage: GLenum) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn delete_buffer(&mut self, buffer: NativeBuffer) {
        if let Some(b) = self.buffers.remove(buffer.0) {
            unsafe { self.gl.delete_buffer(b) }
        }
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        data_type: GLenum,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe { self.gl.vertex_attrib_pointer_f32(index, size, data_type, normalized, stride, offset) }
    }

    fn vertex_attrib_i_pointer(&mut self, index: u32, size: i32, data_type: GLenum, stride: i32, offset: i32) {
        unsafe { self.gl.vertex_attrib_pointer_i32(index, size, data_type, stride, offset) }
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(index, divisor) }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn create_vertex_array(&mut self) -> Result<NativeVertexArray> {
        let vao = unsafe { self.gl.create_vertex_array() }.map_err(|e| anyhow!(e))?;
        Ok(NativeVertexArray(self.vertex_arrays.insert(vao)))
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<NativeVertexArray>) {
        let v = vertex_array.and_then(|h| self.vertex_arrays.get(h.0));
        unsafe { self.gl.bind_vertex_array(v) }
    }

    fn delete_vertex_array(&mut self, vertex_array: NativeVertexArray) {
        if let Some(v) = self.vertex_arrays.remove(vertex_array.0) {
            unsafe { self.gl.delete_vertex_array(v) }
        }
    }

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self) -> Result<NativeTexture> {
        let texture = unsafe { self.gl.create_texture() }.map_err(|e| anyhow!(e))?;
        Ok(NativeTexture(self.textures.insert(texture)))
    }

    fn active_texture(&mut self, unit: GLenum) {
        unsafe { self.gl.active_texture(unit) }
    }

    fn bind_texture(&mut self, target: GLenum, texture: Option<NativeTexture>) {
        let t = texture.and_then(|h| self.textures.get(h.0));
        unsafe { self.gl.bind_texture(target, t) }
    }

    fn tex_parameter_i(&mut self, target: GLenum, parameter: GLenum, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, parameter, value) }
    }

    fn pixel_store_i(&mut self, parameter: GLenum, value: i32) {
        // Desktop GL has no unpack flip; uploads land as given.
        if parameter == gl::UNPACK_FLIP_Y_WEBGL && !cfg!(target_arch = "wasm32") {
            log::trace!("glow: UNPACK_FLIP_Y_WEBGL ignored on native GL");
            return;
        }
        unsafe { self.gl.pixel_store_i32(parameter, value) }
    }

    fn tex_image_2d(
        &mut self,
        target: GLenum,
        internal_format: GLenum,
        width: u32,
        height: u32,
        format: GLenum,
        data_type: GLenum,
        pixels: Option<&[u8]>,
    ) {
        unsafe {
            self.gl.tex_image_2d(
                target,
                0,
                internal_format as i32,
                width as i32,
                height as i32,
                0,
                format,
                data_type,
                glow::PixelUnpackData::Slice(pixels),
            )
        }
    }

    fn generate_mipmap(&mut self, target: GLenum) {
        unsafe { self.gl.generate_mipmap(target) }
    }

    fn delete_texture(&mut self, texture: NativeTexture) {
        if let Some(t) = self.textures.remove(texture.0) {
            unsafe { self.gl.delete_texture(t) }
        }
    }

    // ── framebuffers ──────────────────────────────────────────────────────

    fn create_framebuffer(&mut self) -> Result<NativeFramebuffer> {
        let fb = unsafe { self.gl.create_framebuffer() }.map_err(|e| anyhow!(e))?;
        Ok(NativeFramebuffer(self.framebuffers.insert(fb)))
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<NativeFramebuffer>) {
        let f = framebuffer.and_then(|h| self.framebuffers.get(h.0));
        unsafe { self.gl.bind_framebuffer(gl::FRAMEBUFFER, f) }
    }

    fn framebuffer_texture_2d(&mut self, attachment: GLenum, texture_target: GLenum, texture: NativeTexture) {
        if let Some(t) = self.textures.get(texture.0) {
            unsafe { self.gl.framebuffer_texture_2d(gl::FRAMEBUFFER, attachment, texture_target, Some(t), 0) }
        }
    }

    fn check_framebuffer_status(&self) -> GLenum {
        unsafe { self.gl.check_framebuffer_status(gl::FRAMEBUFFER) }
    }

    fn draw_buffers(&mut self, attachments: &[GLenum]) {
        unsafe { self.gl.draw_buffers(attachments) }
    }

    fn delete_framebuffer(&mut self, framebuffer: NativeFramebuffer) {
        if let Some(f) = self.framebuffers.remove(framebuffer.0) {
            unsafe { self.gl.delete_framebuffer(f) }
        }
    }

    fn create_renderbuffer(&mut self) -> Result<NativeRenderbuffer> {
        let rb = unsafe { self.gl.create_renderbuffer() }.map_err(|e| anyhow!(e))?;
        Ok(NativeRenderbuffer(self.renderbuffers.insert(rb)))
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<NativeRenderbuffer>) {
        let r = renderbuffer.and_then(|h| self.renderbuffers.get(h.0));
        unsafe { self.gl.bind_renderbuffer(gl::RENDERBUFFER, r) }
    }

    fn renderbuffer_storage(&mut self, internal_format: GLenum, width: u32, height: u32) {
        unsafe { self.gl.renderbuffer_storage(gl::RENDERBUFFER, internal_format, width as i32, height as i32) }
    }

    fn framebuffer_renderbuffer(&mut self, attachment: GLenum, renderbuffer: NativeRenderbuffer) {
        if let Some(r) = self.renderbuffers.get(renderbuffer.0) {
            unsafe { self.gl.framebuffer_renderbuffer(gl::FRAMEBUFFER, attachment, gl::RENDERBUFFER, Some(r)) }
        }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: NativeRenderbuffer) {
        if let Some(r) = self.renderbuffers.remove(renderbuffer.0) {
            unsafe { self.gl.delete_renderbuffer(r) }
        }
    }

    // ── draws ─────────────────────────────────────────────────────────────

    fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode, first, count) }
    }

    fn draw_elements(&mut self, mode: GLenum, count: i32, index_type: GLenum, offset: i32) {
        unsafe { self.gl.draw_elements(mode, count, index_type, offset) }
    }

    fn draw_arrays_instanced(&mut self, mode: GLenum, first: i32, count: i32, instances: i32) {
        unsafe { self.gl.draw_arrays_instanced(mode, first, count, instances) }
    }

    fn draw_elements_instanced(
        &mut self,
        mode: GLenum,
        count: i32,
        index_type: GLenum,
        offset: i32,
        instances: i32,
    ) {
        unsafe { self.gl.draw_elements_instanced(mode, count, index_type, offset, instances) }
    }
}
