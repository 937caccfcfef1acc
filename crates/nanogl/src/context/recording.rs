use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

use crate::gl::{self, GLenum};

use super::native::{
    ActiveInfo, GlContext, NativeBuffer, NativeFramebuffer, NativeProgram, NativeRenderbuffer,
    NativeShader, NativeTexture, NativeUniformLocation, NativeVertexArray,
};

/// One recorded native call.
///
/// Queries (status, info logs, introspection) are answered from the
/// context's configuration and are not recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Viewport(i32, i32, u32, u32),
    ClearColor([f32; 4]),
    Clear(GLenum),
    Enable(GLenum),
    Disable(GLenum),
    DepthMask(bool),
    DepthFunc(GLenum),
    DepthRange(f32, f32),
    BlendFunc(GLenum, GLenum),
    BlendFuncSeparate(GLenum, GLenum, GLenum, GLenum),

    CreateShader(GLenum, NativeShader),
    ShaderSource(NativeShader),
    CompileShader(NativeShader),
    DeleteShader(NativeShader),
    CreateProgram(NativeProgram),
    AttachShader(NativeProgram, NativeShader),
    LinkProgram(NativeProgram),
    UseProgram(Option<NativeProgram>),
    DeleteProgram(NativeProgram),

    Uniform1i(NativeUniformLocation, i32),
    Uniform1f(NativeUniformLocation, f32),
    Uniform2fv(NativeUniformLocation, [f32; 2]),
    Uniform3fv(NativeUniformLocation, [f32; 3]),
    Uniform4fv(NativeUniformLocation, [f32; 4]),
    UniformMatrix3fv(NativeUniformLocation, [f32; 9]),
    UniformMatrix4fv(NativeUniformLocation, [f32; 16]),

    CreateBuffer(NativeBuffer),
    BindBuffer(GLenum, Option<NativeBuffer>),
    BufferData { target: GLenum, len: usize, usage: GLenum },
    DeleteBuffer(NativeBuffer),
    VertexAttribPointer { index: u32, size: i32, data_type: GLenum, normalized: bool, stride: i32, offset: i32 },
    VertexAttribIPointer { index: u32, size: i32, data_type: GLenum, stride: i32, offset: i32 },
    VertexAttribDivisor(u32, u32),
    EnableVertexAttribArray(u32),

    CreateVertexArray(NativeVertexArray),
    BindVertexArray(Option<NativeVertexArray>),
    DeleteVertexArray(NativeVertexArray),

    CreateTexture(NativeTexture),
    ActiveTexture(GLenum),
    BindTexture(GLenum, Option<NativeTexture>),
    TexParameter(GLenum, GLenum, i32),
    PixelStore(GLenum, i32),
    TexImage2d {
        target: GLenum,
        internal_format: GLenum,
        width: u32,
        height: u32,
        format: GLenum,
        data_type: GLenum,
        has_pixels: bool,
    },
    GenerateMipmap(GLenum),
    DeleteTexture(NativeTexture),

    CreateFramebuffer(NativeFramebuffer),
    BindFramebuffer(Option<NativeFramebuffer>),
    FramebufferTexture2d(GLenum, GLenum, NativeTexture),
    DrawBuffers(Vec<GLenum>),
    DeleteFramebuffer(NativeFramebuffer),
    CreateRenderbuffer(NativeRenderbuffer),
    BindRenderbuffer(Option<NativeRenderbuffer>),
    RenderbufferStorage(GLenum, u32, u32),
    FramebufferRenderbuffer(GLenum, NativeRenderbuffer),
    DeleteRenderbuffer(NativeRenderbuffer),

    DrawArrays { mode: GLenum, first: i32, count: i32 },
    DrawElements { mode: GLenum, count: i32, index_type: GLenum, offset: i32 },
    DrawArraysInstanced { mode: GLenum, first: i32, count: i32, instances: i32 },
    DrawElementsInstanced { mode: GLenum, count: i32, index_type: GLenum, offset: i32, instances: i32 },
}

impl GlCall {
    /// Whether the call issues geometry.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            GlCall::DrawArrays { .. }
                | GlCall::DrawElements { .. }
                | GlCall::DrawArraysInstanced { .. }
                | GlCall::DrawElementsInstanced { .. }
        )
    }

    /// Whether the call uploads a uniform value.
    pub fn is_uniform_upload(&self) -> bool {
        matches!(
            self,
            GlCall::Uniform1i(..)
                | GlCall::Uniform1f(..)
                | GlCall::Uniform2fv(..)
                | GlCall::Uniform3fv(..)
                | GlCall::Uniform4fv(..)
                | GlCall::UniformMatrix3fv(..)
                | GlCall::UniformMatrix4fv(..)
        )
    }
}

#[derive(Debug, Clone, Default)]
struct ProgramRecord {
    shaders: Vec<NativeShader>,
    attributes: Vec<ActiveInfo>,
    uniforms: Vec<ActiveInfo>,
    linked: bool,
}

/// Headless context that records every native call.
///
/// Handles are allocated sequentially starting at 1. Program introspection
/// answers with the interface configured through
/// [`set_program_interface`](Self::set_program_interface); attribute
/// locations are the positions in that list.
#[derive(Debug)]
pub struct RecordingContext {
    calls: Vec<GlCall>,
    next_handle: u32,

    size: (u32, u32),
    extensions: HashSet<String>,
    max_draw_buffers: u32,
    framebuffer_status: GLenum,
    fail_compile_marker: Option<String>,
    fail_link: bool,
    fail_allocation_at: Option<usize>,
    allocations: usize,

    interface_attributes: Vec<ActiveInfo>,
    interface_uniforms: Vec<ActiveInfo>,

    shader_sources: HashMap<NativeShader, String>,
    compiled: HashMap<NativeShader, bool>,
    programs: HashMap<NativeProgram, ProgramRecord>,
    uniform_locations: HashMap<(NativeProgram, String), NativeUniformLocation>,
}

impl RecordingContext {
    /// Creates a context with the given drawing-buffer size and no extensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            calls: Vec::new(),
            next_handle: 1,
            size: (width, height),
            extensions: HashSet::new(),
            max_draw_buffers: 1,
            framebuffer_status: gl::FRAMEBUFFER_COMPLETE,
            fail_compile_marker: None,
            fail_link: false,
            fail_allocation_at: None,
            allocations: 0,
            interface_attributes: Vec::new(),
            interface_uniforms: Vec::new(),
            shader_sources: HashMap::new(),
            compiled: HashMap::new(),
            programs: HashMap::new(),
            uniform_locations: HashMap::new(),
        }
    }

    /// Marks an extension as available.
    pub fn with_extension(mut self, name: &str) -> Self {
        self.extensions.insert(name.to_string());
        self
    }

    pub fn with_max_draw_buffers(mut self, max: u32) -> Self {
        self.max_draw_buffers = max;
        self
    }

    /// Status reported by `check_framebuffer_status`.
    pub fn set_framebuffer_status(&mut self, status: GLenum) {
        self.framebuffer_status = status;
    }

    /// Shaders whose source contains `marker` fail to compile.
    pub fn fail_compile_containing(&mut self, marker: &str) {
        self.fail_compile_marker = Some(marker.to_string());
    }

    pub fn set_fail_link(&mut self, fail: bool) {
        self.fail_link = fail;
    }

    /// The `n`th object creation from now on (1-based, any kind) fails.
    pub fn fail_nth_allocation(&mut self, n: usize) {
        self.fail_allocation_at = Some(self.allocations + n);
    }

    pub fn set_drawing_buffer_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    /// Interface reported for programs linked from now on.
    pub fn set_program_interface(&mut self, attributes: Vec<ActiveInfo>, uniforms: Vec<ActiveInfo>) {
        self.interface_attributes = attributes;
        self.interface_uniforms = uniforms;
    }

    /// Recorded calls in issue order.
    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    /// Returns and clears the recorded calls.
    pub fn take_calls(&mut self) -> Vec<GlCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn alloc(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    /// Allocates a handle for a created object, honoring `fail_nth_allocation`.
    fn try_alloc(&mut self, what: &str) -> Result<u32> {
        self.allocations += 1;
        if self.fail_allocation_at == Some(self.allocations) {
            bail!("out of memory creating {what}");
        }
        Ok(self.alloc())
    }

    fn record(&mut self, call: GlCall) {
        log::trace!("gl: {call:?}");
        self.calls.push(call);
    }
}

impl GlContext for RecordingContext {
    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn supports_extension(&mut self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn max_draw_buffers(&self) -> u32 {
        self.max_draw_buffers
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.record(GlCall::Viewport(x, y, width, height));
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.record(GlCall::ClearColor([r, g, b, a]));
    }

    fn clear(&mut self, mask: GLenum) {
        self.record(GlCall::Clear(mask));
    }

    fn enable(&mut self, capability: GLenum) {
        self.record(GlCall::Enable(capability));
    }

    fn disable(&mut self, capability: GLenum) {
        self.record(GlCall::Disable(capability));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(GlCall::DepthMask(write));
    }

    fn depth_func(&mut self, func: GLenum) {
        self.record(GlCall::DepthFunc(func));
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        self.record(GlCall::DepthRange(near, far));
    }

    fn blend_func(&mut self, src: GLenum, dst: GLenum) {
        self.record(GlCall::BlendFunc(src, dst));
    }

    fn blend_func_separate(&mut self, src_rgb: GLenum, dst_rgb: GLenum, src_alpha: GLenum, dst_alpha: GLenum) {
        self.record(GlCall::BlendFuncSeparate(src_rgb, dst_rgb, src_alpha, dst_alpha));
    }

    fn create_shader(&mut self, kind: GLenum) -> Result<NativeShader> {
        let shader = NativeShader(self.try_alloc("shader")?);
        self.record(GlCall::CreateShader(kind, shader));
        Ok(shader)
    }

    fn shader_source(&mut self, shader: NativeShader, source: &str) {
        self.shader_sources.insert(shader, source.to_string());
        self.record(GlCall::ShaderSource(shader));
    }

    fn compile_shader(&mut self, shader: NativeShader) {
        let source = self.shader_sources.get(&shader).map(String::as_str).unwrap_or("");
        let ok = match &self.fail_compile_marker {
            Some(marker) => !source.contains(marker.as_str()),
            None => true,
        };
        self.compiled.insert(shader, ok);
        self.record(GlCall::CompileShader(shader));
    }

    fn shader_compile_status(&self, shader: NativeShader) -> bool {
        self.compiled.get(&shader).copied().unwrap_or(false)
    }

    fn shader_info_log(&self, shader: NativeShader) -> String {
        if self.shader_compile_status(shader) {
            String::new()
        } else {
            "ERROR: 0:1: syntax error".to_string()
        }
    }

    fn delete_shader(&mut self, shader: NativeShader) {
        self.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&mut self) -> Result<NativeProgram> {
        let program = NativeProgram(self.try_alloc("program")?);
        self.programs.insert(program, ProgramRecord::default());
        self.record(GlCall::CreateProgram(program));
        Ok(program)
    }

    fn attach_shader(&mut self, program: NativeProgram, shader: NativeShader) {
        if let Some(p) = self.programs.get_mut(&program) {
            p.shaders.push(shader);
        }
        self.record(GlCall::AttachShader(program, shader));
    }

    fn link_program(&mut self, program: NativeProgram) {
        let shaders_ok = self
            .programs
            .get(&program)
            .is_some_and(|p| p.shaders.iter().all(|s| self.shader_compile_status(*s)));
        let linked = shaders_ok && !self.fail_link;
        let attributes = self.interface_attributes.clone();
        let uniforms = self.interface_uniforms.clone();

        if let Some(p) = self.programs.get_mut(&program) {
            p.linked = linked;
            if linked {
                p.attributes = attributes;
                p.uniforms = uniforms;
            }
        }
        self.record(GlCall::LinkProgram(program));
    }

    fn program_link_status(&self, program: NativeProgram) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: NativeProgram) -> String {
        if self.program_link_status(program) {
            String::new()
        } else {
            "link failed".to_string()
        }
    }

    fn use_program(&mut self, program: Option<NativeProgram>) {
        self.record(GlCall::UseProgram(program));
    }

    fn delete_program(&mut self, program: NativeProgram) {
        self.programs.remove(&program);
        self.record(GlCall::DeleteProgram(program));
    }

    fn active_attributes(&self, program: NativeProgram) -> Vec<ActiveInfo> {
        self.programs.get(&program).map(|p| p.attributes.clone()).unwrap_or_default()
    }

    fn active_uniforms(&self, program: NativeProgram) -> Vec<ActiveInfo> {
        self.programs.get(&program).map(|p| p.uniforms.clone()).unwrap_or_default()
    }

    fn attrib_location(&self, program: NativeProgram, name: &str) -> Option<u32> {
        let p = self.programs.get(&program)?;
        p.attributes.iter().position(|a| a.name == name).map(|i| i as u32)
    }

    fn uniform_location(&mut self, program: NativeProgram, name: &str) -> Option<NativeUniformLocation> {
        let known = self
            .programs
            .get(&program)
            .is_some_and(|p| p.uniforms.iter().any(|u| u.name == name));
        if !known {
            return None;
        }

        let key = (program, name.to_string());
        if let Some(loc) = self.uniform_locations.get(&key) {
            return Some(*loc);
        }
        let loc = NativeUniformLocation(self.alloc());
        self.uniform_locations.insert(key, loc);
        Some(loc)
    }

    fn uniform_1i(&mut self, location: NativeUniformLocation, value: i32) {
        self.record(GlCall::Uniform1i(location, value));
    }

    fn uniform_1f(&mut self, location: NativeUniformLocation, value: f32) {
        self.record(GlCall::Uniform1f(location, value));
    }

    fn uniform_2fv(&mut self, location: NativeUniformLocation, value: &[f32; 2]) {
        self.record(GlCall::Uniform2fv(location, *value));
    }

    fn uniform_3fv(&mut self, location: NativeUniformLocation, value: &[f32; 3]) {
        self.record(GlCall::Uniform3fv(location, *value));
    }

    fn uniform_4fv(&mut self, location: NativeUniformLocation, value: &[f32; 4]) {
        self.record(GlCall::Uniform4fv(location, *value));
    }

    fn uniform_matrix_3fv(&mut self, location: NativeUniformLocation, value: &[f32; 9]) {
        self.record(GlCall::UniformMatrix3fv(location, *value));
    }

    fn uniform_matrix_4fv(&mut self, location: NativeUniformLocation, value: &[f32; 16]) {
        self.record(GlCall::UniformMatrix4fv(location, *value));
    }

    fn create_buffer(&mut self) -> Result<NativeBuffer> {
        let buffer = NativeBuffer(self.try_alloc("buffer")?);
        self.record(GlCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: Option<NativeBuffer>) {
        self.record(GlCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: GLenum, data: &[u8], usage: GLenum) {
        self.record(GlCall::BufferData { target, len: data.len(), usage });
    }

    fn delete_buffer(&mut self, buffer: NativeBuffer) {
        self.record(GlCall::DeleteBuffer(buffer));
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
        self.record(GlCall::VertexAttribPointer { index, size, data_type, normalized, stride, offset });
    }

    fn vertex_attrib_i_pointer(&mut self, index: u32, size: i32, data_type: GLenum, stride: i32, offset: i32) {
        self.record(GlCall::VertexAttribIPointer { index, size, data_type, stride, offset });
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.record(GlCall::VertexAttribDivisor(index, divisor));
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn create_vertex_array(&mut self) -> Result<NativeVertexArray> {
        let vao = NativeVertexArray(self.try_alloc("vertex array")?);
        self.record(GlCall::CreateVertexArray(vao));
        Ok(vao)
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<NativeVertexArray>) {
        self.record(GlCall::BindVertexArray(vertex_array));
    }

    fn delete_vertex_array(&mut self, vertex_array: NativeVertexArray) {
        self.record(GlCall::DeleteVertexArray(vertex_array));
    }

    fn create_texture(&mut self) -> Result<NativeTexture> {
        let texture = NativeTexture(self.try_alloc("texture")?);
        self.record(GlCall::CreateTexture(texture));
        Ok(texture)
    }

    fn active_texture(&mut self, unit: GLenum) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: GLenum, texture: Option<NativeTexture>) {
        self.record(GlCall::BindTexture(target, texture));
    }

    fn tex_parameter_i(&mut self, target: GLenum, parameter: GLenum, value: i32) {
        self.record(GlCall::TexParameter(target, parameter, value));
    }

    fn pixel_store_i(&mut self, parameter: GLenum, value: i32) {
        self.record(GlCall::PixelStore(parameter, value));
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
        self.record(GlCall::TexImage2d {
            target,
            internal_format,
            width,
            height,
            format,
            data_type,
            has_pixels: pixels.is_some(),
        });
    }

    fn generate_mipmap(&mut self, target: GLenum) {
        self.record(GlCall::GenerateMipmap(target));
    }

    fn delete_texture(&mut self, texture: NativeTexture) {
        self.record(GlCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> Result<NativeFramebuffer> {
        let fb = NativeFramebuffer(self.try_alloc("framebuffer")?);
        self.record(GlCall::CreateFramebuffer(fb));
        Ok(fb)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<NativeFramebuffer>) {
        self.record(GlCall::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(&mut self, attachment: GLenum, texture_target: GLenum, texture: NativeTexture) {
        self.record(GlCall::FramebufferTexture2d(attachment, texture_target, texture));
    }

    fn check_framebuffer_status(&self) -> GLenum {
        self.framebuffer_status
    }

    fn draw_buffers(&mut self, attachments: &[GLenum]) {
        self.record(GlCall::DrawBuffers(attachments.to_vec()));
    }

    fn delete_framebuffer(&mut self, framebuffer: NativeFramebuffer) {
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn create_renderbuffer(&mut self) -> Result<NativeRenderbuffer> {
        let rb = NativeRenderbuffer(self.try_alloc("renderbuffer")?);
        self.record(GlCall::CreateRenderbuffer(rb));
        Ok(rb)
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<NativeRenderbuffer>) {
        self.record(GlCall::BindRenderbuffer(renderbuffer));
    }

    fn renderbuffer_storage(&mut self, internal_format: GLenum, width: u32, height: u32) {
        self.record(GlCall::RenderbufferStorage(internal_format, width, height));
    }

    fn framebuffer_renderbuffer(&mut self, attachment: GLenum, renderbuffer: NativeRenderbuffer) {
        self.record(GlCall::FramebufferRenderbuffer(attachment, renderbuffer));
    }

    fn delete_renderbuffer(&mut self, renderbuffer: NativeRenderbuffer) {
        self.record(GlCall::DeleteRenderbuffer(renderbuffer));
    }

    fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32) {
        self.record(GlCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&mut self, mode: GLenum, count: i32, index_type: GLenum, offset: i32) {
        self.record(GlCall::DrawElements { mode, count, index_type, offset });
    }

    fn draw_arrays_instanced(&mut self, mode: GLenum, first: i32, count: i32, instances: i32) {
        self.record(GlCall::DrawArraysInstanced { mode, first, count, instances });
    }

    fn draw_elements_instanced(
        &mut self,
        mode: GLenum,
        count: i32,
        index_type: GLenum,
        offset: i32,
        instances: i32,
    ) {
        self.record(GlCall::DrawElementsInstanced { mode, count, index_type, offset, instances });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, kind: GLenum) -> ActiveInfo {
        ActiveInfo { name: name.to_string(), kind, size: 1 }
    }

    #[test]
    fn handles_are_sequential() {
        let mut gl = RecordingContext::new(4, 4);
        let a = gl.create_buffer().unwrap();
        let b = gl.create_texture().unwrap();
        assert_eq!(a, NativeBuffer(1));
        assert_eq!(b, NativeTexture(2));
    }

    #[test]
    fn nth_allocation_fails_once() {
        let mut gl = RecordingContext::new(4, 4);
        gl.create_buffer().unwrap();
        gl.fail_nth_allocation(2);

        assert!(gl.create_texture().is_ok());
        assert!(gl.create_framebuffer().is_err());
        assert!(gl.create_framebuffer().is_ok());
        assert_eq!(gl.count(|c| matches!(c, GlCall::CreateFramebuffer(_))), 1);
    }

    #[test]
    fn compile_failure_marker() {
        let mut gl = RecordingContext::new(4, 4);
        gl.fail_compile_containing("BROKEN");

        let good = gl.create_shader(gl::VERTEX_SHADER).unwrap();
        gl.shader_source(good, "void main() {}");
        gl.compile_shader(good);

        let bad = gl.create_shader(gl::FRAGMENT_SHADER).unwrap();
        gl.shader_source(bad, "BROKEN");
        gl.compile_shader(bad);

        assert!(gl.shader_compile_status(good));
        assert!(!gl.shader_compile_status(bad));
        assert!(!gl.shader_info_log(bad).is_empty());
    }

    #[test]
    fn linked_program_reports_configured_interface() {
        let mut gl = RecordingContext::new(4, 4);
        gl.set_program_interface(
            vec![info("aPosition", gl::FLOAT_VEC3), info("aUV", gl::FLOAT_VEC2)],
            vec![info("uColor", gl::FLOAT_VEC4)],
        );

        let program = gl.create_program().unwrap();
        gl.link_program(program);

        assert!(gl.program_link_status(program));
        assert_eq!(gl.attrib_location(program, "aUV"), Some(1));
        assert_eq!(gl.active_uniforms(program).len(), 1);

        let loc = gl.uniform_location(program, "uColor");
        assert!(loc.is_some());
        assert_eq!(gl.uniform_location(program, "uColor"), loc);
        assert_eq!(gl.uniform_location(program, "uMissing"), None);
    }

    #[test]
    fn queries_are_not_recorded() {
        let mut gl = RecordingContext::new(4, 4);
        let _ = gl.check_framebuffer_status();
        let _ = gl.drawing_buffer_size();
        let _ = gl.supports_extension(gl::EXT_DRAW_BUFFERS);
        assert!(gl.calls().is_empty());
    }
}
