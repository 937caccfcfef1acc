use anyhow::Result;

use crate::gl::GLenum;

macro_rules! native_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
            pub struct $name(pub u32);
        )*
    };
}

native_handle! {
    /// Native shader object.
    NativeShader,
    /// Native linked program object.
    NativeProgram,
    /// Native data buffer.
    NativeBuffer,
    /// Native vertex-array object.
    NativeVertexArray,
    /// Native texture object.
    NativeTexture,
    /// Native framebuffer object.
    NativeFramebuffer,
    /// Native renderbuffer object.
    NativeRenderbuffer,
    /// Native uniform location within a linked program.
    NativeUniformLocation,
}

/// One active attribute or uniform reported by program introspection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ActiveInfo {
    pub name: String,
    /// Native type enum (e.g. `FLOAT_VEC3`, `SAMPLER_2D`).
    pub kind: GLenum,
    /// Array length; 1 for non-array variables.
    pub size: i32,
}

/// The native graphics context.
///
/// One method per native call issued by the object model. Object creation is
/// fallible; everything else is a direct pass-through with no result.
///
/// Implementations are single-threaded and synchronous: every call completes
/// before it returns.
pub trait GlContext {
    // ── surface / capabilities ────────────────────────────────────────────

    /// Current drawing-buffer size in pixels.
    fn drawing_buffer_size(&self) -> (u32, u32);
    /// Requests an extension. Returns whether it is available (and now enabled).
    fn supports_extension(&mut self, name: &str) -> bool;
    fn max_draw_buffers(&self) -> u32;

    // ── global state ──────────────────────────────────────────────────────

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&mut self, mask: GLenum);
    fn enable(&mut self, capability: GLenum);
    fn disable(&mut self, capability: GLenum);
    fn depth_mask(&mut self, write: bool);
    fn depth_func(&mut self, func: GLenum);
    fn depth_range(&mut self, near: f32, far: f32);
    fn blend_func(&mut self, src: GLenum, dst: GLenum);
    fn blend_func_separate(&mut self, src_rgb: GLenum, dst_rgb: GLenum, src_alpha: GLenum, dst_alpha: GLenum);

    // ── shaders / programs ────────────────────────────────────────────────

    fn create_shader(&mut self, kind: GLenum) -> Result<NativeShader>;
    fn shader_source(&mut self, shader: NativeShader, source: &str);
    fn compile_shader(&mut self, shader: NativeShader);
    fn shader_compile_status(&self, shader: NativeShader) -> bool;
    fn shader_info_log(&self, shader: NativeShader) -> String;
    fn delete_shader(&mut self, shader: NativeShader);

    fn create_program(&mut self) -> Result<NativeProgram>;
    fn attach_shader(&mut self, program: NativeProgram, shader: NativeShader);
    fn link_program(&mut self, program: NativeProgram);
    fn program_link_status(&self, program: NativeProgram) -> bool;
    fn program_info_log(&self, program: NativeProgram) -> String;
    fn use_program(&mut self, program: Option<NativeProgram>);
    fn delete_program(&mut self, program: NativeProgram);

    fn active_attributes(&self, program: NativeProgram) -> Vec<ActiveInfo>;
    fn active_uniforms(&self, program: NativeProgram) -> Vec<ActiveInfo>;
    fn attrib_location(&self, program: NativeProgram, name: &str) -> Option<u32>;
    fn uniform_location(&mut self, program: NativeProgram, name: &str) -> Option<NativeUniformLocation>;

    // ── uniforms ──────────────────────────────────────────────────────────

    fn uniform_1i(&mut self, location: NativeUniformLocation, value: i32);
    fn uniform_1f(&mut self, location: NativeUniformLocation, value: f32);
    fn uniform_2fv(&mut self, location: NativeUniformLocation, value: &[f32; 2]);
    fn uniform_3fv(&mut self, location: NativeUniformLocation, value: &[f32; 3]);
    fn uniform_4fv(&mut self, location: NativeUniformLocation, value: &[f32; 4]);
    fn uniform_matrix_3fv(&mut self, location: NativeUniformLocation, value: &[f32; 9]);
    fn uniform_matrix_4fv(&mut self, location: NativeUniformLocation, value: &[f32; 16]);

    // ── buffers / attributes ──────────────────────────────────────────────

    fn create_buffer(&mut self) -> Result<NativeBuffer>;
    fn bind_buffer(&mut self, target: GLenum, buffer: Option<NativeBuffer>);
    fn buffer_data(&mut self, target: GLenum, data: &[u8], usage: GLenum);
    fn delete_buffer(&mut self, buffer: NativeBuffer);

    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        data_type: GLenum,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn vertex_attrib_i_pointer(&mut self, index: u32, size: i32, data_type: GLenum, stride: i32, offset: i32);
    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32);
    fn enable_vertex_attrib_array(&mut self, index: u32);

    fn create_vertex_array(&mut self) -> Result<NativeVertexArray>;
    fn bind_vertex_array(&mut self, vertex_array: Option<NativeVertexArray>);
    fn delete_vertex_array(&mut self, vertex_array: NativeVertexArray);

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self) -> Result<NativeTexture>;
    fn active_texture(&mut self, unit: GLenum);
    fn bind_texture(&mut self, target: GLenum, texture: Option<NativeTexture>);
    fn tex_parameter_i(&mut self, target: GLenum, parameter: GLenum, value: i32);
    fn pixel_store_i(&mut self, parameter: GLenum, value: i32);
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &mut self,
        target: GLenum,
        internal_format: GLenum,
        width: u32,
        height: u32,
        format: GLenum,
        data_type: GLenum,
        pixels: Option<&[u8]>,
    );
    fn generate_mipmap(&mut self, target: GLenum);
    fn delete_texture(&mut self, texture: NativeTexture);

    // ── framebuffers ──────────────────────────────────────────────────────

    fn create_framebuffer(&mut self) -> Result<NativeFramebuffer>;
    fn bind_framebuffer(&mut self, framebuffer: Option<NativeFramebuffer>);
    fn framebuffer_texture_2d(&mut self, attachment: GLenum, texture_target: GLenum, texture: NativeTexture);
    fn check_framebuffer_status(&self) -> GLenum;
    fn draw_buffers(&mut self, attachments: &[GLenum]);
    fn delete_framebuffer(&mut self, framebuffer: NativeFramebuffer);

    fn create_renderbuffer(&mut self) -> Result<NativeRenderbuffer>;
    fn bind_renderbuffer(&mut self, renderbuffer: Option<NativeRenderbuffer>);
    fn renderbuffer_storage(&mut self, internal_format: GLenum, width: u32, height: u32);
    fn framebuffer_renderbuffer(&mut self, attachment: GLenum, renderbuffer: NativeRenderbuffer);
    fn delete_renderbuffer(&mut self, renderbuffer: NativeRenderbuffer);

    // ── draws ─────────────────────────────────────────────────────────────

    fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32);
    fn draw_elements(&mut self, mode: GLenum, count: i32, index_type: GLenum, offset: i32);
    fn draw_arrays_instanced(&mut self, mode: GLenum, first: i32, count: i32, instances: i32);
    fn draw_elements_instanced(
        &mut self,
        mode: GLenum,
        count: i32,
        index_type: GLenum,
        offset: i32,
        instances: i32,
    );
}
