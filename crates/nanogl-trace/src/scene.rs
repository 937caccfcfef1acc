//! Sample two-pass scene: instanced cubes rendered into an offscreen target,
//! then composited to the screen with a fullscreen quad.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};

use nanogl::context::{ActiveInfo, RecordingContext};
use nanogl::gl;
use nanogl::{
    App, AppConfig, AttributeOptions, DataType, DrawCall, Extensions, FramebufferId, FramebufferOptions,
    Primitive,
};

const CUBE_VS: &str = "#version 300 es
layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec2 aUV;
layout(location = 2) in mat4 aModel;
uniform mat4 uViewProj;
out vec2 vUV;
void main() {
    vUV = aUV;
    gl_Position = uViewProj * aModel * vec4(aPosition, 1.0);
}
";

const CUBE_FS: &str = "#version 300 es
precision highp float;
in vec2 vUV;
uniform vec4 uTint;
layout(location = 0) out vec4 color;
layout(location = 1) out vec4 uv;
void main() {
    color = uTint;
    uv = vec4(vUV, 0.0, 1.0);
}
";

const QUAD_VS: &str = "#version 300 es
in vec2 aPosition;
out vec2 vUV;
void main() {
    vUV = aPosition * 0.5 + 0.5;
    gl_Position = vec4(aPosition, 0.0, 1.0);
}
";

const QUAD_FS: &str = "#version 300 es
precision highp float;
in vec2 vUV;
uniform sampler2D uColor;
uniform float uTime;
out vec4 fragColor;
void main() {
    fragColor = texture(uColor, vUV) * (0.5 + 0.5 * sin(uTime));
}
";

/// Interleaved cube vertex.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

const fn v(position: [f32; 3], uv: [f32; 2]) -> Vertex {
    Vertex { position, uv }
}

// Front and back faces only; enough geometry for two multi-draw segments.
const CUBE_VERTICES: [Vertex; 8] = [
    v([-1.0, -1.0, 1.0], [0.0, 0.0]),
    v([1.0, -1.0, 1.0], [1.0, 0.0]),
    v([1.0, 1.0, 1.0], [1.0, 1.0]),
    v([-1.0, 1.0, 1.0], [0.0, 1.0]),
    v([-1.0, -1.0, -1.0], [1.0, 0.0]),
    v([1.0, -1.0, -1.0], [0.0, 0.0]),
    v([1.0, 1.0, -1.0], [0.0, 1.0]),
    v([-1.0, 1.0, -1.0], [1.0, 1.0]),
];

const CUBE_INDICES: [u16; 12] = [0, 1, 2, 0, 2, 3, 5, 4, 7, 5, 7, 6];

const QUAD: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

const INSTANCES: usize = 4;

fn info(name: &str, kind: gl::GLenum) -> ActiveInfo {
    ActiveInfo { name: name.to_string(), kind, size: 1 }
}

fn translation(x: f32, y: f32, z: f32) -> [f32; 16] {
    [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, x, y, z, 1.0]
}

/// The headless context, preconfigured like a WebGL 2 browser context.
pub fn context(width: u32, height: u32) -> RecordingContext {
    RecordingContext::new(width, height)
        .with_extension(gl::EXT_DRAW_BUFFERS)
        .with_extension(gl::EXT_DEPTH_TEXTURE)
        .with_extension(gl::EXT_TEXTURE_FLOAT)
        .with_max_draw_buffers(8)
}

/// A built scene plus the handles the frame loop needs.
pub struct Scene {
    pub app: App<RecordingContext>,
    offscreen: FramebufferId,
    cubes: DrawCall,
    composite: DrawCall,
}

impl Scene {
    pub fn build(gl: RecordingContext) -> Result<Self> {
        let config = AppConfig {
            clear_color: Some([0.05, 0.05, 0.08, 1.0]),
            depth_test: true,
            cull_backfaces: true,
            extensions: Extensions { draw_buffers: true, depth_textures: true, ..Extensions::default() },
            ..AppConfig::default()
        };
        let mut app = App::with_config(gl, config);

        // Cube pass.
        app.gl_mut().set_program_interface(
            vec![info("aPosition", gl::FLOAT_VEC3), info("aUV", gl::FLOAT_VEC2), info("aModel", gl::FLOAT_MAT4)],
            vec![info("uViewProj", gl::FLOAT_MAT4), info("uTint", gl::FLOAT_VEC4)],
        );
        let cube_program = app.create_program(CUBE_VS, CUBE_FS).context("cube program")?;

        let vertices = app.create_array_buffer(DataType::Float, 5, &CUBE_VERTICES)?;
        let indices = app.create_index_buffer(DataType::UnsignedShort, 3, &CUBE_INDICES)?;
        let models: Vec<[f32; 16]> = (0..INSTANCES).map(|i| translation(i as f32 * 3.0, 0.0, -8.0)).collect();
        let transforms = app.create_matrix_buffer(DataType::Float, 4, 4, &models)?;

        let stride = std::mem::size_of::<Vertex>();
        let cube = app.create_vertex_array();
        app.vertex_attribute_buffer(
            cube,
            0,
            vertices,
            &AttributeOptions { size: Some(3), stride: Some(stride), offset: Some(0), ..AttributeOptions::default() },
        )?
        .vertex_attribute_buffer(
            cube,
            1,
            vertices,
            &AttributeOptions { size: Some(2), stride: Some(stride), offset: Some(12), ..AttributeOptions::default() },
        )?
        .instance_attribute_buffer(cube, 2, transforms, &AttributeOptions::default())?
        .index_buffer(cube, indices)?;
        // Front face drawn for every instance, back face for the first two.
        app.element_counts(cube, &[6, 6]).instance_counts(cube, &[INSTANCES, 2]);

        let offscreen = app.create_framebuffer(&FramebufferOptions { color_targets: 2, ..FramebufferOptions::default() })?;
        let color = app
            .resources()
            .framebuffer(offscreen)
            .and_then(|fb| fb.color_texture(0))
            .context("offscreen framebuffer has no color target")?;

        let mut cubes = app.create_draw_call(cube_program, Primitive::Triangles)?;
        cubes
            .vertex_array(app.resources().vertex_array(cube).context("cube vertex array")?)
            .uniform("uViewProj", translation(0.0, 0.0, 0.0))
            .uniform("uTint", [1.0, 0.6, 0.2, 1.0]);

        // Composite pass.
        app.gl_mut().set_program_interface(
            vec![info("aPosition", gl::FLOAT_VEC2)],
            vec![info("uColor", gl::SAMPLER_2D), info("uTime", gl::FLOAT)],
        );
        let quad_program = app.create_program(QUAD_VS, QUAD_FS).context("quad program")?;
        let quad = app.create_array_buffer(DataType::Float, 2, &QUAD)?;

        let mut composite = app.create_draw_call(quad_program, Primitive::TriangleStrip)?;
        composite
            .attribute("aPosition", app.resources().buffer(quad).context("quad buffer")?)
            .texture("uColor", color);

        log::info!(
            "scene built: {} programs, {} buffers, {} textures",
            app.resources().programs.len(),
            app.resources().buffers.len(),
            app.resources().textures.len()
        );

        Ok(Self { app, offscreen, cubes, composite })
    }

    /// Renders one frame at time `t` seconds.
    pub fn frame(&mut self, t: f32) {
        self.composite.uniform("uTime", t);

        self.app
            .framebuffer(self.offscreen)
            .clear()
            .draw_calls(vec![self.cubes.clone()])
            .draw();
        self.app
            .default_framebuffer()
            .clear()
            .draw_calls(vec![self.composite.clone()])
            .draw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanogl::context::GlCall;

    #[test]
    fn scene_builds_with_offscreen_targets() {
        let scene = Scene::build(context(64, 64)).unwrap();
        let fb = scene.app.resources().framebuffer(scene.offscreen).unwrap();
        assert_eq!(fb.num_color_targets(), 2);
        assert!(fb.depth_texture().is_some());
    }

    #[test]
    fn frame_issues_multi_draw_segments() {
        let mut scene = Scene::build(context(64, 64)).unwrap();
        scene.app.gl_mut().take_calls();
        scene.frame(0.5);

        let calls = scene.app.gl().calls();
        let instanced = calls
            .iter()
            .filter(|c| matches!(c, GlCall::DrawElementsInstanced { .. }))
            .count();
        // One native draw per segment.
        assert_eq!(instanced, 2);
        assert!(calls.contains(&GlCall::DrawElementsInstanced {
            mode: gl::TRIANGLES,
            count: 6,
            index_type: gl::UNSIGNED_SHORT,
            offset: 12,
            instances: 2,
        }));
    }

    #[test]
    fn steady_state_frames_skip_redundant_work() {
        let mut scene = Scene::build(context(64, 64)).unwrap();
        scene.frame(0.0);
        scene.frame(1.0);
        scene.app.gl_mut().take_calls();
        scene.frame(1.0);

        let calls = scene.app.gl().calls();
        assert!(!calls.iter().any(GlCall::is_uniform_upload));
    }
}
