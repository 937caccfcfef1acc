//! Draw calls: one reusable description of a batch, replayed every frame.

use std::rc::Rc;

use crate::arena::{BufferId, ProgramId, TextureId, VertexArrayId};
use crate::buffer::VertexBuffer;
use crate::context::{ContextState, GlContext};
use crate::gl::GLenum;
use crate::program::{Program, ProgramInterface, UniformIndex};
use crate::resources::Resources;
use crate::types::{DataType, Primitive};
use crate::uniform::{UniformKind, UniformValue};
use crate::vertex_array::VertexArray;

#[derive(Debug, Clone)]
struct UniformBinding {
    name: String,
    index: UniformIndex,
    value: UniformValue,
}

#[derive(Debug, Copy, Clone)]
struct AttributeBinding {
    location: u32,
    buffer: BufferId,
}

#[derive(Debug, Copy, Clone)]
struct IndexBinding {
    buffer: BufferId,
    index_type: DataType,
}

/// Program + inputs + primitive for one batch.
///
/// Names are resolved against the program's interface when the call is
/// configured; drawing only walks pre-resolved slots. Buffers, textures and
/// vertex arrays are referenced by id and must outlive the call.
#[derive(Debug, Clone)]
pub struct DrawCall {
    program: ProgramId,
    interface: Rc<ProgramInterface>,
    primitive: Primitive,
    uniforms: Vec<UniformBinding>,
    attributes: Vec<AttributeBinding>,
    /// (unit, texture) in unit-assignment order.
    textures: Vec<(u32, TextureId)>,
    texture_count: u32,
    indices: Option<IndexBinding>,
    vertex_array: Option<VertexArrayId>,
    num_items: usize,
}

impl DrawCall {
    pub fn new(program: &Program, primitive: Primitive) -> Self {
        Self {
            program: program.id(),
            interface: Rc::clone(program.interface()),
            primitive,
            uniforms: Vec::new(),
            attributes: Vec::new(),
            textures: Vec::new(),
            texture_count: 0,
            indices: None,
            vertex_array: None,
            num_items: 0,
        }
    }

    #[inline]
    pub fn program(&self) -> ProgramId {
        self.program
    }

    #[inline]
    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Vertices (or indices) drawn on the direct attribute path.
    #[inline]
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Unit assigned to the sampler `name`, if any.
    pub fn texture_unit(&self, name: &str) -> Option<u32> {
        match self.uniform_value(name) {
            Some(UniformValue::Int(unit)) if *unit >= 0 => Some(*unit as u32),
            _ => None,
        }
    }

    pub fn uniform_value(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|u| u.name == name).map(|u| &u.value)
    }

    /// Bound textures as (unit, texture), in assignment order.
    pub fn textures(&self) -> &[(u32, TextureId)] {
        &self.textures
    }

    pub fn set_primitive(&mut self, primitive: Primitive) -> &mut Self {
        self.primitive = primitive;
        self
    }

    /// Feeds the attribute `name` from `buffer`. The first buffer attached
    /// decides the item count unless indices override it.
    pub fn attribute(&mut self, name: &str, buffer: &VertexBuffer) -> &mut Self {
        let Some(location) = self.interface.attribute(name) else {
            log::warn!("draw call: program {:?} has no attribute `{}`", self.program, name);
            return self;
        };

        let binding = AttributeBinding { location, buffer: buffer.id() };
        match self.attributes.iter_mut().find(|a| a.location == location) {
            Some(existing) => *existing = binding,
            None => self.attributes.push(binding),
        }

        if self.num_items == 0 {
            self.num_items = buffer.num_items();
        }
        self
    }

    /// Draws indexed from `buffer`, three indices per item.
    pub fn indices(&mut self, buffer: &VertexBuffer) -> &mut Self {
        self.indices = Some(IndexBinding { buffer: buffer.id(), index_type: buffer.data_type() });
        self.num_items = buffer.num_items() * 3;
        self
    }

    /// Draws from a vertex array instead of named attributes.
    pub fn vertex_array(&mut self, vertex_array: &VertexArray) -> &mut Self {
        self.vertex_array = Some(vertex_array.id());
        self
    }

    /// Stores a uniform value, uploaded at draw time if it changed.
    pub fn uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> &mut Self {
        let value = value.into();
        let Some((index, kind)) = self.interface.uniform(name) else {
            log::warn!("draw call: program {:?} has no uniform `{}`", self.program, name);
            return self;
        };
        if value.kind() != kind {
            log::warn!(
                "draw call: uniform `{}` is {:?}, got {:?}; ignored",
                name,
                kind,
                value.kind()
            );
            return self;
        }

        match self.uniforms.iter_mut().find(|u| u.name == name) {
            Some(existing) => existing.value = value,
            None => self.uniforms.push(UniformBinding { name: name.to_string(), index, value }),
        }
        self
    }

    /// Samples `texture` through the sampler `name`.
    ///
    /// A sampler keeps the unit it was first given; new samplers take the next
    /// unit in call order.
    pub fn texture(&mut self, name: &str, texture: TextureId) -> &mut Self {
        match self.interface.uniform(name) {
            Some((_, UniformKind::Int)) => {}
            Some((_, kind)) => {
                log::warn!("draw call: `{}` is a {:?} uniform, not a sampler; texture ignored", name, kind);
                return self;
            }
            None => {
                log::warn!("draw call: program {:?} has no sampler `{}`", self.program, name);
                return self;
            }
        }

        let unit = match self.texture_unit(name) {
            Some(unit) => unit,
            None => {
                let unit = self.texture_count;
                self.texture_count += 1;
                self.uniform(name, unit as i32);
                unit
            }
        };

        match self.textures.iter_mut().find(|(u, _)| *u == unit) {
            Some(slot) => slot.1 = texture,
            None => self.textures.push((unit, texture)),
        }
        self
    }

    /// Issues the draw.
    ///
    /// The program and vertex array are bound only if the shared state says
    /// they are not current; uniform uploads skip unchanged values. Stale ids
    /// are logged and skipped.
    pub fn draw(&self, gl: &mut dyn GlContext, state: &mut ContextState, resources: &mut Resources) {
        let Some(program) = resources.programs.get_mut(self.program) else {
            log::warn!("draw call: program {:?} no longer exists; skipped", self.program);
            return;
        };

        program.bind(gl, state);

        for u in &self.uniforms {
            program.set_uniform_at(gl, u.index, &u.value);
        }

        let vertex_array = match self.vertex_array {
            Some(id) => match resources.vertex_arrays.get(id) {
                Some(va) => {
                    va.bind(gl, state);
                    Some(va)
                }
                None => {
                    log::warn!("draw call: vertex array {:?} no longer exists; skipped", id);
                    return;
                }
            },
            None => {
                if state.vertex_array.is_some() {
                    gl.bind_vertex_array(None);
                    state.vertex_array = None;
                }
                for attr in &self.attributes {
                    match resources.buffers.get(attr.buffer) {
                        Some(buffer) => buffer.bind_attribute(gl, attr.location),
                        None => log::warn!("draw call: buffer {:?} no longer exists", attr.buffer),
                    }
                }
                None
            }
        };

        for (unit, id) in &self.textures {
            match resources.textures.get(*id) {
                Some(texture) => texture.bind(gl, *unit),
                None => log::warn!("draw call: texture {:?} no longer exists", id),
            }
        }

        let mode = self.primitive.gl();
        match vertex_array {
            Some(va) => draw_vertex_array(gl, mode, va),
            None => match self.indices {
                Some(indices) => {
                    let Some(buffer) = resources.buffers.get(indices.buffer) else {
                        log::warn!("draw call: index buffer {:?} no longer exists; skipped", indices.buffer);
                        return;
                    };
                    buffer.bind_indices(gl);
                    gl.draw_elements(mode, self.num_items as i32, indices.index_type.gl(), 0);
                }
                None => gl.draw_arrays(mode, 0, self.num_items as i32),
            },
        }

        log::trace!("draw call: program {:?}, {} items", self.program, self.num_items);
    }
}

/// One native draw per multi-draw segment.
fn draw_vertex_array(gl: &mut dyn GlContext, mode: GLenum, va: &VertexArray) {
    let instanced = va.is_instanced();

    match va.index_type().filter(|_| va.is_indexed()) {
        Some(index_type) => {
            for range in va.draw_ranges() {
                let offset = (range.offset * index_type.size()) as i32;
                if instanced {
                    gl.draw_elements_instanced(mode, range.count as i32, index_type.gl(), offset, range.instances as i32);
                } else {
                    gl.draw_elements(mode, range.count as i32, index_type.gl(), offset);
                }
            }
        }
        None => {
            for range in va.draw_ranges() {
                if instanced {
                    gl.draw_arrays_instanced(mode, range.offset as i32, range.count as i32, range.instances as i32);
                } else {
                    gl.draw_arrays(mode, range.offset as i32, range.count as i32);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLayout;
    use crate::context::{ActiveInfo, GlCall, RecordingContext};
    use crate::gl::{self, GLenum};
    use crate::texture::{Texture, TextureOptions};
    use crate::vertex_array::AttributeOptions;

    fn info(name: &str, kind: GLenum) -> ActiveInfo {
        ActiveInfo { name: name.to_string(), kind, size: 1 }
    }

    struct Scene {
        gl: RecordingContext,
        state: ContextState,
        res: Resources,
        program: ProgramId,
    }

    impl Scene {
        fn new() -> Self {
            let mut gl = RecordingContext::new(16, 16);
            gl.set_program_interface(
                vec![info("aPosition", gl::FLOAT_VEC3), info("aUV", gl::FLOAT_VEC2)],
                vec![
                    info("uColor", gl::FLOAT_VEC4),
                    info("uDiffuse", gl::SAMPLER_2D),
                    info("uNormal", gl::SAMPLER_2D),
                ],
            );
            let mut res = Resources::new();
            let program = res
                .programs
                .try_insert_with(|id| Program::new(id, &mut gl, "vs", "fs"))
                .unwrap();
            Self { gl, state: ContextState::new(), res, program }
        }

        fn buffer(&mut self, layout: BufferLayout, data: &[f32]) -> BufferId {
            let (gl, state) = (&mut self.gl, &mut self.state);
            self.res.buffers.try_insert_with(|id| VertexBuffer::new(id, gl, state, layout, data)).unwrap()
        }

        fn indices(&mut self, data: &[u16]) -> BufferId {
            let (gl, state) = (&mut self.gl, &mut self.state);
            let layout = BufferLayout::index(DataType::UnsignedShort, 3);
            self.res.buffers.try_insert_with(|id| VertexBuffer::new(id, gl, state, layout, data)).unwrap()
        }

        fn texture(&mut self) -> TextureId {
            let gl = &mut self.gl;
            self.res
                .textures
                .try_insert_with(|id| Texture::new_2d(id, gl, None, &TextureOptions::sized(1, 1)))
                .unwrap()
        }

        fn draw_call(&self) -> DrawCall {
            DrawCall::new(self.res.program(self.program).unwrap(), Primitive::Triangles)
        }

        fn draw(&mut self, dc: &DrawCall) {
            dc.draw(&mut self.gl, &mut self.state, &mut self.res);
        }
    }

    // ── item count ────────────────────────────────────────────────────────

    #[test]
    fn first_attribute_sets_item_count() {
        let mut s = Scene::new();
        let positions = s.buffer(BufferLayout::vertex(DataType::Float, 3), &[0.0; 9]);
        let uvs = s.buffer(BufferLayout::vertex(DataType::Float, 2), &[0.0; 10]);

        let mut dc = s.draw_call();
        dc.attribute("aPosition", s.res.buffer(positions).unwrap())
            .attribute("aUV", s.res.buffer(uvs).unwrap());
        assert_eq!(dc.num_items(), 3);
    }

    #[test]
    fn indices_override_item_count() {
        let mut s = Scene::new();
        let positions = s.buffer(BufferLayout::vertex(DataType::Float, 3), &[0.0; 12]);
        let indices = s.indices(&[0, 1, 2, 0, 2, 3]);

        let mut dc = s.draw_call();
        dc.attribute("aPosition", s.res.buffer(positions).unwrap());
        assert_eq!(dc.num_items(), 4);
        dc.indices(s.res.buffer(indices).unwrap());
        assert_eq!(dc.num_items(), 6);

        s.gl.take_calls();
        s.draw(&dc);
        assert!(s.gl.calls().contains(&GlCall::DrawElements {
            mode: gl::TRIANGLES,
            count: 6,
            index_type: gl::UNSIGNED_SHORT,
            offset: 0,
        }));
    }

    #[test]
    fn empty_draw_call_issues_zero_length_draw() {
        let mut s = Scene::new();
        let dc = s.draw_call();
        s.draw(&dc);
        assert_eq!(
            s.gl.calls().last(),
            Some(&GlCall::DrawArrays { mode: gl::TRIANGLES, first: 0, count: 0 })
        );
    }

    // ── uniforms ──────────────────────────────────────────────────────────

    #[test]
    fn unknown_and_mistyped_uniforms_are_ignored() {
        let mut s = Scene::new();
        let mut dc = s.draw_call();
        dc.uniform("uMissing", 1.0f32).uniform("uColor", 1.0f32);
        assert!(dc.uniform_value("uMissing").is_none());
        assert!(dc.uniform_value("uColor").is_none());
    }

    #[test]
    fn unchanged_uniforms_upload_once_across_frames() {
        let mut s = Scene::new();
        let mut dc = s.draw_call();
        dc.uniform("uColor", [1.0f32, 0.0, 0.0, 1.0]);

        s.draw(&dc);
        s.draw(&dc);
        assert_eq!(s.gl.count(GlCall::is_uniform_upload), 1);

        dc.uniform("uColor", [0.0f32, 1.0, 0.0, 1.0]);
        s.draw(&dc);
        assert_eq!(s.gl.count(GlCall::is_uniform_upload), 2);
    }

    // ── textures ──────────────────────────────────────────────────────────

    #[test]
    fn texture_units_follow_call_order() {
        let mut s = Scene::new();
        let a = s.texture();
        let b = s.texture();

        let mut dc = s.draw_call();
        dc.texture("uNormal", a).texture("uDiffuse", b);
        assert_eq!(dc.texture_unit("uNormal"), Some(0));
        assert_eq!(dc.texture_unit("uDiffuse"), Some(1));
    }

    #[test]
    fn same_sampler_reuses_its_unit() {
        let mut s = Scene::new();
        let a = s.texture();
        let b = s.texture();

        let mut dc = s.draw_call();
        dc.texture("uDiffuse", a).texture("uDiffuse", b);
        assert_eq!(dc.texture_unit("uDiffuse"), Some(0));
        assert_eq!(dc.textures(), &[(0, b)]);

        s.gl.take_calls();
        s.draw(&dc);
        let native = s.res.texture(b).and_then(Texture::native);
        assert!(s.gl.calls().contains(&GlCall::ActiveTexture(gl::TEXTURE0)));
        assert!(s.gl.calls().contains(&GlCall::BindTexture(gl::TEXTURE_2D, native)));
    }

    #[test]
    fn texture_on_non_sampler_uniform_is_ignored() {
        let mut s = Scene::new();
        let a = s.texture();

        let mut dc = s.draw_call();
        dc.texture("uColor", a).texture("uColor", a);
        assert!(dc.textures().is_empty());
        assert_eq!(dc.texture_unit("uColor"), None);
        assert_eq!(dc.uniform_value("uColor"), None);

        dc.texture("uDiffuse", a);
        assert_eq!(dc.texture_unit("uDiffuse"), Some(0));
    }

    // ── state dedup ───────────────────────────────────────────────────────

    #[test]
    fn shared_program_is_bound_once() {
        let mut s = Scene::new();
        let first = s.draw_call();
        let second = s.draw_call();

        s.draw(&first);
        s.draw(&second);
        assert_eq!(s.gl.count(|c| matches!(c, GlCall::UseProgram(_))), 1);
        assert_eq!(s.state.program, Some(s.program));
    }

    #[test]
    fn direct_path_unbinds_current_vertex_array() {
        let mut s = Scene::new();
        let positions = s.buffer(BufferLayout::vertex(DataType::Float, 3), &[0.0; 9]);
        let va_id = s.res.vertex_arrays.insert_with(VertexArray::new);
        {
            let Resources { vertex_arrays, buffers, .. } = &mut s.res;
            let va = vertex_arrays.get_mut(va_id).unwrap();
            va.vertex_attribute_buffer(&mut s.gl, &mut s.state, 0, buffers.get(positions).unwrap(), &AttributeOptions::default())
                .unwrap();
        }
        assert_eq!(s.state.vertex_array, Some(va_id));

        let mut dc = s.draw_call();
        dc.attribute("aPosition", s.res.buffer(positions).unwrap());
        s.gl.take_calls();
        s.draw(&dc);

        assert_eq!(s.state.vertex_array, None);
        assert!(s.gl.calls().contains(&GlCall::BindVertexArray(None)));
    }

    // ── vertex arrays ─────────────────────────────────────────────────────

    #[test]
    fn vertex_array_multi_draw_uses_byte_offsets() {
        let mut s = Scene::new();
        let positions = s.buffer(BufferLayout::vertex(DataType::Float, 3), &[0.0; 30]);
        let indices = s.indices(&[0; 30]);
        let offsets = s.buffer(BufferLayout::vertex(DataType::Float, 2), &[0.0; 8]);
        let va_id = s.res.vertex_arrays.insert_with(VertexArray::new);
        {
            let Resources { vertex_arrays, buffers, .. } = &mut s.res;
            let va = vertex_arrays.get_mut(va_id).unwrap();
            let opts = AttributeOptions::default();
            va.vertex_attribute_buffer(&mut s.gl, &mut s.state, 0, buffers.get(positions).unwrap(), &opts)
                .unwrap()
                .instance_attribute_buffer(&mut s.gl, &mut s.state, 1, buffers.get(offsets).unwrap(), &opts)
                .unwrap()
                .index_buffer(&mut s.gl, &mut s.state, buffers.get(indices).unwrap())
                .unwrap()
                .element_counts(&[3, 6])
                .instance_counts(&[4, 2]);
        }

        let mut dc = s.draw_call();
        dc.vertex_array(s.res.vertex_array(va_id).unwrap());
        s.gl.take_calls();
        s.draw(&dc);

        let draws: Vec<GlCall> = s.gl.calls().iter().filter(|c| c.is_draw()).cloned().collect();
        assert_eq!(
            draws,
            vec![
                GlCall::DrawElementsInstanced {
                    mode: gl::TRIANGLES,
                    count: 3,
                    index_type: gl::UNSIGNED_SHORT,
                    offset: 0,
                    instances: 4,
                },
                GlCall::DrawElementsInstanced {
                    mode: gl::TRIANGLES,
                    count: 6,
                    index_type: gl::UNSIGNED_SHORT,
                    offset: 6,
                    instances: 2,
                },
            ]
        );
        // Already current from setup.
        assert_eq!(s.gl.count(|c| matches!(c, GlCall::BindVertexArray(_))), 0);
    }

    #[test]
    fn non_indexed_vertex_array_draws_arrays() {
        let mut s = Scene::new();
        let positions = s.buffer(BufferLayout::vertex(DataType::Float, 3), &[0.0; 9]);
        let va_id = s.res.vertex_arrays.insert_with(VertexArray::new);
        {
            let Resources { vertex_arrays, buffers, .. } = &mut s.res;
            let va = vertex_arrays.get_mut(va_id).unwrap();
            va.vertex_attribute_buffer(&mut s.gl, &mut s.state, 0, buffers.get(positions).unwrap(), &AttributeOptions::default())
                .unwrap();
        }
        s.state.vertex_array = None;

        let mut dc = s.draw_call();
        dc.vertex_array(s.res.vertex_array(va_id).unwrap());
        s.gl.take_calls();
        s.draw(&dc);

        assert_eq!(s.gl.count(|c| matches!(c, GlCall::BindVertexArray(Some(_)))), 1);
        assert_eq!(
            s.gl.calls().last(),
            Some(&GlCall::DrawArrays { mode: gl::TRIANGLES, first: 0, count: 3 })
        );
    }

    #[test]
    fn stale_program_skips_draw() {
        let mut s = Scene::new();
        let dc = s.draw_call();
        let program = s.program;
        if let Some(mut p) = s.res.programs.remove(program) {
            p.delete(&mut s.gl, &mut s.state);
        }
        s.gl.take_calls();
        s.draw(&dc);
        assert!(s.gl.calls().is_empty());
    }
}
