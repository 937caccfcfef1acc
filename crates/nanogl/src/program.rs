//! Linked shader programs and their attribute/uniform interface.

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{Context, Result};

use crate::arena::ProgramId;
use crate::buffer::VertexBuffer;
use crate::context::{ContextState, GlContext, NativeProgram, NativeShader};
use crate::gl::{self, GLenum};
use crate::logging::log_numbered_source;
use crate::uniform::{UniformKind, UniformSlot, UniformValue};

/// Position of a uniform slot inside its program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformIndex(pub(crate) usize);

/// Name → location tables resolved once at link time.
///
/// Shared (not copied) with every draw call built on the program, so names
/// are resolved when a draw call is configured rather than every frame.
#[derive(Debug, Default)]
pub struct ProgramInterface {
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, (UniformIndex, UniformKind)>,
}

impl ProgramInterface {
    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn uniform(&self, name: &str) -> Option<(UniformIndex, UniformKind)> {
        self.uniforms.get(name).copied()
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.keys().map(String::as_str)
    }
}

/// A linked vertex + fragment program.
///
/// Owns its shader objects. Identity is fixed after link; only the cached
/// uniform values change.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    program: Option<NativeProgram>,
    shaders: Vec<NativeShader>,
    linked: bool,
    interface: Rc<ProgramInterface>,
    slots: Vec<UniformSlot>,
}

impl Program {
    /// Compiles both stages, links them and introspects the result.
    ///
    /// Compile and link failures are logged with the native log and the
    /// numbered source; the program is still returned. Only native object
    /// allocation failures are errors.
    pub(crate) fn new(id: ProgramId, gl: &mut dyn GlContext, vs_source: &str, fs_source: &str) -> Result<Self> {
        let vs = compile_shader(gl, gl::VERTEX_SHADER, vs_source).context("failed to create vertex shader")?;
        let fs = match compile_shader(gl, gl::FRAGMENT_SHADER, fs_source) {
            Ok(fs) => fs,
            Err(err) => {
                gl.delete_shader(vs);
                return Err(err.context("failed to create fragment shader"));
            }
        };

        let program = match gl.create_program() {
            Ok(program) => program,
            Err(err) => {
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                return Err(err.context("failed to create native program"));
            }
        };
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);

        let linked = gl.program_link_status(program);
        if !linked {
            log::error!("program {:?} failed to link: {}", id, gl.program_info_log(program));
        }

        let mut interface = ProgramInterface::default();
        for info in gl.active_attributes(program) {
            match gl.attrib_location(program, &info.name) {
                Some(location) => {
                    interface.attributes.insert(info.name, location);
                }
                None => log::warn!("program {:?}: attribute `{}` has no location", id, info.name),
            }
        }

        let mut slots = Vec::new();
        for info in gl.active_uniforms(program) {
            let Some(kind) = UniformKind::from_gl(info.kind) else {
                log::warn!(
                    "program {:?}: uniform `{}` has unsupported type 0x{:04X}; skipped",
                    id,
                    info.name,
                    info.kind
                );
                continue;
            };
            let Some(location) = gl.uniform_location(program, &info.name) else {
                log::warn!("program {:?}: uniform `{}` has no location", id, info.name);
                continue;
            };

            let index = UniformIndex(slots.len());
            slots.push(UniformSlot::new(kind, location));

            // Array uniforms report `name[0]`; accept the bare name too.
            if let Some(base) = info.name.strip_suffix("[0]") {
                interface.uniforms.insert(base.to_string(), (index, kind));
            }
            interface.uniforms.insert(info.name, (index, kind));
        }

        log::debug!(
            "program {:?}: {} attributes, {} uniforms",
            id,
            interface.attributes.len(),
            slots.len()
        );

        Ok(Self {
            id,
            program: Some(program),
            shaders: vec![vs, fs],
            linked,
            interface: Rc::new(interface),
            slots,
        })
    }

    #[inline]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    #[inline]
    pub fn native(&self) -> Option<NativeProgram> {
        self.program
    }

    /// Whether the native link succeeded.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    #[inline]
    pub fn interface(&self) -> &Rc<ProgramInterface> {
        &self.interface
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.interface.attribute(name)
    }

    /// Makes this program current unless the shared state says it already is.
    ///
    /// Returns whether a native bind was issued.
    pub fn bind(&self, gl: &mut dyn GlContext, state: &mut ContextState) -> bool {
        if state.program == Some(self.id) {
            return false;
        }
        gl.use_program(self.program);
        state.program = Some(self.id);
        true
    }

    /// Binds `buffer` to the attribute called `name`.
    pub fn bind_attribute(&self, gl: &mut dyn GlContext, name: &str, buffer: &VertexBuffer) {
        match self.interface.attribute(name) {
            Some(location) => buffer.bind_attribute(gl, location),
            None => log::warn!("program {:?}: no active attribute `{}`", self.id, name),
        }
    }

    /// Writes the uniform called `name`, skipping the upload if unchanged.
    pub fn set_uniform(&mut self, gl: &mut dyn GlContext, name: &str, value: &UniformValue) {
        match self.interface.uniform(name) {
            Some((index, _)) => {
                self.set_uniform_at(gl, index, value);
            }
            None => log::warn!("program {:?}: no active uniform `{}`", self.id, name),
        }
    }

    /// Writes a pre-resolved uniform slot. Returns whether it was uploaded.
    pub fn set_uniform_at(&mut self, gl: &mut dyn GlContext, index: UniformIndex, value: &UniformValue) -> bool {
        match self.slots.get_mut(index.0) {
            Some(slot) => slot.set(gl, value),
            None => false,
        }
    }

    /// Cached value of a uniform.
    pub fn uniform_value(&self, name: &str) -> Option<&UniformValue> {
        let (index, _) = self.interface.uniform(name)?;
        self.slots.get(index.0).map(UniformSlot::value)
    }

    pub(crate) fn delete(&mut self, gl: &mut dyn GlContext, state: &mut ContextState) {
        if let Some(program) = self.program.take() {
            if state.program == Some(self.id) {
                gl.use_program(None);
                state.program = None;
            }
            gl.delete_program(program);
        }
        for shader in self.shaders.drain(..) {
            gl.delete_shader(shader);
        }
    }
}

fn compile_shader(gl: &mut dyn GlContext, kind: GLenum, source: &str) -> Result<NativeShader> {
    let shader = gl.create_shader(kind)?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);

    if !gl.shader_compile_status(shader) {
        let stage = if kind == gl::VERTEX_SHADER { "vertex" } else { "fragment" };
        log::error!("{stage} shader failed to compile: {}", gl.shader_info_log(shader));
        log_numbered_source(log::Level::Error, stage, source);
    }

    Ok(shader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaId, BufferId};
    use crate::buffer::BufferLayout;
    use crate::context::{ActiveInfo, GlCall, RecordingContext};
    use crate::types::DataType;

    fn info(name: &str, kind: GLenum) -> ActiveInfo {
        ActiveInfo { name: name.to_string(), kind, size: 1 }
    }

    fn context() -> RecordingContext {
        let mut gl = RecordingContext::new(8, 8);
        gl.set_program_interface(
            vec![info("aPosition", gl::FLOAT_VEC2), info("aColor", gl::FLOAT_VEC4)],
            vec![
                info("uTint", gl::FLOAT_VEC4),
                info("uTexture", gl::SAMPLER_2D),
                info("uBones[0]", gl::FLOAT_MAT4),
                info("uWeird", gl::FLOAT_MAT2),
            ],
        );
        gl
    }

    fn program(gl: &mut RecordingContext) -> Program {
        Program::new(ProgramId::from_index(0), gl, "void main() {}", "void main() {}").unwrap()
    }

    // ── link / introspection ──────────────────────────────────────────────

    #[test]
    fn introspects_attributes_and_uniforms() {
        let mut gl = context();
        let p = program(&mut gl);

        assert!(p.is_linked());
        assert_eq!(p.attribute_location("aPosition"), Some(0));
        assert_eq!(p.attribute_location("aColor"), Some(1));
        assert_eq!(p.interface().uniform("uTexture").map(|u| u.1), Some(UniformKind::Int));
        assert!(p.interface().uniform("uWeird").is_none());
    }

    #[test]
    fn array_uniform_answers_to_bare_name() {
        let mut gl = context();
        let p = program(&mut gl);
        assert_eq!(p.interface().uniform("uBones"), p.interface().uniform("uBones[0]"));
    }

    #[test]
    fn compile_failure_still_yields_program() {
        let mut gl = context();
        gl.fail_compile_containing("oops");
        let p = Program::new(ProgramId::from_index(0), &mut gl, "void main() {}", "oops").unwrap();
        assert!(!p.is_linked());
        assert!(p.native().is_some());
    }

    #[test]
    fn fragment_allocation_failure_frees_vertex_shader() {
        let mut gl = context();
        gl.fail_nth_allocation(2);

        assert!(Program::new(ProgramId::from_index(0), &mut gl, "void main() {}", "void main() {}").is_err());
        let created: Vec<_> = gl
            .calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::CreateShader(_, shader) => Some(*shader),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 1);
        assert!(gl.calls().contains(&GlCall::DeleteShader(created[0])));
    }

    #[test]
    fn program_allocation_failure_frees_both_shaders() {
        let mut gl = context();
        gl.fail_nth_allocation(3);

        assert!(Program::new(ProgramId::from_index(0), &mut gl, "void main() {}", "void main() {}").is_err());
        assert_eq!(gl.count(|c| matches!(c, GlCall::CreateShader(..))), 2);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteShader(_))), 2);
        assert_eq!(gl.count(|c| matches!(c, GlCall::CreateProgram(_))), 0);
    }

    // ── binding ───────────────────────────────────────────────────────────

    #[test]
    fn bind_is_elided_when_current() {
        let mut gl = context();
        let p = program(&mut gl);
        let mut state = ContextState::new();
        gl.take_calls();

        assert!(p.bind(&mut gl, &mut state));
        assert!(!p.bind(&mut gl, &mut state));
        assert_eq!(gl.count(|c| matches!(c, GlCall::UseProgram(_))), 1);
        assert_eq!(state.program, Some(p.id()));
    }

    #[test]
    fn bind_attribute_by_name() {
        let mut gl = context();
        let p = program(&mut gl);
        let vb = VertexBuffer::new(BufferId::from_index(0), &mut gl, &mut ContextState::new(), BufferLayout::vertex(DataType::Float, 4), &[0.0f32; 8]).unwrap();
        gl.take_calls();

        p.bind_attribute(&mut gl, "aColor", &vb);
        assert!(gl.calls().contains(&GlCall::EnableVertexAttribArray(1)));

        gl.take_calls();
        p.bind_attribute(&mut gl, "aMissing", &vb);
        assert!(gl.calls().is_empty());
    }

    // ── uniforms ──────────────────────────────────────────────────────────

    #[test]
    fn set_uniform_by_name_caches() {
        let mut gl = context();
        let mut p = program(&mut gl);
        gl.take_calls();

        let tint = UniformValue::Vec4([1.0, 0.5, 0.25, 1.0]);
        p.set_uniform(&mut gl, "uTint", &tint);
        p.set_uniform(&mut gl, "uTint", &tint);
        p.set_uniform(&mut gl, "uNope", &tint);

        assert_eq!(gl.count(GlCall::is_uniform_upload), 1);
        assert_eq!(p.uniform_value("uTint"), Some(&tint));
    }

    #[test]
    fn delete_unbinds_current_program() {
        let mut gl = context();
        let mut p = program(&mut gl);
        let mut state = ContextState::new();
        p.bind(&mut gl, &mut state);

        p.delete(&mut gl, &mut state);
        assert_eq!(state.program, None);
        assert!(gl.calls().contains(&GlCall::UseProgram(None)));
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteShader(_))), 2);
    }
}
