//! Uniform slots with last-value caching.

use crate::context::{GlContext, NativeUniformLocation};
use crate::gl::{self, GLenum};

/// A value that can be written to a uniform.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    /// Integers and sampler units.
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major 3×3 matrix.
    Mat3([f32; 9]),
    /// Column-major 4×4 matrix.
    Mat4([f32; 16]),
}

impl UniformValue {
    #[inline]
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat3(_) => UniformKind::Mat3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<[f32; 9]> for UniformValue {
    fn from(v: [f32; 9]) -> Self {
        UniformValue::Mat3(v)
    }
}

impl From<[f32; 16]> for UniformValue {
    fn from(v: [f32; 16]) -> Self {
        UniformValue::Mat4(v)
    }
}

/// Storage shape of a uniform slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformKind {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformKind {
    /// Maps a native active-uniform type. Samplers are integer slots.
    pub fn from_gl(kind: GLenum) -> Option<Self> {
        match kind {
            gl::INT | gl::BOOL | gl::SAMPLER_2D | gl::SAMPLER_CUBE => Some(UniformKind::Int),
            gl::FLOAT => Some(UniformKind::Float),
            gl::FLOAT_VEC2 => Some(UniformKind::Vec2),
            gl::FLOAT_VEC3 => Some(UniformKind::Vec3),
            gl::FLOAT_VEC4 => Some(UniformKind::Vec4),
            gl::FLOAT_MAT3 => Some(UniformKind::Mat3),
            gl::FLOAT_MAT4 => Some(UniformKind::Mat4),
            _ => None,
        }
    }

    /// Native default for a freshly linked program.
    pub fn zero(self) -> UniformValue {
        match self {
            UniformKind::Int => UniformValue::Int(0),
            UniformKind::Float => UniformValue::Float(0.0),
            UniformKind::Vec2 => UniformValue::Vec2([0.0; 2]),
            UniformKind::Vec3 => UniformValue::Vec3([0.0; 3]),
            UniformKind::Vec4 => UniformValue::Vec4([0.0; 4]),
            UniformKind::Mat3 => UniformValue::Mat3([0.0; 9]),
            UniformKind::Mat4 => UniformValue::Mat4([0.0; 16]),
        }
    }
}

/// Typed holder for one uniform location.
///
/// Invariant: `value` equals the last value uploaded to the native location
/// (initially the native default of zero), so writing an equal value is a
/// no-op.
#[derive(Debug, Clone)]
pub struct UniformSlot {
    location: NativeUniformLocation,
    value: UniformValue,
}

impl UniformSlot {
    pub fn new(kind: UniformKind, location: NativeUniformLocation) -> Self {
        Self { location, value: kind.zero() }
    }

    #[inline]
    pub fn kind(&self) -> UniformKind {
        self.value.kind()
    }

    #[inline]
    pub fn location(&self) -> NativeUniformLocation {
        self.location
    }

    /// Last uploaded value.
    #[inline]
    pub fn value(&self) -> &UniformValue {
        &self.value
    }

    /// Uploads `value` unless it equals the cached one.
    ///
    /// Returns whether a native upload happened. A value of the wrong kind is
    /// rejected without touching the cache.
    pub fn set(&mut self, gl: &mut dyn GlContext, value: &UniformValue) -> bool {
        if value.kind() != self.kind() {
            log::warn!(
                "uniform kind mismatch: slot is {:?}, value is {:?}; ignored",
                self.kind(),
                value.kind()
            );
            return false;
        }

        // Component-wise `!=` so that a NaN component always re-uploads.
        let changed = match (&self.value, value) {
            (UniformValue::Int(a), UniformValue::Int(b)) => a != b,
            (UniformValue::Float(a), UniformValue::Float(b)) => a != b,
            (UniformValue::Vec2(a), UniformValue::Vec2(b)) => a != b,
            (UniformValue::Vec3(a), UniformValue::Vec3(b)) => a != b,
            (UniformValue::Vec4(a), UniformValue::Vec4(b)) => a != b,
            (UniformValue::Mat3(a), UniformValue::Mat3(b)) => a != b,
            (UniformValue::Mat4(a), UniformValue::Mat4(b)) => a != b,
            _ => true,
        };
        if !changed {
            return false;
        }

        match value {
            UniformValue::Int(v) => gl.uniform_1i(self.location, *v),
            UniformValue::Float(v) => gl.uniform_1f(self.location, *v),
            UniformValue::Vec2(v) => gl.uniform_2fv(self.location, v),
            UniformValue::Vec3(v) => gl.uniform_3fv(self.location, v),
            UniformValue::Vec4(v) => gl.uniform_4fv(self.location, v),
            UniformValue::Mat3(v) => gl.uniform_matrix_3fv(self.location, v),
            UniformValue::Mat4(v) => gl.uniform_matrix_4fv(self.location, v),
        }
        self.value = *value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{GlCall, RecordingContext};

    fn uploads(gl: &RecordingContext) -> usize {
        gl.count(GlCall::is_uniform_upload)
    }

    #[test]
    fn same_value_twice_uploads_once() {
        let mut gl = RecordingContext::new(1, 1);
        let mut slot = UniformSlot::new(UniformKind::Vec3, NativeUniformLocation(7));

        assert!(slot.set(&mut gl, &UniformValue::Vec3([1.0, 2.0, 3.0])));
        assert!(!slot.set(&mut gl, &UniformValue::Vec3([1.0, 2.0, 3.0])));
        assert_eq!(uploads(&gl), 1);
        assert_eq!(gl.calls()[0], GlCall::Uniform3fv(NativeUniformLocation(7), [1.0, 2.0, 3.0]));
    }

    #[test]
    fn single_component_change_uploads() {
        let mut gl = RecordingContext::new(1, 1);
        let mut slot = UniformSlot::new(UniformKind::Mat4, NativeUniformLocation(1));

        let mut m = [0.0f32; 16];
        m[0] = 1.0;
        slot.set(&mut gl, &m.into());
        m[15] = 1.0;
        slot.set(&mut gl, &m.into());

        assert_eq!(uploads(&gl), 2);
        assert_eq!(slot.value(), &UniformValue::Mat4(m));
    }

    #[test]
    fn zero_matches_native_default() {
        // The cache starts at the native default, so writing zero is elided.
        let mut gl = RecordingContext::new(1, 1);
        let mut slot = UniformSlot::new(UniformKind::Float, NativeUniformLocation(1));
        assert!(!slot.set(&mut gl, &0.0f32.into()));
        assert_eq!(uploads(&gl), 0);
    }

    #[test]
    fn nan_always_uploads() {
        let mut gl = RecordingContext::new(1, 1);
        let mut slot = UniformSlot::new(UniformKind::Float, NativeUniformLocation(1));
        slot.set(&mut gl, &f32::NAN.into());
        slot.set(&mut gl, &f32::NAN.into());
        assert_eq!(uploads(&gl), 2);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let mut gl = RecordingContext::new(1, 1);
        let mut slot = UniformSlot::new(UniformKind::Int, NativeUniformLocation(1));
        assert!(!slot.set(&mut gl, &1.5f32.into()));
        assert_eq!(slot.value(), &UniformValue::Int(0));
        assert_eq!(uploads(&gl), 0);
    }

    #[test]
    fn samplers_are_int_slots() {
        assert_eq!(UniformKind::from_gl(gl::SAMPLER_2D), Some(UniformKind::Int));
        assert_eq!(UniformKind::from_gl(gl::SAMPLER_CUBE), Some(UniformKind::Int));
        assert_eq!(UniformKind::from_gl(gl::FLOAT_MAT2), None);
    }
}
