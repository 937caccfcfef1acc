//! Typed wrappers around the native enum values.

use crate::gl::{self, GLenum};

/// Component type of buffer or texel data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DataType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
    HalfFloat,
}

impl DataType {
    #[inline]
    pub const fn gl(self) -> GLenum {
        match self {
            DataType::Byte => gl::BYTE,
            DataType::UnsignedByte => gl::UNSIGNED_BYTE,
            DataType::Short => gl::SHORT,
            DataType::UnsignedShort => gl::UNSIGNED_SHORT,
            DataType::Int => gl::INT,
            DataType::UnsignedInt => gl::UNSIGNED_INT,
            DataType::Float => gl::FLOAT,
            DataType::HalfFloat => gl::HALF_FLOAT,
        }
    }

    /// Size of one component in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            DataType::Byte | DataType::UnsignedByte => 1,
            DataType::Short | DataType::UnsignedShort | DataType::HalfFloat => 2,
            DataType::Int | DataType::UnsignedInt | DataType::Float => 4,
        }
    }

    /// Whether the type holds integer data.
    #[inline]
    pub const fn is_integer(self) -> bool {
        !matches!(self, DataType::Float | DataType::HalfFloat)
    }
}

/// Primitive assembly mode for a draw.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl Primitive {
    #[inline]
    pub const fn gl(self) -> GLenum {
        match self {
            Primitive::Points => gl::POINTS,
            Primitive::Lines => gl::LINES,
            Primitive::LineLoop => gl::LINE_LOOP,
            Primitive::LineStrip => gl::LINE_STRIP,
            Primitive::Triangles => gl::TRIANGLES,
            Primitive::TriangleStrip => gl::TRIANGLE_STRIP,
            Primitive::TriangleFan => gl::TRIANGLE_FAN,
        }
    }
}

/// Texture minification / magnification filter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl TextureFilter {
    #[inline]
    pub const fn gl(self) -> GLenum {
        match self {
            TextureFilter::Nearest => gl::NEAREST,
            TextureFilter::Linear => gl::LINEAR,
            TextureFilter::NearestMipmapNearest => gl::NEAREST_MIPMAP_NEAREST,
            TextureFilter::LinearMipmapNearest => gl::LINEAR_MIPMAP_NEAREST,
            TextureFilter::NearestMipmapLinear => gl::NEAREST_MIPMAP_LINEAR,
            TextureFilter::LinearMipmapLinear => gl::LINEAR_MIPMAP_LINEAR,
        }
    }

    /// Mipmaps are generated automatically only for these two filters.
    #[inline]
    pub const fn wants_mipmaps(self) -> bool {
        matches!(
            self,
            TextureFilter::LinearMipmapNearest | TextureFilter::LinearMipmapLinear
        )
    }
}

/// Texture coordinate wrap mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureWrap {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl TextureWrap {
    #[inline]
    pub const fn gl(self) -> GLenum {
        match self {
            TextureWrap::Repeat => gl::REPEAT,
            TextureWrap::ClampToEdge => gl::CLAMP_TO_EDGE,
            TextureWrap::MirroredRepeat => gl::MIRRORED_REPEAT,
        }
    }
}

/// Texel format (used as both internal format and upload format).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    Alpha,
    Luminance,
    LuminanceAlpha,
    Rgb,
    Rgba,
    DepthComponent,
}

impl TextureFormat {
    #[inline]
    pub const fn gl(self) -> GLenum {
        match self {
            TextureFormat::Alpha => gl::ALPHA,
            TextureFormat::Luminance => gl::LUMINANCE,
            TextureFormat::LuminanceAlpha => gl::LUMINANCE_ALPHA,
            TextureFormat::Rgb => gl::RGB,
            TextureFormat::Rgba => gl::RGBA,
            TextureFormat::DepthComponent => gl::DEPTH_COMPONENT,
        }
    }
}

/// Depth comparison function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareFunc {
    #[inline]
    pub const fn gl(self) -> GLenum {
        match self {
            CompareFunc::Never => gl::NEVER,
            CompareFunc::Less => gl::LESS,
            CompareFunc::Equal => gl::EQUAL,
            CompareFunc::LessOrEqual => gl::LEQUAL,
            CompareFunc::Greater => gl::GREATER,
            CompareFunc::NotEqual => gl::NOTEQUAL,
            CompareFunc::GreaterOrEqual => gl::GEQUAL,
            CompareFunc::Always => gl::ALWAYS,
        }
    }
}

/// Blend weight.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
}

impl BlendFactor {
    #[inline]
    pub const fn gl(self) -> GLenum {
        match self {
            BlendFactor::Zero => gl::ZERO,
            BlendFactor::One => gl::ONE,
            BlendFactor::SrcColor => gl::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => gl::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => gl::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => gl::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => gl::ONE_MINUS_DST_ALPHA,
            BlendFactor::DstColor => gl::DST_COLOR,
            BlendFactor::OneMinusDstColor => gl::ONE_MINUS_DST_COLOR,
        }
    }
}
