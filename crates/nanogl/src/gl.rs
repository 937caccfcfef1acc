//! Raw enum values of the native graphics API.
//!
//! These are the numeric constants the native context understands. Public
//! APIs take the typed enums from [`crate::types`] and convert at the call
//! site; the raw values are exposed for backends and for callers that need a
//! constant the typed layer does not cover.

pub type GLenum = u32;

// ── clear bits ────────────────────────────────────────────────────────────
pub const DEPTH_BUFFER_BIT: GLenum = 0x0100;
pub const STENCIL_BUFFER_BIT: GLenum = 0x0400;
pub const COLOR_BUFFER_BIT: GLenum = 0x4000;

// ── primitives ────────────────────────────────────────────────────────────
pub const POINTS: GLenum = 0x0000;
pub const LINES: GLenum = 0x0001;
pub const LINE_LOOP: GLenum = 0x0002;
pub const LINE_STRIP: GLenum = 0x0003;
pub const TRIANGLES: GLenum = 0x0004;
pub const TRIANGLE_STRIP: GLenum = 0x0005;
pub const TRIANGLE_FAN: GLenum = 0x0006;

// ── blending ──────────────────────────────────────────────────────────────
pub const ZERO: GLenum = 0;
pub const ONE: GLenum = 1;
pub const SRC_COLOR: GLenum = 0x0300;
pub const ONE_MINUS_SRC_COLOR: GLenum = 0x0301;
pub const SRC_ALPHA: GLenum = 0x0302;
pub const ONE_MINUS_SRC_ALPHA: GLenum = 0x0303;
pub const DST_ALPHA: GLenum = 0x0304;
pub const ONE_MINUS_DST_ALPHA: GLenum = 0x0305;
pub const DST_COLOR: GLenum = 0x0306;
pub const ONE_MINUS_DST_COLOR: GLenum = 0x0307;

// ── capabilities ──────────────────────────────────────────────────────────
pub const CULL_FACE: GLenum = 0x0B44;
pub const DEPTH_TEST: GLenum = 0x0B71;
pub const BLEND: GLenum = 0x0BE2;

// ── comparison ────────────────────────────────────────────────────────────
pub const NEVER: GLenum = 0x0200;
pub const LESS: GLenum = 0x0201;
pub const EQUAL: GLenum = 0x0202;
pub const LEQUAL: GLenum = 0x0203;
pub const GREATER: GLenum = 0x0204;
pub const NOTEQUAL: GLenum = 0x0205;
pub const GEQUAL: GLenum = 0x0206;
pub const ALWAYS: GLenum = 0x0207;

// ── data types ────────────────────────────────────────────────────────────
pub const BYTE: GLenum = 0x1400;
pub const UNSIGNED_BYTE: GLenum = 0x1401;
pub const SHORT: GLenum = 0x1402;
pub const UNSIGNED_SHORT: GLenum = 0x1403;
pub const INT: GLenum = 0x1404;
pub const UNSIGNED_INT: GLenum = 0x1405;
pub const FLOAT: GLenum = 0x1406;
pub const HALF_FLOAT: GLenum = 0x140B;

// ── pixel formats ─────────────────────────────────────────────────────────
pub const DEPTH_COMPONENT: GLenum = 0x1902;
pub const ALPHA: GLenum = 0x1906;
pub const RGB: GLenum = 0x1907;
pub const RGBA: GLenum = 0x1908;
pub const LUMINANCE: GLenum = 0x1909;
pub const LUMINANCE_ALPHA: GLenum = 0x190A;

// ── buffers ───────────────────────────────────────────────────────────────
pub const ARRAY_BUFFER: GLenum = 0x8892;
pub const ELEMENT_ARRAY_BUFFER: GLenum = 0x8893;
pub const STATIC_DRAW: GLenum = 0x88E4;
pub const DYNAMIC_DRAW: GLenum = 0x88E8;

// ── shaders ───────────────────────────────────────────────────────────────
pub const FRAGMENT_SHADER: GLenum = 0x8B30;
pub const VERTEX_SHADER: GLenum = 0x8B31;

// ── active uniform/attribute types ────────────────────────────────────────
pub const FLOAT_VEC2: GLenum = 0x8B50;
pub const FLOAT_VEC3: GLenum = 0x8B51;
pub const FLOAT_VEC4: GLenum = 0x8B52;
pub const INT_VEC2: GLenum = 0x8B53;
pub const INT_VEC3: GLenum = 0x8B54;
pub const INT_VEC4: GLenum = 0x8B55;
pub const BOOL: GLenum = 0x8B56;
pub const FLOAT_MAT2: GLenum = 0x8B5A;
pub const FLOAT_MAT3: GLenum = 0x8B5B;
pub const FLOAT_MAT4: GLenum = 0x8B5C;
pub const SAMPLER_2D: GLenum = 0x8B5E;
pub const SAMPLER_CUBE: GLenum = 0x8B60;

// ── textures ──────────────────────────────────────────────────────────────
pub const TEXTURE_2D: GLenum = 0x0DE1;
pub const TEXTURE_CUBE_MAP: GLenum = 0x8513;
pub const TEXTURE_CUBE_MAP_POSITIVE_X: GLenum = 0x8515;
pub const TEXTURE_CUBE_MAP_NEGATIVE_X: GLenum = 0x8516;
pub const TEXTURE_CUBE_MAP_POSITIVE_Y: GLenum = 0x8517;
pub const TEXTURE_CUBE_MAP_NEGATIVE_Y: GLenum = 0x8518;
pub const TEXTURE_CUBE_MAP_POSITIVE_Z: GLenum = 0x8519;
pub const TEXTURE_CUBE_MAP_NEGATIVE_Z: GLenum = 0x851A;
pub const TEXTURE0: GLenum = 0x84C0;

pub const TEXTURE_MAG_FILTER: GLenum = 0x2800;
pub const TEXTURE_MIN_FILTER: GLenum = 0x2801;
pub const TEXTURE_WRAP_S: GLenum = 0x2802;
pub const TEXTURE_WRAP_T: GLenum = 0x2803;

pub const NEAREST: GLenum = 0x2600;
pub const LINEAR: GLenum = 0x2601;
pub const NEAREST_MIPMAP_NEAREST: GLenum = 0x2700;
pub const LINEAR_MIPMAP_NEAREST: GLenum = 0x2701;
pub const NEAREST_MIPMAP_LINEAR: GLenum = 0x2702;
pub const LINEAR_MIPMAP_LINEAR: GLenum = 0x2703;

pub const REPEAT: GLenum = 0x2901;
pub const CLAMP_TO_EDGE: GLenum = 0x812F;
pub const MIRRORED_REPEAT: GLenum = 0x8370;

pub const UNPACK_FLIP_Y_WEBGL: GLenum = 0x9240;

// ── framebuffers ──────────────────────────────────────────────────────────
pub const FRAMEBUFFER: GLenum = 0x8D40;
pub const RENDERBUFFER: GLenum = 0x8D41;
pub const DEPTH_COMPONENT16: GLenum = 0x81A5;
pub const COLOR_ATTACHMENT0: GLenum = 0x8CE0;
pub const DEPTH_ATTACHMENT: GLenum = 0x8D00;
pub const FRAMEBUFFER_COMPLETE: GLenum = 0x8CD5;
pub const FRAMEBUFFER_INCOMPLETE_ATTACHMENT: GLenum = 0x8CD6;
pub const MAX_DRAW_BUFFERS: GLenum = 0x8824;

// ── extensions ────────────────────────────────────────────────────────────
pub const EXT_DRAW_BUFFERS: &str = "WEBGL_draw_buffers";
pub const EXT_DEPTH_TEXTURE: &str = "WEBGL_depth_texture";
pub const EXT_TEXTURE_FLOAT: &str = "OES_texture_float";
pub const EXT_TEXTURE_FLOAT_LINEAR: &str = "OES_texture_float_linear";
