//! 2D textures and cubemaps.

use anyhow::{Context, Result};

use crate::arena::TextureId;
use crate::context::{GlContext, NativeTexture};
use crate::gl::{self, GLenum};
use crate::types::{DataType, TextureFilter, TextureFormat, TextureWrap};

/// Bind target of a texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureTarget {
    Texture2d,
    CubeMap,
}

impl TextureTarget {
    #[inline]
    pub const fn gl(self) -> GLenum {
        match self {
            TextureTarget::Texture2d => gl::TEXTURE_2D,
            TextureTarget::CubeMap => gl::TEXTURE_CUBE_MAP,
        }
    }
}

/// Cubemap face upload targets, in upload order.
const CUBE_FACES: [GLenum; 6] = [
    gl::TEXTURE_CUBE_MAP_NEGATIVE_X,
    gl::TEXTURE_CUBE_MAP_POSITIVE_X,
    gl::TEXTURE_CUBE_MAP_NEGATIVE_Y,
    gl::TEXTURE_CUBE_MAP_POSITIVE_Y,
    gl::TEXTURE_CUBE_MAP_NEGATIVE_Z,
    gl::TEXTURE_CUBE_MAP_POSITIVE_Z,
];

/// Creation parameters. Fixed for the lifetime of the texture.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextureOptions {
    /// Used as both internal and upload format.
    pub format: TextureFormat,
    pub data_type: DataType,
    pub width: u32,
    pub height: u32,
    /// `None` flips 2D textures and leaves cubemaps as-is.
    pub flip_y: Option<bool>,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
    /// Only honoured when `min_filter` is a linear mipmap filter.
    pub generate_mipmaps: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            format: TextureFormat::Rgba,
            data_type: DataType::UnsignedByte,
            width: 0,
            height: 0,
            flip_y: None,
            min_filter: TextureFilter::LinearMipmapNearest,
            mag_filter: TextureFilter::Linear,
            wrap_s: TextureWrap::Repeat,
            wrap_t: TextureWrap::Repeat,
            generate_mipmaps: true,
        }
    }
}

impl TextureOptions {
    pub fn sized(width: u32, height: u32) -> Self {
        Self { width, height, ..Self::default() }
    }

    /// Unfiltered, unwrapped, mipmap-free storage, as used for render targets.
    pub fn render_target(format: TextureFormat, data_type: DataType, width: u32, height: u32) -> Self {
        Self {
            format,
            data_type,
            width,
            height,
            flip_y: None,
            min_filter: TextureFilter::Nearest,
            mag_filter: TextureFilter::Nearest,
            wrap_s: TextureWrap::ClampToEdge,
            wrap_t: TextureWrap::ClampToEdge,
            generate_mipmaps: false,
        }
    }

    fn wants_mipmaps(&self) -> bool {
        self.generate_mipmaps && self.min_filter.wants_mipmaps()
    }
}

/// Pixel data for the six cubemap faces. A missing face allocates storage only.
#[derive(Debug, Default, Copy, Clone)]
pub struct CubemapFaces<'a> {
    pub neg_x: Option<&'a [u8]>,
    pub pos_x: Option<&'a [u8]>,
    pub neg_y: Option<&'a [u8]>,
    pub pos_y: Option<&'a [u8]>,
    pub neg_z: Option<&'a [u8]>,
    pub pos_z: Option<&'a [u8]>,
}

impl<'a> CubemapFaces<'a> {
    fn in_upload_order(&self) -> [Option<&'a [u8]>; 6] {
        [self.neg_x, self.pos_x, self.neg_y, self.pos_y, self.neg_z, self.pos_z]
    }
}

/// A native texture with its format fixed at creation.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    texture: Option<NativeTexture>,
    target: TextureTarget,
    format: TextureFormat,
    data_type: DataType,
    width: u32,
    height: u32,
}

impl Texture {
    /// Creates a 2D texture, uploading `pixels` if given.
    pub(crate) fn new_2d(
        id: TextureId,
        gl: &mut dyn GlContext,
        pixels: Option<&[u8]>,
        options: &TextureOptions,
    ) -> Result<Self> {
        let tex = Self::allocate(id, gl, TextureTarget::Texture2d, options)?;
        tex.upload(gl, gl::TEXTURE_2D, pixels);
        if options.wants_mipmaps() {
            gl.generate_mipmap(gl::TEXTURE_2D);
        }
        Ok(tex)
    }

    /// Creates a cubemap from six faces sharing `options`.
    pub(crate) fn new_cubemap(
        id: TextureId,
        gl: &mut dyn GlContext,
        faces: &CubemapFaces<'_>,
        options: &TextureOptions,
    ) -> Result<Self> {
        let tex = Self::allocate(id, gl, TextureTarget::CubeMap, options)?;
        for (face, pixels) in CUBE_FACES.into_iter().zip(faces.in_upload_order()) {
            tex.upload(gl, face, pixels);
        }
        if options.wants_mipmaps() {
            gl.generate_mipmap(gl::TEXTURE_CUBE_MAP);
        }
        Ok(tex)
    }

    fn allocate(
        id: TextureId,
        gl: &mut dyn GlContext,
        target: TextureTarget,
        options: &TextureOptions,
    ) -> Result<Self> {
        let texture = gl.create_texture().context("failed to create native texture")?;
        let flip_y = options.flip_y.unwrap_or(target == TextureTarget::Texture2d);
        let t = target.gl();

        gl.active_texture(gl::TEXTURE0);
        gl.bind_texture(t, Some(texture));
        gl.pixel_store_i(gl::UNPACK_FLIP_Y_WEBGL, flip_y as i32);
        gl.tex_parameter_i(t, gl::TEXTURE_MAG_FILTER, options.mag_filter.gl() as i32);
        gl.tex_parameter_i(t, gl::TEXTURE_MIN_FILTER, options.min_filter.gl() as i32);
        gl.tex_parameter_i(t, gl::TEXTURE_WRAP_S, options.wrap_s.gl() as i32);
        gl.tex_parameter_i(t, gl::TEXTURE_WRAP_T, options.wrap_t.gl() as i32);

        log::debug!(
            "texture {:?}: {:?} {}x{} {:?}/{:?}",
            id,
            target,
            options.width,
            options.height,
            options.format,
            options.data_type
        );

        Ok(Self {
            id,
            texture: Some(texture),
            target,
            format: options.format,
            data_type: options.data_type,
            width: options.width,
            height: options.height,
        })
    }

    fn upload(&self, gl: &mut dyn GlContext, image_target: GLenum, pixels: Option<&[u8]>) {
        gl.tex_image_2d(
            image_target,
            self.format.gl(),
            self.width,
            self.height,
            self.format.gl(),
            self.data_type.gl(),
            pixels,
        );
    }

    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    pub fn target(&self) -> TextureTarget {
        self.target
    }

    #[inline]
    pub fn native(&self) -> Option<NativeTexture> {
        self.texture
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Replaces the image of a 2D texture, resizing it to `width` × `height`.
    ///
    /// `None` reallocates storage without data (used to resize render targets).
    pub fn image(&mut self, gl: &mut dyn GlContext, pixels: Option<&[u8]>, width: u32, height: u32) {
        if self.target != TextureTarget::Texture2d {
            log::warn!("texture {:?}: image() on a cubemap ignored", self.id);
            return;
        }
        let Some(texture) = self.texture else {
            log::warn!("texture {:?}: image() after delete ignored", self.id);
            return;
        };

        self.width = width;
        self.height = height;
        gl.active_texture(gl::TEXTURE0);
        gl.bind_texture(gl::TEXTURE_2D, Some(texture));
        self.upload(gl, gl::TEXTURE_2D, pixels);
    }

    /// Binds to texture unit `unit` (0-based).
    pub fn bind(&self, gl: &mut dyn GlContext, unit: u32) {
        gl.active_texture(gl::TEXTURE0 + unit);
        gl.bind_texture(self.target.gl(), self.texture);
    }

    pub(crate) fn delete(&mut self, gl: &mut dyn GlContext) {
        if let Some(texture) = self.texture.take() {
            gl.delete_texture(texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaId;
    use crate::context::{GlCall, RecordingContext};

    fn id() -> TextureId {
        TextureId::from_index(0)
    }

    // ── 2D ────────────────────────────────────────────────────────────────

    #[test]
    fn default_2d_texture_flips_and_mipmaps() {
        let mut gl = RecordingContext::new(4, 4);
        let pixels = [255u8; 16];
        let tex = Texture::new_2d(id(), &mut gl, Some(&pixels), &TextureOptions::sized(2, 2)).unwrap();

        let calls = gl.take_calls();
        assert_eq!(tex.target(), TextureTarget::Texture2d);
        assert!(calls.contains(&GlCall::PixelStore(gl::UNPACK_FLIP_Y_WEBGL, 1)));
        assert!(calls.contains(&GlCall::TexParameter(
            gl::TEXTURE_2D,
            gl::TEXTURE_MIN_FILTER,
            gl::LINEAR_MIPMAP_NEAREST as i32
        )));
        assert!(calls.contains(&GlCall::TexImage2d {
            target: gl::TEXTURE_2D,
            internal_format: gl::RGBA,
            width: 2,
            height: 2,
            format: gl::RGBA,
            data_type: gl::UNSIGNED_BYTE,
            has_pixels: true,
        }));
        assert_eq!(calls.last(), Some(&GlCall::GenerateMipmap(gl::TEXTURE_2D)));
    }

    #[test]
    fn non_mipmap_filter_skips_mipmaps() {
        let mut gl = RecordingContext::new(4, 4);
        let options = TextureOptions { min_filter: TextureFilter::Linear, ..TextureOptions::sized(1, 1) };
        Texture::new_2d(id(), &mut gl, None, &options).unwrap();
        assert_eq!(gl.count(|c| matches!(c, GlCall::GenerateMipmap(_))), 0);
    }

    #[test]
    fn mipmaps_can_be_disabled() {
        let mut gl = RecordingContext::new(4, 4);
        let options = TextureOptions { generate_mipmaps: false, ..TextureOptions::sized(1, 1) };
        Texture::new_2d(id(), &mut gl, None, &options).unwrap();
        assert_eq!(gl.count(|c| matches!(c, GlCall::GenerateMipmap(_))), 0);
    }

    #[test]
    fn image_reuploads_at_new_size() {
        let mut gl = RecordingContext::new(4, 4);
        let mut tex = Texture::new_2d(id(), &mut gl, None, &TextureOptions::sized(1, 1)).unwrap();
        gl.take_calls();

        tex.image(&mut gl, None, 8, 4);
        assert_eq!(tex.size(), (8, 4));
        assert!(gl.calls().iter().any(|c| matches!(
            c,
            GlCall::TexImage2d { width: 8, height: 4, has_pixels: false, .. }
        )));
    }

    #[test]
    fn bind_selects_unit() {
        let mut gl = RecordingContext::new(4, 4);
        let tex = Texture::new_2d(id(), &mut gl, None, &TextureOptions::sized(1, 1)).unwrap();
        gl.take_calls();

        tex.bind(&mut gl, 3);
        assert_eq!(
            gl.take_calls(),
            vec![GlCall::ActiveTexture(gl::TEXTURE0 + 3), GlCall::BindTexture(gl::TEXTURE_2D, tex.native())]
        );
    }

    // ── cubemap ───────────────────────────────────────────────────────────

    #[test]
    fn cubemap_uploads_faces_in_order_without_flip() {
        let mut gl = RecordingContext::new(4, 4);
        let face = [0u8; 4];
        let faces = CubemapFaces { pos_x: Some(&face), ..CubemapFaces::default() };
        let tex = Texture::new_cubemap(id(), &mut gl, &faces, &TextureOptions::sized(1, 1)).unwrap();

        assert_eq!(tex.target(), TextureTarget::CubeMap);
        assert!(gl.calls().contains(&GlCall::PixelStore(gl::UNPACK_FLIP_Y_WEBGL, 0)));

        let uploads: Vec<(GLenum, bool)> = gl
            .calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::TexImage2d { target, has_pixels, .. } => Some((*target, *has_pixels)),
                _ => None,
            })
            .collect();
        assert_eq!(uploads.len(), 6);
        assert_eq!(uploads[0], (gl::TEXTURE_CUBE_MAP_NEGATIVE_X, false));
        assert_eq!(uploads[1], (gl::TEXTURE_CUBE_MAP_POSITIVE_X, true));
        assert_eq!(uploads[5].0, gl::TEXTURE_CUBE_MAP_POSITIVE_Z);
    }

    #[test]
    fn cubemap_ignores_image() {
        let mut gl = RecordingContext::new(4, 4);
        let mut tex =
            Texture::new_cubemap(id(), &mut gl, &CubemapFaces::default(), &TextureOptions::sized(1, 1)).unwrap();
        gl.take_calls();
        tex.image(&mut gl, None, 2, 2);
        assert!(gl.calls().is_empty());
    }
}
