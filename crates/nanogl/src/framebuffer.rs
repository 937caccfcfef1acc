//! Offscreen render targets.

use anyhow::{Context, Result};

use crate::arena::{Arena, FramebufferId, TextureId};
use crate::context::{GlContext, NativeFramebuffer, NativeRenderbuffer};
use crate::gl::{self, GLenum};
use crate::texture::{Texture, TextureOptions};
use crate::types::{DataType, TextureFormat};

/// Requested layout of a framebuffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FramebufferOptions {
    /// Capped to 1 unless draw buffers are enabled.
    pub color_targets: usize,
    /// Component type of the color textures.
    pub color_type: DataType,
}

impl Default for FramebufferOptions {
    fn default() -> Self {
        Self { color_targets: 1, color_type: DataType::UnsignedByte }
    }
}

/// The single depth attachment. Chosen at construction, never switched.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DepthAttachment {
    /// Sampleable depth texture (depth textures enabled).
    Texture(TextureId),
    Renderbuffer(NativeRenderbuffer),
}

/// Capabilities that decide how a framebuffer is wired.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub(crate) struct FramebufferCaps {
    pub draw_buffers: bool,
    pub max_draw_buffers: u32,
    pub depth_textures: bool,
}

/// A native framebuffer plus the attachments it owns.
///
/// Attachment textures live in the facade's texture arena so draw calls can
/// sample them by id; they are deleted together with the framebuffer.
#[derive(Debug)]
pub struct Framebuffer {
    id: FramebufferId,
    framebuffer: Option<NativeFramebuffer>,
    width: u32,
    height: u32,
    color_textures: Vec<TextureId>,
    color_attachments: Vec<GLenum>,
    depth: Option<DepthAttachment>,
}

impl Framebuffer {
    pub(crate) fn new(
        id: FramebufferId,
        gl: &mut dyn GlContext,
        textures: &mut Arena<TextureId, Texture>,
        options: &FramebufferOptions,
        caps: FramebufferCaps,
    ) -> Result<Self> {
        let framebuffer = gl.create_framebuffer().context("failed to create native framebuffer")?;
        let (width, height) = gl.drawing_buffer_size();

        let color_targets = if caps.draw_buffers {
            let max = caps.max_draw_buffers.max(1) as usize;
            if options.color_targets > max {
                log::warn!(
                    "framebuffer {:?}: {} color targets requested, {} supported",
                    id,
                    options.color_targets,
                    max
                );
            }
            options.color_targets.clamp(1, max)
        } else {
            1
        };

        let mut fb = Self {
            id,
            framebuffer: Some(framebuffer),
            width,
            height,
            color_textures: Vec::with_capacity(color_targets),
            color_attachments: Vec::with_capacity(color_targets),
            depth: None,
        };

        gl.bind_framebuffer(Some(framebuffer));
        if let Err(err) = fb.attach(gl, textures, color_targets, options.color_type, caps.depth_textures) {
            fb.delete(gl, textures);
            gl.bind_framebuffer(None);
            return Err(err);
        }

        let status = gl.check_framebuffer_status();
        if status != gl::FRAMEBUFFER_COMPLETE {
            log::error!("framebuffer {:?} incomplete: status 0x{:04X}", id, status);
        }

        if caps.draw_buffers {
            gl.draw_buffers(&fb.color_attachments);
        }

        gl.bind_framebuffer(None);

        log::debug!(
            "framebuffer {:?}: {}x{}, {} color target(s), depth {:?}",
            id,
            width,
            height,
            color_targets,
            fb.depth
        );
        Ok(fb)
    }

    #[inline]
    pub fn id(&self) -> FramebufferId {
        self.id
    }

    #[inline]
    pub fn native(&self) -> Option<NativeFramebuffer> {
        self.framebuffer
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn num_color_targets(&self) -> usize {
        self.color_textures.len()
    }

    pub fn color_texture(&self, index: usize) -> Option<TextureId> {
        self.color_textures.get(index).copied()
    }

    pub fn color_textures(&self) -> &[TextureId] {
        &self.color_textures
    }

    pub fn color_attachments(&self) -> &[GLenum] {
        &self.color_attachments
    }

    pub fn depth(&self) -> Option<DepthAttachment> {
        self.depth
    }

    /// Depth texture id, when depth is sampleable.
    pub fn depth_texture(&self) -> Option<TextureId> {
        match self.depth {
            Some(DepthAttachment::Texture(id)) => Some(id),
            _ => None,
        }
    }

    /// Makes this the render target.
    pub fn bind(&self, gl: &mut dyn GlContext) {
        match self.framebuffer {
            Some(fb) => gl.bind_framebuffer(Some(fb)),
            None => log::warn!("framebuffer {:?}: bind after delete ignored", self.id),
        }
    }

    /// Creates and attaches the color targets and the depth attachment to the
    /// bound framebuffer. Whatever was created before a failure stays recorded
    /// on `self` so `delete` can free it.
    fn attach(
        &mut self,
        gl: &mut dyn GlContext,
        textures: &mut Arena<TextureId, Texture>,
        color_targets: usize,
        color_type: DataType,
        depth_textures: bool,
    ) -> Result<()> {
        let (width, height) = (self.width, self.height);

        let color_options = TextureOptions::render_target(TextureFormat::Rgba, color_type, width, height);
        for i in 0..color_targets {
            let tex_id = textures.try_insert_with(|tid| Texture::new_2d(tid, &mut *gl, None, &color_options))?;
            let attachment = gl::COLOR_ATTACHMENT0 + i as GLenum;
            if let Some(native) = textures.get(tex_id).and_then(Texture::native) {
                gl.framebuffer_texture_2d(attachment, gl::TEXTURE_2D, native);
            }
            self.color_textures.push(tex_id);
            self.color_attachments.push(attachment);
        }

        if depth_textures {
            let depth_options =
                TextureOptions::render_target(TextureFormat::DepthComponent, DataType::UnsignedInt, width, height);
            let tex_id = textures.try_insert_with(|tid| Texture::new_2d(tid, &mut *gl, None, &depth_options))?;
            if let Some(native) = textures.get(tex_id).and_then(Texture::native) {
                gl.framebuffer_texture_2d(gl::DEPTH_ATTACHMENT, gl::TEXTURE_2D, native);
            }
            self.depth = Some(DepthAttachment::Texture(tex_id));
        } else {
            let rb = gl.create_renderbuffer().context("failed to create depth renderbuffer")?;
            gl.bind_renderbuffer(Some(rb));
            gl.renderbuffer_storage(gl::DEPTH_COMPONENT16, width, height);
            gl.framebuffer_renderbuffer(gl::DEPTH_ATTACHMENT, rb);
            gl.bind_renderbuffer(None);
            self.depth = Some(DepthAttachment::Renderbuffer(rb));
        }
        Ok(())
    }

    /// Reallocates every attachment at the current drawing-buffer size.
    ///
    /// Attachment bindings are left alone; the native handles do not change.
    pub fn resize(&mut self, gl: &mut dyn GlContext, textures: &mut Arena<TextureId, Texture>) {
        let Some(framebuffer) = self.framebuffer else { return };
        let (width, height) = gl.drawing_buffer_size();
        self.width = width;
        self.height = height;

        gl.bind_framebuffer(Some(framebuffer));

        for id in &self.color_textures {
            if let Some(tex) = textures.get_mut(*id) {
                tex.image(gl, None, width, height);
            }
        }

        match self.depth {
            Some(DepthAttachment::Texture(id)) => {
                if let Some(tex) = textures.get_mut(id) {
                    tex.image(gl, None, width, height);
                }
            }
            Some(DepthAttachment::Renderbuffer(rb)) => {
                gl.bind_renderbuffer(Some(rb));
                gl.renderbuffer_storage(gl::DEPTH_COMPONENT16, width, height);
                gl.bind_renderbuffer(None);
            }
            None => {}
        }

        gl.bind_framebuffer(None);
        log::debug!("framebuffer {:?} resized to {}x{}", self.id, width, height);
    }

    /// Frees the framebuffer and every attachment it owns.
    pub(crate) fn delete(&mut self, gl: &mut dyn GlContext, textures: &mut Arena<TextureId, Texture>) {
        let Some(framebuffer) = self.framebuffer.take() else { return };

        for id in self.color_textures.drain(..) {
            if let Some(mut tex) = textures.remove(id) {
                tex.delete(gl);
            }
        }
        match self.depth.take() {
            Some(DepthAttachment::Texture(id)) => {
                if let Some(mut tex) = textures.remove(id) {
                    tex.delete(gl);
                }
            }
            Some(DepthAttachment::Renderbuffer(rb)) => gl.delete_renderbuffer(rb),
            None => {}
        }
        gl.delete_framebuffer(framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaId;
    use crate::context::{GlCall, RecordingContext};

    fn build(gl: &mut RecordingContext, textures: &mut Arena<TextureId, Texture>, targets: usize, caps: FramebufferCaps) -> Framebuffer {
        let options = FramebufferOptions { color_targets: targets, ..FramebufferOptions::default() };
        Framebuffer::new(FramebufferId::from_index(0), gl, textures, &options, caps).unwrap()
    }

    fn attachments(gl: &RecordingContext) -> Vec<GLenum> {
        gl.calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::FramebufferTexture2d(att, _, _) if *att != gl::DEPTH_ATTACHMENT => Some(*att),
                _ => None,
            })
            .collect()
    }

    // ── color targets ─────────────────────────────────────────────────────

    #[test]
    fn multiple_targets_need_draw_buffers() {
        let mut gl = RecordingContext::new(64, 32);
        let mut textures = Arena::new();
        let fb = build(&mut gl, &mut textures, 4, FramebufferCaps::default());

        assert_eq!(fb.num_color_targets(), 1);
        assert_eq!(attachments(&gl), vec![gl::COLOR_ATTACHMENT0]);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DrawBuffers(_))), 0);
    }

    #[test]
    fn draw_buffers_wire_every_target() {
        let mut gl = RecordingContext::new(64, 32);
        let mut textures = Arena::new();
        let caps = FramebufferCaps { draw_buffers: true, max_draw_buffers: 8, depth_textures: false };
        let fb = build(&mut gl, &mut textures, 4, caps);

        let expected: Vec<GLenum> = (0..4).map(|i| gl::COLOR_ATTACHMENT0 + i).collect();
        assert_eq!(fb.num_color_targets(), 4);
        assert_eq!(attachments(&gl), expected);
        assert!(gl.calls().contains(&GlCall::DrawBuffers(expected)));
        assert_eq!(gl.calls().last(), Some(&GlCall::BindFramebuffer(None)));
    }

    #[test]
    fn targets_capped_by_max_draw_buffers() {
        let mut gl = RecordingContext::new(8, 8);
        let mut textures = Arena::new();
        let caps = FramebufferCaps { draw_buffers: true, max_draw_buffers: 2, depth_textures: false };
        assert_eq!(build(&mut gl, &mut textures, 4, caps).num_color_targets(), 2);
    }

    #[test]
    fn color_textures_are_render_targets() {
        let mut gl = RecordingContext::new(64, 32);
        let mut textures = Arena::new();
        let fb = build(&mut gl, &mut textures, 1, FramebufferCaps::default());

        let color = fb.color_texture(0).and_then(|id| textures.get(id)).unwrap();
        assert_eq!(color.size(), (64, 32));
        assert!(gl.calls().contains(&GlCall::TexParameter(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::NEAREST as i32)));
        assert!(gl.calls().contains(&GlCall::TexParameter(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32)));
        assert_eq!(gl.count(|c| matches!(c, GlCall::GenerateMipmap(_))), 0);
    }

    // ── depth ─────────────────────────────────────────────────────────────

    #[test]
    fn depth_renderbuffer_without_depth_textures() {
        let mut gl = RecordingContext::new(64, 32);
        let mut textures = Arena::new();
        let fb = build(&mut gl, &mut textures, 1, FramebufferCaps::default());

        assert!(matches!(fb.depth(), Some(DepthAttachment::Renderbuffer(_))));
        assert!(fb.depth_texture().is_none());
        assert!(gl.calls().contains(&GlCall::RenderbufferStorage(gl::DEPTH_COMPONENT16, 64, 32)));
        assert_eq!(textures.len(), 1);
    }

    #[test]
    fn depth_texture_when_enabled() {
        let mut gl = RecordingContext::new(64, 32);
        let mut textures = Arena::new();
        let caps = FramebufferCaps { depth_textures: true, ..FramebufferCaps::default() };
        let fb = build(&mut gl, &mut textures, 1, caps);

        assert!(fb.depth_texture().is_some());
        assert_eq!(gl.count(|c| matches!(c, GlCall::CreateRenderbuffer(_))), 0);
        assert!(gl.calls().iter().any(|c| matches!(
            c,
            GlCall::TexImage2d { internal_format: gl::DEPTH_COMPONENT, data_type: gl::UNSIGNED_INT, .. }
        )));
        assert_eq!(textures.len(), 2);
    }

    #[test]
    fn incomplete_framebuffer_is_still_returned() {
        let mut gl = RecordingContext::new(8, 8);
        gl.set_framebuffer_status(gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT);
        let mut textures = Arena::new();
        let fb = build(&mut gl, &mut textures, 1, FramebufferCaps::default());
        assert!(fb.native().is_some());
    }

    #[test]
    fn failed_attachment_frees_partial_framebuffer() {
        let mut gl = RecordingContext::new(8, 8);
        let mut textures = Arena::new();
        let caps = FramebufferCaps { draw_buffers: true, max_draw_buffers: 4, depth_textures: false };
        let options = FramebufferOptions { color_targets: 2, ..FramebufferOptions::default() };
        // Framebuffer, first color texture, then the second one fails.
        gl.fail_nth_allocation(3);

        let result = Framebuffer::new(FramebufferId::from_index(0), &mut gl, &mut textures, &options, caps);
        assert!(result.is_err());
        assert!(textures.is_empty());
        assert_eq!(gl.count(|c| matches!(c, GlCall::CreateTexture(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteTexture(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteFramebuffer(_))), 1);
        assert_eq!(gl.calls().last(), Some(&GlCall::BindFramebuffer(None)));
    }

    #[test]
    fn failed_depth_renderbuffer_frees_color_targets() {
        let mut gl = RecordingContext::new(8, 8);
        let mut textures = Arena::new();
        let options = FramebufferOptions::default();
        // Framebuffer, color texture, then the renderbuffer fails.
        gl.fail_nth_allocation(3);

        let caps = FramebufferCaps::default();
        let result = Framebuffer::new(FramebufferId::from_index(0), &mut gl, &mut textures, &options, caps);
        assert!(result.is_err());
        assert!(textures.is_empty());
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteTexture(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteRenderbuffer(_))), 0);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteFramebuffer(_))), 1);
    }

    // ── resize / delete ───────────────────────────────────────────────────

    #[test]
    fn resize_reuploads_without_reattaching() {
        let mut gl = RecordingContext::new(64, 32);
        let mut textures = Arena::new();
        let mut fb = build(&mut gl, &mut textures, 1, FramebufferCaps::default());
        gl.take_calls();

        gl.set_drawing_buffer_size(128, 64);
        fb.resize(&mut gl, &mut textures);

        assert_eq!(fb.size(), (128, 64));
        assert_eq!(gl.count(|c| matches!(c, GlCall::FramebufferTexture2d(..))), 0);
        assert_eq!(gl.count(|c| matches!(c, GlCall::FramebufferRenderbuffer(..))), 0);
        assert!(gl.calls().iter().any(|c| matches!(c, GlCall::TexImage2d { width: 128, height: 64, .. })));
        assert!(gl.calls().contains(&GlCall::RenderbufferStorage(gl::DEPTH_COMPONENT16, 128, 64)));
    }

    #[test]
    fn delete_frees_owned_attachments() {
        let mut gl = RecordingContext::new(8, 8);
        let mut textures = Arena::new();
        let caps = FramebufferCaps { depth_textures: true, ..FramebufferCaps::default() };
        let mut fb = build(&mut gl, &mut textures, 1, caps);

        fb.delete(&mut gl, &mut textures);
        assert!(textures.is_empty());
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteTexture(_))), 2);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteFramebuffer(_))), 1);
    }
}
