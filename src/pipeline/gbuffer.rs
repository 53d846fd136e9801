//! G-buffer attachment set
//!
//! Five same-resolution images bound as one multi-target render target:
//! - slot 0: color (RGBA8)
//! - slot 1: world-space normals (RGBA16F), w is 0 where lighting is skipped
//! - slot 2: albedo (RGBA8)
//! - slot 3: world-space position (RGBA16F)
//! - depth: Depth32Float, blitted to the default target after lighting

use crate::backend::{
    BackendError, GraphicsBackend, RenderTarget, RenderTargetDescriptor, RenderTargetHandle,
    TextureDescriptor, TextureDimension, TextureFormat, TextureHandle, TextureUsage,
};
use crate::error::{RendererError, RendererResult};

use super::Frame;

/// Semantic name of a G-buffer image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color,
    Normals,
    Albedo,
    Position,
    Depth,
}

impl Attachment {
    /// Color attachments in slot order
    pub const COLOR_SLOTS: [Attachment; 4] = [
        Attachment::Color,
        Attachment::Normals,
        Attachment::Albedo,
        Attachment::Position,
    ];

    pub fn format(&self) -> TextureFormat {
        match self {
            Attachment::Color | Attachment::Albedo => TextureFormat::Rgba8Unorm,
            Attachment::Normals | Attachment::Position => TextureFormat::Rgba16Float,
            Attachment::Depth => TextureFormat::Depth32Float,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Attachment::Color => "GBuffer Color",
            Attachment::Normals => "GBuffer Normals",
            Attachment::Albedo => "GBuffer Albedo",
            Attachment::Position => "GBuffer Position",
            Attachment::Depth => "GBuffer Depth",
        }
    }
}

/// Texture units the lighting pass samples the G-buffer from
pub const LIGHTING_UNITS: [(Attachment, u32); 3] = [
    (Attachment::Position, 0),
    (Attachment::Normals, 1),
    (Attachment::Albedo, 2),
];

/// The G-buffer render target and its images
#[derive(Debug)]
pub struct AttachmentSet {
    target: RenderTargetHandle,
    color: [TextureHandle; 4],
    depth: TextureHandle,
    width: u32,
    height: u32,
}

impl AttachmentSet {
    /// Allocate every attachment at `width` x `height` and assemble the target
    pub fn build<B: GraphicsBackend>(backend: &mut B, width: u32, height: u32) -> RendererResult<Self> {
        let mut create = |attachment: Attachment| {
            backend.create_texture(&TextureDescriptor {
                label: Some(attachment.label().to_string()),
                width,
                height,
                dimension: TextureDimension::D2,
                format: attachment.format(),
                usage: TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_SRC,
            })
        };
        let color = [
            create(Attachment::Color)?,
            create(Attachment::Normals)?,
            create(Attachment::Albedo)?,
            create(Attachment::Position)?,
        ];
        let depth = create(Attachment::Depth)?;

        let set = Self::assemble(backend, color, depth)?;
        log::info!("G-buffer built at {}x{}", set.width, set.height);
        Ok(set)
    }

    /// Assemble already created images into a render target.
    ///
    /// Fails with [`RendererError::TargetIncomplete`] when the backend rejects
    /// the combination, for instance attachments of different resolutions.
    pub fn assemble<B: GraphicsBackend>(
        backend: &mut B,
        color: [TextureHandle; 4],
        depth: TextureHandle,
    ) -> RendererResult<Self> {
        let target = backend
            .create_render_target(&RenderTargetDescriptor {
                label: Some("GBuffer".into()),
                color_attachments: color.to_vec(),
                depth_attachment: Some(depth),
            })
            .map_err(|e| match e {
                BackendError::IncompleteTarget(reason) => {
                    log::error!("G-buffer incomplete: {}", reason);
                    RendererError::TargetIncomplete(reason)
                }
                other => RendererError::Backend(other),
            })?;

        let (width, height) = backend.texture_size(color[0]).unwrap_or((0, 0));
        Ok(Self {
            target,
            color,
            depth,
            width,
            height,
        })
    }

    pub fn handle(&self) -> RenderTargetHandle {
        self.target
    }

    pub fn target(&self) -> RenderTarget {
        RenderTarget::Offscreen(self.target)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn texture(&self, attachment: Attachment) -> TextureHandle {
        match attachment {
            Attachment::Color => self.color[0],
            Attachment::Normals => self.color[1],
            Attachment::Albedo => self.color[2],
            Attachment::Position => self.color[3],
            Attachment::Depth => self.depth,
        }
    }

    /// Activate the target with all four color slots as draw destinations
    pub fn bind_for_geometry_pass<B: GraphicsBackend>(&self, frame: &mut Frame<'_, B>) {
        frame.set_target(self.target());
        frame.backend().set_draw_buffers(Attachment::COLOR_SLOTS.len() as u32);
    }

    /// Activate the target writing only the color slot
    pub fn bind_for_forward_pass<B: GraphicsBackend>(&self, frame: &mut Frame<'_, B>) {
        frame.set_target(self.target());
        frame.backend().set_draw_buffers(1);
    }

    /// Bind attachments as sampled textures at the given units
    pub fn bind_attachments_as_textures<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        units: &[(Attachment, u32)],
    ) {
        for &(attachment, unit) in units {
            backend.bind_texture(unit, self.texture(attachment));
        }
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_render_target(self.target);
        for texture in self.color {
            backend.destroy_texture(texture);
        }
        backend.destroy_texture(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::backend::{AttachmentSlot, IncompleteReason};

    fn texture(backend: &mut DummyBackend, attachment: Attachment, width: u32, height: u32) -> TextureHandle {
        backend
            .create_texture(&TextureDescriptor {
                label: Some(attachment.label().into()),
                width,
                height,
                dimension: TextureDimension::D2,
                format: attachment.format(),
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            })
            .unwrap()
    }

    #[test]
    fn test_build_attaches_five_images() {
        let mut backend = DummyBackend::new(320, 240);
        let set = AttachmentSet::build(&mut backend, 320, 240).unwrap();
        assert_eq!(set.size(), (320, 240));

        let desc = backend.render_target_descriptor(set.handle()).unwrap();
        assert_eq!(desc.color_attachments.len(), 4);
        assert_eq!(desc.depth_attachment, Some(set.texture(Attachment::Depth)));
        assert_eq!(
            backend.texture_descriptor(set.texture(Attachment::Normals)).unwrap().format,
            TextureFormat::Rgba16Float
        );
        assert_eq!(
            backend.texture_descriptor(set.texture(Attachment::Albedo)).unwrap().format,
            TextureFormat::Rgba8Unorm
        );
    }

    #[test]
    fn test_destroy_releases_target_and_attachments() {
        let mut backend = DummyBackend::new(320, 240);
        let set = AttachmentSet::build(&mut backend, 320, 240).unwrap();
        let target = set.handle();
        let textures = [
            set.texture(Attachment::Color),
            set.texture(Attachment::Normals),
            set.texture(Attachment::Albedo),
            set.texture(Attachment::Position),
            set.texture(Attachment::Depth),
        ];

        set.destroy(&mut backend);
        assert!(backend.render_target_descriptor(target).is_none());
        for texture in textures {
            assert!(backend.texture_descriptor(texture).is_none());
        }
    }

    #[test]
    fn test_mismatched_resolution_is_incomplete() {
        let mut backend = DummyBackend::new(64, 64);
        let color = [
            texture(&mut backend, Attachment::Color, 64, 64),
            texture(&mut backend, Attachment::Normals, 64, 64),
            texture(&mut backend, Attachment::Albedo, 32, 64),
            texture(&mut backend, Attachment::Position, 64, 64),
        ];
        let depth = texture(&mut backend, Attachment::Depth, 64, 64);

        let err = AttachmentSet::assemble(&mut backend, color, depth).unwrap_err();
        match err {
            RendererError::TargetIncomplete(IncompleteReason::DimensionMismatch { slot, found, .. }) => {
                assert_eq!(slot, AttachmentSlot::Color(2));
                assert_eq!(found, (32, 64));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_depth_in_color_slot_is_incomplete() {
        let mut backend = DummyBackend::new(64, 64);
        let depth = texture(&mut backend, Attachment::Depth, 64, 64);
        let color = [
            texture(&mut backend, Attachment::Color, 64, 64),
            depth,
            texture(&mut backend, Attachment::Albedo, 64, 64),
            texture(&mut backend, Attachment::Position, 64, 64),
        ];

        let err = AttachmentSet::assemble(&mut backend, color, depth).unwrap_err();
        assert!(matches!(
            err,
            RendererError::TargetIncomplete(IncompleteReason::IncompleteAttachment {
                slot: AttachmentSlot::Color(1)
            })
        ));
    }
}
