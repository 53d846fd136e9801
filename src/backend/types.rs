//! Common types shared between backends

use std::collections::HashMap;
use std::fmt;

use super::traits::{BufferHandle, RenderTargetHandle, TextureHandle};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    /// Six square 2D layers addressed by direction
    Cube,
}

impl TextureDimension {
    pub fn layer_count(&self) -> u32 {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_DST: Self = Self(1 << 0);
    pub const INDEX: Self = Self(1 << 1);
    pub const VERTEX: Self = Self(1 << 2);
    pub const UNIFORM: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Limits the pipeline needs to respect when packing uniform data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendLimits {
    /// Required alignment of every bound uniform range offset
    pub uniform_offset_alignment: u64,
    /// Largest uniform range a single binding may cover
    pub max_uniform_block_size: u64,
    /// Number of color slots a render target may have
    pub max_color_attachments: u32,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            uniform_offset_alignment: 256,
            max_uniform_block_size: 64 * 1024,
            max_color_attachments: 8,
        }
    }
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        self.components() as u64 * 4
    }

    pub fn components(&self) -> u32 {
        match self {
            VertexFormat::Float32 => 1,
            VertexFormat::Float32x2 => 2,
            VertexFormat::Float32x3 => 3,
            VertexFormat::Float32x4 => 4,
        }
    }

    pub fn from_components(count: u32) -> Option<Self> {
        match count {
            1 => Some(VertexFormat::Float32),
            2 => Some(VertexFormat::Float32x2),
            3 => Some(VertexFormat::Float32x3),
            4 => Some(VertexFormat::Float32x4),
            _ => None,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Describes how a vertex buffer range feeds a program's inputs.
///
/// The effective byte offset of an attribute inside `vertex_buffer` is
/// `base_offset + attribute.offset`.
#[derive(Debug, Clone)]
pub struct VertexBindingDescriptor {
    pub label: Option<String>,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    pub stride: u64,
    pub base_offset: u64,
    pub attributes: Vec<VertexAttribute>,
}

/// Index element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn size(&self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// Compare function for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Depth test configuration applied to subsequent draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub compare: CompareFunction,
    pub write: bool,
}

impl DepthState {
    /// Regular opaque geometry
    pub const LESS: Self = Self {
        compare: CompareFunction::Less,
        write: true,
    };

    /// Background that only fills untouched depth
    pub const LESS_EQUAL_NO_WRITE: Self = Self {
        compare: CompareFunction::LessEqual,
        write: false,
    };

    /// Fullscreen passes that ignore depth entirely
    pub const DISABLED: Self = Self {
        compare: CompareFunction::Always,
        write: false,
    };
}

impl Default for DepthState {
    fn default() -> Self {
        Self::LESS
    }
}

/// Filter mode for samplers and blits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Which image data a blit transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlitMask {
    Color,
    Depth,
}

/// Destination of draw commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTarget {
    /// The swapchain image plus the backend-owned depth buffer
    #[default]
    Default,
    Offscreen(RenderTargetHandle),
}

/// Multi-attachment render target descriptor. Color slots are attached in order.
#[derive(Debug, Clone, Default)]
pub struct RenderTargetDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<TextureHandle>,
    pub depth_attachment: Option<TextureHandle>,
}

/// What a backend knows about a texture proposed as an attachment
#[derive(Debug, Clone, Copy)]
pub struct AttachmentInfo {
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
}

/// Why a render target was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteReason {
    /// No attachments at all
    MissingAttachment,
    /// An attachment has the wrong usage or format class for its slot
    IncompleteAttachment { slot: AttachmentSlot },
    /// Attachments disagree on resolution
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
        slot: AttachmentSlot,
    },
    /// More color slots than the backend supports
    Unsupported { color_slots: usize, max: u32 },
    /// A handle that does not name a live texture
    InvalidTexture { slot: AttachmentSlot },
}

/// Attachment position inside a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSlot {
    Color(u32),
    Depth,
}

impl fmt::Display for AttachmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentSlot::Color(i) => write!(f, "color slot {}", i),
            AttachmentSlot::Depth => write!(f, "depth slot"),
        }
    }
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncompleteReason::MissingAttachment => write!(f, "missing attachment"),
            IncompleteReason::IncompleteAttachment { slot } => {
                write!(f, "incomplete attachment at {}", slot)
            }
            IncompleteReason::DimensionMismatch {
                expected,
                found,
                slot,
            } => write!(
                f,
                "{} is {}x{} but the target is {}x{}",
                slot, found.0, found.1, expected.0, expected.1
            ),
            IncompleteReason::Unsupported { color_slots, max } => {
                write!(f, "unsupported: {} color slots, at most {}", color_slots, max)
            }
            IncompleteReason::InvalidTexture { slot } => {
                write!(f, "unknown texture at {}", slot)
            }
        }
    }
}

/// Check that a set of attachments forms a complete render target.
///
/// Shared by every backend so completeness means the same thing everywhere.
pub fn validate_attachments(
    colors: &[Option<AttachmentInfo>],
    depth: Option<Option<AttachmentInfo>>,
    max_color_attachments: u32,
) -> Result<(u32, u32), IncompleteReason> {
    if colors.is_empty() && depth.is_none() {
        return Err(IncompleteReason::MissingAttachment);
    }
    if colors.len() > max_color_attachments as usize {
        return Err(IncompleteReason::Unsupported {
            color_slots: colors.len(),
            max: max_color_attachments,
        });
    }

    let mut slots: Vec<(AttachmentSlot, Option<AttachmentInfo>)> = colors
        .iter()
        .enumerate()
        .map(|(i, info)| (AttachmentSlot::Color(i as u32), *info))
        .collect();
    if let Some(info) = depth {
        slots.push((AttachmentSlot::Depth, info));
    }

    let mut resolution = None;
    for (slot, info) in slots {
        let info = info.ok_or(IncompleteReason::InvalidTexture { slot })?;
        let wants_depth = slot == AttachmentSlot::Depth;
        if info.format.is_depth() != wants_depth
            || !info.usage.contains(TextureUsage::RENDER_ATTACHMENT)
            || info.dimension != TextureDimension::D2
        {
            return Err(IncompleteReason::IncompleteAttachment { slot });
        }
        match resolution {
            None => resolution = Some((info.width, info.height)),
            Some(expected) if expected != (info.width, info.height) => {
                return Err(IncompleteReason::DimensionMismatch {
                    expected,
                    found: (info.width, info.height),
                    slot,
                });
            }
            Some(_) => {}
        }
    }

    resolution.ok_or(IncompleteReason::MissingAttachment)
}

/// A vertex input a program expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderAttribute {
    pub location: u32,
    pub components: u32,
}

/// A uniform block a program reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBlockInfo {
    pub binding: u32,
    pub size: u64,
}

/// A texture unit a program samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSlotInfo {
    pub unit: u32,
    pub dimension: TextureDimension,
}

/// Reflected interface of a program, resolved once at load time
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    /// Vertex inputs in ascending location order
    pub vertex_inputs: Vec<ShaderAttribute>,
    pub uniform_blocks: Vec<UniformBlockInfo>,
    pub textures: Vec<TextureSlotInfo>,
    /// Sampler bindings in the texture group
    pub samplers: Vec<u32>,
    /// Resource variable name to its binding or unit
    pub locations: HashMap<String, u32>,
}

impl ShaderReflection {
    pub fn uniform_block(&self, binding: u32) -> Option<UniformBlockInfo> {
        self.uniform_blocks
            .iter()
            .copied()
            .find(|b| b.binding == binding)
    }

    pub fn location(&self, name: &str) -> Option<u32> {
        self.locations.get(name).copied()
    }
}

/// Program creation descriptor. The source is WGSL with `vs_main`/`fs_main`.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: Option<String>,
    pub source: String,
    pub reflection: ShaderReflection,
    /// Number of color outputs the fragment stage writes
    pub color_outputs: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(format: TextureFormat, width: u32, height: u32) -> Option<AttachmentInfo> {
        Some(AttachmentInfo {
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            width,
            height,
            dimension: TextureDimension::D2,
        })
    }

    #[test]
    fn test_validate_complete_target() {
        let colors = [
            attachment(TextureFormat::Rgba8Unorm, 64, 32),
            attachment(TextureFormat::Rgba16Float, 64, 32),
        ];
        let depth = Some(attachment(TextureFormat::Depth32Float, 64, 32));
        assert_eq!(validate_attachments(&colors, depth, 8), Ok((64, 32)));
    }

    #[test]
    fn test_validate_rejects_mismatched_resolution() {
        let colors = [
            attachment(TextureFormat::Rgba8Unorm, 64, 32),
            attachment(TextureFormat::Rgba16Float, 32, 32),
        ];
        let result = validate_attachments(&colors, None, 8);
        assert_eq!(
            result,
            Err(IncompleteReason::DimensionMismatch {
                expected: (64, 32),
                found: (32, 32),
                slot: AttachmentSlot::Color(1),
            })
        );
    }

    #[test]
    fn test_validate_rejects_depth_in_color_slot() {
        let colors = [attachment(TextureFormat::Depth32Float, 16, 16)];
        assert_eq!(
            validate_attachments(&colors, None, 8),
            Err(IncompleteReason::IncompleteAttachment {
                slot: AttachmentSlot::Color(0)
            })
        );
    }

    #[test]
    fn test_validate_empty_and_oversized() {
        assert_eq!(
            validate_attachments(&[], None, 8),
            Err(IncompleteReason::MissingAttachment)
        );
        let colors = vec![attachment(TextureFormat::Rgba8Unorm, 4, 4); 3];
        assert!(matches!(
            validate_attachments(&colors, None, 2),
            Err(IncompleteReason::Unsupported { color_slots: 3, max: 2 })
        ));
    }

    #[test]
    fn test_incomplete_reason_display() {
        let reason = IncompleteReason::DimensionMismatch {
            expected: (800, 600),
            found: (400, 300),
            slot: AttachmentSlot::Depth,
        };
        assert_eq!(
            reason.to_string(),
            "depth slot is 400x300 but the target is 800x600"
        );
    }
}
