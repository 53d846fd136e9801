//! Texture loading and management

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::backend::{
    GraphicsBackend, TextureDescriptor, TextureDimension, TextureFormat, TextureHandle,
    TextureUsage,
};
use crate::error::{AssetError, RendererResult};

/// Cube map face files in layer order
pub const CUBE_FACES: [&str; 6] = [
    "top.jpg",
    "bottom.jpg",
    "left.jpg",
    "right.jpg",
    "front.jpg",
    "back.jpg",
];

/// Index of a texture inside a [`TextureRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(usize);

/// A texture resident on the GPU
#[derive(Debug, Clone)]
pub struct Texture {
    pub path: PathBuf,
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
}

fn read_image(path: &Path) -> Result<DynamicImage, AssetError> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    image::load_from_memory(&bytes).map_err(|source| AssetError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Create a 1x1 texture of a single color
pub fn solid_texture<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    dimension: TextureDimension,
    color: [u8; 4],
) -> RendererResult<TextureHandle> {
    let handle = backend.create_texture(&TextureDescriptor {
        label: Some(label.to_string()),
        dimension,
        ..Default::default()
    })?;
    for layer in 0..dimension.layer_count() {
        backend.write_texture(handle, layer, &color, 1, 1);
    }
    Ok(handle)
}

/// Path-deduplicated texture store with a white fallback
#[derive(Debug)]
pub struct TextureRegistry {
    textures: Vec<Texture>,
    white: TextureHandle,
}

impl TextureRegistry {
    pub fn new<B: GraphicsBackend>(backend: &mut B) -> RendererResult<Self> {
        let white = solid_texture(backend, "White", TextureDimension::D2, [255; 4])?;
        Ok(Self {
            textures: Vec::new(),
            white,
        })
    }

    /// Texture used wherever a load failed or nothing is assigned
    pub fn white(&self) -> TextureHandle {
        self.white
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn get(&self, id: TextureId) -> &Texture {
        &self.textures[id.0]
    }

    pub fn handle(&self, id: TextureId) -> TextureHandle {
        self.textures[id.0].handle
    }

    /// Handle for an optional id, falling back to white
    pub fn handle_or_white(&self, id: Option<TextureId>) -> TextureHandle {
        id.map(|id| self.handle(id)).unwrap_or(self.white)
    }

    pub fn find(&self, path: &Path) -> Option<TextureId> {
        self.textures
            .iter()
            .position(|t| t.path == path)
            .map(TextureId)
    }

    /// Load a 2D texture, returning the existing entry if `path` was loaded
    /// before. Rows are flipped so the first row in memory is the bottom of
    /// the image. A failed load leaves the registry untouched.
    pub fn load_2d<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        path: &Path,
    ) -> RendererResult<TextureId> {
        if let Some(id) = self.find(path) {
            return Ok(id);
        }

        let image = read_image(path)?.flipv().to_rgba8();
        let (width, height) = image.dimensions();
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(path.display().to_string()),
            width,
            height,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        backend.write_texture(handle, 0, image.as_raw(), width, height);

        log::info!("Loaded texture {} ({}x{})", path.display(), width, height);
        self.textures.push(Texture {
            path: path.to_path_buf(),
            handle,
            width,
            height,
            dimension: TextureDimension::D2,
        });
        Ok(TextureId(self.textures.len() - 1))
    }

    /// Load six images from `dir` into the layers of a cube map, in the
    /// order given. Every face must have the size of the first.
    pub fn load_cube<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        dir: &Path,
        faces: &[&str; 6],
    ) -> RendererResult<TextureId> {
        if let Some(id) = self.find(dir) {
            return Ok(id);
        }

        let mut images: Vec<image::RgbaImage> = Vec::with_capacity(faces.len());
        for face in faces {
            let path = dir.join(face);
            let image = read_image(&path)?.to_rgba8();
            if images.first().is_some_and(|first| first.dimensions() != image.dimensions()) {
                return Err(AssetError::CubeFaceMismatch { path }.into());
            }
            images.push(image);
        }

        let (width, height) = images[0].dimensions();
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(dir.display().to_string()),
            width,
            height,
            dimension: TextureDimension::Cube,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        for (layer, image) in images.iter().enumerate() {
            backend.write_texture(handle, layer as u32, image.as_raw(), width, height);
        }

        log::info!("Loaded cube map {} ({}x{})", dir.display(), width, height);
        self.textures.push(Texture {
            path: dir.to_path_buf(),
            handle,
            width,
            height,
            dimension: TextureDimension::Cube,
        });
        Ok(TextureId(self.textures.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::error::RendererError;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_adds_no_entry() {
        let mut backend = DummyBackend::new(64, 64);
        let mut registry = TextureRegistry::new(&mut backend).unwrap();

        let result = registry.load_2d(&mut backend, Path::new("no/such/texture.png"));

        assert!(matches!(
            result,
            Err(RendererError::Asset(AssetError::Io { .. }))
        ));
        assert_eq!(registry.len(), 0);
        assert!(registry.find(Path::new("no/such/texture.png")).is_none());
    }

    #[test]
    fn test_load_is_deduplicated_by_path() {
        let dir = temp_dir("texture_dedup");
        let path = dir.join("checker.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let mut backend = DummyBackend::new(64, 64);
        let mut registry = TextureRegistry::new(&mut backend).unwrap();
        let first = registry.load_2d(&mut backend, &path).unwrap();
        let second = registry.load_2d(&mut backend, &path).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!((registry.get(first).width, registry.get(first).height), (4, 2));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_garbage_file_is_decode_error() {
        let dir = temp_dir("texture_garbage");
        let path = dir.join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let mut backend = DummyBackend::new(64, 64);
        let mut registry = TextureRegistry::new(&mut backend).unwrap();
        let result = registry.load_2d(&mut backend, &path);

        assert!(matches!(
            result,
            Err(RendererError::Asset(AssetError::Image { .. }))
        ));
        assert!(registry.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_cube_faces_must_match() {
        let dir = temp_dir("texture_cube");
        for (i, face) in CUBE_FACES.iter().enumerate() {
            let size = if i == 4 { 4 } else { 2 };
            image::RgbImage::new(size, size).save(dir.join(face)).unwrap();
        }

        let mut backend = DummyBackend::new(64, 64);
        let mut registry = TextureRegistry::new(&mut backend).unwrap();
        let result = registry.load_cube(&mut backend, &dir, &CUBE_FACES);

        match result {
            Err(RendererError::Asset(AssetError::CubeFaceMismatch { path })) => {
                assert!(path.ends_with("front.jpg"));
            }
            other => panic!("unexpected result {other:?}"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_cube_has_six_layers() {
        let dir = temp_dir("texture_cube_ok");
        for face in CUBE_FACES {
            image::RgbImage::new(2, 2).save(dir.join(face)).unwrap();
        }

        let mut backend = DummyBackend::new(64, 64);
        let mut registry = TextureRegistry::new(&mut backend).unwrap();
        let id = registry.load_cube(&mut backend, &dir, &CUBE_FACES).unwrap();

        let desc = backend.texture_descriptor(registry.handle(id)).unwrap();
        assert_eq!(desc.dimension, TextureDimension::Cube);
        std::fs::remove_dir_all(&dir).ok();
    }
}
