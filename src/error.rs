//! Renderer and asset error types

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::{BackendError, IncompleteReason};

/// Errors raised while loading files from disk
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to import model {path}: {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("Cube map face {path} does not match the size of the first face")]
    CubeFaceMismatch { path: PathBuf },
}

/// Renderer error type
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Uniform allocator overflow: {head} + {requested} bytes exceeds capacity {capacity}")]
    UniformCapacity {
        head: u64,
        requested: u64,
        capacity: u64,
    },
    #[error("Uniform allocator written outside of a frame")]
    NotMapped,
    #[error("Render target incomplete: {0}")]
    TargetIncomplete(IncompleteReason),
    #[error("Program '{program}' expects vertex input @location({location}) which mesh '{mesh}' does not provide")]
    LayoutMismatch {
        program: String,
        mesh: String,
        location: u32,
    },
    #[error("Failed to compile program '{name}':\n{message}")]
    ShaderCompile { name: String, message: String },
    #[error(transparent)]
    Asset(#[from] AssetError),
}

pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_mismatch_names_the_pair() {
        let err = RendererError::LayoutMismatch {
            program: "geometry".into(),
            mesh: "quad".into(),
            location: 3,
        };
        assert_eq!(
            err.to_string(),
            "Program 'geometry' expects vertex input @location(3) which mesh 'quad' does not provide"
        );
    }

    #[test]
    fn test_backend_error_converts() {
        let err: RendererError = BackendError::SurfaceLost.into();
        assert!(matches!(err, RendererError::Backend(BackendError::SurfaceLost)));
    }
}
