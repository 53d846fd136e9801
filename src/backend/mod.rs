//! Backend abstraction layer
//!
//! Provides the command-recording trait the renderer drives, the wgpu
//! implementation and a recording dummy used by tests.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use traits::*;
pub use types::*;
