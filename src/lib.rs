#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Guest surface cache for an emulated Maxwell-class GPU.
//!
//! Guest programs see textures, render targets and depth buffers as raw,
//! freely aliased byte ranges in GPU virtual memory. [`TextureCache`] keeps a
//! typed host texture for each of them and keeps the two worlds coherent:
//! it answers overlapping and reinterpreting requests with views, rebuilds
//! or reconstructions, and loads from or flushes to guest memory when it has
//! to.
//!
//! The host graphics API is abstracted behind [`TextureBackend`]; guest
//! memory behind [`GpuMemoryManager`] and [`PageTracker`].

pub mod engines;
pub mod errors;
pub mod memory;
pub mod settings;
pub mod surface;
pub mod texture_cache;
pub mod textures;

pub use engines::{FermiCopyConfig, FermiSurface, Maxwell3dState, TextureInfo};
pub use errors::{CacheError, Result};
pub use memory::{CacheAddr, GpuMemoryManager, GpuVAddr, NullPageTracker, PageTracker, VAddr, VecGpuMemory};
pub use settings::CacheSettings;
pub use surface::{ComponentType, PixelFormat, SurfaceTarget, SurfaceType};
pub use texture_cache::{
    CopyParams, SurfaceId, SurfaceParams, SurfaceSnapshot, TextureBackend, TextureCache, TextureCacheStats, ViewParams,
};
