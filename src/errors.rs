//! Error Types
//!
//! This module defines the error types used throughout the texture cache.
//!
//! # Overview
//!
//! Most of the cache never fails in the `Result` sense: guest-state anomalies
//! (unmapped addresses, zero-sized regions) degrade to empty or degenerate
//! surfaces, and algorithmic dead-ends inside the matcher are expressed as
//! `Option`. [`CacheError`] covers what is left:
//! - Guest memory accesses that fall outside mapped memory
//! - Requests naming addresses the memory manager cannot translate
//! - Out-of-range framebuffer slots
//!
//! # Usage
//!
//! ```rust,ignore
//! use tegra_texture_cache::errors::Result;
//!
//! fn flush(cache: &TextureCache<MyBackend>) -> Result<()> {
//!     cache.flush_region(0x1000, 0x4000)
//! }
//! ```

use thiserror::Error;

use crate::memory::{GpuVAddr, GuestMemoryError};

/// The main error type for the texture cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    // ========================================================================
    // Guest Memory Errors
    // ========================================================================
    /// A read or write touched guest memory that is not backed.
    #[error("Guest memory access out of bounds: gpu_addr=0x{gpu_addr:016x}, len=0x{len:x}")]
    GuestMemory {
        /// First byte of the failed access
        gpu_addr: GpuVAddr,
        /// Length of the failed access
        len: usize,
    },

    /// The GPU virtual address has no CPU or cache mapping.
    #[error("Unmapped GPU address: 0x{0:016x}")]
    UnmappedAddress(GpuVAddr),

    // ========================================================================
    // Command Processor Errors
    // ========================================================================
    /// A render target slot outside the hardware range was requested.
    #[error("Render target index out of range: {0}")]
    InvalidRenderTarget(usize),
}

impl From<GuestMemoryError> for CacheError {
    fn from(err: GuestMemoryError) -> Self {
        CacheError::GuestMemory {
            gpu_addr: err.gpu_addr,
            len: err.len,
        }
    }
}

/// Alias for `Result<T, CacheError>`.
pub type Result<T> = std::result::Result<T, CacheError>;
