//! Texture Cache Settings
//!
//! Runtime configuration for [`TextureCache`](crate::TextureCache).
//!
//! The most important knob is [`CacheSettings::accurate_gpu_emulation`], the
//! global accuracy toggle. It tightens several policy branches of the matcher
//! toward conservative behaviour at a performance cost:
//!
//! | Decision                         | Fast (default)         | Accurate                 |
//! |----------------------------------|------------------------|--------------------------|
//! | Recycle strategy                 | Ignore unless forced   | Always Flush             |
//! | Reconstruct from many overlaps   | At least one must fit  | All overlaps must fit    |
//! | Loose sub-texture rebuild        | ✅                     | ❌ (recycles instead)    |
//! | Reload contents after Ignore     | ❌                     | ✅ (when preserving)     |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tegra_texture_cache::CacheSettings;
//!
//! let settings = CacheSettings {
//!     accurate_gpu_emulation: true,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

/// Default registry page granularity: 1 MiB buckets.
pub const DEFAULT_REGISTRY_PAGE_BITS: u32 = 20;

/// Largest accepted registry page granularity. GPU virtual addresses are
/// 40 bits wide, so coarser buckets would all collapse into one.
pub const MAX_REGISTRY_PAGE_BITS: u32 = 40;

/// Configuration for a texture cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Conservative, flush-heavy matching.
    pub accurate_gpu_emulation: bool,

    /// log2 of the registry bucket size in bytes.
    ///
    /// Textures are usually large, so buckets are coarse. Only read at
    /// construction time.
    pub registry_page_bits: u32,

    /// Number of staging buffers kept for guest <-> host transfers.
    ///
    /// Buffer 0 holds host-layout data, buffer 1 holds raw guest bytes.
    pub staging_buffer_count: usize,

    /// Idle threshold applied by [`TextureCache::trim_reserve`](crate::TextureCache::trim_reserve)
    /// when called with `None`. `0` keeps the reservation pool unbounded.
    pub reserve_max_idle: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            accurate_gpu_emulation: false,
            registry_page_bits: DEFAULT_REGISTRY_PAGE_BITS,
            staging_buffer_count: 2,
            reserve_max_idle: 0,
        }
    }
}

impl CacheSettings {
    /// [`Self::registry_page_bits`] clamped to [`MAX_REGISTRY_PAGE_BITS`].
    #[inline]
    #[must_use]
    pub fn effective_registry_page_bits(&self) -> u32 {
        self.registry_page_bits.min(MAX_REGISTRY_PAGE_BITS)
    }

    /// Registry bucket size in bytes.
    #[inline]
    #[must_use]
    pub fn registry_page_size(&self) -> u64 {
        1u64 << self.effective_registry_page_bits()
    }

    /// Returns a copy with the accuracy toggle set.
    #[must_use]
    pub fn with_accurate_gpu_emulation(mut self, accurate: bool) -> Self {
        self.accurate_gpu_emulation = accurate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_one_megabyte_pages() {
        let settings = CacheSettings::default();
        assert_eq!(settings.registry_page_size(), 1 << 20);
        assert_eq!(settings.staging_buffer_count, 2);
        assert!(!settings.accurate_gpu_emulation);
    }

    #[test]
    fn oversized_page_bits_are_clamped() {
        let settings = CacheSettings {
            registry_page_bits: 64,
            ..Default::default()
        };
        assert_eq!(settings.effective_registry_page_bits(), MAX_REGISTRY_PAGE_BITS);
        assert_eq!(settings.registry_page_size(), 1 << MAX_REGISTRY_PAGE_BITS);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let settings: CacheSettings = serde_json::from_str(r#"{"accurate_gpu_emulation":true}"#).unwrap();
        assert_eq!(settings, CacheSettings::default().with_accurate_gpu_emulation(true));
    }

    #[test]
    fn serde_round_trip() {
        let settings = CacheSettings {
            accurate_gpu_emulation: true,
            registry_page_bits: 16,
            staging_buffer_count: 4,
            reserve_max_idle: 3,
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: CacheSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
