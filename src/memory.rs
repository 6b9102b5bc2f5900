//! Guest Memory Seams
//!
//! The texture cache never owns guest memory. It talks to the surrounding
//! emulator through two small traits:
//!
//! - [`GpuMemoryManager`]: GPU virtual address translation and sized block
//!   reads/writes used by the load and flush paths.
//! - [`PageTracker`]: the rasterizer's page write-watch, told how many cached
//!   surfaces cover a CPU range so that CPU writes can be routed back into
//!   [`TextureCache::invalidate_region`](crate::TextureCache::invalidate_region).
//!
//! [`VecGpuMemory`] is a flat, contiguous implementation for tests, tools and
//! benchmarks.

use parking_lot::RwLock;
use thiserror::Error;

/// Address in the emulated GPU virtual address space.
pub type GpuVAddr = u64;
/// Host-linear address used purely as a registry key.
pub type CacheAddr = u64;
/// Address in the emulated CPU virtual address space.
pub type VAddr = u64;

/// A block access that touched unbacked guest memory.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("guest memory access out of bounds: gpu_addr=0x{gpu_addr:x}, len=0x{len:x}")]
pub struct GuestMemoryError {
    pub gpu_addr: GpuVAddr,
    pub len: usize,
}

/// GPU memory manager interface consumed by the cache.
pub trait GpuMemoryManager: Send + Sync {
    /// Translates a GPU address into the cache address space.
    /// Returns `None` when the address is unmapped.
    fn gpu_to_cache_addr(&self, gpu_addr: GpuVAddr) -> Option<CacheAddr>;

    /// Translates a GPU address into the CPU address space.
    fn gpu_to_cpu_addr(&self, gpu_addr: GpuVAddr) -> Option<VAddr>;

    /// Whether `[gpu_addr, gpu_addr + size)` is backed by one contiguous block.
    fn is_block_continuous(&self, gpu_addr: GpuVAddr, size: usize) -> bool;

    fn read_block(&self, gpu_addr: GpuVAddr, dst: &mut [u8]) -> Result<(), GuestMemoryError>;

    fn write_block(&self, gpu_addr: GpuVAddr, src: &[u8]) -> Result<(), GuestMemoryError>;
}

/// Page write-watch owned by the rasterizer.
pub trait PageTracker: Send + Sync {
    /// Adjusts the cached-surface count of every CPU page in `[cpu_addr, cpu_addr + size)`.
    fn update_pages_cached_count(&self, cpu_addr: VAddr, size: u64, delta: i32);
}

/// A page tracker that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPageTracker;

impl PageTracker for NullPageTracker {
    fn update_pages_cached_count(&self, _cpu_addr: VAddr, _size: u64, _delta: i32) {}
}

/// Simple contiguous guest memory for tests and tools.
///
/// GPU addresses in `[gpu_base, gpu_base + size)` are mapped; the same offset
/// is applied to derive cache and CPU addresses.
#[derive(Debug)]
pub struct VecGpuMemory {
    gpu_base: GpuVAddr,
    cache_base: CacheAddr,
    cpu_base: VAddr,
    mem: RwLock<Vec<u8>>,
    /// GPU addresses at which the backing store is split.
    breaks: RwLock<Vec<GpuVAddr>>,
}

impl VecGpuMemory {
    /// Maps `size` bytes at `gpu_base`, using identical cache and CPU addresses.
    #[must_use]
    pub fn new(gpu_base: GpuVAddr, size: usize) -> Self {
        Self::with_bases(gpu_base, gpu_base, gpu_base, size)
    }

    #[must_use]
    pub fn with_bases(gpu_base: GpuVAddr, cache_base: CacheAddr, cpu_base: VAddr, size: usize) -> Self {
        Self {
            gpu_base,
            cache_base,
            cpu_base,
            mem: RwLock::new(vec![0u8; size]),
            breaks: RwLock::new(Vec::new()),
        }
    }

    /// Marks `gpu_addr` as the start of a separate backing block.
    pub fn split_at(&self, gpu_addr: GpuVAddr) {
        self.breaks.write().push(gpu_addr);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.mem.read().len()
    }

    fn offset_of(&self, gpu_addr: GpuVAddr) -> Option<usize> {
        let offset = gpu_addr.checked_sub(self.gpu_base)?;
        let offset = usize::try_from(offset).ok()?;
        (offset < self.mem.read().len()).then_some(offset)
    }

    fn range_of(&self, gpu_addr: GpuVAddr, len: usize) -> Result<std::ops::Range<usize>, GuestMemoryError> {
        let err = GuestMemoryError { gpu_addr, len };
        let start = gpu_addr
            .checked_sub(self.gpu_base)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or(err.clone())?;
        let end = start.checked_add(len).ok_or(err.clone())?;
        if end > self.mem.read().len() {
            return Err(err);
        }
        Ok(start..end)
    }
}

impl GpuMemoryManager for VecGpuMemory {
    fn gpu_to_cache_addr(&self, gpu_addr: GpuVAddr) -> Option<CacheAddr> {
        self.offset_of(gpu_addr).map(|offset| self.cache_base + offset as u64)
    }

    fn gpu_to_cpu_addr(&self, gpu_addr: GpuVAddr) -> Option<VAddr> {
        self.offset_of(gpu_addr).map(|offset| self.cpu_base + offset as u64)
    }

    fn is_block_continuous(&self, gpu_addr: GpuVAddr, size: usize) -> bool {
        let Ok(range) = self.range_of(gpu_addr, size) else {
            return false;
        };
        let end = self.gpu_base + range.end as u64;
        !self
            .breaks
            .read()
            .iter()
            .any(|&split| split > gpu_addr && split < end)
    }

    fn read_block(&self, gpu_addr: GpuVAddr, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let range = self.range_of(gpu_addr, dst.len())?;
        dst.copy_from_slice(&self.mem.read()[range]);
        Ok(())
    }

    fn write_block(&self, gpu_addr: GpuVAddr, src: &[u8]) -> Result<(), GuestMemoryError> {
        let range = self.range_of(gpu_addr, src.len())?;
        self.mem.write()[range].copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_applies_the_same_offset() {
        let mem = VecGpuMemory::with_bases(0x10_0000, 0x7000_0000, 0x8000, 0x1000);
        assert_eq!(mem.gpu_to_cache_addr(0x10_0010), Some(0x7000_0010));
        assert_eq!(mem.gpu_to_cpu_addr(0x10_0010), Some(0x8010));
        assert_eq!(mem.gpu_to_cache_addr(0x10_1000), None);
        assert_eq!(mem.gpu_to_cache_addr(0xFFFF), None);
    }

    #[test]
    fn out_of_range_access_is_rejected() {
        let mem = VecGpuMemory::new(0x1000, 0x100);
        let mut buf = [0u8; 0x20];
        assert!(mem.read_block(0x10F0, &mut buf).is_err());
        assert!(mem.write_block(0x1000, &[1, 2, 3]).is_ok());
        mem.read_block(0x1000, &mut buf[..3]).unwrap();
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn split_breaks_continuity() {
        let mem = VecGpuMemory::new(0, 0x4000);
        assert!(mem.is_block_continuous(0, 0x4000));
        mem.split_at(0x2000);
        assert!(!mem.is_block_continuous(0, 0x4000));
        assert!(mem.is_block_continuous(0x2000, 0x2000));
    }
}
