//! Address Registry
//!
//! Two indices over cache addresses:
//!
//! ```text
//! l1:    cache_addr ──► SurfaceId                 exact start address hits
//! pages: cache_addr >> page_bits ──► [SurfaceId]  every page a surface touches
//! ```
//!
//! A registered surface is present in `l1` under its start address and in
//! every page bucket its byte range intersects.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::memory::CacheAddr;
use crate::settings::MAX_REGISTRY_PAGE_BITS;

use super::SurfaceId;

pub(crate) struct SurfaceRegistry {
    page_bits: u32,
    pages: FxHashMap<u64, Vec<SurfaceId>>,
    l1: FxHashMap<CacheAddr, SurfaceId>,
}

impl SurfaceRegistry {
    /// `page_bits` is clamped to [`MAX_REGISTRY_PAGE_BITS`].
    pub fn new(page_bits: u32) -> Self {
        Self {
            page_bits: page_bits.min(MAX_REGISTRY_PAGE_BITS),
            pages: FxHashMap::default(),
            l1: FxHashMap::default(),
        }
    }

    #[inline]
    fn page_range(&self, start: CacheAddr, end: CacheAddr) -> std::ops::RangeInclusive<u64> {
        (start >> self.page_bits)..=((end - 1) >> self.page_bits)
    }

    /// Indexes `id` over `[start, end)`. The L1 slot of `start` is taken over
    /// even if another surface held it.
    pub fn insert(&mut self, id: SurfaceId, start: CacheAddr, end: CacheAddr) {
        self.l1.insert(start, id);
        for page in self.page_range(start, end.max(start + 1)) {
            self.pages.entry(page).or_default().push(id);
        }
    }

    pub fn remove(&mut self, id: SurfaceId, start: CacheAddr, end: CacheAddr) {
        if self.l1.get(&start) == Some(&id) {
            self.l1.remove(&start);
        }
        for page in self.page_range(start, end.max(start + 1)) {
            if let Some(bucket) = self.pages.get_mut(&page) {
                bucket.retain(|&other| other != id);
                if bucket.is_empty() {
                    self.pages.remove(&page);
                }
            }
        }
    }

    #[inline]
    pub fn l1(&self, cache_addr: CacheAddr) -> Option<SurfaceId> {
        self.l1.get(&cache_addr).copied()
    }

    /// Every surface in a bucket of `[cache_addr, cache_addr + size)` for
    /// which `overlaps` holds, each reported once, in bucket order.
    pub fn surfaces_in_region(
        &self,
        cache_addr: CacheAddr,
        size: usize,
        mut overlaps: impl FnMut(SurfaceId) -> bool,
    ) -> Vec<SurfaceId> {
        if size == 0 {
            return Vec::new();
        }
        let mut visited = FxHashSet::default();
        let mut surfaces = Vec::new();
        for page in self.page_range(cache_addr, cache_addr + size as u64) {
            let Some(bucket) = self.pages.get(&page) else {
                continue;
            };
            for &id in bucket {
                if visited.insert(id) && overlaps(id) {
                    surfaces.push(id);
                }
            }
        }
        surfaces
    }

    #[cfg(test)]
    pub fn contains(&self, id: SurfaceId, start: CacheAddr) -> bool {
        self.pages
            .get(&(start >> self.page_bits))
            .is_some_and(|bucket| bucket.contains(&id))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn ids(n: usize) -> Vec<SurfaceId> {
        let mut map = SlotMap::<SurfaceId, ()>::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn spans_every_touched_page() {
        let id = ids(1)[0];
        let mut registry = SurfaceRegistry::new(20);
        registry.insert(id, 0xF_F000, 0x20_1000);
        assert_eq!(registry.page_count(), 3);
        assert_eq!(registry.l1(0xF_F000), Some(id));

        registry.remove(id, 0xF_F000, 0x20_1000);
        assert_eq!(registry.page_count(), 0);
        assert_eq!(registry.l1(0xF_F000), None);
    }

    #[test]
    fn region_query_reports_each_surface_once() {
        let ids = ids(2);
        let mut registry = SurfaceRegistry::new(12);
        registry.insert(ids[0], 0x0000, 0x4000);
        registry.insert(ids[1], 0x8000, 0x9000);

        let hits = registry.surfaces_in_region(0x0, 0x10000, |_| true);
        assert_eq!(hits, vec![ids[0], ids[1]]);

        let hits = registry.surfaces_in_region(0x0, 0x10000, |id| id == ids[1]);
        assert_eq!(hits, vec![ids[1]]);
        assert!(registry.surfaces_in_region(0x0, 0, |_| true).is_empty());
    }

    #[test]
    fn removing_a_shadowed_surface_keeps_the_new_l1_entry() {
        let ids = ids(2);
        let mut registry = SurfaceRegistry::new(20);
        registry.insert(ids[0], 0x1000, 0x2000);
        registry.insert(ids[1], 0x1000, 0x3000);
        registry.remove(ids[0], 0x1000, 0x2000);
        assert_eq!(registry.l1(0x1000), Some(ids[1]));
        assert!(registry.contains(ids[1], 0x1000));
        assert!(!registry.contains(ids[0], 0x1000));
    }

    #[test]
    fn oversized_page_bits_do_not_overflow_the_shift() {
        let id = ids(1)[0];
        let mut registry = SurfaceRegistry::new(64);
        registry.insert(id, 0x1000, 0x2000);
        assert_eq!(registry.page_count(), 1);
        assert_eq!(registry.surfaces_in_region(0x0, 0x10_0000, |_| true), vec![id]);
    }
}
