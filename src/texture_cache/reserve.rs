//! Surface Reservation Pool
//!
//! Unregistered surfaces are kept here, keyed by their exact
//! [`SurfaceParams`], so that recurring shapes reuse host storage instead of
//! reallocating it. An entry is handed out only while its surface is not
//! registered; entries stay in the pool after being handed out.
//!
//! The pool grows without bound unless [`SurfaceReserve::trim`] is called.

use rustc_hash::FxHashMap;

use super::SurfaceId;
use super::params::SurfaceParams;

struct ReserveEntry {
    id: SurfaceId,
    /// Trim passes survived while idle.
    idle_trims: u32,
}

#[derive(Default)]
pub(crate) struct SurfaceReserve {
    entries: FxHashMap<SurfaceParams, Vec<ReserveEntry>>,
}

impl SurfaceReserve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` under `params` unless it is already pooled there.
    pub fn reserve(&mut self, params: SurfaceParams, id: SurfaceId) {
        let bucket = self.entries.entry(params).or_default();
        if !bucket.iter().any(|entry| entry.id == id) {
            bucket.push(ReserveEntry { id, idle_trims: 0 });
        }
    }

    /// First pooled surface for `params` that `is_free` accepts.
    pub fn find(&mut self, params: &SurfaceParams, mut is_free: impl FnMut(SurfaceId) -> bool) -> Option<SurfaceId> {
        let entry = self.entries.get_mut(params)?.iter_mut().find(|entry| is_free(entry.id))?;
        entry.idle_trims = 0;
        Some(entry.id)
    }

    /// Ages every idle entry and evicts those idle for more than `max_idle`
    /// passes. Entries for which `in_use` holds are reset instead.
    ///
    /// Returns the evicted ids; the caller destroys the surfaces.
    pub fn trim(&mut self, max_idle: u32, mut in_use: impl FnMut(SurfaceId) -> bool) -> Vec<SurfaceId> {
        let mut evicted = Vec::new();
        for bucket in self.entries.values_mut() {
            bucket.retain_mut(|entry| {
                if in_use(entry.id) {
                    entry.idle_trims = 0;
                    return true;
                }
                entry.idle_trims += 1;
                if entry.idle_trims > max_idle {
                    evicted.push(entry.id);
                    return false;
                }
                true
            });
        }
        self.entries.retain(|_, bucket| !bucket.is_empty());
        evicted
    }

    #[cfg(test)]
    pub fn contains(&self, params: &SurfaceParams, id: SurfaceId) -> bool {
        self.entries
            .get(params)
            .is_some_and(|bucket| bucket.iter().any(|entry| entry.id == id))
    }

    /// Total number of pooled entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}
