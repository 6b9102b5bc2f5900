/// Snapshot of texture cache counters, suitable for profiling and debug
/// overlays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureCacheStats {
    /// Host textures allocated through the backend.
    pub surfaces_created: u64,
    /// Pool entries handed out instead of allocating.
    pub pool_reuses: u64,
    /// Resolves answered by the exact-address fast path without a rebuild.
    pub l1_hits: u64,
    /// Resolves that returned a view of an existing surface without
    /// allocating.
    pub view_hits: u64,
    pub rebuilds: u64,
    pub reconstructions: u64,
    pub recycles: u64,
    /// Guest -> host transfers.
    pub loads: u64,
    /// Host -> guest transfers.
    pub flushes: u64,
    /// Surfaces destroyed by reservation pool trims.
    pub evictions: u64,
}
