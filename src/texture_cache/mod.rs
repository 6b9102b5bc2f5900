//! Texture Cache
//!
//! Reconciles the guest GPU's view of textures and render targets (plain
//! byte ranges in GPU virtual memory, freely aliased and reinterpreted) with
//! strongly typed, non-aliasing host textures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── TextureCache<B> ─────────────────────────┐
//! │ Mutex<CacheState<B>>                                             │
//! │                                                                  │
//! │  surfaces:  SlotMap<SurfaceId, Surface<B>>   (owns host storage) │
//! │  registry:  L1 exact map + page buckets      (registered ids)    │
//! │  reserve:   SurfaceParams -> [SurfaceId]     (unregistered ids)  │
//! │  slots:     8 color targets + depth          (pinned ids/views)  │
//! │  sampled:   [SurfaceId]                      (per-draw list)     │
//! │  staging:   host / guest transfer buffers                        │
//! └──────────────────────────────────────────────────────────────────┘
//!                  │ create / copy / blit / upload / download
//!                  ▼
//!           B: TextureBackend
//! ```
//!
//! Every public method takes the lock once; the resolution algorithms in
//! `resolve` run on the locked state and never re-enter the public API.
//!
//! # Resolution
//!
//! A request `(gpu_addr, SurfaceParams)` is resolved by an escalation
//! ladder: exact address hit, view of an overlapping surface, rebuild of a
//! structurally similar surface, reconstruction from several smaller
//! surfaces, and finally recycling, which always succeeds.

mod backend;
mod copy_params;
mod params;
mod registry;
mod reserve;
mod resolve;
mod staging;
mod stats;
mod surface;
mod view;

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use slotmap::{SlotMap, new_key_type};

pub use backend::TextureBackend;
pub use copy_params::CopyParams;
pub use params::SurfaceParams;
pub use staging::StagingCache;
pub use stats::TextureCacheStats;
pub use surface::{MatchStructureResult, MatchTopologyResult, Surface, SurfaceFlags};
pub use view::ViewParams;

use registry::SurfaceRegistry;
use reserve::SurfaceReserve;

use crate::engines::{
    DirtyFlags, FermiCopyConfig, FermiSurface, Maxwell3dState, NUM_RENDER_TARGETS, TextureInfo,
};
use crate::errors::{CacheError, Result};
use crate::memory::{CacheAddr, GpuMemoryManager, GpuVAddr, PageTracker, VAddr};
use crate::settings::CacheSettings;
use crate::surface::SiblingTable;

new_key_type! {
    /// Handle to a surface owned by a [`TextureCache`].
    pub struct SurfaceId;
}

/// Point-in-time copy of a surface's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub id: SurfaceId,
    pub gpu_addr: GpuVAddr,
    pub cache_addr: CacheAddr,
    pub cpu_addr: VAddr,
    pub params: SurfaceParams,
    pub flags: SurfaceFlags,
    pub modification_tick: u64,
    pub size_in_bytes: usize,
}

impl SurfaceSnapshot {
    fn of<B: TextureBackend>(id: SurfaceId, surface: &Surface<B>) -> Self {
        Self {
            id,
            gpu_addr: surface.gpu_addr(),
            cache_addr: surface.cache_addr(),
            cpu_addr: surface.cpu_addr(),
            params: *surface.params(),
            flags: surface.flags(),
            modification_tick: surface.modification_tick(),
            size_in_bytes: surface.size_in_bytes(),
        }
    }
}

/// A pinned framebuffer slot.
struct FramebufferTargetInfo<V> {
    target: Option<SurfaceId>,
    view: Option<V>,
}

impl<V> FramebufferTargetInfo<V> {
    const fn empty() -> Self {
        Self { target: None, view: None }
    }
}

pub(crate) struct CacheState<B: TextureBackend> {
    backend: B,
    memory: Arc<dyn GpuMemoryManager>,
    tracker: Arc<dyn PageTracker>,
    settings: CacheSettings,

    surfaces: SlotMap<SurfaceId, Surface<B>>,
    registry: SurfaceRegistry,
    reserve: SurfaceReserve,
    siblings: SiblingTable,
    staging: StagingCache,

    render_targets: [FramebufferTargetInfo<B::View>; NUM_RENDER_TARGETS],
    depth_buffer: FramebufferTargetInfo<B::View>,
    sampled_textures: Vec<SurfaceId>,

    guard_render_targets: bool,
    guard_samplers: bool,
    ticks: u64,
    stats: TextureCacheStats,
}

impl<B: TextureBackend> CacheState<B> {
    fn set_render_target_flag(&mut self, id: Option<SurfaceId>, render_target: bool) {
        if let Some(surface) = id.and_then(|id| self.surfaces.get_mut(id)) {
            surface.mark_as_render_target(render_target);
        }
    }

    fn set_empty_color_buffer(&mut self, index: usize) {
        let Some(target) = self.render_targets[index].target.take() else {
            return;
        };
        self.set_render_target_flag(Some(target), false);
        self.render_targets[index].view = None;
    }

    fn set_empty_depth_buffer(&mut self) {
        let Some(target) = self.depth_buffer.target.take() else {
            return;
        };
        self.set_render_target_flag(Some(target), false);
        self.depth_buffer.view = None;
    }

    /// View a color slot binds: the resolved view, or the layers from the
    /// programmed base layer on when a layered target starts past layer 0.
    fn render_target_view(&mut self, id: SurfaceId, view: B::View, base_layer: u32) -> B::View {
        let surface = &mut self.surfaces[id];
        let params = *surface.params();
        if base_layer == 0 || !params.is_layered || base_layer >= params.num_layers() {
            return view;
        }
        let slot_view = ViewParams::new(params.target, base_layer, params.num_layers() - base_layer, 0, params.num_levels);
        surface.get_view(&mut self.backend, slot_view)
    }

    fn is_pinned(&self, id: SurfaceId) -> bool {
        self.render_targets.iter().any(|slot| slot.target == Some(id))
            || self.depth_buffer.target == Some(id)
            || self.sampled_textures.contains(&id)
    }
}

/// Guest-addressed cache of host textures.
///
/// Generic over the host backend; see [`TextureBackend`].
pub struct TextureCache<B: TextureBackend> {
    state: Mutex<CacheState<B>>,
}

impl<B: TextureBackend> TextureCache<B> {
    pub fn new(
        backend: B,
        memory: Arc<dyn GpuMemoryManager>,
        tracker: Arc<dyn PageTracker>,
        settings: CacheSettings,
    ) -> Self {
        if settings.registry_page_bits != settings.effective_registry_page_bits() {
            log::warn!(
                "registry_page_bits={} is out of range, using {}",
                settings.registry_page_bits,
                settings.effective_registry_page_bits()
            );
        }
        let state = CacheState {
            backend,
            memory,
            tracker,
            settings,
            surfaces: SlotMap::with_key(),
            registry: SurfaceRegistry::new(settings.effective_registry_page_bits()),
            reserve: SurfaceReserve::new(),
            siblings: SiblingTable::maxwell(),
            staging: StagingCache::new(settings.staging_buffer_count),
            render_targets: std::array::from_fn(|_| FramebufferTargetInfo::empty()),
            depth_buffer: FramebufferTargetInfo::empty(),
            sampled_textures: Vec::with_capacity(64),
            guard_render_targets: false,
            guard_samplers: false,
            ticks: 0,
            stats: TextureCacheStats::default(),
        };
        Self { state: Mutex::new(state) }
    }

    // ─── Invalidation & Flushing ──────────────────────────────────────────

    /// Unregisters every surface overlapping `[cache_addr, cache_addr + size)`.
    ///
    /// Render targets survive while render targets are guarded.
    pub fn invalidate_region(&self, cache_addr: CacheAddr, size: usize) {
        let mut state = self.state.lock();
        for id in state.surfaces_in_region(cache_addr, size) {
            state.unregister(id);
        }
    }

    /// Writes every modified surface overlapping the range back to guest
    /// memory, oldest modification first.
    pub fn flush_region(&self, cache_addr: CacheAddr, size: usize) -> Result<()> {
        let mut state = self.state.lock();
        let mut surfaces = state.surfaces_in_region(cache_addr, size);
        if surfaces.is_empty() {
            return Ok(());
        }
        surfaces.sort_by_key(|&id| state.surfaces[id].modification_tick());
        for id in surfaces {
            state.flush_surface(id)?;
        }
        Ok(())
    }

    /// [`Self::flush_region`] addressed in GPU virtual memory.
    pub fn flush_gpu_region(&self, gpu_addr: GpuVAddr, size: usize) -> Result<()> {
        let cache_addr = self
            .state
            .lock()
            .memory
            .gpu_to_cache_addr(gpu_addr)
            .ok_or(CacheError::UnmappedAddress(gpu_addr))?;
        self.flush_region(cache_addr, size)
    }

    // ─── Guards ───────────────────────────────────────────────────────────

    /// While set, bound render targets cannot be unregistered.
    pub fn guard_render_targets(&self, guard: bool) {
        self.state.lock().guard_render_targets = guard;
    }

    /// While set, sampled surfaces are recorded for [`Self::texture_barrier`].
    pub fn guard_samplers(&self, guard: bool) {
        self.state.lock().guard_samplers = guard;
    }

    // ─── Resolution Entry Points ──────────────────────────────────────────

    /// Resolves a sampled texture. Returns `None` for a null address.
    pub fn get_texture_surface(&self, info: &TextureInfo) -> Option<B::View> {
        if info.address == 0 {
            return None;
        }
        let mut state = self.state.lock();
        let params = SurfaceParams::for_texture(info);
        let (id, view) = state.get_surface(info.address, &params, true, false);
        if state.guard_samplers {
            state.sampled_textures.push(id);
        }
        Some(view)
    }

    /// Whether any surface sampled since the last call is bound as a render
    /// target. Clears the sampled list.
    pub fn texture_barrier(&self) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let any_render_target = state
            .sampled_textures
            .iter()
            .any(|&id| state.surfaces.get(id).is_some_and(Surface::is_render_target));
        state.sampled_textures.clear();
        any_render_target
    }

    /// Resolves the depth buffer slot. Returns the pinned view untouched when
    /// the slot is not dirty.
    pub fn get_depth_buffer_surface(&self, maxwell3d: &mut Maxwell3dState, preserve_contents: bool) -> Option<B::View> {
        let mut state = self.state.lock();
        if !maxwell3d.dirty_flags.contains(DirtyFlags::ZETA_BUFFER) {
            return state.depth_buffer.view.clone();
        }
        maxwell3d.dirty_flags.remove(DirtyFlags::ZETA_BUFFER);

        let regs = &maxwell3d.regs;
        let gpu_addr = regs.zeta.address;
        if gpu_addr == 0 || !regs.zeta_enable {
            state.set_empty_depth_buffer();
            return None;
        }
        let params =
            SurfaceParams::for_depth_buffer(regs.zeta_width, regs.zeta_height, regs.zeta.format, regs.zeta.memory_layout);
        let (id, view) = state.get_surface(gpu_addr, &params, preserve_contents, true);

        let previous = state.depth_buffer.target;
        state.set_render_target_flag(previous, false);
        state.depth_buffer = FramebufferTargetInfo {
            target: Some(id),
            view: Some(view.clone()),
        };
        state.set_render_target_flag(Some(id), true);
        Some(view)
    }

    /// Resolves color slot `index`. Returns the pinned view untouched when
    /// the slot is not dirty.
    pub fn get_color_buffer_surface(
        &self,
        maxwell3d: &mut Maxwell3dState,
        index: usize,
        preserve_contents: bool,
    ) -> Result<Option<B::View>> {
        if index >= NUM_RENDER_TARGETS {
            return Err(CacheError::InvalidRenderTarget(index));
        }
        let mut state = self.state.lock();
        let dirty = DirtyFlags::color_buffer(index);
        if !maxwell3d.dirty_flags.contains(dirty) {
            return Ok(state.render_targets[index].view.clone());
        }
        maxwell3d.dirty_flags.remove(dirty);

        let regs = &maxwell3d.regs;
        let config = regs.rt[index];
        let format = match config.format {
            Some(format) if index < regs.rt_count && config.address != 0 => format,
            _ => {
                state.set_empty_color_buffer(index);
                return Ok(None);
            }
        };
        let params = SurfaceParams::for_framebuffer(&config, format);
        let (id, view) = state.get_surface(config.address, &params, preserve_contents, true);
        let view = state.render_target_view(id, view, params.base_layer);

        let previous = state.render_targets[index].target;
        state.set_render_target_flag(previous, false);
        state.render_targets[index] = FramebufferTargetInfo {
            target: Some(id),
            view: Some(view.clone()),
        };
        state.set_render_target_flag(Some(id), true);
        Ok(Some(view))
    }

    /// Records that a draw or clear wrote color slot `index`.
    pub fn mark_color_buffer_in_use(&self, index: usize) -> Result<()> {
        if index >= NUM_RENDER_TARGETS {
            return Err(CacheError::InvalidRenderTarget(index));
        }
        let mut state = self.state.lock();
        if let Some(id) = state.render_targets[index].target {
            let tick = state.next_tick();
            if let Some(surface) = state.surfaces.get_mut(id) {
                surface.mark_as_modified(true, tick);
            }
        }
        Ok(())
    }

    /// Records that a draw or clear wrote the depth buffer.
    pub fn mark_depth_buffer_in_use(&self) {
        let mut state = self.state.lock();
        if let Some(id) = state.depth_buffer.target {
            let tick = state.next_tick();
            if let Some(surface) = state.surfaces.get_mut(id) {
                surface.mark_as_modified(true, tick);
            }
        }
    }

    /// Unbinds color slot `index`, demoting its surface.
    pub fn set_empty_color_buffer(&self, index: usize) -> Result<()> {
        if index >= NUM_RENDER_TARGETS {
            return Err(CacheError::InvalidRenderTarget(index));
        }
        self.state.lock().set_empty_color_buffer(index);
        Ok(())
    }

    /// Unbinds the depth slot, demoting its surface.
    pub fn set_empty_depth_buffer(&self) {
        self.state.lock().set_empty_depth_buffer();
    }

    /// 2D engine copy: resolves destination then source, blits, and marks
    /// the destination modified.
    pub fn do_fermi_copy(&self, src_config: &FermiSurface, dst_config: &FermiSurface, copy_config: &FermiCopyConfig) {
        let mut state = self.state.lock();
        let dst_params = SurfaceParams::for_fermi_copy(dst_config);
        let (dst_id, dst_view) = state.get_surface(dst_config.address, &dst_params, false, false);
        let src_params = SurfaceParams::for_fermi_copy(src_config);
        let (_, src_view) = state.get_surface(src_config.address, &src_params, true, false);

        state.backend.image_blit(&src_view, &dst_view, copy_config);
        let tick = state.next_tick();
        if let Some(surface) = state.surfaces.get_mut(dst_id) {
            surface.mark_as_modified(true, tick);
        }
    }

    // ─── Lookup ───────────────────────────────────────────────────────────

    /// Registered surface starting exactly at `cache_addr`.
    pub fn try_find_framebuffer_surface(&self, cache_addr: CacheAddr) -> Option<SurfaceSnapshot> {
        if cache_addr == 0 {
            return None;
        }
        let state = self.state.lock();
        let id = state.registry.l1(cache_addr)?;
        state.surfaces.get(id).map(|surface| SurfaceSnapshot::of(id, surface))
    }

    /// Whether a registered surface starts at `cache_addr`.
    pub fn is_registered(&self, cache_addr: CacheAddr) -> bool {
        self.state.lock().registry.l1(cache_addr).is_some()
    }

    pub fn registered_surface_count(&self) -> usize {
        self.state.lock().surfaces.values().filter(|surface| surface.is_registered()).count()
    }

    /// Every live surface, registered or pooled.
    pub fn surface_count(&self) -> usize {
        self.state.lock().surfaces.len()
    }

    pub fn surface(&self, id: SurfaceId) -> Option<SurfaceSnapshot> {
        let state = self.state.lock();
        state.surfaces.get(id).map(|surface| SurfaceSnapshot::of(id, surface))
    }

    /// Runs `f` on the surface `id` with the lock held.
    pub fn with_surface<R>(&self, id: SurfaceId, f: impl FnOnce(&Surface<B>) -> R) -> Option<R> {
        let state = self.state.lock();
        state.surfaces.get(id).map(f)
    }

    /// Runs `f` on the backend with the lock held.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.state.lock().backend)
    }

    // ─── Housekeeping ─────────────────────────────────────────────────────

    /// Advances and returns the modification tick.
    pub fn tick(&self) -> u64 {
        self.state.lock().next_tick()
    }

    /// Destroys pooled surfaces idle for more than `max_idle` trims.
    ///
    /// `None` uses [`CacheSettings::reserve_max_idle`], where `0` disables
    /// trimming. Registered surfaces and surfaces pinned by a framebuffer
    /// slot or the sampled list are never destroyed. Returns the number of
    /// surfaces destroyed.
    pub fn trim_reserve(&self, max_idle: Option<u32>) -> usize {
        let mut state = self.state.lock();
        let max_idle = match max_idle {
            Some(max_idle) => max_idle,
            None if state.settings.reserve_max_idle == 0 => return 0,
            None => state.settings.reserve_max_idle,
        };

        let pinned: FxHashSet<SurfaceId> = state
            .surfaces
            .keys()
            .filter(|&id| state.surfaces[id].is_registered() || state.is_pinned(id))
            .collect();
        let evicted = state.reserve.trim(max_idle, |id| pinned.contains(&id));
        for &id in &evicted {
            state.surfaces.remove(id);
        }
        state.stats.evictions += evicted.len() as u64;
        if !evicted.is_empty() {
            log::debug!("Trimmed {} idle surfaces from the reservation pool", evicted.len());
        }
        evicted.len()
    }

    /// Number of entries in the reservation pool.
    pub fn reserved_surface_count(&self) -> usize {
        self.state.lock().reserve.len()
    }

    #[must_use]
    pub fn stats(&self) -> TextureCacheStats {
        self.state.lock().stats
    }

    #[must_use]
    pub fn settings(&self) -> CacheSettings {
        self.state.lock().settings
    }

    /// Swaps the runtime settings. The registry keeps its construction-time
    /// page size.
    pub fn set_settings(&self, settings: CacheSettings) {
        let mut state = self.state.lock();
        if settings.registry_page_bits != state.settings.registry_page_bits {
            log::warn!(
                "Registry page size is fixed at construction, ignoring registry_page_bits={}",
                settings.registry_page_bits
            );
        }
        state.staging.set_size(settings.staging_buffer_count);
        state.settings = settings;
    }
}

impl<B: TextureBackend> std::fmt::Debug for TextureCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TextureCache")
            .field("surfaces", &state.surfaces.len())
            .field("reserved", &state.reserve.len())
            .field("registry_pages", &state.registry.page_count())
            .field("ticks", &state.ticks)
            .field("settings", &state.settings)
            .finish_non_exhaustive()
    }
}
