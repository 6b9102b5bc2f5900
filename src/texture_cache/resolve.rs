//! Surface resolution.
//!
//! The escalation ladder behind every `TextureCache` entry point, plus the
//! lifecycle primitives it is built from (register, unregister, load, flush,
//! allocation through the reservation pool).
//!
//! Everything here runs on the locked [`CacheState`] and never re-enters the
//! public API.

use crate::errors::Result;
use crate::memory::{CacheAddr, GpuVAddr};
use crate::surface::SurfaceTarget;

use super::copy_params::CopyParams;
use super::params::SurfaceParams;
use super::staging::HOST_BUFFER;
use super::surface::{MatchStructureResult, MatchTopologyResult, Surface};
use super::{CacheState, SurfaceId, TextureBackend};

/// How overlapping surfaces are disposed of before a fresh one takes their
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecycleStrategy {
    /// Drop the old contents.
    Ignore,
    /// Write the old contents back to guest memory, then reload.
    Flush,
    /// Reinterpret the first overlap through a buffer copy.
    // Kept for backends with a fast reinterpreting copy; not selected by
    // `pick_strategy` yet.
    #[allow(dead_code)]
    BufferCopy,
}

type Resolved<V> = (SurfaceId, V);

impl<B: TextureBackend> CacheState<B> {
    // ─── Resolution ───────────────────────────────────────────────────────

    /// Returns a surface and view for `params` at `gpu_addr`, creating,
    /// rebuilding or recycling surfaces as needed. Never fails.
    pub(super) fn get_surface(
        &mut self,
        gpu_addr: GpuVAddr,
        params: &SurfaceParams,
        preserve_contents: bool,
        is_render: bool,
    ) -> Resolved<B::View> {
        let Some(cache_addr) = self.memory.gpu_to_cache_addr(gpu_addr) else {
            return self.get_degenerate_surface(gpu_addr, params);
        };

        // Exact address hit.
        if let Some(id) = self.registry.l1(cache_addr) {
            let current = &self.surfaces[id];
            let topological = current.matches_topology(params);
            if topological != MatchTopologyResult::FullMatch {
                return self.recycle_surface(vec![id], params, gpu_addr, preserve_contents, topological);
            }
            let structural = current.matches_structure(params);
            if structural != MatchStructureResult::None
                && (params.target != SurfaceTarget::Texture3D || current.match_target(params.target))
            {
                if structural == MatchStructureResult::FullMatch {
                    return self.manage_structural_match(id, params, is_render);
                }
                return self.rebuild_surface(id, params, is_render);
            }
        }

        let candidate_size = params.guest_size_in_bytes();
        let overlaps = self.surfaces_in_region(cache_addr, candidate_size);
        if overlaps.is_empty() {
            return self.initialize_surface(gpu_addr, params, preserve_contents);
        }

        for &id in &overlaps {
            let topological = self.surfaces[id].matches_topology(params);
            if topological != MatchTopologyResult::FullMatch {
                return self.recycle_surface(overlaps, params, gpu_addr, preserve_contents, topological);
            }
        }

        if let [id] = overlaps[..] {
            let current = &self.surfaces[id];
            if !current.is_inside(gpu_addr, gpu_addr + candidate_size as u64) {
                if current.gpu_addr() == gpu_addr
                    && let Some(resolved) = self.try_reconstruct_surface(&overlaps, params, gpu_addr)
                {
                    return resolved;
                }
                return self.recycle_surface(overlaps, params, gpu_addr, preserve_contents, MatchTopologyResult::FullMatch);
            }

            let view = {
                let current = &mut self.surfaces[id];
                current.emplace_view(&mut self.backend, params, gpu_addr, candidate_size)
            };
            if let Some(view) = view {
                let current = &self.surfaces[id];
                if current.match_format(params.pixel_format) {
                    self.stats.view_hits += 1;
                    log::trace!("Resolved 0x{gpu_addr:x} as a view of surface at 0x{:x}", current.gpu_addr());
                    return (id, view);
                }

                // Mirage: the view reinterprets the parent's bytes, so the
                // parent is rebuilt in the requested format first.
                let mut new_params = *current.params();
                new_params.width = SurfaceParams::convert_width(new_params.width, new_params.pixel_format, params.pixel_format);
                new_params.height = SurfaceParams::convert_height(new_params.height, new_params.pixel_format, params.pixel_format);
                new_params.pixel_format = params.pixel_format;
                new_params.component_type = params.component_type;
                new_params.surface_type = params.surface_type;
                new_params.srgb_conversion = params.srgb_conversion;
                let (new_id, _) = self.rebuild_surface(id, &new_params, is_render);
                let mirage_view = {
                    let rebuilt = &mut self.surfaces[new_id];
                    rebuilt.emplace_view(&mut self.backend, params, gpu_addr, candidate_size)
                };
                if let Some(view) = mirage_view {
                    return (new_id, view);
                }
                return self.recycle_surface(vec![new_id], params, gpu_addr, preserve_contents, MatchTopologyResult::FullMatch);
            }

            if self.settings.accurate_gpu_emulation {
                return self.recycle_surface(overlaps, params, gpu_addr, preserve_contents, MatchTopologyResult::FullMatch);
            }
            if self.surfaces[id].matches_sub_texture(params, gpu_addr) {
                return self.rebuild_surface(id, params, is_render);
            }
        } else if let Some(resolved) = self.try_reconstruct_surface(&overlaps, params, gpu_addr) {
            return resolved;
        }

        self.recycle_surface(overlaps, params, gpu_addr, preserve_contents, MatchTopologyResult::FullMatch)
    }

    /// A 1x1 stand-in for requests at unmapped addresses. It is never
    /// registered and never loaded.
    fn get_degenerate_surface(&mut self, gpu_addr: GpuVAddr, params: &SurfaceParams) -> Resolved<B::View> {
        log::debug!("Surface requested at unmapped gpu_address 0x{gpu_addr:016x}, using a degenerate surface");
        let params = params.degenerate();
        let id = self.get_uncached_surface(gpu_addr, &params);
        self.reserve.reserve(params, id);
        (id, self.surfaces[id].main_view())
    }

    /// Answers a structural full match at the same address.
    fn manage_structural_match(&mut self, id: SurfaceId, params: &SurfaceParams, is_render: bool) -> Resolved<B::View> {
        let current = &self.surfaces[id];
        let is_mirage = !current.match_format(params.pixel_format);
        if is_mirage && (is_render || self.siblings.sibling(params.pixel_format) != Some(current.format())) {
            return self.rebuild_surface(id, params, is_render);
        }

        self.stats.l1_hits += 1;
        self.stats.view_hits += 1;
        let current = &mut self.surfaces[id];
        log::trace!("L1 hit at 0x{:x}", current.gpu_addr());
        if current.match_target(params.target) {
            return (id, current.main_view());
        }
        (id, current.emplace_overview(&mut self.backend, params))
    }

    /// Replaces `id` with a surface shaped like `params`, copying the old
    /// contents across.
    fn rebuild_surface(&mut self, id: SurfaceId, params: &SurfaceParams, is_render: bool) -> Resolved<B::View> {
        let current = &self.surfaces[id];
        let gpu_addr = current.gpu_addr();
        let cr_params = *current.params();
        let was_modified = current.is_modified();

        let mut new_params = *params;
        if cr_params.pixel_format != params.pixel_format
            && !is_render
            && self.siblings.sibling(cr_params.pixel_format) == Some(params.pixel_format)
        {
            new_params.pixel_format = cr_params.pixel_format;
            new_params.component_type = cr_params.component_type;
            new_params.surface_type = cr_params.surface_type;
        }
        log::debug!(
            "Rebuilding surface at 0x{gpu_addr:x}: {:?} {}x{} -> {:?} {}x{}",
            cr_params.pixel_format,
            cr_params.width,
            cr_params.height,
            new_params.pixel_format,
            new_params.width,
            new_params.height,
        );

        let new_id = self.get_uncached_surface(gpu_addr, &new_params);
        if cr_params.surface_type != new_params.surface_type || cr_params.component_type != new_params.component_type {
            self.buffer_copy(id, new_id);
        } else {
            let bricks = self.surfaces[id].break_down(&new_params);
            for brick in &bricks {
                self.image_copy(id, new_id, brick);
            }
        }

        self.unregister(id);
        if !self.register(new_id) {
            self.reserve.reserve(new_params, new_id);
        }
        let tick = self.next_tick();
        let rebuilt = &mut self.surfaces[new_id];
        rebuilt.mark_as_modified(was_modified, tick);
        self.stats.rebuilds += 1;
        (new_id, rebuilt.main_view())
    }

    /// Assembles a surface for `params` from overlaps that each line up
    /// with one of its mips. Returns `None` when the overlaps cannot be
    /// stitched together; the caller then recycles.
    fn try_reconstruct_surface(
        &mut self,
        overlaps: &[SurfaceId],
        params: &SurfaceParams,
        gpu_addr: GpuVAddr,
    ) -> Option<Resolved<B::View>> {
        if params.target == SurfaceTarget::Texture3D {
            return None;
        }

        let new_id = self.get_uncached_surface(gpu_addr, params);
        let mut modified = false;
        let mut passed_tests = 0usize;
        for &id in overlaps {
            let overlap = &self.surfaces[id];
            let src_params = *overlap.params();
            if src_params.is_layered || src_params.num_levels > 1 {
                self.abandon_surface(new_id);
                return None;
            }

            let new_surface = &self.surfaces[new_id];
            let Some((layer, level)) = new_surface.layer_mipmap(overlap.gpu_addr()) else {
                continue;
            };
            if new_surface.mipmap_size(level) != overlap.size_in_bytes() {
                continue;
            }

            modified |= overlap.is_modified();
            let width = SurfaceParams::intersect_width(&src_params, params, 0, level);
            let height = SurfaceParams::intersect_height(&src_params, params, 0, level);
            self.image_copy(id, new_id, &CopyParams::into_layer_level(width, height, layer, level));
            passed_tests += 1;
        }

        if passed_tests == 0 || (self.settings.accurate_gpu_emulation && passed_tests != overlaps.len()) {
            self.abandon_surface(new_id);
            return None;
        }

        log::debug!(
            "Reconstructed surface at 0x{gpu_addr:x} from {passed_tests} of {} overlaps",
            overlaps.len()
        );
        for &id in overlaps {
            self.unregister(id);
        }
        let tick = self.next_tick();
        self.surfaces[new_id].mark_as_modified(modified, tick);
        if !self.register(new_id) {
            self.reserve.reserve(*params, new_id);
        }
        self.stats.reconstructions += 1;
        Some((new_id, self.surfaces[new_id].main_view()))
    }

    /// Evicts `overlaps` and creates a fresh surface for `params`.
    fn recycle_surface(
        &mut self,
        mut overlaps: Vec<SurfaceId>,
        params: &SurfaceParams,
        gpu_addr: GpuVAddr,
        preserve_contents: bool,
        untopological: MatchTopologyResult,
    ) -> Resolved<B::View> {
        for &id in &overlaps {
            self.unregister(id);
        }
        self.stats.recycles += 1;

        let strategy = self.pick_strategy(&overlaps, params, untopological);
        log::debug!(
            "Recycling {} surface(s) at 0x{gpu_addr:x} ({untopological:?}, {strategy:?})",
            overlaps.len()
        );
        match strategy {
            RecycleStrategy::Ignore => {
                let do_load = preserve_contents && self.settings.accurate_gpu_emulation;
                self.initialize_surface(gpu_addr, params, do_load)
            }
            RecycleStrategy::Flush => {
                overlaps.sort_by_key(|&id| self.surfaces[id].modification_tick());
                for &id in &overlaps {
                    if let Err(err) = self.flush_surface(id) {
                        log::warn!("Failed to flush recycled surface at 0x{:x}: {err}", self.surfaces[id].gpu_addr());
                    }
                }
                self.initialize_surface(gpu_addr, params, preserve_contents)
            }
            RecycleStrategy::BufferCopy => {
                let new_id = self.get_uncached_surface(gpu_addr, params);
                if let Some(&src) = overlaps.first() {
                    self.buffer_copy(src, new_id);
                }
                if !self.register(new_id) {
                    self.reserve.reserve(*params, new_id);
                }
                (new_id, self.surfaces[new_id].main_view())
            }
        }
    }

    fn pick_strategy(
        &self,
        overlaps: &[SurfaceId],
        params: &SurfaceParams,
        untopological: MatchTopologyResult,
    ) -> RecycleStrategy {
        if self.settings.accurate_gpu_emulation {
            return RecycleStrategy::Flush;
        }
        let is_volume = |p: &SurfaceParams| p.block_depth > 1 || p.target == SurfaceTarget::Texture3D;
        if is_volume(params) || overlaps.iter().any(|&id| is_volume(self.surfaces[id].params())) {
            return RecycleStrategy::Flush;
        }
        match untopological {
            MatchTopologyResult::CompressUnmatch => RecycleStrategy::Flush,
            MatchTopologyResult::FullMatch if !params.is_tiled => RecycleStrategy::Flush,
            _ => RecycleStrategy::Ignore,
        }
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────

    /// Allocates (or reuses) a surface, registers it and optionally loads
    /// its contents from guest memory.
    fn initialize_surface(&mut self, gpu_addr: GpuVAddr, params: &SurfaceParams, preserve_contents: bool) -> Resolved<B::View> {
        let id = self.get_uncached_surface(gpu_addr, params);
        let registered = self.register(id);
        if !registered {
            self.reserve.reserve(*params, id);
        }
        if preserve_contents && registered {
            self.load_surface(id);
        }
        (id, self.surfaces[id].main_view())
    }

    /// A surface for `params` that is not registered: a pool entry if one is
    /// free, otherwise a new allocation.
    fn get_uncached_surface(&mut self, gpu_addr: GpuVAddr, params: &SurfaceParams) -> SurfaceId {
        let surfaces = &self.surfaces;
        let pooled = self.reserve.find(params, |id| {
            surfaces
                .get(id)
                .is_some_and(|surface| !surface.is_registered() && !surface.is_render_target())
        });
        if let Some(id) = pooled {
            let surface = &mut self.surfaces[id];
            surface.set_gpu_addr(gpu_addr);
            surface.mark_as_modified(false, self.ticks);
            self.stats.pool_reuses += 1;
            log::trace!("Reusing pooled {:?} surface for 0x{gpu_addr:x}", params.pixel_format);
            return id;
        }

        self.stats.surfaces_created += 1;
        log::trace!(
            "Creating {:?} {}x{}x{} surface for 0x{gpu_addr:x}",
            params.pixel_format,
            params.width,
            params.height,
            params.depth
        );
        let surface = Surface::new(&mut self.backend, gpu_addr, *params);
        self.surfaces.insert(surface)
    }

    /// Returns a surface that never made it into the registry to the pool.
    fn abandon_surface(&mut self, id: SurfaceId) {
        let params = *self.surfaces[id].params();
        self.reserve.reserve(params, id);
    }

    /// Adds `id` to the registry and the page tracker. Returns `false`, and
    /// leaves the surface unregistered, when its address cannot be
    /// translated.
    pub(super) fn register(&mut self, id: SurfaceId) -> bool {
        let surface = &mut self.surfaces[id];
        let gpu_addr = surface.gpu_addr();
        let (Some(cache_addr), Some(cpu_addr)) =
            (self.memory.gpu_to_cache_addr(gpu_addr), self.memory.gpu_to_cpu_addr(gpu_addr))
        else {
            log::error!("Failed to register surface with unmapped gpu_address 0x{gpu_addr:016x}");
            return false;
        };

        let size = surface.size_in_bytes();
        surface.mark_as_continuous(self.memory.is_block_continuous(gpu_addr, size));
        surface.set_cache_addr(cache_addr);
        surface.set_cpu_addr(cpu_addr);
        self.registry.insert(id, cache_addr, surface.cache_addr_end());
        surface.mark_as_registered(true);
        self.tracker.update_pages_cached_count(cpu_addr, size as u64, 1);
        true
    }

    /// Removes `id` from the registry and returns it to the pool. Bound
    /// render targets are left alone while render targets are guarded.
    pub(super) fn unregister(&mut self, id: SurfaceId) {
        let Some(surface) = self.surfaces.get_mut(id) else {
            return;
        };
        if self.guard_render_targets && surface.is_render_target() {
            return;
        }
        let params = *surface.params();
        if surface.is_registered() {
            self.tracker
                .update_pages_cached_count(surface.cpu_addr(), surface.size_in_bytes() as u64, -1);
            self.registry.remove(id, surface.cache_addr(), surface.cache_addr_end());
            surface.mark_as_registered(false);
        }
        self.reserve.reserve(params, id);
    }

    /// Guest memory to host texture.
    fn load_surface(&mut self, id: SurfaceId) {
        let surface = &mut self.surfaces[id];
        match surface.load_buffer(self.memory.as_ref(), &mut self.staging) {
            Ok(()) => {
                let host = self.staging.buffer(HOST_BUFFER, surface.host_size_in_bytes());
                self.backend.upload_texture(surface.texture(), surface.params(), host);
            }
            Err(err) => {
                log::warn!("Failed to load surface at 0x{:x}, contents are undefined: {err}", surface.gpu_addr());
            }
        }
        let tick = self.next_tick();
        self.surfaces[id].mark_as_modified(false, tick);
        self.stats.loads += 1;
    }

    /// Host texture to guest memory, if the host copy is newer.
    pub(super) fn flush_surface(&mut self, id: SurfaceId) -> Result<()> {
        {
            let surface = &mut self.surfaces[id];
            if !surface.is_modified() {
                return Ok(());
            }
            let host = self.staging.buffer(HOST_BUFFER, surface.host_size_in_bytes());
            self.backend.download_texture(surface.texture(), surface.params(), host);
            surface.flush_buffer(self.memory.as_ref(), &mut self.staging)?;
        }
        let tick = self.next_tick();
        self.surfaces[id].mark_as_modified(false, tick);
        self.stats.flushes += 1;
        Ok(())
    }

    // ─── Helpers ──────────────────────────────────────────────────────────

    /// Registered surfaces intersecting `[cache_addr, cache_addr + size)`.
    pub(super) fn surfaces_in_region(&self, cache_addr: CacheAddr, size: usize) -> Vec<SurfaceId> {
        if size == 0 {
            return Vec::new();
        }
        let end = cache_addr + size as u64;
        let surfaces = &self.surfaces;
        self.registry.surfaces_in_region(cache_addr, size, |id| {
            surfaces.get(id).is_some_and(|surface| surface.overlaps(cache_addr, end))
        })
    }

    fn image_copy(&mut self, src: SurfaceId, dst: SurfaceId, copy: &CopyParams) {
        let (src, dst) = (&self.surfaces[src], &self.surfaces[dst]);
        self.backend.image_copy(src.texture(), dst.texture(), copy);
    }

    fn buffer_copy(&mut self, src: SurfaceId, dst: SurfaceId) {
        let (src, dst) = (&self.surfaces[src], &self.surfaces[dst]);
        self.backend
            .buffer_copy(src.texture(), src.params(), dst.texture(), dst.params());
    }

    pub(super) fn next_tick(&mut self) -> u64 {
        self.ticks += 1;
        self.ticks
    }
}
