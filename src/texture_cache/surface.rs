//! Cached Surface
//!
//! A [`Surface`] owns the host texture of one guest surface together with its
//! guest address range, state flags and the views created from it. It also
//! implements the geometric half of the matcher: topology and structure
//! classification, mip/layer lookup by address, view carving and the brick
//! decomposition used when a surface is rebuilt under new parameters.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::Result;
use crate::memory::{CacheAddr, GpuMemoryManager, GpuVAddr, VAddr};
use crate::surface::{PixelFormat, SurfaceCompression, SurfaceTarget};
use crate::textures::{convert_s8z24_to_z24s8, convert_z24s8_to_s8z24, swizzle_texture, unswizzle_texture};

use super::backend::TextureBackend;
use super::copy_params::CopyParams;
use super::params::SurfaceParams;
use super::staging::StagingCache;
use super::view::ViewParams;

bitflags! {
    /// Lifecycle state of a surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceFlags: u8 {
        /// Present in the address registry.
        const REGISTERED = 1 << 0;
        /// Host contents are newer than guest memory.
        const MODIFIED = 1 << 1;
        /// Bound as a color or depth attachment.
        const RENDER_TARGET = 1 << 2;
        /// Guest backing is one contiguous block.
        const CONTINUOUS = 1 << 3;
    }
}

/// Coarse compatibility of two surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchTopologyResult {
    FullMatch,
    /// Same layout, but only one side is block compressed.
    CompressUnmatch,
    None,
}

/// Fine compatibility of two topologically matching surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStructureResult {
    FullMatch,
    /// Same bytes, laid out under a different width or format.
    SemiMatch,
    None,
}

pub struct Surface<B: TextureBackend> {
    params: SurfaceParams,
    gpu_addr: GpuVAddr,
    cache_addr: CacheAddr,
    cpu_addr: VAddr,
    flags: SurfaceFlags,
    modification_tick: u64,

    guest_memory_size: usize,
    host_memory_size: usize,
    layer_size: usize,
    /// Guest size and offset of every level inside one layer.
    mipmap_sizes: SmallVec<[usize; 16]>,
    mipmap_offsets: SmallVec<[usize; 16]>,

    texture: B::Texture,
    main_view: B::View,
    views: FxHashMap<ViewParams, B::View>,
}

impl<B: TextureBackend> Surface<B> {
    pub(crate) fn new(backend: &mut B, gpu_addr: GpuVAddr, params: SurfaceParams) -> Self {
        let texture = backend.create_texture(gpu_addr, &params);
        let main_params = ViewParams::new(params.target, 0, params.num_layers(), 0, params.num_levels);
        let main_view = backend.create_view(&texture, &params, &main_params);
        let mut views = FxHashMap::default();
        views.insert(main_params, main_view.clone());

        let mut mipmap_sizes = SmallVec::new();
        let mut mipmap_offsets = SmallVec::new();
        let mut offset = 0;
        for level in 0..params.num_levels {
            let size = params.guest_mipmap_size(level);
            mipmap_sizes.push(size);
            mipmap_offsets.push(offset);
            offset += size;
        }

        Self {
            params,
            gpu_addr,
            cache_addr: 0,
            cpu_addr: 0,
            flags: SurfaceFlags::empty(),
            modification_tick: 0,
            guest_memory_size: params.guest_size_in_bytes(),
            host_memory_size: params.host_size_in_bytes(),
            layer_size: params.layer_size(false),
            mipmap_sizes,
            mipmap_offsets,
            texture,
            main_view,
            views,
        }
    }

    // ─── Identity ─────────────────────────────────────────────────────────

    #[inline]
    pub fn params(&self) -> &SurfaceParams {
        &self.params
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.params.pixel_format
    }

    #[inline]
    pub fn gpu_addr(&self) -> GpuVAddr {
        self.gpu_addr
    }

    pub(crate) fn set_gpu_addr(&mut self, gpu_addr: GpuVAddr) {
        self.gpu_addr = gpu_addr;
    }

    #[inline]
    pub fn cache_addr(&self) -> CacheAddr {
        self.cache_addr
    }

    #[inline]
    pub fn cache_addr_end(&self) -> CacheAddr {
        self.cache_addr + self.guest_memory_size as u64
    }

    pub(crate) fn set_cache_addr(&mut self, cache_addr: CacheAddr) {
        self.cache_addr = cache_addr;
    }

    #[inline]
    pub fn cpu_addr(&self) -> VAddr {
        self.cpu_addr
    }

    pub(crate) fn set_cpu_addr(&mut self, cpu_addr: VAddr) {
        self.cpu_addr = cpu_addr;
    }

    /// Guest bytes covered by the surface.
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.guest_memory_size
    }

    #[inline]
    pub fn host_size_in_bytes(&self) -> usize {
        self.host_memory_size
    }

    #[inline]
    pub fn texture(&self) -> &B::Texture {
        &self.texture
    }

    #[inline]
    pub fn main_view(&self) -> B::View {
        self.main_view.clone()
    }

    /// Number of distinct views created so far, the main view included.
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    // ─── State ────────────────────────────────────────────────────────────

    #[inline]
    pub fn flags(&self) -> SurfaceFlags {
        self.flags
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.flags.contains(SurfaceFlags::REGISTERED)
    }

    pub(crate) fn mark_as_registered(&mut self, registered: bool) {
        self.flags.set(SurfaceFlags::REGISTERED, registered);
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        self.flags.contains(SurfaceFlags::MODIFIED)
    }

    /// Stamps `tick`. A bound render target always counts as modified.
    pub(crate) fn mark_as_modified(&mut self, modified: bool, tick: u64) {
        let modified = modified || self.is_render_target();
        self.flags.set(SurfaceFlags::MODIFIED, modified);
        self.modification_tick = tick;
    }

    #[inline]
    pub fn modification_tick(&self) -> u64 {
        self.modification_tick
    }

    #[inline]
    pub fn is_render_target(&self) -> bool {
        self.flags.contains(SurfaceFlags::RENDER_TARGET)
    }

    pub(crate) fn mark_as_render_target(&mut self, render_target: bool) {
        self.flags.set(SurfaceFlags::RENDER_TARGET, render_target);
    }

    #[inline]
    pub fn is_continuous(&self) -> bool {
        self.flags.contains(SurfaceFlags::CONTINUOUS)
    }

    pub(crate) fn mark_as_continuous(&mut self, continuous: bool) {
        self.flags.set(SurfaceFlags::CONTINUOUS, continuous);
    }

    // ─── Geometry ─────────────────────────────────────────────────────────

    /// Whether `[start, end)` in cache space intersects this surface.
    #[inline]
    pub fn overlaps(&self, start: CacheAddr, end: CacheAddr) -> bool {
        self.cache_addr < end && start < self.cache_addr_end()
    }

    /// Whether `[start, end)` in GPU space lies entirely inside this surface.
    #[inline]
    pub fn is_inside(&self, start: GpuVAddr, end: GpuVAddr) -> bool {
        self.gpu_addr <= start && end <= self.gpu_addr + self.guest_memory_size as u64
    }

    /// Guest bytes of one layer of `level`.
    pub fn mipmap_size(&self, level: u32) -> usize {
        self.mipmap_sizes.get(level as usize).copied().unwrap_or(0)
    }

    /// `(layer, level)` starting exactly at `candidate_gpu_addr`.
    pub fn layer_mipmap(&self, candidate_gpu_addr: GpuVAddr) -> Option<(u32, u32)> {
        if candidate_gpu_addr == self.gpu_addr {
            return Some((0, 0));
        }
        let relative = usize::try_from(candidate_gpu_addr.checked_sub(self.gpu_addr)?).ok()?;
        if self.layer_size == 0 {
            return None;
        }
        let layer = relative / self.layer_size;
        if layer >= self.params.depth as usize {
            return None;
        }
        let mipmap_address = relative - layer * self.layer_size;
        let level = self.mipmap_offsets.iter().position(|&offset| offset == mipmap_address)?;
        Some((layer as u32, level as u32))
    }

    #[inline]
    pub fn match_format(&self, format: PixelFormat) -> bool {
        self.params.pixel_format == format
    }

    #[inline]
    pub fn match_target(&self, target: SurfaceTarget) -> bool {
        self.params.target == target
    }

    pub fn matches_topology(&self, rhs: &SurfaceParams) -> MatchTopologyResult {
        let lhs = &self.params;
        if (lhs.bytes_per_pixel(), lhs.is_tiled, lhs.is_buffer()) != (rhs.bytes_per_pixel(), rhs.is_tiled, rhs.is_buffer()) {
            return MatchTopologyResult::None;
        }
        if lhs.is_compressed() == rhs.is_compressed() {
            MatchTopologyResult::FullMatch
        } else {
            MatchTopologyResult::CompressUnmatch
        }
    }

    pub fn matches_structure(&self, rhs: &SurfaceParams) -> MatchStructureResult {
        let lhs = &self.params;

        if lhs.is_buffer() {
            let lhs_bytes = lhs.width as usize * lhs.bytes_per_pixel() as usize;
            let rhs_bytes = rhs.width as usize * rhs.bytes_per_pixel() as usize;
            return if lhs_bytes == rhs_bytes { MatchStructureResult::FullMatch } else { MatchStructureResult::None };
        }

        if !lhs.is_tiled {
            if (lhs.height, lhs.pitch) != (rhs.height, rhs.pitch) {
                return MatchStructureResult::None;
            }
            return if lhs.width == rhs.width { MatchStructureResult::FullMatch } else { MatchStructureResult::SemiMatch };
        }

        let layout = |p: &SurfaceParams| (p.depth, p.block_width, p.block_height, p.block_depth, p.tile_width_spacing, p.num_levels);
        if layout(lhs) != layout(rhs) {
            return MatchStructureResult::None;
        }
        if (lhs.width, lhs.height) == (rhs.width, rhs.height) {
            return MatchStructureResult::FullMatch;
        }
        let converted_width = SurfaceParams::convert_width(rhs.block_aligned_width(), lhs.pixel_format, rhs.pixel_format);
        let converted_height = SurfaceParams::convert_height(rhs.height, lhs.pixel_format, rhs.pixel_format);
        if (lhs.block_aligned_width(), lhs.height) == (converted_width, converted_height) {
            return MatchStructureResult::SemiMatch;
        }
        MatchStructureResult::None
    }

    /// Loose sub-texture heuristic: same start, same single-level 2D shape.
    pub fn matches_sub_texture(&self, rhs: &SurfaceParams, other_gpu_addr: GpuVAddr) -> bool {
        (self.gpu_addr, self.params.target, self.params.num_levels) == (other_gpu_addr, rhs.target, rhs.num_levels)
            && self.params.target == SurfaceTarget::Texture2D
            && self.params.num_levels == 1
    }

    /// Copies that move this surface's contents into a surface shaped like
    /// `in_params`: one per (layer, level) when layered, one per level
    /// otherwise.
    pub fn break_down(&self, in_params: &SurfaceParams) -> Vec<CopyParams> {
        let params = &self.params;
        let levels = params.num_levels.min(in_params.num_levels);
        let size = |level| {
            (
                SurfaceParams::intersect_width(params, in_params, level, level),
                SurfaceParams::intersect_height(params, in_params, level, level),
            )
        };
        if params.is_layered {
            let layers = params.depth.min(in_params.depth);
            let mut bricks = Vec::with_capacity((layers * levels) as usize);
            for layer in 0..layers {
                for level in 0..levels {
                    let (width, height) = size(level);
                    bricks.push(CopyParams::layer_level(width, height, layer, level));
                }
            }
            bricks
        } else {
            (0..levels)
                .map(|level| {
                    let (width, height) = size(level);
                    let depth = params.mip_depth(level).min(in_params.mip_depth(level));
                    CopyParams::volume_level(width, height, depth, level)
                })
                .collect()
        }
    }

    // ─── Views ────────────────────────────────────────────────────────────

    pub(crate) fn get_view(&mut self, backend: &mut B, view_params: ViewParams) -> B::View {
        self.views
            .entry(view_params)
            .or_insert_with(|| backend.create_view(&self.texture, &self.params, &view_params))
            .clone()
    }

    /// A single layer/level view for a candidate living at `view_addr`, if
    /// the candidate lines up with one of this surface's mips.
    pub(crate) fn emplace_view(
        &mut self,
        backend: &mut B,
        view_params: &SurfaceParams,
        view_addr: GpuVAddr,
        candidate_size: usize,
    ) -> Option<B::View> {
        if self.params.target == SurfaceTarget::Texture3D
            || (self.params.num_levels == 1 && !self.params.is_layered)
            || view_params.target == SurfaceTarget::Texture3D
        {
            return None;
        }
        let (layer, level) = self.layer_mipmap(view_addr)?;
        if self.mipmap_size(level) != candidate_size {
            return None;
        }
        Some(self.get_view(backend, ViewParams::new(view_params.target, layer, 1, level, 1)))
    }

    /// The whole surface seen through `overview_params.target`.
    pub(crate) fn emplace_overview(&mut self, backend: &mut B, overview_params: &SurfaceParams) -> B::View {
        let num_layers = if self.params.is_layered && !overview_params.is_layered { 1 } else { self.params.depth };
        let view_params = ViewParams::new(overview_params.target, 0, num_layers, 0, self.params.num_levels);
        self.get_view(backend, view_params)
    }

    // ─── Guest Transfers ──────────────────────────────────────────────────

    /// Reads guest memory into the host staging buffer, in host layout.
    pub(crate) fn load_buffer(&mut self, memory: &dyn GpuMemoryManager, staging: &mut StagingCache) -> Result<()> {
        let params = self.params;
        let continuous = memory.is_block_continuous(self.gpu_addr, self.guest_memory_size);
        self.mark_as_continuous(continuous);

        let (host, guest) = staging.host_and_guest(self.host_memory_size, self.guest_memory_size);
        memory.read_block(self.gpu_addr, guest)?;

        if params.is_tiled {
            for level in 0..params.num_levels {
                self.for_each_level_slice(level, |guest_offset, host_offset, depth| {
                    let (Some(src), Some(dst)) = (guest.get(guest_offset..), host.get_mut(host_offset..)) else {
                        return;
                    };
                    let (width, height, bpp, bh, bd) = level_layout(&params, level);
                    unswizzle_texture(src, dst, bpp, width, height, depth, bh, bd);
                });
            }
        } else {
            if params.num_levels > 1 {
                log::warn!("Linear surface at 0x{:x} has {} levels, only level 0 is loaded", self.gpu_addr, params.num_levels);
            }
            for_each_linear_row(&params, |guest_offset, host_offset, len| {
                if let (Some(src), Some(dst)) = (guest.get(guest_offset..guest_offset + len), host.get_mut(host_offset..host_offset + len)) {
                    dst.copy_from_slice(src);
                }
            });
        }

        if params.compression() == SurfaceCompression::Rearranged {
            convert_s8z24_to_z24s8(host);
        }
        Ok(())
    }

    /// Writes the host staging buffer (already downloaded, host layout) back
    /// to guest memory.
    pub(crate) fn flush_buffer(&mut self, memory: &dyn GpuMemoryManager, staging: &mut StagingCache) -> Result<()> {
        let params = self.params;
        if params.compression() == SurfaceCompression::Converted {
            log::warn!(
                "Surface at 0x{:x} uses {:?}, which cannot be encoded back to guest memory",
                self.gpu_addr,
                params.pixel_format
            );
            return Ok(());
        }

        let (host, guest) = staging.host_and_guest(self.host_memory_size, self.guest_memory_size);
        if params.compression() == SurfaceCompression::Rearranged {
            convert_z24s8_to_s8z24(host);
        }

        // Padding bytes between texels must survive the write-back.
        memory.read_block(self.gpu_addr, guest)?;

        if params.is_tiled {
            for level in 0..params.num_levels {
                self.for_each_level_slice(level, |guest_offset, host_offset, depth| {
                    let (Some(dst), Some(src)) = (guest.get_mut(guest_offset..), host.get(host_offset..)) else {
                        return;
                    };
                    let (width, height, bpp, bh, bd) = level_layout(&params, level);
                    swizzle_texture(dst, src, bpp, width, height, depth, bh, bd);
                });
            }
        } else {
            for_each_linear_row(&params, |guest_offset, host_offset, len| {
                if let (Some(dst), Some(src)) = (guest.get_mut(guest_offset..guest_offset + len), host.get(host_offset..host_offset + len)) {
                    dst.copy_from_slice(src);
                }
            });
        }

        memory.write_block(self.gpu_addr, guest)?;
        Ok(())
    }

    /// Calls `f(guest_offset, host_offset, depth)` for every swizzled slice
    /// of `level`: one per layer when layered, one volume otherwise.
    fn for_each_level_slice(&self, level: u32, mut f: impl FnMut(usize, usize, u32)) {
        let params = &self.params;
        let guest_offset = params.guest_mipmap_level_offset(level);
        let host_offset = params.host_mipmap_level_offset(level);
        if params.is_layered {
            let host_stride = params.host_layer_size(level);
            for layer in 0..params.depth as usize {
                f(guest_offset + layer * self.layer_size, host_offset + layer * host_stride, 1);
            }
        } else {
            f(guest_offset, host_offset, params.mip_depth(level));
        }
    }
}

/// `(width, height, bytes_per_block, block_height, block_depth)` of `level`,
/// with dimensions in compression blocks.
fn level_layout(params: &SurfaceParams, level: u32) -> (u32, u32, u32, u32, u32) {
    (
        params.mip_width(level).div_ceil(params.default_block_width()),
        params.mip_height(level).div_ceil(params.default_block_height()),
        params.bytes_per_pixel(),
        params.mip_block_height(level),
        params.mip_block_depth(level),
    )
}

/// Calls `f(guest_offset, host_offset, len)` for every row of level 0 of a
/// pitch linear surface.
fn for_each_linear_row(params: &SurfaceParams, mut f: impl FnMut(usize, usize, usize)) {
    let (width, height, bpp, _, _) = level_layout(params, 0);
    let copy_size = (width * bpp) as usize;
    let pitch = if params.pitch == 0 { copy_size } else { params.pitch as usize };
    let rows = height as usize * params.mip_depth(0) as usize;
    for row in 0..rows {
        f(row * pitch, row * copy_size, copy_size);
    }
}

impl<B: TextureBackend> std::fmt::Debug for Surface<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("gpu_addr", &format_args!("0x{:x}", self.gpu_addr))
            .field("cache_addr", &format_args!("0x{:x}", self.cache_addr))
            .field("format", &self.params.pixel_format)
            .field("target", &self.params.target)
            .field("size", &(self.params.width, self.params.height, self.params.depth))
            .field("flags", &self.flags)
            .field("tick", &self.modification_tick)
            .finish_non_exhaustive()
    }
}
