//! Surface Parameters
//!
//! [`SurfaceParams`] is the immutable shape of a guest texture. It serves as
//! the key of the reservation pool (every field takes part in equality) and
//! as the input of host texture creation.
//!
//! # Sizes
//!
//! Two sizes are tracked for every mip level:
//!
//! - **guest**: bytes the level occupies in guest memory, including block
//!   linear padding. Layered surfaces store every level of layer 0, then
//!   every level of layer 1, and so on; each layer is padded to a whole block.
//! - **host**: tightly packed bytes handed to the backend. Host buffers store
//!   level 0 of every layer, then level 1 of every layer, and so on.
//!
//! Widths and heights are kept in texels; all size math rounds them up to
//! whole compression blocks.

use crate::engines::{FermiSurface, MemoryLayout, RenderTargetConfig, TextureInfo};
use crate::surface::{ComponentType, PixelFormat, SurfaceCompression, SurfaceTarget, SurfaceType};
use crate::textures::{GOB_SIZE_SHIFT, align_up, calculate_size, log2_ceil};

/// Shape, layout and format of a guest surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceParams {
    pub is_tiled: bool,
    pub srgb_conversion: bool,
    pub is_layered: bool,
    /// log2 GOB counts of the block linear layout.
    pub block_width: u32,
    pub block_height: u32,
    pub block_depth: u32,
    pub tile_width_spacing: u32,
    pub pixel_format: PixelFormat,
    pub component_type: ComponentType,
    pub surface_type: SurfaceType,
    pub target: SurfaceTarget,
    pub width: u32,
    pub height: u32,
    /// 3D depth, or layer count of layered targets. Cube faces count as
    /// layers.
    pub depth: u32,
    /// Row pitch in bytes of pitch linear surfaces, `0` when tiled.
    pub pitch: u32,
    pub num_levels: u32,
    /// Guest distance between layers of a layered render target, in bytes.
    /// `0` uses the packed, block aligned layer size.
    pub layer_stride: u32,
    /// First layer a render target slot binds.
    pub base_layer: u32,
}

/// The tile width spacing register field is 3 bits wide.
const MAX_TILE_WIDTH_SPACING: u32 = 7;

impl SurfaceParams {
    fn base(pixel_format: PixelFormat, target: SurfaceTarget, width: u32, height: u32) -> Self {
        Self {
            is_tiled: true,
            srgb_conversion: pixel_format.is_srgb(),
            is_layered: target.is_layered(),
            block_width: 0,
            block_height: 0,
            block_depth: 0,
            tile_width_spacing: 0,
            pixel_format,
            component_type: pixel_format.component_type(),
            surface_type: pixel_format.surface_type(),
            target,
            width: width.max(1),
            height: height.max(1),
            depth: 1,
            pitch: 0,
            num_levels: 1,
            layer_stride: 0,
            base_layer: 0,
        }
    }

    /// Parameters of a sampled texture.
    #[must_use]
    pub fn for_texture(info: &TextureInfo) -> Self {
        let mut params = Self::base(info.format, info.target, info.width, info.height);
        params.is_tiled = info.is_tiled;
        params.block_width = info.block_width;
        params.block_height = if info.is_tiled { info.block_height } else { 0 };
        params.block_depth = if info.is_tiled { info.block_depth } else { 0 };
        params.tile_width_spacing = if info.is_tiled {
            1 << info.tile_width_spacing.min(MAX_TILE_WIDTH_SPACING)
        } else {
            0
        };
        params.depth = match info.target {
            SurfaceTarget::TextureCubemap => 6,
            SurfaceTarget::TextureCubeArray => info.depth.max(1) * 6,
            _ => info.depth.max(1),
        };
        params.pitch = if info.is_tiled { 0 } else { info.pitch };
        params.num_levels = info.num_levels.max(1);
        params
    }

    /// Parameters of the depth/stencil attachment.
    #[must_use]
    pub fn for_depth_buffer(width: u32, height: u32, format: PixelFormat, layout: MemoryLayout) -> Self {
        let mut params = Self::base(format, SurfaceTarget::Texture2D, width, height);
        params.is_tiled = !layout.is_pitch_linear;
        params.block_width = layout.block_width.min(5);
        params.block_height = layout.block_height.min(5);
        params.block_depth = layout.block_depth.min(5);
        params.tile_width_spacing = 1;
        params.pitch = if params.is_tiled { 0 } else { params.width * format.bytes_per_block() };
        params
    }

    /// Parameters of color render target `config` rendered as `format`.
    ///
    /// Pitch linear targets program their pitch in the width register.
    #[must_use]
    pub fn for_framebuffer(config: &RenderTargetConfig, format: PixelFormat) -> Self {
        let layered = config.layers > 1;
        let target = if layered { SurfaceTarget::Texture2DArray } else { SurfaceTarget::Texture2D };
        let mut params = Self::base(format, target, config.width, config.height);
        params.is_tiled = !config.memory_layout.is_pitch_linear;
        params.block_width = config.memory_layout.block_width;
        params.block_height = config.memory_layout.block_height;
        params.block_depth = config.memory_layout.block_depth;
        params.tile_width_spacing = 1;
        if !params.is_tiled {
            params.pitch = config.width;
            params.width = (config.width / format.bytes_per_block()).max(1);
        }
        if layered {
            params.depth = config.layers;
            params.layer_stride = config.layer_stride;
            params.base_layer = config.base_layer.min(config.layers - 1);
        }
        params
    }

    /// Parameters of one side of a 2D engine copy.
    #[must_use]
    pub fn for_fermi_copy(config: &FermiSurface) -> Self {
        let mut params = Self::base(config.format, SurfaceTarget::Texture2D, config.width, config.height);
        params.is_tiled = !config.linear;
        if params.is_tiled {
            params.block_width = config.block_width.min(5);
            params.block_height = config.block_height.min(5);
            params.block_depth = config.block_depth.min(5);
        }
        params.tile_width_spacing = 1;
        params.pitch = if params.is_tiled { 0 } else { config.pitch };
        params
    }

    /// The 1x1x1 shape substituted for requests at unmapped addresses.
    #[must_use]
    pub fn degenerate(&self) -> Self {
        let mut params = *self;
        params.width = 1;
        params.height = 1;
        params.depth = 1;
        params.block_height = 0;
        params.block_depth = 0;
        params.layer_stride = 0;
        params.base_layer = 0;
        params
    }

    // ─── Format Properties ────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn bytes_per_pixel(&self) -> u32 {
        self.pixel_format.bytes_per_block()
    }

    #[inline]
    #[must_use]
    pub fn default_block_width(&self) -> u32 {
        self.pixel_format.block_width()
    }

    #[inline]
    #[must_use]
    pub fn default_block_height(&self) -> u32 {
        self.pixel_format.block_height()
    }

    #[inline]
    #[must_use]
    pub fn compression(&self) -> SurfaceCompression {
        self.pixel_format.compression()
    }

    #[inline]
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.pixel_format.is_compressed()
    }

    #[inline]
    #[must_use]
    pub fn is_buffer(&self) -> bool {
        self.target == SurfaceTarget::TextureBuffer
    }

    #[inline]
    #[must_use]
    pub fn num_layers(&self) -> u32 {
        if self.is_layered { self.depth } else { 1 }
    }

    // ─── Mip Dimensions ───────────────────────────────────────────────────

    #[must_use]
    pub fn mip_width(&self, level: u32) -> u32 {
        (self.width >> level).max(1)
    }

    #[must_use]
    pub fn mip_height(&self, level: u32) -> u32 {
        (self.height >> level).max(1)
    }

    /// Layered surfaces keep their layer count at every level.
    #[must_use]
    pub fn mip_depth(&self, level: u32) -> u32 {
        if self.is_layered { self.depth } else { (self.depth >> level).max(1) }
    }

    /// Block height used by `level`; smaller levels shrink their blocks.
    #[must_use]
    pub fn mip_block_height(&self, level: u32) -> u32 {
        if level == 0 {
            return self.block_height;
        }
        let blocks_in_y = self.mip_height(level).div_ceil(self.default_block_height());
        (log2_ceil(blocks_in_y).clamp(3, 7) - 3).min(self.block_height)
    }

    #[must_use]
    pub fn mip_block_depth(&self, level: u32) -> u32 {
        if level == 0 {
            return self.block_depth;
        }
        if self.is_layered {
            return 0;
        }
        log2_ceil(self.mip_depth(level)).min(self.block_depth)
    }

    /// Width in texels padded to the block linear row alignment.
    #[must_use]
    pub fn block_aligned_width(&self) -> u32 {
        let bpp = self.bytes_per_pixel();
        let alignment = ((64u32 << self.block_width) / bpp).max(1);
        align_up(self.width as usize, alignment as usize) as u32
    }

    // ─── Sizes ────────────────────────────────────────────────────────────

    /// Bytes of one layer of `level` (the whole level when not layered).
    fn inner_mipmap_memory_size(&self, level: u32, as_host_size: bool) -> usize {
        let width = self.mip_width(level).div_ceil(self.default_block_width());
        let height = self.mip_height(level).div_ceil(self.default_block_height());
        let depth = if self.is_layered { 1 } else { self.mip_depth(level) };
        let bpp = self.bytes_per_pixel();
        if as_host_size {
            return calculate_size(false, bpp, width, height, depth, 0, 0);
        }
        if self.is_tiled {
            return calculate_size(true, bpp, width, height, depth, self.mip_block_height(level), self.mip_block_depth(level));
        }
        let row = (width * bpp).max(self.pitch) as usize;
        row * height as usize * depth as usize
    }

    /// Guest bytes of one layer of `level`.
    #[must_use]
    pub fn guest_mipmap_size(&self, level: u32) -> usize {
        self.inner_mipmap_memory_size(level, false)
    }

    /// Host bytes of `level` across all layers.
    #[must_use]
    pub fn host_mipmap_size(&self, level: u32) -> usize {
        self.inner_mipmap_memory_size(level, true) * self.num_layers() as usize
    }

    /// Host bytes of a single layer of `level`.
    #[must_use]
    pub fn host_layer_size(&self, level: u32) -> usize {
        self.inner_mipmap_memory_size(level, true)
    }

    /// Offset of `level` inside a guest layer.
    #[must_use]
    pub fn guest_mipmap_level_offset(&self, level: u32) -> usize {
        (0..level).map(|l| self.guest_mipmap_size(l)).sum()
    }

    /// Offset of `level` inside the host buffer.
    #[must_use]
    pub fn host_mipmap_level_offset(&self, level: u32) -> usize {
        (0..level).map(|l| self.host_mipmap_size(l)).sum()
    }

    /// Bytes of one layer with every level. Guest layers are padded to whole
    /// blocks and never shorter than the programmed layer stride.
    #[must_use]
    pub fn layer_size(&self, as_host_size: bool) -> usize {
        let size: usize = (0..self.num_levels)
            .map(|level| self.inner_mipmap_memory_size(level, as_host_size))
            .sum();
        if as_host_size || !self.is_layered {
            return size;
        }
        let size = if self.is_tiled {
            align_up(size, 1usize << (GOB_SIZE_SHIFT + self.block_height + self.block_depth))
        } else {
            size
        };
        size.max(self.layer_stride as usize)
    }

    #[must_use]
    pub fn guest_size_in_bytes(&self) -> usize {
        self.layer_size(false) * self.num_layers() as usize
    }

    #[must_use]
    pub fn host_size_in_bytes(&self) -> usize {
        self.layer_size(true) * self.num_layers() as usize
    }

    // ─── Cross-Format Helpers ─────────────────────────────────────────────

    /// Width in `to` texels covering the bytes of `width` texels of `from`.
    #[must_use]
    pub fn convert_width(width: u32, from: PixelFormat, to: PixelFormat) -> u32 {
        let bytes = width.div_ceil(from.block_width()) * from.bytes_per_block();
        (bytes / to.bytes_per_block()).max(1) * to.block_width()
    }

    /// Height in `to` texels covering the rows of `height` texels of `from`.
    #[must_use]
    pub fn convert_height(height: u32, from: PixelFormat, to: PixelFormat) -> u32 {
        height.div_ceil(from.block_height()) * to.block_height()
    }

    /// Copyable width between `src` level `src_level` and `dst` level `dst_level`.
    #[must_use]
    pub fn intersect_width(src: &Self, dst: &Self, src_level: u32, dst_level: u32) -> u32 {
        src.mip_width(src_level).min(dst.mip_width(dst_level))
    }

    #[must_use]
    pub fn intersect_height(src: &Self, dst: &Self, src_level: u32, dst_level: u32) -> u32 {
        src.mip_height(src_level).min(dst.mip_height(dst_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba8_2d(width: u32, height: u32, block_height: u32) -> SurfaceParams {
        SurfaceParams::for_texture(&TextureInfo::new_2d(0, PixelFormat::Rgba8Unorm, width, height, block_height))
    }

    #[test]
    fn tiled_2d_size() {
        let params = rgba8_2d(256, 256, 4);
        assert_eq!(params.guest_size_in_bytes(), 256 * 256 * 4);
        assert_eq!(params.host_size_in_bytes(), 256 * 256 * 4);

        // 1 KiB wide rows are already GOB aligned, 20 rows pad up to 128.
        let params = rgba8_2d(256, 20, 4);
        assert_eq!(params.guest_size_in_bytes(), 1024 * 128);
        assert_eq!(params.host_size_in_bytes(), 1024 * 20);
    }

    #[test]
    fn mip_offsets_accumulate() {
        let info = TextureInfo::new_2d(0, PixelFormat::Rgba8Unorm, 64, 64, 3).with_levels(3);
        let params = SurfaceParams::for_texture(&info);
        assert_eq!(params.mip_width(1), 32);
        assert_eq!(params.mip_block_height(1), 2);
        assert_eq!(params.guest_mipmap_size(0), 256 * 64);
        assert_eq!(params.guest_mipmap_level_offset(1), 256 * 64);
        assert_eq!(params.host_mipmap_level_offset(2), 64 * 64 * 4 + 32 * 32 * 4);
    }

    #[test]
    fn cubemap_layers_are_block_aligned() {
        let info = TextureInfo::new_2d(0, PixelFormat::Rgba8Unorm, 16, 16, 1).with_target(SurfaceTarget::TextureCubemap, 1);
        let params = SurfaceParams::for_texture(&info);
        assert!(params.is_layered);
        assert_eq!(params.depth, 6);
        // 64 bytes x 16 rows = 1 KiB per face, already a multiple of 512 << 1.
        assert_eq!(params.layer_size(false), 1024);
        assert_eq!(params.guest_size_in_bytes(), 6 * 1024);
        assert_eq!(params.host_size_in_bytes(), 6 * 16 * 16 * 4);
    }

    #[test]
    fn compressed_sizes_round_up_to_blocks() {
        let info = TextureInfo::new_2d(0, PixelFormat::Bc1Unorm, 10, 10, 0).pitch_linear(0);
        let params = SurfaceParams::for_texture(&info);
        // 3x3 blocks of 8 bytes.
        assert_eq!(params.host_size_in_bytes(), 3 * 3 * 8);
        assert!(params.is_compressed());
    }

    #[test]
    fn pitch_linear_framebuffer_derives_width_from_pitch() {
        let config = RenderTargetConfig {
            address: 0x1000,
            width: 1024,
            height: 4,
            format: Some(PixelFormat::Rgba8Unorm),
            memory_layout: MemoryLayout::pitch_linear(),
            layers: 1,
            ..Default::default()
        };
        let params = SurfaceParams::for_framebuffer(&config, PixelFormat::Rgba8Unorm);
        assert!(!params.is_tiled);
        assert_eq!(params.width, 256);
        assert_eq!(params.pitch, 1024);
        assert_eq!(params.guest_size_in_bytes(), 1024 * 4);
    }

    #[test]
    fn layered_render_target_honors_programmed_stride() {
        let config = RenderTargetConfig {
            address: 0x10_0000,
            width: 64,
            height: 64,
            format: Some(PixelFormat::Rgba8Unorm),
            memory_layout: MemoryLayout::block_linear(4),
            layers: 4,
            layer_stride: 0x1_0000,
            base_layer: 9,
        };
        let params = SurfaceParams::for_framebuffer(&config, PixelFormat::Rgba8Unorm);
        assert!(params.is_layered);
        assert_eq!(params.base_layer, 3);
        // 256 bytes x 128 padded rows per layer, stretched to the stride.
        assert_eq!(params.layer_size(false), 0x1_0000);
        assert_eq!(params.guest_size_in_bytes(), 4 * 0x1_0000);
        assert_eq!(params.host_size_in_bytes(), 4 * 64 * 64 * 4);

        let packed = SurfaceParams::for_framebuffer(&RenderTargetConfig { layer_stride: 0, ..config }, PixelFormat::Rgba8Unorm);
        assert_eq!(packed.layer_size(false), 256 * 128);
    }

    #[test]
    fn tile_width_spacing_is_clamped_to_the_register_width() {
        let mut info = TextureInfo::new_2d(0, PixelFormat::Rgba8Unorm, 64, 64, 3);
        info.tile_width_spacing = 40;
        assert_eq!(SurfaceParams::for_texture(&info).tile_width_spacing, 1 << 7);
        info.tile_width_spacing = 2;
        assert_eq!(SurfaceParams::for_texture(&info).tile_width_spacing, 4);
    }

    #[test]
    fn width_conversion_preserves_bytes() {
        assert_eq!(SurfaceParams::convert_width(256, PixelFormat::Rgba8Unorm, PixelFormat::Bgra8Unorm), 256);
        assert_eq!(SurfaceParams::convert_width(256, PixelFormat::Rgba8Unorm, PixelFormat::Rgba16Float), 128);
        assert_eq!(SurfaceParams::convert_width(64, PixelFormat::Rgba32Uint, PixelFormat::Bc7Unorm), 256);
        assert_eq!(SurfaceParams::convert_height(64, PixelFormat::Rgba32Uint, PixelFormat::Bc7Unorm), 256);
    }

    #[test]
    fn degenerate_is_one_texel() {
        let params = rgba8_2d(256, 256, 4).degenerate();
        assert_eq!((params.width, params.height, params.depth), (1, 1, 1));
        assert_eq!(params.block_height, 0);
        assert_eq!(params.guest_size_in_bytes(), 64 * 8);
    }
}
