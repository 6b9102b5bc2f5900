//! Engine Register Snapshots
//!
//! The cache does not decode command streams. The command processor hands it
//! already-decoded register state:
//!
//! - [`Maxwell3dState`]: 3D engine render target and depth buffer
//!   configuration, plus the dirty flags the cache clears after resolving a
//!   framebuffer slot.
//! - [`FermiSurface`] / [`FermiCopyConfig`]: the two sides of a 2D engine blit.
//! - [`TextureInfo`]: a decoded texture image control entry for a sampler.

use bitflags::bitflags;

use crate::memory::GpuVAddr;
use crate::surface::{PixelFormat, SurfaceTarget};

/// Number of color render target slots.
pub const NUM_RENDER_TARGETS: usize = 8;

/// Tiling of a render target or depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryLayout {
    /// log2 GOB counts.
    pub block_width: u32,
    pub block_height: u32,
    pub block_depth: u32,
    pub is_pitch_linear: bool,
}

impl MemoryLayout {
    #[must_use]
    pub const fn block_linear(block_height: u32) -> Self {
        Self {
            block_width: 0,
            block_height,
            block_depth: 0,
            is_pitch_linear: false,
        }
    }

    #[must_use]
    pub const fn pitch_linear() -> Self {
        Self {
            block_width: 0,
            block_height: 0,
            block_depth: 0,
            is_pitch_linear: true,
        }
    }
}

/// One color render target slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderTargetConfig {
    pub address: GpuVAddr,
    /// Width in texels, or the pitch in bytes when pitch linear.
    pub width: u32,
    pub height: u32,
    /// `None` disables the slot.
    pub format: Option<PixelFormat>,
    pub memory_layout: MemoryLayout,
    /// Number of array layers bound; `0` and `1` both bind a plain 2D target.
    pub layers: u32,
    /// Programmed distance between layers in bytes. `0` packs layers.
    pub layer_stride: u32,
    /// First layer rendered to.
    pub base_layer: u32,
}

/// Depth/stencil buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZetaConfig {
    pub address: GpuVAddr,
    pub format: PixelFormat,
    pub memory_layout: MemoryLayout,
}

impl Default for ZetaConfig {
    fn default() -> Self {
        Self {
            address: 0,
            format: PixelFormat::D24UnormS8Uint,
            memory_layout: MemoryLayout::default(),
        }
    }
}

/// Framebuffer registers of the 3D engine.
#[derive(Debug, Clone, Default)]
pub struct FramebufferRegs {
    pub rt: [RenderTargetConfig; NUM_RENDER_TARGETS],
    /// Number of enabled color targets.
    pub rt_count: usize,
    pub zeta: ZetaConfig,
    pub zeta_enable: bool,
    pub zeta_width: u32,
    pub zeta_height: u32,
}

bitflags! {
    /// Framebuffer state changed since the cache last resolved it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u16 {
        const COLOR_BUFFER_0 = 1 << 0;
        const COLOR_BUFFER_1 = 1 << 1;
        const COLOR_BUFFER_2 = 1 << 2;
        const COLOR_BUFFER_3 = 1 << 3;
        const COLOR_BUFFER_4 = 1 << 4;
        const COLOR_BUFFER_5 = 1 << 5;
        const COLOR_BUFFER_6 = 1 << 6;
        const COLOR_BUFFER_7 = 1 << 7;
        const ZETA_BUFFER = 1 << 8;

        const COLOR_BUFFERS = 0xFF;
        const ALL = Self::COLOR_BUFFERS.bits() | Self::ZETA_BUFFER.bits();
    }
}

impl DirtyFlags {
    /// Flag of color slot `index`.
    #[inline]
    #[must_use]
    pub fn color_buffer(index: usize) -> Self {
        debug_assert!(index < NUM_RENDER_TARGETS);
        Self::from_bits_truncate(1 << index)
    }
}

/// 3D engine state visible to the cache.
#[derive(Debug, Clone)]
pub struct Maxwell3dState {
    pub regs: FramebufferRegs,
    pub dirty_flags: DirtyFlags,
}

impl Maxwell3dState {
    /// Every slot starts dirty so the first resolve reads the registers.
    #[must_use]
    pub fn new(regs: FramebufferRegs) -> Self {
        Self {
            regs,
            dirty_flags: DirtyFlags::ALL,
        }
    }

    /// Replaces color slot `index` and marks it dirty.
    pub fn set_render_target(&mut self, index: usize, config: RenderTargetConfig) {
        self.regs.rt[index] = config;
        self.dirty_flags |= DirtyFlags::color_buffer(index);
    }

    /// Replaces the depth buffer configuration and marks it dirty.
    pub fn set_zeta(&mut self, zeta: ZetaConfig, width: u32, height: u32, enable: bool) {
        self.regs.zeta = zeta;
        self.regs.zeta_width = width;
        self.regs.zeta_height = height;
        self.regs.zeta_enable = enable;
        self.dirty_flags |= DirtyFlags::ZETA_BUFFER;
    }
}

impl Default for Maxwell3dState {
    fn default() -> Self {
        Self::new(FramebufferRegs::default())
    }
}

/// One side of a 2D engine copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FermiSurface {
    pub address: GpuVAddr,
    pub format: PixelFormat,
    pub linear: bool,
    /// log2 GOB counts; ignored when linear.
    pub block_width: u32,
    pub block_height: u32,
    pub block_depth: u32,
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes; only meaningful when linear.
    pub pitch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlitFilter {
    #[default]
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlitOperation {
    #[default]
    SrcCopy,
    SrcCopyAnd,
    Blend,
}

/// Integer rectangle, `[left, right) x [top, bottom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// 2D engine blit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FermiCopyConfig {
    pub operation: BlitOperation,
    pub filter: BlitFilter,
    pub src_rect: Rect,
    pub dst_rect: Rect,
}

/// Decoded texture image control entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub address: GpuVAddr,
    pub format: PixelFormat,
    pub target: SurfaceTarget,
    pub width: u32,
    pub height: u32,
    /// Depth of a 3D texture, or the layer count of an array. Cube faces are
    /// not included.
    pub depth: u32,
    pub num_levels: u32,
    pub is_tiled: bool,
    /// log2 GOB counts.
    pub block_width: u32,
    pub block_height: u32,
    pub block_depth: u32,
    /// log2 of the tile width spacing.
    pub tile_width_spacing: u32,
    /// Row pitch in bytes for pitch linear textures.
    pub pitch: u32,
}

impl TextureInfo {
    /// A single-level, block linear 2D texture.
    #[must_use]
    pub fn new_2d(address: GpuVAddr, format: PixelFormat, width: u32, height: u32, block_height: u32) -> Self {
        Self {
            address,
            format,
            target: SurfaceTarget::Texture2D,
            width,
            height,
            depth: 1,
            num_levels: 1,
            is_tiled: true,
            block_width: 0,
            block_height,
            block_depth: 0,
            tile_width_spacing: 0,
            pitch: 0,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: SurfaceTarget, depth: u32) -> Self {
        self.target = target;
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn with_levels(mut self, num_levels: u32) -> Self {
        self.num_levels = num_levels;
        self
    }

    #[must_use]
    pub fn with_block_depth(mut self, block_depth: u32) -> Self {
        self.block_depth = block_depth;
        self
    }

    /// Switches to a pitch linear layout with `pitch` bytes per row.
    #[must_use]
    pub fn pitch_linear(mut self, pitch: u32) -> Self {
        self.is_tiled = false;
        self.block_height = 0;
        self.block_depth = 0;
        self.pitch = pitch;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_fully_dirty() {
        let state = Maxwell3dState::default();
        for index in 0..NUM_RENDER_TARGETS {
            assert!(state.dirty_flags.contains(DirtyFlags::color_buffer(index)));
        }
        assert!(state.dirty_flags.contains(DirtyFlags::ZETA_BUFFER));
    }

    #[test]
    fn setting_a_target_dirties_only_that_slot() {
        let mut state = Maxwell3dState::default();
        state.dirty_flags = DirtyFlags::empty();
        state.set_render_target(3, RenderTargetConfig::default());
        assert_eq!(state.dirty_flags, DirtyFlags::COLOR_BUFFER_3);
    }
}
