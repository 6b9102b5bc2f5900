use super::{ComponentType, SurfaceCompression, SurfaceType};

/// Static properties of a [`PixelFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Width of a compression block in texels (1 for uncompressed formats).
    pub block_width: u32,
    /// Height of a compression block in texels (1 for uncompressed formats).
    pub block_height: u32,
    /// Size in bytes of one block (one texel when uncompressed).
    pub bytes_per_block: u32,
    pub component_type: ComponentType,
    pub surface_type: SurfaceType,
    pub compression: SurfaceCompression,
}

impl FormatInfo {
    const fn color(bytes_per_block: u32, component_type: ComponentType) -> Self {
        Self {
            block_width: 1,
            block_height: 1,
            bytes_per_block,
            component_type,
            surface_type: SurfaceType::ColorTexture,
            compression: SurfaceCompression::None,
        }
    }

    const fn compressed(block_width: u32, block_height: u32, bytes_per_block: u32, compression: SurfaceCompression) -> Self {
        Self {
            block_width,
            block_height,
            bytes_per_block,
            component_type: ComponentType::UNorm,
            surface_type: SurfaceType::ColorTexture,
            compression,
        }
    }

    const fn depth(bytes_per_block: u32, component_type: ComponentType, surface_type: SurfaceType, compression: SurfaceCompression) -> Self {
        Self {
            block_width: 1,
            block_height: 1,
            bytes_per_block,
            component_type,
            surface_type,
            compression,
        }
    }
}

/// Guest pixel formats understood by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    B5G6R5Unorm,
    A2B10G10R10Unorm,
    A1B5G5R5Unorm,
    R8Unorm,
    R8Uint,
    Rg8Unorm,
    Rg8Snorm,
    R16Float,
    R16Unorm,
    R16Snorm,
    R16Uint,
    R16Sint,
    Rg16Unorm,
    Rg16Snorm,
    Rg16Float,
    Rg16Uint,
    Rg16Sint,
    R32Float,
    R32Uint,
    R32Sint,
    R11G11B10Float,
    E5B9G9R9Float,
    Rgba16Float,
    Rgba16Unorm,
    Rgba16Uint,
    Rg32Float,
    Rg32Uint,
    Rgb32Float,
    Rgba32Float,
    Rgba32Uint,
    Bc1Unorm,
    Bc1Srgb,
    Bc2Unorm,
    Bc3Unorm,
    Bc4Unorm,
    Bc5Unorm,
    Bc6hUfloat,
    Bc7Unorm,
    Astc4x4Unorm,
    Astc4x4Srgb,
    Astc5x4Unorm,
    Astc8x5Unorm,
    Astc8x8Unorm,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    S8UintD24Unorm,
    D32FloatS8Uint,
}

impl PixelFormat {
    /// Number of variants.
    pub const COUNT: usize = Self::D32FloatS8Uint as usize + 1;

    #[must_use]
    pub const fn info(self) -> FormatInfo {
        use ComponentType::{Float, SInt, SNorm, UInt, UNorm};
        use SurfaceCompression::{Compressed, Converted, Rearranged};

        match self {
            Self::Rgba8Unorm | Self::Rgba8Srgb | Self::Bgra8Unorm | Self::Bgra8Srgb | Self::A2B10G10R10Unorm | Self::Rg16Unorm => FormatInfo::color(4, UNorm),
            Self::Rgba8Snorm | Self::Rg16Snorm => FormatInfo::color(4, SNorm),
            Self::Rgba8Uint | Self::Rg16Uint | Self::R32Uint => FormatInfo::color(4, UInt),
            Self::B5G6R5Unorm | Self::A1B5G5R5Unorm | Self::Rg8Unorm | Self::R16Unorm => FormatInfo::color(2, UNorm),
            Self::R8Unorm => FormatInfo::color(1, UNorm),
            Self::R8Uint => FormatInfo::color(1, UInt),
            Self::Rg8Snorm | Self::R16Snorm => FormatInfo::color(2, SNorm),
            Self::R16Float => FormatInfo::color(2, Float),
            Self::R16Uint => FormatInfo::color(2, UInt),
            Self::R16Sint => FormatInfo::color(2, SInt),
            Self::Rg16Float | Self::R32Float | Self::R11G11B10Float | Self::E5B9G9R9Float => FormatInfo::color(4, Float),
            Self::Rg16Sint | Self::R32Sint => FormatInfo::color(4, SInt),
            Self::Rgba16Float | Self::Rg32Float => FormatInfo::color(8, Float),
            Self::Rgba16Unorm => FormatInfo::color(8, UNorm),
            Self::Rgba16Uint | Self::Rg32Uint => FormatInfo::color(8, UInt),
            Self::Rgb32Float => FormatInfo::color(12, Float),
            Self::Rgba32Float => FormatInfo::color(16, Float),
            Self::Rgba32Uint => FormatInfo::color(16, UInt),
            Self::Bc1Unorm | Self::Bc1Srgb | Self::Bc4Unorm => FormatInfo::compressed(4, 4, 8, Compressed),
            Self::Bc2Unorm | Self::Bc3Unorm | Self::Bc5Unorm | Self::Bc6hUfloat | Self::Bc7Unorm => FormatInfo::compressed(4, 4, 16, Compressed),
            Self::Astc4x4Unorm | Self::Astc4x4Srgb => FormatInfo::compressed(4, 4, 16, Converted),
            Self::Astc5x4Unorm => FormatInfo::compressed(5, 4, 16, Converted),
            Self::Astc8x5Unorm => FormatInfo::compressed(8, 5, 16, Converted),
            Self::Astc8x8Unorm => FormatInfo::compressed(8, 8, 16, Converted),
            Self::D16Unorm => FormatInfo::depth(2, UNorm, SurfaceType::Depth, SurfaceCompression::None),
            Self::D32Float => FormatInfo::depth(4, Float, SurfaceType::Depth, SurfaceCompression::None),
            Self::D24UnormS8Uint => FormatInfo::depth(4, UNorm, SurfaceType::DepthStencil, SurfaceCompression::None),
            Self::S8UintD24Unorm => FormatInfo::depth(4, UNorm, SurfaceType::DepthStencil, Rearranged),
            Self::D32FloatS8Uint => FormatInfo::depth(8, Float, SurfaceType::DepthStencil, SurfaceCompression::None),
        }
    }

    #[inline]
    #[must_use]
    pub const fn block_width(self) -> u32 {
        self.info().block_width
    }

    #[inline]
    #[must_use]
    pub const fn block_height(self) -> u32 {
        self.info().block_height
    }

    #[inline]
    #[must_use]
    pub const fn bytes_per_block(self) -> u32 {
        self.info().bytes_per_block
    }

    #[inline]
    #[must_use]
    pub const fn component_type(self) -> ComponentType {
        self.info().component_type
    }

    #[inline]
    #[must_use]
    pub const fn surface_type(self) -> SurfaceType {
        self.info().surface_type
    }

    #[inline]
    #[must_use]
    pub const fn compression(self) -> SurfaceCompression {
        self.info().compression
    }

    /// Whether the format is stored in compression blocks larger than a texel.
    #[inline]
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        let info = self.info();
        info.block_width > 1 || info.block_height > 1
    }

    #[inline]
    #[must_use]
    pub const fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8Srgb | Self::Bgra8Srgb | Self::Bc1Srgb | Self::Astc4x4Srgb)
    }

    /// Whether the format has a depth component.
    #[inline]
    #[must_use]
    pub const fn is_depth(self) -> bool {
        !matches!(self.info().surface_type, SurfaceType::ColorTexture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_covers_last_variant() {
        assert_eq!(PixelFormat::COUNT, PixelFormat::D32FloatS8Uint as usize + 1);
    }

    #[test]
    fn block_properties() {
        assert_eq!(PixelFormat::Rgba8Unorm.bytes_per_block(), 4);
        assert!(!PixelFormat::Rgba8Unorm.is_compressed());

        let bc1 = PixelFormat::Bc1Unorm.info();
        assert_eq!((bc1.block_width, bc1.block_height, bc1.bytes_per_block), (4, 4, 8));

        let astc = PixelFormat::Astc8x5Unorm;
        assert_eq!((astc.block_width(), astc.block_height()), (8, 5));
        assert_eq!(astc.compression(), SurfaceCompression::Converted);
    }

    #[test]
    fn depth_formats() {
        assert_eq!(PixelFormat::D16Unorm.surface_type(), SurfaceType::Depth);
        assert_eq!(PixelFormat::S8UintD24Unorm.surface_type(), SurfaceType::DepthStencil);
        assert_eq!(PixelFormat::S8UintD24Unorm.compression(), SurfaceCompression::Rearranged);
        assert!(!PixelFormat::R16Unorm.is_depth());
        assert!(PixelFormat::D32FloatS8Uint.is_depth());
    }
}
