//! Surface Formats and Targets
//!
//! Guest-visible pixel formats of the Maxwell texture and render target
//! units, together with the per-format properties the cache reasons about:
//! compression block size, bytes per block, component type, surface type and
//! how the host stores the format.
//!
//! # Sibling formats
//!
//! Some formats share an identical bit layout and only differ in how the bits
//! are interpreted (a 16-bit depth buffer and a 16-bit unorm red channel).
//! Outside of render target resolves such formats can alias the same host
//! texture without conversion. [`SiblingTable`] records these pairs.

mod format;

pub use format::{FormatInfo, PixelFormat};

/// Numeric interpretation of a format's components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    UNorm,
    SNorm,
    UInt,
    SInt,
    Float,
}

/// Fundamental category of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    ColorTexture,
    Depth,
    DepthStencil,
}

/// How a format's guest encoding maps onto host storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceCompression {
    /// Stored as-is.
    None,
    /// Block compressed, stored as-is by the host.
    Compressed,
    /// Decoded for the host; cannot be encoded back to guest memory.
    Converted,
    /// Same size on both sides but with rearranged bits (S8Z24 <-> Z24S8).
    Rearranged,
}

/// Dimensionality and layering of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceTarget {
    Texture1D,
    TextureBuffer,
    Texture2D,
    Texture3D,
    Texture1DArray,
    Texture2DArray,
    TextureCubemap,
    TextureCubeArray,
}

impl SurfaceTarget {
    /// Whether the target addresses independent layers.
    #[inline]
    #[must_use]
    pub fn is_layered(self) -> bool {
        matches!(
            self,
            Self::Texture1DArray | Self::Texture2DArray | Self::TextureCubemap | Self::TextureCubeArray
        )
    }

    #[inline]
    #[must_use]
    pub fn is_cube(self) -> bool {
        matches!(self, Self::TextureCubemap | Self::TextureCubeArray)
    }
}

/// Pairs of formats that may alias each other without conversion.
#[derive(Debug, Clone)]
pub struct SiblingTable {
    siblings: [Option<PixelFormat>; PixelFormat::COUNT],
}

impl SiblingTable {
    /// An empty table: no two formats alias.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            siblings: [None; PixelFormat::COUNT],
        }
    }

    /// Depth/color pairs with identical bit layouts.
    #[must_use]
    pub fn maxwell() -> Self {
        let mut table = Self::empty();
        table.make_siblings(PixelFormat::D16Unorm, PixelFormat::R16Unorm);
        table.make_siblings(PixelFormat::D32Float, PixelFormat::R32Float);
        table.make_siblings(PixelFormat::D32FloatS8Uint, PixelFormat::Rg32Float);
        table
    }

    pub fn make_siblings(&mut self, a: PixelFormat, b: PixelFormat) {
        self.siblings[a as usize] = Some(b);
        self.siblings[b as usize] = Some(a);
    }

    #[inline]
    #[must_use]
    pub fn sibling(&self, format: PixelFormat) -> Option<PixelFormat> {
        self.siblings[format as usize]
    }

    /// Whether `a` is registered as the sibling of `b`.
    #[inline]
    #[must_use]
    pub fn are_siblings(&self, a: PixelFormat, b: PixelFormat) -> bool {
        self.sibling(a) == Some(b)
    }
}

impl Default for SiblingTable {
    fn default() -> Self {
        Self::maxwell()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maxwell_siblings_are_symmetric() {
        let table = SiblingTable::maxwell();
        assert!(table.are_siblings(PixelFormat::D16Unorm, PixelFormat::R16Unorm));
        assert!(table.are_siblings(PixelFormat::R16Unorm, PixelFormat::D16Unorm));
        assert!(table.are_siblings(PixelFormat::R32Float, PixelFormat::D32Float));
        assert!(table.are_siblings(PixelFormat::Rg32Float, PixelFormat::D32FloatS8Uint));
        assert!(!table.are_siblings(PixelFormat::Rgba8Unorm, PixelFormat::Bgra8Unorm));
    }

    #[test]
    fn layered_targets() {
        assert!(SurfaceTarget::TextureCubemap.is_layered());
        assert!(SurfaceTarget::Texture2DArray.is_layered());
        assert!(!SurfaceTarget::Texture3D.is_layered());
        assert!(!SurfaceTarget::Texture2D.is_layered());
    }
}
