//! Host Backend Seam
//!
//! The cache decides *what* host work is needed; a [`TextureBackend`] decides
//! *how* it runs on a concrete graphics API. Every method is a blocking call
//! from the cache's point of view.

use crate::engines::FermiCopyConfig;
use crate::memory::GpuVAddr;

use super::copy_params::CopyParams;
use super::params::SurfaceParams;
use super::view::ViewParams;

/// Device operations the cache needs from a host graphics API.
pub trait TextureBackend: Send {
    /// Host storage of one surface.
    type Texture: Send;
    /// Handle bound by the rasterizer. Cloned out of the cache on every
    /// resolve, so it should be cheap (an id or a reference-counted handle).
    type View: Clone + Send;

    /// Allocates storage for `params`. Contents are undefined.
    fn create_texture(&mut self, gpu_addr: GpuVAddr, params: &SurfaceParams) -> Self::Texture;

    fn create_view(&mut self, texture: &Self::Texture, params: &SurfaceParams, view: &ViewParams) -> Self::View;

    /// Replaces the whole texture with `data`, laid out as described in
    /// [`SurfaceParams`] host sizes.
    fn upload_texture(&mut self, texture: &Self::Texture, params: &SurfaceParams, data: &[u8]);

    /// Reads the whole texture back into `data` in the upload layout.
    fn download_texture(&mut self, texture: &Self::Texture, params: &SurfaceParams, data: &mut [u8]);

    fn image_copy(&mut self, src: &Self::Texture, dst: &Self::Texture, copy: &CopyParams);

    /// Scaled 2D engine blit between two views.
    fn image_blit(&mut self, src: &Self::View, dst: &Self::View, config: &FermiCopyConfig);

    /// Reinterpreting copy through a buffer, used when the two surfaces
    /// disagree on their fundamental type. May be slow.
    fn buffer_copy(
        &mut self,
        src: &Self::Texture,
        src_params: &SurfaceParams,
        dst: &Self::Texture,
        dst_params: &SurfaceParams,
    );
}
