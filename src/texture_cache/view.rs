use crate::surface::SurfaceTarget;

/// Sub-range and target of a surface exposed through a view.
///
/// Views are cached per surface under these parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewParams {
    pub target: SurfaceTarget,
    pub base_layer: u32,
    pub num_layers: u32,
    pub base_level: u32,
    pub num_levels: u32,
}

impl ViewParams {
    #[must_use]
    pub const fn new(target: SurfaceTarget, base_layer: u32, num_layers: u32, base_level: u32, num_levels: u32) -> Self {
        Self {
            target,
            base_layer,
            num_layers,
            base_level,
            num_levels,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_layered(&self) -> bool {
        self.target.is_layered()
    }
}
