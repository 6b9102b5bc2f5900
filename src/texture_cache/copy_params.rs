/// A device-side copy of one box between two surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CopyParams {
    pub source_x: u32,
    pub source_y: u32,
    pub source_z: u32,
    pub dest_x: u32,
    pub dest_y: u32,
    pub dest_z: u32,
    pub source_level: u32,
    pub dest_level: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl CopyParams {
    /// A `width x height` copy of `layer`/`level` into the same layer and
    /// level of the destination.
    #[must_use]
    pub const fn layer_level(width: u32, height: u32, layer: u32, level: u32) -> Self {
        Self {
            source_x: 0,
            source_y: 0,
            source_z: layer,
            dest_x: 0,
            dest_y: 0,
            dest_z: layer,
            source_level: level,
            dest_level: level,
            width,
            height,
            depth: 1,
        }
    }

    /// A `width x height x depth` copy of `level` into the same level.
    #[must_use]
    pub const fn volume_level(width: u32, height: u32, depth: u32, level: u32) -> Self {
        Self {
            source_x: 0,
            source_y: 0,
            source_z: 0,
            dest_x: 0,
            dest_y: 0,
            dest_z: 0,
            source_level: level,
            dest_level: level,
            width,
            height,
            depth,
        }
    }

    /// Level 0 of a single-level source into `dest_layer`/`dest_level`.
    #[must_use]
    pub const fn into_layer_level(width: u32, height: u32, dest_layer: u32, dest_level: u32) -> Self {
        Self {
            source_x: 0,
            source_y: 0,
            source_z: 0,
            dest_x: 0,
            dest_y: 0,
            dest_z: dest_layer,
            source_level: 0,
            dest_level,
            width,
            height,
            depth: 1,
        }
    }
}
