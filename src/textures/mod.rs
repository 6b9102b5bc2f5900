//! Guest Texture Layouts
//!
//! Maxwell stores tiled textures in a "block linear" layout built from GOBs
//! (groups of bytes): 64 bytes wide, 8 rows tall, 512 bytes in total. GOBs
//! are stacked vertically into blocks of `1 << block_height` GOBs and in depth
//! into `1 << block_depth` slices; blocks are then laid out row-major across
//! the image.
//!
//! This module converts between that layout and the tightly packed linear
//! layout the host backends expect, and computes guest allocation sizes.

pub mod decoders;

pub use decoders::{
    calculate_size, convert_s8z24_to_z24s8, convert_z24s8_to_s8z24, swizzle_offset, swizzle_texture,
    unswizzle_texture,
};

/// Width of a GOB in bytes.
pub const GOB_SIZE_X: u32 = 64;
/// Height of a GOB in rows.
pub const GOB_SIZE_Y: u32 = 8;
/// Size of a GOB in bytes.
pub const GOB_SIZE: u32 = GOB_SIZE_X * GOB_SIZE_Y;
/// `log2(GOB_SIZE)`.
pub const GOB_SIZE_SHIFT: u32 = 9;

#[inline]
#[must_use]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Smallest `n` such that `1 << n >= value`.
#[inline]
#[must_use]
pub const fn log2_ceil(value: u32) -> u32 {
    if value <= 1 { 0 } else { u32::BITS - (value - 1).leading_zeros() }
}
