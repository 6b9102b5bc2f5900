use super::{GOB_SIZE, GOB_SIZE_X, GOB_SIZE_Y, align_up};

/// Size in bytes of a `width x height x depth` image of `bytes_per_pixel`
/// texels (or compression blocks).
///
/// Tiled sizes are padded to whole GOBs horizontally and to whole blocks
/// vertically and in depth. `block_height` and `block_depth` are log2 GOB
/// counts.
#[must_use]
pub fn calculate_size(
    tiled: bool,
    bytes_per_pixel: u32,
    width: u32,
    height: u32,
    depth: u32,
    block_height: u32,
    block_depth: u32,
) -> usize {
    if !tiled {
        return width as usize * height as usize * depth as usize * bytes_per_pixel as usize;
    }
    let aligned_width = align_up(width as usize * bytes_per_pixel as usize, GOB_SIZE_X as usize);
    let aligned_height = align_up(height as usize, (GOB_SIZE_Y << block_height) as usize);
    let aligned_depth = align_up(depth as usize, 1usize << block_depth);
    aligned_width * aligned_height * aligned_depth
}

/// Byte offset of texel `(x, y, z)` inside a block linear image.
#[must_use]
pub fn swizzle_offset(
    x: u32,
    y: u32,
    z: u32,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    block_height: u32,
    block_depth: u32,
) -> usize {
    let gobs_y = 1usize << block_height;
    let gobs_z = 1usize << block_depth;
    let (y, z) = (y as usize, z as usize);

    let image_width_in_gobs = (width as usize * bytes_per_pixel as usize).div_ceil(GOB_SIZE_X as usize);
    let block_rows = (height as usize).div_ceil(GOB_SIZE_Y as usize * gobs_y);
    let block_size = GOB_SIZE as usize * gobs_y * gobs_z;

    let x = x as usize * bytes_per_pixel as usize;
    let block_index = (z / gobs_z) * block_rows * image_width_in_gobs
        + (y / (GOB_SIZE_Y as usize * gobs_y)) * image_width_in_gobs
        + x / GOB_SIZE_X as usize;
    let gob_in_block = (z % gobs_z) * gobs_y + (y % (GOB_SIZE_Y as usize * gobs_y)) / GOB_SIZE_Y as usize;

    block_index * block_size
        + gob_in_block * GOB_SIZE as usize
        + ((x % 64) / 32) * 256
        + ((y % 8) / 2) * 64
        + ((x % 32) / 16) * 32
        + (y % 2) * 16
        + (x % 16)
}

/// Block linear `swizzled` -> tightly packed `linear`.
///
/// Texels that fall outside either buffer are skipped.
pub fn unswizzle_texture(
    swizzled: &[u8],
    linear: &mut [u8],
    bytes_per_pixel: u32,
    width: u32,
    height: u32,
    depth: u32,
    block_height: u32,
    block_depth: u32,
) {
    let bpp = bytes_per_pixel as usize;
    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                let src = swizzle_offset(x, y, z, width, height, bytes_per_pixel, block_height, block_depth);
                let dst = ((z as usize * height as usize + y as usize) * width as usize + x as usize) * bpp;
                let (Some(tiled), Some(packed)) = (swizzled.get(src..src + bpp), linear.get_mut(dst..dst + bpp)) else {
                    continue;
                };
                packed.copy_from_slice(tiled);
            }
        }
    }
}

/// Tightly packed `linear` -> block linear `swizzled`.
///
/// Bytes of `swizzled` not covered by a texel (GOB padding) are left untouched.
pub fn swizzle_texture(
    swizzled: &mut [u8],
    linear: &[u8],
    bytes_per_pixel: u32,
    width: u32,
    height: u32,
    depth: u32,
    block_height: u32,
    block_depth: u32,
) {
    let bpp = bytes_per_pixel as usize;
    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                let dst = swizzle_offset(x, y, z, width, height, bytes_per_pixel, block_height, block_depth);
                let src = ((z as usize * height as usize + y as usize) * width as usize + x as usize) * bpp;
                let (Some(tiled), Some(packed)) = (swizzled.get_mut(dst..dst + bpp), linear.get(src..src + bpp)) else {
                    continue;
                };
                tiled.copy_from_slice(packed);
            }
        }
    }
}

/// Guest S8Z24 (stencil in the top byte) to host Z24S8, in place.
pub fn convert_s8z24_to_z24s8(data: &mut [u8]) {
    for texel in data.chunks_exact_mut(4) {
        let value = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
        let z24 = value & 0x00FF_FFFF;
        let s8 = value >> 24;
        texel.copy_from_slice(&((z24 << 8) | s8).to_le_bytes());
    }
}

/// Host Z24S8 back to guest S8Z24, in place.
pub fn convert_z24s8_to_s8z24(data: &mut [u8]) {
    for texel in data.chunks_exact_mut(4) {
        let value = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
        let z24 = value >> 8;
        let s8 = value & 0xFF;
        texel.copy_from_slice(&((s8 << 24) | z24).to_le_bytes());
    }
}
