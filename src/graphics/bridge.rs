//! Colour-space bridge between the drawing surface and native bitmaps.
//!
//! The surface stores premultiplied ARGB32 words; the native bitmap image
//! representation wants 8-bit RGBA bytes, alpha last, premultiplied. Only the
//! channel order changes; no unpremultiply happens.

use super::surface::Surface;

/// Bytes per destination pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Copies `src` into an RGBA byte buffer with `dst_stride` bytes per row.
///
/// The copy is clipped to whichever of the two images is smaller; rows of
/// `dst` beyond the copied area are left untouched. Returns the number of
/// rows written.
pub fn argb32_to_rgba(src: &Surface, dst: &mut [u8], dst_stride: usize) -> usize {
    if dst_stride < BYTES_PER_PIXEL {
        return 0;
    }
    let columns = (src.width() as usize).min(dst_stride / BYTES_PER_PIXEL);
    let rows = (src.height() as usize).min(dst.len() / dst_stride);

    for (y, dst_row) in dst.chunks_mut(dst_stride).take(rows).enumerate() {
        let Some(src_row) = src.row(y as u32) else {
            break;
        };
        for (px, out) in src_row[..columns]
            .iter()
            .zip(dst_row.chunks_exact_mut(BYTES_PER_PIXEL))
        {
            out[0] = (px >> 16) as u8;
            out[1] = (px >> 8) as u8;
            out[2] = *px as u8;
            out[3] = (px >> 24) as u8;
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::surface::Color;

    #[test]
    fn channels_are_reordered_to_rgba() {
        let mut surface = Surface::new(2, 1);
        surface.set_pixel(0, 0, Color::rgba(0x10, 0x20, 0x30, 0xff));
        surface.set_pixel(1, 0, Color::rgba(0xff, 0, 0, 0x80));

        let mut dst = vec![0u8; 8];
        assert_eq!(argb32_to_rgba(&surface, &mut dst, 8), 1);
        assert_eq!(dst, [0x10, 0x20, 0x30, 0xff, 0x80, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn padded_stride_leaves_padding_untouched() {
        let mut surface = Surface::new(1, 2);
        surface.fill(Color::WHITE);

        // 1 pixel + 4 bytes padding per row.
        let mut dst = vec![0xAAu8; 16];
        argb32_to_rgba(&surface, &mut dst, 8);
        assert_eq!(&dst[0..4], &[0xff; 4]);
        assert_eq!(&dst[4..8], &[0xAA; 4]);
        assert_eq!(&dst[8..12], &[0xff; 4]);
        assert_eq!(&dst[12..16], &[0xAA; 4]);
    }

    #[test]
    fn copy_is_clipped_to_smaller_destination() {
        let mut surface = Surface::new(4, 4);
        surface.fill(Color::BLACK);

        let mut dst = vec![0u8; 2 * 4 * 2];
        assert_eq!(argb32_to_rgba(&surface, &mut dst, 8), 2);
        assert!(dst.chunks(4).all(|px| px == [0, 0, 0, 0xff]));
    }

    #[test]
    fn degenerate_stride_writes_nothing() {
        let surface = Surface::new(1, 1);
        let mut dst = vec![7u8; 3];
        assert_eq!(argb32_to_rgba(&surface, &mut dst, 3), 0);
        assert_eq!(dst, [7, 7, 7]);
    }
}
