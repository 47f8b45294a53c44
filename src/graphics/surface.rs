//! Off-screen drawing surface.
//!
//! Pixels are 32-bit premultiplied ARGB stored one `u32` per pixel, row
//! major, top row first. The surface is allocated once at the overlay's
//! maximum size and never reallocated.

use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to an overlay's surface. Every `create_surface` call on the
/// same overlay returns a clone of the same handle.
pub type SurfaceHandle = Rc<RefCell<Surface>>;

/// Straight (non-premultiplied) RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 0xff);
    pub const WHITE: Color = Color::rgba(0xff, 0xff, 0xff, 0xff);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Packs the colour as a premultiplied ARGB32 pixel.
    pub fn to_premultiplied(self) -> u32 {
        let a = u32::from(self.a);
        let mul = |c: u8| (u32::from(c) * a + 127) / 255;
        (a << 24) | (mul(self.r) << 16) | (mul(self.g) << 8) | mul(self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Surface {
    /// Allocates a fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major premultiplied ARGB pixels.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Pixels of row `y`, or `None` past the bottom edge.
    pub fn row(&self, y: u32) -> Option<&[u32]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        Some(&self.pixels[start..start + self.width as usize])
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Writes one pixel; out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = color.to_premultiplied();
        }
    }

    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color.to_premultiplied());
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Fills a rectangle, clipped to the surface bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Color) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        if x >= x_end || y >= y_end {
            return;
        }
        let value = color.to_premultiplied();
        let stride = self.width as usize;
        for row in y..y_end {
            let start = row as usize * stride;
            self.pixels[start + x as usize..start + x_end as usize].fill(value);
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_surface_is_transparent() {
        let surface = Surface::new(4, 3);
        assert_eq!(surface.pixels().len(), 12);
        assert!(surface.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn premultiplication_scales_channels_by_alpha() {
        assert_eq!(Color::WHITE.to_premultiplied(), 0xffff_ffff);
        assert_eq!(Color::rgba(0xff, 0, 0, 0x80).to_premultiplied(), 0x8080_0000);
        assert_eq!(Color::rgba(0xff, 0xff, 0xff, 0).to_premultiplied(), 0);
    }

    #[test]
    fn fill_rect_is_clipped() {
        let mut surface = Surface::new(4, 4);
        surface.fill_rect(2, 2, 10, 10, Color::BLACK);
        assert_eq!(surface.pixel(1, 1), Some(0));
        assert_eq!(surface.pixel(2, 2), Some(0xff00_0000));
        assert_eq!(surface.pixel(3, 3), Some(0xff00_0000));
        assert_eq!(surface.pixel(4, 4), None);
    }

    #[test]
    fn fill_rect_outside_is_noop() {
        let mut surface = Surface::new(4, 4);
        surface.fill_rect(5, 0, 2, 2, Color::WHITE);
        assert!(surface.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn set_pixel_ignores_out_of_bounds() {
        let mut surface = Surface::new(2, 2);
        surface.set_pixel(9, 9, Color::WHITE);
        surface.set_pixel(1, 0, Color::WHITE);
        assert_eq!(surface.row(0), Some(&[0, 0xffff_ffff][..]));
        assert_eq!(surface.row(2), None);
    }

    #[test]
    fn clear_resets_after_fill() {
        let mut surface = Surface::new(3, 1);
        surface.fill(Color::WHITE);
        surface.clear();
        assert!(surface.pixels().iter().all(|&p| p == 0));
    }
}
