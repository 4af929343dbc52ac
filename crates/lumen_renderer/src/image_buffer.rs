//! Output image buffer.

use std::path::Path;

use image::{ImageBuffer as RasterBuffer, Rgb, Rgb32FImage, RgbImage};
use log::info;
use lumen_core::Color;

use crate::error::ImageError;

/// Row-major RGB float image; row 0 is the top.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    width: usize,
    height: usize,
    pixels: Vec<[f32; 3]>,
}

impl ImageBuffer {
    /// Create a new image buffer filled with black.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 3]; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 3]] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> Color {
        Color::from_array(self.pixels[y * self.width + x])
    }

    pub fn set(&mut self, x: usize, y: usize, color: Color) {
        self.pixels[y * self.width + x] = color.to_array();
    }

    /// Copies a `width`-wide block of row-major pixels in at `(x, y)`.
    pub fn write_block(&mut self, x: usize, y: usize, width: usize, block: &[Color]) {
        for (row, line) in block.chunks_exact(width).enumerate() {
            let start = (y + row) * self.width + x;
            for (dst, src) in self.pixels[start..start + width].iter_mut().zip(line) {
                *dst = src.to_array();
            }
        }
    }

    /// Flat `[r, g, b, r, g, b, ...]` view of the pixels.
    pub fn as_floats(&self) -> &[f32] {
        bytemuck::cast_slice(self.pixels.as_slice())
    }

    /// Writes the image; `.exr` and `.hdr` keep floats, other formats are
    /// clamped to 8 bits.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ImageError> {
        let path = path.as_ref();
        let size_error = || ImageError::Size {
            width: self.width,
            height: self.height,
        };
        let width = u32::try_from(self.width).map_err(|_| size_error())?;
        let height = u32::try_from(self.height).map_err(|_| size_error())?;

        let float_output = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("exr") || e.eq_ignore_ascii_case("hdr"));

        if float_output {
            let buffer: Rgb32FImage =
                RasterBuffer::from_raw(width, height, self.as_floats().to_vec()).ok_or_else(size_error)?;
            buffer.save(path)?;
        } else {
            let bytes = self
                .as_floats()
                .iter()
                .map(|&c| (255.0 * c.clamp(0.0, 1.0) + 0.5) as u8)
                .collect();
            let buffer: RgbImage = RasterBuffer::<Rgb<u8>, _>::from_raw(width, height, bytes)
                .ok_or_else(size_error)?;
            buffer.save(path)?;
        }
        info!("Wrote {}x{} image to {}", self.width, self.height, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_row_major() {
        let mut image = ImageBuffer::new(4, 3);
        image.set(3, 1, Color::new(1.0, 2.0, 3.0));
        assert_eq!(image.get(3, 1), Color::new(1.0, 2.0, 3.0));
        assert_eq!(image.pixels()[7], [1.0, 2.0, 3.0]);
        assert_eq!(&image.as_floats()[21..24], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_write_block() {
        let mut image = ImageBuffer::new(4, 4);
        let block = vec![Color::ONE; 4];
        image.write_block(2, 1, 2, &block);
        assert_eq!(image.get(2, 1), Color::ONE);
        assert_eq!(image.get(3, 2), Color::ONE);
        assert_eq!(image.get(1, 1), Color::ZERO);
        assert_eq!(image.get(2, 3), Color::ZERO);
    }

    #[test]
    fn test_save_png() {
        let mut image = ImageBuffer::new(2, 2);
        image.set(0, 0, Color::new(1.0, 0.0, 0.5));
        let path = std::env::temp_dir().join(format!("lumen_image_test_{}.png", std::process::id()));
        image.save(&path).unwrap();
        let loaded = ::image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.get_pixel(0, 0).0, [255, 0, 128]);
        std::fs::remove_file(&path).ok();
    }
}
