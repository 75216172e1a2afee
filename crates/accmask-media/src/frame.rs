//! In-memory video frames.

use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::Array3;

use crate::error::{MediaError, MediaResult};

/// Number of color channels per pixel.
pub const CHANNELS: usize = 3;

/// An RGB frame stored as `(height, width, 3)` floats in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    data: Array3<f32>,
}

impl Frame {
    /// Wrap an existing `(height, width, 3)` array.
    pub fn from_array(data: Array3<f32>) -> MediaResult<Self> {
        if data.shape()[2] != CHANNELS {
            return Err(MediaError::InvalidVideo(format!(
                "expected {} channels, got {}",
                CHANNELS,
                data.shape()[2]
            )));
        }
        Ok(Self { data })
    }

    /// Frame filled with a single gray value.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            data: Array3::from_elem((height as usize, width as usize, CHANNELS), value),
        }
    }

    /// Build a frame from a per-pixel function of `(y, x, channel)`.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(usize, usize, usize) -> f32) -> Self {
        Self {
            data: Array3::from_shape_fn((height as usize, width as usize, CHANNELS), |(y, x, c)| {
                f(y, x, c)
            }),
        }
    }

    /// Convert an 8-bit RGB image.
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::from_fn(width, height, |y, x, c| {
            image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
    }

    /// Convert back to an 8-bit RGB image, rounding and clamping.
    pub fn to_rgb(&self) -> RgbImage {
        let (width, height) = (self.width(), self.height());
        ImageBuffer::from_fn(width, height, |x, y| {
            let px = |c: usize| {
                (self.data[[y as usize, x as usize, c]] * 255.0 + 0.5).clamp(0.0, 255.0) as u8
            };
            Rgb([px(0), px(1), px(2)])
        })
    }

    /// Convert to a `DynamicImage` for detector preprocessing.
    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.to_rgb())
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.data.shape()[1] as u32
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.data.shape()[0] as u32
    }

    /// `(width, height)` in pixels.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Underlying pixel array.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Mutable access to the pixel array.
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_round_trip() {
        let image = RgbImage::from_fn(4, 2, |x, y| Rgb([x as u8 * 60, y as u8 * 100, 7]));
        let frame = Frame::from_rgb(&image);

        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.to_rgb(), image);
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let data = Array3::<f32>::zeros((2, 2, 4));
        assert!(Frame::from_array(data).is_err());
    }
}
