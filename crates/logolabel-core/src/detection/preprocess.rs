//! Image preprocessing for the region-proposal detector.
//!
//! YOLOv8 ONNX exports expect:
//! - Input size: `input_size × input_size` (640 by default)
//! - Normalization: pixel / 255 → [0, 1], no mean/std
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

const CHANNELS: usize = 3;

/// Resize (without letterboxing) to the detector's square input and build an
/// NCHW tensor. Boxes are mapped back with independent x/y scale factors.
pub fn preprocess(image: &DynamicImage, input_size: u32) -> Array4<f32> {
    let resized = image.resize_exact(
        input_size,
        input_size,
        image::imageops::FilterType::Triangle,
    );
    let rgb = resized.to_rgb8();

    let size = input_size as usize;
    let plane = size * size;
    let mut data = vec![0.0f32; CHANNELS * plane];
    for (i, pixel) in rgb.as_raw().chunks_exact(CHANNELS).enumerate() {
        for (c, &val) in pixel.iter().enumerate() {
            data[c * plane + i] = val as f32 / 255.0;
        }
    }

    Array4::from_shape_vec((1, CHANNELS, size, size), data)
        .unwrap_or_else(|_| Array4::zeros((1, CHANNELS, size, size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_preprocess_shape() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(320, 200));
        let tensor = preprocess(&img, 640);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
    }

    #[test]
    fn test_preprocess_channel_planes() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 51])));
        let tensor = preprocess(&img, 8);
        assert!((tensor[[0, 0, 3, 3]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 1, 3, 3]].abs() < 1e-6);
        assert!((tensor[[0, 2, 3, 3]] - 0.2).abs() < 1e-6);
    }
}
