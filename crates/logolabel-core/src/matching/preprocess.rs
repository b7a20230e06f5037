//! Image preprocessing for the CLIP visual encoder.
//!
//! CLIP ViT-B/32 expects:
//! - Shortest edge resized to `image_size` (bicubic), then a center crop of
//!   `image_size × image_size`
//! - Normalization: (pixel/255 - mean) / std with CLIP's per-channel stats
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// CLIP normalization mean (per-channel).
const NORM_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std (per-channel).
const NORM_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Preprocess a patch for CLIP inference.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let (w, h) = (image.width().max(1), image.height().max(1));
    let scale = image_size as f32 / w.min(h) as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(image_size);
    let new_h = ((h as f32 * scale).round() as u32).max(image_size);

    let resized = image.resize_exact(new_w, new_h, image::imageops::FilterType::CatmullRom);
    let left = (new_w - image_size) / 2;
    let top = (new_h - image_size) / 2;
    let rgb = resized.crop_imm(left, top, image_size, image_size).to_rgb8();

    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

    let raw = rgb.as_raw();
    if let Some(tensor_data) = tensor.as_slice_mut() {
        for (i, pixel) in raw.chunks_exact(CHANNELS).enumerate() {
            let y = i / size;
            let x = i % size;
            for (c, &val) in pixel.iter().enumerate() {
                let idx = c * size * size + y * size + x;
                tensor_data[idx] = (val as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn test_preprocess_shape_from_wide_patch() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 48));
        let tensor = preprocess(&img, 224);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_preprocess_shape_from_tiny_patch() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(1, 3));
        let tensor = preprocess(&img, 224);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let img =
            DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, image::Rgb([255, 255, 255])));
        let tensor = preprocess(&img, 32);
        let expected = (1.0 - NORM_MEAN[0]) / NORM_STD[0];
        assert!((tensor[[0, 0, 5, 5]] - expected).abs() < 0.01);

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, image::Rgb([0, 0, 0])));
        let tensor = preprocess(&img, 32);
        let expected = -NORM_MEAN[2] / NORM_STD[2];
        assert!((tensor[[0, 2, 5, 5]] - expected).abs() < 0.01);
    }
}
