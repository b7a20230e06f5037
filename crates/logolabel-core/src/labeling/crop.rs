//! Cropping candidate regions out of the source image.

use image::DynamicImage;

use crate::types::BoundingBox;

/// Integer pixel rectangle `(x, y, width, height)` covered by `bbox`.
///
/// Coordinates are clamped to the image and truncated toward zero, so a box
/// thinner than one pixel (or lying outside the image) yields zero area.
pub fn crop_rect(bbox: &BoundingBox, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
    let clamped = bbox.clamp_to(image_width, image_height);
    let (x1, y1) = (clamped.x1 as u32, clamped.y1 as u32);
    let (x2, y2) = (clamped.x2 as u32, clamped.y2 as u32);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
}

/// Crop `bbox` out of `image`, or `None` for a zero-area region.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox) -> Option<DynamicImage> {
    let (x, y, w, h) = crop_rect(bbox, image.width(), image.height())?;
    Some(image.crop_imm(x, y, w, h))
}
