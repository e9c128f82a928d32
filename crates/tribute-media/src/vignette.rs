//! Radial vignette.

use image::RgbImage;

/// Brightness multiplier at normalized radius `r` (0 = center, 1 = corner).
pub fn falloff(r: f32, edge_brightness: f32) -> f32 {
    let t = r.clamp(0.0, 1.0);
    let smooth = t * t * (3.0 - 2.0 * t);
    1.0 - (1.0 - edge_brightness) * smooth
}

/// Darken `img` towards the corners, in place.
pub fn apply_vignette(img: &mut RgbImage, edge_brightness: f32) {
    if edge_brightness >= 1.0 {
        return;
    }
    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt().max(f32::EPSILON);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let factor = falloff((dx * dx + dy * dy).sqrt() / max_dist, edge_brightness);
        for channel in pixel.0.iter_mut() {
            *channel = (f32::from(*channel) * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
}
