//! Photo preparation: decode, orient, crop, resize, vignette.
//!
//! Everything here is CPU bound and synchronous; async callers should run it
//! through `tokio::task::spawn_blocking`.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::Path;
use tracing::{debug, warn};

use tribute_models::RenderSpec;

use crate::error::{MediaError, MediaResult};
use crate::frame::{frame_path, PreparedFrame};
use crate::orientation::Orientation;
use crate::vignette::apply_vignette;

/// Sources smaller than this in either dimension are rejected.
pub const MIN_SOURCE_DIMENSION: u32 = 16;

/// Turn one photo into `frame_NNN.png` at the render resolution.
pub fn prepare_image(
    source: &Path,
    index: usize,
    spec: &RenderSpec,
    out_dir: &Path,
) -> MediaResult<PreparedFrame> {
    let img = load_oriented(source)?;
    let (width, height) = img.dimensions();

    if width < MIN_SOURCE_DIMENSION || height < MIN_SOURCE_DIMENSION {
        return Err(MediaError::ImageDimension {
            path: source.to_path_buf(),
            width,
            height,
        });
    }

    if width < spec.width || height < spec.height {
        warn!(
            source = %source.display(),
            "Upscaling {}x{} image to {}x{}; expect softer detail",
            width,
            height,
            spec.width,
            spec.height
        );
    }

    let mut frame = fit_to_frame(&img, spec.width, spec.height).to_rgb8();
    apply_vignette(&mut frame, spec.vignette_edge_brightness);

    let path = frame_path(out_dir, index);
    frame.save(&path)?;
    debug!(source = %source.display(), frame = %path.display(), "Prepared frame");

    Ok(PreparedFrame {
        path,
        width: spec.width,
        height: spec.height,
        source: Some(source.to_path_buf()),
    })
}

/// Decode an image and apply its EXIF orientation.
pub fn load_oriented(source: &Path) -> MediaResult<DynamicImage> {
    if !source.is_file() {
        return Err(MediaError::image_load(source, "file not found"));
    }

    let img = image::open(source).map_err(|e| MediaError::image_load(source, e.to_string()))?;
    Ok(Orientation::from_path(source).apply(img))
}

/// Center-crop to the target aspect ratio, then resize to exactly `width`x`height`.
pub fn fit_to_frame(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (x, y, crop_w, crop_h) = center_crop_rect(img.width(), img.height(), width, height);
    img.crop_imm(x, y, crop_w, crop_h)
        .resize_exact(width, height, FilterType::CatmullRom)
}

/// Largest rectangle with the target aspect ratio centered in the source.
fn center_crop_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32, u32, u32) {
    let (sw, sh, dw, dh) = (
        u64::from(src_w),
        u64::from(src_h),
        u64::from(dst_w),
        u64::from(dst_h),
    );

    let (crop_w, crop_h) = if sw * dh > sh * dw {
        // Source is wider: trim the sides
        (((sh * dw) / dh).max(1), sh)
    } else {
        // Source is taller: trim top and bottom
        (sw, ((sw * dh) / dw).max(1))
    };

    let x = (sw - crop_w) / 2;
    let y = (sh - crop_h) / 2;
    (x as u32, y as u32, crop_w as u32, crop_h as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn small_spec() -> RenderSpec {
        RenderSpec {
            width: 64,
            height: 36,
            ..Default::default()
        }
    }

    #[test]
    fn test_center_crop_wide_source() {
        // 4000x1000 into 16:9 keeps full height
        let (x, y, w, h) = center_crop_rect(4000, 1000, 1920, 1080);
        assert_eq!((w, h), (1777, 1000));
        assert_eq!(y, 0);
        assert_eq!(x, (4000 - 1777) / 2);
    }

    #[test]
    fn test_center_crop_tall_source() {
        let (x, y, w, h) = center_crop_rect(1080, 1920, 1920, 1080);
        assert_eq!((w, h), (1080, 607));
        assert_eq!(x, 0);
        assert_eq!(y, (1920 - 607) / 2);
    }

    #[test]
    fn test_prepare_portrait_jpeg() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("portrait.jpg");
        RgbImage::from_pixel(90, 160, Rgb([180, 120, 90]))
            .save(&source)
            .unwrap();

        let frame = prepare_image(&source, 1, &small_spec(), dir.path()).unwrap();
        assert_eq!(frame.path, dir.path().join("frame_001.png"));
        assert_eq!(frame.source.as_deref(), Some(source.as_path()));

        let written = image::open(&frame.path).unwrap();
        assert_eq!(written.dimensions(), (64, 36));
    }

    #[test]
    fn test_small_image_is_upscaled() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("tiny.png");
        RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]))
            .save(&source)
            .unwrap();

        let frame = prepare_image(&source, 2, &small_spec(), dir.path()).unwrap();
        assert_eq!((frame.width, frame.height), (64, 36));
    }

    #[test]
    fn test_degenerate_image_rejected() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("sliver.png");
        RgbImage::new(400, 8).save(&source).unwrap();

        let err = prepare_image(&source, 1, &small_spec(), dir.path()).unwrap_err();
        assert!(matches!(err, MediaError::ImageDimension { height: 8, .. }));
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = TempDir::new().unwrap();

        let err = prepare_image(&dir.path().join("gone.jpg"), 1, &small_spec(), dir.path())
            .unwrap_err();
        assert!(matches!(err, MediaError::ImageLoad { .. }));

        let corrupt = dir.path().join("corrupt.jpg");
        std::fs::write(&corrupt, b"not really a jpeg").unwrap();
        let err = prepare_image(&corrupt, 1, &small_spec(), dir.path()).unwrap_err();
        assert!(matches!(err, MediaError::ImageLoad { .. }));
        assert!(err.is_input_error());
    }
}
