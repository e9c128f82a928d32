//! Thumbnail generation.

use image::imageops::FilterType;
use image::ImageOutputFormat;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tribute_models::encoding::{THUMBNAIL_HEIGHT, THUMBNAIL_JPEG_QUALITY, THUMBNAIL_WIDTH};

use crate::error::{MediaError, MediaResult};

/// `<video>.jpg` next to the rendered video.
pub fn thumbnail_path_for(video: &Path) -> PathBuf {
    let mut name = video.file_name().unwrap_or_default().to_os_string();
    name.push(".jpg");
    video.with_file_name(name)
}

/// Write a 320x180 JPEG of `frame` to `output`. Blocking.
pub fn generate_thumbnail(frame: &Path, output: &Path) -> MediaResult<()> {
    let img = image::open(frame).map_err(|e| MediaError::image_load(frame, e.to_string()))?;
    let thumb = img.resize_to_fill(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Triangle);

    let mut writer = BufWriter::new(File::create(output)?);
    image::DynamicImage::ImageRgb8(thumb.to_rgb8())
        .write_to(&mut writer, ImageOutputFormat::Jpeg(THUMBNAIL_JPEG_QUALITY))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_thumbnail_path() {
        assert_eq!(
            thumbnail_path_for(Path::new("/videos/tribute_7_abc.mp4")),
            Path::new("/videos/tribute_7_abc.mp4.jpg")
        );
    }

    #[test]
    fn test_generate_thumbnail() {
        let dir = TempDir::new().unwrap();
        let frame = dir.path().join("frame_000.png");
        RgbImage::from_pixel(640, 360, Rgb([30, 40, 80]))
            .save(&frame)
            .unwrap();

        let thumb = dir.path().join("thumb.jpg");
        generate_thumbnail(&frame, &thumb).unwrap();

        let written = image::open(&thumb).unwrap();
        assert_eq!(written.dimensions(), (320, 180));
    }
}
