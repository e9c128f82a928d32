//! EXIF orientation handling.

use exif::{In, Tag};
use image::DynamicImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Orientation as recorded by the camera (EXIF tag 0x0112).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Normal,
    MirroredHorizontal,
    Rotated180,
    MirroredVertical,
    /// Mirrored horizontally, then rotated 270° clockwise
    Transposed,
    Rotated90,
    /// Mirrored horizontally, then rotated 90° clockwise
    Transversed,
    Rotated270,
}

impl Orientation {
    /// Read the orientation tag from a file. Files without EXIF data are `Normal`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let Ok(file) = File::open(path.as_ref()) else {
            return Self::Normal;
        };
        let mut reader = BufReader::new(file);

        exif::Reader::new()
            .read_from_container(&mut reader)
            .ok()
            .and_then(|exif| {
                exif.get_field(Tag::Orientation, In::PRIMARY)
                    .and_then(|field| field.value.get_uint(0))
            })
            .map(Self::from)
            .unwrap_or_default()
    }

    /// Rotate/flip the decoded pixels so the image displays upright.
    #[must_use]
    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => img,
            Self::MirroredHorizontal => img.fliph(),
            Self::Rotated180 => img.rotate180(),
            Self::MirroredVertical => img.flipv(),
            Self::Transposed => img.fliph().rotate270(),
            Self::Rotated90 => img.rotate90(),
            Self::Transversed => img.fliph().rotate90(),
            Self::Rotated270 => img.rotate270(),
        }
    }
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::MirroredHorizontal,
            3 => Self::Rotated180,
            4 => Self::MirroredVertical,
            5 => Self::Transposed,
            6 => Self::Rotated90,
            7 => Self::Transversed,
            8 => Self::Rotated270,
            _ => Self::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn marked_image() -> DynamicImage {
        // 4x2, red pixel in the top-left corner
        let mut img = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_tag_mapping() {
        assert_eq!(Orientation::from(1), Orientation::Normal);
        assert_eq!(Orientation::from(6), Orientation::Rotated90);
        assert_eq!(Orientation::from(8), Orientation::Rotated270);
        assert_eq!(Orientation::from(42), Orientation::Normal);
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let rotated = Orientation::Rotated90.apply(marked_image());
        assert_eq!((rotated.width(), rotated.height()), (2, 4));

        let mirrored = Orientation::MirroredHorizontal.apply(marked_image());
        assert_eq!((mirrored.width(), mirrored.height()), (4, 2));
    }

    #[test]
    fn test_transpose_moves_corner() {
        // Transpose keeps the top-left pixel in place
        let img = Orientation::Transposed.apply(marked_image()).to_rgb8();
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 0, 0]));

        // 90° clockwise moves it to the top-right
        let img = Orientation::Rotated90.apply(marked_image()).to_rgb8();
        assert_eq!(img.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_missing_file_is_normal() {
        assert_eq!(
            Orientation::from_path("/definitely/not/here.jpg"),
            Orientation::Normal
        );
    }
}
