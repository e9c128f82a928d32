//! Title slide rendering.

use fontdue::{Font, FontSettings};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use tribute_models::RenderSpec;

use crate::error::{MediaError, MediaResult};
use crate::frame::{frame_path, PreparedFrame};
use crate::text::{layout_title, TitleLayout};
use crate::vignette::apply_vignette;

const GRADIENT_TOP: [f32; 3] = [16.0, 26.0, 56.0];
const GRADIENT_BOTTOM: [f32; 3] = [96.0, 76.0, 42.0];
const TITLE_COLOR: [u8; 3] = [250, 244, 230];
const MESSAGE_COLOR: [u8; 3] = [226, 216, 196];

/// Fonts tried when no explicit font is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSerif-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSerif-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Georgia.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\georgia.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Pick the configured font if it exists, otherwise the first known system font.
pub fn resolve_font_path(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!(font = %path.display(), "Configured font not found, trying system fonts");
    }

    SYSTEM_FONTS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
}

/// Parse a TrueType/OpenType font file.
pub fn load_font(path: &Path) -> MediaResult<Font> {
    let bytes = std::fs::read(path)?;
    Font::from_bytes(bytes, FontSettings::default())
        .map_err(|e| MediaError::internal(format!("invalid font {}: {}", path.display(), e)))
}

/// Renders title slides. Cheap to clone; the font is shared.
#[derive(Clone, Default)]
pub struct TitleRenderer {
    font: Option<Arc<Font>>,
    font_path: Option<PathBuf>,
}

impl std::fmt::Debug for TitleRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleRenderer")
            .field("font_path", &self.font_path)
            .finish()
    }
}

impl TitleRenderer {
    /// Load the configured or a system font. Without one, slides have no text.
    pub fn new(configured_font: Option<&Path>) -> Self {
        let Some(path) = resolve_font_path(configured_font) else {
            warn!("No usable font found; title slides will be rendered without text");
            return Self::default();
        };

        match load_font(&path) {
            Ok(font) => {
                info!(font = %path.display(), "Loaded title font");
                Self {
                    font: Some(Arc::new(font)),
                    font_path: Some(path),
                }
            }
            Err(e) => {
                warn!("Failed to load font, title slides will have no text: {}", e);
                Self::default()
            }
        }
    }

    /// A renderer that never draws text.
    pub fn without_font() -> Self {
        Self::default()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn font_path(&self) -> Option<&Path> {
        self.font_path.as_deref()
    }

    /// Render the slide to `frame_000.png` in `out_dir`.
    pub fn render(
        &self,
        title: &str,
        message: &str,
        spec: &RenderSpec,
        out_dir: &Path,
    ) -> MediaResult<PreparedFrame> {
        let mut img = gradient_background(spec.width, spec.height);
        apply_vignette(&mut img, spec.vignette_edge_brightness);

        if let Some(font) = &self.font {
            let layout = layout_title(
                title,
                message,
                &**font,
                spec.width,
                spec.height,
                &spec.title,
            );
            if layout.truncated {
                warn!("Title slide text did not fit and was truncated");
            }
            draw_layout(&mut img, font, &layout);
        }

        let path = frame_path(out_dir, 0);
        img.save(&path)?;

        Ok(PreparedFrame {
            path,
            width: spec.width,
            height: spec.height,
            source: None,
        })
    }
}

/// Vertical gradient from deep blue to a warm gold tint.
fn gradient_background(width: u32, height: u32) -> RgbImage {
    let span = (height.max(2) - 1) as f32;
    RgbImage::from_fn(width, height, |_, y| {
        let t = y as f32 / span;
        let mut px = [0u8; 3];
        for (i, channel) in px.iter_mut().enumerate() {
            *channel = (GRADIENT_TOP[i] + (GRADIENT_BOTTOM[i] - GRADIENT_TOP[i]) * t).round() as u8;
        }
        Rgb(px)
    })
}

fn draw_layout(img: &mut RgbImage, font: &Font, layout: &TitleLayout) {
    let mut top = (img.height() as f32 - layout.height()) / 2.0;

    for line in &layout.title_lines {
        draw_line(img, font, line, layout.title_size, layout.title_line_height(), top, TITLE_COLOR);
        top += layout.title_line_height();
    }

    top += layout.gap();

    for line in &layout.message_lines {
        draw_line(
            img,
            font,
            line,
            layout.message_size,
            layout.message_line_height(),
            top,
            MESSAGE_COLOR,
        );
        top += layout.message_line_height();
    }
}

/// Draw one horizontally centered line whose box starts at `top`.
fn draw_line(
    img: &mut RgbImage,
    font: &Font,
    text: &str,
    px: f32,
    line_height: f32,
    top: f32,
    color: [u8; 3],
) {
    let width: f32 = text.chars().map(|ch| font.metrics(ch, px).advance_width).sum();
    let ascent = font
        .horizontal_line_metrics(px)
        .map(|m| m.ascent)
        .unwrap_or(px * 0.8);
    let baseline = top + (line_height - px) / 2.0 + ascent;
    let mut pen_x = (img.width() as f32 - width) / 2.0;

    for ch in text.chars() {
        let (metrics, coverage) = font.rasterize(ch, px);
        let origin_x = (pen_x + metrics.xmin as f32).round() as i64;
        let origin_y = (baseline - metrics.height as f32 - metrics.ymin as f32).round() as i64;

        for (i, alpha) in coverage.iter().enumerate() {
            if *alpha == 0 || metrics.width == 0 {
                continue;
            }
            let x = origin_x + (i % metrics.width) as i64;
            let y = origin_y + (i / metrics.width) as i64;
            if x < 0 || y < 0 || x >= i64::from(img.width()) || y >= i64::from(img.height()) {
                continue;
            }
            blend(img.get_pixel_mut(x as u32, y as u32), color, *alpha);
        }

        pen_x += metrics.advance_width;
    }
}

fn blend(pixel: &mut Rgb<u8>, color: [u8; 3], alpha: u8) {
    let a = f32::from(alpha) / 255.0;
    for (channel, target) in pixel.0.iter_mut().zip(color) {
        *channel = (f32::from(*channel) * (1.0 - a) + f32::from(target) * a).round() as u8;
    }
}
