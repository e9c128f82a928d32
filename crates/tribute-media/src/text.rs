//! Title slide text layout.
//!
//! Layout only needs glyph advances, so it runs against [`GlyphMetrics`]
//! and can be tested without a font file.

use tribute_models::TitleStyle;

pub const ELLIPSIS: char = '…';

/// Horizontal glyph measurements at a given pixel size.
pub trait GlyphMetrics {
    /// Advance width of `ch` at `px` pixels.
    fn advance(&self, ch: char, px: f32) -> f32;

    fn text_width(&self, text: &str, px: f32) -> f32 {
        text.chars().map(|ch| self.advance(ch, px)).sum()
    }
}

impl GlyphMetrics for fontdue::Font {
    fn advance(&self, ch: char, px: f32) -> f32 {
        self.metrics(ch, px).advance_width
    }
}

/// Every glyph advances by `px * em_ratio`. Approximates a monospace font.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvance {
    pub em_ratio: f32,
}

impl Default for FixedAdvance {
    fn default() -> Self {
        Self { em_ratio: 0.5 }
    }
}

impl GlyphMetrics for FixedAdvance {
    fn advance(&self, _ch: char, px: f32) -> f32 {
        px * self.em_ratio
    }
}

/// Positioned text block for the title slide.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleLayout {
    pub title_lines: Vec<String>,
    pub message_lines: Vec<String>,
    pub title_size: f32,
    pub message_size: f32,
    pub line_spacing: f32,
    /// Text was cut and ends with an ellipsis
    pub truncated: bool,
}

impl TitleLayout {
    pub fn title_line_height(&self) -> f32 {
        self.title_size * self.line_spacing
    }

    pub fn message_line_height(&self) -> f32 {
        self.message_size * self.line_spacing
    }

    /// Space between the title and the message.
    pub fn gap(&self) -> f32 {
        if self.message_lines.is_empty() {
            0.0
        } else {
            self.title_size * 0.5
        }
    }

    pub fn height(&self) -> f32 {
        self.title_lines.len() as f32 * self.title_line_height()
            + self.gap()
            + self.message_lines.len() as f32 * self.message_line_height()
    }
}

/// Greedy word wrap. Words wider than `max_width` are split between characters.
/// Explicit newlines start a new line.
pub fn wrap_text<M: GlyphMetrics + ?Sized>(
    text: &str,
    metrics: &M,
    px: f32,
    max_width: f32,
) -> Vec<String> {
    let mut lines = Vec::new();
    let space = metrics.advance(' ', px);

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_width = 0.0;

        for word in paragraph.split_whitespace() {
            let word_width = metrics.text_width(word, px);
            let needed = if current.is_empty() {
                word_width
            } else {
                current_width + space + word_width
            };

            if needed <= max_width {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                current_width = needed;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }

            if word_width <= max_width {
                current.push_str(word);
                current_width = word_width;
            } else {
                for ch in word.chars() {
                    let w = metrics.advance(ch, px);
                    if current_width + w > max_width && !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                        current_width = 0.0;
                    }
                    current.push(ch);
                    current_width += w;
                }
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Cut `line` so that it plus a trailing ellipsis fits in `max_width`.
pub fn ellipsize<M: GlyphMetrics + ?Sized>(
    line: &str,
    metrics: &M,
    px: f32,
    max_width: f32,
) -> String {
    let mut kept = line.trim_end().to_string();
    loop {
        let candidate = format!("{}{}", kept, ELLIPSIS);
        if kept.is_empty() || metrics.text_width(&candidate, px) <= max_width {
            return candidate;
        }
        kept.pop();
        let trimmed = kept.trim_end().len();
        kept.truncate(trimmed);
    }
}

/// Lay out the title and message inside the safe area of a `width`x`height` frame.
///
/// Fonts shrink by 10% steps down to the style minimum. Whatever still does not
/// fit is truncated with an ellipsis.
pub fn layout_title<M: GlyphMetrics + ?Sized>(
    title: &str,
    message: &str,
    metrics: &M,
    width: u32,
    height: u32,
    style: &TitleStyle,
) -> TitleLayout {
    let max_width = width as f32 * (1.0 - 2.0 * style.safe_margin_ratio);
    let max_height = height as f32 * (1.0 - 2.0 * style.safe_margin_ratio);
    let min_size = height as f32 * style.min_font_size_ratio;
    let mut size = height as f32 * style.font_size_ratio;

    loop {
        let layout = wrap_at(title, message, metrics, size, max_width, style);
        if layout.height() <= max_height {
            return layout;
        }
        if size <= min_size {
            return truncate_to_fit(layout, metrics, max_width, max_height);
        }
        size = (size * 0.9).max(min_size);
    }
}

fn wrap_at<M: GlyphMetrics + ?Sized>(
    title: &str,
    message: &str,
    metrics: &M,
    size: f32,
    max_width: f32,
    style: &TitleStyle,
) -> TitleLayout {
    let message_size = size * style.message_scale;
    TitleLayout {
        title_lines: wrap_text(title, metrics, size, max_width),
        message_lines: wrap_text(message, metrics, message_size, max_width),
        title_size: size,
        message_size,
        line_spacing: style.line_spacing,
        truncated: false,
    }
}

fn truncate_to_fit<M: GlyphMetrics + ?Sized>(
    mut layout: TitleLayout,
    metrics: &M,
    max_width: f32,
    max_height: f32,
) -> TitleLayout {
    let title_capacity = (max_height / layout.title_line_height()).floor().max(1.0) as usize;
    if layout.title_lines.len() > title_capacity {
        layout.title_lines.truncate(title_capacity);
        layout.message_lines.clear();
        ellipsize_last(&mut layout.title_lines, metrics, layout.title_size, max_width);
        layout.truncated = true;
        return layout;
    }

    let title_height = layout.title_lines.len() as f32 * layout.title_line_height();
    let available = max_height - title_height - layout.title_size * 0.5;
    let message_capacity = if available > 0.0 {
        (available / layout.message_line_height()).floor() as usize
    } else {
        0
    };

    if layout.message_lines.len() > message_capacity {
        layout.truncated = true;
        if message_capacity == 0 {
            // No room for any message line; mark the cut on the title instead
            layout.message_lines.clear();
            ellipsize_last(&mut layout.title_lines, metrics, layout.title_size, max_width);
        } else {
            layout.message_lines.truncate(message_capacity);
            ellipsize_last(&mut layout.message_lines, metrics, layout.message_size, max_width);
        }
    }

    layout
}

fn ellipsize_last<M: GlyphMetrics + ?Sized>(
    lines: &mut [String],
    metrics: &M,
    px: f32,
    max_width: f32,
) {
    if let Some(last) = lines.last_mut() {
        *last = ellipsize(last, metrics, px, max_width);
    }
}
