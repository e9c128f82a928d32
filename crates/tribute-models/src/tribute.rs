//! Read-only tribute projection handed to the render core.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Longest title drawn on the slide; longer titles are cut, not rejected.
pub const MAX_TITLE_CHARS: usize = 100;
/// Longest message drawn on the slide; longer messages are cut, not rejected.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Everything the pipeline needs to know about a tribute.
///
/// Image paths are already validated uploads, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct TributeInput {
    /// Owning tribute
    pub tribute_id: u64,

    /// Headline on the title slide
    #[validate(length(min = 1))]
    pub title: String,

    /// Message shown under the title
    #[serde(default)]
    pub message: String,

    /// Image files in display order
    #[serde(default)]
    pub images: Vec<PathBuf>,

    /// Music track identifier (e.g. "sad_piano")
    pub music_track: String,

    /// Uploaded audio file, used with the `custom_uploaded` track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_music_path: Option<PathBuf>,
}

impl TributeInput {
    pub fn new(
        tribute_id: u64,
        title: impl Into<String>,
        message: impl Into<String>,
        images: Vec<PathBuf>,
        music_track: impl Into<String>,
    ) -> Self {
        Self {
            tribute_id,
            title: title.into(),
            message: message.into(),
            images,
            music_track: music_track.into(),
            custom_music_path: None,
        }
    }

    /// Title as drawn, at most [`MAX_TITLE_CHARS`] characters.
    pub fn slide_title(&self) -> &str {
        clip_chars(&self.title, MAX_TITLE_CHARS)
    }

    /// Message as drawn, at most [`MAX_MESSAGE_CHARS`] characters.
    pub fn slide_message(&self) -> &str {
        clip_chars(&self.message, MAX_MESSAGE_CHARS)
    }

    /// Attach an uploaded music file.
    pub fn with_custom_music(mut self, path: impl Into<PathBuf>) -> Self {
        self.custom_music_path = Some(path.into());
        self
    }
}

fn clip_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_input() {
        let input = TributeInput::new(
            1,
            "In Memory",
            "Forever in our hearts",
            vec![PathBuf::from("a.jpg")],
            "sad_piano",
        );
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_empty_title_rejected() {
        let input = TributeInput::new(1, "", "", vec![], "sad_piano");
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("title"));
    }

    #[test]
    fn test_long_text_is_clipped_not_rejected() {
        let input = TributeInput::new(
            1,
            "é".repeat(MAX_TITLE_CHARS + 20),
            "we remember you always ".repeat(100),
            vec![PathBuf::from("a.jpg")],
            "sad_piano",
        );
        assert!(input.validate().is_ok());
        assert_eq!(input.slide_title().chars().count(), MAX_TITLE_CHARS);
        assert_eq!(input.slide_message().chars().count(), MAX_MESSAGE_CHARS);
        assert!(input.message.starts_with(input.slide_message()));

        let short = TributeInput::new(1, "In Memory", "Always", vec![], "sad_piano");
        assert_eq!(short.slide_title(), "In Memory");
        assert_eq!(short.slide_message(), "Always");
    }

    #[test]
    fn test_deserialize_defaults() {
        let input: TributeInput = serde_json::from_str(
            r#"{"tribute_id": 3, "title": "Grandpa", "music_track": "calm_guitar"}"#,
        )
        .unwrap();
        assert!(input.images.is_empty());
        assert!(input.message.is_empty());
        assert!(input.custom_music_path.is_none());
    }
}
