//! Built-in music tracks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Track identifier that selects the tribute's uploaded audio file.
pub const CUSTOM_TRACK_ID: &str = "custom_uploaded";

/// Tracks shipped with the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MusicTrack {
    SadPiano,
    SoftStrings,
    CalmGuitar,
}

impl MusicTrack {
    pub const ALL: [MusicTrack; 3] = [
        MusicTrack::SadPiano,
        MusicTrack::SoftStrings,
        MusicTrack::CalmGuitar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MusicTrack::SadPiano => "sad_piano",
            MusicTrack::SoftStrings => "soft_strings",
            MusicTrack::CalmGuitar => "calm_guitar",
        }
    }

    /// Human-readable description shown in track pickers.
    pub fn description(&self) -> &'static str {
        match self {
            MusicTrack::SadPiano => "Gentle Piano - Peaceful and reflective",
            MusicTrack::SoftStrings => "Soft Strings - Warm and comforting",
            MusicTrack::CalmGuitar => "Acoustic Guitar - Serene and hopeful",
        }
    }
}

impl fmt::Display for MusicTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MusicTrack {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MusicTrack::ALL
            .into_iter()
            .find(|track| track.as_str() == s)
            .ok_or_else(|| format!("unknown music track '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tracks() {
        assert_eq!("sad_piano".parse::<MusicTrack>(), Ok(MusicTrack::SadPiano));
        assert_eq!("calm_guitar".parse::<MusicTrack>(), Ok(MusicTrack::CalmGuitar));
        assert!("death_metal".parse::<MusicTrack>().is_err());
    }

    #[test]
    fn test_descriptions_present() {
        for track in MusicTrack::ALL {
            assert!(!track.description().is_empty());
            assert_eq!(track.to_string(), track.as_str());
        }
    }
}
