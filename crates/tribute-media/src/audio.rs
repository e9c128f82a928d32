//! Soundtrack selection and mixing.
//!
//! Tracks resolve to local files through [`MusicLibrary`]. [`AudioMixer`]
//! probes the asset and plans how to loop, trim and fade it so the
//! soundtrack lasts exactly as long as the video.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use tribute_models::{MusicTrack, RenderSpec, CUSTOM_TRACK_ID};

use crate::command::FfmpegInput;
use crate::error::{MediaError, MediaResult};
use crate::filters::{acrossfade_chain, normalize_audio, trim_and_fade};
use crate::probe::DurationProbe;

/// Assets shorter than this cannot be looped meaningfully.
pub const MIN_ASSET_SECS: f64 = 0.5;

/// File extensions tried for built-in tracks, in order of preference.
const TRACK_EXTENSIONS: &[&str] = &["mp3", "wav"];

/// A track identifier resolved to a file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    pub id: String,
    pub path: PathBuf,
}

/// Maps track identifiers to audio files.
#[derive(Debug, Clone, Default)]
pub struct MusicLibrary {
    music_dir: PathBuf,
    extra: HashMap<String, PathBuf>,
}

impl MusicLibrary {
    pub fn new(music_dir: impl Into<PathBuf>) -> Self {
        Self {
            music_dir: music_dir.into(),
            extra: HashMap::new(),
        }
    }

    /// Register an additional track. Overrides a built-in track with the same id.
    pub fn with_track(mut self, id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.extra.insert(id.into(), path.into());
        self
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    /// Resolve `track_id`; `custom_path` is only consulted for the custom upload id.
    pub fn resolve(&self, track_id: &str, custom_path: Option<&Path>) -> MediaResult<ResolvedTrack> {
        if track_id == CUSTOM_TRACK_ID {
            let path = custom_path.ok_or_else(|| MediaError::UnknownTrack(track_id.to_string()))?;
            if !path.is_file() {
                return Err(MediaError::FileNotFound(path.to_path_buf()));
            }
            return Ok(ResolvedTrack {
                id: track_id.to_string(),
                path: path.to_path_buf(),
            });
        }

        if let Some(path) = self.extra.get(track_id) {
            if !path.is_file() {
                return Err(MediaError::MusicAssetMissing {
                    track: track_id.to_string(),
                    path: path.clone(),
                });
            }
            return Ok(ResolvedTrack {
                id: track_id.to_string(),
                path: path.clone(),
            });
        }

        let track = MusicTrack::from_str(track_id)
            .map_err(|_| MediaError::UnknownTrack(track_id.to_string()))?;
        self.builtin_path(track)
            .map(|path| ResolvedTrack {
                id: track_id.to_string(),
                path,
            })
            .ok_or_else(|| MediaError::MusicAssetMissing {
                track: track_id.to_string(),
                path: self.music_dir.join(format!("{}.{}", track.as_str(), TRACK_EXTENSIONS[0])),
            })
    }

    /// First existing file for a built-in track.
    pub fn builtin_path(&self, track: MusicTrack) -> Option<PathBuf> {
        TRACK_EXTENSIONS
            .iter()
            .map(|ext| self.music_dir.join(format!("{}.{}", track.as_str(), ext)))
            .find(|path| path.is_file())
    }

    /// Built-in tracks with no file on disk.
    pub fn missing_builtin_tracks(&self) -> Vec<MusicTrack> {
        MusicTrack::ALL
            .iter()
            .copied()
            .filter(|track| self.builtin_path(*track).is_none())
            .collect()
    }
}

/// How the soundtrack is built from its asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedAudio {
    pub track: ResolvedTrack,
    /// Length of the asset in seconds
    pub asset_duration: f64,
    /// Copies of the asset joined end to end
    pub loops: u32,
    /// Overlap at each loop point
    pub crossfade: f64,
    /// Final soundtrack length, equal to the video length
    pub duration: f64,
    pub fade_out: f64,
}

impl MixedAudio {
    /// One input per loop copy.
    pub fn inputs(&self) -> Vec<FfmpegInput> {
        (0..self.loops)
            .map(|_| FfmpegInput::new(&self.track.path))
            .collect()
    }

    /// Filter graph producing `[aout]`, given the index of the first audio input.
    pub fn filter_graph(&self, first_input: usize) -> String {
        let loops = self.loops as usize;
        let mut parts: Vec<String> = (0..loops)
            .map(|slot| normalize_audio(first_input + slot, slot))
            .collect();
        parts.push(acrossfade_chain(loops, self.crossfade));
        parts.push(trim_and_fade(self.duration, self.fade_out));
        parts.join(";")
    }

    /// Length of the looped asset before trimming.
    pub fn looped_duration(&self) -> f64 {
        let k = f64::from(self.loops);
        k * self.asset_duration - (k - 1.0) * self.crossfade
    }
}

/// Minimal `k` with `k * asset - (k - 1) * crossfade >= target`.
pub fn loop_count(asset: f64, crossfade: f64, target: f64) -> u32 {
    if asset >= target {
        return 1;
    }
    let gain = asset - crossfade;
    if gain <= 0.0 {
        return 1;
    }
    // Small tolerance so exact fits do not add a loop
    let k = ((target - crossfade) / gain - 1e-9).ceil();
    k.max(1.0) as u32
}

/// Plans soundtracks for rendered videos.
#[derive(Clone)]
pub struct AudioMixer {
    library: MusicLibrary,
    probe: Arc<dyn DurationProbe>,
}

impl std::fmt::Debug for AudioMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixer")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

impl AudioMixer {
    pub fn new(library: MusicLibrary, probe: Arc<dyn DurationProbe>) -> Self {
        Self { library, probe }
    }

    pub fn library(&self) -> &MusicLibrary {
        &self.library
    }

    /// Resolve a track without probing it.
    pub fn resolve(&self, track_id: &str, custom_path: Option<&Path>) -> MediaResult<ResolvedTrack> {
        self.library.resolve(track_id, custom_path)
    }

    /// Fit `track` to a video of `video_duration` seconds.
    pub async fn mix(
        &self,
        track: ResolvedTrack,
        video_duration: f64,
        spec: &RenderSpec,
    ) -> MediaResult<MixedAudio> {
        let asset_duration = self.probe.duration(&track.path).await?;
        if !(asset_duration >= MIN_ASSET_SECS) {
            return Err(MediaError::invalid_audio(
                &track.path,
                format!("asset is only {:.2}s long", asset_duration),
            ));
        }

        let crossfade = spec.audio_loop_crossfade.min(asset_duration / 3.0).max(0.0);
        let loops = loop_count(asset_duration, crossfade, video_duration);
        let fade_out = spec.audio_fade_out.min(video_duration / 4.0).max(0.0);

        debug!(
            track = %track.id,
            asset_duration,
            loops,
            video_duration,
            "Planned soundtrack"
        );

        Ok(MixedAudio {
            track,
            asset_duration,
            loops,
            crossfade,
            duration: video_duration,
            fade_out,
        })
    }
}
