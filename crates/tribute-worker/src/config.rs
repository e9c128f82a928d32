//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tribute_media::MusicLibrary;
use tribute_models::render_spec::DEFAULT_MAX_DURATION_SECS;
use tribute_models::{EncodingConfig, RenderSpec};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Upper bound for a single encode
    pub encode_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Root for per-job scratch directories
    pub temp_dir: PathBuf,
    /// Where finished videos are published
    pub output_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Directory holding the built-in tracks
    pub music_dir: PathBuf,
    /// Additional track id to file mappings
    pub music_tracks: Vec<(String, PathBuf)>,
    /// Font for title slides; system fonts are tried when unset
    pub font_path: Option<PathBuf>,
    /// Render parameters applied to every job
    pub render: RenderSpec,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            encode_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
            temp_dir: std::env::temp_dir().join("tribute"),
            output_dir: PathBuf::from("uploads/videos"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            music_dir: PathBuf::from("assets/music"),
            music_tracks: Vec::new(),
            font_path: None,
            render: RenderSpec::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let spec = &defaults.render;

        let encoding = EncodingConfig {
            codec: env_string("TRIBUTE_VIDEO_CODEC", &spec.encoding.codec),
            preset: env_string("TRIBUTE_PRESET", &spec.encoding.preset),
            crf: env_parse("TRIBUTE_CRF", spec.encoding.crf),
            audio_codec: env_string("TRIBUTE_AUDIO_CODEC", &spec.encoding.audio_codec),
            audio_bitrate: env_string("TRIBUTE_AUDIO_BITRATE", &spec.encoding.audio_bitrate),
            ..spec.encoding.clone()
        };

        let render = RenderSpec {
            width: env_parse("TRIBUTE_WIDTH", spec.width),
            height: env_parse("TRIBUTE_HEIGHT", spec.height),
            frame_rate: env_parse("TRIBUTE_FPS", spec.frame_rate),
            seconds_per_image: env_parse("TRIBUTE_SECONDS_PER_IMAGE", spec.seconds_per_image),
            transition_duration: env_parse("TRIBUTE_TRANSITION_SECS", spec.transition_duration),
            vignette_edge_brightness: env_parse("TRIBUTE_VIGNETTE_EDGE", spec.vignette_edge_brightness),
            max_duration_secs: env_parse("MAX_VIDEO_DURATION", DEFAULT_MAX_DURATION_SECS),
            encoding,
            ..spec.clone()
        };

        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS", defaults.max_concurrent_jobs),
            encode_timeout: Duration::from_secs(env_parse("WORKER_ENCODE_TIMEOUT", 300)),
            shutdown_timeout: Duration::from_secs(env_parse("WORKER_SHUTDOWN_TIMEOUT", 30)),
            temp_dir: env_path("WORKER_TEMP_DIR").unwrap_or(defaults.temp_dir),
            output_dir: env_path("WORKER_OUTPUT_DIR").unwrap_or(defaults.output_dir),
            ffmpeg_path: env_path("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: env_path("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            music_dir: env_path("MUSIC_DIR").unwrap_or(defaults.music_dir),
            music_tracks: std::env::var("MUSIC_TRACKS")
                .ok()
                .map(|s| parse_track_mappings(&s))
                .unwrap_or_default(),
            font_path: env_path("TRIBUTE_FONT_PATH"),
            render,
        }
    }

    /// Reject configurations no job could succeed with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error("WORKER_MAX_JOBS must be at least 1"));
        }
        if self.encode_timeout.is_zero() {
            return Err(WorkerError::config_error("WORKER_ENCODE_TIMEOUT must be positive"));
        }
        self.render
            .validate()
            .map_err(|e| WorkerError::config_error(e.to_string()))
    }

    /// Track library described by this configuration.
    pub fn music_library(&self) -> MusicLibrary {
        self.music_tracks
            .iter()
            .fold(MusicLibrary::new(&self.music_dir), |library, (id, path)| {
                library.with_track(id.clone(), path.clone())
            })
    }

    /// Published file name for a job.
    pub fn output_path(&self, tribute_id: u64, job_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("tribute_{}_{}.mp4", tribute_id, job_id))
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Parse `id=path,id=path`. Malformed entries are skipped.
pub fn parse_track_mappings(raw: &str) -> Vec<(String, PathBuf)> {
    raw.split(',')
        .filter_map(|entry| {
            let (id, path) = entry.split_once('=')?;
            let (id, path) = (id.trim(), path.trim());
            (!id.is_empty() && !path.is_empty()).then(|| (id.to_string(), PathBuf::from(path)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.encode_timeout, Duration::from_secs(300));
        assert_eq!(config.render.width, 1920);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_output_path_convention() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.output_path(12, "abc"),
            PathBuf::from("uploads/videos/tribute_12_abc.mp4")
        );
    }

    #[test]
    fn test_parse_track_mappings() {
        let mappings = parse_track_mappings("lullaby=/music/lullaby.mp3, broken, =x ,hymn = /m/hymn.wav");
        assert_eq!(
            mappings,
            vec![
                ("lullaby".to_string(), PathBuf::from("/music/lullaby.mp3")),
                ("hymn".to_string(), PathBuf::from("/m/hymn.wav")),
            ]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = WorkerConfig {
            max_concurrent_jobs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.render.transition_duration = 10.0;
        assert!(matches!(config.validate(), Err(WorkerError::ConfigError(_))));
    }
}
