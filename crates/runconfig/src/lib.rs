//! Run configuration shared by the `shaderview` binary and its libraries.
//!
//! A [`RunConfig`] is resolved exactly once at startup (command line,
//! interactive prompts, or an optional TOML defaults file layered underneath)
//! and is treated as immutable afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_WIDTH: u32 = 2560;
pub const DEFAULT_HEIGHT: u32 = 1440;
pub const DEFAULT_TITLE: &str = "My First Shader!";
pub const DEFAULT_VERTEX_SHADER: &str = "shaders/vertex_shader.glsl";
pub const DEFAULT_FRAGMENT_SHADER: &str = "shaders/fragment_shader.glsl";
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_DURATION_SECS: f32 = 5.0;
pub const DEFAULT_FRAMES_DIR: &str = "frames";
pub const DEFAULT_OUTPUT_VIDEO: &str = "output.mp4";
/// Log file written in the working directory unless overridden.
pub const DEFAULT_LOG_FILE: &str = "shaderapp_logs.log";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from(DEFAULT_VERTEX_SHADER),
            fragment: PathBuf::from(DEFAULT_FRAGMENT_SHADER),
        }
    }
}

/// Frame capture parameters. The values are kept even while `enabled` is
/// false so that the interactive menu and the defaults file can pre-fill them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub fps: u32,
    pub duration_secs: f32,
    pub output_dir: PathBuf,
    pub output_file: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fps: DEFAULT_FPS,
            duration_secs: DEFAULT_DURATION_SECS,
            output_dir: PathBuf::from(DEFAULT_FRAMES_DIR),
            output_file: PathBuf::from(DEFAULT_OUTPUT_VIDEO),
        }
    }
}

impl RecordingConfig {
    /// Number of frames captured before the render loop stops:
    /// `floor(fps * duration)`.
    pub fn frame_budget(&self) -> u32 {
        let frames = (self.fps as f32 * self.duration_secs).floor();
        if frames.is_finite() && frames > 0.0 {
            frames as u32
        } else {
            0
        }
    }

    /// Encoder bitrate in megabits per second.
    pub fn bitrate_mbps(&self) -> u32 {
        self.fps.saturating_mul(2)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub window: WindowConfig,
    pub shaders: ShaderPaths,
    pub recording: RecordingConfig,
}

impl RunConfig {
    /// Parses a defaults file. Every table and key is optional; missing
    /// values fall back to the built-in defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RunConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Returns the recording parameters only when capture is switched on.
    pub fn active_recording(&self) -> Option<&RecordingConfig> {
        self.recording.enabled.then_some(&self.recording)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be positive (got {}x{})",
                self.window.width, self.window.height
            )));
        }

        if let Some(recording) = self.active_recording() {
            if recording.fps == 0 {
                return Err(ConfigError::Invalid(
                    "recording fps must be greater than zero".into(),
                ));
            }

            if !recording.duration_secs.is_finite() || recording.duration_secs <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "recording duration must be a positive number of seconds (got {})",
                    recording.duration_secs
                )));
            }

            if recording.frame_budget() == 0 {
                return Err(ConfigError::Invalid(format!(
                    "recording of {} fps for {}s captures no frames",
                    recording.fps, recording.duration_secs
                )));
            }

            if recording.output_file.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "recording output file may not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}
