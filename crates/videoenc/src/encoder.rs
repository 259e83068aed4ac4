use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::sequence::FrameSequence;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to launch video encoder '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("video encoder exited unsuccessfully ({})", describe_code(*.code))]
    Failed { code: Option<i32> },
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Everything the encoder needs to turn a frame sequence into a video.
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    pub frames: &'a FrameSequence,
    pub fps: u32,
    pub bitrate_mbps: u32,
    pub output: &'a Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderStatus {
    Success,
    Failed(Option<i32>),
}

/// External collaborator that assembles a numbered image sequence.
///
/// Implementations block until the encoder finishes; there is no timeout.
pub trait VideoEncoder {
    fn encode(&self, job: &EncodeJob<'_>) -> Result<EncoderStatus, EncodeError>;
}

/// Runs the `ffmpeg` command-line tool with a lossless, constant-bitrate
/// x264 configuration.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different executable, e.g. an absolute ffmpeg path.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn command_args(job: &EncodeJob<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(20);
        args.push("-y".into());
        args.push("-framerate".into());
        args.push(job.fps.to_string().into());
        args.push("-i".into());
        args.push(job.frames.input_pattern().into_os_string());
        for flag in [
            "-c:v", "libx264", "-preset", "veryslow", "-qp", "0", "-pix_fmt", "yuv444p", "-g",
            "1", "-b:v",
        ] {
            args.push(flag.into());
        }
        args.push(format!("{}M", job.bitrate_mbps).into());
        args.push(job.output.as_os_str().to_os_string());
        args
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob<'_>) -> Result<EncoderStatus, EncodeError> {
        let args = Self::command_args(job);
        tracing::debug!(program = %self.program.display(), ?args, "invoking video encoder");

        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|source| EncodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(EncoderStatus::Success)
        } else {
            Ok(EncoderStatus::Failed(status.code()))
        }
    }
}
