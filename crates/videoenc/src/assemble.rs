use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::encoder::{EncodeError, EncodeJob, EncoderStatus, FfmpegEncoder, VideoEncoder};
use crate::sequence::FrameSequence;

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    /// Frame files actually removed after encoding.
    pub removed: u32,
}

/// Turns a finished frame sequence into a video and cleans up after it.
#[derive(Debug, Clone, Default)]
pub struct VideoAssembler<E = FfmpegEncoder> {
    encoder: E,
}

impl<E: VideoEncoder> VideoAssembler<E> {
    pub fn new(encoder: E) -> Self {
        Self { encoder }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Encodes `frames` into `output` at `fps` with a bitrate of `fps * 2`
    /// Mbit/s. On success the enumerated frame files are deleted; on
    /// failure they are left in place for inspection.
    pub fn assemble(
        &self,
        fps: u32,
        duration_secs: f32,
        frames: &FrameSequence,
        output: &Path,
    ) -> Result<AssemblyReport, EncodeError> {
        let expected = (fps as f32 * duration_secs).floor();
        if !expected.is_finite() || expected < 0.0 || expected as u32 != frames.len() {
            tracing::warn!(
                expected = expected,
                produced = frames.len(),
                "frame count does not match fps * duration"
            );
        }
        if frames.missing() > 0 {
            tracing::warn!(
                missing = frames.missing(),
                produced = frames.len(),
                "some frames were never captured; the video stops at the first missing frame"
            );
        }

        let job = EncodeJob {
            frames,
            fps,
            bitrate_mbps: fps.saturating_mul(2),
            output,
        };

        tracing::info!(
            frames = frames.len(),
            fps,
            bitrate_mbps = job.bitrate_mbps,
            output = %output.display(),
            "assembling video"
        );

        let status = match self.encoder.encode(&job) {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    directory = %frames.directory().display(),
                    "video assembly failed; keeping captured frames"
                );
                return Err(err);
            }
        };

        if let EncoderStatus::Failed(code) = status {
            let err = EncodeError::Failed { code };
            tracing::error!(
                error = %err,
                directory = %frames.directory().display(),
                "video assembly failed; keeping captured frames"
            );
            return Err(err);
        }

        let removed = remove_frames(frames);
        tracing::info!(
            output = %output.display(),
            removed,
            "video created successfully"
        );

        Ok(AssemblyReport {
            output: output.to_path_buf(),
            removed,
        })
    }
}

fn remove_frames(frames: &FrameSequence) -> u32 {
    let mut removed = 0;
    for path in frames.paths() {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove frame");
            }
        }
    }
    removed
}
