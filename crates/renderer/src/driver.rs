//! Per-frame policy of the render loop, independent of the windowing layer.

use std::fs;
use std::path::PathBuf;

use videoenc::FrameSequence;

use crate::capture::FrameCapturer;
use crate::types::{DrawError, GraphicsContext};

/// What the window loop should do after a frame or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// Where to capture frames and how many to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingPlan {
    pub output_dir: PathBuf,
    pub frame_budget: u32,
}

#[derive(Debug)]
struct Recording {
    frames: FrameSequence,
    budget: u32,
    /// Framebuffer size when the first frame was captured; every frame in
    /// the sequence is read back at this size.
    size: Option<(u32, u32)>,
}

impl Recording {
    fn complete(&self) -> bool {
        self.frames.len() >= self.budget
    }
}

/// Drives one iteration per frame: draw, optionally capture, present.
///
/// While recording, window close requests are ignored until the frame
/// budget is reached, and the loop stops right after the last capture
/// without presenting it.
#[derive(Debug)]
pub struct FrameDriver {
    recording: Option<Recording>,
    capturer: FrameCapturer,
    frames_drawn: u64,
}

impl FrameDriver {
    pub fn interactive() -> Self {
        Self {
            recording: None,
            capturer: FrameCapturer::new(),
            frames_drawn: 0,
        }
    }

    /// Prepares a recording run. The output directory is created if
    /// missing; a failure here is logged and surfaces later as failed
    /// captures.
    pub fn recording(plan: RecordingPlan) -> Self {
        if let Err(err) = fs::create_dir_all(&plan.output_dir) {
            tracing::warn!(
                directory = %plan.output_dir.display(),
                error = %err,
                "failed to create frame output directory"
            );
        }
        tracing::info!(
            directory = %plan.output_dir.display(),
            frames = plan.frame_budget,
            "recording enabled"
        );

        Self {
            recording: Some(Recording {
                frames: FrameSequence::new(plan.output_dir),
                budget: plan.frame_budget,
                size: None,
            }),
            ..Self::interactive()
        }
    }

    pub fn from_plan(plan: Option<RecordingPlan>) -> Self {
        match plan {
            Some(plan) => Self::recording(plan),
            None => Self::interactive(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn failed_captures(&self) -> u32 {
        self.recording
            .as_ref()
            .map_or(0, |recording| recording.frames.missing())
    }

    /// Runs one loop iteration against `ctx`.
    pub fn frame<C>(&mut self, ctx: &mut C) -> Result<LoopControl, DrawError>
    where
        C: GraphicsContext + ?Sized,
    {
        match ctx.draw() {
            Ok(()) => {}
            Err(DrawError::Skipped(reason)) => {
                tracing::warn!(%reason, "skipping frame");
                return Ok(LoopControl::Continue);
            }
            Err(err) => return Err(err),
        }
        self.frames_drawn += 1;

        if let Some(recording) = self.recording.as_mut() {
            let (width, height) = match recording.size {
                Some(size) => size,
                None => {
                    let size = ctx.framebuffer_size();
                    tracing::info!(width = size.0, height = size.1, "capture size fixed");
                    *recording.size.insert(size)
                }
            };
            let path = recording.frames.next_frame();
            if self.capturer.capture(ctx, &path, width, height).is_err() {
                recording.frames.mark_missing();
            }

            if recording.complete() {
                tracing::info!(
                    frames = recording.frames.len(),
                    failed = recording.frames.missing(),
                    "recording complete"
                );
                return Ok(LoopControl::Exit);
            }
        }

        ctx.present();
        Ok(LoopControl::Continue)
    }

    /// Handles a window close request.
    pub fn request_close(&mut self) -> LoopControl {
        match &self.recording {
            Some(recording) if !recording.complete() => {
                tracing::info!(
                    captured = recording.frames.len(),
                    budget = recording.budget,
                    "ignoring close request until recording completes"
                );
                LoopControl::Continue
            }
            _ => LoopControl::Exit,
        }
    }

    /// Ends the loop, returning the frames produced when recording.
    pub fn finish(self) -> Option<FrameSequence> {
        self.recording.map(|recording| recording.frames)
    }
}
