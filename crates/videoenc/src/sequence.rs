//! Naming and bookkeeping for numbered frame captures.
//!
//! The sequence only tracks how many indices were handed out. Cleanup walks
//! exactly those indices instead of globbing the directory, so unrelated
//! files that happen to share the prefix are left alone.

use std::path::{Path, PathBuf};

/// printf-style pattern understood by the external encoder.
pub const FRAME_FILE_PATTERN: &str = "frame_%05d.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    directory: PathBuf,
    produced: u32,
    missing: u32,
}

impl FrameSequence {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            produced: 0,
            missing: 0,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of frame indices handed out so far.
    pub fn len(&self) -> u32 {
        self.produced
    }

    pub fn is_empty(&self) -> bool {
        self.produced == 0
    }

    pub fn frame_path(&self, index: u32) -> PathBuf {
        self.directory.join(format!("frame_{index:05}.png"))
    }

    /// Reserves the next index and returns the path the frame should be
    /// written to. The index is consumed even if the write later fails.
    pub fn next_frame(&mut self) -> PathBuf {
        let path = self.frame_path(self.produced);
        self.produced = self.produced.saturating_add(1);
        path
    }

    /// Records that a reserved index was never written.
    pub fn mark_missing(&mut self) {
        self.missing = self.missing.saturating_add(1);
    }

    /// Reserved indices with no frame on disk. The encoder's numbered input
    /// stops at the first gap.
    pub fn missing(&self) -> u32 {
        self.missing
    }

    /// Input pattern handed to the encoder.
    pub fn input_pattern(&self) -> PathBuf {
        self.directory.join(FRAME_FILE_PATTERN)
    }

    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        (0..self.produced).map(|index| self.frame_path(index))
    }
}
