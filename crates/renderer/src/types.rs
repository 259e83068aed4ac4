/// Row order of a pixel buffer returned by [`GraphicsContext::read_pixels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrigin {
    /// First row in the buffer is the bottom of the image (OpenGL style).
    BottomLeft,
    /// First row in the buffer is the top of the image.
    TopLeft,
}

/// Tightly packed RGBA8 pixels read back from the color buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub origin: PixelOrigin,
}

impl CapturedFrame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    /// The frame could not be produced this iteration; the loop continues.
    #[error("frame skipped: {0}")]
    Skipped(String),
    /// The surface is unusable; the render loop must stop.
    #[error("fatal surface error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to allocate {bytes} bytes for frame capture")]
    Allocation { bytes: usize },
    #[error("failed to read back frame: {0}")]
    Readback(String),
    #[error("readback returned {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("failed to write frame image {path}: {source}")]
    Encode {
        path: std::path::PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// The drawing capability the render loop consumes.
///
/// The frame driver and the capturer only talk to this trait, which keeps
/// them testable without a GPU.
pub trait GraphicsContext {
    /// Current framebuffer size in physical pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Clears the color buffer and draws the linked program once.
    fn draw(&mut self) -> Result<(), DrawError>;

    /// Reads the most recently drawn color buffer as RGBA8.
    fn read_pixels(&mut self, width: u32, height: u32) -> Result<CapturedFrame, CaptureError>;

    /// Shows the drawn frame.
    fn present(&mut self);
}

/// Immutable window parameters passed to the renderer at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    /// Requested inner size in physical pixels.
    pub width: u32,
    pub height: u32,
    pub title: String,
}
