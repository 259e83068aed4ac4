use std::path::Path;

use image::{ExtendedColorType, ImageFormat};

use crate::types::{CaptureError, CapturedFrame, GraphicsContext, PixelOrigin};

/// Writes the current color buffer of a [`GraphicsContext`] to a PNG file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCapturer;

impl FrameCapturer {
    pub fn new() -> Self {
        Self
    }

    /// Reads `width` x `height` RGBA pixels, puts the top row first and
    /// encodes them as PNG at `path`. Nothing is written on failure.
    pub fn capture<C>(
        &self,
        ctx: &mut C,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), CaptureError>
    where
        C: GraphicsContext + ?Sized,
    {
        let result = capture_to_file(ctx, path, width, height);
        match &result {
            Ok(()) => tracing::debug!(path = %path.display(), width, height, "captured frame"),
            Err(err) => tracing::error!(path = %path.display(), "frame capture failed: {err}"),
        }
        result
    }
}

fn capture_to_file<C>(ctx: &mut C, path: &Path, width: u32, height: u32) -> Result<(), CaptureError>
where
    C: GraphicsContext + ?Sized,
{
    let frame = ctx.read_pixels(width, height)?;
    let expected = CapturedFrame::expected_len(width, height);
    if frame.pixels.len() != expected {
        return Err(CaptureError::SizeMismatch {
            expected,
            actual: frame.pixels.len(),
        });
    }

    let pixels = match frame.origin {
        PixelOrigin::TopLeft => frame.pixels,
        PixelOrigin::BottomLeft => flip_vertical(&frame.pixels, width, height)?,
    };

    image::save_buffer_with_format(
        path,
        &pixels,
        width,
        height,
        ExtendedColorType::Rgba8,
        ImageFormat::Png,
    )
    .map_err(|source| CaptureError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns a copy of an RGBA8 buffer with its rows in reverse order.
pub fn flip_vertical(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let row_len = width as usize * 4;
    let expected = row_len * height as usize;
    if pixels.len() != expected {
        return Err(CaptureError::SizeMismatch {
            expected,
            actual: pixels.len(),
        });
    }

    let mut flipped = Vec::new();
    flipped
        .try_reserve_exact(expected)
        .map_err(|_| CaptureError::Allocation { bytes: expected })?;
    if row_len == 0 {
        return Ok(flipped);
    }
    for row in pixels.chunks_exact(row_len).rev() {
        flipped.extend_from_slice(row);
    }
    Ok(flipped)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::types::DrawError;

    struct StaticContext {
        frame: CapturedFrame,
    }

    impl GraphicsContext for StaticContext {
        fn framebuffer_size(&self) -> (u32, u32) {
            (self.frame.width, self.frame.height)
        }

        fn draw(&mut self) -> Result<(), DrawError> {
            Ok(())
        }

        fn read_pixels(&mut self, _width: u32, _height: u32) -> Result<CapturedFrame, CaptureError> {
            Ok(self.frame.clone())
        }

        fn present(&mut self) {}
    }

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        (0..height)
            .flat_map(|y| (0..width).flat_map(move |x| [x as u8 * 40, y as u8 * 60, 7, 255]))
            .collect()
    }

    #[test]
    fn flipping_twice_restores_buffer() {
        let pixels = gradient(3, 4);
        let once = flip_vertical(&pixels, 3, 4).unwrap();
        assert_ne!(once, pixels);
        assert_eq!(&once[..12], &pixels[36..48]);
        let twice = flip_vertical(&once, 3, 4).unwrap();
        assert_eq!(twice, pixels);
    }

    #[test]
    fn flip_rejects_wrong_length() {
        let err = flip_vertical(&[0; 10], 2, 2).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::SizeMismatch {
                expected: 16,
                actual: 10
            }
        ));
    }

    #[test]
    fn writes_bottom_left_frame_top_row_first() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("frame_00000.png");
        let mut ctx = StaticContext {
            frame: CapturedFrame {
                width: 2,
                height: 3,
                pixels: gradient(2, 3),
                origin: PixelOrigin::BottomLeft,
            },
        };

        FrameCapturer::new().capture(&mut ctx, &path, 2, 3).unwrap();

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (2, 3));
        // buffer row 2 (the top of a bottom-left image) becomes image row 0
        assert_eq!(image.get_pixel(1, 0).0, [40, 120, 7, 255]);
        assert_eq!(image.get_pixel(0, 2).0, [0, 0, 7, 255]);
    }

    #[test]
    fn size_mismatch_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("frame_00000.png");
        let mut ctx = StaticContext {
            frame: CapturedFrame {
                width: 2,
                height: 2,
                pixels: vec![0; 4],
                origin: PixelOrigin::TopLeft,
            },
        };

        let err = FrameCapturer::new()
            .capture(&mut ctx, &path, 2, 2)
            .unwrap_err();
        assert!(matches!(err, CaptureError::SizeMismatch { .. }));
        assert!(!path.exists());
    }
}
