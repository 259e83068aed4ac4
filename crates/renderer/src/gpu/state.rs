use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::compile::Program;
use crate::types::{CaptureError, CapturedFrame, DrawError, GraphicsContext, PixelOrigin};

use super::context::GpuContext;
use super::pipeline::ProgramPipelines;

const BYTES_PER_PIXEL: u32 = 4;

/// Offscreen color target and its readback buffer, sized for one capture.
struct CaptureTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl CaptureTarget {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        let padded_bytes_per_row = padded_bytes_per_row(width);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("capture target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("capture readback"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            buffer,
            width,
            height,
            padded_bytes_per_row,
        }
    }
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// The wgpu implementation of [`GraphicsContext`] for a winit window.
pub(crate) struct GpuState {
    window: Arc<Window>,
    context: GpuContext,
    pipelines: ProgramPipelines,
    frame: Option<wgpu::SurfaceTexture>,
    capture: Option<CaptureTarget>,
}

impl GpuState {
    pub(crate) fn new(window: Arc<Window>, program: Program) -> Result<Self> {
        let size = window.inner_size();
        let context = GpuContext::new(window.as_ref(), size)?;
        let pipelines = ProgramPipelines::new(&context.device, program, context.surface_format)
            .context("failed to build render pipeline")?;

        Ok(Self {
            window,
            context,
            pipelines,
            frame: None,
            capture: None,
        })
    }

    pub(crate) fn window(&self) -> &Window {
        &self.window
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.frame = None;
        self.context.resize(new_size);
    }

    fn encode_draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("program pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_vertex_buffer(0, self.pipelines.vertex_buffer.slice(..));
        render_pass.draw(0..self.pipelines.vertex_count(), 0..1);
    }

    fn ensure_capture_target(&mut self, width: u32, height: u32) {
        let stale = self
            .capture
            .as_ref()
            .is_none_or(|target| target.width != width || target.height != height);
        if stale {
            tracing::debug!(width, height, "allocating capture target");
            self.capture = Some(CaptureTarget::new(
                &self.context.device,
                self.pipelines.capture_format,
                width,
                height,
            ));
        }
    }

    fn read_back(&mut self, width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
        self.ensure_capture_target(width, height);
        let Some(target) = self.capture.as_ref() else {
            return Err(CaptureError::Readback("capture target unavailable".into()));
        };

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("capture encoder"),
                });
        self.encode_draw(&mut encoder, &target.view, &self.pipelines.capture);
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &target.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(target.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = target.buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| CaptureError::Readback(err.to_string()))?;
        receiver
            .recv()
            .map_err(|err| CaptureError::Readback(err.to_string()))?
            .map_err(|err| CaptureError::Readback(err.to_string()))?;

        let row_len = (width * BYTES_PER_PIXEL) as usize;
        let total = CapturedFrame::expected_len(width, height);
        let mut pixels = Vec::new();
        if pixels.try_reserve_exact(total).is_err() {
            target.buffer.unmap();
            return Err(CaptureError::Allocation { bytes: total });
        }

        {
            let mapped = slice.get_mapped_range();
            for row in mapped
                .chunks_exact(target.padded_bytes_per_row as usize)
                .take(height as usize)
            {
                pixels.extend_from_slice(&row[..row_len]);
            }
        }
        target.buffer.unmap();

        Ok(pixels)
    }
}

impl GraphicsContext for GpuState {
    fn framebuffer_size(&self) -> (u32, u32) {
        (self.context.config.width, self.context.config.height)
    }

    fn draw(&mut self) -> Result<(), DrawError> {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Err(DrawError::Skipped("surface lost or outdated".into()));
            }
            Err(wgpu::SurfaceError::Timeout) => {
                return Err(DrawError::Skipped("surface timeout".into()));
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(DrawError::Fatal("surface out of memory".into()));
            }
            Err(other) => return Err(DrawError::Skipped(format!("surface error: {other:?}"))),
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });
        self.encode_draw(&mut encoder, &view, &self.pipelines.surface);
        self.context.queue.submit(std::iter::once(encoder.finish()));

        self.frame = Some(frame);
        Ok(())
    }

    fn read_pixels(&mut self, width: u32, height: u32) -> Result<CapturedFrame, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::Readback(format!(
                "cannot capture a {width}x{height} frame"
            )));
        }

        let pixels = self.read_back(width, height)?;
        Ok(CapturedFrame {
            width,
            height,
            pixels,
            origin: PixelOrigin::TopLeft,
        })
    }

    fn present(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.window.pre_present_notify();
            frame.present();
        }
    }
}
