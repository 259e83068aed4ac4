//! wgpu backend for the render loop.
//!
//! - `context` owns the instance, device and window surface.
//! - `pipeline` turns a linked program into render pipelines for the
//!   swapchain and for the capture texture.
//! - `state` implements [`crate::GraphicsContext`] on top of both.

mod context;
mod pipeline;
mod state;

pub(crate) use state::GpuState;
