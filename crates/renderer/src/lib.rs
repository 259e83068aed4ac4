//! Shader compilation, linking, frame capture and the windowed render loop
//! for `shaderview`.
//!
//! ```text
//!   shader::load ──▶ compile::compile (x2) ──▶ compile::link ──▶ Program
//!                                                                 │
//!   window::run_window ──▶ winit event loop ──▶ FrameDriver::frame(GpuState)
//!                                                   │
//!                                                   └─▶ FrameCapturer ─▶ frame_%05d.png
//! ```
//!
//! Compilation and linking run on naga before any window exists, so shader
//! errors are reported without touching the GPU. The render loop only sees
//! the [`GraphicsContext`] trait; `gpu` provides the wgpu implementation.

pub mod capture;
pub mod compile;
pub mod driver;
mod gpu;
mod legacy;
pub mod shader;
pub mod types;
pub mod window;

pub use capture::{flip_vertical, FrameCapturer};
pub use compile::{
    compile, link, CompileError, CompiledStage, Diagnostic, InterfaceVar, LinkError, Program,
    ProgramInterface, MAX_DIAGNOSTIC_CHARS,
};
pub use driver::{FrameDriver, LoopControl, RecordingPlan};
pub use shader::{load, ShaderKind, ShaderLoadError, ShaderSource};
pub use types::{
    CaptureError, CapturedFrame, DrawError, GraphicsContext, PixelOrigin, RendererConfig,
};
pub use window::{run_window, RenderOutcome};
