use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use videoenc::FrameSequence;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::window::WindowBuilder;

use crate::compile::Program;
use crate::driver::{FrameDriver, LoopControl, RecordingPlan};
use crate::gpu::GpuState;
use crate::types::{DrawError, RendererConfig};

/// What the render loop produced once the window closed.
#[derive(Debug)]
pub struct RenderOutcome {
    pub frames_drawn: u64,
    /// Present when recording was requested.
    pub frames: Option<FrameSequence>,
}

/// Opens a window, draws `program` every frame until the window closes or
/// the recording budget is reached, and returns what was captured.
///
/// Errors cover event loop, window and GPU setup as well as fatal surface
/// loss while rendering.
pub fn run_window(
    config: &RendererConfig,
    program: Program,
    recording: Option<RecordingPlan>,
) -> Result<RenderOutcome> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);
    tracing::info!(
        width = config.width,
        height = config.height,
        title = %config.title,
        "window created"
    );

    let mut state = GpuState::new(window, program).context("failed to initialise renderer")?;
    let mut driver = FrameDriver::from_plan(recording);
    let mut fatal: Option<DrawError> = None;

    tracing::debug!(recording = driver.is_recording(), "entering render loop");
    state.window().request_redraw();

    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            match event {
                WindowEvent::CloseRequested => {
                    if driver.request_close() == LoopControl::Exit {
                        elwt.exit();
                    }
                }
                WindowEvent::Resized(new_size) => {
                    state.resize(new_size);
                }
                WindowEvent::RedrawRequested => match driver.frame(&mut state) {
                    Ok(LoopControl::Continue) => {}
                    Ok(LoopControl::Exit) => elwt.exit(),
                    Err(err) => {
                        tracing::error!("{err}; exiting render loop");
                        fatal = Some(err);
                        elwt.exit();
                    }
                },
                _ => {}
            }
        }
        Event::AboutToWait => {
            elwt.set_control_flow(ControlFlow::Poll);
            state.window().request_redraw();
        }
        Event::LoopExiting => {
            tracing::info!(frames = driver.frames_drawn(), "exiting render loop");
        }
        _ => {}
    });

    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    if let Some(err) = fatal {
        return Err(anyhow::Error::new(err).context("render loop stopped"));
    }

    drop(state);
    tracing::info!("GPU resources released; window closed");

    Ok(RenderOutcome {
        frames_drawn: driver.frames_drawn(),
        frames: driver.finish(),
    })
}
