use std::io;

use renderer::{
    CompileError, LinkError, RecordingPlan, RendererConfig, ShaderKind, ShaderLoadError,
};
use runconfig::{ConfigError, RunConfig};
use videoenc::{FfmpegEncoder, VideoAssembler};

use crate::cli::Cli;
use crate::config;
use crate::logging::LogError;

/// Top-level failure of a run, carrying its process exit status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ShaderLoad(#[from] ShaderLoadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("{0:#}")]
    ResourceInit(anyhow::Error),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Log(_) | AppError::ResourceInit(_) => 255,
            AppError::ShaderLoad(_) | AppError::Compile(_) | AppError::Link(_) => 1,
            AppError::Config(_) => 2,
        }
    }

    /// Shader errors are logged with full detail where they happen.
    pub fn already_logged(&self) -> bool {
        matches!(
            self,
            AppError::ShaderLoad(_) | AppError::Compile(_) | AppError::Link(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ConfiguringRun,
    LoadingShaders,
    Linking,
    Rendering,
    Assembling,
    Terminated,
}

fn enter(phase: Phase) {
    tracing::debug!(?phase, "entering phase");
}

/// Resolves the configuration from the process's stdin/stdout and runs.
pub fn run(cli: Cli) -> Result<(), AppError> {
    enter(Phase::ConfiguringRun);
    let base = config::base_config(cli.config.as_deref())?;
    let config = config::resolve(&cli, base, io::stdin().lock(), io::stdout())?;
    run_with_config(&config)
}

pub fn run_with_config(config: &RunConfig) -> Result<(), AppError> {
    enter(Phase::LoadingShaders);
    let vertex_source = renderer::load(&config.shaders.vertex)?;
    let fragment_source = renderer::load(&config.shaders.fragment)?;
    let vertex = renderer::compile(ShaderKind::Vertex, vertex_source)?;
    let fragment = renderer::compile(ShaderKind::Fragment, fragment_source)?;

    enter(Phase::Linking);
    let program = renderer::link(vertex, fragment)?;

    enter(Phase::Rendering);
    let renderer_config = RendererConfig {
        width: config.window.width,
        height: config.window.height,
        title: config.window.title.clone(),
    };
    let plan = config.active_recording().map(|recording| RecordingPlan {
        output_dir: recording.output_dir.clone(),
        frame_budget: recording.frame_budget(),
    });
    tracing::info!("Starting render loop.");
    let outcome =
        renderer::run_window(&renderer_config, program, plan).map_err(AppError::ResourceInit)?;
    tracing::info!(frames_drawn = outcome.frames_drawn, "render loop finished");

    if let (Some(recording), Some(frames)) = (config.active_recording(), outcome.frames.as_ref()) {
        enter(Phase::Assembling);
        let assembler = VideoAssembler::new(FfmpegEncoder::new());
        // Assembly failures are logged by the assembler and do not change the exit status.
        let _ = assembler.assemble(
            recording.fps,
            recording.duration_secs,
            frames,
            &recording.output_file,
        );
    }

    enter(Phase::Terminated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn exit_codes_follow_failure_class() {
        let config = AppError::Config(ConfigError::Invalid("bad".into()));
        assert_eq!(config.exit_code(), 2);

        let load = AppError::ShaderLoad(ShaderLoadError::Read {
            path: PathBuf::from("x.glsl"),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(load.exit_code(), 1);
        assert!(load.already_logged());

        let init = AppError::ResourceInit(anyhow::anyhow!("no adapter"));
        assert_eq!(init.exit_code(), 255);
        assert!(!init.already_logged());
    }

    #[test]
    fn missing_shader_fails_before_rendering() {
        let mut config = RunConfig::default();
        config.shaders.vertex = PathBuf::from("/nonexistent/shaderview/vertex.glsl");
        let err = run_with_config(&config).unwrap_err();
        assert!(matches!(err, AppError::ShaderLoad(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
