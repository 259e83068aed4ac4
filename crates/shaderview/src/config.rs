//! Resolves the run configuration from the command line or interactive
//! prompts, on top of the built-in defaults and an optional defaults file.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use runconfig::{ConfigError, RecordingConfig, RunConfig};

use crate::cli::{Cli, VIDEO_ARG_COUNT};

/// Built-in defaults, overlaid with the TOML file at `path` when given.
pub fn base_config(path: Option<&Path>) -> Result<RunConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = RunConfig::from_toml_file(path)?;
            tracing::info!(path = %path.display(), "loaded defaults file");
            Ok(config)
        }
        None => Ok(RunConfig::default()),
    }
}

/// Produces the validated configuration for this run.
///
/// WIDTH and HEIGHT on the command line select the command-line path;
/// otherwise the interactive menu is shown on `input`/`output`.
pub fn resolve<R, W>(
    cli: &Cli,
    base: RunConfig,
    input: R,
    output: W,
) -> Result<RunConfig, ConfigError>
where
    R: BufRead,
    W: Write,
{
    let config = if cli.has_dimensions() {
        from_command_line(cli, base)?
    } else {
        if let Some(width) = cli.width {
            tracing::warn!(width, "WIDTH given without HEIGHT; ignoring command line dimensions");
        }
        if cli.video.is_some() {
            tracing::warn!("--video requires WIDTH and HEIGHT on the command line; ignoring it");
        }
        tracing::info!("No command line parameters detected, launching interactive menu.");
        Prompter::new(input, output).run(base)
    };

    log_config(&config);
    config.validate()?;
    Ok(config)
}

fn from_command_line(cli: &Cli, base: RunConfig) -> Result<RunConfig, ConfigError> {
    let mut config = base;
    if let Some(width) = cli.width {
        config.window.width = width;
    }
    if let Some(height) = cli.height {
        config.window.height = height;
    }
    if let Some(title) = &cli.title {
        config.window.title = title.clone();
    }
    if let Some(vertex) = &cli.vertex {
        config.shaders.vertex = vertex.clone();
    }
    if let Some(fragment) = &cli.fragment {
        config.shaders.fragment = fragment.clone();
    }

    if let Some(values) = &cli.video {
        if values.len() < VIDEO_ARG_COUNT {
            tracing::warn!(
                received = values.len(),
                expected = VIDEO_ARG_COUNT,
                "--video flag provided but not enough parameters; recording disabled"
            );
            config.recording.enabled = false;
        } else {
            config.recording = parse_video_args(values)?;
        }
    }

    tracing::info!("Command line parameters received.");
    Ok(config)
}

/// Parses `ENABLED FPS DURATION OUT_DIR OUT_FILE`.
pub fn parse_video_args(values: &[String]) -> Result<RecordingConfig, ConfigError> {
    let [enabled, fps, duration, output_dir, output_file] = values else {
        return Err(ConfigError::Invalid(format!(
            "--video expects {VIDEO_ARG_COUNT} values, got {}",
            values.len()
        )));
    };

    let enabled: i64 = parse_value("--video ENABLED", enabled)?;
    Ok(RecordingConfig {
        enabled: enabled != 0,
        fps: parse_value("--video FPS", fps)?,
        duration_secs: parse_value("--video DURATION", duration)?,
        output_dir: PathBuf::from(output_dir),
        output_file: PathBuf::from(output_file),
    })
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{name} has an invalid value '{raw}'")))
}

/// Writes every resolved value to the log.
pub fn log_config(config: &RunConfig) {
    tracing::info!("Configuration:");
    tracing::info!(
        width = config.window.width,
        height = config.window.height,
        "  window size"
    );
    tracing::info!(title = %config.window.title, "  title");
    tracing::info!(path = %config.shaders.vertex.display(), "  vertex shader");
    tracing::info!(path = %config.shaders.fragment.display(), "  fragment shader");
    match config.active_recording() {
        Some(recording) => tracing::info!(
            fps = recording.fps,
            duration_secs = recording.duration_secs,
            frames_dir = %recording.output_dir.display(),
            output = %recording.output_file.display(),
            "  video capture: yes"
        ),
        None => tracing::info!("  video capture: no"),
    }
}

/// Line-oriented interactive menu.
///
/// Empty answers and end of input keep the current value; answers that do
/// not parse are reported and also keep the current value.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn run(&mut self, base: RunConfig) -> RunConfig {
        self.say("Welcome to shaderview!");
        self.say("1. Use default parameters");
        self.say("2. Customize parameters");

        match self.ask("Enter your choice (1 or 2): ").map(|line| line.parse::<i32>()) {
            Some(Ok(2)) => {
                let config = self.customize(base);
                tracing::info!("User provided custom parameters.");
                config
            }
            Some(Ok(_)) => {
                tracing::info!("Using default parameters.");
                base
            }
            Some(Err(_)) | None => {
                tracing::info!("Error reading choice. Using default parameters.");
                base
            }
        }
    }

    fn customize(&mut self, base: RunConfig) -> RunConfig {
        let mut config = base;
        config.window.width = self.ask_parsed("Enter window width: ", config.window.width);
        config.window.height = self.ask_parsed("Enter window height: ", config.window.height);
        config.window.title = self.ask_text("Enter window title: ", config.window.title);
        config.shaders.vertex =
            PathBuf::from(self.ask_text("Enter vertex shader path: ", path_text(&config.shaders.vertex)));
        config.shaders.fragment = PathBuf::from(
            self.ask_text("Enter fragment shader path: ", path_text(&config.shaders.fragment)),
        );

        let record = self.ask_parsed("Record video? (0/1): ", i32::from(config.recording.enabled));
        config.recording.enabled = record != 0;
        if config.recording.enabled {
            let recording = &mut config.recording;
            recording.fps = self.ask_parsed("Enter FPS: ", recording.fps);
            recording.duration_secs =
                self.ask_parsed("Enter duration (seconds): ", recording.duration_secs);
            recording.output_dir = PathBuf::from(
                self.ask_text("Output frames folder: ", path_text(&recording.output_dir)),
            );
            recording.output_file =
                PathBuf::from(self.ask_text("Output video file: ", path_text(&recording.output_file)));
        }
        config
    }

    fn say(&mut self, line: &str) {
        let _ = writeln!(self.output, "{line}");
    }

    /// Prints `prompt` and reads one trimmed line; `None` at end of input.
    fn ask(&mut self, prompt: &str) -> Option<String> {
        let _ = write!(self.output, "{prompt}");
        let _ = self.output.flush();

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read from standard input");
                None
            }
        }
    }

    fn ask_text(&mut self, prompt: &str, current: String) -> String {
        match self.ask(prompt) {
            Some(answer) if !answer.is_empty() => answer,
            _ => current,
        }
    }

    fn ask_parsed<T>(&mut self, prompt: &str, current: T) -> T
    where
        T: FromStr + std::fmt::Display,
    {
        match self.ask(prompt) {
            Some(answer) if !answer.is_empty() => match answer.parse() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(
                        prompt = prompt.trim_end_matches([':', ' ']),
                        %answer,
                        kept = %current,
                        "could not parse answer; keeping current value"
                    );
                    current
                }
            },
            _ => current,
        }
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("shaderview").chain(args.iter().copied())).unwrap()
    }

    fn resolve_with_input(cli: &Cli, input: &str) -> (Result<RunConfig, ConfigError>, String) {
        let mut output = Vec::new();
        let result = resolve(
            cli,
            RunConfig::default(),
            Cursor::new(input.as_bytes()),
            &mut output,
        );
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn dimensions_alone_keep_other_defaults() {
        for (width, height) in [(1, 1), (800, 600), (3840, 2160)] {
            let args = [width.to_string(), height.to_string()];
            let cli = cli(&[args[0].as_str(), args[1].as_str()]);
            let (config, prompts) = resolve_with_input(&cli, "");
            let config = config.unwrap();

            assert!(prompts.is_empty());
            assert_eq!(config.window.width, width);
            assert_eq!(config.window.height, height);
            assert_eq!(config.window.title, runconfig::DEFAULT_TITLE);
            assert_eq!(
                config.shaders.vertex,
                PathBuf::from(runconfig::DEFAULT_VERTEX_SHADER)
            );
            assert_eq!(
                config.shaders.fragment,
                PathBuf::from(runconfig::DEFAULT_FRAGMENT_SHADER)
            );
            assert!(config.active_recording().is_none());
        }
    }

    #[test]
    fn full_command_line_with_video() {
        let cli = cli(&[
            "800", "600", "T", "v.glsl", "f.glsl", "--video", "1", "30", "5", "framesOut",
            "video.mp4",
        ]);
        let (config, _) = resolve_with_input(&cli, "");
        let config = config.unwrap();

        assert_eq!(config.window.title, "T");
        assert_eq!(config.shaders.vertex, PathBuf::from("v.glsl"));
        assert_eq!(config.shaders.fragment, PathBuf::from("f.glsl"));
        let recording = config.active_recording().unwrap();
        assert_eq!(recording.fps, 30);
        assert_eq!(recording.duration_secs, 5.0);
        assert_eq!(recording.output_dir, PathBuf::from("framesOut"));
        assert_eq!(recording.output_file, PathBuf::from("video.mp4"));
        assert_eq!(recording.frame_budget(), 150);
    }

    #[test]
    fn short_video_list_leaves_recording_disabled() {
        let cli = cli(&["800", "600", "T", "v.glsl", "f.glsl", "--video", "1", "30", "5"]);
        let (config, _) = resolve_with_input(&cli, "");
        assert!(config.unwrap().active_recording().is_none());
    }

    #[test]
    fn malformed_video_values_are_config_errors() {
        let cli = cli(&["800", "600", "--video", "1", "fast", "5", "out", "v.mp4"]);
        let (config, _) = resolve_with_input(&cli, "");
        let err = config.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("FPS"));
    }

    #[test]
    fn zero_length_recording_fails_validation() {
        let cli = cli(&["800", "600", "--video", "1", "10", "0.05", "out", "v.mp4"]);
        let (config, _) = resolve_with_input(&cli, "");
        assert!(matches!(config, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn interactive_default_choice() {
        let cli = cli(&[]);
        let (config, prompts) = resolve_with_input(&cli, "1\n");
        assert_eq!(config.unwrap(), RunConfig::default());
        assert!(prompts.contains("Enter your choice (1 or 2): "));
    }

    #[test]
    fn interactive_garbage_or_eof_uses_defaults() {
        for input in ["abc\n", ""] {
            let (config, _) = resolve_with_input(&cli(&[]), input);
            assert_eq!(config.unwrap(), RunConfig::default());
        }
    }

    #[test]
    fn interactive_customisation() {
        let input = "2\n1024\n768\nMy Demo\nvs.glsl\nfs.glsl\n1\n10\n2.0\nout\nclip.mp4\n";
        let (config, prompts) = resolve_with_input(&cli(&[]), input);
        let config = config.unwrap();

        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 768);
        assert_eq!(config.window.title, "My Demo");
        assert_eq!(config.shaders.vertex, PathBuf::from("vs.glsl"));
        assert_eq!(config.shaders.fragment, PathBuf::from("fs.glsl"));
        let recording = config.active_recording().unwrap();
        assert_eq!(recording.frame_budget(), 20);
        assert_eq!(recording.output_dir, PathBuf::from("out"));
        assert_eq!(recording.output_file, PathBuf::from("clip.mp4"));
        assert!(prompts.contains("Output video file: "));
    }

    #[test]
    fn interactive_bad_number_keeps_current_value() {
        let input = "2\nwide\n\n\n\n\n0\n";
        let (config, prompts) = resolve_with_input(&cli(&[]), input);
        let config = config.unwrap();

        assert_eq!(config.window.width, runconfig::DEFAULT_WIDTH);
        assert_eq!(config.window.height, runconfig::DEFAULT_HEIGHT);
        assert_eq!(config.window.title, runconfig::DEFAULT_TITLE);
        assert!(config.active_recording().is_none());
        assert!(!prompts.contains("Enter FPS: "));
    }

    #[test]
    fn lone_width_falls_back_to_menu() {
        let (config, prompts) = resolve_with_input(&cli(&["800"]), "1\n");
        assert_eq!(config.unwrap().window.width, runconfig::DEFAULT_WIDTH);
        assert!(prompts.contains("Welcome"));
    }

    #[test]
    fn defaults_file_is_overlaid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shaderview.toml");
        fs::write(
            &path,
            "[window]\ntitle = \"From File\"\n\n[shaders]\nfragment = \"custom.frag\"\n",
        )
        .unwrap();

        let base = base_config(Some(&path)).unwrap();
        assert_eq!(base.window.title, "From File");
        assert_eq!(base.window.width, runconfig::DEFAULT_WIDTH);

        let mut output = Vec::new();
        let config = resolve(
            &cli(&["640", "480"]),
            base,
            Cursor::new(&b""[..]),
            &mut output,
        )
        .unwrap();
        assert_eq!(config.window.title, "From File");
        assert_eq!(config.shaders.fragment, PathBuf::from("custom.frag"));
        assert_eq!(config.window.width, 640);
    }
}
