use std::path::PathBuf;

use clap::Parser;
use runconfig::DEFAULT_LOG_FILE;

/// Number of values expected after `--video`.
pub const VIDEO_ARG_COUNT: usize = 5;

#[derive(Parser, Debug)]
#[command(
    name = "shaderview",
    author,
    version,
    about = "Minimal GLSL shader viewer with frame capture and video export",
    after_help = "Run without WIDTH and HEIGHT to choose parameters interactively."
)]
pub struct Cli {
    /// Window width in pixels.
    #[arg(value_name = "WIDTH", value_parser = clap::value_parser!(u32).range(1..))]
    pub width: Option<u32>,

    /// Window height in pixels.
    #[arg(value_name = "HEIGHT", value_parser = clap::value_parser!(u32).range(1..))]
    pub height: Option<u32>,

    /// Window title.
    #[arg(value_name = "TITLE")]
    pub title: Option<String>,

    /// Path to the GLSL vertex shader.
    #[arg(value_name = "VERTEX")]
    pub vertex: Option<PathBuf>,

    /// Path to the GLSL fragment shader.
    #[arg(value_name = "FRAGMENT")]
    pub fragment: Option<PathBuf>,

    /// Record frames and build a video: ENABLED(0/1) FPS DURATION OUT_DIR OUT_FILE.
    #[arg(long, value_name = "VALUE", num_args = 0..=VIDEO_ARG_COUNT)]
    pub video: Option<Vec<String>>,

    /// TOML file overriding the built-in defaults.
    #[arg(long, value_name = "FILE", env = "SHADERVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log file, truncated at start-up.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}

impl Cli {
    /// Both dimensions were given, so no interactive prompts are needed.
    pub fn has_dimensions(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positionals_and_video_flag() {
        let cli = Cli::try_parse_from([
            "shaderview",
            "800",
            "600",
            "Demo",
            "a.vert",
            "b.frag",
            "--video",
            "1",
            "30",
            "5",
            "framesOut",
            "video.mp4",
        ])
        .unwrap();

        assert_eq!(cli.width, Some(800));
        assert_eq!(cli.height, Some(600));
        assert_eq!(cli.title.as_deref(), Some("Demo"));
        assert_eq!(cli.vertex, Some(PathBuf::from("a.vert")));
        assert_eq!(cli.fragment, Some(PathBuf::from("b.frag")));
        assert_eq!(
            cli.video.as_deref(),
            Some(&["1", "30", "5", "framesOut", "video.mp4"].map(String::from)[..])
        );
        assert_eq!(cli.log_file, PathBuf::from("shaderapp_logs.log"));
        assert!(cli.has_dimensions());
    }

    #[test]
    fn video_flag_accepts_short_value_lists() {
        let cli = Cli::try_parse_from(["shaderview", "800", "600", "--video", "1", "30"]).unwrap();
        assert_eq!(cli.video.map(|values| values.len()), Some(2));
    }

    #[test]
    fn rejects_zero_width() {
        assert!(Cli::try_parse_from(["shaderview", "0", "600"]).is_err());
    }

    #[test]
    fn no_arguments_selects_interactive_mode() {
        let cli = Cli::try_parse_from(["shaderview"]).unwrap();
        assert!(!cli.has_dimensions());
        assert!(cli.video.is_none());
    }
}
