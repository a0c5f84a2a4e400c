use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bag2video::{
    ColorScheme, ColorizerOptions, ConversionOptions, FfmpegLogLevel, OperationType,
    ProgressCallback, ProgressInfo, StillFormat, Termination,
};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

const CLI_AFTER_HELP: &str = "Examples:\n  bag2video -i walk.bag -t depth\n  bag2video -i a.bag b.bag -t depth color --fps 30 --progress\n  bag2video -i walk.bag -t color --image-format png --json\n  bag2video --completions zsh > _bag2video";

#[derive(Debug, Parser)]
#[command(
    name = "bag2video",
    version,
    about = "Convert RealSense BAG recordings into depth and color videos",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Path(s) to the BAG file(s).
    #[arg(short = 'i', long, num_args = 1..)]
    filepaths: Vec<PathBuf>,

    /// Type(s) of data to extract. Options: depth, color.
    #[arg(short = 't', long, num_args = 1..)]
    types: Vec<String>,

    /// Color frames per second; depth is encoded at twice this. Default: 15.
    #[arg(short = 'f', long)]
    fps: Option<String>,

    /// Directory for temporary frame images.
    #[arg(long, default_value = "frames")]
    frames_dir: PathBuf,

    /// Write videos here instead of next to each recording.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Temporary frame image format (jpg, png, bmp).
    #[arg(long, default_value = "jpg")]
    image_format: String,

    /// Depth palette (jet, classic, grayscale, inverse-grayscale).
    #[arg(long, default_value = "jet")]
    color_scheme: String,

    /// Map depth linearly over --min-depth..--max-depth instead of
    /// equalizing the histogram.
    #[arg(long)]
    no_equalize: bool,

    /// Nearest depth in meters for linear mapping.
    #[arg(long, default_value_t = 0.0)]
    min_depth: f32,

    /// Farthest depth in meters for linear mapping.
    #[arg(long, default_value_t = 6.0)]
    max_depth: f32,

    /// Stop extracting after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Replay recordings in a loop and stop when frame numbers wrap.
    #[arg(long)]
    loop_playback: bool,

    /// Delete temporary frames even when a conversion fails.
    #[arg(long)]
    cleanup_on_error: bool,

    /// Show progress bars.
    #[arg(long)]
    progress: bool,

    /// Show debug logging output.
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Print the batch report as JSON.
    #[arg(long)]
    json: bool,

    /// Generate a shell completion script and exit.
    #[arg(long, value_enum)]
    completions: Option<Shell>,
}

/// Renders pipeline progress as one indicatif bar per stage.
struct TerminalProgress {
    bar: Mutex<Option<(OperationType, ProgressBar)>>,
}

impl TerminalProgress {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn new_bar(info: &ProgressInfo) -> ProgressBar {
        let (bar, template) = match info.total {
            Some(total) => (
                ProgressBar::new(total),
                "{spinner:.green} {msg:<10} {bar:40.cyan/blue} {pos}/{len}",
            ),
            None => (ProgressBar::new_spinner(), "{spinner:.green} {msg:<10} {pos} frames"),
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style.progress_chars("##-"));
        }
        bar.set_message(match info.operation {
            OperationType::FrameExtraction => "extract",
            OperationType::VideoEncoding => "encode",
            OperationType::Cleanup => "cleanup",
            _ => "working",
        });
        bar
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        if slot.as_ref().map(|(operation, _)| *operation) != Some(info.operation) {
            if let Some((_, old)) = slot.take() {
                old.finish();
            }
            *slot = Some((info.operation, Self::new_bar(info)));
        }
        if let Some((_, bar)) = slot.as_ref() {
            bar.set_position(info.current);
            if info.total.is_some_and(|total| info.current >= total) {
                bar.finish();
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn build_options(cli: &Cli, color_fps: u32) -> Result<ConversionOptions, Box<dyn std::error::Error>> {
    let still_format: StillFormat = cli.image_format.parse()?;
    let scheme: ColorScheme = cli.color_scheme.parse()?;
    if cli.no_equalize && cli.min_depth >= cli.max_depth {
        return Err("--min-depth must be less than --max-depth".into());
    }

    let colorizer = ColorizerOptions::default()
        .scheme(scheme)
        .histogram_equalization(!cli.no_equalize)
        .depth_range(cli.min_depth, cli.max_depth);

    let mut options = ConversionOptions::new()
        .with_color_fps(color_fps)
        .with_frames_root(&cli.frames_dir)
        .with_still_format(still_format)
        .with_colorizer(colorizer)
        .with_looping(cli.loop_playback)
        .with_keep_frames_on_error(!cli.cleanup_on_error);
    if let Some(max_frames) = cli.max_frames {
        options = options.with_max_frames(max_frames);
    }
    if let Some(output_dir) = &cli.output_dir {
        options = options.with_output_dir(output_dir);
    }
    if cli.progress {
        options = options.with_progress(Arc::new(TerminalProgress::new()));
    }
    Ok(options)
}

fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "bag2video", &mut std::io::stdout());
        return Ok(true);
    }

    init_logging(cli.verbose);
    if let Some(level) = &cli.log_level {
        bag2video::set_ffmpeg_log_level(level.parse::<FfmpegLogLevel>()?);
    }

    let (request, color_fps) =
        bag2video::validate_request(&cli.filepaths, &cli.types, cli.fps.as_deref())?;
    let options = build_options(&cli, color_fps)?;

    let report = bag2video::run_batch(&request, &options);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        for output in report.succeeded() {
            let note = match output.termination {
                Termination::FrameLimit(limit) => format!(" (stopped at {limit} frames)"),
                _ => String::new(),
            };
            println!(
                "{} {} ({} frames at {} fps){note}",
                "saved".green().bold(),
                output.video.display(),
                output.frame_count,
                output.fps,
            );
        }
        for (job, error) in report.failed() {
            eprintln!(
                "{} {} ({}): {error}",
                "failed".red().bold(),
                job.recording.display(),
                job.channel,
            );
        }
    }

    Ok(report.is_success())
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeatable_inputs() {
        let cli = Cli::try_parse_from([
            "bag2video", "-i", "a.bag", "b.bag", "-t", "depth", "rgb", "--fps", "30",
        ])
        .unwrap();
        assert_eq!(cli.filepaths.len(), 2);
        assert_eq!(cli.types, ["depth", "rgb"]);
        assert_eq!(cli.fps.as_deref(), Some("30"));
        assert_eq!(cli.frames_dir, PathBuf::from("frames"));
    }

    #[test]
    fn builds_options_from_flags() {
        let cli = Cli::try_parse_from([
            "bag2video", "-i", "a.bag", "-t", "depth", "--image-format", "png",
            "--cleanup-on-error", "--max-frames", "50",
        ])
        .unwrap();
        let options = build_options(&cli, 15).unwrap();
        assert_eq!(options.still_format(), StillFormat::Png);
        assert!(!options.keep_frames_on_error());
        assert_eq!(options.max_frames(), 50);
    }

    #[test]
    fn rejects_unknown_image_format() {
        let cli = Cli::try_parse_from(["bag2video", "-i", "a.bag", "-t", "depth", "--image-format", "gif"])
            .unwrap();
        assert!(build_options(&cli, 15).is_err());
    }
}
