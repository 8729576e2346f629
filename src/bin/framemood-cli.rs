use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framemood::{
    CancellationToken, ClientOptions, Credential, FfmpegLogLevel, PipelineConfig,
    ProgressCallback, ProgressInfo, TableFormat, TableOptions, VideoSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framemood analyze clip.mp4 --out emotions.csv --token $HF_TOKEN\n  framemood analyze clip.mp4 --out emotions.json --stride 15 --progress --status-column\n  framemood info clip.mp4 --json\n  framemood completions zsh > _framemood";

#[derive(Debug, Parser)]
#[command(
    name = "framemood",
    version,
    about = "Score facial emotions on sampled video frames",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while frames are classified.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting an existing output table.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true, default_value = "error")]
    ffmpeg_log_level: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sample a video, classify every sampled frame and write the table.
    #[command(
        about = "Classify sampled frames and write an emotion table",
        after_help = "Examples:\n  framemood analyze clip.mp4 --out emotions.csv\n  framemood analyze clip.mp4 --out emotions.json --max-retries 5 --retry-delay 10"
    )]
    Analyze {
        /// Input video path.
        video: PathBuf,
        /// Output table (.csv or .json).
        #[arg(long)]
        out: PathBuf,
        /// Keep every Nth frame.
        #[arg(long, default_value_t = framemood::DEFAULT_STRIDE, value_parser = clap::value_parser!(u64).range(1..))]
        stride: u64,
        /// Bearer token for the classification endpoint.
        #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
        token: String,
        /// Requests per frame while the model is loading.
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
        /// Seconds to wait between loading responses.
        #[arg(long, default_value = "20", value_parser = parse_seconds)]
        retry_delay: Duration,
        /// Per-request timeout in seconds.
        #[arg(long, default_value = "60", value_parser = parse_seconds)]
        timeout: Duration,
        /// Classification endpoint URL.
        #[arg(long, default_value = framemood::DEFAULT_ENDPOINT)]
        endpoint: String,
        /// Add a trailing status column marking failed frames.
        #[arg(long)]
        status_column: bool,
        /// Print a machine-readable run summary.
        #[arg(long)]
        json: bool,
        /// Classify this many frames concurrently (requires the `rayon` feature).
        #[arg(long)]
        batch: Option<usize>,
    },

    /// Print stream information for a video.
    #[command(about = "Print video stream information", visible_alias = "probe")]
    Info {
        /// Input video path.
        video: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    #[command(about = "Generate shell completion scripts")]
    Completions {
        shell: Shell,
    },
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("not a number of seconds: {value}"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("seconds must be a non-negative number: {value}"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|error| format!("{error}: {value}"))
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    TableFormat::from_path(path)?;
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let level: FfmpegLogLevel = global.ffmpeg_log_level.parse()?;
    framemood::set_ffmpeg_log_level(level);
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(frame) = info.current_frame {
            let status = if info.failed { "failed" } else { "ok" };
            self.bar.set_message(format!("(frame {frame} {status})"));
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "framemood", &mut std::io::stdout());
        return Ok(());
    }

    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Info { video, json } => {
            let source = VideoSource::open(&video)?;
            let info = source.info();
            if json {
                let payload = json!({
                    "path": video.display().to_string(),
                    "width": info.width,
                    "height": info.height,
                    "fps": info.frames_per_second,
                    "frame_count": info.frame_count,
                    "codec": info.codec,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{} {}", "video:".cyan().bold(), video.display());
                println!("  {} {}x{}", "size:".bold(), info.width, info.height);
                println!("  {} {:.3}", "fps:".bold(), info.frames_per_second);
                println!("  {} {}", "frames:".bold(), info.frame_count);
                println!("  {} {}", "codec:".bold(), info.codec);
            }
        }
        Commands::Analyze {
            video,
            out,
            stride,
            token,
            max_retries,
            retry_delay,
            timeout,
            endpoint,
            status_column,
            json,
            batch,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;

            let cancellation = CancellationToken::new();
            let handler_token = cancellation.clone();
            ctrlc::set_handler(move || {
                eprintln!("{}", "interrupt: stopping after the current frame, finished rows will be written".yellow());
                handler_token.cancel();
            })?;

            let client = ClientOptions::new()
                .with_endpoint(endpoint)
                .with_max_retries(max_retries)
                .with_retry_delay(retry_delay)
                .with_timeout(timeout);
            let mut config = PipelineConfig::new(&video, Credential::new(token))
                .with_stride(stride)
                .with_client_options(client)
                .with_cancellation(cancellation);

            let progress = cli.global.progress.then(|| Arc::new(TerminalProgress::new()));
            if let Some(progress) = &progress {
                config = config.with_progress(progress.clone());
            }

            let report = match batch {
                #[cfg(feature = "rayon")]
                Some(batch_size) => framemood::run_parallel(&config, batch_size)?,
                #[cfg(not(feature = "rayon"))]
                Some(_) => {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        "--batch requires building with the `rayon` feature; running sequentially"
                            .yellow()
                    );
                    framemood::run_with_report(&config)?
                }
                None => framemood::run_with_report(&config)?,
            };

            if let Some(progress) = progress {
                progress.bar.finish_and_clear();
            }

            let options = TableOptions::default().with_status_column(status_column);
            framemood::write_table(&report.rows, &out, &options)?;

            if json {
                let payload = json!({
                    "video": video.display().to_string(),
                    "output": out.display().to_string(),
                    "stride": stride,
                    "frames_total": report.frames_total,
                    "frames_sampled": report.frames_sampled,
                    "failures": report.failures,
                    "stopped_early": report.stopped_early,
                    "cancelled": report.cancelled,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "{} {} rows written to {}",
                    "done:".green().bold(),
                    report.frames_sampled,
                    out.display()
                );
                if report.failures > 0 {
                    eprintln!(
                        "{} {} frames could not be classified and were written as zeros",
                        "warning:".yellow().bold(),
                        report.failures
                    );
                }
                if report.cancelled {
                    eprintln!(
                        "{} run cancelled, table holds the first {} sampled frames",
                        "warning:".yellow().bold(),
                        report.frames_sampled
                    );
                }
                if report.stopped_early {
                    eprintln!(
                        "{} video ended before its reported {} frames",
                        "warning:".yellow().bold(),
                        report.frames_total
                    );
                }
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::{Cli, Commands, parse_seconds};

    #[test]
    fn parse_seconds_accepts_fractions() {
        assert_eq!(parse_seconds("20").unwrap(), Duration::from_secs(20));
        assert_eq!(parse_seconds("0.5").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_seconds("0").unwrap(), Duration::ZERO);
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
        assert!(parse_seconds("1e30").is_err());
        assert!(parse_seconds("inf").is_err());
    }

    #[test]
    fn analyze_defaults() {
        let cli = Cli::try_parse_from([
            "framemood", "analyze", "clip.mp4", "--out", "rows.csv", "--token", "abc",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                stride,
                max_retries,
                retry_delay,
                status_column,
                ..
            } => {
                assert_eq!(stride, 30);
                assert_eq!(max_retries, 3);
                assert_eq!(retry_delay, Duration::from_secs(20));
                assert!(!status_column);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn zero_stride_is_rejected() {
        let result = Cli::try_parse_from([
            "framemood", "analyze", "clip.mp4", "--out", "rows.csv", "--token", "abc",
            "--stride", "0",
        ]);
        assert!(result.is_err());
    }
}
