use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use storycut::command::{Cancellation, Verbosity};
use storycut::pipeline::{
    print_summary, CaptionSource, ImageSource, JobSpec, NarrationSource, Pipeline,
    PipelineConfig,
};
use storycut::timeline::Background;
use storycut::timing::seconds;
use storycut::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "storycut")]
#[command(version, about = "Assemble narrated story videos split into upload-sized parts")]
#[command(
    long_about = "Overlay narration, timed captions and a title image on background footage, then split the result into parts of bounded length named {id}_part_{n}.mp4."
)]
#[command(group(ArgGroup::new("title").required(true).args(["title_audio", "title_text"])))]
#[command(group(ArgGroup::new("body").required(true).args(["body_audio", "body_text", "body_file"])))]
struct Cli {
    /// Job identifier, used to name the output files
    id: String,

    /// Title narration audio file
    #[arg(long)]
    title_audio: Option<PathBuf>,

    /// Title text to synthesize
    #[arg(long)]
    title_text: Option<String>,

    /// Body narration audio file
    #[arg(long)]
    body_audio: Option<PathBuf>,

    /// Body text to synthesize
    #[arg(long)]
    body_text: Option<String>,

    /// File holding the body text to synthesize
    #[arg(long)]
    body_file: Option<PathBuf>,

    /// Caption shown over the title segment
    #[arg(long)]
    title_caption: Option<String>,

    /// Subtitle file timing the body captions (default: run the recognizer)
    #[arg(long, conflicts_with = "estimate")]
    subtitles: Option<PathBuf>,

    /// Estimate caption timings from the body text
    #[arg(long)]
    estimate: bool,

    /// Image shown during the title segment
    #[arg(long, conflicts_with = "url")]
    image: Option<PathBuf>,

    /// Page to screenshot for the title image
    #[arg(long)]
    url: Option<String>,

    /// Background footage
    #[arg(short, long)]
    background: PathBuf,

    /// Seconds into the background footage to start from
    #[arg(long, default_value = "0")]
    background_start: f64,

    /// Do not repeat background footage shorter than the video
    #[arg(long)]
    no_loop: bool,

    /// Background music, restarted under every part
    #[arg(short, long)]
    music: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Maximum part length in seconds
    #[arg(long)]
    max_part: Option<f64>,

    /// Minimum part length in seconds; shorter remainders are dropped
    #[arg(long)]
    min_part: Option<f64>,

    /// Maximum words per caption
    #[arg(long)]
    max_words: Option<usize>,

    /// Timecode style of the written captions: short, full
    #[arg(long)]
    timecode_style: Option<String>,

    /// Do not write the captions file
    #[arg(long)]
    no_captions_file: bool,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors, no progress bars
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn needs_speech(&self) -> bool {
        self.title_text.is_some() || self.body_text.is_some() || self.body_file.is_some()
    }

    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(max) = self.max_part {
            config.max_part_secs = max;
        }
        if let Some(min) = self.min_part {
            config.min_part_secs = min;
        }
        if let Some(words) = self.max_words {
            config.max_words_per_caption = words;
        }
        if let Some(style) = &self.timecode_style {
            config.timecode_style = style.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        Ok(())
    }

    fn job(&self, config: &Config) -> Result<JobSpec> {
        let title = match (&self.title_audio, &self.title_text) {
            (Some(path), _) => NarrationSource::Audio(path.clone()),
            (None, Some(text)) => NarrationSource::Text(text.clone()),
            (None, None) => anyhow::bail!("Either --title-audio or --title-text is required"),
        };

        let body = if let Some(path) = &self.body_audio {
            NarrationSource::Audio(path.clone())
        } else if let Some(text) = &self.body_text {
            NarrationSource::Text(text.clone())
        } else if let Some(path) = &self.body_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read body text from {}", path.display()))?;
            NarrationSource::Text(text)
        } else {
            anyhow::bail!("One of --body-audio, --body-text or --body-file is required");
        };

        let captions = match (&self.subtitles, self.estimate) {
            (Some(path), _) => CaptionSource::SubtitleFile(path.clone()),
            (None, true) => CaptionSource::Estimate,
            (None, false) => CaptionSource::Recognize,
        };

        let image = match (&self.image, &self.url) {
            (Some(path), _) => ImageSource::File(path.clone()),
            (None, Some(url)) => ImageSource::Screenshot { url: url.clone() },
            (None, None) => ImageSource::None,
        };

        Ok(JobSpec {
            id: self.id.clone(),
            title,
            body,
            title_caption: self.title_caption.clone(),
            captions,
            image,
            background: Background {
                video: self.background.clone(),
                in_point: seconds(self.background_start)
                    .context("Invalid --background-start")?,
                looped: !self.no_loop,
                volume: config.background_volume,
            },
            music: self.music.clone(),
        })
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    // Load and validate configuration
    let mut config = Config::load().context("Failed to load configuration")?;
    cli.apply(&mut config)?;
    config
        .validate(cli.needs_speech())
        .context("Configuration validation failed")?;

    let job = cli.job(&config)?;

    let cancel = Cancellation::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || handler.cancel()).context("Failed to set Ctrl+C handler")?;

    info!("Job:        {}", job.id);
    info!("Background: {}", job.background.video.display());
    info!("Output:     {}", config.output_dir.display());
    info!(
        "Parts:      {:.0}s max, {:.0}s min",
        config.max_part_secs, config.min_part_secs
    );

    let options = PipelineConfig {
        output_dir: config.output_dir.clone(),
        show_progress: !cli.quiet,
        render_verbosity: if cli.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Quiet
        },
        write_captions: !cli.no_captions_file,
        ..PipelineConfig::default()
    };

    let pipeline = Pipeline::new(config, options).with_cancellation(cancel);
    let result = pipeline
        .run(&job)
        .await
        .with_context(|| format!("Job {} failed", job.id))?;

    if !cli.quiet {
        print_summary(&result);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["storycut"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_requires_title_and_body() {
        assert!(Cli::try_parse_from(["storycut", "job1", "--background", "bg.mp4"]).is_err());
        assert!(Cli::try_parse_from([
            "storycut",
            "job1",
            "--background",
            "bg.mp4",
            "--title-audio",
            "t.mp3"
        ])
        .is_err());
    }

    #[test]
    fn test_job_from_audio_inputs() {
        let cli = parse(&[
            "post7",
            "--title-audio",
            "t.mp3",
            "--body-audio",
            "b.mp3",
            "--subtitles",
            "subs.txt",
            "--image",
            "card.png",
            "-b",
            "bg.mp4",
            "--background-start",
            "12.5",
        ]);
        assert!(!cli.needs_speech());

        let job = cli.job(&Config::default()).unwrap();
        assert_eq!(job.id, "post7");
        assert_eq!(job.captions, CaptionSource::SubtitleFile(PathBuf::from("subs.txt")));
        assert_eq!(job.image, ImageSource::File(PathBuf::from("card.png")));
        assert_eq!(job.background.in_point.as_millis(), 12500);
        assert!(job.background.looped);
    }

    #[test]
    fn test_job_from_text_inputs() {
        let cli = parse(&[
            "post8",
            "--title-text",
            "AITA for this",
            "--body-text",
            "It started on a Monday.",
            "--estimate",
            "--url",
            "https://example.com/post",
            "-b",
            "bg.mp4",
            "--no-loop",
        ]);
        assert!(cli.needs_speech());

        let job = cli.job(&Config::default()).unwrap();
        assert_eq!(job.captions, CaptionSource::Estimate);
        assert!(matches!(job.image, ImageSource::Screenshot { .. }));
        assert!(!job.background.looped);
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "job",
            "--title-audio",
            "t.mp3",
            "--body-audio",
            "b.mp3",
            "-b",
            "bg.mp4",
            "--max-part",
            "90",
            "--min-part",
            "30",
            "--max-words",
            "2",
            "--timecode-style",
            "full",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config).unwrap();
        assert_eq!(config.max_part_secs, 90.0);
        assert_eq!(config.min_part_secs, 30.0);
        assert_eq!(config.max_words_per_caption, 2);
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_conflicting_caption_sources() {
        assert!(Cli::try_parse_from([
            "storycut",
            "job",
            "--title-audio",
            "t.mp3",
            "--body-audio",
            "b.mp3",
            "-b",
            "bg.mp4",
            "--subtitles",
            "s.txt",
            "--estimate",
        ])
        .is_err());
    }
}
