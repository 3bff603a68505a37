use crate::caption::{
    estimate_transcript, parse_subtitles, write_subtitles, create_formatter, CaptionUnit,
    EstimateConfig, Segmenter,
};
use crate::command::{retry_with_backoff, CallScope, Cancellation, Verbosity};
use crate::config::Config;
use crate::error::{Result, StorycutError};
use crate::media::{
    check_ffprobe, is_wav, media_duration, require_file, FfmpegRenderer, RenderJob, Renderer,
};
use crate::screenshot::{BrowserCommand, Screenshotter};
use crate::speech::{expand_title, AzureSpeech, SpeechSynthesizer};
use crate::timeline::{
    compose, split_timeline, Background, BackgroundTrack, BodyAssets, PartRange, TitleAssets,
};
use crate::transcribe::{Transcriber, Transcript, WhisperCommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Limit for reading media headers.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a narration track comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationSource {
    /// An existing audio file.
    Audio(PathBuf),
    /// Text to synthesize.
    Text(String),
}

/// How body captions are timed.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionSource {
    /// Subtitle text with explicit timecodes.
    SubtitleFile(PathBuf),
    /// Word timestamps from the speech recognizer.
    Recognize,
    /// Timings estimated from the body text alone.
    Estimate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    None,
    File(PathBuf),
    /// Capture the post from a web page.
    Screenshot { url: String },
}

/// One video to assemble.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Namespaces the output files (`{id}_part_{n}.mp4`).
    pub id: String,
    pub title: NarrationSource,
    pub body: NarrationSource,
    pub title_caption: Option<String>,
    pub captions: CaptionSource,
    pub image: ImageSource,
    pub background: Background,
    pub music: Option<PathBuf>,
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory receiving the rendered parts.
    pub output_dir: PathBuf,
    /// Show progress bars.
    pub show_progress: bool,
    /// Diagnostic level handed to each render call.
    pub render_verbosity: Verbosity,
    /// Also write the body captions next to the parts.
    pub write_captions: bool,
    /// Base delay between render retries.
    pub render_retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            show_progress: true,
            render_verbosity: Verbosity::Quiet,
            write_captions: true,
            render_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Statistics from one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Total time taken for the entire pipeline.
    pub total_time: Duration,
    /// Time taken preparing narration, image and durations.
    pub preparation_time: Duration,
    /// Time taken timing the captions.
    pub caption_time: Duration,
    /// Time taken rendering all parts.
    pub render_time: Duration,
    pub caption_units: usize,
    pub parts_rendered: usize,
    pub timeline_duration: Duration,
    /// Duration covered by the rendered parts.
    pub covered_duration: Duration,
    /// Trailing remainder left out for being too short.
    pub dropped: Option<PartRange>,
}

/// Result of the pipeline.
#[derive(Debug)]
pub struct PipelineResult {
    pub job_id: String,
    /// Rendered parts in order.
    pub outputs: Vec<PathBuf>,
    pub captions_path: Option<PathBuf>,
    pub stats: PipelineStats,
}

/// Cleanup guard that removes the job workspace when dropped.
struct TempCleanupGuard {
    temp_dir: Option<TempDir>,
    cancel: Cancellation,
}

impl TempCleanupGuard {
    fn path(&self) -> &Path {
        match &self.temp_dir {
            Some(dir) => dir.path(),
            None => Path::new("."),
        }
    }
}

impl Drop for TempCleanupGuard {
    fn drop(&mut self) {
        if let Some(temp_dir) = self.temp_dir.take() {
            let path = temp_dir.path().to_path_buf();
            if self.cancel.is_cancelled() {
                warn!("Pipeline cancelled, cleaning up temp files: {:?}", path);
            } else {
                debug!("Cleaning up temp directory: {:?}", path);
            }
            // TempDir automatically deletes on drop
        }
    }
}

/// Narration, image and durations resolved for composition.
struct Prepared {
    title: TitleAssets,
    body_audio: PathBuf,
    body_duration: Duration,
    music: Option<Arc<BackgroundTrack>>,
}

/// Assembles jobs using a set of external services.
pub struct Pipeline {
    config: Config,
    options: PipelineConfig,
    speech: Option<Box<dyn SpeechSynthesizer>>,
    transcriber: Box<dyn Transcriber>,
    screenshotter: Box<dyn Screenshotter>,
    renderer: Box<dyn Renderer>,
    cancel: Cancellation,
}

impl Pipeline {
    /// Build a pipeline with the services named in `config`.
    pub fn new(config: Config, options: PipelineConfig) -> Self {
        let speech: Option<Box<dyn SpeechSynthesizer>> =
            match (&config.azure_speech_key, &config.azure_speech_region) {
                (Some(key), Some(region)) => Some(Box::new(
                    AzureSpeech::new(key.clone(), region.clone()).with_voice(config.voice.clone()),
                )),
                _ => None,
            };
        let transcriber = Box::new(WhisperCommand::new(
            config.recognizer.program.clone(),
            config.recognizer.args.clone(),
        ));
        let screenshotter = Box::new(BrowserCommand::new(
            config.browser.program.clone(),
            config.browser.args.clone(),
        ));
        let renderer =
            Box::new(FfmpegRenderer::new(config.encoding.clone()).with_program(config.ffmpeg.clone()));

        Self {
            config,
            options,
            speech,
            transcriber,
            screenshotter,
            renderer,
            cancel: Cancellation::new(),
        }
    }

    pub fn with_speech(mut self, speech: Box<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Box<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn with_screenshotter(mut self, screenshotter: Box<dyn Screenshotter>) -> Self {
        self.screenshotter = screenshotter;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    fn scope(&self, timeout: Duration, verbosity: Verbosity) -> CallScope {
        CallScope::new(timeout)
            .with_verbosity(verbosity)
            .with_cancellation(self.cancel.clone())
    }

    fn spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.options.show_progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }

    /// Assemble `job` and render its parts into the output directory.
    ///
    /// Stages:
    /// 1. Prepare narration, title image and media durations
    /// 2. Time the body captions
    /// 3. Compose the timeline and partition it
    /// 4. Render each part, retrying transient failures
    pub async fn run(&self, job: &JobSpec) -> Result<PipelineResult> {
        let start_time = Instant::now();
        validate_job_id(&job.id)?;
        self.cancel.check("startup")?;

        std::fs::create_dir_all(&self.options.output_dir)?;

        let workspace = TempCleanupGuard {
            temp_dir: Some(
                tempfile::Builder::new()
                    .prefix(&format!("storycut-{}-", job.id))
                    .tempdir()?,
            ),
            cancel: self.cancel.clone(),
        };
        debug!("Using temp directory: {:?}", workspace.path());

        // ═══════════════════════════════════════════════════════════════════
        // Stage 1: Narration, image and durations
        // ═══════════════════════════════════════════════════════════════════
        info!("Stage 1/4: Preparing narration and title assets");
        let prep_start = Instant::now();
        let prepared = self.prepare(job, workspace.path()).await?;
        let preparation_time = prep_start.elapsed();
        self.cancel.check("preparation")?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 2: Captions
        // ═══════════════════════════════════════════════════════════════════
        info!("Stage 2/4: Timing captions");
        let caption_start = Instant::now();
        let captions = self.caption_units(job, &prepared.body_audio).await?;
        let captions_path = if self.options.write_captions {
            let formatter = create_formatter(self.config.timecode_style);
            let path = self
                .options
                .output_dir
                .join(format!("{}_captions.{}", job.id, formatter.extension()));
            write_subtitles(&path, &captions, self.config.timecode_style)?;
            Some(path)
        } else {
            None
        };
        let caption_time = caption_start.elapsed();
        info!(
            "Timed {} captions in {:.2}s",
            captions.len(),
            caption_time.as_secs_f64()
        );
        self.cancel.check("captions")?;

        // ═══════════════════════════════════════════════════════════════════
        // Stage 3: Composition and partitioning
        // ═══════════════════════════════════════════════════════════════════
        info!("Stage 3/4: Composing timeline");
        let caption_units = captions.len();
        let body = BodyAssets {
            audio: prepared.body_audio,
            audio_duration: prepared.body_duration,
            captions,
        };
        let timeline = compose(&job.background, &prepared.title, &body);
        let plan = split_timeline(&timeline, self.config.part_limits()?, prepared.music.as_ref());

        info!(
            "Timeline is {:.1}s, {} parts cover {:.1}s",
            timeline.duration().as_secs_f64(),
            plan.parts.len(),
            plan.covered().as_secs_f64()
        );
        if plan.parts.is_empty() {
            warn!(
                "Timeline ({:.1}s) is shorter than the minimum part length, nothing to render",
                timeline.duration().as_secs_f64()
            );
        }

        // ═══════════════════════════════════════════════════════════════════
        // Stage 4: Rendering
        // ═══════════════════════════════════════════════════════════════════
        info!(
            "Stage 4/4: Rendering {} parts with {}",
            plan.parts.len(),
            self.renderer.name()
        );
        let render_start = Instant::now();

        if !plan.parts.is_empty() {
            let check = self.scope(PROBE_TIMEOUT, Verbosity::Quiet);
            self.renderer.check(&check).await?;
        }

        let progress = if self.options.show_progress && !plan.parts.is_empty() {
            let pb = ProgressBar::new(plan.parts.len() as u64);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} parts {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
            );
            Some(pb)
        } else {
            None
        };

        let render_scope = self.scope(
            self.config.timeouts.render(),
            self.options.render_verbosity,
        );
        let mut outputs = Vec::with_capacity(plan.parts.len());
        for part in &plan.parts {
            self.cancel.check("rendering")?;

            let output = self.options.output_dir.join(part.file_name(&job.id));
            let render_job = RenderJob::from_part(part, output.clone());
            if let Some(pb) = &progress {
                pb.set_message(format!("part {}", part.index));
            }

            let operation = format!("render part {}", part.index);
            retry_with_backoff(
                &operation,
                self.config.render_retries,
                self.options.render_retry_delay,
                |_| self.renderer.render(&render_job, &render_scope),
            )
            .await?;

            info!(
                "Rendered part {} ({:.1}s to {:.1}s) to {}",
                part.index,
                part.start_offset().as_secs_f64(),
                part.end_offset().as_secs_f64(),
                output.display()
            );
            outputs.push(output);
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message(format!("✓ Rendered {} parts", outputs.len()));
        }
        let render_time = render_start.elapsed();

        let stats = PipelineStats {
            total_time: start_time.elapsed(),
            preparation_time,
            caption_time,
            render_time,
            caption_units,
            parts_rendered: outputs.len(),
            timeline_duration: plan.timeline_duration,
            covered_duration: plan.covered(),
            dropped: plan.dropped,
        };

        Ok(PipelineResult {
            job_id: job.id.clone(),
            outputs,
            captions_path,
            stats,
        })
    }

    async fn prepare(&self, job: &JobSpec, workspace: &Path) -> Result<Prepared> {
        let spinner = self.spinner("Preparing narration...");

        let title_audio = self.narration(&job.title, workspace, "title").await?;
        let body_audio = self.narration(&job.body, workspace, "body").await?;

        let image = match &job.image {
            ImageSource::None => None,
            ImageSource::File(path) => {
                require_file(path)?;
                Some(path.clone())
            }
            ImageSource::Screenshot { url } => {
                if let Some(pb) = &spinner {
                    pb.set_message("Capturing screenshot...");
                }
                let output = workspace.join("title.png");
                let scope = self.scope(self.config.timeouts.screenshot(), Verbosity::Quiet);
                self.screenshotter
                    .capture(url, &self.config.screenshot_selector, &output, &scope)
                    .await?;
                Some(output)
            }
        };

        require_file(&job.background.video)?;

        if let Some(pb) = &spinner {
            pb.set_message("Reading durations...");
        }
        let probe = self.scope(PROBE_TIMEOUT, Verbosity::Quiet);
        let needs_ffprobe = [Some(&title_audio), Some(&body_audio), job.music.as_ref()]
            .into_iter()
            .flatten()
            .any(|path| !is_wav(path));
        if needs_ffprobe {
            check_ffprobe(&probe).await?;
        }
        let title_duration = media_duration(&title_audio, &probe).await?;
        let body_duration = media_duration(&body_audio, &probe).await?;
        let music = match &job.music {
            Some(path) => Some(Arc::new(BackgroundTrack {
                path: path.clone(),
                duration: media_duration(path, &probe).await?,
                volume: self.config.music_volume,
            })),
            None => None,
        };

        if let Some(pb) = spinner {
            pb.finish_with_message(format!(
                "✓ Narration ready ({:.1}s title, {:.1}s body)",
                title_duration.as_secs_f64(),
                body_duration.as_secs_f64()
            ));
        }

        Ok(Prepared {
            title: TitleAssets {
                audio: title_audio,
                audio_duration: title_duration,
                image,
                caption: job.title_caption.clone(),
            },
            body_audio,
            body_duration,
            music,
        })
    }

    /// Resolve a narration source to an audio file, synthesizing text into
    /// `{workspace}/{name}.{ext}` when needed.
    async fn narration(
        &self,
        source: &NarrationSource,
        workspace: &Path,
        name: &str,
    ) -> Result<PathBuf> {
        match source {
            NarrationSource::Audio(path) => {
                require_file(path)?;
                Ok(path.clone())
            }
            NarrationSource::Text(text) => {
                let speech = self.speech.as_ref().ok_or_else(|| {
                    StorycutError::InvalidConfig(
                        "Narration text given but no speech synthesizer is configured. Set AZURE_SPEECH_KEY and AZURE_SPEECH_REGION."
                            .to_string(),
                    )
                })?;
                let text = if name == "title" {
                    expand_title(text)
                } else {
                    text.clone()
                };
                let output = workspace.join(format!("{name}.{}", speech.extension()));
                let scope = self.scope(self.config.timeouts.speech(), Verbosity::Quiet);
                speech.synthesize(&text, &output, &scope).await?;
                Ok(output)
            }
        }
    }

    async fn caption_units(&self, job: &JobSpec, body_audio: &Path) -> Result<Vec<CaptionUnit>> {
        let transcript: Transcript = match &job.captions {
            CaptionSource::SubtitleFile(path) => {
                require_file(path)?;
                parse_subtitles(&std::fs::read_to_string(path)?)?
            }
            CaptionSource::Recognize => {
                let spinner = self.spinner(&format!("Transcribing with {}...", self.transcriber.name()));
                let scope = self.scope(self.config.timeouts.transcription(), Verbosity::Quiet);
                let transcript = self.transcriber.transcribe(body_audio, &scope).await?;
                if let Some(pb) = spinner {
                    pb.finish_with_message(format!(
                        "✓ Transcribed {} segments",
                        transcript.segments().len()
                    ));
                }
                transcript
            }
            CaptionSource::Estimate => match &job.body {
                NarrationSource::Text(text) => estimate_transcript(text, &EstimateConfig::default())?,
                NarrationSource::Audio(_) => {
                    return Err(StorycutError::InvalidConfig(
                        "Estimated captions need the body text, but the body was given as audio"
                            .to_string(),
                    ))
                }
            },
        };

        let segmenter = Segmenter::new(self.config.max_words_per_caption)?;
        Ok(segmenter.segment(&transcript).collect())
    }
}

/// Job ids become file name prefixes, so they may not contain path parts.
pub fn validate_job_id(id: &str) -> Result<()> {
    if id.trim().is_empty() || id == "." || id == ".." || id.contains(&['/', '\\'][..]) {
        return Err(StorycutError::MalformedInput(format!(
            "Invalid job id '{id}': use a plain name without path separators"
        )));
    }
    Ok(())
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    let stats = &result.stats;
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Video Assembly Complete                   ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Job:        {}", style(&result.job_id).bold());
    for output in &result.outputs {
        println!("  Part:       {}", style(output.display()).green());
    }
    if let Some(path) = &result.captions_path {
        println!("  Captions:   {} ({} units)", path.display(), stats.caption_units);
    }
    println!(
        "  Coverage:   {:.1}s of {:.1}s",
        stats.covered_duration.as_secs_f64(),
        stats.timeline_duration.as_secs_f64()
    );
    if let Some(dropped) = stats.dropped {
        println!(
            "  {}",
            style(format!(
                "Dropped:    {:.1}s to {:.1}s (shorter than the minimum part)",
                dropped.start.as_secs_f64(),
                dropped.end.as_secs_f64()
            ))
            .yellow()
        );
    }
    println!();
    println!("  Timing:");
    println!(
        "    Prepare:     {:.2}s",
        stats.preparation_time.as_secs_f64()
    );
    println!("    Captions:    {:.2}s", stats.caption_time.as_secs_f64());
    println!(
        "    Render:      {:.2}s ({} parts)",
        stats.render_time.as_secs_f64(),
        stats.parts_rendered
    );
    println!("    Total:       {:.2}s", stats.total_time.as_secs_f64());
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.render_verbosity, Verbosity::Quiet);
        assert!(config.show_progress);
        assert!(config.write_captions);
    }

    #[test]
    fn test_validate_job_id() {
        assert!(validate_job_id("post_42").is_ok());
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id("..").is_err());
        assert!(validate_job_id("a/b").is_err());
        assert!(validate_job_id(r"a\b").is_err());
    }

    #[test]
    fn test_pipeline_without_speech_credentials() {
        let pipeline = Pipeline::new(Config::default(), PipelineConfig::default());
        assert!(pipeline.speech.is_none());
        assert_eq!(pipeline.renderer.name(), "FFmpeg");
        assert_eq!(pipeline.transcriber.name(), "Whisper");
    }
}
