//! Render adapter: turns a layer list into one ffmpeg invocation.
//!
//! Visual layers are stacked onto a solid base in list order, each enabled
//! only inside its window. Captions are drawn with `drawtext`, reading their
//! text from files so no caption ever needs filter-graph escaping. Audible
//! layers are delayed to their start, scaled by their volume and mixed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::command::{self, CallScope, Verbosity};
use crate::error::{Result, StorycutError};
use crate::media::probe::{check_ffmpeg, require_file};
use crate::timeline::{Layer, LayerSource, Position, TimelinePart};
use crate::timing::as_arg;

/// Output encoding settings, the `[encoding]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingParams {
    pub video_codec: String,
    pub audio_codec: String,
    pub threads: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Font file for captions; ffmpeg's default font when unset.
    pub font: Option<PathBuf>,
    pub font_size: u32,
    pub font_color: String,
}

impl Default for EncodingParams {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            threads: 4,
            width: 1080,
            height: 1920,
            fps: 30,
            font: None,
            font_size: 72,
            font_color: "white".to_string(),
        }
    }
}

/// Everything needed to render one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub layers: Vec<Layer>,
    pub duration: Duration,
    pub output: PathBuf,
}

impl RenderJob {
    pub fn from_part(part: &TimelinePart, output: PathBuf) -> Self {
        Self {
            layers: part.render_layers(),
            duration: part.duration(),
            output,
        }
    }

    /// Media files the job reads.
    pub fn inputs(&self) -> impl Iterator<Item = &Path> {
        self.layers.iter().filter_map(|layer| match &layer.source {
            LayerSource::Video { path, .. }
            | LayerSource::Image { path }
            | LayerSource::Audio { path, .. } => Some(path.as_path()),
            LayerSource::Caption { .. } => None,
        })
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &RenderJob, scope: &CallScope) -> Result<()>;

    /// Fail early when the engine cannot run at all.
    async fn check(&self, _scope: &CallScope) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

pub struct FfmpegRenderer {
    program: String,
    encoding: EncodingParams,
}

impl FfmpegRenderer {
    pub fn new(encoding: EncodingParams) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            encoding,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Path of the text file backing the caption at `layer_index`.
    fn caption_file(caption_dir: &Path, layer_index: usize) -> PathBuf {
        caption_dir.join(format!("caption_{layer_index}.txt"))
    }

    fn write_caption_files(job: &RenderJob, caption_dir: &Path) -> Result<()> {
        for (i, layer) in job.layers.iter().enumerate() {
            if let LayerSource::Caption { text } = &layer.source {
                std::fs::write(Self::caption_file(caption_dir, i), text)?;
            }
        }
        Ok(())
    }

    /// Full argument list for rendering `job`. Caption text is expected in
    /// `caption_dir`, one file per caption layer.
    pub fn build_args(&self, job: &RenderJob, caption_dir: &Path, verbosity: Verbosity) -> Vec<String> {
        let enc = &self.encoding;
        let total = as_arg(job.duration);

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            verbosity.ffmpeg_log_level().into(),
            "-y".into(),
        ];

        // Input index for each layer that reads a file
        let mut input_of: Vec<Option<usize>> = Vec::with_capacity(job.layers.len());
        let mut next_input = 0;
        for layer in &job.layers {
            let length = as_arg(layer.duration);
            let index = match &layer.source {
                LayerSource::Video {
                    path,
                    in_point,
                    looped,
                } => {
                    if *looped {
                        args.extend(["-stream_loop".into(), "-1".into()]);
                    } else {
                        args.extend(["-ss".into(), as_arg(*in_point), "-t".into(), length]);
                    }
                    args.extend(["-i".into(), path.display().to_string()]);
                    Some(next_input)
                }
                LayerSource::Image { path } => {
                    args.extend(["-loop".into(), "1".into(), "-t".into(), length]);
                    args.extend(["-i".into(), path.display().to_string()]);
                    Some(next_input)
                }
                LayerSource::Audio { path, in_point } => {
                    args.extend(["-ss".into(), as_arg(*in_point), "-t".into(), length]);
                    args.extend(["-i".into(), path.display().to_string()]);
                    Some(next_input)
                }
                LayerSource::Caption { .. } => None,
            };
            if index.is_some() {
                next_input += 1;
            }
            input_of.push(index);
        }

        let mut filters = vec![format!(
            "color=c=black:s={}x{}:r={}:d={}[base]",
            enc.width, enc.height, enc.fps, total
        )];

        // Video chain
        let mut current = "base".to_string();
        for (i, layer) in job.layers.iter().enumerate() {
            if !layer.is_visual() {
                continue;
            }
            let enable = format!(
                "enable='between(t,{},{})'",
                as_arg(layer.start),
                as_arg(layer.end())
            );
            let label = format!("v{i}");

            match (&layer.source, input_of[i]) {
                (LayerSource::Caption { .. }, _) => {
                    let (x, y) = text_position(layer.position);
                    let font = enc
                        .font
                        .as_ref()
                        .map(|f| format!("fontfile='{}':", quote(&f.display().to_string())))
                        .unwrap_or_default();
                    filters.push(format!(
                        "[{current}]drawtext={font}textfile='{}':expansion=none:fontsize={}:fontcolor={}:borderw=4:bordercolor=black:x={x}:y={y}:{enable}[{label}]",
                        quote(&Self::caption_file(caption_dir, i).display().to_string()),
                        enc.font_size,
                        enc.font_color,
                    ));
                }
                (source, Some(input)) => {
                    let trim = match source {
                        LayerSource::Video {
                            in_point,
                            looped: true,
                            ..
                        } => format!(
                            "trim=start={}:duration={},",
                            as_arg(*in_point),
                            as_arg(layer.duration)
                        ),
                        _ => String::new(),
                    };
                    let scale = match layer.position {
                        Position::Fill => format!(
                            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},",
                            w = enc.width,
                            h = enc.height
                        ),
                        _ => match source {
                            LayerSource::Image { .. } => format!("scale={}:-2,", enc.width * 9 / 10),
                            _ => String::new(),
                        },
                    };
                    filters.push(format!(
                        "[{input}:v]{trim}{scale}setpts=PTS-STARTPTS+{}/TB[src{i}]",
                        as_arg(layer.start)
                    ));
                    let (x, y) = overlay_position(layer.position);
                    filters.push(format!(
                        "[{current}][src{i}]overlay=x={x}:y={y}:eof_action=pass:{enable}[{label}]"
                    ));
                }
                (_, None) => continue,
            }
            current = label;
        }
        filters.push(format!("[{current}]format=yuv420p[vout]"));

        // Audio chain
        let mut mixed = Vec::new();
        for (i, layer) in job.layers.iter().enumerate() {
            let Some(input) = input_of[i].filter(|_| layer.is_audible()) else {
                continue;
            };
            let trim = match &layer.source {
                LayerSource::Video {
                    in_point,
                    looped: true,
                    ..
                } => format!(
                    "atrim=start={}:duration={},asetpts=PTS-STARTPTS,",
                    as_arg(*in_point),
                    as_arg(layer.duration)
                ),
                _ => String::new(),
            };
            filters.push(format!(
                "[{input}:a]{trim}volume={},adelay={}:all=1[a{i}]",
                layer.volume,
                layer.start.as_millis()
            ));
            mixed.push(format!("[a{i}]"));
        }
        if mixed.is_empty() {
            filters.push(format!(
                "anullsrc=r=44100:cl=stereo,atrim=duration={total}[aout]"
            ));
        } else {
            filters.push(format!(
                "{}amix=inputs={}:duration=longest:normalize=0,apad,atrim=duration={total}[aout]",
                mixed.concat(),
                mixed.len()
            ));
        }

        args.extend(["-filter_complex".into(), filters.join(";")]);
        args.extend([
            "-map".into(),
            "[vout]".into(),
            "-map".into(),
            "[aout]".into(),
            "-c:v".into(),
            enc.video_codec.clone(),
            "-c:a".into(),
            enc.audio_codec.clone(),
            "-threads".into(),
            enc.threads.to_string(),
            "-r".into(),
            enc.fps.to_string(),
            "-t".into(),
            total,
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "+faststart".into(),
            job.output.display().to_string(),
        ]);
        args
    }
}

/// Escape a value for use inside single quotes in a filter graph.
fn quote(value: &str) -> String {
    value.replace('\'', r"'\''")
}

fn overlay_position(position: Position) -> (String, String) {
    match position {
        Position::Fill => ("0".into(), "0".into()),
        Position::Center => ("(W-w)/2".into(), "(H-h)/2".into()),
        Position::Row(row) => ("(W-w)/2".into(), format!("H*{row}-h/2")),
        Position::At { x, y } => (x.to_string(), y.to_string()),
    }
}

fn text_position(position: Position) -> (String, String) {
    match position {
        Position::Fill | Position::Center => ("(w-text_w)/2".into(), "(h-text_h)/2".into()),
        Position::Row(row) => ("(w-text_w)/2".into(), format!("h*{row}-text_h/2")),
        Position::At { x, y } => (x.to_string(), y.to_string()),
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, job: &RenderJob, scope: &CallScope) -> Result<()> {
        if job.duration.is_zero() {
            return Err(StorycutError::RenderFailure(format!(
                "{} has zero duration",
                job.output.display()
            )));
        }
        for input in job.inputs() {
            require_file(input)?;
        }

        // Removed when the render finishes, whatever the outcome
        let caption_dir = tempfile::Builder::new().prefix("storycut-captions").tempdir()?;
        Self::write_caption_files(job, caption_dir.path())?;

        let args = self.build_args(job, caption_dir.path(), scope.verbosity);
        info!(
            "Rendering {} ({:.1}s, {} layers)",
            job.output.display(),
            job.duration.as_secs_f64(),
            job.layers.len()
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        let output = command::run(cmd, "render", scope).await?;

        if !output.status.success() {
            let detail = match scope.verbosity {
                Verbosity::Quiet => command::tail(&output.stderr, 10),
                _ => "see the render output above".to_string(),
            };
            return Err(StorycutError::RenderFailure(format!(
                "{} exited with {}: {}",
                self.program, output.status, detail
            )));
        }

        if !job.output.exists() {
            return Err(StorycutError::RenderFailure(format!(
                "Output file was not created: {}",
                job.output.display()
            )));
        }

        debug!("Rendered {}", job.output.display());
        Ok(())
    }

    async fn check(&self, scope: &CallScope) -> Result<()> {
        check_ffmpeg(&self.program, scope).await
    }

    fn name(&self) -> &'static str {
        "FFmpeg"
    }
}
