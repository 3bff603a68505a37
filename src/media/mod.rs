//! Media files: probing durations and rendering timelines with ffmpeg.

pub mod probe;
pub mod render;

pub use probe::{check_ffmpeg, check_ffprobe, is_wav, media_duration, require_file, wav_duration};
pub use render::{EncodingParams, FfmpegRenderer, RenderJob, Renderer};
