use std::path::Path;
use std::time::Duration;

use hound::WavReader;
use tokio::process::Command;
use tracing::debug;

use crate::command::{self, CallScope};
use crate::error::{Result, StorycutError};
use crate::timing::seconds;

/// Fail with [`StorycutError::MissingResource`] unless `path` is a file.
pub fn require_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(StorycutError::MissingResource(path.display().to_string()));
    }
    Ok(())
}

async fn check_tool(program: &str, scope: &CallScope) -> Result<()> {
    let mut cmd = Command::new(program);
    cmd.arg("-version");
    let output = command::run(cmd, program, scope).await?;

    if !output.status.success() {
        return Err(StorycutError::MissingResource(format!(
            "{program} check failed: {}",
            command::tail(&output.stderr, 3)
        )));
    }

    debug!("{} is available", program);
    Ok(())
}

/// Check that the render engine binary can be run.
pub async fn check_ffmpeg(program: &str, scope: &CallScope) -> Result<()> {
    check_tool(program, scope).await
}

/// Check that FFprobe is installed and accessible.
pub async fn check_ffprobe(scope: &CallScope) -> Result<()> {
    check_tool("ffprobe", scope).await
}

/// Length of a WAV file, read from its header.
pub fn wav_duration(path: &Path) -> Result<Duration> {
    let reader = WavReader::open(path).map_err(|e| {
        StorycutError::MalformedInput(format!("Failed to read WAV file {}: {e}", path.display()))
    })?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(StorycutError::MalformedInput(format!(
            "{} has a zero sample rate",
            path.display()
        )));
    }

    // duration() counts samples per channel
    seconds(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Whether the duration of `path` can be read without FFprobe.
pub fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

/// Length of any media file: WAV headers are read directly, everything
/// else goes through FFprobe.
pub async fn media_duration(path: &Path, scope: &CallScope) -> Result<Duration> {
    require_file(path)?;

    if is_wav(path) {
        return wav_duration(path);
    }

    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(path);

    let output = command::run(cmd, "ffprobe", scope).await?;
    if !output.status.success() {
        return Err(StorycutError::MalformedInput(format!(
            "FFprobe could not read {}: {}",
            path.display(),
            command::tail(&output.stderr, 3)
        )));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    let duration_secs: f64 = duration_str.trim().parse().map_err(|e| {
        StorycutError::MalformedInput(format!(
            "Failed to parse duration '{}': {e}",
            duration_str.trim()
        ))
    })?;

    let duration = seconds(duration_secs)?;
    debug!("{}: {:.3}s", path.display(), duration.as_secs_f64());
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Verbosity;

    fn write_wav(path: &Path, sample_rate: u32, samples: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..samples {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn scope() -> CallScope {
        CallScope::new(Duration::from_secs(10)).with_verbosity(Verbosity::Quiet)
    }

    #[test]
    fn test_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        write_wav(&path, 16000, 24000);
        assert_eq!(wav_duration(&path).unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_wav_duration_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"not a wav").unwrap();
        assert!(matches!(
            wav_duration(&path),
            Err(StorycutError::MalformedInput(_))
        ));
    }

    #[tokio::test]
    async fn test_media_duration_uses_wav_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("title.WAV");
        write_wav(&path, 8000, 16000);
        let duration = media_duration(&path, &scope()).await.unwrap();
        assert_eq!(duration, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_media_duration_missing_file() {
        let result = media_duration(Path::new("/nonexistent/clip.mp4"), &scope()).await;
        match result {
            Err(StorycutError::MissingResource(path)) => assert!(path.contains("nonexistent")),
            other => panic!("Expected MissingResource, got {other:?}"),
        }
    }

    #[test]
    fn test_is_wav() {
        assert!(is_wav(Path::new("narration.wav")));
        assert!(is_wav(Path::new("NARRATION.WAV")));
        assert!(!is_wav(Path::new("narration.mp3")));
        assert!(!is_wav(Path::new("wav")));
    }

    #[tokio::test]
    async fn test_check_missing_tool() {
        let result = check_ffmpeg("storycut-no-such-ffmpeg", &scope()).await;
        assert!(matches!(result, Err(StorycutError::MissingResource(_))));
    }
}
