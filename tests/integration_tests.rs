//! Integration tests for storycut
//!
//! These tests exercise the caption and timeline engine end to end and run
//! the full pipeline against mock services, without ffmpeg or API keys.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storycut::caption::{
    create_formatter, parse_subtitles, CaptionUnit, Segmenter, TimecodeStyle,
};
use storycut::command::{CallScope, Cancellation};
use storycut::config::Config;
use storycut::error::{Result, StorycutError};
use storycut::media::{RenderJob, Renderer};
use storycut::pipeline::{
    CaptionSource, ImageSource, JobSpec, NarrationSource, Pipeline, PipelineConfig,
};
use storycut::speech::SpeechSynthesizer;
use storycut::timeline::{partition, LayerSource, Background};
use storycut::transcribe::parse_recognizer_output;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

fn write_wav(path: &Path, millis: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..(8 * millis) {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

// ============================================================================
// Caption Engine Tests
// ============================================================================

mod caption_tests {
    use super::*;

    const RECOGNIZER_JSON: &str = r#"[
        {"start": 0.0, "end": 1.3, "text": "hello world there friend.", "words": [
            {"word": "hello", "start": 0.0, "end": 0.2},
            {"word": "world", "start": 0.2, "end": 0.5},
            {"word": "there", "start": 0.5, "end": 0.9},
            {"word": "friend.", "start": 0.9, "end": 1.3}
        ]},
        {"start": 1.5, "end": 2.4, "text": "Really, truly sorry!", "words": [
            {"word": " Really,", "start": 1.5, "end": 1.8},
            {"word": " truly", "start": 1.8, "end": 2.0},
            {"word": " sorry!", "start": 2.0, "end": 2.4}
        ]}
    ]"#;

    fn units(json: &str, max_words: usize) -> Vec<(u64, u64, String)> {
        let transcript = parse_recognizer_output(json).unwrap();
        Segmenter::new(max_words)
            .unwrap()
            .segment(&transcript)
            .map(|u| {
                (
                    u.start().as_millis() as u64,
                    u.end().as_millis() as u64,
                    u.text().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_subtitle_block_example() {
        let transcript = parse_subtitles("1\n00,000 --> 00,400\nhello world\n\n").unwrap();
        let units: Vec<CaptionUnit> = Segmenter::new(3).unwrap().segment(&transcript).collect();
        assert_eq!(
            units,
            vec![CaptionUnit::new(ms(0), ms(400), "hello world").unwrap()]
        );
    }

    #[test]
    fn test_recognizer_words_with_limit_two() {
        assert_eq!(
            units(RECOGNIZER_JSON, 2),
            vec![
                (0, 500, "hello world".to_string()),
                (500, 1300, "there friend".to_string()),
                (1500, 1800, "Really".to_string()),
                (1800, 2400, "truly sorry".to_string()),
            ]
        );
    }

    #[test]
    fn test_recognizer_words_with_limit_three() {
        assert_eq!(
            units(RECOGNIZER_JSON, 3),
            vec![
                (0, 900, "hello world there".to_string()),
                (900, 1300, "friend".to_string()),
                (1500, 1800, "Really".to_string()),
                (1800, 2400, "truly sorry".to_string()),
            ]
        );
    }

    #[test]
    fn test_unit_invariants() {
        for max_words in 1..=5 {
            let transcript = parse_recognizer_output(RECOGNIZER_JSON).unwrap();
            for unit in Segmenter::new(max_words).unwrap().segment(&transcript) {
                assert!(unit.end() >= unit.start());
                assert!(unit.word_count() >= 1 && unit.word_count() <= max_words);
                assert!(!unit.text().ends_with(&['.', ',', '!', '?'][..]));
                assert_eq!(unit.text(), unit.text().trim());
            }
        }
    }

    #[test]
    fn test_segmenting_is_restartable() {
        let transcript = parse_recognizer_output(RECOGNIZER_JSON).unwrap();
        let segmenter = Segmenter::new(2).unwrap();
        let first: Vec<_> = segmenter.segment(&transcript).collect();
        let second: Vec<_> = segmenter.segment(&transcript).collect();
        assert_eq!(first, second);

        // taking a prefix and starting over gives the same prefix
        let prefix: Vec<_> = segmenter.segment(&transcript).take(2).collect();
        assert_eq!(prefix, first[..2]);
    }

    #[test]
    fn test_zero_word_limit_rejected() {
        assert!(matches!(
            Segmenter::new(0),
            Err(StorycutError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_recognizer_error_payload() {
        let result = parse_recognizer_output(r#"{"error": "model not loaded"}"#);
        match result {
            Err(StorycutError::Transcription(msg)) => assert!(msg.contains("model not loaded")),
            other => panic!("Expected transcription error, got {other:?}"),
        }
    }

    #[test]
    fn test_written_captions_parse_back() {
        let transcript = parse_recognizer_output(RECOGNIZER_JSON).unwrap();
        let segmenter = Segmenter::new(2).unwrap();
        let original: Vec<_> = segmenter.segment(&transcript).collect();

        let text = create_formatter(TimecodeStyle::Short).format(&original);
        let reparsed = parse_subtitles(&text).unwrap();
        let again: Vec<_> = segmenter.segment(&reparsed).collect();
        assert_eq!(again, original);
    }
}

// ============================================================================
// Partition Tests
// ============================================================================

mod partition_tests {
    use super::*;

    fn ranges(total: u64, max: u64, min: u64) -> Vec<(u64, u64)> {
        partition(secs(total), secs(max), secs(min))
            .unwrap()
            .iter()
            .map(|p| (p.start.as_secs(), p.end.as_secs()))
            .collect()
    }

    #[test]
    fn test_partition_examples() {
        assert_eq!(ranges(200, 90, 30), vec![(0, 90), (90, 180)]);
        assert_eq!(ranges(95, 90, 30), vec![(0, 90)]);
    }

    #[test]
    fn test_coverage_equality_without_drop() {
        let parts = partition(secs(150), secs(90), secs(30)).unwrap();
        let covered: Duration = parts.iter().map(|p| p.duration()).sum();
        assert_eq!(covered, secs(150));
    }

    #[test]
    fn test_max_below_min_rejected() {
        assert!(matches!(
            partition(secs(100), secs(20), secs(30)),
            Err(StorycutError::InvalidConfig(_))
        ));
    }
}

// ============================================================================
// Pipeline Tests (mock services)
// ============================================================================

mod pipeline_tests {
    use super::*;

    /// Records every job and writes a placeholder output file. The first
    /// `failures` calls fail with a transient error.
    #[derive(Default)]
    struct RecordingRenderer {
        jobs: Arc<Mutex<Vec<RenderJob>>>,
        failures: AtomicU32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Renderer for RecordingRenderer {
        async fn render(&self, job: &RenderJob, _scope: &CallScope) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StorycutError::RenderFailure("encoder crashed".to_string()));
            }
            std::fs::write(&job.output, b"mp4")?;
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Recording"
        }
    }

    /// Writes silent WAV narration, 100ms per word.
    struct SilentSpeech {
        texts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for SilentSpeech {
        async fn synthesize(&self, text: &str, output: &Path, _scope: &CallScope) -> Result<()> {
            self.texts.lock().unwrap().push(text.to_string());
            write_wav(output, 100 * text.split_whitespace().count() as u32);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Silent"
        }

        fn extension(&self) -> &'static str {
            "wav"
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        out: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("out");
            write_wav(&dir.path().join("title.wav"), 2000);
            write_wav(&dir.path().join("body.wav"), 10000);
            write_wav(&dir.path().join("music.wav"), 3000);
            std::fs::write(dir.path().join("bg.mp4"), b"footage").unwrap();
            std::fs::write(dir.path().join("post.png"), b"png").unwrap();
            std::fs::write(
                dir.path().join("subs.txt"),
                "1\n00,000 --> 01,500\nI never thought\n\n\
                 2\n01,500 --> 04,000\nthis would happen.\n\n\
                 3\n06,000 --> 09,000\nBut here we are!\n\n",
            )
            .unwrap();
            Self { dir, out }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn job(&self) -> JobSpec {
            JobSpec {
                id: "story1".to_string(),
                title: NarrationSource::Audio(self.path("title.wav")),
                body: NarrationSource::Audio(self.path("body.wav")),
                title_caption: None,
                captions: CaptionSource::SubtitleFile(self.path("subs.txt")),
                image: ImageSource::File(self.path("post.png")),
                background: Background {
                    video: self.path("bg.mp4"),
                    in_point: secs(5),
                    looped: true,
                    volume: 0.0,
                },
                music: Some(self.path("music.wav")),
            }
        }

        fn options(&self) -> PipelineConfig {
            PipelineConfig {
                output_dir: self.out.clone(),
                show_progress: false,
                render_retry_delay: Duration::from_millis(1),
                ..PipelineConfig::default()
            }
        }

        fn config(&self) -> Config {
            Config {
                max_part_secs: 5.0,
                min_part_secs: 3.0,
                ..Config::default()
            }
        }
    }

    #[tokio::test]
    async fn test_full_run_partitions_and_renders() {
        let fixture = Fixture::new();
        let renderer = RecordingRenderer::default();
        let jobs = renderer.jobs.clone();

        let pipeline = Pipeline::new(fixture.config(), fixture.options())
            .with_renderer(Box::new(renderer));
        let result = pipeline.run(&fixture.job()).await.unwrap();

        // 12s timeline: (0,5), (5,10), remainder of 2s dropped
        assert_eq!(result.stats.timeline_duration, secs(12));
        assert_eq!(result.stats.covered_duration, secs(10));
        assert_eq!(result.stats.parts_rendered, 2);
        assert_eq!(result.stats.caption_units, 3);
        let dropped = result.stats.dropped.unwrap();
        assert_eq!((dropped.start, dropped.end), (secs(10), secs(12)));

        assert_eq!(
            result.outputs,
            vec![
                fixture.out.join("story1_part_1.mp4"),
                fixture.out.join("story1_part_2.mp4"),
            ]
        );
        assert!(result.outputs.iter().all(|p| p.is_file()));

        let captions = std::fs::read_to_string(result.captions_path.unwrap()).unwrap();
        assert!(captions.contains("1\n00,000 --> 01,500\nI never thought"));
        assert!(captions.contains("this would happen\n"));

        let jobs = jobs.lock().unwrap();
        assert_eq!(jobs.len(), 2);
        for job in jobs.iter() {
            assert_eq!(job.duration, secs(5));
            // music restarts under every part
            let music = job.layers.last().unwrap();
            match &music.source {
                LayerSource::Audio { path, in_point } => {
                    assert!(path.ends_with("music.wav"));
                    assert_eq!(*in_point, Duration::ZERO);
                }
                other => panic!("Unexpected source {other:?}"),
            }
            assert_eq!(music.duration, secs(3));
        }

        // the second part starts 3s into the body narration
        let body_audio = jobs[1]
            .layers
            .iter()
            .find_map(|l| match &l.source {
                LayerSource::Audio { path, in_point } if path.ends_with("body.wav") => {
                    Some(*in_point)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(body_audio, secs(3));

        // body captions shifted past the 2s title
        let caption_windows: Vec<_> = jobs[0]
            .layers
            .iter()
            .filter(|l| matches!(l.source, LayerSource::Caption { .. }))
            .map(|l| (l.start, l.end()))
            .collect();
        assert_eq!(
            caption_windows,
            vec![(secs(2), ms(3500)), (ms(3500), secs(5))]
        );
    }

    #[tokio::test]
    async fn test_render_retries_transient_failures() {
        let fixture = Fixture::new();
        let renderer = RecordingRenderer {
            failures: AtomicU32::new(2),
            ..RecordingRenderer::default()
        };
        let calls = renderer.calls.clone();

        let pipeline = Pipeline::new(fixture.config(), fixture.options())
            .with_renderer(Box::new(renderer));
        let result = pipeline.run(&fixture.job()).await.unwrap();

        assert_eq!(result.outputs.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_render_gives_up_after_retries() {
        let fixture = Fixture::new();
        let renderer = RecordingRenderer {
            failures: AtomicU32::new(100),
            ..RecordingRenderer::default()
        };
        let calls = renderer.calls.clone();

        let pipeline = Pipeline::new(fixture.config(), fixture.options())
            .with_renderer(Box::new(renderer));
        let result = pipeline.run(&fixture.job()).await;

        assert!(matches!(result, Err(StorycutError::RenderFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_synthesized_narration_with_estimated_captions() {
        let fixture = Fixture::new();
        let texts = Arc::new(Mutex::new(Vec::new()));
        let renderer = RecordingRenderer::default();
        let jobs = renderer.jobs.clone();

        let mut job = fixture.job();
        job.title = NarrationSource::Text("AITA for this".to_string());
        job.body = NarrationSource::Text(
            "It started on a quiet Monday. Nobody expected what came next, least of all me."
                .to_string(),
        );
        job.captions = CaptionSource::Estimate;
        job.music = None;

        let config = Config {
            max_part_secs: 1.0,
            min_part_secs: 0.5,
            ..Config::default()
        };
        let pipeline = Pipeline::new(config, fixture.options())
            .with_speech(Box::new(SilentSpeech {
                texts: texts.clone(),
            }))
            .with_renderer(Box::new(renderer));
        let result = pipeline.run(&job).await.unwrap();

        let texts = texts.lock().unwrap();
        assert_eq!(texts[0], "Am I the asshole for this");

        // 0.6s title + 1.5s body, cut into (0,1), (1,2); 0.1s remainder dropped
        assert_eq!(result.stats.timeline_duration, ms(2100));
        assert_eq!(result.outputs.len(), 2);
        assert!(result.stats.caption_units > 0);
        assert!(jobs.lock().unwrap().iter().all(|j| j
            .layers
            .iter()
            .all(|l| !matches!(&l.source, LayerSource::Audio { path, .. } if path.ends_with("music.wav")))));
    }

    #[tokio::test]
    async fn test_text_narration_needs_synthesizer() {
        let fixture = Fixture::new();
        let mut job = fixture.job();
        job.body = NarrationSource::Text("Some body text".to_string());

        let pipeline = Pipeline::new(fixture.config(), fixture.options())
            .with_renderer(Box::new(RecordingRenderer::default()));
        let result = pipeline.run(&job).await;
        assert!(matches!(result, Err(StorycutError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_missing_background_is_missing_resource() {
        let fixture = Fixture::new();
        let mut job = fixture.job();
        job.background.video = fixture.path("nope.mp4");

        let pipeline = Pipeline::new(fixture.config(), fixture.options())
            .with_renderer(Box::new(RecordingRenderer::default()));
        let result = pipeline.run(&job).await;
        assert!(matches!(result, Err(StorycutError::MissingResource(_))));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_fails_before_rendering() {
        let fixture = Fixture::new();
        let config = Config {
            ffmpeg: "storycut-no-such-ffmpeg".to_string(),
            ..fixture.config()
        };

        let pipeline = Pipeline::new(config, fixture.options());
        let result = pipeline.run(&fixture.job()).await;

        match result {
            Err(StorycutError::MissingResource(msg)) => {
                assert!(msg.contains("storycut-no-such-ffmpeg"))
            }
            other => panic!("Expected MissingResource, got {other:?}"),
        }
        assert!(!fixture.out.join("story1_part_1.mp4").exists());
    }

    #[tokio::test]
    async fn test_malformed_subtitles_abort_job() {
        let fixture = Fixture::new();
        std::fs::write(fixture.path("subs.txt"), "1\nno timecode here\n").unwrap();
        let renderer = RecordingRenderer::default();
        let calls = renderer.calls.clone();

        let pipeline = Pipeline::new(fixture.config(), fixture.options())
            .with_renderer(Box::new(renderer));
        let result = pipeline.run(&fixture.job()).await;

        assert!(matches!(result, Err(StorycutError::MalformedInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fixture = Fixture::new();
        let cancel = Cancellation::new();
        cancel.cancel();

        let pipeline = Pipeline::new(fixture.config(), fixture.options())
            .with_renderer(Box::new(RecordingRenderer::default()))
            .with_cancellation(cancel);
        let result = pipeline.run(&fixture.job()).await;
        assert!(matches!(result, Err(StorycutError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_invalid_job_id() {
        let fixture = Fixture::new();
        let mut job = fixture.job();
        job.id = "../escape".to_string();

        let pipeline = Pipeline::new(fixture.config(), fixture.options());
        let result = pipeline.run(&job).await;
        assert!(matches!(result, Err(StorycutError::MalformedInput(_))));
    }
}
