pub mod whisper;

pub use whisper::{parse_recognizer_output, WhisperCommand};

use crate::command::CallScope;
use crate::error::{Result, StorycutError};
use crate::timing::{ensure_non_decreasing, validate_window};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct WordTimestamp {
    pub word: String,
    pub start: Duration,
    pub end: Duration,
}

/// One unit of timestamped transcription, in either of the two shapes the
/// caption segmenter understands.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptSegment {
    /// A pre-delimited block: one caption, shown as-is.
    TimedBlock {
        start: Duration,
        end: Duration,
        text: String,
    },
    /// A recognizer segment with one timestamp per token.
    RecognizerSegment { words: Vec<WordTimestamp> },
}

impl TranscriptSegment {
    /// Start of the segment, `None` for a recognizer segment without words.
    pub fn start(&self) -> Option<Duration> {
        match self {
            TranscriptSegment::TimedBlock { start, .. } => Some(*start),
            TranscriptSegment::RecognizerSegment { words } => words.first().map(|w| w.start),
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        match self {
            TranscriptSegment::TimedBlock { start, end, .. } => validate_window(*start, *end)
                .map_err(|e| StorycutError::MalformedInput(format!("Segment {}: {e}", index + 1))),
            TranscriptSegment::RecognizerSegment { words } => {
                for word in words {
                    validate_window(word.start, word.end).map_err(|e| {
                        StorycutError::MalformedInput(format!(
                            "Segment {}, word '{}': {e}",
                            index + 1,
                            word.word
                        ))
                    })?;
                }
                ensure_non_decreasing(words.iter().map(|w| w.start), "Word")
                    .map_err(|e| StorycutError::MalformedInput(format!("Segment {}: {e}", index + 1)))
            }
        }
    }
}

/// An ordered transcript. Construction rejects segments (and words) whose
/// start times go backwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    segments: Vec<TranscriptSegment>,
    pub language: Option<String>,
}

impl Transcript {
    pub fn new(segments: Vec<TranscriptSegment>) -> Result<Self> {
        for (i, segment) in segments.iter().enumerate() {
            segment.validate(i)?;
        }
        ensure_non_decreasing(segments.iter().filter_map(|s| s.start()), "Segment")?;

        Ok(Self {
            segments,
            language: None,
        })
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, scope: &CallScope) -> Result<Transcript>;
    fn name(&self) -> &'static str;
}
