//! Caption segmentation: turning a [`Transcript`] into short on-screen
//! caption units.

pub mod blocks;
pub mod estimate;
pub mod format;
pub mod words;

pub use blocks::parse_subtitles;
pub use estimate::{estimate_transcript, EstimateConfig};
pub use format::{create_formatter, write_subtitles, SubtitleFormatter, TimecodeStyle};
pub use words::WordChunks;

use crate::error::{Result, StorycutError};
use crate::timing::validate_window;
use crate::transcribe::{Transcript, TranscriptSegment};
use std::slice;
use std::time::Duration;
use tracing::debug;

/// Characters that close a caption early and are stripped from its end.
pub const TERMINAL_PUNCTUATION: [char; 4] = ['.', ',', '!', '?'];

/// One on-screen caption.
///
/// The text is never empty, carries no surrounding whitespace and never ends
/// in [`TERMINAL_PUNCTUATION`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionUnit {
    start: Duration,
    end: Duration,
    text: String,
}

impl CaptionUnit {
    pub fn new(start: Duration, end: Duration, text: &str) -> Result<Self> {
        validate_window(start, end)?;

        let text = text
            .trim()
            .trim_end_matches(&TERMINAL_PUNCTUATION[..])
            .trim_end()
            .to_string();
        if text.is_empty() {
            return Err(StorycutError::MalformedInput(format!(
                "Caption at {:.3}s has no text",
                start.as_secs_f64()
            )));
        }

        Ok(Self { start, end, text })
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn end(&self) -> Duration {
        self.end
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Splits transcripts into caption units of at most `max_words` words.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    max_words: usize,
}

impl Segmenter {
    pub fn new(max_words_per_unit: usize) -> Result<Self> {
        if max_words_per_unit == 0 {
            return Err(StorycutError::InvalidConfig(
                "Max words per caption must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_words: max_words_per_unit,
        })
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    /// Lazily segment `transcript`. Calling this again on the same input
    /// yields the same sequence.
    pub fn segment<'a>(&self, transcript: &'a Transcript) -> Captions<'a> {
        Captions {
            segments: transcript.segments().iter(),
            current: None,
            max_words: self.max_words,
        }
    }
}

/// Segment `transcript` with a word limit of `max_words_per_unit`.
pub fn segment(transcript: &Transcript, max_words_per_unit: usize) -> Result<Captions<'_>> {
    Ok(Segmenter::new(max_words_per_unit)?.segment(transcript))
}

/// Iterator over the caption units of a transcript, in input order.
pub struct Captions<'a> {
    segments: slice::Iter<'a, TranscriptSegment>,
    current: Option<WordChunks<'a>>,
    max_words: usize,
}

impl Iterator for Captions<'_> {
    type Item = CaptionUnit;

    fn next(&mut self) -> Option<CaptionUnit> {
        loop {
            if let Some(chunks) = self.current.as_mut() {
                if let Some(unit) = chunks.next() {
                    return Some(unit);
                }
                self.current = None;
            }

            match self.segments.next()? {
                TranscriptSegment::TimedBlock { start, end, text } => {
                    match CaptionUnit::new(*start, *end, text) {
                        Ok(unit) => return Some(unit),
                        Err(e) => debug!("Skipping block: {}", e),
                    }
                }
                TranscriptSegment::RecognizerSegment { words } => {
                    self.current = Some(WordChunks::new(words, self.max_words));
                }
            }
        }
    }
}
