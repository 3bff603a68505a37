use crate::error::Result;
use crate::transcribe::{Transcript, TranscriptSegment};
use std::time::Duration;

/// Settings for timing captions from text alone, when no recognizer output
/// is available.
#[derive(Debug, Clone)]
pub struct EstimateConfig {
    /// Close a block after this many words.
    pub max_words: usize,
    /// Close a block once its text grows past this many characters.
    pub max_chars: usize,
    /// Speaking time assumed per word (150 words per minute).
    pub per_word: Duration,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            max_words: 4,
            max_chars: 15,
            per_word: Duration::from_millis(400),
        }
    }
}

/// Build a transcript of timed blocks from plain text, laid end to end from
/// zero.
///
/// A block closes after `max_words` words, on a word containing `.`, `!` or
/// `?`, or once the block text exceeds `max_chars`.
pub fn estimate_transcript(text: &str, config: &EstimateConfig) -> Result<Transcript> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut clock = Duration::ZERO;

    let mut close = |words: &mut Vec<&str>, clock: &mut Duration| {
        let duration = config.per_word * words.len() as u32;
        segments.push(TranscriptSegment::TimedBlock {
            start: *clock,
            end: *clock + duration,
            text: words.join(" "),
        });
        *clock += duration;
        words.clear();
    };

    for word in text.split_whitespace() {
        current.push(word);
        let length: usize = current.iter().map(|w| w.len()).sum::<usize>() + current.len() - 1;

        if current.len() >= config.max_words.max(1)
            || word.contains(&['.', '!', '?'][..])
            || length > config.max_chars
        {
            close(&mut current, &mut clock);
        }
    }

    if !current.is_empty() {
        close(&mut current, &mut clock);
    }

    Transcript::new(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(transcript: &Transcript) -> Vec<(u64, u64, String)> {
        transcript
            .segments()
            .iter()
            .map(|s| match s {
                TranscriptSegment::TimedBlock { start, end, text } => {
                    (start.as_millis() as u64, end.as_millis() as u64, text.clone())
                }
                other => panic!("Unexpected segment {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_estimate_word_limit_and_sentence_end() {
        let transcript =
            estimate_transcript("I am a cat. You are", &EstimateConfig::default()).unwrap();
        assert_eq!(
            blocks(&transcript),
            vec![
                (0, 1600, "I am a cat.".to_string()),
                (1600, 2400, "You are".to_string()),
            ]
        );
    }

    #[test]
    fn test_estimate_character_limit() {
        let transcript =
            estimate_transcript("incomprehensibly long words here", &EstimateConfig::default())
                .unwrap();
        let result = blocks(&transcript);
        // the first word alone is over 15 characters
        assert_eq!(result[0], (0, 400, "incomprehensibly".to_string()));
        assert_eq!(result[1].2, "long words here");
    }

    #[test]
    fn test_estimate_empty_text() {
        let transcript = estimate_transcript("   ", &EstimateConfig::default()).unwrap();
        assert!(transcript.is_empty());
    }
}
