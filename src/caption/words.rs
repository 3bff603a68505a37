use super::{CaptionUnit, TERMINAL_PUNCTUATION};
use crate::transcribe::WordTimestamp;
use std::time::Duration;
use tracing::debug;

/// Greedy word chunker for one recognizer segment.
///
/// A chunk closes once it holds `max_words` words, or as soon as a word ends
/// in terminal punctuation, which is then stripped. When both happen on the
/// same word the punctuation is still stripped. Whatever is left at the end
/// of the segment is flushed as a final, shorter chunk.
///
/// A recognizer token holding several words (`" New York"`) counts as that
/// many words; its pieces share the token's timing.
pub struct WordChunks<'a> {
    words: &'a [WordTimestamp],
    pos: usize,
    // pieces of words[pos] already taken
    piece: usize,
    max_words: usize,
}

impl<'a> WordChunks<'a> {
    pub fn new(words: &'a [WordTimestamp], max_words: usize) -> Self {
        Self {
            words,
            pos: 0,
            piece: 0,
            max_words: max_words.max(1),
        }
    }

    /// Collect the next chunk: (start, end, cleaned words).
    fn next_chunk(&mut self) -> Option<(Duration, Duration, Vec<&'a str>)> {
        let mut start = None;
        let mut end = Duration::ZERO;
        let mut parts: Vec<&'a str> = Vec::with_capacity(self.max_words);

        while let Some(word) = self.words.get(self.pos) {
            let Some(piece) = word.word.split_whitespace().nth(self.piece) else {
                self.pos += 1;
                self.piece = 0;
                continue;
            };
            self.piece += 1;

            let closes_sentence = piece.ends_with(&TERMINAL_PUNCTUATION[..]);
            let cleaned = if closes_sentence {
                piece.trim_end_matches(&TERMINAL_PUNCTUATION[..])
            } else {
                piece
            };

            start.get_or_insert(word.start);
            end = word.end;
            parts.push(cleaned);

            if closes_sentence || parts.len() >= self.max_words {
                break;
            }
        }

        start.map(|start| (start, end, parts))
    }
}

impl Iterator for WordChunks<'_> {
    type Item = CaptionUnit;

    fn next(&mut self) -> Option<CaptionUnit> {
        loop {
            let (start, end, parts) = self.next_chunk()?;

            // a punctuation-only word leaves an empty part behind
            let text = parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            match CaptionUnit::new(start, end, &text) {
                Ok(unit) => return Some(unit),
                Err(e) => debug!("Dropping empty chunk: {}", e),
            }
        }
    }
}
