// Subtitle text parser
use crate::error::{Result, StorycutError};
use crate::timing::{parse_timecode, validate_window};
use crate::transcribe::{Transcript, TranscriptSegment};
use std::time::Duration;

/// Parse subtitle text into a transcript of timed blocks.
///
/// Each block is an index line, a `start --> end` timecode line and one or
/// more text lines, terminated by a blank line or the end of input. Text
/// lines are trimmed and joined with single spaces.
pub fn parse_subtitles(input: &str) -> Result<Transcript> {
    let mut segments = Vec::new();
    let mut lines = input.lines().enumerate().peekable();

    while let Some((line_no, line)) = lines.next() {
        let index_line = line.trim().trim_start_matches('\u{feff}');
        if index_line.is_empty() {
            continue;
        }

        if index_line.parse::<u64>().is_err() {
            return Err(StorycutError::MalformedInput(format!(
                "Line {}: expected a block index, found '{}'",
                line_no + 1,
                index_line
            )));
        }

        let (start, end) = match lines.next() {
            Some((timecode_no, timecode)) => parse_timecode_line(timecode).map_err(|e| {
                StorycutError::MalformedInput(format!(
                    "Line {}: block {} has an invalid timecode line: {}",
                    timecode_no + 1,
                    index_line,
                    e
                ))
            })?,
            None => {
                return Err(StorycutError::MalformedInput(format!(
                    "Block {index_line} has no timecode line"
                )))
            }
        };

        let mut text_lines = Vec::new();
        while let Some(&(_, next)) = lines.peek() {
            let next = next.trim();
            if next.is_empty() {
                break;
            }
            text_lines.push(next);
            lines.next();
        }

        segments.push(TranscriptSegment::TimedBlock {
            start,
            end,
            text: text_lines.join(" "),
        });
    }

    Transcript::new(segments)
}

/// Parse `start --> end`.
fn parse_timecode_line(line: &str) -> Result<(Duration, Duration)> {
    let (start, end) = line.split_once("-->").ok_or_else(|| {
        StorycutError::MalformedInput(format!("missing '-->' in '{}'", line.trim()))
    })?;

    let start = parse_timecode(start)?;
    let end = parse_timecode(end)?;
    validate_window(start, end)?;
    Ok((start, end))
}
