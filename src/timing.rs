//! Time conversions shared by the caption and timeline code.
//!
//! Everything inside the crate is a [`Duration`] at millisecond resolution.
//! Seconds only appear at the edges: recognizer JSON, subtitle timecodes and
//! the arguments handed to the render engine.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{Result, StorycutError};

fn timecode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?::\d+){0,2})(?:[,.](\d{1,3}))?$").expect("Invalid regex")
    })
}

/// Convert wire-format seconds into a millisecond-rounded duration.
pub fn seconds(value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(StorycutError::MalformedInput(format!(
            "Invalid timestamp: {value}"
        )));
    }
    Ok(Duration::from_millis((value * 1000.0).round() as u64))
}

/// Parse a subtitle timecode.
///
/// Accepts the short `SS,mmm` form as well as `MM:SS,mmm` and
/// `HH:MM:SS,mmm`. A period is tolerated as the decimal separator.
pub fn parse_timecode(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    let caps = timecode_re().captures(trimmed).ok_or_else(|| {
        StorycutError::MalformedInput(format!("Invalid timecode: '{trimmed}'"))
    })?;

    let mut total_secs: u64 = 0;
    for field in caps[1].split(':') {
        let value: u64 = field.parse().map_err(|e| {
            StorycutError::MalformedInput(format!("Invalid timecode field '{field}': {e}"))
        })?;
        total_secs = total_secs
            .checked_mul(60)
            .and_then(|secs| secs.checked_add(value))
            .ok_or_else(|| {
                StorycutError::MalformedInput(format!("Timecode out of range: '{trimmed}'"))
            })?;
    }

    // "4" after the separator is 400ms, not 4ms
    let millis = match caps.get(2) {
        Some(m) => {
            let digits = m.as_str();
            let value: u64 = digits.parse().unwrap_or(0);
            value * 10u64.pow(3 - digits.len() as u32)
        }
        None => 0,
    };

    Duration::from_secs(total_secs)
        .checked_add(Duration::from_millis(millis))
        .ok_or_else(|| StorycutError::MalformedInput(format!("Timecode out of range: '{trimmed}'")))
}

/// Format as the short `SS,mmm` timecode.
pub fn format_short(d: Duration) -> String {
    format!("{:02},{:03}", d.as_secs(), d.subsec_millis())
}

/// Format as the full `HH:MM:SS,mmm` timecode.
pub fn format_full(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = d.subsec_millis();
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Seconds with millisecond precision, as passed on an ffmpeg command line.
pub fn as_arg(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

/// Reject a `[start, end]` window that runs backwards.
pub fn validate_window(start: Duration, end: Duration) -> Result<()> {
    if end < start {
        return Err(StorycutError::MalformedInput(format!(
            "End {:.3}s precedes start {:.3}s",
            end.as_secs_f64(),
            start.as_secs_f64()
        )));
    }
    Ok(())
}

/// Reject a sequence whose start times decrease.
pub fn ensure_non_decreasing<I>(starts: I, what: &str) -> Result<()>
where
    I: IntoIterator<Item = Duration>,
{
    let mut previous: Option<Duration> = None;
    for (i, start) in starts.into_iter().enumerate() {
        if let Some(prev) = previous {
            if start < prev {
                return Err(StorycutError::MalformedInput(format!(
                    "{what} {} starts at {:.3}s, before the previous one at {:.3}s",
                    i + 1,
                    start.as_secs_f64(),
                    prev.as_secs_f64()
                )));
            }
        }
        previous = Some(start);
    }
    Ok(())
}
