// Subtitle text writer
use super::CaptionUnit;
use crate::error::Result;
use crate::timing::{format_full, format_short};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Timecode layout used when writing subtitle text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimecodeStyle {
    /// `SS,mmm`
    #[default]
    Short,
    /// `HH:MM:SS,mmm`
    Full,
}

impl std::fmt::Display for TimecodeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimecodeStyle::Short => write!(f, "short"),
            TimecodeStyle::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for TimecodeStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(TimecodeStyle::Short),
            "full" | "srt" => Ok(TimecodeStyle::Full),
            _ => Err(format!(
                "Unknown timecode style: {}. Use 'short' or 'full'",
                s
            )),
        }
    }
}

pub trait SubtitleFormatter {
    fn format(&self, units: &[CaptionUnit]) -> String;
    fn extension(&self) -> &'static str;
}

pub struct ShortFormatter;

pub struct SrtFormatter;

impl SubtitleFormatter for ShortFormatter {
    fn format(&self, units: &[CaptionUnit]) -> String {
        format_blocks(units, format_short)
    }

    fn extension(&self) -> &'static str {
        "txt"
    }
}

impl SubtitleFormatter for SrtFormatter {
    fn format(&self, units: &[CaptionUnit]) -> String {
        format_blocks(units, format_full)
    }

    fn extension(&self) -> &'static str {
        "srt"
    }
}

fn format_blocks(units: &[CaptionUnit], timecode: fn(Duration) -> String) -> String {
    units
        .iter()
        .enumerate()
        .map(|(i, unit)| {
            format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                timecode(unit.start()),
                timecode(unit.end()),
                unit.text()
            )
        })
        .collect()
}

pub fn create_formatter(style: TimecodeStyle) -> Box<dyn SubtitleFormatter> {
    match style {
        TimecodeStyle::Short => Box::new(ShortFormatter),
        TimecodeStyle::Full => Box::new(SrtFormatter),
    }
}

/// Write `units` to `path` in the given style.
pub fn write_subtitles(path: &Path, units: &[CaptionUnit], style: TimecodeStyle) -> Result<()> {
    let content = create_formatter(style).format(units);
    std::fs::write(path, content)?;
    info!("Wrote {} captions to {}", units.len(), path.display());
    Ok(())
}
