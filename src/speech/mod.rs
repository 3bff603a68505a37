pub mod azure;

pub use azure::AzureSpeech;

use crate::command::CallScope;
use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Text-to-speech service producing an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and write the audio to `output`.
    async fn synthesize(&self, text: &str, output: &Path, scope: &CallScope) -> Result<()>;

    /// Get the name of this synthesizer.
    fn name(&self) -> &'static str;

    /// File extension of the audio it writes.
    fn extension(&self) -> &'static str {
        "mp3"
    }
}

fn acronym_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*AITA\b").expect("Invalid regex"))
}

/// Spell out a leading "AITA" so it is spoken as words.
pub fn expand_title(title: &str) -> String {
    acronym_re()
        .replace(title, "Am I the asshole")
        .trim()
        .to_string()
}
