use crate::command::{self, CallScope};
use crate::error::{Result, StorycutError};
use crate::timing::seconds;
use crate::transcribe::{Transcriber, Transcript, TranscriptSegment, WordTimestamp};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Default recognizer invocation: a Whisper script that prints JSON on stdout.
const DEFAULT_PROGRAM: &str = "python3";
const DEFAULT_SCRIPT: &str = "sub.py";

/// Local Whisper recognizer, run as an external process.
///
/// The process receives the audio path as its last argument and prints
/// either a JSON array of segments, a `{"segments": [...]}` object, or an
/// `{"error": "..."}` payload.
pub struct WhisperCommand {
    program: String,
    args: Vec<String>,
}

impl Default for WhisperCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: vec![DEFAULT_SCRIPT.to_string()],
        }
    }
}

impl WhisperCommand {
    /// Use `program args... <audio>` as the recognizer.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn build_command(&self, audio: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(audio);
        cmd
    }
}

#[async_trait]
impl Transcriber for WhisperCommand {
    async fn transcribe(&self, audio: &Path, scope: &CallScope) -> Result<Transcript> {
        if !audio.exists() {
            return Err(StorycutError::MissingResource(audio.display().to_string()));
        }

        info!("Transcribing {} with {}", audio.display(), self.program);

        let output = command::run(self.build_command(audio), "transcription", scope).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            // The recognizer reports failures as an {"error": ...} payload on stdout
            if let Ok(RecognizerOutput::Failure { error }) =
                serde_json::from_str::<RecognizerOutput>(&stdout)
            {
                return Err(StorycutError::Transcription(error));
            }
            return Err(StorycutError::Transcription(format!(
                "Recognizer exited with {}: {}",
                output.status,
                command::tail(&output.stderr, 5)
            )));
        }

        let transcript = parse_recognizer_output(&stdout)?;
        debug!(
            "Recognizer returned {} segments for {}",
            transcript.segments().len(),
            audio.display()
        );
        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        "Whisper"
    }
}

/// Convert recognizer JSON into a [`Transcript`].
///
/// Segments carrying a `words` array become recognizer segments; segments
/// without one are treated as pre-delimited blocks.
pub fn parse_recognizer_output(json: &str) -> Result<Transcript> {
    let parsed: RecognizerOutput = serde_json::from_str(json)?;

    let (raw_segments, language) = match parsed {
        RecognizerOutput::Failure { error } => return Err(StorycutError::Transcription(error)),
        RecognizerOutput::Full { segments, language } => (segments, language),
        RecognizerOutput::Segments(segments) => (segments, None),
    };

    let mut segments = Vec::with_capacity(raw_segments.len());
    for seg in raw_segments {
        let segment = match seg.words {
            Some(words) => TranscriptSegment::RecognizerSegment {
                words: words
                    .into_iter()
                    .map(|w| {
                        Ok(WordTimestamp {
                            word: w.word,
                            start: seconds(w.start)?,
                            end: seconds(w.end)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            },
            None => TranscriptSegment::TimedBlock {
                start: seconds(seg.start)?,
                end: seconds(seg.end)?,
                text: seg.text.trim().to_string(),
            },
        };
        segments.push(segment);
    }

    Ok(Transcript::new(segments)?.with_language(language))
}

// Recognizer output types

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecognizerOutput {
    Failure {
        error: String,
    },
    Full {
        segments: Vec<RecognizerSegment>,
        #[serde(default)]
        language: Option<String>,
    },
    Segments(Vec<RecognizerSegment>),
}

#[derive(Debug, Deserialize)]
struct RecognizerSegment {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    words: Option<Vec<RecognizerWord>>,
}

#[derive(Debug, Deserialize)]
struct RecognizerWord {
    word: String,
    start: f64,
    end: f64,
}
