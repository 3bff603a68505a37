use crate::caption::TimecodeStyle;
use crate::error::{Result, StorycutError};
use crate::media::EncodingParams;
use crate::screenshot::DEFAULT_SELECTOR;
use crate::speech::azure::DEFAULT_VOICE;
use crate::timeline::PartLimits;
use crate::timing::seconds;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Upper bound on render attempts per part.
const MAX_RENDER_RETRIES: u32 = 10;

/// An external program and the arguments placed before its own inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExternalCommand {
    fn python(script: &str) -> Self {
        Self {
            program: "python3".to_string(),
            args: vec![script.to_string()],
        }
    }
}

/// Caller-side limits for each external call, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub screenshot_secs: u64,
    pub transcription_secs: u64,
    pub render_secs: u64,
    pub speech_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            screenshot_secs: 60,
            transcription_secs: 900,
            render_secs: 1800,
            speech_secs: 60,
        }
    }
}

impl Timeouts {
    pub fn screenshot(&self) -> Duration {
        Duration::from_secs(self.screenshot_secs)
    }

    pub fn transcription(&self) -> Duration {
        Duration::from_secs(self.transcription_secs)
    }

    pub fn render(&self) -> Duration {
        Duration::from_secs(self.render_secs)
    }

    pub fn speech(&self) -> Duration {
        Duration::from_secs(self.speech_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub azure_speech_key: Option<String>,
    pub azure_speech_region: Option<String>,
    pub voice: String,
    pub output_dir: PathBuf,
    pub recognizer: ExternalCommand,
    pub browser: ExternalCommand,
    pub screenshot_selector: String,
    pub ffmpeg: String,
    pub max_words_per_caption: usize,
    pub max_part_secs: f64,
    pub min_part_secs: f64,
    pub timecode_style: TimecodeStyle,
    pub music_volume: f32,
    pub background_volume: f32,
    pub render_retries: u32,
    pub timeouts: Timeouts,
    pub encoding: EncodingParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            azure_speech_key: None,
            azure_speech_region: None,
            voice: DEFAULT_VOICE.to_string(),
            output_dir: PathBuf::from("."),
            recognizer: ExternalCommand::python("sub.py"),
            browser: ExternalCommand::python("screenshot.py"),
            screenshot_selector: DEFAULT_SELECTOR.to_string(),
            ffmpeg: "ffmpeg".to_string(),
            max_words_per_caption: 3,
            max_part_secs: 60.0,
            min_part_secs: 10.0,
            timecode_style: TimecodeStyle::default(),
            music_volume: 0.15,
            background_volume: 0.0,
            render_retries: 3,
            timeouts: Timeouts::default(),
            encoding: EncodingParams::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                match toml::from_str::<Config>(&contents) {
                    Ok(file_config) => config = file_config,
                    Err(e) => warn!("Ignoring {}: {}", config_path.display(), e),
                }
            }
        }

        // Override with environment variables
        if let Ok(key) = std::env::var("AZURE_SPEECH_KEY") {
            config.azure_speech_key = Some(key);
        }
        if let Ok(region) = std::env::var("AZURE_SPEECH_REGION") {
            config.azure_speech_region = Some(region);
        }
        if let Ok(dir) = std::env::var("STORYCUT_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(words) = std::env::var("STORYCUT_MAX_WORDS") {
            if let Ok(w) = words.parse() {
                config.max_words_per_caption = w;
            }
        }
        if let Ok(max) = std::env::var("STORYCUT_MAX_PART_SECS") {
            if let Ok(m) = max.parse() {
                config.max_part_secs = m;
            }
        }
        if let Ok(min) = std::env::var("STORYCUT_MIN_PART_SECS") {
            if let Ok(m) = min.parse() {
                config.min_part_secs = m;
            }
        }
        if let Ok(threads) = std::env::var("STORYCUT_RENDER_THREADS") {
            if let Ok(t) = threads.parse() {
                config.encoding.threads = t;
            }
        }

        Ok(config)
    }

    /// Check the settings. `needs_speech` additionally requires Azure
    /// credentials, for jobs that synthesize narration.
    pub fn validate(&self, needs_speech: bool) -> Result<()> {
        if needs_speech {
            if self.azure_speech_key.is_none() {
                return Err(StorycutError::InvalidConfig(
                    "AZURE_SPEECH_KEY not set. Export it with: export AZURE_SPEECH_KEY=..."
                        .to_string(),
                ));
            }
            if self.azure_speech_region.is_none() {
                return Err(StorycutError::InvalidConfig(
                    "AZURE_SPEECH_REGION not set, e.g. export AZURE_SPEECH_REGION=eastus"
                        .to_string(),
                ));
            }
        }

        if self.max_words_per_caption == 0 {
            return Err(StorycutError::InvalidConfig(
                "Max words per caption must be greater than 0".to_string(),
            ));
        }

        self.part_limits()?;

        if self.encoding.threads == 0 {
            return Err(StorycutError::InvalidConfig(
                "Render threads must be greater than 0".to_string(),
            ));
        }
        if self.encoding.width == 0 || self.encoding.height == 0 || self.encoding.fps == 0 {
            return Err(StorycutError::InvalidConfig(
                "Frame size and rate must be greater than 0".to_string(),
            ));
        }

        if self.render_retries > MAX_RENDER_RETRIES {
            return Err(StorycutError::InvalidConfig(format!(
                "render_retries must be at most {MAX_RENDER_RETRIES}, got {}",
                self.render_retries
            )));
        }

        let t = &self.timeouts;
        if [t.screenshot_secs, t.transcription_secs, t.render_secs, t.speech_secs].contains(&0) {
            return Err(StorycutError::InvalidConfig(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        for (name, volume) in [
            ("music_volume", self.music_volume),
            ("background_volume", self.background_volume),
        ] {
            if !volume.is_finite() || volume < 0.0 {
                return Err(StorycutError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {volume}"
                )));
            }
        }

        Ok(())
    }

    /// Output part bounds from the configured seconds.
    pub fn part_limits(&self) -> Result<PartLimits> {
        let to_duration = |name: &str, value: f64| {
            seconds(value).map_err(|_| {
                StorycutError::InvalidConfig(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                ))
            })
        };
        PartLimits::new(
            to_duration("max_part_secs", self.max_part_secs)?,
            to_duration("min_part_secs", self.min_part_secs)?,
        )
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("storycut").join("config.toml"))
    }
}
