use crate::command::CallScope;
use crate::error::{Result, StorycutError};
use crate::speech::SpeechSynthesizer;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default voice for narration.
pub const DEFAULT_VOICE: &str = "en-US-AdamMultilingualNeural";

/// Audio format requested from the service.
const OUTPUT_FORMAT: &str = "audio-16khz-128kbitrate-mono-mp3";

/// Maximum retries for API calls.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Azure Cognitive Services text-to-speech client.
pub struct AzureSpeech {
    client: reqwest::Client,
    subscription_key: String,
    region: String,
    voice: String,
    base_url: Option<String>,
    retry_delay: Duration,
}

impl AzureSpeech {
    pub fn new(subscription_key: String, region: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            subscription_key,
            region,
            voice: DEFAULT_VOICE.to_string(),
            base_url: None,
            retry_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }

    pub fn with_voice(mut self, voice: String) -> Self {
        self.voice = voice;
        self
    }

    /// Send requests to `base_url` instead of the regional endpoint.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Base delay for exponential backoff between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self) -> String {
        match &self.base_url {
            Some(base) => format!("{}/cognitiveservices/v1", base.trim_end_matches('/')),
            None => format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                self.region
            ),
        }
    }

    /// SSML request body.
    pub fn build_ssml(&self, text: &str) -> String {
        format!(
            "<speak version='1.0' xml:lang='en-US'><voice xml:lang='en-US' name='{}'>{}</voice></speak>",
            escape_xml(&self.voice),
            escape_xml(text)
        )
    }

    async fn request_audio(&self, ssml: &str, scope: &CallScope) -> Result<Vec<u8>> {
        let url = self.endpoint();
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_delay * 2u32.pow(attempt - 1);
                debug!("Retry attempt {} after {:?} delay", attempt, delay);
                tokio::time::sleep(delay).await;
            }
            scope.cancel.check("speech synthesis")?;

            let request = self
                .client
                .post(&url)
                .header("Content-Type", "application/ssml+xml")
                .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
                .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
                .header("User-Agent", "storycut")
                .body(ssml.to_string())
                .send();

            let response = match tokio::time::timeout(scope.timeout, request).await {
                Ok(response) => response,
                Err(_) => {
                    warn!("Azure TTS request timed out after {:?}", scope.timeout);
                    last_error = Some(StorycutError::Timeout {
                        operation: "speech synthesis".to_string(),
                        seconds: scope.timeout.as_secs_f64(),
                    });
                    continue;
                }
            };

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    debug!("Azure TTS response status: {}", status);

                    if status.is_success() {
                        let audio = resp.bytes().await?;
                        if audio.is_empty() {
                            return Err(StorycutError::Speech(
                                "Azure TTS returned no audio".to_string(),
                            ));
                        }
                        return Ok(audio.to_vec());
                    }

                    let error_body = resp.text().await.unwrap_or_default();

                    // Don't retry on client errors
                    if status.is_client_error() {
                        return Err(StorycutError::Speech(format!(
                            "Azure TTS error ({}): {}",
                            status, error_body
                        )));
                    }

                    warn!("Azure TTS server error ({}): {}", status, error_body);
                    last_error = Some(StorycutError::Api(format!(
                        "Azure TTS server error: {}",
                        status
                    )));
                }
                Err(e) => {
                    warn!("Azure TTS request failed: {}", e);
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| StorycutError::Api("Unknown error".to_string())))
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeech {
    async fn synthesize(&self, text: &str, output: &Path, scope: &CallScope) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StorycutError::MalformedInput(
                "Cannot synthesize empty text".to_string(),
            ));
        }

        info!(
            "Synthesizing {} characters with {} ({})",
            text.len(),
            self.voice,
            self.name()
        );

        let audio = self.request_audio(&self.build_ssml(text), scope).await?;
        tokio::fs::write(output, &audio).await?;
        info!("Saved audio to {}", output.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Azure TTS"
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
