use crate::command::{self, CallScope};
use crate::error::{Result, StorycutError};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Region of the rendered post captured by default.
pub const DEFAULT_SELECTOR: &str = "#preview_block";

/// Exit code the browser script uses when the region never became ready.
const TIMEOUT_EXIT_CODE: i32 = 2;

/// Captures a region of a web page as an image.
#[async_trait]
pub trait Screenshotter: Send + Sync {
    async fn capture(
        &self,
        url: &str,
        selector: &str,
        output: &Path,
        scope: &CallScope,
    ) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Headless browser automation run as an external process:
/// `program args... <url> <selector> <output>`.
pub struct BrowserCommand {
    program: String,
    args: Vec<String>,
}

impl Default for BrowserCommand {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["screenshot.py".to_string()],
        }
    }
}

impl BrowserCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Screenshotter for BrowserCommand {
    async fn capture(
        &self,
        url: &str,
        selector: &str,
        output: &Path,
        scope: &CallScope,
    ) -> Result<()> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(StorycutError::MalformedInput(format!(
                "Not an http(s) URL: {url}"
            )));
        }

        info!("Capturing {} from {}", selector, url);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(url).arg(selector).arg(output);
        let result = command::run(cmd, "screenshot", scope).await?;

        if result.status.code() == Some(TIMEOUT_EXIT_CODE) {
            return Err(StorycutError::Timeout {
                operation: format!("waiting for {selector} on {url}"),
                seconds: scope.timeout.as_secs_f64(),
            });
        }
        if !result.status.success() {
            return Err(StorycutError::Api(format!(
                "Screenshot command exited with {}: {}",
                result.status,
                command::tail(&result.stderr, 5)
            )));
        }
        if !output.is_file() {
            return Err(StorycutError::MissingResource(format!(
                "Screenshot was not written to {}",
                output.display()
            )));
        }

        info!("Saved screenshot to {}", output.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Browser"
    }
}
