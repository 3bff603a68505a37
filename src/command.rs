//! Running the external collaborators (recognizer, browser, render engine).
//!
//! Every call carries its own [`CallScope`]: a caller-owned timeout, the
//! verbosity the child should run at, and a cancellation flag. Children are
//! spawned with `kill_on_drop`, so a timed-out or cancelled call never leaves
//! a process behind.

use std::future::Future;
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, StorycutError};

/// How much diagnostic output an external call may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Capture the child's stderr; only surface it when the call fails.
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// Value for ffmpeg's `-loglevel`.
    pub fn ffmpeg_log_level(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warning",
            Verbosity::Verbose => "info",
        }
    }

    fn stderr(self) -> Stdio {
        match self {
            Verbosity::Quiet => Stdio::piped(),
            Verbosity::Normal | Verbosity::Verbose => Stdio::inherit(),
        }
    }
}

/// Shared cancellation flag, set from the Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Resolve once the flag is set.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Fail with [`StorycutError::Cancelled`] if the flag is set.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(StorycutError::Cancelled(stage.to_string()));
        }
        Ok(())
    }
}

/// Per-call limits for one external invocation.
#[derive(Debug, Clone)]
pub struct CallScope {
    pub timeout: Duration,
    pub verbosity: Verbosity,
    pub cancel: Cancellation,
}

impl CallScope {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            verbosity: Verbosity::default(),
            cancel: Cancellation::new(),
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Spawn `command`, wait for it within the scope's timeout and return its
/// output. The exit status is left for the caller to interpret.
pub async fn run(mut command: Command, operation: &str, scope: &CallScope) -> Result<Output> {
    scope.cancel.check(operation)?;

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(scope.verbosity.stderr())
        .kill_on_drop(true);

    debug!("{}: {:?}", operation, command.as_std());

    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let child = command.spawn().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            StorycutError::MissingResource(format!(
                "{program} not found. Install it or fix the configured command"
            ))
        } else {
            StorycutError::Io(e)
        }
    })?;

    tokio::select! {
        result = tokio::time::timeout(scope.timeout, child.wait_with_output()) => {
            match result {
                Ok(output) => Ok(output?),
                Err(_) => Err(StorycutError::Timeout {
                    operation: operation.to_string(),
                    seconds: scope.timeout.as_secs_f64(),
                }),
            }
        }
        _ = scope.cancel.cancelled() => Err(StorycutError::Cancelled(operation.to_string())),
    }
}

/// Last lines of a captured stream, for error messages.
pub fn tail(bytes: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let collected: Vec<&str> = text.lines().rev().take(lines).collect();
    collected.into_iter().rev().collect::<Vec<_>>().join("\n")
}

/// Longest wait between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Wait before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base_delay.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Retry `op` with exponential backoff while it fails with a transient error.
pub async fn retry_with_backoff<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..max_attempts.max(1) {
        if attempt > 0 {
            let delay = backoff_delay(base_delay, attempt);
            debug!("{}: retry attempt {} after {:?}", operation, attempt, delay);
            tokio::time::sleep(delay).await;
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!("{}: attempt {} failed: {}", operation, attempt + 1, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| StorycutError::Api(format!("{operation}: no attempts made"))))
}
