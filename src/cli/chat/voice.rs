//! Voice mode: speech collaborators and the retry-governed loop state.
//!
//! Capture and synthesis are black-box external commands. The loop state
//! tracks consecutive recognition failures so the controller can nudge the
//! user after repeated silence without ever abandoning the loop on its own;
//! only an explicit stop leaves voice mode.

use std::env;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::error::{CaptureError, SynthesisError};

/// Seconds a single capture may run before it counts as a failed cycle.
pub const CAPTURE_TIMEOUT_SECS: u64 = 20;

/// Consecutive failed captures tolerated before the controller warns.
pub const FAILURE_WARNING_THRESHOLD: u32 = 3;

/// Default synthesis command; `$CHAT_LANG` and `$CHAT_TEXT` are injected.
const DEFAULT_SPEAK_CMD: &str = r#"espeak-ng -v "$CHAT_LANG" -- "$CHAT_TEXT""#;

/// Capture one utterance as text.
#[async_trait]
pub trait SpeechCapture {
    /// Listen for speech in the given locale. `Ok(None)` means the capture
    /// ran but heard nothing usable.
    async fn capture(&self, locale: &str) -> Result<Option<String>, CaptureError>;
}

/// Speak text aloud, blocking until playback finishes.
#[async_trait]
pub trait SpeechSynthesizer {
    async fn speak(&self, text: &str, lang: &str) -> Result<(), SynthesisError>;
}

/// Speech collaborators that shell out to configurable external commands.
///
/// Capture expects `CHAT_CAPTURE_CMD` to name a command that records one
/// utterance and prints the transcript to stdout. Synthesis runs
/// `CHAT_SPEAK_CMD` (default espeak-ng) and waits for it to exit, which is
/// what keeps the next listening cycle from overlapping spoken output.
pub struct CommandSpeech {
    capture_cmd: Option<String>,
    speak_cmd: String,
}

impl CommandSpeech {
    pub fn new() -> Self {
        Self {
            capture_cmd: env::var("CHAT_CAPTURE_CMD").ok(),
            speak_cmd: env::var("CHAT_SPEAK_CMD")
                .unwrap_or_else(|_| DEFAULT_SPEAK_CMD.to_string()),
        }
    }
}

#[async_trait]
impl SpeechCapture for CommandSpeech {
    async fn capture(&self, locale: &str) -> Result<Option<String>, CaptureError> {
        let cmd = self.capture_cmd.as_ref().ok_or(CaptureError::Unavailable)?;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .env("CHAT_LANG", locale)
            .stdout(Stdio::piped());

        let output = tokio::time::timeout(Duration::from_secs(CAPTURE_TIMEOUT_SECS), command.output())
            .await
            .map_err(|_| CaptureError::Timeout(CAPTURE_TIMEOUT_SECS))?
            .map_err(|e| CaptureError::Failed(e.to_string()))?;

        if !output.status.success() {
            return Err(CaptureError::Failed(format!(
                "capture command exited with {}",
                output.status
            )));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            Ok(None)
        } else {
            Ok(Some(transcript))
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSpeech {
    async fn speak(&self, text: &str, lang: &str) -> Result<(), SynthesisError> {
        if text.is_empty() {
            return Ok(());
        }

        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.speak_cmd)
            .env("CHAT_TEXT", text)
            .env("CHAT_LANG", lang)
            .status()
            .await
            .map_err(|e| SynthesisError::Failed(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(SynthesisError::Failed(format!(
                "speak command exited with {status}"
            )))
        }
    }
}

/// Loop accounting owned by the voice loop controller.
#[derive(Debug, Default)]
pub struct VoiceLoopState {
    active: bool,
    busy: bool,
    failures: u32,
}

impl VoiceLoopState {
    pub fn start(&mut self) {
        self.active = true;
        self.failures = 0;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Claim the loop for one capture cycle. Returns false when the loop is
    /// stopped or a cycle is already in flight.
    pub fn begin_cycle(&mut self) -> bool {
        if !self.active || self.busy {
            return false;
        }
        self.busy = true;
        true
    }

    /// Release the loop. Must run on every exit path of a cycle so the
    /// controller can never wedge in a permanently-busy state.
    pub fn end_cycle(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// A turn completed from a captured transcript.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// A capture produced nothing. Returns true when the caller should warn
    /// the user; the counter resets so the warning fires once per streak.
    pub fn record_failure(&mut self) -> bool {
        self.failures += 1;
        if self.failures > FAILURE_WARNING_THRESHOLD {
            self.failures = 0;
            true
        } else {
            false
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}
