use async_trait::async_trait;
use tokio::sync::mpsc;

use tolk_core::transcript::Fragment;

/// Why the audio-capture capability could not be acquired at start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureUnavailable {
    #[error("microphone access denied")]
    PermissionDenied,

    #[error("no input device found")]
    NoDevice,

    #[error("audio capture failed: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Fragment(Fragment),
    Error { message: String },
}

#[async_trait]
pub trait CaptureHandle: Send {
    /// Hands the device back. The coordinator calls this exactly once per
    /// session, on every exit path, after the recognition stream is closed.
    async fn release(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>, CaptureUnavailable>;
}

#[async_trait]
pub trait RecognitionStream: Send {
    /// Closes the stream. The paired event channel must end shortly after;
    /// anything already in flight may still be delivered first. Closing never
    /// finalizes a pending interim fragment.
    async fn stop(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Opens a recognition stream configured with the session's input
    /// language tag. At most one stream is active per session.
    async fn open(
        &self,
        language: &str,
    ) -> anyhow::Result<(Box<dyn RecognitionStream>, mpsc::Receiver<RecognitionEvent>)>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> anyhow::Result<String>;
}
