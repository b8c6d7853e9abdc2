use serde::{Deserialize, Serialize};

/// Lifecycle of one recording cycle. `Transcribing` covers the short window
/// after stop while the closing recognition stream drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Transcribing,
}

impl RecordingState {
    // A stable string label for UI display.
    // This is intentionally not derived from `Debug`.
    pub fn label(self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Transcribing => "transcribing",
        }
    }

    pub fn is_recording(self) -> bool {
        self == RecordingState::Recording
    }
}

/// Current input (spoken) and output (translated) language choice.
///
/// The input tag is a full BCP 47 tag ("nl-NL"); the output is a bare
/// language code ("nl"). Changing the input tag mid-recording only affects
/// the next session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSelection {
    pub input_tag: String,
    pub output_code: String,
}

impl LanguageSelection {
    pub fn new(input_tag: impl Into<String>, output_code: impl Into<String>) -> Self {
        Self {
            input_tag: input_tag.into(),
            output_code: output_code.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    RecordingStarted,
    RecordingStopped,
    CaptureFailed,
    RecognitionFault,
    Warning,
}

/// Non-fatal, user-facing notification. Rendering (toast, status line, log)
/// is up to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotice {
    pub kind: NoticeKind,
    pub message: String,
}

impl StatusNotice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
