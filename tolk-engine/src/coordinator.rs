use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use tolk_core::lang::input_display_name;
use tolk_core::transcript::TranscriptAccumulator;
use tolk_core::types::{LanguageSelection, NoticeKind, RecordingState, StatusNotice};

use crate::clock::SessionClock;
use crate::debounce::TranslationDebouncer;
use crate::traits::{
    AudioCapture, CaptureHandle, CaptureUnavailable, RecognitionEvent, RecognitionStream,
    SpeechRecognizer, Translator,
};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Failsafe: a session that reaches this duration is stopped
    /// automatically. `None` disables the watchdog.
    pub max_recording: Option<Duration>,

    /// How long `stop()` waits for the closing recognition stream to drain
    /// before the event pump is aborted.
    pub stop_drain_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_recording: Some(Duration::from_secs(120)),
            stop_drain_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    CaptureUnavailable(#[from] CaptureUnavailable),

    #[error("recognition stream failed to open: {0}")]
    Recognizer(anyhow::Error),

    #[error("a recording session is already active")]
    AlreadyActive,
}

/// Resources owned by one recording cycle. Exactly one session exists at a
/// time; every field is released on every exit path.
struct ActiveSession {
    input_tag: String,
    capture: Box<dyn CaptureHandle>,
    stream: Box<dyn RecognitionStream>,
    pump_task: JoinHandle<()>,
}

struct Inner {
    state: RecordingState,
    selection: LanguageSelection,

    // Bumped on every session start and on clear(); async work snapshots it
    // and stale events are ignored instead of cancelled.
    session_id: u64,

    transcript: String,
    accumulator: TranscriptAccumulator,
    clock: SessionClock,
    session: Option<ActiveSession>,
}

/// Top-level state machine for the record/transcribe/translate workflow.
///
/// Cheap to clone; all clones share the same session. Observable fields
/// (state, elapsed seconds, transcript, translated text) are independent
/// watch channels so a presentation layer can bind each one separately.
#[derive(Clone)]
pub struct RecordingCoordinator {
    inner: Arc<Mutex<Inner>>,
    capture: Arc<dyn AudioCapture>,
    recognizer: Arc<dyn SpeechRecognizer>,
    debouncer: TranslationDebouncer,
    cfg: Arc<CoordinatorConfig>,

    state_tx: Arc<watch::Sender<RecordingState>>,
    transcript_tx: Arc<watch::Sender<String>>,
    elapsed_rx: watch::Receiver<u64>,
    notice_tx: broadcast::Sender<StatusNotice>,
}

impl RecordingCoordinator {
    pub fn new(
        capture: Arc<dyn AudioCapture>,
        recognizer: Arc<dyn SpeechRecognizer>,
        translator: Arc<dyn Translator>,
        selection: LanguageSelection,
        cfg: CoordinatorConfig,
    ) -> Self {
        let clock = SessionClock::new();
        let elapsed_rx = clock.subscribe();
        let (state_tx, _) = watch::channel(RecordingState::Idle);
        let (transcript_tx, _) = watch::channel(String::new());
        let (notice_tx, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: RecordingState::Idle,
                selection,
                session_id: 0,
                transcript: String::new(),
                accumulator: TranscriptAccumulator::new(),
                clock,
                session: None,
            })),
            capture,
            recognizer,
            debouncer: TranslationDebouncer::new(translator),
            cfg: Arc::new(cfg),
            state_tx: Arc::new(state_tx),
            transcript_tx: Arc::new(transcript_tx),
            elapsed_rx,
            notice_tx,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RecordingState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed_rx.clone()
    }

    pub fn subscribe_transcript(&self) -> watch::Receiver<String> {
        self.transcript_tx.subscribe()
    }

    pub fn subscribe_translated(&self) -> watch::Receiver<String> {
        self.debouncer.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<StatusNotice> {
        self.notice_tx.subscribe()
    }

    pub async fn state(&self) -> RecordingState {
        self.inner.lock().await.state
    }

    pub async fn selection(&self) -> LanguageSelection {
        self.inner.lock().await.selection.clone()
    }

    pub async fn transcript(&self) -> String {
        self.inner.lock().await.transcript.clone()
    }

    pub fn translated(&self) -> String {
        self.debouncer.translated()
    }

    fn notify(&self, kind: NoticeKind, message: impl Into<String>) {
        let _ = self.notice_tx.send(StatusNotice::new(kind, message));
    }

    /// Starts a recording session: acquires the capture device, opens a
    /// recognition stream for the current input language, resets the
    /// transcript and the clock, and enters `Recording`.
    ///
    /// On failure the machine stays in `Idle` and a notice is emitted; a
    /// capture failure is recoverable and the caller may simply retry.
    pub async fn start(&self) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().await;
        if inner.state != RecordingState::Idle {
            return Err(CoordinatorError::AlreadyActive);
        }

        let input_tag = inner.selection.input_tag.clone();

        let mut capture = match self.capture.acquire().await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("audio capture unavailable: {e}");
                self.notify(
                    NoticeKind::CaptureFailed,
                    format!("Cannot access the microphone: {e}"),
                );
                return Err(e.into());
            }
        };

        let (stream, events) = match self.recognizer.open(&input_tag).await {
            Ok(pair) => pair,
            Err(e) => {
                // The device is handed back on every exit path.
                if let Err(re) = capture.release().await {
                    log::warn!("capture release failed after recognizer error: {re:#}");
                }
                log::error!("recognition stream failed to open: {e:#}");
                self.notify(
                    NoticeKind::RecognitionFault,
                    format!("Speech recognition unavailable: {e}"),
                );
                return Err(CoordinatorError::Recognizer(e));
            }
        };

        inner.session_id = inner.session_id.wrapping_add(1);
        let session_id = inner.session_id;

        inner.accumulator.reset();
        inner.transcript.clear();
        let _ = self.transcript_tx.send(String::new());

        inner.clock.start();
        let pump_task = self.spawn_pump(session_id, input_tag.clone(), events);
        inner.session = Some(ActiveSession {
            input_tag: input_tag.clone(),
            capture,
            stream,
            pump_task,
        });
        inner.state = RecordingState::Recording;
        let _ = self.state_tx.send(RecordingState::Recording);
        drop(inner);

        log::info!("session stage: idle -> recording (input language {input_tag})");
        let spoken = input_display_name(&input_tag)
            .map(str::to_string)
            .unwrap_or_else(|| input_tag.clone());
        self.notify(
            NoticeKind::RecordingStarted,
            format!("Recording started. Speak now in {spoken}."),
        );

        if let Some(max) = self.cfg.max_recording {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(max).await;
                let expired = {
                    let inner = this.inner.lock().await;
                    inner.state == RecordingState::Recording && inner.session_id == session_id
                };
                if expired {
                    log::info!("max recording duration reached; stopping session");
                    this.stop().await;
                }
            });
        }

        Ok(())
    }

    /// Stops the current session. No-op (without notification) when not
    /// recording. Closes the recognition stream, stops the clock and releases
    /// the capture device, in that order; the device is released even when
    /// the stream refuses to close. The machine passes through `Transcribing`
    /// while the closing stream drains, then lands in `Idle`.
    pub async fn stop(&self) {
        let (mut session, session_id) = {
            let mut inner = self.inner.lock().await;
            if inner.state != RecordingState::Recording {
                return;
            }
            let Some(session) = inner.session.take() else {
                // Recording without a session should not happen; recover.
                inner.state = RecordingState::Idle;
                let _ = self.state_tx.send(RecordingState::Idle);
                return;
            };
            inner.state = RecordingState::Transcribing;
            let _ = self.state_tx.send(RecordingState::Transcribing);
            (session, inner.session_id)
        };
        log::info!("session stage: recording -> transcribing");

        if let Err(e) = session.stream.stop().await {
            log::warn!("recognition stream close failed: {e:#}");
        }

        {
            let mut inner = self.inner.lock().await;
            inner.clock.stop();
        }

        if let Err(e) = session.capture.release().await {
            log::warn!("capture release failed: {e:#}");
        }

        // Let the pump drain whatever the closing stream still delivers; a
        // final fragment that was already in flight is applied, a pending
        // interim is not promoted.
        if tokio::time::timeout(self.cfg.stop_drain_timeout, &mut session.pump_task)
            .await
            .is_err()
        {
            log::warn!("recognition stream drain timed out; aborting event pump");
            session.pump_task.abort();
            self.notify(
                NoticeKind::Warning,
                "Recognition stream did not close cleanly; the transcript may be incomplete.",
            );
        }

        let update = {
            let mut inner = self.inner.lock().await;
            let update = if inner.session_id == session_id {
                inner.accumulator.discard_interim();
                let text = inner.accumulator.text();
                if inner.transcript != text {
                    inner.transcript = text.clone();
                    let _ = self.transcript_tx.send(text.clone());
                    Some((text, session.input_tag.clone(), inner.selection.output_code.clone()))
                } else {
                    None
                }
            } else {
                None
            };
            inner.state = RecordingState::Idle;
            let _ = self.state_tx.send(RecordingState::Idle);
            update
        };
        log::info!("session stage: transcribing -> idle");

        if let Some((text, source, target)) = update {
            self.debouncer.on_input_changed(&text, &source, &target);
        }
        self.notify(NoticeKind::RecordingStopped, "Recording stopped.");
    }

    /// Resets transcript and translated text to empty. Rejected silently
    /// while recording: during capture the accumulator is the only
    /// transcript writer.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == RecordingState::Recording {
            return;
        }
        inner.session_id = inner.session_id.wrapping_add(1);
        inner.accumulator.reset();
        inner.transcript.clear();
        let _ = self.transcript_tx.send(String::new());
        self.debouncer.reset_output();
    }

    /// Takes effect on the next session; an in-progress recognition stream
    /// keeps the tag it was opened with.
    pub async fn set_input_language(&self, tag: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.selection.input_tag = tag.into();
    }

    /// Changing the output language while a transcript exists re-issues the
    /// translation immediately, mid-recording included.
    pub async fn set_output_language(&self, code: impl Into<String>) {
        let code = code.into();
        let update = {
            let mut inner = self.inner.lock().await;
            if inner.selection.output_code == code {
                None
            } else {
                inner.selection.output_code = code.clone();
                let source = inner
                    .session
                    .as_ref()
                    .map(|s| s.input_tag.clone())
                    .unwrap_or_else(|| inner.selection.input_tag.clone());
                Some((inner.transcript.clone(), source))
            }
        };
        if let Some((text, source)) = update {
            self.debouncer.on_input_changed(&text, &source, &code);
        }
    }

    /// Manual transcript edits are allowed at rest only; while recording the
    /// accumulator is the single writer and the edit is silently dropped.
    pub async fn set_transcript(&self, text: impl Into<String>) {
        let text = text.into();
        let (source, target) = {
            let mut inner = self.inner.lock().await;
            if inner.state == RecordingState::Recording {
                return;
            }
            if inner.transcript == text {
                return;
            }
            inner.transcript = text.clone();
            let _ = self.transcript_tx.send(text.clone());
            (
                inner.selection.input_tag.clone(),
                inner.selection.output_code.clone(),
            )
        };
        self.debouncer.on_input_changed(&text, &source, &target);
    }

    fn spawn_pump(
        &self,
        session_id: u64,
        input_tag: String,
        mut events: mpsc::Receiver<RecognitionEvent>,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(evt) = events.recv().await {
                match evt {
                    RecognitionEvent::Fragment(fragment) => {
                        let update = {
                            let mut inner = this.inner.lock().await;
                            if inner.session_id != session_id {
                                return;
                            }
                            inner.accumulator.apply(&fragment);
                            let text = inner.accumulator.text();
                            if inner.transcript == text {
                                None
                            } else {
                                inner.transcript = text.clone();
                                let _ = this.transcript_tx.send(text.clone());
                                Some((text, inner.selection.output_code.clone()))
                            }
                        };
                        if let Some((text, target)) = update {
                            this.debouncer.on_input_changed(&text, &input_tag, &target);
                        }
                    }
                    RecognitionEvent::Error { message } => {
                        {
                            let inner = this.inner.lock().await;
                            if inner.session_id != session_id {
                                return;
                            }
                        }
                        log::error!("recognition error, ending session: {message}");
                        this.notify(
                            NoticeKind::RecognitionFault,
                            format!("Speech recognition error: {message}"),
                        );
                        // Session-ending by default: the stream cannot be
                        // restarted mid-session without losing audio.
                        let this = this.clone();
                        tokio::spawn(async move { this.stop().await });
                        return;
                    }
                }
            }
        })
    }
}
