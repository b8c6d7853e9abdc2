use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use tolk_core::config::ConfigStore;
use tolk_core::transcript::Fragment;
use tolk_core::types::LanguageSelection;
use tolk_engine::coordinator::{CoordinatorConfig, RecordingCoordinator};
use tolk_engine::traits::{
    AudioCapture, CaptureHandle, CaptureUnavailable, RecognitionEvent, RecognitionStream,
    SpeechRecognizer, Translator,
};
use tolk_providers::recognizer::{
    RecognizerConfig, RecognizerEvent, RecognizerHandle, open_stream, pcm_s16le_from_f32,
};
use tolk_providers::translate::{TranslatorConfig, translate_text};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mode = std::env::args().nth(1).unwrap_or_default();
    match mode.as_str() {
        "" | "demo" => run_scripted().await,
        "live" => run_live().await,
        other => Err(anyhow::anyhow!(
            "unknown mode: {other} (expected \"demo\" or \"live\")"
        )),
    }
}

// ---------------------------------------------------------------------------
// Scripted demo: mock capabilities, no devices or network required.

struct GrantedCapture;
struct NoopCaptureHandle;

#[async_trait]
impl CaptureHandle for NoopCaptureHandle {
    async fn release(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AudioCapture for GrantedCapture {
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>, CaptureUnavailable> {
        Ok(Box::new(NoopCaptureHandle))
    }
}

/// Replays a fixed fragment sequence, one every 400ms.
struct ScriptedRecognizer {
    script: Vec<Fragment>,
}

struct ScriptedStream {
    feeder: Option<tokio::task::JoinHandle<()>>,
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn open(
        &self,
        language: &str,
    ) -> anyhow::Result<(Box<dyn RecognitionStream>, mpsc::Receiver<RecognitionEvent>)> {
        log::info!("scripted recognition stream opened ({language})");
        let (tx, rx) = mpsc::channel(16);
        let script = self.script.clone();
        let feeder = tokio::spawn(async move {
            for fragment in script {
                tokio::time::sleep(Duration::from_millis(400)).await;
                if tx.send(RecognitionEvent::Fragment(fragment)).await.is_err() {
                    return;
                }
            }
        });
        Ok((Box::new(ScriptedStream { feeder: Some(feeder) }), rx))
    }
}

#[async_trait]
impl RecognitionStream for ScriptedStream {
    async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        Ok(())
    }
}

/// Marks output with the target language instead of really translating.
struct MarkedTranslator;

#[async_trait]
impl Translator for MarkedTranslator {
    async fn translate(&self, text: &str, _source: &str, target: &str) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_millis(120)).await;
        Ok(format!("[{target}] {text}"))
    }
}

async fn run_scripted() -> anyhow::Result<()> {
    let recognizer = ScriptedRecognizer {
        script: vec![
            Fragment::interim("Hel"),
            Fragment::interim("Hello every"),
            Fragment::finalized("Hello everyone"),
            Fragment::interim("welcome to"),
            Fragment::finalized("welcome to the demo"),
        ],
    };

    let coordinator = RecordingCoordinator::new(
        Arc::new(GrantedCapture),
        Arc::new(recognizer),
        Arc::new(MarkedTranslator),
        LanguageSelection::new("en-US", "nl"),
        CoordinatorConfig::default(),
    );

    spawn_observers(&coordinator);

    coordinator.start().await?;
    tokio::time::sleep(Duration::from_secs(3)).await;

    coordinator.set_output_language("de").await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    coordinator.stop().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("final transcript : {}", coordinator.transcript().await);
    println!("final translation: {}", coordinator.translated());
    Ok(())
}

// ---------------------------------------------------------------------------
// Live mode: cpal microphone -> websocket recognizer -> HTTP translator.

/// Shared plumbing between the capture callback and the recognizer stream.
/// The callback only forwards chunks while a stream handle is installed.
#[derive(Default)]
struct LiveAudioFeed {
    recognizer_handle: std::sync::Mutex<Option<RecognizerHandle>>,
    sample_rate_hz: AtomicU32,
}

struct CpalCapture {
    device: Option<String>,
    feed: Arc<LiveAudioFeed>,
}

struct CpalCaptureHandle {
    mic: Option<tolk_audio::MicCapture>,
}

fn map_capture_error(e: tolk_audio::CaptureError) -> CaptureUnavailable {
    match e {
        tolk_audio::CaptureError::PermissionDenied => CaptureUnavailable::PermissionDenied,
        tolk_audio::CaptureError::NoInputDevice => CaptureUnavailable::NoDevice,
        other => CaptureUnavailable::Other(other.to_string()),
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>, CaptureUnavailable> {
        let device = self.device.clone();

        // CPAL setup blocks on device negotiation; keep it off async threads.
        let mic = tokio::task::spawn_blocking(move || {
            tolk_audio::MicCapture::open_named(device.as_deref())
        })
        .await
        .map_err(|e| CaptureUnavailable::Other(e.to_string()))?
        .map_err(map_capture_error)?;

        self.feed
            .sample_rate_hz
            .store(mic.sample_rate_hz(), Ordering::SeqCst);

        let feed = self.feed.clone();
        mic.set_chunk_callback(move |chunk| {
            let guard = match feed.recognizer_handle.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(handle) = guard.as_ref() {
                // Best-effort: the recognizer surfaces sustained drops itself.
                let _ = handle.try_send_audio_chunk(pcm_s16le_from_f32(chunk));
            }
        });

        mic.start().map_err(map_capture_error)?;
        Ok(Box::new(CpalCaptureHandle { mic: Some(mic) }))
    }
}

#[async_trait]
impl CaptureHandle for CpalCaptureHandle {
    async fn release(&mut self) -> anyhow::Result<()> {
        if let Some(mic) = self.mic.take() {
            let _ = mic.stop();
            mic.close()?;
        }
        Ok(())
    }
}

struct WsRecognizer {
    ws_url: Url,
    feed: Arc<LiveAudioFeed>,
}

struct WsRecognitionStream {
    handle: RecognizerHandle,
    feed: Arc<LiveAudioFeed>,
}

#[async_trait]
impl SpeechRecognizer for WsRecognizer {
    async fn open(
        &self,
        language: &str,
    ) -> anyhow::Result<(Box<dyn RecognitionStream>, mpsc::Receiver<RecognitionEvent>)> {
        let sample_rate = match self.feed.sample_rate_hz.load(Ordering::SeqCst) {
            0 => 16_000,
            rate => rate,
        };
        let cfg = RecognizerConfig::new(self.ws_url.clone(), sample_rate).with_language(language);
        let (handle, mut events) = open_stream(cfg).await?;

        {
            let mut guard = match self.feed.recognizer_handle.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Some(handle.clone());
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(evt) = events.recv().await {
                let mapped = match evt {
                    RecognizerEvent::Started { stream_id } => {
                        log::info!("recognition stream started: {stream_id}");
                        continue;
                    }
                    RecognizerEvent::Fragment(fragment) => RecognitionEvent::Fragment(fragment),
                    RecognizerEvent::Warning { kind, message } => {
                        log::warn!("recognizer warning ({kind}): {message}");
                        continue;
                    }
                    RecognizerEvent::Error { kind, message } => RecognitionEvent::Error {
                        message: format!("{kind}: {message}"),
                    },
                };
                if tx.send(mapped).await.is_err() {
                    break;
                }
            }
        });

        Ok((
            Box::new(WsRecognitionStream {
                handle,
                feed: self.feed.clone(),
            }),
            rx,
        ))
    }
}

#[async_trait]
impl RecognitionStream for WsRecognitionStream {
    async fn stop(&mut self) -> anyhow::Result<()> {
        // Stop feeding first so the audio callback cannot race the close.
        {
            let mut guard = match self.feed.recognizer_handle.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = None;
        }
        self.handle.stop().await;
        Ok(())
    }
}

struct HttpTranslator {
    cfg: TranslatorConfig,
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
        translate_text(&self.cfg, text, source, target).await
    }
}

async fn run_live() -> anyhow::Result<()> {
    let config_path = std::env::var("TOLK_CONFIG").unwrap_or_else(|_| "tolk.json".into());
    let cfg = ConfigStore::at_path(&config_path)
        .load_or_default()
        .with_context(|| format!("load config: {config_path}"))?;

    let ws_url = Url::parse(&cfg.recognizer_ws_url).context("parse recognizer_ws_url")?;

    let feed = Arc::new(LiveAudioFeed::default());
    let capture = Arc::new(CpalCapture {
        device: cfg.microphone_device.clone(),
        feed: feed.clone(),
    });
    let recognizer = Arc::new(WsRecognizer {
        ws_url,
        feed: feed.clone(),
    });

    let mut translator_cfg = TranslatorConfig::new(cfg.translator_base_url.clone());
    if let Some(key) = cfg.translator_api_key.clone() {
        translator_cfg = translator_cfg.with_api_key(key);
    }
    let translator = Arc::new(HttpTranslator {
        cfg: translator_cfg,
    });

    let coordinator = RecordingCoordinator::new(
        capture,
        recognizer,
        translator,
        LanguageSelection::new(cfg.input_language.clone(), cfg.output_language.clone()),
        CoordinatorConfig {
            max_recording: (cfg.max_recording_secs > 0)
                .then(|| Duration::from_secs(cfg.max_recording_secs)),
            ..Default::default()
        },
    );

    spawn_observers(&coordinator);

    coordinator.start().await?;
    println!("Recording. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;

    coordinator.stop().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("final transcript : {}", coordinator.transcript().await);
    println!("final translation: {}", coordinator.translated());
    Ok(())
}

// ---------------------------------------------------------------------------

fn spawn_observers(coordinator: &RecordingCoordinator) {
    let mut state_rx = coordinator.subscribe_state();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            println!("state      : {}", state.label());
        }
    });

    let mut transcript_rx = coordinator.subscribe_transcript();
    tokio::spawn(async move {
        while transcript_rx.changed().await.is_ok() {
            let text = transcript_rx.borrow_and_update().clone();
            println!("transcript : {text}");
        }
    });

    let mut translated_rx = coordinator.subscribe_translated();
    tokio::spawn(async move {
        while translated_rx.changed().await.is_ok() {
            let text = translated_rx.borrow_and_update().clone();
            println!("translated : {text}");
        }
    });

    let mut elapsed_rx = coordinator.subscribe_elapsed();
    tokio::spawn(async move {
        while elapsed_rx.changed().await.is_ok() {
            let secs = *elapsed_rx.borrow_and_update();
            println!("elapsed    : {secs}s");
        }
    });

    let mut notices = coordinator.subscribe_notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            println!("notice     : {}", notice.message);
        }
    });
}
