// Drives the coordinator's translation path through the real HTTP provider
// against a mock server, covering both the success and the fallback branch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tolk_core::transcript::Fragment;
use tolk_core::types::LanguageSelection;
use tolk_engine::coordinator::{CoordinatorConfig, RecordingCoordinator};
use tolk_engine::traits::{
    AudioCapture, CaptureHandle, CaptureUnavailable, RecognitionEvent, RecognitionStream,
    SpeechRecognizer, Translator,
};
use tolk_providers::translate::{TranslatorConfig, translate_text};

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

type EventSlot = Arc<tokio::sync::Mutex<Option<mpsc::Sender<RecognitionEvent>>>>;

struct SlotRecognizer {
    slot: EventSlot,
}

struct SlotStream {
    slot: EventSlot,
}

#[async_trait]
impl RecognitionStream for SlotStream {
    async fn stop(&mut self) -> anyhow::Result<()> {
        self.slot.lock().await.take();
        Ok(())
    }
}

#[async_trait]
impl SpeechRecognizer for SlotRecognizer {
    async fn open(
        &self,
        _language: &str,
    ) -> anyhow::Result<(Box<dyn RecognitionStream>, mpsc::Receiver<RecognitionEvent>)> {
        let (tx, rx) = mpsc::channel(16);
        *self.slot.lock().await = Some(tx);
        Ok((Box::new(SlotStream { slot: self.slot.clone() }), rx))
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

async fn emit_final(slot: &EventSlot, text: &str) {
    let tx = {
        let guard = slot.lock().await;
        guard.as_ref().expect("no open stream").clone()
    };
    let _ = tx
        .send(RecognitionEvent::Fragment(Fragment::finalized(text)))
        .await;
}

async fn wait_for_text(rx: &mut watch::Receiver<String>, want: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            rx.changed().await.expect("channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {want:?}, last = {:?}", *rx.borrow()));
}

fn coordinator_against(server_uri: &str, slot: EventSlot) -> RecordingCoordinator {
    RecordingCoordinator::new(
        Arc::new(GrantedCapture),
        Arc::new(SlotRecognizer { slot }),
        Arc::new(HttpTranslator {
            cfg: TranslatorConfig::new(server_uri),
        }),
        LanguageSelection::new("en-US", "nl"),
        CoordinatorConfig::default(),
    )
}

#[tokio::test]
async fn translates_over_http_with_reduced_source_tag() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_partial_json(serde_json::json!({
            "q": "Hello world",
            "source": "en",
            "target": "nl",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"translatedText":"Hallo wereld"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let slot: EventSlot = Arc::new(tokio::sync::Mutex::new(None));
    let coordinator = coordinator_against(&server.uri(), slot.clone());
    let mut translated_rx = coordinator.subscribe_translated();

    coordinator.start().await.unwrap();
    emit_final(&slot, "Hello world").await;
    wait_for_text(&mut translated_rx, "Hallo wereld").await;

    coordinator.stop().await;
}

#[tokio::test]
async fn http_failure_falls_back_to_source_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/translate"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_raw(r#"{"error":"engine overloaded"}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let slot: EventSlot = Arc::new(tokio::sync::Mutex::new(None));
    let coordinator = coordinator_against(&server.uri(), slot.clone());
    let mut translated_rx = coordinator.subscribe_translated();

    coordinator.start().await.unwrap();
    emit_final(&slot, "Hello world").await;

    // Non-success responses are absorbed; the source text is displayed.
    wait_for_text(&mut translated_rx, "Hello world").await;

    coordinator.stop().await;
}
