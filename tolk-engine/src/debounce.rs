use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use tolk_core::lang::primary_subtag;

use crate::traits::Translator;

/// One issued translation. The sequence number strictly increases per
/// request; a response applies only while its number is still the newest.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TranslationRequest {
    text: String,
    source: String,
    target: String,
    seq: u64,
}

/// Drives the translated rendering of the transcript. Every transcript or
/// output-language change issues a request; two requests may be in flight at
/// once and complete out of order, so last-request-wins is enforced with the
/// sequence counter rather than call-order assumptions.
#[derive(Clone)]
pub struct TranslationDebouncer {
    translator: Arc<dyn Translator>,
    translated_tx: Arc<watch::Sender<String>>,
    seq: Arc<AtomicU64>,
}

impl TranslationDebouncer {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        let (translated_tx, _rx) = watch::channel(String::new());
        Self {
            translator,
            translated_tx: Arc::new(translated_tx),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.translated_tx.subscribe()
    }

    pub fn translated(&self) -> String {
        self.translated_tx.borrow().clone()
    }

    /// Supersedes any in-flight request without issuing a new one.
    pub fn invalidate(&self) {
        self.seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Clears the output and supersedes in-flight requests.
    pub fn reset_output(&self) {
        self.invalidate();
        let _ = self.translated_tx.send(String::new());
    }

    /// Issues a translation for changed input. Empty or whitespace-only text
    /// issues nothing and leaves the output untouched, so brief interim-empty
    /// states don't flash the translation away.
    pub fn on_input_changed(&self, text: &str, source_tag: &str, target_code: &str) {
        if text.trim().is_empty() {
            return;
        }

        let req = TranslationRequest {
            text: text.to_string(),
            source: primary_subtag(source_tag).to_string(),
            target: target_code.to_string(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
        };

        let translator = self.translator.clone();
        let translated_tx = self.translated_tx.clone();
        let latest = self.seq.clone();

        tokio::spawn(async move {
            let out = match translator
                .translate(&req.text, &req.source, &req.target)
                .await
            {
                Ok(t) => t,
                Err(e) => {
                    // Per-request failures never surface as session faults;
                    // show the untranslated source instead.
                    log::warn!("translation failed, falling back to source text: {e:#}");
                    req.text.clone()
                }
            };

            // The staleness check and the write share the channel lock, so a
            // superseded response can never overwrite a newer one.
            translated_tx.send_if_modified(|cur| {
                if latest.load(Ordering::SeqCst) != req.seq {
                    return false;
                }
                if *cur == out {
                    return false;
                }
                *cur = out;
                true
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Completes translations manually, in whatever order the test chooses.
    struct ManualTranslator {
        pending: Mutex<HashMap<String, oneshot::Sender<anyhow::Result<String>>>>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl ManualTranslator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pending: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn complete(&self, text: &str, result: anyhow::Result<String>) {
            let tx = self
                .pending
                .lock()
                .unwrap()
                .remove(text)
                .expect("no pending request for text");
            let _ = tx.send(result);
        }

        fn pending_count(&self) -> usize {
            self.pending.lock().unwrap().len()
        }

        fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Translator for ManualTranslator {
        async fn translate(
            &self,
            text: &str,
            source_lang: &str,
            target_lang: &str,
        ) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push((
                text.to_string(),
                source_lang.to_string(),
                target_lang.to_string(),
            ));
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().insert(text.to_string(), tx);
            rx.await.map_err(|_| anyhow::anyhow!("request dropped"))?
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn empty_input_issues_nothing_and_keeps_output() {
        let translator = ManualTranslator::new();
        let debouncer = TranslationDebouncer::new(translator.clone());
        let mut rx = debouncer.subscribe();

        debouncer.on_input_changed("Hello", "en-US", "nl");
        wait_until(|| translator.pending_count() == 1).await;
        translator.complete("Hello", Ok("Hallo".into()));
        rx.changed().await.unwrap();
        assert_eq!(debouncer.translated(), "Hallo");

        debouncer.on_input_changed("   ", "en-US", "nl");
        debouncer.on_input_changed("", "en-US", "nl");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(translator.pending_count(), 0);
        assert_eq!(debouncer.translated(), "Hallo");
    }

    #[tokio::test]
    async fn source_tag_is_reduced_to_primary_subtag() {
        let translator = ManualTranslator::new();
        let debouncer = TranslationDebouncer::new(translator.clone());

        debouncer.on_input_changed("Hello", "en-US", "de");
        wait_until(|| translator.pending_count() == 1).await;
        translator.complete("Hello", Ok("Hallo".into()));

        let calls = translator.calls();
        assert_eq!(calls, vec![("Hello".into(), "en".into(), "de".into())]);
    }

    #[tokio::test]
    async fn late_response_from_superseded_request_is_discarded() {
        let translator = ManualTranslator::new();
        let debouncer = TranslationDebouncer::new(translator.clone());
        let mut rx = debouncer.subscribe();

        debouncer.on_input_changed("one", "en-US", "nl");
        debouncer.on_input_changed("one two", "en-US", "nl");
        wait_until(|| translator.pending_count() == 2).await;

        // The newer request completes first and wins.
        translator.complete("one two", Ok("een twee".into()));
        rx.changed().await.unwrap();
        assert_eq!(debouncer.translated(), "een twee");

        // The older request completing later must not regress the output.
        translator.complete("one", Ok("een".into()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(debouncer.translated(), "een twee");
    }

    #[tokio::test]
    async fn failure_falls_back_to_source_text() {
        let translator = ManualTranslator::new();
        let debouncer = TranslationDebouncer::new(translator.clone());
        let mut rx = debouncer.subscribe();

        debouncer.on_input_changed("Hello", "en-US", "nl");
        wait_until(|| translator.pending_count() == 1).await;
        translator.complete("Hello", Err(anyhow::anyhow!("network error")));

        rx.changed().await.unwrap();
        assert_eq!(debouncer.translated(), "Hello");
    }

    #[tokio::test]
    async fn stale_failure_fallback_is_also_discarded() {
        let translator = ManualTranslator::new();
        let debouncer = TranslationDebouncer::new(translator.clone());
        let mut rx = debouncer.subscribe();

        debouncer.on_input_changed("one", "en-US", "nl");
        debouncer.on_input_changed("one two", "en-US", "nl");
        wait_until(|| translator.pending_count() == 2).await;

        translator.complete("one two", Ok("een twee".into()));
        rx.changed().await.unwrap();

        // The superseded request fails; its fallback must not apply either.
        translator.complete("one", Err(anyhow::anyhow!("timeout")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(debouncer.translated(), "een twee");
    }

    #[tokio::test]
    async fn invalidate_supersedes_in_flight_requests() {
        let translator = ManualTranslator::new();
        let debouncer = TranslationDebouncer::new(translator.clone());

        debouncer.on_input_changed("Hello", "en-US", "nl");
        wait_until(|| translator.pending_count() == 1).await;

        debouncer.reset_output();
        translator.complete("Hello", Ok("Hallo".into()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(debouncer.translated(), "");
    }
}
