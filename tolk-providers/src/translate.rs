use crate::parse::{parse_translate_error, parse_translate_response};
use crate::request::{Body, HttpRequest};
use crate::runtime;
use anyhow::anyhow;
use serde_json::json;

/// LibreTranslate-compatible endpoint. The public instances and self-hosted
/// servers share the same `POST /translate` contract; an API key is only
/// required by some deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl TranslatorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

pub fn build_translate_request(
    cfg: &TranslatorConfig,
    text: &str,
    source_lang: &str,
    target_lang: &str,
) -> HttpRequest {
    let url = join_url(&cfg.base_url, "/translate");

    let mut payload = json!({
        "q": text,
        "source": source_lang,
        "target": target_lang,
        "format": "text",
    });

    if let Some(key) = cfg.api_key.as_deref() {
        if let Some(map) = payload.as_object_mut() {
            map.insert("api_key".into(), serde_json::Value::String(key.to_string()));
        }
    }

    HttpRequest {
        method: "POST".into(),
        url,
        headers: vec![("Content-Type".into(), "application/json".into())],
        body: Body::Json(payload.to_string()),
    }
}

/// Builds, sends and decodes one translation call. Non-success statuses are
/// errors; the caller decides the fallback policy.
pub async fn translate_text(
    cfg: &TranslatorConfig,
    text: &str,
    source_lang: &str,
    target_lang: &str,
) -> anyhow::Result<String> {
    let req = build_translate_request(cfg, text, source_lang, target_lang);
    let resp = runtime::execute(&req).await?;

    if !(200..=299).contains(&resp.status) {
        let detail = parse_translate_error(&resp.body)
            .unwrap_or_else(|| String::from_utf8_lossy(&resp.body).into_owned());
        return Err(anyhow!(
            "translation request failed: status={} {}",
            resp.status,
            detail
        ));
    }

    parse_translate_response(&resp.body)
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_trailing_slash() {
        assert_eq!(
            join_url("https://translate.example.com/", "/translate"),
            "https://translate.example.com/translate"
        );
        assert_eq!(
            join_url("https://translate.example.com", "translate"),
            "https://translate.example.com/translate"
        );
    }

    #[test]
    fn builds_json_translate_request() {
        let cfg = TranslatorConfig::new("https://translate.example.com");
        let req = build_translate_request(&cfg, "Hello world", "en", "nl");

        assert_eq!(req.method, "POST");
        assert!(req.url.ends_with("/translate"));
        assert_eq!(req.header("content-type"), Some("application/json"));
        match &req.body {
            Body::Json(s) => {
                let v: serde_json::Value = serde_json::from_str(s).unwrap();
                assert_eq!(v["q"], "Hello world");
                assert_eq!(v["source"], "en");
                assert_eq!(v["target"], "nl");
                assert_eq!(v["format"], "text");
                assert!(v.get("api_key").is_none());
            }
            _ => panic!("expected json body"),
        }
    }

    #[test]
    fn api_key_is_included_when_configured() {
        let cfg = TranslatorConfig::new("https://translate.example.com").with_api_key("k");
        let req = build_translate_request(&cfg, "hi", "en", "de");
        match &req.body {
            Body::Json(s) => {
                let v: serde_json::Value = serde_json::from_str(s).unwrap();
                assert_eq!(v["api_key"], "k");
            }
            _ => panic!("expected json body"),
        }
    }

    #[tokio::test]
    async fn translate_text_round_trips_against_a_mock_server() {
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_partial_json(serde_json::json!({
                "q": "Hello world",
                "source": "en",
                "target": "nl",
                "format": "text",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"translatedText":"Hallo wereld"}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let cfg = TranslatorConfig::new(server.uri());
        let out = translate_text(&cfg, "Hello world", "en", "nl").await.unwrap();
        assert_eq!(out, "Hallo wereld");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error_with_detail() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_raw(r#"{"error":"invalid api key"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let cfg = TranslatorConfig::new(server.uri());
        let err = translate_text(&cfg, "hi", "en", "de").await.err().unwrap();
        let s = err.to_string();
        assert!(s.contains("403"));
        assert!(s.contains("invalid api key"));
    }
}
