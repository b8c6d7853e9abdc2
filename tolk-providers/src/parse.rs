use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TranslateResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: String,
}

pub fn parse_translate_response(body: &[u8]) -> anyhow::Result<String> {
    let resp: TranslateResponse =
        serde_json::from_slice(body).context("decode translation JSON")?;
    Ok(resp.translated_text)
}

#[derive(Debug, Deserialize)]
struct TranslateErrorBody {
    error: String,
}

/// Failure bodies are `{"error": "..."}`; anything else yields `None` and the
/// caller falls back to the raw body.
pub fn parse_translate_error(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<TranslateErrorBody>(body)
        .ok()
        .map(|e| e.error)
}
