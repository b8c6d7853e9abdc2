use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_input_language")]
    pub input_language: String,
    #[serde(default = "default_output_language")]
    pub output_language: String,

    #[serde(default = "default_translator_base_url")]
    pub translator_base_url: String,
    // Secrets are optional here: public LibreTranslate instances don't need one.
    #[serde(default)]
    pub translator_api_key: Option<String>,

    #[serde(default = "default_recognizer_ws_url")]
    pub recognizer_ws_url: String,

    #[serde(default)]
    pub microphone_device: Option<String>,

    #[serde(default = "default_max_recording_secs")]
    pub max_recording_secs: u64,
}

fn default_input_language() -> String {
    "nl-NL".into()
}

fn default_output_language() -> String {
    "nl".into()
}

fn default_translator_base_url() -> String {
    "http://localhost:5000".into()
}

fn default_recognizer_ws_url() -> String {
    "ws://localhost:2700/v1/stream".into()
}

fn default_max_recording_secs() -> u64 {
    120
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_language: default_input_language(),
            output_language: default_output_language(),
            translator_base_url: default_translator_base_url(),
            translator_api_key: None,
            recognizer_ws_url: default_recognizer_ws_url(),
            microphone_device: None,
            max_recording_secs: default_max_recording_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<AppConfig> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("read config: {}", self.path.display()))?;
        let cfg: AppConfig = serde_json::from_slice(&bytes).context("decode config JSON")?;
        Ok(cfg)
    }

    /// Loads the config, falling back to defaults when the file is absent.
    pub fn load_or_default(&self) -> anyhow::Result<AppConfig> {
        if !self.path.exists() {
            return Ok(AppConfig::default());
        }
        self.load()
    }

    pub fn save(&self, cfg: &AppConfig) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(cfg).context("encode config JSON")?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create config directory: {}", parent.display()))?;
        }

        // Atomic-ish write: write temp then replace.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("write temp: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace file: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::at_path(path);

        let cfg = AppConfig {
            input_language: "en-US".into(),
            output_language: "de".into(),
            translator_base_url: "https://translate.example.com".into(),
            translator_api_key: Some("k".into()),
            recognizer_ws_url: "ws://stt.example.com/v1/stream".into(),
            microphone_device: Some("USB Microphone".into()),
            max_recording_secs: 60,
        };

        store.save(&cfg).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at_path(dir.path().join("absent.json"));
        let cfg = store.load_or_default().unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.input_language, "nl-NL");
        assert_eq!(cfg.max_recording_secs, 120);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, br#"{"output_language":"en"}"#).unwrap();

        let cfg = ConfigStore::at_path(path).load().unwrap();
        assert_eq!(cfg.output_language, "en");
        assert_eq!(cfg.input_language, "nl-NL");
        assert_eq!(cfg.translator_api_key, None);
    }
}
