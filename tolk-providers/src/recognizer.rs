use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, anyhow};
use base64::Engine;
use futures_util::{SinkExt, StreamExt, future};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};
use url::Url;

use tolk_core::transcript::Fragment;

const WS_SEND_TIMEOUT: Duration = Duration::from_secs(3);

// After a stop we keep reading briefly: a final fragment that was already in
// flight may still land. Stopping never asks the server to finalize anything.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

fn should_emit_backpressure_warning(dropped: u64) -> bool {
    // Emit on first drop, then periodically.
    dropped > 0 && (dropped == 1 || dropped % 50 == 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerConfig {
    pub ws_url: Url,

    // Query params understood by the streaming endpoint.
    pub language: Option<String>,
    pub sample_rate_hz: u32,

    pub connect_timeout: Duration,
}

impl RecognizerConfig {
    pub fn new(ws_url: Url, sample_rate_hz: u32) -> Self {
        Self {
            ws_url,
            language: None,
            sample_rate_hz,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_language(mut self, tag: impl Into<String>) -> Self {
        self.language = Some(tag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    Started { stream_id: String },
    Fragment(Fragment),
    Warning { kind: String, message: String },
    Error { kind: String, message: String },
}

#[derive(Debug)]
enum StreamCmd {
    AudioChunk { pcm_s16le: Vec<u8> },
    Stop,
}

#[derive(Clone)]
pub struct RecognizerHandle {
    tx: mpsc::Sender<StreamCmd>,
}

impl RecognizerHandle {
    pub fn try_send_audio_chunk(&self, pcm_s16le: Vec<u8>) -> bool {
        self.tx
            .try_send(StreamCmd::AudioChunk { pcm_s16le })
            .is_ok()
    }

    pub async fn send_audio_chunk(&self, pcm_s16le: Vec<u8>) -> bool {
        self.tx
            .send(StreamCmd::AudioChunk { pcm_s16le })
            .await
            .is_ok()
    }

    /// Closes the stream. The event channel ends once the server side has
    /// flushed anything already in flight (bounded by a short drain window).
    pub async fn stop(&self) {
        let _ = self.tx.send(StreamCmd::Stop).await;
    }
}

pub async fn open_stream(
    cfg: RecognizerConfig,
) -> anyhow::Result<(RecognizerHandle, mpsc::Receiver<RecognizerEvent>)> {
    let url = build_stream_url(&cfg);

    // `IntoClientRequest` isn't implemented for `url::Url` in tungstenite 0.26
    // without extra features; convert to string-ish form first.
    let req = url
        .as_str()
        .into_client_request()
        .context("build websocket request")?;

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<StreamCmd>(64);
    let (evt_tx, evt_rx) = mpsc::channel::<RecognizerEvent>(64);

    // Connect with a hard timeout so we can't hang on a bad network.
    let (ws, _resp) =
        tokio::time::timeout(cfg.connect_timeout, tokio_tungstenite::connect_async(req))
            .await
            .map_err(|_| anyhow!("recognizer connect timed out"))?
            .context("connect recognizer websocket")?;

    let (ws_write, mut ws_read) = ws.split();

    // Writer task: keeps reads responsive by ensuring we never await socket
    // writes in the session loop.
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
    tokio::spawn(async move {
        let mut ws_write = ws_write;
        while let Some(msg) = out_rx.recv().await {
            let res = tokio::time::timeout(WS_SEND_TIMEOUT, ws_write.send(msg)).await;
            if !matches!(res, Ok(Ok(()))) {
                break;
            }
        }

        let _ = ws_write.send(Message::Close(None)).await;
    });

    let sample_rate_hz = cfg.sample_rate_hz;
    tokio::spawn(async move {
        let mut dropped_outbound_audio_chunks: u64 = 0;
        let mut stop_drain_sleep: Option<Pin<Box<tokio::time::Sleep>>> = None;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv(), if stop_drain_sleep.is_none() => {
                    let Some(cmd) = cmd else { break; };
                    match cmd {
                        StreamCmd::AudioChunk { pcm_s16le } => {
                            let frame = build_audio_chunk_frame(&pcm_s16le, sample_rate_hz);
                            match out_tx.try_send(Message::Text(frame.into())) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(_)) => {
                                    // Best-effort: drop the chunk rather than stalling reads.
                                    // Surface it so this isn't silent.
                                    dropped_outbound_audio_chunks =
                                        dropped_outbound_audio_chunks.saturating_add(1);
                                    if should_emit_backpressure_warning(dropped_outbound_audio_chunks) {
                                        let _ = evt_tx.try_send(RecognizerEvent::Warning {
                                            kind: "client_backpressure".into(),
                                            message: format!(
                                                "recognizer backpressure: dropped {dropped_outbound_audio_chunks} audio chunks; transcript may be incomplete."
                                            ),
                                        });
                                    }
                                }
                                Err(mpsc::error::TrySendError::Closed(_)) => {
                                    let _ = evt_tx.try_send(RecognizerEvent::Error {
                                        kind: "disconnect".into(),
                                        message: "websocket closed".into(),
                                    });
                                    break;
                                }
                            }
                        }
                        StreamCmd::Stop => {
                            // An in-band stop frame, not a websocket close: the
                            // server flushes anything pending and closes from
                            // its side, so in-flight finals still arrive.
                            let _ = out_tx.try_send(Message::Text(build_stop_frame().into()));
                            stop_drain_sleep = Some(Box::pin(tokio::time::sleep(STOP_DRAIN_TIMEOUT)));
                        }
                    }
                }

                msg = ws_read.next() => {
                    let Some(msg) = msg else { break; };
                    let msg = match msg {
                        Ok(m) => m,
                        Err(_) => {
                            if stop_drain_sleep.is_none() {
                                let _ = evt_tx.send(RecognizerEvent::Error {
                                    kind: "disconnect".into(),
                                    message: "websocket read failed".into(),
                                }).await;
                            }
                            break;
                        }
                    };

                    let text = match msg {
                        Message::Text(t) => t.to_string(),
                        Message::Binary(b) => String::from_utf8_lossy(&b).to_string(),
                        Message::Close(_) => break,
                        Message::Ping(p) => {
                            let _ = out_tx.try_send(Message::Pong(p));
                            continue;
                        }
                        Message::Pong(_) => continue,
                        _ => continue,
                    };

                    match parse_stream_message(&text) {
                        Ok(ParsedStream::Started { stream_id }) => {
                            let _ = evt_tx.send(RecognizerEvent::Started { stream_id }).await;
                        }
                        Ok(ParsedStream::Partial { text }) => {
                            let _ = evt_tx.send(RecognizerEvent::Fragment(Fragment {
                                text,
                                is_final: false,
                            })).await;
                        }
                        Ok(ParsedStream::Final { text }) => {
                            let _ = evt_tx.send(RecognizerEvent::Fragment(Fragment {
                                text,
                                is_final: true,
                            })).await;
                        }
                        Ok(ParsedStream::Error { kind, message }) => {
                            let _ = evt_tx.send(RecognizerEvent::Error { kind, message }).await;
                            // Session-level errors are fatal for the stream.
                            break;
                        }
                        Err(_) => {
                            // Ignore unknown/bad frames.
                        }
                    }
                }

                _ = async {
                    if let Some(s) = stop_drain_sleep.as_mut() {
                        s.as_mut().await;
                    } else {
                        future::pending::<()>().await;
                    }
                } => {
                    break;
                }
            }
        }

        // `evt_tx` drops here; consumers observe the stream end.
    });

    Ok((RecognizerHandle { tx: cmd_tx }, evt_rx))
}

fn build_stream_url(cfg: &RecognizerConfig) -> Url {
    let mut url = cfg.ws_url.clone();
    {
        let mut qp = url.query_pairs_mut();
        qp.append_pair("audio_format", "pcm_s16le");
        qp.append_pair("sample_rate", &cfg.sample_rate_hz.to_string());

        let lang = cfg
            .language
            .as_ref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());

        if let Some(lang) = lang {
            qp.append_pair("language", lang);
        }
    }
    url
}

fn build_stop_frame() -> String {
    serde_json::json!({ "type": "stop" }).to_string()
}

fn build_audio_chunk_frame(pcm_s16le: &[u8], sample_rate_hz: u32) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(pcm_s16le);
    serde_json::json!({
        "type": "audio_chunk",
        "audio_base_64": b64,
        "sample_rate": sample_rate_hz,
    })
    .to_string()
}

/// Converts mono float samples to PCM16 little-endian bytes for the wire.
pub fn pcm_s16le_from_f32(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = s.clamp(-1.0, 1.0);
        let i = (v * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&i.to_le_bytes());
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedStream {
    Started { stream_id: String },
    Partial { text: String },
    Final { text: String },
    Error { kind: String, message: String },
}

fn parse_stream_message(s: &str) -> anyhow::Result<ParsedStream> {
    let v: serde_json::Value = serde_json::from_str(s).context("decode stream json")?;
    let t = v
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing type"))?;

    match t {
        "started" => {
            let stream_id = v
                .get("stream_id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            Ok(ParsedStream::Started { stream_id })
        }
        "partial_transcript" => {
            let text = v.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
            Ok(ParsedStream::Partial { text })
        }
        "final_transcript" => {
            let text = v.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
            Ok(ParsedStream::Final { text })
        }
        // Error family: treat as fatal for the stream.
        "error" | "auth_error" | "quota_exceeded" | "rate_limited" | "input_error"
        | "transcriber_error" => {
            let message = v
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            Ok(ParsedStream::Error {
                kind: t.to_string(),
                message,
            })
        }
        other => Err(anyhow!("unknown type: {other}")),
    }
}
