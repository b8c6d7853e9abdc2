//
// Minimal CPAL-based microphone capture.
//
// The capture side only has to hand live mono chunks to a callback while a
// session is active; the streaming recognizer consumes them at the device
// sample rate, so no buffering or resampling happens here.

use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone access denied")]
    PermissionDenied,

    #[error("no input device found")]
    NoInputDevice,

    #[error("failed to list input devices: {0}")]
    ListDevices(#[from] cpal::DevicesError),

    #[error("failed to get default config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("audio worker failed: {0}")]
    Worker(String),

    #[error("audio worker startup timeout")]
    WorkerTimeout,

    #[error("internal channel error")]
    Channel,
}

// CPAL reports OS permission refusals through build/play error strings, not
// a dedicated variant. Classify at construction so callers can branch on it.
fn worker_error(msg: String) -> CaptureError {
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("access denied") || lower.contains("not authorized") {
        return CaptureError::PermissionDenied;
    }
    CaptureError::Worker(msg)
}

type ChunkCallback = Arc<dyn Fn(&[f32]) + Send + Sync + 'static>;

pub struct MicCapture {
    cmd_tx: mpsc::Sender<Cmd>,
    worker_handle: Option<std::thread::JoinHandle<()>>,
    sample_rate_hz: u32,
    chunk_cb: Arc<Mutex<Option<ChunkCallback>>>,
}

enum Cmd {
    Start,
    Stop,
    Shutdown,
}

enum WorkerMsg {
    Ready,
    Error(String),
}

impl MicCapture {
    pub fn list_input_device_names() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let mut out = Vec::new();
        for dev in host.input_devices()? {
            if let Ok(name) = dev.name() {
                out.push(name);
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    pub fn open_named(device_name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        if let Some(needle) = device_name {
            let needle = needle.trim();
            if !needle.is_empty() {
                if let Ok(devices) = host.input_devices() {
                    for dev in devices {
                        if let Ok(name) = dev.name() {
                            if name == needle {
                                log::info!("Using input device: {name}");
                                return Self::open(Some(dev));
                            }
                        }
                    }
                }

                log::warn!("Preferred input device not found, falling back to default: {needle}");
            }
        }

        Self::open_default()
    }

    pub fn open_default() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;
        Self::open(Some(device))
    }

    pub fn open(device: Option<Device>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device {
            Some(d) => d,
            None => host
                .default_input_device()
                .ok_or(CaptureError::NoInputDevice)?,
        };

        let default_cfg = device.default_input_config()?;
        let sample_rate_hz = default_cfg.sample_rate().0;

        let (sample_tx, sample_rx) = mpsc::channel::<Vec<f32>>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Cmd>();
        let (worker_tx, worker_rx) = mpsc::channel::<WorkerMsg>();

        let chunk_cb: Arc<Mutex<Option<ChunkCallback>>> = Arc::new(Mutex::new(None));
        let chunk_cb_worker = chunk_cb.clone();

        let worker_handle = std::thread::spawn(move || {
            let config = default_cfg;
            let sample_format = config.sample_format();
            let channels = config.channels() as usize;

            let stream = match sample_format {
                SampleFormat::F32 => {
                    build_input_stream::<f32>(&device, &config.clone().into(), channels, sample_tx)
                }
                SampleFormat::I16 => {
                    build_input_stream::<i16>(&device, &config.clone().into(), channels, sample_tx)
                }
                SampleFormat::U16 => {
                    build_input_stream::<u16>(&device, &config.clone().into(), channels, sample_tx)
                }
                SampleFormat::I8 => {
                    build_input_stream::<i8>(&device, &config.clone().into(), channels, sample_tx)
                }
                SampleFormat::U8 => {
                    build_input_stream::<u8>(&device, &config.clone().into(), channels, sample_tx)
                }
                SampleFormat::I32 => {
                    build_input_stream::<i32>(&device, &config.clone().into(), channels, sample_tx)
                }
                SampleFormat::U32 => {
                    build_input_stream::<u32>(&device, &config.clone().into(), channels, sample_tx)
                }
                SampleFormat::F64 => {
                    build_input_stream::<f64>(&device, &config.clone().into(), channels, sample_tx)
                }
                _ => build_input_stream::<f32>(&device, &config.clone().into(), channels, sample_tx),
            };

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = worker_tx.send(WorkerMsg::Error(format!("build stream: {e}")));
                    log::error!("Audio stream build failed: {e}");
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = worker_tx.send(WorkerMsg::Error(format!("play stream: {e}")));
                log::error!("Audio stream play failed: {e}");
                return;
            }

            let _ = worker_tx.send(WorkerMsg::Ready);

            run_consumer(sample_rx, cmd_rx, chunk_cb_worker);
            drop(stream);
        });

        // Block briefly until the worker has either started the stream or failed.
        match worker_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(WorkerMsg::Ready) => {}
            Ok(WorkerMsg::Error(e)) => return Err(worker_error(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(CaptureError::WorkerTimeout),
            Err(_) => return Err(CaptureError::Channel),
        }

        Ok(Self {
            cmd_tx,
            worker_handle: Some(worker_handle),
            sample_rate_hz,
            chunk_cb,
        })
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Installs the live chunk consumer. Set it before `start()`; chunks
    /// arriving with no callback installed are dropped.
    pub fn set_chunk_callback<F>(&self, cb: F)
    where
        F: Fn(&[f32]) + Send + Sync + 'static,
    {
        let mut guard = match self.chunk_cb.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::new(cb));
    }

    pub fn start(&self) -> Result<(), CaptureError> {
        self.cmd_tx.send(Cmd::Start).map_err(|_| CaptureError::Channel)
    }

    pub fn stop(&self) -> Result<(), CaptureError> {
        self.cmd_tx.send(Cmd::Stop).map_err(|_| CaptureError::Channel)
    }

    pub fn close(mut self) -> Result<(), CaptureError> {
        let _ = self.cmd_tx.send(Cmd::Shutdown);
        if let Some(h) = self.worker_handle.take() {
            let _ = h.join();
        }
        Ok(())
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        // `close()` already joined; this covers the non-explicit path.
        let _ = self.cmd_tx.send(Cmd::Shutdown);
        if let Some(h) = self.worker_handle.take() {
            let _ = h.join();
        }
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sample_tx: mpsc::Sender<Vec<f32>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let output_buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let out_buf = output_buffer.clone();

    let cb = move |data: &[T], _: &cpal::InputCallbackInfo| {
        let mut buf = out_buf.lock().unwrap();
        buf.clear();

        if channels == 1 {
            buf.extend(data.iter().map(|&s| s.to_sample::<f32>()));
        } else {
            for frame in data.chunks_exact(channels) {
                let mono =
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / channels as f32;
                buf.push(mono);
            }
        }

        let _ = sample_tx.send(buf.clone());
    };

    device.build_input_stream(
        config,
        cb,
        |err| {
            // These errors are crucial to debug "recording started but silent".
            log::error!("Audio stream error: {err}");
        },
        None,
    )
}

fn run_consumer(
    sample_rx: mpsc::Receiver<Vec<f32>>,
    cmd_rx: mpsc::Receiver<Cmd>,
    chunk_cb: Arc<Mutex<Option<ChunkCallback>>>,
) {
    let mut forwarding = false;

    loop {
        // Always drain commands promptly, even if the stream is stalled.
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Cmd::Start => forwarding = true,
                Cmd::Stop => forwarding = false,
                Cmd::Shutdown => return,
            }
        }

        match sample_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(samples) => {
                if !forwarding {
                    continue;
                }
                let cb = {
                    let guard = match chunk_cb.lock() {
                        Ok(g) => g,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    guard.clone()
                };
                if let Some(cb) = cb {
                    cb(&samples);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // No audio chunk yet; loop around to check commands again.
                continue;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}
