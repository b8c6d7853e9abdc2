pub mod capture;

pub use capture::{CaptureError, MicCapture};
