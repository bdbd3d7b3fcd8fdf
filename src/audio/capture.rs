//! Microphone capture via `cpal`, resampled and packed for the wire.
//!
//! [`MicCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`MicCapture::start`] to begin streaming wire-ready PCM chunks (16 kHz
//! mono 16-bit little-endian) over an unbounded tokio channel.  The returned
//! [`CaptureGuard`] is a RAII guard — dropping it stops the stream and
//! releases the device.
//!
//! The cpal callback runs on a dedicated audio thread with a hard timing
//! budget: the downmix → resample → pack chain is linear in the frame size,
//! and the channel send never blocks.  `cpal::Stream` is not `Send` on every
//! platform, so the stream is owned by a worker thread and the guard only
//! carries the shutdown signal.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

use super::resample::{downmix_to_mono, pack_i16_le, resample_linear};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring or running the capture device.
///
/// All of these are fatal at session start — the coordinator aborts the
/// connecting attempt and releases anything partially acquired.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(String),

    #[error("failed to start audio stream: {0}")]
    PlayStream(String),
}

// ---------------------------------------------------------------------------
// CaptureSource / CaptureGuard seams
// ---------------------------------------------------------------------------

/// Source of wire-ready outbound audio chunks.
///
/// Object-safe and `Send + Sync` so the session coordinator can hold it
/// behind an `Arc<dyn CaptureSource>` and tests can substitute a silent
/// double.
pub trait CaptureSource: Send + Sync {
    /// Begin capture, sending packed PCM chunks to `tx`.
    ///
    /// The device stays acquired until the returned guard is dropped.
    fn start(&self, tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<CaptureGuard, CaptureError>;
}

// Compile-time assertion: Box<dyn CaptureSource> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn CaptureSource>) {}
};

/// RAII guard for an active capture stream.
///
/// Dropping it signals the worker thread to drop the cpal stream (releasing
/// the device) and joins the thread.  `Send`, unlike the stream itself.
pub struct CaptureGuard {
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl CaptureGuard {
    /// A guard that owns nothing — used by test capture sources.
    pub fn noop() -> Self {
        Self {
            stop_tx: None,
            join: None,
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // The worker may already be gone; either way the stream drops.
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

// ---------------------------------------------------------------------------
// MicCapture
// ---------------------------------------------------------------------------

/// Production capture source using the system default input device.
///
/// # Example
///
/// ```rust,no_run
/// use tokio::sync::mpsc;
/// use live_grounding::audio::{CaptureSource, MicCapture};
///
/// let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
/// let mic = MicCapture::new(16_000);
/// let _guard = mic.start(tx).unwrap();
/// // `_guard` keeps the stream alive; drop it to release the device.
/// ```
pub struct MicCapture {
    /// Rate (Hz) every chunk is resampled to before packing.
    target_rate: u32,
}

impl MicCapture {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }

    /// Rate the outbound chunks are delivered at.
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

impl CaptureSource for MicCapture {
    /// Acquire the default input device on a worker thread and start
    /// streaming.
    ///
    /// Device acquisition happens on the worker; the result is handed back
    /// synchronously so the caller sees acquisition failures immediately.
    fn start(&self, tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<CaptureGuard, CaptureError> {
        let target_rate = self.target_rate;
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), CaptureError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let join = std::thread::spawn(move || {
            let stream = match build_input_stream(target_rate, tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // Park until the guard drops; the stream (and device) is
            // released when this frame unwinds.
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(CaptureGuard {
                stop_tx: Some(stop_tx),
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(CaptureError::BuildStream("capture thread died".into()))
            }
        }
    }
}

/// Open the default input device and start a stream whose callback performs
/// the full downmix → resample → pack chain before a non-blocking send.
fn build_input_stream(
    target_rate: u32,
    tx: mpsc::UnboundedSender<Vec<u8>>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::DefaultConfig(e.to_string()))?;

    let channels = supported.channels();
    let native_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    log::debug!("capture: device at {native_rate} Hz / {channels} ch → {target_rate} Hz mono");

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = downmix_to_mono(data, channels);
                let resampled = resample_linear(&mono, native_rate, target_rate);
                let packed = pack_i16_le(&resampled);
                // Unbounded send never blocks; ignore a dropped receiver so
                // the audio thread never panics.
                let _ = tx.send(packed);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None, // no timeout
        )
        .map_err(|e| CaptureError::BuildStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::PlayStream(e.to_string()))?;

    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
