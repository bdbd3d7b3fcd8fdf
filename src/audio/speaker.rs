//! Speaker output via `cpal`.
//!
//! [`SpeakerSink`] implements [`OutputSink`] on top of the default output
//! device.  Scheduled samples are resampled to the device rate and pushed
//! into a shared queue; the cpal output callback drains the queue and
//! zero-fills on underrun so the stream never glitches while idle.
//!
//! Like capture, the stream lives on a worker thread because `cpal::Stream`
//! is not `Send` everywhere; the sink itself is `Send + Sync` and can be
//! shared with the playback scheduler behind an `Arc`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::playback::OutputSink;
use super::resample::resample_linear;

// ---------------------------------------------------------------------------
// SpeakerError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring the output device.
#[derive(Debug, Clone, Error)]
pub enum SpeakerError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(String),

    #[error("failed to start output stream: {0}")]
    PlayStream(String),
}

// ---------------------------------------------------------------------------
// SpeakerSink
// ---------------------------------------------------------------------------

/// Shared mono sample queue drained by the output callback.
type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

/// Production [`OutputSink`] backed by the system default output device.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use live_grounding::audio::{PlaybackScheduler, SpeakerSink};
///
/// let sink = Arc::new(SpeakerSink::open().unwrap());
/// let scheduler = PlaybackScheduler::new(sink);
/// ```
pub struct SpeakerSink {
    queue: SampleQueue,
    /// Native rate of the output device; submissions are resampled to it.
    device_rate: u32,
    channels: u16,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl SpeakerSink {
    /// Acquire the default output device and start the (initially silent)
    /// stream.
    pub fn open() -> Result<Self, SpeakerError> {
        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(u32, u16), SpeakerError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let worker_queue = Arc::clone(&queue);
        let join = std::thread::spawn(move || {
            let stream = match build_output_stream(worker_queue) {
                Ok((stream, rate, channels)) => {
                    let _ = ready_tx.send(Ok((rate, channels)));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok((device_rate, channels))) => Ok(Self {
                queue,
                device_rate,
                channels,
                stop_tx: Some(stop_tx),
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(SpeakerError::BuildStream("output thread died".into()))
            }
        }
    }

    /// Native rate of the acquired device.
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Samples currently queued but not yet rendered.
    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

impl OutputSink for SpeakerSink {
    fn submit(&self, samples: &[f32], sample_rate: u32) {
        let converted = resample_linear(samples, sample_rate, self.device_rate);
        let mut queue = self.queue.lock().unwrap();
        queue.extend(converted);
        log::trace!(
            "speaker: queued {} samples ({} ch device)",
            queue.len(),
            self.channels
        );
    }

    fn flush(&self) {
        self.queue.lock().unwrap().clear();
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Open the default output device; the callback pops mono samples from the
/// queue, duplicating across device channels and zero-filling on underrun.
fn build_output_stream(queue: SampleQueue) -> Result<(cpal::Stream, u32, u16), SpeakerError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(SpeakerError::NoDevice)?;

    let supported = device
        .default_output_config()
        .map_err(|e| SpeakerError::DefaultConfig(e.to_string()))?;

    let channels = supported.channels();
    let rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    log::debug!("speaker: device at {rate} Hz / {channels} ch");

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = queue.lock().unwrap();
                for frame in data.chunks_mut(channels as usize) {
                    let sample = queue.pop_front().unwrap_or(0.0);
                    for slot in frame {
                        *slot = sample;
                    }
                }
            },
            |err: cpal::StreamError| {
                log::error!("cpal output stream error: {err}");
            },
            None,
        )
        .map_err(|e| SpeakerError::BuildStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| SpeakerError::PlayStream(e.to_string()))?;

    Ok((stream, rate, channels))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
