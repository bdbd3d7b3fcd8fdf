//! Gapless playback scheduling with barge-in cancellation.
//!
//! Model audio arrives as discrete PCM segments, usually faster than real
//! time.  [`PlaybackScheduler`] keeps a `next_start` cursor on its own
//! monotonic clock and schedules each segment at
//! `max(next_start, now)`, then advances the cursor by the segment's
//! duration — so back-to-back segments abut exactly, with no gap and no
//! overlap, whether segments arrive ahead of or behind the cursor.
//!
//! On **barge-in** (the user starts speaking over the model) every active
//! handle is stopped, the registry is cleared, the sink is flushed and the
//! cursor drops to the clock floor so the next segment plays immediately.
//!
//! The scheduler clock is `tokio::time::Instant`, which pauses and advances
//! under `tokio::time::pause()` — the timing tests below run in virtual
//! time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::resample::downmix_to_mono;

// ---------------------------------------------------------------------------
// AudioSegment
// ---------------------------------------------------------------------------

/// One decoded segment of model audio, mono `f32`.
///
/// Consumed exactly once: ownership moves into the playback task on
/// [`PlaybackScheduler::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Mono samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// `samples.len() / sample_rate`, precomputed for cursor arithmetic.
    pub duration_secs: f64,
}

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// A malformed inbound audio payload.
///
/// Per-segment and non-fatal: the coordinator drops the segment and playback
/// continues; the cursor does not advance for a dropped segment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("PCM16 payload has odd byte count ({0})")]
    OddByteCount(usize),

    #[error("segment declares a zero sample rate")]
    ZeroSampleRate,

    #[error("segment declares zero channels")]
    ZeroChannels,
}

/// Decode 16-bit signed little-endian PCM into a mono [`AudioSegment`],
/// downmixing interleaved channels.
///
/// # Example
///
/// ```rust
/// use live_grounding::audio::decode_pcm16;
///
/// let bytes = [0u8, 0, 255, 127]; // 0, i16::MAX
/// let seg = decode_pcm16(&bytes, 24_000, 1).unwrap();
/// assert_eq!(seg.samples.len(), 2);
/// assert!((seg.samples[1] - 1.0).abs() < 1e-4);
/// ```
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioSegment, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddByteCount(bytes.len()));
    }
    if sample_rate == 0 {
        return Err(DecodeError::ZeroSampleRate);
    }
    if channels == 0 {
        return Err(DecodeError::ZeroChannels);
    }

    // Divide by 32768 so i16::MIN lands exactly on -1.0 and nothing leaves
    // the [-1.0, 1.0] sample range.
    let interleaved: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect();

    let samples = downmix_to_mono(&interleaved, channels);
    let duration_secs = samples.len() as f64 / sample_rate as f64;

    Ok(AudioSegment {
        samples,
        sample_rate,
        duration_secs,
    })
}

// ---------------------------------------------------------------------------
// OutputSink
// ---------------------------------------------------------------------------

/// Destination for scheduled samples — the speaker, or a test double.
///
/// `submit` is called from the playback task at the segment's start time;
/// `flush` discards anything already submitted but not yet rendered
/// (barge-in).
pub trait OutputSink: Send + Sync {
    fn submit(&self, samples: &[f32], sample_rate: u32);
    fn flush(&self);
}

/// Sink that discards everything.  For headless sessions and tests that do
/// not assert on rendered audio.
pub struct NullSink;

impl OutputSink for NullSink {
    fn submit(&self, _samples: &[f32], _sample_rate: u32) {}
    fn flush(&self) {}
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Registry key for an active playback handle.
type HandleId = u64;

/// Gapless segment scheduler with an owned handle registry.
///
/// Completion and cancellation both go through the registry: a playback task
/// removes its own entry when the segment finishes naturally, and
/// [`interrupt`](Self::interrupt) aborts and drains every entry.  Aborting a
/// task that already finished is a no-op, so stopping a completed handle can
/// never fail.
///
/// Must be used from within a tokio runtime — `enqueue` spawns the playback
/// task.
pub struct PlaybackScheduler {
    sink: Arc<dyn OutputSink>,
    /// Zero point of the scheduler clock.
    epoch: Instant,
    /// Start-time cursor, seconds on the scheduler clock.  Monotonically
    /// non-decreasing between interruptions; reset to the floor on barge-in.
    next_start: f64,
    active: Arc<Mutex<HashMap<HandleId, AbortHandle>>>,
    next_handle: HandleId,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            epoch: Instant::now(),
            next_start: 0.0,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_handle: 0,
        }
    }

    /// Seconds elapsed on the scheduler clock.
    pub fn clock_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Schedule `segment` for gapless playback and return its start time in
    /// scheduler-clock seconds.
    ///
    /// The segment starts at `max(next_start, now)` — immediately when the
    /// stream is behind real time, back-to-back after the previous segment
    /// when it is ahead.
    pub fn enqueue(&mut self, segment: AudioSegment) -> f64 {
        let now = self.clock_secs();
        let start = self.next_start.max(now);
        self.next_start = start + segment.duration_secs;

        let id = self.next_handle;
        self.next_handle += 1;

        let sink = Arc::clone(&self.sink);
        let active = Arc::clone(&self.active);
        let start_at = self.epoch + Duration::from_secs_f64(start);

        // Hold the registry lock across spawn + insert so the task cannot
        // observe a missing entry when it completes instantly.
        let mut registry = self.active.lock().unwrap();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(start_at).await;
            sink.submit(&segment.samples, segment.sample_rate);
            tokio::time::sleep(Duration::from_secs_f64(segment.duration_secs)).await;
            // Natural completion: the handle removes itself.
            active.lock().unwrap().remove(&id);
        });
        registry.insert(id, task.abort_handle());

        log::trace!("playback: segment {id} scheduled at {start:.3}s");
        start
    }

    /// Barge-in: stop every active handle, clear the registry, flush the
    /// sink and reset the cursor to the clock floor.
    ///
    /// The next segment to arrive is scheduled immediately rather than at
    /// the stale future cursor.
    pub fn interrupt(&mut self) {
        let mut registry = self.active.lock().unwrap();
        let stopped = registry.len();
        for (_, handle) in registry.drain() {
            // No-op for handles whose task already finished.
            handle.abort();
        }
        drop(registry);

        self.sink.flush();
        self.next_start = 0.0;

        if stopped > 0 {
            log::debug!("playback: interrupted, stopped {stopped} active handle(s)");
        }
    }

    /// Teardown path — same mechanics as a barge-in.
    pub fn stop_all(&mut self) {
        self.interrupt();
    }

    /// Number of handles currently in the registry.
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
