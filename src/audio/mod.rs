//! Audio pipeline — capture/resampling outbound, gapless playback inbound.
//!
//! # Outbound
//!
//! ```text
//! Microphone → cpal callback → downmix_to_mono → resample_linear(→16 kHz)
//!           → pack_i16_le → unbounded channel → session coordinator
//! ```
//!
//! # Inbound
//!
//! ```text
//! channel AudioSegment event → decode_pcm16 → PlaybackScheduler
//!                            → OutputSink (SpeakerSink) → speaker
//! ```

pub mod capture;
pub mod playback;
pub mod resample;
pub mod speaker;

pub use capture::{CaptureError, CaptureGuard, CaptureSource, MicCapture};
pub use playback::{
    decode_pcm16, AudioSegment, DecodeError, NullSink, OutputSink, PlaybackScheduler,
};
pub use resample::{downmix_to_mono, pack_i16_le, resample_linear};
pub use speaker::{SpeakerError, SpeakerSink};
