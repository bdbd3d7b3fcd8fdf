//! Duplex channel seam to the remote conversational model.
//!
//! Transport and session negotiation are out of scope; the engine talks to
//! the model through two object-safe traits.  [`ChannelFactory::open`]
//! performs the connect and hands back a send half ([`RealtimeChannel`])
//! plus a bounded event stream — push-style callbacks are deliberately
//! modelled as a queue consumed by the single session loop, never as
//! free-floating closures over mutable state.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::video::VideoFrame;

/// Queue depth of the inbound event stream handed out by a factory.
pub const EVENT_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// AudioPacket
// ---------------------------------------------------------------------------

/// One outbound audio chunk, framed for the wire.
///
/// The payload is base64-encoded 16-bit little-endian mono PCM at
/// `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    pub payload: String,
    pub sample_rate: u32,
}

impl AudioPacket {
    /// Frame raw packed PCM bytes for transmission.
    pub fn from_pcm(pcm: &[u8], sample_rate: u32) -> Self {
        Self {
            payload: BASE64.encode(pcm),
            sample_rate,
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelEvent
// ---------------------------------------------------------------------------

/// Asynchronous events delivered by the remote channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel handshake completed; the session is live.
    Opened,
    /// A token of the model's spoken-output transcription.
    OutputTranscriptDelta(String),
    /// A token of the transcription of the user's own speech.
    InputTranscriptDelta(String),
    /// The model finished its turn.
    TurnComplete,
    /// A segment of model audio, raw 16-bit little-endian PCM.
    AudioSegment {
        data: Vec<u8>,
        sample_rate: u32,
        channels: u16,
    },
    /// Barge-in: the user started speaking over the model.
    Interrupted,
    /// The channel failed; the session must tear down.
    Error(String),
    /// The channel closed cleanly.
    Closed,
}

// ---------------------------------------------------------------------------
// ChannelError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The connect attempt failed — fatal at startup, no auto-retry.
    #[error("failed to open channel: {0}")]
    Open(String),

    /// An outbound send failed — fatal for the current session.
    #[error("channel send failed: {0}")]
    Send(String),

    /// The channel is already closed.
    #[error("channel closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// RealtimeChannel / ChannelFactory
// ---------------------------------------------------------------------------

/// Send half of an open duplex channel.
///
/// Sends are fire-and-continue: completion of the remote side's processing
/// is observed later as [`ChannelEvent`]s.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn send_audio(&self, packet: AudioPacket) -> Result<(), ChannelError>;
    async fn send_video(&self, frame: VideoFrame) -> Result<(), ChannelError>;
    async fn close(&self) -> Result<(), ChannelError>;
}

/// Opens channels against the remote model.
///
/// Implemented by the host (websocket transport, test double, …).
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    /// Connect and return the send half plus the inbound event stream.
    async fn open(
        &self,
        config: &SessionConfig,
    ) -> Result<(Arc<dyn RealtimeChannel>, mpsc::Receiver<ChannelEvent>), ChannelError>;
}

// Compile-time assertions: both traits must be object-safe.
const _: fn() = || {
    fn _assert_channel(_: Box<dyn RealtimeChannel>) {}
    fn _assert_factory(_: Box<dyn ChannelFactory>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
