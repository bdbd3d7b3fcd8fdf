//! Video capture collaborator seam.
//!
//! Device enumeration, permissions and frame encoding are out of scope for
//! the engine; a host supplies a [`VideoSource`] that yields already-encoded
//! frames on demand.  The session coordinator polls it on a fixed cadence
//! while connected.

use thiserror::Error;

// ---------------------------------------------------------------------------
// VideoFrame
// ---------------------------------------------------------------------------

/// One encoded video frame ready for the outbound channel.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Encoded image bytes (e.g. a JPEG).
    pub data: Vec<u8>,
    /// MIME type of `data`, e.g. `"image/jpeg"`.
    pub mime_type: String,
}

// ---------------------------------------------------------------------------
// VideoError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum VideoError {
    /// The capture device could not be acquired — fatal at session start.
    #[error("video device unavailable: {0}")]
    Unavailable(String),

    /// A single frame capture failed — the coordinator skips the frame.
    #[error("frame capture failed: {0}")]
    Capture(String),
}

// ---------------------------------------------------------------------------
// VideoSource
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe source of encoded frames.
///
/// `capture_frame` is called from the coordinator's timer arm and should
/// return promptly; a slow source delays the rest of the session loop.
pub trait VideoSource: Send + Sync {
    fn capture_frame(&self) -> Result<VideoFrame, VideoError>;
}

// Compile-time assertion: Box<dyn VideoSource> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn VideoSource>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
