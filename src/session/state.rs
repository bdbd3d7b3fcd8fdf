//! Connection state machine and shared session state.
//!
//! [`ConnectionState`] is the coordinator's state machine; a presentation
//! layer reads it via [`SharedSessionState`] to render the session view.
//!
//! [`SessionState`] also carries the append-only transcript history and the
//! last error message.  The coordinator is the single writer; readers clone
//! snapshots and never mutate.
//!
//! [`SharedSessionState`] is a type alias for `Arc<Mutex<SessionState>>` —
//! cheap to clone and safe to share across threads.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// States of a session against the remote channel.
///
/// The transitions are:
///
/// ```text
/// Disconnected ──start()──▶ Connecting ──channel opened──▶ Connected
/// any state ──channel failure──▶ Error
/// any state ──stop() / channel closed──▶ Disconnected
/// ```
///
/// Recovery from `Error` requires an explicit new `start()`; there is no
/// automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session; devices released.
    Disconnected,

    /// Devices acquired, channel handshake in flight.
    Connecting,

    /// Channel open; audio/video streaming in both directions.
    Connected,

    /// The channel or a device failed.  Terminal until the caller restarts.
    Error,
}

impl ConnectionState {
    /// Returns `true` while a session is live or being established.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// A short human-readable label suitable for a status display.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Error",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

// ---------------------------------------------------------------------------
// TranscriptEntry
// ---------------------------------------------------------------------------

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Model,
}

/// One completed turn of transcript text.  Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Shared session state — what a presentation layer reads.
///
/// Held behind [`SharedSessionState`].  The coordinator mutates it; readers
/// take snapshots through [`transcript_snapshot`](Self::transcript_snapshot)
/// and friends.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Current connection phase.
    pub connection: ConnectionState,

    /// Completed transcript turns, in arrival order.  Append-only.
    transcript: Vec<TranscriptEntry>,

    /// Message to display when `connection == ConnectionState::Error`.
    pub error_message: Option<String>,
}

impl SessionState {
    /// Append a completed turn.  Entries are never edited or removed.
    pub fn push_transcript(&mut self, role: Role, text: String) {
        self.transcript.push(TranscriptEntry { role, text });
    }

    /// Immutable clone of the history for the presentation subscriber.
    pub fn transcript_snapshot(&self) -> Vec<TranscriptEntry> {
        self.transcript.clone()
    }

    pub fn transcript_len(&self) -> usize {
        self.transcript.len()
    }
}

// ---------------------------------------------------------------------------
// SharedSessionState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionState`].
///
/// Cheap to clone (`Arc` clone).  Lock for short critical sections only; do
/// **not** hold the lock across `.await` points.
pub type SharedSessionState = Arc<Mutex<SessionState>>;

/// Construct a new [`SharedSessionState`] in the `Disconnected` state.
pub fn new_shared_state() -> SharedSessionState {
    Arc::new(Mutex::new(SessionState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
