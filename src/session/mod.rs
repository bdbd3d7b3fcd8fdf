//! Session orchestration against the remote model channel.
//!
//! # Architecture
//!
//! ```text
//! SessionCommand (mpsc)
//!        │
//!        ▼
//! SessionCoordinator::run()  ← async tokio task
//!        │
//!        ├─ Start → acquire mic, open channel, enter select! loop
//!        │            ├─ ChannelEvent stream (transcript / audio / control)
//!        │            ├─ outbound capture chunks → channel.send_audio
//!        │            ├─ frame timer → VideoSource → channel.send_video
//!        │            └─ prune timer → IdentityTracker::prune
//!        └─ Stop  → teardown (idempotent)
//!
//! SharedSessionState (Arc<Mutex<SessionState>>) ←── read by the host UI
//! ```

pub mod channel;
pub mod coordinator;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use channel::{
    AudioPacket, ChannelError, ChannelEvent, ChannelFactory, RealtimeChannel, EVENT_QUEUE_DEPTH,
};
pub use coordinator::{SessionCommand, SessionCoordinator, SessionError};
pub use state::{
    new_shared_state, ConnectionState, Role, SessionState, SharedSessionState, TranscriptEntry,
};
