//! Session configuration and defaults.
//!
//! [`SessionConfig`] carries every tunable the engine reads: model name,
//! capture rate, timer cadences, tracker thresholds and the parser buffer
//! cap.  It implements `Serialize`, `Deserialize`, `Default` and `Clone` so
//! a host application can round-trip it through JSON and share it across
//! threads.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Engine configuration.
///
/// The defaults match the production values used against the realtime model
/// channel; tests override individual fields as needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identifier of the remote conversational model to open the channel
    /// against.  Opaque to the engine — passed through to the channel
    /// factory.
    pub model: String,

    /// Sample rate (Hz) the outbound audio is resampled to before framing.
    pub target_sample_rate: u32,

    /// Cadence (ms) of the periodic outbound video-frame capture.
    pub frame_interval_ms: u64,

    /// Cadence (ms) of the tracked-object pruning sweep.
    pub prune_interval_ms: u64,

    /// Age (ms) after which an un-refreshed tracked object is pruned.
    pub object_ttl_ms: u64,

    /// Maximum center distance (in the [0, 1000] coordinate space) at which
    /// a detection is reconciled onto an existing tracked object.
    pub match_threshold: f64,

    /// Trailing-buffer cap of the detection parser, in characters.
    pub parser_buffer_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "realtime-default".to_string(),
            target_sample_rate: 16_000,
            frame_interval_ms: 500,
            prune_interval_ms: 500,
            object_ttl_ms: 3_000,
            match_threshold: 200.0,
            parser_buffer_chars: 500,
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from a JSON string.
    ///
    /// Missing fields fall back to their defaults (`#[serde(default)]`), so
    /// a host only has to specify what it overrides.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialize the configuration to a pretty-printed JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
