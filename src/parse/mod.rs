//! Detection extraction from the streamed model transcript.
//!
//! ```text
//! transcript deltas → DetectionParser (trailing buffer + rescan) → Vec<Detection>
//! ```

pub mod detector;

pub use detector::{Detection, DetectionParser};
