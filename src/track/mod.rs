//! Identity tracking — reconciling transient detections into stable objects.
//!
//! ```text
//! Vec<Detection> → IdentityTracker::observe → live Vec<TrackedObject>
//!                  IdentityTracker::prune  ← 500 ms sweep timer
//! ```

pub mod tracker;

pub use tracker::{IdentityTracker, TrackedObject};
