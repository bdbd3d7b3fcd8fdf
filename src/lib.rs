//! Real-time conversational vision/audio client engine.
//!
//! The crate exchanges microphone audio and video frames with a remote
//! conversational model over a duplex streaming channel, extracts spatial
//! detections from the model's streamed text, tracks stable object
//! identities over time and plays back streamed model audio gaplessly with
//! barge-in support.
//!
//! # Data flow
//!
//! ```text
//! mic → capture/resample ─┐                      ┌─▶ DetectionParser → IdentityTracker
//! camera → VideoSource ───┼─▶ SessionCoordinator ┼─▶ PlaybackScheduler → speaker
//!                         │   (duplex channel)   └─▶ transcript history
//! ```
//!
//! The transport itself is a collaborator: a host implements
//! [`session::ChannelFactory`] / [`session::RealtimeChannel`] (e.g. over a
//! websocket) and [`video::VideoSource`], then drives
//! [`session::SessionCoordinator`] with commands and reads shared snapshots.

pub mod audio;
pub mod config;
pub mod parse;
pub mod session;
pub mod track;
pub mod video;

pub use config::SessionConfig;
pub use session::{SessionCommand, SessionCoordinator};
