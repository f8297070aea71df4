//! Adaptive segmented-media streaming orchestration core.
//!
//! This crate owns playback-clock observation, bandwidth/ABR estimation,
//! segment scheduling and fetching, and sink append ordering for a
//! DASH/HLS-style player. Manifest parsing, container/codec parsing, DRM,
//! and the concrete media sink are external collaborators plugged in
//! through the traits in [`transport`].

pub mod config;
pub mod error;
pub mod manifest;
pub mod shared;
pub mod stream;
pub mod transport;

pub use config::EngineConfig;
pub use error::{StreamError, StreamErrorKind};
pub use manifest::Manifest;
pub use stream::events::StreamEvent;
