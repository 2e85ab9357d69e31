//! Pure domain types: configuration and status tracking.

pub mod config;
pub mod status;

pub use config::{ClientConfig, FileStreamPolicy, TextStreamPolicy};
pub use status::{ui_blocked, PollDecision, PollTracker, SessionConnectivity};
