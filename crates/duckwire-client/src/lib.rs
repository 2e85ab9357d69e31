//! Flow-controlled command runtime for duckwire HID devices.
//!
//! The device exposes one duplex text channel with no multiplexing, no
//! request ids, and tiny buffers.  This crate supplies the discipline that
//! makes the channel usable:
//!
//! - [`infrastructure::TransportQueue`] serializes requests behind a
//!   clear-to-send flag and pairs replies positionally,
//! - [`infrastructure::AckCoordinator`] pairs ack-gated commands with their
//!   out-of-band confirmations, FIFO per stream,
//! - [`application::ChunkStreamer`] paces oversized payloads chunk by
//!   acknowledged chunk,
//! - [`application::ExecutionEngine`] runs command programs serialized and
//!   fail-fast,
//! - [`application::StatusPoller`] keeps device status fresh while
//!   long-running work is in flight.
//!
//! The layering follows the usual domain / application / infrastructure
//! split: `domain` is pure state, `application` is protocol-aware logic
//! over the [`infrastructure::DeviceLink`] seam, and `infrastructure` owns
//! the queue, the ack registries, and the WebSocket driver.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    parse_program, ChunkStreamer, DeviceStorage, EngineError, ExecutionEngine, InputSession,
    Operation, ScriptError, ScriptRecorder, SessionState, StatusPoller, StreamError,
};
pub use domain::{ClientConfig, PollTracker, SessionConnectivity};
pub use infrastructure::{AckCoordinator, AckError, DeviceLink, FakeLink, LinkError, WireLink};
