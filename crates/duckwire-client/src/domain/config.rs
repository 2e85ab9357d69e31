//! Client configuration types.
//!
//! [`ClientConfig`] is the single source of truth for all runtime tunables.
//! Build it once at startup (from CLI arguments or defaults) and share it;
//! every component reads its knobs from here instead of burying constants.
//!
//! The defaults mirror the timings the device firmware was tuned against:
//! changing them changes flow-control behavior on real hardware, so tests
//! that depend on pacing construct their own explicit values.

use std::time::Duration;

/// All runtime configuration for the duckwire client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the device's control channel.
    pub device_url: String,

    /// Interval of the outbound dispatch tick.  Each tick sends at most one
    /// queued request if the channel is clear to send.
    pub dispatch_tick: Duration,

    /// Default deadline for one acknowledgement wait.  Every wait is
    /// independently configurable; this is the fallback.
    pub ack_timeout: Duration,

    /// Chunk size for ack-gated keystroke text injection.
    pub text_chunk_size: usize,

    /// Chunk size for the hybrid SD-card write stream.
    pub file_chunk_size: usize,

    /// Chunk size for streaming content into an open internal (SPIFFS)
    /// file.  SPIFFS writes are not ack-gated, so this can be much larger.
    pub spiffs_chunk_size: usize,

    /// Warm-up delay between the SD stream-begin command and the first
    /// chunk, giving the device time to open the file.
    pub write_warmup: Duration,

    /// Cadence of the status poller while a tracked condition holds.
    pub poll_interval: Duration,

    /// How long the typing indicator stays lit after a command.
    pub typing_window: Duration,

    /// Window in which re-tapping the same modifier means "send it alone".
    pub double_tap_window: Duration,

    /// Hard ceiling on operations a compiled (non-executing) program may
    /// emit before it is aborted as runaway.
    pub op_ceiling: usize,

    /// Brief settle pause between consecutive engine operations.
    pub op_settle: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // The device runs its own access point and always serves the
            // control channel at this address.
            device_url: "ws://192.168.4.1/ws".into(),
            dispatch_tick: Duration::from_millis(3),
            ack_timeout: Duration::from_secs(10),
            text_chunk_size: 95,
            file_chunk_size: 126,
            spiffs_chunk_size: 1024,
            write_warmup: Duration::from_millis(500),
            poll_interval: Duration::from_secs(1),
            typing_window: Duration::from_millis(500),
            double_tap_window: Duration::from_millis(400),
            op_ceiling: 10_000,
            op_settle: Duration::from_millis(10),
        }
    }
}

impl ClientConfig {
    /// Streaming policy for ack-gated keystroke text injection.
    pub fn text_policy(&self) -> TextStreamPolicy {
        TextStreamPolicy {
            chunk_size: self.text_chunk_size,
            ack_timeout: self.ack_timeout,
        }
    }

    /// Streaming policy for the hybrid SD-card file write.
    pub fn file_policy(&self) -> FileStreamPolicy {
        FileStreamPolicy {
            chunk_size: self.file_chunk_size,
            ack_timeout: self.ack_timeout,
            warmup: self.write_warmup,
        }
    }
}

/// Flow-control knobs for ack-gated text injection.
///
/// Text injection and file writes are deliberately *not* unified into one
/// behavior: they differ in chunk size, framing, and failure handling, and
/// both sides of that divergence are device firmware contract.  They share
/// only the chunk-walk mechanics.
#[derive(Debug, Clone, Copy)]
pub struct TextStreamPolicy {
    pub chunk_size: usize,
    pub ack_timeout: Duration,
}

/// Flow-control knobs for the hybrid timer+ack SD file write.
#[derive(Debug, Clone, Copy)]
pub struct FileStreamPolicy {
    pub chunk_size: usize,
    pub ack_timeout: Duration,
    pub warmup: Duration,
}
