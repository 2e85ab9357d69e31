//! ChunkStreamer: ack-paced delivery of payloads larger than one frame.
//!
//! Two distinct streaming behaviors share the chunk-walk mechanics but
//! nothing else; both sides of the divergence are device firmware
//! contract and must not be unified:
//!
//! - **Text injection** types text as live keystrokes: each chunk is an
//!   ack-gated `key_ack STRING` line, newlines become ack-gated `ENTER`
//!   presses, and failure stops the remainder (half-typed text on the
//!   target cannot be rolled back).
//! - **File write** streams bytes to an SD file: a begin command opens the
//!   stream, a warm-up pause gives the device time to open the file, each
//!   chunk is gated on `SD_ACK:`, and the stream is closed with `sd_stop`
//!   on success *and* on failure (an explicit abort, so the device never
//!   holds a half-open file).

use std::sync::Arc;

use duckwire_core::protocol::chunk::chunk_payload;
use duckwire_core::protocol::command::{Command, HidCommand};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::config::{FileStreamPolicy, TextStreamPolicy};
use crate::infrastructure::ack::AckError;
use crate::infrastructure::link::{DeviceLink, LinkError};

/// Why a stream did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Ack(#[from] AckError),
}

/// Ack-paced chunk delivery over a device link.
pub struct ChunkStreamer {
    link: Arc<dyn DeviceLink>,
}

impl ChunkStreamer {
    pub fn new(link: Arc<dyn DeviceLink>) -> Self {
        Self { link }
    }

    /// Types `text` on the target as live keystrokes.
    ///
    /// Each line is sent in ack-gated chunks of at most
    /// `policy.chunk_size` characters; line breaks become ack-gated
    /// `ENTER` presses.  `final_enter` appends one more `ENTER` after the
    /// last line.  The first failed ack stops the remainder.
    pub async fn send_text(
        &self,
        text: &str,
        final_enter: bool,
        policy: &TextStreamPolicy,
    ) -> Result<(), StreamError> {
        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len() - 1;
        for (index, line) in lines.iter().enumerate() {
            for chunk in char_chunks(line, policy.chunk_size) {
                self.link
                    .send_gated(
                        Command::KeyAck(HidCommand::String(chunk)),
                        policy.ack_timeout,
                    )
                    .await?;
            }
            if index < last || final_enter {
                self.link
                    .send_gated(
                        Command::KeyAck(HidCommand::Combo(vec!["ENTER".into()])),
                        policy.ack_timeout,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Streams `content` into the SD-card file `name`.
    ///
    /// Failure mid-stream sends an explicit `sd_stop` abort before
    /// surfacing the error, so the device closes the half-written file.
    pub async fn write_file(
        &self,
        name: &str,
        content: &[u8],
        policy: &FileStreamPolicy,
    ) -> Result<(), StreamError> {
        debug!(name, bytes = content.len(), "starting sd write stream");
        self.link.send(Command::SdStreamWriteBegin { file: name.into() })?;

        // The device needs a moment to open the file before the first
        // chunk lands.
        tokio::time::sleep(policy.warmup).await;

        for chunk in chunk_payload(content, policy.chunk_size) {
            let result = self
                .link
                .send_chunk_gated(
                    Command::SdStreamWrite {
                        chunk: chunk.data.to_vec(),
                    },
                    policy.ack_timeout,
                )
                .await;
            if let Err(error) = result {
                warn!(name, offset = chunk.offset, %error, "sd write failed; aborting stream");
                // Best effort: the link may already be gone.
                let _ = self.link.send_priority(Command::SdStop);
                return Err(error.into());
            }
        }

        self.link.send(Command::SdStop)?;
        debug!(name, "sd write stream complete");
        Ok(())
    }
}

/// Splits a line into chunks of at most `size` characters, never inside a
/// UTF-8 code point.
fn char_chunks(line: &str, size: usize) -> Vec<String> {
    assert!(size > 0, "chunk size must be non-zero");
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in line.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ───────────────────────────── Tests ─────────────────────────────
