//! Device storage operations: SD card and internal (SPIFFS) files.
//!
//! SD responses are multi-part and out-of-band: the device answers `sd_ls`
//! and `sd_cat` with a run of marked frames closed by `SD_END:`, routed
//! here through the link's SD event channel.  Internal-filesystem commands
//! answer on the ordinary request/reply queue.

use std::sync::Arc;
use std::time::Duration;

use duckwire_core::protocol::chunk::chunk_payload;
use duckwire_core::protocol::command::Command;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::domain::config::ClientConfig;
use crate::infrastructure::link::{DeviceLink, LinkError, SdEvent};

use super::streamer::{ChunkStreamer, StreamError};

/// Name the staged internal save writes before the atomic rename.
const SPIFFS_STAGING_FILE: &str = "/temporary_script";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A multi-part response stalled before its end marker.
    #[error("device response timed out after {0:?}")]
    ResponseTimeout(Duration),

    /// The SD event channel closed mid-response (connection lost).
    #[error("device connection lost mid-response")]
    ConnectionLost,
}

/// One SD-card directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdFileEntry {
    pub name: String,
    pub size: u64,
}

/// Parses one `SD_LS:` line.  Prompt echoes (`>`), comments (`#`), and
/// blank lines are noise and yield `None`.
pub fn parse_listing_line(line: &str) -> Option<SdFileEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('>') || line.starts_with('#') {
        return None;
    }
    match line.rsplit_once(',') {
        Some((name, size)) => Some(SdFileEntry {
            name: name.to_string(),
            size: size.trim().parse().unwrap_or(0),
        }),
        None => Some(SdFileEntry {
            name: line.to_string(),
            size: 0,
        }),
    }
}

/// SD-card and internal-filesystem operations over a device link.
///
/// Owns the link's single SD event receiver, so one storage instance
/// exists per connection and its multi-part reads are serialized by the
/// receiver mutex.
pub struct DeviceStorage {
    link: Arc<dyn DeviceLink>,
    streamer: ChunkStreamer,
    events: Mutex<mpsc::UnboundedReceiver<SdEvent>>,
    config: ClientConfig,
}

impl DeviceStorage {
    pub fn new(
        link: Arc<dyn DeviceLink>,
        events: mpsc::UnboundedReceiver<SdEvent>,
        config: ClientConfig,
    ) -> Self {
        Self {
            streamer: ChunkStreamer::new(Arc::clone(&link)),
            link,
            events: Mutex::new(events),
            config,
        }
    }

    /// Lists the SD card's files.
    pub async fn sd_list(&self) -> Result<Vec<SdFileEntry>, StorageError> {
        let mut events = self.events.lock().await;
        self.link.send(Command::SdLs)?;

        let mut entries = Vec::new();
        loop {
            match self.next_event(&mut events).await? {
                SdEvent::List(line) => entries.extend(parse_listing_line(&line)),
                SdEvent::End => break,
                SdEvent::Data(_) => {}
            }
        }
        debug!(count = entries.len(), "sd listing complete");
        Ok(entries)
    }

    /// Reads an SD-card file.  The device streams the content line by
    /// line; the transport strips each line's terminator, so lines are
    /// rejoined here.
    pub async fn sd_read(&self, file: &str) -> Result<String, StorageError> {
        let mut events = self.events.lock().await;
        self.link.send(Command::SdCat { file: file.into() })?;

        let mut lines = Vec::new();
        loop {
            match self.next_event(&mut events).await? {
                SdEvent::Data(block) => lines.push(block),
                SdEvent::End => break,
                SdEvent::List(_) => {}
            }
        }
        debug!(file, lines = lines.len(), "sd read complete");
        Ok(lines.join("\n"))
    }

    /// Writes an SD-card file through the ack-gated chunk stream.
    pub async fn sd_write(&self, file: &str, content: &[u8]) -> Result<(), StorageError> {
        self.streamer
            .write_file(file, content, &self.config.file_policy())
            .await?;
        Ok(())
    }

    pub fn sd_run(&self, file: &str) -> Result<(), LinkError> {
        info!(file, "running sd script");
        self.link.send(Command::SdRun { file: file.into() })
    }

    pub fn sd_stop_run(&self) -> Result<(), LinkError> {
        self.link.send_priority(Command::SdStopRun)
    }

    pub fn sd_remove(&self, file: &str) -> Result<(), LinkError> {
        self.link.send(Command::SdRm { file: file.into() })
    }

    /// Lists internal files.  The device answers with one formatted block
    /// on the reply queue.
    pub async fn spiffs_list(&self) -> Result<String, LinkError> {
        self.link.request(Command::Ls).await
    }

    /// Saves an internal file atomically.
    ///
    /// Content is streamed into a staging file which replaces the target
    /// only once fully written, so an interrupted save never leaves a
    /// truncated script where a complete one used to be.
    pub async fn spiffs_save(&self, file: &str, content: &[u8]) -> Result<(), StorageError> {
        info!(file, bytes = content.len(), "saving internal file");
        let staging = SPIFFS_STAGING_FILE;

        self.link.send(Command::Remove { file: staging.into() })?;
        self.link.send(Command::Create { file: staging.into() })?;
        self.link.send(Command::Stream { file: staging.into() })?;
        for chunk in chunk_payload(content, self.config.spiffs_chunk_size) {
            self.link.send(Command::RawData(chunk.data.to_vec()))?;
        }
        self.link.send(Command::Close)?;

        self.link.send(Command::Remove { file: file.into() })?;
        self.link.send(Command::Rename {
            from: staging.into(),
            to: file.into(),
        })?;
        Ok(())
    }

    pub fn spiffs_run(&self, file: &str) -> Result<(), LinkError> {
        info!(file, "running internal script");
        self.link.send(Command::Run { file: file.into() })
    }

    pub fn spiffs_stop(&self, file: Option<&str>) -> Result<(), LinkError> {
        self.link.send_priority(Command::Stop {
            file: file.map(|f| f.to_string()),
        })
    }

    pub fn spiffs_remove(&self, file: &str) -> Result<(), LinkError> {
        self.link.send(Command::Remove { file: file.into() })
    }

    pub fn spiffs_format(&self) -> Result<(), LinkError> {
        self.link.send(Command::Format)
    }

    pub fn set_autorun(&self, file: &str) -> Result<(), LinkError> {
        self.link.send(Command::SetAutorun { file: file.into() })
    }

    async fn next_event(
        &self,
        events: &mut mpsc::UnboundedReceiver<SdEvent>,
    ) -> Result<SdEvent, StorageError> {
        let timeout = self.config.ack_timeout;
        match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(StorageError::ConnectionLost),
            Err(_) => Err(StorageError::ResponseTimeout(timeout)),
        }
    }
}

// ───────────────────────────── Tests ─────────────────────────────
