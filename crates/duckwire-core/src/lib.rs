//! # duckwire-core
//!
//! Shared library for duckwire containing the text wire protocol, the
//! payload chunking math, and the modifier/combo composition domain.
//!
//! This crate is used by the client runtime (`duckwire-client`) and by any
//! future front end.  It has zero dependencies on async runtimes, sockets,
//! or UI frameworks.
//!
//! # What duckwire talks to
//!
//! The remote device emulates a USB HID keyboard and mouse and exposes a
//! single duplex text channel (a WebSocket in practice).  Every command is
//! one newline-terminated line of text; the device answers with a generic
//! reply per request, plus two out-of-band event families:
//!
//! - **`KEY_ACK:<status>`** – an asynchronous confirmation that a sensitive
//!   command (keystroke injection, file-stream chunk) was actually executed.
//! - **`SD_LS:` / `SD_CAT:` / `SD_ACK:` / `SD_END:`** – markers delimiting
//!   multi-part SD-card responses.
//!
//! This crate defines:
//!
//! - **`protocol`** – the typed command vocabulary and its line encoding,
//!   the inbound event classifier, the chunk splitter used for streaming
//!   large payloads, and a local sequence counter.
//! - **`domain`** – pure composition logic for armed modifier keys
//!   (CTRL/SHIFT/ALT/GUI) and combo commands.

pub mod domain;
pub mod protocol;

pub use domain::keys::{ComboState, Modifier, ReleaseOutcome, ToggleOutcome};
pub use protocol::chunk::{chunk_count, chunk_payload, Chunk};
pub use protocol::command::{Command, HidCommand};
pub use protocol::event::{AckStatus, DeviceEvent};
pub use protocol::sequence::SequenceCounter;
