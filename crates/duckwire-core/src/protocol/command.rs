//! Typed outbound command vocabulary and its line encoding.
//!
//! The device speaks a newline-terminated text protocol.  Every outbound
//! command is one line; this module gives each line a typed constructor so
//! the rest of the codebase never assembles protocol strings by hand.
//!
//! Two framing quirks are inherited from the device firmware and must not
//! change:
//!
//! - HID operations (`STRING`, key combos, mouse, LED, `LOCALE`, `KEYCODE`)
//!   are not sent bare.  They travel inside a `key <op>` line, or inside a
//!   `key_ack <op>` line when the sender wants an out-of-band `KEY_ACK:`
//!   confirmation for flow control.
//! - Stream chunks (`sd_stream_write <bytes>`) are sent *without* a trailing
//!   newline, because the chunk payload is raw data and a terminator would
//!   be appended to the file on the device.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A device-side HID operation, i.e. the payload that travels inside a
/// `key` or `key_ack` line.
///
/// These are the operations the device's command parser executes against
/// its emulated keyboard/mouse.  `Display` renders the exact on-wire text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HidCommand {
    /// Type a run of characters: `STRING <text>`.
    String(String),
    /// Press a combo: space-separated modifiers plus one terminal key,
    /// e.g. `CTRL ALT DELETE` or just `ENTER`.
    Combo(Vec<String>),
    /// Raw HID usage codes: `KEYCODE <codes...>`.
    Keycode(Vec<u8>),
    /// Switch the device keyboard layout: `LOCALE <code>`.
    Locale(String),
    /// Relative mouse motion: `M_MOVE <dx> <dy>`.
    MouseMove { dx: i32, dy: i32 },
    /// Click a mouse button: `M_CLICK <btn>`.
    MouseClick(u8),
    /// Scroll: `M_SCROLL <amt>` (negative scrolls the other way).
    MouseScroll(i32),
    /// Hold a mouse button down: `M_PRESS <btn>`.
    MousePress(u8),
    /// Release a held mouse button: `M_RELEASE <btn>`.
    MouseRelease(u8),
    /// Set an indicator LED: `LED <n> <0|1>`.
    Led { led: u8, on: bool },
}

impl fmt::Display for HidCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HidCommand::String(text) => write!(f, "STRING {text}"),
            HidCommand::Combo(keys) => write!(f, "{}", keys.join(" ")),
            HidCommand::Keycode(codes) => {
                write!(f, "KEYCODE")?;
                for c in codes {
                    write!(f, " {c}")?;
                }
                Ok(())
            }
            HidCommand::Locale(code) => write!(f, "LOCALE {code}"),
            HidCommand::MouseMove { dx, dy } => write!(f, "M_MOVE {dx} {dy}"),
            HidCommand::MouseClick(btn) => write!(f, "M_CLICK {btn}"),
            HidCommand::MouseScroll(amt) => write!(f, "M_SCROLL {amt}"),
            HidCommand::MousePress(btn) => write!(f, "M_PRESS {btn}"),
            HidCommand::MouseRelease(btn) => write!(f, "M_RELEASE {btn}"),
            HidCommand::Led { led, on } => write!(f, "LED {} {}", led, u8::from(*on)),
        }
    }
}

/// One outbound line of the device protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fire-and-forget HID operation: `key <op>`.
    Key(HidCommand),
    /// Ack-gated HID operation: `key_ack <op>`.  The device answers with an
    /// out-of-band `KEY_ACK:<status>` event once the operation executed.
    KeyAck(HidCommand),
    /// Query device status.
    Status,
    /// Firmware version string.
    Version,
    /// Flash memory usage summary.
    Mem,
    /// List internal (SPIFFS) files.
    Ls,
    /// Open an internal file for streamed reading.
    Stream { file: String },
    /// Read the next block of the currently streamed file.
    Read,
    /// Close the current internal file stream.
    Close,
    /// Create an internal file.
    Create { file: String },
    /// Remove an internal file.
    Remove { file: String },
    /// Rename an internal file.
    Rename { from: String, to: String },
    /// Run an internal script.
    Run { file: String },
    /// Stop a running internal script (empty name stops whatever runs).
    Stop { file: Option<String> },
    /// Erase the internal filesystem.
    Format,
    /// Mark an internal script to run on boot.
    SetAutorun { file: String },
    /// List SD-card files (multi-part `SD_LS:` response).
    SdLs,
    /// Read an SD-card file (multi-part `SD_CAT:` response).
    SdCat { file: String },
    /// Begin a chunked SD-card write stream.
    SdStreamWriteBegin { file: String },
    /// One chunk of an SD-card write stream.  Sent unterminated.
    SdStreamWrite { chunk: Vec<u8> },
    /// Close (or abort) the current SD-card stream.
    SdStop,
    /// Run a script from the SD card.
    SdRun { file: String },
    /// Delete an SD-card file.
    SdRm { file: String },
    /// Stop a running SD-card script.
    SdStopRun,
    /// Raw unterminated data, used when streaming content into an open
    /// internal (SPIFFS) file.
    RawData(Vec<u8>),
}

impl Command {
    /// Renders the complete on-wire form, including the trailing newline
    /// for every line-oriented command.  Stream chunks and raw data are the
    /// only unterminated frames (see module docs).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::SdStreamWrite { chunk } => {
                let mut out = b"sd_stream_write ".to_vec();
                out.extend_from_slice(chunk);
                out
            }
            Command::RawData(data) => data.clone(),
            other => {
                let mut line = other.line();
                line.push('\n');
                line.into_bytes()
            }
        }
    }

    /// Whether this command is answered by an out-of-band `KEY_ACK:` event
    /// (rather than only the positional generic reply).
    pub fn expects_key_ack(&self) -> bool {
        matches!(self, Command::KeyAck(_))
    }

    fn line(&self) -> String {
        match self {
            Command::Key(op) => format!("key {op}"),
            Command::KeyAck(op) => format!("key_ack {op}"),
            Command::Status => "status".into(),
            Command::Version => "version".into(),
            Command::Mem => "mem".into(),
            Command::Ls => "ls".into(),
            Command::Stream { file } => format!("stream \"{}\"", spiffs_name(file)),
            Command::Read => "read".into(),
            Command::Close => "close".into(),
            Command::Create { file } => format!("create \"{}\"", spiffs_name(file)),
            Command::Remove { file } => format!("remove \"{}\"", spiffs_name(file)),
            Command::Rename { from, to } => {
                format!("rename \"{}\" \"{}\"", spiffs_name(from), spiffs_name(to))
            }
            Command::Run { file } => format!("run \"{}\"", spiffs_name(file)),
            Command::Stop { file: Some(f) } => format!("stop \"{}\"", spiffs_name(f)),
            Command::Stop { file: None } => "stop".into(),
            Command::Format => "format".into(),
            Command::SetAutorun { file } => format!("set autorun \"{}\"", spiffs_name(file)),
            Command::SdLs => "sd_ls".into(),
            Command::SdCat { file } => format!("sd_cat \"{file}\""),
            Command::SdStreamWriteBegin { file } => format!("sd_stream_write_begin \"{file}\""),
            Command::SdStreamWrite { .. } | Command::RawData(_) => {
                unreachable!("unterminated frames are handled in encode()")
            }
            Command::SdStop => "sd_stop".into(),
            Command::SdRun { file } => format!("sd_run \"{file}\""),
            Command::SdRm { file } => format!("sd_rm \"{file}\""),
            Command::SdStopRun => "sd_stop_run".into(),
        }
    }
}

/// Normalizes an internal (SPIFFS) file name the way the original front end
/// did: ensure a leading `/` and replace spaces, which the device CLI cannot
/// parse inside quoted arguments, with `-`.
pub fn spiffs_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let mut fixed = String::with_capacity(name.len() + 1);
    if !name.starts_with('/') {
        fixed.push('/');
    }
    for ch in name.chars() {
        fixed.push(if ch == ' ' { '-' } else { ch });
    }
    fixed
}
