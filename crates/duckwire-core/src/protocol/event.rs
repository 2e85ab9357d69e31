//! Inbound event classification.
//!
//! Everything the device sends back arrives as text frames on the same
//! duplex channel.  Most frames are the generic reply to the most recently
//! dispatched request (correlation is positional; the protocol carries no
//! request id).  A handful of prefixes mark out-of-band events that must be
//! routed around the request/reply queue:
//!
//! | Prefix     | Meaning                                             |
//! |------------|-----------------------------------------------------|
//! | `KEY_ACK:` | async confirmation of an ack-gated HID command      |
//! | `SD_LS:`   | one line of a multi-part SD directory listing       |
//! | `SD_CAT:`  | one block of a multi-part SD file read              |
//! | `SD_ACK:`  | flow-control ack for one SD write-stream chunk      |
//! | `SD_END:`  | end marker of a multi-part SD response              |
//!
//! Anything else is a [`DeviceEvent::Reply`].

use serde::{Deserialize, Serialize};

/// Result carried by an acknowledgement event.
///
/// The device reports `OK` on success and a short error token (for example
/// `ERROR`) on failure; the raw token is preserved so callers can surface it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    Ok,
    /// Device-reported failure, carrying the status text after the prefix.
    Error(String),
}

impl AckStatus {
    fn parse(raw: &str) -> Self {
        let token = raw.trim();
        if token == "OK" {
            AckStatus::Ok
        } else {
            AckStatus::Error(token.to_string())
        }
    }
}

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Generic reply, consumed positionally by the transport queue.
    Reply(String),
    /// Out-of-band confirmation of an ack-gated HID command.
    KeyAck(AckStatus),
    /// One line of an SD directory listing (without the marker).
    SdList(String),
    /// One block of an SD file read (without the marker).
    SdData(String),
    /// Flow-control ack for an SD write-stream chunk.
    SdAck(AckStatus),
    /// End of the current multi-part SD response.
    SdEnd,
}

impl DeviceEvent {
    /// Classifies one raw inbound frame.
    pub fn parse(raw: &str) -> DeviceEvent {
        if let Some(rest) = raw.strip_prefix("KEY_ACK:") {
            return DeviceEvent::KeyAck(AckStatus::parse(rest));
        }
        if let Some(rest) = raw.strip_prefix("SD_LS:") {
            return DeviceEvent::SdList(rest.to_string());
        }
        if let Some(rest) = raw.strip_prefix("SD_CAT:") {
            return DeviceEvent::SdData(rest.to_string());
        }
        if let Some(rest) = raw.strip_prefix("SD_ACK:") {
            return DeviceEvent::SdAck(AckStatus::parse(rest));
        }
        if raw.starts_with("SD_END:") {
            return DeviceEvent::SdEnd;
        }
        tracing::trace!(frame = raw, "generic reply");
        DeviceEvent::Reply(raw.to_string())
    }
}
