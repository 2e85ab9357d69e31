//! Wire protocol: outbound command lines, inbound event classification,
//! payload chunking, and local sequence numbering.

pub mod chunk;
pub mod command;
pub mod event;
pub mod sequence;

pub use chunk::{chunk_count, chunk_payload, Chunk};
pub use command::{Command, HidCommand};
pub use event::{AckStatus, DeviceEvent};
pub use sequence::SequenceCounter;
