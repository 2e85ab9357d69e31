//! Transport plumbing: the request queue, the ack registries, the
//! device-link seam, and the WebSocket driver.

pub mod ack;
pub mod fake_link;
pub mod link;
pub mod queue;
pub mod ws;

pub use ack::{AckCoordinator, AckError, AckTicket};
pub use fake_link::FakeLink;
pub use link::{DeviceLink, LinkError, SdEvent, WireLink};
pub use queue::{ReplyCallback, TransportQueue};
