//! The device-link seam: one trait the application layer talks through,
//! and the wire-backed implementation that glues the transport queue, the
//! two ack streams, and the inbound event router together.
//!
//! The link owns routing, not I/O.  Actual socket reads/writes live in the
//! WebSocket driver ([`crate::infrastructure::ws`]), which feeds inbound
//! frames to [`WireLink::handle_frame`] and drains outbound frames from the
//! channel the link writes into.  That keeps every routing rule testable
//! without a socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use duckwire_core::protocol::command::Command;
use duckwire_core::protocol::event::DeviceEvent;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::status::SessionConnectivity;
use crate::infrastructure::ack::{AckCoordinator, AckError, AckTicket};
use crate::infrastructure::queue::TransportQueue;

/// Transport-level failures surfaced to the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// No device connection is established.
    #[error("device is not connected")]
    NotConnected,

    /// The connection dropped while a request was outstanding.
    #[error("device connection closed")]
    Closed,
}

/// Out-of-band SD-card response frames, in arrival order.
///
/// Multi-part SD responses (`SD_LS:`/`SD_CAT:` lines closed by `SD_END:`)
/// bypass the request/reply queue; collectors consume them from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdEvent {
    /// One line of a directory listing.
    List(String),
    /// One block of a file read.
    Data(String),
    /// End of the current multi-part response.
    End,
}

/// Everything the application layer may do with a connected device.
///
/// The two gated sends differ only in which ack stream confirms them; the
/// streams are independent FIFOs and must never be merged.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Queues a fire-and-forget command.
    fn send(&self, command: Command) -> Result<(), LinkError>;

    /// Queues a command ahead of all non-priority traffic.
    fn send_priority(&self, command: Command) -> Result<(), LinkError>;

    /// Queues a command and waits for its positional generic reply.
    async fn request(&self, command: Command) -> Result<String, LinkError>;

    /// Queues an ack-gated HID command and waits for its `KEY_ACK:`.
    async fn send_gated(&self, command: Command, timeout: Duration) -> Result<(), AckError>;

    /// Queues an SD write-stream chunk and waits for its `SD_ACK:`.
    async fn send_chunk_gated(&self, command: Command, timeout: Duration) -> Result<(), AckError>;

    /// Fails every pending ack wait with [`AckError::Cancelled`].
    fn cancel_pending(&self);
}

/// The wire-backed link.
///
/// Inbound timeline: the socket reader calls [`WireLink::handle_frame`]
/// for every frame.  Outbound timeline: a fixed-interval ticker calls
/// [`WireLink::pump_tick`], which moves at most one frame from the queue
/// into the outbound channel.  The queue mutex is only ever held for the
/// duration of one synchronous call, never across an await.
pub struct WireLink {
    queue: Mutex<TransportQueue>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    key_acks: AckCoordinator,
    sd_acks: AckCoordinator,
    sd_events: mpsc::UnboundedSender<SdEvent>,
    sd_events_rx: Mutex<Option<mpsc::UnboundedReceiver<SdEvent>>>,
    connected: AtomicBool,
    connectivity: Arc<SessionConnectivity>,
}

impl WireLink {
    /// Builds a link writing outbound frames into `outbound`.
    pub fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        connectivity: Arc<SessionConnectivity>,
    ) -> Self {
        let (sd_tx, sd_rx) = mpsc::unbounded_channel();
        Self {
            queue: Mutex::new(TransportQueue::new()),
            outbound,
            key_acks: AckCoordinator::new(),
            sd_acks: AckCoordinator::new(),
            sd_events: sd_tx,
            sd_events_rx: Mutex::new(Some(sd_rx)),
            connected: AtomicBool::new(false),
            connectivity,
        }
    }

    /// Takes the SD event receiver.  There is exactly one consumer; a
    /// second call returns `None`.
    pub fn take_sd_events(&self) -> Option<mpsc::UnboundedReceiver<SdEvent>> {
        self.lock_sd_rx().take()
    }

    /// Marks the link connected or disconnected.
    ///
    /// On disconnect the queue is reset and every pending ack wait is
    /// cancelled: positional reply pairing and FIFO ack pairing are only
    /// trustworthy within one connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        if self.connectivity.set_connected(connected) {
            info!(connected, "device connectivity changed");
        }
        if !connected {
            self.lock_queue().reset();
            self.key_acks.cancel_all();
            self.sd_acks.cancel_all();
        }
    }

    /// Routes one inbound frame.
    ///
    /// Out-of-band events go to their coordinator or channel; everything
    /// else is the positional reply to the in-flight request.
    pub fn handle_frame(&self, frame: &str) {
        match DeviceEvent::parse(frame) {
            DeviceEvent::KeyAck(status) => self.key_acks.on_ack(status),
            DeviceEvent::SdAck(status) => self.sd_acks.on_ack(status),
            DeviceEvent::SdList(line) => self.push_sd_event(SdEvent::List(line)),
            DeviceEvent::SdData(block) => self.push_sd_event(SdEvent::Data(block)),
            DeviceEvent::SdEnd => self.push_sd_event(SdEvent::End),
            DeviceEvent::Reply(reply) => self.lock_queue().on_reply(&reply),
        }
    }

    /// Dispatch tick: transmits at most one queued frame if the channel is
    /// clear to send.
    pub fn pump_tick(&self) {
        if !self.is_connected() {
            return;
        }
        let frame = self.lock_queue().take_ready();
        if let Some(frame) = frame {
            if self.outbound.send(frame).is_err() {
                // Writer task is gone; the socket is dead.
                warn!("outbound channel closed; dropping in-flight request");
                self.lock_queue().on_send_error();
                self.set_connected(false);
            }
        }
    }

    /// True when nothing is queued or awaiting its reply.  Front ends
    /// check this before tearing a connection down so queued
    /// fire-and-forget commands actually reach the device.
    pub fn is_drained(&self) -> bool {
        let queue = self.lock_queue();
        queue.is_empty() && queue.is_clear_to_send()
    }

    fn push_sd_event(&self, event: SdEvent) {
        if self.sd_events.send(event).is_err() {
            debug!("sd event dropped: collector gone");
        }
    }

    fn enqueue(&self, command: Command, priority: bool) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.lock_queue().enqueue(command, None, priority);
        Ok(())
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, TransportQueue> {
        self.queue.lock().expect("transport queue lock poisoned")
    }

    fn lock_sd_rx(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedReceiver<SdEvent>>> {
        self.sd_events_rx.lock().expect("sd receiver lock poisoned")
    }

    fn register_for(&self, command: &Command) -> AckTicket {
        if command.expects_key_ack() {
            self.key_acks.register()
        } else {
            self.sd_acks.register()
        }
    }
}

#[async_trait]
impl DeviceLink for WireLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn send(&self, command: Command) -> Result<(), LinkError> {
        self.enqueue(command, false)
    }

    fn send_priority(&self, command: Command) -> Result<(), LinkError> {
        self.enqueue(command, true)
    }

    async fn request(&self, command: Command) -> Result<String, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        self.lock_queue().enqueue(
            command,
            Some(Box::new(move |reply| {
                let _ = tx.send(reply);
            })),
            false,
        );
        // The callback is dropped without firing if the queue resets,
        // which surfaces here as a closed channel.
        rx.await.map_err(|_| LinkError::Closed)
    }

    async fn send_gated(&self, command: Command, timeout: Duration) -> Result<(), AckError> {
        let ticket = self.register_for(&command);
        if self.enqueue(command, false).is_err() {
            return Err(AckError::Cancelled);
        }
        ticket.wait(timeout).await
    }

    async fn send_chunk_gated(&self, command: Command, timeout: Duration) -> Result<(), AckError> {
        let ticket = self.sd_acks.register();
        if self.enqueue(command, false).is_err() {
            return Err(AckError::Cancelled);
        }
        ticket.wait(timeout).await
    }

    fn cancel_pending(&self) {
        self.key_acks.cancel_all();
        self.sd_acks.cancel_all();
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use duckwire_core::protocol::command::HidCommand;

    fn link() -> (Arc<WireLink>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(WireLink::new(tx, Arc::new(SessionConnectivity::new())));
        link.set_connected(true);
        (link, rx)
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> String {
        String::from_utf8(rx.try_recv().expect("frame expected")).unwrap()
    }

    #[tokio::test]
    async fn test_pump_moves_one_frame_per_tick() {
        let (link, mut rx) = link();
        link.send(Command::Status).unwrap();
        link.send(Command::Version).unwrap();

        link.pump_tick();
        assert_eq!(sent(&mut rx), "status\n");
        // Channel not clear until the reply arrives.
        link.pump_tick();
        assert!(rx.try_recv().is_err());

        link.handle_frame("connected");
        link.pump_tick();
        assert_eq!(sent(&mut rx), "version\n");
    }

    #[tokio::test]
    async fn test_request_resolves_with_positional_reply() {
        let (link, mut rx) = link();
        let l = Arc::clone(&link);
        let pending = tokio::spawn(async move { l.request(Command::Version).await });

        // Let the request land in the queue before pumping.
        tokio::task::yield_now().await;
        link.pump_tick();
        assert_eq!(sent(&mut rx), "version\n");
        link.handle_frame("Version 1.2.0");

        assert_eq!(pending.await.unwrap(), Ok("Version 1.2.0".into()));
    }

    #[tokio::test]
    async fn test_key_ack_routes_to_gated_send() {
        let (link, mut rx) = link();
        let l = Arc::clone(&link);
        let gated = tokio::spawn(async move {
            l.send_gated(
                Command::KeyAck(HidCommand::String("hi".into())),
                Duration::from_secs(5),
            )
            .await
        });

        tokio::task::yield_now().await;
        link.pump_tick();
        assert_eq!(sent(&mut rx), "key_ack STRING hi\n");
        link.handle_frame("KEY_ACK:OK");

        assert_eq!(gated.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_ack_streams_are_independent() {
        let (link, _rx) = link();
        let key = tokio::spawn({
            let l = Arc::clone(&link);
            async move {
                l.send_gated(
                    Command::KeyAck(HidCommand::String("x".into())),
                    Duration::from_secs(5),
                )
                .await
            }
        });
        let sd = tokio::spawn({
            let l = Arc::clone(&link);
            async move {
                l.send_chunk_gated(
                    Command::SdStreamWrite {
                        chunk: b"abc".to_vec(),
                    },
                    Duration::from_secs(5),
                )
                .await
            }
        });
        tokio::task::yield_now().await;

        // An SD failure must not touch the key-ack wait.
        link.handle_frame("SD_ACK:WRITE FAIL");
        link.handle_frame("KEY_ACK:OK");

        assert_eq!(key.await.unwrap(), Ok(()));
        assert_eq!(
            sd.await.unwrap(),
            Err(AckError::Device("WRITE FAIL".into()))
        );
    }

    #[tokio::test]
    async fn test_sd_frames_flow_to_event_channel() {
        let (link, _rx) = link();
        let mut events = link.take_sd_events().unwrap();
        assert!(link.take_sd_events().is_none(), "single consumer");

        link.handle_frame("SD_LS:a.ds,10");
        link.handle_frame("SD_CAT:REM hi");
        link.handle_frame("SD_END:OK");

        assert_eq!(events.try_recv().unwrap(), SdEvent::List("a.ds,10".into()));
        assert_eq!(events.try_recv().unwrap(), SdEvent::Data("REM hi".into()));
        assert_eq!(events.try_recv().unwrap(), SdEvent::End);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_and_rejects() {
        let (link, _rx) = link();
        let gated = tokio::spawn({
            let l = Arc::clone(&link);
            async move {
                l.send_gated(
                    Command::KeyAck(HidCommand::String("x".into())),
                    Duration::from_secs(5),
                )
                .await
            }
        });
        tokio::task::yield_now().await;

        link.set_connected(false);
        assert_eq!(gated.await.unwrap(), Err(AckError::Cancelled));
        assert_eq!(link.send(Command::Status), Err(LinkError::NotConnected));
        assert_eq!(
            link.request(Command::Status).await,
            Err(LinkError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_priority_send_jumps_queue() {
        let (link, mut rx) = link();
        link.send(Command::Status).unwrap();
        link.send_priority(Command::SdStop).unwrap();

        link.pump_tick();
        assert_eq!(sent(&mut rx), "sd_stop\n");
    }
}
