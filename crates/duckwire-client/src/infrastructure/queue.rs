//! TransportQueue: single-outstanding-request discipline.
//!
//! The device channel has no multiplexing: it accepts one request at a
//! time and answers each with one generic reply.  This queue serializes
//! all outbound traffic behind a clear-to-send flag:
//!
//! 1. Callers enqueue requests at any time (non-blocking submit).
//! 2. A fixed-interval dispatch tick calls [`TransportQueue::take_ready`];
//!    if the channel is clear and the queue non-empty, the head is popped,
//!    its frame handed back for transmission, its callback stored, and the
//!    flag cleared.
//! 3. The next inbound generic reply re-arms the flag and is routed to the
//!    stored callback.
//!
//! # Positional correlation (known limitation)
//!
//! The protocol carries no request id, so the next inbound generic reply
//! is always routed to the callback of the most recently dispatched
//! request.  A dropped or duplicated reply therefore desynchronizes all
//! subsequent pairings until reconnect.  Requests carry a local sequence
//! id for logging only; nothing is added to the wire.
//!
//! # Priority
//!
//! A priority enqueue bypasses FIFO to the head of the queue but never
//! reorders among other priority items: two priority enqueues dispatch in
//! the order they were submitted.
//!
//! All mutation must happen on one dispatch timeline (the tick handler and
//! the inbound event handler); the owner wraps the queue in a mutex and
//! never holds the lock across an await.

use std::collections::VecDeque;

use duckwire_core::protocol::command::Command;
use duckwire_core::protocol::sequence::SequenceCounter;
use tracing::{debug, trace, warn};

/// Callback invoked with the generic reply to a dispatched request.
pub type ReplyCallback = Box<dyn FnOnce(String) + Send>;

struct PendingRequest {
    seq: u64,
    frame: Vec<u8>,
    on_reply: Option<ReplyCallback>,
    priority: bool,
}

/// The outbound request queue.  One per device link.
pub struct TransportQueue {
    queue: VecDeque<PendingRequest>,
    /// Callback of the request currently awaiting its reply, if any.
    in_flight: Option<(u64, Option<ReplyCallback>)>,
    clear_to_send: bool,
    seq: SequenceCounter,
}

impl Default for TransportQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportQueue {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: None,
            clear_to_send: true,
            seq: SequenceCounter::new(),
        }
    }

    /// Appends a request (or inserts it ahead of non-priority items when
    /// `priority` is set).  Returns the request's local sequence id.
    pub fn enqueue(
        &mut self,
        command: Command,
        on_reply: Option<ReplyCallback>,
        priority: bool,
    ) -> u64 {
        let seq = self.seq.next();
        let request = PendingRequest {
            seq,
            frame: command.encode(),
            on_reply,
            priority,
        };
        if priority {
            // Behind any earlier priority items, ahead of everything else.
            let at = self.queue.iter().take_while(|r| r.priority).count();
            self.queue.insert(at, request);
        } else {
            self.queue.push_back(request);
        }
        trace!(seq, priority, depth = self.queue.len(), "request queued");
        seq
    }

    /// Dispatch tick: pops the head if the channel is clear, stores its
    /// callback, clears the flag, and returns the frame to transmit.
    pub fn take_ready(&mut self) -> Option<Vec<u8>> {
        if !self.clear_to_send {
            return None;
        }
        let request = self.queue.pop_front()?;
        self.clear_to_send = false;
        debug!(seq = request.seq, "dispatching request");
        self.in_flight = Some((request.seq, request.on_reply));
        Some(request.frame)
    }

    /// Routes an inbound generic reply to the most recently dispatched
    /// request's callback and re-arms the channel.
    ///
    /// The callback is invoked synchronously.  A reply with nothing in
    /// flight (device chatter after a desync) still re-arms the channel so
    /// the queue never wedges.
    pub fn on_reply(&mut self, reply: &str) {
        match self.in_flight.take() {
            Some((seq, Some(callback))) => {
                trace!(seq, "reply routed to caller");
                callback(reply.to_string());
            }
            Some((seq, None)) => {
                trace!(seq, reply, "reply logged (no caller)");
            }
            None => {
                warn!(reply, "reply with no request in flight");
            }
        }
        self.clear_to_send = true;
    }

    /// Marks the in-flight send as failed.  Its callback is discarded and
    /// the channel re-armed, so one failed send does not wedge the queue;
    /// there is no automatic retry.
    pub fn on_send_error(&mut self) {
        if let Some((seq, _)) = self.in_flight.take() {
            warn!(seq, "send failed; dropping pending callback");
        }
        self.clear_to_send = true;
    }

    /// Drops every queued request and the in-flight callback.  Used on
    /// disconnect; positional pairing is only trustworthy again after a
    /// fresh connection.
    pub fn reset(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();
        self.in_flight = None;
        self.clear_to_send = true;
        if dropped > 0 {
            debug!(dropped, "queue reset");
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_clear_to_send(&self) -> bool {
        self.clear_to_send
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckwire_core::protocol::command::HidCommand;
    use std::sync::{Arc, Mutex};

    fn cmd(text: &str) -> Command {
        Command::Key(HidCommand::String(text.into()))
    }

    fn frame_text(frame: Vec<u8>) -> String {
        String::from_utf8(frame).unwrap()
    }

    #[test]
    fn test_dispatch_order_equals_enqueue_order() {
        let mut q = TransportQueue::new();
        for i in 0..5 {
            q.enqueue(cmd(&format!("msg{i}")), None, false);
        }

        let mut sent = Vec::new();
        while let Some(frame) = q.take_ready() {
            sent.push(frame_text(frame));
            q.on_reply("ok");
        }

        assert_eq!(
            sent,
            (0..5)
                .map(|i| format!("key STRING msg{i}\n"))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_at_most_one_request_in_flight() {
        let mut q = TransportQueue::new();
        q.enqueue(cmd("a"), None, false);
        q.enqueue(cmd("b"), None, false);

        assert!(q.take_ready().is_some());
        // No reply yet: the channel is not clear, nothing else dispatches.
        assert!(q.take_ready().is_none());
        assert!(q.take_ready().is_none());

        q.on_reply("ok");
        assert!(q.take_ready().is_some());
    }

    #[test]
    fn test_priority_goes_ahead_of_queued_items() {
        let mut q = TransportQueue::new();
        q.enqueue(cmd("first"), None, false);
        q.enqueue(cmd("second"), None, false);
        q.enqueue(cmd("urgent"), None, true);

        let head = frame_text(q.take_ready().unwrap());
        assert_eq!(head, "key STRING urgent\n");
    }

    #[test]
    fn test_priority_items_keep_their_mutual_order() {
        let mut q = TransportQueue::new();
        q.enqueue(cmd("normal"), None, false);
        q.enqueue(cmd("p1"), None, true);
        q.enqueue(cmd("p2"), None, true);

        let mut sent = Vec::new();
        while let Some(frame) = q.take_ready() {
            sent.push(frame_text(frame));
            q.on_reply("ok");
        }
        assert_eq!(
            sent,
            vec![
                "key STRING p1\n".to_string(),
                "key STRING p2\n".to_string(),
                "key STRING normal\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_reply_routes_to_most_recent_dispatch() {
        let mut q = TransportQueue::new();
        let got: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b"] {
            let got = Arc::clone(&got);
            let name = name.to_string();
            q.enqueue(
                cmd(&name),
                Some(Box::new(move |reply| {
                    got.lock().unwrap().push(format!("{name}:{reply}"));
                })),
                false,
            );
        }

        q.take_ready().unwrap();
        q.on_reply("r1");
        q.take_ready().unwrap();
        q.on_reply("r2");

        assert_eq!(
            *got.lock().unwrap(),
            vec!["a:r1".to_string(), "b:r2".to_string()]
        );
    }

    #[test]
    fn test_callback_fires_exactly_once() {
        let mut q = TransportQueue::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        q.enqueue(
            cmd("x"),
            Some(Box::new(move |_| *c.lock().unwrap() += 1)),
            false,
        );

        q.take_ready().unwrap();
        q.on_reply("one");
        // A stray duplicate reply must not fire the callback again.
        q.on_reply("two");
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_send_error_does_not_wedge_the_queue() {
        let mut q = TransportQueue::new();
        q.enqueue(cmd("bad"), Some(Box::new(|_| panic!("must be dropped"))), false);
        q.enqueue(cmd("good"), None, false);

        q.take_ready().unwrap();
        q.on_send_error();

        // Pumping resumes on the next tick.
        let next = frame_text(q.take_ready().unwrap());
        assert_eq!(next, "key STRING good\n");
    }

    #[test]
    fn test_reset_clears_queue_and_rearms() {
        let mut q = TransportQueue::new();
        q.enqueue(cmd("a"), None, false);
        q.take_ready().unwrap();
        q.enqueue(cmd("b"), None, false);

        q.reset();
        assert!(q.is_empty());
        assert!(q.is_clear_to_send());
        assert!(q.take_ready().is_none());
    }

    #[test]
    fn test_stray_reply_rearms_channel() {
        let mut q = TransportQueue::new();
        q.on_reply("device chatter");
        q.enqueue(cmd("a"), None, false);
        assert!(q.take_ready().is_some());
    }
}
