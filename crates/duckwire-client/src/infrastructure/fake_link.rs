//! In-memory [`DeviceLink`] double for tests.
//!
//! Records every frame it would have transmitted (decoded to text for easy
//! assertions) and answers gated sends and requests from scripted queues.
//! Unscripted gated sends succeed, so happy-path tests need no setup.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use duckwire_core::protocol::command::Command;

use crate::infrastructure::ack::AckError;
use crate::infrastructure::link::{DeviceLink, LinkError};

#[derive(Default)]
pub struct FakeLink {
    connected: AtomicBool,
    frames: Mutex<Vec<String>>,
    gated_results: Mutex<VecDeque<Result<(), AckError>>>,
    replies: Mutex<VecDeque<String>>,
    cancelled: AtomicBool,
}

impl FakeLink {
    pub fn connected() -> Self {
        let link = Self::default();
        link.connected.store(true, Ordering::Relaxed);
        link
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next gated send (either stream).
    pub fn script_gated(&self, result: Result<(), AckError>) {
        self.lock(&self.gated_results).push_back(result);
    }

    /// Queues the generic reply to the next `request`.
    pub fn script_reply(&self, reply: &str) {
        self.lock(&self.replies).push_back(reply.to_string());
    }

    /// Every frame sent so far, decoded to text, in send order.
    pub fn frames(&self) -> Vec<String> {
        self.lock(&self.frames).clone()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn record(&self, command: &Command) {
        let text = String::from_utf8_lossy(&command.encode())
            .trim_end_matches('\n')
            .to_string();
        self.lock(&self.frames).push(text);
    }

    fn next_gated(&self) -> Result<(), AckError> {
        self.lock(&self.gated_results).pop_front().unwrap_or(Ok(()))
    }

    fn lock<'a, T>(&self, m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        m.lock().expect("fake link lock poisoned")
    }
}

#[async_trait]
impl DeviceLink for FakeLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn send(&self, command: Command) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.record(&command);
        Ok(())
    }

    fn send_priority(&self, command: Command) -> Result<(), LinkError> {
        self.send(command)
    }

    async fn request(&self, command: Command) -> Result<String, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.record(&command);
        Ok(self.lock(&self.replies).pop_front().unwrap_or_default())
    }

    async fn send_gated(&self, command: Command, _timeout: Duration) -> Result<(), AckError> {
        if !self.is_connected() {
            return Err(AckError::Cancelled);
        }
        self.record(&command);
        self.next_gated()
    }

    async fn send_chunk_gated(&self, command: Command, _timeout: Duration) -> Result<(), AckError> {
        self.send_gated(command, _timeout).await
    }

    fn cancel_pending(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}
