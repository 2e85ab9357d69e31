//! ExecutionEngine: serialized, fail-fast execution of command programs.
//!
//! A program is a list of [`Operation`]s executed strictly in order, each
//! waiting for its acknowledgement before the next starts.  The first
//! failure halts the remainder: operations type keystrokes on a live
//! target, and continuing after a miss produces garbage input that cannot
//! be rolled back.
//!
//! One engine runs one program.  The session moves `Init → Running →
//! Completed | HaltedError | HaltedStopped` and never runs twice; build a
//! fresh engine for the next program.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use duckwire_core::protocol::command::{Command, HidCommand};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::config::ClientConfig;
use crate::infrastructure::ack::AckError;
use crate::infrastructure::link::DeviceLink;

use super::script::ScriptError;
use super::streamer::{ChunkStreamer, StreamError};

/// One step of a command program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Type text as keystrokes, without a trailing ENTER.
    Type(String),
    /// Type text as keystrokes and press ENTER after the last line.
    TypeLine(String),
    /// Press a key combo: modifiers plus one terminal key.
    Press(Vec<String>),
    /// Send raw HID usage codes.
    Keycode(Vec<u8>),
    /// Pause for the given number of milliseconds.
    Delay(u64),
    /// Set an indicator LED.
    Led { led: u8, on: bool },
    /// Switch the device keyboard layout.
    Locale(String),
    MouseMove { dx: i32, dy: i32 },
    MouseClick(u8),
    MouseScroll(i32),
    MousePress(u8),
    MouseRelease(u8),
    /// Annotation only; never reaches the wire.
    Comment(String),
}

/// Lifecycle of one engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Running,
    Completed,
    /// Halted by a failed operation.
    HaltedError,
    /// Halted by an explicit stop request.
    HaltedStopped,
}

/// Why a program run ended early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("device is not connected")]
    NotConnected,

    #[error(transparent)]
    Ack(#[from] AckError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The program itself was rejected (over the operation ceiling).
    #[error(transparent)]
    Program(#[from] ScriptError),

    #[error("execution stopped")]
    Stopped,

    /// The engine already ran; sessions are single-use.
    #[error("engine session already consumed")]
    SessionConsumed,
}

struct EngineSession {
    state: SessionState,
    completed: usize,
}

/// Serialized program executor over a device link.
pub struct ExecutionEngine {
    link: Arc<dyn DeviceLink>,
    streamer: ChunkStreamer,
    config: ClientConfig,
    session: Mutex<EngineSession>,
    stop: AtomicBool,
}

impl ExecutionEngine {
    pub fn new(link: Arc<dyn DeviceLink>, config: ClientConfig) -> Self {
        Self {
            streamer: ChunkStreamer::new(Arc::clone(&link)),
            link,
            config,
            session: Mutex::new(EngineSession {
                state: SessionState::Init,
                completed: 0,
            }),
            stop: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Number of program operations that completed, in program terms:
    /// comments and delays count even though they produce no wire
    /// traffic, so the value always lines up with positions in the
    /// program the caller submitted.
    pub fn completed(&self) -> usize {
        self.lock().completed
    }

    /// Requests a halt.  Idempotent; also cancels pending ack waits so an
    /// in-flight gated send returns promptly instead of running out its
    /// timeout.
    pub fn stop(&self) {
        if !self.stop.swap(true, Ordering::Relaxed) {
            info!("stop requested");
            self.link.cancel_pending();
        }
    }

    /// Runs the program to completion or first failure.
    pub async fn run(&self, program: Vec<Operation>) -> Result<(), EngineError> {
        {
            let mut session = self.lock();
            if session.state != SessionState::Init {
                return Err(EngineError::SessionConsumed);
            }
            session.state = SessionState::Running;
        }
        if !self.link.is_connected() {
            self.lock().state = SessionState::HaltedError;
            return Err(EngineError::NotConnected);
        }
        // The same runaway ceiling the recorder enforces at build time
        // guards programs handed in directly.
        if program.len() > self.config.op_ceiling {
            self.lock().state = SessionState::HaltedError;
            return Err(EngineError::Program(ScriptError::CeilingExceeded(
                self.config.op_ceiling,
            )));
        }

        let total = program.len();
        info!(operations = total, "running program");
        for (index, operation) in program.into_iter().enumerate() {
            if self.stop.load(Ordering::Relaxed) {
                warn!(completed = index, total, "program stopped");
                self.lock().state = SessionState::HaltedStopped;
                return Err(EngineError::Stopped);
            }
            if let Err(error) = self.execute(&operation).await {
                // A cancelled ack during a stop is the stop, not a fault.
                if self.stop.load(Ordering::Relaxed) {
                    self.lock().state = SessionState::HaltedStopped;
                    return Err(EngineError::Stopped);
                }
                warn!(%error, operation = ?operation, "operation failed; halting");
                self.lock().state = SessionState::HaltedError;
                return Err(error);
            }
            self.lock().completed = index + 1;
            if self.config.op_settle > Duration::ZERO {
                tokio::time::sleep(self.config.op_settle).await;
            }
        }

        self.lock().state = SessionState::Completed;
        info!(operations = total, "program complete");
        Ok(())
    }

    async fn execute(&self, operation: &Operation) -> Result<(), EngineError> {
        let policy = self.config.text_policy();
        match operation {
            Operation::Type(text) => self.streamer.send_text(text, false, &policy).await?,
            Operation::TypeLine(text) => self.streamer.send_text(text, true, &policy).await?,
            Operation::Press(keys) => self.gated(HidCommand::Combo(keys.clone())).await?,
            Operation::Keycode(codes) => self.gated(HidCommand::Keycode(codes.clone())).await?,
            Operation::Delay(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
            Operation::Led { led, on } => {
                self.gated(HidCommand::Led { led: *led, on: *on }).await?
            }
            Operation::Locale(code) => self.gated(HidCommand::Locale(code.clone())).await?,
            Operation::MouseMove { dx, dy } => {
                self.gated(HidCommand::MouseMove { dx: *dx, dy: *dy }).await?
            }
            Operation::MouseClick(btn) => self.gated(HidCommand::MouseClick(*btn)).await?,
            Operation::MouseScroll(amt) => self.gated(HidCommand::MouseScroll(*amt)).await?,
            Operation::MousePress(btn) => self.gated(HidCommand::MousePress(*btn)).await?,
            Operation::MouseRelease(btn) => self.gated(HidCommand::MouseRelease(*btn)).await?,
            Operation::Comment(text) => debug!(comment = %text, "skipping comment"),
        }
        Ok(())
    }

    async fn gated(&self, op: HidCommand) -> Result<(), AckError> {
        self.link
            .send_gated(Command::KeyAck(op), self.config.ack_timeout)
            .await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineSession> {
        self.session.lock().expect("engine session lock poisoned")
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake_link::FakeLink;

    fn quick_config() -> ClientConfig {
        ClientConfig {
            op_settle: Duration::ZERO,
            ..ClientConfig::default()
        }
    }

    fn engine(link: &Arc<FakeLink>) -> ExecutionEngine {
        ExecutionEngine::new(
            Arc::clone(link) as Arc<dyn DeviceLink>,
            quick_config(),
        )
    }

    #[tokio::test]
    async fn test_operations_execute_in_order() {
        let link = Arc::new(FakeLink::connected());
        let engine = engine(&link);

        engine
            .run(vec![
                Operation::Comment("setup".into()),
                Operation::Type("hi".into()),
                Operation::Press(vec!["CTRL".into(), "C".into()]),
                Operation::Led { led: 0, on: true },
            ])
            .await
            .unwrap();

        assert_eq!(
            link.frames(),
            vec![
                "key_ack STRING hi",
                "key_ack CTRL C",
                "key_ack LED 0 1",
            ]
        );
        assert_eq!(engine.state(), SessionState::Completed);
        assert_eq!(
            engine.completed(),
            4,
            "completed counts program positions, including the comment"
        );
    }

    #[tokio::test]
    async fn test_program_over_the_ceiling_is_rejected() {
        let link = Arc::new(FakeLink::connected());
        let config = ClientConfig {
            op_ceiling: 2,
            op_settle: Duration::ZERO,
            ..ClientConfig::default()
        };
        let engine = ExecutionEngine::new(Arc::clone(&link) as Arc<dyn DeviceLink>, config);

        let program = vec![Operation::Press(vec!["ENTER".into()]); 3];
        let result = engine.run(program).await;

        assert_eq!(
            result,
            Err(EngineError::Program(ScriptError::CeilingExceeded(2)))
        );
        assert_eq!(engine.state(), SessionState::HaltedError);
        assert!(link.frames().is_empty(), "nothing may reach the wire");
    }

    #[tokio::test]
    async fn test_first_failure_halts_the_rest() {
        let link = Arc::new(FakeLink::connected());
        link.script_gated(Ok(()));
        link.script_gated(Err(AckError::Device("ERROR".into())));
        let engine = engine(&link);

        let result = engine
            .run(vec![
                Operation::Press(vec!["ENTER".into()]),
                Operation::Press(vec!["TAB".into()]),
                Operation::Type("never typed".into()),
            ])
            .await;

        assert!(matches!(result, Err(EngineError::Ack(AckError::Device(_)))));
        assert_eq!(engine.state(), SessionState::HaltedError);
        assert_eq!(engine.completed(), 1);
        assert_eq!(link.frames(), vec!["key_ack ENTER", "key_ack TAB"]);
    }

    #[tokio::test]
    async fn test_not_connected_halts_before_first_op() {
        let link = Arc::new(FakeLink::disconnected());
        let engine = engine(&link);

        let result = engine.run(vec![Operation::Type("x".into())]).await;
        assert_eq!(result, Err(EngineError::NotConnected));
        assert_eq!(engine.state(), SessionState::HaltedError);
        assert!(link.frames().is_empty());
    }

    #[tokio::test]
    async fn test_stop_halts_between_operations() {
        let link = Arc::new(FakeLink::connected());
        let engine = engine(&link);

        engine.stop();
        let result = engine.run(vec![Operation::Type("x".into())]).await;

        assert_eq!(result, Err(EngineError::Stopped));
        assert_eq!(engine.state(), SessionState::HaltedStopped);
        assert!(link.was_cancelled());
        assert!(link.frames().is_empty());
    }

    #[tokio::test]
    async fn test_session_is_single_use() {
        let link = Arc::new(FakeLink::connected());
        let engine = engine(&link);

        engine.run(vec![]).await.unwrap();
        let again = engine.run(vec![]).await;
        assert_eq!(again, Err(EngineError::SessionConsumed));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let link = Arc::new(FakeLink::connected());
        let engine = engine(&link);
        engine.stop();
        engine.stop();
        assert!(link.was_cancelled());
    }
}
