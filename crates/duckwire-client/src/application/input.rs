//! Live interactive input: keystrokes forwarded as they happen.
//!
//! Unlike program execution, live input is fire-and-forget: a human types
//! at human speed, so each event is queued as a plain `key` command with
//! no ack gate.  The session tracks armed modifiers through
//! [`ComboState`] and reports modifier/typing/layout transitions to the
//! notifier.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use duckwire_core::domain::keys::{ComboState, Modifier, ReleaseOutcome, ToggleOutcome};
use duckwire_core::protocol::command::{Command, HidCommand};
use tracing::trace;

use crate::domain::config::ClientConfig;
use crate::infrastructure::link::{DeviceLink, LinkError};

use super::notify::ChangeTracker;

/// Forwards live keyboard input over a device link.
///
/// The typing indicator lights on every typed character and goes idle
/// again once [`InputSession::typing_tick`] observes the configured
/// typing window elapsed without input; front ends call that on their
/// regular UI tick.
pub struct InputSession {
    link: Arc<dyn DeviceLink>,
    combo: Mutex<ComboState>,
    notifier: Arc<ChangeTracker>,
    typing_window: Duration,
    last_keystroke: Mutex<Option<Instant>>,
}

impl InputSession {
    pub fn new(
        link: Arc<dyn DeviceLink>,
        notifier: Arc<ChangeTracker>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            link,
            combo: Mutex::new(ComboState::new(config.double_tap_window)),
            notifier,
            typing_window: config.typing_window,
            last_keystroke: Mutex::new(None),
        }
    }

    /// Presses a named key, composed with whatever modifiers are armed.
    pub fn press_key(&self, key: &str) -> Result<(), LinkError> {
        let command = self.lock().compose_key(key);
        trace!(%command, "live key press");
        self.send(command)?;
        self.report_modifiers();
        Ok(())
    }

    /// Types one character.
    pub fn type_char(&self, ch: char) -> Result<(), LinkError> {
        let command = self.lock().compose_char(ch);
        self.send(command)?;
        self.report_modifiers();
        *self.lock_keystroke() = Some(Instant::now());
        self.notifier.typing(true);
        Ok(())
    }

    /// Handles a modifier tap.  A double-tap within the configured window
    /// sends the modifier as a standalone press.
    pub fn tap_modifier(&self, modifier: Modifier) -> Result<(), LinkError> {
        let outcome = self.lock().toggle(modifier, Instant::now());
        if outcome == ToggleOutcome::SendAlone {
            self.send(HidCommand::Combo(vec![modifier.wire_name().into()]))?;
        }
        self.report_modifiers();
        Ok(())
    }

    /// Handles a modifier key-up event.  `still_held` is the input
    /// source's own report; an armed modifier survives a key-up that the
    /// source says did not actually release it.
    pub fn release_modifier(&self, modifier: Modifier, still_held: bool) {
        if self.lock().release_if(modifier, still_held) == ReleaseOutcome::Cleared {
            self.report_modifiers();
        }
    }

    /// Switches the device keyboard layout.
    pub fn change_layout(&self, layout: &str) -> Result<(), LinkError> {
        self.send(HidCommand::Locale(layout.into()))?;
        self.notifier.layout(layout);
        Ok(())
    }

    /// Drops the typing indicator once the typing window has elapsed
    /// since the last typed character.  Called by the front end on its
    /// UI tick with the current time.
    pub fn typing_tick(&self, now: Instant) {
        let idle = {
            let mut last = self.lock_keystroke();
            match *last {
                Some(at) if now.duration_since(at) >= self.typing_window => {
                    *last = None;
                    true
                }
                _ => false,
            }
        };
        if idle {
            self.notifier.typing(false);
        }
    }

    pub fn armed_modifiers(&self) -> Vec<Modifier> {
        self.lock().armed().to_vec()
    }

    fn send(&self, op: HidCommand) -> Result<(), LinkError> {
        self.link.send(Command::Key(op))
    }

    fn report_modifiers(&self) {
        self.notifier.modifiers(&self.armed_modifiers());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ComboState> {
        self.combo.lock().expect("combo state lock poisoned")
    }

    fn lock_keystroke(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_keystroke
            .lock()
            .expect("keystroke time lock poisoned")
    }
}

// ───────────────────────────── Tests ─────────────────────────────
