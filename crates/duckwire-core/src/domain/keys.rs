//! Armed-modifier tracking and combo composition.
//!
//! The front end arms modifiers (CTRL/SHIFT/ALT/GUI) ahead of a terminal
//! key.  Pressing a non-modifier key composes all armed modifiers plus that
//! key into one combo command and clears the set.  Two defensive rules come
//! with this:
//!
//! - A modifier key-up clears its bit only when the input source confirms
//!   the modifier is actually released, which guards against stuck
//!   modifiers after focus loss.
//! - Re-tapping the *same* armed modifier within a short window (400 ms)
//!   means "send that modifier alone" rather than toggling it off — the
//!   double-tap convention for standalone modifier presses.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::protocol::command::HidCommand;

/// How long after arming a modifier a second tap still counts as a
/// double-tap.
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(400);

/// A keyboard modifier as the device names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Gui,
}

impl Modifier {
    /// The on-wire key name.
    pub fn wire_name(self) -> &'static str {
        match self {
            Modifier::Ctrl => "CTRL",
            Modifier::Shift => "SHIFT",
            Modifier::Alt => "ALT",
            Modifier::Gui => "GUI",
        }
    }
}

/// Outcome of a modifier tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The modifier is now armed.
    Armed,
    /// The modifier was armed and is now disarmed.
    Disarmed,
    /// Double-tap: the caller should send the modifier as a standalone
    /// combo.  The modifier is no longer armed.
    SendAlone,
}

/// Outcome of a modifier key-up observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The bit was cleared.
    Cleared,
    /// The input source still reports the modifier held; nothing changed.
    StillHeld,
    /// The modifier was not armed in the first place.
    NotArmed,
}

/// Tracks armed modifiers and composes combo commands.
///
/// Armed order is preserved, so `CTRL` then `ALT` then `T` composes
/// `CTRL ALT T`.
#[derive(Debug)]
pub struct ComboState {
    armed: Vec<Modifier>,
    last_tap: Option<(Modifier, Instant)>,
    double_tap_window: Duration,
}

impl Default for ComboState {
    fn default() -> Self {
        Self::new(DOUBLE_TAP_WINDOW)
    }
}

impl ComboState {
    pub fn new(double_tap_window: Duration) -> Self {
        Self {
            armed: Vec::new(),
            last_tap: None,
            double_tap_window,
        }
    }

    pub fn is_armed(&self, m: Modifier) -> bool {
        self.armed.contains(&m)
    }

    /// Currently armed modifiers in arm order.
    pub fn armed(&self) -> &[Modifier] {
        &self.armed
    }

    /// Arms a modifier (idempotent). Returns true if the set changed.
    pub fn arm(&mut self, m: Modifier) -> bool {
        if self.is_armed(m) {
            return false;
        }
        self.armed.push(m);
        true
    }

    /// Disarms a modifier. Returns true if the set changed.
    pub fn disarm(&mut self, m: Modifier) -> bool {
        let before = self.armed.len();
        self.armed.retain(|&x| x != m);
        self.armed.len() != before
    }

    /// Clears all armed modifiers.
    pub fn clear(&mut self) {
        self.armed.clear();
    }

    /// Handles a modifier tap at time `now`, applying the double-tap rule.
    pub fn toggle(&mut self, m: Modifier, now: Instant) -> ToggleOutcome {
        if let Some((last, at)) = self.last_tap {
            if last == m && now.duration_since(at) < self.double_tap_window {
                self.disarm(m);
                self.last_tap = None;
                return ToggleOutcome::SendAlone;
            }
        }
        self.last_tap = Some((m, now));
        if self.disarm(m) {
            ToggleOutcome::Disarmed
        } else {
            self.arm(m);
            ToggleOutcome::Armed
        }
    }

    /// Handles a modifier key-up.  The bit is cleared only when the input
    /// source reports the modifier no longer held.
    pub fn release_if(&mut self, m: Modifier, still_held: bool) -> ReleaseOutcome {
        if !self.is_armed(m) {
            return ReleaseOutcome::NotArmed;
        }
        if still_held {
            return ReleaseOutcome::StillHeld;
        }
        self.disarm(m);
        ReleaseOutcome::Cleared
    }

    /// Composes a named key press with whatever modifiers are armed and
    /// clears the set.
    pub fn compose_key(&mut self, key: &str) -> HidCommand {
        let mut parts: Vec<String> = self
            .armed
            .iter()
            .map(|m| m.wire_name().to_string())
            .collect();
        parts.push(key.to_string());
        self.armed.clear();
        HidCommand::Combo(parts)
    }

    /// Composes a typed character.
    ///
    /// Space becomes the `SPACE` key; a backslash is escaped for the device
    /// parser.  An armed SHIFT is folded into the character itself (shifted
    /// symbol or uppercase letter) rather than sent as a modifier, matching
    /// how the device types text.  Remaining armed modifiers compose a
    /// combo; otherwise the character goes out as a `STRING`.
    pub fn compose_char(&mut self, ch: char) -> HidCommand {
        if ch == ' ' {
            return self.compose_key("SPACE");
        }

        let mut text = if ch == '\\' {
            "\\\\".to_string()
        } else {
            ch.to_string()
        };

        if self.is_armed(Modifier::Shift) {
            text = shifted(ch).map(String::from).unwrap_or(text);
            self.disarm(Modifier::Shift);
        }

        if self.armed.is_empty() {
            HidCommand::String(text)
        } else {
            let mut parts: Vec<String> = self
                .armed
                .iter()
                .map(|m| m.wire_name().to_string())
                .collect();
            parts.push(text);
            self.armed.clear();
            HidCommand::Combo(parts)
        }
    }
}

/// Shifted form of a character on a US layout, if it has one.
fn shifted(ch: char) -> Option<char> {
    let sym = match ch {
        '1' => '!',
        '2' => '@',
        '3' => '#',
        '4' => '$',
        '5' => '%',
        '6' => '^',
        '7' => '&',
        '8' => '*',
        '9' => '(',
        '0' => ')',
        '-' => '_',
        '=' => '+',
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        ';' => ':',
        '\'' => '"',
        ',' => '<',
        '.' => '>',
        '/' => '?',
        '`' => '~',
        c if c.is_ascii_lowercase() => c.to_ascii_uppercase(),
        _ => return None,
    };
    Some(sym)
}
