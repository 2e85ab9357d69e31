//! State-change notifications for front ends.
//!
//! The runtime reports session state (connectivity, typing activity, armed
//! modifiers, keyboard layout) through one trait so front ends — the CLI
//! today, anything embedding the library tomorrow — subscribe without the
//! runtime knowing who listens.  [`ChangeTracker`] deduplicates: observers
//! hear about transitions, never repeats of the current value.

use std::sync::{Arc, Mutex};

use duckwire_core::domain::keys::Modifier;
use tracing::debug;

/// Observer for session state transitions.
#[cfg_attr(test, mockall::automock)]
pub trait StateNotifier: Send + Sync {
    fn connection_changed(&self, connected: bool);
    fn typing_changed(&self, typing: bool);
    fn modifiers_changed(&self, armed: Vec<Modifier>);
    fn layout_changed(&self, layout: String);
}

/// Notifier that logs transitions and nothing else.
#[derive(Default)]
pub struct LogNotifier;

impl StateNotifier for LogNotifier {
    fn connection_changed(&self, connected: bool) {
        debug!(connected, "connection changed");
    }

    fn typing_changed(&self, typing: bool) {
        debug!(typing, "typing changed");
    }

    fn modifiers_changed(&self, armed: Vec<Modifier>) {
        debug!(?armed, "armed modifiers changed");
    }

    fn layout_changed(&self, layout: String) {
        debug!(layout, "layout changed");
    }
}

#[derive(Default)]
struct Seen {
    connected: Option<bool>,
    typing: Option<bool>,
    modifiers: Option<Vec<Modifier>>,
    layout: Option<String>,
}

/// Change-only fan-in ahead of a notifier.
pub struct ChangeTracker {
    notifier: Arc<dyn StateNotifier>,
    seen: Mutex<Seen>,
}

impl ChangeTracker {
    pub fn new(notifier: Arc<dyn StateNotifier>) -> Self {
        Self {
            notifier,
            seen: Mutex::new(Seen::default()),
        }
    }

    pub fn connection(&self, connected: bool) {
        let changed = {
            let mut seen = self.lock();
            let changed = seen.connected != Some(connected);
            seen.connected = Some(connected);
            changed
        };
        if changed {
            self.notifier.connection_changed(connected);
        }
    }

    pub fn typing(&self, typing: bool) {
        let changed = {
            let mut seen = self.lock();
            let changed = seen.typing != Some(typing);
            seen.typing = Some(typing);
            changed
        };
        if changed {
            self.notifier.typing_changed(typing);
        }
    }

    pub fn modifiers(&self, armed: &[Modifier]) {
        let changed = {
            let mut seen = self.lock();
            let changed = seen.modifiers.as_deref() != Some(armed);
            seen.modifiers = Some(armed.to_vec());
            changed
        };
        if changed {
            self.notifier.modifiers_changed(armed.to_vec());
        }
    }

    pub fn layout(&self, layout: &str) {
        let changed = {
            let mut seen = self.lock();
            let changed = seen.layout.as_deref() != Some(layout);
            seen.layout = Some(layout.to_string());
            changed
        };
        if changed {
            self.notifier.layout_changed(layout.to_string());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Seen> {
        self.seen.lock().expect("notifier state lock poisoned")
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats_are_suppressed() {
        let mut mock = MockStateNotifier::new();
        mock.expect_connection_changed()
            .withf(|&c| c)
            .times(1)
            .return_const(());
        mock.expect_connection_changed()
            .withf(|&c| !c)
            .times(1)
            .return_const(());

        let tracker = ChangeTracker::new(Arc::new(mock));
        tracker.connection(true);
        tracker.connection(true);
        tracker.connection(false);
        tracker.connection(false);
    }

    #[test]
    fn test_modifier_sets_compare_by_value() {
        let mut mock = MockStateNotifier::new();
        mock.expect_modifiers_changed().times(2).return_const(());

        let tracker = ChangeTracker::new(Arc::new(mock));
        tracker.modifiers(&[Modifier::Ctrl]);
        tracker.modifiers(&[Modifier::Ctrl]);
        tracker.modifiers(&[Modifier::Ctrl, Modifier::Shift]);
    }

    #[test]
    fn test_layout_changes_fire_once_per_value() {
        let mut mock = MockStateNotifier::new();
        mock.expect_layout_changed()
            .withf(|l| l == "de")
            .times(1)
            .return_const(());
        mock.expect_layout_changed()
            .withf(|l| l == "us")
            .times(1)
            .return_const(());

        let tracker = ChangeTracker::new(Arc::new(mock));
        tracker.layout("de");
        tracker.layout("de");
        tracker.layout("us");
    }
}
