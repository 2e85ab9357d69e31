//! Pure domain logic with no I/O dependencies.

pub mod keys;

pub use keys::{ComboState, Modifier, ReleaseOutcome, ToggleOutcome};
