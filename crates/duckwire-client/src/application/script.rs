//! Script front end: parses line-oriented payload scripts into programs
//! and records programmatically built programs under a runaway ceiling.
//!
//! The script language is deliberately closed: every line must start with
//! a known directive or be a key combo built entirely from allow-listed
//! key names.  Unknown tokens are a hard parse error, never passed to the
//! device — the device-side parser echoes unrecognized input, and a typo
//! in a payload should fail here, not as keystrokes on the target.

use std::fmt::Write as _;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{info, trace};

use crate::domain::config::ClientConfig;

use super::engine::Operation;
use super::poller::PollerHandle;

/// Why a script was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// A line starts with a token that is neither a directive nor an
    /// allow-listed key name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A directive's argument could not be parsed.
    #[error("bad argument on line {line}: {message}")]
    BadArgument { line: usize, message: String },

    /// A recorded program emitted more operations than the ceiling allows.
    #[error("program exceeded the {0}-operation ceiling")]
    CeilingExceeded(usize),
}

/// Key names accepted as combo tokens, beyond single printable characters.
const NAMED_KEYS: &[&str] = &[
    "CTRL", "CONTROL", "SHIFT", "ALT", "ALTGR", "GUI", "WINDOWS", "ENTER", "RETURN", "TAB",
    "ESC", "ESCAPE", "SPACE", "BACKSPACE", "DELETE", "DEL", "INSERT", "HOME", "END", "PAGEUP",
    "PAGEDOWN", "UP", "DOWN", "LEFT", "RIGHT", "UPARROW", "DOWNARROW", "LEFTARROW", "RIGHTARROW",
    "CAPSLOCK", "NUMLOCK", "SCROLLLOCK", "PRINTSCREEN", "PAUSE", "MENU", "APP",
];

fn is_allowed_key(token: &str) -> bool {
    if token.chars().count() == 1 {
        // Single printable characters pass through as-is.
        return token.chars().all(|c| c.is_ascii_graphic());
    }
    if NAMED_KEYS.contains(&token) {
        return true;
    }
    // Function keys F1..F24.
    token
        .strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=24).contains(&n))
}

/// Parses a payload script into an executable program.
///
/// One line is one operation; blank lines are skipped.  The line number in
/// errors is 1-based.
pub fn parse_program(text: &str) -> Result<Vec<Operation>, ScriptError> {
    let mut program = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        program.push(parse_line(index + 1, line)?);
    }
    trace!(operations = program.len(), "script parsed");
    Ok(program)
}

fn parse_line(number: usize, line: &str) -> Result<Operation, ScriptError> {
    let (directive, rest) = match line.split_once(' ') {
        Some((d, r)) => (d, r),
        None => (line, ""),
    };

    let bad = |message: &str| ScriptError::BadArgument {
        line: number,
        message: message.to_string(),
    };

    match directive {
        "REM" => Ok(Operation::Comment(rest.to_string())),
        "STRING" => Ok(Operation::Type(rest.to_string())),
        "STRINGLN" => Ok(Operation::TypeLine(rest.to_string())),
        "DELAY" => rest
            .trim()
            .parse::<u64>()
            .map(Operation::Delay)
            .map_err(|_| bad("DELAY takes a duration in milliseconds")),
        "LED" => {
            let mut parts = rest.split_whitespace();
            let led = parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .ok_or_else(|| bad("LED takes an index and 0 or 1"))?;
            let on = match parts.next() {
                Some("0") => false,
                Some("1") => true,
                _ => return Err(bad("LED takes an index and 0 or 1")),
            };
            Ok(Operation::Led { led, on })
        }
        "LOCALE" => {
            if rest.trim().is_empty() {
                Err(bad("LOCALE takes a layout code"))
            } else {
                Ok(Operation::Locale(rest.trim().to_string()))
            }
        }
        "KEYCODE" => {
            let codes = rest
                .split_whitespace()
                .map(|p| p.parse::<u8>())
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|_| bad("KEYCODE takes byte values"))?;
            if codes.is_empty() {
                return Err(bad("KEYCODE takes byte values"));
            }
            Ok(Operation::Keycode(codes))
        }
        "M_MOVE" => {
            let mut parts = rest.split_whitespace();
            let dx = parts.next().and_then(|p| p.parse().ok());
            let dy = parts.next().and_then(|p| p.parse().ok());
            match (dx, dy) {
                (Some(dx), Some(dy)) => Ok(Operation::MouseMove { dx, dy }),
                _ => Err(bad("M_MOVE takes dx and dy")),
            }
        }
        "M_CLICK" => parse_button(rest)
            .map(Operation::MouseClick)
            .ok_or_else(|| bad("M_CLICK takes a button number")),
        "M_PRESS" => parse_button(rest)
            .map(Operation::MousePress)
            .ok_or_else(|| bad("M_PRESS takes a button number")),
        "M_RELEASE" => parse_button(rest)
            .map(Operation::MouseRelease)
            .ok_or_else(|| bad("M_RELEASE takes a button number")),
        "M_SCROLL" => rest
            .trim()
            .parse::<i32>()
            .map(Operation::MouseScroll)
            .map_err(|_| bad("M_SCROLL takes an amount")),
        _ => {
            // Not a directive: the whole line must be an allow-listed combo.
            let keys: Vec<&str> = line.split_whitespace().collect();
            for key in &keys {
                if !is_allowed_key(key) {
                    return Err(ScriptError::UnknownCommand((*key).to_string()));
                }
            }
            Ok(Operation::Press(keys.iter().map(|k| k.to_string()).collect()))
        }
    }
}

fn parse_button(rest: &str) -> Option<u8> {
    rest.trim().parse().ok()
}

/// Renders one operation back to its script line.
fn render(operation: &Operation) -> String {
    match operation {
        Operation::Comment(text) => format!("REM {text}"),
        Operation::Type(text) => format!("STRING {text}"),
        Operation::TypeLine(text) => format!("STRINGLN {text}"),
        Operation::Press(keys) => keys.join(" "),
        Operation::Keycode(codes) => {
            let mut line = String::from("KEYCODE");
            for code in codes {
                let _ = write!(line, " {code}");
            }
            line
        }
        Operation::Delay(ms) => format!("DELAY {ms}"),
        Operation::Led { led, on } => format!("LED {led} {}", u8::from(*on)),
        Operation::Locale(code) => format!("LOCALE {code}"),
        Operation::MouseMove { dx, dy } => format!("M_MOVE {dx} {dy}"),
        Operation::MouseClick(btn) => format!("M_CLICK {btn}"),
        Operation::MouseScroll(amt) => format!("M_SCROLL {amt}"),
        Operation::MousePress(btn) => format!("M_PRESS {btn}"),
        Operation::MouseRelease(btn) => format!("M_RELEASE {btn}"),
    }
}

/// Records a programmatically built program without executing it.
///
/// Every emit counts against a hard operation ceiling so a runaway
/// generator (an unbounded loop in caller code) is aborted instead of
/// producing an unbounded program.
pub struct ScriptRecorder {
    operations: Vec<Operation>,
    ceiling: usize,
}

impl ScriptRecorder {
    pub fn new(ceiling: usize) -> Self {
        Self {
            operations: Vec::new(),
            ceiling,
        }
    }

    /// Recorder bounded by the configured operation ceiling.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.op_ceiling)
    }

    pub fn emit(&mut self, operation: Operation) -> Result<(), ScriptError> {
        if self.operations.len() >= self.ceiling {
            return Err(ScriptError::CeilingExceeded(self.ceiling));
        }
        self.operations.push(operation);
        Ok(())
    }

    pub fn type_text(&mut self, text: &str) -> Result<(), ScriptError> {
        self.emit(Operation::Type(text.to_string()))
    }

    pub fn type_line(&mut self, text: &str) -> Result<(), ScriptError> {
        self.emit(Operation::TypeLine(text.to_string()))
    }

    pub fn press(&mut self, keys: &[&str]) -> Result<(), ScriptError> {
        for key in keys {
            if !is_allowed_key(key) {
                return Err(ScriptError::UnknownCommand((*key).to_string()));
            }
        }
        self.emit(Operation::Press(keys.iter().map(|k| k.to_string()).collect()))
    }

    pub fn delay(&mut self, ms: u64) -> Result<(), ScriptError> {
        self.emit(Operation::Delay(ms))
    }

    /// Emits the operations produced by `body`, `count` times.
    pub fn repeat<F>(&mut self, count: usize, mut body: F) -> Result<(), ScriptError>
    where
        F: FnMut(&mut Self) -> Result<(), ScriptError>,
    {
        for _ in 0..count {
            body(self)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The recorded program.
    pub fn finish(self) -> Vec<Operation> {
        self.operations
    }

    /// Renders the recorded program as script text, one line per
    /// operation, suitable for saving to the device.
    pub fn script_text(&self) -> String {
        let mut text = String::new();
        for operation in &self.operations {
            text.push_str(&render(operation));
            text.push('\n');
        }
        text
    }
}

/// Utility surface offered to program generators: logging, timing, and a
/// busy query.  Nothing here touches the wire.
#[derive(Default)]
pub struct ProgramUtils {
    status: Option<PollerHandle>,
}

impl ProgramUtils {
    pub fn new() -> Self {
        Self::default()
    }

    /// With a poll handle, [`ProgramUtils::is_running`] reflects live
    /// device status instead of always reporting idle.
    pub fn with_status(status: PollerHandle) -> Self {
        Self {
            status: Some(status),
        }
    }

    /// Logs a message on behalf of the program.
    pub fn log(&self, message: &str) {
        info!(target: "program", "{message}");
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }

    /// A value in `lo..hi`.  Hash-mixed clock entropy, which is all the
    /// fixture-data use cases here need.
    pub fn random_range(&self, lo: u64, hi: u64) -> u64 {
        assert!(lo < hi, "empty range");
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_u128(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
        );
        lo + hasher.finish() % (hi - lo)
    }

    pub async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    /// Whether the device currently reports a long-running condition.
    pub fn is_running(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.busy())
    }
}

// ───────────────────────────── Tests ─────────────────────────────
