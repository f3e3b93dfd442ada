// Leveled stderr logger. Small on purpose: one atomic level switch and a
// handful of free functions, so any module can log without carrying state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// Levels are ordered (Info < Debug) so a single comparison gates output.
const INFO_LEVEL: u8 = 0;
const DEBUG_LEVEL: u8 = 1;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(INFO_LEVEL);

// Set the global log level based on the --debug flag.
pub fn set_debug(enabled: bool) {
    let level = if enabled { DEBUG_LEVEL } else { INFO_LEVEL };
    LOG_LEVEL.store(level, Ordering::Relaxed);
}

// Returns true if debug logging is enabled.
pub fn is_debug() -> bool {
    LOG_LEVEL.load(Ordering::Relaxed) >= DEBUG_LEVEL
}

// Print a DEBUG-level message if enabled.
pub fn debug(msg: &str) {
    if is_debug() {
        log_line("DEBUG", msg);
    }
}

// Print an INFO-level message.
pub fn info(msg: &str) {
    log_line("INFO", msg);
}

// Print an ERROR-level message.
pub fn error(msg: &str) {
    log_line("ERROR", msg);
}

// Format a log line with a unix timestamp and short level label.
fn log_line(level: &str, msg: &str) {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    eprintln!("[{}] {} {}", level, ts, msg);
}
