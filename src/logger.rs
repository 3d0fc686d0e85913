//! Logging utilities with colored output and status display.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `WatchStatus` for serve mode status messages

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::LazyLock,
    sync::atomic::{AtomicBool, Ordering},
};

/// Global verbose flag (set by --verbose CLI argument)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
#[allow(dead_code)] // Used by debug! macro
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
///
/// # Usage
/// ```ignore
/// debug!("module"; "debug info: {}", value);
/// ```
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix
#[inline]
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let prefix = colorize_prefix(module, &module_lower);

    let mut stdout = stdout().lock();
    execute!(stdout, Clear(ClearType::UntilNewLine)).ok();
    writeln!(stdout, "{prefix} {message}").ok();
    stdout.flush().ok();
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> String {
    let prefix = format!("[{module}]");
    match module_lower {
        "serve" => prefix.bright_blue().bold().to_string(),
        "watch" | "export" => prefix.bright_green().bold().to_string(),
        "error" | "webconsole" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Watch Status (single-line status with overwrite)
// ============================================================================

/// Get current time formatted as HH:MM:SS
fn now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Single-line status display for serve mode
///
/// Displays status messages that overwrite the previous output,
/// keeping the terminal clean. Supports timestamps and different
/// status types (success, error, warning)
pub struct WatchStatus {
    /// Lines of previous output to clear
    last_lines: usize,
}

/// Global status display shared across serve-mode subsystems.
///
/// This allows watch/reload/export phases to overwrite each other's status
/// block instead of leaving stale blocks in terminal.
static WATCH_STATUS: LazyLock<Mutex<WatchStatus>> =
    LazyLock::new(|| Mutex::new(WatchStatus::new()));

impl WatchStatus {
    /// Create a new watch status display.
    pub const fn new() -> Self {
        Self { last_lines: 0 }
    }

    /// Display success message (✓ prefix, green).
    pub fn success(&mut self, message: &str) {
        self.display(format!("{}", "✓".green()), message);
    }

    /// Display error message (✗ prefix, red) with optional detail.
    pub fn error(&mut self, summary: &str, detail: &str) {
        let message = if detail.is_empty() {
            summary.to_string()
        } else {
            format!("{summary}\n{detail}")
        };
        self.display(format!("{}", "✗".red()), &message);
    }

    /// Display warning message (⚠ prefix, yellow) with detail.
    pub fn warning(&mut self, detail: &str) {
        self.display(format!("{}", "⚠".yellow()), detail);
    }

    /// Internal display logic with line overwriting.
    fn display(&mut self, symbol: String, message: &str) {
        let mut stdout = stdout().lock();

        // Clear previous output by moving cursor up and clearing
        if self.last_lines > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let lines = self.last_lines as u16;
            execute!(stdout, cursor::MoveUp(lines)).ok();
            execute!(stdout, Clear(ClearType::FromCursorDown)).ok();
        }

        let timestamp = format!("[{}]", now()).dimmed().to_string();
        let line = if symbol.is_empty() {
            format!("{timestamp} {message}")
        } else {
            format!("{timestamp} {symbol} {message}")
        };

        writeln!(stdout, "{line}").ok();
        stdout.flush().ok();

        // Track actual line count (including newlines in message)
        self.last_lines = message.matches('\n').count() + 1;
    }
}

/// Global watch status: success
pub fn status_success(message: &str) {
    WATCH_STATUS.lock().success(message);
}

/// Global watch status: error
#[allow(dead_code)]
pub fn status_error(summary: &str, detail: &str) {
    WATCH_STATUS.lock().error(summary, detail);
}

/// Global watch status: warning
pub fn status_warning(detail: &str) {
    WATCH_STATUS.lock().warning(detail);
}

// ============================================================================
// Tests
// ============================================================================
