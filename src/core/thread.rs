//! Interactive-thread policy.
//!
//! The serve coordinator marks its request-loop thread as interactive.
//! Blocking document recomputation refuses to run there; the check turns an
//! accidental UI-thread stall into an immediate, loud error instead of a
//! frozen host.

use std::cell::Cell;

thread_local! {
    static INTERACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Mark the current thread as the interactive thread.
pub fn mark_interactive() {
    INTERACTIVE.with(|flag| flag.set(true));
}

/// Check whether the current thread is marked interactive.
pub fn is_interactive_thread() -> bool {
    INTERACTIVE.with(Cell::get)
}

/// Unmark the current thread (test isolation with a shared test thread).
#[cfg(test)]
pub fn clear_interactive_for_test() {
    INTERACTIVE.with(|flag| flag.set(false));
}
