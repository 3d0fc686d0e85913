//! Core process state shared across the host.

mod state;
mod thread;

pub use state::{is_shutdown, register_server, setup_shutdown_handler};
pub use thread::{is_interactive_thread, mark_interactive};

#[cfg(test)]
pub use thread::clear_interactive_for_test;
