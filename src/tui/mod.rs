//! TUI debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Disassembly around PC with breakpoints
//! - Registers, ALU status and the next micro-step
//! - Signal line values
//! - Memory view and program output
//! - Tick/step/run controls

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
