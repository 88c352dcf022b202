//! Signal-propagation kernel.
//!
//! - [`Simulation`] - line arena and settle loop
//! - [`Wire`] - a single shared line
//! - [`Circuit`] - dispatch from a scheduled key to a component reaction

mod scheduler;
mod wire;

pub use scheduler::{Circuit, SimError, Simulation};
pub use wire::{LineId, Wire};
