//! Event scheduler.
//!
//! Components never call each other. A component reacts to the lines it is
//! subscribed to and drives other lines; the scheduler queues whoever is
//! woken and runs them until nothing is left. Settling is a single
//! breadth-first pass: a component re-queued after it has reacted runs
//! again, but a component that wakes itself while reacting is ignored.

use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use tracing::trace;

use super::wire::{LineId, Wire};

/// Dispatches a scheduled component to its reaction.
///
/// Implemented by whatever owns the components, so the scheduler itself
/// only ever deals in lightweight keys.
pub trait Circuit<U> {
    /// Run the reaction of `unit`. Line reads and writes go through `sim`.
    fn react(&mut self, unit: U, sim: &mut Simulation<U>) -> Result<(), SimError>;
}

/// Line arena plus the pending/active sets of the settle loop.
pub struct Simulation<U> {
    wires: Vec<Wire<U>>,
    pending: VecDeque<U>,
    active: Vec<U>,
    reactions: u64,
}

impl<U: Copy + PartialEq + fmt::Debug> Simulation<U> {
    /// Create an empty simulation with no lines.
    pub fn new() -> Self {
        Self {
            wires: Vec::new(),
            pending: VecDeque::new(),
            active: Vec::new(),
            reactions: 0,
        }
    }

    /// Allocate a new line, initially zero.
    ///
    /// # Panics
    /// Panics if `width` is not in `1..=16`.
    pub fn add_line(&mut self, name: &'static str, width: u8) -> LineId {
        self.wires.push(Wire::new(name, width));
        LineId(self.wires.len() - 1)
    }

    /// Register `unit` to be woken whenever `line` changes value.
    pub fn subscribe(&mut self, line: LineId, unit: U) {
        self.wires[line.0].subscribe(unit);
    }

    /// Current value of a line.
    #[inline]
    pub fn read(&self, line: LineId) -> u16 {
        self.wires[line.0].value()
    }

    /// Drive a value onto a line.
    ///
    /// Subscribers are queued only when the value actually changes. Driving
    /// a different value onto a line that was already driven this cycle is
    /// a [`SimError::WriteConflict`].
    pub fn write(&mut self, line: LineId, value: u16) -> Result<(), SimError> {
        let wire = &mut self.wires[line.0];
        let changed = wire.drive(value).map_err(|first| SimError::WriteConflict {
            line: wire.name().to_string(),
            first,
            second: value & wire.mask(),
        })?;
        trace!(line = wire.name(), value = wire.value(), changed, "line write");

        if changed {
            for i in 0..self.wires[line.0].subscribers.len() {
                let unit = self.wires[line.0].subscribers[i];
                self.notify(unit);
            }
        }
        Ok(())
    }

    /// Queue `unit` for reaction.
    ///
    /// A unit that is currently reacting is dropped. A unit already queued
    /// is moved to the tail, so it runs once, after everything that woke it.
    pub fn notify(&mut self, unit: U) {
        if self.active.contains(&unit) {
            trace!(?unit, "dropped re-entrant notify");
            return;
        }
        if let Some(pos) = self.pending.iter().position(|queued| *queued == unit) {
            self.pending.remove(pos);
        }
        self.pending.push_back(unit);
    }

    /// Start a new logical cycle: every line may be driven once again.
    pub fn begin_cycle(&mut self) {
        for wire in &mut self.wires {
            wire.reset_cycle();
        }
    }

    /// React queued components until the queue is empty.
    ///
    /// Returns the number of reactions run. On error the queue is discarded;
    /// reactions completed before the failure still count towards
    /// [`reactions`](Self::reactions).
    pub fn drain<C: Circuit<U>>(&mut self, circuit: &mut C) -> Result<usize, SimError> {
        let mut count = 0;
        while let Some(unit) = self.pending.pop_front() {
            self.active.push(unit);
            trace!(?unit, "react");
            let result = circuit.react(unit, self);
            self.active.pop();
            if let Err(e) = result {
                self.pending.clear();
                self.active.clear();
                self.reactions += count as u64;
                return Err(e);
            }
            count += 1;
        }
        self.reactions += count as u64;
        Ok(count)
    }

    /// Drop everything queued without reacting.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// True when nothing is waiting to react.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    /// Units waiting to react, head first.
    pub fn pending(&self) -> impl Iterator<Item = &U> {
        self.pending.iter()
    }

    /// Total reactions run since construction.
    pub fn reactions(&self) -> u64 {
        self.reactions
    }

    /// Look up a line.
    pub fn line(&self, line: LineId) -> &Wire<U> {
        &self.wires[line.0]
    }

    /// All lines in allocation order.
    pub fn lines(&self) -> impl Iterator<Item = (LineId, &Wire<U>)> {
        self.wires.iter().enumerate().map(|(i, w)| (LineId(i), w))
    }
}

impl<U: Copy + PartialEq + fmt::Debug> Default for Simulation<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: fmt::Debug> fmt::Debug for Simulation<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("lines", &self.wires.len())
            .field("pending", &self.pending)
            .field("reactions", &self.reactions)
            .finish()
    }
}

/// Errors raised while driving or settling lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("write conflict on line {line}: driven with {first:#06x} and {second:#06x} in one cycle")]
    WriteConflict { line: String, first: u16, second: u16 },

    #[error("line {line} carries undefined control value {value}")]
    InvalidControl { line: String, value: u16 },
}
