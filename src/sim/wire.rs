//! Signal lines.
//!
//! A line is a width-tagged value cell shared between components. Writing a
//! new value wakes every subscriber; the scheduler owns the lines so that a
//! write can enqueue those subscribers directly.

use serde::{Serialize, Deserialize};
use std::fmt;

/// Index of a line inside a [`Simulation`](super::Simulation)'s arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(pub(crate) usize);

impl LineId {
    /// Position of the line in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A shared signal line.
#[derive(Clone, Debug)]
pub struct Wire<U> {
    name: &'static str,
    width: u8,
    value: u16,
    pub(crate) subscribers: Vec<U>,
    writes: u32,
    driven: Option<u16>,
}

impl<U: PartialEq> Wire<U> {
    pub(crate) fn new(name: &'static str, width: u8) -> Self {
        assert!(
            (1..=16).contains(&width),
            "line {} has unsupported width {}", name, width
        );
        Self {
            name,
            width,
            value: 0,
            subscribers: Vec::new(),
            writes: 0,
            driven: None,
        }
    }

    /// Line name, used in diagnostics and conflict reports.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Width in bits.
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Current value.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Number of writes since the start of the current cycle.
    pub fn writes_this_cycle(&self) -> u32 {
        self.writes
    }

    /// Value driven onto the line this cycle, if any.
    pub fn driven(&self) -> Option<u16> {
        self.driven
    }

    /// Components woken when the value changes.
    pub fn subscribers(&self) -> &[U] {
        &self.subscribers
    }

    /// Mask covering the line width.
    pub fn mask(&self) -> u16 {
        if self.width >= 16 {
            u16::MAX
        } else {
            (1u16 << self.width) - 1
        }
    }

    pub(crate) fn subscribe(&mut self, unit: U) {
        if !self.subscribers.contains(&unit) {
            self.subscribers.push(unit);
        }
    }

    /// Record a driven value. Returns `Err(first)` if a different value was
    /// already driven this cycle, otherwise whether the value changed.
    pub(crate) fn drive(&mut self, value: u16) -> Result<bool, u16> {
        let value = value & self.mask();
        match self.driven {
            Some(first) if first != value => return Err(first),
            _ => {}
        }
        self.driven = Some(value);
        self.writes += 1;
        if self.value == value {
            return Ok(false);
        }
        self.value = value;
        Ok(true)
    }

    /// Clear the per-cycle bookkeeping. The value is kept.
    pub(crate) fn reset_cycle(&mut self) {
        self.writes = 0;
        self.driven = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_follows_width() {
        assert_eq!(Wire::<u8>::new("ctl", 3).mask(), 0b111);
        assert_eq!(Wire::<u8>::new("bus", 16).mask(), 0xFFFF);
    }

    #[test]
    fn test_drive_masks_and_reports_change() {
        let mut wire = Wire::<u8>::new("ctl", 2);
        assert_eq!(wire.drive(0b111), Ok(true));
        assert_eq!(wire.value(), 0b11);
        assert_eq!(wire.writes_this_cycle(), 1);
    }

    #[test]
    fn test_same_value_is_idempotent() {
        let mut wire = Wire::<u8>::new("bus", 16);
        assert_eq!(wire.drive(7), Ok(true));
        assert_eq!(wire.drive(7), Ok(false));
        assert_eq!(wire.writes_this_cycle(), 2);
    }

    #[test]
    fn test_second_value_conflicts() {
        let mut wire = Wire::<u8>::new("bus", 16);
        wire.drive(7).unwrap();
        assert_eq!(wire.drive(8), Err(7));
        assert_eq!(wire.value(), 7);
    }

    #[test]
    fn test_reset_keeps_value() {
        let mut wire = Wire::<u8>::new("bus", 16);
        wire.drive(42).unwrap();
        wire.reset_cycle();
        assert_eq!(wire.value(), 42);
        assert_eq!(wire.writes_this_cycle(), 0);
        assert_eq!(wire.driven(), None);
        assert_eq!(wire.drive(43), Ok(true));
    }
}
