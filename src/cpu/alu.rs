//! Arithmetic/logic unit.
//!
//! Combinational: on a control line change it combines R0 (op0) and R1
//! (op1), drives the result onto its output line and updates the status
//! flags. Status is sticky until the next operation, which is what
//! conditional jumps read.

use crate::sim::{LineId, SimError, Simulation};
use crate::cpu::bus::Unit;
use serde::{Serialize, Deserialize};
use std::fmt;
use tracing::trace;

/// Operations selectable on the ALU control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum AluControl {
    Nop = 0,
    Add = 1,
    Cmp = 2,
    Nand = 3,
    Inv = 4,
    ShiftLeft = 5,
    ShiftRight = 6,
}

impl AluControl {
    /// Width of the ALU control line.
    pub const WIDTH: u8 = 4;

    /// Decode a control line value.
    pub fn from_line(value: u16) -> Option<Self> {
        match value {
            0 => Some(AluControl::Nop),
            1 => Some(AluControl::Add),
            2 => Some(AluControl::Cmp),
            3 => Some(AluControl::Nand),
            4 => Some(AluControl::Inv),
            5 => Some(AluControl::ShiftLeft),
            6 => Some(AluControl::ShiftRight),
            _ => None,
        }
    }
}

/// ALU status flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AluStatus(u8);

impl AluStatus {
    pub const OK: AluStatus = AluStatus(0x00);
    /// Reserved; never raised.
    pub const OVERFLOW: AluStatus = AluStatus(0x01);
    pub const EQUAL: AluStatus = AluStatus(0x02);
    pub const CARRY: AluStatus = AluStatus(0x04);
    /// Reserved; never raised.
    pub const ERROR: AluStatus = AluStatus(0x08);

    /// Raw bitmask.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every flag in `other` is set.
    pub const fn contains(self, other: AluStatus) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when no flag is set.
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for AluStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AluStatus({})", self)
    }
}

impl fmt::Display for AluStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "OK");
        }
        let names = [
            (AluStatus::OVERFLOW, "OVERFLOW"),
            (AluStatus::EQUAL, "EQUAL"),
            (AluStatus::CARRY, "CARRY"),
            (AluStatus::ERROR, "ERROR"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", set.join("|"))
    }
}

/// Compute one ALU operation. `None` for [`AluControl::Nop`].
pub fn compute(op: AluControl, op0: u16, op1: u16) -> Option<(u16, AluStatus)> {
    let result = match op {
        AluControl::Nop => return None,
        AluControl::Add => {
            let sum = op0 as u32 + op1 as u32;
            let status = if sum > 0xFFFF { AluStatus::CARRY } else { AluStatus::OK };
            return Some((sum as u16, status));
        }
        AluControl::Cmp => {
            return Some(if op0 == op1 {
                (1, AluStatus::EQUAL)
            } else {
                (0, AluStatus::OK)
            });
        }
        AluControl::Nand => !(op0 & op1),
        AluControl::Inv => !op0,
        AluControl::ShiftLeft => (op0 as u32).checked_shl(op1 as u32).unwrap_or(0) as u16,
        AluControl::ShiftRight => op0.checked_shr(op1 as u32).unwrap_or(0),
    };
    Some((result, AluStatus::OK))
}

/// The ALU component.
#[derive(Debug, Clone)]
pub struct Alu {
    status: AluStatus,
    control: LineId,
    output: LineId,
}

impl Alu {
    /// Create an ALU on the given control and output lines.
    pub fn new(control: LineId, output: LineId) -> Self {
        Self {
            status: AluStatus::OK,
            control,
            output,
        }
    }

    /// Status left by the last operation.
    pub fn status(&self) -> AluStatus {
        self.status
    }

    /// React to the control line, computing from the given operands.
    pub fn react(&mut self, op0: u16, op1: u16, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
        let raw = sim.read(self.control);
        let op = AluControl::from_line(raw).ok_or_else(|| SimError::InvalidControl {
            line: sim.line(self.control).name().to_string(),
            value: raw,
        })?;

        if let Some((result, status)) = compute(op, op0, op1) {
            trace!(?op, op0, op1, result, %status, "alu");
            sim.write(self.output, result)?;
            self.status = status;
        }
        Ok(())
    }
}
