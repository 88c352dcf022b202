//! Register cells.
//!
//! The machine has six 16-bit registers:
//! - R0..R3: general purpose (R0 and R1 are also the ALU operands)
//! - IR: instruction register
//! - PC: program counter
//!
//! Every register owns one control line and shares the address and data
//! lines with the rest of the datapath.

use crate::sim::{LineId, SimError, Simulation};
use crate::cpu::bus::Unit;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// A general-purpose register, as named by instruction fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg {
    R0,
    R1,
    R2,
    R3,
}

impl Reg {
    /// All general-purpose registers in field-code order.
    pub const ALL: [Reg; 4] = [Reg::R0, Reg::R1, Reg::R2, Reg::R3];

    /// Register for a 4-bit instruction field. Codes 4 and above are undefined.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Instruction field code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.code())
    }
}

/// Any register in the datapath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterId {
    Gpr(Reg),
    Ir,
    Pc,
}

impl RegisterId {
    /// All registers, in register-file order.
    pub const ALL: [RegisterId; 6] = [
        RegisterId::Gpr(Reg::R0),
        RegisterId::Gpr(Reg::R1),
        RegisterId::Gpr(Reg::R2),
        RegisterId::Gpr(Reg::R3),
        RegisterId::Ir,
        RegisterId::Pc,
    ];

    /// Slot in the register file.
    pub const fn index(self) -> usize {
        match self {
            RegisterId::Gpr(r) => r as usize,
            RegisterId::Ir => 4,
            RegisterId::Pc => 5,
        }
    }

    /// Short lowercase name, also used to name the control line.
    pub const fn name(self) -> &'static str {
        match self {
            RegisterId::Gpr(Reg::R0) => "r0",
            RegisterId::Gpr(Reg::R1) => "r1",
            RegisterId::Gpr(Reg::R2) => "r2",
            RegisterId::Gpr(Reg::R3) => "r3",
            RegisterId::Ir => "ir",
            RegisterId::Pc => "pc",
        }
    }
}

impl From<Reg> for RegisterId {
    fn from(reg: Reg) -> Self {
        RegisterId::Gpr(reg)
    }
}

/// Values a register control line can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum RegisterControl {
    Nop = 0,
    /// Drive the data line with the register value.
    WriteData = 1,
    /// Latch the data line into the register.
    ReadData = 2,
    /// Drive the address line with the register value.
    WriteAddr = 3,
    /// Add one, wrapping. No line interaction.
    Increment = 4,
}

impl RegisterControl {
    /// Width of a register control line.
    pub const WIDTH: u8 = 3;

    /// Decode a control line value.
    pub fn from_line(value: u16) -> Option<Self> {
        match value {
            0 => Some(RegisterControl::Nop),
            1 => Some(RegisterControl::WriteData),
            2 => Some(RegisterControl::ReadData),
            3 => Some(RegisterControl::WriteAddr),
            4 => Some(RegisterControl::Increment),
            _ => None,
        }
    }
}

/// A single 16-bit register attached to the bus.
#[derive(Debug, Clone)]
pub struct Register {
    value: u16,
    control: LineId,
    addr: LineId,
    data: LineId,
}

impl Register {
    /// Create a zeroed register on the given lines.
    pub fn new(control: LineId, addr: LineId, data: LineId) -> Self {
        Self { value: 0, control, addr, data }
    }

    /// Current contents.
    #[inline]
    pub fn value(&self) -> u16 {
        self.value
    }

    /// The control line this register obeys.
    pub fn control_line(&self) -> LineId {
        self.control
    }

    /// React to the current control line value.
    pub fn react(&mut self, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
        let raw = sim.read(self.control);
        let control = RegisterControl::from_line(raw).ok_or_else(|| SimError::InvalidControl {
            line: sim.line(self.control).name().to_string(),
            value: raw,
        })?;

        match control {
            RegisterControl::Nop => {}
            RegisterControl::WriteData => sim.write(self.data, self.value)?,
            RegisterControl::ReadData => self.value = sim.read(self.data),
            RegisterControl::WriteAddr => sim.write(self.addr, self.value)?,
            RegisterControl::Increment => self.value = self.value.wrapping_add(1),
        }
        Ok(())
    }
}

/// The six registers of the datapath, indexed by [`RegisterId`].
#[derive(Debug, Clone)]
pub struct RegisterFile {
    cells: [Register; 6],
}

impl RegisterFile {
    /// Build the register file from one control line per register.
    pub fn new(controls: [LineId; 6], addr: LineId, data: LineId) -> Self {
        Self {
            cells: controls.map(|control| Register::new(control, addr, data)),
        }
    }

    /// Value of a register.
    #[inline]
    pub fn value(&self, id: impl Into<RegisterId>) -> u16 {
        self[id.into()].value()
    }

    /// Program counter.
    pub fn pc(&self) -> u16 {
        self.value(RegisterId::Pc)
    }

    /// Instruction register.
    pub fn ir(&self) -> u16 {
        self.value(RegisterId::Ir)
    }

    /// R0..R3.
    pub fn general(&self) -> [u16; 4] {
        Reg::ALL.map(|r| self.value(r))
    }

    /// Registers paired with their ids, in register-file order.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, &Register)> {
        RegisterId::ALL.iter().map(move |&id| (id, &self[id]))
    }
}

impl Index<RegisterId> for RegisterFile {
    type Output = Register;

    fn index(&self, id: RegisterId) -> &Register {
        &self.cells[id.index()]
    }
}

impl IndexMut<RegisterId> for RegisterFile {
    fn index_mut(&mut self, id: RegisterId) -> &mut Register {
        &mut self.cells[id.index()]
    }
}
