//! Instruction decoder.
//!
//! Every instruction is one 16-bit word:
//!
//! ```text
//!  15    12 11     8 7      4 3      0
//! +--------+--------+--------+--------+
//! | opcode |  reg0  |  reg1  | unused |   R2_V0
//! | opcode |  reg0  |    immediate    |   R1_V1
//! +--------+--------+--------+--------+
//! ```
//!
//! R1_V0 instructions only use `reg0`; R0_V0 instructions use no operand.

use crate::cpu::registers::Reg;
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// Operation codes (bits 15..12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x0,
    Halt = 0x1,
    Add = 0x2,
    Inv = 0x3,
    Cmp = 0x4,
    Jump = 0x5,
    JumpIfEqual = 0x6,
    Nand = 0x7,
    ShiftLeft = 0x8,
    ShiftRight = 0x9,
    Load = 0xA,
    Store = 0xB,
    Move = 0xC,
    Set = 0xD,
}

impl Opcode {
    /// Decode the top nibble of an instruction word.
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        use Opcode::*;
        Some(match nibble {
            0x0 => Nop,
            0x1 => Halt,
            0x2 => Add,
            0x3 => Inv,
            0x4 => Cmp,
            0x5 => Jump,
            0x6 => JumpIfEqual,
            0x7 => Nand,
            0x8 => ShiftLeft,
            0x9 => ShiftRight,
            0xA => Load,
            0xB => Store,
            0xC => Move,
            0xD => Set,
            _ => return None,
        })
    }

    /// How the remaining 12 bits are laid out.
    pub fn format(self) -> OperandFormat {
        use Opcode::*;
        match self {
            Nop | Halt | Cmp => OperandFormat::R0V0,
            Add | Inv | Nand | ShiftLeft | ShiftRight | Jump | JumpIfEqual => OperandFormat::R1V0,
            Load | Store | Move => OperandFormat::R2V0,
            Set => OperandFormat::R1V1,
        }
    }

    /// Canonical assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "NOP",
            Halt => "HALT",
            Add => "ADD",
            Inv => "INV",
            Cmp => "CMP",
            Jump => "JMP",
            JumpIfEqual => "JEQ",
            Nand => "NAND",
            ShiftLeft => "SHL",
            ShiftRight => "SHR",
            Load => "LOAD",
            Store => "STORE",
            Move => "MOVE",
            Set => "SET",
        }
    }
}

/// Operand layout classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandFormat {
    /// No operands.
    R0V0,
    /// One register.
    R1V0,
    /// Two registers.
    R2V0,
    /// One register and an 8-bit immediate.
    R1V1,
}

/// Decoded instruction.
///
/// ALU instructions always read R0 and R1; their register operand is only
/// the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// No operation
    Nop,
    /// Stop the machine
    Halt,
    /// Compare R0 with R1, setting EQUAL
    Cmp,
    /// dst := R0 + R1
    Add { dst: Reg },
    /// dst := !R0
    Inv { dst: Reg },
    /// dst := !(R0 & R1)
    Nand { dst: Reg },
    /// dst := R0 << R1
    ShiftLeft { dst: Reg },
    /// dst := R0 >> R1
    ShiftRight { dst: Reg },
    /// PC := target
    Jump { target: Reg },
    /// PC := target if the last ALU operation set EQUAL
    JumpIfEqual { target: Reg },
    /// dst := mem[addr]
    Load { dst: Reg, addr: Reg },
    /// mem[addr] := src
    Store { src: Reg, addr: Reg },
    /// dst := src
    Move { dst: Reg, src: Reg },
    /// dst := value (zero-extended)
    Set { dst: Reg, value: u8 },
}

impl Instruction {
    /// Operation code.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Halt => Opcode::Halt,
            Instruction::Cmp => Opcode::Cmp,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Inv { .. } => Opcode::Inv,
            Instruction::Nand { .. } => Opcode::Nand,
            Instruction::ShiftLeft { .. } => Opcode::ShiftLeft,
            Instruction::ShiftRight { .. } => Opcode::ShiftRight,
            Instruction::Jump { .. } => Opcode::Jump,
            Instruction::JumpIfEqual { .. } => Opcode::JumpIfEqual,
            Instruction::Load { .. } => Opcode::Load,
            Instruction::Store { .. } => Opcode::Store,
            Instruction::Move { .. } => Opcode::Move,
            Instruction::Set { .. } => Opcode::Set,
        }
    }

    /// Operand layout.
    pub fn format(&self) -> OperandFormat {
        self.opcode().format()
    }

    /// Register in bits 11..8, if the format has one.
    pub fn reg0(&self) -> Option<Reg> {
        match *self {
            Instruction::Nop | Instruction::Halt | Instruction::Cmp => None,
            Instruction::Add { dst }
            | Instruction::Inv { dst }
            | Instruction::Nand { dst }
            | Instruction::ShiftLeft { dst }
            | Instruction::ShiftRight { dst } => Some(dst),
            Instruction::Jump { target } | Instruction::JumpIfEqual { target } => Some(target),
            Instruction::Load { dst, .. } | Instruction::Move { dst, .. } => Some(dst),
            Instruction::Store { src, .. } => Some(src),
            Instruction::Set { dst, .. } => Some(dst),
        }
    }

    /// Register in bits 7..4, if the format has one.
    pub fn reg1(&self) -> Option<Reg> {
        match *self {
            Instruction::Load { addr, .. } | Instruction::Store { addr, .. } => Some(addr),
            Instruction::Move { src, .. } => Some(src),
            _ => None,
        }
    }

    /// Immediate in bits 7..0, if the format has one.
    pub fn immediate(&self) -> Option<u8> {
        match *self {
            Instruction::Set { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.opcode().mnemonic();
        match (self.reg0(), self.reg1(), self.immediate()) {
            (Some(r0), Some(r1), _) => write!(f, "{} {}, {}", mnemonic, r0, r1),
            (Some(r0), None, Some(value)) => write!(f, "{} {}, {:#04x}", mnemonic, r0, value),
            (Some(r0), None, None) => write!(f, "{} {}", mnemonic, r0),
            _ => write!(f, "{}", mnemonic),
        }
    }
}

/// Decode an instruction word.
pub fn decode(word: u16) -> Result<Instruction, DecodeError> {
    let nibble = (word >> 12) as u8;
    let opcode = Opcode::from_nibble(nibble).ok_or(DecodeError::UnhandledOpcode(nibble))?;

    let field = |shift: u16| -> Result<Reg, DecodeError> {
        let code = ((word >> shift) & 0xF) as u8;
        Reg::from_code(code).ok_or(DecodeError::InvalidRegister { word, code })
    };

    let instruction = match opcode {
        Opcode::Nop => Instruction::Nop,
        Opcode::Halt => Instruction::Halt,
        Opcode::Cmp => Instruction::Cmp,
        Opcode::Add => Instruction::Add { dst: field(8)? },
        Opcode::Inv => Instruction::Inv { dst: field(8)? },
        Opcode::Nand => Instruction::Nand { dst: field(8)? },
        Opcode::ShiftLeft => Instruction::ShiftLeft { dst: field(8)? },
        Opcode::ShiftRight => Instruction::ShiftRight { dst: field(8)? },
        Opcode::Jump => Instruction::Jump { target: field(8)? },
        Opcode::JumpIfEqual => Instruction::JumpIfEqual { target: field(8)? },
        Opcode::Load => Instruction::Load { dst: field(8)?, addr: field(4)? },
        Opcode::Store => Instruction::Store { src: field(8)?, addr: field(4)? },
        Opcode::Move => Instruction::Move { dst: field(8)?, src: field(4)? },
        Opcode::Set => Instruction::Set { dst: field(8)?, value: word as u8 },
    };

    Ok(instruction)
}

/// Encode an instruction back to a word.
pub fn encode(instr: &Instruction) -> u16 {
    let mut word = (instr.opcode() as u16) << 12;
    if let Some(r0) = instr.reg0() {
        word |= (r0.code() as u16) << 8;
    }
    if let Some(r1) = instr.reg1() {
        word |= (r1.code() as u16) << 4;
    }
    if let Some(value) = instr.immediate() {
        word |= value as u16;
    }
    word
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unhandled opcode {0:#x}")]
    UnhandledOpcode(u8),

    #[error("instruction {word:#06x} names undefined register {code}")]
    InvalidRegister { word: u16, code: u8 },
}
