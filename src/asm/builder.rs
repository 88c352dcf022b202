//! Program builder and instruction macros.
//!
//! ```
//! use micro16::asm::builder::{load_constant, Program};
//! use micro16::cpu::{Instruction, Reg};
//!
//! let mut program = Program::new(0);
//! program
//!     .extend(load_constant(Reg::R2, 0xFFF0))
//!     .mark("loop")
//!     .emit(Instruction::Jump { target: Reg::R3 });
//! assert_eq!(program.address_of("loop"), Some(6));
//! ```

use crate::cpu::decode::{encode, Instruction};
use crate::cpu::registers::Reg;
use std::collections::BTreeMap;
use thiserror::Error;

/// A program under construction: words placed from an origin, plus named
/// positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    origin: u16,
    words: Vec<u16>,
    marks: BTreeMap<String, usize>,
}

impl Program {
    /// Start an empty program that will be loaded at `origin`.
    pub fn new(origin: u16) -> Self {
        Self { origin, words: Vec::new(), marks: BTreeMap::new() }
    }

    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// Encoded words, first word at the origin.
    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Address the next word will land on.
    pub fn here(&self) -> usize {
        self.origin as usize + self.words.len()
    }

    /// Append one instruction.
    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        self.words.push(encode(&instr));
        self
    }

    /// Append a raw data word.
    pub fn word(&mut self, value: u16) -> &mut Self {
        self.words.push(value);
        self
    }

    /// Append a sequence of instructions, usually a macro expansion.
    pub fn extend<I: IntoIterator<Item = Instruction>>(&mut self, instrs: I) -> &mut Self {
        self.words.extend(instrs.into_iter().map(|i| encode(&i)));
        self
    }

    /// Name the position of the next word. Re-marking a name moves it.
    pub fn mark(&mut self, name: &str) -> &mut Self {
        self.marks.insert(name.to_string(), self.words.len());
        self
    }

    /// Absolute address of a mark.
    pub fn address_of(&self, name: &str) -> Option<u16> {
        self.marks.get(name).map(|&index| self.origin.wrapping_add(index as u16))
    }

    /// Marks with their absolute addresses, in name order.
    pub fn marks(&self) -> impl Iterator<Item = (&str, u16)> {
        self.marks
            .iter()
            .map(move |(name, &index)| (name.as_str(), self.origin.wrapping_add(index as u16)))
    }

    /// Zero-fill up to an absolute address.
    pub(crate) fn pad_to(&mut self, addr: usize) {
        let target = addr - self.origin as usize;
        if target > self.words.len() {
            self.words.resize(target, 0);
        }
    }

    /// Overwrite already emitted words starting at `index`.
    pub(crate) fn patch(&mut self, index: usize, instrs: &[Instruction]) {
        for (slot, instr) in self.words[index..].iter_mut().zip(instrs) {
            *slot = encode(instr);
        }
    }

    pub(crate) fn patch_word(&mut self, index: usize, value: u16) {
        self.words[index] = value;
    }
}

/// Load a 16-bit constant into `dest`.
///
/// SET only carries eight bits, so the high byte is shifted up through the
/// ALU and the low byte added. R0 and R1 are clobbered; `dest` may be either.
pub fn load_constant(dest: Reg, value: u16) -> Vec<Instruction> {
    let [high, low] = value.to_be_bytes();
    let mut out = vec![
        Instruction::Set { dst: Reg::R0, value: high },
        Instruction::Set { dst: Reg::R1, value: 8 },
        Instruction::ShiftLeft { dst: dest },
    ];
    if dest != Reg::R0 {
        out.push(Instruction::Move { dst: Reg::R0, src: dest });
    }
    out.push(Instruction::Set { dst: Reg::R1, value: low });
    out.push(Instruction::Add { dst: dest });
    out
}

/// Number of words [`load_constant`] expands to for `dest`.
pub fn load_constant_len(dest: Reg) -> usize {
    if dest == Reg::R0 { 5 } else { 6 }
}

/// Write the byte held in `reg` to the output cell at `output_addr`.
///
/// `ptr` is pointed at the output cell and `zero` is used to clear it first,
/// so the same byte twice in a row is emitted twice.
pub fn output_char(
    ptr: Reg,
    zero: Reg,
    reg: Reg,
    output_addr: u16,
) -> Result<Vec<Instruction>, MacroError> {
    if ptr == zero || ptr == reg || zero == reg {
        return Err(MacroError::Overlap { ptr, zero, reg });
    }
    if matches!(reg, Reg::R0 | Reg::R1) {
        return Err(MacroError::Clobbered(reg));
    }

    let mut out = load_constant(ptr, output_addr);
    out.extend([
        Instruction::Set { dst: zero, value: 0 },
        Instruction::Store { src: zero, addr: ptr },
        Instruction::Store { src: reg, addr: ptr },
    ]);
    Ok(out)
}

/// A program that prints `text` byte by byte through the output cell at
/// `output_addr` and halts. Uses R2 as the output pointer and R3 as scratch.
pub fn print_program(origin: u16, output_addr: u16, text: &str) -> Program {
    let mut program = Program::new(origin);
    program.extend(load_constant(Reg::R2, output_addr));
    for byte in text.bytes() {
        program.extend([
            Instruction::Set { dst: Reg::R3, value: byte },
            Instruction::Store { src: Reg::R3, addr: Reg::R2 },
            Instruction::Set { dst: Reg::R3, value: 0 },
            Instruction::Store { src: Reg::R3, addr: Reg::R2 },
        ]);
    }
    program.emit(Instruction::Halt);
    program
}

/// Errors from expanding a macro.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("registers must be distinct (ptr {ptr}, zero {zero}, value {reg})")]
    Overlap { ptr: Reg, zero: Reg, reg: Reg },

    #[error("{0} is clobbered while loading the output address")]
    Clobbered(Reg),
}
