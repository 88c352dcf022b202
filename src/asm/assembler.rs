//! Text assembler.
//!
//! Syntax:
//! ```text
//! ; Comment
//!         ORG 0x0010          ; Set origin address
//! START:  LDI R2, 0xFFF0      ; 16-bit constant (clobbers R0, R1)
//!         SET R3, 'H'         ; 8-bit immediate
//!         OUT R3, R2, R1      ; Write R3 to the output cell
//!         LDI R3, DONE
//!         JMP R3              ; Jump to label
//! DONE:   HALT
//!         DAT 42, 0b1010, -1  ; Data words
//! ```
//!
//! Numbers are decimal, `0x` hex, `0b` binary or `'c'` character literals.
//! Labels may be used by `LDI` and `DAT`.

use super::builder::{load_constant, output_char, MacroError, Program};
use crate::config::{defaults, MachineConfig};
use crate::cpu::decode::Instruction;
use crate::cpu::registers::Reg;
use thiserror::Error;

/// Assemble source code into a program.
pub fn assemble(source: &str) -> Result<Program, AssemblerError> {
    assemble_at(source, 0)
}

/// Assemble with a default origin; an `ORG` before the first word overrides it.
pub fn assemble_at(source: &str, origin: u16) -> Result<Program, AssemblerError> {
    Assembler::new(origin, defaults::OUTPUT_ADDR).assemble(source)
}

/// Assemble for a configured machine: `load_offset` is the default origin
/// and `OUT` targets `output_addr`.
pub fn assemble_for(source: &str, config: &MachineConfig) -> Result<Program, AssemblerError> {
    Assembler::new(config.load_offset, config.output_addr).assemble(source)
}

/// Label reference waiting for pass 2.
enum Fixup {
    /// `LDI` expansion at this word index.
    Constant { index: usize, dest: Reg },
    /// `DAT` word at this index.
    Word { index: usize },
}

/// The assembler state.
struct Assembler {
    program: Option<Program>,
    origin: u16,
    output_addr: u16,
    /// Labels seen before the first word, placed once the origin is known.
    early_labels: Vec<String>,
    pending: Vec<(Fixup, String, usize)>,
}

impl Assembler {
    fn new(origin: u16, output_addr: u16) -> Self {
        Self {
            program: None,
            origin,
            output_addr,
            early_labels: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Program, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }
        self.program_mut();

        // Pass 2: Resolve forward references
        self.resolve_references()?;

        Ok(self.program.take().unwrap_or_default())
    }

    /// The program, created at the current origin on first use.
    fn program_mut(&mut self) -> &mut Program {
        let origin = self.origin;
        let early = std::mem::take(&mut self.early_labels);
        let program = self.program.get_or_insert_with(|| Program::new(origin));
        for label in early {
            program.mark(&label);
        }
        program
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        let line = match split_label(line) {
            Some((label, rest)) => {
                self.define_label(label, line_num)?;
                rest.trim()
            }
            None => line,
        };

        if line.is_empty() {
            return Ok(());
        }
        self.process_statement(line, line_num)
    }

    fn define_label(&mut self, label: &str, line_num: usize) -> Result<(), AssemblerError> {
        let label = label.trim().to_uppercase();
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid label '{}'", label),
            });
        }
        let taken = self.early_labels.contains(&label)
            || self.program.as_ref().is_some_and(|p| p.address_of(&label).is_some());
        if taken {
            return Err(AssemblerError::DuplicateLabel { line: line_num, label });
        }

        match self.program.as_mut() {
            Some(program) => {
                program.mark(&label);
            }
            None => self.early_labels.push(label),
        }
        Ok(())
    }

    fn process_statement(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_uppercase(), rest.trim()),
            None => (line.to_uppercase(), ""),
        };
        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            split_operands(rest)
        };

        match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let [addr] = expect_operands(&mnemonic, &operands, line_num)?;
                let addr = parse_number(addr, line_num)?;
                let addr = to_word(addr, line_num)? as usize;
                match self.program.as_mut() {
                    None => self.origin = addr as u16,
                    Some(program) if addr >= program.here() => program.pad_to(addr),
                    Some(program) => {
                        return Err(AssemblerError::SyntaxError {
                            line: line_num,
                            message: format!(
                                "ORG {:#06x} is behind the current address {:#06x}",
                                addr,
                                program.here()
                            ),
                        });
                    }
                }
            }

            "DAT" | "DATA" => {
                if operands.is_empty() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "DAT requires at least one value".into(),
                    });
                }
                for operand in operands {
                    let value = if is_label(operand) {
                        let index = self.program_mut().len();
                        self.pending.push((Fixup::Word { index }, operand.to_uppercase(), line_num));
                        0
                    } else {
                        to_word(parse_number(operand, line_num)?, line_num)?
                    };
                    self.program_mut().word(value);
                }
            }

            // Macros
            "LDI" => {
                let [reg, value] = expect_operands(&mnemonic, &operands, line_num)?;
                let dest = parse_register(reg, line_num)?;
                if is_label(value) {
                    let index = self.program_mut().len();
                    self.pending.push((Fixup::Constant { index, dest }, value.to_uppercase(), line_num));
                    self.program_mut().extend(load_constant(dest, 0));
                } else {
                    let value = to_word(parse_number(value, line_num)?, line_num)?;
                    self.program_mut().extend(load_constant(dest, value));
                }
            }

            "OUT" => {
                let [reg, ptr, zero] = expect_operands(&mnemonic, &operands, line_num)?;
                let reg = parse_register(reg, line_num)?;
                let ptr = parse_register(ptr, line_num)?;
                let zero = parse_register(zero, line_num)?;
                let seq = output_char(ptr, zero, reg, self.output_addr)
                    .map_err(|source| AssemblerError::Macro { line: line_num, source })?;
                self.program_mut().extend(seq);
            }

            // Instructions
            _ => {
                let instr = parse_instruction(&mnemonic, &operands, line_num)?;
                self.program_mut().emit(instr);
            }
        }

        if self.program.as_ref().is_some_and(|p| p.here() > 0x1_0000) {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: "program runs past the end of memory".into(),
            });
        }
        Ok(())
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        let program = self.program.get_or_insert_with(Program::default);
        for (fixup, label, line_num) in &self.pending {
            let addr = program.address_of(label).ok_or_else(|| AssemblerError::UndefinedLabel {
                line: *line_num,
                label: label.clone(),
            })?;
            match *fixup {
                // Expansion length depends only on the register.
                Fixup::Constant { index, dest } => program.patch(index, &load_constant(dest, addr)),
                Fixup::Word { index } => program.patch_word(index, addr),
            }
        }
        Ok(())
    }
}

fn parse_instruction(mnemonic: &str, operands: &[&str], line_num: usize) -> Result<Instruction, AssemblerError> {
    let reg = |i: usize| parse_register(operands[i], line_num);

    let instr = match mnemonic {
        "NOP" => {
            expect_operands::<0>(mnemonic, operands, line_num)?;
            Instruction::Nop
        }
        "HALT" | "HLT" => {
            expect_operands::<0>(mnemonic, operands, line_num)?;
            Instruction::Halt
        }
        "CMP" => {
            expect_operands::<0>(mnemonic, operands, line_num)?;
            Instruction::Cmp
        }

        "ADD" | "INV" | "NAND" | "SHL" | "SHIFT_LEFT" | "SHR" | "SHIFT_RIGHT" | "JMP" | "JUMP"
        | "JEQ" | "JUMP_IF_EQUAL" => {
            expect_operands::<1>(mnemonic, operands, line_num)?;
            let r = reg(0)?;
            match mnemonic {
                "ADD" => Instruction::Add { dst: r },
                "INV" => Instruction::Inv { dst: r },
                "NAND" => Instruction::Nand { dst: r },
                "SHL" | "SHIFT_LEFT" => Instruction::ShiftLeft { dst: r },
                "SHR" | "SHIFT_RIGHT" => Instruction::ShiftRight { dst: r },
                "JMP" | "JUMP" => Instruction::Jump { target: r },
                _ => Instruction::JumpIfEqual { target: r },
            }
        }

        "LOAD" | "STORE" | "MOVE" | "MOV" => {
            expect_operands::<2>(mnemonic, operands, line_num)?;
            let (a, b) = (reg(0)?, reg(1)?);
            match mnemonic {
                "LOAD" => Instruction::Load { dst: a, addr: b },
                "STORE" => Instruction::Store { src: a, addr: b },
                _ => Instruction::Move { dst: a, src: b },
            }
        }

        "SET" => {
            let [_, value] = expect_operands(mnemonic, operands, line_num)?;
            let value = parse_number(value, line_num)?;
            let value = u8::try_from(value).map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value })?;
            Instruction::Set { dst: reg(0)?, value }
        }

        _ => {
            return Err(AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.to_string(),
            })
        }
    };

    Ok(instr)
}

fn expect_operands<'a, const N: usize>(
    mnemonic: &str,
    operands: &[&'a str],
    line_num: usize,
) -> Result<[&'a str; N], AssemblerError> {
    <[&str; N]>::try_from(operands).map_err(|_| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("{} takes {} operand(s), found {}", mnemonic, N, operands.len()),
    })
}

fn parse_register(operand: &str, line_num: usize) -> Result<Reg, AssemblerError> {
    let upper = operand.trim().to_uppercase();
    upper
        .strip_prefix('R')
        .and_then(|n| n.parse::<u8>().ok())
        .and_then(Reg::from_code)
        .ok_or_else(|| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("expected register R0-R3, found '{}'", operand),
        })
}

/// Parse a numeric or character literal.
fn parse_number(operand: &str, line_num: usize) -> Result<i64, AssemblerError> {
    let operand = operand.trim();
    let invalid = |kind: &str| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("invalid {} literal '{}'", kind, operand),
    };

    // Character literal
    if let Some(inner) = operand.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        let mut chars = inner.chars();
        let c = match (chars.next(), chars.next(), chars.next()) {
            (Some('\\'), Some('n'), None) => '\n',
            (Some('\\'), Some('t'), None) => '\t',
            (Some('\\'), Some('0'), None) => '\0',
            (Some('\\'), Some(c @ ('\\' | '\'')), None) => c,
            (Some(c), None, None) => c,
            _ => return Err(invalid("character")),
        };
        return Ok(c as i64);
    }

    let (negative, digits) = match operand.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, operand),
    };

    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map_err(|_| invalid("hex"))?
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).map_err(|_| invalid("binary"))?
    } else {
        digits.parse::<i64>().map_err(|_| invalid("decimal"))?
    };

    Ok(if negative { -value } else { value })
}

/// Narrow to a word; negatives down to -32768 wrap to two's complement.
fn to_word(value: i64, line_num: usize) -> Result<u16, AssemblerError> {
    match value {
        0..=0xFFFF => Ok(value as u16),
        -0x8000..=-1 => Ok(value as i16 as u16),
        _ => Err(AssemblerError::ValueOutOfRange { line: line_num, value }),
    }
}

fn is_label(operand: &str) -> bool {
    operand
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && operand.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Cut a trailing `;` comment, ignoring semicolons inside character literals.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '\'' => quoted = !quoted,
            ';' if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Split `LABEL: rest`, if the line starts with a label.
fn split_label(line: &str) -> Option<(&str, &str)> {
    let (label, rest) = line.split_once(':')?;
    if label.contains('\'') || label.trim().contains(char::is_whitespace) {
        return None;
    }
    Some((label, rest))
}

/// Split comma separated operands, keeping character literals intact.
fn split_operands(rest: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quoted = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in rest.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                out.push(rest[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(rest[start..].trim());
    out
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("label defined twice on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("macro error on line {line}: {source}")]
    Macro {
        line: usize,
        #[source]
        source: MacroError,
    },
}
