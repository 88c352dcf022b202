//! Disassembler.
//!
//! Output is valid assembler input: words that do not decode, or that carry
//! bits outside their operand fields, become `DAT`.

use crate::cpu::decode::{decode, encode};
use std::fmt::Write;

/// Disassemble a single word to text.
pub fn disassemble_word(word: u16) -> String {
    match decode(word) {
        Ok(instr) if encode(&instr) == word => instr.to_string(),
        _ => format!("DAT {:#06x}", word),
    }
}

/// Disassemble a block of words loaded at `origin` into a listing.
pub fn disassemble(origin: u16, words: &[u16]) -> String {
    let mut output = String::new();
    output.push_str("; micro16 disassembly\n");
    output.push_str("; -------------------\n");
    if origin != 0 {
        let _ = writeln!(output, "        ORG {:#06x}", origin);
    }

    for (i, &word) in words.iter().enumerate() {
        let addr = origin.wrapping_add(i as u16);
        let _ = writeln!(output, "        {:<16} ; {:04X}: {:04X}", disassemble_word(word), addr, word);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assembler::assemble;

    #[test]
    fn test_disassemble_words() {
        assert_eq!(disassemble_word(0x1000), "HALT");
        assert_eq!(disassemble_word(0xD348), "SET R3, 0x48");
        assert_eq!(disassemble_word(0xB320), "STORE R3, R2");
        assert_eq!(disassemble_word(0x6200), "JEQ R2");
        assert_eq!(disassemble_word(0xE123), "DAT 0xe123");
        assert_eq!(disassemble_word(0x1001), "DAT 0x1001");
    }

    #[test]
    fn test_listing_reassembles() {
        let words = [0xD0FF, 0xD108, 0x8300, 0xC030, 0x2300, 0xB320, 0xF000, 0x1000];
        let listing = disassemble(0x40, &words);
        assert!(listing.contains("ORG 0x0040"));

        let program = assemble(&listing).unwrap();
        assert_eq!(program.origin(), 0x40);
        assert_eq!(program.words(), &words);
    }
}
