//! Assembly tooling.
//!
//! This module provides:
//! - A program builder with the `load_constant` and `output_char` macros
//! - A two-pass text assembler (source → words)
//! - A disassembler (words → source)
//! - The `.hex` program image format

pub mod assembler;
pub mod builder;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, assemble_at, assemble_for, AssemblerError};
pub use builder::{load_constant, output_char, print_program, MacroError, Program};
pub use disasm::{disassemble, disassemble_word};
pub use image::{format_image, load_image, load_image_at, parse_image, parse_image_at, save_image, Image, ImageError};
