//! # micro16
//!
//! A cycle-accurate simulator of a small microcoded 16-bit machine.
//!
//! The machine is built the way the hardware would be: memory, six
//! registers and an ALU sit on shared signal lines, and a control unit
//! drives their control lines one micro-step at a time. An event scheduler
//! settles the datapath after every step.
//!
//! ```
//! use micro16::asm::print_program;
//! use micro16::config::defaults::OUTPUT_ADDR;
//! use micro16::machine::{Machine, OutputBuffer, StopReason};
//!
//! let program = print_program(0, OUTPUT_ADDR, "Hi");
//! let output = OutputBuffer::new();
//! let mut machine = Machine::new(output.sink());
//! machine.load(program.origin(), program.words()).unwrap();
//!
//! assert_eq!(machine.run(10_000).unwrap(), StopReason::Halted);
//! assert_eq!(output.text(), "Hi");
//! ```

pub mod sim;
pub mod cpu;
pub mod machine;
pub mod config;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use sim::{Circuit, LineId, SimError, Simulation};
pub use cpu::{Cpu, CpuError, DecodeError, Instruction, MicroStep, Reg};
pub use machine::{Machine, MachineError, MachineState, OutputBuffer, StopReason, Tick};
pub use config::MachineConfig;
pub use asm::{assemble, disassemble, AssemblerError, Image, Program, load_image, save_image};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
