//! Datapath components of the 16-bit machine.
//!
//! - 65,536 words of memory
//! - 6 registers: R0..R3 (general purpose), IR, PC
//! - a combinational ALU reading R0 and R1
//! - a microcoded control unit stepping Fetch, Run and IncrementPc
//!
//! Components only talk through the lines allocated in [`bus`].

pub mod alu;
pub mod bus;
pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;

pub use alu::{Alu, AluControl, AluStatus};
pub use bus::{Bus, Unit};
pub use decode::{decode, encode, DecodeError, Instruction, Opcode, OperandFormat};
pub use execute::{Cpu, CpuError, Issued, MicroStep};
pub use memory::{Memory, MemoryControl, MemoryError, MEMORY_SIZE};
pub use registers::{Reg, Register, RegisterControl, RegisterFile, RegisterId};
