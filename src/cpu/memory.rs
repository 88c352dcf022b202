//! Main memory.
//!
//! A flat array of 65,536 sixteen-bit words. The address line is as wide as
//! the address space, so every address the bus can carry is valid.

use crate::sim::{LineId, SimError, Simulation};
use crate::cpu::bus::Unit;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::trace;

/// The number of memory cells.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Values the memory control line can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum MemoryControl {
    Nop = 0,
    /// Drive the data line with the cell at the address line.
    WriteData = 1,
    /// Store the data line into the cell at the address line.
    ReadData = 2,
}

impl MemoryControl {
    /// Width of the memory control line.
    pub const WIDTH: u8 = 2;

    /// Decode a control line value.
    pub fn from_line(value: u16) -> Option<Self> {
        match value {
            0 => Some(MemoryControl::Nop),
            1 => Some(MemoryControl::WriteData),
            2 => Some(MemoryControl::ReadData),
            _ => None,
        }
    }
}

/// Word-addressed memory attached to the bus.
#[derive(Clone)]
pub struct Memory {
    cells: Vec<u16>,
    control: LineId,
    addr: LineId,
    data: LineId,
}

impl Memory {
    /// Create a zeroed memory on the given lines.
    pub fn new(control: LineId, addr: LineId, data: LineId) -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
            control,
            addr,
            data,
        }
    }

    /// Read a cell.
    #[inline]
    pub fn read(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    /// Write a cell from outside the datapath (loader, input device).
    #[inline]
    pub(crate) fn poke(&mut self, addr: u16, value: u16) {
        self.cells[addr as usize] = value;
    }

    /// Copy `program` into memory starting at `offset`.
    pub fn load_program(&mut self, offset: u16, program: &[u16]) -> Result<(), MemoryError> {
        let start = offset as usize;
        if start + program.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                offset,
                size: program.len(),
            });
        }

        self.cells[start..start + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        let end = (start as usize + count).min(MEMORY_SIZE);
        (start as usize..end)
            .map(|i| (i as u16, self.cells[i]))
            .collect()
    }

    /// React to the current control line value.
    pub fn react(&mut self, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
        let raw = sim.read(self.control);
        let control = MemoryControl::from_line(raw).ok_or_else(|| SimError::InvalidControl {
            line: sim.line(self.control).name().to_string(),
            value: raw,
        })?;

        match control {
            MemoryControl::Nop => {}
            MemoryControl::WriteData => {
                let addr = sim.read(self.addr);
                sim.write(self.data, self.cells[addr as usize])?;
            }
            MemoryControl::ReadData => {
                let addr = sim.read(self.addr);
                let value = sim.read(self.data);
                trace!(addr, value, "memory store");
                self.cells[addr as usize] = value;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Program runs past the end of the address space.
    #[error("program of {size} words at offset {offset:#06x} runs past the end of memory")]
    ProgramTooLarge { offset: u16, size: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Circuit;

    struct Lone(Memory);

    impl Circuit<Unit> for Lone {
        fn react(&mut self, _unit: Unit, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
            self.0.react(sim)
        }
    }

    fn rig() -> (Simulation<Unit>, Lone, [LineId; 3]) {
        let mut sim = Simulation::new();
        let control = sim.add_line("mem_ctl", MemoryControl::WIDTH);
        let addr = sim.add_line("addr", 16);
        let data = sim.add_line("data", 16);
        for line in [control, addr, data] {
            sim.subscribe(line, Unit::Memory);
        }
        (sim, Lone(Memory::new(control, addr, data)), [control, addr, data])
    }

    #[test]
    fn test_load_program() {
        let (_, mut mem, _) = rig();
        mem.0.load_program(0x10, &[1, 2, 3]).unwrap();

        assert_eq!(mem.0.read(0x10), 1);
        assert_eq!(mem.0.read(0x11), 2);
        assert_eq!(mem.0.read(0x12), 3);
        assert_eq!(mem.0.dump(0x0F, 2), vec![(0x0F, 0), (0x10, 1)]);
    }

    #[test]
    fn test_load_program_bounds() {
        let (_, mut mem, _) = rig();
        assert!(mem.0.load_program(0xFFFE, &[1, 2]).is_ok());
        assert_eq!(
            mem.0.load_program(0xFFFE, &[1, 2, 3]),
            Err(MemoryError::ProgramTooLarge { offset: 0xFFFE, size: 3 })
        );
    }

    #[test]
    fn test_read_out_onto_data_line() {
        let (mut sim, mut mem, [control, addr, data]) = rig();
        mem.0.load_program(0x4000, &[0xCAFE]).unwrap();

        sim.write(addr, 0x4000).unwrap();
        sim.write(control, MemoryControl::WriteData as u16).unwrap();
        sim.drain(&mut mem).unwrap();

        assert_eq!(sim.read(data), 0xCAFE);
    }

    #[test]
    fn test_store_from_data_line() {
        let (mut sim, mut mem, [control, addr, data]) = rig();

        sim.write(addr, 0xFFF0).unwrap();
        sim.write(data, 0x48).unwrap();
        sim.write(control, MemoryControl::ReadData as u16).unwrap();
        let reactions = sim.drain(&mut mem).unwrap();

        // Three wakes in one burst collapse into one reaction.
        assert_eq!(reactions, 1);
        assert_eq!(mem.0.read(0xFFF0), 0x48);
    }

    #[test]
    fn test_nop_leaves_lines_alone() {
        let (mut sim, mut mem, [_, addr, data]) = rig();
        mem.0.load_program(5, &[9]).unwrap();

        sim.write(addr, 5).unwrap();
        sim.drain(&mut mem).unwrap();

        assert_eq!(sim.read(data), 0);
        assert_eq!(sim.line(data).writes_this_cycle(), 0);
    }
}
