//! The assembled machine.
//!
//! Owns the scheduler with its line arena, the memory and the control unit,
//! and applies the memory-mapped I/O convention after every tick.

use crate::config::MachineConfig;
use crate::cpu::{
    AluStatus, Bus, Cpu, CpuError, Memory, MemoryError, MicroStep, RegisterId, Unit,
};
use crate::sim::{Circuit, SimError, Simulation};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info};

/// Receives every byte the program outputs.
pub type OutputSink = Box<dyn FnMut(u8)>;

/// Dispatches scheduler wake-ups to the components.
struct Datapath<'a> {
    memory: &'a mut Memory,
    cpu: &'a mut Cpu,
}

impl Circuit<Unit> for Datapath<'_> {
    fn react(&mut self, unit: Unit, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
        match unit {
            Unit::Memory => self.memory.react(sim),
            Unit::Register(id) => self.cpu.react_register(id, sim),
            Unit::Alu => self.cpu.react_alu(sim),
        }
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A micro-step ran; `output` is the byte emitted after it, if any.
    Stepped { step: MicroStep, output: Option<u8> },
    /// The machine was already halted; nothing changed.
    Halted,
}

/// Why [`Machine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Halted,
    TickLimit,
}

/// The complete simulated machine.
pub struct Machine {
    sim: Simulation<Unit>,
    memory: Memory,
    cpu: Cpu,
    config: MachineConfig,
    sink: OutputSink,
    last_output: u16,
    ticks: u64,
}

impl Machine {
    /// Create a machine with the default memory map.
    pub fn new(sink: impl FnMut(u8) + 'static) -> Self {
        Self::with_config(MachineConfig::default(), sink)
    }

    /// Create a machine with an explicit configuration.
    pub fn with_config(config: MachineConfig, sink: impl FnMut(u8) + 'static) -> Self {
        let mut sim = Simulation::new();
        let bus = Bus::wire(&mut sim);
        let memory = Memory::new(bus.memory_control, bus.addr, bus.data);
        let cpu = Cpu::new(bus);

        Self {
            sim,
            memory,
            cpu,
            config,
            sink: Box::new(sink),
            last_output: 0,
            ticks: 0,
        }
    }

    /// Power-cycle: fresh lines, zeroed memory and registers. The sink and
    /// configuration are kept.
    pub fn reset(&mut self) {
        let mut sim = Simulation::new();
        let bus = Bus::wire(&mut sim);
        self.memory = Memory::new(bus.memory_control, bus.addr, bus.data);
        self.cpu = Cpu::new(bus);
        self.sim = sim;
        self.last_output = 0;
        self.ticks = 0;
    }

    /// Copy a program into memory at `offset`.
    pub fn load(&mut self, offset: u16, words: &[u16]) -> Result<(), MachineError> {
        self.memory.load_program(offset, words)?;
        debug!(offset, words = words.len(), "program loaded");
        Ok(())
    }

    /// Run one micro-step and settle the datapath.
    ///
    /// On error the control unit stays on the failing micro-step.
    pub fn tick(&mut self) -> Result<Tick, MachineError> {
        if self.cpu.is_halted() {
            debug!(ticks = self.ticks, "tick on halted machine");
            return Ok(Tick::Halted);
        }

        self.sim.begin_cycle();
        let issued = match self.cpu.issue(&mut self.sim) {
            Ok(issued) => issued,
            Err(e) => {
                self.sim.discard_pending();
                return Err(e.into());
            }
        };

        let mut datapath = Datapath {
            memory: &mut self.memory,
            cpu: &mut self.cpu,
        };
        self.sim.drain(&mut datapath).map_err(CpuError::from)?;
        self.cpu.commit(issued);
        self.ticks += 1;

        if issued.next == MicroStep::Halted {
            info!(ticks = self.ticks, retired = self.cpu.retired(), "halted");
        }

        let output = self.poll_output();
        Ok(Tick::Stepped { step: issued.step, output })
    }

    /// Emit the output cell if it holds a new nonzero value.
    ///
    /// Only the low byte reaches the sink, so a change to a value such as
    /// 0x0100 emits a NUL byte.
    fn poll_output(&mut self) -> Option<u8> {
        let current = self.memory.read(self.config.output_addr);
        let fresh = current != 0 && current != self.last_output;
        self.last_output = current;

        if !fresh {
            return None;
        }
        let byte = (current & 0xFF) as u8;
        info!(byte, ch = %char::from(byte).escape_default(), "output");
        (self.sink)(byte);
        Some(byte)
    }

    /// Tick until the machine halts or `limit` ticks have run.
    pub fn run(&mut self, limit: u64) -> Result<StopReason, MachineError> {
        for _ in 0..limit {
            if self.tick()? == Tick::Halted {
                return Ok(StopReason::Halted);
            }
        }
        Ok(if self.is_running() { StopReason::TickLimit } else { StopReason::Halted })
    }

    /// Tick through the rest of the current instruction: until the next
    /// fetch is due, or the machine halts. Returns the ticks run.
    pub fn step_instruction(&mut self) -> Result<u32, MachineError> {
        let mut ticks = 0;
        loop {
            if self.tick()? == Tick::Halted {
                return Ok(ticks);
            }
            ticks += 1;
            if self.cpu.state() == MicroStep::Fetch || self.cpu.is_halted() {
                return Ok(ticks);
            }
        }
    }

    /// Write a byte into the input cell.
    pub fn feed_input(&mut self, byte: u8) {
        debug!(byte, "input");
        self.memory.poke(self.config.input_addr, byte as u16);
    }

    /// True while the input cell has not been cleared by the program.
    pub fn input_pending(&self) -> bool {
        self.memory.read(self.config.input_addr) != 0
    }

    /// Check if the machine is running.
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Ticks run since construction or reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// The scheduler and its lines.
    pub fn simulation(&self) -> &Simulation<Unit> {
        &self.sim
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Snapshot of everything observable.
    pub fn state(&self) -> MachineState {
        let regs = self.cpu.registers();
        MachineState {
            running: self.is_running(),
            step: self.cpu.state(),
            ticks: self.ticks,
            cycles: self.cpu.cycles(),
            retired: self.cpu.retired(),
            reactions: self.sim.reactions(),
            registers: RegisterId::ALL
                .iter()
                .map(|&id| RegisterState { name: id.name().to_string(), value: regs.value(id) })
                .collect(),
            status: self.cpu.status(),
            last_instruction: self.cpu.last_instruction().map(|i| i.to_string()),
            lines: self
                .sim
                .lines()
                .map(|(_, wire)| LineState {
                    name: wire.name().to_string(),
                    width: wire.width(),
                    value: wire.value(),
                })
                .collect(),
        }
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("cpu", &self.cpu)
            .field("memory", &self.memory)
            .field("config", &self.config)
            .field("ticks", &self.ticks)
            .finish()
    }
}

/// A sink that collects output into a shared buffer.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Rc<RefCell<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink feeding this buffer, for [`Machine::new`].
    pub fn sink(&self) -> impl FnMut(u8) + 'static {
        let buffer = Rc::clone(&self.0);
        move |byte| buffer.borrow_mut().push(byte)
    }

    /// Bytes collected so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    /// Collected output as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    /// Remove and return everything collected.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterState {
    pub name: String,
    pub value: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineState {
    pub name: String,
    pub width: u8,
    pub value: u16,
}

/// Serializable snapshot of a [`Machine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub running: bool,
    pub step: MicroStep,
    pub ticks: u64,
    pub cycles: u64,
    pub retired: u64,
    pub reactions: u64,
    pub registers: Vec<RegisterState>,
    pub status: AluStatus,
    pub last_instruction: Option<String>,
    pub lines: Vec<LineState>,
}

impl MachineState {
    /// Value of a register by its short name.
    pub fn register(&self, name: &str) -> Option<u16> {
        self.registers.iter().find(|r| r.name == name).map(|r| r.value)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "state: {:?} ({})",
            self.step,
            if self.running { "running" } else { "halted" }
        )?;
        writeln!(
            f,
            "ticks: {}  instructions: {}  reactions: {}",
            self.ticks, self.retired, self.reactions
        )?;
        if let Some(instr) = &self.last_instruction {
            writeln!(f, "last:  {}", instr)?;
        }
        writeln!(f, "alu:   {}", self.status)?;
        for reg in &self.registers {
            writeln!(f, "{:<4}  {:#06x}  ({})", reg.name.to_uppercase(), reg.value, reg.value)?;
        }
        write!(f, "lines:")?;
        for line in &self.lines {
            write!(f, " {}={:#x}", line.name, line.value)?;
        }
        writeln!(f)
    }
}

/// Errors that stop the machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error(transparent)]
    Cpu(#[from] CpuError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{encode, Instruction, Reg};

    fn machine(program: &[Instruction]) -> (Machine, OutputBuffer) {
        let out = OutputBuffer::new();
        let mut m = Machine::new(out.sink());
        let words: Vec<u16> = program.iter().map(encode).collect();
        m.load(0, &words).unwrap();
        (m, out)
    }

    #[test]
    fn test_instruction_takes_three_ticks() {
        let (mut m, _) = machine(&[
            Instruction::Set { dst: Reg::R2, value: 0x7F },
            Instruction::Halt,
        ]);

        assert_eq!(m.tick().unwrap(), Tick::Stepped { step: MicroStep::Fetch, output: None });
        assert_eq!(m.tick().unwrap(), Tick::Stepped { step: MicroStep::Run, output: None });
        assert_eq!(m.cpu().registers().value(Reg::R2), 0x7F);
        assert_eq!(m.tick().unwrap(), Tick::Stepped { step: MicroStep::IncrementPc, output: None });
        assert_eq!(m.cpu().registers().pc(), 1);
        assert_eq!(m.cpu().registers().general(), [0, 0, 0x7F, 0]);
    }

    #[test]
    fn test_halt_freezes_machine() {
        let (mut m, _) = machine(&[Instruction::Halt]);
        assert!(m.is_running());

        assert_eq!(m.run(100).unwrap(), StopReason::Halted);
        assert!(!m.is_running());
        let before = m.state();

        assert_eq!(m.tick().unwrap(), Tick::Halted);
        assert_eq!(m.tick().unwrap(), Tick::Halted);
        assert_eq!(m.state(), before);
        assert_eq!(m.ticks(), 2);
    }

    #[test]
    fn test_run_stops_at_limit() {
        // JMP R0 with R0 = 0 loops forever.
        let (mut m, _) = machine(&[Instruction::Jump { target: Reg::R0 }]);
        assert_eq!(m.run(10).unwrap(), StopReason::TickLimit);
        assert_eq!(m.ticks(), 10);
        assert!(m.is_running());
    }

    #[test]
    fn test_store_to_output_cell_emits_once() {
        let mut program = vec![
            // R2 = 0xFFF0 via ~0x000F.
            Instruction::Set { dst: Reg::R0, value: 0x0F },
            Instruction::Inv { dst: Reg::R2 },
            Instruction::Set { dst: Reg::R3, value: b'H' },
            Instruction::Store { src: Reg::R3, addr: Reg::R2 },
        ];
        // Storing the same value again does not repeat it.
        program.push(Instruction::Store { src: Reg::R3, addr: Reg::R2 });
        program.push(Instruction::Halt);

        let (mut m, out) = machine(&program);
        m.run(1000).unwrap();

        assert_eq!(out.text(), "H");
        assert_eq!(m.memory().read(0xFFF0), b'H' as u16);
    }

    #[test]
    fn test_wide_output_value_emits_low_byte() {
        let (mut m, out) = machine(&[
            Instruction::Set { dst: Reg::R0, value: 0x0F },
            Instruction::Inv { dst: Reg::R2 },
            // R3 = 1 << 8
            Instruction::Set { dst: Reg::R0, value: 1 },
            Instruction::Set { dst: Reg::R1, value: 8 },
            Instruction::ShiftLeft { dst: Reg::R3 },
            Instruction::Store { src: Reg::R3, addr: Reg::R2 },
            Instruction::Halt,
        ]);
        m.run(1000).unwrap();

        assert_eq!(m.memory().read(0xFFF0), 0x0100);
        assert_eq!(out.bytes(), vec![0]);
    }

    #[test]
    fn test_step_instruction() {
        let (mut m, _) = machine(&[
            Instruction::Set { dst: Reg::R1, value: 3 },
            Instruction::Halt,
        ]);
        assert_eq!(m.step_instruction().unwrap(), 3);
        assert_eq!(m.cpu().registers().value(Reg::R1), 3);
        assert_eq!(m.step_instruction().unwrap(), 2);
        assert!(!m.is_running());
        assert_eq!(m.step_instruction().unwrap(), 0);
    }

    #[test]
    fn test_conflict_does_not_advance() {
        let (mut m, _) = machine(&[Instruction::Move { dst: Reg::R1, src: Reg::R1 }]);
        m.tick().unwrap();
        let err = m.tick().unwrap_err();
        assert!(matches!(err, MachineError::Cpu(CpuError::Signal(SimError::WriteConflict { .. }))));
        assert_eq!(m.cpu().state(), MicroStep::Run);
        assert_eq!(m.ticks(), 1);
    }

    #[test]
    fn test_undefined_opcode_is_fatal() {
        let out = OutputBuffer::new();
        let mut m = Machine::new(out.sink());
        m.load(0, &[0xF000]).unwrap();
        m.tick().unwrap();
        assert!(matches!(m.tick(), Err(MachineError::Cpu(CpuError::Decode { pc: 0, .. }))));
    }

    #[test]
    fn test_load_past_end() {
        let mut m = Machine::new(|_| {});
        assert!(matches!(m.load(0xFFFF, &[1, 2]), Err(MachineError::Memory(_))));
    }

    #[test]
    fn test_feed_input() {
        let mut m = Machine::new(|_| {});
        assert!(!m.input_pending());
        m.feed_input(b'a');
        assert!(m.input_pending());
        assert_eq!(m.memory().read(0xFFF1), 0x61);
    }

    #[test]
    fn test_state_snapshot() {
        let (mut m, _) = machine(&[Instruction::Set { dst: Reg::R3, value: 0x42 }, Instruction::Halt]);
        m.run(100).unwrap();

        let state = m.state();
        assert!(!state.running);
        assert_eq!(state.step, MicroStep::Halted);
        assert_eq!(state.register("r3"), Some(0x42));
        assert_eq!(state.register("pc"), Some(1));
        assert_eq!(state.retired, 2);
        assert_eq!(state.last_instruction.as_deref(), Some("HALT"));
        assert_eq!(state.lines.len(), 10);

        let dump = state.to_string();
        assert!(dump.contains("R3    0x0042"));
        assert!(dump.contains("halted"));

        let json = serde_json::to_string(&state).unwrap();
        let back: MachineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_reset_keeps_sink() {
        let (mut m, out) = machine(&[Instruction::Halt]);
        m.run(10).unwrap();
        m.reset();
        assert!(m.is_running());
        assert_eq!(m.ticks(), 0);
        assert_eq!(m.memory().read(0), 0);
        assert!(out.bytes().is_empty());
    }
}
