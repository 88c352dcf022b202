//! Control unit.
//!
//! The control unit never touches memory or other registers directly: each
//! tick it issues one micro-step as a full control word on the control
//! lines and lets the scheduler settle the datapath.
//!
//! ```text
//! Fetch -> Run -> IncrementPc -> Fetch
//!            \--> Fetch          (taken jump)
//!            \--> Halted
//! ```

use crate::sim::{LineId, SimError, Simulation};
use crate::cpu::alu::{Alu, AluControl, AluStatus};
use crate::cpu::bus::{Bus, Unit};
use crate::cpu::decode::{self, DecodeError, Instruction};
use crate::cpu::memory::MemoryControl;
use crate::cpu::registers::{Reg, RegisterControl, RegisterFile, RegisterId};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::debug;

/// The micro-step the control unit runs on its next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicroStep {
    /// Load the word at PC into IR.
    Fetch,
    /// Decode IR and assert its control lines.
    Run,
    /// Advance PC by one.
    IncrementPc,
    /// Terminal.
    Halted,
}

/// Ordering class of a control assertion.
///
/// Within a tick every line settles once, so sources must be driven before
/// anything latches them: addresses, then data, then latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Address,
    Data,
    Latch,
}

/// Assertions of one micro-step. Control lines not asserted are driven NOP.
struct ControlWord<'a> {
    bus: &'a Bus,
    drives: Vec<(Phase, LineId, u16)>,
}

impl<'a> ControlWord<'a> {
    fn new(bus: &'a Bus) -> Self {
        Self { bus, drives: Vec::new() }
    }

    fn memory(&mut self, control: MemoryControl) {
        let phase = match control {
            MemoryControl::WriteData => Phase::Data,
            MemoryControl::ReadData | MemoryControl::Nop => Phase::Latch,
        };
        self.drives.push((phase, self.bus.memory_control, control as u16));
    }

    fn alu(&mut self, control: AluControl) {
        self.drives.push((Phase::Data, self.bus.alu_control, control as u16));
    }

    fn register(&mut self, id: impl Into<RegisterId>, control: RegisterControl) {
        let phase = match control {
            RegisterControl::WriteAddr => Phase::Address,
            RegisterControl::WriteData => Phase::Data,
            RegisterControl::ReadData | RegisterControl::Increment | RegisterControl::Nop => Phase::Latch,
        };
        self.drives.push((phase, self.bus.register(id), control as u16));
    }

    fn immediate(&mut self, value: u16) {
        self.drives.push((Phase::Data, self.bus.data, value));
    }

    /// Drive NOP onto idle control lines, then every assertion in phase order.
    fn drive(mut self, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
        for line in self.bus.control_lines() {
            if !self.drives.iter().any(|&(_, asserted, _)| asserted == line) {
                sim.write(line, 0)?;
            }
        }
        self.drives.sort_by_key(|&(phase, _, _)| phase);
        for (_, line, value) in self.drives {
            sim.write(line, value)?;
        }
        Ok(())
    }
}

/// A micro-step that has been driven but not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issued {
    /// The step that ran.
    pub step: MicroStep,
    /// The step to run next, once the datapath has settled.
    pub next: MicroStep,
    /// Instruction decoded by a `Run` step.
    pub instruction: Option<Instruction>,
}

/// The control unit with its registers and ALU.
#[derive(Debug, Clone)]
pub struct Cpu {
    regs: RegisterFile,
    alu: Alu,
    bus: Bus,
    state: MicroStep,
    /// Micro-steps committed.
    cycles: u64,
    /// Instructions decoded and executed.
    retired: u64,
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a control unit on an already wired bus.
    pub fn new(bus: Bus) -> Self {
        Self {
            regs: RegisterFile::new(bus.register_control, bus.addr, bus.data),
            alu: Alu::new(bus.alu_control, bus.data),
            bus,
            state: MicroStep::Fetch,
            cycles: 0,
            retired: 0,
            last_instr: None,
        }
    }

    /// Register file.
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// ALU status flags.
    pub fn status(&self) -> AluStatus {
        self.alu.status()
    }

    /// Wiring table.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Next micro-step.
    pub fn state(&self) -> MicroStep {
        self.state
    }

    /// Micro-steps committed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Instructions executed so far.
    pub fn retired(&self) -> u64 {
        self.retired
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == MicroStep::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        !self.is_halted()
    }

    /// Drive the control word of the current micro-step.
    ///
    /// The state is not advanced; call [`Cpu::commit`] once the datapath
    /// has settled.
    pub fn issue(&self, sim: &mut Simulation<Unit>) -> Result<Issued, CpuError> {
        let mut word = ControlWord::new(&self.bus);
        let (next, instruction) = match self.state {
            MicroStep::Fetch => {
                word.register(RegisterId::Pc, RegisterControl::WriteAddr);
                word.memory(MemoryControl::WriteData);
                word.register(RegisterId::Ir, RegisterControl::ReadData);
                (MicroStep::Run, None)
            }
            MicroStep::Run => {
                let raw = self.regs.ir();
                let instr = decode::decode(raw).map_err(|source| CpuError::Decode {
                    pc: self.regs.pc(),
                    word: raw,
                    source,
                })?;
                debug!(pc = self.regs.pc(), word = raw, %instr, "decode");
                (self.microcode(instr, &mut word), Some(instr))
            }
            MicroStep::IncrementPc => {
                word.register(RegisterId::Pc, RegisterControl::Increment);
                (MicroStep::Fetch, None)
            }
            MicroStep::Halted => (MicroStep::Halted, None),
        };

        word.drive(sim)?;
        Ok(Issued { step: self.state, next, instruction })
    }

    /// Advance to the next micro-step after a settled tick.
    pub fn commit(&mut self, issued: Issued) {
        debug!(step = ?issued.step, next = ?issued.next, "micro-step");
        self.state = issued.next;
        self.cycles += 1;
        if let Some(instr) = issued.instruction {
            self.retired += 1;
            self.last_instr = Some(instr);
        }
    }

    /// Control assertions of a decoded instruction. Returns the next step.
    fn microcode(&self, instr: Instruction, word: &mut ControlWord<'_>) -> MicroStep {
        match instr {
            Instruction::Nop => MicroStep::IncrementPc,

            Instruction::Halt => MicroStep::Halted,

            Instruction::Cmp => {
                word.alu(AluControl::Cmp);
                MicroStep::IncrementPc
            }

            Instruction::Add { dst } => self.alu_op(AluControl::Add, dst, word),
            Instruction::Inv { dst } => self.alu_op(AluControl::Inv, dst, word),
            Instruction::Nand { dst } => self.alu_op(AluControl::Nand, dst, word),
            Instruction::ShiftLeft { dst } => self.alu_op(AluControl::ShiftLeft, dst, word),
            Instruction::ShiftRight { dst } => self.alu_op(AluControl::ShiftRight, dst, word),

            Instruction::Jump { target } => Self::jump(target, word),

            Instruction::JumpIfEqual { target } => {
                if self.alu.status().contains(AluStatus::EQUAL) {
                    Self::jump(target, word)
                } else {
                    MicroStep::IncrementPc
                }
            }

            Instruction::Load { dst, addr } => {
                word.register(addr, RegisterControl::WriteAddr);
                word.memory(MemoryControl::WriteData);
                word.register(dst, RegisterControl::ReadData);
                MicroStep::IncrementPc
            }

            Instruction::Store { src, addr } => {
                word.register(addr, RegisterControl::WriteAddr);
                word.register(src, RegisterControl::WriteData);
                word.memory(MemoryControl::ReadData);
                MicroStep::IncrementPc
            }

            Instruction::Move { dst, src } => {
                word.register(src, RegisterControl::WriteData);
                word.register(dst, RegisterControl::ReadData);
                MicroStep::IncrementPc
            }

            Instruction::Set { dst, value } => {
                word.register(dst, RegisterControl::ReadData);
                word.immediate(value as u16);
                MicroStep::IncrementPc
            }
        }
    }

    fn alu_op(&self, op: AluControl, dst: Reg, word: &mut ControlWord<'_>) -> MicroStep {
        word.alu(op);
        word.register(dst, RegisterControl::ReadData);
        MicroStep::IncrementPc
    }

    fn jump(target: Reg, word: &mut ControlWord<'_>) -> MicroStep {
        word.register(target, RegisterControl::WriteData);
        word.register(RegisterId::Pc, RegisterControl::ReadData);
        MicroStep::Fetch
    }

    /// Reaction of a register.
    pub(crate) fn react_register(&mut self, id: RegisterId, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
        self.regs[id].react(sim)
    }

    /// Reaction of the ALU, with R0 and R1 as operands.
    pub(crate) fn react_alu(&mut self, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
        let op0 = self.regs.value(Reg::R0);
        let op1 = self.regs.value(Reg::R1);
        self.alu.react(op0, op1, sim)
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("signal error: {0}")]
    Signal(#[from] SimError),

    #[error("decode error at PC={pc:#06x} (word {word:#06x}): {source}")]
    Decode {
        pc: u16,
        word: u16,
        #[source]
        source: DecodeError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Circuit;

    /// Registers and ALU only; no memory on the bus.
    struct Core(Cpu);

    impl Circuit<Unit> for Core {
        fn react(&mut self, unit: Unit, sim: &mut Simulation<Unit>) -> Result<(), SimError> {
            match unit {
                Unit::Register(id) => self.0.react_register(id, sim),
                Unit::Alu => self.0.react_alu(sim),
                Unit::Memory => Ok(()),
            }
        }
    }

    fn rig() -> (Simulation<Unit>, Core) {
        let mut sim = Simulation::new();
        let bus = Bus::wire(&mut sim);
        (sim, Core(Cpu::new(bus)))
    }

    /// Run one instruction word through Run and IncrementPc, bypassing fetch.
    fn execute(sim: &mut Simulation<Unit>, core: &mut Core, word: u16) -> Result<MicroStep, CpuError> {
        // Place the word in IR by driving it on the data line.
        sim.begin_cycle();
        let ir = core.0.bus.register(RegisterId::Ir);
        let idle: Vec<LineId> = core.0.bus.control_lines().filter(|&l| l != ir).collect();
        for line in idle {
            sim.write(line, 0)?;
        }
        sim.write(core.0.bus.data, word)?;
        sim.write(core.0.bus.register(RegisterId::Ir), RegisterControl::ReadData as u16)?;
        sim.drain(core)?;
        core.0.state = MicroStep::Run;

        sim.begin_cycle();
        let issued = core.0.issue(sim)?;
        sim.drain(core)?;
        core.0.commit(issued);
        Ok(issued.next)
    }

    #[test]
    fn test_set_then_add() {
        let (mut sim, mut core) = rig();
        execute(&mut sim, &mut core, 0xD0FF).unwrap(); // SET R0, 0xFF
        execute(&mut sim, &mut core, 0xD101).unwrap(); // SET R1, 0x01
        let next = execute(&mut sim, &mut core, 0x2300).unwrap(); // ADD R3

        assert_eq!(next, MicroStep::IncrementPc);
        assert_eq!(core.0.registers().general(), [0xFF, 0x01, 0, 0x0100]);
        assert_eq!(core.0.status(), AluStatus::OK);
        assert_eq!(core.0.retired(), 3);
    }

    #[test]
    fn test_alu_destination_may_be_operand() {
        let (mut sim, mut core) = rig();
        execute(&mut sim, &mut core, 0xD005).unwrap(); // SET R0, 5
        execute(&mut sim, &mut core, 0xD107).unwrap(); // SET R1, 7
        execute(&mut sim, &mut core, 0x2000).unwrap(); // ADD R0

        assert_eq!(core.0.registers().value(Reg::R0), 12);
    }

    #[test]
    fn test_move_copies_source_into_destination() {
        let (mut sim, mut core) = rig();
        execute(&mut sim, &mut core, 0xD342).unwrap(); // SET R3, 0x42
        execute(&mut sim, &mut core, 0xC230).unwrap(); // MOVE R2, R3

        assert_eq!(core.0.registers().general(), [0, 0, 0x42, 0x42]);
    }

    #[test]
    fn test_jump_loads_pc_and_skips_increment() {
        let (mut sim, mut core) = rig();
        execute(&mut sim, &mut core, 0xD230).unwrap(); // SET R2, 0x30
        let next = execute(&mut sim, &mut core, 0x5200).unwrap(); // JMP R2

        assert_eq!(next, MicroStep::Fetch);
        assert_eq!(core.0.registers().pc(), 0x30);
    }

    #[test]
    fn test_jump_if_equal_falls_through_without_flag() {
        let (mut sim, mut core) = rig();
        execute(&mut sim, &mut core, 0xD230).unwrap(); // SET R2, 0x30
        let next = execute(&mut sim, &mut core, 0x6200).unwrap(); // JEQ R2

        assert_eq!(next, MicroStep::IncrementPc);
        assert_eq!(core.0.registers().pc(), 0);
    }

    #[test]
    fn test_halt_is_terminal() {
        let (mut sim, mut core) = rig();
        let next = execute(&mut sim, &mut core, 0x1000).unwrap();
        assert_eq!(next, MicroStep::Halted);
        assert!(core.0.is_halted());
    }

    #[test]
    fn test_same_register_twice_conflicts() {
        let (mut sim, mut core) = rig();
        // MOVE R1, R1 asserts READ_DATA and WRITE_DATA on r1_ctl.
        let err = execute(&mut sim, &mut core, 0xC110).unwrap_err();
        assert!(matches!(
            err,
            CpuError::Signal(SimError::WriteConflict { ref line, .. }) if line == "r1_ctl"
        ));
        assert_eq!(core.0.state(), MicroStep::Run);
    }

    #[test]
    fn test_undefined_opcode() {
        let (mut sim, mut core) = rig();
        let err = execute(&mut sim, &mut core, 0xE000).unwrap_err();
        assert_eq!(
            err,
            CpuError::Decode { pc: 0, word: 0xE000, source: DecodeError::UnhandledOpcode(0xE) }
        );
    }

    #[test]
    fn test_increment_pc_step() {
        let (mut sim, mut core) = rig();
        core.0.state = MicroStep::IncrementPc;
        sim.begin_cycle();
        let issued = core.0.issue(&mut sim).unwrap();
        sim.drain(&mut core).unwrap();
        core.0.commit(issued);

        assert_eq!(core.0.registers().pc(), 1);
        assert_eq!(core.0.state(), MicroStep::Fetch);
        assert_eq!(core.0.retired(), 0);
    }
}
