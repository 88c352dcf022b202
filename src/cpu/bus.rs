//! Static wiring table.
//!
//! All lines of the machine are allocated here, once, together with every
//! subscription. Components keep the [`LineId`]s they were handed; nothing
//! subscribes after construction.

use crate::sim::{LineId, Simulation};
use crate::cpu::alu::AluControl;
use crate::cpu::memory::MemoryControl;
use crate::cpu::registers::{RegisterControl, RegisterId};
use serde::{Serialize, Deserialize};

/// Key of every component the scheduler can wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Memory,
    Register(RegisterId),
    Alu,
}

/// Line ids of the shared datapath.
#[derive(Debug, Clone)]
pub struct Bus {
    /// 16-bit address line.
    pub addr: LineId,
    /// 16-bit data line, also the ALU output.
    pub data: LineId,
    pub memory_control: LineId,
    pub alu_control: LineId,
    /// One per register, indexed by [`RegisterId::index`].
    pub register_control: [LineId; 6],
}

impl Bus {
    /// Allocate every line and subscription of the machine.
    pub fn wire(sim: &mut Simulation<Unit>) -> Self {
        let addr = sim.add_line("addr", 16);
        let data = sim.add_line("data", 16);
        let memory_control = sim.add_line("mem_ctl", MemoryControl::WIDTH);
        let alu_control = sim.add_line("alu_ctl", AluControl::WIDTH);
        let register_control = RegisterId::ALL.map(|id| {
            sim.add_line(control_line_name(id), RegisterControl::WIDTH)
        });

        sim.subscribe(memory_control, Unit::Memory);
        sim.subscribe(addr, Unit::Memory);
        sim.subscribe(data, Unit::Memory);

        for id in RegisterId::ALL {
            sim.subscribe(register_control[id.index()], Unit::Register(id));
            sim.subscribe(data, Unit::Register(id));
        }

        sim.subscribe(alu_control, Unit::Alu);

        Self { addr, data, memory_control, alu_control, register_control }
    }

    /// Control line of one register.
    pub fn register(&self, id: impl Into<RegisterId>) -> LineId {
        self.register_control[id.into().index()]
    }

    /// Every control line the control unit drives.
    pub fn control_lines(&self) -> impl Iterator<Item = LineId> + '_ {
        [self.memory_control, self.alu_control]
            .into_iter()
            .chain(self.register_control.iter().copied())
    }
}

fn control_line_name(id: RegisterId) -> &'static str {
    match id {
        RegisterId::Ir => "ir_ctl",
        RegisterId::Pc => "pc_ctl",
        RegisterId::Gpr(reg) => ["r0_ctl", "r1_ctl", "r2_ctl", "r3_ctl"][reg.code() as usize],
    }
}
