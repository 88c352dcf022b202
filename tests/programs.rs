//! End-to-end programs.
//!
//! Each test assembles a small program, runs it on a full machine and
//! checks registers, ALU status, output and halting.

use micro16::asm::{assemble, print_program, Program};
use micro16::config::defaults::OUTPUT_ADDR;
use micro16::cpu::{AluStatus, CpuError, Instruction, MicroStep, Reg};
use micro16::machine::{Machine, MachineError, OutputBuffer, StopReason, Tick};
use micro16::SimError;
use proptest::prelude::*;

fn boot(program: &Program) -> (Machine, OutputBuffer) {
    let output = OutputBuffer::new();
    let mut machine = Machine::new(output.sink());
    machine.load(program.origin(), program.words()).unwrap();
    (machine, output)
}

fn run_source(source: &str) -> (Machine, OutputBuffer) {
    let program = assemble(source).unwrap();
    let (mut machine, output) = boot(&program);
    assert_eq!(machine.run(100_000).unwrap(), StopReason::Halted);
    (machine, output)
}

#[test]
fn hello_world() {
    let program = print_program(0, OUTPUT_ADDR, "Hello World");
    let (mut machine, output) = boot(&program);

    assert_eq!(machine.run(100_000).unwrap(), StopReason::Halted);
    assert_eq!(output.text(), "Hello World");

    // Three ticks per instruction, two for the final HALT.
    let instructions = program.len() as u64;
    assert_eq!(machine.cpu().retired(), instructions);
    assert_eq!(machine.ticks(), 3 * instructions - 1);
}

#[test]
fn hello_world_from_source() {
    let (_, output) = run_source(
        r#"
        ; R1 doubles as the zero register of OUT.
            SET R3, 'H'
            OUT R3, R2, R1
            SET R3, 'i'
            OUT R3, R2, R1
            OUT R3, R2, R1      ; same byte twice
            SET R3, '!'
            OUT R3, R2, R1
            HALT
        "#,
    );
    assert_eq!(output.text(), "Hii!");
}

#[test]
fn single_character_is_emitted_once() {
    let program = assemble(
        r#"
            LDI R2, 0xFFF0
            SET R3, 'H'
            STORE R3, R2
            SET R3, 0
            STORE R3, R2
            HALT
        "#,
    )
    .unwrap();
    let (mut machine, output) = boot(&program);

    let mut emitted = Vec::new();
    while machine.is_running() {
        if let Tick::Stepped { output: Some(byte), step } = machine.tick().unwrap() {
            emitted.push((byte, step, machine.cpu().registers().pc()));
        }
    }

    // Emitted on the Run tick of the first STORE, at address 7.
    assert_eq!(emitted, vec![(b'H', MicroStep::Run, 7)]);
    assert_eq!(output.bytes(), vec![b'H']);
}

#[test]
fn add_without_and_with_carry() {
    let (machine, _) = run_source(
        r#"
            SET R0, 0xFF
            SET R1, 0x01
            ADD R2
            HALT
        "#,
    );
    assert_eq!(machine.cpu().registers().value(Reg::R2), 0x0100);
    assert_eq!(machine.cpu().status(), AluStatus::OK);

    let (machine, _) = run_source(
        r#"
            LDI R0, 0xFFFF
            SET R1, 1
            ADD R2
            HALT
        "#,
    );
    assert_eq!(machine.cpu().registers().value(Reg::R0), 0xFFFF);
    assert_eq!(machine.cpu().registers().value(Reg::R2), 0x0000);
    assert_eq!(machine.cpu().status(), AluStatus::CARRY);
}

#[test]
fn logic_and_shifts() {
    let (machine, _) = run_source(
        r#"
            LDI R0, 0xF0F0
            SET R1, 4
            SHR R2          ; 0x0F0F
            SHL R3          ; 0x0F00
            INV R0          ; 0x0F0F
            HALT
        "#,
    );
    assert_eq!(machine.cpu().registers().general(), [0x0F0F, 4, 0x0F0F, 0x0F00]);

    let (machine, _) = run_source(
        r#"
            SET R0, 0x0C
            SET R1, 0x0A
            NAND R3
            HALT
        "#,
    );
    assert_eq!(machine.cpu().registers().value(Reg::R3), 0xFFF7);
}

const BRANCH: &str = r#"
        LDI R2, equal       ; clobbers R0, R1 and status
        SET R0, 5
        SET R1, {rhs}
        CMP
        JEQ R2
        SET R3, 1
        HALT
    equal:
        SET R3, 2
        HALT
"#;

#[test]
fn jump_if_equal_taken() {
    let (machine, _) = run_source(&BRANCH.replace("{rhs}", "5"));
    assert_eq!(machine.cpu().status(), AluStatus::EQUAL);
    assert_eq!(machine.cpu().registers().value(Reg::R3), 2);
}

#[test]
fn jump_if_equal_not_taken() {
    let (machine, _) = run_source(&BRANCH.replace("{rhs}", "6"));
    assert_eq!(machine.cpu().status(), AluStatus::OK);
    assert_eq!(machine.cpu().registers().value(Reg::R3), 1);
}

#[test]
fn load_and_store_memory() {
    let (machine, _) = run_source(
        r#"
            LDI R2, value
            LOAD R3, R2         ; R3 = 0x1234
            LDI R2, copy
            STORE R3, R2
            HALT
        value: DAT 0x1234
        copy:  DAT 0
        "#,
    );

    let regs = machine.cpu().registers();
    assert_eq!(regs.value(Reg::R3), 0x1234);
    assert_eq!(machine.memory().read(regs.value(Reg::R2)), 0x1234);
}

#[test]
fn unconditional_jump_skips_code() {
    let (machine, _) = run_source(
        r#"
            LDI R2, over
            JMP R2
            SET R3, 0xAA
        over:
            HALT
        "#,
    );
    assert_eq!(machine.cpu().registers().value(Reg::R3), 0);
}

#[test]
fn input_is_read_and_echoed() {
    let program = assemble(
        r#"
            LDI R2, 0xFFF1
            LOAD R3, R2
            SET R1, 0
            STORE R1, R2        ; consume input
            OUT R3, R2, R1
            HALT
        "#,
    )
    .unwrap();
    let (mut machine, output) = boot(&program);
    machine.feed_input(b'z');
    assert!(machine.input_pending());

    assert_eq!(machine.run(10_000).unwrap(), StopReason::Halted);
    assert_eq!(output.text(), "z");
    assert!(!machine.input_pending());
}

#[test]
fn halted_machine_stays_halted() {
    let program = assemble("HALT").unwrap();
    let (mut machine, _) = boot(&program);
    assert!(machine.is_running());

    assert_eq!(machine.run(10).unwrap(), StopReason::Halted);
    assert!(!machine.is_running());

    let state = machine.state();
    for _ in 0..5 {
        assert_eq!(machine.tick().unwrap(), Tick::Halted);
    }
    assert_eq!(machine.state(), state);
    assert!(!machine.is_running());
}

#[test]
fn same_register_twice_is_a_conflict() {
    for source in ["MOVE R1, R1", "LOAD R2, R2", "STORE R3, R3"] {
        let program = assemble(source).unwrap();
        let (mut machine, _) = boot(&program);
        machine.tick().unwrap();

        let err = machine.tick().unwrap_err();
        assert!(
            matches!(err, MachineError::Cpu(CpuError::Signal(SimError::WriteConflict { .. }))),
            "{}: {:?}",
            source,
            err
        );
        assert_eq!(machine.cpu().state(), MicroStep::Run);
    }
}

#[test]
fn undefined_opcode_stops_machine() {
    let program = assemble("NOP\nDAT 0xE000").unwrap();
    let (mut machine, _) = boot(&program);

    let err = machine.run(100).unwrap_err();
    assert_eq!(err.to_string(), "decode error at PC=0x0001 (word 0xe000): unhandled opcode 0xe");
}

proptest! {
    #[test]
    fn set_loads_only_its_register(code in 0u8..4, value: u8) {
        let reg = Reg::from_code(code).unwrap();
        let mut program = Program::new(0);
        program.emit(Instruction::Set { dst: reg, value }).emit(Instruction::Halt);
        let (mut machine, _) = boot(&program);

        machine.tick().unwrap();
        machine.tick().unwrap();

        let mut expected = [0u16; 4];
        expected[code as usize] = value as u16;
        prop_assert_eq!(machine.cpu().registers().general(), expected);
    }
}
