//! Assembler, image and configuration round trips through a running machine.

use micro16::asm::{assemble, assemble_for, disassemble, format_image, parse_image, Image};
use micro16::machine::{Machine, OutputBuffer, StopReason};
use micro16::MachineConfig;

const GREETING: &str = r#"
        ORG 0x0100
start:  SET R3, 'o'
        OUT R3, R2, R1
        SET R3, 'k'
        OUT R3, R2, R1
        LDI R3, done
        JMP R3
        DAT 0xFFFF          ; never executed
done:   HALT
"#;

fn run_image(image: &Image, config: MachineConfig) -> String {
    let output = OutputBuffer::new();
    let mut machine = Machine::with_config(config, output.sink());
    machine.load(image.origin, &image.words).unwrap();

    // Entry is the load address; jump there first when it is not zero.
    if image.origin != 0 {
        let boot = assemble(&format!("LDI R3, {:#06x}\nJMP R3", image.origin)).unwrap();
        machine.load(0, boot.words()).unwrap();
    }
    assert_eq!(machine.run(100_000).unwrap(), StopReason::Halted);
    output.text()
}

#[test]
fn source_image_listing_agree() {
    let program = assemble(GREETING).unwrap();
    assert_eq!(program.origin(), 0x100);
    assert_eq!(program.address_of("START"), Some(0x100));

    let image = Image::from(&program);
    let reparsed = parse_image(&format_image(&image)).unwrap();
    assert_eq!(reparsed, image);

    let listing = disassemble(image.origin, &image.words);
    let reassembled = assemble(&listing).unwrap();
    assert_eq!(reassembled.words(), program.words());
    assert_eq!(reassembled.origin(), program.origin());

    assert_eq!(run_image(&image, MachineConfig::default()), "ok");
}

#[test]
fn output_cell_follows_configuration() {
    let config = MachineConfig::from_json(r#"{ "output_addr": 32768 }"#).unwrap();

    let image = Image::from(
        &assemble(
            r#"
            LDI R2, 0x8000
            SET R3, 'A'
            STORE R3, R2
            LDI R2, 0xFFF0
            SET R3, 'B'
            STORE R3, R2
            HALT
            "#,
        )
        .unwrap(),
    );

    assert_eq!(run_image(&image, config), "A");
    assert_eq!(run_image(&image, MachineConfig::default()), "B");
}

#[test]
fn out_macro_follows_configured_output_cell() {
    let config = MachineConfig::from_json(r#"{ "output_addr": 32768 }"#).unwrap();
    let source = "SET R3, 'A'\nOUT R3, R2, R1\nHALT";

    let image = Image::from(&assemble_for(source, &config).unwrap());
    assert_eq!(run_image(&image, config), "A");

    // Assembled for the default cell, nothing reaches the moved one.
    let config = MachineConfig::from_json(r#"{ "output_addr": 32768 }"#).unwrap();
    let image = Image::from(&assemble(source).unwrap());
    assert_eq!(run_image(&image, config), "");
}
