//! WebAssembly bindings.
//!
//! This module provides JavaScript-friendly wrappers around the machine.

use wasm_bindgen::prelude::*;
use crate::asm::assembler::assemble;
use crate::asm::disasm::disassemble_word;
use crate::asm::Image;
use crate::cpu::{Reg, RegisterId};
use crate::machine::{Machine, OutputBuffer, StopReason, Tick};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    machine: Machine,
    output: OutputBuffer,
    image: Image,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create a new machine instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let output = OutputBuffer::new();
        Self {
            machine: Machine::new(output.sink()),
            output,
            image: Image::default(),
        }
    }

    /// Load a program from assembly source code. Returns its length in words.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let program = assemble(source).map_err(js_error)?;
        self.image = Image::from(&program);
        self.reset();
        self.machine
            .load(self.image.origin, &self.image.words)
            .map_err(js_error)?;
        Ok(self.image.len())
    }

    /// Run one micro-step. Returns the emitted byte, or -1.
    #[wasm_bindgen]
    pub fn tick(&mut self) -> Result<i32, JsError> {
        match self.machine.tick().map_err(js_error)? {
            Tick::Stepped { output: Some(byte), .. } => Ok(byte as i32),
            Tick::Stepped { output: None, .. } | Tick::Halted => Ok(-1),
        }
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        if !self.machine.is_running() {
            return Err(JsError::new("machine is halted"));
        }
        self.machine.step_instruction().map_err(js_error)?;
        Ok(self
            .machine
            .cpu()
            .last_instruction()
            .map(|i| i.to_string())
            .unwrap_or_default())
    }

    /// Run until halt or `max_ticks`. Returns true if halted.
    #[wasm_bindgen]
    pub fn run(&mut self, max_ticks: u32) -> Result<bool, JsError> {
        let reason = self.machine.run(max_ticks as u64).map_err(js_error)?;
        Ok(reason == StopReason::Halted)
    }

    /// Reset to the initial state with the loaded program.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.machine.reset();
        self.output.clear();
        if !self.image.is_empty() {
            let _ = self.machine.load(self.image.origin, &self.image.words);
        }
    }

    /// Write a byte to the input cell.
    #[wasm_bindgen]
    pub fn feed_input(&mut self, byte: u8) {
        self.machine.feed_input(byte);
    }

    /// Check if the machine is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.machine.is_running()
    }

    /// Get tick count.
    #[wasm_bindgen]
    pub fn ticks(&self) -> u64 {
        self.machine.ticks()
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.machine.cpu().registers().pc()
    }

    /// Get a general-purpose register (0-3).
    #[wasm_bindgen]
    pub fn register(&self, index: u8) -> Option<u16> {
        Reg::from_code(index).map(|r| self.machine.cpu().registers().value(r))
    }

    /// Get the instruction register.
    #[wasm_bindgen]
    pub fn ir(&self) -> u16 {
        self.machine.cpu().registers().value(RegisterId::Ir)
    }

    /// Get the next micro-step as a string.
    #[wasm_bindgen]
    pub fn micro_step(&self) -> String {
        format!("{:?}", self.machine.cpu().state())
    }

    /// Get a signal line value by name.
    #[wasm_bindgen]
    pub fn line(&self, name: &str) -> Option<u16> {
        self.machine
            .simulation()
            .lines()
            .find(|(_, wire)| wire.name() == name)
            .map(|(_, wire)| wire.value())
    }

    /// Get memory cell value.
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: u16) -> u16 {
        self.machine.memory().read(addr)
    }

    /// Get everything output so far.
    #[wasm_bindgen]
    pub fn output(&self) -> String {
        self.output.text()
    }

    /// Get the full machine state as JSON.
    #[wasm_bindgen]
    pub fn state_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.machine.state()).map_err(js_error)
    }
}

impl Default for WasmMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return word count.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<usize, JsError> {
    let program = assemble(source).map_err(js_error)?;
    Ok(program.len())
}

/// Disassemble a single word.
#[wasm_bindgen]
pub fn wasm_disassemble(word: u16) -> String {
    disassemble_word(word)
}
