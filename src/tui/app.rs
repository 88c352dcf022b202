//! Debugger application state and logic.

use crate::asm::disasm::disassemble_word;
use crate::asm::Image;
use crate::config::MachineConfig;
use crate::cpu::MicroStep;
use crate::machine::{Machine, OutputBuffer, Tick};
use std::collections::HashSet;

/// Instructions run per frame while running continuously.
const RUN_BATCH: usize = 200;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub machine: Machine,
    /// Everything the program has printed.
    pub output: OutputBuffer,
    /// Original program for reset.
    pub image: Image,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u16>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// First address shown in the memory view.
    pub mem_scroll: u16,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(image: Image, config: MachineConfig) -> Self {
        let output = OutputBuffer::new();
        let mut machine = Machine::with_config(config, output.sink());
        let status = match machine.load(image.origin, &image.words) {
            Ok(()) => "Ready. 't' tick, 's' step, 'r' run, 'q' quit.".to_string(),
            Err(e) => format!("Load failed: {}", e),
        };

        Self {
            machine,
            output,
            mem_scroll: image.origin,
            image,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status,
        }
    }

    fn pc(&self) -> u16 {
        self.machine.cpu().registers().pc()
    }

    /// Run a single micro-step.
    pub fn tick_once(&mut self) {
        match self.machine.tick() {
            Ok(Tick::Stepped { step, output }) => {
                self.status = match output {
                    Some(byte) => format!("{:?} -> output {:?}", step, char::from(byte)),
                    None => format!("{:?} -> {:?}", step, self.machine.cpu().state()),
                };
            }
            Ok(Tick::Halted) => self.halted(),
            Err(e) => self.fail(e),
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.machine.is_running() {
            self.halted();
            return;
        }

        let pc = self.pc();
        match self.machine.step_instruction() {
            Ok(_) => {
                let last = self
                    .machine
                    .cpu()
                    .last_instruction()
                    .map(|i| i.to_string())
                    .unwrap_or_default();
                self.status = format!("PC={:04X}: {}", pc, last);
            }
            Err(e) => self.fail(e),
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        for i in 0..RUN_BATCH {
            if !self.machine.is_running() {
                self.halted();
                return;
            }

            // Check for breakpoint; the first instruction of a batch may
            // sit on one we are resuming from.
            let pc = self.pc();
            let at_fetch = self.machine.cpu().state() == MicroStep::Fetch;
            if i > 0 && at_fetch && self.breakpoints.contains(&pc) {
                self.running = false;
                self.status = format!("Breakpoint at PC={:04X}", pc);
                return;
            }

            if let Err(e) = self.machine.step_instruction() {
                self.fail(e);
                return;
            }
        }
    }

    fn halted(&mut self) {
        self.running = false;
        self.status = format!(
            "Halted after {} ticks, {} instructions",
            self.machine.ticks(),
            self.machine.cpu().retired()
        );
    }

    fn fail(&mut self, e: impl std::fmt::Display) {
        self.running = false;
        self.status = format!("Error: {}", e);
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.pc();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:04X}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:04X}", pc);
        }
    }

    /// Reset the machine and reload the program.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.output.clear();
        self.running = false;
        self.status = match self.machine.load(self.image.origin, &self.image.words) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Load failed: {}", e),
        };
    }

    pub fn scroll_memory(&mut self, delta: i32) {
        self.mem_scroll = (self.mem_scroll as i32 + delta).clamp(0, 0xFFFF) as u16;
    }

    /// Get disassembly around current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let pc = self.pc();
        let start = pc.saturating_sub((lines / 2) as u16);

        (0..lines)
            .map_while(|i| start.checked_add(i as u16))
            .map(|addr| {
                let word = self.machine.memory().read(addr);
                (addr, disassemble_word(word), addr == pc)
            })
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(image: Image, config: MachineConfig) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(image, config);

    // Main loop
    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('t') => {
                            app.running = false;
                            app.tick_once();
                        }
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Char('g') => app.mem_scroll = app.pc(),
                        KeyCode::Char('i') => {
                            app.machine.feed_input(b'\n');
                            app.status = "Fed newline to input cell.".into();
                        }
                        KeyCode::Up => app.scroll_memory(-1),
                        KeyCode::Down => app.scroll_memory(1),
                        KeyCode::PageUp => app.scroll_memory(-16),
                        KeyCode::PageDown => app.scroll_memory(16),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
