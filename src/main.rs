//! micro16 - CLI Entry Point
//!
//! Commands:
//! - `micro16 run <program>` - Run an ASM or HEX file
//! - `micro16 debug <program>` - Interactive debugger
//! - `micro16 asm <source>` - Assemble to HEX
//! - `micro16 disasm <image>` - Disassemble HEX
//! - `micro16` - Run the built-in "Hello World" demo

use clap::{Parser, Subcommand};
use micro16::asm::{self, Image};
use micro16::machine::{Machine, StopReason, Tick};
use micro16::MachineConfig;
use std::io::Write;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "micro16")]
#[command(version = "0.1.0")]
#[command(about = "A cycle-accurate simulator of a microcoded 16-bit machine")]
struct Cli {
    /// Log every line write and reaction (same as RUST_LOG=micro16=trace)
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the ASM or HEX file to execute
        program: String,
        /// JSON machine configuration
        #[arg(short, long)]
        config: Option<String>,
        /// Maximum number of ticks to run (overrides the configuration)
        #[arg(short, long)]
        max_ticks: Option<u64>,
        /// Text fed to the input cell, one byte each time it is cleared
        #[arg(short, long)]
        input: Option<String>,
        /// Print the final machine state
        #[arg(short, long)]
        dump: bool,
        /// Print the final machine state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive debugger
    Debug {
        /// Path to the ASM or HEX file to debug
        program: String,
        /// JSON machine configuration
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Assemble source to HEX
    Asm {
        /// Path to the source file
        source: String,
        /// Output HEX file
        #[arg(short, long)]
        output: Option<String>,
        /// JSON machine configuration (origin and output cell)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Disassemble HEX to readable text
    Disasm {
        /// Path to the HEX file
        image: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.trace);

    match cli.command {
        Some(Commands::Run { program, config, max_ticks, input, dump, json }) => {
            let config = load_config(config.as_deref());
            run_program(&program, config, max_ticks, input, dump, json);
        }
        Some(Commands::Debug { program, config }) => {
            let config = load_config(config.as_deref());
            debug_program(&program, config);
        }
        Some(Commands::Asm { source, output, config }) => {
            let config = load_config(config.as_deref());
            assemble_file(&source, output, &config);
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        None => {
            println!("micro16 v0.1.0");
            println!("A cycle-accurate microcoded 16-bit machine");
            println!();
            println!("Use --help for available commands");
            println!();
            demo_hello_world();
        }
    }
}

/// Logs go to stderr so program output on stdout stays clean.
fn init_tracing(trace: bool) {
    let filter = if trace {
        EnvFilter::new("micro16=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&str>) -> MachineConfig {
    match path {
        None => MachineConfig::default(),
        Some(path) => match MachineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ Failed to load config {}: {}", path, e);
                process::exit(1);
            }
        },
    }
}

/// Assemble `.asm` sources, read anything else as a HEX image.
fn load_program(path: &str, config: &MachineConfig) -> Image {
    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to read file: {}", e);
                process::exit(1);
            }
        };

        match asm::assemble_for(&source, config) {
            Ok(program) => Image::from(&program),
            Err(e) => {
                eprintln!("❌ Assembly error: {}", e);
                process::exit(1);
            }
        }
    } else {
        match asm::load_image_at(path, config.load_offset) {
            Ok(image) => image,
            Err(e) => {
                eprintln!("❌ Failed to load image: {}", e);
                process::exit(1);
            }
        }
    }
}

fn run_program(
    path: &str,
    config: MachineConfig,
    max_ticks: Option<u64>,
    input: Option<String>,
    dump: bool,
    json: bool,
) {
    let image = load_program(path, &config);
    if image.is_empty() {
        eprintln!("❌ No words to execute");
        process::exit(1);
    }

    let limit = max_ticks.unwrap_or(config.max_ticks);
    let mut machine = Machine::with_config(config, |byte| {
        let mut out = std::io::stdout();
        let _ = out.write_all(&[byte]);
        let _ = out.flush();
    });

    if let Err(e) = machine.load(image.origin, &image.words) {
        eprintln!("❌ Failed to load program: {}", e);
        process::exit(1);
    }

    let mut input = input.unwrap_or_default().into_bytes().into_iter();
    let mut reason = StopReason::TickLimit;
    for _ in 0..limit {
        if !machine.input_pending() {
            if let Some(byte) = input.next() {
                machine.feed_input(byte);
            }
        }

        match machine.tick() {
            Ok(Tick::Halted) => {
                reason = StopReason::Halted;
                break;
            }
            Ok(Tick::Stepped { .. }) => {}
            Err(e) => {
                println!();
                eprintln!("❌ Machine error at PC={:#06x}: {}", machine.cpu().registers().pc(), e);
                eprint!("{}", machine.state());
                process::exit(1);
            }
        }
    }
    if !machine.is_running() {
        reason = StopReason::Halted;
    }

    if dump || json {
        println!();
    }
    if dump {
        print!("{}", machine.state());
    }
    if json {
        match serde_json::to_string_pretty(&machine.state()) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("❌ Failed to serialize state: {}", e),
        }
    }

    if reason == StopReason::TickLimit {
        eprintln!();
        eprintln!("⚠️  Reached tick limit ({}). Use --max-ticks to increase.", limit);
        process::exit(2);
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, config: MachineConfig) {
    let image = load_program(path, &config);
    if image.is_empty() {
        eprintln!("❌ No words to execute");
        process::exit(1);
    }

    if let Err(e) = micro16::run_debugger(image, config) {
        eprintln!("❌ Debugger error: {}", e);
        process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _config: MachineConfig) {
    eprintln!("❌ Built without the `tui` feature");
    process::exit(1);
}

fn assemble_file(source_path: &str, output: Option<String>, config: &MachineConfig) {
    let out_path = output.unwrap_or_else(|| {
        Path::new(source_path).with_extension("hex").to_string_lossy().into_owned()
    });

    println!("📝 Assembling: {} → {}", source_path, out_path);

    let image = load_program(source_path, config);
    println!("✓ Assembled {} words at {:#06x}", image.len(), image.origin);

    if let Err(e) = asm::save_image(&out_path, &image) {
        eprintln!("❌ Failed to save image: {}", e);
        process::exit(1);
    }

    println!("✓ Saved to {}", out_path);
}

fn disassemble_file(image_path: &str) {
    let image = match asm::load_image(image_path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            process::exit(1);
        }
    };

    print!("{}", asm::disassemble(image.origin, &image.words));
}

fn demo_hello_world() {
    println!("━━━ Hello World ━━━");
    println!();

    let config = MachineConfig::default();
    let program = asm::print_program(config.load_offset, config.output_addr, "Hello World");
    print!("{}", asm::disassemble(program.origin(), program.words()));
    println!();

    let mut machine = Machine::new(|byte| print!("{}", char::from(byte)));
    let result = machine
        .load(program.origin(), program.words())
        .and_then(|()| machine.run(config.max_ticks));
    println!();
    println!();

    match result {
        Ok(_) => print!("{}", machine.state()),
        Err(e) => {
            eprintln!("❌ {}", e);
            process::exit(1);
        }
    }
}
