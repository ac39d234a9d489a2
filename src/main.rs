//! ia32 Interpreter - CLI Entry Point
//!
//! Commands:
//! - `ia32-interp run <image>` - Run a program image to its exit code
//! - `ia32-interp debug <image>` - Interactive stepper
//! - `ia32-interp disasm <image>` - Disassemble an image
//! - `ia32-interp trace <image>` - Dump the recorded memory-event trace

use clap::{Parser, Subcommand};

use ia32::cpu::{Machine, NoExternals, Reg};
use ia32::image::{disassemble_program, load_image};
use ia32::mem::{BlockMemory, MemEvent, Recorder};
use ia32::program::{FunDef, Program};

#[derive(Parser)]
#[command(name = "ia32-interp")]
#[command(version = "0.1.0")]
#[command(about = "A deterministic interpreter for a 32-bit x86-style instruction set")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program image until it reaches a final state
    Run {
        /// Path to the JSON program image
        image: String,
        /// Maximum number of steps to run (default: 10000)
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Print each executed instruction and its memory events
        #[arg(short, long)]
        trace: bool,
    },
    /// Interactive stepper
    Debug {
        /// Path to the JSON program image
        image: String,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Path to the JSON program image
        image: String,
    },
    /// Run an image and dump its memory-event trace as JSON
    Trace {
        /// Path to the JSON program image
        image: String,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Maximum number of steps to run (default: 10000)
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { image, max_steps, trace }) => {
            run_image(&image, max_steps, trace);
        }
        Some(Commands::Debug { image }) => {
            debug_image(&image);
        }
        Some(Commands::Disasm { image }) => {
            disassemble_image(&image);
        }
        Some(Commands::Trace { image, output, max_steps }) => {
            trace_image(&image, output, max_steps);
        }
        None => {
            println!("ia32 Interpreter v0.1.0");
            println!("A deterministic 32-bit instruction-set interpreter");
            println!();
            println!("Use --help for available commands");
            println!();
            demo_interpreter();
        }
    }
}

fn load_or_exit(path: &str) -> Program {
    match load_image(path) {
        Ok(prog) => {
            let internal = prog
                .functions
                .iter()
                .filter(|(_, d)| matches!(d, FunDef::Internal(_)))
                .count();
            println!(
                "📂 Loaded {} functions ({} internal), {} globals, entry `{}`",
                prog.functions.len(),
                internal,
                prog.globals.len(),
                prog.entry
            );
            prog
        }
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_image(path: &str, max_steps: u64, trace: bool) {
    println!("🔧 Running: {}", path);
    let prog = load_or_exit(path);

    let mut machine = match Machine::new(&prog, Recorder::new(BlockMemory::new()), NoExternals) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            std::process::exit(1);
        }
    };
    machine.state.mem.take_events();

    println!();
    println!("━━━ Execution ━━━");

    let mut events = 0usize;
    let result = loop {
        if let Some(code) = machine.exit_code() {
            break Ok(code);
        }
        if machine.steps >= max_steps {
            break Err(format!("step limit of {} reached", max_steps));
        }
        let at = machine.state.regs.get(Reg::PC);
        let text = at
            .as_ptr()
            .and_then(|(b, ofs)| match machine.global_env().find_funct(b) {
                Some((_, FunDef::Internal(f))) => f.instr_at(ofs).map(|i| i.to_string()),
                _ => None,
            })
            .unwrap_or_default();
        match machine.step() {
            Ok(obs) => {
                let step_events = machine.state.mem.take_events();
                if trace {
                    match obs {
                        Some(ev) => println!("{}: external call {} -> {}", at, ev.name, ev.result),
                        None => println!("{}: {}", at, text),
                    }
                    for ev in &step_events {
                        println!("        {}", ev);
                    }
                }
                events += step_events.len();
            }
            Err(e) => break Err(e.to_string()),
        }
    };

    println!();
    println!("━━━ Result ━━━");
    println!("Steps: {}", machine.steps);
    println!("Memory events: {}", events);
    match result {
        Ok(code) => println!("Exit code: {}", code),
        Err(msg) => {
            eprintln!("❌ {}", msg);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "tui")]
fn debug_image(path: &str) {
    println!("🔍 Loading: {}", path);
    let prog = load_or_exit(path);

    println!("🚀 Launching stepper...");
    println!();

    if let Err(e) = ia32::tui::run_debugger(prog) {
        eprintln!("❌ Stepper error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_image(_path: &str) {
    eprintln!("❌ Built without the `tui` feature");
    std::process::exit(1);
}

fn disassemble_image(path: &str) {
    println!("📖 Disassembling: {}", path);
    println!();

    let prog = load_or_exit(path);
    println!();
    print!("{}", disassemble_program(&prog));
}

fn trace_image(path: &str, output: Option<String>, max_steps: u64) {
    let prog = load_or_exit(path);

    let mut machine = match Machine::new(&prog, Recorder::new(BlockMemory::new()), NoExternals) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            std::process::exit(1);
        }
    };
    machine.state.mem.take_events();

    if let Err(e) = machine.run(max_steps) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let trace: Vec<MemEvent> = machine.state.mem.take_events();
    let json = match serde_json::to_string_pretty(&trace) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("❌ Failed to serialize trace: {}", e);
            std::process::exit(1);
        }
    };

    match output {
        Some(out) => {
            if let Err(e) = std::fs::write(&out, json) {
                eprintln!("❌ Failed to write {}: {}", out, e);
                std::process::exit(1);
            }
            println!("✓ Wrote {} events to {}", trace.len(), out);
        }
        None => println!("{}", json),
    }
}

fn demo_interpreter() {
    use ia32::cpu::instr::Instr;
    use ia32::cpu::registers::IReg;
    use ia32::program::{FunDef, Function, Signature};

    println!("━━━ Interpreter Demo ━━━");
    println!();

    // A tiny program: compute 6 * 7 and return it.
    let prog = Program {
        functions: vec![(
            "main".to_string(),
            FunDef::Internal(Function::new(
                Signature::main(),
                vec![
                    Instr::MovRi(IReg::EAX, 6),
                    Instr::ImulRi(IReg::EAX, 7),
                    Instr::Ret,
                ],
            )),
        )],
        globals: vec![],
        entry: "main".to_string(),
    };

    println!("Program `main`:");
    print!("{}", disassemble_program(&prog));

    let mut machine = Machine::new(&prog, BlockMemory::new(), NoExternals)
        .expect("demo program is well formed");
    match machine.run(100) {
        Ok(code) => {
            println!("Exit code: {} after {} steps", code, machine.steps);
            println!();
            println!("✓ Core interpreter working!");
        }
        Err(e) => println!("Demo failed: {}", e),
    }
}
