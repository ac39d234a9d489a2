//! Stepper application state and logic.

use std::collections::HashSet;

use crate::cpu::{Machine, NoExternals, Reg};
use crate::mem::{BlockMemory, MemEvent, Recorder};
use crate::program::{FunDef, Program, ProgramError};
use crate::value::{Block, Value};

/// Stepper application state.
pub struct DebuggerApp {
    /// The machine being stepped.
    pub machine: Machine<Recorder<BlockMemory>, NoExternals>,
    /// Original program, kept for reset.
    program: Program,
    /// Breakpoints by code address (block, offset).
    pub breakpoints: HashSet<(Block, u32)>,
    /// Is the stepper running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory events recorded by the steps taken so far.
    pub trace: Vec<MemEvent>,
    /// Trace view scroll offset.
    pub trace_scroll: usize,
}

impl DebuggerApp {
    /// Load a program into a fresh machine.
    pub fn new(program: Program) -> Result<Self, ProgramError> {
        let mut machine = Machine::new(&program, Recorder::new(BlockMemory::new()), NoExternals)?;
        // Image loading is not part of the stepped trace.
        machine.state.mem.take_events();

        Ok(Self {
            machine,
            program,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            trace: Vec::new(),
            trace_scroll: 0,
        })
    }

    /// The program counter as a code address, if it is one.
    pub fn pc(&self) -> Option<(Block, u32)> {
        self.machine.state.regs.get(Reg::PC).as_ptr()
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if let Some(code) = self.machine.exit_code() {
            self.status = format!("Final state, exit code {}", code);
            self.running = false;
            return;
        }

        let at = self.machine.state.regs.get(Reg::PC);
        match self.machine.step() {
            Ok(event) => {
                self.trace.extend(self.machine.state.mem.take_events());
                self.status = match event {
                    Some(ev) => format!("{}: external call {}", at, ev.name),
                    None => format!("{}: {}", at, self.current_disasm(&at)),
                };
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    fn current_disasm(&self, at: &Value) -> String {
        let Some((b, ofs)) = at.as_ptr() else {
            return "?".into();
        };
        match self.machine.global_env().find_funct(b) {
            Some((_, FunDef::Internal(f))) => f
                .instr_at(ofs)
                .map(|i| i.to_string())
                .unwrap_or_else(|| "?".into()),
            _ => "?".into(),
        }
    }

    /// Run until a final state, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if let Some(code) = self.machine.exit_code() {
            self.running = false;
            self.status = format!(
                "Final state after {} steps, exit code {}",
                self.machine.steps, code
            );
            return;
        }

        if let Some(addr) = self.pc() {
            if self.breakpoints.contains(&addr) {
                self.running = false;
                self.status = format!("Breakpoint at {}", self.machine.state.regs.get(Reg::PC));
                return;
            }
        }

        self.step();
    }

    /// Toggle breakpoint at the current program counter.
    pub fn toggle_breakpoint(&mut self) {
        let Some(addr) = self.pc() else {
            self.status = "Program counter is not a code address".into();
            return;
        };
        if self.breakpoints.contains(&addr) {
            self.breakpoints.remove(&addr);
            self.status = format!("Removed breakpoint at {}", Value::Ptr(addr.0, addr.1));
        } else {
            self.breakpoints.insert(addr);
            self.status = format!("Set breakpoint at {}", Value::Ptr(addr.0, addr.1));
        }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        if let Ok(fresh) = Self::new(self.program.clone()) {
            let breakpoints = std::mem::take(&mut self.breakpoints);
            *self = fresh;
            self.breakpoints = breakpoints;
            self.status = "Reset. Ready.".into();
        }
    }

    /// Disassembly of the current function around the program counter.
    /// Returns (offset, text, is_current) triples.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u32, String, bool)> {
        let Some((b, pc_ofs)) = self.pc() else {
            return Vec::new();
        };
        let Some((_, FunDef::Internal(f))) = self.machine.global_env().find_funct(b) else {
            return vec![(0, format!("<external {}>", Value::Ptr(b, pc_ofs)), true)];
        };

        let start = (pc_ofs as usize).saturating_sub(lines / 2);
        f.code
            .iter()
            .enumerate()
            .skip(start)
            .take(lines)
            .map(|(ofs, instr)| (ofs as u32, instr.to_string(), ofs as u32 == pc_ofs))
            .collect()
    }
}

/// Run the stepper on a program.
pub fn run_debugger(program: Program) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    let mut app = DebuggerApp::new(program)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
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
                        KeyCode::Up => {
                            if app.trace_scroll > 0 {
                                app.trace_scroll -= 1;
                            }
                        }
                        KeyCode::Down => {
                            if app.trace_scroll + 1 < app.trace.len() {
                                app.trace_scroll += 1;
                            }
                        }
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
