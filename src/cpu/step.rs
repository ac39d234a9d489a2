//! The step relation, external-call dispatch, and the program driver.
//!
//! A state is just (registers, memory); there is no halted tag. The
//! step relation tries three transition kinds off the program counter:
//! an internal instruction, a builtin dispatched to the external-call
//! collaborator, or a call into an external function. No other program
//! counter value yields a transition; that is both how failure
//! manifests and how the driver recognizes final states.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpu::execute::{exec_instr, Outcome};
use crate::cpu::instr::{BuiltinArg, BuiltinRes, Instr};
use crate::cpu::registers::{IReg, Reg, RegFile};
use crate::mem::{Chunk, Memory};
use crate::program::{load_program, FunDef, GlobalEnv, Program, ProgramError, Signature, Typ};
use crate::value::{arith, Value};

/// One execution state.
#[derive(Debug, Clone, PartialEq)]
pub struct State<M> {
    pub regs: RegFile,
    pub mem: M,
}

/// An observable event produced by one external call: the effect name,
/// the argument values consumed, and the result produced. Recorded
/// verbatim, exactly one per builtin or external step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsEvent {
    pub name: String,
    pub args: Vec<Value>,
    pub result: Value,
}

/// The external-call collaborator: everything the interpreter itself
/// does not model. Given fixed inputs it may be nondeterministic, but
/// equal events must mean equal results.
pub trait ExternalCall<M: Memory> {
    /// Perform the effect named `name`. `None` means the call cannot
    /// proceed and no transition exists.
    fn call(
        &mut self,
        name: &str,
        sig: &Signature,
        args: &[Value],
        mem: &M,
    ) -> Option<(ObsEvent, Value, M)>;
}

/// A collaborator that refuses every call; suits programs that never
/// leave the modeled instruction set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternals;

impl<M: Memory> ExternalCall<M> for NoExternals {
    fn call(&mut self, _: &str, _: &Signature, _: &[Value], _: &M) -> Option<(ObsEvent, Value, M)> {
        None
    }
}

/// Evaluate one builtin argument expression against registers, the
/// stack pointer, and memory.
fn eval_builtin_arg<M: Memory>(
    ge: &GlobalEnv,
    rs: &RegFile,
    m: &M,
    arg: &BuiltinArg,
) -> Option<Value> {
    match arg {
        BuiltinArg::Reg(r) => Some(rs.get(*r)),
        BuiltinArg::Int(n) => Some(Value::Int(*n)),
        BuiltinArg::Float(x) => Some(Value::Float(*x)),
        BuiltinArg::Single(x) => Some(Value::Single(*x)),
        BuiltinArg::AddrStack(ofs) => Some(arith::add(rs.get(IReg::ESP), Value::Int(*ofs))),
        BuiltinArg::LoadStack { chunk, ofs } => {
            m.load(*chunk, &arith::add(rs.get(IReg::ESP), Value::Int(*ofs)))
        }
        BuiltinArg::AddrGlobal { id, ofs } => Some(ge.symbol_address(id, *ofs)),
        BuiltinArg::LoadGlobal { chunk, id, ofs } => m.load(*chunk, &ge.symbol_address(id, *ofs)),
    }
}

/// Argument slots are stack-relative from ESP in 4-byte units; a
/// double-precision argument occupies two consecutive slots read as one
/// 8-byte load.
fn extcall_arguments<M: Memory>(rs: &RegFile, m: &M, sig: &Signature) -> Option<Vec<Value>> {
    let sp = rs.get(IReg::ESP);
    let mut args = Vec::with_capacity(sig.args.len());
    let mut slot: i32 = 0;
    for ty in &sig.args {
        let addr = arith::add(sp, Value::Int(4 * slot));
        let (chunk, slots) = match ty {
            Typ::Int => (Chunk::I32, 1),
            Typ::Single => (Chunk::F32, 1),
            Typ::Float => (Chunk::F64, 2),
        };
        args.push(m.load(chunk, &addr)?);
        slot += slots;
    }
    Some(args)
}

/// Where a call's result lands: EAX for integers, the x87 top-of-stack
/// for either float width.
fn result_reg(sig: &Signature) -> Reg {
    match sig.ret {
        Some(Typ::Float) | Some(Typ::Single) => Reg::ST0,
        Some(Typ::Int) | None => Reg::I(IReg::EAX),
    }
}

fn set_builtin_res(rs: &mut RegFile, res: BuiltinRes, v: Value) {
    if let BuiltinRes::Reg(r) = res {
        rs.set(r, v);
    }
}

/// The single-step transition. `None` when no transition exists: a
/// stuck or final configuration, distinguished only by
/// [`final_exit_code`].
pub fn step<M: Memory, X: ExternalCall<M>>(
    ge: &GlobalEnv,
    ext: &mut X,
    st: &State<M>,
) -> Option<(State<M>, Option<ObsEvent>)> {
    let Value::Ptr(b, ofs) = st.regs.get(Reg::PC) else {
        return None;
    };
    let (name, def) = ge.find_funct(b)?;
    match def {
        FunDef::Internal(f) => match f.instr_at(ofs)? {
            Instr::Builtin { name, sig, args, res, clobbers } => {
                let mut vargs = Vec::with_capacity(args.len());
                for a in args {
                    vargs.push(eval_builtin_arg(ge, &st.regs, &st.mem, a)?);
                }
                let (event, vres, mem2) = ext.call(name, sig, &vargs, &st.mem)?;
                let mut rs2 = st.regs.clone().undef_regs(clobbers);
                set_builtin_res(&mut rs2, *res, vres);
                let pc = arith::add(rs2.get(Reg::PC), Value::Int(1));
                let rs2 = rs2.undef_flags().with(Reg::PC, pc);
                Some((State { regs: rs2, mem: mem2 }, Some(event)))
            }
            instr => match exec_instr(ge, f, instr, &st.regs, &st.mem) {
                Outcome::Next(regs, mem) => Some((State { regs, mem }, None)),
                Outcome::Stuck => None,
            },
        },
        FunDef::External { sig } => {
            // Only the function entry is callable.
            if ofs != 0 {
                return None;
            }
            let args = extcall_arguments(&st.regs, &st.mem, sig)?;
            let (event, vres, mem2) = ext.call(name, sig, &args, &st.mem)?;
            let rs2 = st
                .regs
                .clone()
                .with(result_reg(sig), vres)
                .with(Reg::PC, st.regs.get(Reg::RA));
            Some((State { regs: rs2, mem: mem2 }, Some(event)))
        }
    }
}

/// The initial state for a loaded program: every register unknown
/// except the program counter at the entry symbol and the zero
/// sentinels in RA and ESP that the final-state predicate keys on.
pub fn initial_state<M: Memory>(ge: &GlobalEnv, mem: M) -> State<M> {
    let regs = RegFile::new()
        .with(Reg::PC, ge.symbol_address(ge.entry(), 0))
        .with(Reg::RA, Value::ZERO)
        .with(IReg::ESP, Value::ZERO);
    State { regs, mem }
}

/// A state is final when the program counter has returned to the zero
/// sentinel and EAX holds a concrete integer, the exit code. Anything
/// else that merely looks halted is not final.
pub fn final_exit_code<M>(st: &State<M>) -> Option<i32> {
    if st.regs.get(Reg::PC) != Value::ZERO {
        return None;
    }
    st.regs.get(IReg::EAX).as_int()
}

/// Why a run stopped without reaching a final state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MachineError {
    #[error("no transition from pc = {pc} after {steps} steps")]
    Stuck { pc: String, steps: u64 },

    #[error("step limit of {0} reached")]
    StepLimit(u64),
}

/// A loaded program plus its current state: the whole-program driver.
///
/// Owns the global environment, the collaborator, and the log of
/// observable events, and advances the step relation until a final
/// state, a stuck configuration, or a step limit.
pub struct Machine<M: Memory, X: ExternalCall<M>> {
    ge: GlobalEnv,
    ext: X,
    pub state: State<M>,
    pub steps: u64,
    pub events: Vec<ObsEvent>,
}

impl<M: Memory, X: ExternalCall<M>> Machine<M, X> {
    /// Load a program image and set up its initial state.
    pub fn new(prog: &Program, mem: M, ext: X) -> Result<Self, ProgramError> {
        let (ge, mem) = load_program(prog, mem)?;
        let state = initial_state(&ge, mem);
        Ok(Machine { ge, ext, state, steps: 0, events: Vec::new() })
    }

    pub fn global_env(&self) -> &GlobalEnv {
        &self.ge
    }

    /// The exit code, once the state is final.
    pub fn exit_code(&self) -> Option<i32> {
        final_exit_code(&self.state)
    }

    /// Advance one step.
    pub fn step(&mut self) -> Result<Option<ObsEvent>, MachineError> {
        match step(&self.ge, &mut self.ext, &self.state) {
            Some((state, event)) => {
                self.state = state;
                self.steps += 1;
                if let Some(ev) = &event {
                    self.events.push(ev.clone());
                }
                Ok(event)
            }
            None => Err(MachineError::Stuck {
                pc: self.state.regs.get(Reg::PC).to_string(),
                steps: self.steps,
            }),
        }
    }

    /// Run until a final state, for at most `max_steps` steps.
    pub fn run(&mut self, max_steps: u64) -> Result<i32, MachineError> {
        loop {
            if let Some(code) = self.exit_code() {
                return Ok(code);
            }
            if self.steps >= max_steps {
                return Err(MachineError::StepLimit(max_steps));
            }
            self.step()?;
        }
    }
}
