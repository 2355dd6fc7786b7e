//! Bytecode virtual machine for executing GameMaker code entries.
//!
//! The VM borrows the [`World`] for the duration of a run and executes code
//! entries against a caller-supplied [`Frame`]. Script calls re-enter the
//! dispatch loop recursively on the same frame, so a call only returns once
//! the callee has fully finished.

mod binary;
mod call;
mod compare;
mod convert;
mod stack;

use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::{instruction::Instruction, op::Opcode};
use crate::{
    exception::{ErrorKind, RunResult, VmError},
    frame::{Backtrace, Frame},
    io::PrintWriter,
    namespace::ScopeEntry,
    normalize::{ensure_native, is_truthy},
    value::Value,
    world::World,
};

/// What the dispatch loop does after an instruction.
enum Flow {
    Next,
    /// Start consuming a skip budget of this many words.
    Jump(i32),
    Return(Value),
    Exit,
}

/// A resolved code entry: the instruction array to walk and where to start.
struct CodeUnit {
    name: Rc<str>,
    instructions: Rc<[Instruction]>,
    start: usize,
}

/// Applies the odd-offset correction to a backward branch.
///
/// `modulus` is 2 for plain branches and 4 for `pushenv`.
fn branch_budget(offset: i32, modulus: i32) -> i32 {
    if offset < 0 {
        offset - offset % modulus
    } else {
        offset
    }
}

/// The bytecode virtual machine.
///
/// Holds no execution state of its own: operand stacks, scope stacks and
/// locals live in the [`Frame`] passed to [`Vm::run`], and the process-wide
/// tables live in the [`World`].
pub struct Vm<'a> {
    pub(crate) world: &'a mut World,
    pub(crate) print_writer: &'a mut dyn PrintWriter,
}

impl<'a> Vm<'a> {
    /// Creates a VM over `world`, sending script output to `print_writer`.
    pub fn new(world: &'a mut World, print_writer: &'a mut dyn PrintWriter) -> Self {
        Self { world, print_writer }
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut *self.world
    }

    pub fn print_writer(&mut self) -> &mut dyn PrintWriter {
        &mut *self.print_writer
    }

    /// Runs the code entry `name` and returns the value it returned.
    ///
    /// Without a frame the entry runs on a fresh one. An entry that ends
    /// without `ret` returns `undefined`.
    pub fn run(&mut self, name: &str, frame: Option<&mut Frame>) -> RunResult<Value> {
        let mut own;
        let frame = match frame {
            Some(frame) => frame,
            None => {
                own = Frame::new();
                &mut own
            }
        };
        let unit = self.load_unit(frame, name)?;
        self.run_unit(frame, &unit)
    }

    /// Runs `name` with `receiver` as `self` for the duration of the call.
    pub fn run_with_receiver(&mut self, name: &str, receiver: ScopeEntry, frame: Option<&mut Frame>) -> RunResult<Value> {
        let mut own;
        let frame = match frame {
            Some(frame) => frame,
            None => {
                own = Frame::new();
                &mut own
            }
        };
        frame.push_scope(receiver);
        let result = self.run(name, Some(&mut *frame));
        frame.pop_scope();
        result
    }

    /// Runs each global init script on its own child frame of `root`, with
    /// static initialization permitted.
    pub fn run_global_init<S: AsRef<str>>(&mut self, root: &mut Frame, scripts: &[S]) -> RunResult<()> {
        for script in scripts {
            let name = script.as_ref();
            debug!(name, "running global init script");
            let mut frame = root.child();
            frame.is_static_ok = true;
            let result = self.run(name, Some(&mut frame));
            root.adopt(&frame);
            result?;
        }
        Ok(())
    }

    /// Looks up a code entry, following its parent link to the shared
    /// instruction array.
    fn load_unit(&self, frame: &Frame, name: &str) -> RunResult<CodeUnit> {
        let entry = self.world.code(name).ok_or_else(|| {
            VmError::runtime(
                frame,
                ErrorKind::UndefinedFunction,
                format!("code entry {name} does not exist"),
            )
        })?;
        let Some(parent_name) = &entry.parent else {
            return Ok(CodeUnit {
                name: entry.name.clone(),
                instructions: entry.instructions.clone(),
                start: 0,
            });
        };
        let parent = self.world.code(parent_name).ok_or_else(|| {
            VmError::runner(
                frame,
                ErrorKind::UndefinedFunction,
                format!("parent code entry {parent_name} of {name} does not exist"),
            )
        })?;
        let instructions = parent.instructions.clone();
        let mut words = i64::from(entry.offset / 4);
        let mut start = 0;
        while words > 0 {
            let inst = instructions.get(start).ok_or_else(|| {
                VmError::runner(
                    frame,
                    ErrorKind::UnbalancedAddress,
                    format!("offset {} of {name} is past the end of {parent_name}", entry.offset),
                )
            })?;
            words -= i64::from(inst.size());
            start += 1;
        }
        Ok(CodeUnit {
            name: entry.name.clone(),
            instructions,
            start,
        })
    }

    fn run_unit(&mut self, frame: &mut Frame, unit: &CodeUnit) -> RunResult<Value> {
        let max_depth = self.world.config().max_call_depth;
        if frame.call_depth() >= max_depth {
            return Err(VmError::runtime(
                frame,
                ErrorKind::CallDepthExceeded,
                format!("maximum call depth of {max_depth} exceeded calling {}", unit.name),
            ));
        }
        frame.backtrace.push(Backtrace {
            name: unit.name.clone(),
            instruction_index: unit.start,
        });
        debug!(name = %unit.name, start = unit.start, depth = frame.call_depth(), "enter code unit");
        let result = self.execute(frame, unit);
        frame.is_static_ok = false;
        frame.backtrace.pop();
        debug!(name = %unit.name, ok = result.is_ok(), "leave code unit");
        result
    }

    /// Main dispatch loop.
    ///
    /// Jumps are realized through a signed skip budget measured in words:
    /// a forward budget is spent instruction by instruction until it reaches
    /// zero, a backward one walks the index down while refunding each
    /// instruction's size. A backward walk that overshoots is clamped to zero.
    fn execute(&mut self, frame: &mut Frame, unit: &CodeUnit) -> RunResult<Value> {
        let instructions = &*unit.instructions;
        let mut index = unit.start;
        let mut skip: i32 = 0;

        while let Some(inst) = instructions.get(index) {
            frame.set_instruction_index(index);

            if skip > 0 {
                skip -= inst.size();
                if skip < 0 {
                    return Err(VmError::runner(
                        frame,
                        ErrorKind::UnbalancedAddress,
                        format!("unbalanced address in {} at instruction {index}", unit.name),
                    ));
                }
                index += 1;
                continue;
            }
            if skip < 0 {
                skip += inst.size();
                if skip > 0 {
                    warn!(name = %unit.name, index, overshoot = skip, "backward jump overshot, clamping");
                    skip = 0;
                } else {
                    index = index.checked_sub(1).ok_or_else(|| {
                        VmError::runner(
                            frame,
                            ErrorKind::UnbalancedAddress,
                            format!("jump before the start of {}", unit.name),
                        )
                    })?;
                    continue;
                }
            }

            trace!(index, instruction = %inst, "dispatch");
            match self.step(frame, inst)? {
                Flow::Next => index += 1,
                Flow::Jump(offset) => skip = offset,
                Flow::Return(value) => return Ok(value),
                Flow::Exit => break,
            }
        }
        Ok(Value::Undefined)
    }

    fn step(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<Flow> {
        match inst.op {
            Opcode::Conv => self.op_conv(frame, inst)?,
            Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::Mod
            | Opcode::Add
            | Opcode::Sub
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr => self.binary_op(frame, inst.op)?,
            Opcode::Neg => self.op_neg(frame)?,
            Opcode::Not => self.op_not(frame)?,
            Opcode::Cmp => self.op_cmp(frame, inst)?,
            Opcode::Pop => self.op_pop(frame, inst)?,
            Opcode::Dup => self.op_dup(frame, inst)?,
            Opcode::Ret => {
                let value = frame.pop()?;
                return Ok(Flow::Return(ensure_native(self.world, frame, value)?));
            }
            Opcode::Exit => return Ok(Flow::Exit),
            Opcode::Popz => {
                frame.pop()?;
            }
            Opcode::B => return Ok(Flow::Jump(branch_budget(inst.jump_offset, 2))),
            Opcode::Bt | Opcode::Bf => {
                let value = frame.pop()?;
                let value = ensure_native(self.world, frame, value)?;
                if is_truthy(frame, &value)? == (inst.op == Opcode::Bt) {
                    return Ok(Flow::Jump(branch_budget(inst.jump_offset, 2)));
                }
            }
            Opcode::PushEnv => {
                if self.op_push_env(frame)? {
                    return Ok(Flow::Jump(branch_budget(inst.jump_offset, 4)));
                }
            }
            Opcode::PopEnv => {
                if frame.pop_scope().is_none() {
                    return Err(VmError::runner(
                        frame,
                        ErrorKind::ScopeEmpty,
                        "tried to popenv but the instance scope is empty",
                    ));
                }
            }
            Opcode::Push => self.op_push(frame, inst)?,
            Opcode::PushLoc => self.op_push_local(frame, inst)?,
            Opcode::PushGlb => self.op_push_global(frame, inst)?,
            Opcode::PushBltn => self.op_push_builtin(frame, inst)?,
            Opcode::PushI => self.op_push_int16(frame, inst)?,
            Opcode::Call => self.op_call(frame, inst)?,
            Opcode::CallV => self.op_call_value(frame, inst)?,
            Opcode::Break => self.op_break(frame, inst)?,
        }
        Ok(Flow::Next)
    }
}
