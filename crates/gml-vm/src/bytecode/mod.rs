//! Bytecode model and virtual machine.
//!
//! # Module Structure
//!
//! - `op` - Opcode, data type and scope definitions
//! - `instruction` - Decoded instructions and their encoded sizes
//! - `code` - Code entries and the serializable program container
//! - `asm` - Assembler for the textual instruction listing
//! - `vm` - Dispatch loop and call protocol

mod asm;
mod code;
mod instruction;
mod op;
mod vm;

pub use asm::{assemble, AsmError};
pub use code::{CodeEntry, Program, ProgramError};
pub use instruction::{Instruction, Operand, VariableOperand};
pub use op::{BreakKind, ComparisonKind, DataType, InvalidOpcodeError, Opcode, ReferenceKind, Scope};
pub use vm::Vm;
