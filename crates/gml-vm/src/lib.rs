#![doc = include_str!("../../../README.md")]
mod args;
mod builtins;
mod bytecode;
mod exception;
mod frame;
mod io;
mod namespace;
mod normalize;
mod scope;
mod value;
mod world;

pub use crate::{
    args::ArgValues,
    builtins::BuiltinsFunctions,
    bytecode::{
        assemble, AsmError, BreakKind, CodeEntry, ComparisonKind, DataType, Instruction, InvalidOpcodeError, Opcode,
        Operand, Program, ProgramError, ReferenceKind, Scope, VariableOperand, Vm,
    },
    exception::{ErrorKind, HostFailure, RunResult, Severity, VmError},
    frame::{Backtrace, Frame, FrameSnapshot},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    namespace::{Instance, ScopeEntry, Variables},
    normalize::{ensure_native, is_truthy, size_of},
    scope::{get_variable, set_variable},
    value::{
        ArrayKind, ArrayRef, Binding, Callable, ConstructedObject, GmlArray, InstanceId, NativeFn, NativeFunction,
        ObjectRef, Value, VariableReference,
    },
    world::{Instances, VmConfig, World, FIRST_INSTANCE_ID},
};
