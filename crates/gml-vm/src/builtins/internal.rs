//! Runtime helpers the compiler emits calls to: `@@NewGMLObject@@` and `@@This@@`.

use crate::{
    args::ArgValues,
    bytecode::Vm,
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    namespace::ScopeEntry,
    value::Value,
};

/// Implementation of the `@@NewGMLObject@@` builtin function.
///
/// The first argument is the constructor, the rest are passed through to it.
pub(super) fn builtin_new_object(vm: &mut Vm<'_>, frame: &mut Frame, args: ArgValues) -> RunResult<Value> {
    let mut args = args.into_vec().into_iter();
    let Some(constructor) = args.next() else {
        return Err(VmError::runner(
            frame,
            ErrorKind::InvalidArgument,
            "[@@NewGMLObject@@] too little arguments",
        ));
    };
    vm.construct(frame, &constructor, args.collect())
}

/// Implementation of the `@@This@@` builtin function.
pub(super) fn builtin_this(frame: &Frame, args: &ArgValues) -> RunResult<Value> {
    args.check_zero_args(frame, "@@This@@")?;
    Ok(frame.instance_scope.last().map_or(Value::Undefined, ScopeEntry::to_value))
}
