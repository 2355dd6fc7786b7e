//! Implementation of the method() builtin function.

use crate::{
    args::ArgValues,
    bytecode::{Scope, Vm},
    exception::{RunResult, VmError},
    frame::Frame,
    scope::set_variable,
    value::Value,
};

/// Implementation of the method() builtin function.
///
/// Binds `func` under its own name in `scope`. Called from top-level code
/// (an empty instance-scope stack) with a `self` scope, the callable goes
/// into the world's function table instead, which is how global init
/// scripts declare named functions. Argument capture happens when the
/// returned callable is invoked.
pub(super) fn builtin_method(vm: &mut Vm<'_>, frame: &mut Frame, args: ArgValues) -> RunResult<Value> {
    let (scope, func) = args.get_two_args(frame, "method")?;
    let scope = match &scope {
        Value::Undefined => Scope::This,
        number if number.is_numeric() => number
            .as_i64()
            .and_then(|raw| i32::try_from(raw).ok())
            .map(Scope::from)
            .ok_or_else(|| VmError::argument_types(frame, "method"))?,
        _ => return Err(VmError::argument_types(frame, "method")),
    };
    let Value::Function(callable) = func else {
        return Err(VmError::argument_types(frame, "method"));
    };

    if frame.instance_scope.is_empty() && scope == Scope::This {
        vm.world_mut().register_function(callable.name(), callable.clone());
    } else {
        set_variable(
            vm.world_mut(),
            frame,
            scope,
            callable.name(),
            Value::Function(callable.clone()),
        )?;
    }
    Ok(Value::Function(callable))
}
