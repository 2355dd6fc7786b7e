//! Implementation of the variable_global_*() builtin functions.

use std::rc::Rc;

use crate::{
    args::ArgValues,
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    value::Value,
    world::World,
};

fn global_name(frame: &Frame, function: &str, value: &Value) -> RunResult<Rc<str>> {
    match value {
        Value::String(name) => Ok(name.clone()),
        other => Err(VmError::runtime(
            frame,
            ErrorKind::InvalidArgument,
            format!("[{function}] object {other} is not a string"),
        )),
    }
}

/// Implementation of the variable_global_exists() builtin function.
pub(super) fn builtin_exists(world: &World, frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let name = args.get_one_arg(frame, "variable_global_exists")?;
    let name = global_name(frame, "variable_global_exists", &name)?;
    Ok(Value::Bool(world.global(&name).is_some()))
}

/// Implementation of the variable_global_get() builtin function.
///
/// Unlike `global.x` in bytecode, a missing name is reported with the
/// function's own message.
pub(super) fn builtin_get(world: &World, frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let name = args.get_one_arg(frame, "variable_global_get")?;
    let name = global_name(frame, "variable_global_get", &name)?;
    world.global(&name).cloned().ok_or_else(|| {
        VmError::runtime(
            frame,
            ErrorKind::UndefinedVariable,
            format!("global variable {name} doesn't exist"),
        )
    })
}

/// Implementation of the variable_global_set() builtin function.
pub(super) fn builtin_set(world: &mut World, frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let (name, value) = args.get_two_args(frame, "variable_global_set")?;
    let name = global_name(frame, "variable_global_set", &name)?;
    world.set_global(&name, value);
    Ok(Value::Undefined)
}
