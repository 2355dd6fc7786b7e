//! Implementation of the lerp() builtin function.

use crate::{
    args::ArgValues,
    exception::{RunResult, VmError},
    frame::Frame,
    value::Value,
};

/// Implementation of the lerp() builtin function.
///
/// Returns `a + (b - a) * t` as a double.
pub(super) fn builtin_lerp(frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let (a, b, t) = args.get_three_args(frame, "lerp")?;
    match (a.as_f64(), b.as_f64(), t.as_f64()) {
        (Some(a), Some(b), Some(t)) => Ok(Value::Double(a + (b - a) * t)),
        _ => Err(VmError::argument_types(frame, "lerp")),
    }
}
