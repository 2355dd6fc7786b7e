//! Implementation of the array_length() and array_length_1d() builtin functions.

use crate::{
    args::ArgValues,
    exception::{RunResult, VmError},
    frame::Frame,
    value::{ArrayKind, Value},
};

/// Implementation of the array_length() builtin function.
///
/// A fixed array reports one more than its element count, a growable list
/// reports its count. Scripts compiled against the runtime rely on this.
pub(super) fn builtin_array_length(frame: &Frame, args: ArgValues, name: &str) -> RunResult<Value> {
    let value = args.get_one_arg(frame, name)?;
    let Value::Array(array) = &value else {
        return Err(VmError::argument_types(frame, name));
    };
    let array = array.borrow();
    let length = match array.kind {
        ArrayKind::Fixed => array.items.len() + 1,
        ArrayKind::List => array.items.len(),
    };
    Ok(Value::Int32(i32::try_from(length).unwrap_or(i32::MAX)))
}
