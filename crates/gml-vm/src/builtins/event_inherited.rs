//! Implementation of the event_inherited() builtin function.

use crate::{args::ArgValues, exception::RunResult, frame::Frame, value::Value};

/// Implementation of the event_inherited() builtin function.
///
/// Parent events are not modelled, so this only validates its arity.
pub(super) fn builtin_event_inherited(frame: &Frame, args: &ArgValues) -> RunResult<Value> {
    args.check_zero_args(frame, "event_inherited")?;
    Ok(Value::Undefined)
}
