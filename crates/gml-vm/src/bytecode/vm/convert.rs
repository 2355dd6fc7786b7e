//! The `Conv` opcode and its (source x target) conversion matrix.

use super::Vm;
use crate::{
    bytecode::{
        instruction::Instruction,
        op::{DataType, ReferenceKind},
    },
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    normalize::{index_array, is_truthy},
    scope::get_variable,
    value::{Value, VariableReference},
    world::World,
};

impl Vm<'_> {
    /// Converts the top of the stack from `type1` to `type2` in place.
    ///
    /// With a `Variable` source the top is first read through its reference.
    /// The rule applied is picked from the kind of the value actually found,
    /// so a mislabelled `type1` cannot produce a wrongly typed result.
    pub(super) fn op_conv(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let top = frame.peek()?.clone();
        let value = if inst.type1 == DataType::Variable {
            read_reference(self.world, frame, top)?
        } else {
            top
        };
        let converted = convert(frame, value, inst.type2)?;
        frame.poke(converted)
    }
}

/// Reads a reference for `Conv`. An array index outside the container leaves
/// the container itself in place.
fn read_reference(world: &World, frame: &Frame, value: Value) -> RunResult<Value> {
    let Value::Reference(reference) = &value else {
        return Ok(value);
    };
    match &**reference {
        VariableReference::Resolved { value, .. } => Ok(value.clone()),
        VariableReference::Unresolved { binding, kind, index } => {
            let target = get_variable(world, frame, binding.scope, &binding.name)?;
            if *kind != ReferenceKind::Array {
                return Ok(target);
            }
            let in_range = match (&target, index.as_ref().and_then(Value::as_i64)) {
                (Value::Array(array), Some(i)) => usize::try_from(i).is_ok_and(|i| i < array.borrow().items.len()),
                _ => false,
            };
            if in_range {
                index_array(frame, &target, index.as_ref())
            } else {
                Ok(target)
            }
        }
    }
}

fn parse_failure(frame: &Frame, text: &str, target: DataType) -> VmError {
    VmError::runtime(
        frame,
        ErrorKind::InvalidConversion,
        format!("unable to convert {text:?} to DataType.{target}"),
    )
}

/// Converts a string by parsing it as the target type.
fn from_string(frame: &Frame, text: &str, target: DataType) -> RunResult<Value> {
    let trimmed = text.trim();
    let parsed = match target {
        DataType::String => Some(Value::string(text)),
        DataType::Boolean => Some(Value::Bool(!text.is_empty())),
        DataType::Double => trimmed.parse().ok().map(Value::Double),
        DataType::Float => trimmed.parse().ok().map(Value::Float),
        DataType::Int16 => trimmed.parse().ok().map(Value::Int16),
        DataType::Int32 => trimmed.parse().ok().map(Value::Int32),
        DataType::Int64 => trimmed.parse().ok().map(Value::Int64),
        DataType::UnsignedInt => trimmed.parse().ok().map(Value::UInt32),
        DataType::Variable | DataType::Undefined | DataType::Delete => None,
    };
    parsed.ok_or_else(|| parse_failure(frame, text, target))
}

/// Casts a number or boolean to a numeric target.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn cast_number(value: &Value, target: DataType) -> Option<Value> {
    if let (Value::Double(v), DataType::Double) = (value, target) {
        return Some(Value::Double(*v));
    }
    if let (Value::Float(v), DataType::Float) = (value, target) {
        return Some(Value::Float(*v));
    }
    let float = value.as_f64()?;
    let integer = value.as_i64()?;
    Some(match target {
        DataType::Double => Value::Double(float),
        DataType::Float => Value::Float(float as f32),
        DataType::Int16 => Value::Int16(integer as i16),
        DataType::Int32 => Value::Int32(integer as i32),
        DataType::Int64 => Value::Int64(integer),
        DataType::UnsignedInt => Value::UInt32(integer as u32),
        _ => return None,
    })
}

/// Converts a normalized value to `target`.
///
/// Converting a scalar to its own type returns it unchanged. A `Variable`
/// target boxes anything that is not already a reference.
fn convert(frame: &Frame, value: Value, target: DataType) -> RunResult<Value> {
    match target {
        DataType::Variable => {
            return Ok(match value {
                Value::Reference(_) => value,
                other => Value::resolved(other),
            })
        }
        DataType::Undefined => return Ok(Value::Undefined),
        DataType::Delete => {
            return Err(VmError::internal(
                frame,
                ErrorKind::InvalidConversion,
                "unable to convert to DataType.Delete",
            ))
        }
        _ => {}
    }

    match value {
        Value::Undefined => Ok(Value::Undefined),
        Value::String(text) => from_string(frame, &text, target),
        Value::Bool(b) if target == DataType::Boolean => Ok(Value::Bool(b)),
        ref scalar if scalar.is_numeric() || matches!(scalar, Value::Bool(_)) => match target {
            DataType::Boolean => Ok(Value::Bool(is_truthy(frame, scalar)?)),
            DataType::String => Ok(Value::string(scalar.to_string())),
            _ => cast_number(scalar, target).ok_or_else(|| {
                VmError::internal(
                    frame,
                    ErrorKind::InvalidConversion,
                    format!("unable to convert {} to DataType.{target}", scalar.type_name()),
                )
            }),
        },
        Value::Instance(id) => cast_number(&Value::UInt32(id), target)
            .or_else(|| (target == DataType::String).then(|| Value::string(id.to_string())))
            .ok_or_else(|| {
                VmError::internal(
                    frame,
                    ErrorKind::InvalidConversion,
                    format!("unable to convert instance to DataType.{target}"),
                )
            }),
        other if target == DataType::String => Ok(Value::string(other.to_string())),
        other if target == DataType::Boolean => Ok(Value::Bool(is_truthy(frame, &other)?)),
        other => Err(VmError::internal(
            frame,
            ErrorKind::InvalidConversion,
            format!("unable to convert {} to DataType.{target}", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(value: Value, target: DataType) -> RunResult<Value> {
        convert(&Frame::new(), value, target)
    }

    #[test]
    fn numbers_cast_between_widths() {
        assert_eq!(conv(Value::Double(3.9), DataType::Int32).unwrap(), Value::Int32(3));
        assert_eq!(conv(Value::Int32(-1), DataType::Int64).unwrap(), Value::Int64(-1));
        assert_eq!(conv(Value::Bool(true), DataType::Double).unwrap(), Value::Double(1.0));
        assert_eq!(conv(Value::Int16(2), DataType::Boolean).unwrap(), Value::Bool(true));
        assert_eq!(conv(Value::Double(0.25), DataType::Boolean).unwrap(), Value::Bool(false));
    }

    #[test]
    fn strings_parse_or_fail_at_runtime() {
        assert_eq!(conv(Value::from(" 42 "), DataType::Int32).unwrap(), Value::Int32(42));
        assert_eq!(conv(Value::from("1.5"), DataType::Double).unwrap(), Value::Double(1.5));
        let err = conv(Value::from("abc"), DataType::Double).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConversion);
        assert_eq!(err.severity(), crate::exception::Severity::Runtime);
        assert_eq!(conv(Value::Int32(7), DataType::String).unwrap(), Value::from("7"));
    }

    #[test]
    fn variable_target_boxes_values() {
        let boxed = conv(Value::Int32(1), DataType::Variable).unwrap();
        assert_eq!(boxed, Value::resolved(Value::Int32(1)));
        assert_eq!(conv(boxed.clone(), DataType::Variable).unwrap(), boxed);
    }

    #[test]
    fn same_type_is_identity() {
        for value in [
            Value::Double(-0.0),
            Value::Float(1.25),
            Value::Int16(-3),
            Value::Int32(9),
            Value::Int64(i64::MIN),
            Value::UInt32(u32::MAX),
            Value::Bool(false),
            Value::from("text"),
        ] {
            let data_type = value.data_type();
            assert_eq!(conv(value.clone(), data_type).unwrap(), value);
        }
    }
}
