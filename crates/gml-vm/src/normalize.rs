//! Value normalization and coercion rules.
//!
//! Every opcode that consumes a value goes through [`ensure_native`] first,
//! which turns a deferred variable reference into the value it names.

use crate::{
    bytecode::{DataType, ReferenceKind},
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    scope::get_variable,
    value::{Value, VariableReference},
    world::World,
};

/// Resolves a variable reference to its value, following at most one level.
///
/// Array references index into the resolved container; an index outside the
/// container yields `undefined`.
pub fn ensure_native(world: &World, frame: &Frame, value: Value) -> RunResult<Value> {
    let Value::Reference(reference) = value else {
        return Ok(value);
    };
    let resolved = match &*reference {
        VariableReference::Resolved { value, .. } => value.clone(),
        VariableReference::Unresolved { binding, kind, index } => {
            let target = get_variable(world, frame, binding.scope, &binding.name)?;
            if *kind == ReferenceKind::Array {
                index_array(frame, &target, index.as_ref())?
            } else {
                target
            }
        }
    };
    match resolved {
        Value::Reference(inner) => match &*inner {
            VariableReference::Resolved { value, .. } => Ok(value.clone()),
            VariableReference::Unresolved { binding, .. } => Err(VmError::internal(
                frame,
                ErrorKind::TypeMismatch,
                format!("nested unresolved reference to {binding}"),
            )),
        },
        other => Ok(other),
    }
}

/// Reads element `index` of `container`.
pub(crate) fn index_array(frame: &Frame, container: &Value, index: Option<&Value>) -> RunResult<Value> {
    match container {
        Value::Undefined => Err(VmError::runtime(frame, ErrorKind::NullArray, "array is null")),
        Value::Array(array) => {
            let Some(index) = index.and_then(Value::as_i64) else {
                return Ok(Value::Undefined);
            };
            let item = usize::try_from(index)
                .ok()
                .and_then(|index| array.borrow().items.get(index).cloned());
            Ok(item.unwrap_or_default())
        }
        other => Err(VmError::runtime(
            frame,
            ErrorKind::TypeMismatch,
            format!("cannot index a value of type {}", other.type_name()),
        )),
    }
}

/// Truthiness as the language defines it.
///
/// Floats are true from 0.5 up, integers from 1 up, strings when non-empty.
pub fn is_truthy(frame: &Frame, value: &Value) -> RunResult<bool> {
    Ok(match value {
        Value::Double(v) => *v >= 0.5,
        Value::Float(v) => *v >= 0.5,
        Value::Int16(v) => *v >= 1,
        Value::Int32(v) => *v >= 1,
        Value::Int64(v) => *v >= 1,
        Value::UInt32(v) => *v >= 1,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Undefined => false,
        Value::Reference(_) => {
            return Err(VmError::internal(
                frame,
                ErrorKind::TypeMismatch,
                "unable to take the truth value of an unresolved reference",
            ))
        }
        other => {
            return Err(VmError::internal(
                frame,
                ErrorKind::TypeMismatch,
                format!("unable to check if value is truthy ({other})"),
            ))
        }
    })
}

/// Stack slot size in bytes of `data_type`, as counted by `Dup`.
pub fn size_of(frame: &Frame, data_type: DataType) -> RunResult<usize> {
    match data_type {
        DataType::Double | DataType::Int64 => Ok(8),
        DataType::Int32
        | DataType::Boolean
        | DataType::String
        | DataType::Int16
        | DataType::Float
        | DataType::UnsignedInt => Ok(4),
        DataType::Variable => Ok(16),
        DataType::Delete | DataType::Undefined => Err(VmError::internal(
            frame,
            ErrorKind::UnknownDataType,
            format!("unknown datatype DataType.{data_type}"),
        )),
    }
}

/// Two numbers promoted to a common representation.
///
/// Promotion order is `F64 > F32 > I64 > U32 > I32`; mixing `U32` with
/// `I32` widens both to `I64`. Booleans count as 0 or 1 and `Int16` widens
/// to `I32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum NumPair {
    I32(i32, i32),
    U32(u32, u32),
    I64(i64, i64),
    F32(f32, f32),
    F64(f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Rank {
    I32,
    U32,
    I64,
    F32,
    F64,
}

fn rank(value: &Value) -> Option<Rank> {
    Some(match value {
        Value::Bool(_) | Value::Int16(_) | Value::Int32(_) => Rank::I32,
        Value::UInt32(_) => Rank::U32,
        Value::Int64(_) => Rank::I64,
        Value::Float(_) => Rank::F32,
        Value::Double(_) => Rank::F64,
        _ => return None,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn as_i32(value: &Value) -> i32 {
    match value {
        Value::Bool(b) => i32::from(*b),
        Value::Int16(v) => i32::from(*v),
        Value::Int32(v) => *v,
        Value::UInt32(v) => *v as i32,
        Value::Int64(v) => *v as i32,
        Value::Float(v) => *v as i32,
        Value::Double(v) => *v as i32,
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_u32(value: &Value) -> u32 {
    match value {
        Value::Bool(b) => u32::from(*b),
        Value::Int16(v) => *v as u32,
        Value::Int32(v) => *v as u32,
        Value::UInt32(v) => *v,
        Value::Int64(v) => *v as u32,
        Value::Float(v) => *v as u32,
        Value::Double(v) => *v as u32,
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_f32(value: &Value) -> f32 {
    match value {
        Value::Float(v) => *v,
        other => other.as_f64().unwrap_or_default() as f32,
    }
}

impl NumPair {
    /// Promotes two numeric values, or returns `None` when either is not a number.
    pub(crate) fn promote(a: &Value, b: &Value) -> Option<Self> {
        let (ra, rb) = (rank(a)?, rank(b)?);
        let mut target = if ra >= rb { ra } else { rb };
        if matches!((ra, rb), (Rank::U32, Rank::I32) | (Rank::I32, Rank::U32)) {
            target = Rank::I64;
        }
        Some(match target {
            Rank::I32 => Self::I32(as_i32(a), as_i32(b)),
            Rank::U32 => Self::U32(as_u32(a), as_u32(b)),
            Rank::I64 => Self::I64(a.as_i64()?, b.as_i64()?),
            Rank::F32 => Self::F32(as_f32(a), as_f32(b)),
            Rank::F64 => Self::F64(a.as_f64()?, b.as_f64()?),
        })
    }
}

/// Converts `value` to a number of the same representation as `like`.
///
/// Used to coerce a boolean operand to its counterpart's type before comparing.
pub(crate) fn coerce_like(value: &Value, like: &Value) -> Value {
    match like {
        Value::Int16(_) | Value::Int32(_) => Value::Int32(as_i32(value)),
        Value::UInt32(_) => Value::UInt32(as_u32(value)),
        Value::Int64(_) => Value::Int64(value.as_i64().unwrap_or_default()),
        Value::Float(_) => Value::Float(as_f32(value)),
        Value::Double(_) => Value::Double(value.as_f64().unwrap_or_default()),
        _ => value.clone(),
    }
}
