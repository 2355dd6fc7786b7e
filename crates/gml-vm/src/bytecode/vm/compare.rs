//! Comparison opcode.

use std::{cmp::Ordering, rc::Rc};

use super::Vm;
use crate::{
    bytecode::{instruction::Instruction, op::ComparisonKind},
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    normalize::{coerce_like, ensure_native, NumPair},
    value::Value,
};

impl Vm<'_> {
    pub(super) fn op_cmp(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let kind = inst.comparison_kind().ok_or_else(|| {
            VmError::internal(
                frame,
                ErrorKind::UnknownOpcode,
                format!("unknown comparison kind {}", inst.comparison),
            )
        })?;
        if frame.stack.len() < 2 {
            return Err(VmError::runner(
                frame,
                ErrorKind::UnbalancedStack,
                "[cmp] expected the stack to contain at least 2 elements",
            ));
        }
        let rhs = frame.pop()?;
        let rhs = ensure_native(self.world, frame, rhs)?;
        let lhs = ensure_native(self.world, frame, frame.peek()?.clone())?;
        let result = compare_values(frame, kind, &lhs, &rhs)?;
        frame.poke(Value::Bool(result))
    }
}

/// Instances compare by their id.
fn instance_to_id(value: &Value) -> Value {
    match value {
        Value::Instance(id) => Value::UInt32(*id),
        other => other.clone(),
    }
}

fn accepts(kind: ComparisonKind, ordering: Option<Ordering>) -> bool {
    match (kind, ordering) {
        (ComparisonKind::Neq, None) => true,
        (_, None) => false,
        (ComparisonKind::Lt, Some(o)) => o == Ordering::Less,
        (ComparisonKind::Lte, Some(o)) => o != Ordering::Greater,
        (ComparisonKind::Eq, Some(o)) => o == Ordering::Equal,
        (ComparisonKind::Neq, Some(o)) => o != Ordering::Equal,
        (ComparisonKind::Gte, Some(o)) => o != Ordering::Less,
        (ComparisonKind::Gt, Some(o)) => o == Ordering::Greater,
    }
}

/// Applies `kind` to two normalized operands.
///
/// A boolean facing a number is first converted to that number's type, in
/// either operand position. Values of unrelated types are never equal and
/// cannot be ordered.
fn compare_values(frame: &Frame, kind: ComparisonKind, lhs: &Value, rhs: &Value) -> RunResult<bool> {
    let (lhs, rhs) = match (lhs, rhs) {
        (Value::Bool(_), other) if other.is_numeric() => (coerce_like(lhs, rhs), rhs.clone()),
        (other, Value::Bool(_)) if other.is_numeric() => (lhs.clone(), coerce_like(rhs, lhs)),
        _ => (instance_to_id(lhs), instance_to_id(rhs)),
    };

    if let Some(pair) = NumPair::promote(&lhs, &rhs) {
        let ordering = match pair {
            NumPair::I32(a, b) => Some(a.cmp(&b)),
            NumPair::U32(a, b) => Some(a.cmp(&b)),
            NumPair::I64(a, b) => Some(a.cmp(&b)),
            NumPair::F32(a, b) => a.partial_cmp(&b),
            NumPair::F64(a, b) => a.partial_cmp(&b),
        };
        return Ok(accepts(kind, ordering));
    }

    let equality_only = matches!(kind, ComparisonKind::Eq | ComparisonKind::Neq);
    let same = match (&lhs, &rhs) {
        (Value::String(a), Value::String(b)) => return Ok(accepts(kind, Some(a.cmp(b)))),
        (Value::Undefined, Value::Undefined) => true,
        (Value::Array(a), Value::Array(b)) if equality_only => Rc::ptr_eq(a, b),
        (Value::Object(a), Value::Object(b)) if equality_only => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) if equality_only => a.name() == b.name(),
        _ if equality_only => false,
        _ => {
            return Err(VmError::internal(
                frame,
                ErrorKind::TypeMismatch,
                format!("cannot compare {} and {} with {kind}", lhs.type_name(), rhs.type_name()),
            ))
        }
    };
    Ok(match kind {
        ComparisonKind::Eq => same,
        ComparisonKind::Neq => !same,
        _ => accepts(kind, same.then_some(Ordering::Equal)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(kind: ComparisonKind, a: Value, b: Value) -> bool {
        compare_values(&Frame::new(), kind, &a, &b).unwrap()
    }

    #[test]
    fn booleans_take_their_counterparts_type() {
        assert!(cmp(ComparisonKind::Eq, Value::Bool(true), Value::Int32(1)));
        assert!(cmp(ComparisonKind::Eq, Value::Double(1.0), Value::Bool(true)));
        assert!(!cmp(ComparisonKind::Eq, Value::Bool(true), Value::Int64(0)));
        assert!(cmp(ComparisonKind::Lt, Value::Bool(false), Value::Double(0.5)));
    }

    #[test]
    fn instances_compare_by_id() {
        assert!(cmp(ComparisonKind::Eq, Value::Instance(100_000), Value::Int32(100_000)));
        assert!(cmp(ComparisonKind::Gt, Value::Instance(100_001), Value::Instance(100_000)));
    }

    #[test]
    fn mismatched_types() {
        assert!(!cmp(ComparisonKind::Eq, Value::from("1"), Value::Int32(1)));
        assert!(cmp(ComparisonKind::Neq, Value::Undefined, Value::Int32(0)));
        let err = compare_values(&Frame::new(), ComparisonKind::Lt, &Value::Undefined, &Value::Int32(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn nan_is_only_unequal() {
        let nan = Value::Double(f64::NAN);
        assert!(!cmp(ComparisonKind::Eq, nan.clone(), nan.clone()));
        assert!(cmp(ComparisonKind::Neq, nan.clone(), Value::Double(1.0)));
        assert!(!cmp(ComparisonKind::Gte, nan, Value::Double(1.0)));
    }

    #[test]
    fn strings_order_ordinally() {
        assert!(cmp(ComparisonKind::Lt, Value::from("abc"), Value::from("abd")));
        assert!(cmp(ComparisonKind::Eq, Value::from("x"), Value::from("x")));
    }
}
