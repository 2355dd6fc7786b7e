//! Arithmetic, bitwise and unary operation helpers for the VM.

use super::Vm;
use crate::{
    bytecode::op::Opcode,
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    normalize::{ensure_native, NumPair},
    value::Value,
};

impl Vm<'_> {
    /// Pops the right operand, combines it with the normalized left operand
    /// and replaces the left operand with the result.
    pub(super) fn binary_op(&mut self, frame: &mut Frame, op: Opcode) -> RunResult<()> {
        if frame.stack.len() < 2 {
            return Err(VmError::runner(
                frame,
                ErrorKind::UnbalancedStack,
                format!("[{}] expected the stack to contain at least 2 elements", op_name(op)),
            ));
        }
        let rhs = frame.pop()?;
        let rhs = ensure_native(self.world, frame, rhs)?;
        let lhs = ensure_native(self.world, frame, frame.peek()?.clone())?;
        let result = arithmetic(frame, op, &lhs, &rhs)?;
        frame.poke(result)
    }

    pub(super) fn op_neg(&mut self, frame: &mut Frame) -> RunResult<()> {
        let value = self.unary_operand(frame, Opcode::Neg)?;
        let result = match value {
            Value::Bool(b) => Value::Int32(-i32::from(b)),
            Value::Int16(v) => Value::Int32(-i32::from(v)),
            Value::Int32(v) => Value::Int32(v.wrapping_neg()),
            Value::Int64(v) => Value::Int64(v.wrapping_neg()),
            Value::UInt32(v) => Value::Int64(-i64::from(v)),
            Value::Float(v) => Value::Float(-v),
            Value::Double(v) => Value::Double(-v),
            other => return Err(unsupported(frame, Opcode::Neg, &other, None)),
        };
        frame.poke(result)
    }

    /// Bitwise inversion. Floats have their IEEE-754 bit pattern inverted.
    pub(super) fn op_not(&mut self, frame: &mut Frame) -> RunResult<()> {
        let value = self.unary_operand(frame, Opcode::Not)?;
        let result = match value {
            Value::Bool(b) => Value::Bool(!b),
            Value::Int16(v) => Value::Int16(!v),
            Value::Int32(v) => Value::Int32(!v),
            Value::Int64(v) => Value::Int64(!v),
            Value::UInt32(v) => Value::UInt32(!v),
            Value::Float(v) => Value::Float(f32::from_bits(!v.to_bits())),
            Value::Double(v) => Value::Double(f64::from_bits(!v.to_bits())),
            other => return Err(unsupported(frame, Opcode::Not, &other, None)),
        };
        frame.poke(result)
    }

    fn unary_operand(&self, frame: &Frame, op: Opcode) -> RunResult<Value> {
        if frame.stack.is_empty() {
            return Err(VmError::runner(
                frame,
                ErrorKind::UnbalancedStack,
                format!("[{}] expected the stack to contain at least 1 element", op_name(op)),
            ));
        }
        ensure_native(self.world, frame, frame.peek()?.clone())
    }
}

fn op_name(op: Opcode) -> &'static str {
    op.into()
}

fn unsupported(frame: &Frame, op: Opcode, lhs: &Value, rhs: Option<&Value>) -> VmError {
    let message = match rhs {
        Some(rhs) => format!(
            "[{}] unable to perform operation with values {} and {}",
            op_name(op),
            lhs.type_name(),
            rhs.type_name()
        ),
        None => format!("[{}] unable to perform operation with value {}", op_name(op), lhs.type_name()),
    };
    VmError::internal(frame, ErrorKind::TypeMismatch, message)
}

fn division_by_zero(frame: &Frame, op: Opcode) -> VmError {
    VmError::runtime(
        frame,
        ErrorKind::DivisionByZero,
        format!("[{}] value2 must not be 0", op_name(op)),
    )
}

/// Applies a binary opcode to two normalized operands.
fn arithmetic(frame: &Frame, op: Opcode, lhs: &Value, rhs: &Value) -> RunResult<Value> {
    if op == Opcode::Add && (matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_))) {
        let scalar = |v: &Value| matches!(v, Value::String(_)) || v.is_numeric() || matches!(v, Value::Bool(_));
        if scalar(lhs) && scalar(rhs) {
            return Ok(Value::string(format!("{lhs}{rhs}")));
        }
        return Err(unsupported(frame, op, lhs, Some(rhs)));
    }

    match op {
        Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Shl | Opcode::Shr => {
            let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) else {
                return Err(unsupported(frame, op, lhs, Some(rhs)));
            };
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let shift = b as u32;
            return Ok(Value::Int64(match op {
                Opcode::And => a & b,
                Opcode::Or => a | b,
                Opcode::Xor => a ^ b,
                Opcode::Shl => a.wrapping_shl(shift),
                _ => a.wrapping_shr(shift),
            }));
        }
        Opcode::Rem => {
            let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) else {
                return Err(unsupported(frame, op, lhs, Some(rhs)));
            };
            if b == 0 {
                return Err(division_by_zero(frame, op));
            }
            return Ok(Value::Int64(a.wrapping_rem(b)));
        }
        _ => {}
    }

    let Some(pair) = NumPair::promote(lhs, rhs) else {
        return Err(unsupported(frame, op, lhs, Some(rhs)));
    };
    if op == Opcode::Mod && rhs.as_f64() == Some(0.0) {
        return Err(division_by_zero(frame, op));
    }

    Ok(match pair {
        NumPair::I32(a, b) => Value::Int32(integer_op(frame, op, a, b)?),
        NumPair::U32(a, b) => Value::UInt32(integer_op(frame, op, a, b)?),
        NumPair::I64(a, b) => Value::Int64(integer_op(frame, op, a, b)?),
        NumPair::F32(a, b) => Value::Float(match op {
            Opcode::Add => a + b,
            Opcode::Sub => a - b,
            Opcode::Mul => a * b,
            Opcode::Div => a / b,
            _ => a % b,
        }),
        NumPair::F64(a, b) => Value::Double(match op {
            Opcode::Add => a + b,
            Opcode::Sub => a - b,
            Opcode::Mul => a * b,
            Opcode::Div => a / b,
            _ => a % b,
        }),
    })
}

/// Wrapping integer arithmetic shared by the three integer widths.
trait WrappingInt: Copy + PartialEq + Default {
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Self;
    fn rem(self, rhs: Self) -> Self;
}

macro_rules! impl_wrapping_int {
    ($($t:ty),*) => {$(
        impl WrappingInt for $t {
            fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
            fn div(self, rhs: Self) -> Self { self.wrapping_div(rhs) }
            fn rem(self, rhs: Self) -> Self { self.wrapping_rem(rhs) }
        }
    )*};
}

impl_wrapping_int!(i32, u32, i64);

fn integer_op<T: WrappingInt>(frame: &Frame, op: Opcode, a: T, b: T) -> RunResult<T> {
    if matches!(op, Opcode::Div | Opcode::Mod) && b == T::default() {
        return Err(division_by_zero(frame, op));
    }
    Ok(match op {
        Opcode::Add => a.add(b),
        Opcode::Sub => a.sub(b),
        Opcode::Mul => a.mul(b),
        Opcode::Div => a.div(b),
        _ => a.rem(b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::Severity;

    fn apply(op: Opcode, lhs: Value, rhs: Value) -> RunResult<Value> {
        arithmetic(&Frame::new(), op, &lhs, &rhs)
    }

    #[test]
    fn integers_stay_integers() {
        assert_eq!(apply(Opcode::Add, Value::Int32(2), Value::Int32(3)).unwrap(), Value::Int32(5));
        assert_eq!(apply(Opcode::Div, Value::Int32(7), Value::Int32(2)).unwrap(), Value::Int32(3));
        assert_eq!(
            apply(Opcode::Mul, Value::Int32(i32::MAX), Value::Int32(2)).unwrap(),
            Value::Int32(-2)
        );
    }

    #[test]
    fn mixed_operands_promote() {
        assert_eq!(apply(Opcode::Add, Value::Int32(1), Value::Double(0.5)).unwrap(), Value::Double(1.5));
        assert_eq!(apply(Opcode::Sub, Value::Bool(true), Value::Int64(3)).unwrap(), Value::Int64(-2));
        assert_eq!(apply(Opcode::Add, Value::UInt32(1), Value::Int32(-2)).unwrap(), Value::Int64(-1));
    }

    #[test]
    fn add_concatenates_strings() {
        assert_eq!(
            apply(Opcode::Add, Value::from("hp: "), Value::Int32(3)).unwrap(),
            Value::from("hp: 3")
        );
        let err = apply(Opcode::Sub, Value::from("a"), Value::Int32(1)).unwrap_err();
        assert_eq!(err.severity(), Severity::RunnerInternal);
    }

    #[test]
    fn zero_divisors() {
        let err = apply(Opcode::Mod, Value::Double(1.0), Value::Double(0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DivisionByZero);
        assert_eq!(err.severity(), Severity::Runtime);
        assert_eq!(
            apply(Opcode::Rem, Value::Int32(7), Value::Int32(0)).unwrap_err().kind(),
            ErrorKind::DivisionByZero
        );
        assert_eq!(
            apply(Opcode::Div, Value::Double(1.0), Value::Int32(0)).unwrap(),
            Value::Double(f64::INFINITY)
        );
    }

    #[test]
    fn bitwise_ops_widen_to_i64() {
        assert_eq!(apply(Opcode::And, Value::Int32(6), Value::Double(3.0)).unwrap(), Value::Int64(2));
        assert_eq!(apply(Opcode::Shl, Value::Int32(1), Value::Int32(4)).unwrap(), Value::Int64(16));
        assert_eq!(apply(Opcode::Shr, Value::Int64(-8), Value::Int32(1)).unwrap(), Value::Int64(-4));
        assert_eq!(apply(Opcode::Rem, Value::Double(7.9), Value::Int32(3)).unwrap(), Value::Int64(1));
    }
}
