use crate::{
    exception::{RunResult, VmError},
    frame::Frame,
    value::Value,
};

/// Arguments passed to a native function, already normalized.
///
/// Uses specific variants for the common cases so most calls avoid the
/// `Vec` allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValues {
    Zero,
    One(Value),
    Two(Value, Value),
    Many(Vec<Value>),
}

impl From<Vec<Value>> for ArgValues {
    fn from(mut args: Vec<Value>) -> Self {
        match args.len() {
            0 => Self::Zero,
            1 => Self::One(args.remove(0)),
            2 => {
                let second = args.remove(1);
                Self::Two(args.remove(0), second)
            }
            _ => Self::Many(args),
        }
    }
}

impl ArgValues {
    /// Checks that zero arguments were passed.
    pub fn check_zero_args(&self, frame: &Frame, name: &str) -> RunResult<()> {
        match self {
            Self::Zero => Ok(()),
            _ => Err(VmError::argument_count(frame, name)),
        }
    }

    /// Checks that exactly one argument was passed, returning it.
    pub fn get_one_arg(self, frame: &Frame, name: &str) -> RunResult<Value> {
        match self {
            Self::One(a) => Ok(a),
            _ => Err(VmError::argument_count(frame, name)),
        }
    }

    /// Checks that exactly two arguments were passed, returning them as a tuple.
    pub fn get_two_args(self, frame: &Frame, name: &str) -> RunResult<(Value, Value)> {
        match self {
            Self::Two(a1, a2) => Ok((a1, a2)),
            _ => Err(VmError::argument_count(frame, name)),
        }
    }

    /// Checks that exactly three arguments were passed.
    pub fn get_three_args(self, frame: &Frame, name: &str) -> RunResult<(Value, Value, Value)> {
        match self {
            Self::Many(args) if args.len() == 3 => {
                let mut args = args.into_iter();
                match (args.next(), args.next(), args.next()) {
                    (Some(a1), Some(a2), Some(a3)) => Ok((a1, a2, a3)),
                    _ => Err(VmError::argument_count(frame, name)),
                }
            }
            _ => Err(VmError::argument_count(frame, name)),
        }
    }

    /// Returns the arguments as a `Vec`, in call order.
    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Self::Zero => vec![],
            Self::One(a) => vec![a],
            Self::Two(a1, a2) => vec![a1, a2],
            Self::Many(args) => args,
        }
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One(_) => 1,
            Self::Two(_, _) => 2,
            Self::Many(args) => args.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_conversion_picks_smallest_variant() {
        assert_eq!(ArgValues::from(vec![]), ArgValues::Zero);
        assert_eq!(
            ArgValues::from(vec![Value::Int32(1), Value::Int32(2)]),
            ArgValues::Two(Value::Int32(1), Value::Int32(2))
        );
        let many = ArgValues::from(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]);
        assert_eq!(many.count(), 3);
        assert_eq!(many.into_vec()[2], Value::Int32(3));
    }

    #[test]
    fn wrong_count_is_runtime_error() {
        let frame = Frame::new();
        let err = ArgValues::Zero.get_one_arg(&frame, "lerp").unwrap_err();
        assert_eq!(err.message(), "[lerp] unexpected argument count");
    }
}
