//! Implementation of the string builtins: string(), string_copy(),
//! string_pos() and show_debug_message().

use std::fmt::Write;

use crate::{
    args::ArgValues,
    bytecode::Vm,
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    value::Value,
};

fn bad_format(frame: &Frame, function: &str) -> VmError {
    VmError::runtime(
        frame,
        ErrorKind::InvalidArgument,
        format!("[{function}] input string was not in a correct format"),
    )
}

/// Expands `{N}` placeholders in `template` with the matching argument.
///
/// `{{` and `}}` produce literal braces. An unterminated placeholder, a
/// non-numeric index or an index past the end of `values` is a runtime error.
fn format_template(frame: &Frame, function: &str, template: &str, values: &[Value]) -> RunResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(digit) if digit.is_ascii_digit() => index.push(digit),
                        _ => return Err(bad_format(frame, function)),
                    }
                }
                let value = index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| values.get(i))
                    .ok_or_else(|| bad_format(frame, function))?;
                // writing into a String cannot fail
                let _ = write!(out, "{value}");
            }
            '}' => return Err(bad_format(frame, function)),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Shared by `string` and `show_debug_message`: the first argument is the
/// template, the rest fill its placeholders.
fn format_args(frame: &Frame, function: &str, args: ArgValues) -> RunResult<String> {
    let args = args.into_vec();
    let Some((template, values)) = args.split_first() else {
        return Err(VmError::argument_count(frame, function));
    };
    match template {
        Value::Undefined => Err(VmError::argument_types(frame, function)),
        Value::String(template) => format_template(frame, function, template, values),
        // only string templates carry placeholders
        other => Ok(other.to_string()),
    }
}

/// Implementation of the string() builtin function.
pub(super) fn builtin_string(frame: &Frame, args: ArgValues) -> RunResult<Value> {
    format_args(frame, "string", args).map(Value::string)
}

/// Implementation of the show_debug_message() builtin function.
///
/// Formats like `string()` and writes one line to the VM's `PrintWriter`.
pub(super) fn builtin_show_debug_message(vm: &mut Vm<'_>, frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let line = format_args(frame, "show_debug_message", args)?;
    vm.print_writer().write_line(line.into());
    Ok(Value::Undefined)
}

fn string_arg<'v>(frame: &Frame, function: &str, value: &'v Value) -> RunResult<&'v str> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(VmError::argument_types(frame, function)),
    }
}

/// Implementation of the string_copy() builtin function.
///
/// `index` is 1-based. Both ends of the copied range are clamped to the
/// string, so out-of-range requests return a shorter (possibly empty) string.
pub(super) fn builtin_string_copy(frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let (text, index, count) = args.get_three_args(frame, "string_copy")?;
    let text = string_arg(frame, "string_copy", &text)?;
    let (Some(index), Some(count)) = (index.as_i64(), count.as_i64()) else {
        return Err(VmError::argument_types(frame, "string_copy"));
    };
    let len = i64::try_from(text.chars().count()).unwrap_or(i64::MAX);
    let start = (index - 1).clamp(0, len);
    let end = (index - 1).saturating_add(count).clamp(start, len);
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let copied: String = text
        .chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect();
    Ok(Value::string(copied))
}

/// Implementation of the string_pos() builtin function.
///
/// Returns the 1-based character position of `sub` in `text`, or 0.
pub(super) fn builtin_string_pos(frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let (sub, text) = args.get_two_args(frame, "string_pos")?;
    let sub = string_arg(frame, "string_pos", &sub)?;
    let text = string_arg(frame, "string_pos", &text)?;
    let position = text.find(sub).map_or(0, |byte| text[..byte].chars().count() + 1);
    Ok(Value::Int32(i32::try_from(position).unwrap_or(i32::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ConstructedObject;

    fn args(values: Vec<Value>) -> ArgValues {
        ArgValues::from(values)
    }

    #[test]
    fn string_substitutes_placeholders() {
        let frame = Frame::new();
        let out = builtin_string(
            &frame,
            args(vec![Value::from("{1} has {0} hp {{ok}}"), Value::Int32(3), Value::from("frisk")]),
        )
        .unwrap();
        assert_eq!(out, Value::from("frisk has 3 hp {ok}"));
        let err = builtin_string(&frame, args(vec![Value::from("{2}"), Value::Int32(1)])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn non_string_first_argument_is_printed_as_is() {
        let frame = Frame::new();
        let object = ConstructedObject::new_ref();
        object.borrow_mut().variables.insert("x".into(), Value::Int32(1));
        let out = builtin_string(&frame, args(vec![Value::Object(object)])).unwrap();
        assert_eq!(out, Value::from("{ x : 1 }"));
        let out = builtin_string(&frame, args(vec![Value::Int32(4), Value::from("ignored")])).unwrap();
        assert_eq!(out, Value::from("4"));
    }

    #[test]
    fn string_copy_clamps() {
        let frame = Frame::new();
        let copy = |i, n| {
            builtin_string_copy(&frame, args(vec![Value::from("héllo"), Value::Int32(i), Value::Int32(n)])).unwrap()
        };
        assert_eq!(copy(2, 3), Value::from("éll"));
        assert_eq!(copy(0, 2), Value::from("h"));
        assert_eq!(copy(4, 99), Value::from("lo"));
        assert_eq!(copy(9, 1), Value::from(""));
        assert_eq!(copy(3, -2), Value::from(""));
    }

    #[test]
    fn string_pos_is_one_based() {
        let frame = Frame::new();
        let pos = |sub: &str, text: &str| builtin_string_pos(&frame, args(vec![Value::from(sub), Value::from(text)])).unwrap();
        assert_eq!(pos("l", "héllo"), Value::Int32(3));
        assert_eq!(pos("z", "héllo"), Value::Int32(0));
        let err = builtin_string_pos(&frame, args(vec![Value::Int32(1), Value::from("x")])).unwrap_err();
        assert_eq!(err.message(), "[string_pos] wrong argument types");
    }
}
