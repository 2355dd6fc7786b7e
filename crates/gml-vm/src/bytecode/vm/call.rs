//! Call protocol: static calls, dynamic calls and constructor calls.

use std::{
    mem,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use tracing::error;

use super::{stack::read_through, Vm};
use crate::{
    args::ArgValues,
    bytecode::{
        instruction::{Instruction, Operand},
        op::Scope,
    },
    exception::{ErrorKind, HostFailure, RunResult, VmError},
    frame::{seeded_builtins, Frame},
    namespace::{ScopeEntry, Variables},
    normalize::ensure_native,
    value::{Callable, ConstructedObject, NativeFunction, Value, VariableReference},
};

/// Local builtins seen by a script body: the seeded builtins, the `argument`
/// array, its count and one `argumentN` binding per value.
fn argument_bindings(args: &[Value]) -> Variables {
    let mut bindings = seeded_builtins();
    bindings.insert("argument".into(), Value::fixed_array(args.to_vec()));
    bindings.insert(
        "argument_count".into(),
        Value::Int32(i32::try_from(args.len()).unwrap_or(i32::MAX)),
    );
    for (i, arg) in args.iter().enumerate() {
        bindings.insert(format!("argument{i}").into(), arg.clone());
    }
    bindings
}

/// Instances and constructed objects can be `self` for a call.
fn holder_entry(value: &Value) -> Option<ScopeEntry> {
    match value {
        Value::Instance(id) => Some(ScopeEntry::Instance(*id)),
        Value::Object(object) => Some(ScopeEntry::Object(object.clone())),
        _ => None,
    }
}

/// Call results are pushed as resolved references.
fn wrap_result(value: Value) -> Value {
    match value {
        Value::Reference(_) => value,
        other => Value::resolved(other),
    }
}

impl Vm<'_> {
    /// Pops `count` arguments, the first popped being the first argument.
    fn pop_args(&mut self, frame: &mut Frame, count: usize) -> RunResult<Vec<Value>> {
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let arg = frame.pop()?;
            args.push(ensure_native(self.world, frame, arg)?);
        }
        Ok(args)
    }

    /// `call.i name(argc=N)`.
    pub(super) fn op_call(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let name = match &inst.operand {
            Operand::Function(name) => name.clone(),
            _ => {
                return Err(VmError::internal(
                    frame,
                    ErrorKind::TypeMismatch,
                    format!("{inst} does not name a function"),
                ))
            }
        };
        let callable = self.world.function(&name).cloned().ok_or_else(|| {
            VmError::runtime(
                frame,
                ErrorKind::UndefinedFunction,
                format!("invalid function with name {name}"),
            )
        })?;
        let args = self.pop_args(frame, usize::from(inst.argument_count))?;
        let result = self.invoke(frame, &callable, args, None)?;
        frame.push(wrap_result(result));
        Ok(())
    }

    /// `callv.v N`: calls the function value on top of the stack.
    ///
    /// The entry below the target is the receiver candidate. The callable
    /// comes from one of three places:
    /// - a target that already holds a function;
    /// - a target read out of an instance or constructed object, which then
    ///   becomes the receiver;
    /// - an unresolved target, resolved with the receiver on the
    ///   instance-scope stack.
    pub(super) fn op_call_value(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let target = frame.pop()?;
        let receiver = frame.pop()?;
        let receiver = ensure_native(self.world, frame, receiver)?;
        let mut receiver_entry = match &receiver {
            number if number.is_numeric() => number
                .as_i64()
                .and_then(|id| self.world.find_instance(id))
                .map(ScopeEntry::Instance),
            other => holder_entry(other),
        };

        let function = match &target {
            Value::Reference(reference) => match &**reference {
                VariableReference::Resolved { value, origin } => match (holder_entry(value), origin) {
                    (Some(entry), Some(binding)) => {
                        let function = read_through(self.world, frame, entry.clone(), Scope::This, &binding.name)?;
                        receiver_entry = Some(entry);
                        function
                    }
                    _ => value.clone(),
                },
                VariableReference::Unresolved { .. } => {
                    if receiver_entry.is_none() {
                        if let Some(id) = receiver.as_i64().filter(|id| *id >= 0 && receiver.is_numeric()) {
                            return Err(VmError::internal(
                                frame,
                                ErrorKind::UnknownScope,
                                format!("unknown scope {id}"),
                            ));
                        }
                    }
                    let depth = frame.instance_scope.len();
                    if let Some(entry) = &receiver_entry {
                        frame.push_scope(entry.clone());
                    }
                    let resolved = ensure_native(self.world, frame, target.clone());
                    frame.instance_scope.truncate(depth);
                    resolved?
                }
            },
            other => other.clone(),
        };

        let Value::Function(callable) = function else {
            return Err(VmError::internal(
                frame,
                ErrorKind::TypeMismatch,
                format!("{} is not callable", function.type_name()),
            ));
        };
        let args = self.pop_args(frame, usize::from(inst.argument_count))?;
        let result = self.invoke(frame, &callable, args, receiver_entry)?;
        frame.push(wrap_result(result));
        Ok(())
    }

    /// Invokes `callable` with already normalized arguments.
    ///
    /// A script runs on the calling frame with the receiver, if any, as `self`.
    /// A native receives the receiver as a parameter.
    pub(crate) fn invoke(
        &mut self,
        frame: &mut Frame,
        callable: &Callable,
        args: Vec<Value>,
        receiver: Option<ScopeEntry>,
    ) -> RunResult<Value> {
        match callable {
            Callable::Script(name) => self.call_script(frame, name, args, receiver),
            Callable::Native(native) => self.call_native(frame, native, ArgValues::from(args), receiver),
        }
    }

    /// Runs a native function, turning a panic into a `HostFailure` error.
    fn call_native(
        &mut self,
        frame: &mut Frame,
        native: &NativeFunction,
        args: ArgValues,
        receiver: Option<ScopeEntry>,
    ) -> RunResult<Value> {
        let call = Rc::clone(&native.call);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(self, frame, args, receiver)));
        outcome.unwrap_or_else(|payload| {
            let failure = HostFailure::from_panic(&*payload);
            error!(function = %native.name, message = failure.message(), "native function panicked");
            Err(VmError::host_failure(frame, failure))
        })
    }

    /// Runs the script `name` with its own argument bindings and fresh locals.
    ///
    /// The argument list is padded with `undefined` up to the script's
    /// declared arity. The caller's locals, local builtins and instance-scope
    /// stack are restored afterwards, whether or not the script failed.
    pub(crate) fn call_script(
        &mut self,
        frame: &mut Frame,
        name: &str,
        mut args: Vec<Value>,
        receiver: Option<ScopeEntry>,
    ) -> RunResult<Value> {
        let arity = self.world.code(name).map_or(0, |entry| usize::from(entry.arguments_count));
        if args.len() < arity {
            args.resize(arity, Value::Undefined);
        }
        let saved_builtins = mem::replace(&mut frame.local_builtins, argument_bindings(&args));
        let saved_locals = mem::take(&mut frame.locals);
        let depth = frame.instance_scope.len();
        if let Some(entry) = receiver {
            frame.push_scope(entry);
        }

        let result = self.run(name, Some(&mut *frame));

        frame.instance_scope.truncate(depth);
        frame.local_builtins = saved_builtins;
        frame.locals = saved_locals;
        result
    }

    /// Runs `constructor` against a fresh constructed object and returns it.
    ///
    /// The object is `self` for the constructor body only.
    pub(crate) fn construct(&mut self, frame: &mut Frame, constructor: &Value, args: Vec<Value>) -> RunResult<Value> {
        let Value::Function(callable) = constructor else {
            return Err(VmError::runtime(
                frame,
                ErrorKind::InvalidArgument,
                format!("[@@NewGMLObject@@] a {} is not a constructor", constructor.type_name()),
            ));
        };
        let object = ConstructedObject::new_ref();
        let entry = ScopeEntry::Object(object.clone());
        match callable {
            Callable::Script(name) => {
                self.call_script(frame, name, args, Some(entry))?;
            }
            Callable::Native(native) => {
                let depth = frame.instance_scope.len();
                frame.push_scope(entry.clone());
                let result = self.call_native(frame, native, ArgValues::from(args), Some(entry));
                frame.instance_scope.truncate(depth);
                result?;
            }
        }
        object.borrow_mut().initialized = true;
        Ok(Value::Object(object))
    }
}
