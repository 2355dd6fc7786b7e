//! Loads, stores, stack shuffles and instance-scope handling for the VM.

use std::rc::Rc;

use super::Vm;
use crate::{
    bytecode::{
        instruction::{Instruction, Operand, VariableOperand},
        op::{BreakKind, DataType, ReferenceKind, Scope},
    },
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    namespace::ScopeEntry,
    normalize::{ensure_native, size_of},
    scope::{get_variable, set_variable},
    value::{ArrayKind, Binding, Callable, GmlArray, Value, VariableReference},
    world::World,
};

fn missing_operand(frame: &Frame, inst: &Instruction) -> VmError {
    VmError::internal(
        frame,
        ErrorKind::TypeMismatch,
        format!("{inst} does not carry a variable operand"),
    )
}

/// Integer scope values accepted by a `[stacktop]` store.
fn integer_scope(value: &Value) -> Option<i64> {
    match value {
        Value::Int16(_) | Value::Int32(_) | Value::Int64(_) | Value::UInt32(_) => value.as_i64(),
        _ => None,
    }
}

/// Converts a popped scope operand into a [`Scope`].
fn scope_from_value(frame: &Frame, value: &Value) -> RunResult<Scope> {
    let raw = match value {
        Value::Instance(id) => i64::from(*id),
        other => other
            .as_i64()
            .filter(|_| other.is_numeric())
            .ok_or_else(|| {
                VmError::internal(
                    frame,
                    ErrorKind::UnknownScope,
                    format!("unknown scope value of type {}", other.type_name()),
                )
            })?,
    };
    let raw = i32::try_from(raw)
        .map_err(|_| VmError::internal(frame, ErrorKind::UnknownScope, format!("unknown scope {raw}")))?;
    Ok(Scope::from(raw))
}

/// Turns a popped target into an instance-scope entry: instances and objects
/// directly, numbers through the instance table.
fn entry_for(world: &World, frame: &Frame, value: &Value) -> RunResult<Option<ScopeEntry>> {
    Ok(match value {
        Value::Undefined => None,
        Value::Instance(id) => Some(ScopeEntry::Instance(*id)),
        Value::Object(object) => Some(ScopeEntry::Object(object.clone())),
        number if number.is_numeric() => {
            let id = number.as_i64().unwrap_or_default();
            let instance = world
                .find_instance(id)
                .ok_or_else(|| VmError::internal(frame, ErrorKind::UnknownScope, format!("unknown scope {id}")))?;
            Some(ScopeEntry::Instance(instance))
        }
        other => {
            return Err(VmError::internal(
                frame,
                ErrorKind::UnknownScope,
                format!("{} is not an instance", other.type_name()),
            ))
        }
    })
}

/// Reads `name` under `scope` with `entry` temporarily on top of the
/// instance-scope stack. The entry is removed again even on error.
pub(super) fn read_through(
    world: &World,
    frame: &mut Frame,
    entry: ScopeEntry,
    scope: Scope,
    name: &str,
) -> RunResult<Value> {
    frame.push_scope(entry);
    let result = get_variable(world, frame, scope, name);
    frame.pop_scope();
    result
}

impl Vm<'_> {
    // ========================================================================
    // Loads
    // ========================================================================

    pub(super) fn op_push(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        if inst.type1 != DataType::Variable {
            let value = self.immediate(frame, inst)?;
            frame.push(value);
            return Ok(());
        }
        let var = inst.variable().ok_or_else(|| missing_operand(frame, inst))?;
        let reference = self.variable_reference(frame, inst, var)?;
        frame.push(Value::Reference(Rc::new(reference)));
        Ok(())
    }

    fn immediate(&self, frame: &Frame, inst: &Instruction) -> RunResult<Value> {
        Ok(match (&inst.operand, inst.type1) {
            (Operand::Double(v), DataType::Double) => Value::Double(*v),
            (Operand::Float(v), DataType::Float) => Value::Float(*v),
            (Operand::Int32(v), DataType::Int32) => Value::Int32(*v),
            (Operand::Function(name), DataType::Int32) => {
                let callable = self
                    .world
                    .function(name)
                    .cloned()
                    .unwrap_or_else(|| Callable::Script(name.clone()));
                Value::Function(callable)
            }
            (Operand::Int64(v), DataType::Int64) => Value::Int64(*v),
            (Operand::UInt32(v), DataType::UnsignedInt) => Value::UInt32(*v),
            (Operand::Int16(v), DataType::Int16) => Value::Int16(*v),
            (Operand::Bool(v), DataType::Boolean) => Value::Bool(*v),
            (Operand::String(s), DataType::String) => Value::String(s.clone()),
            (_, DataType::Undefined) => Value::Undefined,
            _ => {
                return Err(VmError::internal(
                    frame,
                    ErrorKind::UnknownDataType,
                    format!("{inst}: operand does not match DataType.{}", inst.type1),
                ))
            }
        })
    }

    /// Builds the reference pushed by `push.v`.
    ///
    /// Array references take their index and scope from the stack. Stacktop
    /// references read the variable out of the instance popped from the stack
    /// straight away. A plain reference to a variable of a statically known
    /// object is resolved through that object's first instance when it can be.
    fn variable_reference(
        &mut self,
        frame: &mut Frame,
        inst: &Instruction,
        var: &VariableOperand,
    ) -> RunResult<VariableReference> {
        let mut binding = Binding {
            name: var.name.clone(),
            scope: var.scope,
        };

        if var.kind == ReferenceKind::Array {
            let index = frame.pop()?;
            let index = ensure_native(self.world, frame, index)?;
            let scope = frame.pop()?;
            let scope = ensure_native(self.world, frame, scope)?;
            binding.scope = scope_from_value(frame, &scope)?;
            return Ok(VariableReference::Unresolved {
                binding,
                kind: ReferenceKind::Array,
                index: Some(index),
            });
        }

        let fetch = var.kind == ReferenceKind::StackTop || inst.instance_type == Scope::Stacktop;
        if fetch {
            let target = frame.pop()?;
            let target = ensure_native(self.world, frame, target)?;
            let value = match &target {
                Value::Instance(_) | Value::Object(_) => target.clone(),
                number if number.is_numeric() => {
                    let raw = number.as_i64().unwrap_or_default();
                    let entry = if raw == i64::from(Scope::STACKTOP_MARKER) {
                        let instance = frame.pop()?;
                        let instance = ensure_native(self.world, frame, instance)?;
                        match entry_for(self.world, frame, &instance)? {
                            Some(entry) => entry,
                            None => {
                                return Err(VmError::internal(
                                    frame,
                                    ErrorKind::UnknownScope,
                                    "undefined is not an instance",
                                ))
                            }
                        }
                    } else {
                        let id = self.world.find_instance(raw).ok_or_else(|| {
                            VmError::internal(frame, ErrorKind::UnknownScope, format!("unknown scope {raw}"))
                        })?;
                        ScopeEntry::Instance(id)
                    };
                    read_through(self.world, frame, entry, binding.scope, &binding.name)?
                }
                other => {
                    return Err(VmError::internal(
                        frame,
                        ErrorKind::UnknownScope,
                        format!("unknown scope value of type {}", other.type_name()),
                    ))
                }
            };
            return Ok(VariableReference::Resolved {
                value,
                origin: Some(binding),
            });
        }

        if let Some(value) = self.static_object_value(frame, inst, var)? {
            return Ok(VariableReference::Resolved {
                value,
                origin: Some(binding),
            });
        }
        Ok(VariableReference::Unresolved {
            binding,
            kind: var.kind,
            index: None,
        })
    }

    /// Reads `var` from the first instance of the object the instruction's
    /// instance type names, when the compiler assigned the variable a slot.
    fn static_object_value(
        &self,
        frame: &Frame,
        inst: &Instruction,
        var: &VariableOperand,
    ) -> RunResult<Option<Value>> {
        if var.kind != ReferenceKind::Normal || inst.type2 == DataType::Variable || var.var_id < 0 {
            return Ok(None);
        }
        let Some(object_index) = inst.instance_type.object_index() else {
            return Ok(None);
        };
        if usize::try_from(object_index).map_or(true, |index| index >= self.world.object_count()) {
            return Ok(None);
        }
        let stored = self
            .world
            .first_instance_of(object_index)
            .and_then(|id| self.world.instance(id))
            .and_then(|instance| instance.variables.get(&var.name))
            .cloned();
        stored.map(|value| ensure_native(self.world, frame, value)).transpose()
    }

    pub(super) fn op_push_local(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let var = inst.variable().ok_or_else(|| missing_operand(frame, inst))?;
        let value = frame
            .locals
            .get(&var.name)
            .cloned()
            .ok_or_else(|| VmError::undefined_variable(frame, "local", &var.name))?;
        let value = match value {
            Value::Reference(_) => value,
            other => Value::Reference(Rc::new(VariableReference::Resolved {
                value: other,
                origin: Some(Binding {
                    name: var.name.clone(),
                    scope: Scope::Local,
                }),
            })),
        };
        frame.push(value);
        Ok(())
    }

    pub(super) fn op_push_global(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let var = inst.variable().ok_or_else(|| missing_operand(frame, inst))?;
        let value = self
            .world
            .global(&var.name)
            .cloned()
            .ok_or_else(|| VmError::undefined_variable(frame, "global", &var.name))?;
        frame.push(value);
        Ok(())
    }

    pub(super) fn op_push_builtin(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let var = inst.variable().ok_or_else(|| missing_operand(frame, inst))?;
        let value = get_variable(self.world, frame, Scope::Builtin, &var.name)?;
        frame.push(value);
        Ok(())
    }

    pub(super) fn op_push_int16(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let value = match &inst.operand {
            Operand::Int16(v) => Value::Int16(*v),
            _ => {
                return Err(VmError::internal(
                    frame,
                    ErrorKind::UnknownDataType,
                    format!("{inst}: pushi expects a 16-bit immediate"),
                ))
            }
        };
        frame.push(value);
        Ok(())
    }

    // ========================================================================
    // Stores
    // ========================================================================

    pub(super) fn op_pop(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let var = inst.variable().ok_or_else(|| missing_operand(frame, inst))?;
        let name = var.name.clone();
        let fetch = match var.kind {
            ReferenceKind::Array => return self.pop_array_element(frame, &name),
            ReferenceKind::StackTop => true,
            ReferenceKind::Normal => inst.type1 == DataType::Variable && inst.instance_type == Scope::Stacktop,
        };
        let raw = frame.pop()?;
        let value = ensure_native(self.world, frame, raw.clone())?;

        if !fetch {
            let scope = match &raw {
                Value::Reference(reference) if inst.type1 != DataType::Variable => {
                    reference.binding().map_or(Scope::Undefined, |binding| binding.scope)
                }
                _ => inst.instance_type,
            };
            return set_variable(self.world, frame, scope, &name, value);
        }

        // [stacktop] store: the scope is either the value just popped or the
        // next stack entry, and the stored value sits below it.
        let (scope_value, scope) = if raw.is_numeric() && inst.type1 == DataType::Variable {
            let scope = raw.as_i64();
            (raw, scope)
        } else {
            let popped = frame.pop()?;
            let popped = ensure_native(self.world, frame, popped)?;
            let scope = integer_scope(&popped);
            (popped, scope)
        };
        let scope = scope
            .filter(|scope| *scope <= -1 && *scope != -999)
            .ok_or_else(|| {
                VmError::internal(frame, ErrorKind::UnknownScope, format!("unknown scope {scope_value}"))
            })?;

        let (stored, receiver) = if inst.type1 == DataType::Variable {
            let first = frame.pop()?;
            let first = ensure_native(self.world, frame, first)?;
            if matches!(first, Value::Instance(_)) {
                let stored = frame.pop()?;
                (ensure_native(self.world, frame, stored)?, first)
            } else {
                (first, Value::Undefined)
            }
        } else {
            let receiver = frame.pop()?;
            (value, ensure_native(self.world, frame, receiver)?)
        };

        let entry = entry_for(self.world, frame, &receiver)?;
        let pushed = entry.is_some();
        if let Some(entry) = entry {
            frame.push_scope(entry);
        }
        let target = if scope == -1 && frame.instance_scope.is_empty() {
            Scope::Undefined
        } else {
            Scope::from(i32::try_from(scope).unwrap_or(i32::MIN))
        };
        let result = set_variable(self.world, frame, target, &name, stored);
        if pushed {
            frame.pop_scope();
        }
        result
    }

    /// `pop.v [array]scope.name`: pops index, scope and value, in that order.
    fn pop_array_element(&mut self, frame: &mut Frame, name: &str) -> RunResult<()> {
        let index = frame.pop()?;
        let index = ensure_native(self.world, frame, index)?;
        let scope = frame.pop()?;
        let scope = ensure_native(self.world, frame, scope)?;
        let scope = scope_from_value(frame, &scope)?;
        let value = frame.pop()?;
        let value = ensure_native(self.world, frame, value)?;

        let index = index.as_i64().ok_or_else(|| {
            VmError::runtime(
                frame,
                ErrorKind::TypeMismatch,
                format!("array index of type {} is not a number", index.type_name()),
            )
        })?;
        let index = usize::try_from(index).map_err(|_| {
            VmError::runtime(frame, ErrorKind::IndexOutOfRange, format!("negative array index {index}"))
        })?;

        let owner = self.world.array_owner_id;
        let container = match get_variable(self.world, frame, scope, name) {
            Ok(container) => container,
            Err(err) if err.kind() == ErrorKind::UndefinedVariable => {
                let created = Value::Array(GmlArray::owned(ArrayKind::List, Vec::new(), owner));
                set_variable(self.world, frame, scope, name, created.clone())?;
                created
            }
            Err(err) => return Err(err),
        };
        let array = match container {
            Value::Array(array) => array,
            Value::Undefined => {
                return Err(VmError::runtime(frame, ErrorKind::NullArray, format!("array is null! {name}")))
            }
            other => {
                return Err(VmError::runtime(
                    frame,
                    ErrorKind::TypeMismatch,
                    format!("{name} is a {}, not an array", other.type_name()),
                ))
            }
        };

        let (kind, len, array_owner) = {
            let array = array.borrow();
            (array.kind, array.items.len(), array.owner)
        };
        if kind == ArrayKind::Fixed && index >= len {
            return Err(VmError::runtime(
                frame,
                ErrorKind::IndexOutOfRange,
                format!("invalid index {index} with fixed size array (with length {len})"),
            ));
        }
        // a store from another owner writes into a private copy
        let array = if self.world.config().array_copy_on_write && array_owner != Some(owner) {
            let copy = GmlArray::owned(kind, array.borrow().items.clone(), owner);
            set_variable(self.world, frame, scope, name, Value::Array(copy.clone()))?;
            copy
        } else {
            array
        };

        let mut array = array.borrow_mut();
        if array.items.len() <= index {
            array.items.resize(index + 1, Value::Undefined);
        }
        array.items[index] = value;
        Ok(())
    }

    // ========================================================================
    // Stack shuffles
    // ========================================================================

    /// Pops entries until `bytes` worth of slots have been consumed.
    fn pop_run(frame: &mut Frame, bytes: usize) -> RunResult<Vec<Value>> {
        let mut remaining = bytes;
        let mut run = Vec::new();
        while remaining > 0 {
            let value = frame.pop()?;
            remaining = remaining.saturating_sub(size_of(frame, value.data_type())?);
            run.push(value);
        }
        Ok(run)
    }

    /// `dup.t extra [swap]`.
    ///
    /// With no swap byte, the top `(extra + 1)` slots of type `t` are
    /// duplicated. Otherwise the top `extra` slots are moved below the next
    /// `swap` slots, where `swap` is `(comparison & 0x7f) >> 3`.
    pub(super) fn op_dup(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        let slot = size_of(frame, inst.type1)?;
        let extra = usize::from(inst.extra);
        if inst.comparison == 0 {
            let run = Self::pop_run(frame, slot * (extra + 1))?;
            for _ in 0..2 {
                frame.stack.extend(run.iter().rev().cloned());
            }
            return Ok(());
        }
        let top = Self::pop_run(frame, slot * extra)?;
        let bottom = Self::pop_run(frame, slot * usize::from((inst.comparison & 0x7f) >> 3))?;
        frame.stack.extend(top.into_iter().rev());
        frame.stack.extend(bottom.into_iter().rev());
        Ok(())
    }

    // ========================================================================
    // Instance scope
    // ========================================================================

    /// Enters a `with` block on the popped target. Returns true when the
    /// target matched nothing and the block must be skipped.
    pub(super) fn op_push_env(&mut self, frame: &mut Frame) -> RunResult<bool> {
        let target = frame.pop()?;
        let target = ensure_native(self.world, frame, target)?;
        let entries = &frame.instance_scope;
        let entry = match &target {
            Value::Undefined => ScopeEntry::Noone,
            Value::Instance(id) => ScopeEntry::Instance(*id),
            Value::Object(object) => ScopeEntry::Object(object.clone()),
            number if number.is_numeric() => {
                let raw = number.as_i64().unwrap_or_default();
                self.env_entry(entries, raw)
            }
            other => {
                return Err(VmError::internal(
                    frame,
                    ErrorKind::TypeMismatch,
                    format!("cannot enter the scope of a {}", other.type_name()),
                ))
            }
        };
        let skip = entry == ScopeEntry::Noone;
        frame.push_scope(entry);
        Ok(skip)
    }

    /// Entry selected by a numeric `with` target.
    fn env_entry(&self, entries: &[ScopeEntry], raw: i64) -> ScopeEntry {
        let scope = i32::try_from(raw).map_or(Scope::Noone, Scope::from);
        match scope {
            Scope::This => entries.last().cloned().unwrap_or(ScopeEntry::Noone),
            Scope::Other => entries
                .len()
                .checked_sub(2)
                .and_then(|i| entries.get(i))
                .cloned()
                .unwrap_or(ScopeEntry::Noone),
            Scope::All => self
                .world
                .instances()
                .keys()
                .next()
                .map_or(ScopeEntry::Noone, |id| ScopeEntry::Instance(*id)),
            Scope::Undefined | Scope::Id(_) => self
                .world
                .find_instance(raw)
                .map_or(ScopeEntry::Noone, ScopeEntry::Instance),
            _ => ScopeEntry::Noone,
        }
    }

    pub(super) fn op_break(&mut self, frame: &mut Frame, inst: &Instruction) -> RunResult<()> {
        match BreakKind::from_repr(inst.extended) {
            Some(BreakKind::SetOwner) => {
                let owner = frame.pop()?;
                let owner = ensure_native(self.world, frame, owner)?;
                self.world.array_owner_id = owner.as_i64().ok_or_else(|| {
                    VmError::internal(
                        frame,
                        ErrorKind::TypeMismatch,
                        format!("array owner of type {} is not a number", owner.type_name()),
                    )
                })?;
            }
            Some(BreakKind::IsStaticOk) => frame.push(Value::Bool(frame.is_static_ok)),
            Some(BreakKind::SetStatic) => frame.is_static_ok = true,
            None => {
                return Err(VmError::internal(
                    frame,
                    ErrorKind::UnknownOpcode,
                    format!("unknown extended kind {}", inst.extended),
                ))
            }
        }
        Ok(())
    }
}
