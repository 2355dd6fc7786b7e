//! Scope resolution: reading and writing a named variable under a [`Scope`].
//!
//! A missing *variable* is a `Runtime` error, since the script is at fault.
//! A scope that cannot be resolved at all (an empty or too small instance-scope
//! stack) is `RunnerInternal`, since well-formed bytecode never produces one.

use std::rc::Rc;

use crate::{
    bytecode::Scope,
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    namespace::ScopeEntry,
    value::Value,
    world::World,
};

/// Static tables are keyed by the innermost running function.
fn static_key(frame: &Frame) -> Rc<str> {
    frame.current_function().cloned().unwrap_or_else(|| Rc::from(""))
}

fn scope_entry<'f>(frame: &'f Frame, scope: Scope) -> RunResult<&'f ScopeEntry> {
    let entries = &frame.instance_scope;
    let entry = match scope {
        Scope::Other => {
            if entries.len() < 2 {
                return Err(VmError::internal(
                    frame,
                    ErrorKind::ScopeTooSmall,
                    "[Scope::Other] instance scope is too small",
                ));
            }
            entries.get(entries.len() - 2)
        }
        Scope::Stacktop => entries.first(),
        _ => entries.last(),
    };
    entry.ok_or_else(|| VmError::internal(frame, ErrorKind::ScopeEmpty, format!("[Scope::{scope:?}] instance scope is empty")))
}

fn read_entry(world: &World, frame: &Frame, entry: &ScopeEntry, name: &str) -> RunResult<Value> {
    let found = match entry {
        ScopeEntry::Instance(id) => {
            let instance = world
                .instance(*id)
                .ok_or_else(|| VmError::runtime(frame, ErrorKind::UnknownScope, format!("instance {id} does not exist")))?;
            instance.variables.get(name).cloned()
        }
        ScopeEntry::Object(object) => object.borrow().variables.get(name).cloned(),
        ScopeEntry::Noone => {
            return Err(VmError::internal(
                frame,
                ErrorKind::InvalidScope,
                "instance scope entry matched no instance",
            ))
        }
    };
    found.ok_or_else(|| VmError::undefined_variable(frame, &world.owner_name(entry), name))
}

fn write_entry(world: &mut World, frame: &Frame, entry: &ScopeEntry, name: &str, value: Value) -> RunResult<()> {
    match entry {
        ScopeEntry::Instance(id) => {
            let instance = world
                .instance_mut(*id)
                .ok_or_else(|| VmError::runtime(frame, ErrorKind::UnknownScope, format!("instance {id} does not exist")))?;
            instance.variables.insert(name.into(), value);
        }
        ScopeEntry::Object(object) => {
            object.borrow_mut().variables.insert(name.into(), value);
        }
        ScopeEntry::Noone => {
            return Err(VmError::internal(
                frame,
                ErrorKind::InvalidScope,
                "instance scope entry matched no instance",
            ))
        }
    }
    Ok(())
}

fn unknown_scope(frame: &Frame, id: i32) -> VmError {
    VmError::runtime(frame, ErrorKind::UnknownScope, format!("unknown scope {id}"))
}

/// Reads `name` under `scope`.
pub fn get_variable(world: &World, frame: &Frame, scope: Scope, name: &str) -> RunResult<Value> {
    match scope {
        Scope::Undefined | Scope::Global => world
            .globals
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::undefined_variable(frame, "global", name)),
        Scope::This | Scope::Other | Scope::Stacktop => {
            let entry = scope_entry(frame, scope)?;
            read_entry(world, frame, entry, name)
        }
        Scope::All | Scope::Noone => Err(VmError::runtime(
            frame,
            ErrorKind::InvalidScope,
            format!("cannot read {name} from scope {scope}"),
        )),
        Scope::Builtin | Scope::Arg => frame
            .local_builtins
            .get(name)
            .or_else(|| world.builtins.get(name))
            .cloned()
            .ok_or_else(|| VmError::undefined_variable(frame, "builtin", name)),
        Scope::Local => frame
            .locals
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::undefined_variable(frame, "temporal", name)),
        Scope::Static => world
            .statics
            .get(&static_key(frame))
            .and_then(|vars| vars.get(name))
            .cloned()
            .ok_or_else(|| VmError::undefined_variable(frame, "static", name)),
        Scope::Id(id) => {
            let instance = world
                .find_instance(i64::from(id))
                .ok_or_else(|| unknown_scope(frame, id))?;
            read_entry(world, frame, &ScopeEntry::Instance(instance), name)
        }
    }
}

/// Writes `name` under `scope`, creating the variable when missing.
pub fn set_variable(world: &mut World, frame: &mut Frame, scope: Scope, name: &str, value: Value) -> RunResult<()> {
    match scope {
        Scope::Undefined | Scope::Global => {
            world.globals.insert(name.into(), value);
        }
        Scope::This | Scope::Other | Scope::Stacktop => {
            let entry = scope_entry(frame, scope)?.clone();
            write_entry(world, frame, &entry, name, value)?;
        }
        Scope::All => {
            for instance in world.instances.values_mut() {
                instance.variables.insert(name.into(), value.clone());
            }
        }
        Scope::Noone | Scope::Arg => {
            return Err(VmError::runtime(
                frame,
                ErrorKind::InvalidScope,
                format!("cannot write {name} to scope {scope}"),
            ))
        }
        Scope::Builtin => {
            world.builtins.insert(name.into(), value);
        }
        Scope::Local => {
            frame.locals.insert(name.into(), value);
        }
        Scope::Static => {
            world
                .statics
                .entry(static_key(frame))
                .or_default()
                .insert(name.into(), value);
        }
        Scope::Id(id) => {
            let instance = world
                .find_instance(i64::from(id))
                .ok_or_else(|| unknown_scope(frame, id))?;
            write_entry(world, frame, &ScopeEntry::Instance(instance), name, value)?;
        }
    }
    Ok(())
}
