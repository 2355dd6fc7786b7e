//! Implementation of the instance_*() builtin functions.

use tracing::debug;

use crate::{
    args::ArgValues,
    bytecode::Scope,
    exception::{ErrorKind, RunResult, VmError},
    frame::Frame,
    namespace::ScopeEntry,
    value::{InstanceId, Value},
    world::World,
};

/// Validates an object index argument. The upper bound is inclusive, which
/// the runtime has always accepted.
fn object_arg(world: &World, frame: &Frame, function: &str, value: &Value) -> RunResult<i64> {
    let Some(index) = value.as_i64().filter(|_| value.is_numeric()) else {
        return Err(VmError::argument_types(frame, function));
    };
    let count = i64::try_from(world.object_count()).unwrap_or(i64::MAX);
    if index < 0 || index > count {
        return Err(VmError::runtime(
            frame,
            ErrorKind::InvalidArgument,
            format!("[{function}] object {value} is out-of-bounds"),
        ));
    }
    Ok(index)
}

/// Implementation of the instance_exists() builtin function.
///
/// Takes an object index, or an instance handle which is checked directly.
pub(super) fn builtin_instance_exists(world: &World, frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg(frame, "instance_exists")?;
    if let Value::Instance(id) = value {
        return Ok(Value::Bool(world.instance(id).is_some()));
    }
    let index = object_arg(world, frame, "instance_exists", &value)?;
    Ok(Value::Bool(
        world
            .instances()
            .values()
            .any(|instance| i64::from(instance.object_index) == index),
    ))
}

/// Implementation of the instance_number() builtin function.
///
/// `all` (-3) counts every live instance.
pub(super) fn builtin_instance_number(world: &World, frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg(frame, "instance_number")?;
    let all = i64::from(i32::from(Scope::All));
    let count = if value.is_numeric() && value.as_i64() == Some(all) {
        world.instances().len()
    } else {
        let index = object_arg(world, frame, "instance_number", &value)?;
        world
            .instances()
            .values()
            .filter(|instance| i64::from(instance.object_index) == index)
            .count()
    };
    Ok(Value::Int32(i32::try_from(count).unwrap_or(i32::MAX)))
}

/// Implementation of the instance_create_depth() builtin function.
///
/// `instance_create_depth(x, y, depth, obj[, vars])` spawns an instance and
/// seeds its position variables. The optional struct's variables are copied
/// onto the new instance. No events run.
pub(super) fn builtin_instance_create_depth(world: &mut World, frame: &Frame, args: ArgValues) -> RunResult<Value> {
    let args = args.into_vec();
    if args.len() != 4 && args.len() != 5 {
        return Err(VmError::argument_count(frame, "instance_create_depth"));
    }
    if args.iter().any(Value::is_undefined) {
        return Err(VmError::argument_types(frame, "instance_create_depth"));
    }
    let object_index = args[3]
        .as_i64()
        .filter(|index| usize::try_from(*index).is_ok_and(|index| index < world.object_count()))
        .and_then(|index| i32::try_from(index).ok())
        .ok_or_else(|| {
            VmError::runtime(
                frame,
                ErrorKind::InvalidArgument,
                "[instance_create_depth] game object out-of-bounds",
            )
        })?;
    let (Some(x), Some(y), Some(depth)) = (args[0].as_f64(), args[1].as_f64(), args[2].as_f64()) else {
        return Err(VmError::argument_types(frame, "instance_create_depth"));
    };

    let id = world.create_instance(object_index);
    let Some(instance) = world.instance_mut(id) else {
        return Err(VmError::internal(
            frame,
            ErrorKind::UnknownScope,
            format!("instance {id} vanished after creation"),
        ));
    };
    for (name, value) in [("x", x), ("y", y), ("xstart", x), ("ystart", y), ("depth", depth)] {
        instance.variables.insert(name.into(), Value::Double(value));
    }
    if let Some(Value::Object(vars)) = args.get(4) {
        for (name, value) in &vars.borrow().variables {
            instance.variables.insert(name.clone(), value.clone());
        }
    }
    Ok(Value::Instance(id))
}

/// Implementation of the instance_destroy() builtin function.
///
/// Without arguments the calling instance is destroyed. With one, every
/// instance whose id or object index matches is.
pub(super) fn builtin_instance_destroy(
    world: &mut World,
    frame: &Frame,
    args: ArgValues,
    receiver: Option<ScopeEntry>,
) -> RunResult<Value> {
    let doomed: Vec<InstanceId> = match args {
        ArgValues::Zero => receiver
            .as_ref()
            .or_else(|| frame.instance_scope.last())
            .and_then(ScopeEntry::instance_id)
            .into_iter()
            .collect(),
        ArgValues::One(target) => {
            let target = match target {
                Value::Instance(id) => i64::from(id),
                number if number.is_numeric() => number
                    .as_i64()
                    .ok_or_else(|| VmError::argument_types(frame, "instance_destroy"))?,
                _ => return Err(VmError::argument_types(frame, "instance_destroy")),
            };
            world
                .instances()
                .values()
                .filter(|instance| i64::from(instance.id) == target || i64::from(instance.object_index) == target)
                .map(|instance| instance.id)
                .collect()
        }
        _ => return Err(VmError::argument_count(frame, "instance_destroy")),
    };
    for id in doomed {
        world.destroy_instance(id);
        debug!(id, "instance destroyed");
    }
    Ok(Value::Undefined)
}
