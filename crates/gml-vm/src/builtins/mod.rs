//! Native functions available to every [`World`].
//!
//! Each builtin lives in its own module. `BuiltinsFunctions` ties the runtime
//! name a script calls to its implementation, and [`register_all`] installs
//! every variant into the world's function table.

mod array_length;
mod event_inherited;
mod instance;
mod internal;
mod lerp;
mod method;
mod string;
mod variable_global;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    args::ArgValues,
    bytecode::Vm,
    exception::RunResult,
    frame::Frame,
    namespace::ScopeEntry,
    value::{ArrayKind, GmlArray, Value},
    world::World,
};

/// Enumerates every native function installed into a new world.
///
/// Uses strum derives so the variant maps to the exact name bytecode uses
/// in `call.i name(argc=N)`.
#[derive(Debug, Clone, Copy, Display, EnumString, EnumIter, IntoStaticStr, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinsFunctions {
    #[strum(serialize = "@@NewGMLObject@@")]
    NewGmlObject,
    #[strum(serialize = "@@NewGMLArray@@")]
    NewGmlArray,
    #[strum(serialize = "@@This@@")]
    This,
    #[strum(serialize = "@@NullObject@@")]
    NullObject,
    Method,
    VariableGlobalExists,
    VariableGlobalGet,
    VariableGlobalSet,
    ArrayLength,
    #[strum(serialize = "array_length_1d")]
    ArrayLength1d,
    String,
    StringCopy,
    StringPos,
    ShowDebugMessage,
    Lerp,
    InstanceExists,
    InstanceNumber,
    InstanceCreateDepth,
    InstanceDestroy,
    EventInherited,
}

impl BuiltinsFunctions {
    /// Executes the builtin with already normalized arguments.
    ///
    /// `receiver` is the instance or constructed object the call was made
    /// on, when there is one.
    fn call(
        self,
        vm: &mut Vm<'_>,
        frame: &mut Frame,
        args: ArgValues,
        receiver: Option<ScopeEntry>,
    ) -> RunResult<Value> {
        let name: &'static str = self.into();
        match self {
            Self::NewGmlObject => internal::builtin_new_object(vm, frame, args),
            Self::NewGmlArray => Ok(Value::Array(GmlArray::owned(
                ArrayKind::List,
                args.into_vec(),
                vm.world().array_owner_id(),
            ))),
            Self::This => internal::builtin_this(frame, &args),
            Self::NullObject => {
                args.check_zero_args(frame, name)?;
                Ok(Value::Undefined)
            }
            Self::Method => method::builtin_method(vm, frame, args),
            Self::VariableGlobalExists => variable_global::builtin_exists(vm.world(), frame, args),
            Self::VariableGlobalGet => variable_global::builtin_get(vm.world(), frame, args),
            Self::VariableGlobalSet => variable_global::builtin_set(vm.world_mut(), frame, args),
            Self::ArrayLength | Self::ArrayLength1d => array_length::builtin_array_length(frame, args, name),
            Self::String => string::builtin_string(frame, args),
            Self::StringCopy => string::builtin_string_copy(frame, args),
            Self::StringPos => string::builtin_string_pos(frame, args),
            Self::ShowDebugMessage => string::builtin_show_debug_message(vm, frame, args),
            Self::Lerp => lerp::builtin_lerp(frame, args),
            Self::InstanceExists => instance::builtin_instance_exists(vm.world(), frame, args),
            Self::InstanceNumber => instance::builtin_instance_number(vm.world(), frame, args),
            Self::InstanceCreateDepth => instance::builtin_instance_create_depth(vm.world_mut(), frame, args),
            Self::InstanceDestroy => instance::builtin_instance_destroy(vm.world_mut(), frame, args, receiver),
            Self::EventInherited => event_inherited::builtin_event_inherited(frame, &args),
        }
    }
}

/// Installs every [`BuiltinsFunctions`] variant into `world`.
pub(crate) fn register_all(world: &mut World) {
    for function in BuiltinsFunctions::iter() {
        world.register_native(function.into(), move |vm, frame, args, receiver| {
            function.call(vm, frame, args, receiver)
        });
    }
}
