//! Process-wide interpreter state for one loaded program.
//!
//! Everything the GameMaker runner keeps in global tables lives here, owned
//! by one `World` value that is passed by reference into every call. Two
//! worlds never share state, so independent VMs can run side by side.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::{
    args::ArgValues,
    builtins,
    bytecode::{CodeEntry, Vm},
    exception::RunResult,
    frame::Frame,
    namespace::{Instance, ScopeEntry, Variables},
    value::{Callable, InstanceId, NativeFunction, Value},
};

/// First id handed out by [`World::create_instance`].
pub const FIRST_INSTANCE_ID: InstanceId = 100_000;

/// Tunable limits and behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum nested code-unit activations before a `CallDepthExceeded` error.
    pub max_call_depth: usize,
    /// Whether indexed array stores copy the array before writing.
    pub array_copy_on_write: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            array_copy_on_write: false,
        }
    }
}

/// Instances, keyed by id in creation order.
pub type Instances = IndexMap<InstanceId, Instance, ahash::RandomState>;

/// Global, builtin, static, function and instance tables of one program.
#[derive(Debug)]
pub struct World {
    pub(crate) globals: Variables,
    pub(crate) builtins: Variables,
    /// Static variables, one table per function name.
    pub(crate) statics: AHashMap<Rc<str>, Variables>,
    pub(crate) functions: AHashMap<Rc<str>, Callable>,
    pub(crate) instances: Instances,
    pub(crate) objects: Vec<Rc<str>>,
    pub(crate) code: AHashMap<Rc<str>, CodeEntry>,
    /// Owner id recorded by the `setowner` extended opcode.
    pub(crate) array_owner_id: i64,
    next_instance_id: InstanceId,
    config: VmConfig,
}

impl Default for World {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl World {
    /// Creates a world with the standard native library registered.
    #[must_use]
    pub fn new(config: VmConfig) -> Self {
        let mut builtins = Variables::default();
        builtins.insert("undefined".into(), Value::Undefined);
        let mut world = Self {
            globals: Variables::default(),
            builtins,
            statics: AHashMap::default(),
            functions: AHashMap::default(),
            instances: Instances::default(),
            objects: Vec::new(),
            code: AHashMap::default(),
            array_owner_id: 0,
            next_instance_id: FIRST_INSTANCE_ID,
            config,
        };
        builtins::register_all(&mut world);
        world
    }

    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut VmConfig {
        &mut self.config
    }

    // ========================================================================
    // Variables
    // ========================================================================

    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.into(), value);
    }

    #[must_use]
    pub fn globals(&self) -> &Variables {
        &self.globals
    }

    #[must_use]
    pub fn builtin(&self, name: &str) -> Option<&Value> {
        self.builtins.get(name)
    }

    pub fn set_builtin(&mut self, name: &str, value: Value) {
        self.builtins.insert(name.into(), value);
    }

    /// Static variables of `function`, if it ever stored one.
    #[must_use]
    pub fn statics(&self, function: &str) -> Option<&Variables> {
        self.statics.get(function)
    }

    #[must_use]
    pub fn array_owner_id(&self) -> i64 {
        self.array_owner_id
    }

    // ========================================================================
    // Objects and instances
    // ========================================================================

    /// Declares an object class and returns its index.
    pub fn define_object(&mut self, name: impl Into<Rc<str>>) -> i32 {
        self.objects.push(name.into());
        i32::try_from(self.objects.len() - 1).unwrap_or(i32::MAX)
    }

    #[must_use]
    pub fn object_index(&self, name: &str) -> Option<i32> {
        let index = self.objects.iter().position(|object| &**object == name)?;
        i32::try_from(index).ok()
    }

    #[must_use]
    pub fn object_name(&self, object_index: i32) -> Option<&str> {
        let index = usize::try_from(object_index).ok()?;
        self.objects.get(index).map(|name| &**name)
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Spawns an instance of `object_index` and returns its id.
    pub fn create_instance(&mut self, object_index: i32) -> InstanceId {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        self.instances.insert(id, Instance::new(id, object_index));
        debug!(id, object_index, "instance created");
        id
    }

    pub fn destroy_instance(&mut self, id: InstanceId) -> Option<Instance> {
        self.instances.shift_remove(&id)
    }

    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    #[must_use]
    pub fn instances(&self) -> &Instances {
        &self.instances
    }

    /// The earliest created live instance of `object_index`.
    #[must_use]
    pub fn first_instance_of(&self, object_index: i32) -> Option<InstanceId> {
        self.instances
            .values()
            .find(|instance| instance.object_index == object_index)
            .map(|instance| instance.id)
    }

    /// Resolves a numeric scope: an instance id, else the first instance of
    /// that object index.
    #[must_use]
    pub fn find_instance(&self, id_or_object: i64) -> Option<InstanceId> {
        if let Ok(id) = InstanceId::try_from(id_or_object) {
            if self.instances.contains_key(&id) {
                return Some(id);
            }
        }
        self.first_instance_of(i32::try_from(id_or_object).ok()?)
    }

    /// Object class name of a scope entry, for error messages.
    pub(crate) fn owner_name(&self, entry: &ScopeEntry) -> Rc<str> {
        match entry {
            ScopeEntry::Instance(id) => self
                .instances
                .get(id)
                .and_then(|instance| usize::try_from(instance.object_index).ok())
                .and_then(|index| self.objects.get(index).cloned())
                .unwrap_or_else(|| "instance".into()),
            ScopeEntry::Object(_) => "struct".into(),
            ScopeEntry::Noone => "noone".into(),
        }
    }

    // ========================================================================
    // Code and functions
    // ========================================================================

    pub fn register_code(&mut self, entry: CodeEntry) {
        self.code.insert(entry.name.clone(), entry);
    }

    #[must_use]
    pub fn code(&self, name: &str) -> Option<&CodeEntry> {
        self.code.get(name)
    }

    /// Exposes the code entry `name` as a callable script function.
    pub fn register_script(&mut self, name: impl Into<Rc<str>>) {
        let name = name.into();
        self.functions.insert(name.clone(), Callable::Script(name));
    }

    /// Registers a host function callable from bytecode by `name`.
    pub fn register_native<F>(&mut self, name: &str, call: F)
    where
        F: Fn(&mut Vm<'_>, &mut Frame, ArgValues, Option<ScopeEntry>) -> RunResult<Value> + 'static,
    {
        debug!(name, "native function registered");
        let name: Rc<str> = name.into();
        let native = NativeFunction {
            name: name.clone(),
            call: Rc::new(call),
        };
        self.functions.insert(name, Callable::Native(native));
    }

    pub fn register_function(&mut self, name: impl Into<Rc<str>>, callable: Callable) {
        self.functions.insert(name.into(), callable);
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Callable> {
        self.functions.get(name)
    }
}
