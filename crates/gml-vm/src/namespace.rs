use std::rc::Rc;

use ahash::AHashMap;

use crate::value::{InstanceId, ObjectRef, Value};

/// Named variable table used for every scope.
pub type Variables = AHashMap<Rc<str>, Value>;

/// A live instance of an object class.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub object_index: i32,
    pub variables: Variables,
}

impl Instance {
    /// Creates an instance whose `id` variable mirrors its identifier.
    #[must_use]
    pub fn new(id: InstanceId, object_index: i32) -> Self {
        let mut variables = Variables::default();
        variables.insert("id".into(), Value::Instance(id));
        Self {
            id,
            object_index,
            variables,
        }
    }
}

/// One entry of a frame's instance-scope stack.
#[derive(Debug, Clone)]
pub enum ScopeEntry {
    /// A live instance, by id.
    Instance(InstanceId),
    /// A constructed object, possibly still under construction.
    Object(ObjectRef),
    /// A `with` block whose target matched nothing.
    Noone,
}

impl ScopeEntry {
    /// The value a script sees for this entry through `self`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Instance(id) => Value::Instance(*id),
            Self::Object(object) => Value::Object(object.clone()),
            Self::Noone => Value::Undefined,
        }
    }

    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            Self::Instance(id) => Some(*id),
            _ => None,
        }
    }

    /// Deep-copies constructed objects so the entry can be frozen into a snapshot.
    #[must_use]
    pub fn frozen(&self, depth: usize) -> Self {
        match self.to_value().deep_copy(depth) {
            Value::Object(object) => Self::Object(object),
            _ => self.clone(),
        }
    }
}

impl PartialEq for ScopeEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Instance(a), Self::Instance(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Noone, Self::Noone) => true,
            _ => false,
        }
    }
}
