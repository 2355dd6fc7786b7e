use std::{cell::RefCell, fmt, rc::Rc};

use ahash::AHashSet;

use crate::{
    args::ArgValues,
    bytecode::{DataType, ReferenceKind, Scope, Vm},
    exception::RunResult,
    frame::Frame,
    namespace::{ScopeEntry, Variables},
};

/// Identifier of a live instance.
pub type InstanceId = u32;

/// Shared handle to an array value; arrays alias unless copy-on-write splits them.
pub type ArrayRef = Rc<RefCell<GmlArray>>;

/// Shared handle to a constructed object.
pub type ObjectRef = Rc<RefCell<ConstructedObject>>;

/// Primary value type of the VM.
///
/// Scalars are stored inline. Arrays and constructed objects are shared through
/// `Rc<RefCell<_>>` so that storing one into a second variable aliases it, the
/// way the language expects.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Undefined,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Float(f32),
    Double(f64),
    String(Rc<str>),
    /// Deferred variable handle, see [`VariableReference`].
    Reference(Rc<VariableReference>),
    Array(ArrayRef),
    /// A live instance, by id.
    Instance(InstanceId),
    /// A variable bag produced by a constructor call.
    Object(ObjectRef),
    Function(Callable),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    /// A fixed-length array holding `items`.
    #[must_use]
    pub fn fixed_array(items: Vec<Value>) -> Self {
        Self::Array(GmlArray::new(ArrayKind::Fixed, items))
    }

    /// A growable list holding `items`.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::Array(GmlArray::new(ArrayKind::List, items))
    }

    /// A reference that already holds its final value.
    #[must_use]
    pub fn resolved(value: Value) -> Self {
        Self::Reference(Rc::new(VariableReference::Resolved { value, origin: None }))
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int16(_) | Self::Int32(_) | Self::Int64(_) | Self::UInt32(_) | Self::Float(_) | Self::Double(_)
        )
    }

    /// The numeric value as `f64`, for numbers and booleans.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        Some(match self {
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Int16(v) => f64::from(*v),
            Self::Int32(v) => f64::from(*v),
            Self::Int64(v) => *v as f64,
            Self::UInt32(v) => f64::from(*v),
            Self::Float(v) => f64::from(*v),
            Self::Double(v) => *v,
            _ => return None,
        })
    }

    /// The numeric value truncated to `i64`, for numbers and booleans.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        Some(match self {
            Self::Bool(b) => i64::from(*b),
            Self::Int16(v) => i64::from(*v),
            Self::Int32(v) => i64::from(*v),
            Self::Int64(v) => *v,
            Self::UInt32(v) => i64::from(*v),
            Self::Float(v) => *v as i64,
            Self::Double(v) => *v as i64,
            _ => return None,
        })
    }

    /// The encoded data type this value naturally occupies on the stack.
    ///
    /// Every non-scalar shares the 16-byte `Variable` slot.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Boolean,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt32(_) => DataType::UnsignedInt,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::Undefined
            | Self::Reference(_)
            | Self::Array(_)
            | Self::Instance(_)
            | Self::Object(_)
            | Self::Function(_) => DataType::Variable,
        }
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "bool",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::UInt32(_) => "uint32",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Reference(_) => "reference",
            Self::Array(_) => "array",
            Self::Instance(_) => "instance",
            Self::Object(_) => "struct",
            Self::Function(_) => "function",
        }
    }

    /// Copies arrays and constructed objects recursively down to `depth`
    /// levels, so the result shares no mutable state with `self` up to there.
    #[must_use]
    pub fn deep_copy(&self, depth: usize) -> Self {
        if depth == 0 {
            return self.clone();
        }
        match self {
            Self::Array(array) => {
                let array = array.borrow();
                let items = array.items.iter().map(|item| item.deep_copy(depth - 1)).collect();
                Self::Array(Rc::new(RefCell::new(GmlArray {
                    kind: array.kind,
                    items,
                    owner: array.owner,
                })))
            }
            Self::Object(object) => {
                let object = object.borrow();
                let variables = object
                    .variables
                    .iter()
                    .map(|(name, value)| (name.clone(), value.deep_copy(depth - 1)))
                    .collect();
                Self::Object(Rc::new(RefCell::new(ConstructedObject {
                    variables,
                    initialized: object.initialized,
                })))
            }
            Self::Reference(reference) => match &**reference {
                VariableReference::Resolved { value, origin } => {
                    Self::Reference(Rc::new(VariableReference::Resolved {
                        value: value.deep_copy(depth - 1),
                        origin: origin.clone(),
                    }))
                }
                VariableReference::Unresolved { .. } => self.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int16(a), Self::Int16(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::UInt32(a), Self::UInt32(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Reference(a), Self::Reference(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a.name() == b.name(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut AHashSet::new())
    }
}

/// Containers nested deeper than this print as a placeholder.
const DISPLAY_DEPTH: usize = 32;

/// Writes `value`. `open` holds the containers currently being written; one
/// reached again, or past `DISPLAY_DEPTH`, prints as `[...]` or `{ ... }`.
fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, open: &mut AHashSet<*const ()>) -> fmt::Result {
    let key = match value {
        Value::Undefined => return f.write_str("undefined"),
        Value::Bool(b) => return write!(f, "{b}"),
        Value::Int16(v) => return write!(f, "{v}"),
        Value::Int32(v) => return write!(f, "{v}"),
        Value::Int64(v) => return write!(f, "{v}"),
        Value::UInt32(v) => return write!(f, "{v}"),
        Value::Float(v) => return write!(f, "{v}"),
        Value::Double(v) => return write!(f, "{v}"),
        Value::String(s) => return f.write_str(s),
        Value::Reference(reference) => {
            return match &**reference {
                VariableReference::Resolved { value, .. } => write_value(f, value, open),
                VariableReference::Unresolved { binding, .. } => write!(f, "<ref {binding}>"),
            }
        }
        Value::Instance(id) => return write!(f, "{id}"),
        Value::Function(callable) => return write!(f, "function {}", callable.name()),
        Value::Array(array) => array.as_ptr().cast::<()>().cast_const(),
        Value::Object(object) => object.as_ptr().cast::<()>().cast_const(),
    };
    if open.contains(&key) || open.len() >= DISPLAY_DEPTH {
        return f.write_str(if matches!(value, Value::Array(_)) { "[...]" } else { "{ ... }" });
    }
    open.insert(key);
    let result = match value {
        Value::Array(array) => write_items(f, &array.borrow(), open),
        Value::Object(object) => write_fields(f, &object.borrow(), open),
        _ => Ok(()),
    };
    open.remove(&key);
    result
}

fn write_items(f: &mut fmt::Formatter<'_>, array: &GmlArray, open: &mut AHashSet<*const ()>) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in array.items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_value(f, item, open)?;
    }
    f.write_str("]")
}

fn write_fields(f: &mut fmt::Formatter<'_>, object: &ConstructedObject, open: &mut AHashSet<*const ()>) -> fmt::Result {
    let mut keys: Vec<_> = object.variables.keys().collect();
    keys.sort();
    f.write_str("{ ")?;
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{key} : ")?;
        write_value(f, &object.variables[key], open)?;
    }
    f.write_str(" }")
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.into())
    }
}

/// Whether an array has a fixed length or grows on out-of-range writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Fixed,
    List,
}

#[derive(Clone, PartialEq)]
pub struct GmlArray {
    pub kind: ArrayKind,
    pub items: Vec<Value>,
    /// Owner id current when bytecode created this array. Host-made arrays
    /// have none, so the first copy-on-write store always copies them.
    pub owner: Option<i64>,
}

impl GmlArray {
    #[must_use]
    pub fn new(kind: ArrayKind, items: Vec<Value>) -> ArrayRef {
        Rc::new(RefCell::new(Self { kind, items, owner: None }))
    }

    /// An array stamped with the copy-on-write owner that created it.
    #[must_use]
    pub fn owned(kind: ArrayKind, items: Vec<Value>, owner: i64) -> ArrayRef {
        Rc::new(RefCell::new(Self {
            kind,
            items,
            owner: Some(owner),
        }))
    }
}

impl fmt::Debug for GmlArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ", self.kind)?;
        write_items(f, self, &mut AHashSet::from_iter([std::ptr::from_ref(self).cast::<()>()]))
    }
}

/// Variable bag built by `@@NewGMLObject@@`.
#[derive(Clone, Default)]
pub struct ConstructedObject {
    pub variables: Variables,
    /// Set once the constructor body has returned.
    pub initialized: bool,
}

impl fmt::Debug for ConstructedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(f, self, &mut AHashSet::from_iter([std::ptr::from_ref(self).cast::<()>()]))?;
        if !self.initialized {
            f.write_str(" (constructing)")?;
        }
        Ok(())
    }
}

impl ConstructedObject {
    #[must_use]
    pub fn new_ref() -> ObjectRef {
        Rc::new(RefCell::new(Self::default()))
    }
}

/// A variable name paired with the scope it lives in.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: Rc<str>,
    pub scope: Scope,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope, self.name)
    }
}

/// Deferred handle to a named variable.
///
/// Resolution happens once, in the value normalizer, and never recurses
/// through a second reference.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableReference {
    /// The final value is already known. `origin` records where it was read
    /// from, when it came from a variable.
    Resolved { value: Value, origin: Option<Binding> },
    /// Must be fetched through the scope resolver before use.
    Unresolved {
        binding: Binding,
        kind: ReferenceKind,
        /// Element index for `Array` references.
        index: Option<Value>,
    },
}

impl VariableReference {
    #[must_use]
    pub fn binding(&self) -> Option<&Binding> {
        match self {
            Self::Resolved { origin, .. } => origin.as_ref(),
            Self::Unresolved { binding, .. } => Some(binding),
        }
    }
}

/// Signature of a host function callable from bytecode.
///
/// Receives the VM, the calling frame, the already normalized arguments and
/// the receiver the call was bound to, if any.
pub type NativeFn = dyn Fn(&mut Vm<'_>, &mut Frame, ArgValues, Option<ScopeEntry>) -> RunResult<Value>;

/// A named host function.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub call: Rc<NativeFn>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Something that can be invoked: a bytecode script or a host function.
#[derive(Debug, Clone)]
pub enum Callable {
    /// A code entry, by name.
    Script(Rc<str>),
    Native(NativeFunction),
}

impl Callable {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Script(name) => name,
            Self::Native(native) => &native.name,
        }
    }
}
