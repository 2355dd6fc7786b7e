//! Opcode and operand-type definitions for the GameMaker instruction set.
//!
//! Discriminants follow the on-disk encoding of bytecode version 15 and later, so
//! a decoded byte converts straight into an [`Opcode`] or [`DataType`] through
//! `strum::FromRepr`.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, FromRepr, IntoStaticStr};

/// Instruction kind.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    // === Conversion & Arithmetic ===
    /// Convert top of stack from `type1` to `type2`.
    Conv = 0x07,
    Mul = 0x08,
    Div = 0x09,
    /// Integer remainder of a truncating division.
    Rem = 0x0A,
    /// Floating modulo; the divisor must not be zero.
    Mod = 0x0B,
    /// Numeric addition or string concatenation.
    Add = 0x0C,
    Sub = 0x0D,
    And = 0x0E,
    Or = 0x0F,
    Xor = 0x10,
    Neg = 0x11,
    /// Bitwise inversion, including of the IEEE-754 pattern of floats.
    Not = 0x12,
    Shl = 0x13,
    Shr = 0x14,
    /// Compare two values using the instruction's [`ComparisonKind`].
    Cmp = 0x15,

    // === Stores ===
    /// Store into a scope-resolved variable.
    Pop = 0x45,
    /// Duplicate or swap runs of stack slots measured in bytes.
    Dup = 0x86,

    // === Control ===
    Ret = 0x9C,
    Exit = 0x9D,
    /// Discard the top of stack.
    Popz = 0x9E,
    B = 0xB6,
    Bt = 0xB7,
    Bf = 0xB8,
    /// Enter a `with` block.
    PushEnv = 0xBA,
    /// Leave a `with` block.
    PopEnv = 0xBB,

    // === Loads ===
    Push = 0xC0,
    PushLoc = 0xC1,
    PushGlb = 0xC2,
    PushBltn = 0xC3,
    /// Push a 16-bit immediate.
    PushI = 0x84,

    // === Calls ===
    Call = 0xD9,
    /// Dynamic call through a function value.
    CallV = 0x99,
    /// Extended VM-control pseudo-instructions, see [`BreakKind`].
    Break = 0xFF,
}

impl Opcode {
    /// True for the instructions that encode a jump offset.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(self, Self::B | Self::Bt | Self::Bf | Self::PushEnv | Self::PopEnv)
    }

    /// True for the load instructions whose immediate width depends on `type1`.
    #[must_use]
    pub fn is_push(self) -> bool {
        matches!(self, Self::Push | Self::PushLoc | Self::PushGlb | Self::PushBltn | Self::PushI)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(InvalidOpcodeError(byte))
    }
}

/// Error returned when attempting to convert an invalid byte to an Opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcodeError(pub u8);

impl fmt::Display for InvalidOpcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opcode byte: {:#04x}", self.0)
    }
}

impl std::error::Error for InvalidOpcodeError {}

/// Operand type tag carried by most instructions.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromRepr, Display, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Double = 0,
    Float = 1,
    Int32 = 2,
    Int64 = 3,
    Boolean = 4,
    Variable = 5,
    String = 6,
    Delete = 7,
    Undefined = 8,
    UnsignedInt = 9,
    Int16 = 0x0F,
}

impl DataType {
    /// One-letter suffix used in assembly listings (`push.i`, `conv.v.d`).
    #[must_use]
    pub fn suffix(self) -> char {
        match self {
            Self::Double => 'd',
            Self::Float => 'f',
            Self::Int32 => 'i',
            Self::Int64 => 'l',
            Self::Boolean => 'b',
            Self::Variable => 'v',
            Self::String => 's',
            Self::Delete => 'x',
            Self::Undefined => 'z',
            Self::UnsignedInt => 'u',
            Self::Int16 => 'e',
        }
    }

    #[must_use]
    pub fn from_suffix(suffix: char) -> Option<Self> {
        Some(match suffix {
            'd' => Self::Double,
            'f' => Self::Float,
            'i' => Self::Int32,
            'l' => Self::Int64,
            'b' => Self::Boolean,
            'v' => Self::Variable,
            's' => Self::String,
            'x' => Self::Delete,
            'z' => Self::Undefined,
            'u' => Self::UnsignedInt,
            'e' => Self::Int16,
            _ => return None,
        })
    }
}

/// Predicate applied by `Cmp`.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ComparisonKind {
    Lt = 1,
    Lte = 2,
    Eq = 3,
    Neq = 4,
    Gte = 5,
    Gt = 6,
}

/// How a variable operand is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Plain `scope.name` access.
    #[default]
    Normal,
    /// Indexed access; index and scope come from the operand stack.
    Array,
    /// The target instance comes from the operand stack.
    StackTop,
}

/// Extended `Break` codes understood by the VM.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum BreakKind {
    /// Pop a value and record it as the array copy-on-write owner.
    SetOwner = -5,
    /// Push whether static initialization is currently permitted.
    IsStaticOk = -6,
    /// Mark static initialization as permitted for the rest of the call.
    SetStatic = -7,
}

/// Variable-table selector: the "instance type" of an instruction or variable.
///
/// Negative values are special scopes; non-negative values name a concrete
/// instance id or object index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scope {
    /// No explicit scope; treated as global.
    #[default]
    Undefined,
    /// `self`: the most recently pushed instance-scope entry.
    This,
    /// `other`: the second most recently pushed entry.
    Other,
    All,
    Noone,
    Global,
    Builtin,
    Local,
    /// The earliest pushed entry; as a popped scope value it marks the
    /// object currently under construction.
    Stacktop,
    Arg,
    Static,
    /// A concrete instance id or object index.
    Id(i32),
}

impl Scope {
    /// Scope value marking "the instance supplied on the stack".
    pub const STACKTOP_MARKER: i32 = -9;

    /// Listing keyword for special scopes, `None` for concrete ids.
    #[must_use]
    pub fn keyword(self) -> Option<&'static str> {
        Some(match self {
            Self::Undefined => "undefined",
            Self::This => "self",
            Self::Other => "other",
            Self::All => "all",
            Self::Noone => "noone",
            Self::Global => "global",
            Self::Builtin => "builtin",
            Self::Local => "local",
            Self::Stacktop => "stacktop",
            Self::Arg => "arg",
            Self::Static => "static",
            Self::Id(_) => return None,
        })
    }

    /// Object index named by this scope when used as an instruction's
    /// instance type. `Undefined` shares the encoding of object index 0.
    #[must_use]
    pub fn object_index(self) -> Option<i32> {
        match self {
            Self::Undefined => Some(0),
            Self::Id(id) if id >= 0 => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "undefined" => Self::Undefined,
            "self" => Self::This,
            "other" => Self::Other,
            "all" => Self::All,
            "noone" => Self::Noone,
            "global" => Self::Global,
            "builtin" => Self::Builtin,
            "local" => Self::Local,
            "stacktop" => Self::Stacktop,
            "arg" | "argument" => Self::Arg,
            "static" => Self::Static,
            _ => return None,
        })
    }
}

impl From<i32> for Scope {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Undefined,
            -1 => Self::This,
            -2 => Self::Other,
            -3 => Self::All,
            -4 => Self::Noone,
            -5 => Self::Global,
            -6 => Self::Builtin,
            -7 => Self::Local,
            -9 => Self::Stacktop,
            -15 => Self::Arg,
            -16 => Self::Static,
            id => Self::Id(id),
        }
    }
}

impl From<Scope> for i32 {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Undefined => 0,
            Scope::This => -1,
            Scope::Other => -2,
            Scope::All => -3,
            Scope::Noone => -4,
            Scope::Global => -5,
            Scope::Builtin => -6,
            Scope::Local => -7,
            Scope::Stacktop => -9,
            Scope::Arg => -15,
            Scope::Static => -16,
            Scope::Id(id) => id,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.keyword() {
            Some(keyword) => f.write_str(keyword),
            None => write!(f, "{}", i32::from(*self)),
        }
    }
}
