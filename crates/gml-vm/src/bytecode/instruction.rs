//! Decoded instructions and their encoded sizes.

use std::{fmt, rc::Rc};

use serde::{Deserialize, Serialize};

use super::op::{BreakKind, ComparisonKind, DataType, Opcode, ReferenceKind, Scope};

/// Symbolic variable named by `Push`, `Pop` and the `Push*` loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableOperand {
    pub name: Rc<str>,
    /// Scope the variable is declared in; distinct from the instruction's own
    /// instance type when the instruction names an object index.
    pub scope: Scope,
    pub kind: ReferenceKind,
    /// Index of the variable in the program's variable table; negative for
    /// variables the compiler never assigned a slot.
    pub var_id: i32,
}

impl VariableOperand {
    #[must_use]
    pub fn new(scope: Scope, name: &str) -> Self {
        Self {
            name: name.into(),
            scope,
            kind: ReferenceKind::Normal,
            var_id: 0,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ReferenceKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Immediate or symbolic operand of an instruction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Operand {
    #[default]
    None,
    Double(f64),
    Float(f32),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Bool(bool),
    String(Rc<str>),
    Variable(VariableOperand),
    /// Function name, for `Call` and for `push.i` of a function value.
    Function(Rc<str>),
}

/// One decoded instruction.
///
/// Fields not meaningful for a given opcode keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    pub type1: DataType,
    pub type2: DataType,
    /// Instance type of the instruction itself (`TypeInst`).
    pub instance_type: Scope,
    /// Raw comparison byte; a [`ComparisonKind`] for `Cmp`, the swap
    /// descriptor for `Dup`.
    pub comparison: u8,
    /// `Dup` run length in units of `type1`.
    pub extra: u8,
    /// Branch distance in 32-bit words, relative to this instruction.
    pub jump_offset: i32,
    /// Argument count for `Call` and `CallV`.
    pub argument_count: u16,
    /// Extended kind for `Break`.
    pub extended: i16,
    pub operand: Operand,
}

impl Instruction {
    #[must_use]
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            type1: DataType::Double,
            type2: DataType::Double,
            instance_type: Scope::Undefined,
            comparison: 0,
            extra: 0,
            jump_offset: 0,
            argument_count: 0,
            extended: 0,
            operand: Operand::None,
        }
    }

    #[must_use]
    pub fn typed(op: Opcode, type1: DataType, type2: DataType) -> Self {
        let mut inst = Self::new(op);
        inst.type1 = type1;
        inst.type2 = type2;
        inst
    }

    /// `push` of an immediate, with `type1` derived from the operand.
    #[must_use]
    pub fn push(operand: Operand) -> Self {
        let type1 = match &operand {
            Operand::Double(_) | Operand::None => DataType::Double,
            Operand::Float(_) => DataType::Float,
            Operand::Int16(_) => DataType::Int16,
            Operand::Int32(_) | Operand::Function(_) => DataType::Int32,
            Operand::Int64(_) => DataType::Int64,
            Operand::UInt32(_) => DataType::UnsignedInt,
            Operand::Bool(_) => DataType::Boolean,
            Operand::String(_) => DataType::String,
            Operand::Variable(_) => DataType::Variable,
        };
        let mut inst = Self::typed(Opcode::Push, type1, DataType::Double);
        if let Operand::Variable(var) = &operand {
            inst.instance_type = var.scope;
        }
        inst.operand = operand;
        inst
    }

    /// `pop.v.<type2>` into `scope.name`.
    #[must_use]
    pub fn pop(var: VariableOperand, type2: DataType) -> Self {
        let mut inst = Self::typed(Opcode::Pop, DataType::Variable, type2);
        inst.instance_type = var.scope;
        inst.operand = Operand::Variable(var);
        inst
    }

    #[must_use]
    pub fn branch(op: Opcode, jump_offset: i32) -> Self {
        let mut inst = Self::new(op);
        inst.jump_offset = jump_offset;
        inst
    }

    #[must_use]
    pub fn call(name: &str, argument_count: u16) -> Self {
        let mut inst = Self::typed(Opcode::Call, DataType::Int32, DataType::Double);
        inst.operand = Operand::Function(name.into());
        inst.argument_count = argument_count;
        inst
    }

    #[must_use]
    pub fn compare(kind: ComparisonKind, type1: DataType, type2: DataType) -> Self {
        let mut inst = Self::typed(Opcode::Cmp, type1, type2);
        inst.comparison = kind as u8;
        inst
    }

    #[must_use]
    pub fn extended(kind: BreakKind) -> Self {
        let mut inst = Self::typed(Opcode::Break, DataType::Int16, DataType::Double);
        inst.extended = kind as i16;
        inst
    }

    /// The named variable, for instructions that carry one.
    #[must_use]
    pub fn variable(&self) -> Option<&VariableOperand> {
        match &self.operand {
            Operand::Variable(var) => Some(var),
            _ => None,
        }
    }

    /// Addressing kind of the variable operand, `Normal` when there is none.
    #[must_use]
    pub fn reference_kind(&self) -> ReferenceKind {
        self.variable().map_or(ReferenceKind::Normal, |var| var.kind)
    }

    #[must_use]
    pub fn comparison_kind(&self) -> Option<ComparisonKind> {
        ComparisonKind::from_repr(self.comparison)
    }

    /// Encoded size in 32-bit words.
    ///
    /// Branch offsets and the dispatch loop's skip budget count in these units.
    #[must_use]
    pub fn size(&self) -> i32 {
        if matches!(self.operand, Operand::Variable(_) | Operand::Function(_)) {
            return 2;
        }
        if self.op == Opcode::Break && self.type1 == DataType::Int32 {
            return 2;
        }
        if self.op.is_push() {
            return match self.type1 {
                DataType::Double | DataType::Int64 => 3,
                DataType::Int16 => 1,
                _ => 2,
            };
        }
        1
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic: &'static str = self.op.into();
        write!(f, "{mnemonic}.{}", self.type1.suffix())?;
        if matches!(self.op, Opcode::Pop | Opcode::Conv | Opcode::Cmp) {
            write!(f, ".{}", self.type2.suffix())?;
        }
        match &self.operand {
            Operand::None => {}
            Operand::Double(v) => write!(f, " {v}")?,
            Operand::Float(v) => write!(f, " {v}")?,
            Operand::Int16(v) => write!(f, " {v}")?,
            Operand::Int32(v) => write!(f, " {v}")?,
            Operand::Int64(v) => write!(f, " {v}")?,
            Operand::UInt32(v) => write!(f, " {v}")?,
            Operand::Bool(v) => write!(f, " {v}")?,
            Operand::String(v) => write!(f, " {v:?}")?,
            Operand::Variable(var) => {
                f.write_str(" ")?;
                match var.kind {
                    ReferenceKind::Normal => {}
                    ReferenceKind::Array => f.write_str("[array]")?,
                    ReferenceKind::StackTop => f.write_str("[stacktop]")?,
                }
                write!(f, "{}.{}", self.instance_type, var.name)?;
            }
            Operand::Function(name) if self.op == Opcode::Call => {
                write!(f, " {name}(argc={})", self.argument_count)?;
            }
            Operand::Function(name) => write!(f, " {name}")?,
        }
        if self.op.is_branch() {
            write!(f, " [{}]", self.jump_offset)?;
        }
        if let Some(kind) = self.comparison_kind().filter(|_| self.op == Opcode::Cmp) {
            write!(f, " {kind}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_sizes_follow_immediate_width() {
        assert_eq!(Instruction::push(Operand::Double(1.5)).size(), 3);
        assert_eq!(Instruction::push(Operand::Int64(1)).size(), 3);
        assert_eq!(Instruction::push(Operand::Int32(1)).size(), 2);
        assert_eq!(Instruction::push(Operand::String("a".into())).size(), 2);
        let mut pushi = Instruction::typed(Opcode::PushI, DataType::Int16, DataType::Double);
        pushi.operand = Operand::Int16(3);
        assert_eq!(pushi.size(), 1);
    }

    #[test]
    fn symbolic_operands_take_two_words() {
        let var = VariableOperand::new(Scope::This, "x");
        assert_eq!(Instruction::pop(var.clone(), DataType::Variable).size(), 2);
        assert_eq!(Instruction::push(Operand::Variable(var)).size(), 2);
        assert_eq!(Instruction::call("show_debug_message", 1).size(), 2);
        assert_eq!(Instruction::push(Operand::Function("gml_Script_f".into())).size(), 2);
    }

    #[test]
    fn plain_instructions_take_one_word() {
        assert_eq!(Instruction::typed(Opcode::Add, DataType::Int32, DataType::Int32).size(), 1);
        assert_eq!(Instruction::branch(Opcode::B, 4).size(), 1);
        assert_eq!(Instruction::extended(BreakKind::SetStatic).size(), 1);
        let mut pushref = Instruction::extended(BreakKind::SetOwner);
        pushref.type1 = DataType::Int32;
        assert_eq!(pushref.size(), 2);
    }

    #[test]
    fn display_matches_listing_syntax() {
        let var = VariableOperand::new(Scope::Global, "score");
        assert_eq!(Instruction::pop(var, DataType::Int32).to_string(), "pop.v.i global.score");
        assert_eq!(Instruction::call("lerp", 3).to_string(), "call.i lerp(argc=3)");
        assert_eq!(Instruction::branch(Opcode::Bf, -6).to_string(), "bf.d [-6]");
    }
}
