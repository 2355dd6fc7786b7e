//! Assembler for the textual instruction listing.
//!
//! A listing is line oriented; everything after `;` is a comment.
//!
//! ```text
//! .object obj_player
//! .code gml_Script_add args=2
//!     pushbltn.v builtin.argument0
//!     pushbltn.v builtin.argument1
//!     add.v.v
//!     ret.v
//! .script gml_Script_add
//! .code gml_Script_main
//!     push.i 2
//!     push.i 3
//!     call.i gml_Script_add(argc=2)
//!     ret.v
//! ```
//!
//! Directives:
//! - `.object NAME` declares the next object class.
//! - `.code NAME [args=N] [parent=NAME offset=BYTES|LABEL]` opens a code entry.
//!   A child entry has no instructions of its own.
//! - `.script NAME` exposes a code entry as a callable script.
//! - `.init NAME` appends a code entry to the global init order.
//!
//! Instructions are written `op[.t1[.t2]] [operand]`, and `label:` marks a
//! branch target. Branch operands are a label or a raw word offset `[N]`.

use std::{rc::Rc, str::FromStr};

use ahash::AHashMap;

use super::{
    code::{CodeEntry, Program},
    instruction::{Instruction, Operand, VariableOperand},
    op::{BreakKind, ComparisonKind, DataType, Opcode, ReferenceKind, Scope},
};

/// Failure to assemble a listing. Every variant carries the 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AsmError {
    #[error("line {line}: unknown directive `.{directive}`")]
    UnknownDirective { line: usize, directive: String },
    #[error("line {line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { line: usize, mnemonic: String },
    #[error("line {line}: unknown data type suffix `{suffix}`")]
    UnknownDataType { line: usize, suffix: String },
    #[error("line {line}: invalid operand `{operand}`: {reason}")]
    InvalidOperand {
        line: usize,
        operand: String,
        reason: &'static str,
    },
    #[error("line {line}: instruction outside of a `.code` block")]
    OutsideCode { line: usize },
    #[error("line {line}: label `{label}` is defined twice")]
    DuplicateLabel { line: usize, label: String },
    #[error("line {line}: label `{label}` is not defined")]
    UndefinedLabel { line: usize, label: String },
    #[error("line {line}: code entry `{name}` is not defined")]
    UnknownEntry { line: usize, name: String },
}

impl AsmError {
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::UnknownDirective { line, .. }
            | Self::UnknownMnemonic { line, .. }
            | Self::UnknownDataType { line, .. }
            | Self::InvalidOperand { line, .. }
            | Self::OutsideCode { line }
            | Self::DuplicateLabel { line, .. }
            | Self::UndefinedLabel { line, .. }
            | Self::UnknownEntry { line, .. } => *line,
        }
    }
}

type AsmResult<T> = Result<T, AsmError>;

fn invalid(line: usize, operand: &str, reason: &'static str) -> AsmError {
    AsmError::InvalidOperand {
        line,
        operand: operand.to_owned(),
        reason,
    }
}

/// Assembles a listing into a [`Program`].
pub fn assemble(source: &str) -> Result<Program, AsmError> {
    let mut asm = Assembler::default();
    for (index, raw) in source.lines().enumerate() {
        asm.line(index + 1, raw)?;
    }
    asm.finish()
}

/// A branch whose label is resolved once its block is complete.
struct Fixup {
    index: usize,
    label: String,
    line: usize,
}

enum ChildOffset {
    Bytes(u32),
    /// A label of the parent entry.
    Label(String),
}

struct Block {
    line: usize,
    name: Rc<str>,
    arguments: u16,
    parent: Option<(Rc<str>, ChildOffset)>,
    instructions: Vec<Instruction>,
    /// Label name to instruction index.
    labels: AHashMap<String, usize>,
    fixups: Vec<Fixup>,
}

impl Block {
    /// Position of instruction `index` in words from the start of the block.
    fn word_position(&self, index: usize) -> i32 {
        self.instructions[..index].iter().map(Instruction::size).sum()
    }

    fn resolve_fixups(&mut self) -> AsmResult<()> {
        for fixup in std::mem::take(&mut self.fixups) {
            let target = *self.labels.get(&fixup.label).ok_or_else(|| AsmError::UndefinedLabel {
                line: fixup.line,
                label: fixup.label.clone(),
            })?;
            let offset = self.word_position(target) - self.word_position(fixup.index);
            self.instructions[fixup.index].jump_offset = offset;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Assembler {
    program: Program,
    blocks: Vec<Block>,
    current: Option<Block>,
    /// `.script` and `.init` names with the line that named them.
    references: Vec<(usize, Rc<str>)>,
}

impl Assembler {
    fn line(&mut self, line: usize, raw: &str) -> AsmResult<()> {
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            return Ok(());
        }
        if let Some(directive) = text.strip_prefix('.') {
            return self.directive(line, directive);
        }
        let block = self.current.as_mut().ok_or(AsmError::OutsideCode { line })?;
        let text = match text.split_once(':') {
            Some((label, rest)) if is_label(label) => {
                if block.labels.insert(label.to_owned(), block.instructions.len()).is_some() {
                    return Err(AsmError::DuplicateLabel {
                        line,
                        label: label.to_owned(),
                    });
                }
                rest.trim()
            }
            _ => text,
        };
        if text.is_empty() {
            return Ok(());
        }
        let (mnemonic, operand) = text
            .split_once(char::is_whitespace)
            .map_or((text, ""), |(mnemonic, operand)| (mnemonic, operand.trim()));
        let inst = parse_instruction(block, line, mnemonic, operand)?;
        block.instructions.push(inst);
        Ok(())
    }

    fn directive(&mut self, line: usize, text: &str) -> AsmResult<()> {
        let mut words = text.split_whitespace();
        let keyword = words.next().unwrap_or_default();
        match keyword {
            "object" => {
                let name = single_name(line, text, words)?;
                self.program.objects.push(name);
            }
            "script" => {
                let name = single_name(line, text, words)?;
                self.references.push((line, name.clone()));
                self.program.scripts.push(name);
            }
            "init" => {
                let name = single_name(line, text, words)?;
                self.references.push((line, name.clone()));
                self.program.global_init.push(name);
            }
            "code" => {
                self.close_block()?;
                self.current = Some(open_block(line, text, words)?);
            }
            other => {
                return Err(AsmError::UnknownDirective {
                    line,
                    directive: other.to_owned(),
                })
            }
        }
        Ok(())
    }

    fn close_block(&mut self) -> AsmResult<()> {
        if let Some(mut block) = self.current.take() {
            if block.parent.is_some() && !block.instructions.is_empty() {
                return Err(invalid(
                    block.line,
                    &block.name,
                    "a child entry cannot have instructions of its own",
                ));
            }
            block.resolve_fixups()?;
            self.blocks.push(block);
        }
        Ok(())
    }

    fn finish(mut self) -> AsmResult<Program> {
        self.close_block()?;
        let by_name: AHashMap<&str, &Block> = self.blocks.iter().map(|block| (&*block.name, block)).collect();

        let mut entries = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let entry = match &block.parent {
                None => CodeEntry::new(block.name.clone(), block.instructions.clone()),
                Some((parent_name, offset)) => {
                    let parent = by_name.get(&**parent_name).ok_or_else(|| AsmError::UnknownEntry {
                        line: block.line,
                        name: parent_name.to_string(),
                    })?;
                    let bytes = match offset {
                        ChildOffset::Bytes(bytes) => *bytes,
                        ChildOffset::Label(label) => {
                            let index = parent.labels.get(label).ok_or_else(|| AsmError::UndefinedLabel {
                                line: block.line,
                                label: label.clone(),
                            })?;
                            u32::try_from(parent.word_position(*index) * 4)
                                .map_err(|_| invalid(block.line, label, "offset out of range"))?
                        }
                    };
                    CodeEntry::child(block.name.clone(), parent_name.clone(), bytes)
                }
            };
            entries.push(entry.with_arguments(block.arguments));
        }

        for (line, name) in &self.references {
            if !by_name.contains_key(&**name) {
                return Err(AsmError::UnknownEntry {
                    line: *line,
                    name: name.to_string(),
                });
            }
        }
        self.program.entries = entries;
        Ok(self.program)
    }
}

fn single_name<'a>(line: usize, text: &str, mut words: impl Iterator<Item = &'a str>) -> AsmResult<Rc<str>> {
    match (words.next(), words.next()) {
        (Some(name), None) => Ok(name.into()),
        _ => Err(invalid(line, text, "expected a single name")),
    }
}

fn open_block<'a>(line: usize, text: &str, mut words: impl Iterator<Item = &'a str>) -> AsmResult<Block> {
    let name: Rc<str> = words
        .next()
        .ok_or_else(|| invalid(line, text, "expected a code entry name"))?
        .into();
    let mut arguments = 0;
    let mut parent = None;
    let mut offset = None;
    for word in words {
        match word.split_once('=') {
            Some(("args", value)) => {
                arguments = value.parse().map_err(|_| invalid(line, word, "expected an argument count"))?;
            }
            Some(("parent", value)) => parent = Some(Rc::from(value)),
            Some(("offset", value)) => {
                offset = Some(match value.parse() {
                    Ok(bytes) => ChildOffset::Bytes(bytes),
                    Err(_) if is_label(value) => ChildOffset::Label(value.to_owned()),
                    Err(_) => return Err(invalid(line, word, "expected a byte offset or a label")),
                });
            }
            _ => return Err(invalid(line, word, "expected args=, parent= or offset=")),
        }
    }
    let parent = match (parent, offset) {
        (Some(parent), offset) => Some((parent, offset.unwrap_or(ChildOffset::Bytes(0)))),
        (None, None) => None,
        (None, Some(_)) => return Err(invalid(line, text, "offset= needs a parent=")),
    };
    Ok(Block {
        line,
        name,
        arguments,
        parent,
        instructions: Vec::new(),
        labels: AHashMap::new(),
        fixups: Vec::new(),
    })
}

/// Cuts a trailing `;` comment, ignoring semicolons inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

fn is_label(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Function and variable names; the compiler's internal helpers use `@`.
fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '@')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '@')
}

fn parse_number<T: FromStr>(line: usize, text: &str, reason: &'static str) -> AsmResult<T> {
    text.parse().map_err(|_| invalid(line, text, reason))
}

fn data_type(line: usize, suffix: &str) -> AsmResult<DataType> {
    let mut chars = suffix.chars();
    let parsed = match (chars.next(), chars.next()) {
        (Some(c), None) => DataType::from_suffix(c),
        _ => None,
    };
    parsed.ok_or_else(|| AsmError::UnknownDataType {
        line,
        suffix: suffix.to_owned(),
    })
}

fn no_operand(line: usize, operand: &str) -> AsmResult<()> {
    if operand.is_empty() {
        Ok(())
    } else {
        Err(invalid(line, operand, "this instruction takes no operand"))
    }
}

fn parse_bool(line: usize, text: &str) -> AsmResult<bool> {
    match text {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(line, text, "expected true or false")),
    }
}

/// Parses a double-quoted literal with `\n`, `\t`, `\"` and `\\` escapes.
fn parse_string(line: usize, text: &str) -> AsmResult<Rc<str>> {
    let inner = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| invalid(line, text, "expected a quoted string"))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('"') => '"',
            Some('\\') => '\\',
            _ => return Err(invalid(line, text, "unknown escape sequence")),
        });
    }
    Ok(out.into())
}

/// Parses `[array]scope.name`, `[stacktop]scope.name` or `scope.name`.
///
/// Returns the instruction's instance type alongside the operand. A
/// non-negative numeric prefix names an object index; the variable itself
/// then lives in `self`.
fn parse_variable(line: usize, text: &str) -> AsmResult<(Scope, VariableOperand)> {
    let (kind, rest) = if let Some(rest) = text.strip_prefix("[array]") {
        (ReferenceKind::Array, rest)
    } else if let Some(rest) = text.strip_prefix("[stacktop]") {
        (ReferenceKind::StackTop, rest)
    } else {
        (ReferenceKind::Normal, text)
    };
    let (scope_text, name) = rest
        .split_once('.')
        .filter(|(_, name)| is_name(name))
        .ok_or_else(|| invalid(line, text, "expected scope.name"))?;
    let (instance_type, scope) = match Scope::from_keyword(scope_text) {
        Some(scope) => (scope, scope),
        None => {
            let raw: i32 = parse_number(line, scope_text, "unknown scope")?;
            if raw >= 0 {
                (Scope::Id(raw), Scope::This)
            } else {
                (Scope::from(raw), Scope::from(raw))
            }
        }
    };
    Ok((instance_type, VariableOperand::new(scope, name).with_kind(kind)))
}

/// Type of an unsuffixed `push`, guessed from the operand's spelling.
fn infer_push_type(operand: &str) -> DataType {
    if operand.starts_with('"') {
        DataType::String
    } else if operand == "true" || operand == "false" {
        DataType::Boolean
    } else if operand.parse::<i32>().is_ok() {
        DataType::Int32
    } else if operand.parse::<i64>().is_ok() {
        DataType::Int64
    } else if operand.parse::<f64>().is_ok() {
        DataType::Double
    } else if operand.contains('.') {
        DataType::Variable
    } else {
        DataType::Int32
    }
}

fn push_instruction(line: usize, type1: Option<DataType>, text: &str) -> AsmResult<Instruction> {
    let type1 = type1.unwrap_or_else(|| infer_push_type(text));
    let mut inst = Instruction::typed(Opcode::Push, type1, DataType::Double);
    inst.operand = match type1 {
        DataType::Double => Operand::Double(parse_number(line, text, "expected a double")?),
        DataType::Float => Operand::Float(parse_number(line, text, "expected a float")?),
        DataType::Int32 => match text.parse() {
            Ok(value) => Operand::Int32(value),
            Err(_) if is_name(text) => Operand::Function(text.into()),
            Err(_) => return Err(invalid(line, text, "expected an int32 or a function name")),
        },
        DataType::Int64 => Operand::Int64(parse_number(line, text, "expected an int64")?),
        DataType::UnsignedInt => Operand::UInt32(parse_number(line, text, "expected a uint32")?),
        DataType::Int16 => Operand::Int16(parse_number(line, text, "expected an int16")?),
        DataType::Boolean => Operand::Bool(parse_bool(line, text)?),
        DataType::String => Operand::String(parse_string(line, text)?),
        DataType::Variable => {
            let (instance_type, var) = parse_variable(line, text)?;
            inst.instance_type = instance_type;
            Operand::Variable(var)
        }
        DataType::Undefined | DataType::Delete => {
            no_operand(line, text)?;
            Operand::None
        }
    };
    Ok(inst)
}

/// Branch operand: a raw `[N]` word offset, or a label fixed up later.
fn jump_offset(block: &mut Block, line: usize, text: &str) -> AsmResult<i32> {
    if let Some(inner) = text.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        return parse_number(line, inner.trim(), "expected a word offset");
    }
    if !is_label(text) {
        return Err(invalid(line, text, "expected a label or [offset]"));
    }
    block.fixups.push(Fixup {
        index: block.instructions.len(),
        label: text.to_owned(),
        line,
    });
    Ok(0)
}

fn parse_instruction(block: &mut Block, line: usize, mnemonic: &str, operand: &str) -> AsmResult<Instruction> {
    if let Ok(kind) = BreakKind::from_str(mnemonic) {
        no_operand(line, operand)?;
        return Ok(Instruction::extended(kind));
    }

    let unknown = || AsmError::UnknownMnemonic {
        line,
        mnemonic: mnemonic.to_owned(),
    };
    let mut parts = mnemonic.split('.');
    let op = parts
        .next()
        .and_then(|name| Opcode::from_str(&name.to_ascii_lowercase()).ok())
        .ok_or_else(unknown)?;
    let type1 = parts.next().map(|suffix| data_type(line, suffix)).transpose()?;
    let type2 = parts.next().map(|suffix| data_type(line, suffix)).transpose()?;
    if parts.next().is_some() {
        return Err(unknown());
    }
    let t1 = type1.unwrap_or_default();
    let t2 = type2.unwrap_or(t1);

    let inst = match op {
        Opcode::Conv
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Rem
        | Opcode::Mod
        | Opcode::Add
        | Opcode::Sub
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::Shr
        | Opcode::Neg
        | Opcode::Not
        | Opcode::Ret
        | Opcode::Exit
        | Opcode::Popz => {
            no_operand(line, operand)?;
            Instruction::typed(op, t1, t2)
        }
        Opcode::Cmp => {
            let kind = ComparisonKind::from_str(&operand.to_ascii_uppercase())
                .map_err(|_| invalid(line, operand, "expected LT, LTE, EQ, NEQ, GTE or GT"))?;
            Instruction::compare(kind, t1, t2)
        }
        Opcode::Pop => {
            let t1 = type1.unwrap_or(DataType::Variable);
            let (instance_type, var) = parse_variable(line, operand)?;
            let mut inst = Instruction::typed(Opcode::Pop, t1, type2.unwrap_or(t1));
            inst.instance_type = instance_type;
            inst.operand = Operand::Variable(var);
            inst
        }
        Opcode::Dup => {
            let mut words = operand.split_whitespace();
            let extra = words
                .next()
                .ok_or_else(|| invalid(line, operand, "expected a run length"))?;
            let mut inst = Instruction::typed(Opcode::Dup, t1, t1);
            inst.extra = parse_number(line, extra, "expected a run length")?;
            if let Some(swap) = words.next() {
                let swap: u8 = parse_number(line, swap, "expected a swap size")?;
                if swap > 0x0f {
                    return Err(invalid(line, operand, "swap size must be below 16"));
                }
                inst.comparison = 0x80 | (swap << 3);
            }
            if words.next().is_some() {
                return Err(invalid(line, operand, "expected at most two numbers"));
            }
            inst
        }
        Opcode::B | Opcode::Bt | Opcode::Bf | Opcode::PushEnv | Opcode::PopEnv => {
            let offset = if operand.is_empty() && op == Opcode::PopEnv {
                0
            } else {
                jump_offset(block, line, operand)?
            };
            Instruction::branch(op, offset)
        }
        Opcode::Push => push_instruction(line, type1, operand)?,
        Opcode::PushLoc | Opcode::PushGlb | Opcode::PushBltn => {
            let (instance_type, var) = parse_variable(line, operand)?;
            let mut inst = Instruction::typed(op, type1.unwrap_or(DataType::Variable), DataType::Double);
            inst.instance_type = instance_type;
            inst.operand = Operand::Variable(var);
            inst
        }
        Opcode::PushI => {
            let mut inst = Instruction::typed(Opcode::PushI, DataType::Int16, DataType::Double);
            inst.operand = Operand::Int16(parse_number(line, operand, "expected an int16")?);
            inst
        }
        Opcode::Call => {
            let (name, count) = operand
                .split_once('(')
                .and_then(|(name, rest)| {
                    let count = rest.strip_suffix(')')?.trim().strip_prefix("argc=")?;
                    Some((name.trim(), count.trim()))
                })
                .filter(|(name, _)| is_name(name))
                .ok_or_else(|| invalid(line, operand, "expected NAME(argc=N)"))?;
            Instruction::call(name, parse_number(line, count, "expected an argument count")?)
        }
        Opcode::CallV => {
            let mut inst = Instruction::typed(Opcode::CallV, type1.unwrap_or(DataType::Variable), DataType::Double);
            inst.argument_count = parse_number(line, operand, "expected an argument count")?;
            inst
        }
        Opcode::Break => {
            let mut inst = Instruction::typed(Opcode::Break, type1.unwrap_or(DataType::Int16), DataType::Double);
            inst.extended = parse_number(line, operand, "expected an extended break code")?;
            inst
        }
    };
    Ok(inst)
}
