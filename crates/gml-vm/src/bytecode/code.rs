//! Code entries and the serializable program container.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::Instruction;
use crate::world::World;

/// One named unit of bytecode.
///
/// A child entry shares its parent's instruction array and starts `offset`
/// bytes into it; its own `instructions` stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub name: Rc<str>,
    pub instructions: Rc<[Instruction]>,
    pub parent: Option<Rc<str>>,
    /// Byte offset into the parent's instructions.
    pub offset: u32,
    pub arguments_count: u16,
}

impl CodeEntry {
    pub fn new(name: impl Into<Rc<str>>, instructions: Vec<Instruction>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            parent: None,
            offset: 0,
            arguments_count: 0,
        }
    }

    /// A child entry starting `offset` bytes into `parent`.
    pub fn child(name: impl Into<Rc<str>>, parent: impl Into<Rc<str>>, offset: u32) -> Self {
        Self {
            name: name.into(),
            instructions: Rc::from(Vec::new()),
            parent: Some(parent.into()),
            offset,
            arguments_count: 0,
        }
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments_count: u16) -> Self {
        self.arguments_count = arguments_count;
        self
    }
}

/// A complete program: object classes, code, scripts and global init order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Object class names, indexed by object index.
    pub objects: Vec<Rc<str>>,
    pub entries: Vec<CodeEntry>,
    /// Code entries exposed as callable script functions.
    pub scripts: Vec<Rc<str>>,
    /// Code entries run once, in order, by `Vm::run_global_init`.
    pub global_init: Vec<Rc<str>>,
}

/// Failure to load or dump a serialized [`Program`].
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("malformed program: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("{kind} `{name}` is not defined")]
    Missing { kind: &'static str, name: String },
}

impl Program {
    /// Serializes the program with `postcard`.
    pub fn dump(&self) -> Result<Vec<u8>, ProgramError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn load(bytes: &[u8]) -> Result<Self, ProgramError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&CodeEntry> {
        self.entries.iter().find(|entry| &*entry.name == name)
    }

    /// Checks that every parent, script and init name refers to a code entry.
    pub fn validate(&self) -> Result<(), ProgramError> {
        let missing = |name: &str| ProgramError::Missing {
            kind: "code entry",
            name: name.to_owned(),
        };
        for entry in &self.entries {
            if let Some(parent) = &entry.parent {
                if self.entry(parent).is_none() {
                    return Err(missing(parent));
                }
            }
        }
        for name in self.scripts.iter().chain(&self.global_init) {
            if self.entry(name).is_none() {
                return Err(missing(name));
            }
        }
        Ok(())
    }

    /// Registers object classes, code entries and script functions in `world`.
    pub fn install(&self, world: &mut World) -> Result<(), ProgramError> {
        self.validate()?;
        for object in &self.objects {
            world.define_object(object.clone());
        }
        for entry in &self.entries {
            world.register_code(entry.clone());
        }
        for script in &self.scripts {
            world.register_script(script.clone());
        }
        Ok(())
    }
}
