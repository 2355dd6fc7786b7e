//! Execution frames and their frozen snapshots.
//!
//! A [`Frame`] is the private state of one logical call: the operand stack,
//! the instance-scope stack used to resolve `self`/`other`, the local and
//! local-builtin tables, and the call trace. Every stack underflow is a
//! `Runner` error.

use std::{fmt, rc::Rc};

use crate::{
    exception::{RunResult, VmError},
    namespace::{ScopeEntry, Variables},
    value::Value,
};

/// How many container levels a snapshot copies before sharing the rest.
const FREEZE_DEPTH: usize = 16;

/// Children kept per frame for diagnostics; older ones are dropped first.
const MAX_CHILDREN: usize = 8;

/// A function name paired with the instruction index executing inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backtrace {
    pub name: Rc<str>,
    pub instruction_index: usize,
}

/// One logical call's execution state.
#[derive(Debug)]
pub struct Frame {
    pub(crate) stack: Vec<Value>,
    pub(crate) instance_scope: Vec<ScopeEntry>,
    pub(crate) locals: Variables,
    pub(crate) local_builtins: Variables,
    pub(crate) backtrace: Vec<Backtrace>,
    parent: Option<Box<FrameSnapshot>>,
    children: Vec<FrameSnapshot>,
    depth: usize,
    /// Whether static initialization is currently permitted.
    pub(crate) is_static_ok: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

/// Local builtins every activation starts with.
pub(crate) fn seeded_builtins() -> Variables {
    let mut local_builtins = Variables::default();
    local_builtins.insert("argument_count".into(), Value::Int32(0));
    local_builtins.insert("async_load".into(), Value::Undefined);
    local_builtins
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        let local_builtins = seeded_builtins();
        Self {
            stack: Vec::new(),
            instance_scope: Vec::new(),
            locals: Variables::default(),
            local_builtins,
            backtrace: Vec::new(),
            parent: None,
            children: Vec::new(),
            depth: 0,
            is_static_ok: false,
        }
    }

    /// A frame with pre-seeded locals and local builtins, as used by event
    /// dispatch to share state across the scripts of one event.
    #[must_use]
    pub fn with_bindings(locals: Variables, local_builtins: Variables) -> Self {
        let mut frame = Self::new();
        frame.locals = locals;
        frame.local_builtins.extend(local_builtins);
        frame
    }

    /// A fresh frame whose parent link is a snapshot of `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut frame = Self::new();
        frame.depth = self.call_depth();
        frame.parent = Some(Box::new(self.freeze(false)));
        frame
    }

    /// Records a finished child frame for diagnostics.
    pub fn adopt(&mut self, child: &Frame) {
        if self.children.len() == MAX_CHILDREN {
            self.children.remove(0);
        }
        self.children.push(child.freeze(false));
    }

    /// Nested code-unit activations across the whole frame chain.
    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.depth + self.backtrace.len()
    }

    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    #[must_use]
    pub fn instance_scope(&self) -> &[ScopeEntry] {
        &self.instance_scope
    }

    pub fn push_scope(&mut self, entry: ScopeEntry) {
        self.instance_scope.push(entry);
    }

    pub fn pop_scope(&mut self) -> Option<ScopeEntry> {
        self.instance_scope.pop()
    }

    #[must_use]
    pub fn locals(&self) -> &Variables {
        &self.locals
    }

    #[must_use]
    pub fn local_builtins(&self) -> &Variables {
        &self.local_builtins
    }

    #[must_use]
    pub fn backtrace(&self) -> &[Backtrace] {
        &self.backtrace
    }

    /// Updates the instruction index of the innermost backtrace entry.
    pub(crate) fn set_instruction_index(&mut self, index: usize) {
        if let Some(entry) = self.backtrace.last_mut() {
            entry.instruction_index = index;
        }
    }

    /// Name of the innermost running code unit.
    #[must_use]
    pub fn current_function(&self) -> Option<&Rc<str>> {
        self.backtrace.last().map(|entry| &entry.name)
    }

    // ========================================================================
    // Operand stack
    // ========================================================================

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> RunResult<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => Err(VmError::unbalanced_stack(self)),
        }
    }

    pub fn peek(&self) -> RunResult<&Value> {
        self.stack.last().ok_or_else(|| VmError::unbalanced_stack(self))
    }

    /// Replaces the top of the stack.
    pub fn poke(&mut self, value: Value) -> RunResult<()> {
        match self.stack.last_mut() {
            Some(top) => {
                *top = value;
                Ok(())
            }
            None => Err(VmError::unbalanced_stack(self)),
        }
    }

    /// Index of the entry `offset` slots below the top; `offset` must be `<= 0`.
    fn offset_index(&self, offset: isize) -> RunResult<usize> {
        let below = offset.unsigned_abs();
        if offset > 0 || below >= self.stack.len() {
            return Err(VmError::unbalanced_stack(self));
        }
        Ok(self.stack.len() - 1 - below)
    }

    /// Removes the entry `offset` slots below the top.
    pub fn pop_at(&mut self, offset: isize) -> RunResult<Value> {
        let index = self.offset_index(offset)?;
        Ok(self.stack.remove(index))
    }

    pub fn peek_at(&self, offset: isize) -> RunResult<&Value> {
        let index = self.offset_index(offset)?;
        Ok(&self.stack[index])
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Deep-copies the frame for an error report.
    ///
    /// With `recursive` the parent and children snapshots are carried along;
    /// otherwise only this frame is captured.
    #[must_use]
    pub fn freeze(&self, recursive: bool) -> FrameSnapshot {
        let copy_all = |vars: &Variables| -> Variables {
            vars.iter()
                .map(|(name, value)| (name.clone(), value.deep_copy(FREEZE_DEPTH)))
                .collect()
        };
        FrameSnapshot {
            depth: self.depth,
            backtrace: self.backtrace.clone(),
            stack: self.stack.iter().map(|v| v.deep_copy(FREEZE_DEPTH)).collect(),
            instance_scope: self.instance_scope.iter().map(|e| e.frozen(FREEZE_DEPTH)).collect(),
            locals: copy_all(&self.locals),
            local_builtins: copy_all(&self.local_builtins),
            is_static_ok: self.is_static_ok,
            parent: if recursive { self.parent.clone() } else { None },
            children: if recursive { self.children.clone() } else { Vec::new() },
        }
    }
}

/// A frozen copy of a frame, detached from the live one.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub depth: usize,
    pub backtrace: Vec<Backtrace>,
    pub stack: Vec<Value>,
    pub instance_scope: Vec<ScopeEntry>,
    pub locals: Variables,
    pub local_builtins: Variables,
    pub is_static_ok: bool,
    pub parent: Option<Box<FrameSnapshot>>,
    pub children: Vec<FrameSnapshot>,
}

impl fmt::Display for FrameSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stacktrace (Depth {}): ", self.depth)?;
        for (i, entry) in self.backtrace.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&entry.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::{ErrorKind, Severity};

    #[test]
    fn empty_pop_is_unbalanced() {
        let mut frame = Frame::new();
        let err = frame.pop().unwrap_err();
        assert_eq!(err.severity(), Severity::Runner);
        assert_eq!(err.kind(), ErrorKind::UnbalancedStack);
        assert!(frame.poke(Value::Int32(1)).is_err());
    }

    #[test]
    fn offsets_address_below_top() {
        let mut frame = Frame::new();
        for i in 0..3 {
            frame.push(Value::Int32(i));
        }
        assert_eq!(frame.peek_at(-2).unwrap(), &Value::Int32(0));
        assert!(frame.peek_at(-3).is_err());
        assert!(frame.peek_at(1).is_err());
        assert_eq!(frame.pop_at(-1).unwrap(), Value::Int32(1));
        assert_eq!(frame.stack(), &[Value::Int32(0), Value::Int32(2)]);
    }

    #[test]
    fn new_frames_seed_local_builtins() {
        let frame = Frame::new();
        assert_eq!(frame.local_builtins().get("argument_count"), Some(&Value::Int32(0)));
        assert_eq!(frame.local_builtins().get("async_load"), Some(&Value::Undefined));
    }

    #[test]
    fn snapshot_does_not_alias_live_arrays() {
        let mut frame = Frame::new();
        let array = Value::list(vec![Value::Int32(1)]);
        frame.push(array.clone());
        let snapshot = frame.freeze(true);
        if let Value::Array(live) = &array {
            live.borrow_mut().items.push(Value::Int32(2));
        }
        assert_eq!(snapshot.stack[0].to_string(), "[1]");
    }

    #[test]
    fn snapshot_lists_backtrace_names() {
        let mut parent = Frame::new();
        parent.backtrace.push(Backtrace {
            name: "gml_Script_outer".into(),
            instruction_index: 3,
        });
        let mut child = parent.child();
        child.backtrace.push(Backtrace {
            name: "gml_Script_inner".into(),
            instruction_index: 0,
        });
        let snapshot = child.freeze(true);
        assert_eq!(snapshot.to_string(), "Stacktrace (Depth 1): gml_Script_inner");
        assert_eq!(
            snapshot.parent.unwrap().to_string(),
            "Stacktrace (Depth 0): gml_Script_outer"
        );
        assert_eq!(child.call_depth(), 2);
    }
}
