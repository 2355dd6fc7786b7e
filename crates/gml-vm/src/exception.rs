//! Error types raised by the interpreter.
//!
//! Every fallible operation returns a [`VmError`] instead of unwinding. The error
//! records who is at fault through its [`Severity`], a matchable [`ErrorKind`],
//! and a frozen copy of the frame chain taken at the moment of failure so later
//! execution cannot corrupt the report.

use std::{any::Any, borrow::Cow, error::Error as StdError};

use strum::{Display, IntoStaticStr};

use crate::frame::{Frame, FrameSnapshot};

/// Result type alias for operations that can fail inside the VM.
pub type RunResult<T> = Result<T, VmError>;

/// Whose fault an error is.
///
/// The host uses this to pick a recovery policy: `Runtime` errors abort the
/// current call chain, `Runner` errors flag the loaded program as corrupt, and
/// `RunnerInternal` errors point at the interpreter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum Severity {
    /// The executing script did something the language forbids.
    Runtime,
    /// The bytecode stream is internally inconsistent.
    Runner,
    /// The interpreter reached a state it cannot explain.
    RunnerInternal,
}

/// Class of a [`VmError`], independent of its human readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum ErrorKind {
    /// Pop, peek or poke on a stack without enough entries.
    UnbalancedStack,
    /// The skip budget of a jump did not land on an instruction boundary.
    UnbalancedAddress,
    /// `Self` or `Stacktop` resolved against an empty instance-scope stack.
    ScopeEmpty,
    /// `Other` resolved against an instance-scope stack with fewer than two entries.
    ScopeTooSmall,
    /// A scope that can never be used for the requested access (`All` reads, `Noone`).
    InvalidScope,
    /// A numeric scope or receiver that names no live instance.
    UnknownScope,
    UndefinedVariable,
    UndefinedFunction,
    NullArray,
    IndexOutOfRange,
    /// An operand had a shape the operation has no rule for.
    TypeMismatch,
    /// `Conv` could not produce the requested type.
    InvalidConversion,
    DivisionByZero,
    /// A native function received the wrong number or type of arguments.
    InvalidArgument,
    UnknownOpcode,
    UnknownDataType,
    /// Nested code-unit activations exceeded `VmConfig::max_call_depth`.
    CallDepthExceeded,
    /// A native function failed with a foreign error or panicked.
    HostFailure,
}

/// A failure reported by host code called from the VM.
///
/// Keeps only the rendered message so the error stays cheap to move around
/// and independent of the payload's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HostFailure {
    message: String,
}

impl HostFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Builds a failure from a panic payload caught with `catch_unwind`.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_owned()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "native function panicked".to_owned()
        };
        Self { message }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An error raised while executing bytecode.
///
/// Displays as `"{severity} Error: {message}\nStack: {snapshot}"`.
#[derive(Debug, thiserror::Error)]
#[error("{severity} Error: {message}\nStack: {snapshot}")]
pub struct VmError {
    severity: Severity,
    kind: ErrorKind,
    message: Cow<'static, str>,
    snapshot: Box<FrameSnapshot>,
    #[source]
    host: Option<HostFailure>,
}

impl VmError {
    /// Creates an error, freezing the full frame chain of `frame`.
    ///
    /// # Arguments
    /// * `frame` - The frame active at the point of failure.
    /// * `severity` - Whose fault the error is.
    /// * `kind` - The matchable error class.
    /// * `message` - Human readable detail.
    pub fn new(frame: &Frame, severity: Severity, kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            snapshot: Box::new(frame.freeze(true)),
            host: None,
        }
    }

    pub fn runtime(frame: &Frame, kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(frame, Severity::Runtime, kind, message)
    }

    pub fn runner(frame: &Frame, kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(frame, Severity::Runner, kind, message)
    }

    pub fn internal(frame: &Frame, kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(frame, Severity::RunnerInternal, kind, message)
    }

    /// Stack underflow on pop, peek or poke.
    pub fn unbalanced_stack(frame: &Frame) -> Self {
        Self::runner(frame, ErrorKind::UnbalancedStack, "unbalanced stack")
    }

    /// Reading a variable that was never assigned.
    pub fn undefined_variable(frame: &Frame, owner: &str, name: &str) -> Self {
        Self::runtime(
            frame,
            ErrorKind::UndefinedVariable,
            format!("{owner} variable is not defined ({name})"),
        )
    }

    /// A native function was called with the wrong number of arguments.
    pub fn argument_count(frame: &Frame, function: &str) -> Self {
        Self::runtime(
            frame,
            ErrorKind::InvalidArgument,
            format!("[{function}] unexpected argument count"),
        )
    }

    /// A native function was called with arguments of the wrong shape.
    pub fn argument_types(frame: &Frame, function: &str) -> Self {
        Self::runtime(
            frame,
            ErrorKind::InvalidArgument,
            format!("[{function}] wrong argument types"),
        )
    }

    /// Wraps a foreign error returned by host code.
    pub fn host(frame: &Frame, error: &dyn StdError) -> Self {
        Self::host_failure(frame, HostFailure::new(error.to_string()))
    }

    /// Wraps a [`HostFailure`] as a `RunnerInternal` error.
    pub fn host_failure(frame: &Frame, failure: HostFailure) -> Self {
        let mut err = Self::internal(frame, ErrorKind::HostFailure, failure.message().to_owned());
        err.host = Some(failure);
        err
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The frozen frame chain captured when the error was raised.
    #[must_use]
    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    /// The wrapped host failure, for `HostFailure` errors.
    #[must_use]
    pub fn host_error(&self) -> Option<&HostFailure> {
        self.host.as_ref()
    }
}
