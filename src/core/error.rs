// This module defines the error types shared by scopeflow's layers using the thiserror
// crate. IrError covers consistency failures reported by an IR builder: storing into a
// block that has no terminator yet, appending to a block that is already terminated,
// adding a switch case to a block that does not end in a switch, erasing a block that
// still has incoming edges, and touching a block that was erased. ScopeError covers the
// cleanup scope stack: internal-consistency failures raised when the statement lowering
// that drives the stack breaks one of its preconditions, the fatal unresolved-goto
// condition detected at the end of a function, and wrapped builder errors.

//! Error types for the IR builder and the cleanup scope stack.

use thiserror::Error;

use crate::scope::{CleanupCursor, JumpKind, LabelId, StmtId};

/// Consistency errors reported by an [`IrBuilder`](crate::core::IrBuilder).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("block {block} has no terminator")]
    MissingTerminator { block: String },

    #[error("block {block} is already terminated")]
    AlreadyTerminated { block: String },

    #[error("terminator of block {block} is not a switch")]
    NotASwitch { block: String },

    #[error("block {block} still has {uses} incoming edge(s)")]
    BlockInUse { block: String, uses: usize },

    #[error("block {block} has been erased")]
    ErasedBlock { block: String },
}

/// Errors raised by the cleanup scope stack.
///
/// Everything except [`ScopeError::UnresolvedGotos`] is an internal-consistency
/// failure: a jump the lexical checks of the caller should have rejected, or a
/// caller that does not keep the stack balanced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("{kind} encountered outside of any enclosing loop or switch")]
    NoEnclosingTarget { kind: JumpKind },

    #[error("target {stmt:?} for labeled {kind} not found")]
    TargetNotFound { kind: JumpKind, stmt: StmtId },

    #[error("cleanup cursor {target} is deeper than the active depth {depth}")]
    CursorOutOfRange {
        target: CleanupCursor,
        depth: CleanupCursor,
    },

    #[error("label {label:?} is already defined in this function")]
    LabelRedefined { label: LabelId },

    #[error("{open} cleanup scope(s) still open at the end of the function")]
    UnbalancedScopes { open: usize },

    #[error("{count} unresolved goto(s), code generation aborted")]
    UnresolvedGotos { count: usize },

    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Result alias for IR builder operations.
pub type IrResult<T> = Result<T, IrError>;

/// Result alias for scope stack operations.
pub type ScopeResult<T> = Result<T, ScopeError>;
