// This module is the control-flow core of scopeflow. It lowers goto, break, continue and
// return through enclosing cleanup regions (try/finally bodies) into plain branches and
// switches. Cleanup bodies are emitted once and shared by every jump that passes through
// them: the multiplexer in `cleanup` keeps a plain branch at the end of a body while it
// has one destination and introduces a runtime branch selector plus a switch as soon as
// a second one appears. The stack in `stack` threads a jump through exactly the scopes
// it leaves, `targets` keeps the loop and switch destinations tagged with the cleanup
// depth they were registered at, and `labels` resolves forward gotos by re-attaching
// them to the enclosing scope each time a scope closes.

//! Cleanup scopes, jump targets and goto resolution.
//!
//! One [`ScopeStack`] exists per function being generated. Statement
//! lowering calls it for every scope entry/exit and every jump; it mutates
//! the IR through an [`IrBuilder`](crate::core::IrBuilder).

use std::fmt;

pub mod cleanup;
pub mod labels;
pub mod stack;
pub mod targets;

pub use cleanup::{execute_cleanup, CleanupExitTarget, CleanupExits, CleanupScope};
pub use labels::{GotoJump, LabelTarget};
pub use stack::ScopeStack;
pub use targets::{JumpKind, JumpTarget};

/// Opaque identity of a label, issued by the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// Opaque identity of a loop or switch statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

/// Per-function unique identity of a pushed cleanup scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Number of cleanup scopes active at some point of the lowering.
///
/// Jumps unwind from the current depth down to the cursor captured when
/// their target was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CleanupCursor(pub usize);

impl CleanupCursor {
    /// No cleanup scopes active.
    pub const TOP: CleanupCursor = CleanupCursor(0);
}

impl fmt::Display for CleanupCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
