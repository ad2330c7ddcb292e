//! Loop and switch jump targets.
//!
//! Every target remembers the cleanup depth active at its loop or switch
//! header, so a `break`/`continue` unwinds exactly the scopes opened since.

use std::fmt::{self, Debug};

use log::trace;

use super::stack::ScopeStack;
use super::{CleanupCursor, StmtId};
use crate::core::{IrBuilder, ScopeError, ScopeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
}

impl fmt::Display for JumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpKind::Break => write!(f, "break"),
            JumpKind::Continue => write!(f, "continue"),
        }
    }
}

/// Destination of a `break` or `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTarget<B> {
    pub target_block: B,
    pub cleanup_scope: CleanupCursor,
    /// Loop or switch the target belongs to.
    pub target_statement: StmtId,
}

impl<B: Copy + Eq + Debug, S: Copy + Eq + Debug> ScopeStack<B, S> {
    /// Register the continue and break destinations of a loop.
    pub fn push_loop_target(&mut self, loop_statement: StmtId, continue_target: B, break_target: B) {
        let cleanup_scope = self.current_cleanup_scope();
        self.continue_targets.push(JumpTarget {
            target_block: continue_target,
            cleanup_scope,
            target_statement: loop_statement,
        });
        self.break_targets.push(JumpTarget {
            target_block: break_target,
            cleanup_scope,
            target_statement: loop_statement,
        });
    }

    pub fn pop_loop_target(&mut self) {
        let popped = self.continue_targets.pop().zip(self.break_targets.pop());
        debug_assert!(popped.is_some(), "no loop target to pop");
    }

    /// Register the break destination of a switch.
    pub fn push_break_target(&mut self, switch_statement: StmtId, target_block: B) {
        let cleanup_scope = self.current_cleanup_scope();
        self.break_targets.push(JumpTarget {
            target_block,
            cleanup_scope,
            target_statement: switch_statement,
        });
    }

    pub fn pop_break_target(&mut self) {
        let popped = self.break_targets.pop();
        debug_assert!(popped.is_some(), "no break target to pop");
    }

    fn targets(&self, kind: JumpKind) -> &[JumpTarget<B>] {
        match kind {
            JumpKind::Break => &self.break_targets,
            JumpKind::Continue => &self.continue_targets,
        }
    }

    /// Jump to the target of the innermost enclosing `statement`.
    pub fn jump_to_statement<I>(&mut self, ir: &mut I, kind: JumpKind, statement: StmtId) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        let target = self
            .targets(kind)
            .iter()
            .rev()
            .find(|target| target.target_statement == statement)
            .copied()
            .ok_or(ScopeError::TargetNotFound {
                kind,
                stmt: statement,
            })?;
        trace!("labeled {} to {:?}", kind, statement);
        self.run_cleanups(ir, target.cleanup_scope, target.target_block)
    }

    /// Jump to the innermost target of `kind`.
    pub fn jump_to_closest<I>(&mut self, ir: &mut I, kind: JumpKind) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        let target = self
            .targets(kind)
            .last()
            .copied()
            .ok_or(ScopeError::NoEnclosingTarget { kind })?;
        self.run_cleanups(ir, target.cleanup_scope, target.target_block)
    }

    pub fn break_to_statement<I>(&mut self, ir: &mut I, statement: StmtId) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        self.jump_to_statement(ir, JumpKind::Break, statement)
    }

    pub fn continue_to_statement<I>(&mut self, ir: &mut I, statement: StmtId) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        self.jump_to_statement(ir, JumpKind::Continue, statement)
    }

    pub fn break_to_closest<I>(&mut self, ir: &mut I) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        self.jump_to_closest(ir, JumpKind::Break)
    }

    pub fn continue_to_closest<I>(&mut self, ir: &mut I) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        self.jump_to_closest(ir, JumpKind::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompilationSession;
    use crate::ir::{Block, FunctionBuilder, Slot, Terminator};
    use bumpalo::Bump;

    #[test]
    fn test_break_unwinds_scopes_opened_inside_loop() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack: ScopeStack<Block, Slot> = ScopeStack::new();

        let outer = fb.create_block("try.finally");
        stack.push_cleanup(outer, outer);
        let header = fb.create_block("loop.header");
        let end = fb.create_block("loop.end");
        stack.push_loop_target(StmtId(0), header, end);
        let inner = fb.create_block("try.finally");
        stack.push_cleanup(inner, inner);

        stack.break_to_closest(&mut fb).unwrap();

        // Only the scope opened inside the loop runs.
        assert_eq!(fb.function().terminator(Block::ENTRY), Some(&Terminator::Br { target: inner }));
        assert_eq!(fb.function().terminator(inner), Some(&Terminator::Br { target: end }));
        assert!(stack.scopes()[0].exits.targets().is_empty());
    }

    #[test]
    fn test_labeled_jump_finds_outer_statement() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack: ScopeStack<Block, Slot> = ScopeStack::new();

        let outer_header = fb.create_block("outer.header");
        let outer_end = fb.create_block("outer.end");
        stack.push_loop_target(StmtId(1), outer_header, outer_end);
        let switch_end = fb.create_block("switch.end");
        stack.push_break_target(StmtId(2), switch_end);

        stack.continue_to_statement(&mut fb, StmtId(1)).unwrap();
        assert_eq!(
            fb.function().terminator(Block::ENTRY),
            Some(&Terminator::Br { target: outer_header })
        );

        stack.break_to_closest(&mut fb).unwrap();
        assert_eq!(
            fb.function().terminator(Block::ENTRY),
            Some(&Terminator::Br { target: switch_end })
        );

        stack.pop_break_target();
        stack.pop_loop_target();
        assert_eq!(
            stack.break_to_statement(&mut fb, StmtId(1)),
            Err(ScopeError::TargetNotFound {
                kind: JumpKind::Break,
                stmt: StmtId(1)
            })
        );
    }

    #[test]
    fn test_closest_without_targets_is_internal_error() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack: ScopeStack<Block, Slot> = ScopeStack::new();

        let switch_end = fb.create_block("switch.end");
        stack.push_break_target(StmtId(0), switch_end);

        assert_eq!(
            stack.continue_to_closest(&mut fb),
            Err(ScopeError::NoEnclosingTarget {
                kind: JumpKind::Continue
            })
        );
    }
}
