//! The per-function cleanup scope stack.

use std::fmt::Debug;

use hashbrown::HashMap;
use log::debug;

use super::cleanup::{execute_cleanup, CleanupScope};
use super::labels::{GotoJump, LabelTarget};
use super::targets::JumpTarget;
use super::{CleanupCursor, LabelId, ScopeId};
use crate::core::{IrBuilder, ScopeError, ScopeResult};

/// Active cleanup scopes, jump targets and labels of one function.
///
/// `B` and `S` are the block and slot handles of the [`IrBuilder`] the stack
/// is driven with.
#[derive(Debug)]
pub struct ScopeStack<B, S> {
    pub(super) cleanup_scopes: Vec<CleanupScope<B, S>>,
    /// Gotos not owned by any cleanup scope.
    pub(super) top_level_unresolved_gotos: Vec<GotoJump<B>>,
    pub(super) continue_targets: Vec<JumpTarget<B>>,
    pub(super) break_targets: Vec<JumpTarget<B>>,
    pub(super) label_targets: HashMap<LabelId, LabelTarget<B>>,
    next_scope_id: u32,
}

impl<B, S> Default for ScopeStack<B, S> {
    fn default() -> Self {
        Self {
            cleanup_scopes: Vec::new(),
            top_level_unresolved_gotos: Vec::new(),
            continue_targets: Vec::new(),
            break_targets: Vec::new(),
            label_targets: HashMap::new(),
            next_scope_id: 0,
        }
    }
}

impl<B: Copy + Eq + Debug, S: Copy + Eq + Debug> ScopeStack<B, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor describing the current nesting depth.
    pub fn current_cleanup_scope(&self) -> CleanupCursor {
        CleanupCursor(self.cleanup_scopes.len())
    }

    /// Active scopes, outermost first.
    pub fn scopes(&self) -> &[CleanupScope<B, S>] {
        &self.cleanup_scopes
    }

    /// Enter a cleanup region whose body spans `entry..=exit`.
    pub fn push_cleanup(&mut self, entry: B, exit: B) -> ScopeId {
        let id = ScopeId(self.next_scope_id);
        self.next_scope_id += 1;
        debug!(
            "push cleanup {:?} at depth {} ({:?}..{:?})",
            id,
            self.cleanup_scopes.len(),
            entry,
            exit
        );
        self.cleanup_scopes.push(CleanupScope::new(id, entry, exit));
        id
    }

    /// Branch the current block to `continue_with`, running every cleanup
    /// between the current depth and `target`, innermost first.
    pub fn run_cleanups<I>(
        &mut self,
        ir: &mut I,
        target: CleanupCursor,
        continue_with: B,
    ) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        let depth = self.current_cleanup_scope();
        if target > depth {
            return Err(ScopeError::CursorOutOfRange { target, depth });
        }

        let source = ir.current_block();
        if target == depth {
            ir.set_branch(source, continue_with)?;
            return Ok(());
        }

        let innermost = self.cleanup_scopes[depth.0 - 1].entry;
        ir.set_branch(source, innermost)?;

        // Scope i continues into the entry of scope i - 1 until the last
        // unwound scope hands over to the real destination.
        for i in (target.0..depth.0).rev() {
            let next = if i > target.0 {
                self.cleanup_scopes[i - 1].entry
            } else {
                continue_with
            };
            execute_cleanup(ir, &mut self.cleanup_scopes[i], source, next)?;
        }
        Ok(())
    }

    /// [`run_cleanups`](Self::run_cleanups) down to the function top level.
    pub fn run_all_cleanups<I>(&mut self, ir: &mut I, continue_with: B) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        self.run_cleanups(ir, CleanupCursor::TOP, continue_with)
    }

    /// Close every scope above `target` as control leaves them lexically.
    ///
    /// Pending gotos of a closing scope are routed through its cleanup and
    /// handed to the enclosing scope (or the top level), still waiting on
    /// their placeholder block.
    pub fn pop_cleanups<I>(&mut self, ir: &mut I, target: CleanupCursor) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        let depth = self.current_cleanup_scope();
        if target > depth {
            return Err(ScopeError::CursorOutOfRange { target, depth });
        }

        while self.cleanup_scopes.len() > target.0 {
            let Some(mut scope) = self.cleanup_scopes.pop() else {
                break;
            };
            let gotos = std::mem::take(&mut scope.unresolved_gotos);
            debug!(
                "pop cleanup {:?} with {} pending goto(s)",
                scope.id,
                gotos.len()
            );

            for goto in &gotos {
                // The placeholder goes on serving as the pending target one
                // level up. Only scopes that are already closed may name it as
                // an exit, otherwise rewriting its uses would corrupt a live
                // exit record.
                debug_assert!(
                    !self.is_live_exit_target(goto.tentative_target),
                    "placeholder {:?} is an exit target of an open scope",
                    goto.tentative_target
                );
                ir.replace_all_uses(goto.tentative_target, scope.entry)?;
                execute_cleanup(ir, &mut scope, goto.source_block, goto.tentative_target)?;
            }

            self.current_unresolved_gotos_mut().extend(gotos);
        }
        Ok(())
    }

    fn is_live_exit_target(&self, block: B) -> bool {
        self.cleanup_scopes.iter().any(|scope| {
            scope
                .exits
                .targets()
                .iter()
                .any(|target| target.branch_target == block)
        })
    }

    /// Pending gotos of the innermost scope, or of the top level.
    pub fn current_unresolved_gotos(&self) -> &[GotoJump<B>] {
        match self.cleanup_scopes.last() {
            Some(scope) => &scope.unresolved_gotos,
            None => &self.top_level_unresolved_gotos,
        }
    }

    pub(super) fn current_unresolved_gotos_mut(&mut self) -> &mut Vec<GotoJump<B>> {
        match self.cleanup_scopes.last_mut() {
            Some(scope) => &mut scope.unresolved_gotos,
            None => &mut self.top_level_unresolved_gotos,
        }
    }

    pub fn top_level_unresolved_gotos(&self) -> &[GotoJump<B>] {
        &self.top_level_unresolved_gotos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompilationSession;
    use crate::ir::{Block, FunctionBuilder, Inst, Slot, Terminator};
    use bumpalo::Bump;

    type Stack = ScopeStack<Block, Slot>;

    /// Push `n` nested single-block cleanup scopes.
    fn nested(fb: &mut FunctionBuilder<'_, '_>, stack: &mut Stack, n: usize) -> Vec<Block> {
        (0..n)
            .map(|_| {
                let body = fb.create_block("try.finally");
                stack.push_cleanup(body, body);
                body
            })
            .collect()
    }

    #[test]
    fn test_run_cleanups_at_depth_is_direct_branch() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();
        nested(&mut fb, &mut stack, 2);
        let dest = fb.create_block("dest");

        let depth = stack.current_cleanup_scope();
        stack.run_cleanups(&mut fb, depth, dest).unwrap();

        assert!(stack.scopes().iter().all(|s| s.exits.targets().is_empty()));
        assert_eq!(
            fb.function().terminator(Block::ENTRY),
            Some(&Terminator::Br { target: dest })
        );
    }

    #[test]
    fn test_run_cleanups_chains_scopes() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();
        let bodies = nested(&mut fb, &mut stack, 3);
        let dest = fb.create_block("dest");

        stack.run_all_cleanups(&mut fb, dest).unwrap();

        let func = fb.function();
        assert_eq!(func.terminator(Block::ENTRY), Some(&Terminator::Br { target: bodies[2] }));
        assert_eq!(func.terminator(bodies[2]), Some(&Terminator::Br { target: bodies[1] }));
        assert_eq!(func.terminator(bodies[1]), Some(&Terminator::Br { target: bodies[0] }));
        assert_eq!(func.terminator(bodies[0]), Some(&Terminator::Br { target: dest }));
        for scope in stack.scopes() {
            assert_eq!(scope.exits.targets()[0].source_blocks, vec![Block::ENTRY]);
        }
        assert_eq!(func.slot_count(), 0);
    }

    #[test]
    fn test_run_cleanups_partial_unwind() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();
        let bodies = nested(&mut fb, &mut stack, 3);
        let dest = fb.create_block("dest");

        stack.run_cleanups(&mut fb, CleanupCursor(1), dest).unwrap();

        assert!(stack.scopes()[0].exits.targets().is_empty());
        assert_eq!(fb.function().terminator(bodies[1]), Some(&Terminator::Br { target: dest }));
        assert!(fb.function().terminator(bodies[0]).is_none());
    }

    #[test]
    fn test_cursor_above_depth_is_rejected() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();
        let dest = fb.create_block("dest");

        let err = stack.run_cleanups(&mut fb, CleanupCursor(1), dest).unwrap_err();
        assert_eq!(
            err,
            ScopeError::CursorOutOfRange {
                target: CleanupCursor(1),
                depth: CleanupCursor(0)
            }
        );
        assert!(stack.pop_cleanups(&mut fb, CleanupCursor(2)).is_err());
    }

    #[test]
    fn test_two_sources_two_destinations_through_shared_scope() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();
        let bodies = nested(&mut fb, &mut stack, 1);
        let first = fb.create_block("first");
        let second = fb.create_block("second");

        stack.run_all_cleanups(&mut fb, first).unwrap();
        let other = fb.create_block("other");
        fb.set_current_block(other);
        stack.run_all_cleanups(&mut fb, second).unwrap();

        let slot = stack.scopes()[0].exits.selector().unwrap();
        let func = fb.function();
        assert_eq!(func.insts(Block::ENTRY), &[Inst::Store { slot, value: 0 }]);
        assert_eq!(func.insts(other), &[Inst::Store { slot, value: 1 }]);
        assert!(matches!(
            func.terminator(bodies[0]),
            Some(Terminator::Switch { default, cases, .. })
                if *default == first && cases == &vec![(1, second)]
        ));

        stack.pop_cleanups(&mut fb, CleanupCursor::TOP).unwrap();
        assert!(stack.scopes().is_empty());
    }
}
