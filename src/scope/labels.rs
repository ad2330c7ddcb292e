//! Labels and forward goto resolution.
//!
//! A goto to a label that has not been seen yet branches to a placeholder
//! block and waits in the unresolved list of the innermost scope. When the
//! label shows up in that same scope the placeholder is replaced by the label
//! block. When the scope closes first, [`ScopeStack::pop_cleanups`] routes the
//! goto through the cleanup and moves it one level out, so the goto collects
//! exactly one cleanup edge per scope it leaves.

use std::fmt::Debug;

use log::{debug, trace};

use super::stack::ScopeStack;
use super::{CleanupCursor, LabelId, ScopeId};
use crate::core::{Diagnostics, IrBuilder, Loc, ScopeError, ScopeResult};

/// A goto whose label was not known when it was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GotoJump<B> {
    pub source_loc: Loc,
    /// Block the goto was emitted from.
    pub source_block: B,
    /// Placeholder the goto currently branches to.
    pub tentative_target: B,
    pub target_label: LabelId,
}

/// A defined label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTarget<B> {
    pub target_block: B,
    pub cleanup_scope: CleanupCursor,
    /// Innermost scope active at the definition, if any.
    pub owner: Option<ScopeId>,
}

impl<B: Copy + Eq + Debug, S: Copy + Eq + Debug> ScopeStack<B, S> {
    /// Define `label` at `target_block` and resolve the gotos of the current
    /// nesting level that wait for it.
    pub fn add_label_target<I>(&mut self, ir: &mut I, label: LabelId, target_block: B) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        if self.label_targets.contains_key(&label) {
            return Err(ScopeError::LabelRedefined { label });
        }
        let target = LabelTarget {
            target_block,
            cleanup_scope: self.current_cleanup_scope(),
            owner: self.cleanup_scopes.last().map(|scope| scope.id),
        };
        self.label_targets.insert(label, target);

        let pending = std::mem::take(self.current_unresolved_gotos_mut());
        let (resolved, waiting): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|goto| goto.target_label == label);
        *self.current_unresolved_gotos_mut() = waiting;

        for goto in resolved {
            debug!(
                "resolved goto at {} to {:?}: {:?} -> {:?}",
                goto.source_loc, label, goto.tentative_target, target_block
            );
            ir.replace_all_uses(goto.tentative_target, target_block)?;
            ir.erase_block(goto.tentative_target)?;
        }
        Ok(())
    }

    /// Emit a goto to `label` from the current block.
    pub fn jump_to_label<I>(&mut self, ir: &mut I, loc: Loc, label: LabelId) -> ScopeResult<()>
    where
        I: IrBuilder<Block = B, Slot = S>,
    {
        if let Some(target) = self.label_targets.get(&label).copied() {
            if self.is_reachable(&target) {
                trace!("backward goto at {} to {:?}", loc, label);
                return self.run_cleanups(ir, target.cleanup_scope, target.target_block);
            }

            // The label sits in a scope that is no longer open. Park the jump
            // on the top level where the end-of-function check reports it.
            let placeholder = ir.create_block("goto.unresolved");
            let source = ir.current_block();
            ir.set_branch(source, placeholder)?;
            self.top_level_unresolved_gotos.push(GotoJump {
                source_loc: loc,
                source_block: source,
                tentative_target: placeholder,
                target_label: label,
            });
            return Ok(());
        }

        let placeholder = ir.create_block("goto.unresolved");
        let source = ir.current_block();
        ir.set_branch(source, placeholder)?;
        trace!("forward goto at {} to {:?} via {:?}", loc, label, placeholder);
        self.current_unresolved_gotos_mut().push(GotoJump {
            source_loc: loc,
            source_block: source,
            tentative_target: placeholder,
            target_label: label,
        });
        Ok(())
    }

    pub fn label_target(&self, label: LabelId) -> Option<&LabelTarget<B>> {
        self.label_targets.get(&label)
    }

    /// Whether every scope active at the label definition is still open.
    fn is_reachable(&self, target: &LabelTarget<B>) -> bool {
        let depth = target.cleanup_scope.0;
        if depth > self.cleanup_scopes.len() {
            return false;
        }
        match (depth, target.owner) {
            (0, _) => true,
            (n, Some(owner)) => self.cleanup_scopes[n - 1].id == owner,
            (_, None) => false,
        }
    }

    /// End-of-function check.
    ///
    /// Every goto still pending at the top level gets one error, followed by
    /// a single [`Diagnostics::fatal`].
    pub fn finish(self, diagnostics: &mut dyn Diagnostics) -> ScopeResult<()> {
        if !self.cleanup_scopes.is_empty() {
            return Err(ScopeError::UnbalancedScopes {
                open: self.cleanup_scopes.len(),
            });
        }
        if self.top_level_unresolved_gotos.is_empty() {
            return Ok(());
        }

        for goto in &self.top_level_unresolved_gotos {
            let message = if self.label_targets.contains_key(&goto.target_label) {
                "goto into try/finally scope is not allowed"
            } else {
                "goto to undefined label"
            };
            diagnostics.error(goto.source_loc, message);
        }
        diagnostics.fatal();
        Err(ScopeError::UnresolvedGotos {
            count: self.top_level_unresolved_gotos.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CompilationSession, DiagnosticSink};
    use crate::ir::{Block, FunctionBuilder, Slot, Terminator};
    use bumpalo::Bump;

    type Stack = ScopeStack<Block, Slot>;

    #[test]
    fn test_forward_goto_same_level_removes_placeholder() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();

        stack.jump_to_label(&mut fb, Loc::new(1, 1), LabelId(0)).unwrap();
        let placeholder = stack.current_unresolved_gotos()[0].tentative_target;

        let label = fb.create_block("label.end");
        stack.add_label_target(&mut fb, LabelId(0), label).unwrap();

        assert!(stack.current_unresolved_gotos().is_empty());
        let func = fb.function();
        assert!(func.block(placeholder).erased);
        assert_eq!(func.terminator(Block::ENTRY), Some(&Terminator::Br { target: label }));
        assert_eq!(session.stats().placeholders_erased, 1);

        let mut sink = DiagnosticSink::new();
        stack.finish(&mut sink).unwrap();
        assert_eq!(sink.error_count(), 0);
        assert!(!sink.is_fatal());
    }

    #[test]
    fn test_backward_goto_runs_cleanups() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();

        let label = fb.create_block("label.top");
        stack.add_label_target(&mut fb, LabelId(0), label).unwrap();
        let body = fb.create_block("try.finally");
        stack.push_cleanup(body, body);

        stack.jump_to_label(&mut fb, Loc::new(2, 1), LabelId(0)).unwrap();
        assert_eq!(fb.function().terminator(Block::ENTRY), Some(&Terminator::Br { target: body }));
        assert_eq!(fb.function().terminator(body), Some(&Terminator::Br { target: label }));
    }

    #[test]
    fn test_goto_into_closed_sibling_scope_is_reported() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();

        let first = fb.create_block("try.finally");
        stack.push_cleanup(first, first);
        let label = fb.create_block("label.inside");
        stack.add_label_target(&mut fb, LabelId(0), label).unwrap();
        stack.run_all_cleanups(&mut fb, label).unwrap();
        stack.pop_cleanups(&mut fb, CleanupCursor::TOP).unwrap();

        let second = fb.create_block("try.finally");
        let inside = fb.create_block("inside");
        fb.set_current_block(inside);
        stack.push_cleanup(second, second);
        stack.jump_to_label(&mut fb, Loc::new(9, 3), LabelId(0)).unwrap();
        stack.pop_cleanups(&mut fb, CleanupCursor::TOP).unwrap();

        let mut sink = DiagnosticSink::new();
        let err = stack.finish(&mut sink).unwrap_err();
        assert_eq!(err, ScopeError::UnresolvedGotos { count: 1 });
        assert_eq!(sink.diagnostics()[0].loc, Loc::new(9, 3));
        assert_eq!(
            sink.diagnostics()[0].message,
            "goto into try/finally scope is not allowed"
        );
        assert!(sink.is_fatal());
    }

    #[test]
    fn test_label_redefinition_is_rejected() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();
        let a = fb.create_block("label.a");
        let b = fb.create_block("label.a");

        stack.add_label_target(&mut fb, LabelId(4), a).unwrap();
        assert_eq!(
            stack.add_label_target(&mut fb, LabelId(4), b),
            Err(ScopeError::LabelRedefined { label: LabelId(4) })
        );
    }

    #[test]
    fn test_finish_with_open_scope_is_internal_error() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let mut stack = Stack::new();
        let body = fb.create_block("try.finally");
        stack.push_cleanup(body, body);

        let mut sink = DiagnosticSink::new();
        assert_eq!(
            stack.finish(&mut sink),
            Err(ScopeError::UnbalancedScopes { open: 1 })
        );
        assert_eq!(sink.error_count(), 0);
    }
}
