// This module lowers statement scripts into the arena IR, acting as the statement-level
// caller of the cleanup scope stack. Structured statements become blocks and branches
// directly; every jump (break, continue, goto, return) goes through the ScopeStack, which
// threads it through the try/finally regions it leaves. A try/finally emits its finally
// body once, before the try body, and registers it as a cleanup scope whose exit is the
// block where the body ends. Lexical checks that need the statement structure (break and
// continue targets, jumps into or out of a finally body) are done here before the stack
// is called; gotos that can never be resolved are left to the stack's end-of-function
// check. Code following a jump lands in a fresh `dead` block which is dropped again when
// it stays empty.

//! Statement lowering.

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};
use thiserror::Error;

use crate::core::{CompilationSession, Diagnostics, IrBuilder, IrError, Loc, ScopeError};
use crate::ir::{Block, Function, FunctionBuilder, Slot};
use crate::scope::{JumpKind, LabelId, ScopeStack, StmtId};
use crate::script::{FunctionDef, Script, Stmt, StmtKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    /// A jump the source language forbids. Already reported to the
    /// diagnostics sink, followed by a fatal stop.
    #[error("{loc}: {reason}")]
    InvalidJump { loc: Loc, reason: String },

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Ir(#[from] IrError),
}

pub type LowerResult<T> = Result<T, LowerError>;

/// Lower every function of `script`, stopping at the first error.
pub fn lower_script<'arena>(
    session: &CompilationSession<'arena>,
    script: &Script,
    diagnostics: &mut dyn Diagnostics,
) -> LowerResult<Vec<Function<'arena>>> {
    script
        .functions
        .iter()
        .map(|def| lower_function(session, def, diagnostics))
        .collect()
}

/// Lower one function.
///
/// Unresolvable gotos are reported to `diagnostics` and make this return
/// `LowerError::Scope(ScopeError::UnresolvedGotos { .. })`.
pub fn lower_function<'arena>(
    session: &CompilationSession<'arena>,
    def: &FunctionDef,
    diagnostics: &mut dyn Diagnostics,
) -> LowerResult<Function<'arena>> {
    debug!("lowering function {}", def.name);

    let mut label_regions = HashMap::new();
    collect_label_regions(&def.body, None, &mut label_regions);

    let mut lowerer = Lowerer {
        def,
        fb: FunctionBuilder::new(session, &def.name),
        scopes: ScopeStack::new(),
        diagnostics,
        constructs: Vec::new(),
        finally: None,
        label_regions,
        pending: HashSet::new(),
        dead_blocks: Vec::new(),
        return_block: None,
    };
    lowerer.lower_body(&def.body)?;
    let func = lowerer.finish()?;

    session.record(|s| s.functions_lowered += 1);
    Ok(func)
}

/// Map each label to the finally body it is defined in.
fn collect_label_regions(
    stmts: &[Stmt],
    region: Option<StmtId>,
    out: &mut HashMap<LabelId, Option<StmtId>>,
) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Label(label) => {
                out.insert(*label, region);
            }
            StmtKind::Block(body)
            | StmtKind::While { body, .. }
            | StmtKind::Loop { body, .. } => collect_label_regions(body, region, out),
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                collect_label_regions(then_body, region, out);
                if let Some(body) = else_body {
                    collect_label_regions(body, region, out);
                }
            }
            StmtKind::Switch { cases, default, .. } => {
                for (_, body) in cases {
                    collect_label_regions(body, region, out);
                }
                if let Some(body) = default {
                    collect_label_regions(body, region, out);
                }
            }
            StmtKind::TryFinally {
                id,
                body,
                finally_body,
            } => {
                collect_label_regions(body, region, out);
                collect_label_regions(finally_body, Some(*id), out);
            }
            StmtKind::Call(_)
            | StmtKind::Break(_)
            | StmtKind::Continue(_)
            | StmtKind::Goto(_)
            | StmtKind::Return => {}
        }
    }
}

/// An enclosing loop or switch, for break/continue validation.
#[derive(Debug, Clone, Copy)]
struct Construct {
    stmt: StmtId,
    label: Option<LabelId>,
    is_loop: bool,
    /// Finally body the construct sits in.
    finally: Option<StmtId>,
}

struct Lowerer<'f, 's, 'arena, 'd> {
    def: &'f FunctionDef,
    fb: FunctionBuilder<'s, 'arena>,
    scopes: ScopeStack<Block, Slot>,
    diagnostics: &'d mut dyn Diagnostics,
    constructs: Vec<Construct>,
    /// Innermost finally body being lowered.
    finally: Option<StmtId>,
    label_regions: HashMap<LabelId, Option<StmtId>>,
    /// Blocks that may still gain predecessors: labels and cleanup entries.
    pending: HashSet<Block>,
    dead_blocks: Vec<Block>,
    return_block: Option<Block>,
}

impl<'f, 's, 'arena, 'd> Lowerer<'f, 's, 'arena, 'd> {
    fn lower_body(&mut self, stmts: &[Stmt]) -> LowerResult<()> {
        for stmt in stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> LowerResult<()> {
        trace!("{}: {:?}", stmt.loc, stmt.kind);
        match &stmt.kind {
            StmtKind::Call(callee) => self.fb.call(callee)?,
            StmtKind::Block(body) => self.lower_body(body)?,
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.lower_if(cond, then_body, else_body.as_deref())?,
            StmtKind::While {
                id,
                label,
                cond,
                body,
            } => self.lower_while(*id, *label, cond, body)?,
            StmtKind::Loop { id, label, body } => self.lower_loop(*id, *label, body)?,
            StmtKind::Switch {
                id,
                label,
                value,
                cases,
                default,
            } => self.lower_switch(*id, *label, value, cases, default.as_deref())?,
            StmtKind::TryFinally {
                id,
                body,
                finally_body,
            } => self.lower_try_finally(*id, body, finally_body)?,
            StmtKind::Break(label) => {
                let target = self.jump_construct(stmt.loc, JumpKind::Break, *label)?;
                match label {
                    Some(_) => self.scopes.break_to_statement(&mut self.fb, target)?,
                    None => self.scopes.break_to_closest(&mut self.fb)?,
                }
                self.start_dead();
            }
            StmtKind::Continue(label) => {
                let target = self.jump_construct(stmt.loc, JumpKind::Continue, *label)?;
                match label {
                    Some(_) => self.scopes.continue_to_statement(&mut self.fb, target)?,
                    None => self.scopes.continue_to_closest(&mut self.fb)?,
                }
                self.start_dead();
            }
            StmtKind::Goto(label) => {
                if let Some(region) = self.label_regions.get(label).copied() {
                    if region != self.finally {
                        let reason = if region.is_some() {
                            "cannot jump into a finally block"
                        } else {
                            "cannot jump out of a finally block"
                        };
                        return self.invalid_jump(stmt.loc, reason.to_string());
                    }
                }
                self.scopes.jump_to_label(&mut self.fb, stmt.loc, *label)?;
                self.start_dead();
            }
            StmtKind::Label(label) => {
                let block = self.fb.create_block(self.def.label_name(*label));
                self.pending.insert(block);
                self.close_block(block)?;
                self.scopes.add_label_target(&mut self.fb, *label, block)?;
                self.fb.set_current_block(block);
            }
            StmtKind::Return => {
                if self.finally.is_some() {
                    return self.invalid_jump(
                        stmt.loc,
                        "return statement is not allowed in a finally block".to_string(),
                    );
                }
                let ret = self.return_block();
                self.scopes.run_all_cleanups(&mut self.fb, ret)?;
                self.start_dead();
            }
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        cond: &str,
        then_body: &[Stmt],
        else_body: Option<&[Stmt]>,
    ) -> LowerResult<()> {
        let cond = self.fb.eval(cond)?;
        let then_block = self.fb.create_block("if.then");
        let else_block = match else_body {
            Some(_) => Some(self.fb.create_block("if.else")),
            None => None,
        };
        let end = self.fb.create_block("if.end");

        let current = self.fb.current_block();
        self.fb
            .cond_branch(current, cond, then_block, else_block.unwrap_or(end))?;

        self.fb.set_current_block(then_block);
        self.lower_body(then_body)?;
        self.close_block(end)?;

        if let (Some(block), Some(body)) = (else_block, else_body) {
            self.fb.set_current_block(block);
            self.lower_body(body)?;
            self.close_block(end)?;
        }
        self.fb.set_current_block(end);
        Ok(())
    }

    fn lower_while(
        &mut self,
        id: StmtId,
        label: Option<LabelId>,
        cond: &str,
        body: &[Stmt],
    ) -> LowerResult<()> {
        let header = self.fb.create_block("while.cond");
        let body_block = self.fb.create_block("while.body");
        let end = self.fb.create_block("while.end");
        self.close_block(header)?;

        self.fb.set_current_block(header);
        let cond = self.fb.eval(cond)?;
        self.fb.cond_branch(header, cond, body_block, end)?;

        self.scopes.push_loop_target(id, header, end);
        self.enter_construct(id, label, true);
        self.fb.set_current_block(body_block);
        self.lower_body(body)?;
        self.close_block(header)?;
        self.constructs.pop();
        self.scopes.pop_loop_target();

        self.fb.set_current_block(end);
        Ok(())
    }

    fn lower_loop(&mut self, id: StmtId, label: Option<LabelId>, body: &[Stmt]) -> LowerResult<()> {
        let body_block = self.fb.create_block("loop.body");
        let end = self.fb.create_block("loop.end");
        self.close_block(body_block)?;

        self.scopes.push_loop_target(id, body_block, end);
        self.enter_construct(id, label, true);
        self.fb.set_current_block(body_block);
        self.lower_body(body)?;
        self.close_block(body_block)?;
        self.constructs.pop();
        self.scopes.pop_loop_target();

        self.fb.set_current_block(end);
        Ok(())
    }

    fn lower_switch(
        &mut self,
        id: StmtId,
        label: Option<LabelId>,
        value: &str,
        cases: &[(u32, Vec<Stmt>)],
        default: Option<&[Stmt]>,
    ) -> LowerResult<()> {
        let value = self.fb.eval(value)?;
        let case_blocks: Vec<(u32, Block)> = cases
            .iter()
            .map(|(case, _)| (*case, self.fb.create_block("switch.case")))
            .collect();
        let default_block = match default {
            Some(_) => Some(self.fb.create_block("switch.default")),
            None => None,
        };
        let end = self.fb.create_block("switch.end");
        self.fb
            .switch(value, default_block.unwrap_or(end), &case_blocks)?;

        self.scopes.push_break_target(id, end);
        self.enter_construct(id, label, false);
        for ((_, block), (_, body)) in case_blocks.iter().zip(cases) {
            self.fb.set_current_block(*block);
            self.lower_body(body)?;
            self.close_block(end)?;
        }
        if let (Some(block), Some(body)) = (default_block, default) {
            self.fb.set_current_block(block);
            self.lower_body(body)?;
            self.close_block(end)?;
        }
        self.constructs.pop();
        self.scopes.pop_break_target();

        self.fb.set_current_block(end);
        Ok(())
    }

    fn lower_try_finally(
        &mut self,
        id: StmtId,
        body: &[Stmt],
        finally_body: &[Stmt],
    ) -> LowerResult<()> {
        let cursor = self.scopes.current_cleanup_scope();
        let try_block = self.fb.create_block("try");
        let finally_block = self.fb.create_block("try.finally");
        let success = self.fb.create_block("try.success");
        self.close_block(try_block)?;

        // The finally body is emitted once, ahead of every jump that needs it.
        self.pending.insert(finally_block);
        self.fb.set_current_block(finally_block);
        let outer_finally = self.finally.replace(id);
        self.lower_body(finally_body)?;
        self.finally = outer_finally;
        let exit = self.fb.current_block();
        self.scopes.push_cleanup(finally_block, exit);

        self.fb.set_current_block(try_block);
        self.lower_body(body)?;
        let current = self.fb.current_block();
        if self.is_dead(current) {
            self.fb.unreachable(current)?;
        } else {
            self.scopes.run_cleanups(&mut self.fb, cursor, success)?;
        }
        self.scopes.pop_cleanups(&mut self.fb, cursor)?;

        if !self.fb.is_terminated(exit) {
            // Nothing ever entered the finally body.
            self.fb.unreachable(exit)?;
        }
        self.fb.set_current_block(success);
        Ok(())
    }

    fn enter_construct(&mut self, stmt: StmtId, label: Option<LabelId>, is_loop: bool) {
        self.constructs.push(Construct {
            stmt,
            label,
            is_loop,
            finally: self.finally,
        });
    }

    /// Validate a break/continue and return the statement it targets.
    fn jump_construct(
        &mut self,
        loc: Loc,
        kind: JumpKind,
        label: Option<LabelId>,
    ) -> LowerResult<StmtId> {
        let found = self
            .constructs
            .iter()
            .rev()
            .find(|c| match label {
                Some(label) => c.label == Some(label),
                None => kind == JumpKind::Break || c.is_loop,
            })
            .copied();

        let construct = match (found, label) {
            (Some(construct), _) => construct,
            (None, None) => {
                let reason = match kind {
                    JumpKind::Break => "break statement is not within a loop or switch",
                    JumpKind::Continue => "continue statement is not within a loop",
                };
                return self.invalid_jump(loc, reason.to_string());
            }
            (None, Some(label)) => {
                let reason = format!(
                    "label '{}' does not name an enclosing loop or switch",
                    self.def.label_name(label)
                );
                return self.invalid_jump(loc, reason);
            }
        };

        if kind == JumpKind::Continue && !construct.is_loop {
            let reason = format!(
                "continue target '{}' is not a loop",
                label.map_or("?", |l| self.def.label_name(l))
            );
            return self.invalid_jump(loc, reason);
        }
        if construct.finally != self.finally {
            return self.invalid_jump(loc, "cannot jump out of a finally block".to_string());
        }
        Ok(construct.stmt)
    }

    fn invalid_jump<T>(&mut self, loc: Loc, reason: String) -> LowerResult<T> {
        self.diagnostics.error(loc, &reason);
        self.diagnostics.fatal();
        Err(LowerError::InvalidJump { loc, reason })
    }

    fn return_block(&mut self) -> Block {
        match self.return_block {
            Some(block) => block,
            None => {
                let block = self.fb.create_block("return");
                self.return_block = Some(block);
                block
            }
        }
    }

    /// Continue in a fresh block after a jump.
    fn start_dead(&mut self) {
        let dead = self.fb.create_block("dead");
        self.dead_blocks.push(dead);
        self.fb.set_current_block(dead);
    }

    /// Whether control can never reach `block`.
    fn is_dead(&self, block: Block) -> bool {
        block != Block::ENTRY
            && !self.pending.contains(&block)
            && self.fb.function().predecessors(block).is_empty()
    }

    /// End the current block with a fallthrough into `next`.
    fn close_block(&mut self, next: Block) -> LowerResult<()> {
        let current = self.fb.current_block();
        if self.is_dead(current) {
            self.fb.unreachable(current)?;
        } else {
            self.fb.set_branch(current, next)?;
        }
        Ok(())
    }

    fn finish(mut self) -> LowerResult<Function<'arena>> {
        let current = self.fb.current_block();
        if self.is_dead(current) {
            self.fb.unreachable(current)?;
        } else if let Some(ret) = self.return_block {
            self.scopes.run_all_cleanups(&mut self.fb, ret)?;
        } else {
            self.fb.ret(current)?;
        }
        if let Some(ret) = self.return_block {
            self.fb.ret(ret)?;
        }

        for &block in &self.dead_blocks {
            if self.fb.function().insts(block).is_empty() && self.is_dead(block) {
                self.fb.drop_block(block)?;
            }
        }

        self.scopes.finish(self.diagnostics)?;
        Ok(self.fb.finish())
    }
}
