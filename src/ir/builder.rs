//! [`IrBuilder`] implementation over the arena [`Function`].

use hashbrown::HashSet;

use super::{Block, Function, Inst, Slot, Terminator, Value};
use crate::core::{CompilationSession, IrBuilder, IrError, IrResult};

/// Builds one [`Function`] and tracks the current insertion block.
///
/// Block and slot names are made unique within the function by appending
/// `.1`, `.2`, ... to repeated names.
pub struct FunctionBuilder<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    func: Function<'arena>,
    current: Block,
    block_names: HashSet<&'arena str>,
    slot_names: HashSet<&'arena str>,
}

impl<'s, 'arena> FunctionBuilder<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>, name: &str) -> Self {
        let func = Function::new(session.intern_str(name));
        let mut block_names = HashSet::new();
        block_names.insert(func.block_name(Block::ENTRY));
        session.record(|s| s.blocks_created += 1);
        Self {
            session,
            func,
            current: Block::ENTRY,
            block_names,
            slot_names: HashSet::new(),
        }
    }

    /// The function built so far.
    pub fn function(&self) -> &Function<'arena> {
        &self.func
    }

    pub fn finish(self) -> Function<'arena> {
        self.func
    }

    pub fn is_terminated(&self, block: Block) -> bool {
        self.func.terminator(block).is_some()
    }

    /// Append `call @callee` to the current block.
    pub fn call(&mut self, callee: &str) -> IrResult<()> {
        let callee = self.session.intern_str(callee);
        self.append(Inst::Call { callee })
    }

    /// Append `%v = eval @callee` to the current block and return `%v`.
    pub fn eval(&mut self, callee: &str) -> IrResult<Value> {
        let callee = self.session.intern_str(callee);
        let result = self.func.new_value();
        self.append(Inst::Eval { callee, result })?;
        Ok(result)
    }

    pub fn cond_branch(
        &mut self,
        block: Block,
        cond: Value,
        then_block: Block,
        else_block: Block,
    ) -> IrResult<()> {
        self.func.ensure_live(block)?;
        self.func.set_terminator(
            block,
            Some(Terminator::CondBr {
                cond,
                then_block,
                else_block,
            }),
        );
        Ok(())
    }

    pub fn ret(&mut self, block: Block) -> IrResult<()> {
        self.func.ensure_live(block)?;
        self.func.set_terminator(block, Some(Terminator::Ret));
        Ok(())
    }

    pub fn unreachable(&mut self, block: Block) -> IrResult<()> {
        self.func.ensure_live(block)?;
        self.func.set_terminator(block, Some(Terminator::Unreachable));
        Ok(())
    }

    /// Remove an unreachable block. Unlike [`IrBuilder::erase_block`] this is
    /// not counted as a resolved placeholder.
    pub fn drop_block(&mut self, block: Block) -> IrResult<()> {
        self.func.ensure_live(block)?;
        self.func.erase(block)
    }

    /// Terminate the current block with `switch` on `value` over `cases`.
    pub fn switch(&mut self, value: Value, default: Block, cases: &[(u32, Block)]) -> IrResult<()> {
        let block = self.current;
        self.set_switch(block, value, default, cases.len())?;
        for &(case, target) in cases {
            self.func.ensure_live(target)?;
            self.func.add_case(block, case, target)?;
        }
        Ok(())
    }

    fn append(&mut self, inst: Inst<'arena>) -> IrResult<()> {
        let block = self.current;
        self.func.ensure_live(block)?;
        if self.is_terminated(block) {
            return Err(IrError::AlreadyTerminated {
                block: self.func.block_name(block).to_string(),
            });
        }
        self.func.blocks[block.index()].insts.push(inst);
        Ok(())
    }

    fn unique_name(
        session: &CompilationSession<'arena>,
        taken: &mut HashSet<&'arena str>,
        base: &str,
    ) -> &'arena str {
        let mut candidate = session.intern_str(base);
        let mut suffix = 1;
        while taken.contains(candidate) {
            candidate = session.intern_str(&format!("{}.{}", base, suffix));
            suffix += 1;
        }
        taken.insert(candidate);
        candidate
    }
}

impl<'s, 'arena> IrBuilder for FunctionBuilder<'s, 'arena> {
    type Block = Block;
    type Slot = Slot;
    type Value = Value;

    fn create_block(&mut self, name: &str) -> Block {
        let name = Self::unique_name(self.session, &mut self.block_names, name);
        self.session.record(|s| s.blocks_created += 1);
        self.func.add_block(name)
    }

    fn current_block(&self) -> Block {
        self.current
    }

    fn set_current_block(&mut self, block: Block) {
        self.current = block;
    }

    fn block_name(&self, block: Block) -> &str {
        self.func.block_name(block)
    }

    fn set_branch(&mut self, block: Block, target: Block) -> IrResult<()> {
        self.func.ensure_live(block)?;
        self.func.ensure_live(target)?;
        self.func
            .set_terminator(block, Some(Terminator::Br { target }));
        Ok(())
    }

    fn remove_terminator(&mut self, block: Block) -> IrResult<()> {
        self.func.ensure_live(block)?;
        self.func.set_terminator(block, None);
        Ok(())
    }

    fn set_switch(
        &mut self,
        block: Block,
        value: Value,
        default: Block,
        expected_cases: usize,
    ) -> IrResult<()> {
        self.func.ensure_live(block)?;
        self.func.ensure_live(default)?;
        self.func.set_terminator(
            block,
            Some(Terminator::Switch {
                value,
                default,
                cases: Vec::with_capacity(expected_cases),
            }),
        );
        Ok(())
    }

    fn add_switch_case(&mut self, block: Block, case: u32, target: Block) -> IrResult<()> {
        self.func.ensure_live(target)?;
        self.func.add_case(block, case, target)?;
        self.session.record(|s| s.switch_cases_added += 1);
        Ok(())
    }

    fn alloc_selector(&mut self, name: &str) -> Slot {
        let name = Self::unique_name(self.session, &mut self.slot_names, name);
        self.session.record(|s| s.selectors_allocated += 1);
        self.func.add_slot(name)
    }

    fn store_before_terminator(&mut self, block: Block, slot: Slot, value: u32) -> IrResult<()> {
        self.func.ensure_live(block)?;
        if !self.is_terminated(block) {
            return Err(IrError::MissingTerminator {
                block: self.func.block_name(block).to_string(),
            });
        }
        // The terminator is held apart from the instruction list, so the end
        // of the list is the position right in front of it.
        self.func.blocks[block.index()]
            .insts
            .push(Inst::Store { slot, value });
        self.session.record(|s| s.selector_stores += 1);
        Ok(())
    }

    fn load_slot(&mut self, block: Block, slot: Slot) -> IrResult<Value> {
        self.func.ensure_live(block)?;
        if self.is_terminated(block) {
            return Err(IrError::AlreadyTerminated {
                block: self.func.block_name(block).to_string(),
            });
        }
        let result = self.func.new_value();
        self.func.blocks[block.index()]
            .insts
            .push(Inst::Load { slot, result });
        Ok(result)
    }

    fn replace_all_uses(&mut self, old: Block, new: Block) -> IrResult<()> {
        self.func.ensure_live(new)?;
        self.func.redirect_uses(old, new);
        Ok(())
    }

    fn erase_block(&mut self, block: Block) -> IrResult<()> {
        self.func.ensure_live(block)?;
        self.func.erase(block)?;
        self.session.record(|s| s.placeholders_erased += 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_block_names_are_unique() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");

        let a = fb.create_block("dead");
        let b = fb.create_block("dead");
        let c = fb.create_block("entry");
        assert_eq!(fb.block_name(a), "dead");
        assert_eq!(fb.block_name(b), "dead.1");
        assert_eq!(fb.block_name(c), "entry.1");
        assert_eq!(session.stats().blocks_created, 4);
    }

    #[test]
    fn test_store_needs_terminator() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        let slot = fb.alloc_selector("branchsel.x");

        assert!(matches!(
            fb.store_before_terminator(Block::ENTRY, slot, 0),
            Err(IrError::MissingTerminator { .. })
        ));

        let next = fb.create_block("next");
        fb.call("work").unwrap();
        fb.set_branch(Block::ENTRY, next).unwrap();
        fb.store_before_terminator(Block::ENTRY, slot, 3).unwrap();

        let func = fb.finish();
        assert_eq!(
            func.insts(Block::ENTRY),
            &[
                Inst::Call { callee: "work" },
                Inst::Store { slot, value: 3 }
            ]
        );
        assert_eq!(func.terminator(Block::ENTRY), Some(&Terminator::Br { target: next }));
    }

    #[test]
    fn test_append_after_terminator_fails() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut fb = FunctionBuilder::new(&session, "f");
        fb.ret(Block::ENTRY).unwrap();

        assert!(matches!(fb.call("late"), Err(IrError::AlreadyTerminated { .. })));
    }
}
