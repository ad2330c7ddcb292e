// This module defines the IrBuilder trait, the bridge between the cleanup scope stack
// and whatever SSA IR the surrounding code generator emits. The stack never owns blocks
// or instructions; it holds copyable handles and asks the builder to create blocks,
// set or replace terminators (plain branches and multi-way switches with an extensible
// case list), allocate entry-scoped selector slots, insert selector stores in front of
// an existing terminator, load a selector when a switch is introduced, and redirect all
// incoming edges of a placeholder block. The builder also carries the code-generation
// context (the current insertion block), so every stack operation receives it
// explicitly instead of reaching for ambient state.

//! Builder responsibilities.
//!
//! The builder is the glue between the scope stack and the IR of the function
//! being generated. The stack assumes:
//! - Blocks are identified by cheap `Copy` handles compared by identity.
//! - Every block ends in at most one terminator, which may be replaced.
//! - Selector slots live in the function entry and hold an `i32`.
//! - `replace_all_uses` rewrites every terminator operand naming a block.
//!
//! [`crate::ir::FunctionBuilder`] implements the trait for the crate's arena IR.

use std::fmt::Debug;

use super::error::IrResult;

/// Mutation interface the cleanup scope stack needs from an SSA IR.
pub trait IrBuilder {
    type Block: Copy + Eq + Debug;
    type Slot: Copy + Eq + Debug;
    type Value: Copy + Eq + Debug;

    /// Create a new block attached to the current function.
    fn create_block(&mut self, name: &str) -> Self::Block;

    /// Block that code is currently emitted into.
    fn current_block(&self) -> Self::Block;

    /// Move the insertion point to the end of `block`.
    fn set_current_block(&mut self, block: Self::Block);

    /// Name of a block, used to derive selector slot names.
    fn block_name(&self, block: Self::Block) -> &str;

    /// Set or replace the terminator of `block` with `br target`.
    fn set_branch(&mut self, block: Self::Block, target: Self::Block) -> IrResult<()>;

    /// Drop the terminator of `block`, leaving it open for new instructions.
    fn remove_terminator(&mut self, block: Self::Block) -> IrResult<()>;

    /// Terminate `block` with a switch on `value`.
    ///
    /// `expected_cases` is a capacity hint only.
    fn set_switch(
        &mut self,
        block: Self::Block,
        value: Self::Value,
        default: Self::Block,
        expected_cases: usize,
    ) -> IrResult<()>;

    /// Append a case to the switch terminating `block`.
    fn add_switch_case(&mut self, block: Self::Block, case: u32, target: Self::Block)
        -> IrResult<()>;

    /// Allocate a function-scoped `i32` slot.
    fn alloc_selector(&mut self, name: &str) -> Self::Slot;

    /// Insert `store value, slot` immediately before the terminator of `block`.
    fn store_before_terminator(
        &mut self,
        block: Self::Block,
        slot: Self::Slot,
        value: u32,
    ) -> IrResult<()>;

    /// Append a load of `slot` to the end of the (unterminated) `block`.
    fn load_slot(&mut self, block: Self::Block, slot: Self::Slot) -> IrResult<Self::Value>;

    /// Redirect every terminator operand naming `old` to `new`.
    fn replace_all_uses(&mut self, old: Self::Block, new: Self::Block) -> IrResult<()>;

    /// Remove a block that no longer has incoming edges.
    fn erase_block(&mut self, block: Self::Block) -> IrResult<()>;
}
