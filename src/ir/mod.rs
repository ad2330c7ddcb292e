//! Arena IR the scope stack lowers into.
//!
//! Functions keep blocks and selector slots in flat vectors addressed by `u32`
//! handles. Control flow lives only in block terminators, and every block
//! records the terminator operands that name it (its use list), so
//! redirecting a placeholder is a rewrite of the recorded operands rather than
//! pointer surgery.
//!
//! # Text Format
//!
//! ```text
//! function main {
//!   %branchsel.try.finally = alloca i32
//! entry:
//!   call @work
//!   store 1, %branchsel.try.finally
//!   br ^try.finally
//! try.finally:
//!   call @release
//!   %0 = load %branchsel.try.finally
//!   switch %0, ^try.success [1 -> ^return]
//! }
//! ```

use std::fmt;

use crate::core::{IrError, IrResult};

pub mod builder;

pub use builder::FunctionBuilder;

/// Handle of a basic block within one [`Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(pub u32);

impl Block {
    /// The entry block every function starts with.
    pub const ENTRY: Block = Block(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of an entry-scoped `i32` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(pub u32);

/// Handle of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(pub u32);

/// Non-terminator instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst<'arena> {
    /// Opaque straight-line code.
    Call { callee: &'arena str },
    /// Opaque condition producing a value.
    Eval { callee: &'arena str, result: Value },
    Load { slot: Slot, result: Value },
    Store { slot: Slot, value: u32 },
}

/// Block terminators.
///
/// Successor operands are numbered: `br` has operand 0, `condbr` has 0 (then)
/// and 1 (else), `switch` has 0 (default) and `1 + i` for case `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Br {
        target: Block,
    },
    CondBr {
        cond: Value,
        then_block: Block,
        else_block: Block,
    },
    Switch {
        value: Value,
        default: Block,
        cases: Vec<(u32, Block)>,
    },
    Ret,
    Unreachable,
}

impl Terminator {
    /// Successor blocks in operand order.
    pub fn successors(&self) -> Vec<Block> {
        match self {
            Terminator::Br { target } => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { default, cases, .. } => std::iter::once(*default)
                .chain(cases.iter().map(|&(_, target)| target))
                .collect(),
            Terminator::Ret | Terminator::Unreachable => Vec::new(),
        }
    }

    fn successor_mut(&mut self, operand: u32) -> Option<&mut Block> {
        match (self, operand) {
            (Terminator::Br { target }, 0) => Some(target),
            (Terminator::CondBr { then_block, .. }, 0) => Some(then_block),
            (Terminator::CondBr { else_block, .. }, 1) => Some(else_block),
            (Terminator::Switch { default, .. }, 0) => Some(default),
            (Terminator::Switch { cases, .. }, n) => {
                cases.get_mut(n as usize - 1).map(|(_, target)| target)
            }
            _ => None,
        }
    }
}

/// A terminator operand naming a block: the `operand`-th successor of `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSite {
    pub block: Block,
    pub operand: u32,
}

#[derive(Debug, Clone)]
pub struct BlockData<'arena> {
    pub name: &'arena str,
    pub insts: Vec<Inst<'arena>>,
    pub terminator: Option<Terminator>,
    /// Incoming edges, in the order they were created.
    pub uses: Vec<EdgeSite>,
    pub erased: bool,
}

impl<'arena> BlockData<'arena> {
    fn new(name: &'arena str) -> Self {
        Self {
            name,
            insts: Vec::new(),
            terminator: None,
            uses: Vec::new(),
            erased: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlotData<'arena> {
    pub name: &'arena str,
}

/// One function of the arena IR.
#[derive(Debug, Clone)]
pub struct Function<'arena> {
    pub name: &'arena str,
    pub blocks: Vec<BlockData<'arena>>,
    pub slots: Vec<SlotData<'arena>>,
    pub value_count: u32,
}

impl<'arena> Function<'arena> {
    /// Create a function containing only its `entry` block.
    pub fn new(name: &'arena str) -> Self {
        Self {
            name,
            blocks: vec![BlockData::new("entry")],
            slots: Vec::new(),
            value_count: 0,
        }
    }

    pub fn block(&self, block: Block) -> &BlockData<'arena> {
        &self.blocks[block.index()]
    }

    pub fn block_name(&self, block: Block) -> &'arena str {
        self.blocks[block.index()].name
    }

    pub fn slot_name(&self, slot: Slot) -> &'arena str {
        self.slots[slot.0 as usize].name
    }

    /// Number of selector slots allocated so far.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn terminator(&self, block: Block) -> Option<&Terminator> {
        self.block(block).terminator.as_ref()
    }

    pub fn insts(&self, block: Block) -> &[Inst<'arena>] {
        &self.block(block).insts
    }

    pub fn successors(&self, block: Block) -> Vec<Block> {
        self.terminator(block)
            .map(Terminator::successors)
            .unwrap_or_default()
    }

    /// Distinct predecessor blocks, in edge creation order.
    pub fn predecessors(&self, block: Block) -> Vec<Block> {
        let mut preds: Vec<Block> = Vec::new();
        for site in &self.block(block).uses {
            if !preds.contains(&site.block) {
                preds.push(site.block);
            }
        }
        preds
    }

    /// Blocks that have not been erased.
    pub fn live_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, data)| !data.erased)
            .map(|(idx, _)| Block(idx as u32))
    }

    /// Look up a live block by name.
    pub fn find_block(&self, name: &str) -> Option<Block> {
        self.live_blocks().find(|&b| self.block_name(b) == name)
    }

    pub(crate) fn add_block(&mut self, name: &'arena str) -> Block {
        let block = Block(self.blocks.len() as u32);
        self.blocks.push(BlockData::new(name));
        block
    }

    pub(crate) fn add_slot(&mut self, name: &'arena str) -> Slot {
        let slot = Slot(self.slots.len() as u32);
        self.slots.push(SlotData { name });
        slot
    }

    pub(crate) fn new_value(&mut self) -> Value {
        let value = Value(self.value_count);
        self.value_count += 1;
        value
    }

    pub(crate) fn ensure_live(&self, block: Block) -> IrResult<()> {
        if self.block(block).erased {
            return Err(IrError::ErasedBlock {
                block: self.block_name(block).to_string(),
            });
        }
        Ok(())
    }

    /// Replace the terminator of `block`, keeping every use list in sync.
    pub(crate) fn set_terminator(&mut self, block: Block, terminator: Option<Terminator>) {
        if let Some(old) = self.blocks[block.index()].terminator.take() {
            for succ in old.successors() {
                self.blocks[succ.index()]
                    .uses
                    .retain(|site| site.block != block);
            }
        }

        if let Some(new) = &terminator {
            for (operand, succ) in new.successors().into_iter().enumerate() {
                self.blocks[succ.index()].uses.push(EdgeSite {
                    block,
                    operand: operand as u32,
                });
            }
        }
        self.blocks[block.index()].terminator = terminator;
    }

    pub(crate) fn add_case(&mut self, block: Block, case: u32, target: Block) -> IrResult<()> {
        let operand = match self.blocks[block.index()].terminator.as_mut() {
            Some(Terminator::Switch { cases, .. }) => {
                cases.push((case, target));
                cases.len() as u32
            }
            _ => {
                return Err(IrError::NotASwitch {
                    block: self.block_name(block).to_string(),
                })
            }
        };
        self.blocks[target.index()]
            .uses
            .push(EdgeSite { block, operand });
        Ok(())
    }

    pub(crate) fn redirect_uses(&mut self, old: Block, new: Block) {
        if old == new {
            return;
        }
        let sites = std::mem::take(&mut self.blocks[old.index()].uses);
        for site in sites {
            let slot = self.blocks[site.block.index()]
                .terminator
                .as_mut()
                .and_then(|term| term.successor_mut(site.operand));
            if let Some(target) = slot {
                *target = new;
                self.blocks[new.index()].uses.push(site);
            }
        }
    }

    pub(crate) fn erase(&mut self, block: Block) -> IrResult<()> {
        let uses = self.block(block).uses.len();
        if uses > 0 {
            return Err(IrError::BlockInUse {
                block: self.block_name(block).to_string(),
                uses,
            });
        }
        self.set_terminator(block, None);
        let data = &mut self.blocks[block.index()];
        data.insts.clear();
        data.erased = true;
        Ok(())
    }

    fn fmt_block(&self, f: &mut fmt::Formatter<'_>, block: Block) -> fmt::Result {
        let data = self.block(block);
        writeln!(f, "{}:", data.name)?;
        for inst in &data.insts {
            match inst {
                Inst::Call { callee } => writeln!(f, "  call @{}", callee)?,
                Inst::Eval { callee, result } => writeln!(f, "  %{} = eval @{}", result.0, callee)?,
                Inst::Load { slot, result } => {
                    writeln!(f, "  %{} = load %{}", result.0, self.slot_name(*slot))?
                }
                Inst::Store { slot, value } => {
                    writeln!(f, "  store {}, %{}", value, self.slot_name(*slot))?
                }
            }
        }
        match &data.terminator {
            Some(Terminator::Br { target }) => writeln!(f, "  br ^{}", self.block_name(*target)),
            Some(Terminator::CondBr {
                cond,
                then_block,
                else_block,
            }) => writeln!(
                f,
                "  condbr %{}, ^{}, ^{}",
                cond.0,
                self.block_name(*then_block),
                self.block_name(*else_block)
            ),
            Some(Terminator::Switch {
                value,
                default,
                cases,
            }) => {
                let cases: Vec<String> = cases
                    .iter()
                    .map(|(case, target)| format!("{} -> ^{}", case, self.block_name(*target)))
                    .collect();
                writeln!(
                    f,
                    "  switch %{}, ^{} [{}]",
                    value.0,
                    self.block_name(*default),
                    cases.join(", ")
                )
            }
            Some(Terminator::Ret) => writeln!(f, "  ret"),
            Some(Terminator::Unreachable) => writeln!(f, "  unreachable"),
            None => writeln!(f, "  ; no terminator"),
        }
    }
}

impl fmt::Display for Function<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {} {{", self.name)?;
        for slot in &self.slots {
            writeln!(f, "  %{} = alloca i32", slot.name)?;
        }
        for block in self.live_blocks() {
            self.fmt_block(f, block)?;
        }
        writeln!(f, "}}")
    }
}
