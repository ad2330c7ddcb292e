//! Cleanup scopes and the exit multiplexer.
//!
//! A cleanup body is emitted once, between its entry and exit blocks. Every
//! jump that leaves the scope enters the body at `entry`; what happens at
//! `exit` depends on how many distinct continuations the scope has:
//!
//! - none yet: the exit block is open,
//! - one: the exit block ends in `br continuation`,
//! - two or more: a selector slot is stored by every source block before it
//!   enters the body, and the exit block switches on it.

use log::{debug, trace};

use super::labels::GotoJump;
use super::ScopeId;
use crate::core::{IrBuilder, IrResult};

/// One distinct continuation of a cleanup scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupExitTarget<B> {
    pub branch_target: B,
    /// Blocks whose control flow reaches `branch_target` through this scope.
    pub source_blocks: Vec<B>,
}

impl<B> CleanupExitTarget<B> {
    fn new(branch_target: B, source: B) -> Self {
        Self {
            branch_target,
            source_blocks: vec![source],
        }
    }
}

/// Exit state of a cleanup scope.
///
/// The position of a target in `Selector::targets` is its selector value;
/// the first target is the switch default and owns value 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupExits<B, S> {
    Unused,
    Direct(CleanupExitTarget<B>),
    Selector {
        slot: S,
        targets: Vec<CleanupExitTarget<B>>,
    },
}

impl<B, S> Default for CleanupExits<B, S> {
    fn default() -> Self {
        CleanupExits::Unused
    }
}

impl<B, S: Copy> CleanupExits<B, S> {
    pub fn targets(&self) -> &[CleanupExitTarget<B>] {
        match self {
            CleanupExits::Unused => &[],
            CleanupExits::Direct(target) => std::slice::from_ref(target),
            CleanupExits::Selector { targets, .. } => targets,
        }
    }

    pub fn selector(&self) -> Option<S> {
        match self {
            CleanupExits::Selector { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

/// An active cleanup region.
#[derive(Debug, Clone)]
pub struct CleanupScope<B, S> {
    pub id: ScopeId,
    pub entry: B,
    pub exit: B,
    pub exits: CleanupExits<B, S>,
    /// Gotos emitted inside this scope whose label is not known yet.
    pub unresolved_gotos: Vec<GotoJump<B>>,
}

impl<B, S> CleanupScope<B, S> {
    pub fn new(id: ScopeId, entry: B, exit: B) -> Self {
        Self {
            id,
            entry,
            exit,
            exits: CleanupExits::Unused,
            unresolved_gotos: Vec::new(),
        }
    }
}

/// Make control that entered `scope` from `source` continue at
/// `continue_with` once the cleanup body has run.
///
/// `source` must already be terminated (by its branch into the cleanup), since
/// selector stores go in front of that terminator.
pub fn execute_cleanup<I: IrBuilder>(
    ir: &mut I,
    scope: &mut CleanupScope<I::Block, I::Slot>,
    source: I::Block,
    continue_with: I::Block,
) -> IrResult<()> {
    trace!(
        "cleanup {:?}: {:?} continues at {:?}",
        scope.id,
        source,
        continue_with
    );

    scope.exits = match std::mem::take(&mut scope.exits) {
        CleanupExits::Unused => {
            ir.set_branch(scope.exit, continue_with)?;
            CleanupExits::Direct(CleanupExitTarget::new(continue_with, source))
        }
        CleanupExits::Direct(mut only) if only.branch_target == continue_with => {
            only.source_blocks.push(source);
            CleanupExits::Direct(only)
        }
        CleanupExits::Direct(only) => {
            let slot = introduce_selector(ir, scope.entry, scope.exit, &only)?;
            let mut targets = vec![only];
            select_exit(ir, scope.exit, slot, &mut targets, source, continue_with)?;
            CleanupExits::Selector { slot, targets }
        }
        CleanupExits::Selector { slot, mut targets } => {
            select_exit(ir, scope.exit, slot, &mut targets, source, continue_with)?;
            CleanupExits::Selector { slot, targets }
        }
    };
    Ok(())
}

/// Turn the plain exit branch into a switch on a fresh selector.
///
/// Sources recorded so far keep their destination by storing 0, the value
/// of the switch default.
fn introduce_selector<I: IrBuilder>(
    ir: &mut I,
    entry: I::Block,
    exit: I::Block,
    only: &CleanupExitTarget<I::Block>,
) -> IrResult<I::Slot> {
    let name = format!("branchsel.{}", ir.block_name(entry));
    let slot = ir.alloc_selector(&name);
    debug!("introducing branch selector {} for {:?}", name, entry);

    for &source in &only.source_blocks {
        ir.store_before_terminator(source, slot, 0)?;
    }

    ir.remove_terminator(exit)?;
    let selector = ir.load_slot(exit, slot)?;
    ir.set_switch(exit, selector, only.branch_target, 1)?;
    Ok(slot)
}

fn select_exit<I: IrBuilder>(
    ir: &mut I,
    exit: I::Block,
    slot: I::Slot,
    targets: &mut Vec<CleanupExitTarget<I::Block>>,
    source: I::Block,
    continue_with: I::Block,
) -> IrResult<()> {
    if let Some(index) = targets
        .iter()
        .position(|target| target.branch_target == continue_with)
    {
        ir.store_before_terminator(source, slot, index as u32)?;
        targets[index].source_blocks.push(source);
        return Ok(());
    }

    let index = targets.len() as u32;
    ir.add_switch_case(exit, index, continue_with)?;
    ir.store_before_terminator(source, slot, index)?;
    targets.push(CleanupExitTarget::new(continue_with, source));
    Ok(())
}
