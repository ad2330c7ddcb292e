// This module provides arena-based compilation session management using the bumpalo
// crate. CompilationSession owns a reference to the arena that backs every name the
// lowering produces: function names, block names and selector slot names are interned
// once and shared as `&'arena str` by all functions lowered in the session, so the IR
// types carry a single lifetime instead of owning strings. The session also gathers
// SessionStats: functions lowered, blocks created, placeholder blocks erased after goto
// resolution, branch selectors allocated, selector stores inserted and switch cases
// added to cleanup exits. The statistics drive the `--stats` output of the driver and
// give tests a cheap way to observe how much multiplexing a lowering needed.

//! Arena-based compilation session management.
//!
//! All interned names are tied to the session arena, so functions lowered in
//! one session can be printed and compared after their builders are gone.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for interned names.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// String interning for block and slot names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Update the statistics in place.
    pub fn record(&self, update: impl FnOnce(&mut SessionStats)) {
        update(&mut self.stats.borrow_mut());
    }

    /// Get a snapshot of the statistics.
    pub fn stats(&self) -> SessionStats {
        *self.stats.borrow()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of functions lowered.
    pub functions_lowered: usize,

    /// Blocks created, including placeholders.
    pub blocks_created: usize,

    /// Placeholder blocks erased after their goto was resolved.
    pub placeholders_erased: usize,

    /// Branch selector slots allocated.
    pub selectors_allocated: usize,

    /// Selector stores inserted before terminators.
    pub selector_stores: usize,

    /// Cases appended to cleanup exit switches.
    pub switch_cases_added: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions lowered: {}", self.functions_lowered)?;
        writeln!(f, "  Blocks created: {}", self.blocks_created)?;
        writeln!(f, "  Placeholders erased: {}", self.placeholders_erased)?;
        writeln!(f, "  Selectors allocated: {}", self.selectors_allocated)?;
        writeln!(f, "  Selector stores: {}", self.selector_stores)?;
        writeln!(f, "  Switch cases added: {}", self.switch_cases_added)?;
        Ok(())
    }
}
