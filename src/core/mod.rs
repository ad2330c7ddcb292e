// This module serves as the hub for scopeflow's shared infrastructure: the IrBuilder trait
// through which the cleanup scope stack mutates the IR of the function being generated,
// the Diagnostics trait and its collecting implementation used for location-tagged
// errors, the arena-backed compilation session with its statistics, and the layered
// error types. Nothing here knows about cleanup scopes; the scope stack and the arena IR
// both build on these pieces.

//! Core scopeflow infrastructure.
//!
//! # Key Components
//!
//! ## Builder (`builder`)
//! - [`IrBuilder`] trait: the IR mutations the scope stack needs
//! - Carries the current insertion block explicitly
//!
//! ## Diagnostics (`diagnostics`)
//! - [`Loc`] source locations
//! - [`Diagnostics`] trait and the collecting [`DiagnosticSink`]
//!
//! ## Session Management (`session`)
//! - Arena-based name interning using `bumpalo`
//! - Lowering statistics

pub mod builder;
pub mod diagnostics;
pub mod error;
pub mod session;

pub use builder::IrBuilder;

pub use diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, Loc};

pub use error::{IrError, IrResult, ScopeError, ScopeResult};

pub use session::{CompilationSession, SessionStats};
