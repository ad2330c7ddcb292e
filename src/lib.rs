//! scopeflow - cleanup-aware control-flow lowering.
//!
//! scopeflow lowers structured jumps (`goto`, `break`, `continue`, `return`)
//! through enclosing cleanup regions such as try/finally into an SSA-style IR
//! whose only control flow is block terminators. Cleanup bodies are emitted
//! once and shared: a body with several continuations ends in a switch on a
//! runtime branch selector.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use scopeflow::core::{CompilationSession, DiagnosticSink};
//! use scopeflow::{lower_script, script};
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut sink = DiagnosticSink::new();
//!
//! let script = script::parse(source)?;
//! for func in lower_script(&session, &script, &mut sink)? {
//!     print!("{}", func);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`scope`] - Cleanup scope stack, exit multiplexer, jump targets, labels
//! - [`core`] - Shared infrastructure (builder trait, diagnostics, session, errors)
//! - [`ir`] - Arena IR implementing [`IrBuilder`](crate::core::IrBuilder)
//! - [`script`] - Statement scripts and file checks
//! - [`lower`] - Statement lowering driving the scope stack

pub mod core;
pub mod ir;
pub mod lower;
pub mod scope;
pub mod script;

pub use crate::core::{
    // Builder seam
    IrBuilder,
    // Diagnostics
    Diagnostic, DiagnosticSink, Diagnostics, Loc,
    // Errors
    IrError, IrResult, ScopeError, ScopeResult,
    // Session management
    CompilationSession, SessionStats,
};
pub use ir::{Block, Function, FunctionBuilder, Slot};
pub use lower::{lower_function, lower_script, LowerError};
pub use scope::{CleanupCursor, JumpKind, LabelId, ScopeStack, StmtId};
