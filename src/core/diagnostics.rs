//! Location-tagged diagnostics.
//!
//! The scope stack reports source-program errors (gotos that can never be
//! resolved) through the [`Diagnostics`] trait and then requests a fatal stop
//! of the compilation unit.

use std::fmt;

/// Source location of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Loc {
    pub line: u32,
    pub column: u32,
}

impl Loc {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Receiver for user-facing errors.
pub trait Diagnostics {
    /// Report an error at `loc`.
    fn error(&mut self, loc: Loc, message: &str);

    /// Code generation for the compilation unit cannot continue.
    ///
    /// Implementations record the condition; the caller returns an error that
    /// the driver must not proceed from.
    fn fatal(&mut self);
}

/// A reported error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub loc: Loc,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {}: {}", self.loc, self.message)
    }
}

/// Collecting [`Diagnostics`] implementation that mirrors every report to the log.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    fatal: bool,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// Whether [`Diagnostics::fatal`] was requested.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Render all reports, one per line, followed by the abort marker if any.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for diagnostic in &self.diagnostics {
            out.push_str(&diagnostic.to_string());
            out.push('\n');
        }
        if self.fatal {
            out.push_str("fatal: code generation aborted\n");
        }
        out
    }
}

impl Diagnostics for DiagnosticSink {
    fn error(&mut self, loc: Loc, message: &str) {
        log::error!("{}: {}", loc, message);
        self.diagnostics.push(Diagnostic {
            loc,
            message: message.to_string(),
        });
    }

    fn fatal(&mut self) {
        log::error!("aborting code generation after {} error(s)", self.diagnostics.len());
        self.fatal = true;
    }
}
