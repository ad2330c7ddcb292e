// This module defines the statement scripts scopeflow lowers: a small structured language
// with opaque calls and conditions, if/while/loop/switch, try/finally regions and the four
// jumps (goto, break, continue, return). Scripts exist to drive the cleanup scope stack the
// way a real front end would: every statement carries its source location, labels and
// loop/switch statements are identified by opaque handles issued per function, and a label
// written directly in front of a loop or switch names it for labeled break/continue. The
// parser turns text into this AST, `check` carries the FileCheck-style directives used by
// the file tests, and `crate::lower` walks the AST against the scope stack.

//! Statement scripts.
//!
//! ```text
//! fn main {
//!   outer: while more {
//!     try {
//!       work;
//!       if done { break outer; }
//!     } finally {
//!       release;
//!     }
//!   }
//!   goto end;
//!   skipped;
//!   end:
//!   return;
//! }
//! ```

use crate::core::Loc;
use crate::scope::{LabelId, StmtId};

pub mod check;
pub mod parser;

pub use parser::{parse, ParseError};

/// A parsed script: a list of functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub functions: Vec<FunctionDef>,
}

impl Script {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub loc: Loc,
    /// Label names, indexed by [`LabelId`].
    pub labels: Vec<String>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    pub fn label_name(&self, label: LabelId) -> &str {
        self.labels
            .get(label.0 as usize)
            .map(String::as_str)
            .unwrap_or("?")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub loc: Loc,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    /// Opaque straight-line code.
    Call(String),
    Block(Vec<Stmt>),
    If {
        cond: String,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        id: StmtId,
        label: Option<LabelId>,
        cond: String,
        body: Vec<Stmt>,
    },
    /// Endless loop, left only by a jump.
    Loop {
        id: StmtId,
        label: Option<LabelId>,
        body: Vec<Stmt>,
    },
    /// Multi-way branch without fallthrough between cases.
    Switch {
        id: StmtId,
        label: Option<LabelId>,
        value: String,
        cases: Vec<(u32, Vec<Stmt>)>,
        default: Option<Vec<Stmt>>,
    },
    TryFinally {
        id: StmtId,
        body: Vec<Stmt>,
        finally_body: Vec<Stmt>,
    },
    Break(Option<LabelId>),
    Continue(Option<LabelId>),
    Goto(LabelId),
    Label(LabelId),
    Return,
}
