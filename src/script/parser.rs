//! Script parser.

use hashbrown::{HashMap, HashSet};
use thiserror::Error;

use super::{FunctionDef, Script, Stmt, StmtKind};
use crate::core::Loc;
use crate::scope::{LabelId, StmtId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{loc}: {message}")]
pub struct ParseError {
    pub loc: Loc,
    pub message: String,
}

type ParseResult<T> = Result<T, ParseError>;

const KEYWORDS: &[&str] = &[
    "fn", "if", "else", "while", "loop", "switch", "case", "default", "try", "finally", "break",
    "continue", "goto", "return",
];

pub fn parse(text: &str) -> ParseResult<Script> {
    let parser = Parser::new(text);
    parser.parse()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    line: u32,
    column: u32,

    // Global names
    funcs: HashSet<&'a str>,

    // Per-function symbol tables
    labels: HashMap<&'a str, LabelId>,
    label_names: Vec<String>,
    defined_labels: HashSet<LabelId>,
    next_stmt: u32,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            line: 1,
            column: 1,
            funcs: HashSet::new(),
            labels: HashMap::new(),
            label_names: Vec::new(),
            defined_labels: HashSet::new(),
            next_stmt: 0,
        }
    }

    fn parse(mut self) -> ParseResult<Script> {
        let mut functions = Vec::new();
        self.skip_whitespace();
        while !self.is_eof() {
            functions.push(self.parse_function()?);
            self.skip_whitespace();
        }
        Ok(Script { functions })
    }

    fn loc(&self) -> Loc {
        Loc::new(self.line, self.column)
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError {
            loc: self.loc(),
            message: message.into(),
        })
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.current_char() {
                Some(ch) if ch.is_whitespace() => self.advance(),
                Some('/') if self.text[self.pos..].starts_with("//") => {
                    // Comment runs to the end of the line
                    while let Some(ch) = self.current_char() {
                        self.advance();
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> ParseResult<()> {
        if !self.try_read(ch) {
            return match self.current_char() {
                Some(found) => self.error(format!("expected '{}' but found '{}'", ch, found)),
                None => self.error(format!("expected '{}' but found end of input", ch)),
            };
        }
        Ok(())
    }

    /// Next word without consuming it.
    fn peek_word(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        let first = rest.chars().next()?;
        if !(first.is_alphabetic() || first == '_') {
            return None;
        }
        let len = rest
            .find(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '.'))
            .unwrap_or(rest.len());
        Some(&rest[..len])
    }

    fn read_word(&mut self) -> ParseResult<&'a str> {
        match self.peek_word() {
            Some(word) => {
                for _ in word.chars() {
                    self.advance();
                }
                Ok(word)
            }
            None => match self.current_char() {
                Some(ch) => self.error(format!("expected identifier but found '{}'", ch)),
                None => self.error("expected identifier but found end of input"),
            },
        }
    }

    fn read_identifier(&mut self) -> ParseResult<&'a str> {
        let loc = self.loc();
        let word = self.read_word()?;
        if KEYWORDS.contains(&word) {
            return Err(ParseError {
                loc,
                message: format!("expected identifier but found keyword '{}'", word),
            });
        }
        Ok(word)
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_word() == Some(keyword) {
            for _ in keyword.chars() {
                self.advance();
            }
            true
        } else {
            false
        }
    }

    fn read_number(&mut self) -> ParseResult<u32> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return self.error("expected number");
        }
        match self.text[start..self.pos].parse() {
            Ok(n) => Ok(n),
            Err(e) => self.error(format!("failed to parse number: {}", e)),
        }
    }

    fn label_id(&mut self, name: &'a str) -> LabelId {
        if let Some(&id) = self.labels.get(name) {
            return id;
        }
        let id = LabelId(self.label_names.len() as u32);
        self.labels.insert(name, id);
        self.label_names.push(name.to_string());
        id
    }

    fn stmt_id(&mut self) -> StmtId {
        let id = StmtId(self.next_stmt);
        self.next_stmt += 1;
        id
    }

    fn parse_function(&mut self) -> ParseResult<FunctionDef> {
        self.skip_whitespace();
        let loc = self.loc();
        if !self.try_keyword("fn") {
            return self.error("expected 'fn'");
        }
        let name = self.read_identifier()?;
        if !self.funcs.insert(name) {
            return Err(ParseError {
                loc,
                message: format!("duplicate function definition: '{}'", name),
            });
        }

        // Reset per-function state
        self.labels.clear();
        self.label_names.clear();
        self.defined_labels.clear();
        self.next_stmt = 0;

        let body = self.parse_block()?;
        Ok(FunctionDef {
            name: name.to_string(),
            loc,
            labels: std::mem::take(&mut self.label_names),
            body,
        })
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect('{')?;
        let mut stmts = Vec::new();
        loop {
            self.skip_whitespace();
            if self.try_read('}') {
                return Ok(stmts);
            }
            if self.is_eof() {
                return self.error("unterminated block");
            }
            self.parse_stmt(&mut stmts)?;
        }
    }

    fn parse_stmt(&mut self, out: &mut Vec<Stmt>) -> ParseResult<()> {
        self.skip_whitespace();
        let loc = self.loc();

        if self.current_char() == Some('{') {
            let body = self.parse_block()?;
            out.push(Stmt {
                loc,
                kind: StmtKind::Block(body),
            });
            return Ok(());
        }

        let word = self.read_word()?;
        let kind = match word {
            "if" => self.parse_if()?,
            "while" => self.parse_while(None)?,
            "loop" => self.parse_loop(None)?,
            "switch" => self.parse_switch(None)?,
            "try" => {
                let id = self.stmt_id();
                let body = self.parse_block()?;
                if !self.try_keyword("finally") {
                    return self.error("expected 'finally' after try block");
                }
                let finally_body = self.parse_block()?;
                StmtKind::TryFinally {
                    id,
                    body,
                    finally_body,
                }
            }
            "break" | "continue" => {
                let label = match self.peek_word() {
                    Some(_) => {
                        let name = self.read_identifier()?;
                        Some(self.label_id(name))
                    }
                    None => None,
                };
                self.expect(';')?;
                if word == "break" {
                    StmtKind::Break(label)
                } else {
                    StmtKind::Continue(label)
                }
            }
            "goto" => {
                let name = self.read_identifier()?;
                self.expect(';')?;
                StmtKind::Goto(self.label_id(name))
            }
            "return" => {
                self.expect(';')?;
                StmtKind::Return
            }
            _ if KEYWORDS.contains(&word) => {
                return Err(ParseError {
                    loc,
                    message: format!("unexpected keyword '{}'", word),
                });
            }
            name => {
                if self.try_read(':') {
                    return self.parse_label(loc, name, out);
                }
                self.expect(';')?;
                StmtKind::Call(name.to_string())
            }
        };
        out.push(Stmt { loc, kind });
        Ok(())
    }

    /// `name:` defines a label; in front of a loop or switch it also names it.
    fn parse_label(&mut self, loc: Loc, name: &'a str, out: &mut Vec<Stmt>) -> ParseResult<()> {
        let label = self.label_id(name);
        if !self.defined_labels.insert(label) {
            return Err(ParseError {
                loc,
                message: format!("label '{}' is already defined", name),
            });
        }
        out.push(Stmt {
            loc,
            kind: StmtKind::Label(label),
        });

        let next_loc = {
            self.skip_whitespace();
            self.loc()
        };
        let kind = match self.peek_word() {
            Some("while") => {
                self.try_keyword("while");
                self.parse_while(Some(label))?
            }
            Some("loop") => {
                self.try_keyword("loop");
                self.parse_loop(Some(label))?
            }
            Some("switch") => {
                self.try_keyword("switch");
                self.parse_switch(Some(label))?
            }
            _ => return Ok(()),
        };
        out.push(Stmt {
            loc: next_loc,
            kind,
        });
        Ok(())
    }

    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        let cond = self.read_identifier()?.to_string();
        let then_body = self.parse_block()?;
        let else_body = if self.try_keyword("else") {
            self.skip_whitespace();
            let loc = self.loc();
            if self.try_keyword("if") {
                let nested = self.parse_if()?;
                Some(vec![Stmt { loc, kind: nested }])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_while(&mut self, label: Option<LabelId>) -> ParseResult<StmtKind> {
        let id = self.stmt_id();
        let cond = self.read_identifier()?.to_string();
        let body = self.parse_block()?;
        Ok(StmtKind::While {
            id,
            label,
            cond,
            body,
        })
    }

    fn parse_loop(&mut self, label: Option<LabelId>) -> ParseResult<StmtKind> {
        let id = self.stmt_id();
        let body = self.parse_block()?;
        Ok(StmtKind::Loop { id, label, body })
    }

    fn parse_switch(&mut self, label: Option<LabelId>) -> ParseResult<StmtKind> {
        let id = self.stmt_id();
        let value = self.read_identifier()?.to_string();
        self.expect('{')?;

        let mut cases: Vec<(u32, Vec<Stmt>)> = Vec::new();
        let mut default = None;
        loop {
            if self.try_read('}') {
                break;
            }
            if self.try_keyword("case") {
                let value = self.read_number()?;
                if cases.iter().any(|(existing, _)| *existing == value) {
                    return self.error(format!("duplicate case value {}", value));
                }
                let body = self.parse_block()?;
                cases.push((value, body));
            } else if self.try_keyword("default") {
                if default.is_some() {
                    return self.error("duplicate default case");
                }
                default = Some(self.parse_block()?);
            } else if self.is_eof() {
                return self.error("unterminated switch");
            } else {
                return self.error("expected 'case' or 'default'");
            }
        }

        Ok(StmtKind::Switch {
            id,
            label,
            value,
            cases,
            default,
        })
    }
}
