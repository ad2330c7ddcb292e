//! FileCheck-style validation for script files.
//!
//! Scripts carry their expectations in `//` comment directives. The lowered
//! IR (or, for `--expect-error` runs, the rendered diagnostics) is matched
//! against them in order.

use std::collections::VecDeque;

use bumpalo::Bump;
use log::debug;

use super::parse;
use crate::core::{CompilationSession, DiagnosticSink};
use crate::lower::lower_script;

/// A CHECK directive extracted from a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or any later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

impl RunDirective {
    pub fn expects_error(&self) -> bool {
        self.args.iter().any(|arg| arg == "--expect-error")
    }

    /// Function selected with `--function NAME`, if any.
    pub fn function(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == "--function")
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

/// Test specification extracted from a script file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub script: String,
}

impl TestSpec {
    /// Split `content` into directives and the script itself.
    ///
    /// Directive lines are blanked rather than removed so that diagnostics
    /// keep the line numbers of the original file.
    pub fn parse(content: &str) -> Self {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut script_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("// RUN:") {
                let parts: Vec<&str> = run_cmd.split_whitespace().collect();
                if let Some((command, args)) = parts.split_first() {
                    run_directives.push(RunDirective {
                        command: command.to_string(),
                        args: args.iter().map(|s| s.to_string()).collect(),
                    });
                }
            } else if let Some(pattern) = trimmed.strip_prefix("// CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("// CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if trimmed.starts_with("// CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("// CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("// COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else {
                script_lines.push(line);
                continue;
            }
            script_lines.push("");
        }

        TestSpec {
            run_directives,
            check_directives,
            script: script_lines.join("\n"),
        }
    }
}

/// Test runner that lowers scripts and validates the output
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run every RUN line of `spec` and validate each output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        if spec.run_directives.is_empty() {
            return Err("no RUN directive".to_string());
        }
        for run_dir in &spec.run_directives {
            let output = self.execute(&spec.script, run_dir)?;
            self.validate_output(&output, &spec.check_directives)?;
        }
        Ok(())
    }

    /// Lower `script` and return the text the checks are matched against.
    pub fn execute(&self, script: &str, run_dir: &RunDirective) -> Result<String, String> {
        let script = parse(script).map_err(|e| format!("parse error: {}", e))?;
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut sink = DiagnosticSink::new();

        match lower_script(&session, &script, &mut sink) {
            Ok(functions) => {
                if run_dir.expects_error() {
                    return Err("expected lowering to fail, but it succeeded".to_string());
                }
                let mut output = String::new();
                for func in functions
                    .iter()
                    .filter(|f| run_dir.function().map_or(true, |name| f.name == name))
                {
                    output.push_str(&func.to_string());
                }
                debug!("{}", session.stats());
                Ok(output)
            }
            Err(e) => {
                if !run_dir.expects_error() {
                    return Err(format!("lowering failed: {}\n{}", e, sink.render()));
                }
                if sink.error_count() == 0 {
                    // Internal errors bypass the sink.
                    return Ok(format!("internal: {}\n", e));
                }
                Ok(sink.render())
            }
        }
    }

    /// Validate output against CHECK directives
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let output_lines: VecDeque<_> = output.lines().collect();
        let mut line_idx = 0;

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            line_idx += idx + 1;
                            if self.verbose {
                                println!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                            }
                        }
                        None => {
                            return Err(format!(
                                "CHECK: pattern '{}' not found in output:\n{}",
                                pattern, output
                            ));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}' in output:\n{}",
                            pattern, line, output
                        ));
                    }

                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        Ok(())
    }
}
