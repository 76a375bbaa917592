//! Parsing whole files, one instruction per line.

use std::fmt::{self, Display, Formatter};

use crate::ast::Instruction;
use crate::error::ParseError;
use crate::lexer::{strip_comment, RegisterSet};
use crate::parser::Parser;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLine {
    /// 1-based.
    pub line: usize,
    pub text: String,
    pub instruction: Instruction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedLine {
    pub line: usize,
    pub text: String,
    pub error: ParseError,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub parsed: Vec<ParsedLine>,
    pub failed: Vec<FailedLine>,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.parsed.len() + self.failed.len()
    }
}

impl Display for BatchReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} parsed, {} failed", self.parsed.len(), self.failed.len())
    }
}

/// Parses every line of `source` that holds code.
///
/// Blank lines and lines holding only a comment are skipped. A failed line
/// is recorded and parsing moves on to the next one.
pub fn parse_source(source: &str, registers: RegisterSet) -> BatchReport {
    let mut report = BatchReport::default();

    for (index, text) in source.lines().enumerate() {
        if strip_comment(text).trim().is_empty() {
            continue;
        }

        let line = index + 1;
        let result = Parser::new()
            .with_registers(registers)
            .starting_at_line(line)
            .parse(text);
        match result {
            Ok(instruction) => report.parsed.push(ParsedLine { line, text: text.to_string(), instruction }),
            Err(error) => report.failed.push(FailedLine { line, text: text.to_string(), error }),
        }
    }

    report
}
