use std::fmt::{self, Display, Formatter};

use annotate_snippets::display_list::{DisplayList, FormatOptions};
use annotate_snippets::snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation};
use itertools::Itertools;
use thiserror::Error;

use crate::ast::Mnemonic;
use crate::grammar::Terminal;
use crate::lexer::TokenType;
use crate::Span;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unexpected character '{character}' at line {line}, column {column}")]
pub struct LexError {
    pub character: char,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

/// A guess at what the author meant, attached to syntax errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hint {
    OperandRequired(Mnemonic),
    OperandForbidden(Mnemonic),
    UnbalancedBracket,
    MissingSign,
}

impl Display for Hint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Hint::OperandRequired(mnemonic) =>
                write!(f, "{} requires an operand in brackets, e.g. {} [EAX]", mnemonic, mnemonic),
            Hint::OperandForbidden(mnemonic) =>
                write!(f, "{} takes no operand", mnemonic),
            Hint::UnbalancedBracket =>
                write!(f, "unbalanced bracket: the memory operand is missing its closing ']'"),
            Hint::MissingSign =>
                write!(f, "an offset needs a sign, e.g. [EBX+16] or [ECX-8]"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{}", .0.iter().join("; "))]
    Lex(Vec<LexError>),
    #[error("unexpected {found} '{text}' at line {line}, column {column}; expected {}", expected_list(.expected))]
    UnexpectedToken {
        found: TokenType,
        text: String,
        span: Span,
        line: usize,
        column: usize,
        expected: Vec<Terminal>,
        hint: Option<Hint>,
    },
    #[error("unexpected end of input at line {line}, column {column}; expected {}", expected_list(.expected))]
    UnexpectedEnd {
        span: Span,
        line: usize,
        column: usize,
        expected: Vec<Terminal>,
        hint: Option<Hint>,
    },
    #[error("unexpected {found} '{text}' after a complete instruction at line {line}, column {column}")]
    TrailingInput {
        found: TokenType,
        text: String,
        span: Span,
        line: usize,
        column: usize,
        hint: Option<Hint>,
    },
    #[error("offset '{text}' at line {line}, column {column} does not fit in 64 bits")]
    InvalidNumber {
        text: String,
        span: Span,
        line: usize,
        column: usize,
    },
}

fn expected_list(expected: &[Terminal]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [only] => format!("'{}'", only),
        _ => format!("one of {}", expected.iter().map(|t| format!("'{}'", t)).join(", ")),
    }
}

use ParseError::*;

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            Lex(errors) => errors.first().map_or(1, |e| e.line),
            UnexpectedToken { line, .. }
            | UnexpectedEnd { line, .. }
            | TrailingInput { line, .. }
            | InvalidNumber { line, .. } => *line,
        }
    }

    pub fn hint(&self) -> Option<Hint> {
        match self {
            UnexpectedToken { hint, .. }
            | UnexpectedEnd { hint, .. }
            | TrailingInput { hint, .. } => *hint,
            Lex(_) | InvalidNumber { .. } => None,
        }
    }

    fn spans(&self) -> Vec<(Span, String)> {
        match self {
            Lex(errors) => errors.iter()
                .map(|e| (e.span.clone(), format!("unexpected '{}'", e.character)))
                .collect(),
            UnexpectedToken { span, found, .. } => vec![(span.clone(), format!("unexpected {}", found))],
            UnexpectedEnd { span, .. } => vec![(span.clone(), "line ends here".to_string())],
            TrailingInput { span, .. } => vec![(span.clone(), "instruction already complete".to_string())],
            InvalidNumber { span, .. } => vec![(span.clone(), "number too large".to_string())],
        }
    }

    /// Renders the error against the line it came from, with the offending
    /// span underlined and the hint, if any, as a footer.
    pub fn render(&self, source: &str, origin: Option<&str>, color: bool) -> String {
        let title = self.to_string();
        let hint = self.hint().map(|hint| hint.to_string());
        let labels = self.spans();

        let annotations = labels.iter()
            .map(|(span, label)| SourceAnnotation {
                range: annotation_range(span, source),
                label: label.as_str(),
                annotation_type: AnnotationType::Error,
            })
            .collect::<Vec<_>>();

        let slices = if source.is_empty() {
            vec![]
        } else {
            vec![Slice {
                source,
                line_start: self.line(),
                origin,
                fold: false,
                annotations,
            }]
        };

        let snippet = Snippet {
            title: Some(Annotation {
                label: Some(title.as_str()),
                id: None,
                annotation_type: AnnotationType::Error,
            }),
            footer: hint.iter()
                .map(|hint| Annotation {
                    label: Some(hint.as_str()),
                    id: None,
                    annotation_type: AnnotationType::Help,
                })
                .collect(),
            slices,
            opt: FormatOptions {
                color,
                ..Default::default()
            },
        };
        DisplayList::from(snippet).to_string()
    }
}

// Annotation ranges count characters and must cover at least one of them.
fn annotation_range(span: &Span, source: &str) -> (usize, usize) {
    let chars = source.chars().count();
    let start = source[..span.start.min(source.len())].chars().count();
    let end = source[..span.end.min(source.len())].chars().count();
    if start < end {
        (start, end)
    } else {
        let start = start.min(chars.saturating_sub(1));
        (start, start + 1)
    }
}

fn presence(flag: &bool) -> &'static str {
    if *flag { "absent" } else { "present" }
}

/// Reconstructing an [`Instruction`](crate::ast::Instruction) from its
/// structured form failed.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a node of type {expected}, found {found}")]
    WrongNodeType { expected: &'static str, found: String },
    #[error("{0} requires an operand")]
    MissingOperand(Mnemonic),
    #[error("{0} takes no operand")]
    UnexpectedOperand(Mnemonic),
    #[error("`has_{field}` is {flag} but `{field}` is {}", presence(.flag))]
    PresenceMismatch { field: &'static str, flag: bool },
    #[error("'{0}' is not a register name")]
    InvalidRegister(String),
    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),
    #[error("register {name} is {actual} bits wide, not {claimed}")]
    BitWidthMismatch { name: String, claimed: u32, actual: u32 },
    #[error("only register bases can carry an offset, found identifier '{0}'")]
    OffsetOnIdentifier(String),
}
