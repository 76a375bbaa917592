//! Parsing for x86/x64 cache-control instructions.
//!
//! The language is tiny: one of nine mnemonics (`CLFLUSH`, `CLFLUSHOPT`, `CLWB`,
//! `PREFETCHT0`, `PREFETCHT1`, `PREFETCHT2`, `PREFETCHNTA`, `WBINVD`, `INVD`),
//! optionally followed by a bracketed memory operand. Each line goes through
//! three steps:
//!
//! 1. [`lexer`] splits the line into [`Token`](lexer::Token)s,
//! 2. [`parser`] runs a table-driven shift-reduce automaton over them
//!    (the table lives in [`grammar`]),
//! 3. the reductions build an [`Instruction`](ast::Instruction).
//!
//! ```
//! # use cachectl::parse_line;
//! # use cachectl::ast::{Category, Mnemonic};
//! let instruction = parse_line("CLFLUSHOPT [EBX+16] ; flush the line").unwrap();
//! assert_eq!(instruction.mnemonic(), Mnemonic::Clflushopt);
//! assert_eq!(instruction.category(), Category::Flush);
//! assert_eq!(instruction.operand().unwrap().offset(), Some(16));
//! assert_eq!(instruction.to_string(), "CLFLUSHOPT [EBX+16]");
//!
//! // WBINVD and INVD never take an operand, everything else always does.
//! assert!(parse_line("WBINVD").is_ok());
//! assert!(parse_line("CLFLUSH").is_err());
//! ```

pub mod analysis;
pub mod ast;
pub mod batch;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod structured;

pub use ast::Instruction;
pub use error::ParseError;
pub use lexer::RegisterSet;
pub use parser::Parser;
pub use render::Render;

/// Byte range into the source line.
pub type Span = std::ops::Range<usize>;

/// Parses a single line of source text.
///
/// Trailing `;` comments are ignored. Uses the extended register set;
/// see [`Parser`] for the other options.
pub fn parse_line(text: &str) -> Result<Instruction, ParseError> {
    Parser::new().parse(text)
}
