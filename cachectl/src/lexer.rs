//! Functions and data structures for lexing cache-control instructions.
//!
//! The lexer splits a line into [`Token`]s: mnemonics, registers, numbers,
//! identifiers and the four punctuation marks `[`, `]`, `+` and `-`.
//! Whitespace and `;` comments are dropped; they never reach the parser.
//!
//! ```
//! # use cachectl::lexer::*;
//! # use cachectl::ast::Mnemonic;
//! let (tokens, errors) = Lexer::new("CLFLUSHOPT [EBX+16]", RegisterSet::Extended).tokenize();
//! let types: Vec<_> = tokens.iter().map(|t| t.ty).collect();
//! assert_eq!(types, vec![
//!     TokenType::Mnemonic(Mnemonic::Clflushopt),
//!     TokenType::LeftBracket,
//!     TokenType::Register,
//!     TokenType::Plus,
//!     TokenType::Number,
//!     TokenType::RightBracket,
//! ]);
//! assert!(errors.is_empty());
//! ```
//!
//! Some patterns overlap (`EAX` is a valid identifier, too), so patterns are
//! tried in a fixed order: mnemonics, then registers, then everything else.
//! Keyword and register patterns must end on a word boundary, which is why
//! `EAXY` lexes as a single identifier rather than a register followed by `Y`.

use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

use itertools::{Either, Itertools};
use regex::Regex;

use crate::ast::Mnemonic;
use crate::error::LexError;
use crate::Span;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'input> {
    pub src: &'input str,
    pub span: Span,
    pub line: usize,
    /// 1-based, counted in characters.
    pub column: usize,
    pub ty: TokenType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenType {
    Mnemonic(Mnemonic),
    Register,
    /// Unsigned decimal digits. The sign of an offset is its own token.
    Number,
    Identifier,
    LeftBracket,
    RightBracket,
    Plus,
    Minus,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Mnemonic(mnemonic) => write!(f, "{}", mnemonic),
            TokenType::Register     => f.write_str("REGISTER"),
            TokenType::Number       => f.write_str("NUMBER"),
            TokenType::Identifier   => f.write_str("IDENTIFIER"),
            TokenType::LeftBracket  => f.write_str("'['"),
            TokenType::RightBracket => f.write_str("']'"),
            TokenType::Plus         => f.write_str("'+'"),
            TokenType::Minus        => f.write_str("'-'"),
        }
    }
}

/// Which register names the lexer recognizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RegisterSet {
    /// `E{AX,BX,CX,DX,SI,DI,BP,SP}`, `R{AX,BX,CX,DX,SI,DI,BP,SP,IP}` and
    /// `R8`-`R15`, the latter with an optional `B`/`W`/`D`/`L` size suffix.
    #[default]
    Extended,
    /// Only the eight classic names with an `E` or `R` prefix.
    /// `R8`-`R15` and `RIP` lex as identifiers.
    Classic,
}

impl RegisterSet {
    fn pattern(self) -> &'static str {
        match self {
            RegisterSet::Extended =>
                r"(R(8|9|1[0-5])[BWDL]?|E(AX|BX|CX|DX|SI|DI|BP|SP)|R(AX|BX|CX|DX|SI|DI|BP|SP|IP))\b",
            RegisterSet::Classic =>
                r"[ER](AX|BX|CX|DX|SI|DI|BP|SP)\b",
        }
    }

    /// Whether `name`, on its own, lexes as a register.
    pub fn is_register(self, name: &str) -> bool {
        single_token(name, self) == Some(TokenType::Register)
    }

    fn patterns(self) -> &'static [(Regex, Lexeme)] {
        static EXTENDED: OnceLock<Vec<(Regex, Lexeme)>> = OnceLock::new();
        static CLASSIC: OnceLock<Vec<(Regex, Lexeme)>> = OnceLock::new();
        let cell = match self {
            RegisterSet::Extended => &EXTENDED,
            RegisterSet::Classic => &CLASSIC,
        };
        cell.get_or_init(|| compile_patterns(self))
    }
}

/// Whether `name`, on its own, lexes as an identifier under some register set.
///
/// The classic set reserves the fewest names, so `R8` or `RIP` pass here even
/// though the extended set reads them as registers.
pub fn is_identifier(name: &str) -> bool {
    single_token(name, RegisterSet::Classic) == Some(TokenType::Identifier)
}

/// Cuts a trailing `;` comment off a line.
pub fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(start) => &line[..start],
        None => line,
    }
}

fn single_token(text: &str, registers: RegisterSet) -> Option<TokenType> {
    let (tokens, errors) = Lexer::new(text, registers).tokenize();
    match tokens.as_slice() {
        [token] if errors.is_empty() && token.span == (0..text.len()) => Some(token.ty),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Lexeme {
    Whitespace,
    Newline,
    Comment,
    Token(TokenType),
}

// The lexer tries to find these patterns in this order, after the
// mnemonics and registers. Each pattern gets a ^ prepended when it is
// compiled, so don't use ^.
const TRAILING_PATTERNS: [(&str, Lexeme); 6] = [
    (r"[0-9]+",                 Lexeme::Token(TokenType::Number)),
    (r"[a-zA-Z_][a-zA-Z0-9_]*", Lexeme::Token(TokenType::Identifier)),
    (r"\[",                     Lexeme::Token(TokenType::LeftBracket)),
    (r"\]",                     Lexeme::Token(TokenType::RightBracket)),
    (r"\+",                     Lexeme::Token(TokenType::Plus)),
    (r"-",                      Lexeme::Token(TokenType::Minus)),
];

fn compile_patterns(registers: RegisterSet) -> Vec<(Regex, Lexeme)> {
    let mut patterns = Vec::new();
    let mut register_pattern = |pattern: &str, lexeme: Lexeme| {
        assert!(!pattern.starts_with('^'));
        let regex = Regex::new(&format!("^{}", pattern)).expect("Invalid regex");
        patterns.push((regex, lexeme));
    };

    register_pattern(r"[^\S\r\n]+", Lexeme::Whitespace);
    register_pattern(r"(\r\n|\r|\n)", Lexeme::Newline);
    register_pattern(r";[^\r\n]*", Lexeme::Comment);

    // Longest spelling first, so CLFLUSHOPT is tried before CLFLUSH.
    let mnemonics = Mnemonic::ALL.iter().sorted_by_key(|m| std::cmp::Reverse(m.as_str().len()));
    for mnemonic in mnemonics {
        register_pattern(&format!(r"{}\b", mnemonic.as_str()), Lexeme::Token(TokenType::Mnemonic(*mnemonic)));
    }

    register_pattern(registers.pattern(), Lexeme::Token(TokenType::Register));

    for (pattern, lexeme) in TRAILING_PATTERNS.iter() {
        register_pattern(pattern, *lexeme);
    }

    patterns
}

/// Where the lexer currently stands in its input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'input> {
    src: &'input str,
    patterns: &'static [(Regex, Lexeme)],
    cur_pos: usize,
    line: usize,
    line_start: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(src: &'input str, registers: RegisterSet) -> Lexer<'input> {
        Self::starting_at_line(src, registers, 1)
    }

    /// A lexer whose first line is numbered `line` instead of 1.
    pub fn starting_at_line(src: &'input str, registers: RegisterSet, line: usize) -> Lexer<'input> {
        Lexer {
            src,
            patterns: registers.patterns(),
            cur_pos: 0,
            line,
            line_start: 0,
        }
    }

    /// Lexes the rest of the input, splitting tokens from errors.
    pub fn tokenize(&mut self) -> (Vec<Token<'input>>, Vec<LexError>) {
        self.by_ref().partition_map(|result| match result {
            Ok(token) => Either::Left(token),
            Err(error) => Either::Right(error),
        })
    }

    pub fn position(&self) -> Position {
        Position {
            offset: self.cur_pos,
            line: self.line,
            column: self.column_at(self.cur_pos),
        }
    }

    fn column_at(&self, offset: usize) -> usize {
        self.src[self.line_start..offset].chars().count() + 1
    }

    fn tail(&self) -> &'input str {
        &self.src[self.cur_pos..]
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Token<'input>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = self.cur_pos;
            let tail = self.tail();
            if tail.is_empty() {
                return None;
            }

            let column = self.column_at(start);
            let found = self.patterns.iter()
                .find_map(|(pattern, lexeme)| pattern.find(tail).map(|m| (m.end(), *lexeme)));

            let (len, lexeme) = match found {
                Some(found) => found,
                None => {
                    // Skip the character and keep going; the caller decides what a bad line means.
                    let character = tail.chars().next()?;
                    self.cur_pos += character.len_utf8();
                    return Some(Err(LexError {
                        character,
                        span: start..self.cur_pos,
                        line: self.line,
                        column,
                    }));
                }
            };

            self.cur_pos += len;
            match lexeme {
                Lexeme::Whitespace | Lexeme::Comment => {}
                Lexeme::Newline => {
                    self.line += 1;
                    self.line_start = self.cur_pos;
                }
                Lexeme::Token(ty) => {
                    return Some(Ok(Token {
                        src: &tail[..len],
                        span: start..self.cur_pos,
                        line: self.line,
                        column,
                        ty,
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn lex(src: &str, registers: RegisterSet) -> Vec<(TokenType, &str)> {
        let (tokens, errors) = Lexer::new(src, registers).tokenize();
        assert_eq!(errors, Vec::<LexError>::new());
        tokens.into_iter().map(|t| (t.ty, t.src)).collect()
    }

    #[test]
    fn offsets_lex_as_separate_sign_and_number() {
        assert_eq!(lex("PREFETCHT0 [ECX-8]", RegisterSet::Extended), vec![
            (TokenType::Mnemonic(Mnemonic::Prefetcht0), "PREFETCHT0"),
            (TokenType::LeftBracket, "["),
            (TokenType::Register, "ECX"),
            (TokenType::Minus, "-"),
            (TokenType::Number, "8"),
            (TokenType::RightBracket, "]"),
        ]);
    }

    #[test]
    fn longer_mnemonic_wins() {
        assert_eq!(lex("CLFLUSHOPT CLFLUSH", RegisterSet::Extended), vec![
            (TokenType::Mnemonic(Mnemonic::Clflushopt), "CLFLUSHOPT"),
            (TokenType::Mnemonic(Mnemonic::Clflush), "CLFLUSH"),
        ]);
    }

    #[test]
    fn registers_beat_identifiers_but_only_whole_words() {
        assert_eq!(lex("EAX EAXY RIP cache_line _tmp9", RegisterSet::Extended), vec![
            (TokenType::Register, "EAX"),
            (TokenType::Identifier, "EAXY"),
            (TokenType::Register, "RIP"),
            (TokenType::Identifier, "cache_line"),
            (TokenType::Identifier, "_tmp9"),
        ]);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(lex("clflush eax", RegisterSet::Extended), vec![
            (TokenType::Identifier, "clflush"),
            (TokenType::Identifier, "eax"),
        ]);
    }

    #[test]
    fn extended_registers() {
        for name in ["R8", "R9", "R10", "R15", "R15D", "R8B", "R12W", "R13L", "RSP", "EBP"].iter() {
            assert!(RegisterSet::Extended.is_register(name), "{} should be a register", name);
        }
        for name in ["R7", "R16", "R8X", "EIP", "R1"].iter() {
            assert!(!RegisterSet::Extended.is_register(name), "{} should not be a register", name);
        }
    }

    #[test]
    fn classic_registers_exclude_numbered_family() {
        assert!(RegisterSet::Classic.is_register("EDI"));
        assert!(RegisterSet::Classic.is_register("RDI"));
        assert!(!RegisterSet::Classic.is_register("RIP"));
        assert_eq!(lex("R15D", RegisterSet::Classic), vec![(TokenType::Identifier, "R15D")]);
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(lex("WBINVD ; flush [everything]", RegisterSet::Extended), vec![
            (TokenType::Mnemonic(Mnemonic::Wbinvd), "WBINVD"),
        ]);
        assert_eq!(strip_comment("CLFLUSH [EAX] ; flush it"), "CLFLUSH [EAX] ");
        assert_eq!(strip_comment("INVD"), "INVD");
    }

    #[test]
    fn unknown_characters_are_reported_and_skipped() {
        let (tokens, errors) = Lexer::new("CLWB [EAX] @ #", RegisterSet::Extended).tokenize();
        assert_eq!(tokens.len(), 4);
        assert_eq!(errors, vec![
            LexError { character: '@', span: 11..12, line: 1, column: 12 },
            LexError { character: '#', span: 13..14, line: 1, column: 14 },
        ]);
    }

    #[test]
    fn lines_and_columns() {
        let mut lexer = Lexer::starting_at_line("INVD\n  CLWB [x]", RegisterSet::Extended, 7);
        let (tokens, _) = lexer.tokenize();
        let positions: Vec<_> = tokens.iter().map(|t| (t.line, t.column)).collect();
        assert_eq!(positions, vec![(7, 1), (8, 3), (8, 8), (8, 9), (8, 10)]);
        assert_eq!(lexer.position(), Position { offset: 15, line: 8, column: 11 });
    }

    #[test]
    fn identifier_check() {
        assert!(is_identifier("cache_line"));
        assert!(is_identifier("R8"));
        assert!(is_identifier("R15D"));
        assert!(is_identifier("RIP"));
        assert!(!is_identifier("EAX"));
        assert!(!is_identifier("RSP"));
        assert!(!is_identifier("INVD"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("a b"));
    }
}
