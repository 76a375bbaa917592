//! The shift-reduce engine.
//!
//! [`Parser::parse`] lexes one line, then runs the automaton from
//! [`grammar`](crate::grammar) over the tokens. It keeps a stack of states and
//! a parallel stack of values: shifts push leaf fragments (a register, a
//! number, ...), reductions pop one value per right-hand-side symbol and push
//! the node the rule builds. When the table accepts, the only value left is
//! the [`Instruction`].
//!
//! Every step can be observed through a [`Tracer`]:
//!
//! ```
//! # use cachectl::parser::{Parser, TraceLog};
//! let mut log = TraceLog::default();
//! Parser::new().with_tracer(&mut log).parse("WBINVD").unwrap();
//! let actions: Vec<String> = log.rows().iter().map(|row| row.action.clone()).collect();
//! assert_eq!(actions, vec!["shift 10", "reduce", "reduce", "accept"]);
//! ```

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ast::{BaseExpr, Identifier, Instruction, MemoryOperand, Mnemonic, Register};
use crate::error::{Hint, ParseError};
use crate::grammar::{self, Action, Production, Rule, StateId, Symbol, Terminal};
use crate::lexer::{strip_comment, Lexer, Position, RegisterSet, Token, TokenType};
use crate::Span;

/// One step of the automaton, reported before it is carried out.
#[derive(Debug)]
pub struct Step<'a> {
    /// Symbols on the stack, bottom first.
    pub stack: Vec<Symbol>,
    /// Lexemes not yet shifted, ending with `$`.
    pub input: Vec<&'a str>,
    pub action: StepAction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepAction {
    Shift(StateId),
    Reduce(&'static Rule),
    Accept,
    Error,
}

impl Display for StepAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StepAction::Shift(state) => write!(f, "shift {}", state),
            StepAction::Reduce(_) => f.write_str("reduce"),
            StepAction::Accept => f.write_str("accept"),
            StepAction::Error => f.write_str("error"),
        }
    }
}

pub trait Tracer {
    fn step(&mut self, step: &Step<'_>);
}

impl<F: FnMut(&Step<'_>)> Tracer for F {
    fn step(&mut self, step: &Step<'_>) {
        self(step)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRow {
    pub stack: String,
    pub input: String,
    pub action: String,
    pub rule: Option<String>,
}

/// Records every step as a row of a shift-reduce trace table.
#[derive(Clone, Debug, Default)]
pub struct TraceLog {
    rows: Vec<TraceRow>,
}

impl TraceLog {
    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }
}

impl Tracer for TraceLog {
    fn step(&mut self, step: &Step<'_>) {
        let stack = std::iter::once("$".to_string())
            .chain(step.stack.iter().map(Symbol::to_string))
            .join(" ");
        let rule = match step.action {
            StepAction::Reduce(rule) => Some(rule.to_string()),
            _ => None,
        };
        self.rows.push(TraceRow {
            stack,
            input: step.input.iter().join(" "),
            action: step.action.to_string(),
            rule,
        });
    }
}

impl Display for TraceLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let stack_width = self.rows.iter().map(|r| r.stack.chars().count()).max().unwrap_or(0).max(5);
        let input_width = self.rows.iter().map(|r| r.input.chars().count()).max().unwrap_or(0).max(5);
        writeln!(f, "{:<4} | {:<sw$} | {:<iw$} | {:<9} | rule", "step", "stack", "input", "action",
                 sw = stack_width, iw = input_width)?;
        for (index, row) in self.rows.iter().enumerate() {
            writeln!(f, "{:<4} | {:<sw$} | {:<iw$} | {:<9} | {}", index + 1, row.stack, row.input, row.action,
                     row.rule.as_deref().unwrap_or(""), sw = stack_width, iw = input_width)?;
        }
        Ok(())
    }
}

/// A value on the parser's value stack.
#[derive(Debug)]
enum Fragment {
    Punctuation(TokenType),
    Mnemonic(Mnemonic),
    Register(Register),
    Identifier(Identifier),
    Number(Magnitude),
    Offset(i64),
    Operand(MemoryOperand),
    Instruction(Instruction),
}

/// An unsigned NUMBER, kept with its position until its sign is known.
#[derive(Debug)]
struct Magnitude {
    value: u64,
    text: String,
    span: Span,
    line: usize,
    column: usize,
}

impl Magnitude {
    fn signed(self, negative: bool) -> Result<i64, ParseError> {
        let value = if negative {
            0i64.checked_sub_unsigned(self.value)
        } else {
            i64::try_from(self.value).ok()
        };
        value.ok_or_else(|| ParseError::InvalidNumber {
            text: if negative { format!("-{}", self.text) } else { self.text },
            span: self.span,
            line: self.line,
            column: self.column,
        })
    }
}

// The table only ever reduces a rule when the stack holds exactly its
// right-hand side, so a mismatch here is a table defect.
macro_rules! take {
    ($fragments:expr, $variant:ident) => {
        match $fragments.next() {
            Some(Fragment::$variant(value)) => value,
            other => unreachable!("expected {} on the value stack, found {:?}", stringify!($variant), other),
        }
    };
}

/// Parses lines into [`Instruction`]s.
///
/// Parser values hold only options; all parsing state lives on the stack of
/// a single [`parse`](Parser::parse) call.
pub struct Parser<'t> {
    registers: RegisterSet,
    first_line: usize,
    tracer: Option<&'t mut dyn Tracer>,
}

impl Default for Parser<'_> {
    fn default() -> Self {
        Parser::new()
    }
}

impl<'t> Parser<'t> {
    pub fn new() -> Self {
        Parser {
            registers: RegisterSet::default(),
            first_line: 1,
            tracer: None,
        }
    }

    pub fn with_registers(mut self, registers: RegisterSet) -> Self {
        self.registers = registers;
        self
    }

    /// Line number reported in positions and errors. Defaults to 1.
    pub fn starting_at_line(mut self, line: usize) -> Self {
        self.first_line = line;
        self
    }

    pub fn with_tracer(mut self, tracer: &'t mut dyn Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn parse(&mut self, text: &str) -> Result<Instruction, ParseError> {
        let code = strip_comment(text);
        let mut lexer = Lexer::starting_at_line(code, self.registers, self.first_line);
        let (tokens, errors) = lexer.tokenize();
        if !errors.is_empty() {
            return Err(ParseError::Lex(errors));
        }
        let end = lexer.position();

        let mut states: Vec<StateId> = vec![grammar::INITIAL_STATE];
        let mut values: Vec<(Symbol, Fragment)> = Vec::new();
        let mut cursor = 0;

        loop {
            let state = *states.last().unwrap_or(&grammar::INITIAL_STATE);
            let token = tokens.get(cursor);
            let lookahead = token.map_or(Terminal::EndOfInput, |t| Terminal::from(t.ty));
            let action = grammar::action(state, lookahead);
            self.trace(symbols(&values), &tokens[cursor..], step_action(action));

            match (action, token) {
                (Some(Action::Shift(next)), Some(token)) => {
                    let fragment = match leaf(token) {
                        Ok(fragment) => fragment,
                        Err(error) => {
                            self.trace(symbols(&values), &tokens[cursor..], StepAction::Error);
                            return Err(error);
                        }
                    };
                    values.push((Symbol::Terminal(lookahead), fragment));
                    states.push(next);
                    cursor += 1;
                }
                (Some(Action::Reduce(id)), _) => {
                    let rule = grammar::rule(id);
                    let len = rule.rhs.len();
                    let popped = values.split_off(values.len() - len);
                    let rhs: Vec<Symbol> = popped.iter().map(|(symbol, _)| *symbol).collect();
                    let fragment = match reduce(rule, popped.into_iter().map(|(_, fragment)| fragment)) {
                        Ok(fragment) => fragment,
                        Err(error) => {
                            self.trace(symbols(&values).chain(rhs), &tokens[cursor..], StepAction::Error);
                            return Err(error);
                        }
                    };
                    states.truncate(states.len() - len);

                    let top = *states.last().unwrap_or(&grammar::INITIAL_STATE);
                    let next = grammar::goto(top, rule.lhs)
                        .unwrap_or_else(|| unreachable!("no goto from state {} on {}", top, rule.lhs));
                    states.push(next);
                    values.push((Symbol::NonTerminal(rule.lhs), fragment));
                }
                (Some(Action::Accept), _) => {
                    return match values.pop() {
                        Some((_, Fragment::Instruction(instruction))) => Ok(instruction),
                        other => unreachable!("accepted with {:?} on the value stack", other),
                    };
                }
                // The table never shifts end of input.
                (Some(Action::Shift(_)), None) | (None, _) => {
                    return Err(syntax_error(state, token, &values, end));
                }
            }
        }
    }

    fn trace(&mut self, stack: impl Iterator<Item = Symbol>, remaining: &[Token<'_>], action: StepAction) {
        let tracer = match self.tracer.as_deref_mut() {
            Some(tracer) => tracer,
            None => return,
        };
        let step = Step {
            stack: stack.collect(),
            input: remaining.iter().map(|t| t.src).chain(std::iter::once("$")).collect(),
            action,
        };
        tracer.step(&step);
    }
}

fn symbols<'v>(values: &'v [(Symbol, Fragment)]) -> impl Iterator<Item = Symbol> + 'v {
    values.iter().map(|(symbol, _)| *symbol)
}

fn step_action(action: Option<Action>) -> StepAction {
    match action {
        Some(Action::Shift(next)) => StepAction::Shift(next),
        Some(Action::Reduce(id)) => StepAction::Reduce(grammar::rule(id)),
        Some(Action::Accept) => StepAction::Accept,
        None => StepAction::Error,
    }
}

fn leaf(token: &Token<'_>) -> Result<Fragment, ParseError> {
    let fragment = match token.ty {
        TokenType::Mnemonic(mnemonic) => Fragment::Mnemonic(mnemonic),
        TokenType::Register => Fragment::Register(Register::new(token.src)),
        TokenType::Identifier => Fragment::Identifier(Identifier::new(token.src)),
        TokenType::Number => {
            let value = token.src.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
                text: token.src.to_string(),
                span: token.span.clone(),
                line: token.line,
                column: token.column,
            })?;
            Fragment::Number(Magnitude {
                value,
                text: token.src.to_string(),
                span: token.span.clone(),
                line: token.line,
                column: token.column,
            })
        }
        TokenType::LeftBracket | TokenType::RightBracket | TokenType::Plus | TokenType::Minus => {
            Fragment::Punctuation(token.ty)
        }
    };
    Ok(fragment)
}

fn reduce(rule: &Rule, mut fragments: impl Iterator<Item = Fragment>) -> Result<Fragment, ParseError> {
    let fragment = match rule.production {
        Production::InstructionWithOperand => {
            let mnemonic = take!(fragments, Mnemonic);
            let operand = take!(fragments, Operand);
            Fragment::Instruction(Instruction::new(mnemonic, Some(operand)))
        }
        Production::BareInstruction => {
            let mnemonic = take!(fragments, Mnemonic);
            Fragment::Instruction(Instruction::new(mnemonic, None))
        }
        Production::Mnemonic(expected) => {
            let mnemonic = take!(fragments, Mnemonic);
            debug_assert_eq!(mnemonic, expected);
            Fragment::Mnemonic(mnemonic)
        }
        Production::Operand => Fragment::Operand(take!(fragments, Operand)),
        Production::MemoryAddress => {
            take!(fragments, Punctuation);
            let operand = take!(fragments, Operand);
            take!(fragments, Punctuation);
            Fragment::Operand(operand)
        }
        Production::RegisterWithOffset => {
            let register = take!(fragments, Register);
            let offset = take!(fragments, Offset);
            Fragment::Operand(MemoryOperand::new(BaseExpr::Register(register), Some(offset)))
        }
        Production::Register => {
            let register = take!(fragments, Register);
            Fragment::Operand(MemoryOperand::new(BaseExpr::Register(register), None))
        }
        Production::Identifier => {
            let identifier = take!(fragments, Identifier);
            Fragment::Operand(MemoryOperand::new(BaseExpr::Identifier(identifier), None))
        }
        Production::PositiveOffset => {
            take!(fragments, Punctuation);
            Fragment::Offset(take!(fragments, Number).signed(false)?)
        }
        Production::NegativeOffset => {
            take!(fragments, Punctuation);
            Fragment::Offset(take!(fragments, Number).signed(true)?)
        }
    };
    Ok(fragment)
}

fn syntax_error(state: StateId, token: Option<&Token<'_>>, values: &[(Symbol, Fragment)], end: Position) -> ParseError {
    let expected = grammar::expected(state);
    let found = token.map_or(Terminal::EndOfInput, |t| Terminal::from(t.ty));
    let hint = hint(state, found, &expected, values);

    match token {
        Some(token) if expected == [Terminal::EndOfInput] => ParseError::TrailingInput {
            found: token.ty,
            text: token.src.to_string(),
            span: token.span.clone(),
            line: token.line,
            column: token.column,
            hint,
        },
        Some(token) => ParseError::UnexpectedToken {
            found: token.ty,
            text: token.src.to_string(),
            span: token.span.clone(),
            line: token.line,
            column: token.column,
            expected,
            hint,
        },
        None => ParseError::UnexpectedEnd {
            span: end.offset..end.offset,
            line: end.line,
            column: end.column,
            expected,
            hint,
        },
    }
}

fn hint(state: StateId, found: Terminal, expected: &[Terminal], values: &[(Symbol, Fragment)]) -> Option<Hint> {
    if let Some(mnemonic) = grammar::shifted_mnemonic(state) {
        return Some(if mnemonic.requires_operand() {
            Hint::OperandRequired(mnemonic)
        } else {
            Hint::OperandForbidden(mnemonic)
        });
    }

    let top = values.last().map(|(symbol, _)| *symbol);
    if top == Some(Symbol::Terminal(Terminal::Register)) && found == Terminal::Number {
        return Some(Hint::MissingSign);
    }

    let bracket_open = values.iter().any(|(symbol, _)| *symbol == Symbol::Terminal(Terminal::LeftBracket));
    if bracket_open && (found == Terminal::EndOfInput || expected.contains(&Terminal::RightBracket)) {
        return Some(Hint::UnbalancedBracket);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn trace_of_register_operand() {
        let mut log = TraceLog::default();
        Parser::new().with_tracer(&mut log).parse("CLFLUSH [EAX]").unwrap();

        let rows: Vec<(&str, &str, &str)> = log.rows().iter()
            .map(|r| (r.stack.as_str(), r.input.as_str(), r.action.as_str()))
            .collect();
        assert_eq!(rows, vec![
            ("$", "CLFLUSH [ EAX ] $", "shift 3"),
            ("$ CLFLUSH", "[ EAX ] $", "reduce"),
            ("$ mnemonic", "[ EAX ] $", "shift 13"),
            ("$ mnemonic [", "EAX ] $", "shift 16"),
            ("$ mnemonic [ REGISTER", "] $", "reduce"),
            ("$ mnemonic [ base_expr", "] $", "shift 18"),
            ("$ mnemonic [ base_expr ]", "$", "reduce"),
            ("$ mnemonic memory_address", "$", "reduce"),
            ("$ mnemonic operand", "$", "reduce"),
            ("$ instruction", "$", "accept"),
        ]);

        let rules: Vec<_> = log.rows().iter().filter_map(|r| r.rule.clone()).collect();
        assert_eq!(rules, vec![
            "R3: mnemonic → CLFLUSH",
            "R15: base_expr → REGISTER",
            "R13: memory_address → [ base_expr ]",
            "R12: operand → memory_address",
            "R1: instruction → mnemonic operand",
        ]);
    }

    #[test]
    fn closures_can_trace() {
        let mut reductions = 0;
        let mut count = |step: &Step<'_>| {
            if let StepAction::Reduce(_) = step.action {
                reductions += 1;
            }
        };
        Parser::new().with_tracer(&mut count).parse("CLFLUSHOPT [EBX+16]").unwrap();
        // mnemonic, offset, base_expr, memory_address, operand, instruction
        assert_eq!(reductions, 6);
    }

    #[test]
    fn trace_records_the_failing_step() {
        let mut log = TraceLog::default();
        assert!(Parser::new().with_tracer(&mut log).parse("CLFLUSH").is_err());
        let last = log.rows().last().unwrap();
        assert_eq!((last.stack.as_str(), last.action.as_str()), ("$ CLFLUSH", "error"));
    }

    #[test]
    fn trace_table_rendering() {
        let mut log = TraceLog::default();
        Parser::new().with_tracer(&mut log).parse("INVD").unwrap();
        let table = log.to_string();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("step | stack"));
        assert!(lines[2].ends_with("R11: mnemonic → INVD"));
    }

    #[test]
    fn hints() {
        let hint_of = |text: &str| Parser::new().parse(text).unwrap_err().hint();
        assert_eq!(hint_of("CLFLUSH"), Some(Hint::OperandRequired(Mnemonic::Clflush)));
        assert_eq!(hint_of("CLWB EAX"), Some(Hint::OperandRequired(Mnemonic::Clwb)));
        assert_eq!(hint_of("INVD [EAX]"), Some(Hint::OperandForbidden(Mnemonic::Invd)));
        assert_eq!(hint_of("CLFLUSH [EAX"), Some(Hint::UnbalancedBracket));
        assert_eq!(hint_of("CLFLUSH [EAX+4"), Some(Hint::UnbalancedBracket));
        assert_eq!(hint_of("CLFLUSH [EAX 4]"), Some(Hint::MissingSign));
        assert_eq!(hint_of("CLFLUSH []"), None);
        assert_eq!(hint_of(""), None);
    }

    #[test]
    fn errors_carry_positions() {
        let error = Parser::new().starting_at_line(12).parse("PREFETCHT1 [ESI+]").unwrap_err();
        assert_eq!(error, ParseError::UnexpectedToken {
            found: TokenType::RightBracket,
            text: "]".to_string(),
            span: 16..17,
            line: 12,
            column: 17,
            expected: vec![Terminal::Number],
            hint: None,
        });
    }

    #[test]
    fn offsets_must_fit() {
        let error = Parser::new().parse("CLWB [RAX+99999999999999999999]").unwrap_err();
        assert!(matches!(error, ParseError::InvalidNumber { ref text, .. } if text == "99999999999999999999"));
        let parsed = Parser::new().parse("CLWB [RAX-9223372036854775807]").unwrap();
        assert_eq!(parsed.operand().unwrap().offset(), Some(-9223372036854775807));
    }

    #[test]
    fn offsets_cover_the_whole_i64_range() {
        let offset = |text: &str| Parser::new().parse(text).map(|i| i.operand().and_then(|o| o.offset()));
        assert_eq!(offset("CLWB [RAX-9223372036854775808]"), Ok(Some(i64::MIN)));
        assert_eq!(offset("CLWB [RAX+9223372036854775807]"), Ok(Some(i64::MAX)));

        let error = Parser::new().parse("CLWB [RAX+9223372036854775808]").unwrap_err();
        assert_eq!(error, ParseError::InvalidNumber {
            text: "9223372036854775808".to_string(),
            span: 10..29,
            line: 1,
            column: 11,
        });
        let error = Parser::new().parse("CLWB [RAX-9223372036854775809]").unwrap_err();
        assert!(matches!(error, ParseError::InvalidNumber { ref text, .. } if text == "-9223372036854775809"));
    }

    #[test]
    fn out_of_range_numbers_end_the_trace_with_an_error() {
        let last_step = |text: &str| {
            let mut log = TraceLog::default();
            assert!(Parser::new().with_tracer(&mut log).parse(text).is_err());
            let last = log.rows().last().unwrap().clone();
            (last.stack, last.action)
        };
        assert_eq!(
            last_step("CLWB [RAX+99999999999999999999]"),
            ("$ mnemonic [ REGISTER +".to_string(), "error".to_string())
        );
        assert_eq!(
            last_step("CLWB [RAX+9223372036854775808]"),
            ("$ mnemonic [ REGISTER + NUMBER".to_string(), "error".to_string())
        );
    }
}
