//! The 18 production rules and the LR action/goto table.
//!
//! ```text
//! R1  instruction    → mnemonic operand
//! R2  instruction    → mnemonic
//! R3  mnemonic       → CLFLUSH          R7  mnemonic → PREFETCHT1
//! R4  mnemonic       → CLFLUSHOPT       R8  mnemonic → PREFETCHT2
//! R5  mnemonic       → CLWB             R9  mnemonic → PREFETCHNTA
//! R6  mnemonic       → PREFETCHT0       R10 mnemonic → WBINVD
//!                                       R11 mnemonic → INVD
//! R12 operand        → memory_address
//! R13 memory_address → [ base_expr ]
//! R14 base_expr      → REGISTER offset
//! R15 base_expr      → REGISTER
//! R16 base_expr      → IDENTIFIER
//! R17 offset         → + NUMBER
//! R18 offset         → - NUMBER
//! ```
//!
//! A plain LR(0) automaton would have one state after any mnemonic, with both
//! `[` and end of input allowed. Instead every mnemonic gets its own state, and
//! the reduction to `mnemonic` is only offered on the lookahead its class
//! permits: `[` for the seven operand-taking mnemonics, `$` for `WBINVD` and
//! `INVD`. A bare `CLFLUSH` therefore has no table entry at all.
//!
//! The table is a pair of `match` expressions; each `(state, symbol)` pair
//! maps to at most one entry.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ast::Mnemonic;
use crate::lexer::TokenType;

pub type StateId = usize;
pub type RuleId = usize;

pub const STATE_COUNT: usize = 24;
pub const INITIAL_STATE: StateId = 0;
pub const ACCEPT_STATE: StateId = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Terminal {
    Mnemonic(Mnemonic),
    Register,
    Number,
    Identifier,
    LeftBracket,
    RightBracket,
    Plus,
    Minus,
    EndOfInput,
}

impl Terminal {
    pub const ALL: [Terminal; 17] = [
        Terminal::Mnemonic(Mnemonic::Clflush),
        Terminal::Mnemonic(Mnemonic::Clflushopt),
        Terminal::Mnemonic(Mnemonic::Clwb),
        Terminal::Mnemonic(Mnemonic::Prefetcht0),
        Terminal::Mnemonic(Mnemonic::Prefetcht1),
        Terminal::Mnemonic(Mnemonic::Prefetcht2),
        Terminal::Mnemonic(Mnemonic::Prefetchnta),
        Terminal::Mnemonic(Mnemonic::Wbinvd),
        Terminal::Mnemonic(Mnemonic::Invd),
        Terminal::Register,
        Terminal::Number,
        Terminal::Identifier,
        Terminal::LeftBracket,
        Terminal::RightBracket,
        Terminal::Plus,
        Terminal::Minus,
        Terminal::EndOfInput,
    ];
}

impl From<TokenType> for Terminal {
    fn from(ty: TokenType) -> Self {
        match ty {
            TokenType::Mnemonic(mnemonic) => Terminal::Mnemonic(mnemonic),
            TokenType::Register     => Terminal::Register,
            TokenType::Number       => Terminal::Number,
            TokenType::Identifier   => Terminal::Identifier,
            TokenType::LeftBracket  => Terminal::LeftBracket,
            TokenType::RightBracket => Terminal::RightBracket,
            TokenType::Plus         => Terminal::Plus,
            TokenType::Minus        => Terminal::Minus,
        }
    }
}

impl Display for Terminal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Mnemonic(mnemonic) => write!(f, "{}", mnemonic),
            Terminal::Register     => f.write_str("REGISTER"),
            Terminal::Number       => f.write_str("NUMBER"),
            Terminal::Identifier   => f.write_str("IDENTIFIER"),
            Terminal::LeftBracket  => f.write_str("["),
            Terminal::RightBracket => f.write_str("]"),
            Terminal::Plus         => f.write_str("+"),
            Terminal::Minus        => f.write_str("-"),
            Terminal::EndOfInput   => f.write_str("$"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NonTerminal {
    Instruction,
    Mnemonic,
    Operand,
    MemoryAddress,
    BaseExpr,
    Offset,
}

impl NonTerminal {
    pub const ALL: [NonTerminal; 6] = [
        NonTerminal::Instruction,
        NonTerminal::Mnemonic,
        NonTerminal::Operand,
        NonTerminal::MemoryAddress,
        NonTerminal::BaseExpr,
        NonTerminal::Offset,
    ];
}

impl Display for NonTerminal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NonTerminal::Instruction   => "instruction",
            NonTerminal::Mnemonic      => "mnemonic",
            NonTerminal::Operand       => "operand",
            NonTerminal::MemoryAddress => "memory_address",
            NonTerminal::BaseExpr      => "base_expr",
            NonTerminal::Offset        => "offset",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    Terminal(Terminal),
    NonTerminal(NonTerminal),
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Terminal(terminal) => terminal.fmt(f),
            Symbol::NonTerminal(non_terminal) => non_terminal.fmt(f),
        }
    }
}

/// What a reduction builds. The parser matches on this instead of on rule numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Production {
    InstructionWithOperand,
    BareInstruction,
    Mnemonic(Mnemonic),
    Operand,
    MemoryAddress,
    RegisterWithOffset,
    Register,
    Identifier,
    PositiveOffset,
    NegativeOffset,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    pub lhs: NonTerminal,
    pub rhs: &'static [Symbol],
    pub production: Production,
}

impl Display for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "R{}: {} → {}", self.id, self.lhs, self.rhs.iter().join(" "))
    }
}

const INSTRUCTION: Symbol = Symbol::NonTerminal(NonTerminal::Instruction);
const MNEMONIC: Symbol = Symbol::NonTerminal(NonTerminal::Mnemonic);
const OPERAND: Symbol = Symbol::NonTerminal(NonTerminal::Operand);
const MEMORY_ADDRESS: Symbol = Symbol::NonTerminal(NonTerminal::MemoryAddress);
const BASE_EXPR: Symbol = Symbol::NonTerminal(NonTerminal::BaseExpr);
const OFFSET: Symbol = Symbol::NonTerminal(NonTerminal::Offset);
const REGISTER: Symbol = Symbol::Terminal(Terminal::Register);
const NUMBER: Symbol = Symbol::Terminal(Terminal::Number);
const IDENTIFIER: Symbol = Symbol::Terminal(Terminal::Identifier);
const LEFT_BRACKET: Symbol = Symbol::Terminal(Terminal::LeftBracket);
const RIGHT_BRACKET: Symbol = Symbol::Terminal(Terminal::RightBracket);
const PLUS: Symbol = Symbol::Terminal(Terminal::Plus);
const MINUS: Symbol = Symbol::Terminal(Terminal::Minus);

const fn mnemonic_rule(id: RuleId, mnemonic: Mnemonic) -> Rule {
    Rule {
        id,
        lhs: NonTerminal::Mnemonic,
        rhs: match mnemonic {
            Mnemonic::Clflush     => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Clflush))],
            Mnemonic::Clflushopt  => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Clflushopt))],
            Mnemonic::Clwb        => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Clwb))],
            Mnemonic::Prefetcht0  => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Prefetcht0))],
            Mnemonic::Prefetcht1  => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Prefetcht1))],
            Mnemonic::Prefetcht2  => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Prefetcht2))],
            Mnemonic::Prefetchnta => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Prefetchnta))],
            Mnemonic::Wbinvd      => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Wbinvd))],
            Mnemonic::Invd        => &[Symbol::Terminal(Terminal::Mnemonic(Mnemonic::Invd))],
        },
        production: Production::Mnemonic(mnemonic),
    }
}

pub static RULES: [Rule; 18] = [
    Rule { id: 1, lhs: NonTerminal::Instruction, rhs: &[MNEMONIC, OPERAND], production: Production::InstructionWithOperand },
    Rule { id: 2, lhs: NonTerminal::Instruction, rhs: &[MNEMONIC], production: Production::BareInstruction },
    mnemonic_rule(3, Mnemonic::Clflush),
    mnemonic_rule(4, Mnemonic::Clflushopt),
    mnemonic_rule(5, Mnemonic::Clwb),
    mnemonic_rule(6, Mnemonic::Prefetcht0),
    mnemonic_rule(7, Mnemonic::Prefetcht1),
    mnemonic_rule(8, Mnemonic::Prefetcht2),
    mnemonic_rule(9, Mnemonic::Prefetchnta),
    mnemonic_rule(10, Mnemonic::Wbinvd),
    mnemonic_rule(11, Mnemonic::Invd),
    Rule { id: 12, lhs: NonTerminal::Operand, rhs: &[MEMORY_ADDRESS], production: Production::Operand },
    Rule { id: 13, lhs: NonTerminal::MemoryAddress, rhs: &[LEFT_BRACKET, BASE_EXPR, RIGHT_BRACKET], production: Production::MemoryAddress },
    Rule { id: 14, lhs: NonTerminal::BaseExpr, rhs: &[REGISTER, OFFSET], production: Production::RegisterWithOffset },
    Rule { id: 15, lhs: NonTerminal::BaseExpr, rhs: &[REGISTER], production: Production::Register },
    Rule { id: 16, lhs: NonTerminal::BaseExpr, rhs: &[IDENTIFIER], production: Production::Identifier },
    Rule { id: 17, lhs: NonTerminal::Offset, rhs: &[PLUS, NUMBER], production: Production::PositiveOffset },
    Rule { id: 18, lhs: NonTerminal::Offset, rhs: &[MINUS, NUMBER], production: Production::NegativeOffset },
];

/// The augmenting rule `S' → instruction`, accepted rather than reduced.
pub const START_SYMBOL: Symbol = INSTRUCTION;

pub fn rule(id: RuleId) -> &'static Rule {
    &RULES[id - 1]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Shift(StateId),
    Reduce(RuleId),
    Accept,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shift(state) => write!(f, "s{}", state),
            Action::Reduce(rule) => write!(f, "r{}", rule),
            Action::Accept => f.write_str("acc"),
        }
    }
}

pub fn action(state: StateId, terminal: Terminal) -> Option<Action> {
    use Action::*;
    use Mnemonic::*;
    use Terminal as T;

    let action = match (state, terminal) {
        (0, T::Mnemonic(Clflush))     => Shift(3),
        (0, T::Mnemonic(Clflushopt))  => Shift(4),
        (0, T::Mnemonic(Clwb))        => Shift(5),
        (0, T::Mnemonic(Prefetcht0))  => Shift(6),
        (0, T::Mnemonic(Prefetcht1))  => Shift(7),
        (0, T::Mnemonic(Prefetcht2))  => Shift(8),
        (0, T::Mnemonic(Prefetchnta)) => Shift(9),
        (0, T::Mnemonic(Wbinvd))      => Shift(10),
        (0, T::Mnemonic(Invd))        => Shift(11),

        (1, T::EndOfInput) => Accept,

        (2, T::LeftBracket) => Shift(13),
        (2, T::EndOfInput)  => Reduce(2),

        // Operand-taking mnemonics: only reduce when a bracket follows.
        (3, T::LeftBracket) => Reduce(3),
        (4, T::LeftBracket) => Reduce(4),
        (5, T::LeftBracket) => Reduce(5),
        (6, T::LeftBracket) => Reduce(6),
        (7, T::LeftBracket) => Reduce(7),
        (8, T::LeftBracket) => Reduce(8),
        (9, T::LeftBracket) => Reduce(9),
        // Whole-cache mnemonics: only reduce at the end of the line.
        (10, T::EndOfInput) => Reduce(10),
        (11, T::EndOfInput) => Reduce(11),

        (12, T::EndOfInput) => Reduce(1),

        (13, T::Register)   => Shift(16),
        (13, T::Identifier) => Shift(17),

        (14, T::EndOfInput) => Reduce(12),

        (15, T::RightBracket) => Shift(18),

        (16, T::Plus)         => Shift(20),
        (16, T::Minus)        => Shift(21),
        (16, T::RightBracket) => Reduce(15),

        (17, T::RightBracket) => Reduce(16),
        (18, T::EndOfInput)   => Reduce(13),
        (19, T::RightBracket) => Reduce(14),

        (20, T::Number) => Shift(22),
        (21, T::Number) => Shift(23),

        (22, T::RightBracket) => Reduce(17),
        (23, T::RightBracket) => Reduce(18),

        _ => return None,
    };
    Some(action)
}

pub fn goto(state: StateId, non_terminal: NonTerminal) -> Option<StateId> {
    use NonTerminal as N;

    let next = match (state, non_terminal) {
        (0, N::Instruction)   => 1,
        (0, N::Mnemonic)      => 2,
        (2, N::Operand)       => 12,
        (2, N::MemoryAddress) => 14,
        (13, N::BaseExpr)     => 15,
        (16, N::Offset)       => 19,
        _ => return None,
    };
    Some(next)
}

/// Terminals with an entry in `state`, in [`Terminal::ALL`] order.
pub fn expected(state: StateId) -> Vec<Terminal> {
    Terminal::ALL.iter()
        .copied()
        .filter(|terminal| action(state, *terminal).is_some())
        .collect()
}

/// The mnemonic whose shift from the initial state leads to `state`, if any.
pub fn shifted_mnemonic(state: StateId) -> Option<Mnemonic> {
    Mnemonic::ALL.iter()
        .copied()
        .find(|m| action(INITIAL_STATE, Terminal::Mnemonic(*m)) == Some(Action::Shift(state)))
}

pub fn render_rules() -> String {
    RULES.iter().map(|rule| format!("{}\n", rule)).collect()
}

/// The action/goto table as a Markdown table.
pub fn render_table() -> String {
    let mut out = String::from("| State | Action | Goto |\n|-------|--------|------|\n");
    for state in 0..STATE_COUNT {
        let actions = Terminal::ALL.iter()
            .filter_map(|t| action(state, *t).map(|a| format!("{}: {}", t, a)))
            .join(", ");
        let gotos = NonTerminal::ALL.iter()
            .filter_map(|nt| goto(state, *nt).map(|next| format!("{}: {}", nt, next)))
            .join(", ");
        let or_dash = |s: String| if s.is_empty() { "-".to_string() } else { s };
        out.push_str(&format!("| {} | {} | {} |\n", state, or_dash(actions), or_dash(gotos)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    #[test]
    fn rules_are_numbered_in_order() {
        for (index, r) in RULES.iter().enumerate() {
            assert_eq!(r.id, index + 1);
            assert_eq!(rule(r.id), r);
        }
    }

    #[test]
    fn rule_display() {
        assert_eq!(rule(13).to_string(), "R13: memory_address → [ base_expr ]");
        assert_eq!(rule(6).to_string(), "R6: mnemonic → PREFETCHT0");
    }

    #[test]
    fn every_target_is_a_state_and_every_reduction_a_rule() {
        for state in 0..STATE_COUNT {
            for terminal in Terminal::ALL.iter() {
                match action(state, *terminal) {
                    Some(Action::Shift(next)) => assert!(next < STATE_COUNT),
                    Some(Action::Reduce(id)) => assert!((1..=RULES.len()).contains(&id)),
                    Some(Action::Accept) => assert_eq!((state, *terminal), (ACCEPT_STATE, Terminal::EndOfInput)),
                    None => {}
                }
            }
            for non_terminal in NonTerminal::ALL.iter() {
                if let Some(next) = goto(state, *non_terminal) {
                    assert!(next < STATE_COUNT);
                }
            }
        }
    }

    #[test]
    fn every_state_has_one_accessing_symbol() {
        let mut accessing: HashMap<StateId, Symbol> = HashMap::new();
        let mut record = |next: StateId, symbol: Symbol| {
            let previous = accessing.insert(next, symbol);
            assert!(previous.is_none() || previous == Some(symbol), "state {} entered on two symbols", next);
        };
        for state in 0..STATE_COUNT {
            for terminal in Terminal::ALL.iter() {
                if let Some(Action::Shift(next)) = action(state, *terminal) {
                    record(next, Symbol::Terminal(*terminal));
                }
            }
            for non_terminal in NonTerminal::ALL.iter() {
                if let Some(next) = goto(state, *non_terminal) {
                    record(next, Symbol::NonTerminal(*non_terminal));
                }
            }
        }
        // Everything but the initial state is reachable.
        assert_eq!(accessing.len(), STATE_COUNT - 1);
        assert_eq!(accessing.get(&ACCEPT_STATE), Some(&START_SYMBOL));
    }

    #[test]
    fn mnemonic_class_decides_the_follow_set() {
        for mnemonic in Mnemonic::ALL.iter() {
            let state = match action(INITIAL_STATE, Terminal::Mnemonic(*mnemonic)) {
                Some(Action::Shift(state)) => state,
                other => panic!("{} should shift, got {:?}", mnemonic, other),
            };
            assert_eq!(shifted_mnemonic(state), Some(*mnemonic));
            if mnemonic.requires_operand() {
                assert_eq!(expected(state), vec![Terminal::LeftBracket]);
            } else {
                assert_eq!(expected(state), vec![Terminal::EndOfInput]);
            }
        }
    }

    #[test]
    fn table_rendering() {
        let table = render_table();
        assert_eq!(table.lines().count(), STATE_COUNT + 2);
        assert!(table.contains("| 1 | $: acc | - |"));
        assert!(table.contains("| 16 | ]: r15, +: s20, -: s21 | offset: 19 |"));
        assert_eq!(render_rules().lines().count(), 18);
    }
}
