//! Text trees and derivations.
//!
//! [`Render`] draws the AST itself; [`Instruction::parse_tree`] and
//! [`Instruction::derivation_steps`] show how the 18 grammar rules produce it.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ast::{BaseExpr, Identifier, Instruction, MemoryOperand, Register};
use crate::grammar::{self, Production, Rule, Symbol, RULES};

/// A labelled node with ordered children, drawn with box characters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    pub label: String,
    pub children: Vec<Tree>,
}

impl Tree {
    pub fn leaf(label: impl Into<String>) -> Self {
        Tree { label: label.into(), children: Vec::new() }
    }

    pub fn node(label: impl Into<String>, children: Vec<Tree>) -> Self {
        Tree { label: label.into(), children }
    }

    fn write_children(&self, f: &mut Formatter<'_>, prefix: &str) -> fmt::Result {
        for (index, child) in self.children.iter().enumerate() {
            let last = index + 1 == self.children.len();
            let (branch, indent) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
            write!(f, "\n{}{}{}", prefix, branch, child.label)?;
            child.write_children(f, &format!("{}{}", prefix, indent))?;
        }
        Ok(())
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        self.write_children(f, "")
    }
}

pub trait Render {
    fn tree(&self) -> Tree;

    fn to_tree_text(&self) -> String {
        self.tree().to_string()
    }
}

impl Render for Instruction {
    fn tree(&self) -> Tree {
        let child = match self.operand() {
            Some(operand) => operand.tree(),
            None => Tree::leaf("No Operand"),
        };
        Tree::node(format!("Instruction: {}", self.mnemonic()), vec![child])
    }
}

impl Render for MemoryOperand {
    fn tree(&self) -> Tree {
        let offset = match self.offset() {
            Some(offset) => format!("Offset: {:+}", offset),
            None => "Offset: None".to_string(),
        };
        Tree::node("MemoryOperand", vec![self.base().tree(), Tree::leaf(offset)])
    }
}

impl Render for BaseExpr {
    fn tree(&self) -> Tree {
        match self {
            BaseExpr::Register(register) => register.tree(),
            BaseExpr::Identifier(identifier) => identifier.tree(),
        }
    }
}

impl Render for Register {
    fn tree(&self) -> Tree {
        Tree::leaf(format!("Register: {} ({}-bit)", self.name(), self.bit_width()))
    }
}

impl Render for Identifier {
    fn tree(&self) -> Tree {
        Tree::leaf(format!("Identifier: {}", self.name()))
    }
}

impl Instruction {
    /// The rules of the leftmost derivation of this instruction, in order.
    pub fn derivation_rules(&self) -> Vec<&'static Rule> {
        let by_production = |production: Production| {
            RULES.iter()
                .find(|rule| rule.production == production)
                .unwrap_or_else(|| unreachable!("no rule builds {:?}", production))
        };

        let mut rules = Vec::new();
        let operand = match self.operand() {
            Some(operand) => operand,
            None => {
                rules.push(by_production(Production::BareInstruction));
                rules.push(by_production(Production::Mnemonic(self.mnemonic())));
                return rules;
            }
        };

        rules.push(by_production(Production::InstructionWithOperand));
        rules.push(by_production(Production::Mnemonic(self.mnemonic())));
        rules.push(by_production(Production::Operand));
        rules.push(by_production(Production::MemoryAddress));
        match (operand.base(), operand.offset()) {
            (BaseExpr::Register(_), Some(offset)) => {
                rules.push(by_production(Production::RegisterWithOffset));
                rules.push(by_production(if offset < 0 {
                    Production::NegativeOffset
                } else {
                    Production::PositiveOffset
                }));
            }
            (BaseExpr::Register(_), None) => rules.push(by_production(Production::Register)),
            (BaseExpr::Identifier(_), _) => rules.push(by_production(Production::Identifier)),
        }
        rules
    }

    /// The source text of each terminal, left to right.
    fn lexemes(&self) -> Vec<String> {
        let mut lexemes = vec![self.mnemonic().to_string()];
        if let Some(operand) = self.operand() {
            lexemes.push("[".to_string());
            lexemes.push(operand.base().name().to_string());
            if let Some(offset) = operand.offset() {
                lexemes.push(if offset < 0 { "-" } else { "+" }.to_string());
                lexemes.push(offset.unsigned_abs().to_string());
            }
            lexemes.push("]".to_string());
        }
        lexemes
    }

    /// The full parse tree: one node per grammar symbol, terminals as leaves.
    ///
    /// ```
    /// # use cachectl::parse_line;
    /// let tree = parse_line("CLWB [cache_line]").unwrap().parse_tree_text();
    /// assert_eq!(tree, "\
    /// instruction
    /// ├── mnemonic
    /// │   └── CLWB (terminal)
    /// └── operand
    ///     └── memory_address
    ///         ├── [ (terminal)
    ///         ├── base_expr
    ///         │   └── cache_line (terminal)
    ///         └── ] (terminal)");
    /// ```
    pub fn parse_tree(&self) -> Tree {
        let mut rules = self.derivation_rules().into_iter();
        let mut lexemes = self.lexemes().into_iter();
        expand(grammar::START_SYMBOL, &mut rules, &mut lexemes)
    }

    pub fn parse_tree_text(&self) -> String {
        self.parse_tree().to_string()
    }

    /// Every sentential form of the leftmost derivation, from `instruction`
    /// down to the source text.
    pub fn derivation_steps(&self) -> Vec<String> {
        let mut sentence = vec![grammar::START_SYMBOL];
        let mut steps = vec![sentence.iter().join(" ")];

        for rule in self.derivation_rules() {
            let position = sentence.iter().position(|symbol| matches!(symbol, Symbol::NonTerminal(_)));
            let position = match position {
                Some(position) => position,
                None => break,
            };
            sentence.splice(position..=position, rule.rhs.iter().copied());
            steps.push(sentence.iter().join(" "));
        }

        let source = self.lexemes().join(" ");
        if steps.last() != Some(&source) {
            steps.push(source);
        }
        steps
    }
}

fn expand(
    symbol: Symbol,
    rules: &mut impl Iterator<Item = &'static Rule>,
    lexemes: &mut impl Iterator<Item = String>,
) -> Tree {
    match symbol {
        Symbol::Terminal(terminal) => {
            let lexeme = lexemes.next().unwrap_or_else(|| terminal.to_string());
            Tree::leaf(format!("{} (terminal)", lexeme))
        }
        Symbol::NonTerminal(non_terminal) => match rules.next() {
            Some(rule) => {
                debug_assert_eq!(rule.lhs, non_terminal);
                let children = rule.rhs.iter().map(|symbol| expand(*symbol, rules, lexemes)).collect();
                Tree::node(non_terminal.to_string(), children)
            }
            None => Tree::leaf(non_terminal.to_string()),
        },
    }
}
