//! The abstract syntax tree for a single cache-control instruction.
//!
//! Nodes are built by the [parser](crate::parser) during reductions and are
//! immutable afterwards. The one structural invariant, that an [`Instruction`]
//! carries an operand exactly when its [`Mnemonic`] requires one, is guaranteed
//! by the grammar table; the fields are private so nothing else can break it.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// One of the nine instruction keywords.
///
/// Matching in source text is case-sensitive: only the all-uppercase spelling
/// listed for each variant is recognized.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mnemonic {
    /// `CLFLUSH`
    Clflush,
    /// `CLFLUSHOPT`
    Clflushopt,
    /// `CLWB`
    Clwb,
    /// `PREFETCHT0`
    Prefetcht0,
    /// `PREFETCHT1`
    Prefetcht1,
    /// `PREFETCHT2`
    Prefetcht2,
    /// `PREFETCHNTA`
    Prefetchnta,
    /// `WBINVD`
    Wbinvd,
    /// `INVD`
    Invd,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 9] = [
        Mnemonic::Clflush,
        Mnemonic::Clflushopt,
        Mnemonic::Clwb,
        Mnemonic::Prefetcht0,
        Mnemonic::Prefetcht1,
        Mnemonic::Prefetcht2,
        Mnemonic::Prefetchnta,
        Mnemonic::Wbinvd,
        Mnemonic::Invd,
    ];

    pub fn as_str(self) -> &'static str {
        use Mnemonic::*;
        match self {
            Clflush     => "CLFLUSH",
            Clflushopt  => "CLFLUSHOPT",
            Clwb        => "CLWB",
            Prefetcht0  => "PREFETCHT0",
            Prefetcht1  => "PREFETCHT1",
            Prefetcht2  => "PREFETCHT2",
            Prefetchnta => "PREFETCHNTA",
            Wbinvd      => "WBINVD",
            Invd        => "INVD",
        }
    }

    /// Looks up a mnemonic by its exact source spelling.
    pub fn from_name(name: &str) -> Option<Mnemonic> {
        Self::ALL.iter().copied().find(|m| m.as_str() == name)
    }

    pub fn category(self) -> Category {
        use Mnemonic::*;
        match self {
            Clflush | Clflushopt => Category::Flush,
            Clwb => Category::WriteBack,
            Prefetcht0 | Prefetcht1 | Prefetcht2 | Prefetchnta => Category::Prefetch,
            Wbinvd | Invd => Category::Invalidate,
        }
    }

    /// `false` only for `WBINVD` and `INVD`, which operate on the whole cache.
    pub fn requires_operand(self) -> bool {
        !matches!(self, Mnemonic::Wbinvd | Mnemonic::Invd)
    }
}

impl Display for Mnemonic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of cache operation a [`Mnemonic`] performs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Flush,
    WriteBack,
    Prefetch,
    Invalidate,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::Flush      => "flush",
            Category::WriteBack  => "writeback",
            Category::Prefetch   => "prefetch",
            Category::Invalidate => "invalidate",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Flush      => "Cache Flush - evict the cache line from every level",
            Category::WriteBack  => "Cache Write-Back - write a dirty line back to memory",
            Category::Prefetch   => "Cache Prefetch - load a line into the cache ahead of use",
            Category::Invalidate => "Cache Invalidate - discard the contents of the cache",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The root of the tree: a mnemonic and, unless the mnemonic is `WBINVD` or
/// `INVD`, its memory operand.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Instruction {
    mnemonic: Mnemonic,
    operand: Option<MemoryOperand>,
}

impl Instruction {
    pub(crate) fn new(mnemonic: Mnemonic, operand: Option<MemoryOperand>) -> Self {
        debug_assert_eq!(
            mnemonic.requires_operand(),
            operand.is_some(),
            "grammar table produced {} with operand {:?}",
            mnemonic,
            operand
        );
        Instruction { mnemonic, operand }
    }

    pub fn mnemonic(&self) -> Mnemonic {
        self.mnemonic
    }

    pub fn operand(&self) -> Option<&MemoryOperand> {
        self.operand.as_ref()
    }

    pub fn category(&self) -> Category {
        self.mnemonic.category()
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(operand) => write!(f, "{} {}", self.mnemonic, operand),
            None => write!(f, "{}", self.mnemonic),
        }
    }
}

/// A bracketed address: `[base]`, `[base+n]` or `[base-n]`.
///
/// Offsets are only produced for register bases; the grammar has no
/// `IDENTIFIER offset` form.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MemoryOperand {
    base: BaseExpr,
    offset: Option<i64>,
}

impl MemoryOperand {
    pub(crate) fn new(base: BaseExpr, offset: Option<i64>) -> Self {
        MemoryOperand { base, offset }
    }

    pub fn base(&self) -> &BaseExpr {
        &self.base
    }

    /// The signed displacement, if one was written.
    pub fn offset(&self) -> Option<i64> {
        self.offset
    }
}

impl Display for MemoryOperand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "[{}{:+}]", self.base, offset),
            None => write!(f, "[{}]", self.base),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum BaseExpr {
    Register(Register),
    Identifier(Identifier),
}

impl BaseExpr {
    pub fn name(&self) -> &str {
        match self {
            BaseExpr::Register(register) => register.name(),
            BaseExpr::Identifier(identifier) => identifier.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BaseExpr::Register(_) => "Register",
            BaseExpr::Identifier(_) => "Identifier",
        }
    }
}

impl Display for BaseExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A general-purpose register, e.g. `EAX`, `RSP` or `R15D`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Register {
    name: String,
}

impl Register {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Register { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 64 for the `R` family, 32 for the `E` family.
    pub fn bit_width(&self) -> u32 {
        if self.name.starts_with('R') {
            64
        } else {
            32
        }
    }
}

/// A symbolic address such as `cache_line`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Identifier {
    name: String,
}

impl Identifier {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Identifier { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
