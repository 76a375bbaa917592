//! A flat summary of what an instruction does and what it addresses.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::ast::{BaseExpr, Category, Instruction, Mnemonic};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Analysis {
    pub mnemonic: Mnemonic,
    pub category: Category,
    pub description: &'static str,
    pub has_operand: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operand: Option<OperandAnalysis>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OperandAnalysis {
    pub base_type: &'static str,
    pub base_value: String,
    pub has_offset: bool,
    pub offset_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_width: Option<u32>,
}

pub fn analyze(instruction: &Instruction) -> Analysis {
    let operand = instruction.operand().map(|operand| OperandAnalysis {
        base_type: operand.base().kind(),
        base_value: operand.base().name().to_string(),
        has_offset: operand.offset().is_some(),
        offset_value: operand.offset(),
        register_width: match operand.base() {
            BaseExpr::Register(register) => Some(register.bit_width()),
            BaseExpr::Identifier(_) => None,
        },
    });

    Analysis {
        mnemonic: instruction.mnemonic(),
        category: instruction.category(),
        description: instruction.category().description(),
        has_operand: operand.is_some(),
        operand,
    }
}

impl Display for Analysis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instruction:   {}", self.mnemonic)?;
        writeln!(f, "Category:      {}", self.description)?;
        writeln!(f, "Operand:       {}", if self.has_operand { "yes" } else { "no" })?;
        if let Some(operand) = &self.operand {
            writeln!(f, "Base type:     {}", operand.base_type)?;
            writeln!(f, "Base value:    {}", operand.base_value)?;
            if let Some(width) = operand.register_width {
                writeln!(f, "Register size: {}-bit", width)?;
            }
            if let Some(offset) = operand.offset_value {
                writeln!(f, "Offset:        {:+}", offset)?;
            }
        }
        Ok(())
    }
}
