//! A plain key/value projection of the AST, and the checked way back.
//!
//! The projection mirrors the tree node for node, and carries a `type` tag
//! on every node plus redundant `has_operand`/`has_offset` flags so consumers
//! don't have to test for nulls:
//!
//! ```
//! # use cachectl::parse_line;
//! # use cachectl::Instruction;
//! let instruction = parse_line("CLFLUSHOPT [EBX+16]").unwrap();
//! let json = instruction.to_json();
//! assert!(json.contains(r#""bit_width":32"#));
//! assert_eq!(Instruction::from_json(&json).unwrap(), instruction);
//! ```
//!
//! Reconstruction never trusts its input: the mnemonic/operand invariant, the
//! presence flags, register names and bit widths are all checked again.

use serde::{Deserialize, Serialize};

use crate::ast::{BaseExpr, Identifier, Instruction, MemoryOperand, Mnemonic, Register};
use crate::error::StructureError;
use crate::lexer::{self, RegisterSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Instruction,
    MemoryOperand,
}

impl NodeKind {
    fn name(self) -> &'static str {
        match self {
            NodeKind::Instruction => "Instruction",
            NodeKind::MemoryOperand => "MemoryOperand",
        }
    }

    fn check(self, expected: NodeKind) -> Result<(), StructureError> {
        if self == expected {
            Ok(())
        } else {
            Err(StructureError::WrongNodeType { expected: expected.name(), found: self.name().to_string() })
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredInstruction {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub mnemonic: Mnemonic,
    pub operand: Option<StructuredOperand>,
    pub has_operand: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredOperand {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub base: StructuredBase,
    pub offset: Option<i64>,
    pub has_offset: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StructuredBase {
    Register { name: String, bit_width: u32 },
    Identifier { name: String },
}

impl Instruction {
    pub fn to_structured(&self) -> StructuredInstruction {
        StructuredInstruction {
            kind: NodeKind::Instruction,
            mnemonic: self.mnemonic(),
            operand: self.operand().map(MemoryOperand::to_structured),
            has_operand: self.operand().is_some(),
        }
    }

    /// The structured form as compact JSON.
    pub fn to_json(&self) -> String {
        // A tree of strings, integers and booleans always serializes.
        serde_json::to_string(&self.to_structured()).unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.to_structured()).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Instruction, StructureError> {
        let structured: StructuredInstruction = serde_json::from_str(json)?;
        Instruction::try_from(structured)
    }
}

impl MemoryOperand {
    pub fn to_structured(&self) -> StructuredOperand {
        let base = match self.base() {
            BaseExpr::Register(register) => StructuredBase::Register {
                name: register.name().to_string(),
                bit_width: register.bit_width(),
            },
            BaseExpr::Identifier(identifier) => StructuredBase::Identifier {
                name: identifier.name().to_string(),
            },
        };
        StructuredOperand {
            kind: NodeKind::MemoryOperand,
            base,
            offset: self.offset(),
            has_offset: self.offset().is_some(),
        }
    }
}

impl TryFrom<StructuredInstruction> for Instruction {
    type Error = StructureError;

    fn try_from(structured: StructuredInstruction) -> Result<Self, Self::Error> {
        structured.kind.check(NodeKind::Instruction)?;
        if structured.has_operand != structured.operand.is_some() {
            return Err(StructureError::PresenceMismatch { field: "operand", flag: structured.has_operand });
        }

        let mnemonic = structured.mnemonic;
        let operand = match (mnemonic.requires_operand(), structured.operand) {
            (true, Some(operand)) => Some(MemoryOperand::try_from(operand)?),
            (false, None) => None,
            (true, None) => return Err(StructureError::MissingOperand(mnemonic)),
            (false, Some(_)) => return Err(StructureError::UnexpectedOperand(mnemonic)),
        };
        Ok(Instruction::new(mnemonic, operand))
    }
}

impl TryFrom<StructuredOperand> for MemoryOperand {
    type Error = StructureError;

    fn try_from(structured: StructuredOperand) -> Result<Self, Self::Error> {
        structured.kind.check(NodeKind::MemoryOperand)?;
        if structured.has_offset != structured.offset.is_some() {
            return Err(StructureError::PresenceMismatch { field: "offset", flag: structured.has_offset });
        }

        let base = match structured.base {
            StructuredBase::Register { name, bit_width } => {
                if !RegisterSet::Extended.is_register(&name) {
                    return Err(StructureError::InvalidRegister(name));
                }
                let register = Register::new(name);
                if register.bit_width() != bit_width {
                    return Err(StructureError::BitWidthMismatch {
                        name: register.name().to_string(),
                        claimed: bit_width,
                        actual: register.bit_width(),
                    });
                }
                BaseExpr::Register(register)
            }
            StructuredBase::Identifier { name } => {
                if !lexer::is_identifier(&name) {
                    return Err(StructureError::InvalidIdentifier(name));
                }
                if structured.offset.is_some() {
                    return Err(StructureError::OffsetOnIdentifier(name));
                }
                BaseExpr::Identifier(Identifier::new(name))
            }
        };
        Ok(MemoryOperand::new(base, structured.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::parse_line;

    #[test]
    fn projection_shape() {
        let instruction = parse_line("PREFETCHT0 [ECX-8]").unwrap();
        let value = serde_json::to_value(instruction.to_structured()).unwrap();
        assert_eq!(value, json!({
            "type": "Instruction",
            "mnemonic": "PREFETCHT0",
            "operand": {
                "type": "MemoryOperand",
                "base": { "type": "Register", "name": "ECX", "bit_width": 32 },
                "offset": -8,
                "has_offset": true,
            },
            "has_operand": true,
        }));

        let value = serde_json::to_value(parse_line("WBINVD").unwrap().to_structured()).unwrap();
        assert_eq!(value, json!({
            "type": "Instruction",
            "mnemonic": "WBINVD",
            "operand": null,
            "has_operand": false,
        }));
    }

    #[test]
    fn identifier_bases_have_no_width() {
        let structured = parse_line("CLWB [cache_line]").unwrap().to_structured();
        let operand = structured.operand.unwrap();
        assert_eq!(operand.base, StructuredBase::Identifier { name: "cache_line".to_string() });
        assert!(!operand.has_offset);
    }

    #[test]
    fn round_trips() {
        let lines = [
            "CLFLUSH [EAX]",
            "CLFLUSHOPT [EBX+16]",
            "CLWB [cache_line]",
            "PREFETCHT1 [R15D-4096]",
            "PREFETCHNTA [RAX+128]",
            "INVD",
        ];
        for line in lines.iter() {
            let instruction = parse_line(line).unwrap();
            let back = Instruction::try_from(instruction.to_structured()).unwrap();
            assert_eq!(back, instruction);
            assert_eq!(Instruction::from_json(&instruction.to_json_pretty()).unwrap(), instruction);
        }
    }

    fn rebuild(value: serde_json::Value) -> Result<Instruction, StructureError> {
        Instruction::from_json(&value.to_string())
    }

    #[test]
    fn operand_invariant_is_checked() {
        let error = rebuild(json!({
            "type": "Instruction", "mnemonic": "CLFLUSH", "operand": null, "has_operand": false,
        })).unwrap_err();
        assert_eq!(error.to_string(), "CLFLUSH requires an operand");

        let error = rebuild(json!({
            "type": "Instruction",
            "mnemonic": "INVD",
            "operand": {
                "type": "MemoryOperand",
                "base": { "type": "Identifier", "name": "x" },
                "offset": null,
                "has_offset": false,
            },
            "has_operand": true,
        })).unwrap_err();
        assert_eq!(error.to_string(), "INVD takes no operand");
    }

    #[test]
    fn flags_and_names_are_checked() {
        let operand = |base: serde_json::Value, offset: serde_json::Value, has_offset: bool| json!({
            "type": "Instruction",
            "mnemonic": "CLWB",
            "operand": { "type": "MemoryOperand", "base": base, "offset": offset, "has_offset": has_offset },
            "has_operand": true,
        });

        let error = rebuild(operand(json!({ "type": "Register", "name": "EAX", "bit_width": 32 }), json!(8), false));
        assert!(matches!(error, Err(StructureError::PresenceMismatch { field: "offset", flag: false })));

        let error = rebuild(operand(json!({ "type": "Register", "name": "EIP", "bit_width": 32 }), json!(null), false));
        assert!(matches!(error, Err(StructureError::InvalidRegister(ref name)) if name == "EIP"));

        let error = rebuild(operand(json!({ "type": "Register", "name": "RAX", "bit_width": 32 }), json!(null), false));
        assert!(matches!(error, Err(StructureError::BitWidthMismatch { claimed: 32, actual: 64, .. })));

        let error = rebuild(operand(json!({ "type": "Identifier", "name": "EAX" }), json!(null), false));
        assert!(matches!(error, Err(StructureError::InvalidIdentifier(_))));

        let error = rebuild(operand(json!({ "type": "Identifier", "name": "line" }), json!(4), true));
        assert!(matches!(error, Err(StructureError::OffsetOnIdentifier(_))));
    }

    #[test]
    fn node_types_and_syntax_are_checked() {
        let error = rebuild(json!({
            "type": "MemoryOperand", "mnemonic": "INVD", "operand": null, "has_operand": false,
        })).unwrap_err();
        assert_eq!(error.to_string(), "expected a node of type Instruction, found MemoryOperand");

        assert!(matches!(Instruction::from_json("{"), Err(StructureError::Json(_))));
        assert!(matches!(
            rebuild(json!({ "type": "Instruction", "mnemonic": "NOP", "operand": null, "has_operand": false })),
            Err(StructureError::Json(_))
        ));
    }
}
