//! Per-instruction-set jump pattern tables and jump-target resolution.
//!
//! Each supported instruction set carries an ordered list of
//! `(regex, no-fall-through)` pairs. The order is significant: patterns are
//! tried first to last and the first match wins, so more specific patterns
//! (e.g. conditional branches) must come before the patterns they are a
//! prefix of (e.g. the unconditional branch).

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use regex::Regex;

use crate::{Address, CfgError, Instruction};

/// The closed set of instruction sets with a jump pattern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum InstructionSet {
    /// 64-bit ARM
    AArch64,
    /// 32-bit ARM, Thumb-2 encoding
    AArch32T32,
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionSet::AArch64 => write!(f, "aarch64"),
            InstructionSet::AArch32T32 => write!(f, "aarch32t32"),
        }
    }
}

impl FromStr for InstructionSet {
    type Err = CfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aarch64" => Ok(InstructionSet::AArch64),
            "aarch32t32" | "thumb2" => Ok(InstructionSet::AArch32T32),
            _ => Err(CfgError::UnsupportedInstructionSet(s.to_string())),
        }
    }
}

/// One resolved-or-not jump target of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// The target address parsed out of the instruction text (or the
    /// fall-through successor's address)
    Resolved(Address),
    /// The operand did not parse as an address; the edge will be routed to
    /// the UNKNOWN sink
    Unresolved,
}

/// Classification of one instruction: whether control can fall through to
/// the next instruction, and the set of explicit jump targets.
#[derive(Debug, Clone, PartialEq)]
pub struct JumpTargets {
    /// True if control never reaches the next sequential instruction
    pub no_fall_thru: bool,
    /// Explicit targets, fall-through successor first when present
    pub targets: Vec<JumpTarget>,
}

impl JumpTargets {
    fn none() -> Self {
        Self {
            no_fall_thru: false,
            targets: Vec::new(),
        }
    }
}

/// One entry of a jump pattern table.
#[derive(Debug)]
struct JumpPattern {
    regex: Regex,
    no_fall_thru: bool,
}

/// Classifies instructions of one instruction set by matching their text
/// against an ordered jump pattern table.
#[derive(Debug)]
pub struct InstructionSetParser {
    patterns: Vec<JumpPattern>,
}

impl InstructionSetParser {
    /// Build the parser for one of the supported instruction sets.
    pub fn for_instruction_set(set: InstructionSet) -> Result<Self, CfgError> {
        let table: &[(&str, bool)] = match set {
            InstructionSet::AArch64 => &[
                // branch conditional:
                (r"^\s*b\.[a-z]+\s+(\S+)", false),
                // branch unconditional:
                (r"^\s*b\s+(\S+)", true),
                // cb(n)z
                (r"^\s*cbn?z\s+[^,]+,\s*(\S+)", false),
                // ret
                (r"^\s*ret", true),
            ],
            InstructionSet::AArch32T32 => &[
                // branch conditional (the optional dot accepts both the
                // unified "beq" and the dotted "b.eq" spelling):
                (
                    r"^\s*b\.?(?:ne|eq|cs|cc|mi|pl|vs|vc|hi|ls|ge|lt|gt|le)(?:\.[nw])?\s+(\S+)",
                    false,
                ),
                // branch unconditional:
                (r"^\s*b(?:\.[nw])?\s+(\S+)", true),
                // cb(n)z
                (r"^\s*cbn?z\s+[^,]+,\s*(\S+)", false),
                // function return
                (r"^\s*ret", true),
                (r"^\s*bx\s+lr", true),
            ],
        };

        let mut patterns = Vec::with_capacity(table.len());
        for &(pattern, no_fall_thru) in table {
            patterns.push(JumpPattern {
                regex: Regex::new(pattern)?,
                no_fall_thru,
            });
        }
        Ok(Self { patterns })
    }

    /// Classify `instruction` given its sequential successor (`None` when it
    /// is the last instruction of the disassembly, or when the successor is
    /// the UNKNOWN placeholder).
    ///
    /// An instruction matching no pattern is ordinary straight-line code:
    /// it falls through and has no explicit targets.
    pub fn jump_targets(
        &self,
        instruction: &Instruction,
        next_instruction: Option<&Instruction>,
    ) -> JumpTargets {
        for pattern in &self.patterns {
            let Some(captures) = pattern.regex.captures(&instruction.text) else {
                continue;
            };
            let mut targets = Vec::new();
            if !pattern.no_fall_thru {
                if let Some(addr) = next_instruction.and_then(|n| n.address) {
                    targets.push(JumpTarget::Resolved(addr));
                }
            }
            if let Some(operand) = captures.get(1) {
                targets.push(parse_target_address(operand.as_str()));
            }
            return JumpTargets {
                no_fall_thru: pattern.no_fall_thru,
                targets,
            };
        }
        JumpTargets::none()
    }
}

/// Parse a branch operand as a hexadecimal address, with or without a
/// leading `0x`. Operands that are not plain hex (symbolic targets,
/// register operands) stay unresolved and end up at the UNKNOWN sink.
fn parse_target_address(operand: &str) -> JumpTarget {
    let digits = operand
        .strip_prefix("0x")
        .or_else(|| operand.strip_prefix("0X"))
        .unwrap_or(operand);
    match Address::from_str_radix(digits, 16) {
        Ok(addr) => JumpTarget::Resolved(addr),
        Err(_) => JumpTarget::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn insn(address: Address, text: &str) -> Instruction {
        Instruction {
            address: Some(address),
            text: text.to_string(),
            weight: 0.0,
        }
    }

    #[rstest]
    #[case("b.eq 0x20", false, Some(0x20))]
    #[case("b.ne 400f08", false, Some(0x400f08))]
    #[case("b 0x40", true, Some(0x40))]
    #[case("cbz x0, 0x80", false, Some(0x80))]
    #[case("cbnz w1, 0x84", false, Some(0x84))]
    fn aarch64_branches(
        #[case] text: &str,
        #[case] no_fall_thru: bool,
        #[case] target: Option<Address>,
    ) {
        let parser = InstructionSetParser::for_instruction_set(InstructionSet::AArch64).unwrap();
        let next = insn(0x1004, "nop");
        let jt = parser.jump_targets(&insn(0x1000, text), Some(&next));
        assert_eq!(jt.no_fall_thru, no_fall_thru);
        if let Some(addr) = target {
            assert!(jt.targets.contains(&JumpTarget::Resolved(addr)));
        }
        // conditional branches also target the fall-through successor
        if !no_fall_thru {
            assert_eq!(jt.targets[0], JumpTarget::Resolved(0x1004));
        }
    }

    #[test]
    fn aarch64_ret_has_no_targets() {
        let parser = InstructionSetParser::for_instruction_set(InstructionSet::AArch64).unwrap();
        let next = insn(0x1004, "nop");
        let jt = parser.jump_targets(&insn(0x1000, "ret"), Some(&next));
        assert!(jt.no_fall_thru);
        assert!(jt.targets.is_empty());
    }

    #[test]
    fn pattern_order_is_most_specific_first() {
        // "b.eq" must hit the conditional pattern, not the unconditional "b"
        // pattern it is a prefix-sibling of.
        let parser = InstructionSetParser::for_instruction_set(InstructionSet::AArch64).unwrap();
        let next = insn(0x1004, "nop");
        let jt = parser.jump_targets(&insn(0x1000, "b.eq 0x20"), Some(&next));
        assert!(!jt.no_fall_thru);
        assert_eq!(jt.targets.len(), 2);
    }

    #[rstest]
    #[case("beq 0x20", false)]
    #[case("b.eq 0x20", false)]
    #[case("bne.n 0x30", false)]
    #[case("b.n 0x30", true)]
    #[case("b.w 0x30", true)]
    #[case("b 0x30", true)]
    #[case("cbnz r3, 0x44", false)]
    fn aarch32t32_branches(#[case] text: &str, #[case] no_fall_thru: bool) {
        let parser =
            InstructionSetParser::for_instruction_set(InstructionSet::AArch32T32).unwrap();
        let next = insn(0x14, "nop");
        let jt = parser.jump_targets(&insn(0x10, text), Some(&next));
        assert_eq!(jt.no_fall_thru, no_fall_thru, "{}", text);
        assert!(!jt.targets.is_empty());
    }

    #[test]
    fn aarch32t32_returns() {
        let parser =
            InstructionSetParser::for_instruction_set(InstructionSet::AArch32T32).unwrap();
        for text in ["ret", "bx lr"] {
            let jt = parser.jump_targets(&insn(0x10, text), None);
            assert!(jt.no_fall_thru, "{}", text);
            assert!(jt.targets.is_empty(), "{}", text);
        }
    }

    #[test]
    fn non_control_flow_falls_through() {
        let parser = InstructionSetParser::for_instruction_set(InstructionSet::AArch64).unwrap();
        let next = insn(0x1004, "nop");
        let jt = parser.jump_targets(&insn(0x1000, "mov x0, x1"), Some(&next));
        assert!(!jt.no_fall_thru);
        assert!(jt.targets.is_empty());
    }

    #[test]
    fn no_successor_means_no_fall_through_target() {
        let parser = InstructionSetParser::for_instruction_set(InstructionSet::AArch64).unwrap();
        let jt = parser.jump_targets(&insn(0x1000, "b.eq 0x20"), None);
        assert!(!jt.no_fall_thru);
        assert_eq!(jt.targets, vec![JumpTarget::Resolved(0x20)]);
    }

    #[test]
    fn symbolic_operand_stays_unresolved() {
        let parser = InstructionSetParser::for_instruction_set(InstructionSet::AArch64).unwrap();
        let jt = parser.jump_targets(&insn(0x1000, "b foo"), None);
        assert!(jt.no_fall_thru);
        assert_eq!(jt.targets, vec![JumpTarget::Unresolved]);
    }

    #[test]
    fn instruction_set_from_str() {
        assert_eq!(
            "aarch64".parse::<InstructionSet>().unwrap(),
            InstructionSet::AArch64
        );
        assert_eq!(
            "AArch32T32".parse::<InstructionSet>().unwrap(),
            InstructionSet::AArch32T32
        );
        let err = "mips".parse::<InstructionSet>().unwrap_err();
        assert!(matches!(err, CfgError::UnsupportedInstructionSet(_)));
        assert!(err.to_string().contains("mips"));
    }
}
