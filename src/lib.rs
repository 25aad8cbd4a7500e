//! Core IR, CFG reconstruction, and layout for the profile_cfg viewer backend.
//!
//! This library takes the flat, profiled disassembly of one function (a list
//! of weighted, addressed instruction strings) and reconstructs a control
//! flow graph from it: instructions are grouped into basic blocks by
//! heuristically matching jump instructions against per-instruction-set
//! pattern tables, blocks are connected by edges (including synthetic
//! fall-through edges and edges to a special UNKNOWN sink for unresolvable
//! targets), and finally the graph is given a deterministic 2-D layout
//! (vertically stacked blocks, lane-routed edges) that an external renderer
//! can draw directly.
//!
//! The crate performs no I/O: fetching profile data and drawing the result
//! are the caller's concern.
//!
//! # Basic Usage
//!
//! ```rust
//! use std::collections::HashMap;
//! use profile_cfg::{
//!     isa::{InstructionSet, InstructionSetParser},
//!     layout::{Layout, LayoutParams},
//!     graph::Cfg,
//!     ProfiledInstruction,
//! };
//!
//! // Profiled disassembly as delivered by the profile server:
//! // one (counter map, address, text) record per instruction.
//! let disassembly: Vec<ProfiledInstruction> = vec![
//!     ProfiledInstruction::new(HashMap::from([("cycles".to_string(), 10.0)]),
//!                              0x10, "mov x0, x1".to_string()),
//!     ProfiledInstruction::new(HashMap::from([("cycles".to_string(), 42.0)]),
//!                              0x14, "ret".to_string()),
//! ];
//!
//! let parser = InstructionSetParser::for_instruction_set(InstructionSet::AArch64).unwrap();
//! let cfg = Cfg::build(&disassembly, &parser).unwrap();
//! let layout = Layout::compute(&cfg, &LayoutParams::default());
//!
//! assert_eq!(cfg.blocks.len(), 2); // one real block + UNKNOWN
//! assert!(layout.height > 0.0);
//! ```

pub mod format;
pub mod graph;
pub mod isa;
pub mod layout;
#[cfg(test)]
mod pipeline_tests;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::isa::JumpTarget;

/// Represents an instruction address.
pub type Address = u64;

/// Name of the distinguished profile counter used as per-instruction weight.
pub const WEIGHT_COUNTER: &str = "cycles";

/// One profiled instruction as delivered by the external profile collaborator:
/// a counter-name to weight mapping, the instruction address, and the
/// disassembly text. On the wire this is a three-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(HashMap<String, f64>, Address, String)")]
#[serde(into = "(HashMap<String, f64>, Address, String)")]
pub struct ProfiledInstruction {
    /// Per-counter sample weights (e.g. "cycles" -> 12.5)
    pub counters: HashMap<String, f64>,
    /// Instruction address
    pub address: Address,
    /// Disassembly text (mnemonic + operands)
    pub text: String,
}

impl ProfiledInstruction {
    /// Create a new profiled instruction record.
    pub fn new(counters: HashMap<String, f64>, address: Address, text: String) -> Self {
        Self {
            counters,
            address,
            text,
        }
    }

    /// The weight of the distinguished counter, or 0.0 when absent.
    pub fn weight(&self) -> f64 {
        self.counters.get(WEIGHT_COUNTER).copied().unwrap_or(0.0)
    }
}

impl From<(HashMap<String, f64>, Address, String)> for ProfiledInstruction {
    fn from((counters, address, text): (HashMap<String, f64>, Address, String)) -> Self {
        Self {
            counters,
            address,
            text,
        }
    }
}

impl From<ProfiledInstruction> for (HashMap<String, f64>, Address, String) {
    fn from(p: ProfiledInstruction) -> Self {
        (p.counters, p.address, p.text)
    }
}

/// One instruction in the graph. Immutable once created.
///
/// The placeholder instruction of the UNKNOWN sink block is the only
/// instruction without an address.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Address of the instruction, `None` only for the UNKNOWN placeholder
    pub address: Option<Address>,
    /// Disassembly text (mnemonic + operands)
    pub text: String,
    /// Profiling weight attributed to this instruction
    pub weight: f64,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(addr) => write!(f, "{:x}\t{}", addr, self.text),
            None => write!(f, "\t{}", self.text),
        }
    }
}

/// One basic block: a non-empty straight-line instruction run whose only
/// control-flow transfer, if any, is at the last instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Block identity: the first instruction's address (`None` for UNKNOWN)
    pub address: Option<Address>,
    /// Instructions within this basic block, in address order
    pub instructions: Vec<Instruction>,
    /// Jump targets of the last instruction (resolved or not)
    pub targets: Vec<JumpTarget>,
    /// True if the last instruction never falls to the next instruction
    pub no_fall_thru: bool,
    /// Sum of constituent instruction weights
    pub weight: f64,
}

impl BasicBlock {
    /// Get the last instruction of this block.
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// True if this is the synthetic UNKNOWN sink block.
    pub fn is_unknown(&self) -> bool {
        self.address.is_none()
    }
}

/// A directed edge between two basic blocks, identified by their indices in
/// the owning graph's block list. Parallel edges are permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Index of the source block
    pub from: usize,
    /// Index of the target block
    pub to: usize,
}

/// Error type for graph construction and export.
#[derive(Debug, thiserror::Error)]
pub enum CfgError {
    /// The requested instruction set has no jump-pattern table
    #[error("there is no support for reconstructing the CFG for the {0} instruction set")]
    UnsupportedInstructionSet(String),

    /// An empty disassembly cannot produce a graph
    #[error("cannot build a control flow graph from an empty disassembly")]
    EmptyDisassembly,

    /// A jump pattern failed to compile
    #[error("invalid jump pattern: {0}")]
    PatternError(#[from] regex::Error),

    /// Serializing the render model failed
    #[error("failed to serialize layout: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Build the full pipeline in one call: select the instruction set, construct
/// the CFG, and compute its layout.
pub fn build_layout(
    disassembly: &[ProfiledInstruction],
    instruction_set: isa::InstructionSet,
    params: &layout::LayoutParams,
) -> Result<(graph::Cfg, layout::Layout), CfgError> {
    let parser = isa::InstructionSetParser::for_instruction_set(instruction_set)?;
    let cfg = graph::Cfg::build(disassembly, &parser)?;
    let layout = layout::Layout::compute(&cfg, params);
    Ok((cfg, layout))
}
