//! Control flow graph reconstruction from a flat profiled disassembly.
//!
//! The builder runs two passes over the instruction list. The first pass
//! asks the instruction set parser for every instruction's jump targets and
//! marks basic block boundaries: each resolved target address, and the
//! address following any instruction with at least one target, starts a new
//! block. The second pass cuts the instruction list at those boundaries and
//! computes each block's own targets and fall-through behavior from its last
//! instruction.
//!
//! Jump targets that do not land on a known block start (tail calls,
//! indirect jumps, jumps into unprofiled code) are not errors: their edges
//! are redirected to a synthetic UNKNOWN sink block appended to the graph.

use std::collections::{HashMap, HashSet};

use crate::isa::{InstructionSetParser, JumpTarget};
use crate::{Address, BasicBlock, CfgError, Edge, Instruction, ProfiledInstruction};

/// Disassembly text of the UNKNOWN sink block's placeholder instruction.
pub const UNKNOWN_TEXT: &str = "UNKNOWN";

/// An immutable control flow graph over one function's profiled disassembly.
///
/// Block order equals ascending instruction order; the layout engine relies
/// on this and stacks blocks top to bottom in list order. The UNKNOWN sink
/// is always the last block.
#[derive(Debug, Clone, PartialEq)]
pub struct Cfg {
    /// All basic blocks, in instruction order, UNKNOWN last
    pub blocks: Vec<BasicBlock>,
    /// All edges, in source block order
    pub edges: Vec<Edge>,
    /// Index of the UNKNOWN sink block (always `blocks.len() - 1`)
    pub unknown: usize,
}

impl Cfg {
    /// Build the CFG for `disassembly` using the given instruction set
    /// parser.
    ///
    /// Fails with [`CfgError::EmptyDisassembly`] for an empty instruction
    /// list; everything else is a total, deterministic transform.
    pub fn build(
        disassembly: &[ProfiledInstruction],
        parser: &InstructionSetParser,
    ) -> Result<Self, CfgError> {
        if disassembly.is_empty() {
            return Err(CfgError::EmptyDisassembly);
        }
        log::debug!(
            "building CFG from {} profiled instructions",
            disassembly.len()
        );

        let instructions: Vec<Instruction> = disassembly
            .iter()
            .map(|p| Instruction {
                address: Some(p.address),
                text: p.text.clone(),
                weight: p.weight(),
            })
            .collect();

        let mut blocks = create_basic_blocks(&instructions, parser);
        blocks.push(unknown_block());
        let unknown = blocks.len() - 1;

        // address -> block index, over real blocks only (UNKNOWN has none).
        let address2block: HashMap<Address, usize> = blocks
            .iter()
            .enumerate()
            .filter_map(|(i, bb)| bb.address.map(|a| (a, i)))
            .collect();

        let mut edges = Vec::new();
        for (i, bb) in blocks.iter().enumerate() {
            if bb.targets.is_empty() {
                // A block that ends for reasons other than its own control
                // flow (the next address is some jump's target) simply falls
                // through to the next real block in list order.
                if !bb.no_fall_thru && i + 1 < unknown {
                    edges.push(Edge { from: i, to: i + 1 });
                }
                continue;
            }
            for target in &bb.targets {
                let to = match target {
                    JumpTarget::Resolved(addr) => {
                        address2block.get(addr).copied().unwrap_or(unknown)
                    }
                    JumpTarget::Unresolved => unknown,
                };
                edges.push(Edge { from: i, to });
            }
        }

        log::debug!(
            "CFG complete: {} basic blocks, {} edges",
            blocks.len(),
            edges.len()
        );
        Ok(Cfg {
            blocks,
            edges,
            unknown,
        })
    }

    /// The UNKNOWN sink block.
    pub fn unknown_block(&self) -> &BasicBlock {
        &self.blocks[self.unknown]
    }

    /// Look up a block index by its start address.
    pub fn block_at(&self, address: Address) -> Option<usize> {
        self.blocks
            .iter()
            .position(|bb| bb.address == Some(address))
    }

    /// Outgoing edges of the block at `index`.
    pub fn outgoing_edges(&self, index: usize) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.from == index)
    }
}

/// Cut the instruction list into basic blocks.
fn create_basic_blocks(
    instructions: &[Instruction],
    parser: &InstructionSetParser,
) -> Vec<BasicBlock> {
    // Pass 1: boundary discovery.
    let mut block_starts: HashSet<Address> = HashSet::new();
    for (i, instruction) in instructions.iter().enumerate() {
        let next = instructions.get(i + 1);
        let jt = parser.jump_targets(instruction, next);
        if jt.targets.is_empty() {
            continue;
        }
        for target in &jt.targets {
            if let JumpTarget::Resolved(addr) = target {
                block_starts.insert(*addr);
            }
        }
        if let Some(addr) = next.and_then(|n| n.address) {
            block_starts.insert(addr);
        }
    }

    // Pass 2: block construction. A block never starts before the very
    // first instruction, even if its address is a discovered boundary.
    let mut blocks = Vec::new();
    let mut current: Vec<Instruction> = Vec::new();
    for (i, instruction) in instructions.iter().enumerate() {
        let is_boundary = instruction
            .address
            .is_some_and(|a| block_starts.contains(&a));
        if is_boundary && i > 0 {
            blocks.push(finish_block(
                std::mem::take(&mut current),
                Some(instruction),
                parser,
            ));
        }
        current.push(instruction.clone());
    }
    blocks.push(finish_block(current, None, parser));
    blocks
}

/// Seal one block: classify its last instruction (with the following
/// block's first instruction as fall-through lookahead) and total its
/// weight.
fn finish_block(
    instructions: Vec<Instruction>,
    fall_thru_instruction: Option<&Instruction>,
    parser: &InstructionSetParser,
) -> BasicBlock {
    debug_assert!(!instructions.is_empty());
    let last = &instructions[instructions.len() - 1];
    let jt = parser.jump_targets(last, fall_thru_instruction);
    let weight = instructions.iter().map(|i| i.weight).sum();
    BasicBlock {
        address: instructions[0].address,
        targets: jt.targets,
        no_fall_thru: jt.no_fall_thru,
        weight,
        instructions,
    }
}

/// The synthetic sink for unresolvable jump targets: one zero-weight
/// placeholder instruction, no address, no outgoing edges.
fn unknown_block() -> BasicBlock {
    BasicBlock {
        address: None,
        instructions: vec![Instruction {
            address: None,
            text: UNKNOWN_TEXT.to_string(),
            weight: 0.0,
        }],
        targets: Vec::new(),
        no_fall_thru: false,
        weight: 0.0,
    }
}
