//! Renderer-facing JSON output formatter

use serde::{Deserialize, Serialize};

use super::LayoutFormatter;
use crate::graph::Cfg;
use crate::layout::{EdgeKind, Layout};
use crate::CfgError;

/// Serializable instruction row for JSON output
#[derive(Serialize, Deserialize)]
struct InstructionJson {
    /// Address as a hex string, absent for the UNKNOWN placeholder
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    /// Disassembly text
    text: String,
    /// Profiling weight
    weight: f64,
    /// Position relative to the owning block
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Serializable basic block for JSON output
#[derive(Serialize, Deserialize)]
struct BlockJson {
    /// Index into the block list (edge endpoints refer to this)
    index: usize,
    /// Start address as a hex string, absent for UNKNOWN
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    /// Aggregate profiling weight
    weight: f64,
    /// Screen-space frame
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    /// Instruction rows, in block order
    instructions: Vec<InstructionJson>,
}

/// Serializable edge for JSON output
#[derive(Serialize, Deserialize)]
struct EdgeJson {
    from: usize,
    to: usize,
    /// "fallthru" or "lane"
    #[serde(rename = "type")]
    edge_type: String,
    /// Lane index for lane-routed edges
    #[serde(skip_serializing_if = "Option::is_none")]
    lane: Option<usize>,
    /// True for edges whose target lies above their source
    backedge: bool,
    /// Polyline control points as [x, y] pairs
    points: Vec<[f64; 2]>,
}

/// The complete render model
#[derive(Serialize, Deserialize)]
struct RenderGraphJson {
    width: f64,
    height: f64,
    lanes: usize,
    blocks: Vec<BlockJson>,
    edges: Vec<EdgeJson>,
}

impl LayoutFormatter for super::JsonFormatter {
    fn format(&self, cfg: &Cfg, layout: &Layout) -> Result<String, CfgError> {
        let blocks = cfg
            .blocks
            .iter()
            .zip(&layout.blocks)
            .enumerate()
            .map(|(index, (bb, frame))| BlockJson {
                index,
                address: bb.address.map(|a| format!("0x{:x}", a)),
                weight: bb.weight,
                x: frame.x,
                y: frame.y,
                width: frame.width,
                height: frame.height,
                instructions: bb
                    .instructions
                    .iter()
                    .zip(&frame.instructions)
                    .map(|(insn, ib)| InstructionJson {
                        address: insn.address.map(|a| format!("0x{:x}", a)),
                        text: insn.text.clone(),
                        weight: insn.weight,
                        x: ib.x,
                        y: ib.y,
                        width: ib.width,
                        height: ib.height,
                    })
                    .collect(),
            })
            .collect();

        let edges = layout
            .edges
            .iter()
            .map(|e| EdgeJson {
                from: e.from,
                to: e.to,
                edge_type: match e.kind {
                    EdgeKind::FallThru => "fallthru".to_string(),
                    EdgeKind::Routed { .. } => "lane".to_string(),
                },
                lane: match e.kind {
                    EdgeKind::FallThru => None,
                    EdgeKind::Routed { lane } => Some(lane),
                },
                backedge: !e.downward,
                points: e.points.iter().map(|p| [p.x, p.y]).collect(),
            })
            .collect();

        let graph = RenderGraphJson {
            width: layout.width,
            height: layout.height,
            lanes: layout.lanes,
            blocks,
            edges,
        };
        Ok(serde_json::to_string_pretty(&graph)?)
    }
}
