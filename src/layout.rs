//! Deterministic 2-D layout of a control flow graph.
//!
//! Blocks are stacked vertically in block-list order (which equals
//! instruction order), separated by a fixed gap. Edges between vertically
//! adjacent blocks in the downward direction are fall-through edges and are
//! drawn as a direct line. Every other edge is routed through a vertical
//! lane to the right of the blocks: it leaves the bottom of its source
//! block, runs horizontally to its lane, vertically along the lane, and
//! horizontally into the top of its target block.
//!
//! Lane assignment is a greedy first-fit: edges are processed shortest span
//! first (so short edges stay close to the blocks) and each takes the first
//! lane that is free across every block row it crosses, growing the lane set
//! when none fits. This is a heuristic, not a minimum-lane solver; a lane
//! choice is never revisited.

use serde::Serialize;

use crate::graph::Cfg;

/// Fixed size and gap parameters of the layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutParams {
    /// Horizontal distance between adjacent vertical lanes
    pub lane_gap: f64,
    /// Vertical gap between consecutive blocks
    pub block_gap: f64,
    /// Rendered height of one instruction line
    pub line_height: f64,
    /// Average rendered width of one character of instruction text
    pub char_width: f64,
    /// Width of the per-block weight sidebar
    pub weight_gutter: f64,
    /// Horizontal offset of the instruction text inside a block (leaves
    /// room for the weight sidebar and the address column)
    pub text_offset: f64,
    /// Vertical distance between edge attachment slots on one block
    pub slot_gap: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            lane_gap: 10.0,
            block_gap: 15.0,
            line_height: 10.0,
            char_width: 6.0,
            weight_gutter: 20.0,
            text_offset: 120.0,
            slot_gap: 0.0,
        }
    }
}

/// A point in layout space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Rendered geometry of one instruction line, relative to its block frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Screen-space frame of one basic block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockFrame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// One box per instruction, in block order
    pub instructions: Vec<InstructionBox>,
}

/// How an edge is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeKind {
    /// Direct line between two vertically adjacent blocks
    FallThru,
    /// Three-segment polyline routed through a vertical lane
    Routed {
        /// Index of the assigned lane, innermost first
        lane: usize,
    },
}

/// Laid-out geometry of one edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgePath {
    /// Index of the source block
    pub from: usize,
    /// Index of the target block
    pub to: usize,
    /// False for a back edge (target above source); renderers style these
    /// differently
    pub downward: bool,
    pub kind: EdgeKind,
    /// Polyline control points: two for a fall-through edge, four for a
    /// routed edge
    pub points: Vec<Point>,
}

/// The complete laid-out graph. A pure function of the CFG and the layout
/// parameters; recomputed in full for every new CFG.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    /// One frame per block, same order as `Cfg::blocks`
    pub blocks: Vec<BlockFrame>,
    /// One path per edge, same order as `Cfg::edges`
    pub edges: Vec<EdgePath>,
    /// Number of vertical lanes in use
    pub lanes: usize,
    /// X position of the innermost lane
    pub lane_offset: f64,
    /// Total drawing width
    pub width: f64,
    /// Total drawing height
    pub height: f64,
}

/// Per-row occupancy of one vertical lane: whether an edge already uses the
/// row's top or bottom attachment point.
#[derive(Debug, Clone, Copy, Default)]
struct RowSlots {
    top: bool,
    bottom: bool,
}

/// Working record for one edge between classification and lane assignment.
struct EdgeWork {
    downward: bool,
    /// Smaller of the two block indices
    start: usize,
    /// Larger of the two block indices
    end: usize,
    fall_thru: bool,
    start_x: f64,
    start_y: f64,
    end_x: f64,
    end_y: f64,
    lane: Option<usize>,
}

impl Layout {
    /// Compute the layout of `cfg`. Total for every well-formed graph,
    /// including graphs with a single block or no edges.
    pub fn compute(cfg: &Cfg, params: &LayoutParams) -> Layout {
        log::debug!(
            "computing layout for {} blocks, {} edges",
            cfg.blocks.len(),
            cfg.edges.len()
        );

        let blocks = stack_blocks(cfg, params);
        let height: f64 = blocks
            .last()
            .map(|b| b.y + b.height + params.block_gap)
            .unwrap_or(0.0);

        let mut works = classify_edges(cfg, &blocks, params);
        let occupancy = assign_lanes(&mut works, blocks.len());

        let max_block_width = blocks.iter().map(|b| b.width).fold(0.0, f64::max);
        let lane_offset = max_block_width + params.lane_gap;
        let lanes = occupancy.len();
        let width = lane_offset + params.lane_gap * lanes as f64;

        let edges = cfg
            .edges
            .iter()
            .zip(&works)
            .map(|(edge, w)| EdgePath {
                from: edge.from,
                to: edge.to,
                downward: w.downward,
                kind: match w.lane {
                    None => EdgeKind::FallThru,
                    Some(lane) => EdgeKind::Routed { lane },
                },
                points: polyline(w, lane_offset, params),
            })
            .collect();

        Layout {
            blocks,
            edges,
            lanes,
            lane_offset,
            width,
            height,
        }
    }
}

/// Stack block frames top to bottom in list order.
fn stack_blocks(cfg: &Cfg, params: &LayoutParams) -> Vec<BlockFrame> {
    let mut frames = Vec::with_capacity(cfg.blocks.len());
    let mut offset = 0.0;
    for bb in &cfg.blocks {
        let mut instructions = Vec::with_capacity(bb.instructions.len());
        let mut inner = 0.0;
        let mut text_width = 0.0f64;
        for insn in &bb.instructions {
            let w = params.char_width * insn.text.chars().count() as f64;
            instructions.push(InstructionBox {
                x: 0.0,
                y: inner,
                width: w,
                height: params.line_height,
            });
            inner += params.line_height + 1.0;
            text_width = text_width.max(w);
        }
        let frame = BlockFrame {
            x: 0.0,
            y: offset,
            width: text_width + params.text_offset,
            height: inner,
            instructions,
        };
        offset += frame.height + params.block_gap;
        frames.push(frame);
    }
    frames
}

/// First edge pass: direction, normalized block span, fall-through
/// detection, and attachment coordinates.
fn classify_edges(cfg: &Cfg, blocks: &[BlockFrame], params: &LayoutParams) -> Vec<EdgeWork> {
    let mut free_top = vec![0usize; blocks.len()];
    let mut free_bottom = vec![0usize; blocks.len()];
    let mut works = Vec::with_capacity(cfg.edges.len());
    for edge in &cfg.edges {
        let from = &blocks[edge.from];
        let to = &blocks[edge.to];
        let downward = from.y < to.y;
        let (start, end) = if downward {
            (edge.from, edge.to)
        } else {
            (edge.to, edge.from)
        };
        let fall_thru = downward && start + 1 == end;
        if fall_thru {
            // direct line from the bottom center of the source to the top
            // center of the target; centered on the narrower of the two.
            let x = from.width.min(to.width) / 2.0;
            works.push(EdgeWork {
                downward,
                start,
                end,
                fall_thru,
                start_x: x,
                start_y: from.y + from.height,
                end_x: x,
                end_y: to.y,
                lane: None,
            });
            continue;
        }
        let bottom_slot = free_bottom[edge.from];
        free_bottom[edge.from] += 1;
        let top_slot = free_top[edge.to];
        free_top[edge.to] += 1;
        works.push(EdgeWork {
            downward,
            start,
            end,
            fall_thru,
            start_x: from.width,
            start_y: from.y + from.height - params.slot_gap * bottom_slot as f64,
            end_x: to.width,
            end_y: to.y + params.slot_gap * top_slot as f64,
            lane: None,
        });
    }
    works
}

/// Second edge pass: greedy first-fit lane assignment, shortest spans
/// first. Returns the final lane occupancy grid.
fn assign_lanes(works: &mut [EdgeWork], rows: usize) -> Vec<Vec<RowSlots>> {
    let mut order: Vec<usize> = (0..works.len()).filter(|&i| !works[i].fall_thru).collect();
    order.sort_by_key(|&i| works[i].end - works[i].start);

    let mut occupancy: Vec<Vec<RowSlots>> = Vec::new();
    for i in order {
        let w = &mut works[i];
        let lane = match occupancy.iter().position(|lane| lane_is_free(lane, w)) {
            Some(lane) => lane,
            None => {
                occupancy.push(vec![RowSlots::default(); rows]);
                occupancy.len() - 1
            }
        };
        reserve_lane(&mut occupancy[lane], w);
        w.lane = Some(lane);
    }
    occupancy
}

fn lane_is_free(lane: &[RowSlots], w: &EdgeWork) -> bool {
    let blocked_at_start = if w.downward {
        lane[w.start].bottom
    } else {
        lane[w.start].top
    };
    if blocked_at_start {
        return false;
    }
    for i in w.start + 1..w.end {
        if lane[i].top || lane[i].bottom {
            return false;
        }
    }
    let blocked_at_end = if w.downward {
        lane[w.end].top
    } else {
        lane[w.end].bottom
    };
    !blocked_at_end
}

fn reserve_lane(lane: &mut [RowSlots], w: &EdgeWork) {
    if w.downward {
        lane[w.start].bottom = true;
    } else {
        lane[w.start].top = true;
    }
    for i in w.start + 1..w.end {
        lane[i].top = true;
        lane[i].bottom = true;
    }
    if w.downward {
        lane[w.end].top = true;
    } else {
        lane[w.end].bottom = true;
    }
}

/// Final polyline: a straight segment for a fall-through edge, three
/// segments (out, along the lane, in) for a routed edge.
fn polyline(w: &EdgeWork, lane_offset: f64, params: &LayoutParams) -> Vec<Point> {
    match w.lane {
        None => vec![
            Point {
                x: w.start_x,
                y: w.start_y,
            },
            Point {
                x: w.end_x,
                y: w.end_y,
            },
        ],
        Some(lane) => {
            let lane_x = lane_offset + params.lane_gap * lane as f64;
            vec![
                Point {
                    x: w.start_x,
                    y: w.start_y,
                },
                Point {
                    x: lane_x,
                    y: w.start_y,
                },
                Point {
                    x: lane_x,
                    y: w.end_y,
                },
                Point {
                    x: w.end_x,
                    y: w.end_y,
                },
            ]
        }
    }
}
