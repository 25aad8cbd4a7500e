//! Graphviz dot output formatter

use super::LayoutFormatter;
use crate::graph::Cfg;
use crate::layout::Layout;
use crate::CfgError;

impl LayoutFormatter for super::DotFormatter {
    fn format(&self, cfg: &Cfg, _layout: &Layout) -> Result<String, CfgError> {
        let mut out = String::new();
        out.push_str("digraph cfg {\n");
        out.push_str("  node [shape=box fontname=\"monospace\"];\n");
        for (i, bb) in cfg.blocks.iter().enumerate() {
            let label = match bb.address {
                Some(addr) => format!(
                    "0x{:x}\\n{} insns, weight {:.2}",
                    addr,
                    bb.instructions.len(),
                    bb.weight
                ),
                None => "UNKNOWN".to_string(),
            };
            out.push_str(&format!("  bb{} [label=\"{}\"];\n", i, label));
        }
        for edge in &cfg.edges {
            out.push_str(&format!("  bb{} -> bb{};\n", edge.from, edge.to));
        }
        out.push_str("}\n");
        Ok(out)
    }
}
