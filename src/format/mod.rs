//! Render-model export for laid-out graphs.
//!
//! The renderer-facing JSON carries everything an SVG/Canvas layer needs to
//! draw the graph without touching the core again; the Graphviz output is a
//! debugging aid for inspecting graph structure without a renderer.

mod dot;
mod json;

pub use self::dot::*;
pub use self::json::*;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::graph::Cfg;
use crate::layout::Layout;
use crate::CfgError;

/// Supported output formats for a laid-out graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Renderer-facing JSON (blocks, instructions, edge polylines)
    Json,
    /// Graphviz dot (structure only, no geometry)
    Dot,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Dot => write!(f, "dot"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "dot" | "graphviz" => Ok(OutputFormat::Dot),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[OutputFormat::Json, OutputFormat::Dot]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn LayoutFormatter> {
        match self {
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::Dot => Box::new(DotFormatter),
        }
    }
}

/// Formatter trait for laid-out graph output
pub trait LayoutFormatter {
    /// Format one CFG together with its layout
    fn format(&self, cfg: &Cfg, layout: &Layout) -> Result<String, CfgError>;
}

/// Format the laid-out graph as renderer-facing JSON
pub struct JsonFormatter;

/// Format the graph as Graphviz dot
pub struct DotFormatter;
