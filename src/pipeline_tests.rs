mod tests {
    use std::collections::HashMap;

    use crate::format::{LayoutFormatter, OutputFormat};
    use crate::graph::Cfg;
    use crate::isa::{InstructionSet, InstructionSetParser};
    use crate::layout::{EdgeKind, LayoutParams};
    use crate::{build_layout, Address, CfgError, ProfiledInstruction, WEIGHT_COUNTER};

    fn profiled(weight: f64, address: Address, text: &str) -> ProfiledInstruction {
        ProfiledInstruction::new(
            HashMap::from([(WEIGHT_COUNTER.to_string(), weight)]),
            address,
            text.to_string(),
        )
    }

    /// A function body with a counted loop, an early exit, and a tail call
    /// into unprofiled code.
    fn loop_with_early_exit() -> Vec<ProfiledInstruction> {
        vec![
            profiled(0.5, 0x400, "mov x0, #0"),
            profiled(0.2, 0x404, "mov x1, #10"),
            profiled(9.1, 0x408, "add x0, x0, #1"),
            profiled(8.7, 0x40c, "cmp x0, x1"),
            profiled(7.9, 0x410, "b.eq 0x41c"),
            profiled(6.2, 0x414, "cbz x2, 0x408"),
            profiled(0.1, 0x418, "b 0x408"),
            profiled(0.3, 0x41c, "b 0x1000"),
        ]
    }

    #[test]
    fn full_pipeline_on_loop_body() {
        let (cfg, layout) = build_layout(
            &loop_with_early_exit(),
            InstructionSet::AArch64,
            &LayoutParams::default(),
        )
        .unwrap();

        // Blocks: [0x400..0x404], [0x408..0x410], [0x414], [0x418], [0x41c],
        // plus UNKNOWN.
        assert_eq!(cfg.blocks.len(), 6);
        assert_eq!(cfg.block_at(0x408).unwrap(), 1);

        // 0x41c jumps outside the profiled range, so its edge lands on
        // UNKNOWN.
        let exit = cfg.block_at(0x41c).unwrap();
        let exit_edges: Vec<_> = cfg.outgoing_edges(exit).collect();
        assert_eq!(exit_edges.len(), 1);
        assert_eq!(exit_edges[0].to, cfg.unknown);

        // The two loop back edges (0x414 and 0x418 to 0x408) route upward.
        let back_edges = layout.edges.iter().filter(|e| !e.downward).count();
        assert_eq!(back_edges, 2);

        // Every block frame sits strictly below its predecessor.
        for pair in layout.blocks.windows(2) {
            assert!(pair[1].y > pair[0].y + pair[0].height);
        }
    }

    #[test]
    fn pipeline_is_idempotent() {
        let disassembly = loop_with_early_exit();
        let params = LayoutParams::default();
        let (cfg_a, layout_a) =
            build_layout(&disassembly, InstructionSet::AArch64, &params).unwrap();
        let (cfg_b, layout_b) =
            build_layout(&disassembly, InstructionSet::AArch64, &params).unwrap();
        assert_eq!(cfg_a, cfg_b);
        assert_eq!(layout_a, layout_b);

        let json_a = OutputFormat::Json
            .get_formatter()
            .format(&cfg_a, &layout_a)
            .unwrap();
        let json_b = OutputFormat::Json
            .get_formatter()
            .format(&cfg_b, &layout_b)
            .unwrap();
        assert_eq!(json_a, json_b);
    }

    #[test]
    fn conditional_branch_scenario_through_layout() {
        let disassembly = vec![
            profiled(1.0, 0x10, "mov r0, r1"),
            profiled(1.0, 0x14, "b.eq 0x20"),
            profiled(1.0, 0x18, "mov r2, r3"),
            profiled(1.0, 0x20, "ret"),
        ];
        let (cfg, layout) = build_layout(
            &disassembly,
            InstructionSet::AArch32T32,
            &LayoutParams::default(),
        )
        .unwrap();

        assert_eq!(cfg.blocks.len(), 4);
        let taken = layout
            .edges
            .iter()
            .find(|e| e.kind != EdgeKind::FallThru)
            .unwrap();
        assert_eq!(taken.from, cfg.block_at(0x10).unwrap());
        assert_eq!(taken.to, cfg.block_at(0x20).unwrap());
        assert!(taken.downward);
    }

    #[test]
    fn unsupported_instruction_set_is_a_user_facing_error() {
        let err = "x86_64".parse::<InstructionSet>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("no support"));
        assert!(message.contains("x86_64"));
    }

    #[test]
    fn empty_disassembly_never_reaches_layout() {
        let err = build_layout(&[], InstructionSet::AArch64, &LayoutParams::default())
            .unwrap_err();
        assert!(matches!(err, CfgError::EmptyDisassembly));
    }

    #[test]
    fn weights_aggregate_per_block() {
        let parser = InstructionSetParser::for_instruction_set(InstructionSet::AArch64).unwrap();
        let cfg = Cfg::build(&loop_with_early_exit(), &parser).unwrap();
        let body = cfg.block_at(0x408).unwrap();
        let expected = 9.1 + 8.7 + 7.9;
        assert!((cfg.blocks[body].weight - expected).abs() < 1e-9);
        assert_eq!(cfg.unknown_block().weight, 0.0);
    }

    #[test]
    fn layout_width_accounts_for_all_lanes() {
        let params = LayoutParams::default();
        let (_, layout) =
            build_layout(&loop_with_early_exit(), InstructionSet::AArch64, &params).unwrap();
        let max_block_width = layout.blocks.iter().map(|b| b.width).fold(0.0, f64::max);
        assert_eq!(layout.lane_offset, max_block_width + params.lane_gap);
        assert_eq!(
            layout.width,
            layout.lane_offset + params.lane_gap * layout.lanes as f64
        );
        assert!(layout.lanes >= 1);
    }

    #[test]
    fn render_model_round_trips_as_json() {
        let (cfg, layout) = build_layout(
            &loop_with_early_exit(),
            InstructionSet::AArch64,
            &LayoutParams::default(),
        )
        .unwrap();
        let out = OutputFormat::Json
            .get_formatter()
            .format(&cfg, &layout)
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            v["blocks"].as_array().unwrap().len(),
            cfg.blocks.len()
        );
        assert_eq!(v["edges"].as_array().unwrap().len(), cfg.edges.len());
    }
}
