//! Text dump of schedule snapshots.
//!
//! The dump is the stable, human-readable rendering written to
//! `ir_pre_fusion.txt` and `ir_post_fusion.txt` by the trace exporter.
//! Rendering the same schedule twice yields byte-identical output.

use crate::body::{BodyOp, LoopBody, OpId};
use crate::deps::Dep;
use crate::fuse::{FusedNode, ScheduleUnit};
use crate::node::{NodeKind, NodeUser, NodeView, SchedulerNode};

/// Render a schedule snapshot.
pub fn dump_schedule(units: &[ScheduleUnit]) -> String {
    let mut out = String::new();
    for (i, unit) in units.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match unit {
            ScheduleUnit::Node(node) => dump_node(&mut out, node),
            ScheduleUnit::Fused(fused) => dump_fused(&mut out, fused),
        }
    }
    out
}

fn fmt_deps<'a>(deps: impl Iterator<Item = &'a Dep>) -> String {
    let rendered: Vec<String> = deps.map(|d| d.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

fn fmt_users(users: &[NodeUser]) -> String {
    let rendered: Vec<String> = users.iter().map(|u| u.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

fn dump_common(out: &mut String, view: &dyn NodeView) {
    let name = view.name();
    out.push_str(&format!("{name}: {}\n", view.type_label()));
    out.push_str(&format!(
        "{name}.writes = {}\n",
        fmt_deps(view.writes().iter())
    ));
    out.push_str(&format!(
        "{name}.unmet_dependencies = {}\n",
        fmt_deps(view.unmet().iter())
    ));
    out.push_str(&format!(
        "{name}.met_dependencies = {}\n",
        fmt_deps(view.met().iter())
    ));
    out.push_str(&format!("{name}.users = {}\n", fmt_users(view.users())));
}

fn dump_node(out: &mut String, node: &SchedulerNode) {
    dump_common(out, node);
    let name = node.name();
    match node.kind() {
        NodeKind::Computed {
            group,
            body,
            read_layouts,
        } => {
            out.push_str(&format!("{name}.group.device = {}\n", group.device));
            out.push_str(&format!("{name}.group.iteration = {group}\n"));
            out.push_str(&format!("{name}.sizes = {group}\n"));
            for (buf, layout) in read_layouts {
                out.push_str(&format!("{buf}_layout = {layout}\n"));
            }
            out.push_str(&format!("{name}_layout = {}\n", node.layout()));
            dump_body(out, name, body);
        }
        NodeKind::Extern { kernel } => {
            out.push_str(&format!("{name}.kernel = {kernel}\n"));
        }
    }
}

fn dump_fused(out: &mut String, fused: &FusedNode) {
    dump_common(out, fused);
    // Each child renders as a full node section nested one level below
    // its aggregate lines, header included.
    for (i, child) in fused.snodes().iter().enumerate() {
        let mut section = format!("{}.snodes[{i}] =\n", fused.name());
        dump_node(&mut section, child);
        push_indented(out, &section);
    }
}

fn push_indented(out: &mut String, section: &str) {
    for line in section.lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
}

fn op_name(body: &LoopBody, id: OpId) -> &str {
    body.ops.get(id).map(|(name, _)| name.as_str()).unwrap_or("?")
}

fn fmt_op(body: &LoopBody, op: &BodyOp) -> String {
    match op {
        BodyOp::GetIndex { slot } => body
            .indexes
            .get(*slot)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| format!("index{slot}")),
        BodyOp::Load { buffer, index_op } => {
            format!("load({buffer}, {})", op_name(body, *index_op))
        }
        BodyOp::Constant { value, dtype } => format!("constant({value:?}, {dtype})"),
        BodyOp::Compute { fun, args } => {
            let args: Vec<&str> = args.iter().map(|&a| op_name(body, a)).collect();
            format!("{}({})", fun.name(), args.join(", "))
        }
        BodyOp::Store {
            buffer,
            index_op,
            value,
            mode,
        } => {
            let mode = match mode {
                Some(m) => m.name(),
                None => "None",
            };
            format!(
                "store({buffer}, {}, {}, {mode})",
                op_name(body, *index_op),
                op_name(body, *value)
            )
        }
    }
}

fn dump_body(out: &mut String, name: &str, body: &LoopBody) {
    out.push_str(&format!("{name}.body:\n"));
    let ranges: Vec<String> = body
        .var_ranges
        .iter()
        .map(|(sym, extent)| format!("{sym}: {extent}"))
        .collect();
    out.push_str(&format!("    var_ranges = {{{}}}\n", ranges.join(", ")));
    for (index_name, expr) in &body.indexes {
        out.push_str(&format!("    {index_name} = {expr}\n"));
    }
    for (label, op) in &body.ops {
        out.push_str(&format!("    {label} = {}\n", fmt_op(body, op)));
    }
    if let Some((result_name, _)) = body.ops.get(body.result) {
        out.push_str(&format!("    return {result_name}\n"));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::body::ReduceMode;
    use crate::scheduler::Scheduler;
    use kiln_ir::{BinaryOp, Device, Dtype, FixedLayout, Graph, IndexExpr, PointwiseExpr, Sym};

    fn layout() -> FixedLayout {
        FixedLayout::contiguous(Device::Cpu, Dtype::F32, vec![16, 16])
    }

    fn add_const(buffer: &str, value: f64) -> PointwiseExpr {
        PointwiseExpr::binary(
            BinaryOp::Add,
            PointwiseExpr::load(buffer),
            PointwiseExpr::constant(value, Dtype::F32),
        )
    }

    fn three_node_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_input("arg0_1", layout()).unwrap();
        graph.add_input("arg1_1", layout()).unwrap();
        graph
            .add_pointwise("buf0", layout(), add_const("arg0_1", 1.0))
            .unwrap();
        graph
            .add_pointwise("buf1", layout(), add_const("buf0", 2.0))
            .unwrap();
        graph
            .add_extern(
                "buf2",
                layout(),
                "extern_kernels.mm",
                vec!["buf1".into(), "arg1_1".into()],
            )
            .unwrap();
        graph.mark_output("buf2").unwrap();
        graph
    }

    #[test]
    fn pre_fusion_dump_structure() {
        let scheduler = Scheduler::new(&three_node_graph()).unwrap();
        let dump = dump_schedule(scheduler.units());

        assert!(dump.contains("buf0: SchedulerNode(ComputedBuffer)"));
        assert!(dump.contains("buf0.writes = [MemoryDep(buf0, c0, {c0: 256}, None)]"));
        assert!(dump.contains("buf0.unmet_dependencies = []"));
        assert!(dump.contains("buf0.met_dependencies = [MemoryDep(arg0_1, c0, {c0: 256}, None)]"));
        assert!(dump.contains("buf0.users = [NodeUser(node=buf1, can_inplace=true, is_weak=false)]"));
        assert!(dump.contains("buf0.group.device = cpu"));
        assert!(dump.contains("buf0.group.iteration = ([256], [])"));
        assert!(dump.contains("buf0.sizes = ([256], [])"));
        // Referenced layouts sit between the sizes line and the body,
        // reads first, the node's own buffer last.
        assert!(dump.contains("buf0.sizes = ([256], [])\narg0_1_layout"));
        assert!(dump.contains("arg0_1_layout = FixedLayout(cpu, f32, size=[16, 16], stride=[16, 1])"));
        assert!(dump.contains("buf0_layout = FixedLayout(cpu, f32, size=[16, 16], stride=[16, 1])\nbuf0.body:"));
        assert!(dump.contains("buf0_layout = FixedLayout(cpu, f32, size=[16, 16], stride=[16, 1])\nbuf1_layout"));
        assert!(dump.contains("buf0.body:"));
        assert!(dump.contains("    var_ranges = {y0: 256}"));
        assert!(dump.contains("    index0 = y0"));
        assert!(dump.contains("    load = load(arg0_1, get_index)"));
        assert!(dump.contains("    constant = constant(1.0, f32)"));
        assert!(dump.contains("    add = add(load, constant)"));
        assert!(dump.contains("    store = store(buf0, get_index_1, add, None)"));
        assert!(dump.contains("    return store"));

        assert!(dump.contains("buf2: ExternKernelSchedulerNode(ExternKernel)"));
        assert!(dump.contains("buf2.writes = [StarDep(buf2, None)]"));
        assert!(dump.contains("buf2.unmet_dependencies = [StarDep(buf1, None)]"));
        assert!(dump.contains("buf2.met_dependencies = [StarDep(arg1_1, None)]"));
        assert!(dump.contains("buf2.users = [NodeUser(node=OUTPUT, can_inplace=false, is_weak=false)]"));
        assert!(dump.contains("buf2.kernel = extern_kernels.mm"));
        assert!(!dump.contains("buf2.body:"));
        // Layout lines belong to computed sections only.
        assert!(!dump.contains("buf2_layout"));
    }

    #[test]
    fn post_fusion_dump_structure() {
        let mut scheduler = Scheduler::new(&three_node_graph()).unwrap();
        scheduler.fuse();
        let dump = dump_schedule(scheduler.units());

        assert!(dump.contains("buf0_buf1: FusedSchedulerNode(SchedulerNode,SchedulerNode)"));
        assert!(dump.contains(
            "buf0_buf1.writes = [MemoryDep(buf0, c0, {c0: 256}, None), MemoryDep(buf1, c0, {c0: 256}, None)]"
        ));
        assert!(dump.contains("buf0_buf1.unmet_dependencies = []"));
        assert!(dump.contains(
            "buf0_buf1.users = [NodeUser(node=buf2, can_inplace=false, is_weak=false)]"
        ));
        assert!(dump.contains("    buf0_buf1.snodes[0] =\n    buf0: SchedulerNode(ComputedBuffer)"));
        assert!(dump.contains("    buf0_buf1.snodes[1] =\n    buf1: SchedulerNode(ComputedBuffer)"));
        // Children keep their own bodies in the dump, one level deeper.
        assert!(dump.contains("        constant = constant(2.0, f32)"));
    }

    #[test]
    fn fused_children_render_indented() {
        let mut scheduler = Scheduler::new(&three_node_graph()).unwrap();
        scheduler.fuse();
        let dump = dump_schedule(scheduler.units());

        // From the first child header to the end of the fused unit,
        // nothing may sit flush left: an unindented line would read as a
        // new top-level unit.
        let start = dump.find("    buf0_buf1.snodes[0] =").expect("child header");
        let end = dump.find("\n\n").expect("unit separator");
        assert!(start < end);
        for line in dump[start..end].lines() {
            assert!(
                line.starts_with("    "),
                "flush-left line inside fused unit: {line:?}"
            );
        }
    }

    #[test]
    fn read_buffer_layouts_render_with_the_node() {
        let mut graph = Graph::new();
        graph
            .add_input(
                "arg0_1",
                FixedLayout::contiguous(Device::Cpu, Dtype::F32, vec![256]),
            )
            .unwrap();
        graph
            .add_pointwise("buf0", layout(), add_const("arg0_1", 1.0))
            .unwrap();
        let scheduler = Scheduler::new(&graph).unwrap();
        let dump = dump_schedule(scheduler.units());

        assert!(dump.contains("arg0_1_layout = FixedLayout(cpu, f32, size=[256], stride=[1])"));
        assert!(dump.contains("buf0_layout = FixedLayout(cpu, f32, size=[16, 16], stride=[16, 1])"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut scheduler = Scheduler::new(&three_node_graph()).unwrap();
        let pre_a = dump_schedule(scheduler.units());
        let pre_b = dump_schedule(scheduler.units());
        assert_eq!(pre_a, pre_b);

        scheduler.fuse();
        let post_a = dump_schedule(scheduler.units());
        let post_b = dump_schedule(scheduler.units());
        assert_eq!(post_a, post_b);
        assert_ne!(pre_a, post_a);
    }

    #[test]
    fn reduction_stores_render_their_mode() {
        let y0 = Sym::iter(0);
        let body = LoopBody {
            var_ranges: BTreeMap::from([(y0, 8)]),
            indexes: vec![("index0".to_owned(), IndexExpr::sym(y0))],
            ops: vec![
                ("get_index".to_owned(), BodyOp::GetIndex { slot: 0 }),
                (
                    "load".to_owned(),
                    BodyOp::Load {
                        buffer: "arg0_1".to_owned(),
                        index_op: 0,
                    },
                ),
                (
                    "store".to_owned(),
                    BodyOp::Store {
                        buffer: "buf0".to_owned(),
                        index_op: 0,
                        value: 1,
                        mode: Some(ReduceMode::Sum),
                    },
                ),
            ],
            result: 2,
        };

        let mut out = String::new();
        dump_body(&mut out, "buf0", &body);
        assert!(out.contains("    store = store(buf0, get_index, load, sum)"));
        assert!(out.ends_with("    return store\n"));
    }

    #[test]
    fn units_are_blank_line_separated() {
        let mut scheduler = Scheduler::new(&three_node_graph()).unwrap();
        scheduler.fuse();
        let dump = dump_schedule(scheduler.units());
        assert!(dump.contains("        return store\n\nbuf2: ExternKernelSchedulerNode"));
    }
}
