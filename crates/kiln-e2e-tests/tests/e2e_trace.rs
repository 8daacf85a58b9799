mod common;

use std::fs;

use kiln_sched::dump_schedule;
use kiln_trace::{
    trace_compilation, DebugContext, TraceConfig, FX_GRAPH_READABLE, FX_GRAPH_RUNNABLE,
    FX_GRAPH_TRANSFORMED, IR_POST_FUSION, IR_PRE_FUSION, OUTPUT_CODE,
};

#[test]
fn full_pipeline_writes_a_complete_trace() {
    common::init_capture_logger();
    let tmp = tempfile::TempDir::new().expect("tempdir");
    let config = TraceConfig::enabled_at(tmp.path());

    let graph = common::three_node_graph();
    let (pre, post) = common::schedule_and_fuse(&graph);
    let artifacts = vec![
        (FX_GRAPH_READABLE.to_owned(), "# readable\n".to_owned()),
        (FX_GRAPH_RUNNABLE.to_owned(), "{}".to_owned()),
        (FX_GRAPH_TRANSFORMED.to_owned(), dump_schedule(&pre)),
        (OUTPUT_CODE.to_owned(), dump_schedule(&post)),
    ];
    let dir = trace_compilation(&config, "model", &pre, &post, &artifacts)
        .expect("trace failed")
        .expect("trace enabled");

    assert_eq!(dir, tmp.path().join("model"));
    for file in [
        IR_PRE_FUSION,
        IR_POST_FUSION,
        FX_GRAPH_READABLE,
        FX_GRAPH_RUNNABLE,
        FX_GRAPH_TRANSFORMED,
        OUTPUT_CODE,
    ] {
        let meta =
            fs::metadata(dir.join(file)).unwrap_or_else(|e| panic!("missing {file}: {e}"));
        assert!(meta.len() > 0, "{file} is empty");
    }

    let pre_dump = fs::read_to_string(dir.join(IR_PRE_FUSION)).expect("read");
    assert!(pre_dump.contains("buf0: SchedulerNode(ComputedBuffer)"));
    let post_dump = fs::read_to_string(dir.join(IR_POST_FUSION)).expect("read");
    assert!(post_dump.contains("buf0_buf1: FusedSchedulerNode(SchedulerNode,SchedulerNode)"));

    // Exactly one announcement for this trace.
    let warnings = common::warnings_containing(&dir.display().to_string());
    assert_eq!(warnings, [format!("debug trace: {}", dir.display())]);
}

#[test]
fn disabled_tracing_writes_and_logs_nothing() {
    common::init_capture_logger();
    let tmp = tempfile::TempDir::new().expect("tempdir");
    let config = TraceConfig {
        enabled: false,
        dir: Some(tmp.path().to_path_buf()),
    };

    let graph = common::three_node_graph();
    let (pre, post) = common::schedule_and_fuse(&graph);
    let dir = trace_compilation(&config, "model", &pre, &post, &[]).expect("trace failed");

    assert!(dir.is_none());
    assert_eq!(fs::read_dir(tmp.path()).expect("read_dir").count(), 0);
    assert!(common::warnings_containing(&tmp.path().display().to_string()).is_empty());
}

#[test]
fn repeated_compilations_get_distinct_directories() {
    common::init_capture_logger();
    let tmp = tempfile::TempDir::new().expect("tempdir");
    let config = TraceConfig::enabled_at(tmp.path());

    let graph = common::three_node_graph();
    let (pre, post) = common::schedule_and_fuse(&graph);
    let first = trace_compilation(&config, "model", &pre, &post, &[])
        .expect("trace failed")
        .expect("trace enabled");
    let second = trace_compilation(&config, "model", &pre, &post, &[])
        .expect("trace failed")
        .expect("trace enabled");

    assert_eq!(first, tmp.path().join("model"));
    assert_eq!(second, tmp.path().join("model_1"));
    let warnings = common::warnings_containing(&tmp.path().display().to_string());
    assert_eq!(warnings.len(), 2);
}

#[test]
fn failed_artifact_write_preserves_earlier_output() {
    common::init_capture_logger();
    let tmp = tempfile::TempDir::new().expect("tempdir");
    let config = TraceConfig::enabled_at(tmp.path());

    let graph = common::three_node_graph();
    let (pre, _post) = common::schedule_and_fuse(&graph);

    let ctx = DebugContext::create(&config, "model")
        .expect("create failed")
        .expect("trace enabled");
    ctx.save_ir_pre_fusion(&pre).expect("snapshot");
    assert!(ctx.save_artifact("missing_subdir/output_code.py", "x").is_err());

    // The failed write aborts the trace, but what was already written
    // stays on disk and nothing is announced.
    let dir = ctx.dir().to_path_buf();
    assert!(dir.join(IR_PRE_FUSION).exists());
    assert!(common::warnings_containing(&dir.display().to_string()).is_empty());
}

#[test]
fn json_description_drives_the_full_pipeline() {
    common::init_capture_logger();
    let tmp = tempfile::TempDir::new().expect("tempdir");
    let config = TraceConfig::enabled_at(tmp.path());

    let source = r#"{
        "inputs": [
            { "name": "arg0_1", "dtype": "f32", "shape": [16, 16] },
            { "name": "arg1_1", "dtype": "f32", "shape": [16, 16] }
        ],
        "nodes": [
            {
                "kind": "pointwise", "name": "buf0", "shape": [16, 16],
                "expr": {
                    "op": "binary", "fun": "add",
                    "lhs": { "op": "load", "buffer": "arg0_1" },
                    "rhs": { "op": "constant", "value": 1.0 }
                }
            },
            {
                "kind": "pointwise", "name": "buf1", "shape": [16, 16],
                "expr": {
                    "op": "binary", "fun": "add",
                    "lhs": { "op": "load", "buffer": "buf0" },
                    "rhs": { "op": "constant", "value": 2.0 }
                }
            },
            {
                "kind": "extern", "name": "buf2", "shape": [16, 16],
                "kernel": "extern_kernels.mm", "args": ["buf1", "arg1_1"]
            }
        ],
        "outputs": ["buf2"]
    }"#;
    let graph = kiln_cli::desc::parse_graph(source).expect("parse");
    let (pre, post) = common::schedule_and_fuse(&graph);
    let artifacts = vec![
        (
            FX_GRAPH_READABLE.to_owned(),
            kiln_cli::desc::describe_graph(&graph),
        ),
        (FX_GRAPH_RUNNABLE.to_owned(), source.to_owned()),
    ];
    let dir = trace_compilation(&config, "model", &pre, &post, &artifacts)
        .expect("trace failed")
        .expect("trace enabled");

    let readable = fs::read_to_string(dir.join(FX_GRAPH_READABLE)).expect("read");
    assert!(readable.contains("buf2: f32[16, 16] = extern_kernels.mm(buf1, arg1_1)"));
    let post_dump = fs::read_to_string(dir.join(IR_POST_FUSION)).expect("read");
    assert!(post_dump.contains("buf0_buf1: FusedSchedulerNode(SchedulerNode,SchedulerNode)"));
    assert!(post_dump.contains("buf2.kernel = extern_kernels.mm"));
}
