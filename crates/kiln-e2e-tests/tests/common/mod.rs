use std::sync::{Mutex, Once};

use log::{Level, Metadata, Record};

use kiln_ir::{BinaryOp, Device, Dtype, FixedLayout, Graph, PointwiseExpr};
use kiln_sched::{ScheduleUnit, Scheduler};

/// Contiguous f32 CPU layout.
#[allow(dead_code)]
pub fn cpu_f32(size: Vec<u64>) -> FixedLayout {
    FixedLayout::contiguous(Device::Cpu, Dtype::F32, size)
}

/// `load(buffer) + constant`, the smallest interesting pointwise body.
#[allow(dead_code)]
pub fn add_constant(buffer: &str, value: f64) -> PointwiseExpr {
    PointwiseExpr::binary(
        BinaryOp::Add,
        PointwiseExpr::load(buffer),
        PointwiseExpr::constant(value, Dtype::F32),
    )
}

/// The 16×16 three-node pipeline: two chained add-constants feeding an
/// extern matmul against the second input.
#[allow(dead_code)]
pub fn three_node_graph() -> Graph {
    let layout = cpu_f32(vec![16, 16]);
    let mut graph = Graph::new();
    graph.add_input("arg0_1", layout.clone()).expect("input");
    graph.add_input("arg1_1", layout.clone()).expect("input");
    graph
        .add_pointwise("buf0", layout.clone(), add_constant("arg0_1", 1.0))
        .expect("node");
    graph
        .add_pointwise("buf1", layout.clone(), add_constant("buf0", 2.0))
        .expect("node");
    graph
        .add_extern(
            "buf2",
            layout,
            "extern_kernels.mm",
            vec!["buf1".into(), "arg1_1".into()],
        )
        .expect("node");
    graph.mark_output("buf2").expect("output");
    graph
}

/// Schedule and fuse, returning the pre- and post-fusion snapshots.
#[allow(dead_code)]
pub fn schedule_and_fuse(graph: &Graph) -> (Vec<ScheduleUnit>, Vec<ScheduleUnit>) {
    let mut scheduler = Scheduler::new(graph).expect("scheduling failed");
    let pre = scheduler.units().to_vec();
    scheduler.fuse();
    (pre, scheduler.units().to_vec())
}

struct CaptureLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut records = self.records.lock().expect("logger poisoned");
        records.push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};

/// Install the capturing logger. Idempotent; call at the start of any
/// test that asserts on log output.
#[allow(dead_code)]
pub fn init_capture_logger() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        log::set_logger(&LOGGER).expect("another logger is installed");
        log::set_max_level(log::LevelFilter::Debug);
    });
}

/// Captured warnings whose message contains `needle`. Tests run in
/// parallel inside one binary, so filter by something unique (a temp
/// directory path) rather than asserting on the whole record list.
#[allow(dead_code)]
pub fn warnings_containing(needle: &str) -> Vec<String> {
    LOGGER
        .records
        .lock()
        .expect("logger poisoned")
        .iter()
        .filter(|(level, message)| *level == Level::Warn && message.contains(needle))
        .map(|(_, message)| message.clone())
        .collect()
}
