#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // The full parse + schedule + fuse + render pipeline should
        // never panic.
        if let Ok(graph) = kiln_cli::desc::parse_graph(source) {
            if let Ok(mut scheduler) = kiln_sched::Scheduler::new(&graph) {
                scheduler.fuse();
                let _ = kiln_sched::dump_schedule(scheduler.units());
            }
        }
    }
});
