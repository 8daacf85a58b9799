//! Kiln scheduler.
//!
//! Turns a [`kiln_ir::Graph`] into an ordered schedule: pointwise nodes
//! are lowered to loop bodies, every access becomes a dependency
//! descriptor, nodes are placed in a deterministic topological order,
//! and compatible nodes are then fused greedily. `dump_schedule` renders
//! the stable snapshots the trace exporter writes to disk.

mod body;
mod deps;
mod format;
mod fuse;
mod node;
mod scheduler;

pub use body::{
    lower_pointwise, BodyOp, ComputeFn, LoopBody, LoweringError, OpId, ReduceMode,
};
pub use deps::{AccessMode, Dep, MemoryDep, StarDep};
pub use format::dump_schedule;
pub use fuse::{FusedNode, ScheduleUnit};
pub use node::{IterationGroup, NodeKind, NodeUser, NodeView, SchedulerNode, UserRef};
pub use scheduler::{SchedError, Scheduler};
