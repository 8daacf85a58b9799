//! Kiln graph model.
//!
//! Buffers, layouts, symbolic indexes, and the pointwise dataflow graph
//! a front end hands to the scheduler in `kiln-sched`.

mod buffer;
mod error;
mod expr;
mod graph;
mod index;
mod layout;
mod sym;
mod types;

pub use buffer::{Buffer, BufferRegistry};
pub use error::GraphError;
pub use expr::{BinaryOp, PointwiseExpr, UnaryOp};
pub use graph::{Graph, GraphNode, NodeOp};
pub use index::IndexExpr;
pub use layout::FixedLayout;
pub use sym::{Sym, SymKind};
pub use types::{Device, Dtype};
