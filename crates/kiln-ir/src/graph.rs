//! The input dataflow graph handed to the scheduler.
//!
//! A graph is a DAG of buffer-producing operations. Every node produces
//! exactly one buffer with the node's own name; external inputs are
//! buffers with no producing node. This is the contract between the
//! out-of-scope front end and the scheduler.

use crate::buffer::BufferRegistry;
use crate::error::GraphError;
use crate::expr::PointwiseExpr;
use crate::layout::FixedLayout;

/// The operation a graph node performs.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeOp {
    /// An elementwise computation defined by an expression tree.
    Pointwise {
        /// The defining expression.
        expr: PointwiseExpr,
    },
    /// An opaque call into a pre-built kernel.
    Extern {
        /// Kernel identifier, e.g. `extern_kernels.mm`.
        kernel: String,
        /// Argument buffer names, in call order.
        args: Vec<String>,
    },
}

/// A node in the input graph.
#[derive(Clone, Debug)]
pub struct GraphNode {
    /// Node name; also the name of the buffer it produces.
    pub name: String,
    /// The operation.
    pub op: NodeOp,
}

/// A buffer-producing dataflow graph.
///
/// Nodes are kept in discovery order, which downstream code uses to
/// break scheduling ties deterministically.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    registry: BufferRegistry,
    nodes: Vec<GraphNode>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an external input buffer.
    pub fn add_input(
        &mut self,
        name: impl Into<String>,
        layout: FixedLayout,
    ) -> Result<(), GraphError> {
        let name = name.into();
        self.registry.register(name.clone(), layout)?;
        self.inputs.push(name);
        Ok(())
    }

    /// Add a pointwise node producing the buffer `name`.
    ///
    /// Loaded buffers are not resolved here; the scheduler rejects loads
    /// of unregistered names when it lowers the expression.
    pub fn add_pointwise(
        &mut self,
        name: impl Into<String>,
        layout: FixedLayout,
        expr: PointwiseExpr,
    ) -> Result<(), GraphError> {
        let name = name.into();
        self.registry.register(name.clone(), layout)?;
        self.nodes.push(GraphNode {
            name,
            op: NodeOp::Pointwise { expr },
        });
        Ok(())
    }

    /// Add an external-kernel node producing the buffer `name`.
    pub fn add_extern(
        &mut self,
        name: impl Into<String>,
        layout: FixedLayout,
        kernel: impl Into<String>,
        args: Vec<String>,
    ) -> Result<(), GraphError> {
        let name = name.into();
        self.registry.register(name.clone(), layout)?;
        self.nodes.push(GraphNode {
            name,
            op: NodeOp::Extern {
                kernel: kernel.into(),
                args,
            },
        });
        Ok(())
    }

    /// Mark a registered buffer as a graph output.
    pub fn mark_output(&mut self, name: &str) -> Result<(), GraphError> {
        self.registry.get(name)?;
        if !self.outputs.iter().any(|o| o == name) {
            self.outputs.push(name.to_owned());
        }
        Ok(())
    }

    /// The buffer registry.
    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    /// All nodes, in discovery order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// External input buffer names, in registration order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Output buffer names, in marking order.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Whether `name` is an external input buffer.
    pub fn is_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|i| i == name)
    }

    /// Whether `name` is marked as a graph output.
    pub fn is_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o == name)
    }

    /// The node producing `name`, if any. Inputs have no producer.
    pub fn producer(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}
