//! Scheduler nodes and their reporting view.

use std::collections::BTreeSet;
use std::fmt;

use kiln_ir::{Device, FixedLayout};

use crate::body::LoopBody;
use crate::deps::Dep;

/// What a node user refers to.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum UserRef {
    /// Another scheduler node, by name.
    Node(String),
    /// The graph output.
    Output,
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(name) => f.write_str(name),
            Self::Output => f.write_str("OUTPUT"),
        }
    }
}

/// A downstream consumer of a node's output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeUser {
    /// Who consumes the output.
    pub user: UserRef,
    /// Whether the consumer's access matches the write element for
    /// element, allowing the consumer to reuse the storage in place.
    pub can_inplace: bool,
    /// Whether this is an ordering-only (weak) use.
    pub is_weak: bool,
}

impl fmt::Display for NodeUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeUser(node={}, can_inplace={}, is_weak={})",
            self.user, self.can_inplace, self.is_weak
        )
    }
}

/// The iteration space of a computed node: device plus the flattened
/// parallel and reduction extents. Two nodes fuse only when these match.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IterationGroup {
    /// The device the node runs on.
    pub device: Device,
    /// Flattened parallel extents.
    pub iter_sizes: Vec<u64>,
    /// Flattened reduction extents.
    pub reduce_sizes: Vec<u64>,
}

fn fmt_extents(f: &mut fmt::Formatter<'_>, extents: &[u64]) -> fmt::Result {
    write!(f, "[")?;
    for (i, e) in extents.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{e}")?;
    }
    write!(f, "]")
}

impl fmt::Display for IterationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        fmt_extents(f, &self.iter_sizes)?;
        write!(f, ", ")?;
        fmt_extents(f, &self.reduce_sizes)?;
        write!(f, ")")
    }
}

/// What kind of work a scheduler node performs.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// A computed buffer with a lowered loop body.
    Computed {
        /// The node's iteration space.
        group: IterationGroup,
        /// The lowered body.
        body: LoopBody,
        /// Layouts of the buffers the body loads, in first-use order.
        /// The dump renders these ahead of the node's own layout.
        read_layouts: Vec<(String, FixedLayout)>,
    },
    /// An opaque call into a pre-built kernel.
    Extern {
        /// Kernel identifier.
        kernel: String,
    },
}

/// One schedulable node: a buffer-producing operation with its
/// dependency sets and downstream users resolved.
#[derive(Clone, Debug)]
pub struct SchedulerNode {
    pub(crate) name: String,
    pub(crate) layout: FixedLayout,
    pub(crate) kind: NodeKind,
    pub(crate) writes: Vec<Dep>,
    pub(crate) unmet: BTreeSet<Dep>,
    pub(crate) met: BTreeSet<Dep>,
    pub(crate) users: Vec<NodeUser>,
}

impl SchedulerNode {
    /// The node's name; also the name of the buffer it writes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layout of the produced buffer.
    pub fn layout(&self) -> &FixedLayout {
        &self.layout
    }

    /// The node's kind.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this is a computed (pointwise) node.
    pub fn is_computed(&self) -> bool {
        matches!(self.kind, NodeKind::Computed { .. })
    }

    /// The iteration group, for computed nodes.
    pub fn group(&self) -> Option<&IterationGroup> {
        match &self.kind {
            NodeKind::Computed { group, .. } => Some(group),
            NodeKind::Extern { .. } => None,
        }
    }

    /// The lowered loop body, for computed nodes.
    pub fn body(&self) -> Option<&LoopBody> {
        match &self.kind {
            NodeKind::Computed { body, .. } => Some(body),
            NodeKind::Extern { .. } => None,
        }
    }

    /// The kernel identifier, for external nodes.
    pub fn kernel(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Computed { .. } => None,
            NodeKind::Extern { kernel } => Some(kernel),
        }
    }

    /// The node's class name as it appears in dump headers.
    pub fn class_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Computed { .. } => "SchedulerNode",
            NodeKind::Extern { .. } => "ExternKernelSchedulerNode",
        }
    }
}

/// Read-only reporting contract shared by plain nodes, fused nodes, and
/// schedule units. Rendering and tests go through this view.
pub trait NodeView {
    /// The unit's name.
    fn name(&self) -> &str;
    /// The dump header label, e.g. `SchedulerNode(ComputedBuffer)`.
    fn type_label(&self) -> String;
    /// Writes performed, in member order.
    fn writes(&self) -> &[Dep];
    /// Reads of buffers produced within the graph.
    fn unmet(&self) -> &BTreeSet<Dep>;
    /// Reads of external input buffers.
    fn met(&self) -> &BTreeSet<Dep>;
    /// Downstream users of the produced buffers.
    fn users(&self) -> &[NodeUser];
}

impl NodeView for SchedulerNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_label(&self) -> String {
        match self.kind {
            NodeKind::Computed { .. } => format!("{}(ComputedBuffer)", self.class_name()),
            NodeKind::Extern { .. } => format!("{}(ExternKernel)", self.class_name()),
        }
    }

    fn writes(&self) -> &[Dep] {
        &self.writes
    }

    fn unmet(&self) -> &BTreeSet<Dep> {
        &self.unmet
    }

    fn met(&self) -> &BTreeSet<Dep> {
        &self.met
    }

    fn users(&self) -> &[NodeUser] {
        &self.users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_display() {
        let user = NodeUser {
            user: UserRef::Node("buf1".into()),
            can_inplace: true,
            is_weak: false,
        };
        assert_eq!(
            user.to_string(),
            "NodeUser(node=buf1, can_inplace=true, is_weak=false)"
        );

        let output = NodeUser {
            user: UserRef::Output,
            can_inplace: false,
            is_weak: false,
        };
        assert_eq!(
            output.to_string(),
            "NodeUser(node=OUTPUT, can_inplace=false, is_weak=false)"
        );
    }

    #[test]
    fn iteration_group_display() {
        let group = IterationGroup {
            device: Device::Cpu,
            iter_sizes: vec![256],
            reduce_sizes: vec![],
        };
        assert_eq!(group.to_string(), "([256], [])");
    }

    #[test]
    fn iteration_group_equality_includes_device() {
        let cpu = IterationGroup {
            device: Device::Cpu,
            iter_sizes: vec![256],
            reduce_sizes: vec![],
        };
        let cuda = IterationGroup {
            device: Device::Cuda { index: 0 },
            ..cpu.clone()
        };
        assert_ne!(cpu, cuda);
    }
}
