//! Topological scheduling over the producer relation.

use std::collections::{BTreeMap, BTreeSet};

use kiln_ir::{FixedLayout, Graph, GraphError, NodeOp};

use crate::body::{lower_pointwise, LoweringError};
use crate::deps::Dep;
use crate::fuse::{fuse_units, ScheduleUnit};
use crate::node::{IterationGroup, NodeKind, NodeUser, SchedulerNode, UserRef};

/// Errors from schedule construction.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// A buffer lookup failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Lowering a pointwise node failed.
    #[error(transparent)]
    Lowering(#[from] LoweringError),

    /// The producer relation is not acyclic.
    #[error("cyclic dependency involving node `{node}` ({placed} of {total} nodes placed)")]
    CyclicDependency {
        /// A node on the unplaceable remainder.
        node: String,
        /// Nodes placed before the search stalled.
        placed: usize,
        /// Total nodes in the graph.
        total: usize,
    },
}

struct Proto {
    name: String,
    layout: FixedLayout,
    kind: NodeKind,
    reads: Vec<Dep>,
    write: Dep,
}

/// An ordered schedule of a graph's nodes, before or after fusion.
#[derive(Debug)]
pub struct Scheduler {
    units: Vec<ScheduleUnit>,
    fused: bool,
}

impl Scheduler {
    /// Build the pre-fusion schedule for `graph`.
    ///
    /// Every pointwise node is lowered to a loop body, dependency
    /// descriptors are derived for all reads and writes, nodes are
    /// ordered topologically over the producer relation (discovery order
    /// breaks ties), reads are classified as met or unmet by the
    /// provenance of their buffer, and downstream users are resolved.
    pub fn new(graph: &Graph) -> Result<Self, SchedError> {
        let nodes = graph.nodes();
        let n = nodes.len();

        // Which node produces each buffer (node name == buffer name).
        let producer_of: BTreeMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.as_str(), i))
            .collect();

        // Lower bodies and derive read/write descriptors per node.
        let mut protos: Vec<Proto> = Vec::with_capacity(n);
        for node in nodes {
            let layout = graph.registry().get(&node.name)?.layout().clone();
            let (kind, reads, write) = match &node.op {
                NodeOp::Pointwise { expr } => {
                    let body = lower_pointwise(&node.name, expr, graph.registry())?;
                    let reads = body.read_deps();
                    let write = body
                        .write_dep()
                        .unwrap_or_else(|| Dep::canonical(&node.name, layout.numel()));
                    let group = IterationGroup {
                        device: layout.device(),
                        iter_sizes: body.iter_extents(),
                        reduce_sizes: body.reduce_extents(),
                    };
                    let mut read_layouts = Vec::new();
                    for buf in body.loaded_buffers() {
                        let read = graph.registry().get(buf)?.layout().clone();
                        read_layouts.push((buf.to_owned(), read));
                    }
                    (
                        NodeKind::Computed {
                            group,
                            body,
                            read_layouts,
                        },
                        reads,
                        write,
                    )
                }
                NodeOp::Extern { kernel, args } => {
                    let mut reads = Vec::new();
                    for arg in args {
                        graph.registry().get(arg)?;
                        let dep = Dep::star(arg);
                        if !reads.contains(&dep) {
                            reads.push(dep);
                        }
                    }
                    let kind = NodeKind::Extern {
                        kernel: kernel.clone(),
                    };
                    (kind, reads, Dep::star(&node.name))
                }
            };
            protos.push(Proto {
                name: node.name.clone(),
                layout,
                kind,
                reads,
                write,
            });
        }

        // Dependency edges over the producer relation, deduplicated.
        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (ci, proto) in protos.iter().enumerate() {
            for dep in &proto.reads {
                if let Some(&pi) = producer_of.get(dep.buf_name()) {
                    edges.insert((pi, ci));
                }
            }
        }
        let mut in_degree = vec![0usize; n];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(pi, ci) in &edges {
            in_degree[ci] += 1;
            consumers[pi].push(ci);
        }

        // Kahn's algorithm with a deterministic ready set: among ready
        // nodes, the earliest-discovered is scheduled first.
        let mut ready: BTreeSet<usize> = BTreeSet::new();
        for (i, &deg) in in_degree.iter().enumerate() {
            if deg == 0 {
                ready.insert(i);
            }
        }
        let mut order: Vec<usize> = Vec::with_capacity(n);
        let mut placed = vec![false; n];
        while let Some(&idx) = ready.iter().next() {
            ready.remove(&idx);
            order.push(idx);
            placed[idx] = true;
            for &ci in &consumers[idx] {
                in_degree[ci] -= 1;
                if in_degree[ci] == 0 {
                    ready.insert(ci);
                }
            }
        }
        if order.len() != n {
            let stuck = placed.iter().position(|&p| !p).unwrap_or(0);
            return Err(SchedError::CyclicDependency {
                node: protos[stuck].name.clone(),
                placed: order.len(),
                total: n,
            });
        }

        // Downstream users per produced buffer, in schedule order. A
        // consumer may reuse the producer's storage only when its read
        // covers the whole buffer and matches the write descriptor.
        let mut users_by_buf: BTreeMap<String, Vec<NodeUser>> = BTreeMap::new();
        for &ri in &order {
            for dep in &protos[ri].reads {
                if let Some(&pi) = producer_of.get(dep.buf_name()) {
                    let numel = protos[pi].layout.numel();
                    let user = NodeUser {
                        user: UserRef::Node(protos[ri].name.clone()),
                        can_inplace: dep.covers(numel) && *dep == protos[pi].write,
                        is_weak: false,
                    };
                    let entry = users_by_buf.entry(dep.buf_name().to_owned()).or_default();
                    if !entry
                        .iter()
                        .any(|u| u.user == user.user && u.is_weak == user.is_weak)
                    {
                        entry.push(user);
                    }
                }
            }
        }
        for proto in &protos {
            if graph.is_output(&proto.name) {
                users_by_buf
                    .entry(proto.name.clone())
                    .or_default()
                    .push(NodeUser {
                        user: UserRef::Output,
                        can_inplace: false,
                        is_weak: false,
                    });
            }
        }

        // Assemble nodes in schedule order, classifying each read by the
        // provenance of its buffer.
        let mut protos: Vec<Option<Proto>> = protos.into_iter().map(Some).collect();
        let mut units = Vec::with_capacity(n);
        let mut buffer_bytes = 0u64;
        for &i in &order {
            if let Some(proto) = protos[i].take() {
                let Proto {
                    name,
                    layout,
                    kind,
                    reads,
                    write,
                } = proto;
                let mut unmet = BTreeSet::new();
                let mut met = BTreeSet::new();
                for dep in reads {
                    if graph.is_input(dep.buf_name()) {
                        met.insert(dep);
                    } else {
                        unmet.insert(dep);
                    }
                }
                let users = users_by_buf.remove(&name).unwrap_or_default();
                buffer_bytes = buffer_bytes.saturating_add(layout.size_bytes());
                units.push(ScheduleUnit::Node(SchedulerNode {
                    name,
                    layout,
                    kind,
                    writes: vec![write],
                    unmet,
                    met,
                    users,
                }));
            }
        }

        log::debug!("scheduled {} nodes, {buffer_bytes} buffer bytes", units.len());
        Ok(Self {
            units,
            fused: false,
        })
    }

    /// The schedule, in execution order.
    pub fn units(&self) -> &[ScheduleUnit] {
        &self.units
    }

    /// Whether [`fuse`](Self::fuse) has run.
    pub fn is_fused(&self) -> bool {
        self.fused
    }

    /// Greedily fuse compatible work; returns the number of merges.
    pub fn fuse(&mut self) -> usize {
        let units = std::mem::take(&mut self.units);
        let (units, merged) = fuse_units(units);
        self.units = units;
        self.fused = true;
        log::debug!("fusion merged {merged} nodes into neighbors");
        merged
    }
}
