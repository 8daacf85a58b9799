//! Greedy fusion of compatible scheduler nodes.
//!
//! Fusion runs as a single monotonic pass over the schedule: each unit
//! either joins the most recent already-placed unit that writes one of
//! its unmet buffers, or is placed standalone. Placed groups are never
//! revisited or split.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::deps::Dep;
use crate::node::{IterationGroup, NodeUser, NodeView, SchedulerNode, UserRef};

/// A group of scheduler nodes that executes as one unit.
///
/// The fused node exclusively owns its members, keeps them in schedule
/// order, and exposes aggregated dependency sets: writes of all members,
/// unmet reads not satisfied inside the group, met reads of all members,
/// and the member users that point outside the group.
#[derive(Clone, Debug)]
pub struct FusedNode {
    name: String,
    snodes: Vec<SchedulerNode>,
    writes: Vec<Dep>,
    unmet: BTreeSet<Dep>,
    met: BTreeSet<Dep>,
    users: Vec<NodeUser>,
}

impl FusedNode {
    /// Aggregate `snodes` into one fused unit.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two nodes are given or any member is not a
    /// computed node. Eligibility is the caller's responsibility.
    pub(crate) fn from_children(snodes: Vec<SchedulerNode>) -> Self {
        assert!(snodes.len() >= 2, "fused node needs at least two members");
        assert!(
            snodes.iter().all(SchedulerNode::is_computed),
            "fused members must be computed nodes"
        );

        let name = snodes
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("_");
        let internal: BTreeSet<&str> = snodes
            .iter()
            .flat_map(|s| s.writes.iter().map(Dep::buf_name))
            .collect();

        let mut writes = Vec::new();
        let mut unmet = BTreeSet::new();
        let mut met = BTreeSet::new();
        let mut users: Vec<NodeUser> = Vec::new();
        for node in &snodes {
            writes.extend(node.writes.iter().cloned());
            met.extend(node.met.iter().cloned());
            for dep in &node.unmet {
                if !internal.contains(dep.buf_name()) {
                    unmet.insert(dep.clone());
                }
            }
            for user in &node.users {
                let inside = matches!(&user.user, UserRef::Node(name) if internal.contains(name.as_str()));
                if inside {
                    continue;
                }
                if !users
                    .iter()
                    .any(|u| u.user == user.user && u.is_weak == user.is_weak)
                {
                    users.push(user.clone());
                }
            }
        }

        Self {
            name,
            snodes,
            writes,
            unmet,
            met,
            users,
        }
    }

    /// Member nodes, in execution order.
    pub fn snodes(&self) -> &[SchedulerNode] {
        &self.snodes
    }

    /// The iteration group shared by all members.
    pub fn group(&self) -> &IterationGroup {
        match self.snodes[0].group() {
            Some(group) => group,
            None => unreachable!("fused members are computed nodes"),
        }
    }
}

impl NodeView for FusedNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_label(&self) -> String {
        let members = self
            .snodes
            .iter()
            .map(|s| s.class_name())
            .collect::<Vec<_>>()
            .join(",");
        format!("FusedSchedulerNode({members})")
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

/// One entry in the schedule: a standalone node or a fused group.
#[derive(Clone, Debug)]
pub enum ScheduleUnit {
    /// A standalone node.
    Node(SchedulerNode),
    /// A fused group.
    Fused(FusedNode),
}

impl ScheduleUnit {
    /// Whether every member of the unit is a computed node.
    pub fn is_computed(&self) -> bool {
        match self {
            Self::Node(node) => node.is_computed(),
            Self::Fused(_) => true,
        }
    }

    /// The shared iteration group, when the unit is computed work.
    pub fn group(&self) -> Option<&IterationGroup> {
        match self {
            Self::Node(node) => node.group(),
            Self::Fused(fused) => Some(fused.group()),
        }
    }

    /// The member nodes, in execution order.
    pub fn into_children(self) -> Vec<SchedulerNode> {
        match self {
            Self::Node(node) => vec![node],
            Self::Fused(fused) => fused.snodes,
        }
    }
}

impl NodeView for ScheduleUnit {
    fn name(&self) -> &str {
        match self {
            Self::Node(node) => node.name(),
            Self::Fused(fused) => fused.name(),
        }
    }

    fn type_label(&self) -> String {
        match self {
            Self::Node(node) => node.type_label(),
            Self::Fused(fused) => fused.type_label(),
        }
    }

    fn writes(&self) -> &[Dep] {
        match self {
            Self::Node(node) => node.writes(),
            Self::Fused(fused) => fused.writes(),
        }
    }

    fn unmet(&self) -> &BTreeSet<Dep> {
        match self {
            Self::Node(node) => node.unmet(),
            Self::Fused(fused) => fused.unmet(),
        }
    }

    fn met(&self) -> &BTreeSet<Dep> {
        match self {
            Self::Node(node) => node.met(),
            Self::Fused(fused) => fused.met(),
        }
    }

    fn users(&self) -> &[NodeUser] {
        match self {
            Self::Node(node) => node.users(),
            Self::Fused(fused) => fused.users(),
        }
    }
}

/// Why a unit could not join its fusion candidate. Ineligibility is not
/// an error: the unit is placed standalone and the reason is logged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum FusionIneligible {
    ExternProducer,
    ExternConsumer,
    GroupMismatch,
    OpaqueAccess,
}

impl fmt::Display for FusionIneligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExternProducer => write!(f, "producer is an external kernel"),
            Self::ExternConsumer => write!(f, "consumer is an external kernel"),
            Self::GroupMismatch => write!(f, "iteration groups differ"),
            Self::OpaqueAccess => write!(f, "consumer's access to the producer is opaque"),
        }
    }
}

fn can_fuse(
    candidate: &[SchedulerNode],
    incoming: &ScheduleUnit,
    candidate_idx: usize,
    writer: &BTreeMap<String, usize>,
) -> Result<(), FusionIneligible> {
    let cand_group = match candidate[0].group() {
        Some(group) => group,
        None => return Err(FusionIneligible::ExternProducer),
    };
    let group = match incoming.group() {
        Some(group) => group,
        None => return Err(FusionIneligible::ExternConsumer),
    };
    if group != cand_group {
        return Err(FusionIneligible::GroupMismatch);
    }
    // Opaque reads of the candidate's buffers cannot prove element-level
    // compatibility, so they keep the consumer out.
    for dep in incoming.unmet() {
        if writer.get(dep.buf_name()) == Some(&candidate_idx) && !dep.is_indexed() {
            return Err(FusionIneligible::OpaqueAccess);
        }
    }
    Ok(())
}

/// Single greedy pass over `units`. Returns the fused schedule and the
/// number of merges performed.
pub(crate) fn fuse_units(units: Vec<ScheduleUnit>) -> (Vec<ScheduleUnit>, usize) {
    // Groups under construction, as flat member lists; `writer` maps a
    // buffer name to the group that writes it.
    let mut groups: Vec<Vec<SchedulerNode>> = Vec::new();
    let mut writer: BTreeMap<String, usize> = BTreeMap::new();
    let mut merged = 0usize;

    for unit in units {
        // The fusion candidate is the last placed group writing any of
        // this unit's unmet buffers. Processing in schedule order means
        // every producer is already placed, so joining the candidate
        // cannot reorder the schedule.
        let candidate = unit
            .unmet()
            .iter()
            .filter_map(|dep| writer.get(dep.buf_name()).copied())
            .max();

        let mut join = None;
        if let Some(ci) = candidate {
            match can_fuse(&groups[ci], &unit, ci, &writer) {
                Ok(()) => join = Some(ci),
                Err(reason) => {
                    log::debug!("fusion skipped for `{}`: {reason}", unit.name());
                }
            }
        }

        let target = match join {
            Some(ci) => {
                log::debug!("fused `{}` into `{}`", unit.name(), groups[ci][0].name());
                merged += 1;
                ci
            }
            None => {
                groups.push(Vec::new());
                groups.len() - 1
            }
        };
        let children = unit.into_children();
        for child in &children {
            for dep in &child.writes {
                writer.insert(dep.buf_name().to_owned(), target);
            }
        }
        groups[target].extend(children);
    }

    let units = groups
        .into_iter()
        .map(|mut group| {
            if group.len() == 1 {
                ScheduleUnit::Node(group.remove(0))
            } else {
                ScheduleUnit::Fused(FusedNode::from_children(group))
            }
        })
        .collect();
    (units, merged)
}
