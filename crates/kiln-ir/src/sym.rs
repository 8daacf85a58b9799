//! Symbolic iteration variables.

use std::fmt;

/// The namespace a symbolic variable belongs to.
///
/// Iteration variables (`y*`) index a node's flattened loop nest,
/// canonical variables (`c*`) appear in normalized dependency indexes,
/// and reduction variables (`r*`) index reduction axes.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum SymKind {
    /// Flattened iteration axis.
    Iter,
    /// Canonical dependency index.
    Canon,
    /// Reduction axis.
    Reduce,
}

/// A symbolic variable: a namespace plus a numeric id.
///
/// Renders as `y0`, `c0`, `r1` and so on. Ordering is derived so that
/// symbol-keyed maps iterate deterministically.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Sym {
    kind: SymKind,
    id: u32,
}

impl Sym {
    /// The iteration variable `y{id}`.
    pub const fn iter(id: u32) -> Self {
        Self {
            kind: SymKind::Iter,
            id,
        }
    }

    /// The canonical variable `c{id}`.
    pub const fn canon(id: u32) -> Self {
        Self {
            kind: SymKind::Canon,
            id,
        }
    }

    /// The reduction variable `r{id}`.
    pub const fn reduce(id: u32) -> Self {
        Self {
            kind: SymKind::Reduce,
            id,
        }
    }

    /// The namespace of this variable.
    pub const fn kind(self) -> SymKind {
        self.kind
    }

    /// The numeric id within the namespace.
    pub const fn id(self) -> u32 {
        self.id
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            SymKind::Iter => 'y',
            SymKind::Canon => 'c',
            SymKind::Reduce => 'r',
        };
        write!(f, "{prefix}{}", self.id)
    }
}
