//! Dependency descriptors.
//!
//! Every read and write a scheduler node performs is described by a
//! [`Dep`]. Descriptors compare structurally, so identical accesses
//! deduplicate when collected into sets, and the same comparison decides
//! in-place reuse.

use std::collections::BTreeMap;
use std::fmt;

use kiln_ir::{IndexExpr, Sym};

/// Qualifier on an access that is not a plain read or write.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum AccessMode {
    /// Atomic read-modify-write accumulation.
    AtomicAdd,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtomicAdd => write!(f, "atomic_add"),
        }
    }
}

/// An indexed access: buffer name, index expression, and the value range
/// of every symbol the index uses.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct MemoryDep {
    /// The accessed buffer.
    pub buf: String,
    /// Index expression over the symbols in `ranges`.
    pub index: IndexExpr,
    /// Extent of each symbol appearing in `index`.
    pub ranges: BTreeMap<Sym, u64>,
    /// Access qualifier, if any.
    pub mode: Option<AccessMode>,
}

impl MemoryDep {
    /// Whether this access touches every element of a buffer with
    /// `numel` elements: the index must be the identity over a single
    /// symbol whose range is exactly `numel`.
    pub fn spans(&self, numel: u64) -> bool {
        if self.ranges.len() != 1 {
            return false;
        }
        match self.ranges.iter().next() {
            Some((&sym, &extent)) => extent == numel && self.index.is_identity_over(sym),
            None => false,
        }
    }
}

/// An opaque access: the whole buffer, with no index structure.
///
/// External kernels read and write through these. An opaque access can
/// never prove it matches another access element for element, so it
/// blocks both fusion and in-place reuse.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct StarDep {
    /// The accessed buffer.
    pub buf: String,
    /// Access qualifier, if any.
    pub mode: Option<AccessMode>,
}

/// A single dependency of a scheduler node.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Dep {
    /// Indexed access with known extent.
    Memory(MemoryDep),
    /// Opaque whole-buffer access.
    Star(StarDep),
}

impl Dep {
    /// An indexed dependency with no qualifier.
    pub fn memory(buf: impl Into<String>, index: IndexExpr, ranges: BTreeMap<Sym, u64>) -> Self {
        Self::Memory(MemoryDep {
            buf: buf.into(),
            index,
            ranges,
            mode: None,
        })
    }

    /// The canonical whole-buffer indexed dependency: identity index over
    /// `c0` ranging over `numel` elements.
    pub fn canonical(buf: impl Into<String>, numel: u64) -> Self {
        let c0 = Sym::canon(0);
        let mut ranges = BTreeMap::new();
        ranges.insert(c0, numel);
        Self::memory(buf, IndexExpr::sym(c0), ranges)
    }

    /// An opaque dependency with no qualifier.
    pub fn star(buf: impl Into<String>) -> Self {
        Self::Star(StarDep {
            buf: buf.into(),
            mode: None,
        })
    }

    /// The name of the accessed buffer.
    pub fn buf_name(&self) -> &str {
        match self {
            Self::Memory(dep) => &dep.buf,
            Self::Star(dep) => &dep.buf,
        }
    }

    /// Whether the access has index structure.
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Memory(_))
    }

    /// Whether the access provably touches every element of a buffer
    /// with `numel` elements. Opaque accesses never do.
    pub fn covers(&self, numel: u64) -> bool {
        match self {
            Self::Memory(dep) => dep.spans(numel),
            Self::Star(_) => false,
        }
    }
}

fn fmt_mode(f: &mut fmt::Formatter<'_>, mode: Option<AccessMode>) -> fmt::Result {
    match mode {
        Some(m) => write!(f, "{m}"),
        None => write!(f, "None"),
    }
}

impl fmt::Display for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(dep) => {
                write!(f, "MemoryDep({}, {}, {{", dep.buf, dep.index)?;
                for (i, (sym, extent)) in dep.ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{sym}: {extent}")?;
                }
                write!(f, "}}, ")?;
                fmt_mode(f, dep.mode)?;
                write!(f, ")")
            }
            Self::Star(dep) => {
                write!(f, "StarDep({}, ", dep.buf)?;
                fmt_mode(f, dep.mode)?;
                write!(f, ")")
            }
        }
    }
}
