//! Affine index expressions over symbolic variables.

use std::collections::BTreeSet;
use std::fmt;

use crate::sym::Sym;

/// A small affine index expression.
///
/// Indexes stay affine: sums of symbols and integer-scaled
/// subexpressions. That is enough to express flattened row-major
/// addressing, and it keeps structural comparison cheap.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum IndexExpr {
    /// A symbolic variable.
    Sym(Sym),
    /// An integer constant.
    Int(i64),
    /// Sum of two subexpressions.
    Add(Box<IndexExpr>, Box<IndexExpr>),
    /// A subexpression scaled by an integer.
    MulInt(Box<IndexExpr>, i64),
}

impl IndexExpr {
    /// The identity index over `sym`.
    pub fn sym(sym: Sym) -> Self {
        Self::Sym(sym)
    }

    /// All symbols referenced by this expression.
    pub fn symbols(&self) -> BTreeSet<Sym> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Sym>) {
        match self {
            Self::Sym(s) => {
                out.insert(*s);
            }
            Self::Int(_) => {}
            Self::Add(lhs, rhs) => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Self::MulInt(inner, _) => inner.collect_symbols(out),
        }
    }

    /// Replace every occurrence of `from` with `to`.
    pub fn substitute(&self, from: Sym, to: Sym) -> IndexExpr {
        match self {
            Self::Sym(s) if *s == from => Self::Sym(to),
            Self::Sym(s) => Self::Sym(*s),
            Self::Int(v) => Self::Int(*v),
            Self::Add(lhs, rhs) => Self::Add(
                Box::new(lhs.substitute(from, to)),
                Box::new(rhs.substitute(from, to)),
            ),
            Self::MulInt(inner, k) => Self::MulInt(Box::new(inner.substitute(from, to)), *k),
        }
    }

    /// Whether this expression is exactly the variable `sym`.
    pub fn is_identity_over(&self, sym: Sym) -> bool {
        matches!(self, Self::Sym(s) if *s == sym)
    }
}

impl fmt::Display for IndexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sym(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Add(lhs, rhs) => write!(f, "{lhs} + {rhs}"),
            Self::MulInt(inner, k) => match inner.as_ref() {
                Self::Sym(_) | Self::Int(_) => write!(f, "{k}*{inner}"),
                _ => write!(f, "{k}*({inner})"),
            },
        }
    }
}
