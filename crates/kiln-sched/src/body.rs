//! Loop-body lowering for computed buffers.
//!
//! A pointwise expression tree lowers to a [`LoopBody`]: a flat, ordered
//! list of ops evaluated once per output element. Iteration is flattened
//! to a single `y0` symbol ranging over the output's element count, and
//! every op gets a deterministic local name so two lowerings of the same
//! node produce identical bodies.

use std::collections::{BTreeMap, HashMap};

use kiln_ir::{BinaryOp, BufferRegistry, Dtype, IndexExpr, PointwiseExpr, Sym, SymKind, UnaryOp};

use crate::deps::{Dep, MemoryDep};

/// Index of an op within its [`LoopBody`].
pub type OpId = usize;

/// How a store combines with the existing value, for reduction stores.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ReduceMode {
    /// Accumulate by addition.
    Sum,
    /// Keep the maximum.
    Max,
    /// Keep the minimum.
    Min,
}

impl ReduceMode {
    /// Canonical lower-case name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

/// The computation applied by a [`BodyOp::Compute`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ComputeFn {
    /// A unary elementwise operator.
    Unary(UnaryOp),
    /// A binary elementwise operator.
    Binary(BinaryOp),
}

impl ComputeFn {
    /// The operator's canonical name, which also seeds the op's local name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unary(op) => op.name(),
            Self::Binary(op) => op.name(),
        }
    }
}

/// One op in a lowered loop body.
#[derive(Clone, Debug, PartialEq)]
pub enum BodyOp {
    /// Materialize one of the body's index expressions.
    GetIndex {
        /// Slot into [`LoopBody::indexes`].
        slot: usize,
    },
    /// Load an element from a buffer at a previously materialized index.
    Load {
        /// The loaded buffer.
        buffer: String,
        /// The index op to load at.
        index_op: OpId,
    },
    /// A scalar constant.
    Constant {
        /// The constant's value.
        value: f64,
        /// The constant's element type.
        dtype: Dtype,
    },
    /// Apply an elementwise operator to previous ops.
    Compute {
        /// The operator.
        fun: ComputeFn,
        /// Argument op ids, in operator order.
        args: Vec<OpId>,
    },
    /// Store a value to a buffer at a previously materialized index.
    Store {
        /// The stored buffer.
        buffer: String,
        /// The index op to store at.
        index_op: OpId,
        /// The op producing the stored value.
        value: OpId,
        /// Reduction combine mode; `None` for plain elementwise stores.
        mode: Option<ReduceMode>,
    },
}

/// A lowered loop body: iteration ranges, index expressions, and ops.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopBody {
    /// Extent of every iteration symbol the body uses.
    pub var_ranges: BTreeMap<Sym, u64>,
    /// Named index expressions (`index0`, `index1`, ...).
    pub indexes: Vec<(String, IndexExpr)>,
    /// Ops in evaluation order, each with its deterministic local name.
    pub ops: Vec<(String, BodyOp)>,
    /// The op whose value the body returns; always the final store.
    pub result: OpId,
}

impl LoopBody {
    /// Check that every symbol referenced by an index expression has a
    /// declared range.
    pub fn validate(&self, node: &str) -> Result<(), LoweringError> {
        for (_, index) in &self.indexes {
            for sym in index.symbols() {
                if !self.var_ranges.contains_key(&sym) {
                    return Err(LoweringError::UnboundSymbol {
                        node: node.to_owned(),
                        sym: sym.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Distinct loaded buffer names, in op order.
    pub fn loaded_buffers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for (_, op) in &self.ops {
            if let BodyOp::Load { buffer, .. } = op {
                if !out.contains(&buffer.as_str()) {
                    out.push(buffer.as_str());
                }
            }
        }
        out
    }

    /// The buffer written by the result store, if the result is a store.
    pub fn stored_buffer(&self) -> Option<&str> {
        match self.ops.get(self.result) {
            Some((_, BodyOp::Store { buffer, .. })) => Some(buffer),
            _ => None,
        }
    }

    /// Extents of the parallel iteration symbols, in symbol order.
    pub fn iter_extents(&self) -> Vec<u64> {
        self.var_ranges
            .iter()
            .filter(|(sym, _)| sym.kind() == SymKind::Iter)
            .map(|(_, &extent)| extent)
            .collect()
    }

    /// Extents of the reduction symbols, in symbol order.
    pub fn reduce_extents(&self) -> Vec<u64> {
        self.var_ranges
            .iter()
            .filter(|(sym, _)| sym.kind() == SymKind::Reduce)
            .map(|(_, &extent)| extent)
            .collect()
    }

    /// A dependency descriptor for every load, with the body's symbols
    /// renamed into the canonical `c*` namespace in symbol order.
    ///
    /// Duplicate loads collapse to one descriptor; first use wins. A
    /// load whose index op cannot be resolved degrades to an opaque
    /// descriptor rather than dropping the access.
    pub fn read_deps(&self) -> Vec<Dep> {
        let mut out: Vec<Dep> = Vec::new();
        for (_, op) in &self.ops {
            if let BodyOp::Load { buffer, index_op } = op {
                let dep = self.canonical_access(buffer, *index_op);
                if !out.contains(&dep) {
                    out.push(dep);
                }
            }
        }
        out
    }

    /// The descriptor for the result store, renamed like
    /// [`read_deps`](Self::read_deps). `None` if the result is not a
    /// store.
    pub fn write_dep(&self) -> Option<Dep> {
        match self.ops.get(self.result) {
            Some((_, BodyOp::Store {
                buffer, index_op, ..
            })) => Some(self.canonical_access(buffer, *index_op)),
            _ => None,
        }
    }

    fn canonical_access(&self, buffer: &str, index_op: OpId) -> Dep {
        let renames: Vec<(Sym, Sym)> = self
            .var_ranges
            .keys()
            .enumerate()
            .map(|(i, &sym)| (sym, Sym::canon(i as u32)))
            .collect();
        let index = match self.index_expr(index_op) {
            Some(expr) => expr,
            None => return Dep::star(buffer),
        };
        let index = renames
            .iter()
            .fold(index.clone(), |expr, &(from, to)| expr.substitute(from, to));
        let used = index.symbols();
        let ranges = self
            .var_ranges
            .values()
            .zip(&renames)
            .map(|(&extent, &(_, canon))| (canon, extent))
            .filter(|(canon, _)| used.contains(canon))
            .collect();
        Dep::Memory(MemoryDep {
            buf: buffer.to_owned(),
            index,
            ranges,
            mode: None,
        })
    }

    fn index_expr(&self, op: OpId) -> Option<&IndexExpr> {
        match self.ops.get(op) {
            Some((_, BodyOp::GetIndex { slot })) => self.indexes.get(*slot).map(|(_, expr)| expr),
            _ => None,
        }
    }
}

/// Errors raised while lowering an expression tree to a loop body.
#[derive(Debug, thiserror::Error)]
pub enum LoweringError {
    /// The expression referenced a buffer the registry does not know.
    #[error("node `{node}` references undeclared buffer `{buffer}`")]
    UndeclaredBuffer {
        /// The node being lowered.
        node: String,
        /// The unknown buffer name.
        buffer: String,
    },

    /// An index expression used a symbol with no declared range.
    #[error("node `{node}` uses index symbol `{sym}` with no declared range")]
    UnboundSymbol {
        /// The node being lowered.
        node: String,
        /// The unbound symbol, rendered.
        sym: String,
    },
}

struct BodyBuilder<'a> {
    node: &'a str,
    registry: &'a BufferRegistry,
    ops: Vec<(String, BodyOp)>,
    counts: HashMap<String, usize>,
}

impl BodyBuilder<'_> {
    fn fresh(&mut self, base: &str) -> String {
        let count = self.counts.entry(base.to_owned()).or_insert(0);
        let name = if *count == 0 {
            base.to_owned()
        } else {
            format!("{base}_{count}")
        };
        *count += 1;
        name
    }

    fn push(&mut self, base: &str, op: BodyOp) -> OpId {
        let name = self.fresh(base);
        self.ops.push((name, op));
        self.ops.len() - 1
    }

    fn lower_expr(&mut self, expr: &PointwiseExpr) -> Result<OpId, LoweringError> {
        match expr {
            PointwiseExpr::Load { buffer } => {
                if !self.registry.contains(buffer) {
                    return Err(LoweringError::UndeclaredBuffer {
                        node: self.node.to_owned(),
                        buffer: buffer.clone(),
                    });
                }
                let index_op = self.push("get_index", BodyOp::GetIndex { slot: 0 });
                Ok(self.push(
                    "load",
                    BodyOp::Load {
                        buffer: buffer.clone(),
                        index_op,
                    },
                ))
            }
            PointwiseExpr::Constant { value, dtype } => Ok(self.push(
                "constant",
                BodyOp::Constant {
                    value: *value,
                    dtype: *dtype,
                },
            )),
            PointwiseExpr::Unary { op, arg } => {
                let arg = self.lower_expr(arg)?;
                Ok(self.push(
                    op.name(),
                    BodyOp::Compute {
                        fun: ComputeFn::Unary(*op),
                        args: vec![arg],
                    },
                ))
            }
            PointwiseExpr::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                Ok(self.push(
                    op.name(),
                    BodyOp::Compute {
                        fun: ComputeFn::Binary(*op),
                        args: vec![lhs, rhs],
                    },
                ))
            }
        }
    }
}

/// Lower the defining expression of the computed buffer `node`.
///
/// Iteration is flattened: the body runs `y0` over the output buffer's
/// element count and indexes every operand with the single shared
/// `index0 = y0` expression.
pub fn lower_pointwise(
    node: &str,
    expr: &PointwiseExpr,
    registry: &BufferRegistry,
) -> Result<LoopBody, LoweringError> {
    let layout = registry
        .get(node)
        .map_err(|_| LoweringError::UndeclaredBuffer {
            node: node.to_owned(),
            buffer: node.to_owned(),
        })?
        .layout();

    let y0 = Sym::iter(0);
    let mut var_ranges = BTreeMap::new();
    var_ranges.insert(y0, layout.numel());
    let indexes = vec![("index0".to_owned(), IndexExpr::sym(y0))];

    let mut builder = BodyBuilder {
        node,
        registry,
        ops: Vec::new(),
        counts: HashMap::new(),
    };
    let value = builder.lower_expr(expr)?;
    let index_op = builder.push("get_index", BodyOp::GetIndex { slot: 0 });
    let result = builder.push(
        "store",
        BodyOp::Store {
            buffer: node.to_owned(),
            index_op,
            value,
            mode: None,
        },
    );

    let body = LoopBody {
        var_ranges,
        indexes,
        ops: builder.ops,
        result,
    };
    body.validate(node)?;
    Ok(body)
}
