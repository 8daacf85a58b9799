//! Pointwise expression trees.

use std::fmt;

use crate::types::Dtype;

/// A unary elementwise operator.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum UnaryOp {
    /// Numeric negation.
    Neg,
    /// Absolute value.
    Abs,
    /// Natural exponential.
    Exp,
    /// Square root.
    Sqrt,
    /// Rectified linear unit.
    Relu,
}

impl UnaryOp {
    /// Canonical lower-case name, used for loop-body op naming.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Abs => "abs",
            Self::Exp => "exp",
            Self::Sqrt => "sqrt",
            Self::Relu => "relu",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A binary elementwise operator.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Elementwise maximum.
    Maximum,
    /// Elementwise minimum.
    Minimum,
}

impl BinaryOp {
    /// Canonical lower-case name, used for loop-body op naming.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Maximum => "maximum",
            Self::Minimum => "minimum",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The defining expression of a computed (pointwise) buffer.
///
/// Every leaf is either a load from a named buffer or a scalar constant;
/// interior nodes apply elementwise operators. The tree is evaluated once
/// per output element.
#[derive(Clone, Debug, PartialEq)]
pub enum PointwiseExpr {
    /// Load one element from a buffer.
    Load {
        /// Name of the loaded buffer.
        buffer: String,
    },
    /// A scalar constant.
    Constant {
        /// The constant's value.
        value: f64,
        /// The constant's element type.
        dtype: Dtype,
    },
    /// Apply a unary operator.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        arg: Box<PointwiseExpr>,
    },
    /// Apply a binary operator.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<PointwiseExpr>,
        /// Right operand.
        rhs: Box<PointwiseExpr>,
    },
}

impl PointwiseExpr {
    /// A load leaf.
    pub fn load(buffer: impl Into<String>) -> Self {
        Self::Load {
            buffer: buffer.into(),
        }
    }

    /// A constant leaf.
    pub fn constant(value: f64, dtype: Dtype) -> Self {
        Self::Constant { value, dtype }
    }

    /// A unary application.
    pub fn unary(op: UnaryOp, arg: PointwiseExpr) -> Self {
        Self::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    /// A binary application.
    pub fn binary(op: BinaryOp, lhs: PointwiseExpr, rhs: PointwiseExpr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}
