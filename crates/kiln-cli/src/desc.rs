//! JSON graph descriptions.
//!
//! The driver consumes a small JSON format describing the input graph:
//! the device, external inputs, buffer-producing nodes, and outputs.
//!
//! ```json
//! {
//!   "device": "cpu",
//!   "inputs": [{ "name": "arg0_1", "dtype": "f32", "shape": [16, 16] }],
//!   "nodes": [
//!     {
//!       "kind": "pointwise", "name": "buf0", "shape": [16, 16],
//!       "expr": {
//!         "op": "binary", "fun": "add",
//!         "lhs": { "op": "load", "buffer": "arg0_1" },
//!         "rhs": { "op": "constant", "value": 1.0 }
//!       }
//!     }
//!   ],
//!   "outputs": ["buf0"]
//! }
//! ```

use serde::Deserialize;

use kiln_ir::{
    BinaryOp, Device, Dtype, FixedLayout, Graph, GraphError, NodeOp, PointwiseExpr, UnaryOp,
};

/// Errors raised while turning a JSON description into a [`Graph`].
#[derive(Debug, thiserror::Error)]
pub enum DescError {
    /// The input did not match the description schema.
    #[error("invalid graph description")]
    Json(#[from] serde_json::Error),

    /// An element type name was not recognized.
    #[error("unknown dtype `{0}`")]
    UnknownDtype(String),

    /// A device name was not recognized.
    #[error("unknown device `{0}`")]
    UnknownDevice(String),

    /// An operator name was not recognized.
    #[error("unknown operator `{0}`")]
    UnknownOp(String),

    /// An explicit stride did not match the shape's rank.
    #[error("input `{name}`: stride has {stride} entries but shape has {shape}")]
    RankMismatch {
        /// The offending input buffer.
        name: String,
        /// Rank of the declared shape.
        shape: usize,
        /// Number of stride entries given.
        stride: usize,
    },

    /// A shape's element count does not fit in 64 bits.
    #[error("buffer `{0}`: shape element count overflows")]
    ShapeOverflow(String),

    /// The described graph violated a buffer invariant.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Deserialize)]
struct GraphDesc {
    /// Device every buffer lives on. Defaults to `cpu`.
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    inputs: Vec<InputDesc>,
    #[serde(default)]
    nodes: Vec<NodeDesc>,
    #[serde(default)]
    outputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InputDesc {
    name: String,
    dtype: String,
    shape: Vec<u64>,
    /// Explicit element strides; row-major when omitted.
    #[serde(default)]
    stride: Option<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NodeDesc {
    /// An elementwise node defined by an expression tree.
    Pointwise {
        name: String,
        #[serde(default)]
        dtype: Option<String>,
        shape: Vec<u64>,
        expr: ExprDesc,
    },
    /// An opaque call into a pre-built kernel.
    Extern {
        name: String,
        #[serde(default)]
        dtype: Option<String>,
        shape: Vec<u64>,
        kernel: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ExprDesc {
    /// Load one element from a buffer.
    Load { buffer: String },
    /// A scalar constant. The dtype defaults to `f32`.
    Constant {
        value: f64,
        #[serde(default)]
        dtype: Option<String>,
    },
    /// Apply a unary operator.
    Unary { fun: String, arg: Box<ExprDesc> },
    /// Apply a binary operator.
    Binary {
        fun: String,
        lhs: Box<ExprDesc>,
        rhs: Box<ExprDesc>,
    },
}

fn parse_device(name: &str) -> Result<Device, DescError> {
    if name == "cpu" {
        return Ok(Device::Cpu);
    }
    if name == "cuda" {
        return Ok(Device::Cuda { index: 0 });
    }
    if let Some(index) = name.strip_prefix("cuda:") {
        if let Ok(index) = index.parse() {
            return Ok(Device::Cuda { index });
        }
    }
    Err(DescError::UnknownDevice(name.to_owned()))
}

fn parse_dtype(name: &str) -> Result<Dtype, DescError> {
    match name {
        "f32" => Ok(Dtype::F32),
        "f64" => Ok(Dtype::F64),
        "f16" => Ok(Dtype::F16),
        "bf16" => Ok(Dtype::BF16),
        "i32" => Ok(Dtype::I32),
        "i64" => Ok(Dtype::I64),
        "u8" => Ok(Dtype::U8),
        "bool" => Ok(Dtype::Bool),
        _ => Err(DescError::UnknownDtype(name.to_owned())),
    }
}

fn node_dtype(dtype: &Option<String>) -> Result<Dtype, DescError> {
    parse_dtype(dtype.as_deref().unwrap_or("f32"))
}

fn parse_unary(name: &str) -> Result<UnaryOp, DescError> {
    match name {
        "neg" => Ok(UnaryOp::Neg),
        "abs" => Ok(UnaryOp::Abs),
        "exp" => Ok(UnaryOp::Exp),
        "sqrt" => Ok(UnaryOp::Sqrt),
        "relu" => Ok(UnaryOp::Relu),
        _ => Err(DescError::UnknownOp(name.to_owned())),
    }
}

fn parse_binary(name: &str) -> Result<BinaryOp, DescError> {
    match name {
        "add" => Ok(BinaryOp::Add),
        "sub" => Ok(BinaryOp::Sub),
        "mul" => Ok(BinaryOp::Mul),
        "div" => Ok(BinaryOp::Div),
        "maximum" => Ok(BinaryOp::Maximum),
        "minimum" => Ok(BinaryOp::Minimum),
        _ => Err(DescError::UnknownOp(name.to_owned())),
    }
}

fn build_expr(desc: &ExprDesc) -> Result<PointwiseExpr, DescError> {
    match desc {
        ExprDesc::Load { buffer } => Ok(PointwiseExpr::load(buffer.clone())),
        ExprDesc::Constant { value, dtype } => {
            Ok(PointwiseExpr::constant(*value, node_dtype(dtype)?))
        }
        ExprDesc::Unary { fun, arg } => {
            Ok(PointwiseExpr::unary(parse_unary(fun)?, build_expr(arg)?))
        }
        ExprDesc::Binary { fun, lhs, rhs } => Ok(PointwiseExpr::binary(
            parse_binary(fun)?,
            build_expr(lhs)?,
            build_expr(rhs)?,
        )),
    }
}

// FixedLayout panics on rank mismatch and assumes the element count
// fits in u64, so both are checked here before construction.
fn layout_for(
    device: Device,
    dtype: Dtype,
    name: &str,
    shape: &[u64],
    stride: Option<&[u64]>,
) -> Result<FixedLayout, DescError> {
    shape
        .iter()
        .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| DescError::ShapeOverflow(name.to_owned()))?;
    match stride {
        Some(stride) if stride.len() != shape.len() => Err(DescError::RankMismatch {
            name: name.to_owned(),
            shape: shape.len(),
            stride: stride.len(),
        }),
        Some(stride) => Ok(FixedLayout::new(
            device,
            dtype,
            shape.to_vec(),
            stride.to_vec(),
        )),
        None => Ok(FixedLayout::contiguous(device, dtype, shape.to_vec())),
    }
}

/// Parse a JSON graph description into a [`Graph`].
pub fn parse_graph(source: &str) -> Result<Graph, DescError> {
    let desc: GraphDesc = serde_json::from_str(source)?;
    let device = parse_device(desc.device.as_deref().unwrap_or("cpu"))?;

    let mut graph = Graph::new();
    for input in &desc.inputs {
        let dtype = parse_dtype(&input.dtype)?;
        let layout = layout_for(
            device,
            dtype,
            &input.name,
            &input.shape,
            input.stride.as_deref(),
        )?;
        graph.add_input(input.name.clone(), layout)?;
    }
    for node in &desc.nodes {
        match node {
            NodeDesc::Pointwise {
                name,
                dtype,
                shape,
                expr,
            } => {
                let layout = layout_for(device, node_dtype(dtype)?, name, shape, None)?;
                graph.add_pointwise(name.clone(), layout, build_expr(expr)?)?;
            }
            NodeDesc::Extern {
                name,
                dtype,
                shape,
                kernel,
                args,
            } => {
                let layout = layout_for(device, node_dtype(dtype)?, name, shape, None)?;
                graph.add_extern(name.clone(), layout, kernel.clone(), args.clone())?;
            }
        }
    }
    for output in &desc.outputs {
        graph.mark_output(output)?;
    }
    Ok(graph)
}

fn fmt_shape(size: &[u64]) -> String {
    let dims: Vec<String> = size.iter().map(u64::to_string).collect();
    dims.join(", ")
}

fn buffer_label(graph: &Graph, name: &str) -> String {
    match graph.registry().get(name) {
        Ok(buffer) => {
            let layout = buffer.layout();
            format!("{}[{}]", layout.dtype(), fmt_shape(layout.size()))
        }
        Err(_) => "?".to_owned(),
    }
}

fn fmt_expr(expr: &PointwiseExpr) -> String {
    match expr {
        PointwiseExpr::Load { buffer } => format!("load({buffer})"),
        PointwiseExpr::Constant { value, .. } => format!("constant({value:?})"),
        PointwiseExpr::Unary { op, arg } => format!("{}({})", op.name(), fmt_expr(arg)),
        PointwiseExpr::Binary { op, lhs, rhs } => {
            format!("{}({}, {})", op.name(), fmt_expr(lhs), fmt_expr(rhs))
        }
    }
}

/// Render a one-definition-per-line listing of the graph.
pub fn describe_graph(graph: &Graph) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# graph: {} inputs, {} nodes, {} outputs\n",
        graph.inputs().len(),
        graph.nodes().len(),
        graph.outputs().len()
    ));
    for name in graph.inputs() {
        out.push_str(&format!("{name}: {} = input()\n", buffer_label(graph, name)));
    }
    for node in graph.nodes() {
        let label = buffer_label(graph, &node.name);
        match &node.op {
            NodeOp::Pointwise { expr } => {
                out.push_str(&format!("{}: {label} = {}\n", node.name, fmt_expr(expr)));
            }
            NodeOp::Extern { kernel, args } => {
                out.push_str(&format!(
                    "{}: {label} = {kernel}({})\n",
                    node.name,
                    args.join(", ")
                ));
            }
        }
    }
    match graph.outputs() {
        [single] => out.push_str(&format!("return ({single},)\n")),
        outputs => out.push_str(&format!("return ({})\n", outputs.join(", "))),
    }
    out
}
