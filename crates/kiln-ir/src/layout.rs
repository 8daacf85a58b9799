//! Concrete buffer layouts.

use std::fmt;

use crate::types::{Device, Dtype};

/// A fully determined buffer layout: device, element type, size, and stride.
///
/// Layouts are immutable once constructed. The scheduler relies on this
/// when comparing iteration spaces and when deciding in-place reuse.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct FixedLayout {
    device: Device,
    dtype: Dtype,
    size: Vec<u64>,
    stride: Vec<u64>,
}

impl FixedLayout {
    /// Create a layout with explicit strides.
    ///
    /// # Panics
    ///
    /// Panics if `stride` and `size` do not have the same rank. Callers
    /// that accept strides from external descriptions must validate rank
    /// before constructing the layout.
    pub fn new(device: Device, dtype: Dtype, size: Vec<u64>, stride: Vec<u64>) -> Self {
        assert!(
            size.len() == stride.len(),
            "FixedLayout: size rank {} does not match stride rank {}",
            size.len(),
            stride.len(),
        );
        Self {
            device,
            dtype,
            size,
            stride,
        }
    }

    /// Create a contiguous (row-major) layout for the given size.
    pub fn contiguous(device: Device, dtype: Dtype, size: Vec<u64>) -> Self {
        let mut stride = vec![1u64; size.len()];
        for i in (0..size.len().saturating_sub(1)).rev() {
            stride[i] = stride[i + 1] * size[i + 1];
        }
        Self {
            device,
            dtype,
            size,
            stride,
        }
    }

    /// The device this buffer lives on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// The element type.
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// The size in elements, per dimension.
    pub fn size(&self) -> &[u64] {
        &self.size
    }

    /// The stride in elements, per dimension.
    pub fn stride(&self) -> &[u64] {
        &self.stride
    }

    /// Total number of elements.
    pub fn numel(&self) -> u64 {
        self.size.iter().product()
    }

    /// Total number of bytes a dense allocation of this layout occupies.
    /// Saturates when the count does not fit in 64 bits.
    pub fn size_bytes(&self) -> u64 {
        self.numel().saturating_mul(self.dtype.size_bytes())
    }
}

fn fmt_dims(f: &mut fmt::Formatter<'_>, dims: &[u64]) -> fmt::Result {
    write!(f, "[")?;
    for (i, d) in dims.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{d}")?;
    }
    write!(f, "]")
}

impl fmt::Display for FixedLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedLayout({}, {}, size=", self.device, self.dtype)?;
        fmt_dims(f, &self.size)?;
        write!(f, ", stride=")?;
        fmt_dims(f, &self.stride)?;
        write!(f, ")")
    }
}
