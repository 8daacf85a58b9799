//! Named buffers and the buffer registry.

use std::collections::BTreeMap;

use crate::error::GraphError;
use crate::layout::FixedLayout;

/// A named buffer with a fixed layout.
#[derive(Clone, Debug)]
pub struct Buffer {
    name: String,
    layout: FixedLayout,
}

impl Buffer {
    /// The buffer's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The buffer's layout.
    pub fn layout(&self) -> &FixedLayout {
        &self.layout
    }
}

/// Registry of all buffers in a graph, keyed by unique name.
///
/// Registration is append-only: a name can be registered once and a
/// buffer's layout never changes afterwards.
#[derive(Clone, Debug, Default)]
pub struct BufferRegistry {
    buffers: BTreeMap<String, Buffer>,
}

impl BufferRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        layout: FixedLayout,
    ) -> Result<(), GraphError> {
        let name = name.into();
        if self.buffers.contains_key(&name) {
            return Err(GraphError::DuplicateBuffer(name));
        }
        self.buffers.insert(name.clone(), Buffer { name, layout });
        Ok(())
    }

    /// Look up a buffer by name.
    pub fn get(&self, name: &str) -> Result<&Buffer, GraphError> {
        self.buffers
            .get(name)
            .ok_or_else(|| GraphError::UnknownBuffer(name.to_owned()))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    /// Number of registered buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Iterate over buffers in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Device, Dtype};

    fn layout() -> FixedLayout {
        FixedLayout::contiguous(Device::Cpu, Dtype::F32, vec![16, 16])
    }

    #[test]
    fn register_and_get() {
        let mut registry = BufferRegistry::new();
        registry.register("buf0", layout()).unwrap();
        let buf = registry.get("buf0").unwrap();
        assert_eq!(buf.name(), "buf0");
        assert_eq!(buf.layout().numel(), 256);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = BufferRegistry::new();
        registry.register("buf0", layout()).unwrap();
        let err = registry.register("buf0", layout()).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateBuffer(name) if name == "buf0"));
    }

    #[test]
    fn unknown_lookup_is_rejected() {
        let registry = BufferRegistry::new();
        let err = registry.get("ghost").unwrap_err();
        assert!(matches!(err, GraphError::UnknownBuffer(name) if name == "ghost"));
    }

    #[test]
    fn iteration_is_name_ordered() {
        let mut registry = BufferRegistry::new();
        registry.register("b", layout()).unwrap();
        registry.register("a", layout()).unwrap();
        let names: Vec<_> = registry.iter().map(Buffer::name).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
