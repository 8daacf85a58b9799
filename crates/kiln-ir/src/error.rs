//! Error types for the Kiln graph model.

/// Errors that can occur when building or querying a buffer graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A buffer name was registered twice.
    #[error("buffer `{0}` is already registered")]
    DuplicateBuffer(String),

    /// An operation named a buffer absent from the registry.
    #[error("unknown buffer `{0}`")]
    UnknownBuffer(String),
}
