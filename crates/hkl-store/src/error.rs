use crate::path::NodePath;

/// Errors from node store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No node exists at the path.
    #[error("node not found: {0}")]
    NotFound(NodePath),

    /// A sibling with the same name already exists.
    #[error("node already exists: {0}")]
    AlreadyExists(NodePath),

    /// A path or node name is malformed.
    #[error("invalid node name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The operation needs a group but found a dataset.
    #[error("not a group: {0}")]
    NotAGroup(NodePath),

    /// The operation needs a dataset but found a group.
    #[error("not a dataset: {0}")]
    NotADataset(NodePath),

    /// Dataset payload does not match its dtype and shape.
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// Payload checksum mismatch on read (data corruption).
    #[error("checksum mismatch at {path}: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        path: NodePath,
        expected: u32,
        computed: u32,
    },

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed at {path}: {reason}")]
    DecompressionFailed { path: NodePath, reason: String },

    /// The container file is malformed.
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store was opened read-only.
    #[error("store is read-only")]
    ReadOnly,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
