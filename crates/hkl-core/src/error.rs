use hkl_store::{NodePath, StoreError};
use hkl_types::TypeError;
use thiserror::Error;

/// Failure inside a single encoder, decoder or accumulator.
///
/// The engines wrap these with the node path and type they were working on
/// (see [`HklError::Dump`] and [`HklError::Reconstruction`]).
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The loader was handed a value or node it cannot handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Stored data does not have the shape the loader expects.
    #[error("malformed node: {0}")]
    Malformed(String),

    /// A container did not receive the children it recorded.
    #[error("expected {expected} children, got {actual}")]
    MissingChildren { expected: usize, actual: usize },

    /// A class named in the file is not known to the registry.
    #[error("class {0} is not registered")]
    MissingClass(String),

    /// The value graph loops back on itself where that cannot be stored.
    #[error("cycle detected through {0}")]
    Cycle(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for loader functions.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Failure raised while a loader module builds its tables.
#[derive(Debug, Error)]
pub enum LoaderModuleError {
    /// An optional dependency of the module is unavailable. Not fatal.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("{0}")]
    Failed(String),
}

/// Errors returned by dump and load.
#[derive(Debug, Error)]
pub enum HklError {
    /// Invalid registration, options or configuration file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An encoder failed. Nodes written before the failure are kept.
    #[error("failed to dump {type_name} at {path}: {source}")]
    Dump {
        path: NodePath,
        type_name: String,
        #[source]
        source: LoaderError,
    },

    /// No decoder is registered for a stored `base_type`.
    #[error("no loader for base_type {base_type:?} (type {type_tag:?}) at {path}")]
    UnknownLoader {
        path: NodePath,
        base_type: String,
        type_tag: String,
    },

    /// The file was written by a newer, incompatible format version.
    #[error("file format version {found} is newer than supported version {supported}")]
    Version { found: String, supported: String },

    /// A back-reference node cannot be resolved.
    #[error("cannot resolve reference at {path} to {target}: {reason}")]
    Reference {
        path: NodePath,
        target: String,
        reason: String,
    },

    /// A decoder or accumulator failed.
    #[error("failed to reconstruct {type_name} at {path}: {source}")]
    Reconstruction {
        path: NodePath,
        type_name: String,
        #[source]
        source: LoaderError,
    },

    /// The group does not hold an HKL dump.
    #[error("not an hkl dump at {path}: {reason}")]
    InvalidFile { path: NodePath, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for engine operations.
pub type HklResult<T> = Result<T, HklError>;
