//! Hierarchical node store for HKL.
//!
//! A store is a tree of named nodes, analogous to the groups and datasets of
//! common scientific container formats:
//!
//! - **groups** hold named children
//! - **datasets** hold a typed, shaped, little-endian payload ([`Dataset`])
//! - every node carries an attribute map ([`Attrs`])
//!
//! # Storage Backends
//!
//! All backends implement the [`NodeStore`] trait:
//!
//! - [`InMemoryNodeStore`] -- `BTreeMap`-based tree for tests and embedding
//! - [`FileNodeStore`] -- the same tree persisted to a single container file
//!   (see [`ContainerFile`] for the byte layout)
//!
//! # Design Rules
//!
//! 1. Children are listed in lexicographic order, never creation order.
//!    Callers that need another order record it themselves.
//! 2. Filters ([`StorageOptions`]) are applied per dataset at creation time
//!    and are invisible to readers.
//! 3. Nodes are never deleted or renamed.
//! 4. All I/O and integrity errors are propagated, never silently ignored.

pub mod attrs;
pub mod container;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod memory;
pub mod options;
pub mod path;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use attrs::{AttrValue, Attrs};
pub use container::{ContainerFile, FileNodeStore, OpenMode};
pub use dataset::{DType, Dataset, Element};
pub use error::{StoreError, StoreResult};
pub use filter::FilteredPayload;
pub use memory::InMemoryNodeStore;
pub use options::{Compression, StorageOptions};
pub use path::NodePath;
pub use traits::{NodeKind, NodeStore};
