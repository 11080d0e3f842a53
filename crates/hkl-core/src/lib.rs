//! Dump and load engines for HKL.
//!
//! `hkl-core` writes an in-memory value graph ([`hkl_types::Value`]) into a
//! hierarchical node store ([`hkl_store::NodeStore`]) and rebuilds it later,
//! preserving aliasing and cycles.
//!
//! # Architecture
//!
//! - [`LoaderManager`] -- registry mapping runtime classes to encoders and
//!   stored `base_type` tags to decoders or accumulators
//! - [`Dumper`] -- walks the value graph top-down; a value seen before
//!   becomes a `reference` node pointing at its first path
//! - [`Loader`] -- rebuilds nodes top-down; containers publish a
//!   placeholder before their children so back references resolve
//! - [`Engine`] -- a registry plus both engines; the free functions
//!   [`dump`](fn@dump) and [`load`](fn@load) use a process-wide registry
//!
//! # Design Rules
//!
//! 1. Every node written carries `type` and `base_type` attributes.
//! 2. Each node is materialized at most once per load.
//! 3. The `reference` and `opaque` families belong to the engine and cannot
//!    be registered or excluded.
//! 4. Loader failures are reported with the node path and type involved.

pub mod accumulator;
pub mod api;
pub mod config;
pub mod dump;
pub mod encode;
pub mod error;
pub mod load;
mod loaders;
pub mod memo;
mod opaque;
pub mod plugin;
pub mod registry;
pub mod version;

// Re-export primary types at crate root for ergonomic imports.
pub use accumulator::{Accumulator, ChildNode, NodeInfo};
pub use api::{dump, dump_to_path, load, load_from_path, Engine};
pub use config::{DumpOptions, HklConfig, LoadOptions};
pub use dump::Dumper;
pub use encode::{Child, Children, EncodeTarget, Encoded};
pub use error::{HklError, HklResult, LoaderError, LoaderModuleError, LoaderResult};
pub use load::Loader;
pub use memo::{DumpMemo, LoadMemo, NodeState};
pub use plugin::{LoaderModule, StaticModule};
pub use registry::{
    ActivationMode, ClassTable, ContainerFactory, Decoder, Encoder, LoaderEntry, LoaderManager,
    OPAQUE_BASE_TYPE, REFERENCE_BASE_TYPE,
};
pub use version::{Compatibility, FormatVersion, FORMAT_CLASS, FORMAT_VERSION};
