//! Runtime value model for HKL.
//!
//! HKL serializes arbitrary object graphs, so it needs a value type that
//! carries its own runtime type and its own notion of identity. This crate
//! provides both:
//!
//! - [`Class`] -- a runtime type descriptor with C3 method resolution order
//! - [`Value`] -- a dynamic value; containers and objects are shared handles
//! - [`Key`] -- the hashable subset of values, used for dict keys and sets
//! - [`NdArray`] -- dense numeric arrays
//! - [`Instance`] -- field storage for user-defined objects
//!
//! # Identity
//!
//! Scalars are plain data. Containers, arrays and objects are `Rc` handles:
//! cloning a `Value::List` clones the handle, not the list. Graphs may alias
//! and may contain cycles.

pub mod array;
pub mod class;
pub mod error;
pub mod key;
pub mod object;
pub mod value;

pub use array::{ArrayData, NdArray};
pub use class::{Class, BUILTINS_MODULE};
pub use error::TypeError;
pub use key::Key;
pub use object::Instance;
pub use value::{Array, Complex, Dict, DictData, List, Object, Set, SetData, Tuple, Value};
