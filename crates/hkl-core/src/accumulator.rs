//! Load-side loader interfaces: leaf decoding and container accumulation.

use hkl_store::{Attrs, Dataset, NodeKind, NodePath};
use hkl_types::{Class, Value};

use crate::error::{LoaderError, LoaderResult};
use crate::registry::ClassTable;

/// Metadata of a node being materialized.
pub struct NodeInfo<'a> {
    pub path: &'a NodePath,
    pub attrs: &'a Attrs,
    pub base_type: &'a str,
    pub type_tag: &'a str,
    /// Class named by `type_tag`, if the registry knows it.
    pub class: Option<&'a Class>,
    /// Every class the registry knows, for loaders that rebuild nested
    /// user types.
    pub classes: &'a ClassTable,
}

impl NodeInfo<'_> {
    /// The class named by `type`, or [`LoaderError::MissingClass`].
    pub fn require_class(&self) -> LoaderResult<Class> {
        self.class
            .cloned()
            .ok_or_else(|| LoaderError::MissingClass(self.type_tag.to_string()))
    }
}

/// A stored child as presented to [`Accumulator::filter`].
#[derive(Clone, Debug)]
pub struct ChildNode {
    pub name: String,
    pub path: NodePath,
    pub kind: NodeKind,
    pub attrs: Attrs,
}

/// Builds a composite value from its materialized children.
///
/// The engine drives an accumulator through exactly this sequence:
/// `placeholder` once, `filter` once, then `append` once per yielded child
/// in yielded order, then `convert` once. A container whose node is a
/// dataset (a flattened sequence, say) receives `accept_dataset` instead of
/// `filter`/`append`.
pub trait Accumulator {
    /// Order and select the stored children. Default: store order.
    fn filter(&self, children: Vec<ChildNode>) -> LoaderResult<Vec<ChildNode>> {
        Ok(children)
    }

    /// A handle to the value under construction, published before any child
    /// is materialized so that children can refer back to it. `convert`
    /// must then return this same handle.
    fn placeholder(&self) -> Option<Value> {
        None
    }

    /// Receive one materialized child.
    fn append(&mut self, name: &str, value: Value, attrs: &Attrs) -> LoaderResult<()>;

    /// Receive the payload of a container stored as a single dataset.
    fn accept_dataset(&mut self, dataset: &Dataset) -> LoaderResult<()> {
        let _ = dataset;
        Err(LoaderError::Malformed(
            "container stored as a dataset is not supported by this loader".into(),
        ))
    }

    /// Produce the finished value.
    fn convert(self: Box<Self>) -> LoaderResult<Value>;
}
