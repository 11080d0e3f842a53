//! What an encoder sees and what it hands back to the dump engine.

use hkl_store::{Attrs, Dataset, NodeKind, NodePath, NodeStore, StorageOptions};
use hkl_types::Value;

use crate::error::{LoaderError, LoaderResult};

/// The node an encoder must create: a fixed path in the store plus the
/// storage options in effect for it.
///
/// An encoder creates exactly one node, either a group or a dataset.
pub struct EncodeTarget<'a> {
    store: &'a mut dyn NodeStore,
    path: &'a NodePath,
    options: &'a StorageOptions,
    created: Option<NodeKind>,
}

impl<'a> EncodeTarget<'a> {
    pub(crate) fn new(
        store: &'a mut dyn NodeStore,
        path: &'a NodePath,
        options: &'a StorageOptions,
    ) -> Self {
        Self {
            store,
            path,
            options,
            created: None,
        }
    }

    pub fn path(&self) -> &NodePath {
        self.path
    }

    /// Storage options forwarded from the caller or the parent encoder.
    pub fn options(&self) -> &StorageOptions {
        self.options
    }

    /// Create the node as a group; children are written by the engine.
    pub fn create_group(&mut self) -> LoaderResult<()> {
        self.check_fresh()?;
        self.store.create_group(self.path)?;
        self.created = Some(NodeKind::Group);
        Ok(())
    }

    /// Create the node as a dataset using the forwarded storage options.
    pub fn create_dataset(&mut self, dataset: &Dataset) -> LoaderResult<()> {
        let options = self.options.clone();
        self.create_dataset_with(dataset, &options)
    }

    /// Create the node as an unfiltered dataset. Scalars go through here.
    pub fn create_scalar(&mut self, dataset: &Dataset) -> LoaderResult<()> {
        let options = self.options.without_filters();
        self.create_dataset_with(dataset, &options)
    }

    pub fn create_dataset_with(
        &mut self,
        dataset: &Dataset,
        options: &StorageOptions,
    ) -> LoaderResult<()> {
        self.check_fresh()?;
        self.store.create_dataset(self.path, dataset, options)?;
        self.created = Some(NodeKind::Dataset);
        Ok(())
    }

    pub(crate) fn created(&self) -> Option<NodeKind> {
        self.created
    }

    fn check_fresh(&self) -> LoaderResult<()> {
        if self.created.is_some() {
            return Err(LoaderError::Unsupported(format!(
                "encoder created more than one node at {}",
                self.path
            )));
        }
        Ok(())
    }
}

/// A child the engine should dump beneath the node an encoder created.
pub struct Child {
    pub name: String,
    pub value: Value,
    /// Merged onto the child's node after it is written.
    pub attrs: Attrs,
    /// Storage options for the child; `None` inherits the parent's.
    pub options: Option<StorageOptions>,
}

impl Child {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            attrs: Attrs::new(),
            options: None,
        }
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_options(mut self, options: StorageOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Lazily produced children of an encoded node.
pub type Children = Box<dyn Iterator<Item = Child>>;

/// Result of an encoder: attributes for the created node and its children.
pub struct Encoded {
    pub attrs: Attrs,
    pub children: Children,
}

impl Encoded {
    /// A leaf node: no extra attributes, no children.
    pub fn leaf() -> Self {
        Self {
            attrs: Attrs::new(),
            children: Box::new(std::iter::empty()),
        }
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_children(mut self, children: impl Iterator<Item = Child> + 'static) -> Self {
        self.children = Box::new(children);
        self
    }
}
