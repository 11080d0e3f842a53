use crate::attrs::{AttrValue, Attrs};
use crate::dataset::Dataset;
use crate::error::{StoreError, StoreResult};
use crate::options::StorageOptions;
use crate::path::NodePath;

/// What lives at a node path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Dataset,
}

/// Hierarchical store of groups and datasets, each carrying attributes.
///
/// All implementations must satisfy these invariants:
/// - The root group `/` always exists.
/// - A node is created under an existing group; sibling names are unique.
/// - `children` lists direct children in lexicographic name order, which is
///   not necessarily the order they were created in.
/// - Storage filters applied by `create_dataset` are reversed by
///   `read_dataset`; callers always see the original payload.
/// - A read-only store rejects every mutation with
///   [`StoreError::ReadOnly`].
pub trait NodeStore: Send + Sync {
    /// Create an empty group at `path`.
    fn create_group(&mut self, path: &NodePath) -> StoreResult<()>;

    /// Create a dataset at `path`, applying the filters in `options`.
    fn create_dataset(
        &mut self,
        path: &NodePath,
        dataset: &Dataset,
        options: &StorageOptions,
    ) -> StoreResult<()>;

    /// Read and unfilter the dataset at `path`.
    fn read_dataset(&self, path: &NodePath) -> StoreResult<Dataset>;

    /// Kind of the node at `path`, or `None` if nothing is there.
    fn node_kind(&self, path: &NodePath) -> StoreResult<Option<NodeKind>>;

    /// Names of the direct children of the group at `path`.
    fn children(&self, path: &NodePath) -> StoreResult<Vec<String>>;

    /// All attributes of the node at `path`.
    fn attrs(&self, path: &NodePath) -> StoreResult<Attrs>;

    /// Set (or replace) one attribute on the node at `path`.
    fn set_attr(&mut self, path: &NodePath, name: &str, value: AttrValue) -> StoreResult<()>;

    /// Whether mutations are rejected.
    fn is_read_only(&self) -> bool;

    /// Whether any node exists at `path`.
    fn exists(&self, path: &NodePath) -> StoreResult<bool> {
        Ok(self.node_kind(path)?.is_some())
    }

    /// Set several attributes at once.
    fn set_attrs(&mut self, path: &NodePath, attrs: Attrs) -> StoreResult<()> {
        for (name, value) in attrs {
            self.set_attr(path, &name, value)?;
        }
        Ok(())
    }

    /// Create `path` and any missing ancestors as groups.
    ///
    /// Fails with [`StoreError::NotAGroup`] if some prefix is a dataset.
    fn ensure_group(&mut self, path: &NodePath) -> StoreResult<()> {
        let mut current = NodePath::root();
        for component in path.components().map(str::to_string).collect::<Vec<_>>() {
            current = current.join(&component)?;
            match self.node_kind(&current)? {
                Some(NodeKind::Group) => {}
                Some(NodeKind::Dataset) => return Err(StoreError::NotAGroup(current)),
                None => self.create_group(&current)?,
            }
        }
        Ok(())
    }
}
