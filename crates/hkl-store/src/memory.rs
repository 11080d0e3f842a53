use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::attrs::{AttrValue, Attrs};
use crate::dataset::{DType, Dataset};
use crate::error::{StoreError, StoreResult};
use crate::filter::FilteredPayload;
use crate::options::StorageOptions;
use crate::path::NodePath;
use crate::traits::{NodeKind, NodeStore};

/// Body of a stored node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) enum NodeBody {
    Group(BTreeSet<String>),
    Dataset {
        dtype: DType,
        shape: Vec<usize>,
        payload: FilteredPayload,
    },
}

/// One node of the tree, as persisted by the container file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct NodeRecord {
    pub(crate) attrs: Attrs,
    pub(crate) body: NodeBody,
}

impl NodeRecord {
    fn group() -> Self {
        Self {
            attrs: Attrs::new(),
            body: NodeBody::Group(BTreeSet::new()),
        }
    }

    fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Group(_) => NodeKind::Group,
            NodeBody::Dataset { .. } => NodeKind::Dataset,
        }
    }
}

/// In-memory node tree.
///
/// Intended for tests and as the working copy behind
/// [`FileNodeStore`](crate::FileNodeStore). Nodes are kept in a map keyed by
/// absolute path; groups record their child names in sorted order.
pub struct InMemoryNodeStore {
    nodes: BTreeMap<NodePath, NodeRecord>,
    read_only: bool,
}

impl InMemoryNodeStore {
    /// Create a store holding only the root group.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodePath::root(), NodeRecord::group());
        Self {
            nodes,
            read_only: false,
        }
    }

    /// Rebuild a store from persisted records. The root must be a group.
    pub(crate) fn from_records(records: Vec<(NodePath, NodeRecord)>) -> StoreResult<Self> {
        let nodes: BTreeMap<_, _> = records.into_iter().collect();
        match nodes.get(&NodePath::root()) {
            Some(record) if record.kind() == NodeKind::Group => {}
            _ => return Err(StoreError::InvalidContainer("missing root group".into())),
        }
        for path in nodes.keys() {
            if let Some(parent) = path.parent() {
                let linked = matches!(
                    nodes.get(&parent).map(|r| &r.body),
                    Some(NodeBody::Group(children)) if children.contains(path.name())
                );
                if !linked {
                    return Err(StoreError::InvalidContainer(format!(
                        "node {path} is not linked from its parent"
                    )));
                }
            }
        }
        Ok(Self {
            nodes,
            read_only: false,
        })
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = (&NodePath, &NodeRecord)> {
        self.nodes.iter()
    }

    /// Reject all further mutations.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if only the root group exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Every node path, sorted.
    pub fn paths(&self) -> Vec<NodePath> {
        self.nodes.keys().cloned().collect()
    }

    /// Payload bytes held after filtering, across all datasets.
    pub fn stored_bytes(&self) -> usize {
        self.nodes
            .values()
            .map(|r| match &r.body {
                NodeBody::Dataset { payload, .. } => payload.stored_len(),
                NodeBody::Group(_) => 0,
            })
            .sum()
    }

    fn record(&self, path: &NodePath) -> StoreResult<&NodeRecord> {
        self.nodes
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Link `path` into its parent group, failing on duplicates.
    fn link(&mut self, path: &NodePath) -> StoreResult<()> {
        let parent = path.parent().ok_or_else(|| StoreError::AlreadyExists(path.clone()))?;
        if self.nodes.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.clone()));
        }
        match self.nodes.get_mut(&parent) {
            Some(NodeRecord {
                body: NodeBody::Group(children),
                ..
            }) => {
                children.insert(path.name().to_string());
                Ok(())
            }
            Some(_) => Err(StoreError::NotAGroup(parent)),
            None => Err(StoreError::NotFound(parent)),
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_payload_for_test(&mut self, path: &NodePath) {
        if let Some(NodeRecord {
            body: NodeBody::Dataset { payload, .. },
            ..
        }) = self.nodes.get_mut(path)
        {
            payload.corrupt_for_test();
        }
    }
}

impl Default for InMemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for InMemoryNodeStore {
    fn create_group(&mut self, path: &NodePath) -> StoreResult<()> {
        self.check_writable()?;
        self.link(path)?;
        self.nodes.insert(path.clone(), NodeRecord::group());
        Ok(())
    }

    fn create_dataset(
        &mut self,
        path: &NodePath,
        dataset: &Dataset,
        options: &StorageOptions,
    ) -> StoreResult<()> {
        self.check_writable()?;
        dataset.validate()?;
        let payload = FilteredPayload::encode(dataset.bytes(), options)?;
        self.link(path)?;
        self.nodes.insert(
            path.clone(),
            NodeRecord {
                attrs: Attrs::new(),
                body: NodeBody::Dataset {
                    dtype: dataset.dtype(),
                    shape: dataset.shape().to_vec(),
                    payload,
                },
            },
        );
        Ok(())
    }

    fn read_dataset(&self, path: &NodePath) -> StoreResult<Dataset> {
        match &self.record(path)?.body {
            NodeBody::Dataset {
                dtype,
                shape,
                payload,
            } => Dataset::new(*dtype, shape.clone(), payload.decode(path)?),
            NodeBody::Group(_) => Err(StoreError::NotADataset(path.clone())),
        }
    }

    fn node_kind(&self, path: &NodePath) -> StoreResult<Option<NodeKind>> {
        Ok(self.nodes.get(path).map(NodeRecord::kind))
    }

    fn children(&self, path: &NodePath) -> StoreResult<Vec<String>> {
        match &self.record(path)?.body {
            NodeBody::Group(children) => Ok(children.iter().cloned().collect()),
            NodeBody::Dataset { .. } => Err(StoreError::NotAGroup(path.clone())),
        }
    }

    fn attrs(&self, path: &NodePath) -> StoreResult<Attrs> {
        Ok(self.record(path)?.attrs.clone())
    }

    fn set_attr(&mut self, path: &NodePath, name: &str, value: AttrValue) -> StoreResult<()> {
        self.check_writable()?;
        let record = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        record.attrs.insert(name, value);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl std::fmt::Debug for InMemoryNodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNodeStore")
            .field("node_count", &self.nodes.len())
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    #[test]
    fn new_store_has_root() {
        let store = InMemoryNodeStore::new();
        assert!(store.is_empty());
        assert_eq!(store.node_kind(&NodePath::root()).unwrap(), Some(NodeKind::Group));
        assert!(store.children(&NodePath::root()).unwrap().is_empty());
    }

    #[test]
    fn children_are_lexicographic() {
        let mut store = InMemoryNodeStore::new();
        for name in ["data10", "data2", "data1", "b"] {
            store.create_group(&p(&format!("/{name}"))).unwrap();
        }
        assert_eq!(
            store.children(&NodePath::root()).unwrap(),
            vec!["b", "data1", "data10", "data2"]
        );
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut store = InMemoryNodeStore::new();
        store.create_group(&p("/a")).unwrap();
        assert!(matches!(
            store.create_dataset(&p("/a"), &Dataset::empty(), &StorageOptions::default()),
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.create_group(&NodePath::root()),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn parent_must_be_existing_group() {
        let mut store = InMemoryNodeStore::new();
        assert!(matches!(
            store.create_group(&p("/missing/child")),
            Err(StoreError::NotFound(_))
        ));
        store
            .create_dataset(&p("/leaf"), &Dataset::scalar(1i64), &StorageOptions::default())
            .unwrap();
        assert!(matches!(
            store.create_group(&p("/leaf/child")),
            Err(StoreError::NotAGroup(_))
        ));
    }

    #[test]
    fn ensure_group_creates_ancestors() {
        let mut store = InMemoryNodeStore::new();
        store.ensure_group(&p("/a/b/c")).unwrap();
        assert_eq!(store.node_kind(&p("/a/b")).unwrap(), Some(NodeKind::Group));
        // Idempotent.
        store.ensure_group(&p("/a/b/c")).unwrap();
        assert_eq!(store.len(), 4);
    }

    // -----------------------------------------------------------------------
    // Datasets and attributes
    // -----------------------------------------------------------------------

    #[test]
    fn dataset_roundtrip_with_filters() {
        let mut store = InMemoryNodeStore::new();
        let values: Vec<f64> = (0..1000).map(|i| (i % 10) as f64).collect();
        let ds = Dataset::from_slice(&values);
        let opts = StorageOptions::zstd(3).with_checksum(true).with_chunk_len(512);
        store.create_dataset(&p("/arr"), &ds, &opts).unwrap();
        assert!(store.stored_bytes() < values.len() * 8);
        assert_eq!(store.read_dataset(&p("/arr")).unwrap(), ds);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut store = InMemoryNodeStore::new();
        let opts = StorageOptions::default().with_checksum(true);
        store
            .create_dataset(&p("/x"), &Dataset::utf8("hello"), &opts)
            .unwrap();
        store.corrupt_payload_for_test(&p("/x"));
        assert!(matches!(
            store.read_dataset(&p("/x")),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn attrs_set_and_read() {
        let mut store = InMemoryNodeStore::new();
        store.create_group(&p("/g")).unwrap();
        store.set_attr(&p("/g"), "type", "builtins.list".into()).unwrap();
        store
            .set_attrs(&p("/g"), Attrs::new().with("length", 2i64))
            .unwrap();
        let attrs = store.attrs(&p("/g")).unwrap();
        assert_eq!(attrs.get_str("type"), Some("builtins.list"));
        assert_eq!(attrs.get_int("length"), Some(2));
        assert!(store.set_attr(&p("/nope"), "a", 1i64.into()).is_err());
    }

    #[test]
    fn wrong_kind_errors() {
        let mut store = InMemoryNodeStore::new();
        store.create_group(&p("/g")).unwrap();
        assert!(matches!(store.read_dataset(&p("/g")), Err(StoreError::NotADataset(_))));
        assert!(matches!(store.read_dataset(&p("/none")), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn read_only_rejects_writes() {
        let mut store = InMemoryNodeStore::new();
        store.set_read_only(true);
        assert!(store.is_read_only());
        assert!(matches!(store.create_group(&p("/g")), Err(StoreError::ReadOnly)));
        assert!(matches!(
            store.set_attr(&NodePath::root(), "a", true.into()),
            Err(StoreError::ReadOnly)
        ));
    }
}
