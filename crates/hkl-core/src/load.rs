//! The load engine.

use std::collections::HashSet;

use hkl_store::{Attrs, NodeKind, NodePath, NodeStore, StoreError};
use hkl_types::Value;
use tracing::{debug, warn};

use crate::accumulator::{ChildNode, NodeInfo};
use crate::config::LoadOptions;
use crate::dump::{
    ATTR_BASE_TYPE, ATTR_TARGET, ATTR_TYPE, ROOT_CLASS, ROOT_CUSTOM_LOADERS, ROOT_DATA,
    ROOT_VERSION,
};
use crate::error::{HklError, HklResult, LoaderError};
use crate::memo::{LoadMemo, NodeState};
use crate::registry::{LoaderManager, REFERENCE_BASE_TYPE};
use crate::version::{Compatibility, FormatVersion, FORMAT_CLASS};

/// Rebuilds values from a store, top-down.
pub struct Loader<'a> {
    manager: &'a LoaderManager,
    store: &'a dyn NodeStore,
    root: NodePath,
    memo: LoadMemo,
    custom_enabled: bool,
    compat: Compatibility,
}

impl<'a> Loader<'a> {
    pub fn new(
        manager: &'a LoaderManager,
        store: &'a dyn NodeStore,
        root: NodePath,
        custom_enabled: bool,
        compat: Compatibility,
    ) -> Self {
        Self {
            manager,
            store,
            root,
            memo: LoadMemo::new(),
            custom_enabled,
            compat,
        }
    }

    /// Rebuild the value stored at `path`. Each node is materialized once;
    /// asking again returns the same value.
    pub fn materialize(&mut self, path: &NodePath) -> HklResult<Value> {
        match self.memo.get(path) {
            Some(NodeState::Resolved(v)) => return Ok(v.clone()),
            Some(_) => {
                return Err(HklError::Reconstruction {
                    path: path.clone(),
                    type_name: String::new(),
                    source: LoaderError::Cycle(path.to_string()),
                })
            }
            None => {}
        }

        let kind = self
            .store
            .node_kind(path)?
            .ok_or_else(|| HklError::Store(StoreError::NotFound(path.clone())))?;
        let attrs = self.store.attrs(path)?;
        let base_type = attrs
            .get_str(ATTR_BASE_TYPE)
            .map(str::to_string)
            .ok_or_else(|| HklError::Reconstruction {
                path: path.clone(),
                type_name: attrs.get_str(ATTR_TYPE).unwrap_or_default().to_string(),
                source: LoaderError::Malformed("node has no base_type attribute".into()),
            })?;

        if base_type == REFERENCE_BASE_TYPE {
            return self.resolve_reference(path, &attrs);
        }

        let type_tag = match attrs.get_str(ATTR_TYPE) {
            Some(tag) => tag.to_string(),
            None => self.missing_type(path, &base_type),
        };
        let manager = self.manager;
        let class = manager.class(&type_tag);
        if class.is_none() {
            warn!(path = %path, type_tag = %type_tag, base_type = %base_type, "type not registered; decoding by base_type");
        }

        self.memo.set(path, NodeState::Dispatching);
        let entry = manager
            .resolve_decoder(&base_type, self.custom_enabled)
            .ok_or_else(|| HklError::UnknownLoader {
                path: path.clone(),
                base_type: base_type.clone(),
                type_tag: type_tag.clone(),
            })?;

        let recon_err = |source: LoaderError| HklError::Reconstruction {
            path: path.clone(),
            type_name: type_tag.clone(),
            source,
        };
        let info = NodeInfo {
            path,
            attrs: &attrs,
            base_type: &base_type,
            type_tag: &type_tag,
            class,
            classes: manager.classes(),
        };

        let value = if let Some(decoder) = &entry.decoder {
            if kind != NodeKind::Dataset {
                return Err(recon_err(LoaderError::Malformed(format!(
                    "{base_type} is stored as a dataset, found a group"
                ))));
            }
            let dataset = self
                .store
                .read_dataset(path)
                .map_err(|e| recon_err(e.into()))?;
            decoder(&dataset, &info).map_err(recon_err)?
        } else if let Some(factory) = &entry.container {
            let mut acc = factory(&info).map_err(recon_err)?;
            let placeholder = acc.placeholder();
            self.memo.set(
                path,
                match &placeholder {
                    Some(p) => NodeState::Placeholder(p.clone()),
                    None => NodeState::Accumulating,
                },
            );
            match kind {
                NodeKind::Dataset => {
                    let dataset = self
                        .store
                        .read_dataset(path)
                        .map_err(|e| recon_err(e.into()))?;
                    acc.accept_dataset(&dataset).map_err(recon_err)?;
                }
                NodeKind::Group => {
                    let children = self.child_nodes(path)?;
                    for child in acc.filter(children).map_err(recon_err)? {
                        let value = self.materialize(&child.path)?;
                        acc.append(&child.name, value, &child.attrs)
                            .map_err(recon_err)?;
                    }
                }
            }
            let value = acc.convert().map_err(recon_err)?;
            if let Some(p) = placeholder {
                if !value.is_same(&p) {
                    return Err(recon_err(LoaderError::Malformed(
                        "accumulator returned a different value than its placeholder".into(),
                    )));
                }
            }
            value
        } else {
            return Err(recon_err(LoaderError::Unsupported(
                "loader has neither a decoder nor a container".into(),
            )));
        };

        self.memo.set(path, NodeState::Resolved(value.clone()));
        debug!(path = %path, base_type = %base_type, "materialized node");
        Ok(value)
    }

    fn child_nodes(&self, path: &NodePath) -> HklResult<Vec<ChildNode>> {
        self.store
            .children(path)?
            .into_iter()
            .map(|name| {
                let child = path.join(&name)?;
                let kind = self
                    .store
                    .node_kind(&child)?
                    .ok_or_else(|| StoreError::NotFound(child.clone()))?;
                let attrs = self.store.attrs(&child)?;
                Ok(ChildNode {
                    name,
                    path: child,
                    kind,
                    attrs,
                })
            })
            .collect()
    }

    fn resolve_reference(&mut self, path: &NodePath, attrs: &Attrs) -> HklResult<Value> {
        let ref_err = |target: &str, reason: &str| HklError::Reference {
            path: path.clone(),
            target: target.to_string(),
            reason: reason.to_string(),
        };
        let raw = attrs
            .get_str(ATTR_TARGET)
            .ok_or_else(|| ref_err("", "missing target attribute"))?;
        let target = NodePath::parse(raw).map_err(|e| ref_err(raw, &e.to_string()))?;
        if target == self.root || !target.starts_with(&self.root) {
            return Err(ref_err(raw, "target lies outside the dumped tree"));
        }

        self.memo.set(path, NodeState::Dispatching);
        let value = match self.memo.get(&target) {
            Some(NodeState::Resolved(v)) | Some(NodeState::Placeholder(v)) => v.clone(),
            Some(NodeState::Dispatching) | Some(NodeState::Accumulating) => {
                return Err(ref_err(
                    raw,
                    "target is still being reconstructed and cannot be shared before it is complete",
                ))
            }
            None => {
                if !self.store.exists(&target)? {
                    return Err(ref_err(raw, "target does not exist"));
                }
                // Stored order may differ from dump order; build the target now.
                self.materialize(&target)?
            }
        };
        self.memo.set(path, NodeState::Resolved(value.clone()));
        debug!(path = %path, target = %target, "resolved reference");
        Ok(value)
    }

    /// `type` for a node that lacks it: the built-in class of its family.
    fn missing_type(&self, path: &NodePath, base_type: &str) -> String {
        if self.compat == Compatibility::Current {
            warn!(path = %path, base_type, "node has no type attribute");
        }
        let name = if base_type == "None" { "NoneType" } else { base_type };
        format!("builtins.{name}")
    }

    /// Number of nodes materialized so far.
    pub fn visited(&self) -> usize {
        self.memo.len()
    }
}

/// Load the value dumped under `options.path` using `manager`.
pub(crate) fn load_with(
    manager: &LoaderManager,
    store: &dyn NodeStore,
    options: &LoadOptions,
) -> HklResult<Value> {
    let root = NodePath::parse(&options.path)
        .map_err(|e| HklError::Configuration(format!("invalid load path: {e}")))?;
    let invalid = |reason: String| HklError::InvalidFile {
        path: root.clone(),
        reason,
    };
    if store.node_kind(&root)? != Some(NodeKind::Group) {
        return Err(invalid("no such group".into()));
    }
    let attrs = store.attrs(&root)?;
    match attrs.get_str(ROOT_CLASS) {
        Some(FORMAT_CLASS) => {}
        other => return Err(invalid(format!("CLASS attribute is {other:?}"))),
    }
    let raw_version = attrs
        .get_str(ROOT_VERSION)
        .ok_or_else(|| invalid("missing VERSION attribute".into()))?;
    let version = FormatVersion::parse(raw_version).map_err(|e| invalid(e.to_string()))?;
    let compat = version.check()?;
    if compat == Compatibility::Legacy {
        warn!(version = %version, "reading a file written by an older format version");
    }

    let custom_enabled =
        options.enable_custom_loaders || attrs.get_bool(ROOT_CUSTOM_LOADERS).unwrap_or(false);
    let data = root.join(ROOT_DATA)?;
    if !store.exists(&data)? {
        return Err(invalid("missing data node".into()));
    }

    let mut loader = Loader::new(manager, store, root.clone(), custom_enabled, compat);
    let value = loader.materialize(&data)?;
    debug!(root = %root, nodes = loader.visited(), "load complete");
    Ok(value)
}

/// Top-level packages named by `type` attributes beneath `root`.
pub(crate) fn stored_packages(store: &dyn NodeStore, root: &NodePath) -> HklResult<HashSet<String>> {
    let mut packages = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(path) = stack.pop() {
        if let Some(tag) = store.attrs(&path)?.get_str(ATTR_TYPE) {
            if let Some(pkg) = tag.split('.').next() {
                packages.insert(pkg.to_string());
            }
        }
        if store.node_kind(&path)? == Some(NodeKind::Group) {
            for name in store.children(&path)? {
                stack.push(path.join(&name)?);
            }
        }
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DumpOptions;
    use crate::dump::dump_with;
    use hkl_store::{AttrValue, Dataset, InMemoryNodeStore, StorageOptions};
    use hkl_types::List;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn roundtrip(value: &Value) -> HklResult<Value> {
        let m = LoaderManager::with_builtins();
        let mut store = InMemoryNodeStore::new();
        dump_with(&m, value, &mut store, &DumpOptions::default())?;
        load_with(&m, &store, &LoadOptions::default())
    }

    fn dumped(value: &Value) -> InMemoryNodeStore {
        let mut store = InMemoryNodeStore::new();
        dump_with(&LoaderManager::with_builtins(), value, &mut store, &DumpOptions::default())
            .unwrap();
        store
    }

    // -----------------------------------------------------------------------
    // Root checks
    // -----------------------------------------------------------------------

    #[test]
    fn future_major_version_rejected() {
        let mut store = dumped(&Value::Int(1));
        store
            .set_attr(&NodePath::root(), ROOT_VERSION, AttrValue::from("2.0"))
            .unwrap();
        let err = load_with(&LoaderManager::with_builtins(), &store, &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, HklError::Version { .. }));
    }

    #[test]
    fn foreign_group_rejected() {
        let store = InMemoryNodeStore::new();
        let err = load_with(&LoaderManager::with_builtins(), &store, &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, HklError::InvalidFile { .. }));
    }

    #[test]
    fn legacy_file_without_type_attrs_loads() {
        let mut store = InMemoryNodeStore::new();
        let root = NodePath::root();
        store
            .set_attrs(
                &root,
                Attrs::new().with(ROOT_CLASS, FORMAT_CLASS).with(ROOT_VERSION, "0.4"),
            )
            .unwrap();
        store
            .create_dataset(&p("/data"), &Dataset::scalar(7i64), &StorageOptions::default())
            .unwrap();
        store
            .set_attr(&p("/data"), ATTR_BASE_TYPE, "int".into())
            .unwrap();
        let value = load_with(&LoaderManager::with_builtins(), &store, &LoadOptions::default())
            .unwrap();
        assert_eq!(value, Value::Int(7));
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_base_type_is_fatal() {
        let mut store = dumped(&Value::list(vec![Value::Int(1), Value::from("a")]));
        store
            .set_attr(&p("/data/data1"), ATTR_BASE_TYPE, "mystery".into())
            .unwrap();
        let err = load_with(&LoaderManager::with_builtins(), &store, &LoadOptions::default())
            .unwrap_err();
        match err {
            HklError::UnknownLoader { path, base_type, .. } => {
                assert_eq!(path, p("/data/data1"));
                assert_eq!(base_type, "mystery");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unresolvable_type_uses_family() {
        let mut store = dumped(&Value::list(vec![Value::from("a"), Value::Int(2)]));
        store
            .set_attr(&p("/data"), ATTR_TYPE, "vanished.Sequence".into())
            .unwrap();
        let value = load_with(&LoaderManager::with_builtins(), &store, &LoadOptions::default())
            .unwrap();
        assert_eq!(value, Value::list(vec![Value::from("a"), Value::Int(2)]));
    }

    // -----------------------------------------------------------------------
    // References
    // -----------------------------------------------------------------------

    #[test]
    fn shared_value_loads_as_same_object() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let loaded = roundtrip(&Value::tuple(vec![a.clone(), a])).unwrap();
        let items = loaded.as_tuple().unwrap().items().to_vec();
        assert!(items[0].is_same(&items[1]));
        assert_eq!(items[0], Value::list(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn self_referencing_list_loads() {
        let list = List::new(vec![Value::Int(1)]);
        list.push(Value::List(list.clone()));
        let loaded = roundtrip(&Value::List(list.clone())).unwrap();
        let l = loaded.as_list().unwrap();
        assert_eq!(l.len(), 2);
        assert!(l.borrow()[1].is_same(&loaded));
        list.borrow_mut().clear();
        l.borrow_mut().clear();
    }

    #[test]
    fn cycle_through_tuple_is_reference_error() {
        let list = List::new(vec![]);
        let tuple = Value::tuple(vec![Value::List(list.clone())]);
        list.push(tuple.clone());
        let err = roundtrip(&tuple).unwrap_err();
        match err {
            HklError::Reference { path, target, .. } => {
                assert_eq!(path, p("/data/data0/data0"));
                assert_eq!(target, "/data");
            }
            other => panic!("unexpected error: {other}"),
        }
        list.borrow_mut().clear();
    }

    #[test]
    fn reference_outside_tree_rejected() {
        let mut store = dumped(&Value::list(vec![Value::list(vec![]), Value::from("x")]));
        store
            .set_attrs(
                &p("/data/data1"),
                Attrs::new()
                    .with(ATTR_BASE_TYPE, REFERENCE_BASE_TYPE)
                    .with(ATTR_TARGET, "/"),
            )
            .unwrap();
        let err = load_with(&LoaderManager::with_builtins(), &store, &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, HklError::Reference { .. }));
    }

    #[test]
    fn forward_reference_materializes_target() {
        // Hand-built tree whose reference precedes its target in store order.
        let m = LoaderManager::with_builtins();
        let store = dumped(&Value::list(vec![Value::from("a"), Value::list(vec![])]));
        let target = p("/data/data1");
        let early = p("/data/data0");
        let mut hacked = InMemoryNodeStore::new();
        hacked.set_attrs(&NodePath::root(), store.attrs(&NodePath::root()).unwrap()).unwrap();
        hacked.create_group(&p("/data")).unwrap();
        hacked.set_attrs(&p("/data"), store.attrs(&p("/data")).unwrap()).unwrap();
        hacked
            .create_dataset(&early, &Dataset::empty(), &StorageOptions::default())
            .unwrap();
        hacked
            .set_attrs(
                &early,
                Attrs::new()
                    .with(ATTR_TYPE, "builtins.list")
                    .with(ATTR_BASE_TYPE, REFERENCE_BASE_TYPE)
                    .with(ATTR_TARGET, target.as_str()),
            )
            .unwrap();
        hacked
            .create_dataset(&target, &store.read_dataset(&target).unwrap(), &StorageOptions::default())
            .unwrap();
        hacked.set_attrs(&target, store.attrs(&target).unwrap()).unwrap();

        let value = load_with(&m, &hacked, &LoadOptions::default()).unwrap();
        let items = value.as_list().unwrap().snapshot();
        assert!(items[0].is_same(&items[1]));
    }

    #[test]
    fn packages_found_in_store() {
        let store = dumped(&Value::list(vec![Value::Int(1), Value::from("s")]));
        let pkgs = stored_packages(&store, &NodePath::root()).unwrap();
        assert!(pkgs.contains("builtins"));
    }
}
