//! The dump engine.

use std::collections::HashSet;

use hkl_store::{Attrs, Dataset, NodePath, NodeStore, StorageOptions, StoreError};
use hkl_types::{Class, Value};
use tracing::{debug, warn};

use crate::config::DumpOptions;
use crate::encode::EncodeTarget;
use crate::error::{HklError, HklResult, LoaderError};
use crate::memo::DumpMemo;
use crate::registry::{LoaderManager, OPAQUE_BASE_TYPE, REFERENCE_BASE_TYPE};
use crate::version::{FORMAT_CLASS, FORMAT_VERSION};

pub const ATTR_TYPE: &str = "type";
pub const ATTR_BASE_TYPE: &str = "base_type";
pub const ATTR_TARGET: &str = "target";

pub const ROOT_CLASS: &str = "CLASS";
pub const ROOT_VERSION: &str = "VERSION";
pub const ROOT_CREATOR: &str = "HKL_CREATOR";
pub const ROOT_CUSTOM_LOADERS: &str = "CUSTOM_LOADERS";
pub const ROOT_CREATED: &str = "CREATED";

/// Name of the root child holding the dumped value.
pub const ROOT_DATA: &str = "data";

/// Walks a value graph and writes it into a store.
pub struct Dumper<'a> {
    manager: &'a LoaderManager,
    store: &'a mut dyn NodeStore,
    memo: DumpMemo,
    custom_enabled: bool,
}

impl<'a> Dumper<'a> {
    pub fn new(manager: &'a LoaderManager, store: &'a mut dyn NodeStore, custom_enabled: bool) -> Self {
        Self {
            manager,
            store,
            memo: DumpMemo::new(),
            custom_enabled,
        }
    }

    /// Write `value` at `path`, then its children beneath it. `extra` is
    /// merged over the attributes the encoder produced.
    pub fn emit(
        &mut self,
        value: &Value,
        path: &NodePath,
        options: &StorageOptions,
        extra: Attrs,
    ) -> HklResult<()> {
        let class = value.class();

        if let Some(target) = self.memo.lookup(value).cloned() {
            self.store
                .create_dataset(path, &Dataset::empty(), &StorageOptions::default())?;
            let mut attrs = Attrs::new()
                .with(ATTR_TYPE, class.qualname())
                .with(ATTR_BASE_TYPE, REFERENCE_BASE_TYPE)
                .with(ATTR_TARGET, target.as_str());
            attrs.extend(extra);
            self.store.set_attrs(path, attrs)?;
            debug!(path = %path, target = %target, "emitted reference");
            return Ok(());
        }

        let manager = self.manager;
        let entry = manager.resolve_value_encoder(value, self.custom_enabled);
        if entry.base_type == OPAQUE_BASE_TYPE {
            warn!(path = %path, class = %class, "no loader registered; storing opaque payload");
        }

        let dump_err = |source: LoaderError| HklError::Dump {
            path: path.clone(),
            type_name: class.qualname(),
            source,
        };

        let mut target = EncodeTarget::new(&mut *self.store, path, options);
        let encoded = (entry.encoder)(value, &mut target).map_err(dump_err)?;
        if target.created().is_none() {
            return Err(dump_err(LoaderError::Unsupported(
                "encoder did not create a node".into(),
            )));
        }

        if entry.memoizable {
            self.memo.record(value, path);
        }

        let mut attrs = Attrs::new()
            .with(ATTR_TYPE, class.qualname())
            .with(ATTR_BASE_TYPE, entry.base_type.as_str());
        attrs.extend(encoded.attrs);
        attrs.extend(extra);
        self.store.set_attrs(path, attrs)?;
        debug!(path = %path, class = %class, base_type = %entry.base_type, "emitted node");

        for child in encoded.children {
            let child_path = path
                .join(&child.name)
                .map_err(|e| dump_err(LoaderError::Store(e)))?;
            let child_options = child.options.unwrap_or_else(|| options.clone());
            self.emit(&child.value, &child_path, &child_options, child.attrs)?;
        }
        Ok(())
    }

    /// Number of distinct shared values written so far.
    pub fn tracked(&self) -> usize {
        self.memo.len()
    }
}

/// Dump `value` into the group `options.path` using `manager`.
pub(crate) fn dump_with(
    manager: &LoaderManager,
    value: &Value,
    store: &mut dyn NodeStore,
    options: &DumpOptions,
) -> HklResult<()> {
    let root = NodePath::parse(&options.path)
        .map_err(|e| HklError::Configuration(format!("invalid dump path: {e}")))?;
    if store.is_read_only() {
        return Err(HklError::Store(StoreError::ReadOnly));
    }
    store.ensure_group(&root)?;
    if !store.children(&root)?.is_empty() {
        return Err(HklError::Configuration(format!(
            "target group {root} is not empty"
        )));
    }

    let mut root_attrs = Attrs::new()
        .with(ROOT_CLASS, FORMAT_CLASS)
        .with(ROOT_VERSION, FORMAT_VERSION.to_string())
        .with(ROOT_CREATOR, format!("hkl-core/{}", env!("CARGO_PKG_VERSION")))
        .with(ROOT_CUSTOM_LOADERS, options.enable_custom_loaders);
    if options.track_times {
        root_attrs.insert(ROOT_CREATED, chrono::Utc::now().to_rfc3339());
    }
    store.set_attrs(&root, root_attrs)?;

    let data = root.join(ROOT_DATA)?;
    let mut dumper = Dumper::new(manager, store, options.enable_custom_loaders);
    dumper.emit(value, &data, &options.storage, Attrs::new())?;
    debug!(root = %root, tracked = dumper.tracked(), "dump complete");
    Ok(())
}

/// Every class reachable from `value`, ancestors included, each once.
pub(crate) fn value_classes(value: &Value) -> Vec<Class> {
    let mut classes = Vec::new();
    let mut seen = HashSet::new();
    let mut visited = HashSet::new();
    let mut stack = vec![value.clone()];
    while let Some(v) = stack.pop() {
        if let Some(id) = v.identity() {
            if !visited.insert(id) {
                continue;
            }
        }
        for class in v.class().mro() {
            if seen.insert(class.qualname()) {
                classes.push(class.clone());
            }
        }
        match &v {
            Value::List(l) => stack.extend(l.snapshot()),
            Value::Tuple(t) => stack.extend(t.items().iter().cloned()),
            Value::Dict(d) => stack.extend(d.snapshot().into_iter().map(|(_, v)| v)),
            Value::Object(o) => stack.extend(o.borrow().fields().iter().map(|(_, v)| v.clone())),
            _ => {}
        }
    }
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkl_store::{InMemoryNodeStore, NodeKind};
    use hkl_types::{Class, Instance, Key};

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn dump(value: &Value) -> InMemoryNodeStore {
        let mut store = InMemoryNodeStore::new();
        dump_with(&LoaderManager::with_builtins(), value, &mut store, &DumpOptions::default())
            .unwrap();
        store
    }

    #[test]
    fn root_metadata_written() {
        let store = dump(&Value::Int(5));
        let attrs = store.attrs(&NodePath::root()).unwrap();
        assert_eq!(attrs.get_str(ROOT_CLASS), Some("hkl"));
        assert_eq!(attrs.get_str(ROOT_VERSION), Some("1.0"));
        assert_eq!(attrs.get_bool(ROOT_CUSTOM_LOADERS), Some(false));
        assert!(attrs.get_str(ROOT_CREATOR).unwrap().starts_with("hkl-core/"));
        assert!(!attrs.contains(ROOT_CREATED));
    }

    #[test]
    fn track_times_records_creation() {
        let mut store = InMemoryNodeStore::new();
        let opts = DumpOptions::default().with_track_times(true);
        dump_with(&LoaderManager::with_builtins(), &Value::None, &mut store, &opts).unwrap();
        let created = store.attrs(&NodePath::root()).unwrap();
        let stamp = created.get_str(ROOT_CREATED).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn every_node_has_type_and_base_type() {
        let inner = Value::list(vec![Value::Int(1), Value::from("x")]);
        let store = dump(&Value::dict(vec![
            (Key::from("a"), inner.clone()),
            (Key::from("b"), inner),
        ]));
        for path in store.paths().into_iter().filter(|p| !p.is_root()) {
            let attrs = store.attrs(&path).unwrap();
            assert!(attrs.contains(ATTR_TYPE), "{path} lacks type");
            assert!(attrs.contains(ATTR_BASE_TYPE), "{path} lacks base_type");
        }
    }

    #[test]
    fn aliases_become_references() {
        let a = Value::list(vec![Value::Int(1), Value::from("two")]);
        let store = dump(&Value::tuple(vec![a.clone(), a]));
        let second = store.attrs(&p("/data/data1")).unwrap();
        assert_eq!(second.get_str(ATTR_BASE_TYPE), Some(REFERENCE_BASE_TYPE));
        assert_eq!(second.get_str(ATTR_TARGET), Some("/data/data0"));
        assert_eq!(second.get_str(ATTR_TYPE), Some("builtins.list"));
        assert_eq!(store.node_kind(&p("/data/data1")).unwrap(), Some(NodeKind::Dataset));
    }

    #[test]
    fn scalars_are_never_references() {
        let store = dump(&Value::list(vec![Value::from("s"), Value::from("s"), Value::None]));
        for name in ["data0", "data1"] {
            let attrs = store.attrs(&p(&format!("/data/{name}"))).unwrap();
            assert_eq!(attrs.get_str(ATTR_BASE_TYPE), Some("str"));
        }
    }

    #[test]
    fn non_empty_target_rejected() {
        let mut store = InMemoryNodeStore::new();
        let m = LoaderManager::with_builtins();
        dump_with(&m, &Value::Int(1), &mut store, &DumpOptions::default()).unwrap();
        let err = dump_with(&m, &Value::Int(2), &mut store, &DumpOptions::default()).unwrap_err();
        assert!(matches!(err, HklError::Configuration(_)));
        // A different group in the same store is fine.
        dump_with(&m, &Value::Int(2), &mut store, &DumpOptions::default().at("/second/run"))
            .unwrap();
        assert_eq!(
            store.attrs(&p("/second/run")).unwrap().get_str(ROOT_CLASS),
            Some("hkl")
        );
    }

    #[test]
    fn encoder_failure_names_path_and_type() {
        let mut store = InMemoryNodeStore::new();
        let m = LoaderManager::with_builtins();
        let node = Class::new("graph", "Node", &[]).unwrap();
        let cyclic = Value::object(Instance::new(node));
        cyclic.expect_object().unwrap().borrow_mut().set("me", cyclic.clone());
        let value = Value::list(vec![Value::Int(1), Value::from("x"), cyclic.clone()]);
        let err = dump_with(&m, &value, &mut store, &DumpOptions::default()).unwrap_err();
        match err {
            HklError::Dump { path, type_name, .. } => {
                assert_eq!(path.as_str(), "/data/data2");
                assert_eq!(type_name, "graph.Node");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nodes written before the failure are kept.
        assert!(store.exists(&p("/data/data0")).unwrap());
        cyclic.expect_object().unwrap().borrow_mut().set("me", Value::None);
    }

    #[test]
    fn classes_of_nested_values() {
        let point = Class::new("geometry.shapes", "Point", &[]).unwrap();
        let item = Value::object(Instance::new(point));
        let value = Value::list(vec![item.clone(), item]);
        let names: Vec<String> = value_classes(&value).iter().map(Class::qualname).collect();
        assert!(names.contains(&"geometry.shapes.Point".to_string()));
        assert!(names.contains(&"builtins.list".to_string()));
        assert!(names.contains(&"builtins.object".to_string()));
        let points = names.iter().filter(|n| n.ends_with("Point")).count();
        assert_eq!(points, 1);
    }
}
