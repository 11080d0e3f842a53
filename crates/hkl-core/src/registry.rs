//! The loader registry.
//!
//! A [`LoaderManager`] maps runtime classes to encoders and stored
//! `base_type` tags to decoders or accumulator factories. Encoder lookup
//! walks the value's method resolution order, so a loader registered for a
//! base class also handles its subclasses. Values whose class has no
//! registered ancestor fall back to the opaque encoder.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hkl_store::Dataset;
use hkl_types::{Class, Value};
use tracing::{debug, warn};

use crate::accumulator::{Accumulator, NodeInfo};
use crate::encode::{EncodeTarget, Encoded};
use crate::error::{HklError, HklResult, LoaderModuleError, LoaderResult};
use crate::plugin::LoaderModule;

/// `base_type` of back-reference nodes. Owned by the engine.
pub const REFERENCE_BASE_TYPE: &str = "reference";

/// `base_type` of the opaque fallback encoding.
pub const OPAQUE_BASE_TYPE: &str = "opaque";

pub type Encoder =
    Arc<dyn Fn(&Value, &mut EncodeTarget<'_>) -> LoaderResult<Encoded> + Send + Sync>;

pub type Decoder = Arc<dyn Fn(&Dataset, &NodeInfo<'_>) -> LoaderResult<Value> + Send + Sync>;

pub type ContainerFactory =
    Arc<dyn Fn(&NodeInfo<'_>) -> LoaderResult<Box<dyn Accumulator>> + Send + Sync>;

/// Whether a loader is always active or only when custom loaders are
/// enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationMode {
    Always,
    Custom,
}

/// One row of the registry.
///
/// Exactly one of `decoder` (leaf families) and `container` (composite
/// families) must be set; [`LoaderManager::register`] rejects anything else.
#[derive(Clone)]
pub struct LoaderEntry {
    pub class: Class,
    pub base_type: String,
    pub encoder: Encoder,
    pub decoder: Option<Decoder>,
    pub container: Option<ContainerFactory>,
    /// Whether values handled by this entry take part in reference tracking.
    pub memoizable: bool,
    pub mode: ActivationMode,
}

impl LoaderEntry {
    /// A leaf loader: the value is one dataset.
    pub fn leaf<E, D>(class: Class, base_type: impl Into<String>, encoder: E, decoder: D) -> Self
    where
        E: Fn(&Value, &mut EncodeTarget<'_>) -> LoaderResult<Encoded> + Send + Sync + 'static,
        D: Fn(&Dataset, &NodeInfo<'_>) -> LoaderResult<Value> + Send + Sync + 'static,
    {
        Self {
            class,
            base_type: base_type.into(),
            encoder: Arc::new(encoder),
            decoder: Some(Arc::new(decoder)),
            container: None,
            memoizable: true,
            mode: ActivationMode::Always,
        }
    }

    /// A composite loader: the value is rebuilt by an [`Accumulator`].
    pub fn container<E, F>(
        class: Class,
        base_type: impl Into<String>,
        encoder: E,
        factory: F,
    ) -> Self
    where
        E: Fn(&Value, &mut EncodeTarget<'_>) -> LoaderResult<Encoded> + Send + Sync + 'static,
        F: Fn(&NodeInfo<'_>) -> LoaderResult<Box<dyn Accumulator>> + Send + Sync + 'static,
    {
        Self {
            class,
            base_type: base_type.into(),
            encoder: Arc::new(encoder),
            decoder: None,
            container: Some(Arc::new(factory)),
            memoizable: true,
            mode: ActivationMode::Always,
        }
    }

    pub fn memoizable(mut self, memoizable: bool) -> Self {
        self.memoizable = memoizable;
        self
    }

    /// Mark the entry opt-in.
    pub fn custom(mut self) -> Self {
        self.mode = ActivationMode::Custom;
        self
    }

    pub fn is_container(&self) -> bool {
        self.container.is_some()
    }

    /// Whether the entry may be used with custom loaders `enabled` or not.
    pub fn is_active(&self, custom_enabled: bool) -> bool {
        self.mode == ActivationMode::Always || custom_enabled
    }
}

impl fmt::Debug for LoaderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderEntry")
            .field("class", &self.class)
            .field("base_type", &self.base_type)
            .field("container", &self.is_container())
            .field("memoizable", &self.memoizable)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Classes known by qualified name, used to resolve stored `type` tags.
#[derive(Clone, Debug, Default)]
pub struct ClassTable(HashMap<String, Class>);

impl ClassTable {
    /// A table holding the built-in classes.
    pub fn with_builtins() -> Self {
        let mut table = Self::default();
        for class in Class::all_builtins() {
            table.insert(class);
        }
        table
    }

    /// Add `class` and all of its ancestors.
    pub fn insert(&mut self, class: Class) {
        for c in class.mro() {
            self.0.entry(c.qualname()).or_insert(c);
        }
    }

    pub fn get(&self, qualname: &str) -> Option<&Class> {
        self.0.get(qualname)
    }

    pub fn contains(&self, qualname: &str) -> bool {
        self.0.contains_key(qualname)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Registry of loaders, classes and pending loader modules.
pub struct LoaderManager {
    entries: Vec<LoaderEntry>,
    by_class: HashMap<Class, usize>,
    /// First registered entry per tag owns the decoder.
    by_tag: HashMap<String, usize>,
    classes: ClassTable,
    fallback: LoaderEntry,
    /// Modules waiting for a class of their package to show up.
    pending: HashMap<String, Vec<Box<dyn LoaderModule>>>,
    installed: HashSet<String>,
}

impl LoaderManager {
    /// A registry with no loaders except the opaque fallback.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            by_class: HashMap::new(),
            by_tag: HashMap::new(),
            classes: ClassTable::with_builtins(),
            fallback: crate::opaque::fallback_entry(),
            pending: HashMap::new(),
            installed: HashSet::new(),
        }
    }

    /// A registry holding every built-in loader.
    pub fn with_builtins() -> Self {
        let mut manager = Self::empty();
        for entry in crate::loaders::builtin_entries() {
            if let Err(e) = manager.register(entry) {
                warn!(error = %e, "skipping invalid built-in loader");
            }
        }
        manager
    }

    /// Insert `entry`, replacing any entry for the same class in place.
    pub fn register(&mut self, entry: LoaderEntry) -> HklResult<()> {
        match (&entry.decoder, &entry.container) {
            (Some(_), Some(_)) => {
                return Err(HklError::Configuration(format!(
                    "loader for {} sets both a decoder and a container",
                    entry.class
                )))
            }
            (None, None) => {
                return Err(HklError::Configuration(format!(
                    "loader for {} sets neither a decoder nor a container",
                    entry.class
                )))
            }
            _ => {}
        }
        if entry.base_type.is_empty() {
            return Err(HklError::Configuration(format!(
                "loader for {} has an empty base_type",
                entry.class
            )));
        }
        if is_reserved(&entry.base_type) {
            return Err(HklError::Configuration(format!(
                "base_type {:?} is reserved",
                entry.base_type
            )));
        }

        debug!(class = %entry.class, base_type = %entry.base_type, mode = ?entry.mode, "registered loader");
        self.classes.insert(entry.class.clone());
        match self.by_class.get(&entry.class) {
            Some(&idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
        self.reindex();
        Ok(())
    }

    /// Make `class` resolvable from stored `type` tags without giving it a
    /// loader. Needed for classes that only appear inside opaque payloads.
    pub fn register_class(&mut self, class: Class) {
        self.classes.insert(class);
    }

    /// Remove every entry stored under `base_type`. Returns how many were
    /// removed.
    pub fn exclude(&mut self, base_type: &str) -> HklResult<usize> {
        if is_reserved(base_type) {
            return Err(HklError::Configuration(format!(
                "base_type {base_type:?} is owned by the engine and cannot be excluded"
            )));
        }
        let before = self.entries.len();
        self.entries.retain(|e| e.base_type != base_type);
        self.reindex();
        let removed = before - self.entries.len();
        debug!(base_type, removed, "excluded loaders");
        Ok(removed)
    }

    /// Apply a loader module now: exclusions first, then registrations.
    ///
    /// Returns `false` if the module reported a missing dependency, in which
    /// case nothing was changed.
    pub fn install_module(&mut self, module: &dyn LoaderModule) -> HklResult<bool> {
        let entries = match module.class_register() {
            Ok(entries) => entries,
            Err(LoaderModuleError::MissingDependency(dep)) => {
                warn!(module = module.name(), dependency = %dep, "loader module unavailable; skipping");
                return Ok(false);
            }
            Err(e) => {
                return Err(HklError::Configuration(format!(
                    "loader module {} failed: {e}",
                    module.name()
                )))
            }
        };
        for tag in module.exclude_register() {
            self.exclude(&tag)?;
        }
        for entry in entries {
            self.register(entry)?;
        }
        self.installed.insert(module.name().to_string());
        debug!(module = module.name(), "installed loader module");
        Ok(true)
    }

    /// Defer `module` until a class whose top-level package is `package`
    /// is first encountered by a dump or load.
    pub fn attach_module(&mut self, package: impl Into<String>, module: Box<dyn LoaderModule>) {
        self.pending.entry(package.into()).or_default().push(module);
    }

    pub fn has_pending_modules(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether modules are waiting on `package`.
    pub fn is_pending(&self, package: &str) -> bool {
        self.pending.contains_key(package)
    }

    /// Install every module attached to `package`.
    pub fn activate_package(&mut self, package: &str) -> HklResult<()> {
        let Some(modules) = self.pending.remove(package) else {
            return Ok(());
        };
        debug!(package, count = modules.len(), "activating loader modules");
        for module in modules {
            self.install_module(module.as_ref())?;
        }
        Ok(())
    }

    /// Whether a module with this name has been installed.
    pub fn is_installed(&self, module: &str) -> bool {
        self.installed.contains(module)
    }

    /// Most specific active entry for `class`: exact match first, then the
    /// nearest ancestor in method resolution order, else the opaque
    /// fallback.
    pub fn resolve_encoder(&self, class: &Class, custom_enabled: bool) -> &LoaderEntry {
        self.resolve_in_mro(class, custom_enabled, false)
    }

    /// Encoder for `value` itself. Instances of user classes never resolve
    /// to a built-in container or scalar loader, since those only accept
    /// their native representation; they land on the `object` loader or
    /// the opaque fallback instead.
    pub fn resolve_value_encoder(&self, value: &Value, custom_enabled: bool) -> &LoaderEntry {
        let instance = matches!(value, Value::Object(_));
        self.resolve_in_mro(&value.class(), custom_enabled, instance)
    }

    fn resolve_in_mro(&self, class: &Class, custom_enabled: bool, instance: bool) -> &LoaderEntry {
        let object = Class::object();
        class
            .mro()
            .iter()
            .filter(|c| !(instance && c.is_builtin() && **c != object))
            .filter_map(|c| self.by_class.get(c))
            .map(|&idx| &self.entries[idx])
            .find(|entry| entry.is_active(custom_enabled))
            .unwrap_or(&self.fallback)
    }

    /// Entry that decodes nodes stored under `base_type`, if any is active.
    pub fn resolve_decoder(&self, base_type: &str, custom_enabled: bool) -> Option<&LoaderEntry> {
        if base_type == OPAQUE_BASE_TYPE {
            return Some(&self.fallback);
        }
        self.by_tag
            .get(base_type)
            .map(|&idx| &self.entries[idx])
            .filter(|entry| entry.is_active(custom_enabled))
    }

    /// Entry registered for exactly `class`.
    pub fn entry_for(&self, class: &Class) -> Option<&LoaderEntry> {
        self.by_class.get(class).map(|&idx| &self.entries[idx])
    }

    pub fn entries(&self) -> impl Iterator<Item = &LoaderEntry> {
        self.entries.iter()
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn class(&self, qualname: &str) -> Option<&Class> {
        self.classes.get(qualname)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn reindex(&mut self) {
        self.by_class.clear();
        self.by_tag.clear();
        for (idx, entry) in self.entries.iter().enumerate() {
            self.by_class.insert(entry.class.clone(), idx);
            self.by_tag.entry(entry.base_type.clone()).or_insert(idx);
        }
    }
}

fn is_reserved(base_type: &str) -> bool {
    base_type == REFERENCE_BASE_TYPE || base_type == OPAQUE_BASE_TYPE
}

impl Default for LoaderManager {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for LoaderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderManager")
            .field("entry_count", &self.entries.len())
            .field("class_count", &self.classes.len())
            .field("pending_packages", &self.pending.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Process-wide registry
// ---------------------------------------------------------------------------

/// The registry used by the free [`dump`](fn@crate::dump) and
/// [`load`](fn@crate::load) functions, populated with the built-in loaders on
/// first use.
pub fn global() -> &'static RwLock<LoaderManager> {
    static GLOBAL: OnceLock<RwLock<LoaderManager>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(LoaderManager::with_builtins()))
}

pub(crate) fn read_global() -> RwLockReadGuard<'static, LoaderManager> {
    global().read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_global() -> RwLockWriteGuard<'static, LoaderManager> {
    global().write().unwrap_or_else(PoisonError::into_inner)
}

/// Register a loader in the process-wide registry.
pub fn register(entry: LoaderEntry) -> HklResult<()> {
    write_global().register(entry)
}

/// Make a class known to the process-wide registry.
pub fn register_class(class: Class) {
    write_global().register_class(class);
}

/// Install a loader module into the process-wide registry.
pub fn install_module(module: &dyn LoaderModule) -> HklResult<bool> {
    write_global().install_module(module)
}

/// Attach a lazily activated loader module to the process-wide registry.
pub fn attach_module(package: impl Into<String>, module: Box<dyn LoaderModule>) {
    write_global().attach_module(package, module);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Accumulator;
    use crate::plugin::StaticModule;
    use hkl_store::Attrs;
    use hkl_types::Instance;

    fn point_class() -> Class {
        Class::new("geometry", "Point", &[]).unwrap()
    }

    fn dummy_leaf(class: Class, tag: &str) -> LoaderEntry {
        LoaderEntry::leaf(
            class,
            tag,
            |_, target| {
                target.create_scalar(&Dataset::empty())?;
                Ok(Encoded::leaf())
            },
            |_, _| Ok(Value::None),
        )
    }

    struct Nothing;

    impl Accumulator for Nothing {
        fn append(&mut self, _: &str, _: Value, _: &Attrs) -> LoaderResult<()> {
            Ok(())
        }

        fn convert(self: Box<Self>) -> LoaderResult<Value> {
            Ok(Value::None)
        }
    }

    fn nothing_factory(_: &NodeInfo<'_>) -> LoaderResult<Box<dyn Accumulator>> {
        Ok(Box::new(Nothing))
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    #[test]
    fn builtins_cover_core_types() {
        let m = LoaderManager::with_builtins();
        for class in [
            Class::int_type(),
            Class::str_type(),
            Class::list_type(),
            Class::dict_type(),
            Class::ndarray_type(),
        ] {
            assert_eq!(m.resolve_encoder(&class, false).class, class);
        }
    }

    #[test]
    fn both_or_neither_is_configuration_error() {
        let mut m = LoaderManager::empty();
        let mut both = dummy_leaf(point_class(), "point");
        both.container = Some(Arc::new(nothing_factory));
        assert!(matches!(m.register(both), Err(HklError::Configuration(_))));

        let mut neither = dummy_leaf(point_class(), "point");
        neither.decoder = None;
        assert!(matches!(m.register(neither), Err(HklError::Configuration(_))));
    }

    #[test]
    fn reserved_tags_rejected() {
        let mut m = LoaderManager::empty();
        assert!(m.register(dummy_leaf(point_class(), "reference")).is_err());
        assert!(m.register(dummy_leaf(point_class(), "opaque")).is_err());
        assert!(m.exclude("reference").is_err());
    }

    #[test]
    fn register_replaces_same_class() {
        let mut m = LoaderManager::empty();
        m.register(dummy_leaf(point_class(), "a")).unwrap();
        m.register(dummy_leaf(point_class(), "b")).unwrap();
        assert_eq!(m.len(), 1);
        assert!(m.resolve_decoder("a", false).is_none());
        assert!(m.resolve_decoder("b", false).is_some());
    }

    #[test]
    fn first_registered_owns_shared_tag() {
        let mut m = LoaderManager::empty();
        let a = Class::new("m", "A", &[]).unwrap();
        let b = Class::new("m", "B", &[]).unwrap();
        m.register(dummy_leaf(a.clone(), "shared")).unwrap();
        m.register(dummy_leaf(b, "shared")).unwrap();
        assert_eq!(m.resolve_decoder("shared", false).unwrap().class, a);
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    #[test]
    fn subclass_resolves_to_nearest_ancestor() {
        let m = LoaderManager::with_builtins();
        let my_list = Class::new("app", "MyList", &[Class::list_type()]).unwrap();
        assert_eq!(m.resolve_encoder(&my_list, false).base_type, "list");
        // bool has its own loader even though it derives from int.
        assert_eq!(m.resolve_encoder(&Class::bool_type(), false).base_type, "bool");
    }

    #[test]
    fn instance_of_builtin_subclass_skips_builtin_loaders() {
        let m = LoaderManager::with_builtins();
        let my_list = Class::new("app", "MyList", &[Class::list_type()]).unwrap();
        let value = Value::object(Instance::new(my_list));
        assert_eq!(m.resolve_value_encoder(&value, false).base_type, OPAQUE_BASE_TYPE);
        assert_eq!(m.resolve_value_encoder(&value, true).base_type, "object");
        // Native values still resolve through their own class.
        let list = Value::list(vec![Value::Int(1)]);
        assert_eq!(m.resolve_value_encoder(&list, false).base_type, "list");
        assert_eq!(m.resolve_value_encoder(&Value::Bool(true), false).base_type, "bool");
    }

    #[test]
    fn instance_resolves_to_user_ancestor_loader() {
        let mut m = LoaderManager::with_builtins();
        m.register(dummy_leaf(point_class(), "point")).unwrap();
        let labelled = Class::new("geometry", "LabelledPoint", &[point_class()]).unwrap();
        let value = Value::object(Instance::new(labelled));
        assert_eq!(m.resolve_value_encoder(&value, false).base_type, "point");
    }

    #[test]
    fn unknown_class_falls_back_to_opaque() {
        let m = LoaderManager::with_builtins();
        assert_eq!(m.resolve_encoder(&point_class(), false).base_type, OPAQUE_BASE_TYPE);
        assert!(m.resolve_decoder(OPAQUE_BASE_TYPE, false).is_some());
    }

    #[test]
    fn custom_entries_need_opt_in() {
        let mut m = LoaderManager::empty();
        m.register(dummy_leaf(point_class(), "point").custom()).unwrap();
        assert_eq!(m.resolve_encoder(&point_class(), false).base_type, OPAQUE_BASE_TYPE);
        assert_eq!(m.resolve_encoder(&point_class(), true).base_type, "point");
        assert!(m.resolve_decoder("point", false).is_none());
        assert!(m.resolve_decoder("point", true).is_some());
    }

    #[test]
    fn exclude_removes_family() {
        let mut m = LoaderManager::with_builtins();
        assert_eq!(m.exclude("set").unwrap(), 1);
        assert!(m.resolve_decoder("set", false).is_none());
        assert_eq!(m.resolve_encoder(&Class::set_type(), false).base_type, OPAQUE_BASE_TYPE);
        // Other families keep resolving after reindexing.
        assert_eq!(m.resolve_encoder(&Class::dict_type(), false).base_type, "dict");
    }

    #[test]
    fn registering_makes_class_resolvable() {
        let mut m = LoaderManager::empty();
        assert!(m.class("geometry.Point").is_none());
        m.register(dummy_leaf(point_class(), "point")).unwrap();
        assert_eq!(m.class("geometry.Point"), Some(&point_class()));
    }

    // -----------------------------------------------------------------------
    // Modules
    // -----------------------------------------------------------------------

    #[test]
    fn module_excludes_then_registers() {
        let mut m = LoaderManager::with_builtins();
        let module = StaticModule::new("geometry_loaders")
            .exclude("set")
            .entry(dummy_leaf(point_class(), "point"));
        assert!(m.install_module(&module).unwrap());
        assert!(m.resolve_decoder("set", false).is_none());
        assert!(m.resolve_decoder("point", false).is_some());
        assert!(m.is_installed("geometry_loaders"));
    }

    #[test]
    fn missing_dependency_is_swallowed() {
        let mut m = LoaderManager::with_builtins();
        let before = m.len();
        let module = StaticModule::new("needs_lapack")
            .entry(dummy_leaf(point_class(), "point"))
            .unavailable("lapack");
        assert!(!m.install_module(&module).unwrap());
        assert_eq!(m.len(), before);
        assert!(!m.is_installed("needs_lapack"));
    }

    #[test]
    fn attached_module_waits_for_activation() {
        let mut m = LoaderManager::with_builtins();
        m.attach_module(
            "geometry",
            Box::new(StaticModule::new("geo").entry(dummy_leaf(point_class(), "point"))),
        );
        assert!(m.is_pending("geometry"));
        assert!(m.resolve_decoder("point", false).is_none());
        m.activate_package("geometry").unwrap();
        assert!(!m.has_pending_modules());
        assert!(m.resolve_decoder("point", false).is_some());
        // Activating again is a no-op.
        m.activate_package("geometry").unwrap();
    }
}
