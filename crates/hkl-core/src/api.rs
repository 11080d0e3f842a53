//! Entry points: free functions over the process-wide registry and
//! [`Engine`], which owns its own.

use std::path::Path;

use hkl_store::{FileNodeStore, NodePath, NodeStore, OpenMode};
use hkl_types::{Class, Value};
use tracing::{debug, info};

use crate::config::{DumpOptions, LoadOptions};
use crate::dump::{dump_with, value_classes};
use crate::error::{HklError, HklResult};
use crate::load::{load_with, stored_packages};
use crate::plugin::LoaderModule;
use crate::registry::{read_global, write_global, LoaderEntry, LoaderManager};

/// True when dumping `classes` would register a class or install a module.
fn needs_preparation(manager: &LoaderManager, classes: &[Class]) -> bool {
    classes.iter().any(|class| {
        manager.class(&class.qualname()).is_none() || manager.is_pending(class.package())
    })
}

/// Register the classes reachable from a value being dumped, so the same
/// registry can rebuild them on load, and install modules waiting on
/// their packages.
fn prepare_for_dump(manager: &mut LoaderManager, classes: &[Class]) -> HklResult<()> {
    for class in classes {
        if manager.class(&class.qualname()).is_none() {
            debug!(class = %class.qualname(), "registering class seen during dump");
            manager.register_class(class.clone());
        }
        manager.activate_package(class.package())?;
    }
    Ok(())
}

/// Install modules waiting on any package named in the stored tree.
fn activate_for_store(
    manager: &mut LoaderManager,
    store: &dyn NodeStore,
    options: &LoadOptions,
) -> HklResult<()> {
    if !manager.has_pending_modules() {
        return Ok(());
    }
    // An unusable path is reported by the load itself.
    let Ok(root) = NodePath::parse(&options.path) else {
        return Ok(());
    };
    if !store.exists(&root)? {
        return Ok(());
    }
    for package in stored_packages(store, &root)? {
        manager.activate_package(&package)?;
    }
    Ok(())
}

fn open_for_dump(path: &Path, mode: OpenMode) -> HklResult<FileNodeStore> {
    if mode == OpenMode::Read {
        return Err(HklError::Configuration(format!(
            "cannot dump to {} opened read-only",
            path.display()
        )));
    }
    Ok(FileNodeStore::open(path, mode)?)
}

/// Dump `value` into `store` using the process-wide registry.
pub fn dump(value: &Value, store: &mut dyn NodeStore, options: &DumpOptions) -> HklResult<()> {
    let classes = value_classes(value);
    let needed = needs_preparation(&read_global(), &classes);
    if needed {
        prepare_for_dump(&mut write_global(), &classes)?;
    }
    dump_with(&read_global(), value, store, options)
}

/// Load the value stored in `store` using the process-wide registry.
pub fn load(store: &dyn NodeStore, options: &LoadOptions) -> HklResult<Value> {
    if read_global().has_pending_modules() {
        activate_for_store(&mut write_global(), store, options)?;
    }
    load_with(&read_global(), store, options)
}

/// Dump `value` into the container file at `path`.
///
/// `mode` must be [`OpenMode::Write`] (replace the file) or
/// [`OpenMode::Append`] (add a dump under `options.path` of an existing
/// file).
pub fn dump_to_path(
    value: &Value,
    path: impl AsRef<Path>,
    mode: OpenMode,
    options: &DumpOptions,
) -> HklResult<()> {
    let path = path.as_ref();
    let mut file = open_for_dump(path, mode)?;
    dump(value, &mut file, options)?;
    file.close()?;
    info!(path = %path.display(), "dumped value to file");
    Ok(())
}

/// Load the value stored in the container file at `path`.
pub fn load_from_path(path: impl AsRef<Path>, options: &LoadOptions) -> HklResult<Value> {
    let file = FileNodeStore::open(path, OpenMode::Read)?;
    load(&file, options)
}

/// A dump/load engine with a private loader registry.
///
/// Registrations on an engine never affect the process-wide registry or
/// other engines.
#[derive(Debug, Default)]
pub struct Engine {
    manager: LoaderManager,
}

impl Engine {
    /// An engine with the built-in loaders.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manager(manager: LoaderManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &LoaderManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut LoaderManager {
        &mut self.manager
    }

    pub fn register(&mut self, entry: LoaderEntry) -> HklResult<()> {
        self.manager.register(entry)
    }

    pub fn attach_module(&mut self, package: impl Into<String>, module: Box<dyn LoaderModule>) {
        self.manager.attach_module(package, module);
    }

    pub fn dump(
        &mut self,
        value: &Value,
        store: &mut dyn NodeStore,
        options: &DumpOptions,
    ) -> HklResult<()> {
        prepare_for_dump(&mut self.manager, &value_classes(value))?;
        dump_with(&self.manager, value, store, options)
    }

    pub fn load(&mut self, store: &dyn NodeStore, options: &LoadOptions) -> HklResult<Value> {
        activate_for_store(&mut self.manager, store, options)?;
        load_with(&self.manager, store, options)
    }

    pub fn dump_to_path(
        &mut self,
        value: &Value,
        path: impl AsRef<Path>,
        mode: OpenMode,
        options: &DumpOptions,
    ) -> HklResult<()> {
        let path = path.as_ref();
        let mut file = open_for_dump(path, mode)?;
        self.dump(value, &mut file, options)?;
        file.close()?;
        info!(path = %path.display(), "dumped value to file");
        Ok(())
    }

    pub fn load_from_path(
        &mut self,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> HklResult<Value> {
        let file = FileNodeStore::open(path, OpenMode::Read)?;
        self.load(&file, options)
    }
}
