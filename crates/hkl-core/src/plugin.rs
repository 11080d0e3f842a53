//! Loader modules: bundles of loader entries contributed by a package.
//!
//! A module exposes two tables, the entries to register and the
//! `base_type` tags to exclude before registering them. Modules are either
//! installed eagerly ([`LoaderManager::install_module`]) or attached to a
//! package name ([`LoaderManager::attach_module`]) and installed the first
//! time a dump or load meets a class from that package.
//!
//! [`LoaderManager::install_module`]: crate::LoaderManager::install_module
//! [`LoaderManager::attach_module`]: crate::LoaderManager::attach_module

use crate::error::LoaderModuleError;
use crate::registry::LoaderEntry;

pub trait LoaderModule: Send + Sync {
    /// Name used in logs and for [`is_installed`](crate::LoaderManager::is_installed).
    fn name(&self) -> &str;

    /// Entries to register. Return
    /// [`LoaderModuleError::MissingDependency`] when an optional dependency
    /// is unavailable; the module is then skipped without error.
    fn class_register(&self) -> Result<Vec<LoaderEntry>, LoaderModuleError>;

    /// `base_type` tags whose existing loaders are removed first.
    fn exclude_register(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A loader module defined by fixed tables.
#[derive(Debug, Clone)]
pub struct StaticModule {
    name: String,
    entries: Vec<LoaderEntry>,
    excludes: Vec<String>,
    missing: Option<String>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            excludes: Vec::new(),
            missing: None,
        }
    }

    pub fn entry(mut self, entry: LoaderEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn exclude(mut self, base_type: impl Into<String>) -> Self {
        self.excludes.push(base_type.into());
        self
    }

    /// Report `dependency` as missing when the module is installed.
    pub fn unavailable(mut self, dependency: impl Into<String>) -> Self {
        self.missing = Some(dependency.into());
        self
    }
}

impl LoaderModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_register(&self) -> Result<Vec<LoaderEntry>, LoaderModuleError> {
        match &self.missing {
            Some(dep) => Err(LoaderModuleError::MissingDependency(dep.clone())),
            None => Ok(self.entries.clone()),
        }
    }

    fn exclude_register(&self) -> Vec<String> {
        self.excludes.clone()
    }
}
