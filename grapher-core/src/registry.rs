//! Driver registry.
//!
//! The application registers the drivers it ships at startup; sessions only
//! ever read the registry to resolve a `load` name.

use crate::driver::{Driver, DriverHandle, OperationTable};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds fresh driver instances.
pub trait DriverFactory: Send + Sync {
    /// Name the factory is registered under.
    fn name(&self) -> &str;

    /// Constructs a new, independently owned driver.
    fn construct(&self) -> DriverHandle;
}

struct TypedFactory<D, F> {
    name: String,
    ctor: F,
    table: Arc<OperationTable<D>>,
}

impl<D, F> DriverFactory for TypedFactory<D, F>
where
    D: Driver,
    F: Fn() -> D + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(&self) -> DriverHandle {
        DriverHandle::new(self.name.clone(), (self.ctor)(), self.table.clone())
    }
}

/// Driver names mapped to their factories.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<String, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver type constructed with `Default`.
    pub fn register<D: Driver + Default>(&mut self, name: &str) -> &mut Self {
        self.register_with(name, D::default)
    }

    /// Registers a driver type with a custom constructor.
    ///
    /// The operation table is built here, once for the type.
    pub fn register_with<D, F>(&mut self, name: &str, ctor: F) -> &mut Self
    where
        D: Driver,
        F: Fn() -> D + Send + Sync + 'static,
    {
        let factory = TypedFactory {
            name: name.to_string(),
            ctor,
            table: Arc::new(D::operations()),
        };
        if self
            .factories
            .insert(name.to_string(), Arc::new(factory))
            .is_some()
        {
            tracing::warn!("Driver '{}' registered twice, keeping the latest", name);
        }
        self
    }

    /// Looks up a driver by name. Surrounding whitespace is ignored.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn DriverFactory>> {
        self.factories.get(name.trim()).cloned()
    }

    /// Returns registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}
