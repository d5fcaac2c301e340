//! # Resource Manager
//!
//! Name-keyed registry of resources of one payload type, kept within a
//! memory budget. When a load pushes usage over budget, other loaded
//! resources are unloaded oldest first until usage fits.
//!
//! The registry lock is never held while a resource hook runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ResourceConfig;
use crate::error::{ResourceError, ResourceResult};
use crate::resource::{Loadable, Resource, ResourceHandle};

const UNBOUNDED: usize = usize::MAX;

struct Registry<R> {
    by_name: HashMap<String, Arc<Resource<R>>>,
    /// Names of loaded resources, oldest load first.
    load_order: VecDeque<String>,
}

/// Owns resources of payload type `R`.
pub struct ResourceManager<R> {
    registry: Mutex<Registry<R>>,
    budget: AtomicUsize,
    default_group: String,
    next_handle: AtomicU64,
}

impl<R: Loadable> ResourceManager<R> {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            registry: Mutex::new(Registry {
                by_name: HashMap::new(),
                load_order: VecDeque::new(),
            }),
            budget: AtomicUsize::new(config.memory_budget.unwrap_or(UNBOUNDED)),
            default_group: config.default_group.clone(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Sets the budget. `None` removes it. Does not unload anything until
    /// the next load.
    pub fn set_memory_budget(&self, bytes: Option<usize>) {
        self.budget
            .store(bytes.unwrap_or(UNBOUNDED), Ordering::Release);
    }

    /// Current budget.
    #[must_use]
    pub fn memory_budget(&self) -> Option<usize> {
        match self.budget.load(Ordering::Acquire) {
            UNBOUNDED => None,
            bytes => Some(bytes),
        }
    }

    /// Bytes held by all resources.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.registry
            .lock()
            .by_name
            .values()
            .map(|r| r.size())
            .sum()
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().by_name.len()
    }

    /// Whether no resource is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().by_name.is_empty()
    }

    /// Looks a resource up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Resource<R>>> {
        self.registry.lock().by_name.get(name).cloned()
    }

    /// Registers `content` under `name` in the default group.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateName`] if the name is taken.
    pub fn create(&self, name: &str, content: R) -> ResourceResult<Arc<Resource<R>>> {
        let group = self.default_group.clone();
        self.create_in_group(name, &group, content)
    }

    /// Registers `content` under `name` in `group`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateName`] if the name is taken.
    pub fn create_in_group(
        &self,
        name: &str,
        group: &str,
        content: R,
    ) -> ResourceResult<Arc<Resource<R>>> {
        let mut registry = self.registry.lock();
        if registry.by_name.contains_key(name) {
            return Err(ResourceError::DuplicateName(name.to_string()));
        }
        let handle = ResourceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let resource = Arc::new(Resource::new(handle, name, group, content));
        registry
            .by_name
            .insert(name.to_string(), Arc::clone(&resource));
        tracing::debug!("Resource '{}' created in group '{}'", name, group);
        Ok(resource)
    }

    /// Prepares the named resource.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] or the prepare error.
    pub fn prepare(&self, name: &str) -> ResourceResult<Arc<Resource<R>>> {
        let resource = self.lookup(name)?;
        resource.prepare()?;
        Ok(resource)
    }

    /// Loads the named resource, then unloads older resources while usage
    /// exceeds the budget.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] or the load error.
    pub fn load(&self, name: &str) -> ResourceResult<Arc<Resource<R>>> {
        let resource = self.lookup(name)?;
        resource.load()?;
        self.touch(name);
        self.enforce_budget(name);
        Ok(resource)
    }

    /// Unloads the named resource. Unknown names are ignored.
    pub fn unload(&self, name: &str) {
        let Some(resource) = self.get(name) else {
            return;
        };
        resource.unload();
        self.forget_order(name);
    }

    /// Unloads and loads the named resource again if it is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] or the load error.
    pub fn reload(&self, name: &str) -> ResourceResult<Arc<Resource<R>>> {
        let resource = self.lookup(name)?;
        if resource.is_loaded() {
            resource.unload();
            resource.load()?;
            self.touch(name);
            self.enforce_budget(name);
        }
        Ok(resource)
    }

    /// Unloads and unregisters the named resource, returning it.
    pub fn remove(&self, name: &str) -> Option<Arc<Resource<R>>> {
        let resource = {
            let mut registry = self.registry.lock();
            registry.load_order.retain(|n| n != name);
            registry.by_name.remove(name)
        }?;
        resource.unload();
        tracing::debug!("Resource '{}' removed", name);
        Some(resource)
    }

    /// Unloads and unregisters every resource.
    pub fn remove_all(&self) {
        let drained: Vec<_> = {
            let mut registry = self.registry.lock();
            registry.load_order.clear();
            registry.by_name.drain().map(|(_, r)| r).collect()
        };
        let count = drained.len();
        for resource in drained {
            resource.unload();
        }
        tracing::debug!("Removed {} resources", count);
    }

    fn lookup(&self, name: &str) -> ResourceResult<Arc<Resource<R>>> {
        self.get(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))
    }

    fn touch(&self, name: &str) {
        let mut registry = self.registry.lock();
        registry.load_order.retain(|n| n != name);
        registry.load_order.push_back(name.to_string());
    }

    fn forget_order(&self, name: &str) {
        self.registry.lock().load_order.retain(|n| n != name);
    }

    fn enforce_budget(&self, keep: &str) {
        let Some(budget) = self.memory_budget() else {
            return;
        };
        loop {
            let victim = {
                let mut registry = self.registry.lock();
                let usage: usize = registry.by_name.values().map(|r| r.size()).sum();
                if usage <= budget {
                    return;
                }
                let Some(index) = registry.load_order.iter().position(|n| n != keep) else {
                    tracing::warn!(
                        "Resource usage {} exceeds budget {} with nothing left to unload",
                        usage,
                        budget
                    );
                    return;
                };
                let name = registry.load_order.remove(index);
                name.and_then(|n| registry.by_name.get(&n).cloned())
            };
            if let Some(resource) = victim {
                tracing::debug!("Unloading '{}' to stay within budget", resource.name());
                resource.unload();
            }
        }
    }
}

impl<R> std::fmt::Debug for ResourceManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("ResourceManager")
            .field("resources", &registry.by_name.len())
            .field("loaded", &registry.load_order.len())
            .field("budget", &self.budget.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
