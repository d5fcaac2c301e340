//! # Resources
//!
//! [`Resource`] drives a [`Loadable`] payload through the loading state
//! machine. The hooks of one resource never run concurrently, and a hook
//! sequence runs at most once per won transition.
//!
//! ## Transitions
//!
//! | call        | from                 | runs                                   | to        |
//! |-------------|----------------------|----------------------------------------|-----------|
//! | `prepare()` | unloaded             | `prepare`                              | prepared  |
//! | `load()`    | unloaded or prepared | (`prepare`) `pre_load` `load` `post_load` | loaded |
//! | `unload()`  | prepared             | `unprepare`                            | unloaded  |
//! | `unload()`  | loaded               | `pre_unload` `unload` `post_unload`    | unloaded  |
//!
//! A failed hook rolls the state back: to unloaded if nothing is staged,
//! to prepared if a prepare step succeeded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ResourceError, ResourceResult};
use crate::machine::StateMachine;
use crate::state::LoadingState;

/// Numeric handle for fast lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceHandle(pub u64);

/// Identity of a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceMeta {
    /// Numeric handle.
    pub handle: ResourceHandle,
    /// Unique name.
    pub name: String,
    /// Group the resource belongs to.
    pub group: String,
}

/// Payload hooks of a loadable resource.
///
/// Only [`load`](Loadable::load) and [`unload`](Loadable::unload) are
/// required. Fallible hooks report failure; the machine never retries.
pub trait Loadable: Send {
    /// Opens or stages raw data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be staged.
    fn prepare(&mut self) -> ResourceResult<()> {
        Ok(())
    }

    /// Drops data staged by [`prepare`](Loadable::prepare).
    fn unprepare(&mut self) {}

    /// Runs before [`load`](Loadable::load).
    fn pre_load(&mut self) {}

    /// Materializes the content.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be built.
    fn load(&mut self) -> ResourceResult<()>;

    /// Runs after a successful [`load`](Loadable::load).
    fn post_load(&mut self) {}

    /// Runs before [`unload`](Loadable::unload).
    fn pre_unload(&mut self) {}

    /// Releases the content.
    fn unload(&mut self);

    /// Runs after [`unload`](Loadable::unload).
    fn post_unload(&mut self) {}

    /// Bytes held once loaded. Defaults to the in-memory size of the payload.
    fn content_size(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

/// Observer of completed transitions.
pub trait ResourceListener: Send + Sync {
    /// A prepare step completed.
    fn preparing_complete(&self, _meta: &ResourceMeta) {}
    /// A load completed.
    fn loading_complete(&self, _meta: &ResourceMeta) {}
    /// An unload completed.
    fn unloading_complete(&self, _meta: &ResourceMeta) {}
}

#[derive(Clone, Copy)]
enum Completed {
    Preparing,
    Loading,
    Unloading,
}

/// A payload plus its loading state.
pub struct Resource<R> {
    meta: ResourceMeta,
    machine: StateMachine,
    content: Mutex<R>,
    size: AtomicUsize,
    listeners: Mutex<Vec<Arc<dyn ResourceListener>>>,
}

impl<R: Loadable> Resource<R> {
    /// Wraps `content` in the unloaded state.
    pub fn new(
        handle: ResourceHandle,
        name: impl Into<String>,
        group: impl Into<String>,
        content: R,
    ) -> Self {
        Self {
            meta: ResourceMeta {
                handle,
                name: name.into(),
                group: group.into(),
            },
            machine: StateMachine::new(),
            content: Mutex::new(content),
            size: AtomicUsize::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Handle, name and group.
    #[inline]
    #[must_use]
    pub fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    /// Numeric handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> ResourceHandle {
        self.meta.handle
    }

    /// Unique name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Group name.
    #[inline]
    #[must_use]
    pub fn group(&self) -> &str {
        &self.meta.group
    }

    /// Current loading state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LoadingState {
        self.machine.current()
    }

    /// Whether the resource is loaded.
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state() == LoadingState::Loaded
    }

    /// Size recorded by the last load, zero when not loaded.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// The underlying state machine, for waiting on states.
    #[inline]
    #[must_use]
    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Runs `f` with the payload locked.
    pub fn with_content<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&self.content.lock())
    }

    /// Runs `f` with the payload locked mutably.
    pub fn with_content_mut<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.content.lock())
    }

    /// Registers a listener. Adding the same listener twice has no effect.
    pub fn add_listener(&self, listener: Arc<dyn ResourceListener>) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Removes a listener.
    pub fn remove_listener(&self, listener: &Arc<dyn ResourceListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Stages the resource.
    ///
    /// Returns at once if the resource is already past preparation. If
    /// another thread is preparing, waits for it to finish and returns
    /// without checking its outcome.
    ///
    /// # Errors
    ///
    /// Returns the prepare hook's error; the state is back to unloaded.
    pub fn prepare(&self) -> ResourceResult<()> {
        let observed = self.machine.current();
        if observed != LoadingState::Unloaded && observed != LoadingState::Preparing {
            return Ok(());
        }
        if self
            .machine
            .try_transition(LoadingState::Unloaded, LoadingState::Preparing)
            .is_err()
        {
            self.machine.await_leave(LoadingState::Preparing);
            return Ok(());
        }

        let result = self.content.lock().prepare();
        match result {
            Ok(()) => {
                self.machine.set(LoadingState::Prepared);
                tracing::debug!("Resource '{}' prepared", self.meta.name);
                self.notify(Completed::Preparing);
                Ok(())
            }
            Err(err) => {
                self.machine.set(LoadingState::Unloaded);
                tracing::warn!("Resource '{}' failed to prepare: {}", self.meta.name, err);
                Err(err)
            }
        }
    }

    /// Loads the resource, preparing it first if needed.
    ///
    /// No-op when loaded or unloading. If another thread is loading, waits
    /// for it instead of loading again.
    ///
    /// # Errors
    ///
    /// Returns a hook error if this thread ran the load, or
    /// [`ResourceError::ConcurrentLoadFailed`] if the awaited load did not
    /// end loaded.
    pub fn load(&self) -> ResourceResult<()> {
        let mut observed = self.machine.current();
        let prior = loop {
            match observed {
                LoadingState::Loaded | LoadingState::Unloading => return Ok(()),
                LoadingState::Preparing => {
                    self.machine.await_leave(LoadingState::Preparing);
                    observed = self.machine.current();
                }
                LoadingState::Loading => {
                    let ended = self.machine.await_leave(LoadingState::Loading);
                    if ended == LoadingState::Loaded {
                        return Ok(());
                    }
                    return Err(ResourceError::ConcurrentLoadFailed {
                        name: self.meta.name.clone(),
                        state: ended,
                    });
                }
                LoadingState::Unloaded | LoadingState::Prepared => {
                    match self.machine.try_transition(observed, LoadingState::Loading) {
                        Ok(()) => break observed,
                        Err(actual) => observed = actual,
                    }
                }
            }
        };

        let mut content = self.content.lock();
        if prior == LoadingState::Unloaded {
            if let Err(err) = content.prepare() {
                drop(content);
                self.machine.set(LoadingState::Unloaded);
                tracing::warn!("Resource '{}' failed to prepare: {}", self.meta.name, err);
                return Err(err);
            }
        }
        content.pre_load();
        if let Err(err) = content.load() {
            drop(content);
            self.machine.set(LoadingState::Prepared);
            tracing::warn!("Resource '{}' failed to load: {}", self.meta.name, err);
            return Err(err);
        }
        content.post_load();
        let size = content.content_size();
        self.size.store(size, Ordering::Release);
        drop(content);

        self.machine.set(LoadingState::Loaded);
        tracing::debug!("Resource '{}' loaded ({} bytes)", self.meta.name, size);
        self.notify(Completed::Loading);
        Ok(())
    }

    /// Unloads a loaded or prepared resource. Any other state is a no-op,
    /// as is losing the race to another thread.
    pub fn unload(&self) {
        let prior = self.machine.current();
        if prior != LoadingState::Loaded && prior != LoadingState::Prepared {
            return;
        }
        if self
            .machine
            .try_transition(prior, LoadingState::Unloading)
            .is_err()
        {
            return;
        }

        let mut content = self.content.lock();
        if prior == LoadingState::Prepared {
            content.unprepare();
        } else {
            content.pre_unload();
            content.unload();
            content.post_unload();
        }
        self.size.store(0, Ordering::Release);
        drop(content);

        self.machine.set(LoadingState::Unloaded);
        tracing::debug!("Resource '{}' unloaded (was {})", self.meta.name, prior);
        self.notify(Completed::Unloading);
    }

    /// Unloads and loads again if currently loaded.
    ///
    /// # Errors
    ///
    /// Returns the error of the new load.
    pub fn reload(&self) -> ResourceResult<()> {
        if !self.is_loaded() {
            return Ok(());
        }
        self.unload();
        self.load()
    }

    fn notify(&self, completed: Completed) {
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            match completed {
                Completed::Preparing => listener.preparing_complete(&self.meta),
                Completed::Loading => listener.loading_complete(&self.meta),
                Completed::Unloading => listener.unloading_complete(&self.meta),
            }
        }
    }
}

impl<R> std::fmt::Debug for Resource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("meta", &self.meta)
            .field("state", &self.machine.current())
            .field("size", &self.size.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
