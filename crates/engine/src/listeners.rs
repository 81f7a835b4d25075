//! Listener registry with disposable subscriptions
//!
//! Dispatch iterates a snapshot of the registered callbacks, so a callback
//! may subscribe or unsubscribe (itself included) while it runs. Changes
//! take effect on the next dispatch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A list of callbacks notified with values of type `T`
pub struct Listeners<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback; dropping or disposing the returned
    /// [`Subscription`] removes it
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    lock(&registry).entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Notify every callback registered when dispatch starts
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = lock(&self.registry)
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &lock(&self.registry).entries.len())
            .finish()
    }
}

/// Handle that removes its callback when disposed or dropped
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the callback; calling this again does nothing
    pub fn dispose(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
