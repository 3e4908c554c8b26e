use std::sync::{Arc, RwLock};

use crate::{Broadcast, IntoListener, ListenerGuard};

struct Shared<T> {
    value: RwLock<T>,
    changed: Broadcast<T>,
}

/// Writable observable value. Intentionally has no subscription methods - use [`Mut::read`]
pub struct Mut<T> {
    shared: Arc<Shared<T>>,
}

/// Read-only view of a [`Mut`]
pub struct Read<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Read<T> {
    fn clone(&self) -> Self { Self { shared: self.shared.clone() } }
}

impl<T: Clone + Send + Sync + 'static> Mut<T> {
    pub fn new(value: T) -> Self { Self { shared: Arc::new(Shared { value: RwLock::new(value), changed: Broadcast::new() }) } }

    /// Replaces the value and notifies listeners
    pub fn set(&self, value: T) {
        let snapshot = {
            let mut current = self.shared.value.write().unwrap_or_else(|p| p.into_inner());
            *current = value;
            current.clone()
        };
        self.shared.changed.send(snapshot);
    }

    /// Replaces the value only if it differs, returning whether listeners were notified
    pub fn set_if_changed(&self, value: T) -> bool
    where T: PartialEq {
        let snapshot = {
            let mut current = self.shared.value.write().unwrap_or_else(|p| p.into_inner());
            if *current == value {
                return false;
            }
            *current = value;
            current.clone()
        };
        self.shared.changed.send(snapshot);
        true
    }

    /// Mutates the value in place and notifies listeners once afterwards
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let (result, snapshot) = {
            let mut current = self.shared.value.write().unwrap_or_else(|p| p.into_inner());
            let result = f(&mut current);
            (result, current.clone())
        };
        self.shared.changed.send(snapshot);
        result
    }

    /// Like [`Mut::update`], but listeners are only notified when `f` returns true
    pub fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let snapshot = {
            let mut current = self.shared.value.write().unwrap_or_else(|p| p.into_inner());
            if !f(&mut current) {
                return false;
            }
            current.clone()
        };
        self.shared.changed.send(snapshot);
        true
    }

    pub fn get(&self) -> T { self.with(T::clone) }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { self.shared.with(f) }

    pub fn read(&self) -> Read<T> { Read { shared: self.shared.clone() } }
}

impl<T> Shared<T> {
    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.value.read().unwrap_or_else(|p| p.into_inner());
        f(&guard)
    }
}

impl<T: Clone + Send + Sync + 'static> Read<T> {
    pub fn get(&self) -> T { self.with(T::clone) }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { self.shared.with(f) }

    /// Calls `listener` with every subsequent value
    pub fn subscribe<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoListener<T> {
        self.shared.changed.listen(listener)
    }

    /// Calls `listener` with the current value right away, then with every subsequent value
    pub fn subscribe_now<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoListener<T> {
        let listener = listener.into_listener();
        let guard = self.shared.changed.listen(listener.clone());
        listener(self.get());
        guard
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Read<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.shared.with(|v| f.debug_tuple("Read").field(v).finish()) }
}

impl<T: std::fmt::Display> std::fmt::Display for Read<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.shared.with(|v| write!(f, "{}", v)) }
}
