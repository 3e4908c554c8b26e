use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

type Listener<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

/// Fan-out of values to any number of listeners.
///
/// Listeners are invoked synchronously, in the order they subscribed, on the thread that
/// calls [`Broadcast::send`]. A single broadcast therefore preserves the order of the values
/// sent through it.
pub struct Broadcast<T = ()>(Arc<Inner<T>>);

struct Inner<T> {
    listeners: RwLock<BTreeMap<usize, Listener<T>>>,
    next_id: AtomicUsize,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> Broadcast<T> {
    pub fn listener_count(&self) -> usize { self.0.listeners.read().map(|l| l.len()).unwrap_or_default() }
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast").field("listeners", &self.listener_count()).finish()
    }
}

impl<T: Clone + 'static> Default for Broadcast<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Clone + 'static> Broadcast<T> {
    pub fn new() -> Self { Self(Arc::new(Inner { listeners: RwLock::new(BTreeMap::new()), next_id: AtomicUsize::new(0) })) }

    /// Delivers `value` to every listener registered at the time of the call
    pub fn send(&self, value: T) {
        // snapshot so listeners can (un)subscribe while being called
        let listeners: Vec<Listener<T>> = match self.0.listeners.read() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };

        if let Some((last, rest)) = listeners.split_last() {
            for listener in rest {
                listener(value.clone());
            }
            last(value);
        }
    }

    /// Registers a listener. It stays registered until the returned guard is dropped.
    pub fn listen<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoListener<T> {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.0.listeners.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.insert(id, listener.into_listener());
        ListenerGuard { inner: Arc::downgrade(&self.0), id }
    }

}

/// Keeps a listener registered; unsubscribes on drop
#[must_use = "the listener is removed as soon as the guard is dropped"]
pub struct ListenerGuard<T = ()> {
    inner: Weak<Inner<T>>,
    id: usize,
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut listeners) = inner.listeners.write() {
                listeners.remove(&self.id);
            }
        }
    }
}

/// Anything that can receive broadcast values
pub trait IntoListener<T> {
    fn into_listener(self) -> Arc<dyn Fn(T) + Send + Sync + 'static>;
}

impl<F, T> IntoListener<T> for F
where F: Fn(T) + Send + Sync + 'static
{
    fn into_listener(self) -> Arc<dyn Fn(T) + Send + Sync + 'static> { Arc::new(self) }
}

impl<T> IntoListener<T> for Arc<dyn Fn(T) + Send + Sync + 'static> {
    fn into_listener(self) -> Arc<dyn Fn(T) + Send + Sync + 'static> { self }
}

#[cfg(feature = "tokio")]
impl<T: Send + 'static> IntoListener<T> for tokio::sync::mpsc::UnboundedSender<T> {
    fn into_listener(self) -> Arc<dyn Fn(T) + Send + Sync + 'static> {
        Arc::new(move |value| {
            // receiver gone means nobody is interested any more
            let _ = self.send(value);
        })
    }
}

impl<T: Send + 'static> IntoListener<T> for std::sync::mpsc::Sender<T> {
    fn into_listener(self) -> Arc<dyn Fn(T) + Send + Sync + 'static> {
        let sender = std::sync::Mutex::new(self);
        Arc::new(move |value| {
            if let Ok(sender) = sender.lock() {
                let _ = sender.send(value);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_delivery_order_and_unsubscribe() {
        let broadcast = Broadcast::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _first = {
            let seen = seen.clone();
            broadcast.listen(move |v: u32| seen.lock().unwrap().push(("first", v)))
        };
        let second = {
            let seen = seen.clone();
            broadcast.listen(move |v: u32| seen.lock().unwrap().push(("second", v)))
        };

        broadcast.send(1);
        drop(second);
        broadcast.send(2);

        assert_eq!(*seen.lock().unwrap(), [("first", 1), ("second", 1), ("first", 2)]);
        assert_eq!(broadcast.listener_count(), 1);
        assert_eq!(format!("{:?}", broadcast), "Broadcast { listeners: 1 }");
    }

    #[test]
    fn test_channel_listener() {
        let broadcast = Broadcast::new();
        let (tx, rx) = std::sync::mpsc::channel::<&'static str>();
        let _guard = broadcast.listen(tx);

        broadcast.send("a");
        broadcast.send("b");

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_reentrant_listen_during_send() {
        let broadcast = Broadcast::<()>::new();
        let counter = Arc::new(Mutex::new(0));

        let _guard = {
            let broadcast2 = broadcast.clone();
            let counter = counter.clone();
            broadcast.listen(move |_: ()| {
                *counter.lock().unwrap() += 1;
                // subscribing from inside a listener must not deadlock
                let _temp = broadcast2.listen(|_: ()| {});
            })
        };

        broadcast.send(());
        broadcast.send(());
        assert_eq!(*counter.lock().unwrap(), 2);
    }
}
