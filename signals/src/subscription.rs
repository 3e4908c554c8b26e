use crate::ListenerGuard;

/// Type-erased [`ListenerGuard`], for APIs whose listeners observe different payload types
#[must_use = "the subscription ends as soon as the guard is dropped"]
pub struct SubscriptionGuard {
    _guard: Box<dyn std::any::Any + Send + Sync>,
}

impl SubscriptionGuard {
    pub fn new<T: 'static>(guard: ListenerGuard<T>) -> Self { Self { _guard: Box::new(guard) } }
}

impl<T: 'static> From<ListenerGuard<T>> for SubscriptionGuard {
    fn from(guard: ListenerGuard<T>) -> Self { Self::new(guard) }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("SubscriptionGuard") }
}
