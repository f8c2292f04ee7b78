//! Subscriber-based notifications for setting and source changes.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle for a subscription that can be dropped to unsubscribe.
///
/// When the handle is dropped, the subscription is removed before `drop`
/// returns.
pub struct SubscriptionHandle {
    id: usize,
    registry: Weak<dyn Unsubscribe>,
}

impl SubscriptionHandle {
    /// Keep the subscription alive for the lifetime of the registry.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .finish()
    }
}

trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: usize);
}

/// Internal subscriber registry state.
struct SubscriberRegistryInner<E> {
    subscribers: Vec<(usize, Callback<E>)>,
    next_id: usize,
}

struct Shared<E> {
    inner: RwLock<SubscriberRegistryInner<E>>,
}

impl<E: 'static> Unsubscribe for Shared<E> {
    fn unsubscribe(&self, id: usize) {
        self.inner
            .write()
            .subscribers
            .retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Registry of callbacks that receive every emitted event in emission order.
///
/// # Examples
///
/// ```rust
/// use hotswap_verbosity::notify::SubscriberRegistry;
///
/// let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
///
/// let handle = registry.subscribe(|locator: &String| {
///     println!("{} changed", locator);
/// });
///
/// registry.notify(&"file:logging.yaml".to_string());
///
/// // Unsubscribe by dropping the handle
/// drop(handle);
/// assert_eq!(registry.subscriber_count(), 0);
/// ```
pub struct SubscriberRegistry<E> {
    shared: Arc<Shared<E>>,
}

impl<E: 'static> SubscriberRegistry<E> {
    /// Create a new subscriber registry.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: RwLock::new(SubscriberRegistryInner {
                    subscribers: Vec::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    /// Register `callback`. Returns a handle that unsubscribes on drop.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.shared.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(callback)));

        let shared: Arc<dyn Unsubscribe> = self.shared.clone();
        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&shared),
        }
    }

    /// Deliver `event` to every current subscriber, in subscription order.
    ///
    /// Callbacks run outside the registry lock, so a callback may subscribe
    /// or unsubscribe without deadlocking.
    pub fn notify(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .shared
            .inner
            .read()
            .subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.inner.read().subscribers.len()
    }
}

impl<E: 'static> Default for SubscriberRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for SubscriberRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
