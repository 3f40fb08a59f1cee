//! Event broadcasting for task observers.
//!
//! An [`EventBroadcaster`] dispatches a value synchronously, on the emitting thread,
//! to every registered handler in registration order. Registering a handler yields a
//! [`Subscription`] that removes it again; a subscription only holds a weak link to
//! its broadcaster, so it never keeps the broadcaster alive and can be released
//! safely after the broadcaster is gone.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

struct HandlerRegistry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// Removal side of a handler registry, independent of the event type.
trait Unsubscribe: Send + Sync {
    fn remove(&self, id: u64);
}

impl<T> Unsubscribe for Mutex<HandlerRegistry<T>> {
    fn remove(&self, id: u64) {
        self.lock().handlers.retain(|(handler_id, _)| *handler_id != id);
    }
}

/// Synchronous one-to-many event dispatcher.
///
/// Every handler registered with [`add_handler`](Self::add_handler) is called by
/// [`emit`](Self::emit) on the emitting thread. Handlers run against a snapshot of the
/// registry taken when the emit starts; handlers added or removed meanwhile only
/// affect later emits. A panicking handler is not caught and unwinds into the
/// caller of `emit`.
///
/// # Examples
///
/// ```rust
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// use cancellable_task::EventBroadcaster;
///
/// let radio = EventBroadcaster::<u32>::new();
/// let total = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&total);
/// let subscription = radio.add_handler(move |value| {
///     counter.fetch_add(*value as usize, Ordering::SeqCst);
/// });
///
/// radio.emit(&3);
/// subscription.unsubscribe();
/// radio.emit(&3);
///
/// assert_eq!(total.load(Ordering::SeqCst), 3);
/// assert!(!radio.is_subscribed());
/// ```
pub struct EventBroadcaster<T> {
    registry: Arc<Mutex<HandlerRegistry<T>>>,
}

impl<T: 'static> EventBroadcaster<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HandlerRegistry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a handler. Registering the same callable twice yields two
    /// independent subscriptions, each called on every emit.
    pub fn add_handler<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));
        drop(registry);

        let weak: Weak<Mutex<HandlerRegistry<T>>> = Arc::downgrade(&self.registry);
        let registry: Weak<dyn Unsubscribe> = weak;
        Subscription {
            registry: Mutex::new(Some(registry)),
            id,
        }
    }

    /// Call every currently registered handler with `value`, in registration order.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = self
            .registry
            .lock()
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in snapshot {
            handler(value);
        }
    }

    /// `true` if at least one handler is registered.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        !self.registry.lock().handlers.is_empty()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().handlers.len()
    }
}

impl<T: 'static> Default for EventBroadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventBroadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.registry.lock().handlers.len())
            .finish()
    }
}

/// Handle to one registered handler.
///
/// Dropping a `Subscription` leaves the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) or convert it into a [`SubscriptionGuard`] to
/// tie the registration to a scope.
pub struct Subscription {
    registry: Mutex<Option<Weak<dyn Unsubscribe>>>,
    id: u64,
}

impl Subscription {
    /// Remove the handler from its broadcaster.
    ///
    /// Idempotent: later calls, and calls after the broadcaster was dropped, do nothing.
    pub fn unsubscribe(&self) {
        let registry = self.registry.lock().take();
        if let Some(registry) = registry.and_then(|weak| weak.upgrade()) {
            registry.remove(self.id);
        }
    }

    /// `true` until [`unsubscribe`](Self::unsubscribe) is called or the broadcaster is dropped.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .lock()
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Scope the subscription: the returned guard unsubscribes when dropped,
    /// including during unwinding and early returns.
    ///
    /// ```rust
    /// use cancellable_task::EventBroadcaster;
    ///
    /// let radio = EventBroadcaster::<String>::new();
    /// {
    ///     let _guard = radio.add_handler(|message| println!("{message}")).guard();
    ///     assert!(radio.is_subscribed());
    /// }
    /// assert!(!radio.is_subscribed());
    /// ```
    #[must_use = "the handler is removed as soon as the guard is dropped"]
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard { subscription: self }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Scoped [`Subscription`] that unsubscribes on drop.
#[derive(Debug)]
pub struct SubscriptionGuard {
    subscription: Subscription,
}

impl std::ops::Deref for SubscriptionGuard {
    type Target = Subscription;

    fn deref(&self) -> &Self::Target {
        &self.subscription
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    struct EventTester {
        call_count: Arc<AtomicUsize>,
        radio: EventBroadcaster<i32>,
    }

    impl EventTester {
        fn new() -> Self {
            Self {
                call_count: Arc::new(AtomicUsize::new(0)),
                radio: EventBroadcaster::new(),
            }
        }

        /// Handler adding `weight` to the call count whenever 3 is emitted.
        fn add_weighted(&self, weight: usize) -> Subscription {
            let count = Arc::clone(&self.call_count);
            self.radio.add_handler(move |param| {
                if *param == 3 {
                    count.fetch_add(weight, Ordering::SeqCst);
                }
            })
        }

        fn take_count(&self) -> usize {
            self.call_count.swap(0, Ordering::SeqCst)
        }
    }

    #[test]
    fn test_add_subscription() {
        let tester = EventTester::new();
        tester.add_weighted(1);
        tester.add_weighted(2);
        tester.radio.emit(&3);
        assert_eq!(tester.take_count(), 3);
    }

    #[test]
    fn test_remove_subscription() {
        let tester = EventTester::new();
        let s1 = tester.add_weighted(1);
        let s2 = tester.add_weighted(2);
        tester.radio.emit(&3);
        assert_eq!(tester.take_count(), 3);

        let s3 = tester.add_weighted(3);
        assert_eq!(tester.radio.subscriber_count(), 3);

        s2.unsubscribe();
        tester.radio.emit(&3);
        assert_eq!(tester.take_count(), 4);

        let s2 = tester.add_weighted(2);
        s1.unsubscribe();
        s3.unsubscribe();
        tester.radio.emit(&3);
        assert_eq!(tester.take_count(), 2);

        drop(tester);
        s2.unsubscribe();
        assert!(!s2.is_active());
    }

    #[test]
    fn test_unsubscribe_twice() {
        let tester = EventTester::new();
        let first = tester.add_weighted(1);
        let _second = tester.add_weighted(1);

        first.unsubscribe();
        first.unsubscribe();

        assert_eq!(tester.radio.subscriber_count(), 1);
        tester.radio.emit(&3);
        assert_eq!(tester.take_count(), 1);
    }

    #[test]
    fn test_same_callable_counts_separately() {
        let radio = EventBroadcaster::<i32>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = {
            let count = Arc::clone(&count);
            move |_: &i32| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };

        let _a = radio.add_handler(handler.clone());
        let b = radio.add_handler(handler);
        radio.emit(&0);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        b.unsubscribe();
        radio.emit(&0);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_dispatch_order() {
        let radio = EventBroadcaster::<&'static str>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            radio.add_handler(move |value| seen.lock().push(format!("{tag}:{value}")));
        }

        radio.emit(&"ping");

        assert_eq!(
            *seen.lock(),
            vec!["first:ping", "second:ping", "third:ping"]
        );
    }

    #[test]
    fn test_handler_added_during_emit_waits_for_next_emit() {
        let radio = Arc::new(EventBroadcaster::<i32>::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let inner_radio = Arc::clone(&radio);
        let inner_calls = Arc::clone(&late_calls);
        let registrar = radio.add_handler(move |_| {
            let calls = Arc::clone(&inner_calls);
            inner_radio.add_handler(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        });

        radio.emit(&1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        registrar.unsubscribe();
        radio.emit(&1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_guard() {
        let radio = EventBroadcaster::<i32>::new();

        {
            let guard = radio.add_handler(|_| {}).guard();
            assert!(guard.is_active());
            assert_eq!(radio.subscriber_count(), 1);
            assert!(radio.is_subscribed());
        }

        assert_eq!(radio.subscriber_count(), 0);
        assert!(!radio.is_subscribed());
    }

    #[test]
    fn test_subscription_guard_releases_on_panic() {
        let radio = EventBroadcaster::<i32>::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = radio.add_handler(|_| {}).guard();
            panic!("scope body failed");
        }));

        assert!(result.is_err());
        assert!(!radio.is_subscribed());
    }

    #[test]
    fn test_concurrent_subscribe_and_emit() {
        let radio = Arc::new(EventBroadcaster::<usize>::new());
        let total = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let radio = Arc::clone(&radio);
                let total = Arc::clone(&total);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let total = Arc::clone(&total);
                        let subscription = radio.add_handler(move |value| {
                            total.fetch_add(*value, Ordering::SeqCst);
                        });
                        radio.emit(&0);
                        subscription.unsubscribe();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(radio.subscriber_count(), 0);
        assert_eq!(total.load(Ordering::SeqCst), 0);
    }
}
