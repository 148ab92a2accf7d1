//! Observer registration

use pomo_api::Event;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::warn;

/// State-change listener
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Listeners notified synchronously after every engine mutation
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<Listeners>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut listeners = lock(&self.inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every listener.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    pub fn notify(&self, event: &Event) {
        // Snapshot so listeners may subscribe or unsubscribe while called
        let listeners: Vec<Listener> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(message = %message, "Observer panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the listener registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.registry.upgrade() {
            lock(&inner).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock(inner: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomo_api::{EventPayload, Phase};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> Event {
        Event::new(EventPayload::SettingsApplied {
            preview_phase: Phase::Focus,
            preview_secs: 1500,
        })
    }

    #[test]
    fn test_notifies_and_unsubscribes() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = registry.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(&event());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        assert!(registry.is_empty());

        registry.notify(&event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        registry.subscribe(|_| panic!("listener failure"));
        let c = count.clone();
        registry.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(&event());
        registry.notify(&event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped_is_harmless() {
        let registry = ObserverRegistry::new();
        let sub = registry.subscribe(|_| {});
        drop(registry);
        sub.unsubscribe();
    }
}
