use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use deskpilot_core::BusEvent;
use tracing::trace;

pub type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_type: HashMap<String, Vec<(u64, Handler)>>,
    any: Vec<(u64, Handler)>,
}

/// In-process publish/subscribe. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Listeners>>,
}

enum Slot {
    Typed(String),
    Any,
}

/// Returned by `subscribe`; dropping it keeps the listener attached.
pub struct Subscription {
    bus: Weak<Mutex<Listeners>>,
    slot: Slot,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut listeners = inner.lock().unwrap_or_else(|e| e.into_inner());
        match &self.slot {
            Slot::Typed(event_type) => {
                if let Some(list) = listeners.by_type.get_mut(event_type) {
                    list.retain(|(id, _)| *id != self.id);
                    if list.is_empty() {
                        listeners.by_type.remove(event_type);
                    }
                }
            }
            Slot::Any => listeners.any.retain(|(id, _)| *id != self.id),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners
            .by_type
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            slot: Slot::Typed(event_type.to_string()),
            id,
        }
    }

    /// Receives every event after the type-specific listeners have run.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.any.push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            slot: Slot::Any,
            id,
        }
    }

    /// Calls listeners synchronously on the publishing task. The listener list
    /// is copied first, so handlers may subscribe or publish themselves.
    pub fn publish(&self, event: &BusEvent) {
        let handlers: Vec<Handler> = {
            let listeners = self.lock();
            listeners
                .by_type
                .get(&event.event_type)
                .into_iter()
                .flatten()
                .chain(listeners.any.iter())
                .map(|(_, h)| h.clone())
                .collect()
        };
        trace!(event_type = %event.event_type, listeners = handlers.len(), "publish");
        for handler in handlers {
            handler(event);
        }
    }

    pub fn send(&self, event_type: &str, source: &str, data: serde_json::Value) {
        self.publish(&BusEvent::new(event_type, source, data));
    }

    pub fn listener_count(&self) -> usize {
        let listeners = self.lock();
        listeners.by_type.values().map(Vec::len).sum::<usize>() + listeners.any.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |tag: &'static str| -> Handler {
            let log = log2.clone();
            Arc::new(move |e: &BusEvent| log.lock().unwrap().push(format!("{}:{}", tag, e.event_type)))
        };
        (log, make)
    }

    #[test]
    fn test_typed_before_wildcard_in_subscription_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let any = make("any");
        bus.subscribe_all(move |e| any(e));
        let a = make("a");
        bus.subscribe("context:signal", move |e| a(e));
        let b = make("b");
        bus.subscribe("context:signal", move |e| b(e));
        let other = make("other");
        bus.subscribe("module:registered", move |e| other(e));

        bus.send("context:signal", "test", json!({}));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:context:signal", "b:context:signal", "any:context:signal"]
        );
    }

    #[test]
    fn test_slow_listener_holds_up_publisher() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::{Duration, Instant};

        let bus = EventBus::new();
        let finished = Arc::new(AtomicBool::new(false));
        let seen_by_next = Arc::new(Mutex::new(None));

        let done = finished.clone();
        bus.subscribe("slow", move |_| {
            std::thread::sleep(Duration::from_millis(50));
            done.store(true, Ordering::SeqCst);
        });
        let done = finished.clone();
        let seen = seen_by_next.clone();
        bus.subscribe_all(move |_| {
            *seen.lock().unwrap() = Some(done.load(Ordering::SeqCst));
        });

        let started = Instant::now();
        bus.send("slow", "test", json!({}));

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(*seen_by_next.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");
        let sub = bus.subscribe("x", move |e| a(e));
        let b = make("b");
        bus.subscribe("x", move |e| b(e));
        assert_eq!(bus.listener_count(), 2);

        sub.unsubscribe();
        bus.send("x", "test", json!(null));

        assert_eq!(*log.lock().unwrap(), vec!["b:x"]);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn test_handler_may_publish_reentrantly() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let inner_bus = bus.clone();
        bus.subscribe("first", move |_| inner_bus.send("second", "test", json!(1)));
        let rec = make("seen");
        bus.subscribe("second", move |e| rec(e));

        bus.send("first", "test", json!(0));
        assert_eq!(*log.lock().unwrap(), vec!["seen:second"]);
    }

    #[test]
    fn test_send_stamps_fields() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        bus.subscribe_all(move |e| *seen2.lock().unwrap() = Some(e.clone()));
        bus.send("module:enabled", "registry", json!({"id": "code"}));

        let event = seen.lock().unwrap().clone().unwrap();
        assert_eq!(event.source, "registry");
        assert_eq!(event.data["id"], "code");
    }
}
