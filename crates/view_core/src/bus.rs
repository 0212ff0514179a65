//! Process wide publish/subscribe with RAII subscriptions.
//!
//! Publishing only enqueues. Handlers run from [`EventBus::dispatch_pending`]
//! so a handler may publish, subscribe or drop subscriptions without
//! re-entering the bus.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    rc::{Rc, Weak},
};

use serde_json::Value;
use tracing::{debug, warn};

use crate::{dom::Document, error::Result, events::ViewId};

#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub name: String,
    pub source: Option<ViewId>,
    pub payload: Value,
}

impl BusEvent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: None,
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn from_source(mut self, source: ViewId) -> Self {
        self.source = Some(source);
        self
    }
}

type Handler = Rc<RefCell<dyn FnMut(&mut Document, &BusEvent) -> Result<()>>>;

struct Entry {
    key: u64,
    name: String,
    source: Option<ViewId>,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    next_key: u64,
    entries: Vec<Entry>,
    queue: VecDeque<BusEvent>,
    dispatching: bool,
}

impl BusState {
    fn take_entries(&mut self, keys: &[u64]) -> Vec<Entry> {
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| keys.contains(&entry.key));
        self.entries = kept;
        removed
    }
}

#[derive(Default)]
struct Registry {
    state: RefCell<BusState>,
    /// Keys of subscriptions dropped while `state` was borrowed.
    orphaned: RefCell<Vec<u64>>,
}

/// Cheap to clone; all clones share one registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<Registry>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.registry.state.borrow();
        f.debug_struct("EventBus")
            .field("subscribers", &state.entries.len())
            .field("pending", &state.queue.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, name: &str, handler: F) -> Subscription
    where
        F: FnMut(&mut Document, &BusEvent) -> Result<()> + 'static,
    {
        self.register(name, None, handler)
    }

    /// Subscribes to `name` events published by `source` only.
    pub fn subscribe_from<F>(&self, source: ViewId, name: &str, handler: F) -> Subscription
    where
        F: FnMut(&mut Document, &BusEvent) -> Result<()> + 'static,
    {
        self.register(name, Some(source), handler)
    }

    fn register<F>(&self, name: &str, source: Option<ViewId>, handler: F) -> Subscription
    where
        F: FnMut(&mut Document, &BusEvent) -> Result<()> + 'static,
    {
        self.prune();
        let mut state = self.registry.state.borrow_mut();
        state.next_key += 1;
        let key = state.next_key;
        state.entries.push(Entry {
            key,
            name: name.to_string(),
            source,
            handler: Rc::new(RefCell::new(handler)),
        });
        debug!(event = name, key, "bus subscription added");
        Subscription {
            key,
            bus: Rc::downgrade(&self.registry),
        }
    }

    pub fn publish(&self, event: BusEvent) {
        self.registry.state.borrow_mut().queue.push_back(event);
    }

    pub fn trigger(&self, name: &str) {
        self.publish(BusEvent::new(name));
    }

    pub fn pending(&self) -> usize {
        self.registry.state.borrow().queue.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.prune();
        self.registry.state.borrow().entries.len()
    }

    /// Delivers queued events in publish order, each to its subscribers in
    /// registration order. Returns the number of handler invocations. A
    /// nested call made from inside a handler does nothing.
    pub fn dispatch_pending(&self, doc: &mut Document) -> Result<usize> {
        {
            let mut state = self.registry.state.borrow_mut();
            if state.dispatching {
                return Ok(0);
            }
            state.dispatching = true;
        }
        let outcome = self.drain(doc);
        self.registry.state.borrow_mut().dispatching = false;
        outcome
    }

    fn drain(&self, doc: &mut Document) -> Result<usize> {
        let mut delivered = 0;
        loop {
            self.prune();
            let Some(event) = self.registry.state.borrow_mut().queue.pop_front() else {
                break;
            };
            let targets: Vec<(u64, Handler)> = self
                .registry
                .state
                .borrow()
                .entries
                .iter()
                .filter(|entry| entry.name == event.name)
                .filter(|entry| entry.source.is_none() || entry.source == event.source)
                .map(|entry| (entry.key, entry.handler.clone()))
                .collect();
            if targets.is_empty() {
                debug!(event = %event.name, "bus event had no subscribers");
            }
            for (key, handler) in targets {
                // Skip handlers unsubscribed by an earlier one for this event.
                if !self.is_live(key) {
                    continue;
                }
                let Ok(mut handler) = handler.try_borrow_mut() else {
                    warn!(event = %event.name, key, "skipping re-entrant bus handler");
                    continue;
                };
                (&mut *handler)(doc, &event)?;
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Removes entries whose subscriptions were dropped while the bus was
    /// busy. The removed handlers are released after the borrow ends.
    fn prune(&self) {
        let orphaned = std::mem::take(&mut *self.registry.orphaned.borrow_mut());
        if orphaned.is_empty() {
            return;
        }
        let removed = self.registry.state.borrow_mut().take_entries(&orphaned);
        debug!(removed = removed.len(), "pruned orphaned bus subscriptions");
        drop(removed);
    }

    fn is_live(&self, key: u64) -> bool {
        self.prune();
        self.registry
            .state
            .borrow()
            .entries
            .iter()
            .any(|entry| entry.key == key)
    }
}

/// Unsubscribes when dropped.
#[must_use = "dropping a subscription unsubscribes it"]
pub struct Subscription {
    key: u64,
    bus: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        // A handler may own subscriptions of its own, so it is released only
        // after the registry borrow ends.
        let removed = match bus.state.try_borrow_mut() {
            Ok(mut state) => state.take_entries(&[self.key]),
            Err(_) => {
                debug!(key = self.key, "bus busy; unsubscribe deferred");
                bus.orphaned.borrow_mut().push(self.key);
                Vec::new()
            }
        };
        drop(removed);
    }
}

/// The set of subscriptions one controller or view holds.
#[derive(Debug, Default)]
pub struct Listeners {
    subscriptions: Vec<Subscription>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn stop_listening(&mut self) {
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let mut doc = Document::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let log = log.clone();
            bus.subscribe("project:saved", move |_, event| {
                log.borrow_mut().push(format!("first {}", event.payload));
                Ok(())
            })
        };
        let second = {
            let log = log.clone();
            bus.subscribe("project:saved", move |_, _| {
                log.borrow_mut().push("second".to_string());
                Ok(())
            })
        };

        bus.publish(BusEvent::new("project:saved").with_payload(json!(7)));
        assert_eq!(bus.pending(), 1);
        assert_eq!(bus.dispatch_pending(&mut doc).expect("dispatch"), 2);
        assert_eq!(*log.borrow(), vec!["first 7".to_string(), "second".to_string()]);
        drop((first, second));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn dropping_a_subscription_unsubscribes() {
        let bus = EventBus::new();
        let mut doc = Document::new();
        let hits = Rc::new(RefCell::new(0));
        let subscription = {
            let hits = hits.clone();
            bus.subscribe("ping", move |_, _| {
                *hits.borrow_mut() += 1;
                Ok(())
            })
        };
        bus.trigger("ping");
        bus.dispatch_pending(&mut doc).expect("dispatch");
        subscription.unsubscribe();
        bus.trigger("ping");
        assert_eq!(bus.dispatch_pending(&mut doc).expect("dispatch"), 0);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn dropping_a_handler_releases_the_subscriptions_it_owns() {
        let bus = EventBus::new();
        let inner = bus.subscribe("item:changed", |_, _| Ok(()));
        let outer = bus.subscribe("invoice:closed", move |_, _| {
            let _owned = &inner;
            Ok(())
        });
        assert_eq!(bus.subscriber_count(), 2);

        drop(outer);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscriptions_dropped_while_the_bus_is_busy_are_pruned() {
        let bus = EventBus::new();
        let mut doc = Document::new();
        let hits = Rc::new(RefCell::new(0));
        let subscription = {
            let hits = hits.clone();
            bus.subscribe("ping", move |_, _| {
                *hits.borrow_mut() += 1;
                Ok(())
            })
        };

        {
            let _busy = bus.registry.state.borrow();
            drop(subscription);
        }
        assert_eq!(bus.registry.orphaned.borrow().len(), 1);

        bus.trigger("ping");
        assert_eq!(bus.dispatch_pending(&mut doc).expect("dispatch"), 0);
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.registry.orphaned.borrow().is_empty());

        for _ in 0..100 {
            let subscription = bus.subscribe("ping", |_, _| Ok(()));
            let _busy = bus.registry.state.borrow();
            drop(subscription);
        }
        let _late = bus.subscribe("pong", |_, _| Ok(()));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn handlers_may_publish_follow_up_events() {
        let bus = EventBus::new();
        let mut doc = Document::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _relay = {
            let bus = bus.clone();
            bus.clone().subscribe("login:success", move |_, _| {
                bus.trigger("menu:refresh");
                Ok(())
            })
        };
        let _menu = {
            let seen = seen.clone();
            bus.subscribe("menu:refresh", move |_, event| {
                seen.borrow_mut().push(event.name.clone());
                Ok(())
            })
        };

        bus.trigger("login:success");
        assert_eq!(bus.dispatch_pending(&mut doc).expect("dispatch"), 2);
        assert_eq!(*seen.borrow(), vec!["menu:refresh".to_string()]);
    }

    #[test]
    fn source_filtered_subscriptions_ignore_other_publishers() {
        let bus = EventBus::new();
        let mut doc = Document::new();
        let mine = ViewId::next();
        let theirs = ViewId::next();
        let hits = Rc::new(RefCell::new(0));
        let mut listeners = Listeners::new();
        {
            let hits = hits.clone();
            listeners.listen(bus.subscribe_from(mine, "change", move |_, _| {
                *hits.borrow_mut() += 1;
                Ok(())
            }));
        }

        bus.publish(BusEvent::new("change").from_source(theirs));
        bus.publish(BusEvent::new("change").from_source(mine));
        bus.dispatch_pending(&mut doc).expect("dispatch");
        assert_eq!(*hits.borrow(), 1);

        listeners.stop_listening();
        assert!(listeners.is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
