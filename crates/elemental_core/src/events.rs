//! Publish/subscribe event bus
//!
//! Subscriptions are keyed by a [`Subject`] and an event name. Delivery is
//! synchronous and in subscription order; a failing callback is logged and
//! does not stop delivery to the others.
//!
//! Behaviors talk to the bus through an [`EventClient`], which tags every
//! subscription with a client handle so the whole set can be dropped with
//! one [`EventClient::unsubscribe_all`] call when the behavior is destroyed.
//!
//! # Example
//!
//! ```rust
//! use elemental_core::events::{EventBus, EventPayload, Subject};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let bus = Rc::new(EventBus::new());
//! let client = bus.client();
//!
//! let hits = Rc::new(Cell::new(0));
//! let h = hits.clone();
//! client.subscribe(Subject::Global, "refresh", move |_| {
//!     h.set(h.get() + 1);
//!     Ok(())
//! });
//!
//! bus.publish(&Subject::Global, "refresh", &EventPayload::None);
//! client.unsubscribe_all();
//! bus.publish(&Subject::Global, "refresh", &EventPayload::None);
//! assert_eq!(hits.get(), 1);
//! ```

use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::behavior::InstanceHandle;
use crate::dom::ElementId;
use crate::viewport::Viewport;

/// Well-known event names shared by the runtime and behaviors
pub mod event_names {
    /// Published on [`Subject::Global`](super::Subject::Global) when the viewport tier changes
    pub const RESPONSIVE_CHANGED: &str = "global.responsiveViewChanged";
    /// Published on the element subject after an instance was destroyed
    pub const INSTANCE_DESTROYED: &str = "instance destroyed";
    /// Published on the element subject after an instance was paused
    pub const INSTANCE_PAUSED: &str = "instance paused";
    /// Published on the element subject after an instance was resumed
    pub const INSTANCE_RESUMED: &str = "instance resumed";
}

/// What an event is about
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Bus-wide events (viewport changes)
    Global,
    /// Lifecycle events of one element
    Element(ElementId),
    /// Application-defined channels
    Named(String),
}

impl From<ElementId> for Subject {
    fn from(element: ElementId) -> Self {
        Subject::Element(element)
    }
}

/// Data carried by a published event
#[derive(Clone, Debug)]
pub enum EventPayload {
    None,
    ViewportChanged {
        viewport: Viewport,
        previous_viewport: Viewport,
    },
    Instance {
        instance: InstanceHandle,
    },
    Data(serde_json::Value),
}

impl EventPayload {
    /// The instance carried by lifecycle events
    pub fn instance(&self) -> Option<&InstanceHandle> {
        match self {
            EventPayload::Instance { instance } => Some(instance),
            _ => None,
        }
    }
}

/// Callback invoked on delivery
///
/// Uses Rc since the bus is single-threaded.
pub type EventCallback = Rc<dyn Fn(&EventPayload) -> anyhow::Result<()>>;

/// Token identifying one subscription
///
/// Tokens increase monotonically and are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(i64);

impl SubscriptionToken {
    /// Returned when a subscription could not be created
    pub const INVALID: SubscriptionToken = SubscriptionToken(-1);

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }
}

/// Handle grouping the subscriptions of one client
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

struct Subscription {
    subject: Subject,
    event: String,
    token: SubscriptionToken,
    client: Option<ClientId>,
    once: bool,
    callback: EventCallback,
}

impl Subscription {
    fn matches(&self, subject: &Subject, event: &str) -> bool {
        self.event == event && &self.subject == subject
    }
}

/// Synchronous publish/subscribe registry
pub struct EventBus {
    subscriptions: RefCell<Vec<Subscription>>,
    last_token: Cell<i64>,
    last_client: Cell<u64>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .field("last_token", &self.last_token.get())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RefCell::new(Vec::new()),
            last_token: Cell::new(0),
            last_client: Cell::new(0),
        }
    }

    /// Subscribe a callback, returning its token
    pub fn subscribe<F>(
        &self,
        subject: Subject,
        event: &str,
        callback: F,
        client: Option<ClientId>,
    ) -> SubscriptionToken
    where
        F: Fn(&EventPayload) -> anyhow::Result<()> + 'static,
    {
        self.insert(subject, event, Rc::new(callback), client, false)
    }

    /// Subscribe an optional callback
    ///
    /// Returns [`SubscriptionToken::INVALID`] without subscribing when no
    /// callback is given.
    pub fn subscribe_with(
        &self,
        subject: Subject,
        event: &str,
        callback: Option<EventCallback>,
        client: Option<ClientId>,
    ) -> SubscriptionToken {
        match callback {
            Some(callback) => self.insert(subject, event, callback, client, false),
            None => {
                tracing::debug!("Refusing subscription to '{}' without a callback", event);
                SubscriptionToken::INVALID
            }
        }
    }

    /// Subscribe for a single delivery
    ///
    /// The subscription is removed right before its callback runs, so it is
    /// delivered at most once even if the callback publishes the same event.
    pub fn subscribe_once<F>(
        &self,
        subject: Subject,
        event: &str,
        callback: F,
        client: Option<ClientId>,
    ) -> SubscriptionToken
    where
        F: Fn(&EventPayload) -> anyhow::Result<()> + 'static,
    {
        self.insert(subject, event, Rc::new(callback), client, true)
    }

    fn insert(
        &self,
        subject: Subject,
        event: &str,
        callback: EventCallback,
        client: Option<ClientId>,
        once: bool,
    ) -> SubscriptionToken {
        let token = SubscriptionToken(self.last_token.get() + 1);
        self.last_token.set(token.0);

        tracing::trace!("Subscribing {:?} to {:?}/'{}'", token, subject, event);
        self.subscriptions.borrow_mut().push(Subscription {
            subject,
            event: event.to_string(),
            token,
            client,
            once,
            callback,
        });
        token
    }

    /// Remove one subscription; no-op if absent
    pub fn unsubscribe(&self, token: SubscriptionToken) {
        // Callbacks are dropped after the borrow is released
        let removed: SmallVec<[Subscription; 1]> = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            match subscriptions.iter().position(|s| s.token == token) {
                Some(index) => smallvec::smallvec![subscriptions.remove(index)],
                None => SmallVec::new(),
            }
        };
        drop(removed);
    }

    /// Remove every subscription registered by a client
    pub fn unsubscribe_all(&self, client: ClientId) {
        let removed: Vec<Subscription> = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            let (removed, kept) = std::mem::take(&mut *subscriptions)
                .into_iter()
                .partition(|s| s.client == Some(client));
            *subscriptions = kept;
            removed
        };
        if !removed.is_empty() {
            tracing::trace!(
                "Client {:?} dropped {} subscription(s)",
                client,
                removed.len()
            );
        }
    }

    /// Deliver an event to every matching subscription
    ///
    /// Returns the number of callbacks invoked. The matching set is captured
    /// before delivery: subscriptions added by a callback are not invoked for
    /// this publish, and subscriptions removed by a callback are skipped.
    pub fn publish(&self, subject: &Subject, event: &str, payload: &EventPayload) -> usize {
        let matched: SmallVec<[(SubscriptionToken, bool, EventCallback); 8]> = self
            .subscriptions
            .borrow()
            .iter()
            .filter(|s| s.matches(subject, event))
            .map(|s| (s.token, s.once, s.callback.clone()))
            .collect();

        let mut delivered = 0;
        for (token, once, callback) in matched {
            if !self.is_subscribed(token) {
                continue;
            }
            if once {
                self.unsubscribe(token);
            }

            delivered += 1;
            if let Err(err) = callback(payload) {
                tracing::warn!(
                    "Subscriber {:?} of {:?}/'{}' failed: {:#}",
                    token,
                    subject,
                    event,
                    err
                );
            }
        }
        delivered
    }

    /// Whether a token still refers to a live subscription
    pub fn is_subscribed(&self, token: SubscriptionToken) -> bool {
        self.subscriptions
            .borrow()
            .iter()
            .any(|s| s.token == token)
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Number of live subscriptions owned by a client
    pub fn client_subscription_count(&self, client: ClientId) -> usize {
        self.subscriptions
            .borrow()
            .iter()
            .filter(|s| s.client == Some(client))
            .count()
    }

    /// Drop every subscription (tokens keep increasing)
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(removed);
    }

    /// Allocate a fresh client handle
    pub fn next_client_id(&self) -> ClientId {
        let id = self.last_client.get() + 1;
        self.last_client.set(id);
        ClientId(id)
    }

    /// Create a client facade with a fresh handle
    pub fn client(self: &Rc<Self>) -> EventClient {
        EventClient {
            bus: self.clone(),
            id: self.next_client_id(),
        }
    }
}

/// Bus facade that tags subscriptions with its own client handle
#[derive(Clone)]
pub struct EventClient {
    bus: Rc<EventBus>,
    id: ClientId,
}

impl fmt::Debug for EventClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventClient").field("id", &self.id).finish()
    }
}

impl EventClient {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn subscribe<F>(&self, subject: Subject, event: &str, callback: F) -> SubscriptionToken
    where
        F: Fn(&EventPayload) -> anyhow::Result<()> + 'static,
    {
        self.bus.subscribe(subject, event, callback, Some(self.id))
    }

    pub fn subscribe_once<F>(&self, subject: Subject, event: &str, callback: F) -> SubscriptionToken
    where
        F: Fn(&EventPayload) -> anyhow::Result<()> + 'static,
    {
        self.bus.subscribe_once(subject, event, callback, Some(self.id))
    }

    pub fn publish(&self, subject: &Subject, event: &str, payload: &EventPayload) -> usize {
        self.bus.publish(subject, event, payload)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.bus.unsubscribe(token);
    }

    /// Drop every subscription made through this client
    pub fn unsubscribe_all(&self) {
        self.bus.unsubscribe_all(self.id);
    }

    /// Number of live subscriptions made through this client
    pub fn subscription_count(&self) -> usize {
        self.bus.client_subscription_count(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> EventCallback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let make = move |label: &'static str| -> EventCallback {
            let l = l.clone();
            Rc::new(move |_: &EventPayload| {
                l.borrow_mut().push(label);
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_tokens_monotonic() {
        let bus = EventBus::new();
        let a = bus.subscribe(Subject::Global, "e", |_| Ok(()), None);
        let b = bus.subscribe(Subject::Global, "e", |_| Ok(()), None);
        bus.unsubscribe(a);
        let c = bus.subscribe(Subject::Global, "e", |_| Ok(()), None);

        assert!(a.is_valid());
        assert!(a < b && b < c);
        assert_eq!(bus.subscription_count(), 2);
    }

    #[test]
    fn test_missing_callback_returns_invalid() {
        let bus = EventBus::new();
        let token = bus.subscribe_with(Subject::Global, "e", None, None);
        assert_eq!(token, SubscriptionToken::INVALID);
        assert_eq!(token.as_i64(), -1);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = Rc::new(EventBus::new());
        let (log, make) = recorder();

        for label in ["first", "second", "third"] {
            let client = bus.client();
            bus.subscribe_with(Subject::Global, "tick", Some(make(label)), Some(client.id()));
        }

        let delivered = bus.publish(&Subject::Global, "tick", &EventPayload::None);
        assert_eq!(delivered, 3);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_subject_and_event_must_match() {
        let mut doc = crate::dom::Document::new();
        let el = doc.create_element("div");
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe_with(Subject::Element(el), "open", Some(make("el")), None);
        bus.subscribe_with(Subject::Global, "open", Some(make("global")), None);

        bus.publish(&Subject::Element(el), "close", &EventPayload::None);
        bus.publish(&Subject::Named("other".into()), "open", &EventPayload::None);
        assert!(log.borrow().is_empty());

        bus.publish(&el.into(), "open", &EventPayload::None);
        assert_eq!(*log.borrow(), vec!["el"]);
    }

    #[test]
    fn test_subscribe_once() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        bus.subscribe_once(
            Subject::Global,
            "ready",
            move |_| {
                h.set(h.get() + 1);
                Ok(())
            },
            None,
        );

        bus.publish(&Subject::Global, "ready", &EventPayload::None);
        bus.publish(&Subject::Global, "ready", &EventPayload::None);
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn test_subscribe_once_reentrant_publish() {
        let bus = Rc::new(EventBus::new());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let inner = Rc::downgrade(&bus);
        bus.subscribe_once(
            Subject::Global,
            "ready",
            move |_| {
                h.set(h.get() + 1);
                if let Some(bus) = inner.upgrade() {
                    bus.publish(&Subject::Global, "ready", &EventPayload::None);
                }
                Ok(())
            },
            None,
        );

        bus.publish(&Subject::Global, "ready", &EventPayload::None);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_failing_callback_isolated() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe_with(Subject::Global, "e", Some(make("before")), None);
        bus.subscribe(Subject::Global, "e", |_| Err(anyhow::anyhow!("boom")), None);
        bus.subscribe_with(Subject::Global, "e", Some(make("after")), None);

        assert_eq!(bus.publish(&Subject::Global, "e", &EventPayload::None), 3);
        assert_eq!(*log.borrow(), vec!["before", "after"]);
    }

    #[test]
    fn test_unsubscribe_during_publish_skips_removed() {
        let bus = Rc::new(EventBus::new());
        let (log, make) = recorder();

        let victim = Rc::new(Cell::new(SubscriptionToken::INVALID));
        let v = victim.clone();
        let b = Rc::downgrade(&bus);
        bus.subscribe(
            Subject::Global,
            "e",
            move |_| {
                if let Some(bus) = b.upgrade() {
                    bus.unsubscribe(v.get());
                }
                Ok(())
            },
            None,
        );
        victim.set(bus.subscribe_with(Subject::Global, "e", Some(make("victim")), None));

        assert_eq!(bus.publish(&Subject::Global, "e", &EventPayload::None), 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_client_unsubscribe_all() {
        let bus = Rc::new(EventBus::new());
        let widget = bus.client();
        let other = bus.client();
        assert_ne!(widget.id(), other.id());

        widget.subscribe(Subject::Global, "a", |_| Ok(()));
        widget.subscribe_once(Subject::Global, "b", |_| Ok(()));
        other.subscribe(Subject::Global, "a", |_| Ok(()));
        assert_eq!(widget.subscription_count(), 2);

        widget.unsubscribe_all();
        assert_eq!(widget.subscription_count(), 0);
        assert_eq!(bus.subscription_count(), 1);
        assert_eq!(widget.publish(&Subject::Global, "a", &EventPayload::None), 1);
    }
}
