//! Elemental Runtime
//!
//! Owns the document and every shared subsystem (event bus, keyed storage,
//! instance registry, viewport classifier). Components receive a cloned
//! [`Runtime`] handle instead of reaching for globals, so tests can build as
//! many isolated runtimes as they like.

use elemental_core::events::event_names;
use elemental_core::{
    Capabilities, ClientId, Document, DomError, ElementId, EventBus, EventPayload,
    InstanceRegistry, KeyedElementStore, Subject, Viewport,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::RuntimeConfig;
use crate::viewport::{ScrollWindow, ViewportClassifier, ViewportProbe};

struct RuntimeInner {
    config: RuntimeConfig,
    document: RefCell<Document>,
    bus: Rc<EventBus>,
    store: Rc<KeyedElementStore>,
    instances: InstanceRegistry,
    classifier: ViewportClassifier,
    removal_watchers: RefCell<FxHashSet<ElementId>>,
    /// Bus clients of the instances bound to each element
    clients: RefCell<FxHashMap<ElementId, Vec<ClientId>>>,
}

/// Shared handle to the runtime state (cheap to clone)
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning runtime handle for callbacks stored inside the runtime itself
#[derive(Clone)]
pub(crate) struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Runtime {
    pub fn new(probe: Rc<dyn ViewportProbe>) -> Self {
        Self::with_config(RuntimeConfig::default(), probe)
    }

    pub fn with_config(config: RuntimeConfig, probe: Rc<dyn ViewportProbe>) -> Self {
        let bus = Rc::new(EventBus::new());
        let store = Rc::new(KeyedElementStore::new());
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                document: RefCell::new(Document::new()),
                classifier: ViewportClassifier::new(probe, bus.clone()),
                instances: InstanceRegistry::new(store.clone()),
                bus,
                store,
                removal_watchers: RefCell::new(FxHashSet::default()),
                clients: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Borrow the document
    ///
    /// Release the borrow before calling into behaviors or publishing events.
    pub fn document(&self) -> Ref<'_, Document> {
        self.inner.document.borrow()
    }

    pub fn document_mut(&self) -> RefMut<'_, Document> {
        self.inner.document.borrow_mut()
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.inner.bus
    }

    pub fn store(&self) -> &Rc<KeyedElementStore> {
        &self.inner.store
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.inner.instances
    }

    pub fn classifier(&self) -> &ViewportClassifier {
        &self.inner.classifier
    }

    /// Current viewport tier (memoized)
    pub fn viewport(&self) -> Viewport {
        self.inner.classifier.get_viewport(&self.inner.document)
    }

    /// Recompute the viewport tier, publishing a change event if it moved
    pub fn calculate_viewport(&self) -> Viewport {
        self.inner.classifier.calculate_viewport(&self.inner.document)
    }

    /// Whether the element overlaps the scrolled window
    pub fn window_has_offset(&self, element: ElementId, window: ScrollWindow) -> bool {
        self.inner
            .classifier
            .window_has_offset(&self.document(), element, window)
    }

    // =========================================================================
    // Removal observation
    // =========================================================================

    /// Evict the element's stored state once it leaves the document
    ///
    /// Returns false when the element was already watched.
    pub fn watch_removal(&self, element: ElementId) -> bool {
        self.inner.removal_watchers.borrow_mut().insert(element)
    }

    pub fn is_watched(&self, element: ElementId) -> bool {
        self.inner.removal_watchers.borrow().contains(&element)
    }

    /// Remove an element and its subtree from the document
    ///
    /// Watched elements in the subtree have their destroyable instances
    /// destroyed, their bus subscriptions dropped and their stored state
    /// evicted.
    pub fn remove_element(&self, element: ElementId) -> Result<Vec<ElementId>, DomError> {
        let removed = self.document_mut().remove_element(element)?;
        self.handle_removed(&removed);
        Ok(removed)
    }

    /// Detach an element from the document without destroying it
    ///
    /// The subtree counts as removed: watched elements have their stored
    /// state evicted and are no longer watched.
    pub fn detach_element(&self, element: ElementId) -> Result<Vec<ElementId>, DomError> {
        let detached = self.document_mut().detach(element)?;
        self.handle_removed(&detached);
        Ok(detached)
    }

    fn handle_removed(&self, removed: &[ElementId]) {
        let watched: Vec<(ElementId, Vec<ClientId>)> = {
            let mut watchers = self.inner.removal_watchers.borrow_mut();
            let mut clients = self.inner.clients.borrow_mut();
            removed
                .iter()
                .filter_map(|id| {
                    let owned = clients.remove(id).unwrap_or_default();
                    watchers.remove(id).then_some((*id, owned))
                })
                .collect()
        };
        for (element, clients) in watched {
            tracing::debug!("Element {:?} left the document", element);
            self.teardown(element, &clients);
            self.inner.store.evict(element);
        }
    }

    /// Destroy the instances bound to a removed element and drop their subscriptions
    fn teardown(&self, element: ElementId, clients: &[ClientId]) {
        let instances = &self.inner.instances;
        for name in instances.names(element) {
            for instance in instances.get_all_for_element(element, &name) {
                if !instance.can(Capabilities::DESTROY) {
                    continue;
                }
                if let Err(err) = instance.destroy() {
                    tracing::warn!(
                        "An error occurred destroying '{}' of a removed element: {}",
                        name,
                        err
                    );
                }
                self.inner.bus.publish(
                    &Subject::Element(element),
                    event_names::INSTANCE_DESTROYED,
                    &EventPayload::Instance { instance },
                );
            }
        }
        for client in clients {
            self.inner.bus.unsubscribe_all(*client);
        }
    }

    /// Remember the bus client of an instance bound to `element`
    ///
    /// Its subscriptions are dropped when the element leaves the document.
    pub(crate) fn track_client(&self, element: ElementId, client: ClientId) {
        self.inner
            .clients
            .borrow_mut()
            .entry(element)
            .or_default()
            .push(client);
    }

    /// Drop all stored state of an element and stop watching it
    pub fn evict(&self, element: ElementId) -> bool {
        self.inner.removal_watchers.borrow_mut().remove(&element);
        self.inner.clients.borrow_mut().remove(&element);
        self.inner.store.evict(element)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Dispatch a DOM event to tracked listeners
    ///
    /// Listeners on the target run first, then those on its ancestors when
    /// the event kind bubbles. Returns the number of listeners invoked.
    pub fn dispatch_event(&self, target: ElementId, kind: &str) -> Result<usize, DomError> {
        let path = self.document().propagation_path(target, kind)?;

        let mut invoked = 0;
        for (event, callbacks) in path {
            for callback in callbacks {
                callback(&event);
                invoked += 1;
            }
        }
        Ok(invoked)
    }

    /// Drop every subscription, stored value, watcher and the memoized viewport
    ///
    /// The document itself is kept.
    pub fn reset(&self) {
        self.inner.bus.clear();
        self.inner.store.clear();
        self.inner.removal_watchers.borrow_mut().clear();
        self.inner.clients.borrow_mut().clear();
        self.inner.classifier.reset();
    }

    /// Get statistics about the runtime
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            elements: self.inner.document.try_borrow().map(|d| d.len()).unwrap_or(0),
            subscriptions: self.inner.bus.subscription_count(),
            stored_elements: self.inner.store.len(),
            watched_elements: self.inner.removal_watchers.borrow().len(),
            viewport_computations: self.inner.classifier.computations(),
        }
    }
}

/// Statistics about the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStats {
    pub elements: usize,
    pub subscriptions: usize,
    pub stored_elements: usize,
    pub watched_elements: usize,
    pub viewport_computations: u64,
}
