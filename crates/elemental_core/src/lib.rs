//! Elemental Core
//!
//! The building blocks of the elemental lifecycle framework:
//!
//! - **Document**: a small element tree with ordered attributes and tracked listeners
//! - **Keyed Storage**: per-element key/value state with explicit eviction
//! - **Event Bus**: synchronous publish/subscribe with bulk-unsubscribable clients
//! - **Instance Registry**: live behavior instances per element and name
//! - **Behaviors**: the capability model (pause, resume, destroy) of bound instances
//!
//! # Example
//!
//! ```rust
//! use elemental_core::{Document, InstanceHandle, InstanceRegistry, KeyedElementStore};
//! use std::rc::Rc;
//!
//! let mut doc = Document::new();
//! let el = doc.create_element("section");
//!
//! let registry = InstanceRegistry::new(Rc::new(KeyedElementStore::new()));
//! let instance = InstanceHandle::empty("tabs");
//! registry.add(el, "tabs", instance.clone());
//! registry.add(el, "tabs", instance.clone());
//!
//! assert_eq!(registry.get_all_for_element(el, "tabs").len(), 1);
//! assert_eq!(registry.get_by_name(el, "tabs"), Some(instance));
//! ```

pub mod behavior;
pub mod collection;
pub mod dom;
pub mod error;
pub mod events;
pub mod store;
pub mod viewport;

pub use behavior::{Behavior, BehaviorRef, Capabilities, EmptyBehavior, InstanceHandle};
pub use collection::InstanceRegistry;
pub use dom::{event_preset, Document, DomEvent, ElementId, EventPreset, ListenerId};
pub use error::{BehaviorError, DomError, Result};
pub use events::{
    event_names, ClientId, EventBus, EventCallback, EventClient, EventPayload, Subject,
    SubscriptionToken,
};
pub use store::KeyedElementStore;
pub use viewport::{UnknownViewport, Viewport};
