//! Behavior factories
//!
//! An [`Elemental`] pairs a name with a body function. Instantiating it on an
//! element builds an [`ElementalContext`], merges the default options with
//! the caller's, runs the body and registers whatever behavior it returns in
//! the runtime's [`InstanceRegistry`](elemental_core::InstanceRegistry).
//!
//! # Example
//!
//! ```rust
//! use elemental_runtime::prelude::*;
//! use serde_json::json;
//! use std::rc::Rc;
//!
//! let runtime = Runtime::new(Rc::new(WidthProbe::new(1024)));
//! let el = runtime.document_mut().create_element("nav");
//!
//! let menu = Elemental::new(
//!     "menu",
//!     |ctx: &ElementalContext, options: Options| {
//!         assert_eq!(options["delay"], json!(300));
//!         Ok(Some(ctx.clone().into()))
//!     },
//!     Some(json!({ "delay": 100 })),
//! )
//! .unwrap();
//!
//! let instance = menu
//!     .instantiate(&runtime, el, Some(&json!({ "delay": 300 })))
//!     .unwrap();
//! assert!(instance.can(Capabilities::DESTROY));
//! assert_eq!(runtime.instances().get_by_name(el, "menu"), Some(instance));
//! ```

use elemental_core::collection::storage_key;
use elemental_core::{
    Behavior, BehaviorRef, Capabilities, DomError, ElementId, EventClient, InstanceHandle,
};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

use crate::error::{ElementalError, Result};
use crate::runtime::Runtime;

/// Options handed to a behavior body
pub type Options = serde_json::Map<String, Value>;

/// Signature of a behavior body
pub type ElementalBody =
    dyn Fn(&ElementalContext, Options) -> elemental_core::Result<Option<BehaviorRef>>;

struct ElementalInner {
    name: String,
    body: Box<ElementalBody>,
    defaults: Options,
}

/// A named behavior factory (cheap to clone)
#[derive(Clone)]
pub struct Elemental {
    inner: Rc<ElementalInner>,
}

impl fmt::Debug for Elemental {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Elemental")
            .field("name", &self.inner.name)
            .field("defaults", &self.inner.defaults)
            .finish()
    }
}

impl Elemental {
    /// Define a factory
    ///
    /// Fails when the name is empty or the defaults are not a JSON object.
    /// `null` defaults are treated as absent.
    pub fn new<F>(name: impl Into<String>, body: F, defaults: Option<Value>) -> Result<Self>
    where
        F: Fn(&ElementalContext, Options) -> elemental_core::Result<Option<BehaviorRef>> + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ElementalError::InvalidName);
        }

        let defaults = match defaults {
            None | Some(Value::Null) => Options::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(ElementalError::InvalidDefaults {
                    name,
                    found: json_kind(&other).to_string(),
                })
            }
        };

        Ok(Self::from_parts(name, Box::new(body), defaults))
    }

    /// Define a built-in factory whose name is known to be valid
    pub(crate) fn builtin<F>(name: &str, body: F) -> Self
    where
        F: Fn(&ElementalContext, Options) -> elemental_core::Result<Option<BehaviorRef>> + 'static,
    {
        Self::from_parts(name.to_string(), Box::new(body), Options::new())
    }

    fn from_parts(name: String, body: Box<ElementalBody>, defaults: Options) -> Self {
        Self {
            inner: Rc::new(ElementalInner {
                name,
                body,
                defaults,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn defaults(&self) -> &Options {
        &self.inner.defaults
    }

    /// Defaults overlaid with `options`, key by key
    ///
    /// Only objects can override; anything else is ignored.
    pub fn merge_options(&self, options: Option<&Value>) -> Options {
        let mut merged = self.inner.defaults.clone();
        match options {
            Some(Value::Object(overrides)) => {
                for (key, value) in overrides {
                    merged.insert(key.clone(), value.clone());
                }
            }
            None | Some(Value::Null) => {}
            Some(other) => tracing::debug!(
                "Ignoring {} options passed to '{}'",
                json_kind(other),
                self.inner.name
            ),
        }
        merged
    }

    /// Create a behavior instance bound to `element`
    ///
    /// Body errors are returned as [`ElementalError::Body`]; in that case
    /// nothing is registered and the context's subscriptions are dropped.
    pub fn instantiate(
        &self,
        runtime: &Runtime,
        element: ElementId,
        options: Option<&Value>,
    ) -> Result<InstanceHandle> {
        if !runtime.document().contains(element) {
            return Err(DomError::UnknownElement(element).into());
        }

        let name = self.inner.name.as_str();
        let context = ElementalContext::new(name, element, runtime.clone());
        let options = self.merge_options(options);

        let behavior = match (self.inner.body)(&context, options) {
            Ok(behavior) => behavior,
            Err(source) => {
                context.events().unsubscribe_all();
                return Err(ElementalError::Body {
                    name: name.to_string(),
                    source,
                });
            }
        };

        let instance = match behavior {
            Some(behavior) => InstanceHandle::new(name, behavior),
            None => InstanceHandle::empty(name),
        };
        runtime.instances().add(element, name, instance.clone());
        runtime.track_client(element, context.events().id());

        if runtime.config().observe_removals {
            runtime.watch_removal(element);
        }
        tracing::debug!("Instantiated '{}' on {:?}", name, element);
        Ok(instance)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Handle given to a behavior body, bound to one element
///
/// Bodies that need nothing but teardown can return a clone of their context:
/// it implements [`Behavior`] with the destroy capability.
#[derive(Clone)]
pub struct ElementalContext {
    name: Rc<str>,
    element: ElementId,
    runtime: Runtime,
    client: EventClient,
}

impl fmt::Debug for ElementalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementalContext")
            .field("name", &self.name)
            .field("element", &self.element)
            .field("client", &self.client)
            .finish()
    }
}

impl ElementalContext {
    fn new(name: &str, element: ElementId, runtime: Runtime) -> Self {
        let client = runtime.bus().client();
        Self {
            name: Rc::from(name),
            element,
            runtime,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Event bus client owned by this instance
    pub fn events(&self) -> &EventClient {
        &self.client
    }

    /// First instance of another behavior on the same element
    pub fn get_instance(&self, name: &str) -> Option<InstanceHandle> {
        self.runtime.instances().get_by_name(self.element, name)
    }

    /// Every instance registered under this context's name on its element
    pub fn get_instances(&self) -> Vec<InstanceHandle> {
        self.runtime
            .instances()
            .get_all_for_element(self.element, &self.name)
    }

    /// First instance of a behavior on any element
    pub fn get_instance_from_element(
        &self,
        element: ElementId,
        name: &str,
    ) -> Option<InstanceHandle> {
        self.runtime.instances().get_by_name(element, name)
    }

    /// Attach a listener to the bound element; cleared by [`destroy`](Self::destroy)
    pub fn add_event_listener<F>(
        &self,
        event: &str,
        use_capture: bool,
        callback: F,
    ) -> std::result::Result<elemental_core::ListenerId, DomError>
    where
        F: Fn(&elemental_core::DomEvent) + 'static,
    {
        self.runtime
            .document_mut()
            .add_event_listener(self.element, event, use_capture, callback)
    }

    /// Listen on the bound element for events from descendants carrying `attribute`
    ///
    /// The callback receives the event and the nearest element (from the
    /// target upwards) carrying the attribute. Events whose match lies
    /// outside the bound element are ignored.
    pub fn add_delegated_listener<F>(
        &self,
        event: &str,
        attribute: &str,
        callback: F,
    ) -> std::result::Result<elemental_core::ListenerId, DomError>
    where
        F: Fn(&elemental_core::DomEvent, ElementId) + 'static,
    {
        let runtime = self.runtime.downgrade();
        let attribute = attribute.to_string();
        let bound = self.element;
        self.add_event_listener(event, false, move |dom_event| {
            let Some(runtime) = runtime.upgrade() else {
                return;
            };
            let matched = {
                let document = runtime.document();
                document
                    .closest(dom_event.target, &attribute)
                    .filter(|m| *m == bound || document.ancestors(*m).contains(&bound))
            };
            if let Some(matched) = matched {
                callback(dom_event, matched);
            }
        })
    }

    /// Tear down everything this context set up
    ///
    /// Drops the bus subscriptions of this client, the registry entry for
    /// this name and every tracked listener on the element.
    pub fn destroy(&self) {
        self.client.unsubscribe_all();
        self.runtime
            .store()
            .remove(self.element, &storage_key(&self.name));
        let cleared = self
            .runtime
            .document_mut()
            .clear_event_listeners(self.element);
        tracing::debug!(
            "Destroyed '{}' on {:?} ({} listener(s) removed)",
            self.name,
            self.element,
            cleared
        );
    }
}

impl Behavior for ElementalContext {
    fn capabilities(&self) -> Capabilities {
        Capabilities::DESTROY
    }

    fn destroy(&self) -> elemental_core::Result<()> {
        ElementalContext::destroy(self);
        Ok(())
    }
}
