//! Elemental lifecycle manager
//!
//! Scans a subtree for elements carrying the declaration attribute and drives
//! each declaration through its lifecycle:
//!
//! ```text
//! declared --init--> processed --destroy--> (destroyed | paused) --init--> resumed
//!                        ^                                                     |
//!                        +-----------------------------------------------------+
//! ```
//!
//! State is kept in a side table keyed by element and declaration index and
//! mirrored into the attribute, so scans are idempotent: an element whose
//! declarations did not change is never rewritten.
//!
//! None of the public entry points fail. Parse errors skip the element,
//! instantiation errors mark the declaration `processed: false`, and
//! lifecycle errors are logged.
//!
//! # Example
//!
//! ```rust
//! use elemental_runtime::prelude::*;
//! use std::rc::Rc;
//!
//! let runtime = Runtime::new(Rc::new(WidthProbe::new(1280)));
//! let el = {
//!     let mut doc = runtime.document_mut();
//!     let el = doc.create_element("div");
//!     doc.set_attribute(el, "data-elemental", "widgetA");
//!     let body = doc.body();
//!     doc.append_child(body, el).unwrap();
//!     el
//! };
//!
//! let mut registry = FactoryRegistry::new();
//! registry.register(
//!     Elemental::new("widgetA", |ctx: &ElementalContext, _: Options| Ok(Some(ctx.clone().into())), None)
//!         .unwrap(),
//! );
//!
//! let manager = ElementalManager::new(runtime.clone());
//! manager.init_document(&registry);
//! assert_eq!(
//!     runtime.document().attribute(el, "data-elemental"),
//!     Some(r#"[{"name":"widgetA","processed":true,"id":"0"}]"#)
//! );
//! ```

use elemental_core::events::event_names;
use elemental_core::{Capabilities, ElementId, EventPayload, InstanceHandle, Subject};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;

use crate::declaration::{parse_declarations, serialize_declarations, Declaration, DeclarationState};
use crate::elemental::Elemental;
use crate::error::DeclarationError;
use crate::responsive::responsive_elemental;
use crate::runtime::Runtime;

// =============================================================================
// Factory registry
// =============================================================================

/// Factories available to declarations, by name
#[derive(Debug, Clone, Default)]
pub struct FactoryRegistry {
    factories: IndexMap<String, Elemental>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own name, returning the one it replaces
    pub fn register(&mut self, elemental: Elemental) -> Option<Elemental> {
        self.factories
            .insert(elemental.name().to_string(), elemental)
    }

    pub fn get(&self, name: &str) -> Option<&Elemental> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl FromIterator<Elemental> for FactoryRegistry {
    fn from_iter<I: IntoIterator<Item = Elemental>>(iter: I) -> Self {
        let mut registry = Self::new();
        for elemental in iter {
            registry.register(elemental);
        }
        registry
    }
}

// =============================================================================
// Manager
// =============================================================================

type Entries = Vec<(Declaration, DeclarationState)>;

/// Drives declarations found in the document through their lifecycle
pub struct ElementalManager {
    runtime: Runtime,
    /// Declaration states of each element, replaced on every update
    states: RefCell<FxHashMap<ElementId, Vec<DeclarationState>>>,
}

impl fmt::Debug for ElementalManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementalManager")
            .field("attribute", &self.runtime.config().attribute)
            .field("tracked", &self.states.borrow().len())
            .finish()
    }
}

impl ElementalManager {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            states: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Last recorded state of a declaration
    pub fn state(&self, element: ElementId, index: usize) -> Option<DeclarationState> {
        self.states
            .borrow()
            .get(&element)
            .and_then(|states| states.get(index))
            .cloned()
    }

    /// Number of elements with recorded declaration states
    pub fn tracked_elements(&self) -> usize {
        self.states.borrow().len()
    }

    /// Drop the recorded states of one element
    pub fn forget(&self, element: ElementId) -> bool {
        self.states.borrow_mut().remove(&element).is_some()
    }

    /// Drop every recorded state and reset the runtime
    pub fn reset(&self) {
        self.states.borrow_mut().clear();
        self.runtime.reset();
    }

    /// Instantiate every pending declaration below `context`
    pub fn init_elementals(&self, registry: &FactoryRegistry, context: ElementId) {
        for element in self.elements_in(context, "initialize") {
            if let Err(err) = self.update_element(element, |index, declaration, state| {
                self.init_declaration(registry, element, index, declaration, state)
            }) {
                tracing::warn!("Skipping elementals of {:?}: {}", element, err);
            }
        }
    }

    /// [`init_elementals`](Self::init_elementals) over the whole document
    pub fn init_document(&self, registry: &FactoryRegistry) {
        let root = self.runtime.document().root();
        self.init_elementals(registry, root);
    }

    /// Destroy (or pause) every instance declared below `context`
    pub fn destroy_elementals(&self, context: ElementId) {
        for element in self.elements_in(context, "destroy") {
            if let Err(err) = self.update_element(element, |_, declaration, state| {
                self.destroy_declaration(element, declaration, state)
            }) {
                tracing::warn!("Skipping elementals of {:?}: {}", element, err);
            }
        }
    }

    /// Forget the recorded state of every declaration below `context`
    ///
    /// Instances are left alone; the next scan creates new ones.
    pub fn reset_elementals(&self, context: ElementId) {
        for element in self.elements_in(context, "reset") {
            let result = self.update_element(element, |_, _, _| DeclarationState::default());
            if let Err(err) = result {
                tracing::warn!("Skipping elementals of {:?}: {}", element, err);
            }
        }
    }

    fn elements_in(&self, context: ElementId, operation: &str) -> Vec<ElementId> {
        let doc = self.runtime.document();
        let attribute = &self.runtime.config().attribute;
        self.states
            .borrow_mut()
            .retain(|element, _| doc.has_attribute(*element, attribute));
        if !doc.contains(context) {
            tracing::debug!(
                "Unable to {} elementals: invalid context {:?}",
                operation,
                context
            );
            return Vec::new();
        }
        doc.query_attribute(context, attribute)
    }

    /// Parse an element's declarations, update each state and write back
    ///
    /// The attribute is only rewritten when its serialization changed. No
    /// document borrow is held while `update` runs.
    fn update_element<F>(&self, element: ElementId, mut update: F) -> Result<(), DeclarationError>
    where
        F: FnMut(usize, &Declaration, DeclarationState) -> DeclarationState,
    {
        let attribute = &self.runtime.config().attribute;
        let Some(content) = self
            .runtime
            .document()
            .attribute(element, attribute)
            .map(str::to_string)
        else {
            self.forget(element);
            return Ok(());
        };

        let mut entries: Entries = match parse_declarations(&content) {
            Ok(entries) => entries,
            Err(err) => {
                self.forget(element);
                return Err(err);
            }
        };
        let before = serialize_declarations(&entries);

        let mut states = Vec::with_capacity(entries.len());
        for (index, (declaration, state)) in entries.iter_mut().enumerate() {
            *state = update(index, declaration, std::mem::take(state));
            states.push(state.clone());
        }
        self.states.borrow_mut().insert(element, states);

        let after = serialize_declarations(&entries);
        if before != after {
            self.runtime
                .document_mut()
                .set_attribute(element, attribute, after);
        }
        Ok(())
    }

    fn init_declaration(
        &self,
        registry: &FactoryRegistry,
        element: ElementId,
        index: usize,
        declaration: &Declaration,
        state: DeclarationState,
    ) -> DeclarationState {
        if state.is_processed() {
            return state;
        }

        if let Some(id) = state.id.clone() {
            let processed = match self.resume_by_id(element, declaration, &id) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!("An error occurred resuming elemental: {}", err);
                    false
                }
            };
            return DeclarationState {
                processed: Some(processed),
                id: Some(id),
            };
        }

        let Some(target) = registry.get(&declaration.name) else {
            tracing::debug!("No elemental registered as '{}'", declaration.name);
            return state;
        };

        let id = index.to_string();
        let created = if declaration.is_responsive() {
            let options = responsive_options(declaration, &id);
            responsive_elemental(target.clone()).instantiate(&self.runtime, element, Some(&options))
        } else {
            target.instantiate(&self.runtime, element, declaration.options.as_ref())
        };

        match created {
            Ok(instance) => {
                instance.set_id(id.as_str());
                DeclarationState {
                    processed: Some(true),
                    id: Some(id),
                }
            }
            Err(err) => {
                tracing::warn!(
                    "An error occurred initializing elemental '{}': {}",
                    declaration.name,
                    err
                );
                DeclarationState {
                    processed: Some(false),
                    ..state
                }
            }
        }
    }

    fn resume_by_id(
        &self,
        element: ElementId,
        declaration: &Declaration,
        id: &str,
    ) -> Result<(), DeclarationError> {
        let instance = self
            .runtime
            .instances()
            .get_by_id(element, &declaration.name, id)
            .ok_or_else(|| DeclarationError::MissingInstance {
                name: declaration.name.clone(),
                id: id.to_string(),
            })?;

        instance
            .resume()
            .map_err(|source| DeclarationError::Lifecycle {
                name: declaration.name.clone(),
                operation: "resume",
                source,
            })?;

        self.publish(element, event_names::INSTANCE_RESUMED, instance);
        Ok(())
    }

    fn destroy_declaration(
        &self,
        element: ElementId,
        declaration: &Declaration,
        state: DeclarationState,
    ) -> DeclarationState {
        let Some(id) = state.id.as_deref() else {
            return state;
        };
        let name = declaration.name.as_str();
        let Some(instance) = self.runtime.instances().get_by_id(element, name, id) else {
            return state;
        };

        if instance.can(Capabilities::DESTROY) {
            if let Err(err) = instance.destroy() {
                tracing::warn!("An error occurred destroying elemental '{}': {}", name, err);
            }
            self.publish(element, event_names::INSTANCE_DESTROYED, instance.clone());
            self.runtime.instances().remove(element, name, Some(&instance));
        } else if instance.can(Capabilities::PAUSE) {
            match instance.pause() {
                Ok(()) => self.publish(element, event_names::INSTANCE_PAUSED, instance),
                Err(err) => {
                    tracing::warn!("An error occurred pausing elemental '{}': {}", name, err)
                }
            }
        } else {
            tracing::debug!("'{}' can neither be destroyed nor paused", name);
            return state;
        }

        DeclarationState {
            processed: None,
            ..state
        }
    }

    fn publish(&self, element: ElementId, event: &str, instance: InstanceHandle) {
        self.runtime.bus().publish(
            &Subject::Element(element),
            event,
            &EventPayload::Instance { instance },
        );
    }
}

/// Options handed to the responsive controller for a declaration
fn responsive_options(declaration: &Declaration, id: &str) -> Value {
    let mut options = Map::new();
    options.insert(
        "isActiveOn".to_string(),
        declaration.is_active_on.clone().unwrap_or(Value::Null),
    );
    options.insert(
        "elementalName".to_string(),
        Value::String(declaration.name.clone()),
    );
    options.insert(
        "elementalOptions".to_string(),
        declaration.options.clone().unwrap_or(Value::Null),
    );
    options.insert("id".to_string(), Value::String(id.to_string()));
    Value::Object(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elemental::{ElementalContext, Options};
    use crate::viewport::WidthProbe;
    use elemental_core::BehaviorError;
    use std::rc::Rc;

    fn setup(declaration: &str) -> (Runtime, ElementId, ElementalManager) {
        let runtime = Runtime::new(Rc::new(WidthProbe::new(1280)));
        let el = {
            let mut doc = runtime.document_mut();
            let el = doc.create_element("div");
            doc.set_attribute(el, "data-elemental", declaration);
            let body = doc.body();
            doc.append_child(body, el).unwrap();
            el
        };
        let manager = ElementalManager::new(runtime.clone());
        (runtime, el, manager)
    }

    fn noop(name: &str) -> Elemental {
        Elemental::new(name, |_: &ElementalContext, _: Options| Ok(None), None).unwrap()
    }

    fn attribute(runtime: &Runtime, el: ElementId) -> String {
        runtime
            .document()
            .attribute(el, "data-elemental")
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn test_registry() {
        let registry: FactoryRegistry = [noop("b"), noop("a"), noop("b")].into_iter().collect();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(registry.get("a").map(Elemental::name), Some("a"));
    }

    #[test]
    fn test_unknown_factory_left_untouched() {
        let (runtime, el, manager) = setup("ghost");
        let writes = runtime.document().attribute_writes();

        manager.init_document(&FactoryRegistry::new());
        assert_eq!(attribute(&runtime, el), "ghost");
        assert_eq!(runtime.document().attribute_writes(), writes);
        assert_eq!(manager.state(el, 0), Some(DeclarationState::default()));
    }

    #[test]
    fn test_failing_body_does_not_abort_scan() {
        let (runtime, el, manager) = setup("broken widgetB");
        let broken = Elemental::new(
            "broken",
            |_: &ElementalContext, _: Options| Err(BehaviorError::failed("no markup")),
            None,
        )
        .unwrap();
        let registry: FactoryRegistry = [broken, noop("widgetB")].into_iter().collect();

        manager.init_document(&registry);
        assert_eq!(
            attribute(&runtime, el),
            r#"[{"name":"broken","processed":false},{"name":"widgetB","processed":true,"id":"1"}]"#
        );
        assert!(runtime.instances().get_by_name(el, "widgetB").is_some());
    }

    #[test]
    fn test_malformed_json_untouched() {
        let (runtime, el, manager) = setup(r#"[{"name":"widgetA""#);
        let writes = runtime.document().attribute_writes();

        let registry: FactoryRegistry = [noop("widgetA")].into_iter().collect();
        manager.init_document(&registry);
        assert_eq!(attribute(&runtime, el), r#"[{"name":"widgetA""#);
        assert_eq!(runtime.document().attribute_writes(), writes);
        assert!(runtime.instances().get_by_name(el, "widgetA").is_none());
    }

    #[test]
    fn test_context_scoping() {
        let (runtime, el, manager) = setup("widgetA");
        let (section, nested) = {
            let mut doc = runtime.document_mut();
            let section = doc.create_element("section");
            let nested = doc.create_element("div");
            doc.set_attribute(nested, "data-elemental", "widgetA");
            let body = doc.body();
            doc.append_child(body, section).unwrap();
            doc.append_child(section, nested).unwrap();
            (section, nested)
        };

        let registry: FactoryRegistry = [noop("widgetA")].into_iter().collect();
        manager.init_elementals(&registry, section);
        assert!(runtime.instances().get_by_name(nested, "widgetA").is_some());
        assert!(runtime.instances().get_by_name(el, "widgetA").is_none());
    }

    #[test]
    fn test_invalid_context_is_ignored() {
        let (runtime, el, manager) = setup("widgetA");
        let gone = runtime.document_mut().create_element("div");
        runtime.remove_element(gone).unwrap();

        let registry: FactoryRegistry = [noop("widgetA")].into_iter().collect();
        manager.init_elementals(&registry, gone);
        manager.destroy_elementals(gone);
        assert_eq!(attribute(&runtime, el), "widgetA");
    }

    #[test]
    fn test_removed_elements_are_forgotten() {
        let (runtime, el, manager) = setup("widgetA");
        let registry: FactoryRegistry = [noop("widgetA")].into_iter().collect();
        manager.init_document(&registry);
        assert_eq!(manager.tracked_elements(), 1);

        runtime.remove_element(el).unwrap();
        manager.init_document(&registry);
        assert_eq!(manager.state(el, 0), None);
        assert_eq!(manager.tracked_elements(), 0);
    }

    #[test]
    fn test_shrinking_declaration_list() {
        let (runtime, el, manager) = setup("a b");
        manager.init_document(&FactoryRegistry::new());
        assert!(manager.state(el, 1).is_some());

        runtime.document_mut().set_attribute(el, "data-elemental", "a");
        manager.init_document(&FactoryRegistry::new());
        assert!(manager.state(el, 0).is_some());
        assert_eq!(manager.state(el, 1), None);

        runtime.document_mut().remove_attribute(el, "data-elemental");
        manager.init_document(&FactoryRegistry::new());
        assert_eq!(manager.tracked_elements(), 0);
    }

    #[test]
    fn test_reset_clears_states() {
        let (runtime, el, manager) = setup("widgetA");
        let registry: FactoryRegistry = [noop("widgetA")].into_iter().collect();
        manager.init_document(&registry);

        manager.reset();
        assert_eq!(manager.state(el, 0), None);
        assert_eq!(runtime.stats().stored_elements, 0);
    }

    #[test]
    fn test_numeric_id_resumes() {
        let (runtime, el, manager) = setup(r#"[{"name":"widgetA","id":0}]"#);
        let instance = InstanceHandle::empty("widgetA");
        instance.set_id("0");
        runtime.instances().add(el, "widgetA", instance);

        manager.init_document(&FactoryRegistry::new());
        // Empty instances cannot resume
        assert_eq!(
            attribute(&runtime, el),
            r#"[{"name":"widgetA","processed":false,"id":"0"}]"#
        );
    }
}
