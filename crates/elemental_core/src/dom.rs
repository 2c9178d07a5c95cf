//! Host document model
//!
//! A small element tree standing in for the browser DOM. Elements live in a
//! slotmap arena keyed by [`ElementId`], carry ordered attributes, and keep a
//! record of the event listeners attached through this module so they can be
//! cleared in bulk when a behavior is destroyed.
//!
//! # Example
//!
//! ```rust
//! use elemental_core::dom::Document;
//!
//! let mut doc = Document::new();
//! let menu = doc.create_element("nav");
//! doc.set_attribute(menu, "data-elemental", "menuAim");
//! doc.append_child(doc.body(), menu).unwrap();
//!
//! let found = doc.query_attribute(doc.root(), "data-elemental");
//! assert_eq!(found, vec![menu]);
//! ```

use indexmap::IndexMap;
use slotmap::{new_key_type, Key, SlotMap};
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

use crate::error::DomError;

new_key_type! {
    /// Unique identifier for an element in a [`Document`]
    pub struct ElementId;
}

impl ElementId {
    /// Convert to a raw u64 representation
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Create from a raw u64 representation produced by [`ElementId::to_raw`]
    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// Callback invoked when a tracked listener fires
///
/// Uses Rc since the document is single-threaded.
pub type ListenerCallback = Rc<dyn Fn(&DomEvent)>;

/// Identifier of a tracked event listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// A listener attached to an element through [`Document::add_event_listener`]
#[derive(Clone)]
pub struct ListenerRecord {
    pub id: ListenerId,
    pub event: String,
    pub use_capture: bool,
    pub callback: ListenerCallback,
}

impl fmt::Debug for ListenerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRecord")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("use_capture", &self.use_capture)
            .finish()
    }
}

/// Propagation flags for a DOM event kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventPreset {
    pub bubbles: bool,
    pub cancelable: bool,
}

impl EventPreset {
    const fn new(bubbles: bool, cancelable: bool) -> Self {
        Self {
            bubbles,
            cancelable,
        }
    }
}

/// Look up the propagation flags of a supported event kind
pub fn event_preset(kind: &str) -> Option<EventPreset> {
    let preset = match kind {
        "click" | "submit" | "reset" | "keyup" | "mousedown" | "touchend" => {
            EventPreset::new(true, true)
        }
        "change" | "select" | "input" | "animationend" => EventPreset::new(true, false),
        "focus" | "blur" | "resize" | "scroll" | "orientationchange" | "hashchange" | "load"
        | "unload" => EventPreset::new(false, false),
        _ => return None,
    };
    Some(preset)
}

/// Event delivered to tracked listeners
#[derive(Clone, Debug)]
pub struct DomEvent {
    /// Event kind (e.g. "click")
    pub kind: String,
    /// Element the event was dispatched on
    pub target: ElementId,
    /// Element whose listener is currently running
    pub current_target: ElementId,
    pub bubbles: bool,
    pub cancelable: bool,
}

/// Internal element storage
#[derive(Debug)]
struct ElementNode {
    tag: String,
    attributes: IndexMap<String, String>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    listeners: Vec<ListenerRecord>,
}

impl ElementNode {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

/// Element tree with attributes and tracked listeners
///
/// A new document contains an `html` root with a single `body` child.
pub struct Document {
    nodes: SlotMap<ElementId, ElementNode>,
    root: ElementId,
    body: ElementId,
    /// Number of attribute writes performed (mutation counter)
    attribute_writes: u64,
    next_listener: u64,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("elements", &self.nodes.len())
            .field("root", &self.root)
            .field("body", &self.body)
            .field("attribute_writes", &self.attribute_writes)
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document with an `html` root and a `body` element
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(ElementNode::new("html"));
        let body = nodes.insert(ElementNode::new("body"));
        nodes[body].parent = Some(root);
        nodes[root].children.push(body);

        Self {
            nodes,
            root,
            body,
            attribute_writes: 0,
            next_listener: 0,
        }
    }

    /// The document root (`html`)
    pub fn root(&self) -> ElementId {
        self.root
    }

    /// The `body` element
    pub fn body(&self) -> ElementId {
        self.body
    }

    /// Check whether an element exists (attached or detached)
    pub fn contains(&self, element: ElementId) -> bool {
        self.nodes.contains_key(element)
    }

    /// Number of elements in the arena, detached ones included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A document always holds at least its root and body
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // =========================================================================
    // Tree structure
    // =========================================================================

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> ElementId {
        self.nodes.insert(ElementNode::new(tag))
    }

    /// Tag name of an element
    pub fn tag(&self, element: ElementId) -> Option<&str> {
        self.nodes.get(element).map(|n| n.tag.as_str())
    }

    /// Parent of an element
    pub fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.nodes.get(element).and_then(|n| n.parent)
    }

    /// Children of an element in document order
    pub fn children(&self, element: ElementId) -> &[ElementId] {
        self.nodes
            .get(element)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Append `child` as the last child of `parent`, moving it if attached elsewhere
    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), DomError> {
        self.ensure(parent)?;
        self.ensure(child)?;

        if child == self.root || child == parent || self.ancestors(parent).contains(&child) {
            return Err(DomError::HierarchyRequest { parent, child });
        }

        self.unlink(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        Ok(())
    }

    /// Detach an element (and its subtree) from its parent without destroying it
    ///
    /// Returns the detached subtree in document order.
    pub fn detach(&mut self, element: ElementId) -> Result<Vec<ElementId>, DomError> {
        self.ensure(element)?;
        if element == self.root {
            return Err(DomError::RootRemoval);
        }

        self.unlink(element);
        Ok(self.subtree(element))
    }

    /// Remove an element and its whole subtree from the document
    ///
    /// Returns the removed ids in document order. Removed ids are no longer
    /// valid afterwards.
    pub fn remove_element(&mut self, element: ElementId) -> Result<Vec<ElementId>, DomError> {
        let removed = self.detach(element)?;
        for id in &removed {
            self.nodes.remove(*id);
        }
        Ok(removed)
    }

    /// Ancestors of an element, from the immediate parent up to the root
    pub fn ancestors(&self, element: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut current = element;

        while let Some(parent) = self.parent(current) {
            result.push(parent);
            current = parent;
        }

        result
    }

    /// Whether the element is reachable from the document root
    pub fn is_connected(&self, element: ElementId) -> bool {
        if !self.nodes.contains_key(element) {
            return false;
        }
        element == self.root || self.ancestors(element).last() == Some(&self.root)
    }

    /// The element and all its descendants in document order
    pub fn subtree(&self, element: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        if !self.nodes.contains_key(element) {
            return result;
        }

        let mut stack: SmallVec<[ElementId; 16]> = SmallVec::new();
        stack.push(element);
        while let Some(id) = stack.pop() {
            result.push(id);
            // Reverse so the first child is visited first
            for child in self.children(id).iter().rev() {
                stack.push(*child);
            }
        }
        result
    }

    /// Descendants of `context` carrying `attribute`, in document order
    ///
    /// The context element itself is not included.
    pub fn query_attribute(&self, context: ElementId, attribute: &str) -> Vec<ElementId> {
        self.subtree(context)
            .into_iter()
            .skip(1)
            .filter(|id| self.has_attribute(*id, attribute))
            .collect()
    }

    /// Nearest element carrying `attribute`, starting with `element` itself
    pub fn closest(&self, element: ElementId, attribute: &str) -> Option<ElementId> {
        if self.has_attribute(element, attribute) {
            return Some(element);
        }
        self.ancestors(element)
            .into_iter()
            .find(|id| self.has_attribute(*id, attribute))
    }

    fn unlink(&mut self, element: ElementId) {
        if let Some(parent) = self.nodes[element].parent.take() {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children.retain(|c| *c != element);
            }
        }
    }

    fn ensure(&self, element: ElementId) -> Result<(), DomError> {
        if self.nodes.contains_key(element) {
            Ok(())
        } else {
            Err(DomError::UnknownElement(element))
        }
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Read an attribute
    pub fn attribute(&self, element: ElementId, name: &str) -> Option<&str> {
        self.nodes
            .get(element)
            .and_then(|n| n.attributes.get(name))
            .map(String::as_str)
    }

    /// Check whether an attribute is present
    pub fn has_attribute(&self, element: ElementId, name: &str) -> bool {
        self.nodes
            .get(element)
            .is_some_and(|n| n.attributes.contains_key(name))
    }

    /// Write an attribute, counting the write
    ///
    /// Writes to unknown elements are ignored.
    pub fn set_attribute(&mut self, element: ElementId, name: &str, value: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(element) {
            node.attributes.insert(name.to_string(), value.into());
            self.attribute_writes += 1;
        }
    }

    /// Remove an attribute, returning its previous value
    pub fn remove_attribute(&mut self, element: ElementId, name: &str) -> Option<String> {
        let previous = self.nodes.get_mut(element)?.attributes.shift_remove(name);
        if previous.is_some() {
            self.attribute_writes += 1;
        }
        previous
    }

    /// Attribute names of an element in insertion order
    pub fn attribute_names(&self, element: ElementId) -> Vec<String> {
        self.nodes
            .get(element)
            .map(|n| n.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of attribute mutations performed on this document
    pub fn attribute_writes(&self) -> u64 {
        self.attribute_writes
    }

    /// Classes of an element (whitespace separated `class` attribute)
    pub fn class_list(&self, element: ElementId) -> Vec<&str> {
        self.attribute(element, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Check whether an element carries a class
    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.class_list(element).contains(&class)
    }

    /// Add a class if not already present
    pub fn add_class(&mut self, element: ElementId, class: &str) {
        if !self.contains(element) || self.has_class(element, class) {
            return;
        }
        let value = match self.attribute(element, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attribute(element, "class", value);
    }

    // =========================================================================
    // Tracked listeners
    // =========================================================================

    /// Attach a listener and remember it on the element
    pub fn add_event_listener<F>(
        &mut self,
        element: ElementId,
        event: &str,
        use_capture: bool,
        callback: F,
    ) -> Result<ListenerId, DomError>
    where
        F: Fn(&DomEvent) + 'static,
    {
        self.ensure(element)?;
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);

        self.nodes[element].listeners.push(ListenerRecord {
            id,
            event: event.to_string(),
            use_capture,
            callback: Rc::new(callback),
        });
        Ok(id)
    }

    /// Detach a single listener; returns whether it was attached
    pub fn remove_event_listener(&mut self, element: ElementId, listener: ListenerId) -> bool {
        let Some(node) = self.nodes.get_mut(element) else {
            return false;
        };
        let before = node.listeners.len();
        node.listeners.retain(|l| l.id != listener);
        node.listeners.len() != before
    }

    /// Listeners of an element, optionally restricted to one event kind
    pub fn event_listeners(&self, element: ElementId, event: Option<&str>) -> Vec<ListenerRecord> {
        self.nodes
            .get(element)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|l| event.map_or(true, |e| l.event == e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Detach every tracked listener of an element; returns how many were removed
    pub fn clear_event_listeners(&mut self, element: ElementId) -> usize {
        self.nodes
            .get_mut(element)
            .map(|n| std::mem::take(&mut n.listeners).len())
            .unwrap_or(0)
    }

    /// Collect the listeners an event would reach, in delivery order
    ///
    /// The target comes first, followed by its ancestors when the event kind
    /// bubbles. Callbacks are cloned out so they can run without a borrow on
    /// the document.
    pub fn propagation_path(
        &self,
        target: ElementId,
        kind: &str,
    ) -> Result<Vec<(DomEvent, Vec<ListenerCallback>)>, DomError> {
        self.ensure(target)?;
        let preset = event_preset(kind).ok_or_else(|| DomError::UnsupportedEvent(kind.to_string()))?;

        let mut chain = vec![target];
        if preset.bubbles {
            chain.extend(self.ancestors(target));
        }

        let path = chain
            .into_iter()
            .map(|current| {
                let event = DomEvent {
                    kind: kind.to_string(),
                    target,
                    current_target: current,
                    bubbles: preset.bubbles,
                    cancelable: preset.cancelable,
                };
                let callbacks = self
                    .event_listeners(current, Some(kind))
                    .into_iter()
                    .map(|l| l.callback)
                    .collect();
                (event, callbacks)
            })
            .collect();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn doc_with_list() -> (Document, ElementId, ElementId, ElementId) {
        let mut doc = Document::new();
        let list = doc.create_element("ul");
        let first = doc.create_element("li");
        let second = doc.create_element("li");
        doc.append_child(doc.body(), list).unwrap();
        doc.append_child(list, first).unwrap();
        doc.append_child(list, second).unwrap();
        (doc, list, first, second)
    }

    #[test]
    fn test_new_document_has_body() {
        let doc = Document::new();
        assert_eq!(doc.tag(doc.root()), Some("html"));
        assert_eq!(doc.tag(doc.body()), Some("body"));
        assert_eq!(doc.parent(doc.body()), Some(doc.root()));
        assert!(doc.is_connected(doc.body()));
    }

    #[test]
    fn test_query_attribute_document_order() {
        let (mut doc, list, first, second) = doc_with_list();
        doc.set_attribute(second, "data-elemental", "b");
        doc.set_attribute(first, "data-elemental", "a");
        doc.set_attribute(list, "data-elemental", "list");

        assert_eq!(
            doc.query_attribute(doc.root(), "data-elemental"),
            vec![list, first, second]
        );
        // Context itself is excluded
        assert_eq!(doc.query_attribute(list, "data-elemental"), vec![first, second]);
    }

    #[test]
    fn test_closest_includes_self() {
        let (mut doc, list, first, second) = doc_with_list();
        doc.set_attribute(list, "data-tab", "");
        doc.set_attribute(second, "data-tab", "");

        assert_eq!(doc.closest(first, "data-tab"), Some(list));
        assert_eq!(doc.closest(second, "data-tab"), Some(second));
        assert_eq!(doc.closest(first, "data-panel"), None);
    }

    #[test]
    fn test_append_child_rejects_cycles() {
        let (mut doc, list, first, _) = doc_with_list();
        assert!(matches!(
            doc.append_child(first, list),
            Err(DomError::HierarchyRequest { .. })
        ));
        assert!(doc.append_child(first, first).is_err());
    }

    #[test]
    fn test_detach_and_remove() {
        let (mut doc, list, first, second) = doc_with_list();

        let detached = doc.detach(list).unwrap();
        assert_eq!(detached, vec![list, first, second]);
        assert!(!doc.is_connected(first));
        assert!(doc.contains(first));

        doc.append_child(doc.body(), list).unwrap();
        assert!(doc.is_connected(second));

        let removed = doc.remove_element(list).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(!doc.contains(second));
        assert!(doc.children(doc.body()).is_empty());
        assert!(matches!(doc.remove_element(doc.root()), Err(DomError::RootRemoval)));
    }

    #[test]
    fn test_attribute_writes_counted() {
        let (mut doc, list, _, _) = doc_with_list();
        assert_eq!(doc.attribute_writes(), 0);

        doc.set_attribute(list, "data-x", "1");
        doc.set_attribute(list, "data-x", "2");
        assert_eq!(doc.attribute(list, "data-x"), Some("2"));
        assert_eq!(doc.attribute_writes(), 2);

        assert_eq!(doc.remove_attribute(list, "data-x"), Some("2".to_string()));
        assert_eq!(doc.remove_attribute(list, "data-x"), None);
        assert_eq!(doc.attribute_writes(), 3);
    }

    #[test]
    fn test_classes() {
        let (mut doc, list, _, _) = doc_with_list();
        doc.add_class(list, "menu");
        doc.add_class(list, "menu--open");
        doc.add_class(list, "menu");
        assert_eq!(doc.class_list(list), vec!["menu", "menu--open"]);
        assert!(doc.has_class(list, "menu--open"));
    }

    #[test]
    fn test_listener_tracking() {
        let (mut doc, list, _, _) = doc_with_list();
        let click = doc.add_event_listener(list, "click", false, |_| {}).unwrap();
        doc.add_event_listener(list, "scroll", true, |_| {}).unwrap();

        assert_eq!(doc.event_listeners(list, None).len(), 2);
        assert_eq!(doc.event_listeners(list, Some("click")).len(), 1);

        assert!(doc.remove_event_listener(list, click));
        assert!(!doc.remove_event_listener(list, click));
        assert_eq!(doc.clear_event_listeners(list), 1);
        assert!(doc.event_listeners(list, None).is_empty());
    }

    #[test]
    fn test_propagation_path_bubbles() {
        let (mut doc, list, first, _) = doc_with_list();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        doc.add_event_listener(list, "click", false, move |_| h.set(h.get() + 1))
            .unwrap();
        doc.add_event_listener(list, "focus", false, |_| {}).unwrap();

        let path = doc.propagation_path(first, "click").unwrap();
        let reached: Vec<_> = path
            .iter()
            .filter(|(_, callbacks)| !callbacks.is_empty())
            .map(|(event, _)| event.current_target)
            .collect();
        assert_eq!(reached, vec![list]);

        // focus does not bubble to the list
        let path = doc.propagation_path(first, "focus").unwrap();
        assert_eq!(path.len(), 1);

        assert!(matches!(
            doc.propagation_path(first, "teleport"),
            Err(DomError::UnsupportedEvent(_))
        ));
    }
}
