//! Keyed element storage
//!
//! Associates arbitrary values with elements under string keys, the way
//! jQuery-style `data()` stores do. Unlike a weak map, entries are not tied to
//! the element's lifetime: they are dropped explicitly with
//! [`KeyedElementStore::remove`] / [`KeyedElementStore::evict`], and the
//! runtime evicts them when it observes the element leaving the document.
//!
//! # Example
//!
//! ```rust
//! use elemental_core::dom::Document;
//! use elemental_core::store::KeyedElementStore;
//!
//! let mut doc = Document::new();
//! let el = doc.create_element("div");
//!
//! let store = KeyedElementStore::new();
//! store.put(el, "open", true);
//! assert_eq!(store.get::<bool>(el, "open"), Some(true));
//!
//! store.remove(el, "open");
//! assert!(store.is_empty());
//! ```

use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;

use crate::dom::ElementId;

type Entry = FxHashMap<String, Box<dyn Any>>;

/// Per-element key/value storage holding type-erased values
#[derive(Default)]
pub struct KeyedElementStore {
    entries: RefCell<FxHashMap<ElementId, Entry>>,
}

impl std::fmt::Debug for KeyedElementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedElementStore")
            .field("elements", &self.len())
            .finish()
    }
}

impl KeyedElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key` for `element`, replacing any previous value
    pub fn put<T: 'static>(&self, element: ElementId, key: &str, value: T) {
        self.entries
            .borrow_mut()
            .entry(element)
            .or_default()
            .insert(key.to_string(), Box::new(value));
    }

    /// Get a clone of the value under `key`, if present and of type `T`
    pub fn get<T: Clone + 'static>(&self, element: ElementId, key: &str) -> Option<T> {
        self.entries
            .borrow()
            .get(&element)
            .and_then(|entry| entry.get(key))
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Mutate the value under `key` in place
    ///
    /// Returns `None` when the key is missing or holds another type. The
    /// closure must not re-enter the store.
    pub fn update<T: 'static, R>(
        &self,
        element: ElementId,
        key: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.borrow_mut();
        let value = entries.get_mut(&element)?.get_mut(key)?;
        value.downcast_mut::<T>().map(f)
    }

    /// Check whether `element` has a value under `key`
    pub fn has(&self, element: ElementId, key: &str) -> bool {
        self.entries
            .borrow()
            .get(&element)
            .is_some_and(|entry| entry.contains_key(key))
    }

    /// Keys stored for an element
    pub fn keys(&self, element: ElementId) -> Vec<String> {
        self.entries
            .borrow()
            .get(&element)
            .map(|entry| entry.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a single key; the element's entry is dropped once empty
    ///
    /// Returns whether the key was present.
    pub fn remove(&self, element: ElementId, key: &str) -> bool {
        // Take the value out first so its destructor runs without the borrow held
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(&element) else {
                return false;
            };
            let removed = entry.remove(key);
            if entry.is_empty() {
                entries.remove(&element);
            }
            removed
        };
        removed.is_some()
    }

    /// Drop every value stored for an element
    pub fn remove_all(&self, element: ElementId) -> bool {
        let removed = self.entries.borrow_mut().remove(&element);
        removed.is_some()
    }

    /// Evict an element's state (garbage collection fallback)
    pub fn evict(&self, element: ElementId) -> bool {
        let evicted = self.remove_all(element);
        if evicted {
            tracing::trace!("Evicted stored state for element {:?}", element);
        }
        evicted
    }

    /// Number of elements holding at least one value
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything
    pub fn clear(&self) {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        drop(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn elements() -> (ElementId, ElementId) {
        let mut doc = Document::new();
        (doc.create_element("div"), doc.create_element("span"))
    }

    #[test]
    fn test_put_get() {
        let (a, b) = elements();
        let store = KeyedElementStore::new();

        store.put(a, "label", "menu".to_string());
        store.put(a, "count", 3u32);

        assert_eq!(store.get::<String>(a, "label"), Some("menu".to_string()));
        assert_eq!(store.get::<u32>(a, "count"), Some(3));
        // Wrong type or other element
        assert_eq!(store.get::<i64>(a, "count"), None);
        assert_eq!(store.get::<u32>(b, "count"), None);
        assert!(store.has(a, "label"));
        assert!(!store.has(b, "label"));
    }

    #[test]
    fn test_entry_dropped_when_empty() {
        let (a, _) = elements();
        let store = KeyedElementStore::new();

        store.put(a, "one", 1);
        store.put(a, "two", 2);
        assert!(store.remove(a, "one"));
        assert_eq!(store.len(), 1);
        assert!(store.remove(a, "two"));
        assert!(store.is_empty());
        assert!(!store.remove(a, "two"));
    }

    #[test]
    fn test_update_in_place() {
        let (a, _) = elements();
        let store = KeyedElementStore::new();
        store.put(a, "items", vec![1, 2]);

        let len = store.update(a, "items", |v: &mut Vec<i32>| {
            v.push(3);
            v.len()
        });
        assert_eq!(len, Some(3));
        assert_eq!(store.get::<Vec<i32>>(a, "items"), Some(vec![1, 2, 3]));
        assert_eq!(store.update(a, "missing", |v: &mut Vec<i32>| v.len()), None);
    }

    #[test]
    fn test_evict() {
        let (a, b) = elements();
        let store = KeyedElementStore::new();
        store.put(a, "x", 1);
        store.put(a, "y", 2);
        store.put(b, "x", 3);

        assert!(store.evict(a));
        assert!(!store.evict(a));
        assert!(store.keys(a).is_empty());
        assert_eq!(store.get::<i32>(b, "x"), Some(3));

        store.clear();
        assert!(store.is_empty());
    }
}
