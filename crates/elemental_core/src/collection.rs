//! Instance registry
//!
//! Lists of live behavior instances per element and behavior name, stored in
//! a [`KeyedElementStore`] under `elementals.<name>`. Instances are compared by
//! identity, so adding the same handle twice keeps a single entry.

use std::rc::Rc;

use crate::behavior::InstanceHandle;
use crate::dom::ElementId;
use crate::store::KeyedElementStore;

const KEY_PREFIX: &str = "elementals.";

type InstanceList = Vec<InstanceHandle>;

/// Store key holding the instances of one behavior name
pub fn storage_key(name: &str) -> String {
    format!("{}{}", KEY_PREFIX, name)
}

/// Registry of behavior instances bound to elements
#[derive(Debug, Clone)]
pub struct InstanceRegistry {
    store: Rc<KeyedElementStore>,
}

impl InstanceRegistry {
    pub fn new(store: Rc<KeyedElementStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Rc<KeyedElementStore> {
        &self.store
    }

    /// Append an instance unless the same handle is already registered
    pub fn add(&self, element: ElementId, name: &str, instance: InstanceHandle) {
        let key = storage_key(name);
        let added = self.store.update(element, &key, |list: &mut InstanceList| {
            if list.iter().any(|i| i.ptr_eq(&instance)) {
                false
            } else {
                list.push(instance.clone());
                true
            }
        });

        match added {
            Some(true) => tracing::trace!("Registered another '{}' on {:?}", name, element),
            Some(false) => tracing::trace!("'{}' already registered on {:?}", name, element),
            None => self.store.put(element, &key, vec![instance]),
        }
    }

    /// Remove an instance, or every instance of `name` when `instance` is `None`
    ///
    /// The key is deleted once its list is empty; otherwise the filtered list
    /// is written back.
    pub fn remove(&self, element: ElementId, name: &str, instance: Option<&InstanceHandle>) {
        let key = storage_key(name);
        let Some(instance) = instance else {
            self.store.remove(element, &key);
            return;
        };

        let removed = self
            .store
            .update(element, &key, |list: &mut InstanceList| {
                let (removed, kept): (InstanceList, InstanceList) =
                    list.drain(..).partition(|i| i.ptr_eq(instance));
                *list = kept;
                removed
            })
            .unwrap_or_default();

        if self.get_all_for_element(element, name).is_empty() {
            self.store.remove(element, &key);
        }
        // Handles released after the store borrow ends
        drop(removed);
    }

    /// First instance of `name` carrying the given id
    pub fn get_by_id(&self, element: ElementId, name: &str, id: &str) -> Option<InstanceHandle> {
        self.get_all_for_element(element, name)
            .into_iter()
            .find(|i| i.id().as_deref() == Some(id))
    }

    /// First instance of `name`
    pub fn get_by_name(&self, element: ElementId, name: &str) -> Option<InstanceHandle> {
        self.get_all_for_element(element, name).into_iter().next()
    }

    /// Every instance of `name` (empty when none)
    pub fn get_all_for_element(&self, element: ElementId, name: &str) -> Vec<InstanceHandle> {
        self.store
            .get::<InstanceList>(element, &storage_key(name))
            .unwrap_or_default()
    }

    /// Behavior names with at least one instance on the element
    pub fn names(&self, element: ElementId) -> Vec<String> {
        self.store
            .keys(element)
            .into_iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect()
    }
}
