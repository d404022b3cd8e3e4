// layer.rs — A named, ordered collection of elements.

use serde::{Deserialize, Serialize};

use crate::element::Element;

/// One layer of the model (e.g., "business", "application", "technology").
///
/// `dirty` is in-memory bookkeeping only: it is set by mutations and cleared
/// when the layer is saved. It is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub name: String,

    #[serde(default)]
    pub elements: Vec<Element>,

    #[serde(skip)]
    dirty: bool,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
            dirty: false,
        }
    }

    /// Build a layer with initial elements (not marked dirty).
    pub fn with_elements(name: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            name: name.into(),
            elements,
            dirty: false,
        }
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Mutable access to an element. Marks the layer dirty when found.
    pub fn element_mut(&mut self, id: &str) -> Option<&mut Element> {
        let found = self.elements.iter_mut().find(|e| e.id == id);
        if found.is_some() {
            self.dirty = true;
        }
        found
    }

    pub fn contains(&self, id: &str) -> bool {
        self.element(id).is_some()
    }

    /// Append an element. Returns false (and changes nothing) if an element
    /// with the same id is already present.
    pub fn add_element(&mut self, element: Element) -> bool {
        if self.contains(&element.id) {
            return false;
        }
        self.elements.push(element);
        self.dirty = true;
        true
    }

    /// Remove an element by id, returning it if it was present.
    pub fn remove_element(&mut self, id: &str) -> Option<Element> {
        let pos = self.elements.iter().position(|e| e.id == id)?;
        self.dirty = true;
        Some(self.elements.remove(pos))
    }

    /// Replace an element in place. Returns false if no element has that id.
    pub fn replace_element(&mut self, element: Element) -> bool {
        match self.elements.iter_mut().find(|e| e.id == element.id) {
            Some(slot) => {
                *slot = element;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Deep copy of this layer with the dirty flag cleared.
    pub fn clean_clone(&self) -> Self {
        let mut copy = self.clone();
        copy.dirty = false;
        copy
    }
}
