//! Identity-deduplicated ordered collection
//!
//! Accumulates paginated results without duplicates while preserving the
//! order items were first seen in. Membership is checked with a linear scan,
//! which is fine at history-retrieval sizes: the set lives for one retrieval
//! operation and only ever grows by appending.

/// Capability for items carrying a stable string identity.
pub trait HasId {
    fn id(&self) -> &str;
}

/// Ordered set of `T`, unique by [`HasId::id`].
#[derive(Debug, Clone)]
pub struct IdSet<T: HasId> {
    items: Vec<T>,
}

impl<T: HasId> IdSet<T> {
    /// Create an empty set with a soft capacity hint.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Append `item` unless one with the same id is already present.
    /// Returns whether the set grew.
    pub fn add(&mut self, item: T) -> bool {
        if self.contains(item.id()) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Append every item in order, ignoring duplicates.
    pub fn add_all<I: IntoIterator<Item = T>>(&mut self, items: I) {
        for item in items {
            self.add(item);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id() == id)
    }

    /// Look up an item by id.
    pub fn find(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Read-only view of the accumulated items, in first-seen order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T: HasId> Default for IdSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}
