//! Two distinct mutable maps carried on an [`InvocationContext`](crate::context::InvocationContext):
//!
//! - [`ContextData`]: an ordered text-keyed map of opaque, conceptually
//!   serializable values, written by the caller and interceptors before the
//!   request is sent.
//! - [`Attachments`]: a typed key/value map, inherited from a shared base
//!   and writable by any party at any time (most notably: the weak-affinity
//!   hint deposited during the result pass, see [`WEAK_AFFINITY`]).
//!
//! Neither map reaches for a third-party ordered-map crate: the teacher's
//! own `MetadataMap` wraps an order-preserving `http::HeaderMap` rather than
//! pulling in `indexmap`, and an insertion-ordered `Vec` plays the same role
//! here without fabricating a dependency the teacher never declared.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Key used to deposit a routing hint on the attachments map during the
/// result pass (§4.1). The value is read back by the core and applied to
/// the owning [`ProxyHandler`](crate::proxy::ProxyHandler) via
/// `set_weak_affinity`.
pub const WEAK_AFFINITY: &str = "weak-affinity";

/// An opaque, conceptually serializable value stored in [`ContextData`].
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Ordered mapping from text key to opaque value, created lazily.
///
/// Insertion order is preserved; re-inserting an existing key updates the
/// value in place without moving it to the end, matching the semantics of
/// a typical ordered property bag.
#[derive(Default, Clone)]
pub struct ContextData {
    entries: Vec<(String, ContextValue)>,
}

impl ContextData {
    /// Creates an empty context-data map without allocating.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Inserts or updates `key` with `value`, preserving the key's original
    /// position if it already existed.
    pub fn insert(&mut self, key: impl Into<String>, value: ContextValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|(k, _)| k)).finish()
    }
}

/// Typed attachment map. Keys are plain strings (the "weak-affinity" slot
/// is the one name the core itself reads); values are type-erased and
/// downcast on read.
#[derive(Default, Clone)]
pub struct Attachments {
    entries: Vec<(String, Arc<dyn Any + Send + Sync>, TypeId)>,
}

impl Attachments {
    /// Creates an empty attachment map.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Attaches `value` under `key`, replacing any prior value for that key.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        let boxed: Arc<dyn Any + Send + Sync> = Arc::new(value);
        let type_id = TypeId::of::<T>();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _, _)| *k == key) {
            *slot = (key, boxed, type_id);
        } else {
            self.entries.push((key, boxed, type_id));
        }
    }

    /// Reads back an attachment previously stored under `key` with type `T`.
    /// Returns `None` if absent or stored under a different type.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let (_, value, type_id) = self.entries.iter().find(|(k, _, _)| k == key)?;
        if *type_id != TypeId::of::<T>() {
            return None;
        }
        Arc::clone(value).downcast::<T>().ok()
    }

    /// Removes an attachment, returning whether one was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _, _)| k != key);
        self.entries.len() != before
    }

    /// Reads back an attachment without knowing or checking its concrete
    /// type. Used by the core itself for the one attachment it reads
    /// generically: the [`WEAK_AFFINITY`] hint, deposited by interceptors
    /// under whatever type suits them.
    pub fn get_any(&self, key: &str) -> Option<ContextValue> {
        self.entries
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, value, _)| Arc::clone(value))
    }
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|(k, _, _)| k)).finish()
    }
}
