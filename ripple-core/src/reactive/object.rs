//! Observed Objects
//!
//! An `ObservedObject` is a plain key/value map that a [`Runtime`] can
//! augment in place. Until it is observed, every entry is a plain value.
//! [`Runtime::observe`] swaps each current entry for a [`TrackedProperty`]
//! holding the same value; [`Runtime::observe_key`] does the same for one
//! key.
//!
//! Keys added after `observe` are plain entries. Reading them registers no
//! dependency and writing them re-runs nothing.
//!
//! Handles are shared: a clone moved into a reaction sees and writes the
//! same entries as the handle it was cloned from.

use std::fmt;
use std::sync::Arc;

use indexmap::map::Entry;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::property::TrackedProperty;
use super::runtime::Runtime;
use crate::error::{Error, Result};

enum Slot<V> {
    Plain(V),
    Tracked(TrackedProperty<V>),
}

/// A shared key/value object whose keys can be made reactive.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use ripple_core::{ObservedObject, Runtime};
/// use serde_json::json;
///
/// let runtime = Runtime::new();
/// let obj = ObservedObject::from_json(json!({ "a": 10 })).unwrap();
/// runtime.observe(&obj);
///
/// let log = Arc::new(Mutex::new(Vec::new()));
/// let (view, sink) = (obj.clone(), log.clone());
/// runtime.autorun(move || sink.lock().push(view.get("a"))).unwrap();
///
/// obj.set("a", json!(11)).unwrap();
/// obj.set("a", json!(11)).unwrap();
///
/// assert_eq!(
///     *log.lock(),
///     vec![Some(json!(10)), Some(json!(11)), Some(json!(11))]
/// );
/// ```
pub struct ObservedObject<V = Value> {
    entries: Arc<RwLock<IndexMap<String, Slot<V>>>>,
}

impl<V> ObservedObject<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty object.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Read `key`.
    ///
    /// Reading a reactive key registers the running reaction as a
    /// dependent. Returns `None` if the key does not exist.
    pub fn get(&self, key: &str) -> Option<V> {
        // Release the map before touching the property; the read may
        // happen inside a reaction that is about to write this object.
        let property = match self.entries.read().get(key)? {
            Slot::Plain(value) => return Some(value.clone()),
            Slot::Tracked(property) => property.clone(),
        };
        Some(property.get())
    }

    /// Read `key` without registering a dependency.
    pub fn get_untracked(&self, key: &str) -> Option<V> {
        match self.entries.read().get(key)? {
            Slot::Plain(value) => Some(value.clone()),
            Slot::Tracked(property) => Some(property.get_untracked()),
        }
    }

    /// Write `key`.
    ///
    /// Writing a reactive key re-runs its dependents before returning, and
    /// returns the first dependent failure. Plain keys are overwritten and
    /// missing keys are added as plain entries.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<()> {
        let property = match self.entries.write().entry(key.into()) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Slot::Tracked(property) => property.clone(),
                Slot::Plain(slot) => {
                    *slot = value;
                    return Ok(());
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(Slot::Plain(value));
                return Ok(());
            }
        };
        property.set(value)
    }

    /// Compute a new value for `key` from its current one and write it.
    ///
    /// The current value is read without registering a dependency.
    pub fn update(&self, key: &str, f: impl FnOnce(&V) -> V) -> Result<()> {
        let current = self
            .get_untracked(key)
            .ok_or_else(|| Error::UnknownKey(key.to_owned()))?;
        self.set(key, f(&current))
    }

    /// Remove `key`, returning its value.
    ///
    /// Reactions that depended on it are not re-run and keep the property
    /// alive until they are disposed.
    pub fn remove(&self, key: &str) -> Option<V> {
        match self.entries.write().shift_remove(key)? {
            Slot::Plain(value) => Some(value),
            Slot::Tracked(property) => Some(property.get_untracked()),
        }
    }

    /// The tracked property behind `key`, if the key is reactive.
    pub fn property(&self, key: &str) -> Option<TrackedProperty<V>> {
        match self.entries.read().get(key)? {
            Slot::Tracked(property) => Some(property.clone()),
            Slot::Plain(_) => None,
        }
    }

    /// Check if `key` is reactive.
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(self.entries.read().get(key), Some(Slot::Tracked(_)))
    }

    /// Number of reactions depending on `key`; 0 for plain or missing keys.
    pub fn dependent_count(&self, key: &str) -> usize {
        self.property(key)
            .map_or(0, |property| property.dependent_count())
    }

    /// Check if `key` exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// All keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the object has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy every value out without registering dependencies.
    pub fn snapshot(&self) -> IndexMap<String, V> {
        self.entries
            .read()
            .iter()
            .map(|(key, slot)| {
                let value = match slot {
                    Slot::Plain(value) => value.clone(),
                    Slot::Tracked(property) => property.get_untracked(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Install tracked properties for every plain entry.
    ///
    /// Returns how many entries were converted.
    pub(crate) fn make_reactive(&self, runtime: &Runtime) -> usize {
        let mut entries = self.entries.write();
        let mut installed = 0;

        for slot in entries.values_mut() {
            if let Slot::Plain(value) = slot {
                let property = runtime.tracked(value.clone());
                *slot = Slot::Tracked(property);
                installed += 1;
            }
        }

        installed
    }

    pub(crate) fn make_key_reactive(
        &self,
        runtime: &Runtime,
        key: String,
        initial: V,
    ) -> TrackedProperty<V> {
        let mut entries = self.entries.write();

        match entries.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Slot::Tracked(property) = entry.get() {
                    property.reset(initial);
                    return property.clone();
                }
                let property = runtime.tracked(initial);
                entry.insert(Slot::Tracked(property.clone()));
                property
            }
            Entry::Vacant(entry) => {
                let property = runtime.tracked(initial);
                entry.insert(Slot::Tracked(property.clone()));
                property
            }
        }
    }
}

impl ObservedObject<Value> {
    /// Build an object from a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Err(Error::NotAnObject),
        }
    }

    /// Build an object from anything that serializes to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Self::from_json(serde_json::to_value(value)?)
    }

    /// Read `key` (tracked, like [`get`](Self::get)) and deserialize it.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::from)
    }

    /// Serialize `value` and write it to `key`, like [`set`](Self::set).
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }

    /// Copy the object out as a JSON object without registering dependencies.
    pub fn to_json(&self) -> Value {
        Value::Object(self.snapshot().into_iter().collect())
    }
}

impl<V> Clone for ObservedObject<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for ObservedObject<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for ObservedObject<V>
where
    K: Into<String>,
    V: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(key, value)| (key.into(), Slot::Plain(value)))
            .collect();

        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }
}

impl<V> fmt::Debug for ObservedObject<V>
where
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut map = f.debug_map();
        for (key, slot) in entries.iter() {
            match slot {
                Slot::Plain(value) => map.entry(key, value),
                Slot::Tracked(property) => map.entry(key, property),
            };
        }
        map.finish()
    }
}
