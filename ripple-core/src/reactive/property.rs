//! Tracked Property Implementation
//!
//! A tracked property is the fundamental reactive cell. It holds a value and
//! the set of reactions that depend on it.
//!
//! # How Tracked Properties Work
//!
//! 1. When the property is read while a reaction is running, that reaction
//!    is added to the dependent set, unless it is already there.
//!
//! 2. When the property is written, every dependent re-runs synchronously,
//!    in the order the dependents were added, before the write returns.
//!
//! 3. Writing a value equal to the current one still re-runs every
//!    dependent. There is no equality check.
//!
//! # Failure Policy
//!
//! If a dependent fails while a write propagates, the write stops there and
//! returns the error. The new value stays stored and the dependents after
//! the failing one do not run for this write.
//!
//! # Re-entrancy
//!
//! A dependent may itself write tracked properties. The nested write runs
//! its own dependents to completion before the outer write moves on to its
//! next dependent. Nothing detects cycles: a reaction that writes a
//! property it reads recurses until the stack overflows, unless
//! [`RuntimeConfig::max_depth`](super::RuntimeConfig) is set.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::reaction::{Reaction, ReactionId, Source};
use super::runtime::Runtime;
use crate::error::Result;

/// Unique identifier for a tracked property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u64);

impl PropertyId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

struct PropertyInner<T> {
    id: PropertyId,
    runtime: Runtime,
    value: RwLock<T>,
    /// Insertion-ordered and unique by reaction identity.
    dependents: Mutex<IndexSet<Reaction>>,
}

impl<T> Source for PropertyInner<T>
where
    T: Send + Sync,
{
    fn remove_dependent(&self, reaction: ReactionId) -> bool {
        self.dependents.lock().shift_remove(&reaction)
    }
}

/// A reactive cell bound to one [`Runtime`].
///
/// Created by [`Runtime::tracked`], or installed on an observed object by
/// [`Runtime::observe`] and [`Runtime::observe_key`]. Clones share the
/// value and the dependent set.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
/// use ripple_core::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.tracked(1);
/// let seen = Arc::new(AtomicI32::new(0));
///
/// let (reader, sink) = (count.clone(), seen.clone());
/// runtime
///     .autorun(move || sink.store(reader.get(), Ordering::SeqCst))
///     .unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
///
/// count.set(7).unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 7);
/// ```
pub struct TrackedProperty<T> {
    inner: Arc<PropertyInner<T>>,
}

impl<T> TrackedProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(runtime: Runtime, value: T) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                id: PropertyId::next(),
                runtime,
                value: RwLock::new(value),
                dependents: Mutex::new(IndexSet::new()),
            }),
        }
    }

    /// Get the property's unique ID.
    pub fn id(&self) -> PropertyId {
        self.inner.id
    }

    /// The runtime whose reactions this property tracks.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Get the current value.
    ///
    /// If a reaction of this property's runtime is running on the calling
    /// thread, it is registered as a dependent.
    pub fn get(&self) -> T {
        self.track();
        self.get_untracked()
    }

    /// Borrow the current value, registering a dependency like [`get`](Self::get).
    ///
    /// The value is read-locked while `f` runs, so `f` must not write this
    /// property. Reading it again inside `f` is fine, even with a writer
    /// waiting on another thread.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        self.with_untracked(f)
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read_recursive().clone()
    }

    /// Borrow the current value without registering a dependency.
    ///
    /// Same locking rules as [`with`](Self::with).
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read_recursive())
    }

    /// Store a new value and re-run every dependent.
    ///
    /// Returns the first dependent failure, see the module docs for the
    /// failure policy.
    pub fn set(&self, value: T) -> Result<()> {
        *self.inner.value.write() = value;
        self.notify()
    }

    /// Compute a new value from the current one and [`set`](Self::set) it.
    ///
    /// The current value is read without registering a dependency.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let value = self.with_untracked(f);
        self.set(value)
    }

    /// Number of reactions in the dependent set.
    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.lock().len()
    }

    /// Check if `reaction` is in the dependent set.
    pub fn has_dependent(&self, reaction: &Reaction) -> bool {
        self.inner.dependents.lock().contains(&reaction.id())
    }

    /// Overwrite the value without notifying dependents.
    pub(crate) fn reset(&self, value: T) {
        *self.inner.value.write() = value;
    }

    fn track(&self) {
        let Some(reaction) = self.inner.runtime.current_reaction() else {
            return;
        };
        if reaction.is_disposed() {
            return;
        }

        let inserted = self.inner.dependents.lock().insert(reaction.clone());
        if inserted {
            let source: Weak<PropertyInner<T>> = Arc::downgrade(&self.inner);
            reaction.record_source(source);

            tracing::trace!(
                property = %self.inner.id,
                reaction = %reaction.id(),
                "registered dependent"
            );
        }
    }

    fn notify(&self) -> Result<()> {
        // Snapshot so no lock is held while reactions run; reactions that
        // register during this write are not invoked by it.
        let dependents: SmallVec<[Reaction; 4]> =
            self.inner.dependents.lock().iter().cloned().collect();

        if dependents.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            runtime = %self.inner.runtime.config().name,
            property = %self.inner.id,
            dependents = dependents.len(),
            "propagating write"
        );

        for reaction in &dependents {
            if let Err(err) = self.inner.runtime.run_tracked(reaction) {
                tracing::debug!(
                    property = %self.inner.id,
                    reaction = %reaction.id(),
                    "aborting propagation"
                );
                return Err(err);
            }
        }

        Ok(())
    }
}

impl<T> Clone for TrackedProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for TrackedProperty<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedProperty")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read_recursive())
            .field("dependent_count", &self.inner.dependents.lock().len())
            .finish()
    }
}
