//! Reaction Implementation
//!
//! A Reaction is a side-effecting procedure that re-runs whenever a tracked
//! property it read changes.
//!
//! # How Reactions Work
//!
//! 1. When registered through [`Runtime::autorun`](super::Runtime::autorun),
//!    the reaction runs immediately inside the tracking context so that its
//!    reads register it as a dependent.
//!
//! 2. When any of those properties is written, the reaction re-runs, again
//!    inside the tracking context.
//!
//! 3. Dependencies accumulate across runs; they are not cleared before a
//!    re-run. A reaction that stops reading a property keeps being re-run by
//!    it until the reaction is disposed.
//!
//! # Identity
//!
//! Reactions are compared by identity. Clones of a `Reaction` share one
//! [`ReactionId`] and count as the same reaction; two reactions built from
//! identical closures are different reactions.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{BoxError, Error, Result};

/// Unique identifier for a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactionId(u64);

impl ReactionId {
    /// Generate a new unique reaction ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Something a reaction registered on and can unregister from on disposal.
pub(crate) trait Source: Send + Sync {
    /// Remove the reaction from this source's dependents.
    ///
    /// Returns `true` if it was present.
    fn remove_dependent(&self, reaction: ReactionId) -> bool;
}

type Body = dyn Fn() -> std::result::Result<(), BoxError> + Send + Sync;

struct ReactionInner {
    id: ReactionId,
    body: Box<Body>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
    /// Properties this reaction was added to, for disposal.
    /// Weak so a reaction never keeps a property alive.
    sources: Mutex<Vec<Weak<dyn Source>>>,
}

/// A registered side-effecting procedure.
///
/// # Example
///
/// ```rust
/// use ripple_core::{ObservedObject, Runtime};
///
/// let runtime = Runtime::new();
/// let state: ObservedObject<i32> = [("count", 0)].into_iter().collect();
/// runtime.observe(&state);
///
/// let view = state.clone();
/// let reaction = runtime
///     .autorun(move || println!("count is {:?}", view.get("count")))
///     .unwrap();
///
/// state.set("count", 5).unwrap(); // prints "count is Some(5)"
/// assert_eq!(reaction.run_count(), 2);
///
/// reaction.dispose();
/// state.set("count", 6).unwrap(); // prints nothing
/// ```
#[derive(Clone)]
pub struct Reaction {
    inner: Arc<ReactionInner>,
}

impl Reaction {
    /// Create a reaction from an infallible procedure.
    ///
    /// A panic inside `body` unwinds through whoever ran the reaction.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::from_body(Box::new(move || {
            body();
            Ok(())
        }))
    }

    /// Create a reaction from a fallible procedure.
    ///
    /// An error returned by `body` is reported as
    /// [`Error::ReactionFailed`] to whoever ran the reaction.
    pub fn fallible<F, E>(body: F) -> Self
    where
        F: Fn() -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::from_body(Box::new(move || body().map_err(Into::into)))
    }

    fn from_body(body: Box<Body>) -> Self {
        Self {
            inner: Arc::new(ReactionInner {
                id: ReactionId::next(),
                body,
                disposed: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
                sources: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get the reaction's unique ID.
    pub fn id(&self) -> ReactionId {
        self.inner.id
    }

    /// Number of times the reaction body has been invoked, failed runs
    /// included.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of tracked properties this reaction is registered on.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .sources
            .lock()
            .iter()
            .filter(|source| source.strong_count() > 0)
            .count()
    }

    /// Check if the reaction has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Dispose of the reaction.
    ///
    /// The reaction is removed from the dependent set of every property it
    /// registered on and never runs again. Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let sources = std::mem::take(&mut *self.inner.sources.lock());
        let removed = sources
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|source| source.remove_dependent(self.inner.id))
            .count();

        tracing::debug!(reaction = %self.inner.id, removed, "disposed reaction");
    }

    /// Invoke the body once, without touching the tracking context.
    pub(crate) fn invoke(&self) -> Result<()> {
        self.inner.run_count.fetch_add(1, Ordering::SeqCst);
        (self.inner.body)().map_err(|source| Error::ReactionFailed {
            reaction: self.inner.id,
            source,
        })
    }

    /// Remember that this reaction was added to `source`'s dependents.
    ///
    /// Entries whose property has been dropped are pruned first.
    pub(crate) fn record_source(&self, source: Weak<dyn Source>) {
        let mut sources = self.inner.sources.lock();
        sources.retain(|known| known.strong_count() > 0);
        sources.push(source);
    }
}

impl PartialEq for Reaction {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Reaction {}

impl Hash for Reaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

// Hash and Eq both go through the id, so sets of reactions can be looked up
// by id alone.
impl Borrow<ReactionId> for Reaction {
    fn borrow(&self) -> &ReactionId {
        &self.inner.id
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
