//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactions and
//! tracked properties. It owns the tracking context, registers reactions
//! and installs tracked properties on observed objects.
//!
//! # How It Works
//!
//! 1. [`Runtime::autorun`] enters the tracking context with a new reaction,
//!    runs it once and leaves the context.
//!
//! 2. While the reaction runs, every tracked property it reads adds the
//!    reaction to its dependent set.
//!
//! 3. When one of those properties is written, it re-runs each dependent
//!    through [`Runtime::run_tracked`], so every re-run is tracked as well.
//!
//! # Isolation
//!
//! There is no global runtime. Each `Runtime` has its own tracking context,
//! and within it each thread has its own stack of running reactions, so
//! runtimes and threads never attribute reads to each other's reactions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::TrackingContext;
use super::object::ObservedObject;
use super::property::TrackedProperty;
use super::reaction::Reaction;
use crate::error::{BoxError, Error, Result};

/// Runtime settings.
///
/// Deserializable with every field optional, so it can be embedded in a
/// host application's own configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Label recorded on the runtime's tracing events.
    pub name: String,

    /// Maximum number of reactions nested on one thread.
    ///
    /// `None` (the default) means unlimited: a reaction that writes a
    /// property it depends on recurses until the stack overflows. With a
    /// limit, running one more reaction beyond it fails with
    /// [`Error::DepthExceeded`].
    pub max_depth: Option<usize>,
}

impl RuntimeConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tracing label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Limit reaction nesting.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "ripple".to_owned(),
            max_depth: None,
        }
    }
}

/// Disposes a reaction whose first run did not succeed.
struct FirstRun<'a> {
    reaction: &'a Reaction,
    succeeded: bool,
}

impl Drop for FirstRun<'_> {
    fn drop(&mut self) {
        if !self.succeeded {
            self.reaction.dispose();
        }
    }
}

struct RuntimeInner {
    config: RuntimeConfig,
    context: TrackingContext,
}

/// A reactive runtime.
///
/// Cheap to clone; clones share the tracking context.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                context: TrackingContext::new(),
            }),
        }
    }

    /// The runtime's configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Register a reaction and run it once under tracking.
    ///
    /// The reaction re-runs on every later write to a tracked property it
    /// read. A panic in `reaction` propagates to the caller after the
    /// tracking context has been restored; if it happens during the first
    /// run, the reaction is disposed as well.
    pub fn autorun<F>(&self, reaction: F) -> Result<Reaction>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.start(Reaction::new(reaction))
    }

    /// Register a fallible reaction and run it once under tracking.
    ///
    /// If the first run fails the error is returned and the reaction is
    /// disposed, so it does not linger in dependent sets without a handle.
    /// The same applies when the first run panics.
    /// Failures of later runs are returned from the write that caused them.
    pub fn try_autorun<F, E>(&self, reaction: F) -> Result<Reaction>
    where
        F: Fn() -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.start(Reaction::fallible(reaction))
    }

    fn start(&self, reaction: Reaction) -> Result<Reaction> {
        tracing::debug!(
            runtime = %self.inner.config.name,
            reaction = %reaction.id(),
            "registering reaction"
        );

        // Disposes on an error return and while unwinding from a panic.
        let mut first_run = FirstRun {
            reaction: &reaction,
            succeeded: false,
        };
        let result = self.run_tracked(&reaction);
        first_run.succeeded = result.is_ok();
        drop(first_run);

        result.map(|()| reaction)
    }

    /// Run `reaction` once with it as the active reaction.
    ///
    /// The tracking context is restored on every exit path. Disposed
    /// reactions are skipped.
    pub fn run_tracked(&self, reaction: &Reaction) -> Result<()> {
        if reaction.is_disposed() {
            return Ok(());
        }

        if let Some(limit) = self.inner.config.max_depth {
            if self.inner.context.depth() >= limit {
                return Err(Error::DepthExceeded { limit });
            }
        }

        let _guard = self.inner.context.enter(reaction.clone());
        reaction.invoke()
    }

    /// The reaction running on the calling thread, if any.
    pub fn current_reaction(&self) -> Option<Reaction> {
        self.inner.context.current_reaction()
    }

    /// Check if a reaction is running on the calling thread.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_active()
    }

    /// Create a standalone tracked property bound to this runtime.
    pub fn tracked<T>(&self, value: T) -> TrackedProperty<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        TrackedProperty::new(self.clone(), value)
    }

    /// Make every key currently on `object` reactive.
    ///
    /// Keys added to `object` after this call stay plain: writing them
    /// triggers nothing. Call `observe` again, or [`observe_key`](Self::observe_key),
    /// to make them reactive. Keys that are already reactive keep their
    /// dependents.
    pub fn observe<V>(&self, object: &ObservedObject<V>)
    where
        V: Clone + Send + Sync + 'static,
    {
        let installed = object.make_reactive(self);
        tracing::debug!(runtime = %self.inner.config.name, installed, "observed object");
    }

    /// Make one key of `object` reactive, starting at `initial`.
    ///
    /// The key is created if absent. If it is already reactive its value is
    /// reset to `initial` without re-running dependents, and the dependents
    /// are kept.
    pub fn observe_key<V>(
        &self,
        object: &ObservedObject<V>,
        key: impl Into<String>,
        initial: V,
    ) -> TrackedProperty<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        object.make_key_reactive(self, key.into(), initial)
    }

    /// Check if two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("context", &self.inner.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn autorun_runs_immediately_under_tracking() {
        let runtime = Runtime::new();
        let observed = Arc::new(parking_lot::Mutex::new(None));

        let (rt, slot) = (runtime.clone(), observed.clone());
        let reaction = runtime
            .autorun(move || *slot.lock() = rt.current_reaction())
            .unwrap();

        assert_eq!(reaction.run_count(), 1);
        assert_eq!(*observed.lock(), Some(reaction));
        assert!(!runtime.is_tracking());
    }

    #[test]
    fn failed_first_run_resets_context_and_disposes() {
        let runtime = Runtime::new();
        let property = runtime.tracked(1);

        let reader = property.clone();
        let err = runtime
            .try_autorun(move || {
                reader.get();
                Err("first run failed")
            })
            .unwrap_err();

        assert!(matches!(err, Error::ReactionFailed { .. }));
        assert!(runtime.current_reaction().is_none());
        assert_eq!(property.dependent_count(), 0);
    }

    #[test]
    fn panicked_first_run_disposes() {
        let runtime = Runtime::new();
        let property = runtime.tracked(1);
        let seen = Arc::new(parking_lot::Mutex::new(None));

        let (reader, rt, slot) = (property.clone(), runtime.clone(), seen.clone());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = runtime.autorun(move || {
                *slot.lock() = rt.current_reaction();
                reader.get();
                panic!("first run panicked");
            });
        }));
        assert!(result.is_err());

        let reaction = seen.lock().take().unwrap();
        assert!(reaction.is_disposed());
        assert_eq!(property.dependent_count(), 0);
        assert!(runtime.current_reaction().is_none());
    }

    #[test]
    fn run_tracked_skips_disposed() {
        let runtime = Runtime::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();

        let reaction = runtime
            .autorun(move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        reaction.dispose();

        runtime.run_tracked(&reaction).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn max_depth_stops_self_triggering_reaction() {
        let runtime = Runtime::with_config(RuntimeConfig::new().with_max_depth(8));
        let property = runtime.tracked(0u32);

        let p = property.clone();
        let err = runtime
            .try_autorun(move || {
                let next = p.get() + 1;
                p.set(next)
            })
            .unwrap_err();

        // The innermost failure is wrapped once per enclosing reaction.
        let mut source = Some(&err as &(dyn std::error::Error + 'static));
        let mut innermost = None;
        while let Some(e) = source {
            innermost = Some(e.to_string());
            source = e.source();
        }
        assert_eq!(
            innermost.as_deref(),
            Some("reaction nesting exceeded the configured limit of 8")
        );
        assert!(runtime.current_reaction().is_none());
    }

    #[test]
    fn runtimes_do_not_share_tracking() {
        let first = Runtime::new();
        let second = Runtime::new();
        let property = first.tracked(0);

        let reader = property.clone();
        second
            .autorun(move || {
                reader.get();
            })
            .unwrap();

        assert_eq!(property.dependent_count(), 0);
        assert!(!first.ptr_eq(&second));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"max_depth": 32}"#).unwrap();
        assert_eq!(config.name, "ripple");
        assert_eq!(config.max_depth, Some(32));

        let config: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }
}
