//! Tracking Context
//!
//! The tracking context records which reaction is currently running.
//! This enables automatic dependency tracking: when a tracked property is
//! read, the current reaction is registered as one of its dependents.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns one `TrackingContext`, so separate
//! runtimes never see each other's reactions. Inside a context every thread
//! has its own stack of active reactions; the top of the stack is the
//! reaction currently running on that thread. Entering a reaction pushes it
//! and the returned guard pops it again.
//!
//! The stack (rather than a single slot) is what makes nested propagation
//! work: a write performed inside a reaction re-runs other reactions, and
//! once they finish the outer reaction must be current again.

use std::thread::{self, ThreadId};

use dashmap::DashMap;
use smallvec::SmallVec;

use super::reaction::{Reaction, ReactionId};

/// Active reactions of one thread, innermost last.
type ReactionStack = SmallVec<[Reaction; 4]>;

/// Per-runtime record of the reactions currently executing.
#[derive(Default)]
pub struct TrackingContext {
    stacks: DashMap<ThreadId, ReactionStack>,
}

impl TrackingContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `reaction` the active reaction on the calling thread.
    ///
    /// The previous state is restored when the returned guard is dropped,
    /// which also happens while unwinding from a panicking reaction.
    pub fn enter(&self, reaction: Reaction) -> TrackingGuard<'_> {
        let id = reaction.id();
        self.stacks
            .entry(thread::current().id())
            .or_default()
            .push(reaction);

        tracing::trace!(reaction = %id, depth = self.depth(), "entered tracking context");

        TrackingGuard {
            context: self,
            reaction: id,
        }
    }

    /// The reaction running on the calling thread, if any.
    pub fn current_reaction(&self) -> Option<Reaction> {
        self.stacks
            .get(&thread::current().id())
            .and_then(|stack| stack.last().cloned())
    }

    /// Check if a reaction is running on the calling thread.
    pub fn is_active(&self) -> bool {
        self.depth() > 0
    }

    /// Number of nested reactions running on the calling thread.
    pub fn depth(&self) -> usize {
        self.stacks
            .get(&thread::current().id())
            .map_or(0, |stack| stack.len())
    }

    fn leave(&self, expected: ReactionId) {
        let thread = thread::current().id();

        let now_empty = match self.stacks.get_mut(&thread) {
            Some(mut stack) => {
                let popped = stack.pop();
                debug_assert_eq!(
                    popped.as_ref().map(Reaction::id),
                    Some(expected),
                    "tracking context mismatch"
                );
                stack.is_empty()
            }
            None => false,
        };

        // Threads come and go; do not keep an empty stack per finished thread.
        if now_empty {
            self.stacks.remove_if(&thread, |_, stack| stack.is_empty());
        }

        tracing::trace!(reaction = %expected, "left tracking context");
    }
}

impl std::fmt::Debug for TrackingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingContext")
            .field("active_threads", &self.stacks.len())
            .field("depth", &self.depth())
            .finish()
    }
}

/// Guard that leaves the tracking context when dropped.
///
/// This ensures the context is restored even if the reaction returns an
/// error or panics.
#[must_use = "the reaction stops being tracked as soon as the guard is dropped"]
pub struct TrackingGuard<'a> {
    context: &'a TrackingContext,
    reaction: ReactionId,
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        self.context.leave(self.reaction);
    }
}
