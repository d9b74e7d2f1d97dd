//! Reactive Primitives
//!
//! This module implements the reactive core: reactions, tracked properties
//! and the runtime that connects them.
//!
//! # Concepts
//!
//! ## Reactions
//!
//! A Reaction is a side-effecting procedure registered with
//! [`Runtime::autorun`]. It runs once immediately and then again every time
//! a tracked property it read is written.
//!
//! ## Tracked Properties
//!
//! A Tracked Property is a cell of mutable state. When it is read while a
//! reaction is running, the property records that reaction as a dependent.
//! When it is written, every dependent re-runs before the write returns.
//!
//! ## Observed Objects
//!
//! An Observed Object is a plain key/value map. Observing it replaces each
//! of its current entries with a tracked property, in place.
//!
//! # Implementation Notes
//!
//! Reads are attributed to reactions through a tracking context owned by
//! the runtime, with one stack of running reactions per thread. Nothing is
//! wired by hand: a reaction depends on exactly the properties it has read.

mod context;
mod reaction;
mod property;
mod object;
mod runtime;

pub use context::{TrackingContext, TrackingGuard};
pub use reaction::{Reaction, ReactionId};
pub use property::{PropertyId, TrackedProperty};
pub use object::ObservedObject;
pub use runtime::{Runtime, RuntimeConfig};
