//! Ripple Core
//!
//! This crate provides a minimal reactive-state runtime. Reactions register
//! with a [`Runtime`] and re-run automatically whenever state they read
//! changes, without manual wiring of callbacks.
//!
//! It implements:
//!
//! - Implicit dependency capture: reads inside a reaction subscribe it
//! - Synchronous, depth-first propagation of writes
//! - Observed key/value objects made reactive in place
//! - Explicit disposal of reactions
//!
//! Batching, derived values, asynchronous reactions and collection
//! reactivity are not provided.
//!
//! # Architecture
//!
//! - `reactive`: runtime, tracking context, reactions and tracked properties
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{ObservedObject, Runtime};
//! use serde_json::json;
//!
//! let runtime = Runtime::new();
//! let obj = ObservedObject::from_json(json!({ "a": 10, "b": 100 })).unwrap();
//! runtime.observe(&obj);
//!
//! let view = obj.clone();
//! runtime
//!     .autorun(move || println!("a = {}", view.get("a").unwrap()))
//!     .unwrap(); // prints "a = 10"
//!
//! obj.set("a", json!(11)).unwrap(); // prints "a = 11"
//! obj.set("b", json!(101)).unwrap(); // prints nothing
//! ```

pub mod error;
pub mod reactive;

pub use error::{BoxError, Error, Result};
pub use reactive::{
    ObservedObject, PropertyId, Reaction, ReactionId, Runtime, RuntimeConfig, TrackedProperty,
};
