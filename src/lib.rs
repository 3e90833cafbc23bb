//! Narrative Events: context-sensitive event generation for simulations.
//!
//! Turns a caller-supplied context into a concrete event (title, narrative,
//! choices with numeric effects) using a trainable n-gram text synthesizer,
//! a declarative template library with inheritance and composition, and a
//! condition/effect rule language. Chains, prerequisites and a relationship
//! graph run alongside the pipeline on a shared calendar.

pub mod core;
pub mod schema;

pub use crate::core::pipeline::{EngineError, EngineSnapshot, EventEngine, Localizer};
pub use crate::schema::context::Context;
pub use crate::schema::event::Event;
