//! Event system for the render pipeline engine
//!
//! This crate provides the in-process event bus and the typed events the
//! orchestrator publishes. Persistent audit events live in the `db` crate;
//! this bus carries live notifications only.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
