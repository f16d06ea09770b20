//! Building blocks driven by the publishing engine.
//!
//! Sinks receive the flattened state on every cycle; the watcher turns
//! consecutive states into transition events.

pub mod sink;
pub mod watcher;
