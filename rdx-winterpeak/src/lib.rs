//! # Winterpeak
//!
//! Event scheduling and state engine for a utility's winter peak credit
//! program.
//!
//! The provider announces critical-peak events for each winter season. This
//! crate classifies them, picks the one home automations should act on next,
//! and derives the state of the day (peak, anchor or normal period,
//! criticality, pre-heat) as seen from any reference instant.
//!
//! ## Core Concepts
//!
//! - **Classifier**: turns the raw payload into an [`EventSet`](classifier::EventSet):
//!   current-season past/future events, past seasons, and the next event with
//!   its pre-heat window attached.
//! - **State engine**: a pure function of an event set, the configuration and
//!   a reference instant, producing a [`ScheduleState`](state::ScheduleState).
//! - **Refresh controller**: a read-through cache in front of an
//!   [`EventSource`](source::EventSource), refreshed once its TTL elapses.
//! - **Peak engine**: publishes the flattened state to telemetry sinks on a
//!   fixed cadence and broadcasts state transitions.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use winterpeak::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(winterpeak::config::load_config("config.toml")?);
//!     let clock = Arc::new(SystemClock::new(config.timezone));
//!     let source = JsonFileSource::new("winter_credit.json");
//!
//!     let controller = RefreshController::new(source, config, clock);
//!     let state = controller.current_state().await?;
//!     println!("{}", state.composite_state());
//!
//!     let engine = PeakEngine::new(controller);
//!     engine.add_sink(TracingSink).await;
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Winterpeak";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod classifier;
pub mod common;
pub mod components;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod period;
pub mod source;
pub mod state;
pub mod time;

/// A prelude module for easy importing of the most common Winterpeak types.
pub mod prelude {
    pub use crate::classifier::{build_event_set, select_next, EventSet};
    pub use crate::common::SinkId;
    pub use crate::components::sink::{TelemetrySink, TracingSink};
    pub use crate::config::WinterPeakConfig;
    pub use crate::controller::{RefreshController, RefreshOutcome, RefreshState};
    pub use crate::engine::PeakEngine;
    pub use crate::error::{ScheduleError, SourceError};
    pub use crate::events::ScheduleEvent;
    pub use crate::period::{Event, Period, PreHeat};
    pub use crate::source::{EventSource, JsonFileSource, RawPayload, StaticSource};
    pub use crate::state::{compute_state, ScheduleState, TimeOfDay};
    pub use crate::time::{Clock, ManualClock, SystemClock};
}
