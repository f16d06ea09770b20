//! Defines the events broadcast by the [`PeakEngine`](crate::engine::PeakEngine).
//!
//! Listeners subscribe to this stream to react to schedule transitions
//! without polling the state themselves.

use crate::common::SinkId;
use chrono::DateTime;
use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleEvent {
    /// Fired once when the engine's `run` loop begins.
    EngineStarted { at: DateTime<Tz> },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
    /// Fresh data was fetched and classified.
    Refreshed { events: usize, at: DateTime<Tz> },
    /// The data source failed. `serving_stale` tells whether an older
    /// snapshot is still being served.
    RefreshFailed { reason: String, serving_stale: bool },
    /// The composite state label changed. `from` is `None` on the first cycle.
    StateChanged { from: Option<String>, to: String },
    /// The reference instant entered the next event's pre-heat window.
    PreHeatStarted { event_start: DateTime<Tz> },
    PreHeatEnded,
    /// An announced event is now in progress.
    EventStarted { start: DateTime<Tz>, end: DateTime<Tz> },
    EventEnded,
    SinkAdded { id: SinkId },
    SinkRemoved { id: SinkId },
}
