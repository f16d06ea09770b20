//! Defines the watcher that turns consecutive states into transition events.

use crate::events::ScheduleEvent;
use crate::period::Event;
use crate::state::ScheduleState;
use tokio::sync::broadcast;

/// Remembers the last observed state and reports what changed.
#[doc(hidden)]
#[derive(Debug, Default)]
pub(crate) struct TransitionWatcher {
    last_composite: Option<String>,
    pre_heat: bool,
    in_progress: bool,
}

impl TransitionWatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Compares `state` with the previous observation and fires a
    /// `ScheduleEvent` for every flag or label that flipped.
    pub(crate) fn observe(
        &mut self,
        state: &ScheduleState,
        next: Option<&Event>,
        event_sender: &broadcast::Sender<ScheduleEvent>,
    ) {
        let composite = state.composite_state();
        if self.last_composite.as_deref() != Some(composite.as_str()) {
            event_sender
                .send(ScheduleEvent::StateChanged {
                    from: self.last_composite.take(),
                    to: composite.clone(),
                })
                .ok();
            self.last_composite = Some(composite);
        }

        if state.pre_heat != self.pre_heat {
            let event = match (state.pre_heat, next) {
                (true, Some(next)) => Some(ScheduleEvent::PreHeatStarted {
                    event_start: next.start(),
                }),
                (true, None) => None,
                (false, _) => Some(ScheduleEvent::PreHeatEnded),
            };
            if let Some(event) = event {
                event_sender.send(event).ok();
            }
            self.pre_heat = state.pre_heat;
        }

        if state.event_in_progress != self.in_progress {
            let event = match (state.event_in_progress, next) {
                (true, Some(next)) => Some(ScheduleEvent::EventStarted {
                    start: next.start(),
                    end: next.end(),
                }),
                (true, None) => None,
                (false, _) => Some(ScheduleEvent::EventEnded),
            };
            if let Some(event) = event {
                event_sender.send(event).ok();
            }
            self.in_progress = state.event_in_progress;
        }
    }
}
