//! The publishing engine that drives the controller on a fixed cadence.

use crate::common::SinkId;
use crate::components::sink::TelemetrySink;
use crate::components::watcher::TransitionWatcher;
use crate::controller::{RefreshController, RefreshOutcome};
use crate::error::ScheduleError;
use crate::events::ScheduleEvent;
use crate::source::EventSource;
use crate::state::ScheduleState;
use slotmap::SlotMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{error, info, warn};

/// The main winter peak engine.
///
/// On every publisher tick it brings the controller's cache up to date,
/// publishes the flattened state to every registered sink and broadcasts the
/// transitions it observed. The engine is cheap to clone; clones share the
/// same controller, sinks and event stream.
pub struct PeakEngine<S> {
    controller: Arc<RefreshController<S>>,
    event_sender: broadcast::Sender<ScheduleEvent>,
    sinks: Arc<RwLock<SlotMap<SinkId, Box<dyn TelemetrySink>>>>,
    watcher: Arc<Mutex<TransitionWatcher>>,
}

impl<S> Clone for PeakEngine<S> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            event_sender: self.event_sender.clone(),
            sinks: self.sinks.clone(),
            watcher: self.watcher.clone(),
        }
    }
}

// Core implementation block for internal logic.
impl<S: EventSource + 'static> PeakEngine<S> {
    /// Creates a new `PeakEngine` around the given controller.
    pub fn new(controller: RefreshController<S>) -> Self {
        const CHANNEL_CAPACITY: usize = 64;
        let (event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            controller: Arc::new(controller),
            event_sender,
            sinks: Arc::new(RwLock::new(SlotMap::with_key())),
            watcher: Arc::new(Mutex::new(TransitionWatcher::new())),
        }
    }

    /// Runs the publish loop until Ctrl+C is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await
    }

    /// Runs the publish loop until `shutdown` resolves.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let config = self.controller.config();
        let period = Duration::from_secs(config.publisher.interval_seconds.max(1));
        info!("PeakEngine starting up, publishing every {:?}", period);
        self.event_sender
            .send(ScheduleEvent::EngineStarted {
                at: self.controller.clock().now(),
            })
            .ok();

        let mut ticker = tokio::time::interval(period);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_once().await {
                        error!("Publish cycle failed: {}", e);
                    }
                }
            }
        }

        info!("Shutdown signal received.");
        self.event_sender.send(ScheduleEvent::EngineShutdown).ok();
        info!("PeakEngine has shut down.");
        Ok(())
    }

    /// Runs a single refresh/compute/publish cycle.
    pub async fn publish_once(&self) -> crate::error::Result<ScheduleState> {
        let observation = match self.controller.observe().await {
            Ok(observation) => observation,
            Err(e) => {
                if matches!(e, ScheduleError::DataUnavailable { .. }) {
                    self.event_sender
                        .send(ScheduleEvent::RefreshFailed {
                            reason: e.to_string(),
                            serving_stale: false,
                        })
                        .ok();
                }
                return Err(e);
            }
        };

        match &observation.outcome {
            RefreshOutcome::Cached => {}
            RefreshOutcome::Refreshed { events } => {
                self.event_sender
                    .send(ScheduleEvent::Refreshed {
                        events: *events,
                        at: observation.state.reference,
                    })
                    .ok();
            }
            RefreshOutcome::ServedStale { reason } => {
                self.event_sender
                    .send(ScheduleEvent::RefreshFailed {
                        reason: reason.clone(),
                        serving_stale: true,
                    })
                    .ok();
            }
        }

        self.publish(&observation.state, observation.next.as_ref()).await;
        self.watcher.lock().await.observe(
            &observation.state,
            observation.next.as_ref(),
            &self.event_sender,
        );
        Ok(observation.state)
    }

    #[doc(hidden)]
    async fn publish(&self, state: &ScheduleState, next: Option<&crate::period::Event>) {
        let prefix = &self.controller.config().publisher.topic_prefix;
        let mut messages: Vec<(String, String)> = state
            .to_flat_map()
            .into_iter()
            .map(|(key, value)| (format!("{prefix}/{key}"), value))
            .collect();
        if let Some(next) = next {
            messages.extend(
                next.to_flat_map()
                    .into_iter()
                    .map(|(key, value)| (format!("{prefix}/next/event/{key}"), value)),
            );
        }

        let sinks = self.sinks.read().await;
        for (id, sink) in sinks.iter() {
            for (topic, payload) in &messages {
                if let Err(e) = sink.publish(topic, payload) {
                    warn!(sink = ?id, error = %e, "Sink rejected message");
                }
            }
        }
    }
}

// Public API implementation block.
impl<S: EventSource + 'static> PeakEngine<S> {
    pub fn controller(&self) -> &Arc<RefreshController<S>> {
        &self.controller
    }

    /// Registers a sink. Returns a `SinkId` which can be used to remove it.
    pub async fn add_sink(&self, sink: impl TelemetrySink + 'static) -> SinkId {
        let id = self.sinks.write().await.insert(Box::new(sink));
        self.event_sender.send(ScheduleEvent::SinkAdded { id }).ok();
        id
    }

    /// Removes a sink. Returns `true` if it was registered.
    pub async fn remove_sink(&self, id: SinkId) -> bool {
        let was_removed = self.sinks.write().await.remove(id).is_some();
        if was_removed {
            self.event_sender.send(ScheduleEvent::SinkRemoved { id }).ok();
        }
        was_removed
    }

    /// Subscribes to the `ScheduleEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.event_sender.subscribe()
    }
}
