//! Read-through cache in front of the data source.
//!
//! The controller owns the cached payload, the classified [`Snapshot`] and
//! the last refresh instant. Every accessor first makes sure the cache is
//! fresh, then answers from the snapshot. A refresh holds the cache lock
//! across the fetch, so concurrent callers wait for one fetch instead of
//! starting their own.
//!
//! ```text
//! Stale -> Refreshing -> Fresh -> (TTL elapsed) -> Stale
//!              |
//!              +-> fetch failed -> Stale (last good snapshot still served)
//! ```

use crate::classifier::{build_event_set, EventSet};
use crate::config::WinterPeakConfig;
use crate::error::{Result, ScheduleError};
use crate::period::Event;
use crate::source::{EventSource, RawPayload};
use crate::state::{compute_state, ScheduleState};
use crate::time::Clock;
use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Stale,
    Refreshing,
    Fresh,
}

/// A classified payload and the instant it was classified at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub events: EventSet,
    pub in_progress: bool,
    pub built_at: DateTime<Tz>,
}

/// What `refresh_if_stale` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache was still fresh.
    Cached,
    /// New data was fetched and classified.
    Refreshed { events: usize },
    /// The fetch failed; the previous snapshot is still being served.
    ServedStale { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub last_refresh: Option<DateTime<Tz>>,
    pub last_error: Option<String>,
}

/// A snapshot-derived answer together with how the cache was brought up to date.
#[derive(Debug, Clone)]
pub struct Observation {
    pub state: ScheduleState,
    pub next: Option<Event>,
    pub outcome: RefreshOutcome,
}

struct Cache {
    state: RefreshState,
    payload: Option<Arc<RawPayload>>,
    snapshot: Option<Arc<Snapshot>>,
    last_refresh: Option<DateTime<Tz>>,
    last_error: Option<String>,
}

pub struct RefreshController<S> {
    source: S,
    config: Arc<WinterPeakConfig>,
    clock: Arc<dyn Clock>,
    cache: Mutex<Cache>,
}

impl<S: EventSource> RefreshController<S> {
    pub fn new(source: S, config: Arc<WinterPeakConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            config,
            clock,
            cache: Mutex::new(Cache {
                state: RefreshState::Stale,
                payload: None,
                snapshot: None,
                last_refresh: None,
                last_error: None,
            }),
        }
    }

    pub fn config(&self) -> &WinterPeakConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Fetches new data if the TTL has elapsed since the last good refresh.
    pub async fn refresh_if_stale(&self) -> Result<RefreshOutcome> {
        self.ensure_fresh().await.map(|(_, outcome)| outcome)
    }

    /// Fetches new data regardless of the TTL.
    pub async fn force_refresh(&self) -> Result<RefreshOutcome> {
        let mut cache = self.cache.lock().await;
        self.refresh_locked(&mut cache).await.map(|(_, outcome)| outcome)
    }

    pub async fn status(&self) -> RefreshStatus {
        let cache = self.cache.lock().await;
        let state = match cache.state {
            RefreshState::Fresh if self.is_expired(&cache) => RefreshState::Stale,
            other => other,
        };
        RefreshStatus {
            state,
            last_refresh: cache.last_refresh,
            last_error: cache.last_error.clone(),
        }
    }

    pub async fn next_event(&self) -> Result<Option<Event>> {
        let (snapshot, _) = self.ensure_fresh().await?;
        Ok(snapshot.events.next.clone())
    }

    pub async fn future_events(&self) -> Result<Vec<Event>> {
        let (snapshot, _) = self.ensure_fresh().await?;
        Ok(snapshot.events.current_winter.future.clone())
    }

    /// Future and past events of the current season.
    pub async fn all_events(&self) -> Result<Vec<Event>> {
        let (snapshot, _) = self.ensure_fresh().await?;
        Ok(snapshot.events.known_events().cloned().collect())
    }

    pub async fn current_state(&self) -> Result<ScheduleState> {
        self.observe().await.map(|observation| observation.state)
    }

    /// Brings the cache up to date and derives the state at the clock's now.
    pub async fn observe(&self) -> Result<Observation> {
        let (snapshot, outcome) = self.ensure_fresh().await?;
        let state = compute_state(
            &snapshot.events,
            snapshot.in_progress,
            self.clock.now(),
            &self.config,
        )?;
        Ok(Observation {
            state,
            next: snapshot.events.next.clone(),
            outcome,
        })
    }

    /// Re-classifies the cached payload as of `reference`.
    pub async fn snapshot_at(&self, reference: DateTime<Tz>) -> Result<Snapshot> {
        self.ensure_fresh().await?;
        let payload = {
            let cache = self.cache.lock().await;
            cache.payload.clone()
        };
        let payload = payload.ok_or_else(|| ScheduleError::DataUnavailable {
            reason: "no payload has been fetched yet".to_string(),
        })?;
        Ok(self.classify(&payload, reference))
    }

    /// The state as seen from `reference`, classified from the cached payload.
    pub async fn state_at(&self, reference: DateTime<Tz>) -> Result<ScheduleState> {
        let snapshot = self.snapshot_at(reference).await?;
        compute_state(&snapshot.events, snapshot.in_progress, reference, &self.config)
    }

    async fn ensure_fresh(&self) -> Result<(Arc<Snapshot>, RefreshOutcome)> {
        let mut cache = self.cache.lock().await;
        debug!("Checking whether winter credit data needs a refresh");
        if !self.is_expired(&cache) {
            if let Some(snapshot) = &cache.snapshot {
                debug!("Data is up to date");
                return Ok((snapshot.clone(), RefreshOutcome::Cached));
            }
        }
        self.refresh_locked(&mut cache).await
    }

    async fn refresh_locked(&self, cache: &mut Cache) -> Result<(Arc<Snapshot>, RefreshOutcome)> {
        cache.state = RefreshState::Refreshing;
        debug!("Refreshing winter credit data");
        match self.source.fetch().await {
            Ok(payload) => {
                let payload = Arc::new(payload);
                let snapshot = Arc::new(self.classify(&payload, self.clock.now()));
                let events = snapshot.events.len();
                info!(events, in_progress = snapshot.in_progress, "Winter credit data refreshed");
                cache.payload = Some(payload);
                cache.snapshot = Some(snapshot.clone());
                cache.last_refresh = Some(snapshot.built_at);
                cache.last_error = None;
                cache.state = RefreshState::Fresh;
                Ok((snapshot, RefreshOutcome::Refreshed { events }))
            }
            Err(e) => {
                let reason = e.to_string();
                cache.state = RefreshState::Stale;
                cache.last_error = Some(reason.clone());
                match &cache.snapshot {
                    Some(snapshot) => {
                        warn!(error = %reason, "Refresh failed, serving last known-good data");
                        Ok((snapshot.clone(), RefreshOutcome::ServedStale { reason }))
                    }
                    None => Err(e.into()),
                }
            }
        }
    }

    fn classify(&self, payload: &RawPayload, reference: DateTime<Tz>) -> Snapshot {
        let (events, in_progress) =
            build_event_set(payload, reference, self.clock.today(), &self.config);
        Snapshot {
            events,
            in_progress,
            built_at: reference,
        }
    }

    fn is_expired(&self, cache: &Cache) -> bool {
        match cache.last_refresh {
            Some(last) => self.clock.now() - last > self.config.refresh_ttl(),
            None => true,
        }
    }
}
