//! Turns the raw provider payload into a classified [`EventSet`].
//!
//! Season membership follows the calendar date (`today`), while past/future
//! bucketing inside the current season follows the caller's reference
//! instant. The two are deliberately independent so a historical instant can
//! be replayed against the season the provider currently reports.
//!
//! Buckets are ordered ascending by end instant. Events sharing an end
//! instant are all kept, in payload order.

use crate::config::WinterPeakConfig;
use crate::error::{Result, ScheduleError};
use crate::period::{Event, PreHeat};
use crate::source::{RawEvent, RawPayload, RawSeason};
use crate::time::at;
use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use tracing::{debug, warn};

const CLOCK_FORMAT: &str = "%H:%M:%S";

/// Events of the season containing today.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WinterEvents {
    /// Events that ended before the reference instant.
    pub past: Vec<Event>,
    /// Events ending at or after the reference instant, with pre-heat attached.
    pub future: Vec<Event>,
}

/// The classifier's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSet {
    pub current_winter: WinterEvents,
    pub past_winters: Vec<Event>,
    pub next: Option<Event>,
}

impl EventSet {
    /// Future then past events of the current season.
    pub fn known_events(&self) -> impl Iterator<Item = &Event> {
        self.current_winter
            .future
            .iter()
            .chain(self.current_winter.past.iter())
    }

    pub fn len(&self) -> usize {
        self.current_winter.future.len() + self.current_winter.past.len() + self.past_winters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of next-event selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextSelection {
    /// The input events, each augmented with its pre-heat window.
    pub future: Vec<Event>,
    pub next: Option<Event>,
    pub in_progress: bool,
}

/// Classifies every season of `payload`.
///
/// Malformed seasons and event records are logged and skipped; they never
/// abort their siblings. Returns the event set and whether an event is in
/// progress at `reference`.
pub fn build_event_set(
    payload: &RawPayload,
    reference: DateTime<Tz>,
    today: NaiveDate,
    config: &WinterPeakConfig,
) -> (EventSet, bool) {
    let mut current = WinterEvents::default();
    let mut past_winters = Vec::new();

    for (index, season) in payload.seasons.iter().enumerate() {
        let (season_start, season_end) = match season_bounds(season) {
            Ok(bounds) => bounds,
            Err(e) => {
                warn!(season = index, error = %e, "Skipping season");
                continue;
            }
        };
        let is_current = season_start <= today && today <= season_end;
        debug!(season = index, %season_start, %season_end, is_current, "Classifying season");

        for raw in &season.events {
            let event = match parse_event(raw, &config.timezone, config.datetime_format()) {
                Ok(event) => event,
                Err(e) => {
                    warn!(season = index, error = %e, "Skipping event record");
                    continue;
                }
            };
            if !is_current {
                past_winters.push(event);
            } else if event.end() >= reference {
                current.future.push(event);
            } else {
                current.past.push(event);
            }
        }
    }

    current.past.sort_by_key(Event::end_ts);
    past_winters.sort_by_key(Event::end_ts);

    let selection = select_next(current.future, reference, config);
    current.future = selection.future;

    let events = EventSet {
        current_winter: current,
        past_winters,
        next: selection.next,
    };
    (events, selection.in_progress)
}

/// Attaches pre-heat windows and picks the actionable event.
///
/// Scanning in ascending end order, the first event containing `reference`
/// wins and marks the result in progress. Otherwise the event with the
/// smallest end instant is chosen, even if another one starts earlier.
pub fn select_next(
    future: Vec<Event>,
    reference: DateTime<Tz>,
    config: &WinterPeakConfig,
) -> NextSelection {
    let start_offset = config.pre_heat_start_offset();
    let end_offset = config.pre_heat_end_offset();
    let format = config.datetime_format();

    let mut future: Vec<Event> = future
        .into_iter()
        .map(|event| {
            let start = event.start();
            event.with_pre_heat(PreHeat::new(start - start_offset, start - end_offset, format))
        })
        .collect();
    future.sort_by_key(Event::end_ts);

    if let Some(current) = future.iter().find(|e| e.contains(reference)) {
        let next = Some(current.clone());
        return NextSelection {
            future,
            next,
            in_progress: true,
        };
    }

    let next = future.iter().min_by_key(|e| e.end_ts()).cloned();
    NextSelection {
        future,
        next,
        in_progress: false,
    }
}

fn season_bounds(season: &RawSeason) -> Result<(NaiveDate, NaiveDate)> {
    let start = parse_date(season.start_date.as_deref(), "season start")?;
    let end = parse_date(season.end_date.as_deref(), "season end")?;
    Ok((start, end))
}

fn parse_event(raw: &RawEvent, tz: &Tz, format: &str) -> Result<Event> {
    let date = parse_date(raw.date.as_deref(), "event date")?;
    let start = parse_clock(raw.start_time.as_deref(), "start time")?;
    let end = parse_clock(raw.end_time.as_deref(), "end time")?;
    Event::new(at(tz, date, start)?, at(tz, date, end)?, format)
}

/// Reads the calendar day from the leading `YYYY-MM-DD` of an ISO string.
fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate> {
    let value = value.ok_or_else(|| malformed(format!("missing {field}")))?;
    value
        .get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .ok_or_else(|| malformed(format!("unreadable {field} '{value}'")))
}

fn parse_clock(value: Option<&str>, field: &str) -> Result<NaiveTime> {
    let value = value.ok_or_else(|| malformed(format!("missing {field}")))?;
    NaiveTime::parse_from_str(value, CLOCK_FORMAT)
        .map_err(|e| malformed(format!("unreadable {field} '{value}': {e}")))
}

fn malformed(reason: String) -> ScheduleError {
    ScheduleError::MalformedEventRecord { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample;
    use crate::time::localize;
    use chrono::NaiveDateTime;

    fn instant(s: &str) -> DateTime<Tz> {
        let local = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
        localize(&chrono_tz::America::Toronto, local).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn raw(date: &str, start: &str, end: &str) -> RawEvent {
        RawEvent {
            date: Some(date.to_string()),
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
        }
    }

    fn season(start: &str, end: &str, events: Vec<RawEvent>) -> RawSeason {
        RawSeason {
            start_date: Some(start.to_string()),
            end_date: Some(end.to_string()),
            events,
        }
    }

    fn winter_2022(events: Vec<RawEvent>) -> RawPayload {
        RawPayload {
            seasons: vec![season("2022-01-01", "2022-03-31", events)],
        }
    }

    fn single_event() -> RawPayload {
        winter_2022(vec![raw("2022-01-05T00:00:00.000+0000", "06:00:00", "09:00:00")])
    }

    #[test]
    fn event_ahead_of_reference_is_future_and_next() {
        let (set, in_progress) =
            build_event_set(&single_event(), instant("2022-01-04 10:00:00"), day("2022-01-04"), &sample());
        assert_eq!(set.current_winter.future.len(), 1);
        assert!(set.current_winter.past.is_empty());
        let next = set.next.expect("next event");
        assert_eq!(next.start(), instant("2022-01-05 06:00:00"));
        assert!(!in_progress);
    }

    #[test]
    fn event_containing_reference_is_in_progress() {
        let (set, in_progress) =
            build_event_set(&single_event(), instant("2022-01-05 07:00:00"), day("2022-01-05"), &sample());
        assert!(in_progress);
        assert_eq!(set.next.unwrap().end(), instant("2022-01-05 09:00:00"));
    }

    #[test]
    fn finished_event_is_past_and_nothing_is_next() {
        let (set, in_progress) =
            build_event_set(&single_event(), instant("2022-01-06 00:00:00"), day("2022-01-06"), &sample());
        assert_eq!(set.current_winter.past.len(), 1);
        assert!(set.current_winter.future.is_empty());
        assert!(set.next.is_none());
        assert!(!in_progress);
    }

    #[test]
    fn pre_heat_window_precedes_event_start() {
        let (set, _) =
            build_event_set(&single_event(), instant("2022-01-05 04:00:00"), day("2022-01-05"), &sample());
        let next = set.next.unwrap();
        let pre_heat = next.pre_heat().expect("pre-heat attached");
        assert_eq!(pre_heat.start(), instant("2022-01-05 03:00:00"));
        assert_eq!(pre_heat.end(), instant("2022-01-05 06:00:00"));
        assert!(pre_heat.contains(instant("2022-01-05 04:00:00")));
    }

    #[test]
    fn season_membership_follows_calendar_date_not_reference() {
        // Reference inside the season, calendar date after it.
        let (set, _) =
            build_event_set(&single_event(), instant("2022-01-04 10:00:00"), day("2022-06-01"), &sample());
        assert_eq!(set.past_winters.len(), 1);
        assert!(set.current_winter.future.is_empty());
        assert!(set.next.is_none());
    }

    #[test]
    fn next_is_the_soonest_ending_event_not_the_soonest_starting() {
        let payload = winter_2022(vec![
            raw("2022-01-05", "07:00:00", "12:00:00"),
            raw("2022-01-05", "10:00:00", "11:00:00"),
        ]);
        let (set, in_progress) =
            build_event_set(&payload, instant("2022-01-05 06:00:00"), day("2022-01-05"), &sample());
        assert!(!in_progress);
        let next = set.next.unwrap();
        assert_eq!(next.start(), instant("2022-01-05 10:00:00"));
        let min_end = set.current_winter.future.iter().map(Event::end_ts).min().unwrap();
        assert_eq!(next.end_ts(), min_end);
    }

    #[test]
    fn in_progress_event_beats_one_that_ends_sooner() {
        let payload = winter_2022(vec![
            raw("2022-01-05", "05:00:00", "09:00:00"),
            raw("2022-01-05", "08:00:00", "08:30:00"),
        ]);
        let (set, in_progress) =
            build_event_set(&payload, instant("2022-01-05 07:00:00"), day("2022-01-05"), &sample());
        assert!(in_progress);
        assert_eq!(set.next.unwrap().start(), instant("2022-01-05 05:00:00"));
    }

    #[test]
    fn events_sharing_an_end_instant_are_all_kept() {
        let payload = winter_2022(vec![
            raw("2022-01-05", "06:00:00", "09:00:00"),
            raw("2022-01-05", "07:00:00", "09:00:00"),
        ]);
        let (set, _) =
            build_event_set(&payload, instant("2022-01-04 10:00:00"), day("2022-01-04"), &sample());
        assert_eq!(set.current_winter.future.len(), 2);
        assert_eq!(set.next.unwrap().start(), instant("2022-01-05 06:00:00"));
    }

    #[test]
    fn malformed_records_are_skipped_without_losing_siblings() {
        let mut payload = winter_2022(vec![
            RawEvent {
                date: Some("2022-01-07".into()),
                start_time: None,
                end_time: Some("09:00:00".into()),
            },
            raw("not-a-date", "06:00:00", "09:00:00"),
            raw("2022-01-06", "09:00:00", "06:00:00"),
            raw("2022-01-05", "06:00:00", "09:00:00"),
        ]);
        payload.seasons.push(RawSeason::default());
        let (set, _) =
            build_event_set(&payload, instant("2022-01-04 10:00:00"), day("2022-01-04"), &sample());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn buckets_are_sorted_by_end_instant() {
        let payload = winter_2022(vec![
            raw("2022-01-20", "16:00:00", "20:00:00"),
            raw("2022-01-10", "06:00:00", "09:00:00"),
            raw("2022-01-15", "06:00:00", "09:00:00"),
        ]);
        let (set, _) =
            build_event_set(&payload, instant("2022-01-01 00:00:00"), day("2022-01-01"), &sample());
        let ends: Vec<i64> = set.current_winter.future.iter().map(Event::end_ts).collect();
        let mut sorted = ends.clone();
        sorted.sort();
        assert_eq!(ends, sorted);
        assert!(set.current_winter.future.iter().all(|e| e.pre_heat().is_some()));
    }

    #[test]
    fn classification_is_reproducible() {
        let payload = single_event();
        let reference = instant("2022-01-04 10:00:00");
        let first = build_event_set(&payload, reference, day("2022-01-04"), &sample());
        let second = build_event_set(&payload, reference, day("2022-01-04"), &sample());
        assert_eq!(first, second);
    }
}
