//! Point-in-time schedule state.
//!
//! [`compute_state`] is a pure function of an [`EventSet`], the configuration
//! and a reference instant. It lays today's peak and anchor windows over the
//! reference instant, labels the period it falls in, and derives the flags
//! home automations key off.
//!
//! Rolling forward to tomorrow's morning peak adds a fixed 24 hours. Across a
//! DST change the rolled window is an hour off the configured clock time.

use crate::classifier::EventSet;
use crate::config::WinterPeakConfig;
use crate::error::Result;
use crate::period::{flatten, Event, Period};
use crate::time::at;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKind {
    Peak,
    Anchor,
    Normal,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Peak => "peak",
            PeriodKind::Anchor => "anchor",
            PeriodKind::Normal => "normal",
        }
    }
}

/// The period of the day the reference instant falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeOfDay {
    PeakMorning,
    PeakEvening,
    AnchorMorning,
    AnchorEvening,
    Normal,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::PeakMorning => "peak_morning",
            TimeOfDay::PeakEvening => "peak_evening",
            TimeOfDay::AnchorMorning => "anchor_morning",
            TimeOfDay::AnchorEvening => "anchor_evening",
            TimeOfDay::Normal => "normal",
        }
    }

    pub fn kind(&self) -> PeriodKind {
        match self {
            TimeOfDay::PeakMorning | TimeOfDay::PeakEvening => PeriodKind::Peak,
            TimeOfDay::AnchorMorning | TimeOfDay::AnchorEvening => PeriodKind::Anchor,
            TimeOfDay::Normal => PeriodKind::Normal,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A morning/evening pair of windows for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayWindows {
    pub morning: Period,
    pub evening: Period,
}

impl DayWindows {
    fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("morning".into(), Value::Object(self.morning.to_map()));
        map.insert("evening".into(), Value::Object(self.evening.to_map()));
        map
    }
}

/// The schedule as seen from one reference instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    pub time_of_day: TimeOfDay,
    /// An announced event is still pending completion today.
    pub critical: bool,
    pub event_in_progress: bool,
    pub pre_heat: bool,
    pub upcoming_event: bool,
    pub morning_event_today: bool,
    pub evening_event_today: bool,
    pub morning_event_tomorrow: bool,
    pub evening_event_tomorrow: bool,
    pub peak_periods: DayWindows,
    pub anchor_periods: DayWindows,
    pub next_peak: Period,
    pub next_anchor: Period,
    pub reference: DateTime<Tz>,
    pub last_update: String,
}

impl ScheduleState {
    pub fn current_period(&self) -> PeriodKind {
        self.time_of_day.kind()
    }

    /// `<time_of_day>_critical` or `<time_of_day>_normal`.
    pub fn composite_state(&self) -> String {
        let suffix = if self.critical { "critical" } else { "normal" };
        format!("{}_{}", self.time_of_day, suffix)
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut state = Map::new();
        state.insert("current_period".into(), self.current_period().as_str().into());
        state.insert("current_period_time_of_day".into(), self.time_of_day.as_str().into());
        state.insert("current_composite_state".into(), self.composite_state().into());
        state.insert("critical".into(), self.critical.into());
        state.insert("event_in_progress".into(), self.event_in_progress.into());
        state.insert("pre_heat".into(), self.pre_heat.into());
        state.insert("upcoming_event".into(), self.upcoming_event.into());
        state.insert("morning_event_today".into(), self.morning_event_today.into());
        state.insert("evening_event_today".into(), self.evening_event_today.into());
        state.insert("morning_event_tomorrow".into(), self.morning_event_tomorrow.into());
        state.insert("evening_event_tomorrow".into(), self.evening_event_tomorrow.into());

        let mut next = Map::new();
        next.insert("peak".into(), Value::Object(self.next_peak.to_map()));
        next.insert("anchor".into(), Value::Object(self.next_anchor.to_map()));

        let mut map = Map::new();
        map.insert("state".into(), Value::Object(state));
        map.insert("next".into(), Value::Object(next));
        map.insert("anchor_periods".into(), Value::Object(self.anchor_periods.to_map()));
        map.insert("peak_periods".into(), Value::Object(self.peak_periods.to_map()));
        map.insert("last_update".into(), self.last_update.clone().into());
        map
    }

    /// Flattens [`ScheduleState::to_map`] into `a/b/c` keys.
    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        flatten_into(&mut flat, "", &self.to_map());
        flat
    }
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, map: &Map<String, Value>) {
    let mut leaves = Map::new();
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}/{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(out, &path, inner),
            leaf => {
                leaves.insert(path, leaf.clone());
            }
        }
    }
    out.extend(flatten(&leaves));
}

/// Today's configured peak windows.
pub fn peak_windows(date: NaiveDate, config: &WinterPeakConfig) -> Result<DayWindows> {
    let p = &config.periods;
    Ok(DayWindows {
        morning: window(date, p.morning_peak_start, p.morning_peak_end, config)?,
        evening: window(date, p.evening_peak_start, p.evening_peak_end, config)?,
    })
}

/// Anchor windows start `anchor_start_offset` before each peak.
pub fn anchor_windows(peaks: &DayWindows, config: &WinterPeakConfig) -> Result<DayWindows> {
    Ok(DayWindows {
        morning: anchor_for(peaks.morning.start(), false, config)?,
        evening: anchor_for(peaks.evening.start(), false, config)?,
    })
}

/// Derives the schedule state at `reference`.
pub fn compute_state(
    events: &EventSet,
    in_progress: bool,
    reference: DateTime<Tz>,
    config: &WinterPeakConfig,
) -> Result<ScheduleState> {
    let tz = config.timezone;
    let format = config.datetime_format();
    let reference = reference.with_timezone(&tz);
    let today = reference.date_naive();
    let tomorrow = today + Duration::days(1);

    let peaks = peak_windows(today, config)?;
    let anchors = anchor_windows(&peaks, config)?;

    let (next_start, next_end) = if reference <= peaks.morning.end() {
        (peaks.morning.start(), peaks.morning.end())
    } else if reference <= peaks.evening.end() {
        (peaks.evening.start(), peaks.evening.end())
    } else {
        (
            peaks.morning.start() + Duration::hours(24),
            peaks.morning.end() + Duration::hours(24),
        )
    };

    // Peak before anchor: a peak label wins when windows overlap.
    let time_of_day = if peaks.morning.contains(reference) {
        TimeOfDay::PeakMorning
    } else if peaks.evening.contains(reference) {
        TimeOfDay::PeakEvening
    } else if anchors.morning.contains(reference) {
        TimeOfDay::AnchorMorning
    } else if anchors.evening.contains(reference) {
        TimeOfDay::AnchorEvening
    } else {
        TimeOfDay::Normal
    };

    let known: Vec<&Event> = events.known_events().collect();

    let critical = known
        .iter()
        .any(|e| e.date() == today && e.end() > reference);

    let pre_heat = events
        .next
        .as_ref()
        .and_then(Event::pre_heat)
        .is_some_and(|p| p.contains(reference));

    let today_noon = noon(&tz, today)?;
    let tomorrow_noon = noon(&tz, tomorrow)?;
    let mut flags = DayFlags::default();
    for event in &known {
        if event.date() == today {
            flags.mark_today(event.start() < today_noon);
        } else if event.date() == tomorrow {
            flags.mark_tomorrow(event.start() < tomorrow_noon);
        }
    }
    let upcoming_event = known.iter().any(|e| e.start() > reference);

    let next_critical = known.iter().any(|e| e.end() == next_end);
    let next_peak = Period::new(next_start, next_end, next_critical, format)?;
    let next_anchor = anchor_for(next_start, next_critical, config)?;

    Ok(ScheduleState {
        time_of_day,
        critical,
        event_in_progress: in_progress,
        pre_heat,
        upcoming_event,
        morning_event_today: flags.morning_today,
        evening_event_today: flags.evening_today,
        morning_event_tomorrow: flags.morning_tomorrow,
        evening_event_tomorrow: flags.evening_tomorrow,
        peak_periods: peaks,
        anchor_periods: anchors,
        next_peak,
        next_anchor,
        reference,
        last_update: reference.format(format).to_string(),
    })
}

#[derive(Default)]
struct DayFlags {
    morning_today: bool,
    evening_today: bool,
    morning_tomorrow: bool,
    evening_tomorrow: bool,
}

impl DayFlags {
    fn mark_today(&mut self, morning: bool) {
        if morning {
            self.morning_today = true;
        } else {
            self.evening_today = true;
        }
    }

    fn mark_tomorrow(&mut self, morning: bool) {
        if morning {
            self.morning_tomorrow = true;
        } else {
            self.evening_tomorrow = true;
        }
    }
}

fn window(date: NaiveDate, start: NaiveTime, end: NaiveTime, config: &WinterPeakConfig) -> Result<Period> {
    let tz = config.timezone;
    Period::new(at(&tz, date, start)?, at(&tz, date, end)?, false, config.datetime_format())
}

fn anchor_for(peak_start: DateTime<Tz>, critical: bool, config: &WinterPeakConfig) -> Result<Period> {
    let start = peak_start - config.anchor_start_offset();
    Period::new(start, start + config.anchor_duration(), critical, config.datetime_format())
}

fn noon(tz: &Tz, date: NaiveDate) -> Result<DateTime<Tz>> {
    at(tz, date, NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default())
}
