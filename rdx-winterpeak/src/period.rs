//! Immutable time-window value types.
//!
//! A [`Window`] is a closed interval `[start, end]` in the configured zone,
//! carrying its calendar day and the display strings rendered with the
//! configured `datetime_format`. Derived fields are computed once at
//! construction and only exposed through getters.
//!
//! [`Period`] is a routine or derived window (peak, anchor). [`Event`] is an
//! announced critical-peak occurrence, optionally augmented with a
//! [`PreHeat`] window by the classifier.

use crate::error::{Result, ScheduleError};
use crate::time::localize;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A closed interval with precomputed display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    date: NaiveDate,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    start_display: String,
    end_display: String,
}

impl Window {
    /// Builds a window, rejecting `end < start`.
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>, format: &str) -> Result<Self> {
        if end < start {
            return Err(ScheduleError::InvalidInterval {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self {
            date: start.date_naive(),
            start_display: start.format(format).to_string(),
            end_display: end.format(format).to_string(),
            start,
            end,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }

    pub fn start_ts(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_ts(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn start_display(&self) -> &str {
        &self.start_display
    }

    pub fn end_display(&self) -> &str {
        &self.end_display
    }

    /// Inclusive on both bounds.
    pub fn contains(&self, instant: DateTime<Tz>) -> bool {
        self.start <= instant && instant <= self.end
    }

    fn write_into(&self, map: &mut Map<String, Value>) {
        map.insert("date".into(), self.date.format(DATE_FORMAT).to_string().into());
        map.insert("start".into(), self.start_display.clone().into());
        map.insert("end".into(), self.end_display.clone().into());
        map.insert("start_ts".into(), self.start_ts().into());
        map.insert("end_ts".into(), self.end_ts().into());
    }
}

/// A peak, anchor or other derived window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    window: Window,
    critical: bool,
}

impl Period {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>, critical: bool, format: &str) -> Result<Self> {
        Ok(Self {
            window: Window::new(start, end, format)?,
            critical,
        })
    }

    /// Rebuilds a period from the `start`/`end` strings of [`Period::to_map`].
    ///
    /// Precision is bounded by `format`: a format without seconds drops them.
    pub fn from_map(map: &Map<String, Value>, tz: &Tz, format: &str) -> Result<Self> {
        let start = parse_field(map, "start", tz, format)?;
        let end = parse_field(map, "end", tz, format)?;
        let critical = map.get("critical").and_then(Value::as_bool).unwrap_or(false);
        Self::new(start, end, critical, format)
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn critical(&self) -> bool {
        self.critical
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.window.start()
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.window.end()
    }

    pub fn contains(&self, instant: DateTime<Tz>) -> bool {
        self.window.contains(instant)
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        self.window.write_into(&mut map);
        map.insert("critical".into(), self.critical.into());
        map
    }
}

/// The pre-conditioning window ahead of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreHeat {
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    start_display: String,
    end_display: String,
}

impl PreHeat {
    /// Offsets come from configuration and are not checked for ordering.
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>, format: &str) -> Self {
        Self {
            start_display: start.format(format).to_string(),
            end_display: end.format(format).to_string(),
            start,
            end,
        }
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }

    pub fn start_ts(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_ts(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn contains(&self, instant: DateTime<Tz>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// An announced critical-peak event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    window: Window,
    pre_heat: Option<PreHeat>,
}

impl Event {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>, format: &str) -> Result<Self> {
        Ok(Self {
            window: Window::new(start, end, format)?,
            pre_heat: None,
        })
    }

    /// Returns this event augmented with its pre-heat window.
    pub(crate) fn with_pre_heat(self, pre_heat: PreHeat) -> Self {
        Self {
            window: self.window,
            pre_heat: Some(pre_heat),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn date(&self) -> NaiveDate {
        self.window.date()
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.window.start()
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.window.end()
    }

    pub fn start_ts(&self) -> i64 {
        self.window.start_ts()
    }

    pub fn end_ts(&self) -> i64 {
        self.window.end_ts()
    }

    pub fn pre_heat(&self) -> Option<&PreHeat> {
        self.pre_heat.as_ref()
    }

    pub fn contains(&self, instant: DateTime<Tz>) -> bool {
        self.window.contains(instant)
    }

    /// Pre-heat keys are only present once a pre-heat window is attached.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        self.window.write_into(&mut map);
        if let Some(pre_heat) = &self.pre_heat {
            map.insert("pre_heat_start".into(), pre_heat.start_display.clone().into());
            map.insert("pre_heat_end".into(), pre_heat.end_display.clone().into());
            map.insert("pre_heat_start_ts".into(), pre_heat.start_ts().into());
            map.insert("pre_heat_end_ts".into(), pre_heat.end_ts().into());
        }
        map
    }

    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        flatten(&self.to_map())
    }
}

/// Renders map values as plain strings, suitable for topic payloads.
pub(crate) fn flatten(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

fn parse_field(map: &Map<String, Value>, key: &str, tz: &Tz, format: &str) -> Result<DateTime<Tz>> {
    let raw = map
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ScheduleError::MalformedEventRecord {
            reason: format!("period map has no '{key}' string"),
        })?;
    let local = NaiveDateTime::parse_from_str(raw, format).map_err(|e| {
        ScheduleError::MalformedEventRecord {
            reason: format!("cannot parse {key} '{raw}': {e}"),
        }
    })?;
    localize(tz, local)
}
