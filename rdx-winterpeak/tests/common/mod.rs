#![allow(dead_code)]

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use winterpeak::config::{from_toml_str, WinterPeakConfig};
use winterpeak::error::SourceError;
use winterpeak::source::{EventSource, RawPayload};
use winterpeak::time::localize;

pub const CONFIG: &str = r#"
    timezone = "America/Toronto"

    [events]
    event_refresh_seconds = 3600
    pre_heat_start_offset = 3
    pre_heat_end_offset = 0

    [periods]
    morning_peak_start = "06:00:00"
    morning_peak_end = "09:00:00"
    evening_peak_start = "16:00:00"
    evening_peak_end = "20:00:00"
    anchor_start_offset = 5
    anchor_duration = 3

    [formats]
    datetime_format = "%Y-%m-%d %H:%M:%S"

    [publisher]
    interval_seconds = 1
    topic_prefix = "winterpeaks"
"#;

pub const PAYLOAD: &str = r#"{
    "periodesEffacementsHivers": [
        {
            "dateDebutPeriodeHiver": "2020-12-01T00:00:00.000+0000",
            "dateFinPeriodeHiver": "2021-03-31T00:00:00.000+0000",
            "periodesEffacementHiver": [
                {"dateEffacement": "2021-01-12T00:00:00.000+0000", "heureDebut": "16:00:00", "heureFin": "20:00:00"}
            ]
        },
        {
            "dateDebutPeriodeHiver": "2022-01-01T00:00:00.000+0000",
            "dateFinPeriodeHiver": "2022-03-31T00:00:00.000+0000",
            "periodesEffacementHiver": [
                {"dateEffacement": "2022-01-05T00:00:00.000+0000", "heureDebut": "06:00:00", "heureFin": "09:00:00"},
                {"dateEffacement": "2022-01-06T00:00:00.000+0000", "heureDebut": "16:00:00", "heureFin": "20:00:00"}
            ]
        }
    ]
}"#;

pub fn config() -> Arc<WinterPeakConfig> {
    Arc::new(from_toml_str(CONFIG).unwrap())
}

pub fn payload() -> RawPayload {
    RawPayload::from_json(PAYLOAD).unwrap()
}

pub fn instant(s: &str) -> DateTime<Tz> {
    let local = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
    localize(&chrono_tz::America::Toronto, local).unwrap()
}

/// Serves `payload()` and counts fetches; can be switched to failing.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    pub fetches: Arc<AtomicUsize>,
    pub failing: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EventSource for ScriptedSource {
    async fn fetch(&self) -> Result<RawPayload, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Other("provider unreachable".into()));
        }
        Ok(payload())
    }
}
