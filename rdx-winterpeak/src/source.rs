//! Raw provider payload and the data-source seam.
//!
//! The provider reports winter seasons, each holding the critical-peak events
//! announced for it. Field names accept the provider's own keys as well as
//! neutral aliases. Every field is optional at this layer; the classifier
//! decides which records are usable.

use crate::error::SourceError;
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawPayload {
    #[serde(rename = "periodesEffacementsHivers", alias = "seasons", default)]
    pub seasons: Vec<RawSeason>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSeason {
    #[serde(rename = "dateDebutPeriodeHiver", alias = "winterStartDate", default)]
    pub start_date: Option<String>,
    #[serde(rename = "dateFinPeriodeHiver", alias = "winterEndDate", default)]
    pub end_date: Option<String>,
    #[serde(rename = "periodesEffacementHiver", alias = "events", default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "dateEffacement", alias = "eventDate", default)]
    pub date: Option<String>,
    #[serde(rename = "heureDebut", alias = "startClockTime", default)]
    pub start_time: Option<String>,
    #[serde(rename = "heureFin", alias = "endClockTime", default)]
    pub end_time: Option<String>,
}

impl RawPayload {
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn event_count(&self) -> usize {
        self.seasons.iter().map(|s| s.events.len()).sum()
    }
}

/// Supplies the provider's raw winter credit payload.
///
/// Authentication, HTTP and retry policy all live behind this trait.
pub trait EventSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<RawPayload, SourceError>> + Send;
}

/// Reads the payload from a JSON file on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EventSource for JsonFileSource {
    async fn fetch(&self) -> Result<RawPayload, SourceError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        RawPayload::from_json(&text)
    }
}

/// Serves a fixed payload.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    payload: RawPayload,
}

impl StaticSource {
    pub fn new(payload: RawPayload) -> Self {
        Self { payload }
    }
}

impl EventSource for StaticSource {
    async fn fetch(&self) -> Result<RawPayload, SourceError> {
        Ok(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_keys() {
        let json = r#"{
            "periodesEffacementsHivers": [{
                "dateDebutPeriodeHiver": "2021-12-01T00:00:00.000+0000",
                "dateFinPeriodeHiver": "2022-03-31T00:00:00.000+0000",
                "periodesEffacementHiver": [
                    {"dateEffacement": "2022-01-05T00:00:00.000+0000", "heureDebut": "06:00:00", "heureFin": "09:00:00"}
                ]
            }]
        }"#;
        let payload = RawPayload::from_json(json).unwrap();
        assert_eq!(payload.seasons.len(), 1);
        assert_eq!(payload.event_count(), 1);
        let event = &payload.seasons[0].events[0];
        assert_eq!(event.start_time.as_deref(), Some("06:00:00"));
    }

    #[test]
    fn parses_neutral_aliases_and_tolerates_gaps() {
        let json = r#"{
            "seasons": [{
                "winterStartDate": "2022-01-01",
                "winterEndDate": "2022-03-31",
                "events": [{"eventDate": "2022-01-05", "startClockTime": "06:00:00"}]
            }]
        }"#;
        let payload = RawPayload::from_json(json).unwrap();
        let event = &payload.seasons[0].events[0];
        assert_eq!(event.date.as_deref(), Some("2022-01-05"));
        assert!(event.end_time.is_none());
    }

    #[test]
    fn empty_object_has_no_seasons() {
        assert_eq!(RawPayload::from_json("{}").unwrap(), RawPayload::default());
    }
}
