//! Defines all configuration structures for the winter peak engine.
//!
//! These structs are deserialized from a configuration file (TOML, YAML or
//! JSON) layered with `WINTERPEAK__*` environment overrides, using the
//! `config` crate. Required options are checked up front so a missing key
//! fails at startup instead of on the first state computation.

use crate::error::{Result, ScheduleError};
use crate::time::hours;
use chrono::format::{Item, StrftimeItems};
use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;

/// Keys that must be present in every configuration source.
pub const REQUIRED_KEYS: &[&str] = &[
    "events.event_refresh_seconds",
    "events.pre_heat_start_offset",
    "events.pre_heat_end_offset",
    "periods.morning_peak_start",
    "periods.morning_peak_end",
    "periods.evening_peak_start",
    "periods.evening_peak_end",
    "periods.anchor_start_offset",
    "periods.anchor_duration",
    "formats.datetime_format",
];

const ENV_PREFIX: &str = "WINTERPEAK";

/// Upper bound for every hour offset, one week.
pub const MAX_OFFSET_HOURS: f64 = 168.0;

/// Upper bound for `events.event_refresh_seconds`, one year.
pub const MAX_REFRESH_SECONDS: u64 = 365 * 24 * 3600;

/// The top-level configuration for the winter peak engine.
#[derive(Debug, Clone, Deserialize)]
pub struct WinterPeakConfig {
    /// Event refresh and pre-heat settings.
    pub events: EventsConfig,

    /// Daily peak windows and the anchor periods derived from them.
    pub periods: PeriodsConfig,

    /// Display formats.
    pub formats: FormatsConfig,

    /// The zone used for clock times, calendar dates and "today".
    /// Uses the string names from the IANA Time Zone Database.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Settings for the periodic publisher.
    #[serde(default)]
    pub publisher: PublisherConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Seconds a fetched payload stays fresh.
    pub event_refresh_seconds: u64,
    /// Hours before an event's start at which pre-heating begins.
    pub pre_heat_start_offset: f64,
    /// Hours before an event's start at which pre-heating ends.
    pub pre_heat_end_offset: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodsConfig {
    pub morning_peak_start: NaiveTime,
    pub morning_peak_end: NaiveTime,
    pub evening_peak_start: NaiveTime,
    pub evening_peak_end: NaiveTime,
    /// Hours between an anchor period's start and its peak's start.
    pub anchor_start_offset: f64,
    /// Length of an anchor period, in hours.
    pub anchor_duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatsConfig {
    /// strftime-style format used for every displayed instant.
    pub datetime_format: String,
}

/// Configuration for the [`PeakEngine`](crate::engine::PeakEngine) publish loop.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_publish_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

impl WinterPeakConfig {
    pub fn refresh_ttl(&self) -> Duration {
        i64::try_from(self.events.event_refresh_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    pub fn pre_heat_start_offset(&self) -> Duration {
        hours(self.events.pre_heat_start_offset)
    }

    pub fn pre_heat_end_offset(&self) -> Duration {
        hours(self.events.pre_heat_end_offset)
    }

    pub fn anchor_start_offset(&self) -> Duration {
        hours(self.periods.anchor_start_offset)
    }

    pub fn anchor_duration(&self) -> Duration {
        hours(self.periods.anchor_duration)
    }

    pub fn datetime_format(&self) -> &str {
        &self.formats.datetime_format
    }

    /// Checks value-level constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let offsets = [
            ("events.pre_heat_start_offset", self.events.pre_heat_start_offset),
            ("events.pre_heat_end_offset", self.events.pre_heat_end_offset),
            ("periods.anchor_start_offset", self.periods.anchor_start_offset),
            ("periods.anchor_duration", self.periods.anchor_duration),
        ];
        for (key, value) in offsets {
            if !value.is_finite() || !(0.0..=MAX_OFFSET_HOURS).contains(&value) {
                return Err(invalid(
                    key,
                    format!("expected an hour count between 0 and {MAX_OFFSET_HOURS}, got {value}"),
                ));
            }
        }

        let refresh = self.events.event_refresh_seconds;
        if refresh > MAX_REFRESH_SECONDS {
            return Err(invalid(
                "events.event_refresh_seconds",
                format!("expected at most {MAX_REFRESH_SECONDS} seconds, got {refresh}"),
            ));
        }

        let p = &self.periods;
        if p.morning_peak_end < p.morning_peak_start {
            return Err(invalid("periods.morning_peak_end", "ends before morning_peak_start"));
        }
        if p.evening_peak_end < p.evening_peak_start {
            return Err(invalid("periods.evening_peak_end", "ends before evening_peak_start"));
        }

        let format = &self.formats.datetime_format;
        if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(invalid(
                "formats.datetime_format",
                format!("'{format}' is not a valid strftime format"),
            ));
        }
        Ok(())
    }
}

/// Loads the configuration from `path`, applying `WINTERPEAK__SECTION__KEY`
/// environment overrides on top.
pub fn load_config(path: impl AsRef<Path>) -> Result<WinterPeakConfig> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::from(path.as_ref()))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    finish(settings)
}

/// Loads the configuration from an in-memory TOML document.
pub fn from_toml_str(toml: &str) -> Result<WinterPeakConfig> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
        .build()?;
    finish(settings)
}

fn finish(settings: ::config::Config) -> Result<WinterPeakConfig> {
    for key in REQUIRED_KEYS {
        match settings.get::<::config::Value>(key) {
            Ok(_) => {}
            Err(::config::ConfigError::NotFound(_)) => {
                return Err(ScheduleError::ConfigurationMissing {
                    key: (*key).to_string(),
                })
            }
            Err(other) => return Err(other.into()),
        }
    }
    let config: WinterPeakConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

fn invalid(key: &str, message: impl Into<String>) -> ScheduleError {
    ScheduleError::InvalidConfiguration {
        key: key.to_string(),
        message: message.into(),
    }
}

// --- Default value functions for serde ---

fn default_timezone() -> Tz {
    chrono_tz::America::Toronto
}

fn default_publish_interval() -> u64 {
    60
}

fn default_topic_prefix() -> String {
    "winterpeaks".to_string()
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_publish_interval(),
            topic_prefix: default_topic_prefix(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
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
    "#;

    /// The configuration used across the crate's unit tests.
    pub(crate) fn sample() -> WinterPeakConfig {
        from_toml_str(SAMPLE).unwrap()
    }

    #[test]
    fn loads_sample() {
        let config = sample();
        assert_eq!(config.timezone, chrono_tz::America::Toronto);
        assert_eq!(config.refresh_ttl(), Duration::hours(1));
        assert_eq!(config.pre_heat_start_offset(), Duration::hours(3));
        assert_eq!(config.anchor_duration(), Duration::hours(3));
        assert_eq!(
            config.periods.evening_peak_start,
            NaiveTime::from_hms_opt(16, 0, 0).unwrap()
        );
        assert_eq!(config.publisher.topic_prefix, "winterpeaks");
        assert_eq!(config.publisher.interval_seconds, 60);
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let toml = SAMPLE.replace("anchor_duration = 3", "");
        let err = from_toml_str(&toml).unwrap_err();
        match err {
            ScheduleError::ConfigurationMissing { key } => {
                assert_eq!(key, "periods.anchor_duration")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn inverted_peak_is_rejected() {
        let toml = SAMPLE.replace("morning_peak_end = \"09:00:00\"", "morning_peak_end = \"05:00:00\"");
        let err = from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidConfiguration { ref key, .. } if key == "periods.morning_peak_end"));
    }

    #[test]
    fn bad_format_is_rejected() {
        let toml = SAMPLE.replace("%Y-%m-%d %H:%M:%S", "%Y-%Q");
        let err = from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidConfiguration { .. }));
    }

    #[test]
    fn negative_offset_is_rejected() {
        let toml = SAMPLE.replace("pre_heat_start_offset = 3", "pre_heat_start_offset = -1");
        assert!(from_toml_str(&toml).is_err());
    }

    #[test]
    fn oversized_offsets_are_rejected() {
        for (from, to, key) in [
            ("anchor_start_offset = 5", "anchor_start_offset = 1e15", "periods.anchor_start_offset"),
            ("pre_heat_start_offset = 3", "pre_heat_start_offset = 169", "events.pre_heat_start_offset"),
        ] {
            let err = from_toml_str(&SAMPLE.replace(from, to)).unwrap_err();
            assert!(
                matches!(err, ScheduleError::InvalidConfiguration { key: ref k, .. } if k == key),
                "{to}: {err:?}"
            );
        }
        let week = from_toml_str(&SAMPLE.replace("anchor_duration = 3", "anchor_duration = 168")).unwrap();
        assert_eq!(week.anchor_duration(), Duration::weeks(1));
    }

    #[test]
    fn oversized_refresh_is_rejected() {
        let toml = SAMPLE.replace("event_refresh_seconds = 3600", "event_refresh_seconds = 100000000000000000");
        let err = from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidConfiguration { ref key, .. } if key == "events.event_refresh_seconds"));
    }

    #[test]
    fn refresh_ttl_saturates_instead_of_panicking() {
        let mut config = sample();
        config.events.event_refresh_seconds = u64::MAX;
        assert_eq!(config.refresh_ttl(), Duration::MAX);
    }
}
