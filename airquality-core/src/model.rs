use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AirQualityError, Result};

/// A point on the earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinates {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = AirQualityError;

    fn try_from(raw: RawCoordinates) -> Result<Self> {
        Coordinates::new(raw.latitude, raw.longitude)
    }
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        if !valid {
            return Err(AirQualityError::InvalidCoordinates { latitude, longitude });
        }

        Ok(Self { latitude, longitude })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A monitoring station as listed by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub site_type: Option<String>,
    pub location: Coordinates,
}

/// A station together with its distance from the reference point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStation {
    pub station: Station,
    pub distance_km: f64,
}

/// Averaging window of a reading, as named by the provider's `timeSeriesName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Granularity {
    OneHourAverage,
    TwentyFourHourAverage,
    Other(String),
}

impl Granularity {
    pub fn as_str(&self) -> &str {
        match self {
            Granularity::OneHourAverage => "1HR_AV",
            Granularity::TwentyFourHourAverage => "24HR_AV",
            Granularity::Other(label) => label,
        }
    }

    /// The preference order used when nothing else is configured.
    pub fn default_preference() -> Vec<Granularity> {
        vec![Granularity::OneHourAverage, Granularity::TwentyFourHourAverage]
    }

    /// Default age a reading's `until` timestamp may reach before it counts
    /// as stale.
    pub fn default_staleness_limit(&self) -> chrono::Duration {
        match self {
            Granularity::TwentyFourHourAverage => chrono::Duration::hours(25),
            Granularity::OneHourAverage | Granularity::Other(_) => chrono::Duration::hours(2),
        }
    }
}

impl From<&str> for Granularity {
    fn from(value: &str) -> Self {
        match value {
            "1HR_AV" => Granularity::OneHourAverage,
            "24HR_AV" => Granularity::TwentyFourHourAverage,
            other => Granularity::Other(other.to_string()),
        }
    }
}

impl From<String> for Granularity {
    fn from(value: String) -> Self {
        Granularity::from(value.as_str())
    }
}

impl From<Granularity> for String {
    fn from(value: Granularity) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The latest reading of one averaging window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesReading {
    pub granularity: Granularity,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub health_advice: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SeriesReading {
    /// The value, if it is finite and its window ended no more than
    /// `max_age` before `now`.
    pub fn current_value(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> Option<f64> {
        let fresh = self.until.is_some_and(|until| now - until <= max_age);
        self.value.filter(|v| fresh && v.is_finite())
    }

    pub fn is_available(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.current_value(now, max_age).is_some()
    }
}

/// All windows reported for one measured parameter, e.g. `PM2.5`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSeries {
    pub name: String,
    pub readings: Vec<SeriesReading>,
}

impl ParameterSeries {
    pub fn reading(&self, granularity: &Granularity) -> Option<&SeriesReading> {
        self.readings.iter().find(|r| &r.granularity == granularity)
    }
}

/// Everything a station reported in one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementBundle {
    pub station_id: String,
    pub parameters: Vec<ParameterSeries>,
    pub fetched_at: DateTime<Utc>,
}

impl MeasurementBundle {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSeries> {
        self.parameters.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// The single value surfaced for a poll, tagged with the window it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedReading {
    pub station_id: String,
    pub parameter: String,
    pub value: f64,
    pub unit: Option<String>,
    pub source: Granularity,
    pub health_advice: Option<String>,
    pub until: Option<DateTime<Utc>>,
}
