//! Picks the single value surfaced for a station on each poll.
//!
//! A poll either emits one reading, labelled with the granularity it came
//! from, or emits "unavailable". Nothing is carried between polls.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};

use crate::{
    error::{AirQualityError, Result},
    model::{Granularity, MeasurementBundle, ResolvedReading},
    provider::ReadingProvider,
};

/// What the resolver needs to know about the configured station.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverOptions {
    pub station_id: String,
    pub parameter: String,
    pub preference: Vec<Granularity>,
    /// Per-granularity overrides of the default staleness limit.
    pub staleness: HashMap<Granularity, Duration>,
}

impl ResolverOptions {
    pub fn new(station_id: &str, parameter: &str) -> Self {
        Self {
            station_id: station_id.to_string(),
            parameter: parameter.to_string(),
            preference: Granularity::default_preference(),
            staleness: HashMap::new(),
        }
    }

    pub fn with_preference(mut self, preference: Vec<Granularity>) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_staleness(mut self, granularity: Granularity, limit: Duration) -> Self {
        self.staleness.insert(granularity, limit);
        self
    }

    /// How old a reading of `granularity` may be before it is ignored.
    pub fn staleness_limit(&self, granularity: &Granularity) -> Duration {
        self.staleness
            .get(granularity)
            .copied()
            .unwrap_or_else(|| granularity.default_staleness_limit())
    }
}

/// Outcome of one poll as seen by the sensor.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SensorState {
    Available(ResolvedReading),
    Unavailable {
        #[serde(serialize_with = "serialize_reason")]
        reason: AirQualityError,
    },
}

fn serialize_reason<S: serde::Serializer>(
    reason: &AirQualityError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(reason)
}

impl SensorState {
    pub fn is_available(&self) -> bool {
        matches!(self, SensorState::Available(_))
    }

    pub fn reading(&self) -> Option<&ResolvedReading> {
        match self {
            SensorState::Available(reading) => Some(reading),
            SensorState::Unavailable { .. } => None,
        }
    }
}

/// Select the first granularity, in preference order, whose reading is
/// available at `now`.
pub fn select_source(
    bundle: &MeasurementBundle,
    options: &ResolverOptions,
    now: DateTime<Utc>,
) -> Result<ResolvedReading> {
    let unavailable = || AirQualityError::AllGranularitiesUnavailable {
        station_id: options.station_id.clone(),
        parameter: options.parameter.clone(),
    };

    let series = bundle.parameter(&options.parameter).ok_or_else(unavailable)?;

    for granularity in &options.preference {
        let Some(reading) = series.reading(granularity) else {
            tracing::debug!(%granularity, "no series reported");
            continue;
        };
        let Some(value) = reading.current_value(now, options.staleness_limit(granularity)) else {
            tracing::debug!(%granularity, until = ?reading.until, "reading missing or stale");
            continue;
        };

        return Ok(ResolvedReading {
            station_id: bundle.station_id.clone(),
            parameter: series.name.clone(),
            value,
            unit: reading.unit.clone(),
            source: granularity.clone(),
            health_advice: reading.health_advice.clone(),
            until: reading.until,
        });
    }

    Err(unavailable())
}

/// Resolves readings for one configured station.
#[derive(Debug, Clone)]
pub struct ReadingResolver {
    provider: Arc<dyn ReadingProvider>,
    options: ResolverOptions,
}

impl ReadingResolver {
    pub fn new(provider: Arc<dyn ReadingProvider>, options: ResolverOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Fetch the latest bundle for the configured station.
    pub async fn fetch(&self) -> Result<MeasurementBundle> {
        self.provider.fetch_readings(&self.options.station_id).await
    }

    /// Request and select in one step.
    pub async fn resolve(&self) -> Result<ResolvedReading> {
        let bundle = self.fetch().await?;
        select_source(&bundle, &self.options, Utc::now())
    }

    /// Run one poll cycle. Failures are reported as an unavailable state.
    pub async fn poll(&self) -> SensorState {
        match self.resolve().await {
            Ok(reading) => {
                tracing::info!(
                    station = %reading.station_id,
                    value = reading.value,
                    source = %reading.source,
                    "resolved reading"
                );
                SensorState::Available(reading)
            }
            Err(reason) => {
                tracing::warn!(station = %self.options.station_id, "reading unavailable: {reason}");
                SensorState::Unavailable { reason }
            }
        }
    }
}
