//! Sensor descriptions exposed for a station.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    model::{Granularity, MeasurementBundle},
    resolver::{ResolverOptions, select_source},
};

pub const ATTRIBUTION: &str = "Data retrieved from EPA (Victoria)";
pub const CONCENTRATION_UNIT: &str = "µg/m³";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorField {
    Value,
    HealthAdvice,
    LastUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub unit: Option<&'static str>,
    /// `None` means "whichever granularity the resolver picks".
    pub granularity: Option<Granularity>,
    pub field: SensorField,
}

/// Every sensor exposed for a station.
pub fn descriptions() -> Vec<SensorDescription> {
    vec![
        SensorDescription {
            key: "aqi_pm25",
            name: "Hourly Health Advice",
            icon: "mdi:information-outline",
            unit: None,
            granularity: Some(Granularity::OneHourAverage),
            field: SensorField::HealthAdvice,
        },
        SensorDescription {
            key: "aqi_pm25_24h",
            name: "Daily Health Advice",
            icon: "mdi:information-outline",
            unit: None,
            granularity: Some(Granularity::TwentyFourHourAverage),
            field: SensorField::HealthAdvice,
        },
        SensorDescription {
            key: "pm25",
            name: "Hourly PM2.5",
            icon: "mdi:chemical-weapon",
            unit: Some(CONCENTRATION_UNIT),
            granularity: Some(Granularity::OneHourAverage),
            field: SensorField::Value,
        },
        SensorDescription {
            key: "pm25_24h",
            name: "Daily Average PM2.5",
            icon: "mdi:chemical-weapon",
            unit: Some(CONCENTRATION_UNIT),
            granularity: Some(Granularity::TwentyFourHourAverage),
            field: SensorField::Value,
        },
        SensorDescription {
            key: "pm25_best",
            name: "PM2.5",
            icon: "mdi:chemical-weapon",
            unit: Some(CONCENTRATION_UNIT),
            granularity: None,
            field: SensorField::Value,
        },
        SensorDescription {
            key: "last_updated",
            name: "Last Updated",
            icon: "mdi:clock-outline",
            unit: None,
            granularity: None,
            field: SensorField::LastUpdated,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl std::fmt::Display for SensorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorValue::Number(v) => write!(f, "{v:.1}"),
            SensorValue::Text(t) => f.write_str(t),
            SensorValue::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S UTC")),
        }
    }
}

/// The state of one sensor after a poll. `value` is `None` when unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub description: SensorDescription,
    pub value: Option<SensorValue>,
    /// The granularity that produced `value`.
    pub source: Option<Granularity>,
}

impl SensorReading {
    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }
}

/// Render every sensor from one bundle.
pub fn snapshot(
    bundle: &MeasurementBundle,
    options: &ResolverOptions,
    now: DateTime<Utc>,
) -> Vec<SensorReading> {
    descriptions()
        .into_iter()
        .map(|description| {
            let (value, source) = match (description.field, &description.granularity) {
                (SensorField::LastUpdated, _) => {
                    (Some(SensorValue::Timestamp(bundle.fetched_at)), None)
                }
                (field, Some(granularity)) => fixed_source(bundle, options, granularity, field, now),
                (field, None) => {
                    let picked = select_source(bundle, options, now).ok();
                    let value = picked.as_ref().and_then(|r| match field {
                        SensorField::Value => Some(SensorValue::Number(r.value)),
                        SensorField::HealthAdvice => r.health_advice.clone().map(SensorValue::Text),
                        SensorField::LastUpdated => None,
                    });
                    (value, picked.map(|r| r.source))
                }
            };
            let source = value.as_ref().and(source);
            SensorReading { description, value, source }
        })
        .collect()
}

fn fixed_source(
    bundle: &MeasurementBundle,
    options: &ResolverOptions,
    granularity: &Granularity,
    field: SensorField,
    now: DateTime<Utc>,
) -> (Option<SensorValue>, Option<Granularity>) {
    let reading = bundle
        .parameter(&options.parameter)
        .and_then(|p| p.reading(granularity))
        .filter(|r| r.is_available(now, options.staleness_limit(granularity)));

    let value = reading.and_then(|r| match field {
        SensorField::Value => r.value.map(SensorValue::Number),
        SensorField::HealthAdvice => r.health_advice.clone().map(SensorValue::Text),
        SensorField::LastUpdated => None,
    });

    (value, Some(granularity.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParameterSeries, SeriesReading};
    use chrono::TimeZone;

    fn bundle(now: DateTime<Utc>) -> MeasurementBundle {
        MeasurementBundle {
            station_id: "site-1".into(),
            parameters: vec![ParameterSeries {
                name: "PM2.5".into(),
                readings: vec![SeriesReading {
                    granularity: Granularity::TwentyFourHourAverage,
                    value: Some(7.25),
                    unit: Some(CONCENTRATION_UNIT.into()),
                    health_advice: Some("Good".into()),
                    since: None,
                    until: Some(now),
                }],
            }],
            fetched_at: now,
        }
    }

    fn find<'a>(readings: &'a [SensorReading], key: &str) -> &'a SensorReading {
        readings.iter().find(|r| r.description.key == key).unwrap()
    }

    #[test]
    fn keys_are_unique() {
        let descs = descriptions();
        let mut keys: Vec<_> = descs.iter().map(|d| d.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), descs.len());
    }

    #[test]
    fn snapshot_marks_missing_hourly_unavailable() {
        let now = Utc::now();
        let opts = ResolverOptions::new("site-1", "PM2.5");
        let readings = snapshot(&bundle(now), &opts, now);

        assert!(!find(&readings, "pm25").is_available());
        assert!(!find(&readings, "aqi_pm25").is_available());
        assert_eq!(find(&readings, "pm25_24h").value, Some(SensorValue::Number(7.25)));
        assert_eq!(
            find(&readings, "aqi_pm25_24h").value,
            Some(SensorValue::Text("Good".into()))
        );
    }

    #[test]
    fn best_sensor_carries_source_label() {
        let now = Utc::now();
        let opts = ResolverOptions::new("site-1", "PM2.5");
        let readings = snapshot(&bundle(now), &opts, now);

        let best = find(&readings, "pm25_best");
        assert_eq!(best.value, Some(SensorValue::Number(7.25)));
        assert_eq!(best.source, Some(Granularity::TwentyFourHourAverage));
    }

    #[test]
    fn last_updated_reports_fetch_time_even_when_readings_are_stale() {
        let fetched = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let later = fetched + chrono::Duration::days(3);
        let opts = ResolverOptions::new("site-1", "PM2.5");
        let readings = snapshot(&bundle(fetched), &opts, later);

        let updated = find(&readings, "last_updated");
        assert_eq!(updated.value, Some(SensorValue::Timestamp(fetched)));
        assert_eq!(updated.source, None);
        assert!(!find(&readings, "pm25_best").is_available());
    }

    #[test]
    fn value_display_rounds_to_one_decimal() {
        assert_eq!(SensorValue::Number(7.24).to_string(), "7.2");
        assert_eq!(SensorValue::Text("Good".into()).to_string(), "Good");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        assert_eq!(SensorValue::Timestamp(at).to_string(), "2024-05-01 12:30:05 UTC");
    }
}
