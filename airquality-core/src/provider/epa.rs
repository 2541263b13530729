use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Client, StatusCode, Url,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;

use crate::{
    error::{AirQualityError, Result, translate_status, truncate_body},
    model::{Coordinates, Granularity, MeasurementBundle, ParameterSeries, SeriesReading, Station},
};

use super::{ReadingProvider, StationProvider};

pub const DEFAULT_BASE_URL: &str = "https://gateway.api.epa.vic.gov.au/environmentMonitoring/v1";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client for the EPA Victoria environment monitoring API.
#[derive(Debug, Clone)]
pub struct EpaClient {
    base_url: Url,
    http: Client,
}

impl EpaClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let key =
            HeaderValue::from_str(api_key.trim()).map_err(|_| AirQualityError::InvalidApiKey)?;
        headers.insert("x-api-key", key);

        let invalid_base = || AirQualityError::InvalidBaseUrl(base_url.to_string());
        let base = Url::parse(base_url).map_err(|_| invalid_base())?;
        if base.cannot_be_a_base() {
            return Err(invalid_base());
        }

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(user_agent())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(AirQualityError::ProviderUnreachable)?;

        Ok(Self { base_url: base, http })
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AirQualityError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        site_id: Option<&str>,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "requesting EPA API");

        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(AirQualityError::ProviderUnreachable)?;

        let status = res.status();
        let body = res.text().await.map_err(AirQualityError::ProviderUnreachable)?;
        tracing::debug!(status = %translate_status(status), bytes = body.len(), "EPA API responded");

        match (status, site_id) {
            (s, _) if s.is_success() => {}
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
                return Err(AirQualityError::AuthenticationFailed {
                    status: translate_status(status),
                });
            }
            (StatusCode::NOT_FOUND, Some(id)) => {
                return Err(AirQualityError::SiteNotFound(id.to_string()));
            }
            (StatusCode::TOO_MANY_REQUESTS, _) => return Err(AirQualityError::RateLimited),
            _ => {
                return Err(AirQualityError::UnexpectedStatus {
                    status: translate_status(status),
                    body: truncate_body(&body),
                });
            }
        }

        serde_json::from_str(&body).map_err(AirQualityError::Decode)
    }
}

/// `airquality/<major>.<minor>`, the patch component is dropped.
fn user_agent() -> String {
    format!("airquality/{}", trimmed_version(env!("CARGO_PKG_VERSION")))
}

fn trimmed_version(version: &str) -> &str {
    let version = version.trim_start_matches('v');
    match version.rfind('.') {
        Some(idx) if version[..idx].contains('.') => &version[..idx],
        _ => version,
    }
}

#[derive(Debug, Deserialize)]
struct SitesResponse {
    #[serde(default)]
    records: Vec<SiteRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteRecord {
    #[serde(rename = "siteID")]
    site_id: String,
    site_name: String,
    site_type: Option<String>,
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[latitude, longitude]`
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParametersResponse {
    #[serde(rename = "siteID")]
    site_id: Option<String>,
    #[serde(default)]
    parameters: Vec<ParameterRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParameterRecord {
    name: String,
    #[serde(default)]
    time_series_readings: Vec<TimeSeriesRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeSeriesRecord {
    time_series_name: String,
    #[serde(default)]
    readings: Vec<ReadingRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadingRecord {
    average_value: Option<f64>,
    unit: Option<String>,
    health_advice: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl SiteRecord {
    fn into_station(self) -> Option<Station> {
        let coords = self.geometry?.coordinates;
        let [latitude, longitude] = coords[..] else {
            tracing::warn!(site = %self.site_id, "skipping site with malformed coordinates");
            return None;
        };

        match Coordinates::new(latitude, longitude) {
            Ok(location) => Some(Station {
                id: self.site_id,
                name: self.site_name,
                site_type: self.site_type,
                location,
            }),
            Err(e) => {
                tracing::warn!(site = %self.site_id, "skipping site: {e}");
                None
            }
        }
    }
}

impl ParametersResponse {
    fn into_bundle(self, requested_id: &str, fetched_at: DateTime<Utc>) -> MeasurementBundle {
        let parameters = self
            .parameters
            .into_iter()
            .map(|param| {
                let mut readings: Vec<SeriesReading> = Vec::new();
                for series in param.time_series_readings {
                    let granularity = Granularity::from(series.time_series_name);
                    if readings.iter().any(|r| r.granularity == granularity) {
                        continue;
                    }
                    let Some(latest) = series.readings.into_iter().next() else {
                        continue;
                    };
                    readings.push(SeriesReading {
                        granularity,
                        value: latest.average_value,
                        unit: latest.unit,
                        health_advice: latest.health_advice,
                        since: latest.since,
                        until: latest.until,
                    });
                }
                ParameterSeries { name: param.name, readings }
            })
            .collect();

        MeasurementBundle {
            station_id: self.site_id.unwrap_or_else(|| requested_id.to_string()),
            parameters,
            fetched_at,
        }
    }
}

#[async_trait]
impl StationProvider for EpaClient {
    async fn fetch_stations(&self) -> Result<Vec<Station>> {
        let parsed: SitesResponse = self
            .get_json(&["sites"], &[("environmentalSegment", "air")], None)
            .await?;

        let total = parsed.records.len();
        let stations: Vec<Station> = parsed
            .records
            .into_iter()
            .filter_map(SiteRecord::into_station)
            .collect();

        tracing::debug!(total, usable = stations.len(), "fetched EPA site list");
        Ok(stations)
    }
}

#[async_trait]
impl ReadingProvider for EpaClient {
    async fn fetch_readings(&self, station_id: &str) -> Result<MeasurementBundle> {
        let parsed: ParametersResponse = self
            .get_json(&["sites", station_id, "parameters"], &[], Some(station_id))
            .await?;

        let bundle = parsed.into_bundle(station_id, Utc::now());
        tracing::debug!(
            station = %bundle.station_id,
            parameters = bundle.parameters.len(),
            "fetched EPA readings"
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_trimmed_to_major_minor() {
        assert_eq!(trimmed_version("0.2.0"), "0.2");
        assert_eq!(trimmed_version("v1.4.12"), "1.4");
        assert_eq!(trimmed_version("3.1"), "3.1");
        assert_eq!(trimmed_version("7"), "7");
    }

    #[test]
    fn malformed_api_key_is_rejected_before_any_request() {
        let err = EpaClient::new("bad\nkey", DEFAULT_BASE_URL).unwrap_err();
        assert!(matches!(err, AirQualityError::InvalidApiKey));
        assert!(!err.to_string().contains("rejected"));
    }

    #[test]
    fn base_url_must_be_hierarchical() {
        assert!(matches!(
            EpaClient::new("KEY", "not a url").unwrap_err(),
            AirQualityError::InvalidBaseUrl(_)
        ));
        assert!(matches!(
            EpaClient::new("KEY", "mailto:someone@example.com").unwrap_err(),
            AirQualityError::InvalidBaseUrl(_)
        ));
    }

    #[test]
    fn station_id_is_encoded_as_one_path_segment() {
        let client = EpaClient::new("KEY", DEFAULT_BASE_URL).unwrap();
        let url = client.endpoint(&["sites", "a/b?c", "parameters"]).unwrap();
        assert_eq!(
            url.path(),
            "/environmentMonitoring/v1/sites/a%2Fb%3Fc/parameters"
        );
        assert!(url.query().is_none());

        let trailing = EpaClient::new("KEY", "http://localhost:8080/v1/").unwrap();
        assert_eq!(trailing.endpoint(&["sites"]).unwrap().as_str(), "http://localhost:8080/v1/sites");
    }

    #[test]
    fn site_without_two_coordinates_is_skipped() {
        let record: SiteRecord = serde_json::from_value(serde_json::json!({
            "siteID": "abc",
            "siteName": "Nowhere",
            "geometry": { "type": "Point", "coordinates": [-37.8] }
        }))
        .unwrap();
        assert!(record.into_station().is_none());
    }

    #[test]
    fn repeated_granularity_keeps_first_series() {
        let parsed: ParametersResponse = serde_json::from_value(serde_json::json!({
            "parameters": [{
                "name": "PM2.5",
                "timeSeriesReadings": [
                    { "timeSeriesName": "1HR_AV", "readings": [{ "averageValue": 3.0 }] },
                    { "timeSeriesName": "1HR_AV", "readings": [{ "averageValue": 9.0 }] },
                    { "timeSeriesName": "24HR_AV", "readings": [] }
                ]
            }]
        }))
        .unwrap();

        let bundle = parsed.into_bundle("site-1", Utc::now());
        assert_eq!(bundle.station_id, "site-1");
        let pm25 = bundle.parameter("PM2.5").unwrap();
        assert_eq!(pm25.readings.len(), 1);
        assert_eq!(pm25.readings[0].value, Some(3.0));
    }
}
