//! Forward geocoding for the setup wizard: turn a typed address into
//! coordinates. Uses Nominatim (OpenStreetMap), no API key required.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    error::{AirQualityError, Result},
    model::Coordinates,
};

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: Option<String>,
}

/// A geocoded place.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub display_name: String,
    pub location: Coordinates,
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    base_url: String,
    http: Client,
}

impl Geocoder {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("airquality/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AirQualityError::ProviderUnreachable)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Look up the best match for `address`.
    pub async fn search(&self, address: &str) -> Result<Place> {
        let failed = || AirQualityError::GeocodeFailed(address.to_string());

        let url = format!("{}/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("geocode request failed: {e}");
                failed()
            })?;

        if !response.status().is_success() {
            tracing::debug!("geocode returned status {}", response.status());
            return Err(failed());
        }

        let places: Vec<NominatimPlace> = response.json().await.map_err(|e| {
            tracing::debug!("geocode parse error: {e}");
            failed()
        })?;

        let place = places.into_iter().next().ok_or_else(failed)?;
        let latitude: f64 = place.lat.parse().map_err(|_| failed())?;
        let longitude: f64 = place.lon.parse().map_err(|_| failed())?;
        let location = Coordinates::new(latitude, longitude)?;

        let display_name = place.display_name.unwrap_or_else(|| address.to_string());
        tracing::info!("geocoded '{address}' to {display_name} ({location})");

        Ok(Place { display_name, location })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Run with: cargo test -p airquality-core -- --ignored
    async fn search_melbourne() {
        let geocoder = Geocoder::new(NOMINATIM_URL).unwrap();
        let place = geocoder.search("Melbourne, Victoria, Australia").await.unwrap();
        assert!((place.location.latitude + 37.8).abs() < 0.5);
    }
}
