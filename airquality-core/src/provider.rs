use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    Config,
    error::Result,
    model::{MeasurementBundle, Station},
    provider::epa::EpaClient,
};

pub mod epa;

/// Lists the monitoring stations a provider operates.
#[async_trait]
pub trait StationProvider: Send + Sync + Debug {
    async fn fetch_stations(&self) -> Result<Vec<Station>>;
}

/// Fetches the latest measurements of a single station.
#[async_trait]
pub trait ReadingProvider: Send + Sync + Debug {
    async fn fetch_readings(&self, station_id: &str) -> Result<MeasurementBundle>;
}

/// Construct the EPA client from config.
pub fn client_from_config(config: &Config) -> anyhow::Result<EpaClient> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No EPA API key configured.\n\
             Hint: run `airquality configure` or set {}.",
            crate::config::API_KEY_ENV
        )
    })?;

    Ok(EpaClient::new(&api_key, &config.base_url)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_from_config_errors_when_missing_api_key() {
        let cfg = Config { api_key: None, ..Config::default() };
        if std::env::var(crate::config::API_KEY_ENV).is_ok() {
            return;
        }
        let err = client_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("No EPA API key configured"));
    }

    #[test]
    fn client_from_config_works_when_key_present() {
        let cfg = Config { api_key: Some("KEY".into()), ..Config::default() };
        assert!(client_from_config(&cfg).is_ok());
    }
}
