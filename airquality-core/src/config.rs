use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf, time::Duration};

use crate::{
    model::{Coordinates, Granularity},
    provider::epa::DEFAULT_BASE_URL,
    resolver::ResolverOptions,
};

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "AIRQUALITY_API_KEY";

pub const DEFAULT_PARAMETER: &str = "PM2.5";
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 30;
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 24 * 60;

/// The station picked during setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedStation {
    pub id: String,
    pub name: String,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// parameter = "PM2.5"
/// preference = ["1HR_AV", "24HR_AV"]
///
/// [stale_after_minutes]
/// 1HR_AV = 120
/// 24HR_AV = 1500
///
/// [location]
/// latitude = -37.81
/// longitude = 144.96
///
/// [station]
/// id = "10239"
/// name = "Melbourne CBD"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Measured parameter surfaced by the resolver.
    pub parameter: String,
    /// Granularities in order of preference.
    pub preference: Vec<Granularity>,
    pub poll_interval_minutes: u64,
    /// Per-granularity staleness overrides, keyed by series label.
    pub stale_after_minutes: BTreeMap<String, u64>,
    pub location: Option<Coordinates>,
    pub station: Option<SelectedStation>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            location: None,
            station: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            parameter: DEFAULT_PARAMETER.to_string(),
            preference: Granularity::default_preference(),
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            stale_after_minutes: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "saved configuration");
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("au", "airquality", "airquality-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// API key from the environment, falling back to the stored one.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
    }

    pub fn set_api_key(&mut self, api_key: &str) {
        self.api_key = Some(api_key.replace(' ', ""));
    }

    pub fn is_station_configured(&self) -> bool {
        self.station.is_some()
    }

    pub fn selected_station(&self) -> Result<&SelectedStation> {
        self.station.as_ref().ok_or_else(|| {
            anyhow!(
                "No monitoring station configured.\n\
                 Hint: run `airquality configure` first."
            )
        })
    }

    pub fn reference_location(&self) -> Result<Coordinates> {
        self.location.ok_or_else(|| {
            anyhow!(
                "No location configured.\n\
                 Hint: pass --lat/--lon or run `airquality configure`."
            )
        })
    }

    /// Record the outcome of the setup wizard. Refuses to overwrite an
    /// existing selection unless `replace` is set, since only one station
    /// can be configured at a time.
    pub fn select_station(
        &mut self,
        station: SelectedStation,
        location: Coordinates,
        replace: bool,
    ) -> Result<()> {
        if let (Some(existing), false) = (&self.station, replace) {
            return Err(anyhow!(
                "Station '{}' ({}) is already configured; only one station is supported.\n\
                 Hint: run `airquality configure --replace` to switch stations.",
                existing.name,
                existing.id
            ));
        }

        self.station = Some(station);
        self.location = Some(location);
        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        poll_interval_from_minutes(self.poll_interval_minutes)
    }

    /// Options for the reading resolver of the configured station.
    pub fn resolver_options(&self) -> Result<ResolverOptions> {
        let station = self.selected_station()?;
        let preference = if self.preference.is_empty() {
            Granularity::default_preference()
        } else {
            self.preference.clone()
        };

        let mut options =
            ResolverOptions::new(&station.id, &self.parameter).with_preference(preference);

        for (label, minutes) in &self.stale_after_minutes {
            let limit = i64::try_from(*minutes)
                .ok()
                .and_then(chrono::Duration::try_minutes)
                .ok_or_else(|| {
                    anyhow!(
                        "Staleness limit for {label} is too large: {minutes} minutes.\n\
                         Hint: fix `stale_after_minutes` in {}.",
                        Self::config_file_path()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|_| "the config file".into())
                    )
                })?;
            options = options.with_staleness(Granularity::from(label.as_str()), limit);
        }

        Ok(options)
    }
}

/// Convert a poll interval in minutes, clamping zero to one minute and
/// rejecting anything longer than a day.
pub fn poll_interval_from_minutes(minutes: u64) -> Result<Duration> {
    if minutes > MAX_POLL_INTERVAL_MINUTES {
        return Err(anyhow!(
            "Poll interval of {minutes} minutes is too long.\n\
             Hint: use a value between 1 and {MAX_POLL_INTERVAL_MINUTES}."
        ));
    }

    Ok(Duration::from_secs(minutes.max(1) * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn melbourne() -> Coordinates {
        Coordinates::new(-37.81, 144.96).unwrap()
    }

    fn station(id: &str) -> SelectedStation {
        SelectedStation { id: id.into(), name: format!("Site {id}") }
    }

    #[test]
    fn default_config_prefers_hourly_then_daily() {
        let cfg = Config::default();
        assert_eq!(cfg.parameter, "PM2.5");
        assert_eq!(cfg.preference, Granularity::default_preference());
        assert_eq!(cfg.poll_interval().unwrap(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn selected_station_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.selected_station().unwrap_err();
        assert!(err.to_string().contains("No monitoring station configured"));
    }

    #[test]
    fn select_station_refuses_second_install() {
        let mut cfg = Config::default();
        cfg.select_station(station("a"), melbourne(), false).unwrap();

        let err = cfg.select_station(station("b"), melbourne(), false).unwrap_err();
        assert!(err.to_string().contains("already configured"));
        assert_eq!(cfg.selected_station().unwrap().id, "a");
    }

    #[test]
    fn select_station_with_replace_overrides() {
        let mut cfg = Config::default();
        cfg.select_station(station("a"), melbourne(), false).unwrap();
        cfg.select_station(station("b"), melbourne(), true).unwrap();
        assert_eq!(cfg.selected_station().unwrap().id, "b");
    }

    #[test]
    fn set_api_key_strips_spaces() {
        let mut cfg = Config::default();
        cfg.set_api_key(" abc def ");
        assert_eq!(cfg.api_key.as_deref(), Some("abcdef"));
    }

    #[test]
    fn resolver_options_fall_back_to_default_preference() {
        let mut cfg = Config::default();
        cfg.select_station(station("a"), melbourne(), false).unwrap();
        cfg.preference.clear();

        let opts = cfg.resolver_options().unwrap();
        assert_eq!(opts.station_id, "a");
        assert_eq!(opts.preference, Granularity::default_preference());
    }

    #[test]
    fn huge_poll_interval_is_rejected() {
        let cfg: Config = toml::from_str("poll_interval_minutes = 9223372036854775807").unwrap();
        let err = cfg.poll_interval().unwrap_err();
        assert!(err.to_string().contains("too long"));

        assert!(poll_interval_from_minutes(u64::MAX).is_err());
        assert_eq!(poll_interval_from_minutes(0).unwrap(), Duration::from_secs(60));
        assert_eq!(
            poll_interval_from_minutes(MAX_POLL_INTERVAL_MINUTES).unwrap(),
            Duration::from_secs(24 * 60 * 60)
        );
    }

    #[test]
    fn out_of_range_location_is_rejected() {
        let err = toml::from_str::<Config>("[location]\nlatitude = 999.0\nlongitude = -5000.0")
            .unwrap_err();
        assert!(err.to_string().contains("invalid coordinates"), "{err}");

        let cfg: Config =
            toml::from_str("[location]\nlatitude = -37.81\nlongitude = 144.96").unwrap();
        assert_eq!(cfg.reference_location().unwrap(), melbourne());
    }

    #[test]
    fn staleness_overrides_reach_resolver_options() {
        let mut cfg: Config = toml::from_str(
            r#"
            [stale_after_minutes]
            1HR_AV = 240
            "#,
        )
        .unwrap();
        cfg.select_station(station("a"), melbourne(), false).unwrap();

        let opts = cfg.resolver_options().unwrap();
        assert_eq!(
            opts.staleness_limit(&Granularity::OneHourAverage),
            chrono::Duration::minutes(240)
        );
        assert_eq!(
            opts.staleness_limit(&Granularity::TwentyFourHourAverage),
            chrono::Duration::hours(25)
        );
    }

    #[test]
    fn oversized_staleness_override_is_an_error() {
        let mut cfg = Config::default();
        cfg.select_station(station("a"), melbourne(), false).unwrap();
        cfg.stale_after_minutes.insert("1HR_AV".into(), u64::MAX);

        let err = cfg.resolver_options().unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn config_parses_from_toml() {
        let cfg: Config = toml::from_str(
            r#"
            api_key = "KEY"
            preference = ["24HR_AV", "1HR_AV"]

            [station]
            id = "10239"
            name = "Melbourne CBD"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.api_key.as_deref(), Some("KEY"));
        assert_eq!(cfg.preference[0], Granularity::TwentyFourHourAverage);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert!(cfg.is_station_configured());
    }
}
