use std::{sync::Arc, time::Duration};

use airquality_core::{
    Config, Coordinates, ReadingResolver, SensorState, build_directory,
    config::poll_interval_from_minutes,
    provider::client_from_config,
    sensor::{self, ATTRIBUTION},
};
use anyhow::Context;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;

use crate::wizard;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "airquality", version, about = "EPA Victoria air quality CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enter the API key and pick the monitoring station to follow.
    Configure {
        /// Replace an already configured station.
        #[arg(long)]
        replace: bool,
    },

    /// List monitoring stations, nearest first.
    Stations {
        /// Reference latitude; defaults to the configured location.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Reference longitude; defaults to the configured location.
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Show at most this many stations.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Poll the configured station once.
    Show,

    /// Poll the configured station on a fixed interval until interrupted.
    Watch {
        /// Minutes between polls; defaults to the configured interval.
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { replace } => wizard::run(replace).await,
            Command::Stations { lat, lon, limit } => {
                let config = Config::load()?;
                let reference = match (lat, lon) {
                    (Some(lat), Some(lon)) => Coordinates::new(lat, lon)?,
                    _ => config.reference_location()?,
                };
                list_stations(&config, reference, limit).await
            }
            Command::Show => {
                let config = Config::load()?;
                show(&config).await
            }
            Command::Watch { interval_minutes } => {
                let config = Config::load()?;
                let interval = match interval_minutes {
                    Some(minutes) => poll_interval_from_minutes(minutes)?,
                    None => config.poll_interval()?,
                };
                watch(&config, interval).await
            }
        }
    }
}

async fn list_stations(config: &Config, reference: Coordinates, limit: usize) -> anyhow::Result<()> {
    let client = client_from_config(config)?;
    let directory = build_directory(&client, reference)
        .await
        .context("Failed to build the station directory")?;

    println!("Stations nearest to {reference}:");
    for ranked in directory.iter().take(limit) {
        println!(
            "  {:>7.1} km  {}  [{}]",
            ranked.distance_km, ranked.station.name, ranked.station.id
        );
    }
    if directory.len() > limit {
        println!("  ... and {} more", directory.len() - limit);
    }
    Ok(())
}

fn resolver_from_config(config: &Config) -> anyhow::Result<ReadingResolver> {
    let client = client_from_config(config)?;
    let options = config.resolver_options()?;
    Ok(ReadingResolver::new(Arc::new(client), options))
}

async fn show(config: &Config) -> anyhow::Result<()> {
    let resolver = resolver_from_config(config)?;
    let station = config.selected_station()?;
    println!("{} [{}]", station.name, station.id);

    // One request feeds both the resolved value and the per-window sensors.
    let bundle = match resolver.fetch().await {
        Ok(bundle) => bundle,
        Err(reason) => {
            print_state(&SensorState::Unavailable { reason });
            return Ok(());
        }
    };

    let now = Utc::now();
    let state = match airquality_core::resolver::select_source(&bundle, resolver.options(), now) {
        Ok(reading) => SensorState::Available(reading),
        Err(reason) => SensorState::Unavailable { reason },
    };
    print_state(&state);

    println!();
    for reading in sensor::snapshot(&bundle, resolver.options(), now) {
        let value = match (&reading.value, reading.description.unit) {
            (Some(v), Some(unit)) => format!("{v} {unit}"),
            (Some(v), None) => v.to_string(),
            (None, _) => "unavailable".to_string(),
        };
        let source = reading
            .source
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        println!("  {:<22} {value}{source}", reading.description.name);
    }
    println!("\n{ATTRIBUTION}");
    Ok(())
}

async fn watch(config: &Config, interval: Duration) -> anyhow::Result<()> {
    let resolver = resolver_from_config(config)?;
    tracing::info!(
        station = %resolver.options().station_id,
        interval_secs = interval.as_secs(),
        "starting polling loop"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let state = resolver.poll().await;
                print_state(&state);
            }
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl-C")?;
                tracing::info!("stopping polling loop");
                return Ok(());
            }
        }
    }
}

fn print_state(state: &SensorState) {
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    match state {
        SensorState::Available(reading) => {
            let unit = reading.unit.as_deref().unwrap_or("");
            let advice = reading
                .health_advice
                .as_deref()
                .map(|a| format!(" ({a})"))
                .unwrap_or_default();
            println!(
                "{stamp}  {} {:.1} {unit}{advice}  source: {}",
                reading.parameter, reading.value, reading.source
            );
        }
        SensorState::Unavailable { reason } => {
            println!("{stamp}  unavailable: {reason}");
        }
    }
}
